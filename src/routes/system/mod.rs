mod handler;

pub use handler::{debug_env, health};
