mod handler;
mod model;

pub use handler::generate;
pub use model::GenerateResponse;
