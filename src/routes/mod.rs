pub mod generate;
pub mod system;
