pub mod config;
pub mod errors;
pub mod kernel;
pub mod shutdown;
pub mod traits;
