pub mod connector;

pub use connector::{DevChannel, DEFAULT_POLL_WAIT};
