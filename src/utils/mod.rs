pub mod channel_factory;

pub use channel_factory::{ChannelFactory, ChannelKind};
