pub mod channels;
pub mod core;
pub mod utils;

pub use channels::dev::DevChannel;
pub use channels::talk::{TalkBuilder, TalkChannel};
pub use crate::core::{
    config::{ChannelConfig, GatewayConfig},
    errors::ChannelError,
    traits::Channel,
};
pub use utils::{ChannelFactory, ChannelKind};
