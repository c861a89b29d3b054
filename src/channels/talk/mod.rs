//! Production backend for the talkgadget gateway.
//!
//! A stream runs in three phases: [`bootstrap`] scrapes the gateway's setup
//! page and binds a protocol session, [`poll`] then long-polls the bind
//! endpoint, and [`codec`] turns each response body into application
//! messages. All protocol state lives in a [`session::ChannelSession`] that
//! exists only for the duration of one `stream` call.

pub mod bootstrap;
pub mod builder;
pub mod codec;
pub mod connector;
pub mod poll;
pub mod session;
pub mod token;

pub use builder::{build_channel, TalkBuilder};
pub use codec::{extract_payload, ChannelMessage, PacketReader};
pub use connector::TalkChannel;
pub use session::{Backoff, ChannelSession};
pub use token::random_token;
