use crate::core::errors::ChannelError;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A server-push channel implementation
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stream messages from the channel into `output`, in arrival order.
    ///
    /// Runs until [`Channel::close`] is requested or a fatal error occurs.
    /// Setup, transport and re-authentication failures end the stream with
    /// the offending error. Usually spawned as its own task.
    async fn stream(&self, output: mpsc::Sender<String>) -> Result<(), ChannelError>;

    /// Request that the stream shut down and wait until it has.
    ///
    /// Not preemptive: an outstanding long poll completes first.
    async fn close(&self) -> Result<(), ChannelError>;
}
