use crate::channels::join_path;
use crate::core::config::ChannelConfig;
use crate::core::errors::ChannelError;
use crate::core::kernel::{HttpTransport, ReqwestTransport};
use crate::core::shutdown::ShutdownSignal;
use crate::core::traits::Channel;
use async_trait::async_trait;
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, instrument, trace};

pub const DEFAULT_POLL_WAIT: Duration = Duration::from_millis(500);

/// Channel backed by the development server's command endpoint.
///
/// Every poll returns either one complete message or an empty body.
pub struct DevChannel {
    config: ChannelConfig,
    transport: Arc<dyn HttpTransport>,
    poll_wait: Duration,
    shutdown: ShutdownSignal,
}

impl std::fmt::Debug for DevChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevChannel")
            .field("config", &self.config)
            .field("poll_wait", &self.poll_wait)
            .field("running", &self.shutdown.is_running())
            .finish_non_exhaustive()
    }
}

impl DevChannel {
    pub fn new(config: ChannelConfig) -> Result<Self, ChannelError> {
        Self::with_transport(config, Arc::new(ReqwestTransport::new()?))
    }

    pub fn with_transport(
        config: ChannelConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ChannelError> {
        config.validate()?;
        Ok(Self {
            config,
            transport,
            poll_wait: DEFAULT_POLL_WAIT,
            shutdown: ShutdownSignal::new(),
        })
    }

    /// Pause between polls that came back empty
    #[must_use]
    pub const fn poll_wait(mut self, poll_wait: Duration) -> Self {
        self.poll_wait = poll_wait;
        self
    }

    pub fn command_url(&self, command: &str) -> Result<Url, ChannelError> {
        let base = format!(
            "http://{}{}",
            self.config.host,
            join_path(&self.config.channel_path, "dev")
        );
        Url::parse_with_params(
            &base,
            &[
                ("command", command),
                ("channel", self.config.token()),
                ("client", self.config.client_id.as_str()),
            ],
        )
        .map_err(|e| ChannelError::InvalidUrl(format!("{base}: {e}")))
    }
}

#[async_trait]
impl Channel for DevChannel {
    #[instrument(skip(self, output), fields(host = %self.config.host, client_id = %self.config.client_id))]
    async fn stream(&self, output: mpsc::Sender<String>) -> Result<(), ChannelError> {
        let _guard = self.shutdown.begin();
        if self.shutdown.is_stop_requested() {
            debug!("channel already closed, not connecting");
            return Ok(());
        }

        let response = self.transport.get(self.command_url("connect")?).await?;
        debug!(status = %response.status, "connected to development server");

        loop {
            if self.shutdown.is_stop_requested() {
                debug!("stop requested");
                return Ok(());
            }

            let response = self.transport.get(self.command_url("poll")?).await?;
            if response.content_length.is_some_and(|len| len > 0) {
                let message = response.text().await?;
                trace!(message = %message, "incoming message");
                output
                    .send(message)
                    .await
                    .map_err(|_| ChannelError::OutputClosed)?;
            } else {
                sleep(self.poll_wait).await;
            }
        }
    }

    #[instrument(skip(self), fields(host = %self.config.host, client_id = %self.config.client_id))]
    async fn close(&self) -> Result<(), ChannelError> {
        self.shutdown.stop_and_wait().await;
        let response = self.transport.get(self.command_url("disconnect")?).await?;
        debug!(status = %response.status, "disconnected");
        Ok(())
    }
}
