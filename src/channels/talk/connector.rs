use super::{bootstrap, poll, session::ChannelSession};
use crate::core::config::{ChannelConfig, GatewayConfig};
use crate::core::errors::ChannelError;
use crate::core::kernel::{HttpTransport, ReqwestTransport};
use crate::core::shutdown::ShutdownSignal;
use crate::core::traits::Channel;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

/// Production channel speaking the talkgadget BrowserChannel protocol
pub struct TalkChannel {
    config: ChannelConfig,
    gateway: GatewayConfig,
    transport: Arc<dyn HttpTransport>,
    shutdown: ShutdownSignal,
}

impl std::fmt::Debug for TalkChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TalkChannel")
            .field("config", &self.config)
            .field("gateway", &self.gateway)
            .field("running", &self.shutdown.is_running())
            .finish_non_exhaustive()
    }
}

impl TalkChannel {
    /// Create a channel against the default gateway using reqwest
    pub fn new(config: ChannelConfig) -> Result<Self, ChannelError> {
        Self::with_transport(
            config,
            GatewayConfig::default(),
            Arc::new(ReqwestTransport::new()?),
        )
    }

    pub fn with_transport(
        config: ChannelConfig,
        gateway: GatewayConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ChannelError> {
        config.validate()?;
        gateway.validate()?;
        Ok(Self {
            config,
            gateway,
            transport,
            shutdown: ShutdownSignal::new(),
        })
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn gateway(&self) -> &GatewayConfig {
        &self.gateway
    }
}

#[async_trait]
impl Channel for TalkChannel {
    #[instrument(skip(self, output), fields(host = %self.config.host, client_id = %self.config.client_id))]
    async fn stream(&self, output: mpsc::Sender<String>) -> Result<(), ChannelError> {
        let mut guard = self.shutdown.begin();
        if self.shutdown.is_stop_requested() {
            debug!("channel already closed, not registering");
            return Ok(());
        }
        let mut session = ChannelSession::new(&self.config, &self.gateway)?;
        let transport = self.transport.as_ref();

        bootstrap::initialize(&mut session, transport).await?;
        bootstrap::fetch_sid(&mut session, transport).await?;
        bootstrap::connect(&mut session, transport).await?;

        poll::poll_loop(&mut session, transport, &output, &self.shutdown, &mut guard).await
    }

    #[instrument(skip(self), fields(host = %self.config.host, client_id = %self.config.client_id))]
    async fn close(&self) -> Result<(), ChannelError> {
        let Some(farewell) = self.shutdown.stop_and_wait().await else {
            return Ok(());
        };

        // Best effort: the session is over whether or not the gateway hears about it
        match self.transport.get(farewell).await {
            Ok(response) => debug!(status = %response.status, "disconnect sent"),
            Err(e) => warn!(error = %e, "disconnect notification failed"),
        }
        Ok(())
    }
}
