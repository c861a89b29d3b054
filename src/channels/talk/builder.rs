use super::connector::TalkChannel;
use crate::core::config::{ChannelConfig, GatewayConfig};
use crate::core::errors::ChannelError;
use crate::core::kernel::{HttpTransport, TransportBuilder, TransportConfig};
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`TalkChannel`]
#[derive(Default)]
pub struct TalkBuilder {
    gateway: GatewayConfig,
    transport_config: TransportConfig,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl TalkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point at a different gateway base URL
    pub fn with_gateway_url(mut self, base_url: String) -> Self {
        self.gateway.base_url = base_url;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.gateway = self.gateway.backoff(base, max);
        self
    }

    pub fn with_transport_config(mut self, config: TransportConfig) -> Self {
        self.transport_config = config;
        self
    }

    /// Use an existing transport instead of building a reqwest one
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self, config: ChannelConfig) -> Result<TalkChannel, ChannelError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(TransportBuilder::new(self.transport_config).build()?),
        };
        TalkChannel::with_transport(config, self.gateway, transport)
    }
}

/// Create a production channel with default settings
pub fn build_channel(config: ChannelConfig) -> Result<TalkChannel, ChannelError> {
    TalkBuilder::new().build(config)
}
