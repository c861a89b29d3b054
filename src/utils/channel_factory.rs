use crate::channels::dev::DevChannel;
use crate::channels::talk::TalkChannel;
use crate::core::{config::ChannelConfig, errors::ChannelError, traits::Channel};
use std::sync::Arc;
use tracing::info;

/// Backend a channel host is served by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Development,
    Production,
}

impl ChannelKind {
    /// Hosts containing `localhost` are served by the development server
    pub fn detect(host: &str) -> Self {
        if host.contains("localhost") {
            Self::Development
        } else {
            Self::Production
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "Development"),
            Self::Production => write!(f, "Production"),
        }
    }
}

/// Factory for creating channel backends
pub struct ChannelFactory;

impl ChannelFactory {
    /// Create the backend matching the configured host
    pub fn create(config: ChannelConfig) -> Result<Arc<dyn Channel>, ChannelError> {
        let kind = ChannelKind::detect(&config.host);
        Self::create_kind(kind, config)
    }

    pub fn create_kind(
        kind: ChannelKind,
        config: ChannelConfig,
    ) -> Result<Arc<dyn Channel>, ChannelError> {
        info!(host = %config.host, %kind, "creating channel");
        match kind {
            ChannelKind::Development => Ok(Arc::new(DevChannel::new(config)?)),
            ChannelKind::Production => Ok(Arc::new(TalkChannel::new(config)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_kind() {
        assert_eq!(ChannelKind::detect("localhost:8080"), ChannelKind::Development);
        assert_eq!(ChannelKind::detect("gopaste.appspot.com"), ChannelKind::Production);
        assert_eq!(ChannelKind::Development.to_string(), "Development");
    }

    #[test]
    fn test_create_rejects_invalid_config() {
        let config = ChannelConfig::new(String::new(), "c".to_string(), "t".to_string());
        assert!(matches!(
            ChannelFactory::create(config),
            Err(ChannelError::ConfigError(_))
        ));
    }

    #[test]
    fn test_create_both_kinds() {
        for host in ["localhost:8080", "gopaste.appspot.com"] {
            let config = ChannelConfig::new(host.to_string(), "c".to_string(), "t".to_string());
            assert!(ChannelFactory::create(config).is_ok());
        }
    }
}
