use super::token::random_token;
use crate::channels::join_path;
use crate::core::config::{ChannelConfig, GatewayConfig};
use crate::core::errors::ChannelError;
use reqwest::Url;
use secrecy::{ExposeSecret, Secret};
use std::collections::BTreeMap;
use std::time::Duration;

/// BrowserChannel protocol version spoken by the gateway
pub const PROTOCOL_VERSION: &str = "8";

/// Length of the per-request `zx` cache buster
const ZX_LEN: usize = 12;

/// Exponential poll delay, doubled after unproductive rounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
        }
    }

    /// Delay to wait now; the following delay doubles, capped at the maximum
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }

    pub const fn current(&self) -> Duration {
        self.current
    }

    pub const fn base(&self) -> Duration {
        self.base
    }
}

/// All mutable protocol state for one `stream` call
#[derive(Debug)]
pub struct ChannelSession {
    gateway: Url,
    bind_endpoint: Url,
    app_host: String,
    channel_path: String,
    client_id: String,
    token: Secret<String>,

    gateway_client_id: String,
    gateway_session_id: String,
    sid: Option<String>,

    rid: u64,
    mid: i64,

    pub(crate) backoff: Backoff,
}

impl ChannelSession {
    pub fn new(config: &ChannelConfig, gateway: &GatewayConfig) -> Result<Self, ChannelError> {
        let gateway_url = Url::parse(&gateway.base_url)
            .map_err(|e| ChannelError::InvalidUrl(format!("{}: {}", gateway.base_url, e)))?;
        let bind_endpoint = gateway_url
            .join("dch/bind")
            .map_err(|e| ChannelError::InvalidUrl(e.to_string()))?;

        Ok(Self {
            gateway: gateway_url,
            bind_endpoint,
            app_host: config.host.clone(),
            channel_path: config.channel_path.clone(),
            client_id: config.client_id.clone(),
            token: config.token.clone(),
            gateway_client_id: String::new(),
            gateway_session_id: String::new(),
            sid: None,
            rid: 0,
            mid: gateway.initial_mid,
            backoff: Backoff::new(gateway.backoff_base, gateway.backoff_max),
        })
    }

    /// Resolve a path relative to the gateway base URL
    pub fn gateway_url(&self, path: &str) -> Result<Url, ChannelError> {
        self.gateway
            .join(path)
            .map_err(|e| ChannelError::InvalidUrl(format!("{}: {}", path, e)))
    }

    /// Page on the application host the gateway posts cross-page messages to
    pub fn app_blank_page(&self) -> String {
        format!(
            "http://{}{}",
            self.app_host,
            join_path(&self.channel_path, "xpc_blank")
        )
    }

    /// Build the next bind request URL and consume a request id.
    ///
    /// `extra` overrides the defaults for the same key; `SID` is appended
    /// once the protocol session id is known. Call exactly once per request.
    pub fn bind_url(&mut self, extra: &[(&str, &str)]) -> Url {
        let rid = self.rid.to_string();
        let zx = random_token(ZX_LEN);
        let mut params: BTreeMap<&str, &str> = BTreeMap::from([
            ("VER", PROTOCOL_VERSION),
            ("RID", rid.as_str()),
            ("token", self.token.expose_secret().as_str()),
            ("gsessionid", self.gateway_session_id.as_str()),
            ("clid", self.gateway_client_id.as_str()),
            ("prop", "data"),
            ("zx", zx.as_str()),
            ("t", "1"),
        ]);
        params.extend(extra.iter().copied());
        if let Some(sid) = &self.sid {
            params.insert("SID", sid.as_str());
        }

        let mut url = self.bind_endpoint.clone();
        url.query_pairs_mut().extend_pairs(params);
        self.rid += 1;
        url
    }

    pub fn set_gateway_identity(&mut self, client_id: String, session_id: String) {
        self.gateway_client_id = client_id;
        self.gateway_session_id = session_id;
    }

    /// Record the protocol session id; it can only be assigned once
    pub fn assign_sid(&mut self, sid: String) -> Result<(), ChannelError> {
        if let Some(existing) = &self.sid {
            return Err(ChannelError::SidExtraction(format!(
                "session id already assigned ({:?})",
                existing
            )));
        }
        self.sid = Some(sid);
        Ok(())
    }

    /// Advance the acknowledged message id; older ids are ignored
    pub fn observe_message_id(&mut self, id: i64) {
        self.mid = self.mid.max(id);
    }

    pub const fn rid(&self) -> u64 {
        self.rid
    }

    pub const fn mid(&self) -> i64 {
        self.mid
    }

    pub fn sid(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn gateway_client_id(&self) -> &str {
        &self.gateway_client_id
    }

    pub fn gateway_session_id(&self) -> &str {
        &self.gateway_session_id
    }
}
