//! Transport layer shared by the channel backends.
//!
//! - [`http`]: the [`HttpTransport`] seam and its reqwest implementation
//! - [`quasi_json`]: repair and checked inspection of the gateway's JSON dialect
//!
//! Backends depend on `Arc<dyn HttpTransport>` so tests can script the
//! gateway without a network.

pub mod http;
pub mod quasi_json;

pub use http::{
    BodyStream, HttpResponse, HttpTransport, ReqwestTransport, TransportBuilder, TransportConfig,
};
pub use quasi_json::QuasiValue;
