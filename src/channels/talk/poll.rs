use super::bootstrap::ensure_authorized;
use super::codec;
use super::session::ChannelSession;
use crate::core::errors::ChannelError;
use crate::core::kernel::HttpTransport;
use crate::core::shutdown::{RunGuard, ShutdownSignal};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Drive the long poll until a stop is requested or a fatal error occurs.
///
/// Transport failures and token rejection end the loop; non-success statuses
/// and corrupt bodies are logged and followed by a fresh poll. A stop request
/// is only observed between rounds, so an outstanding poll always completes.
pub async fn poll_loop(
    session: &mut ChannelSession,
    transport: &dyn HttpTransport,
    output: &mpsc::Sender<String>,
    shutdown: &ShutdownSignal,
    guard: &mut RunGuard<'_>,
) -> Result<(), ChannelError> {
    loop {
        if shutdown.is_stop_requested() {
            info!(rid = session.rid(), mid = session.mid(), "stop requested, leaving poll loop");
            guard.set_farewell(session.bind_url(&[("TYPE", "terminate")]));
            return Ok(());
        }

        let delay = session.backoff.next_delay();
        debug!(?delay, "waiting before poll");
        sleep(delay).await;

        let aid = session.mid().to_string();
        let url = session.bind_url(&[
            ("CI", "0"),
            ("AID", aid.as_str()),
            ("TYPE", "xmlhttp"),
            ("RID", "rpc"),
        ]);
        debug!(aid = %aid, "polling");
        let response = transport.get(url).await?;

        if !response.status.is_success() {
            let status = response.status;
            ensure_authorized(status)?;
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, "poll error");
            continue;
        }

        match codec::deliver(response.body, session, output).await {
            Ok(delivered) => debug!(delivered, mid = session.mid(), "poll round complete"),
            Err(e) if e.is_transient_decode() => {
                // Rest of the body is dropped; the next round starts a fresh request
                warn!(error = %e, "decoding error");
            }
            Err(e) => return Err(e),
        }
    }
}
