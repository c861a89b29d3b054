use anyhow::Context;
use gae_channel::{Channel, ChannelConfig, ChannelError, ChannelFactory, ChannelKind};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const ENV_PREFIX: &str = "CHANNEL";
const QUEUE_DEPTH: usize = 64;

fn load_config() -> anyhow::Result<ChannelConfig> {
    #[cfg(feature = "env-file")]
    let config = ChannelConfig::from_env_file(ENV_PREFIX);
    #[cfg(not(feature = "env-file"))]
    let config = ChannelConfig::from_env(ENV_PREFIX);

    config.context("set CHANNEL_HOST, CHANNEL_CLIENT_ID and CHANNEL_TOKEN")
}

/// Stream messages into `sink` until the stream ends, closing it once
/// `interrupt` resolves.
///
/// Returns the stream's own result; task and close failures are reported
/// through the outer error.
async fn pump(
    channel: Arc<dyn Channel>,
    interrupt: impl Future<Output = ()>,
    mut sink: impl FnMut(String),
) -> anyhow::Result<Result<(), ChannelError>> {
    let (tx, mut rx) = mpsc::channel(QUEUE_DEPTH);
    let streamer = channel.clone();
    let mut stream = tokio::spawn(async move { streamer.stream(tx).await });
    tokio::pin!(interrupt);

    // The queue must keep draining while close waits for the last poll
    let mut closing = None;
    let result = loop {
        tokio::select! {
            Some(message) = rx.recv() => sink(message),
            () = &mut interrupt, if closing.is_none() => {
                info!("interrupted, closing channel");
                let closer = channel.clone();
                closing = Some(tokio::spawn(async move { closer.close().await }));
            }
            result = &mut stream => break result?,
        }
    };

    // Messages received before the stream ended
    while let Ok(message) = rx.try_recv() {
        sink(message);
    }

    if let Some(closing) = closing {
        closing.await?.context("closing channel")?;
    }
    Ok(result)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config()?;
    info!(host = %config.host, kind = %ChannelKind::detect(&config.host), "opening channel");
    let channel = ChannelFactory::create(config)?;

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "unable to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    match pump(channel, interrupt, |message| println!("{message}")).await? {
        Ok(()) => Ok(()),
        Err(ChannelError::ReauthRequired) => {
            error!("channel token rejected; request a new token and reconnect");
            std::process::exit(2);
        }
        Err(e) => Err(e).context("channel stream failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gae_channel::core::kernel::{HttpResponse, HttpTransport};
    use gae_channel::DevChannel;
    use reqwest::{StatusCode, Url};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    /// Dev server that always has another message waiting
    #[derive(Default)]
    struct BusyDevServer {
        disconnects: AtomicUsize,
    }

    #[async_trait]
    impl HttpTransport for BusyDevServer {
        async fn get(&self, url: Url) -> Result<HttpResponse, ChannelError> {
            if url.query_pairs().any(|(k, v)| k == "command" && v == "disconnect") {
                self.disconnects.fetch_add(1, Ordering::SeqCst);
            }
            Ok(HttpResponse::from_bytes(StatusCode::OK, "tick"))
        }

        async fn post_form(
            &self,
            _url: Url,
            _form: &[(&str, &str)],
        ) -> Result<HttpResponse, ChannelError> {
            Ok(HttpResponse::from_bytes(StatusCode::OK, ""))
        }
    }

    #[tokio::test]
    async fn test_interrupt_with_full_queue_still_closes() {
        let server = Arc::new(BusyDevServer::default());
        let config = ChannelConfig::new(
            "localhost:8080".to_string(),
            "client".to_string(),
            "token".to_string(),
        );
        let channel: Arc<dyn Channel> =
            Arc::new(DevChannel::with_transport(config, server.clone()).unwrap());

        // Interrupt only once the producer has had time to fill the queue
        let (interrupted_tx, interrupted_rx) = oneshot::channel();
        let mut interrupted_tx = Some(interrupted_tx);
        let mut received = 0;
        let interrupt = async {
            let _ = interrupted_rx.await;
        };

        let result = pump(channel, interrupt, |message| {
            assert_eq!(message, "tick");
            received += 1;
            if received == QUEUE_DEPTH * 2 {
                if let Some(tx) = interrupted_tx.take() {
                    let _ = tx.send(());
                }
            }
        })
        .await
        .unwrap();

        assert!(result.is_ok());
        assert!(received >= QUEUE_DEPTH * 2);
        assert_eq!(server.disconnects.load(Ordering::SeqCst), 1);
    }
}
