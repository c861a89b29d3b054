#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use gae_channel::core::errors::ChannelError;
use gae_channel::core::kernel::{HttpResponse, HttpTransport};
use reqwest::{StatusCode, Url};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Canned reply for the next request
pub enum Reply {
    Respond(u16, String),
    /// Respond only after the given delay, like a long poll with nothing to say
    Held(Duration, u16, String),
    Fail(String),
}

/// A request as seen by the scripted transport
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: &'static str,
    pub url: Url,
    pub form: Vec<(String, String)>,
    pub at: Instant,
}

impl Recorded {
    pub fn param(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Transport that answers from a fixed script and records every request.
///
/// Once the script runs out, requests fail with a network error, which
/// ends any stream still running.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<Recorded>>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    async fn answer(
        &self,
        method: &'static str,
        url: Url,
        form: Vec<(String, String)>,
    ) -> Result<HttpResponse, ChannelError> {
        self.requests.lock().unwrap().push(Recorded {
            method,
            url,
            form,
            at: Instant::now(),
        });
        let reply = self.replies.lock().unwrap().pop_front();

        match reply {
            Some(Reply::Respond(status, body)) => Ok(response(status, body)),
            Some(Reply::Held(delay, status, body)) => {
                sleep(delay).await;
                Ok(response(status, body))
            }
            Some(Reply::Fail(reason)) => Err(ChannelError::NetworkError(reason)),
            None => Err(ChannelError::NetworkError("script exhausted".to_string())),
        }
    }
}

fn response(status: u16, body: String) -> HttpResponse {
    HttpResponse::from_bytes(StatusCode::from_u16(status).unwrap(), Bytes::from(body))
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(&self, url: Url) -> Result<HttpResponse, ChannelError> {
        self.answer("GET", url, Vec::new()).await
    }

    async fn post_form(
        &self,
        url: Url,
        form: &[(&str, &str)],
    ) -> Result<HttpResponse, ChannelError> {
        let form = form
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.answer("POST", url, form).await
    }
}

/// Gateway setup page carrying the given number of string arguments
pub fn setup_page(args: &[&str]) -> String {
    let lines: Vec<String> = args.iter().map(|a| format!("    \"{}\"", a)).collect();
    format!(
        "<html><body><script>\nvar c = new chat.WcsDataClient(\n{}\n);\nc.start();\n</script></body></html>",
        lines.join(",\n")
    )
}

/// Setup page for a gateway session echoing `token`
pub fn valid_setup_page(token: &str) -> String {
    setup_page(&[
        "https://talkgadget.google.com/talkgadget/",
        "",
        "GCLID-1",
        "GSESS-1",
        "",
        "",
        token,
    ])
}

/// Response body of the first bind request
pub fn sid_body(sid: &str) -> String {
    let packet = format!("[[0,[\"c\",\"{}\",\"\",8]]]", sid);
    format!("{}\n{}\n", packet.len(), packet)
}

/// Length-prefix each packet the way the gateway frames poll responses
pub fn framed(packets: &[&str]) -> String {
    packets
        .iter()
        .map(|p| format!("{}\n{}\n", p.len(), p))
        .collect()
}

/// A packet carrying one application message
pub fn message_packet(id: i64, payload: &str) -> String {
    format!("[[{},[\"c\",[\"GCLID-1\",[\"ae\",\"{}\"]]]]]", id, payload)
}
