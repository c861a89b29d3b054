use super::session::ChannelSession;
use crate::core::errors::ChannelError;
use crate::core::kernel::quasi_json::{self, QuasiValue};
use crate::core::kernel::BodyStream;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Largest packet the decoder accepts
pub const MAX_PACKET_LEN: usize = 16 * 1024 * 1024;

/// Longest length line tolerated before the frame is considered corrupt
const MAX_LENGTH_LINE: usize = 64;

/// Splits a response body into length-prefixed packets as bytes arrive
pub struct PacketReader {
    body: BodyStream,
    buffer: Vec<u8>,
}

impl PacketReader {
    pub fn new(body: BodyStream) -> Self {
        Self {
            body,
            buffer: Vec::new(),
        }
    }

    /// Next packet body, or `None` once the stream ends cleanly
    pub async fn next_packet(&mut self) -> Result<Option<Vec<u8>>, ChannelError> {
        loop {
            let Some(line) = self.read_line().await? else {
                return Ok(None);
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let size: usize = line.parse().map_err(|e| {
                ChannelError::FramingError(format!("size {:?} is not a valid number: {}", line, e))
            })?;
            if size > MAX_PACKET_LEN {
                return Err(ChannelError::FramingError(format!(
                    "packet of {} bytes exceeds limit of {}",
                    size, MAX_PACKET_LEN
                )));
            }

            return self.read_exact(size).await.map(Some);
        }
    }

    async fn fill(&mut self) -> Result<bool, ChannelError> {
        match self.body.next().await {
            Some(chunk) => {
                self.buffer.extend_from_slice(&chunk?);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn read_line(&mut self) -> Result<Option<String>, ChannelError> {
        let mut scanned = 0;
        loop {
            if let Some(pos) = self.buffer[scanned..].iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=scanned + pos).collect();
                return Ok(Some(String::from_utf8_lossy(&line).into_owned()));
            }
            scanned = self.buffer.len();
            if scanned > MAX_LENGTH_LINE {
                return Err(ChannelError::FramingError(
                    "length line is too long".to_string(),
                ));
            }
            if !self.fill().await? {
                // A trailing partial line ends the body like EOF does
                return Ok(None);
            }
        }
    }

    async fn read_exact(&mut self, len: usize) -> Result<Vec<u8>, ChannelError> {
        while self.buffer.len() < len {
            if !self.fill().await? {
                return Err(ChannelError::FramingError(format!(
                    "reading packet: wanted {} bytes, body ended after {}",
                    len,
                    self.buffer.len()
                )));
            }
        }
        Ok(self.buffer.drain(..len).collect())
    }
}

/// One `[id, body]` entry of a packet
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMessage {
    pub id: Option<i64>,
    pub body: Value,
}

impl ChannelMessage {
    fn from_pair(pair: Value) -> Option<Self> {
        let Value::Array(mut pair) = pair else {
            return None;
        };
        if pair.len() != 2 {
            return None;
        }
        let body = pair.pop()?;
        let id = pair.pop()?;
        let id = id
            .as_i64()
            .or_else(|| id.as_f64().filter(|f| f.is_finite()).map(|f| f as i64));
        Some(Self { id, body })
    }

    /// Application payload, if this is a `["c", [_, ["ae", payload]]]` message
    pub fn payload(&self) -> Option<&str> {
        extract_payload(&self.body)
    }
}

/// Pull the application payload out of a message body.
///
/// Any other shape yields `None`: unknown gateway message kinds are ignored.
pub fn extract_payload(body: &Value) -> Option<&str> {
    if !body.tagged(0, "c") {
        return None;
    }
    let command = body.array_at(1)?;
    let payload = command.array_at(1)?;
    if !payload.tagged(0, "ae") {
        return None;
    }
    payload.str_at(1)
}

/// Repair and split one packet into its messages
pub fn decode_packet(raw: &[u8]) -> Result<Vec<ChannelMessage>, ChannelError> {
    match quasi_json::parse(raw)? {
        Value::Array(pairs) => Ok(pairs
            .into_iter()
            .filter_map(ChannelMessage::from_pair)
            .collect()),
        other => Err(ChannelError::decode(other.to_string(), "packet is not an array")),
    }
}

/// Decode a poll response body and deliver its payloads in order.
///
/// Updates the session's `mid` for every numbered message and resets the
/// backoff on each delivery. Sending blocks while `output` is full.
pub async fn deliver(
    body: BodyStream,
    session: &mut ChannelSession,
    output: &mpsc::Sender<String>,
) -> Result<usize, ChannelError> {
    let mut reader = PacketReader::new(body);
    let mut delivered = 0;

    while let Some(packet) = reader.next_packet().await? {
        let messages = decode_packet(&packet)?;
        debug!(bytes = packet.len(), count = messages.len(), "examining packet");

        for message in messages {
            match message.id {
                Some(id) => session.observe_message_id(id),
                None => warn!(body = %message.body, "message id is not a number"),
            }

            let Some(payload) = message.payload() else {
                trace!(body = %message.body, "ignoring non-application message");
                continue;
            };

            trace!(payload, "incoming message");
            output
                .send(payload.to_owned())
                .await
                .map_err(|_| ChannelError::OutputClosed)?;
            session.backoff.reset();
            delivered += 1;
        }
    }

    Ok(delivered)
}
