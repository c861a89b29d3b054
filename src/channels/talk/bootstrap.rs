use super::session::ChannelSession;
use super::token::random_token;
use crate::core::errors::ChannelError;
use crate::core::kernel::quasi_json::{self, QuasiValue};
use crate::core::kernel::HttpTransport;
use regex::Regex;
use reqwest::StatusCode;
use serde_json::json;
use std::str::Chars;
use std::sync::LazyLock;
use tracing::{info, instrument, warn};

/// The gateway page hands its session identifiers to this constructor call
static SETUP_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ms)chat\.WcsDataClient\(([^\)]+)\)").expect("setup call pattern is valid")
});

/// Number of string arguments the setup call carries
pub const SETUP_PARAM_COUNT: usize = 7;

/// Identifiers issued by the gateway during setup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayIdentity {
    pub client_id: String,
    pub session_id: String,
}

/// 400 and 401 mean the token is no longer accepted
pub fn ensure_authorized(status: StatusCode) -> Result<(), ChannelError> {
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => Err(ChannelError::ReauthRequired),
        _ => Ok(()),
    }
}

/// Extract the gateway identity from the setup page and verify the echoed token
pub fn parse_setup_call(body: &str, token: &str) -> Result<GatewayIdentity, ChannelError> {
    let args = SETUP_CALL
        .captures(body)
        .and_then(|captures| captures.get(1))
        .ok_or(ChannelError::SetupNotFound)?
        .as_str();

    let mut params = Vec::with_capacity(SETUP_PARAM_COUNT);
    for (line_no, line) in args.split('\n').enumerate() {
        let line = line.trim().trim_end_matches(',');
        if line.is_empty() {
            continue;
        }
        let param = unquote(line).map_err(|reason| ChannelError::MalformedParam {
            line: line_no,
            reason,
        })?;
        params.push(param);
    }

    let [_, _, client_id, session_id, _, _, echoed_token]: [String; SETUP_PARAM_COUNT] = params
        .try_into()
        .map_err(|params: Vec<String>| ChannelError::ParamCountMismatch {
            got: params.len(),
            want: SETUP_PARAM_COUNT,
        })?;

    if echoed_token != token {
        return Err(ChannelError::TokenMismatch);
    }

    Ok(GatewayIdentity {
        client_id,
        session_id,
    })
}

/// Unquote a double-quoted string literal as emitted by the gateway's script
pub fn unquote(literal: &str) -> Result<String, String> {
    let inner = literal
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .ok_or_else(|| format!("{:?} is not a double-quoted literal", literal))?;

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Err("unescaped quote inside literal".to_string()),
            '\\' => out.push(unescape(&mut chars)?),
            c => out.push(c),
        }
    }
    Ok(out)
}

fn unescape(chars: &mut Chars<'_>) -> Result<char, String> {
    let escape = chars.next().ok_or("trailing backslash")?;
    let c = match escape {
        'a' => '\x07',
        'b' => '\x08',
        'f' => '\x0c',
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'v' => '\x0b',
        '\\' | '\'' | '"' | '/' => escape,
        'x' => char::from(hex_digits(chars, 2)? as u8),
        'u' => {
            let unit = hex_digits(chars, 4)?;
            if (0xD800..0xDC00).contains(&unit) {
                // High surrogate: the low half must follow as another \u escape
                let low = match (chars.next(), chars.next()) {
                    (Some('\\'), Some('u')) => hex_digits(chars, 4)?,
                    _ => return Err(format!("unpaired surrogate \\u{:04x}", unit)),
                };
                if !(0xDC00..0xE000).contains(&low) {
                    return Err(format!("invalid low surrogate \\u{:04x}", low));
                }
                let code = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
                char::from_u32(code).ok_or_else(|| format!("invalid code point {:#x}", code))?
            } else {
                char::from_u32(unit).ok_or_else(|| format!("invalid code point \\u{:04x}", unit))?
            }
        }
        'U' => {
            let code = hex_digits(chars, 8)?;
            char::from_u32(code).ok_or_else(|| format!("invalid code point {:#x}", code))?
        }
        other => return Err(format!("unknown escape \\{}", other)),
    };
    Ok(c)
}

fn hex_digits(chars: &mut Chars<'_>, count: usize) -> Result<u32, String> {
    let mut value = 0u32;
    for _ in 0..count {
        let digit = chars
            .next()
            .and_then(|c| c.to_digit(16))
            .ok_or_else(|| format!("expected {} hex digits", count))?;
        value = value * 16 + digit;
    }
    Ok(value)
}

/// Pull the protocol session id out of the first bind response.
///
/// Expected shape after repair: `[[_, ["c", sid]], ...]`.
pub fn parse_sid(raw: &[u8]) -> Result<String, ChannelError> {
    let value = quasi_json::parse(raw)?;

    let entry = value
        .array_at(0)
        .ok_or_else(|| ChannelError::SidExtraction(format!("item 0 is not a list in {}", value)))?;
    let list = entry
        .array_at(1)
        .ok_or_else(|| ChannelError::SidExtraction(format!("item 0 has no command list in {}", value)))?;
    let (Some(key), Some(sid)) = (list.str_at(0), list.str_at(1)) else {
        return Err(ChannelError::SidExtraction(format!(
            "command list is not a string pair in {}",
            value
        )));
    };
    if key != "c" {
        return Err(ChannelError::SidExtraction(format!(
            "item 0 key = {:?}, want \"c\"",
            key
        )));
    }
    Ok(sid.to_string())
}

/// Register with the gateway and learn its client and session ids
#[instrument(skip_all)]
pub async fn initialize(
    session: &mut ChannelSession,
    transport: &dyn HttpTransport,
) -> Result<(), ChannelError> {
    let cross_page_config = json!({
        "cn": random_token(10),
        "tp": "null",
        "lpu": session.gateway_url("xpc_blank")?.to_string(),
        "ppu": session.app_blank_page(),
    });

    let mut url = session.gateway_url("d")?;
    url.query_pairs_mut()
        .append_pair("token", session.token())
        .append_pair("xpc", &cross_page_config.to_string());

    let response = transport.get(url).await?;
    ensure_authorized(response.status)?;
    let body = response.text().await?;

    let identity = parse_setup_call(&body, session.token())?;
    info!(
        gateway_session = %identity.session_id,
        gateway_client = %identity.client_id,
        "talk session registered"
    );
    session.set_gateway_identity(identity.client_id, identity.session_id);
    Ok(())
}

/// Open the bind channel and record the protocol session id
#[instrument(skip_all)]
pub async fn fetch_sid(
    session: &mut ChannelSession,
    transport: &dyn HttpTransport,
) -> Result<(), ChannelError> {
    let url = session.bind_url(&[("CVER", "1")]);
    let response = transport.post_form(url, &[("count", "0")]).await?;
    ensure_authorized(response.status)?;
    let raw = response.bytes().await?;

    let sid = parse_sid(&raw)?;
    info!(sid = %sid, "received sid");
    session.assign_sid(sid)
}

/// Attach this client to the bound session
#[instrument(skip_all)]
pub async fn connect(
    session: &mut ChannelSession,
    transport: &dyn HttpTransport,
) -> Result<(), ChannelError> {
    let aid = session.mid().to_string();
    let url = session.bind_url(&[("CVER", "1"), ("AID", aid.as_str())]);
    let gateway_client_id = session.gateway_client_id().to_string();
    let form = [
        ("count", "1"),
        ("ofs", "0"),
        ("req0_m", r#"["connect-add-client"]"#),
        ("req0_c", gateway_client_id.as_str()),
        ("req0__sc", "c"),
    ];

    let response = transport.post_form(url, &form).await?;
    ensure_authorized(response.status)?;
    if !response.status.is_success() {
        warn!(status = %response.status, "connect returned non-success status");
    }
    info!(client_id = %session.client_id(), "connected");
    Ok(())
}
