//! STOMP 1.2 frames carried as WebSocket text messages.

use std::fmt;
use std::time::Duration;

/// A heartbeat is a bare end-of-line between frames.
pub const HEARTBEAT: &str = "\n";

pub const ACCEPT_VERSION: &str = "1.2";

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Receipt,
    Error,
    Disconnect,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Send => "SEND",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
            Self::Disconnect => "DISCONNECT",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "CONNECT" | "STOMP" => Self::Connect,
            "CONNECTED" => Self::Connected,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "SEND" => Self::Send,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            "DISCONNECT" => Self::Disconnect,
            _ => return None,
        })
    }

    /// CONNECT and CONNECTED headers are never escaped.
    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    Truncated,
    UnknownCommand(String),
    MalformedHeader(String),
    InvalidEscape(String),
    BadContentLength(String),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "frame is truncated"),
            Self::UnknownCommand(c) => write!(f, "unknown command {c:?}"),
            Self::MalformedHeader(h) => write!(f, "malformed header {h:?}"),
            Self::InvalidEscape(h) => write!(f, "invalid escape in {h:?}"),
            Self::BadContentLength(v) => write!(f, "bad content-length {v:?}"),
        }
    }
}

impl std::error::Error for FrameError {}

// ---------------------------------------------------------------------------
// Heartbeats
// ---------------------------------------------------------------------------

/// A `heart-beat` header: how often this side sends, and how often it wants
/// to receive. Zero disables that direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    pub outgoing: Duration,
    pub incoming: Duration,
}

impl HeartBeat {
    pub fn symmetric(interval: Duration) -> Self {
        Self {
            outgoing: interval,
            incoming: interval,
        }
    }

    pub fn to_header(self) -> String {
        format!(
            "{},{}",
            self.outgoing.as_millis(),
            self.incoming.as_millis()
        )
    }

    /// Parse a `heart-beat` header. A missing or malformed header disables
    /// heartbeats in both directions.
    pub fn from_header(value: Option<&str>) -> Self {
        let parse = |v: &str| v.trim().parse::<u64>().ok().map(Duration::from_millis);
        match value.and_then(|v| v.split_once(',')) {
            Some((out, inc)) => Self {
                outgoing: parse(out).unwrap_or_default(),
                incoming: parse(inc).unwrap_or_default(),
            },
            None => Self::default(),
        }
    }

    /// Negotiate the effective client-side intervals from what the client
    /// offered and what the server answered in CONNECTED.
    pub fn negotiate(client: Self, server: Self) -> Self {
        let pick = |ours: Duration, theirs: Duration| {
            if ours.is_zero() || theirs.is_zero() {
                Duration::ZERO
            } else {
                ours.max(theirs)
            }
        };
        Self {
            outgoing: pick(client.outgoing, server.incoming),
            incoming: pick(client.incoming, server.outgoing),
        }
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Look up a header. When a header repeats, the first value wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Build the CONNECT frame carrying the bearer credential.
    pub fn connect(host: &str, token: &str, heartbeat: HeartBeat) -> Self {
        Self::new(Command::Connect)
            .with_header("accept-version", ACCEPT_VERSION)
            .with_header("host", host)
            .with_header("heart-beat", heartbeat.to_header())
            .with_header("Authorization", format!("Bearer {token}"))
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Self::new(Command::Unsubscribe).with_header("id", id)
    }

    pub fn disconnect() -> Self {
        Self::new(Command::Disconnect)
    }

    /// Serialize to wire text, NUL-terminated.
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        let escape_headers = self.command.escapes_headers();
        for (name, value) in &self.headers {
            if escape_headers {
                out.push_str(&escape(name));
                out.push(':');
                out.push_str(&escape(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.header("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

/// Parse one frame from a text message. Returns `Ok(None)` for heartbeats.
pub fn decode(text: &str) -> Result<Option<Frame>, FrameError> {
    let trimmed = text.trim_start_matches(['\r', '\n']);
    if trimmed.trim_end_matches(['\0', '\r', '\n']).is_empty() {
        return Ok(None);
    }

    let (line, mut rest) = next_line(trimmed).ok_or(FrameError::Truncated)?;
    let command =
        Command::parse(line).ok_or_else(|| FrameError::UnknownCommand(line.to_string()))?;

    let mut headers = Vec::new();
    loop {
        let (line, after) = next_line(rest).ok_or(FrameError::Truncated)?;
        rest = after;
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
        if command.escapes_headers() {
            headers.push((unescape(name)?, unescape(value)?));
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| {
            v.parse::<usize>()
                .map_err(|_| FrameError::BadContentLength(v.clone()))
        })
        .transpose()?;

    let body = match content_length {
        Some(len) => rest.get(..len).ok_or(FrameError::Truncated)?,
        None => rest.split('\0').next().unwrap_or_default(),
    };

    Ok(Some(Frame {
        command,
        headers,
        body: body.to_string(),
    }))
}

fn next_line(s: &str) -> Option<(&str, &str)> {
    let idx = s.find('\n')?;
    let line = &s[..idx];
    Some((line.strip_suffix('\r').unwrap_or(line), &s[idx + 1..]))
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(s: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(s.to_string())),
        }
    }
    Ok(out)
}
