//! Combined log format rendering and request field extraction.
//!
//! The line produced for every request has the shape
//!
//! ```text
//! <host> - - [<dd>/<Mon>/<yyyy>:<HH:MM:SS> <zone>] "<METHOD> <uri> <proto>" <status> <size> "<referer>" "<user-agent>" <seconds>
//! ```

use axum::{
    extract::{ConnectInfo, OriginalUri},
    http::{header, HeaderMap, HeaderName, Method, Request, StatusCode, Version},
};
use chrono::{DateTime, Utc};
use std::{
    fmt::{self, Write as _},
    net::SocketAddr,
    time::Duration,
};

/// Remote address of the peer as reported by the listener.
///
/// Insert this extension when the peer address is not a [`SocketAddr`] (unix
/// domain sockets, addresses forwarded by a proxy). It takes precedence over
/// axum's [`ConnectInfo<SocketAddr>`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteAddr(pub String);

/// Error returned by [`split_host_port`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddrError {
    #[error("address {0}: missing port in address")]
    MissingPort(String),
    #[error("address {0}: too many colons in address")]
    TooManyColons(String),
    #[error("address {0}: missing ']' in address")]
    MissingBracket(String),
    #[error("address {0}: unexpected '{1}' in address")]
    UnexpectedBracket(String, char),
}

/// Split `host:port`, `[v6-host]:port` or `[v6-host%zone]:port` into host
/// and port.
///
/// # Examples
///
/// ```rust
/// use combined_log::format::split_host_port;
///
/// assert_eq!(split_host_port("10.0.0.5:4444").unwrap(), ("10.0.0.5", "4444"));
/// assert_eq!(split_host_port("[::1]:80").unwrap(), ("::1", "80"));
/// assert!(split_host_port("/run/app.sock").is_err());
/// ```
pub fn split_host_port(hostport: &str) -> Result<(&str, &str), AddrError> {
    let err = |make: fn(String) -> AddrError| make(hostport.to_string());

    let colon = hostport.rfind(':').ok_or_else(|| err(AddrError::MissingPort))?;

    let (host, open_from, close_from) = if hostport.starts_with('[') {
        let end = hostport.find(']').ok_or_else(|| err(AddrError::MissingBracket))?;
        match end + 1 {
            after if after == hostport.len() => return Err(err(AddrError::MissingPort)),
            after if after == colon => {}
            after => {
                // Either ']' is followed by a colon that is not the last
                // one, or by something that is not a colon at all.
                return Err(if hostport.as_bytes()[after] == b':' {
                    err(AddrError::TooManyColons)
                } else {
                    err(AddrError::MissingPort)
                });
            }
        }
        (&hostport[1..end], 1, end + 1)
    } else {
        let host = &hostport[..colon];
        if host.contains(':') {
            return Err(err(AddrError::TooManyColons));
        }
        (host, 0, 0)
    };

    if hostport[open_from..].contains('[') {
        return Err(AddrError::UnexpectedBracket(hostport.to_string(), '['));
    }
    if hostport[close_from..].contains(']') {
        return Err(AddrError::UnexpectedBracket(hostport.to_string(), ']'));
    }

    Ok((host, &hostport[colon + 1..]))
}

/// Raw remote address of the request, if the host server recorded one.
pub fn remote_addr<B>(request: &Request<B>) -> Option<String> {
    let extensions = request.extensions();
    if let Some(RemoteAddr(addr)) = extensions.get::<RemoteAddr>() {
        return Some(addr.clone());
    }
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
}

/// Client host: the remote address without its port, or the raw address when
/// it has no parseable port. `-` when no address is known at all.
pub fn host<B>(request: &Request<B>) -> String {
    match remote_addr(request) {
        Some(raw) => match split_host_port(&raw) {
            Ok((host, _)) => host.to_string(),
            Err(_) => raw,
        },
        None => "-".to_string(),
    }
}

/// Request target as it appeared on the request line.
///
/// The URI recorded by the outermost router ([`OriginalUri`]) wins over the
/// request's own, which `Router::nest` strips. HTTP/2 and HTTP/3 carry the
/// target in `:path`, so only the path and query are logged for them; their
/// `CONNECT` requests log the Host field instead. HTTP/1.x targets are logged
/// as sent, absolute form included. An empty value falls back to the path and
/// query of the parsed URI.
pub fn uri<B>(request: &Request<B>) -> String {
    let target = request
        .extensions()
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri)
        .unwrap_or_else(|| request.uri());
    let multiplexed = request.version() == Version::HTTP_2 || request.version() == Version::HTTP_3;

    let mut uri = if multiplexed && request.method() == Method::CONNECT {
        request
            .headers()
            .get(header::HOST)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .unwrap_or_default()
    } else if multiplexed {
        target
            .path_and_query()
            .map(|path_and_query| path_and_query.as_str().to_string())
            .unwrap_or_default()
    } else {
        target.to_string()
    };

    if uri.is_empty() {
        uri = match (target.path_and_query(), target.authority()) {
            (Some(path_and_query), _) => path_and_query.as_str().to_string(),
            (None, Some(authority)) => authority.as_str().to_string(),
            (None, None) => "/".to_string(),
        };
    }
    uri
}

/// Protocol string as written on the request line.
pub fn proto(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2.0",
        Version::HTTP_3 => "HTTP/3.0",
        _ => "HTTP/?",
    }
}

/// Raw header bytes, or `-` when the field is missing or empty.
fn header_or_dash(headers: &HeaderMap, name: HeaderName) -> Vec<u8> {
    headers
        .get(name)
        .map(|v| v.as_bytes())
        .filter(|v| !v.is_empty())
        .unwrap_or(b"-")
        .to_vec()
}

/// Referer header bytes, or `-`.
pub fn referer(headers: &HeaderMap) -> Vec<u8> {
    header_or_dash(headers, header::REFERER)
}

/// User-Agent header bytes, or `-`.
pub fn user_agent(headers: &HeaderMap) -> Vec<u8> {
    header_or_dash(headers, header::USER_AGENT)
}

/// Everything that goes into one access line.
///
/// Built from the request when handling starts, completed with status, size
/// and finish time once the downstream handler is done.
#[derive(Debug, Clone)]
pub struct AccessRecord {
    pub host: String,
    pub method: Method,
    pub uri: String,
    pub proto: &'static str,
    /// Header bytes as received; quoted when rendered
    pub referer: Vec<u8>,
    pub user_agent: Vec<u8>,
    /// 200 unless the handler set something else
    pub status: StatusCode,
    /// Response bytes written
    pub size: u64,
    /// When handling started
    pub started: DateTime<Utc>,
    /// When the handler returned; this is the timestamp shown in the line
    pub finished: DateTime<Utc>,
}

impl AccessRecord {
    /// Capture the request side of the record at `started`.
    pub fn from_request<B>(request: &Request<B>, started: DateTime<Utc>) -> Self {
        Self {
            host: host(request),
            method: request.method().clone(),
            uri: uri(request),
            proto: proto(request.version()),
            referer: referer(request.headers()),
            user_agent: user_agent(request.headers()),
            status: StatusCode::OK,
            size: 0,
            started,
            finished: started,
        }
    }

    /// Fill in the response side.
    pub fn finish(&mut self, status: StatusCode, size: u64, finished: DateTime<Utc>) {
        self.status = status;
        self.size = size;
        self.finished = finished;
    }

    /// Time between start and finish; zero if the clock went backwards.
    pub fn duration(&self) -> Duration {
        (self.finished - self.started).to_std().unwrap_or_default()
    }
}

impl fmt::Display for AccessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - - [{}] \"{} {} {}\" {} {} ",
            self.host,
            self.finished.format("%d/%b/%Y:%H:%M:%S %z"),
            self.method,
            self.uri,
            self.proto,
            self.status.as_u16(),
            self.size,
        )?;
        write_quoted(f, &self.referer)?;
        f.write_char(' ')?;
        write_quoted(f, &self.user_agent)?;
        write!(f, " {:.4}", self.duration().as_secs_f64())
    }
}

/// Double-quoted string in Go `%q` style.
///
/// Printable characters are written as is. Quotes, backslashes and the
/// C-style control escapes get a backslash, bytes that are not valid UTF-8
/// become `\xNN`, and other non-printable characters become `\xNN`,
/// `\uNNNN` or `\UNNNNNNNN` by size.
fn write_quoted(f: &mut impl fmt::Write, value: &[u8]) -> fmt::Result {
    f.write_char('"')?;
    for chunk in value.utf8_chunks() {
        for c in chunk.valid().chars() {
            match c {
                '"' => f.write_str("\\\"")?,
                '\\' => f.write_str("\\\\")?,
                '\u{7}' => f.write_str("\\a")?,
                '\u{8}' => f.write_str("\\b")?,
                '\u{c}' => f.write_str("\\f")?,
                '\n' => f.write_str("\\n")?,
                '\r' => f.write_str("\\r")?,
                '\t' => f.write_str("\\t")?,
                '\u{b}' => f.write_str("\\v")?,
                c if is_printable(c) => f.write_char(c)?,
                c if c < ' ' || c == '\u{7f}' => write!(f, "\\x{:02x}", c as u32)?,
                c if (c as u32) < 0x10000 => write!(f, "\\u{:04x}", c as u32)?,
                c => write!(f, "\\U{:08x}", c as u32)?,
            }
        }
        for byte in chunk.invalid() {
            write!(f, "\\x{byte:02x}")?;
        }
    }
    f.write_char('"')
}

/// Letters, marks, numbers, punctuation, symbols and the ASCII space.
///
/// Controls, separators other than U+0020, format characters, private use
/// code points and noncharacters are not printable.
fn is_printable(c: char) -> bool {
    if c == ' ' {
        return true;
    }
    if c.is_control() || c.is_whitespace() {
        return false;
    }
    !matches!(
        c,
        '\u{ad}'
            | '\u{600}'..='\u{605}'
            | '\u{61c}'
            | '\u{6dd}'
            | '\u{70f}'
            | '\u{180e}'
            | '\u{200b}'..='\u{200f}'
            | '\u{202a}'..='\u{202e}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{206f}'
            | '\u{e000}'..='\u{f8ff}'
            | '\u{fdd0}'..='\u{fdef}'
            | '\u{feff}'
            | '\u{fff9}'..='\u{fffb}'
            | '\u{fffe}'..='\u{ffff}'
            | '\u{110bd}'
            | '\u{1d173}'..='\u{1d17a}'
            | '\u{e0001}'
            | '\u{e0020}'..='\u{e007f}'
            | '\u{f0000}'..='\u{10ffff}'
    )
}
