// (c) 2024 Ross Younger

//! Session upgrade exchange
//!
//! The client opens a bidirectional stream and sends a request head:
//!
//! ```text
//! CONNECT /webtransport HTTP/3\r\n
//! host: example.org:443\r\n
//! protocol: webtransport\r\n
//! \r\n
//! ```
//!
//! The server answers with a response head such as `HTTP/3 200 OK\r\n\r\n`.
//! Header names are case-insensitive. Neither head carries a body; the stream stays
//! open for as long as the session exists.

use std::fmt::Display;

use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncReadExt as _};

/// Version token carried in both heads
pub const VERSION: &str = "HTTP/3";
/// Method used to request a session
pub const METHOD: &str = "CONNECT";
/// Value of the `protocol` header
pub const PROTOCOL: &str = "webtransport";
/// Upper bound on the size of a head, including its terminating blank line
pub const MAX_HEAD_SIZE: usize = 16 * 1024;

/// Problems with a request or response head
#[derive(Debug, thiserror::Error)]
pub enum HeadError {
    /// The head could not be parsed
    #[error("malformed head: {0}")]
    Malformed(String),
    /// The stream ended before the blank line that terminates the head
    #[error("stream ended inside the head")]
    Incomplete,
    /// The head did not end within [`MAX_HEAD_SIZE`] bytes
    #[error("head exceeds {MAX_HEAD_SIZE} bytes")]
    TooLarge,
    /// I/O error reading the head
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn malformed<S: Into<String>>(why: S) -> HeadError {
    HeadError::Malformed(why.into())
}

/// A response status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    /// 200 OK
    pub const OK: Self = Self(200);
    /// 400 Bad Request
    pub const BAD_REQUEST: Self = Self(400);
    /// 404 Not Found
    pub const NOT_FOUND: Self = Self(404);
    /// 405 Method Not Allowed
    pub const METHOD_NOT_ALLOWED: Self = Self(405);
    /// 500 Internal Server Error
    pub const INTERNAL_SERVER_ERROR: Self = Self(500);

    /// Validating constructor; status codes have three digits
    #[must_use]
    pub fn new(code: u16) -> Option<Self> {
        (100..=999).contains(&code).then_some(Self(code))
    }
    /// Numeric value
    #[must_use]
    pub fn as_u16(self) -> u16 {
        self.0
    }
    /// Is this a 2xx code?
    #[must_use]
    pub fn is_success(self) -> bool {
        (200..300).contains(&self.0)
    }
    /// Canonical reason phrase, if we know one
    #[must_use]
    pub fn reason(self) -> &'static str {
        match self.0 {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            405 => "Method Not Allowed",
            500 => "Internal Server Error",
            _ => "",
        }
    }
}

impl Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = self.reason();
        if reason.is_empty() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "{} {reason}", self.0)
        }
    }
}

/// Header fields, in the order they were received
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    /// Looks up a header by case-insensitive name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
    /// Adds a header. Names are stored in lower case.
    pub fn insert<N: Into<String>, V: Into<String>>(&mut self, name: N, value: V) {
        let mut name = name.into();
        name.make_ascii_lowercase();
        self.0.push((name, value.into()));
    }
    /// Iterates over (name, value) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    fn parse_line(&mut self, line: &str) -> Result<(), HeadError> {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| malformed(format!("header line without a colon: {line:?}")))?;
        let name = name.trim();
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(malformed(format!("invalid header name {name:?}")));
        }
        self.insert(name, value.trim());
        Ok(())
    }

    fn encode_into(&self, out: &mut String) -> Result<(), HeadError> {
        for (name, value) in &self.0 {
            check_field(name)?;
            check_field(value)?;
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        Ok(())
    }
}

fn check_field(field: &str) -> Result<(), HeadError> {
    if field.contains(['\r', '\n']) {
        Err(malformed(format!("line terminator inside {field:?}")))
    } else {
        Ok(())
    }
}

/// The head of a session request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    /// Request method; a session request uses [`METHOD`]
    pub method: String,
    /// Target path, e.g. `/webtransport`
    pub path: String,
    /// Header fields
    pub headers: Headers,
}

impl RequestHead {
    /// Creates a session request for the given authority (`host:port`) and path
    #[must_use]
    pub fn connect(authority: &str, path: &str) -> Self {
        let mut headers = Headers::default();
        headers.insert("host", authority);
        headers.insert("protocol", PROTOCOL);
        Self {
            method: METHOD.to_string(),
            path: path.to_string(),
            headers,
        }
    }

    /// The `host` header, if present
    #[must_use]
    pub fn authority(&self) -> Option<&str> {
        self.headers.get("host")
    }

    /// The `protocol` header, if present
    #[must_use]
    pub fn protocol(&self) -> Option<&str> {
        self.headers.get("protocol")
    }

    /// Serialises the head, including the terminating blank line
    pub fn encode(&self) -> Result<Vec<u8>, HeadError> {
        for token in [&self.method, &self.path] {
            if token.is_empty() || token.contains(char::is_whitespace) {
                return Err(malformed(format!("invalid request token {token:?}")));
            }
        }
        let mut out = format!("{} {} {VERSION}\r\n", self.method, self.path);
        self.headers.encode_into(&mut out)?;
        out.push_str("\r\n");
        Ok(out.into_bytes())
    }

    /// Parses a head as returned by [`read_head`]
    pub fn parse(head: &str) -> Result<Self, HeadError> {
        let mut lines = head.lines();
        let first = lines.next().unwrap_or_default();
        let mut tokens = first.split_whitespace();
        let (Some(method), Some(path), Some(version), None) =
            (tokens.next(), tokens.next(), tokens.next(), tokens.next())
        else {
            return Err(malformed(format!("bad request line {first:?}")));
        };
        if version != VERSION {
            return Err(malformed(format!("unsupported version {version:?}")));
        }
        let mut headers = Headers::default();
        for line in lines.take_while(|l| !l.is_empty()) {
            headers.parse_line(line)?;
        }
        Ok(Self {
            method: method.to_string(),
            path: path.to_string(),
            headers,
        })
    }
}

/// The head of a session response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    /// Status code
    pub status: StatusCode,
    /// Header fields
    pub headers: Headers,
}

impl ResponseHead {
    /// A response with no headers
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::default(),
        }
    }

    /// Serialises the head, including the terminating blank line
    pub fn encode(&self) -> Result<Vec<u8>, HeadError> {
        let mut out = format!("{VERSION} {}\r\n", self.status);
        self.headers.encode_into(&mut out)?;
        out.push_str("\r\n");
        Ok(out.into_bytes())
    }

    /// Parses a head as returned by [`read_head`]
    pub fn parse(head: &str) -> Result<Self, HeadError> {
        let mut lines = head.lines();
        let first = lines.next().unwrap_or_default();
        let mut tokens = first.splitn(3, ' ');
        let (Some(version), Some(code)) = (tokens.next(), tokens.next()) else {
            return Err(malformed(format!("bad status line {first:?}")));
        };
        if version != VERSION {
            return Err(malformed(format!("unsupported version {version:?}")));
        }
        let status = code
            .parse::<u16>()
            .ok()
            .and_then(StatusCode::new)
            .ok_or_else(|| malformed(format!("bad status code {code:?}")))?;
        let mut headers = Headers::default();
        for line in lines.take_while(|l| !l.is_empty()) {
            headers.parse_line(line)?;
        }
        Ok(Self { status, headers })
    }
}

/// Reads a head up to and including its terminating blank line.
///
/// Lines may end in `\r\n` or a bare `\n`. Bytes after the blank line are left in the reader.
pub async fn read_head<R>(reader: &mut R) -> Result<String, HeadError>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut limited = reader.take(MAX_HEAD_SIZE as u64);
    let mut head = Vec::new();
    loop {
        let start = head.len();
        let n = limited.read_until(b'\n', &mut head).await?;
        if n == 0 || !head.ends_with(b"\n") {
            return Err(if limited.limit() == 0 {
                HeadError::TooLarge
            } else {
                HeadError::Incomplete
            });
        }
        let line = &head[start..];
        if line == b"\r\n" || line == b"\n" {
            break;
        }
    }
    String::from_utf8(head).map_err(|_| malformed("head is not valid UTF-8"))
}

#[cfg(test)]
mod test {
    use super::{
        HeadError, Headers, MAX_HEAD_SIZE, RequestHead, ResponseHead, StatusCode, read_head,
    };
    use pretty_assertions::assert_eq;

    #[test]
    fn connect_request_wire_format() {
        let head = RequestHead::connect("example.org:443", "/webtransport");
        let wire = String::from_utf8(head.encode().unwrap()).unwrap();
        assert_eq!(
            wire,
            "CONNECT /webtransport HTTP/3\r\nhost: example.org:443\r\nprotocol: webtransport\r\n\r\n"
        );
        let parsed = RequestHead::parse(&wire).unwrap();
        assert_eq!(parsed, head);
        assert_eq!(parsed.authority(), Some("example.org:443"));
        assert_eq!(parsed.protocol(), Some("webtransport"));
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let head = RequestHead::parse(
            "CONNECT /wt HTTP/3\nHost:  h:1 \nPROTOCOL: webtransport\nX-Extra: yes\n\n",
        )
        .unwrap();
        assert_eq!(head.authority(), Some("h:1"));
        assert_eq!(head.protocol(), Some("webtransport"));
        assert_eq!(head.headers.get("x-extra"), Some("yes"));
        assert_eq!(head.headers.get("missing"), None);
    }

    #[test]
    fn bad_request_heads() {
        for head in [
            "",
            "CONNECT /wt\r\n\r\n",
            "CONNECT /wt HTTP/1.1\r\n\r\n",
            "CONNECT /wt HTTP/3 extra\r\n\r\n",
            "CONNECT /wt HTTP/3\r\nno colon here\r\n\r\n",
            "CONNECT /wt HTTP/3\r\n: empty name\r\n\r\n",
        ] {
            assert!(
                matches!(RequestHead::parse(head), Err(HeadError::Malformed(_))),
                "{head:?}"
            );
        }
    }

    #[test]
    fn refuses_to_encode_line_breaks() {
        let mut head = RequestHead::connect("h:1", "/wt");
        head.headers.insert("evil", "a\r\nb");
        assert!(head.encode().is_err());
        let head = RequestHead::connect("h:1", "/has space");
        assert!(head.encode().is_err());
    }

    #[test]
    fn response_heads() {
        let wire = ResponseHead::new(StatusCode::OK).encode().unwrap();
        assert_eq!(wire, b"HTTP/3 200 OK\r\n\r\n");
        let parsed = ResponseHead::parse("HTTP/3 404 Not Found\r\n\r\n").unwrap();
        assert_eq!(parsed.status, StatusCode::NOT_FOUND);
        assert!(!parsed.status.is_success());
        let parsed = ResponseHead::parse("HTTP/3 204\r\nserver: x\r\n\r\n").unwrap();
        assert!(parsed.status.is_success());
        assert_eq!(parsed.headers, {
            let mut h = Headers::default();
            h.insert("Server", "x");
            h
        });
        assert!(ResponseHead::parse("HTTP/3 abc\r\n\r\n").is_err());
        assert!(ResponseHead::parse("HTTP/3 42\r\n\r\n").is_err());
        assert!(ResponseHead::parse("HTTP/2 200 OK\r\n\r\n").is_err());
    }

    #[test]
    fn status_display() {
        assert_eq!(StatusCode::BAD_REQUEST.to_string(), "400 Bad Request");
        assert_eq!(StatusCode::new(418).unwrap().to_string(), "418");
        assert_eq!(StatusCode::new(1000), None);
    }

    #[tokio::test]
    async fn read_head_stops_at_blank_line() {
        let mut wire: &[u8] = b"HTTP/3 200 OK\r\n\r\nleftover";
        let head = read_head(&mut wire).await.unwrap();
        assert_eq!(head, "HTTP/3 200 OK\r\n\r\n");
        assert_eq!(wire, b"leftover");
    }

    #[tokio::test]
    async fn read_head_incomplete() {
        let mut wire: &[u8] = b"CONNECT /wt HTTP/3\r\nhost: x\r\n";
        assert!(matches!(
            read_head(&mut wire).await,
            Err(HeadError::Incomplete)
        ));
    }

    #[tokio::test]
    async fn read_head_too_large() {
        let mut big = b"CONNECT /wt HTTP/3\r\n".to_vec();
        while big.len() <= MAX_HEAD_SIZE {
            big.extend_from_slice(b"x-padding: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\n");
        }
        big.extend_from_slice(b"\r\n");
        let mut wire = big.as_slice();
        assert!(matches!(
            read_head(&mut wire).await,
            Err(HeadError::TooLarge)
        ));
    }

    #[tokio::test]
    async fn read_head_from_mock() {
        let mut mock = tokio::io::BufReader::new(
            tokio_test::io::Builder::new()
                .read(b"CONNECT /wt HT")
                .read(b"TP/3\r\n\r\n")
                .build(),
        );
        let head = read_head(&mut mock).await.unwrap();
        assert_eq!(RequestHead::parse(&head).unwrap().path, "/wt");
    }
}
