// (c) 2024 Ross Younger

//! The request line sent on each session stream
//!
//! A request is a single line, `<METHOD> <path>\r\n`, with no headers and no body.
//! The path runs from the first space to the line terminator, so it may itself contain spaces.

/// Longest request line we accept, excluding the terminator
pub const MAX_REQUEST_LINE: usize = 8 * 1024;

/// Reasons a request line may be unacceptable
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RequestLineError {
    /// Method was empty
    #[error("empty method")]
    EmptyMethod,
    /// Method contained whitespace or control characters
    #[error("method contains whitespace or control characters")]
    InvalidMethod,
    /// Path was empty
    #[error("empty path")]
    EmptyPath,
    /// Path contained a carriage return or line feed
    #[error("path contains a line terminator")]
    LineTerminatorInPath,
    /// No space separating method from path
    #[error("request line has no path")]
    MissingPath,
    /// Line was not UTF-8
    #[error("request line is not valid UTF-8")]
    NotUtf8,
    /// Line exceeded [`MAX_REQUEST_LINE`]
    #[error("request line exceeds {MAX_REQUEST_LINE} bytes")]
    TooLong,
}

/// A parsed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    method: String,
    path: String,
}

impl RequestLine {
    /// Validating constructor
    pub fn new<M: Into<String>, P: Into<String>>(
        method: M,
        path: P,
    ) -> Result<Self, RequestLineError> {
        let method = method.into();
        let path = path.into();
        check_method(&method)?;
        check_path(&path)?;
        if method.len() + 1 + path.len() > MAX_REQUEST_LINE {
            return Err(RequestLineError::TooLong);
        }
        Ok(Self { method, path })
    }

    /// Convenience constructor for a GET request
    pub fn get<P: Into<String>>(path: P) -> Result<Self, RequestLineError> {
        Self::new("GET", path)
    }

    /// Request method
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request path, exactly as sent
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wire encoding, including the terminator
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        format!("{} {}\r\n", self.method, self.path).into_bytes()
    }

    /// Parses a line. The terminator (`\r\n` or `\n`) is optional.
    pub fn parse(line: &[u8]) -> Result<Self, RequestLineError> {
        let line = line
            .strip_suffix(b"\r\n")
            .or_else(|| line.strip_suffix(b"\n"))
            .unwrap_or(line);
        if line.len() > MAX_REQUEST_LINE {
            return Err(RequestLineError::TooLong);
        }
        let line = std::str::from_utf8(line).map_err(|_| RequestLineError::NotUtf8)?;
        let (method, path) = line
            .split_once(' ')
            .ok_or(RequestLineError::MissingPath)?;
        check_method(method)?;
        check_path(path)?;
        Ok(Self {
            method: method.to_string(),
            path: path.to_string(),
        })
    }
}

impl std::fmt::Display for RequestLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

fn check_method(method: &str) -> Result<(), RequestLineError> {
    if method.is_empty() {
        Err(RequestLineError::EmptyMethod)
    } else if !method.chars().all(|c| c.is_ascii_graphic()) {
        Err(RequestLineError::InvalidMethod)
    } else {
        Ok(())
    }
}

fn check_path(path: &str) -> Result<(), RequestLineError> {
    if path.is_empty() {
        Err(RequestLineError::EmptyPath)
    } else if path.contains(['\r', '\n']) {
        Err(RequestLineError::LineTerminatorInPath)
    } else {
        Ok(())
    }
}
