//! Incremental parsing of the HTTP upgrade request.
//!
//! Both parsers are pure scans over the receive buffer. They never consume
//! anything themselves: on success they report how many bytes the caller should
//! drop from the front of the buffer, and when the delimiter has not arrived yet
//! they return `Ok(None)` so the caller can wait for the next chunk.

use std::collections::HashMap;

use crate::error::{constants, ProtocolError, Result};

const CRLF: &[u8] = b"\r\n";
const CRLF_CRLF: &[u8] = b"\r\n\r\n";

/// `<VERB> <PATH> <VERSION>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub verb: String,
    pub path: String,
    pub version: String,
}

/// Request headers keyed by their exact (case-sensitive) name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    map: HashMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a header block (without its terminating blank line).
    ///
    /// Lines without a `:` are dropped. Later duplicates replace earlier ones.
    pub fn parse(block: &str) -> Self {
        let map = block
            .split("\r\n")
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .collect();
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Scan for a complete request line.
///
/// Returns the parsed line and the number of bytes it occupied, including the CRLF.
/// A line that does not split into exactly three space-separated tokens is fatal.
pub fn try_parse_request_line(buf: &[u8]) -> Result<Option<(RequestLine, usize)>> {
    let Some(end) = find(buf, CRLF) else {
        return Ok(None);
    };

    let line = std::str::from_utf8(&buf[..end])
        .map_err(|_| ProtocolError::MalformedRequest(constants::ERR_NON_UTF8_HANDSHAKE))?;

    let mut tokens = line.split(' ');
    match (tokens.next(), tokens.next(), tokens.next(), tokens.next()) {
        (Some(verb), Some(path), Some(version), None) => Ok(Some((
            RequestLine {
                verb: verb.to_string(),
                path: path.to_string(),
                version: version.to_string(),
            },
            end + CRLF.len(),
        ))),
        _ => Err(ProtocolError::MalformedRequest(
            constants::ERR_MALFORMED_REQUEST_LINE,
        )),
    }
}

/// Scan for a complete header block terminated by an empty line.
///
/// Returns the headers and the number of bytes consumed, including the blank line.
pub fn try_parse_header_block(buf: &[u8]) -> Result<Option<(Headers, usize)>> {
    // A request with no headers at all ends right after the request line.
    if buf.starts_with(CRLF) {
        return Ok(Some((Headers::new(), CRLF.len())));
    }

    let Some(end) = find(buf, CRLF_CRLF) else {
        return Ok(None);
    };

    let block = std::str::from_utf8(&buf[..end])
        .map_err(|_| ProtocolError::MalformedRequest(constants::ERR_NON_UTF8_HANDSHAKE))?;

    Ok(Some((Headers::parse(block), end + CRLF_CRLF.len())))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_request_line_complete() {
        let buf = b"GET /chat HTTP/1.1\r\nHost: x\r\n";
        let (line, consumed) = try_parse_request_line(buf).unwrap().unwrap();
        assert_eq!(line.verb, "GET");
        assert_eq!(line.path, "/chat");
        assert_eq!(line.version, "HTTP/1.1");
        assert_eq!(consumed, 20);
    }

    #[test]
    fn test_request_line_needs_more_data() {
        assert!(try_parse_request_line(b"GET /chat HTT").unwrap().is_none());
        // A lone CR is not a line ending yet.
        assert!(try_parse_request_line(b"GET /chat HTTP/1.1\r")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_request_line_wrong_token_count() {
        for line in [&b"GET /chat\r\n"[..], b"GET /a b HTTP/1.1\r\n", b"\r\n"] {
            assert!(matches!(
                try_parse_request_line(line),
                Err(ProtocolError::MalformedRequest(_))
            ));
        }
    }

    #[test]
    fn test_header_block() {
        let buf = b"Host: example.org\r\nUpgrade:  websocket \r\nbogus line\r\n\r\nrest";
        let (headers, consumed) = try_parse_header_block(buf).unwrap().unwrap();
        assert_eq!(headers.get("Host"), Some("example.org"));
        assert_eq!(headers.get("Upgrade"), Some("websocket"));
        assert_eq!(headers.len(), 2);
        assert_eq!(&buf[consumed..], b"rest");
    }

    #[test]
    fn test_header_split_on_first_colon() {
        let (headers, _) = try_parse_header_block(b"Origin: http://a:80\r\n\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(headers.get("Origin"), Some("http://a:80"));
    }

    #[test]
    fn test_header_keys_case_sensitive() {
        let (headers, _) = try_parse_header_block(b"host: a\r\n\r\n").unwrap().unwrap();
        assert_eq!(headers.get("Host"), None);
        assert_eq!(headers.get("host"), Some("a"));
    }

    #[test]
    fn test_header_block_needs_more_data() {
        assert!(try_parse_header_block(b"Host: a\r\nUpgrade: websocket\r\n")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_empty_header_block() {
        let (headers, consumed) = try_parse_header_block(b"\r\nxyz").unwrap().unwrap();
        assert!(headers.is_empty());
        assert_eq!(consumed, 2);
    }
}
