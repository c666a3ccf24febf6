//! SMTP reply framing.
//!
//! [`ReplyParser`] is fed whatever bytes the transport delivers and yields
//! complete replies once a terminating line has arrived. It knows nothing
//! about sockets, so partial reads, several replies in one read, and replies
//! split across many reads are all handled the same way.

use crate::core::error::{AppError, Result};

/// Upper bound on buffered, unterminated input.
const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// A complete, possibly multi-line, SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// All text lines joined by spaces.
    pub fn message(&self) -> String {
        self.lines.join(" ")
    }

    /// Case-insensitive substring search across every line.
    pub fn advertises(&self, keyword: &str) -> bool {
        let keyword = keyword.to_ascii_uppercase();
        self.lines
            .iter()
            .any(|line| line.to_ascii_uppercase().contains(&keyword))
    }
}

enum LineKind {
    Final(u16),
    Continuation(u16),
    Other,
}

fn classify(line: &str) -> LineKind {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return LineKind::Other;
    }
    let code = bytes[..3]
        .iter()
        .fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0'));
    match bytes.get(3) {
        None | Some(b' ') => LineKind::Final(code),
        Some(b'-') => LineKind::Continuation(code),
        Some(_) => LineKind::Other,
    }
}

/// Incremental reply parser.
#[derive(Debug, Default)]
pub struct ReplyParser {
    buffer: Vec<u8>,
    lines: Vec<String>,
}

impl ReplyParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends raw bytes received from the server.
    pub fn feed(&mut self, data: &[u8]) -> Result<()> {
        if self.buffer.len() + data.len() > MAX_BUFFER_SIZE {
            return Err(AppError::SmtpProtocol(format!(
                "Response too large (exceeds {} bytes)",
                MAX_BUFFER_SIZE
            )));
        }
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Returns the next complete reply, or `None` if more input is needed.
    pub fn next_reply(&mut self) -> Option<Reply> {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw)
                .trim_end_matches(&['\r', '\n'][..])
                .to_string();
            if line.is_empty() {
                continue;
            }
            match classify(&line) {
                LineKind::Final(code) => {
                    self.lines.push(text_of(&line));
                    let lines = std::mem::take(&mut self.lines);
                    return Some(Reply::new(code, lines));
                }
                LineKind::Continuation(_) => self.lines.push(text_of(&line)),
                LineKind::Other => {
                    tracing::trace!(target: "smtp_task", "Ignoring non-conforming reply line: {:?}", line);
                    self.lines.push(line);
                }
            }
        }
        None
    }

    /// Discards anything buffered, e.g. before a TLS handshake.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.lines.clear();
    }
}

fn text_of(line: &str) -> String {
    line.get(4..).unwrap_or("").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_line_reply() {
        let mut parser = ReplyParser::new();
        parser.feed(b"220 mx.example.com ESMTP ready\r\n").unwrap();
        let reply = parser.next_reply().unwrap();
        assert_eq!(reply.code, 220);
        assert_eq!(reply.lines, vec!["mx.example.com ESMTP ready"]);
        assert!(parser.next_reply().is_none());
    }

    #[test]
    fn multi_line_reply_across_reads() {
        let mut parser = ReplyParser::new();
        parser.feed(b"250-mx.example.com\r\n250-SIZE 35882577\r\n250-STAR").unwrap();
        assert!(parser.next_reply().is_none());
        parser.feed(b"TTLS\r\n250 SMTPUTF8").unwrap();
        assert!(parser.next_reply().is_none());
        parser.feed(b"\r\n").unwrap();

        let reply = parser.next_reply().unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(
            reply.lines,
            vec!["mx.example.com", "SIZE 35882577", "STARTTLS", "SMTPUTF8"]
        );
        assert!(reply.advertises("starttls"));
    }

    #[test]
    fn bare_code_terminates() {
        let mut parser = ReplyParser::new();
        parser.feed(b"250\n").unwrap();
        let reply = parser.next_reply().unwrap();
        assert_eq!(reply.code, 250);
        assert_eq!(reply.message(), "");
    }

    #[test]
    fn two_replies_in_one_read() {
        let mut parser = ReplyParser::new();
        parser.feed(b"250 OK\r\n550 5.1.1 no such user\r\n").unwrap();
        assert_eq!(parser.next_reply().unwrap().code, 250);
        let second = parser.next_reply().unwrap();
        assert_eq!(second.code, 550);
        assert_eq!(second.message(), "5.1.1 no such user");
    }

    #[test]
    fn oversized_input_is_rejected() {
        let mut parser = ReplyParser::new();
        let chunk = vec![b'a'; MAX_BUFFER_SIZE];
        parser.feed(&chunk).unwrap();
        assert!(parser.feed(b"more").is_err());
    }
}
