//! Line-oriented message framing.
//!
//! Every message is one line terminated by the configured delimiter. Reads go
//! through a buffered reader and extract whole lines, so responses may arrive
//! merged into one segment or split across several.

use crate::config::ProtocolConfig;
use crate::error::{ClientError, Result};
use log::warn;
use std::io::{self, BufRead, Read, Write};

/// Outcome of a batch acknowledgement line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ack {
    Accepted,
    /// Raw response text sent instead of the success token.
    Rejected(String),
}

/// Builds and parses protocol messages for one [`ProtocolConfig`].
#[derive(Debug, Clone)]
pub struct Framer {
    config: ProtocolConfig,
}

impl Framer {
    pub fn new(config: ProtocolConfig) -> Self {
        Framer { config }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Terminates `payload` with the message delimiter.
    pub fn frame(&self, payload: &str) -> Vec<u8> {
        let mut message = Vec::with_capacity(payload.len() + self.config.message_delimiter.len());
        message.extend_from_slice(payload.as_bytes());
        message.extend_from_slice(self.config.message_delimiter.as_bytes());
        message
    }

    /// The finished notification: exactly one delimited line.
    pub fn finished_message(&self) -> Vec<u8> {
        self.frame(&self.config.finished_message)
    }

    /// Writes a complete framed message.
    ///
    /// `write_all` keeps writing after partial writes until the whole buffer is
    /// flushed or the stream fails.
    pub fn send<W: Write>(&self, writer: &mut W, message: &[u8]) -> io::Result<()> {
        writer.write_all(message)?;
        writer.flush()
    }

    /// Reads one delimited line and returns it without the delimiter.
    ///
    /// End of stream before the delimiter is an `UnexpectedEof` error. A line
    /// longer than `max_line_length` is an `InvalidData` error.
    pub fn read_line<R: BufRead>(&self, reader: &mut R) -> io::Result<String> {
        let delimiter = self.config.message_delimiter.as_bytes();
        let Some(&last) = delimiter.last() else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "message delimiter is empty",
            ));
        };
        let limit = self.config.max_line_length + delimiter.len();
        let mut line = Vec::new();

        loop {
            if line.len() >= limit {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "response line exceeds {} bytes without a message delimiter",
                        self.config.max_line_length
                    ),
                ));
            }

            let remaining = (limit - line.len()) as u64;
            let read = (&mut *reader).take(remaining).read_until(last, &mut line)?;
            if read == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "connection closed after {} bytes without a message delimiter",
                        line.len()
                    ),
                ));
            }
            if line.ends_with(delimiter) {
                line.truncate(line.len() - delimiter.len());
                break;
            }
        }

        String::from_utf8(line).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Reads a header line, then exactly one body line.
    pub fn read_two_lines<R: BufRead>(&self, reader: &mut R) -> io::Result<(String, String)> {
        let header = self.read_line(reader)?;
        let body = self.read_line(reader)?;
        Ok((header, body))
    }

    /// Interprets a batch acknowledgement line.
    pub fn parse_ack(&self, line: &str) -> Ack {
        if line.trim() == self.config.success_response {
            Ack::Accepted
        } else {
            Ack::Rejected(line.to_string())
        }
    }

    /// Parses the two-line winners response into the list of winner ids.
    ///
    /// The header must be `<winners_prefix><count>`. A zero count yields an
    /// empty list; otherwise the body is split on the batch separator and empty
    /// tokens are dropped. The received tokens win over the declared count.
    pub fn parse_winners(&self, header: &str, body: &str) -> Result<Vec<String>> {
        let header = header.trim();
        let count = header
            .strip_prefix(self.config.winners_prefix.as_str())
            .ok_or_else(|| {
                ClientError::ProtocolViolation(format!("unexpected winners header: {:?}", header))
            })?;
        let count: usize = count.trim().parse().map_err(|_| {
            ClientError::ProtocolViolation(format!("invalid winners count in header {:?}", header))
        })?;

        let body = body.trim();
        if count == 0 {
            if body != self.config.no_winners_body {
                warn!(
                    "action: parse_winners | result: warning | reason: unexpected empty-result body {:?}",
                    body
                );
            }
            return Ok(Vec::new());
        }

        let winners: Vec<String> = body
            .split(self.config.batch_separator.as_str())
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect();

        if winners.len() != count {
            warn!(
                "action: parse_winners | result: warning | declared: {} | received: {}",
                count,
                winners.len()
            );
        }

        Ok(winners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor};

    fn framer() -> Framer {
        Framer::new(ProtocolConfig::default())
    }

    /// Hands out at most `chunk` bytes per read, like a slow socket.
    struct Trickle<'a> {
        data: &'a [u8],
        chunk: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.chunk.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    /// Accepts at most `chunk` bytes per write.
    struct ShortWriter {
        written: Vec<u8>,
        chunk: usize,
    }

    impl Write for ShortWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = self.chunk.min(buf.len());
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_frame_appends_single_delimiter() {
        assert_eq!(framer().frame("a~b"), b"a~b\n".to_vec());
        assert_eq!(framer().finished_message(), b"FINISHED\n".to_vec());
    }

    #[test]
    fn test_send_survives_partial_writes() {
        let mut writer = ShortWriter {
            written: Vec::new(),
            chunk: 3,
        };
        let message = framer().frame("1;Ana;Perez;123;2000-01-01;42");
        framer().send(&mut writer, &message).unwrap();
        assert_eq!(writer.written, message);
    }

    #[test]
    fn test_read_two_lines_from_single_segment() {
        let mut reader = Cursor::new(b"W:2\n111~222\n".to_vec());
        let (header, body) = framer().read_two_lines(&mut reader).unwrap();
        assert_eq!(header, "W:2");
        assert_eq!(body, "111~222");
    }

    #[test]
    fn test_read_two_lines_split_across_reads() {
        let trickle = Trickle {
            data: b"W:2\n111~222\n",
            chunk: 2,
        };
        let mut reader = BufReader::with_capacity(2, trickle);
        let (header, body) = framer().read_two_lines(&mut reader).unwrap();
        assert_eq!(header, "W:2");
        assert_eq!(body, "111~222");
    }

    #[test]
    fn test_read_line_multi_byte_delimiter() {
        let framer = Framer::new(ProtocolConfig {
            message_delimiter: "\r\n".to_string(),
            ..ProtocolConfig::default()
        });
        let mut reader = Cursor::new(b"a\nb\r\nOK\r\n".to_vec());
        assert_eq!(framer.read_line(&mut reader).unwrap(), "a\nb");
        assert_eq!(framer.read_line(&mut reader).unwrap(), "OK");
    }

    #[test]
    fn test_read_line_eof_before_delimiter() {
        let mut reader = Cursor::new(b"OK".to_vec());
        let err = framer().read_line(&mut reader).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_read_line_rejects_overlong_line() {
        let framer = Framer::new(ProtocolConfig {
            max_line_length: 8,
            ..ProtocolConfig::default()
        });

        let mut reader = Cursor::new(b"12345678\n123456789\n".to_vec());
        assert_eq!(framer.read_line(&mut reader).unwrap(), "12345678");
        let err = framer.read_line(&mut reader).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let endless = io::repeat(b'x');
        let mut reader = BufReader::with_capacity(4, endless);
        let err = framer.read_line(&mut reader).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_parse_ack() {
        assert_eq!(framer().parse_ack("OK"), Ack::Accepted);
        assert_eq!(framer().parse_ack("OK\r"), Ack::Accepted);
        assert_eq!(framer().parse_ack("FAIL"), Ack::Rejected("FAIL".to_string()));
        assert_eq!(framer().parse_ack(""), Ack::Rejected(String::new()));
    }

    #[test]
    fn test_parse_winners_none() {
        assert!(framer().parse_winners("W:0", "N").unwrap().is_empty());
    }

    #[test]
    fn test_parse_winners_list() {
        assert_eq!(
            framer().parse_winners("W:2", "111~222").unwrap(),
            vec!["111", "222"]
        );
    }

    #[test]
    fn test_parse_winners_drops_empty_tokens() {
        assert_eq!(
            framer().parse_winners("W:2", "111~~222~").unwrap(),
            vec!["111", "222"]
        );
    }

    #[test]
    fn test_parse_winners_count_mismatch_is_tolerated() {
        assert_eq!(
            framer().parse_winners("W:5", "111 ~ 222").unwrap(),
            vec!["111", "222"]
        );
    }

    #[test]
    fn test_parse_winners_bad_header() {
        for header in ["R:2", "WINNERS", "W:two", ""] {
            assert!(
                matches!(
                    framer().parse_winners(header, "111"),
                    Err(ClientError::ProtocolViolation(_))
                ),
                "header {:?} should be rejected",
                header
            );
        }
    }
}
