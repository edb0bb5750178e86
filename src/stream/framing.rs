// Line framing for NDJSON and SSE response bodies

/// What a decoder made of one line of the response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A text fragment to forward (empty fragments are dropped)
    Text(String),
    /// Terminal frame, optionally carrying a last fragment
    Done(String),
    /// Keep-alive, comment, role-only delta, ...
    Skip,
}

/// Per-protocol line decoder. Each adapter owns one implementation.
pub trait FrameDecoder: Send + 'static {
    /// Decode a single non-empty line. `Err` carries a protocol message.
    fn decode_line(&mut self, line: &str) -> Result<Frame, String>;

    /// Called when the body ends without a terminal frame.
    fn finish(&mut self) -> Result<(), String> {
        Err("stream ended before the completion marker".to_string())
    }
}

/// Accumulates body chunks and yields complete lines.
///
/// Chunks may split lines (and UTF-8 sequences) anywhere; bytes are held
/// until a newline arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Next complete line without its terminator, skipping blank lines.
    pub fn next_line(&mut self) -> Option<String> {
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            let line = line.trim_end_matches(['\n', '\r']);
            if !line.trim().is_empty() {
                return Some(line.to_string());
            }
        }
        None
    }

    /// Whatever is left once the body is exhausted.
    pub fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.buffer).trim().to_string();
        self.buffer.clear();
        if rest.is_empty() {
            None
        } else {
            Some(rest)
        }
    }
}

/// Strip the SSE `data:` field name, if present.
pub fn strip_sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(|rest| rest.trim())
}
