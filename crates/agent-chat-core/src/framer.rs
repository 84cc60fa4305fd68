/// Splits an arbitrarily fragmented byte stream into newline-terminated lines.
///
/// Works on bytes so a multi-byte UTF-8 sequence split across two fragments
/// is reassembled before decoding. Lines are returned without the trailing
/// `\n` (and without a trailing `\r`).
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
    // Bytes of `buf` already scanned without finding a newline.
    scanned: usize,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fragment and returns every line it completes, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        let mut start = 0;
        let mut search_from = self.scanned;
        while let Some(offset) = self.buf[search_from..].iter().position(|b| *b == b'\n') {
            let end = search_from + offset;
            lines.push(decode_line(&self.buf[start..end]));
            start = end + 1;
            search_from = start;
        }
        self.buf.drain(..start);
        self.scanned = self.buf.len();
        lines
    }

    pub fn push_str(&mut self, text: &str) -> Vec<String> {
        self.push(text.as_bytes())
    }

    /// Flushes the residual fragment at end of stream.
    ///
    /// Returns `None` when the residue is empty or whitespace only.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        self.scanned = 0;
        let line = decode_line(&rest);
        if line.trim().is_empty() {
            None
        } else {
            Some(line)
        }
    }

    /// Number of buffered bytes not yet terminated by a newline.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}
