use bytes::{Buf, BytesMut};

/// One complete event-stream frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    Data { event: Option<String>, data: String },
    Comment(String),
}

/// Incremental `text/event-stream` parser.
///
/// Network chunks may split lines and frames anywhere; feed every chunk to
/// [`FrameDecoder::push`] and collect the frames it completes.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    event: Option<String>,
    data: Vec<String>,
    comment: Option<String>,
}

impl FrameDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line = self.buf.split_to(pos + 1);
            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end_matches(['\n', '\r']);

            if text.is_empty() {
                if let Some(frame) = self.finish() {
                    out.push(frame);
                }
                continue;
            }
            self.field(text);
        }
        out
    }

    /// Bytes held back waiting for a line end.
    pub fn pending(&self) -> usize {
        self.buf.remaining()
    }

    fn field(&mut self, line: &str) {
        if let Some(comment) = line.strip_prefix(':') {
            self.comment = Some(comment.trim_start().to_string());
            return;
        }
        let (name, value) = match line.split_once(':') {
            Some((n, v)) => (n, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match name {
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            // id / retry are not used by this protocol.
            _ => {}
        }
    }

    fn finish(&mut self) -> Option<SseFrame> {
        let comment = self.comment.take();
        let event = self.event.take();
        if !self.data.is_empty() {
            let data = std::mem::take(&mut self.data).join("\n");
            return Some(SseFrame::Data { event, data });
        }
        comment.map(SseFrame::Comment)
    }
}
