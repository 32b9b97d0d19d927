/// Payload that terminates an event stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Incremental `text/event-stream` decoder.
///
/// Bytes are pushed as they arrive off the wire; complete events come back as
/// their joined `data:` payloads. Partial lines (including a UTF-8 sequence
/// split across chunks) stay buffered until the rest arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending_bytes: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending_bytes.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.pending_bytes.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending_bytes.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            let text = String::from_utf8_lossy(&line);
            if text.is_empty() {
                if !self.data_lines.is_empty() {
                    events.push(self.data_lines.join("\n"));
                    self.data_lines.clear();
                }
                continue;
            }

            // comments and non-data fields (event:, id:, retry:) carry nothing we relay
            if let Some(value) = text.strip_prefix("data:") {
                let value = value.strip_prefix(' ').unwrap_or(value);
                self.data_lines.push(value.to_string());
            }
        }

        events
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.pending_bytes.is_empty() && self.data_lines.is_empty()
    }
}
