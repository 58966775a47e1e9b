/// Incremental parser for `text/event-stream` bodies.
///
/// Bytes are buffered until a blank line closes a frame, so multi-byte
/// characters split across network chunks decode intact.
#[derive(Debug, Default)]
pub struct SseFrameParser {
    buffer: Vec<u8>,
}

impl SseFrameParser {
    /// Feed arbitrary bytes into the parser and drain complete `data` payloads.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut payloads = Vec::new();

        while let Some((split, sep_len)) = find_frame_end(&self.buffer) {
            let frame: Vec<u8> = self.buffer.drain(..split + sep_len).take(split).collect();
            let frame = String::from_utf8_lossy(&frame);

            if let Some(payload) = extract_data_payload(&frame) {
                if payload == "[DONE]" {
                    continue;
                }
                payloads.push(payload);
            }
        }

        payloads
    }

    /// Parse a complete SSE body in one shot.
    pub fn parse_frames(input: &str) -> Vec<String> {
        let mut parser = Self::default();
        parser.feed(input.as_bytes())
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(u8::is_ascii_whitespace)
    }
}

fn find_frame_end(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|window| window == b"\n\n").map(|pos| (pos, 2));
    let crlf = buffer
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| (pos, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value).trim_end_matches('\r'))
        .collect();

    if data_lines.iter().all(|line| line.trim().is_empty()) {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::SseFrameParser;

    #[test]
    fn parse_sse_frames_incrementally() {
        let mut parser = SseFrameParser::default();
        let mut payloads = Vec::new();

        payloads.extend(parser.feed(b"data: {\"type\":\"content\",\"content\":\"Hello\"}\n\n"));
        assert_eq!(payloads.len(), 1);

        payloads.extend(parser.feed(b"data: [DONE]\n\n"));
        assert_eq!(payloads.len(), 1);
        assert!(parser.is_empty_buffer());
    }
}
