//! OpenAI 兼容 SSE 解码
//!
//! 按行处理：`data: {json}` 产出分块，`data: [DONE]` 结束，其余行忽略。
//! 每个 `choices[]` 元素取 `message.content`，没有时取 `delta.content`。

use serde_json::Value;

use chatgate_core::StreamError;

use super::{DecodedFrame, FrameEnd};

const DATA_PREFIX: &str = "data: ";
const DONE_MARKER: &str = "[DONE]";

pub fn decode_sse_line(line: &str) -> DecodedFrame {
    let line = line.trim();
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return DecodedFrame::skip();
    };
    let payload = payload.trim();

    if payload == DONE_MARKER {
        return DecodedFrame {
            chunks: Vec::new(),
            end: Some(FrameEnd::Done),
        };
    }

    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("[DECODE] 跳过无法解析的 SSE 行: {}", e);
            return DecodedFrame::skip();
        }
    };

    let mut frame = DecodedFrame::skip();
    if let Some(choices) = value["choices"].as_array() {
        for choice in choices {
            let content = choice["message"]["content"]
                .as_str()
                .or_else(|| choice["delta"]["content"].as_str());
            if let Some(content) = content {
                frame.push_content(content);
            }
        }
    }
    frame
}

/// 单行上限，超过即视为上游异常
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// 把响应体字节切成完整的行
///
/// 网络读取的边界与行边界无关，不完整的尾部留到下一次。
#[derive(Debug)]
pub struct SseLineBuffer {
    buf: Vec<u8>,
    /// `buf[..scanned]` 中没有换行
    scanned: usize,
    max_line: usize,
}

impl Default for SseLineBuffer {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl SseLineBuffer {
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            max_line,
        }
    }

    /// 追加一次读取的字节，返回其中完整的行；未换行的尾部超过上限时报错
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<Vec<String>, StreamError> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut line_start = 0;
        let mut cursor = self.scanned;
        while let Some(offset) = self.buf[cursor..].iter().position(|b| *b == b'\n') {
            let line_end = cursor + offset;
            let line = String::from_utf8_lossy(&self.buf[line_start..line_end]);
            lines.push(line.trim_end_matches('\r').to_string());
            line_start = line_end + 1;
            cursor = line_start;
        }
        self.buf.drain(..line_start);
        self.scanned = self.buf.len();

        if self.buf.len() > self.max_line {
            let pending = self.buf.len();
            self.buf.clear();
            self.scanned = 0;
            return Err(StreamError::transport(format!(
                "SSE 单行超过 {} 字节 (已缓冲 {} 字节)",
                self.max_line, pending
            )));
        }
        Ok(lines)
    }

    /// 流结束时取出剩余的未换行内容
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.buf).trim_end_matches('\r').to_string();
        self.buf.clear();
        self.scanned = 0;
        Some(rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatgate_core::StreamChunk;
    use proptest::prelude::*;

    #[test]
    fn test_message_content_line() {
        let frame = decode_sse_line(r#"data: {"choices":[{"message":{"content":"你好"}}]}"#);
        assert_eq!(frame.chunks, vec![StreamChunk::new("你好")]);
        assert_eq!(frame.end, None);
    }

    #[test]
    fn test_delta_content_line() {
        let frame = decode_sse_line(r#"data: {"choices":[{"delta":{"content":"Hel"}},{"delta":{"content":"lo"}}]}"#);
        assert_eq!(frame.chunks, vec![StreamChunk::new("Hel"), StreamChunk::new("lo")]);
    }

    #[test]
    fn test_done_marker() {
        assert_eq!(decode_sse_line("data: [DONE]").end, Some(FrameEnd::Done));
        assert_eq!(decode_sse_line("  data: [DONE]\r").end, Some(FrameEnd::Done));
    }

    #[test]
    fn test_ignored_lines() {
        for line in [
            "",
            "   ",
            ": keep-alive",
            "event: message",
            "data:{\"choices\":[{\"delta\":{\"content\":\"x\"}}]}",
            "data: not-json",
            r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"data: {"choices":[{"delta":{"content":""}}]}"#,
        ] {
            assert!(decode_sse_line(line).is_empty(), "line: {line:?}");
        }
    }

    #[test]
    fn test_line_buffer_handles_split_reads() {
        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push_chunk(b"data: {\"a\"").unwrap().is_empty());
        let lines = buffer.push_chunk(b":1}\r\n\r\ndata: [DO").unwrap();
        assert_eq!(lines, vec!["data: {\"a\":1}".to_string(), String::new()]);
        assert!(buffer.push_chunk(b"NE]").unwrap().is_empty());
        assert_eq!(buffer.finish(), Some("data: [DONE]".to_string()));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_line_buffer_keeps_multibyte_chars_across_reads() {
        let bytes = "data: 你好\n".as_bytes();
        let mut buffer = SseLineBuffer::default();
        assert!(buffer.push_chunk(&bytes[..7]).unwrap().is_empty());
        assert_eq!(
            buffer.push_chunk(&bytes[7..]).unwrap(),
            vec!["data: 你好".to_string()]
        );
    }

    #[test]
    fn test_line_buffer_rejects_overlong_line() {
        let mut buffer = SseLineBuffer::with_max_line(16);
        assert!(buffer.push_chunk(b"data: 0123456").unwrap().is_empty());
        let err = buffer.push_chunk(b"789abcdef").unwrap_err();
        assert_eq!(err.kind, chatgate_core::StreamErrorKind::Transport);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_line_buffer_limit_applies_to_unfinished_tail_only() {
        let mut buffer = SseLineBuffer::with_max_line(16);
        // 单次读取远超上限，但每行都在上限内
        let chunk = "data: short\n".repeat(20);
        let lines = buffer.push_chunk(chunk.as_bytes()).unwrap();
        assert_eq!(lines.len(), 20);
        assert!(lines.iter().all(|l| l == "data: short"));
    }

    #[test]
    fn test_line_buffer_byte_at_a_time() {
        let mut buffer = SseLineBuffer::default();
        let mut lines = Vec::new();
        for b in b"data: a\r\ndata: b\n\ndata: [DONE]" {
            lines.extend(buffer.push_chunk(std::slice::from_ref(b)).unwrap());
        }
        assert_eq!(lines, vec!["data: a", "data: b", ""]);
        assert_eq!(buffer.finish(), Some("data: [DONE]".to_string()));
    }

    proptest! {
        #[test]
        fn prop_split_points_do_not_change_lines(split in 0usize..64) {
            let body = "data: {\"choices\":[{\"delta\":{\"content\":\"ab\"}}]}\n\ndata: [DONE]\n";
            let bytes = body.as_bytes();
            let split = split.min(bytes.len());

            let mut buffer = SseLineBuffer::default();
            let mut lines = buffer.push_chunk(&bytes[..split]).unwrap();
            lines.extend(buffer.push_chunk(&bytes[split..]).unwrap());
            prop_assert_eq!(buffer.finish(), None);

            let decoded: Vec<_> = lines.iter().map(|l| decode_sse_line(l)).collect();
            prop_assert_eq!(decoded.len(), 3);
            prop_assert_eq!(&decoded[0].chunks, &vec![StreamChunk::new("ab")]);
            prop_assert_eq!(&decoded[2].end, &Some(FrameEnd::Done));
        }
    }
}
