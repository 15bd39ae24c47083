//! 讯飞星火 X1 响应帧
//!
//! ```json
//! {
//!   "header": {"code": 0, "message": "Success", "sid": "..", "status": 1},
//!   "payload": {"choices": {"status": 1, "seq": 0, "text": [{"content": "你好", "role": "assistant", "index": 0}]}}
//! }
//! ```
//!
//! X1 推理阶段的 `reasoning_content` 不是回答内容，不产出分块。

use serde_json::Value;

use super::{DecodedFrame, FrameEnd};
use chatgate_core::StreamError;

/// 最后一帧的 `header.status`
const FINAL_STATUS: i64 = 2;

pub fn decode_spark_frame(text: &str) -> DecodedFrame {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!("[DECODE] 跳过无法解析的讯飞帧: {}", e);
            return DecodedFrame::skip();
        }
    };

    let header = &value["header"];
    let code = header["code"].as_i64().unwrap_or(0);
    if code != 0 {
        let message = header["message"].as_str().unwrap_or("未知错误");
        return DecodedFrame {
            chunks: Vec::new(),
            end: Some(FrameEnd::Rejected(StreamError::backend_rejected(format!(
                "讯飞星火错误 [{code}]: {message}"
            )))),
        };
    }

    let mut frame = DecodedFrame::skip();
    if let Some(items) = value["payload"]["choices"]["text"].as_array() {
        for item in items {
            if let Some(content) = item["content"].as_str() {
                frame.push_content(content);
            }
        }
    }

    if header["status"].as_i64() == Some(FINAL_STATUS) {
        frame.end = Some(FrameEnd::Done);
    }
    frame
}
