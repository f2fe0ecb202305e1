//! Newline-delimited JSON framing.
//!
//! One UTF-8 JSON object per line, no length prefixes, no batching.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("empty line")]
    Empty,

    #[error("invalid JSON frame: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize `message` as a single line terminated by `\n`.
///
/// `serde_json` never emits raw newlines in compact output, so the result is
/// exactly one line.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, FrameError> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Decode one line (surrounding whitespace and the line terminator ignored).
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, FrameError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(FrameError::Empty);
    }
    Ok(serde_json::from_str(trimmed)?)
}
