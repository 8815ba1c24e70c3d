//! Shared plumbing for generator-backed stages: a deadline around every call and
//! lenient extraction of JSON from model output.

use std::time::Duration;

use crate::infrastructure::ports::{LlmError, LlmPort, LlmRequest};

/// Run one generator call under `timeout`. Failures are logged with the stage name and
/// returned; callers pick their own fallback.
pub async fn generate_text(
    llm: &dyn LlmPort,
    request: LlmRequest,
    timeout: Duration,
    stage: &'static str,
) -> Result<String, LlmError> {
    let result = match tokio::time::timeout(timeout, llm.generate(request)).await {
        Ok(result) => result.map(|response| response.content),
        Err(_) => Err(LlmError::timeout(timeout)),
    };
    if let Err(e) = &result {
        tracing::warn!(stage, error = %e, "Generator call failed, using fallback");
    }
    result
}

/// Pull a JSON object out of a model response: a ```json block, then any fenced block,
/// then the outermost `{...}`.
pub fn extract_json(response: &str) -> &str {
    if let Some(start) = response.find("```json") {
        let body = &response[start + 7..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }

    if let Some(start) = response.find("```") {
        let body = &response[start + 3..];
        if let Some(end) = body.find("```") {
            let content = body[..end].trim();
            // Skip language identifier if present
            if let Some(newline_pos) = content.find('\n') {
                if !content[..newline_pos].starts_with('{') {
                    return content[newline_pos + 1..].trim();
                }
            }
            return content;
        }
    }

    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) {
        if start < end {
            return &response[start..=end];
        }
    }

    response.trim()
}

/// Parse the JSON object embedded in `response`, if there is one.
pub fn parse_json_object(response: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    match serde_json::from_str::<serde_json::Value>(extract_json(response)) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    }
}
