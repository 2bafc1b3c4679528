use pulse_core::envelope::Envelope;
use rmcp::ErrorData;
use rmcp::model::{CallToolResult, Content};

/// Returns the envelope as the tool's JSON content.
///
/// Failures travel inside the envelope; only serialization errors surface as
/// protocol errors.
pub(crate) fn envelope_result(envelope: &Envelope) -> Result<CallToolResult, ErrorData> {
    Ok(CallToolResult::success(vec![Content::json(envelope)?]))
}

pub(crate) fn normalize_optional(value: Option<String>) -> Option<String> {
    value.and_then(|payload| {
        if payload.trim().is_empty() {
            None
        } else {
            Some(payload)
        }
    })
}
