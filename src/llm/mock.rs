//! Zero-cost backend for development and tests.

use async_trait::async_trait;

use super::{ChatModel, CompletionRequest, LlmError};

/// The fixed illustrative triplet every mock call returns.
pub const MOCK_RESPONSE: &str = r#"{"risks":["Example risk: ambiguous deliverable timeline"],"unclear":["Example unclear: acceptance criteria for Module X"],"remediation":["Request clarification on deliverables and acceptance tests"]}"#;

/// Ignores its input and answers with [`MOCK_RESPONSE`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MockModel;

#[async_trait]
impl ChatModel for MockModel {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, _req: &CompletionRequest) -> Result<String, LlmError> {
        Ok(MOCK_RESPONSE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisVerdict;

    #[test]
    fn mock_response_is_a_triplet() {
        let v: AnalysisVerdict = serde_json::from_str(MOCK_RESPONSE).unwrap();
        assert_eq!(v.risks.len(), 1);
        assert_eq!(v.unclear.len(), 1);
        assert_eq!(v.remediation.len(), 1);
    }
}
