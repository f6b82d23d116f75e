//! AI text analysis via a Gemini-compatible API.
//!
//! A missing key or an unreachable provider degrades to a placeholder result
//! with a `status: api_key_required` marker; the task still completes.

use async_trait::async_trait;
use serde_json::json;
use tracing::warn;

use super::{ExecError, SkillExecutor, SkillOutput};
use crate::parser::SkillRequest;

const GEMINI_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent";
const MODEL: &str = "gemini-1.5-flash";

pub struct AnalysisExecutor {
    api_key: Option<String>,
    client: reqwest::Client,
}

impl AnalysisExecutor {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
        }
    }

    async fn generate(&self, key: &str, content: &str) -> Result<String, String> {
        let prompt = format!(
            "Analyse the following text. Summarise the key points and note anything unusual.\n\n{content}"
        );
        let response = self
            .client
            .post(format!("{GEMINI_ENDPOINT}?key={key}"))
            .json(&json!({ "contents": [{ "parts": [{ "text": prompt }] }] }))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("provider returned {}", response.status()));
        }
        let body: serde_json::Value = response.json().await.map_err(|e| e.to_string())?;
        body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| "provider response missing text".to_string())
    }

    fn placeholder(content: &str) -> SkillOutput {
        let preview: String = content.chars().take(200).collect();
        SkillOutput::json(json!({
            "analysis": format!(
                "AI analysis is not available on this deployment. Received {} characters starting with: {}",
                content.len(), preview
            ),
            "status": "api_key_required",
        }))
    }
}

#[async_trait]
impl SkillExecutor for AnalysisExecutor {
    async fn execute(&self, request: &SkillRequest) -> Result<SkillOutput, ExecError> {
        let SkillRequest::AiAnalysis { content } = request else {
            return Err(ExecError::Unavailable("wrong request for ai-analysis".into()));
        };
        let Some(key) = self.api_key.as_deref() else {
            return Ok(Self::placeholder(content));
        };
        match self.generate(key, content).await {
            Ok(text) => Ok(SkillOutput::json(json!({
                "analysis": text,
                "model": MODEL,
            }))),
            Err(e) => {
                warn!(error = %e, "AI provider unavailable, degrading to placeholder");
                Ok(Self::placeholder(content))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::OutputBody;

    #[tokio::test]
    async fn missing_key_degrades_gracefully() {
        let exec = AnalysisExecutor::new(None);
        let out = exec
            .execute(&SkillRequest::AiAnalysis {
                content: "the quick brown fox".to_string(),
            })
            .await
            .unwrap();
        match out.body {
            OutputBody::Json(v) => {
                assert_eq!(v["status"], "api_key_required");
                assert!(v["analysis"].as_str().unwrap().contains("quick brown fox"));
            }
            _ => panic!("expected json body"),
        }
    }
}
