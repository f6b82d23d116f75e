//! Skill executors.
//!
//! Executors are opaque async workers behind a trait; the state machine
//! treats their failures as values. Every call runs under a 30-second
//! deadline, after which it counts as failed.

pub mod analysis;
pub mod markdown;
pub mod screenshot;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::Value;
use tracing::warn;

use crate::config::Config;
use crate::parser::SkillRequest;
use crate::types::{FilePart, Part};

pub const EXECUTOR_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("executor timed out")]
    Timeout,

    #[error("{0}")]
    Unavailable(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// A finished skill run: media type plus the body in its natural shape.
#[derive(Debug, Clone)]
pub struct SkillOutput {
    pub media_type: String,
    pub body: OutputBody,
}

#[derive(Debug, Clone)]
pub enum OutputBody {
    Text(String),
    Bytes(Vec<u8>),
    Json(Value),
}

impl SkillOutput {
    pub fn html(html: String) -> Self {
        Self {
            media_type: "text/html".to_string(),
            body: OutputBody::Text(html),
        }
    }

    pub fn bytes(media_type: &str, bytes: Vec<u8>) -> Self {
        Self {
            media_type: media_type.to_string(),
            body: OutputBody::Bytes(bytes),
        }
    }

    pub fn json(value: Value) -> Self {
        Self {
            media_type: "application/json".to_string(),
            body: OutputBody::Json(value),
        }
    }

    /// Message part carrying this output on the JSON-RPC surface.
    pub fn into_part(self, file_name: &str) -> Part {
        match self.body {
            OutputBody::Text(text) => Part::Data {
                data: serde_json::json!({ "html": text }),
            },
            OutputBody::Json(data) => Part::Data { data },
            OutputBody::Bytes(bytes) => Part::File {
                file: FilePart {
                    name: file_name.to_string(),
                    mime_type: self.media_type,
                    bytes: BASE64.encode(bytes),
                },
            },
        }
    }

    /// Raw body for the REST surface.
    pub fn into_bytes(self) -> Vec<u8> {
        match self.body {
            OutputBody::Text(text) => text.into_bytes(),
            OutputBody::Bytes(bytes) => bytes,
            OutputBody::Json(value) => serde_json::to_vec(&value).unwrap_or_default(),
        }
    }
}

#[async_trait]
pub trait SkillExecutor: Send + Sync {
    async fn execute(&self, request: &SkillRequest) -> Result<SkillOutput, ExecError>;
}

/// Executors keyed by skill id, each call wrapped in the shared deadline.
pub struct ExecutorRegistry {
    executors: HashMap<&'static str, Box<dyn SkillExecutor>>,
    timeout: Duration,
}

impl ExecutorRegistry {
    pub fn from_config(config: &Config) -> Self {
        let mut executors: HashMap<&'static str, Box<dyn SkillExecutor>> = HashMap::new();
        executors.insert(
            "screenshot",
            Box::new(screenshot::ScreenshotExecutor::new(
                config.backend.api_url.clone(),
                config.backend.api_key.clone(),
            )),
        );
        executors.insert(
            "markdown-to-html",
            Box::new(markdown::MarkdownToHtmlExecutor),
        );
        executors.insert(
            "markdown-to-pdf",
            Box::new(markdown::MarkdownToPdfExecutor::new(
                config.backend.api_url.clone(),
                config.backend.api_key.clone(),
            )),
        );
        executors.insert(
            "ai-analysis",
            Box::new(analysis::AnalysisExecutor::new(
                config.ai.gemini_api_key.clone(),
            )),
        );
        Self {
            executors,
            timeout: EXECUTOR_TIMEOUT,
        }
    }

    pub async fn run(&self, request: &SkillRequest) -> Result<SkillOutput, ExecError> {
        let skill_id = request.skill_id();
        let executor = self
            .executors
            .get(skill_id)
            .ok_or_else(|| ExecError::Unavailable(format!("no executor for {skill_id}")))?;

        match tokio::time::timeout(self.timeout, executor.execute(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(skill = skill_id, "Executor hit the 30s deadline");
                Err(ExecError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registry_runs_local_html_render() {
        let config = Config::for_tests("unused.json");
        let registry = ExecutorRegistry::from_config(&config);
        let out = registry
            .run(&SkillRequest::MarkdownToHtml {
                markdown: "# Hello".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(out.media_type, "text/html");
        match out.body {
            OutputBody::Text(html) => assert!(html.contains("Hello")),
            _ => panic!("expected text body"),
        }
    }

    #[tokio::test]
    async fn screenshot_without_backend_fails_as_value() {
        let config = Config::for_tests("unused.json");
        let registry = ExecutorRegistry::from_config(&config);
        let err = registry
            .run(&SkillRequest::Screenshot {
                url: "https://example.com".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Unavailable(_)));
    }

    #[test]
    fn bytes_output_becomes_file_part() {
        let out = SkillOutput::bytes("image/png", vec![1, 2, 3]);
        match out.into_part("shot.png") {
            Part::File { file } => {
                assert_eq!(file.mime_type, "image/png");
                assert_eq!(file.name, "shot.png");
                assert_eq!(BASE64.decode(file.bytes).unwrap(), vec![1, 2, 3]);
            }
            _ => panic!("expected file part"),
        }
    }
}
