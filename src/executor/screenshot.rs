//! Screenshot capture via the rendering backend.

use async_trait::async_trait;

use super::{ExecError, SkillExecutor, SkillOutput};
use crate::parser::SkillRequest;

pub struct ScreenshotExecutor {
    api_url: Option<String>,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl ScreenshotExecutor {
    pub fn new(api_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            api_url,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SkillExecutor for ScreenshotExecutor {
    async fn execute(&self, request: &SkillRequest) -> Result<SkillOutput, ExecError> {
        let SkillRequest::Screenshot { url } = request else {
            return Err(ExecError::Unavailable("wrong request for screenshot".into()));
        };
        let base = self
            .api_url
            .as_deref()
            .ok_or_else(|| ExecError::Unavailable("screenshot backend not configured".into()))?;

        let mut req = self
            .client
            .get(format!("{base}/screenshot"))
            .query(&[("url", url.as_str()), ("full_page", "true")]);
        if let Some(key) = &self.api_key {
            req = req.header("X-Api-Key", key);
        }
        let response = req
            .send()
            .await
            .map_err(|e| ExecError::Backend(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ExecError::Backend(format!(
                "screenshot backend returned {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExecError::Backend(e.to_string()))?;
        Ok(SkillOutput::bytes("image/png", bytes.to_vec()))
    }
}
