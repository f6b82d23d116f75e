//! Markdown rendering: HTML locally, PDF via the rendering backend.

use async_trait::async_trait;
use pulldown_cmark::{html, Options, Parser};

use super::{ExecError, SkillExecutor, SkillOutput};
use crate::parser::SkillRequest;

/// Render markdown into a standalone HTML document.
pub fn render_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(markdown, options);
    let mut body = String::new();
    html::push_html(&mut body, parser);
    format!(
        "<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"></head>\n<body>\n{body}</body>\n</html>\n"
    )
}

pub struct MarkdownToHtmlExecutor;

#[async_trait]
impl SkillExecutor for MarkdownToHtmlExecutor {
    async fn execute(&self, request: &SkillRequest) -> Result<SkillOutput, ExecError> {
        let SkillRequest::MarkdownToHtml { markdown } = request else {
            return Err(ExecError::Unavailable("wrong request for markdown-to-html".into()));
        };
        Ok(SkillOutput::html(render_html(markdown)))
    }
}

/// Converts markdown to HTML locally, then asks the backend to typeset a PDF.
pub struct MarkdownToPdfExecutor {
    api_url: Option<String>,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl MarkdownToPdfExecutor {
    pub fn new(api_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            api_url,
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SkillExecutor for MarkdownToPdfExecutor {
    async fn execute(&self, request: &SkillRequest) -> Result<SkillOutput, ExecError> {
        let SkillRequest::MarkdownToPdf { markdown } = request else {
            return Err(ExecError::Unavailable("wrong request for markdown-to-pdf".into()));
        };
        let base = self
            .api_url
            .as_deref()
            .ok_or_else(|| ExecError::Unavailable("pdf backend not configured".into()))?;

        let mut req = self
            .client
            .post(format!("{base}/pdf"))
            .header("Content-Type", "text/html")
            .body(render_html(markdown));
        if let Some(key) = &self.api_key {
            req = req.header("X-Api-Key", key);
        }
        let response = req
            .send()
            .await
            .map_err(|e| ExecError::Backend(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ExecError::Backend(format!(
                "pdf backend returned {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExecError::Backend(e.to_string()))?;
        Ok(SkillOutput::bytes("application/pdf", bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_produces_document_with_heading() {
        let html = render_html("# Hello\n\nworld");
        assert!(html.contains("<h1>Hello</h1>"));
        assert!(html.contains("<p>world</p>"));
        assert!(html.starts_with("<!doctype html>"));
    }

    #[test]
    fn render_supports_tables() {
        let html = render_html("| a | b |\n|---|---|\n| 1 | 2 |");
        assert!(html.contains("<table>"));
    }

    #[tokio::test]
    async fn pdf_without_backend_is_unavailable() {
        let exec = MarkdownToPdfExecutor::new(None, None);
        let err = exec
            .execute(&SkillRequest::MarkdownToPdf {
                markdown: "# x".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Unavailable(_)));
    }
}
