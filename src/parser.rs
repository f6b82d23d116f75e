//! Keyword/URL request classifier.
//!
//! Maps free-form user text onto a skill and its arguments. The rule order is
//! load-bearing and first-match-wins; callers must not reorder it.

use serde::{Deserialize, Serialize};

/// A parsed request: the skill to run and its arguments. Serialises with the
/// skill id as the tag so it can be cached on task metadata verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "skill", rename_all = "kebab-case")]
pub enum SkillRequest {
    Screenshot { url: String },
    MarkdownToPdf { markdown: String },
    MarkdownToHtml { markdown: String },
    AiAnalysis { content: String },
}

impl SkillRequest {
    pub fn skill_id(&self) -> &'static str {
        match self {
            SkillRequest::Screenshot { .. } => "screenshot",
            SkillRequest::MarkdownToPdf { .. } => "markdown-to-pdf",
            SkillRequest::MarkdownToHtml { .. } => "markdown-to-html",
            SkillRequest::AiAnalysis { .. } => "ai-analysis",
        }
    }
}

const ANALYSIS_CUES: [&str; 6] = ["analyze", "analysis", "summarize", "summary", "gemini", "ai "];

/// Classify `text` into a skill request. Rules, in order:
/// 1. analysis cue words → `ai-analysis`
/// 2. `pdf` (and not URL-leading) → `markdown-to-pdf`
/// 3. `html` (and not URL-leading) → `markdown-to-html`
/// 4. an http(s) URL anywhere → `screenshot`
/// 5. fallback → `markdown-to-html` over the whole text
pub fn parse_request(text: &str) -> SkillRequest {
    let lower = text.to_lowercase();

    for cue in ANALYSIS_CUES {
        if let Some(idx) = lower.find(cue) {
            return SkillRequest::AiAnalysis {
                content: analysis_content(text, idx + cue.len()),
            };
        }
    }

    if lower.contains("pdf") && !starts_with_url(&lower) {
        return SkillRequest::MarkdownToPdf {
            markdown: strip_preamble(text, "convert to pdf"),
        };
    }

    if lower.contains("html") && !starts_with_url(&lower) {
        return SkillRequest::MarkdownToHtml {
            markdown: strip_preamble(text, "convert to html"),
        };
    }

    if let Some(url) = first_url(text) {
        return SkillRequest::Screenshot { url };
    }

    SkillRequest::MarkdownToHtml {
        markdown: text.trim().to_string(),
    }
}

/// Content for the analysis skill: the portion after a `:` following the cue,
/// or the whole text when no punctuation follows.
fn analysis_content(text: &str, cue_end: usize) -> String {
    let rest = match text.get(cue_end..) {
        Some(r) => r,
        // Lowercasing shifted byte offsets (non-ASCII input): keep everything.
        None => return text.trim().to_string(),
    };
    match rest.find(':') {
        Some(i) => {
            let after = rest[i + 1..].trim();
            if after.is_empty() {
                text.trim().to_string()
            } else {
                after.to_string()
            }
        }
        None => text.trim().to_string(),
    }
}

fn strip_preamble(text: &str, preamble: &str) -> String {
    let trimmed = text.trim();
    let lower = trimmed.to_lowercase();
    if lower.starts_with(preamble) {
        let rest = trimmed.get(preamble.len()..).unwrap_or("");
        return rest.trim_start_matches(':').trim().to_string();
    }
    trimmed.to_string()
}

fn starts_with_url(lower: &str) -> bool {
    let t = lower.trim_start();
    t.starts_with("http://") || t.starts_with("https://")
}

/// First http(s) URL token in the text, trailing punctuation trimmed.
fn first_url(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let idx = lower.find("https://").or_else(|| lower.find("http://"))?;
    let candidate = text.get(idx..)?;
    let end = candidate
        .find(char::is_whitespace)
        .unwrap_or(candidate.len());
    let url = candidate[..end].trim_end_matches(['.', ',', ';', '!', '?', ')']);
    if url.is_empty() {
        None
    } else {
        Some(url.to_string())
    }
}
