//! Citation Extractor - Structured citation records and their HTML rendering
//!
//! Citation payloads arrive as JSON text inside each citation's `content`.
//! Two extraction paths exist:
//! - [`CitationMode::Structured`]: parse every citation on its own, drop
//!   incomplete ones, escape values on render
//! - [`CitationMode::Legacy`]: concatenate intermediate HTML and mine field
//!   values back out of it, zipped by position

use crate::config::CitationMode;
use crate::llm::{message_citations, message_content};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Answer text the grounded endpoint returns when nothing relevant was found
pub const UNAVAILABLE_SENTINEL: &str =
    "The requested information is not available in the retrieved data. Please try another query or topic.";

/// One cited passage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationRecord {
    pub chunk: String,
    pub disease: String,
    pub source: String,
}

/// Partially-present fields of a citation payload
#[derive(Deserialize)]
struct RawCitation {
    chunk: Option<String>,
    disease: Option<String>,
    source: Option<String>,
}

impl RawCitation {
    fn complete(self) -> Option<CitationRecord> {
        Some(CitationRecord {
            chunk: self.chunk?,
            disease: self.disease?,
            source: self.source?,
        })
    }
}

#[derive(Debug, Clone)]
struct FieldPatterns {
    chunk: Regex,
    disease: Regex,
    source: Regex,
}

impl FieldPatterns {
    fn new() -> Result<Self, regex_lite::Error> {
        let field = |name: &str| Regex::new(&format!(r#""{}"\s*:\s*"([^"]+)""#, name));
        Ok(Self {
            chunk: field("chunk")?,
            disease: field("disease")?,
            source: field("source")?,
        })
    }

    fn all(pattern: &Regex, text: &str) -> Vec<String> {
        pattern
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }

    fn first(pattern: &Regex, text: &str) -> Option<String> {
        pattern
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }
}

/// Extracts and renders citations from grounded completion responses
#[derive(Debug, Clone)]
pub struct CitationExtractor {
    mode: CitationMode,
    patterns: FieldPatterns,
}

impl CitationExtractor {
    pub fn new(mode: CitationMode) -> Result<Self, regex_lite::Error> {
        Ok(Self {
            mode,
            patterns: FieldPatterns::new()?,
        })
    }

    pub fn mode(&self) -> CitationMode {
        self.mode
    }

    /// Citation records in upstream order.
    ///
    /// Empty when the answer is the unavailable sentinel or the response
    /// carries no citations.
    pub fn extract(&self, response: &Value) -> Vec<CitationRecord> {
        if message_content(response) == Some(UNAVAILABLE_SENTINEL) {
            return Vec::new();
        }

        let Some(citations) = message_citations(response) else {
            return Vec::new();
        };

        let contents = citations
            .iter()
            .map(|c| c.get("content").and_then(Value::as_str).unwrap_or_default());

        match self.mode {
            CitationMode::Structured => contents.filter_map(|c| self.parse_one(c)).collect(),
            CitationMode::Legacy => self.mine_concatenated(contents),
        }
    }

    /// Render records as collapsible HTML blocks joined by newlines
    pub fn render(&self, records: &[CitationRecord]) -> String {
        let escape = self.mode == CitationMode::Structured;
        let field = |value: &str| {
            if escape {
                escape_html(value)
            } else {
                value.to_string()
            }
        };

        records
            .iter()
            .enumerate()
            .map(|(idx, record)| {
                format!(
                    "<details>\n    <summary>Doc{}</summary>\n    <h3>Original Text</h3>\n    <span>{}</span>\n    <h3>Data Sources</h3>\n    <span><b>disease</b>: {}, <b>source</b>: {}</span>\n</details>\n<br>",
                    idx + 1,
                    field(&record.chunk),
                    field(&record.disease),
                    field(&record.source)
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Extract then render
    pub fn citations_html(&self, response: &Value) -> String {
        self.render(&self.extract(response))
    }

    fn parse_one(&self, content: &str) -> Option<CitationRecord> {
        match serde_json::from_str::<RawCitation>(content) {
            Ok(raw) => raw.complete(),
            Err(_) => Some(CitationRecord {
                chunk: FieldPatterns::first(&self.patterns.chunk, content)?,
                disease: FieldPatterns::first(&self.patterns.disease, content)?,
                source: FieldPatterns::first(&self.patterns.source, content)?,
            }),
        }
    }

    fn mine_concatenated<'a>(&self, contents: impl Iterator<Item = &'a str>) -> Vec<CitationRecord> {
        let html: String = contents
            .enumerate()
            .map(|(idx, c)| format!("<details><summary>Doc{}</summary><ul>{}</ul></details>", idx + 1, c))
            .collect();

        let chunks = FieldPatterns::all(&self.patterns.chunk, &html);
        let diseases = FieldPatterns::all(&self.patterns.disease, &html);
        let sources = FieldPatterns::all(&self.patterns.source, &html);

        chunks
            .into_iter()
            .zip(diseases)
            .zip(sources)
            .map(|((chunk, disease), source)| CitationRecord { chunk, disease, source })
            .collect()
    }
}

/// Minimal HTML escaping for text and attribute contexts
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(content: &str, citations: Vec<&str>) -> Value {
        let citations: Vec<Value> = citations.into_iter().map(|c| json!({ "content": c })).collect();
        json!({ "choices": [{ "message": {
            "role": "assistant",
            "content": content,
            "context": { "citations": citations }
        }}]})
    }

    fn structured() -> CitationExtractor {
        CitationExtractor::new(CitationMode::Structured).unwrap()
    }

    fn legacy() -> CitationExtractor {
        CitationExtractor::new(CitationMode::Legacy).unwrap()
    }

    #[test]
    fn test_incomplete_citation_dropped() {
        let body = response(
            "answer",
            vec![
                r#"{"chunk": "Migraine is...", "disease": "migraine", "source": "KDCA"}"#,
                r#"{"chunk": "Tension headache...", "disease": "headache", "source": "MSD"}"#,
                r#"{"chunk": "Cluster...", "disease": "cluster headache"}"#,
            ],
        );
        let extractor = structured();
        let records = extractor.extract(&body);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].source, "MSD");

        let html = extractor.render(&records);
        assert_eq!(html.matches("<details>").count(), 2);
        assert!(html.contains("<summary>Doc2</summary>"));
    }

    #[test]
    fn test_sentinel_skips_extraction() {
        let body = response(
            UNAVAILABLE_SENTINEL,
            vec![r#"{"chunk": "c", "disease": "d", "source": "s"}"#],
        );
        assert!(structured().extract(&body).is_empty());
        assert!(legacy().extract(&body).is_empty());
        assert_eq!(structured().citations_html(&body), "");
    }

    #[test]
    fn test_render_block_layout() {
        let record = CitationRecord {
            chunk: "chunk text".into(),
            disease: "flu".into(),
            source: "KDCA".into(),
        };
        let html = structured().render(&[record.clone(), record]);
        let expected_block = |n: usize| {
            format!(
                "<details>\n    <summary>Doc{}</summary>\n    <h3>Original Text</h3>\n    <span>chunk text</span>\n    <h3>Data Sources</h3>\n    <span><b>disease</b>: flu, <b>source</b>: KDCA</span>\n</details>\n<br>",
                n
            )
        };
        assert_eq!(html, format!("{}\n{}", expected_block(1), expected_block(2)));
    }

    #[test]
    fn test_structured_escapes_values() {
        let body = response(
            "answer",
            vec![r#"{"chunk": "<script>alert(1)</script>", "disease": "a & b", "source": "s"}"#],
        );
        let html = structured().citations_html(&body);
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(html.contains("a &amp; b"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_structured_falls_back_to_patterns() {
        let body = response(
            "answer",
            vec![r#"title: x, "chunk": "text", "disease": "flu", "source": "KDCA" (truncated"#],
        );
        assert_eq!(
            structured().extract(&body),
            vec![CitationRecord { chunk: "text".into(), disease: "flu".into(), source: "KDCA".into() }]
        );
    }

    #[test]
    fn test_legacy_zips_by_position() {
        // The incomplete middle citation shifts later sources onto earlier records
        let body = response(
            "answer",
            vec![
                r#"{"chunk": "c1", "disease": "d1", "source": "s1"}"#,
                r#"{"chunk": "c2", "disease": "d2"}"#,
                r#"{"chunk": "c3", "disease": "d3", "source": "s3"}"#,
            ],
        );
        let records = legacy().extract(&body);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].chunk, "c2");
        assert_eq!(records[1].source, "s3");
    }

    #[test]
    fn test_legacy_does_not_escape() {
        let record = CitationRecord { chunk: "<b>x</b>".into(), disease: "d".into(), source: "s".into() };
        assert!(legacy().render(&[record]).contains("<span><b>x</b></span>"));
    }

    #[test]
    fn test_no_citations() {
        let body = json!({ "choices": [{ "message": { "content": "answer" } }] });
        assert!(structured().extract(&body).is_empty());
        assert_eq!(structured().render(&[]), "");
    }
}
