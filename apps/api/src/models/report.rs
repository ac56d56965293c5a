use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

const HEADER_OPEN: &str = "<!-- assessment-header";
const HEADER_CLOSE: &str = "-->";

/// Tags a report may contain. Everything else is dropped, along with every attribute.
const REPORT_TAGS: &[&str] = &[
    "h1", "h2", "h3", "p", "strong", "em", "hr", "br", "ul", "ol", "li",
];
/// Dropped together with their content.
const REPORT_DROPPED_CONTENT_TAGS: &[&str] = &["script", "style"];

/// Generated report markup. Always sanitized; immutable once built;
/// clones share the same buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditReport(Arc<str>);

impl CreditReport {
    /// Builds a report from model or client markup, keeping only the report tag allowlist.
    pub fn new(text: impl AsRef<str>) -> Self {
        Self(sanitize_report_html(text.as_ref()).into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn header(&self) -> Option<ReportHeader> {
        ReportHeader::parse(&self.0)
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary::from_report(self)
    }
}

impl fmt::Display for CreditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for CreditReport {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    #[serde(rename = "Approve")]
    Approve,
    #[serde(rename = "Conditionally Approve")]
    ConditionallyApprove,
    #[serde(rename = "Conditionally Deny")]
    ConditionallyDeny,
    #[serde(rename = "Deny")]
    Deny,
}

impl Recommendation {
    /// Longest labels first so "Conditionally Deny" is never read as "Deny".
    const LABELS: [(&'static str, Recommendation); 4] = [
        ("Conditionally Approve", Recommendation::ConditionallyApprove),
        ("Conditionally Deny", Recommendation::ConditionallyDeny),
        ("Approve", Recommendation::Approve),
        ("Deny", Recommendation::Deny),
    ];

    pub fn label(self) -> &'static str {
        match self {
            Recommendation::Approve => "Approve",
            Recommendation::ConditionallyApprove => "Conditionally Approve",
            Recommendation::ConditionallyDeny => "Conditionally Deny",
            Recommendation::Deny => "Deny",
        }
    }

    /// Case-insensitive exact match on one of the four labels.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::LABELS
            .iter()
            .find(|(label, _)| label.eq_ignore_ascii_case(value))
            .map(|(_, r)| *r)
    }

    /// First label found in free text, preferring the longer labels.
    fn find_in(text: &str) -> Option<Self> {
        Self::LABELS
            .iter()
            .find(|(label, _)| text.contains(*label))
            .map(|(_, r)| *r)
    }
}

/// Machine-readable block the report prompt asks the model to emit first:
///
/// ```text
/// <!-- assessment-header
/// application_id: APP-1234
/// overall_score: 3
/// recommendation: Conditionally Approve
/// -->
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportHeader {
    pub application_id: Option<String>,
    pub overall_score: Option<u8>,
    pub recommendation: Option<Recommendation>,
}

impl ReportHeader {
    pub fn parse(report: &str) -> Option<Self> {
        let start = report.find(HEADER_OPEN)? + HEADER_OPEN.len();
        let len = report[start..].find(HEADER_CLOSE)?;

        let mut header = ReportHeader::default();
        for line in report[start..start + len].lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key.trim() {
                "application_id" => header.application_id = Some(value.to_string()),
                "overall_score" => header.overall_score = parse_score(value),
                "recommendation" => header.recommendation = Recommendation::parse(value),
                _ => {}
            }
        }
        Some(header)
    }
}

/// Scores outside 1..=5 are discarded.
fn parse_score(value: &str) -> Option<u8> {
    value
        .split(|c: char| !c.is_ascii_digit())
        .find(|s| !s.is_empty())
        .and_then(|s| s.parse::<u8>().ok())
        .filter(|s| (1..=5).contains(s))
}

/// Headline fields of a report, for API responses and logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub overall_score: Option<u8>,
    pub recommendation: Option<Recommendation>,
}

impl ReportSummary {
    /// Reads the header block, falling back to the report body when a field is missing.
    pub fn from_report(report: &CreditReport) -> Self {
        let header = report.header().unwrap_or_default();
        let body = report.as_str();
        Self {
            overall_score: header.overall_score.or_else(|| body_score(body)),
            recommendation: header
                .recommendation
                .or_else(|| body_recommendation(body)),
        }
    }
}

/// "<strong>3 out of 5</strong>" under the Overall Credit Score heading.
fn body_score(body: &str) -> Option<u8> {
    let section = &body[body.find("Overall Credit Score")?..];
    let end = section.find("out of 5")?;
    parse_score(strip_tags(&section[..end]).split_whitespace().last()?)
}

fn body_recommendation(body: &str) -> Option<Recommendation> {
    let start = body.find("Recommendation")? + "Recommendation".len();
    let section = &body[start..];
    // Only the first paragraph after the heading carries the label.
    let end = section.find("</p>").unwrap_or(section.len());
    Recommendation::find_in(&section[..end])
}

/// Allowlist cleaning of report markup. No attributes, so no URLs, event
/// handlers or inline styles survive. Comments are kept for the header block.
pub fn sanitize_report_html(html: &str) -> String {
    ammonia::Builder::empty()
        .add_tags(REPORT_TAGS)
        .add_clean_content_tags(REPORT_DROPPED_CONTENT_TAGS)
        .strip_comments(false)
        .clean(html)
        .to_string()
}

/// Removes anything between `<` and `>`.
pub fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
