//! Report generator: structured application data -> HTML credit report.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{error, info};

use crate::assessment::prompts::{build_report_prompt, REPORT_MAX_TOKENS, REPORT_MODEL, REPORT_SYSTEM};
use crate::errors::AppError;
use crate::llm_client::{strip_code_fences, CompletionModel, CompletionRequest, LlmError};
use crate::models::report::CreditReport;
use crate::retry::RetryPolicy;

const PROCESSING_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Everything the report prompt is built from.
#[derive(Debug, Clone)]
pub struct ReportInput<'a> {
    /// Serialized structured application data.
    pub application_json: &'a str,
    pub processed_at: DateTime<Utc>,
    pub requested_by: Option<&'a str>,
}

/// Fallback application ID derived from the application data.
/// Identical data always yields the same reference.
pub fn application_reference(application_json: &str) -> String {
    let digest = Sha256::digest(application_json.as_bytes());
    let hex: String = digest[..4].iter().map(|b| format!("{b:02X}")).collect();
    format!("APP-{hex}")
}

/// Asks the report model for an assessment of `input`, retrying transient failures.
pub async fn generate_report(
    llm: &dyn CompletionModel,
    retry: &RetryPolicy,
    input: &ReportInput<'_>,
) -> Result<CreditReport, AppError> {
    let processing_date = input.processed_at.format(PROCESSING_DATE_FORMAT).to_string();
    let reference = application_reference(input.application_json);
    let prompt = build_report_prompt(
        input.application_json,
        &processing_date,
        input.requested_by,
        &reference,
    );
    let request = CompletionRequest {
        model: REPORT_MODEL,
        max_tokens: REPORT_MAX_TOKENS,
        system: Some(REPORT_SYSTEM),
        prompt: &prompt,
    };

    let reply = retry
        .run("Report generation", || llm.complete(&request))
        .await
        .map_err(|e| {
            if let LlmError::Api { status, message } = &e {
                error!("Anthropic API error {status} during report generation: {message}");
            }
            AppError::llm("generating the credit report", &e)
        })?;

    let report = CreditReport::new(strip_code_fences(&reply));
    if report.as_str().trim().is_empty() {
        return Err(AppError::llm(
            "generating the credit report",
            &LlmError::EmptyContent,
        ));
    }

    let summary = report.summary();
    info!(
        "Credit report generated ({} chars, score {:?}, recommendation {:?})",
        report.as_str().len(),
        summary.overall_score,
        summary.recommendation
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;

    use super::*;
    use crate::assessment::fakes::{Reply, ScriptedModel};
    use crate::models::report::fixtures::SAMPLE_REPORT;

    fn input() -> ReportInput<'static> {
        ReportInput {
            application_json: r#"{"loan_amount":50000,"term":"12 months","name":"J.D."}"#,
            processed_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            requested_by: Some("AB"),
        }
    }

    #[test]
    fn test_reference_is_stable_and_data_dependent() {
        let a = application_reference(r#"{"a":1}"#);
        assert_eq!(a, application_reference(r#"{"a":1}"#));
        assert_ne!(a, application_reference(r#"{"a":2}"#));
        assert!(a.starts_with("APP-"));
        assert_eq!(a.len(), "APP-".len() + 8);
    }

    #[tokio::test]
    async fn test_prompt_carries_system_date_and_initials() {
        let model = ScriptedModel::new(vec![Reply::Text(SAMPLE_REPORT.to_string())]);
        let report = generate_report(&model, &RetryPolicy::default(), &input())
            .await
            .unwrap();

        assert_eq!(report.as_str(), SAMPLE_REPORT);
        let calls = model.calls();
        assert_eq!(calls[0].model, REPORT_MODEL);
        assert_eq!(calls[0].system.as_deref(), Some(REPORT_SYSTEM));
        assert!(calls[0].prompt.contains("Processing Date: 2024-03-01 10:00:00"));
        assert!(calls[0].prompt.contains("Requested By (initials): AB"));
        assert!(calls[0].prompt.contains(r#""loan_amount":50000"#));
    }

    #[tokio::test]
    async fn test_fenced_report_is_unwrapped() {
        let fenced = format!("```html\n{SAMPLE_REPORT}\n```");
        let model = ScriptedModel::new(vec![Reply::Text(fenced)]);
        let report = generate_report(&model, &RetryPolicy::default(), &input())
            .await
            .unwrap();
        assert_eq!(report.as_str(), SAMPLE_REPORT);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_three_attempts() {
        let model = ScriptedModel::new(vec![Reply::Status(529)]);
        let started = tokio::time::Instant::now();

        let err = generate_report(&model, &RetryPolicy::default(), &input())
            .await
            .unwrap_err();

        assert_eq!(model.calls().len(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(12));
        assert!(err.to_string().contains("API Error"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_on_second_attempt() {
        let model = ScriptedModel::new(vec![
            Reply::Status(503),
            Reply::Text(SAMPLE_REPORT.to_string()),
        ]);
        let report = generate_report(&model, &RetryPolicy::default(), &input())
            .await
            .unwrap();
        assert_eq!(model.calls().len(), 2);
        assert_eq!(report.summary().overall_score, Some(3));
    }

    #[tokio::test]
    async fn test_bad_request_is_not_retried() {
        let model = ScriptedModel::new(vec![Reply::Status(400)]);
        let err = generate_report(&model, &RetryPolicy::default(), &input())
            .await
            .unwrap_err();
        assert_eq!(model.calls().len(), 1);
        assert!(err.to_string().contains("Bad Request Error"));
    }

    #[tokio::test]
    async fn test_injected_markup_is_stripped_from_report() {
        let reply = format!(
            "{SAMPLE_REPORT}\n<img src=x onerror=\"alert(document.cookie)\"><script>alert(1)</script>"
        );
        let model = ScriptedModel::new(vec![Reply::Text(reply)]);
        let report = generate_report(&model, &RetryPolicy::default(), &input())
            .await
            .unwrap();

        assert!(!report.as_str().contains("onerror"));
        assert!(!report.as_str().contains("<script"));
        assert!(!report.as_str().contains("alert("));
        assert_eq!(report.summary().overall_score, Some(3));
    }

    #[tokio::test]
    async fn test_script_only_reply_is_an_error() {
        let model = ScriptedModel::new(vec![Reply::Text("<script>alert(1)</script>".to_string())]);
        let result = generate_report(&model, &RetryPolicy::default(), &input()).await;
        assert!(matches!(result, Err(AppError::Llm(_))));
    }

    #[tokio::test]
    async fn test_blank_reply_is_an_error() {
        let model = ScriptedModel::new(vec![Reply::Text("```\n```".to_string())]);
        let result = generate_report(&model, &RetryPolicy::default(), &input()).await;
        assert!(matches!(result, Err(AppError::Llm(_))));
    }
}
