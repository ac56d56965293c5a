//! Assessment pipeline orchestration.
//!
//! `upload -> extract -> structure -> report -> store -> (export on demand)`.
//! Each stage only runs when the previous one succeeded; the first failure
//! ends the run and is returned to the caller. Collaborators are trait objects
//! so tests can swap in fakes.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assessment::persister::{store_credit_report, store_processed_data};
use crate::assessment::prompts::{
    REPORT_MODEL, REPORT_PROMPT_TEMPLATE, REPORT_SYSTEM, STRUCTURING_MODEL,
    STRUCTURING_PROMPT_TEMPLATE,
};
use crate::assessment::report::{generate_report, ReportInput};
use crate::assessment::structurer::{parse_structured_reply, request_structured_data};
use crate::cache::{Stage, StageCache, StageKey};
use crate::db::RecordStore;
use crate::errors::AppError;
use crate::export::{export_report, extract_application_id, file_name_for, ExportedPdf, PdfRenderer};
use crate::extraction::{check_size, extract, Upload};
use crate::llm_client::CompletionModel;
use crate::models::application::StructuredApplication;
use crate::models::report::{CreditReport, ReportSummary};
use crate::retry::RetryPolicy;

const EXTRACTOR_ID: &str = "lopdf";

/// Cached form of the report stage. The timestamp is the one the report was written with.
#[derive(Debug, Serialize, Deserialize)]
struct GeneratedReport {
    processed_at: DateTime<Utc>,
    report: String,
}

/// One run's input.
#[derive(Debug, Clone)]
pub struct AssessmentRequest {
    pub upload: Upload,
    /// Initials of the credit officer asking for the report.
    pub requested_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredRecords {
    pub processed_data_id: Uuid,
    pub credit_report_id: Uuid,
}

/// Result of a successful run, returned to the UI.
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub application_id: String,
    /// Name the exported PDF will carry.
    pub file_name: String,
    pub processed_at: DateTime<Utc>,
    pub extracted_chars: usize,
    pub application: StructuredApplication,
    pub report: CreditReport,
    pub summary: ReportSummary,
    pub records: StoredRecords,
}

#[derive(Clone)]
pub struct Pipeline {
    llm: Arc<dyn CompletionModel>,
    store: Arc<dyn RecordStore>,
    renderer: Arc<dyn PdfRenderer>,
    cache: Option<Arc<dyn StageCache>>,
    retry: RetryPolicy,
}

impl Pipeline {
    pub fn new(
        llm: Arc<dyn CompletionModel>,
        store: Arc<dyn RecordStore>,
        renderer: Arc<dyn PdfRenderer>,
    ) -> Self {
        Self {
            llm,
            store,
            renderer,
            cache: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn StageCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Runs every stage up to and including persistence.
    pub async fn assess(&self, request: AssessmentRequest) -> Result<Assessment, AppError> {
        let AssessmentRequest {
            upload,
            requested_by,
        } = request;
        info!(
            "Assessing '{}' ({} bytes)",
            upload.file_name,
            upload.bytes.len()
        );

        // Oversized uploads never reach the cache or the parser.
        check_size(&upload)?;

        let extraction_key = StageKey::new(Stage::Extraction, EXTRACTOR_ID, &[], &upload.bytes);
        let extracted_text = self
            .cached(extraction_key, || async {
                extract(&upload).await.map_err(AppError::from)
            })
            .await?;

        let structuring_key = StageKey::new(
            Stage::Structuring,
            STRUCTURING_MODEL,
            &[STRUCTURING_PROMPT_TEMPLATE],
            extracted_text.as_bytes(),
        );
        let reply = self
            .cached(structuring_key, || {
                request_structured_data(self.llm.as_ref(), &self.retry, &extracted_text)
            })
            .await?;
        let application = parse_structured_reply(&reply);

        let application_json = serde_json::to_string(&application.data)
            .map_err(|e| AppError::Internal(e.into()))?;
        let report_key = StageKey::new(
            Stage::Report,
            REPORT_MODEL,
            &[REPORT_SYSTEM, REPORT_PROMPT_TEMPLATE],
            report_cache_input(&application_json, requested_by.as_deref()).as_bytes(),
        );
        let generated: GeneratedReport = self
            .cached(report_key, || async {
                let processed_at = Utc::now();
                let input = ReportInput {
                    application_json: &application_json,
                    processed_at,
                    requested_by: requested_by.as_deref(),
                };
                let report = generate_report(self.llm.as_ref(), &self.retry, &input).await?;
                Ok(GeneratedReport {
                    processed_at,
                    report: report.as_str().to_string(),
                })
            })
            .await?;
        let processed_at = generated.processed_at;
        let report = CreditReport::new(generated.report);

        let processed_data_id =
            store_processed_data(self.store.as_ref(), &self.retry, &application.data).await?;
        let credit_report_id =
            store_credit_report(self.store.as_ref(), &self.retry, &report).await?;

        let application_id = extract_application_id(report.as_str());
        let summary = report.summary();
        info!(
            "Assessment complete for {application_id}: score {:?}, {}",
            summary.overall_score,
            summary.recommendation.map_or("no recommendation", |r| r.label())
        );

        Ok(Assessment {
            file_name: file_name_for(&application_id),
            application_id,
            processed_at,
            extracted_chars: extracted_text.chars().count(),
            application,
            report,
            summary,
            records: StoredRecords {
                processed_data_id,
                credit_report_id,
            },
        })
    }

    /// Renders a report to PDF. Nothing is stored.
    pub async fn export(&self, report: &CreditReport) -> Result<ExportedPdf, AppError> {
        Ok(export_report(self.renderer.as_ref(), report).await?)
    }

    /// Returns the cached value for `key`, or computes and caches it.
    /// Values are stored as JSON. Cache failures and unreadable entries are
    /// logged and otherwise ignored; errors are never cached.
    async fn cached<T, F, Fut>(&self, key: StageKey, compute: F) -> Result<T, AppError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let Some(cache) = &self.cache else {
            return compute().await;
        };

        match cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    debug!("Cache hit for {:?} stage", key.stage);
                    return Ok(value);
                }
                Err(e) => warn!("Discarding unreadable {:?} cache entry: {e}", key.stage),
            },
            Ok(None) => {}
            Err(e) => warn!("Cache lookup failed for {:?} stage: {e}", key.stage),
        }

        let value = compute().await?;
        match serde_json::to_string(&value) {
            Ok(raw) => {
                if let Err(e) = cache.put(&key, &raw).await {
                    warn!("Cache write failed for {:?} stage: {e}", key.stage);
                }
            }
            Err(e) => warn!("Could not encode {:?} stage result for caching: {e}", key.stage),
        }
        Ok(value)
    }
}

/// The processing date is left out so a re-upload can reuse an earlier report.
fn report_cache_input(application_json: &str, requested_by: Option<&str>) -> String {
    format!("{}\n{application_json}", requested_by.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::assessment::fakes::{RecordingStore, Reply, ScriptedModel};
    use crate::cache::memory::{FailingStageCache, MemoryStageCache};
    use crate::export::application_id::APPLICATION_ID_NOT_FOUND;
    use crate::export::fakes::RecordingRenderer;
    use crate::extraction::fixtures::pdf_with_pages;
    use crate::extraction::MAX_UPLOAD_BYTES;
    use crate::models::report::fixtures::SAMPLE_REPORT;

    const FORM_TEXT: &str = "Loan Amount: 50000, Term: 12 months, Name: J.D.";
    const STRUCTURED: &str = r#"{"loan_amount": 50000, "term": "12 months", "name": "J.D."}"#;

    struct Harness {
        model: Arc<ScriptedModel>,
        store: Arc<RecordingStore>,
        renderer: Arc<RecordingRenderer>,
        pipeline: Pipeline,
    }

    fn harness(replies: Vec<Reply>) -> Harness {
        let model = Arc::new(ScriptedModel::new(replies));
        let store = Arc::new(RecordingStore::default());
        let renderer = Arc::new(RecordingRenderer::default());
        let pipeline = Pipeline::new(model.clone(), store.clone(), renderer.clone());
        Harness {
            model,
            store,
            renderer,
            pipeline,
        }
    }

    fn happy_replies() -> Vec<Reply> {
        vec![
            Reply::Text(STRUCTURED.to_string()),
            Reply::Text(SAMPLE_REPORT.to_string()),
        ]
    }

    fn request(bytes: Vec<u8>) -> AssessmentRequest {
        AssessmentRequest {
            upload: Upload::new("application.pdf", bytes),
            requested_by: Some("AB".to_string()),
        }
    }

    #[tokio::test]
    async fn test_full_run_stores_two_records_and_exports() {
        let h = harness(happy_replies());

        let assessment = h
            .pipeline
            .assess(request(pdf_with_pages(&[FORM_TEXT])))
            .await
            .unwrap();

        // Structuring saw the extracted text verbatim.
        let calls = h.model.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].prompt.contains(FORM_TEXT));

        assert_eq!(h.store.processed_data().len(), 1);
        assert_eq!(h.store.credit_reports().len(), 1);
        assert_eq!(h.store.processed_data()[0].1["loan_amount"], 50000);
        assert_eq!(
            assessment.records,
            StoredRecords {
                processed_data_id: h.store.processed_data()[0].0,
                credit_report_id: h.store.credit_reports()[0].0,
            }
        );

        assert_eq!(assessment.application_id, "APP-2024-0042");
        assert!(assessment.application.warnings.is_empty());
        assert_eq!(assessment.summary.overall_score, Some(3));

        let pdf = h.pipeline.export(&assessment.report).await.unwrap();
        assert!(!pdf.bytes.is_empty());
        assert!(pdf.file_name.contains("APP-2024-0042"));
        assert_eq!(pdf.file_name, assessment.file_name);
        assert_eq!(h.renderer.inputs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_upload_stops_before_llm_and_db() {
        let h = harness(happy_replies());
        let result = h.pipeline.assess(request(Vec::new())).await;

        assert!(matches!(result, Err(AppError::Extraction(_))));
        assert!(h.model.calls().is_empty());
        assert_eq!(h.store.attempts(), 0);
    }

    #[tokio::test]
    async fn test_non_pdf_upload_stops_before_llm_and_db() {
        let h = harness(happy_replies());
        let result = h
            .pipeline
            .assess(request(b"name,amount\nJ.D.,50000\n".to_vec()))
            .await;

        assert!(matches!(result, Err(AppError::Extraction(_))));
        assert!(h.model.calls().is_empty());
        assert_eq!(h.store.attempts(), 0);
    }

    #[tokio::test]
    async fn test_oversized_upload_is_a_warning_and_touches_nothing() {
        let h = harness(happy_replies());
        let result = h
            .pipeline
            .assess(request(vec![b'%'; MAX_UPLOAD_BYTES + 1]))
            .await;

        assert!(matches!(result, Err(AppError::FileTooLarge(_))));
        assert!(h.model.calls().is_empty());
        assert_eq!(h.store.attempts(), 0);
    }

    #[tokio::test]
    async fn test_non_json_structuring_reply_is_wrapped_and_stored() {
        let prose = "The applicant requests 50000 over 12 months.";
        let h = harness(vec![
            Reply::Text(prose.to_string()),
            Reply::Text(SAMPLE_REPORT.to_string()),
        ]);

        let assessment = h
            .pipeline
            .assess(request(pdf_with_pages(&[FORM_TEXT])))
            .await
            .unwrap();

        assert_eq!(h.store.processed_data()[0].1, json!({ "data": prose }));
        assert!(!assessment.application.parsed);
        assert!(h.model.calls()[1].prompt.contains(prose));
    }

    #[tokio::test]
    async fn test_report_failure_stores_nothing() {
        let h = harness(vec![
            Reply::Text(STRUCTURED.to_string()),
            Reply::Status(400),
        ]);

        let result = h
            .pipeline
            .assess(request(pdf_with_pages(&[FORM_TEXT])))
            .await;

        assert!(matches!(result, Err(AppError::Llm(_))));
        assert_eq!(h.store.attempts(), 0);
    }

    #[tokio::test]
    async fn test_report_without_id_still_completes() {
        let h = harness(vec![
            Reply::Text(STRUCTURED.to_string()),
            Reply::Text("<h1>Credit Assessment Report</h1><p>No id.</p>".to_string()),
        ]);

        let assessment = h
            .pipeline
            .assess(request(pdf_with_pages(&[FORM_TEXT])))
            .await
            .unwrap();

        assert_eq!(assessment.application_id, APPLICATION_ID_NOT_FOUND);
        assert_eq!(
            assessment.file_name,
            format!("{APPLICATION_ID_NOT_FOUND}_credit_assessment_report.pdf")
        );
    }

    #[tokio::test]
    async fn test_repeat_upload_is_served_from_cache() {
        let h = harness(happy_replies());
        let cache = Arc::new(MemoryStageCache::default());
        let pipeline = h.pipeline.clone().with_cache(cache.clone());
        let pdf = pdf_with_pages(&[FORM_TEXT]);

        let first = pipeline.assess(request(pdf.clone())).await.unwrap();
        let second = pipeline.assess(request(pdf)).await.unwrap();

        assert_eq!(h.model.calls().len(), 2);
        assert_eq!(cache.len(), 3);
        assert_eq!(first.report, second.report);
        // The cached report was dated by the first run, and so is the reuse.
        assert_eq!(first.processed_at, second.processed_at);
        // Every run is persisted, cached or not.
        assert_eq!(h.store.processed_data().len(), 2);
        assert_eq!(h.store.credit_reports().len(), 2);
        assert_ne!(first.records, second.records);
    }

    #[tokio::test]
    async fn test_failed_stage_is_not_cached() {
        let h = harness(vec![Reply::Status(400), Reply::Text(STRUCTURED.to_string())]);
        let cache = Arc::new(MemoryStageCache::default());
        let pipeline = h.pipeline.clone().with_cache(cache.clone());

        let result = pipeline.assess(request(pdf_with_pages(&[FORM_TEXT]))).await;

        assert!(result.is_err());
        // Only the extraction result made it into the cache.
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_cache_does_not_fail_the_run() {
        let h = harness(happy_replies());
        let cache = Arc::new(FailingStageCache::default());
        let pipeline = h.pipeline.clone().with_cache(cache.clone());

        let assessment = pipeline
            .assess(request(pdf_with_pages(&[FORM_TEXT])))
            .await
            .unwrap();

        assert_eq!(assessment.application_id, "APP-2024-0042");
        assert_eq!(h.model.calls().len(), 2);
        assert_eq!(h.store.credit_reports().len(), 1);
        // Every stage tried the cache both ways.
        assert_eq!(cache.gets(), 3);
        assert_eq!(cache.puts(), 3);
    }

    #[tokio::test]
    async fn test_unreadable_cache_entry_is_recomputed() {
        let h = harness(happy_replies());
        let cache = Arc::new(MemoryStageCache::default());
        let pipeline = h.pipeline.clone().with_cache(cache.clone());
        let pdf = pdf_with_pages(&[FORM_TEXT]);
        let key = StageKey::new(Stage::Extraction, EXTRACTOR_ID, &[], &pdf);
        cache.put(&key, "not json").await.unwrap();

        let assessment = pipeline.assess(request(pdf)).await.unwrap();

        assert!(assessment.extracted_chars >= FORM_TEXT.chars().count());
        assert!(h.model.calls()[0].prompt.contains(FORM_TEXT));
    }

    #[tokio::test]
    async fn test_stored_report_is_cleaned() {
        let h = harness(vec![
            Reply::Text(STRUCTURED.to_string()),
            Reply::Text(format!("{SAMPLE_REPORT}<img src=x onerror=\"alert(1)\">")),
        ]);

        let assessment = h
            .pipeline
            .assess(request(pdf_with_pages(&[FORM_TEXT])))
            .await
            .unwrap();

        assert!(!assessment.report.as_str().contains("onerror"));
        assert!(!h.store.credit_reports()[0].1.contains("onerror"));
    }
}
