use axum::{
    extract::{multipart::Field, Multipart, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use bytes::BytesMut;
use serde::Deserialize;

use crate::assessment::{Assessment, AssessmentRequest};
use crate::errors::AppError;
use crate::extraction::{ExtractionError, Upload, MAX_UPLOAD_BYTES};
use crate::models::report::CreditReport;
use crate::state::AppState;

const FILE_FIELD: &str = "file";
const REQUESTED_BY_FIELD: &str = "requested_by";
const MAX_INITIALS_LEN: usize = 16;

#[derive(Deserialize)]
pub struct ExportRequest {
    pub report: String,
}

/// POST /api/v1/assessments
/// Multipart form: `file` (PDF, required) and `requested_by` (initials, optional).
pub async fn handle_assess(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Assessment>, AppError> {
    let mut upload = None;
    let mut requested_by = None;

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some(FILE_FIELD) => {
                let file_name = field.file_name().unwrap_or("upload.pdf").to_string();
                let declared_size = declared_part_size(field.headers());
                if let Some(size) = declared_size.filter(|size| *size > MAX_UPLOAD_BYTES) {
                    return Err(ExtractionError::TooLarge { size }.into());
                }
                let bytes = read_capped(&mut field).await?;
                upload = Some(Upload::new(file_name, bytes).with_declared_size(declared_size));
            }
            Some(REQUESTED_BY_FIELD) => {
                let text = field.text().await?;
                requested_by = normalize_initials(&text)?;
            }
            _ => {}
        }
    }

    let upload =
        upload.ok_or_else(|| AppError::Validation("Missing 'file' field".to_string()))?;
    let assessment = state
        .pipeline
        .assess(AssessmentRequest {
            upload,
            requested_by,
        })
        .await?;
    Ok(Json(assessment))
}

/// POST /api/v1/assessments/export
/// Renders a previously generated report and returns it as a PDF attachment.
pub async fn handle_export(
    State(state): State<AppState>,
    Json(req): Json<ExportRequest>,
) -> Result<Response, AppError> {
    let report = CreditReport::new(&req.report);
    if report.as_str().trim().is_empty() {
        return Err(AppError::Validation("Report must not be empty".to_string()));
    }

    let pdf = state.pipeline.export(&report).await?;
    let disposition = format!("attachment; filename=\"{}\"", pdf.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, pdf.mime_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf.bytes,
    )
        .into_response())
}

/// Reads a multipart field chunk by chunk, stopping as soon as it passes the upload ceiling.
async fn read_capped(field: &mut Field<'_>) -> Result<bytes::Bytes, AppError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field.chunk().await? {
        let size = buf.len() + chunk.len();
        if size > MAX_UPLOAD_BYTES {
            return Err(ExtractionError::TooLarge { size }.into());
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

/// Size the client announced for the file part, if it sent one.
fn declared_part_size(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn normalize_initials(raw: &str) -> Result<Option<String>, AppError> {
    let initials = raw.trim();
    if initials.is_empty() {
        return Ok(None);
    }
    if initials.chars().count() > MAX_INITIALS_LEN {
        return Err(AppError::Validation(format!(
            "'requested_by' must be at most {MAX_INITIALS_LEN} characters"
        )));
    }
    Ok(Some(initials.to_string()))
}
