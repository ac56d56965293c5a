// Exporter: report text -> HTML shell -> PDF bytes, named after the application ID.

pub mod application_id;
pub mod renderer;

pub use application_id::extract_application_id;
pub use renderer::{PdfRenderer, RenderError, WeasyPrintRenderer};

use tracing::info;

use crate::models::report::CreditReport;

pub const PDF_MIME_TYPE: &str = "application/pdf";
const FILE_NAME_SUFFIX: &str = "_credit_assessment_report.pdf";

/// Page-level rules only; the report typography comes from the external stylesheet.
const SHELL_STYLE: &str = "@page { size: A4; margin: 2cm; }";

/// A rendered report, delivered straight to the user and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedPdf {
    pub application_id: String,
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Wraps report markup in the fixed HTML document handed to the renderer.
pub fn wrap_report_html(report: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>Credit Assessment Report</title>\n<style>{SHELL_STYLE}</style>\n</head>\n\
         <body>\n{report}\n</body>\n</html>\n"
    )
}

pub fn file_name_for(application_id: &str) -> String {
    format!("{application_id}{FILE_NAME_SUFFIX}")
}

/// Renders `report` to PDF. The same report always yields the same HTML input.
pub async fn export_report(
    renderer: &dyn PdfRenderer,
    report: &CreditReport,
) -> Result<ExportedPdf, RenderError> {
    let application_id = extract_application_id(report.as_str());
    let html = wrap_report_html(report.as_str());
    let bytes = renderer.render(&html).await?;
    if bytes.is_empty() {
        return Err(RenderError::EmptyOutput);
    }

    let file_name = file_name_for(&application_id);
    info!("Exported {file_name} ({} bytes)", bytes.len());

    Ok(ExportedPdf {
        application_id,
        file_name,
        mime_type: PDF_MIME_TYPE,
        bytes,
    })
}


#[cfg(test)]
mod tests {
    use super::fakes::RecordingRenderer;
    use super::*;
    use crate::models::report::fixtures::{LEGACY_REPORT, SAMPLE_REPORT};

    #[test]
    fn test_shell_wraps_report_in_body() {
        let html = wrap_report_html("<h1>Report</h1>");
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<body>\n<h1>Report</h1>\n</body>"));
    }

    #[tokio::test]
    async fn test_export_names_file_after_application_id() {
        let renderer = RecordingRenderer::default();
        let pdf = export_report(&renderer, &CreditReport::new(SAMPLE_REPORT))
            .await
            .unwrap();

        assert_eq!(pdf.application_id, "APP-2024-0042");
        assert_eq!(pdf.file_name, "APP-2024-0042_credit_assessment_report.pdf");
        assert_eq!(pdf.mime_type, "application/pdf");
        assert!(!pdf.bytes.is_empty());
    }

    #[tokio::test]
    async fn test_export_twice_renders_identical_content() {
        let renderer = RecordingRenderer::default();
        let report = CreditReport::new(LEGACY_REPORT);

        let first = export_report(&renderer, &report).await.unwrap();
        let second = export_report(&renderer, &report).await.unwrap();

        assert_eq!(first, second);
        let inputs = renderer.inputs.lock().unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0], inputs[1]);
    }

    #[tokio::test]
    async fn test_export_without_id_uses_sentinel_name() {
        let renderer = RecordingRenderer::default();
        let pdf = export_report(&renderer, &CreditReport::new("<p>No identifier here</p>"))
            .await
            .unwrap();
        assert_eq!(
            pdf.file_name,
            "application_id_not_found_credit_assessment_report.pdf"
        );
    }

    #[tokio::test]
    async fn test_renderer_never_sees_resource_references() {
        let renderer = RecordingRenderer::default();
        let report = CreditReport::new(
            r#"<link rel="attachment" href="file:///etc/passwd"><img src="http://169.254.169.254/latest/meta-data/"><p>Application ID: LN-9</p>"#,
        );

        let pdf = export_report(&renderer, &report).await.unwrap();

        let inputs = renderer.inputs.lock().unwrap();
        assert!(!inputs[0].contains("file://"));
        assert!(!inputs[0].contains("169.254.169.254"));
        assert!(!inputs[0].contains("<link"));
        assert!(!inputs[0].contains("<img"));
        assert_eq!(pdf.application_id, "LN-9");
    }

    #[tokio::test]
    async fn test_render_failure_offers_no_file() {
        let renderer = RecordingRenderer {
            fail: true,
            ..Default::default()
        };
        let result = export_report(&renderer, &CreditReport::new(SAMPLE_REPORT)).await;
        assert!(matches!(result, Err(RenderError::Failed { .. })));
    }
}
