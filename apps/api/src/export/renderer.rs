//! HTML-to-PDF rendering.
//!
//! `WeasyPrintRenderer` shells out to the WeasyPrint CLI. The HTML and the
//! output live in a temporary directory that is removed when rendering ends,
//! so a failed render never leaves a partial file behind. Relative URLs resolve
//! against that directory, which holds nothing but the input.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("PDF renderer '{binary}' could not be started: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("PDF renderer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("PDF renderer produced no output")]
    EmptyOutput,

    #[error("I/O error while rendering: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait PdfRenderer: Send + Sync {
    async fn render(&self, html: &str) -> Result<Vec<u8>, RenderError>;
}

#[derive(Debug, Clone)]
pub struct WeasyPrintRenderer {
    binary: String,
    stylesheet: Option<PathBuf>,
}

impl WeasyPrintRenderer {
    pub fn new(binary: impl Into<String>, stylesheet: Option<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            stylesheet,
        }
    }

    fn args(&self, workdir: &Path, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--base-url".into(),
            workdir.into(),
            input.into(),
            output.into(),
        ];
        if let Some(stylesheet) = &self.stylesheet {
            args.push("--stylesheet".into());
            args.push(stylesheet.into());
        }
        args
    }
}

#[async_trait]
impl PdfRenderer for WeasyPrintRenderer {
    async fn render(&self, html: &str) -> Result<Vec<u8>, RenderError> {
        let workdir = tempfile::tempdir()?;
        let input = workdir.path().join("report.html");
        let output = workdir.path().join("report.pdf");
        tokio::fs::write(&input, html).await?;

        let result = Command::new(&self.binary)
            .args(self.args(workdir.path(), &input, &output))
            .output()
            .await
            .map_err(|source| RenderError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if !result.status.success() {
            return Err(RenderError::Failed {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        let pdf = tokio::fs::read(&output).await?;
        if pdf.is_empty() {
            return Err(RenderError::EmptyOutput);
        }

        debug!("Rendered {} bytes of HTML into {} bytes of PDF", html.len(), pdf.len());
        Ok(pdf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_resolve_against_the_workdir() {
        let renderer = WeasyPrintRenderer::new("weasyprint", Some(PathBuf::from("assets/styles.css")));
        let workdir = Path::new("/tmp/render-1");
        let args = renderer.args(workdir, &workdir.join("report.html"), &workdir.join("report.pdf"));

        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            [
                "--base-url",
                "/tmp/render-1",
                "/tmp/render-1/report.html",
                "/tmp/render-1/report.pdf",
                "--stylesheet",
                "assets/styles.css",
            ]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_spawn_error() {
        let renderer = WeasyPrintRenderer::new("definitely-not-a-real-pdf-renderer", None);
        let result = renderer.render("<p>hi</p>").await;
        assert!(matches!(result, Err(RenderError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_renderer_reports_exit_status() {
        // `false` ignores its arguments and exits 1.
        let renderer = WeasyPrintRenderer::new("false", None);
        let result = renderer.render("<p>hi</p>").await;
        assert!(matches!(result, Err(RenderError::Failed { .. })));
    }
}
