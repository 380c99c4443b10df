use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RendererError {
    /// The toolchain binary is missing; callers fall back to HTML output.
    #[error("Report toolchain unavailable: {0}")]
    Unavailable(String),

    #[error("Report toolchain failed: {0}")]
    Failed(String),
}

/// Seam over the external report-rendering toolchain.
///
/// The job handler only depends on this interface, so a pure-library
/// renderer can replace the process-spawn one without touching the
/// generation control flow.
#[async_trait]
pub trait ReportRenderer: Send + Sync {
    /// Render the result documents in `results_dir` into a browsable
    /// report at `report_dir`.
    async fn render(&self, results_dir: &Path, report_dir: &Path) -> Result<(), RendererError>;
}

/// Renders by invoking the Allure CLI (`allure generate <in> -o <out>`).
pub struct AllureCli {
    bin: String,
}

impl AllureCli {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

#[async_trait]
impl ReportRenderer for AllureCli {
    async fn render(&self, results_dir: &Path, report_dir: &Path) -> Result<(), RendererError> {
        debug!(bin = %self.bin, ?results_dir, ?report_dir, "Invoking allure generate");

        let output = Command::new(&self.bin)
            .arg("generate")
            .arg(results_dir)
            .arg("-o")
            .arg(report_dir)
            .output()
            .await;

        match output {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RendererError::Unavailable(format!(
                    "'{}' not found on PATH",
                    self.bin
                )))
            }
            Err(e) => Err(RendererError::Failed(e.to_string())),
            Ok(out) if !out.status.success() => Err(RendererError::Failed(format!(
                "allure exited with {}: {}",
                out.status,
                String::from_utf8_lossy(&out.stderr).trim()
            ))),
            Ok(_) => Ok(()),
        }
    }
}
