use thiserror::Error;

/// Errors that terminate a report-generation job.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(String),
}

impl ReportError {
    /// Machine-readable code used in outcome messages.
    pub fn code(&self) -> &'static str {
        match self {
            ReportError::Io(_) => "IO_ERROR",
            ReportError::Serialization(_) => "SERIALIZATION_ERROR",
            ReportError::Template(_) => "TEMPLATE_ERROR",
        }
    }
}
