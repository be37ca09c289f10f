//! Error taxonomy for the two collaborators that can fail: spreadsheet
//! ingestion and summarization. Normalization and aggregation never fail.

use thiserror::Error;

use crate::summarize::AnalysisKey;

/// A short, user-facing hint shown next to an error message.
pub trait Remediation {
    fn remediation(&self) -> &str;
}

/// Failure to read the review spreadsheet.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open review file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read review file {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

impl Remediation for LoadError {
    fn remediation(&self) -> &str {
        match self {
            LoadError::Io { .. } => concat!(
                "Check that the review export exists at the configured path ",
                "(--data or REVIEWS_PATH)."
            ),
            LoadError::Csv { .. } => {
                "Re-export the spreadsheet as UTF-8 CSV with a header row."
            }
        }
    }
}

/// Asked for a view before any data was loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("review data is not loaded")]
pub struct NotReady;

/// Failure of a summarization request.
#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("no API key configured for summarization")]
    MissingCredential,

    #[error("a {0} analysis is already in progress")]
    AlreadyInFlight(AnalysisKey),

    #[error("summarization request failed: {0}")]
    Transport(String),

    #[error("summarization API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("summarization response had no content")]
    EmptyResponse,
}

impl Remediation for SummaryError {
    fn remediation(&self) -> &str {
        match self {
            SummaryError::MissingCredential => "Pass --api-key or set OPENAI_API_KEY.",
            SummaryError::AlreadyInFlight(_) => "Wait for the pending analysis to finish.",
            SummaryError::Transport(_) => "Check network access to the API base URL and try again.",
            SummaryError::Api { status: 401, .. } => {
                "The API key was rejected; verify it is valid."
            }
            SummaryError::Api { status: 429, .. } => {
                "Rate limited by the provider; try again later."
            }
            SummaryError::Api { .. } => {
                "The provider rejected the request; check model and base URL."
            }
            SummaryError::EmptyResponse => "Try again; the provider returned no text.",
        }
    }
}
