use thiserror::Error;

/// Marker text the provider puts in errors when the selected key's project
/// cannot be resolved. Compared case-insensitively.
pub const CREDENTIAL_NOT_FOUND_MARKER: &str = "requested entity was not found";

/// Raw failure from a provider call, before translation into a [`JobError`].
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("auth failed: {0}")]
    AuthFailed(String),

    #[error("rate limited")]
    RateLimited,

    #[error("stalled: {0}")]
    Stalled(String),

    #[error("upstream error: {message}")]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    #[error("schema parse error: {0}")]
    SchemaParse(String),

    #[error("no image data returned")]
    NoImage,

    #[error("no API key selected")]
    MissingCredential,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    /// HTTP status carried by the error, if it came from an HTTP response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => *status,
            Self::RateLimited => Some(429),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True when the provider refused the request itself (4xx other than
    /// auth and rate limiting), i.e. the input was malformed.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Upstream { status: Some(s), .. } if (400..500).contains(s))
    }
}

/// How a provider failure should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The selected key/project is unusable; the caller must pick another.
    InvalidCredential,
    /// Anything else. The call site decides the concrete kind.
    Other,
}

/// Classify provider error text.
///
/// The provider exposes no structured code for "key's project not found",
/// so this is a substring heuristic on the human-readable message. Every
/// caller goes through here so the check can be replaced in one place.
pub fn classify(message: &str) -> ErrorClass {
    if message.to_lowercase().contains(CREDENTIAL_NOT_FOUND_MARKER) {
        ErrorClass::InvalidCredential
    } else {
        ErrorClass::Other
    }
}

/// Terminal outcome of a failed [`crate::poller::AsyncJobPoller`] run.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("submission failed: {0}")]
    SubmissionFailed(#[source] ProviderError),

    #[error("poll failed for operation {operation}: {source}")]
    PollFailed {
        operation: String,
        source: ProviderError,
    },

    #[error("operation {operation} completed without a result")]
    NoResult { operation: String },

    #[error("download failed: {0}")]
    DownloadFailed(#[source] ProviderError),

    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    #[error("processing failed: {0}")]
    ProcessingFailed(String),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("cancelled after {0}ms")]
    Cancelled(u64),
}

impl JobError {
    /// Returns true for failures where resubmitting the same input may work.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SubmissionFailed(e) | Self::DownloadFailed(e) => {
                matches!(
                    e,
                    ProviderError::Request(_) | ProviderError::RateLimited | ProviderError::Stalled(_)
                )
                    || e.status().is_some_and(|s| s >= 500)
            }
            Self::PollFailed { .. } => true,
            Self::Timeout(_) => true,
            Self::ProcessingFailed(_) => true,
            _ => false,
        }
    }

    /// Short message safe to show an end user. Does not leak operation
    /// names, URLs or upstream bodies.
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected(reason) => format!("request rejected: {reason}"),
            Self::SubmissionFailed(_) => "could not start video generation".to_string(),
            Self::PollFailed { .. } => "failed to check video generation status".to_string(),
            Self::NoResult { .. } => "Video generation failed - no URI found".to_string(),
            Self::DownloadFailed(_) => "failed to download the generated video".to_string(),
            Self::InvalidCredential(_) => {
                "Project not found. Please select a valid paid project key.".to_string()
            }
            Self::ProcessingFailed(_) => "AI processing failed. Please try again.".to_string(),
            Self::Timeout(ms) => format!("video generation timed out after {ms}ms"),
            Self::Cancelled(ms) => format!("cancelled after {ms}ms"),
        }
    }
}
