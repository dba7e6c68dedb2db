use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Prompt used when the caller leaves the prompt empty.
pub const DEFAULT_ANIMATION_PROMPT: &str = "Animate this image with subtle cinematic movement";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "16:9" => Ok(Self::Landscape),
            "9:16" => Ok(Self::Portrait),
            other => Err(format!("unsupported aspect ratio: {other} (expected 16:9 or 9:16)")),
        }
    }
}

/// Image types the provider accepts as animation or edit sources.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ImageMime {
    #[default]
    Jpeg,
    Png,
    Webp,
}

impl ImageMime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }

    /// File extension written when materializing an image of this type.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }

    /// Guess the type from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }
}

impl FromStr for ImageMime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Ok(Self::Jpeg),
            "image/png" => Ok(Self::Png),
            "image/webp" => Ok(Self::Webp),
            other => Err(format!("unsupported image type: {other}")),
        }
    }
}

/// Source material for one image-to-video generation.
#[derive(Clone, Debug)]
pub struct VideoInput {
    pub image: Vec<u8>,
    pub mime_type: ImageMime,
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
}

impl VideoInput {
    pub fn new(image: Vec<u8>, mime_type: ImageMime) -> Self {
        Self {
            image,
            mime_type,
            prompt: String::new(),
            aspect_ratio: AspectRatio::default(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_aspect_ratio(mut self, aspect_ratio: AspectRatio) -> Self {
        self.aspect_ratio = aspect_ratio;
        self
    }

    /// The prompt actually sent: blank prompts fall back to the default.
    pub fn effective_prompt(&self) -> &str {
        if self.prompt.trim().is_empty() {
            DEFAULT_ANIMATION_PROMPT
        } else {
            &self.prompt
        }
    }
}

/// Opaque provider-issued token for a long-running operation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OperationHandle(String);

impl OperationHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One refresh response from the provider.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OperationStatus {
    pub done: bool,
    pub result_uri: Option<String>,
    pub error: Option<String>,
}

impl OperationStatus {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn succeeded(uri: impl Into<String>) -> Self {
        Self {
            done: true,
            result_uri: Some(uri.into()),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            done: true,
            result_uri: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Done,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureReason {
    /// The operation finished but produced nothing usable.
    NoResult,
    /// The provider reported an error for the operation.
    Reported(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    StillPending,
    Succeeded(String),
    Failed(FailureReason),
}

/// Local model of one remote generation.
///
/// `Done` and `Failed` are absorbing, and the result URI is written once,
/// on the transition into `Done`.
#[derive(Debug)]
pub struct GenerationJob {
    handle: OperationHandle,
    status: JobStatus,
    result_uri: Option<String>,
    failure: Option<FailureReason>,
    input: VideoInput,
    polls: u32,
}

impl GenerationJob {
    pub fn new(handle: OperationHandle, input: VideoInput) -> Self {
        Self {
            handle,
            status: JobStatus::Pending,
            result_uri: None,
            failure: None,
            input,
            polls: 0,
        }
    }

    pub fn handle(&self) -> &OperationHandle {
        &self.handle
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn result_uri(&self) -> Option<&str> {
        self.result_uri.as_deref()
    }

    /// Input kept around so a caller can resubmit after a failure.
    pub fn input(&self) -> &VideoInput {
        &self.input
    }

    /// Number of refresh responses applied while pending.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn into_input(self) -> VideoInput {
        self.input
    }

    /// Fold a refresh response into the job. Once terminal, updates are
    /// ignored and the existing outcome is returned.
    pub fn apply(&mut self, update: &OperationStatus) -> PollOutcome {
        if self.status.is_terminal() {
            return self.outcome();
        }
        self.polls += 1;

        if !update.done {
            return PollOutcome::StillPending;
        }

        match update.result_uri.as_deref().map(str::trim) {
            Some(uri) if !uri.is_empty() => {
                self.status = JobStatus::Done;
                self.result_uri = Some(uri.to_string());
            }
            _ => {
                self.status = JobStatus::Failed;
                self.failure = Some(match &update.error {
                    Some(msg) => FailureReason::Reported(msg.clone()),
                    None => FailureReason::NoResult,
                });
            }
        }
        self.outcome()
    }

    fn outcome(&self) -> PollOutcome {
        match (self.status, &self.result_uri, &self.failure) {
            (JobStatus::Done, Some(uri), _) => PollOutcome::Succeeded(uri.clone()),
            (JobStatus::Failed, _, Some(reason)) => PollOutcome::Failed(reason.clone()),
            (JobStatus::Failed, _, None) => PollOutcome::Failed(FailureReason::NoResult),
            _ => PollOutcome::StillPending,
        }
    }
}

/// Where the caller can find the generated media.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LocalHandle {
    /// Downloaded to a local file.
    File(PathBuf),
    /// Usable as-is; no authenticated fetch was needed.
    Uri(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaResult {
    pub local_handle: LocalHandle,
    pub source_uri: String,
}
