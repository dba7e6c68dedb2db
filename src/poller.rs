use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tokio_util::sync::CancellationToken;

use crate::credential::CredentialGate;
use crate::error::{ErrorClass, JobError, ProviderError, classify};
use crate::job::{
    FailureReason, GenerationJob, LocalHandle, MediaResult, OperationHandle, PollOutcome,
    VideoInput,
};
use crate::provider::{DEFAULT_RESOLUTION, MediaProviderClient, VideoRequest};

/// Delay between status refreshes when nothing else is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// Counter for unique download filenames.
static PERSIST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Knobs for [`AsyncJobPoller`]. Defaults poll every 5s, forever, and treat
/// the first failed refresh as fatal.
#[derive(Clone, Debug)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    /// Growth per pending poll. 1.0 keeps the interval fixed.
    pub backoff_factor: f64,
    /// Backoff cap.
    pub max_poll_interval: Duration,
    /// Consecutive refresh failures tolerated before giving up (min 1).
    pub max_poll_failures: u32,
    /// Wall-clock budget for the whole job. `None` is unbounded.
    pub max_poll_duration: Option<Duration>,
    /// Refresh budget. `None` is unbounded.
    pub max_polls: Option<u32>,
    pub resolution: String,
    /// Where fetched results are written.
    pub output_dir: PathBuf,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            backoff_factor: 1.0,
            max_poll_interval: Duration::from_secs(60),
            max_poll_failures: 1,
            max_poll_duration: None,
            max_polls: None,
            resolution: DEFAULT_RESOLUTION.to_string(),
            output_dir: PathBuf::from(".mediagen/videos"),
        }
    }
}

/// Compute the delay before refresh number `attempt` (0-based):
/// interval × factor^attempt, capped at `max_poll_interval`.
pub fn next_poll_delay(config: &PollerConfig, attempt: u32) -> Duration {
    let base = config.poll_interval;
    let cap = config.max_poll_interval.max(base);
    let factor = if config.backoff_factor.is_finite() {
        config.backoff_factor.max(1.0)
    } else {
        1.0
    };
    let secs = base.as_secs_f64() * factor.powi(attempt.min(1024) as i32);
    if !secs.is_finite() || secs >= cap.as_secs_f64() {
        cap
    } else {
        Duration::from_secs_f64(secs)
    }
}

/// Which remote call a failure came from.
#[derive(Clone, Copy, Debug)]
pub enum CallSite<'a> {
    Submit,
    Poll(&'a OperationHandle),
    Download,
}

/// Translate a provider failure into exactly one [`JobError`] kind.
pub fn translate_provider_error(err: ProviderError, site: CallSite<'_>) -> JobError {
    let message = err.to_string();
    if classify(&message) == ErrorClass::InvalidCredential {
        return JobError::InvalidCredential(message);
    }
    match site {
        CallSite::Submit if err.is_rejection() => JobError::Rejected(message),
        CallSite::Submit => JobError::SubmissionFailed(err),
        CallSite::Poll(handle) => JobError::PollFailed {
            operation: handle.to_string(),
            source: err,
        },
        CallSite::Download => JobError::DownloadFailed(err),
    }
}

/// Translate a failure the provider reported for the operation itself.
pub fn translate_reported_failure(message: String) -> JobError {
    match classify(&message) {
        ErrorClass::InvalidCredential => JobError::InvalidCredential(message),
        ErrorClass::Other => JobError::ProcessingFailed(message),
    }
}

/// Drives the create-then-poll protocol for image-to-video generation.
///
/// The poller keeps no state between calls; each `submit_and_await` owns
/// its [`GenerationJob`], so one poller can serve many concurrent jobs.
pub struct AsyncJobPoller<P> {
    provider: P,
    config: PollerConfig,
}

impl<P: MediaProviderClient> AsyncJobPoller<P> {
    pub fn new(provider: P, config: PollerConfig) -> Self {
        Self { provider, config }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub async fn submit_and_await(
        &self,
        input: VideoInput,
        gate: &dyn CredentialGate,
    ) -> Result<MediaResult, JobError> {
        self.submit_and_await_with_cancel(input, gate, &CancellationToken::new())
            .await
    }

    /// Like [`submit_and_await`](Self::submit_and_await), but stops as soon
    /// as `cancel` fires. The remote operation is left running.
    pub async fn submit_and_await_with_cancel(
        &self,
        input: VideoInput,
        gate: &dyn CredentialGate,
        cancel: &CancellationToken,
    ) -> Result<MediaResult, JobError> {
        let start = Instant::now();
        let deadline = self
            .config
            .max_poll_duration
            .map(|max| tokio::time::Instant::from_std(start) + max);

        if input.image.is_empty() {
            return Err(JobError::Rejected("image bytes are empty".to_string()));
        }

        // Selection is not awaited for a result: submission goes ahead
        // whatever the user picked.
        if !gate.has_selected_key().await {
            tracing::warn!("no API key selected, opening key selection before submit");
            gate.open_selection_flow().await;
        }
        let credential = gate.credential().await;

        // 1. Submit
        let request = VideoRequest::from_input(&input, &self.config.resolution);
        let created = bounded(
            cancel,
            deadline,
            start,
            self.provider.create_video_operation(&request, &credential),
        )
        .await?;
        let handle = match created {
            Ok(handle) => handle,
            Err(e) => {
                let err = translate_provider_error(e, CallSite::Submit);
                return Err(surface(err, gate).await);
            }
        };

        let mut job = GenerationJob::new(handle, input);
        tracing::info!(
            operation = %job.handle(),
            aspect_ratio = %job.input().aspect_ratio,
            "video operation submitted"
        );

        // 2. Poll loop
        let mut attempt: u32 = 0;
        let mut refreshes: u32 = 0;
        let mut consecutive_failures: u32 = 0;

        let uri = loop {
            let delay = next_poll_delay(&self.config, attempt);

            if let Some(max) = self.config.max_poll_duration
                && start.elapsed() + delay > max
            {
                tracing::warn!(operation = %job.handle(), "poll duration budget exhausted");
                return Err(JobError::Timeout(elapsed_ms(start)));
            }
            if let Some(max) = self.config.max_polls
                && refreshes >= max
            {
                tracing::warn!(operation = %job.handle(), polls = refreshes, "poll budget exhausted");
                return Err(JobError::Timeout(elapsed_ms(start)));
            }

            bounded(cancel, deadline, start, tokio::time::sleep(delay)).await?;
            refreshes += 1;

            let refreshed = bounded(
                cancel,
                deadline,
                start,
                self.provider.refresh_operation(job.handle(), &credential),
            )
            .await?;

            let status = match refreshed {
                Ok(status) => {
                    consecutive_failures = 0;
                    status
                }
                Err(e) => {
                    let err = translate_provider_error(e, CallSite::Poll(job.handle()));
                    consecutive_failures += 1;
                    if matches!(err, JobError::PollFailed { .. })
                        && consecutive_failures < self.config.max_poll_failures
                    {
                        tracing::warn!(
                            operation = %job.handle(),
                            attempt = refreshes,
                            failures = consecutive_failures,
                            "status refresh failed, retrying: {err}"
                        );
                        attempt = attempt.saturating_add(1);
                        continue;
                    }
                    return Err(surface(err, gate).await);
                }
            };

            match job.apply(&status) {
                PollOutcome::StillPending => {
                    tracing::debug!(
                        operation = %job.handle(),
                        attempt = refreshes,
                        elapsed_ms = elapsed_ms(start),
                        "video operation still pending"
                    );
                    attempt = attempt.saturating_add(1);
                }
                PollOutcome::Succeeded(uri) => break uri,
                PollOutcome::Failed(FailureReason::NoResult) => {
                    return Err(JobError::NoResult {
                        operation: job.handle().to_string(),
                    });
                }
                PollOutcome::Failed(FailureReason::Reported(message)) => {
                    tracing::warn!(operation = %job.handle(), "video operation failed: {message}");
                    return Err(surface(translate_reported_failure(message), gate).await);
                }
            }
        };

        tracing::info!(
            operation = %job.handle(),
            polls = refreshes,
            elapsed_ms = elapsed_ms(start),
            "video operation completed"
        );

        // 3. Materialize
        if !self.provider.requires_fetch(&uri) {
            return Ok(MediaResult {
                local_handle: LocalHandle::Uri(uri.clone()),
                source_uri: uri,
            });
        }

        let fetched = bounded(
            cancel,
            deadline,
            start,
            self.provider.fetch_result(&uri, &credential),
        )
        .await?;
        let blob = match fetched {
            Ok(blob) => blob,
            Err(e) => {
                let err = translate_provider_error(e, CallSite::Download);
                return Err(surface(err, gate).await);
            }
        };

        let path = persist_video(&self.config.output_dir, job.handle(), &blob)
            .await
            .map_err(|e| JobError::DownloadFailed(ProviderError::Io(e)))?;

        tracing::info!(
            operation = %job.handle(),
            bytes = blob.len(),
            path = %path.display(),
            "video downloaded"
        );

        Ok(MediaResult {
            local_handle: LocalHandle::File(path),
            source_uri: uri,
        })
    }
}

/// Run the credential re-prompt for `InvalidCredential` before handing the
/// error back. Every other kind passes through untouched.
async fn surface(err: JobError, gate: &dyn CredentialGate) -> JobError {
    if matches!(err, JobError::InvalidCredential(_)) {
        tracing::warn!("provider rejected the selected key, reopening key selection");
        gate.open_selection_flow().await;
    }
    err
}

/// Await `fut` unless `cancel` fires or `deadline` passes first. Dropping
/// the losing future also drops any timer or in-flight request it owned.
async fn bounded<F: Future>(
    cancel: &CancellationToken,
    deadline: Option<tokio::time::Instant>,
    start: Instant,
    fut: F,
) -> Result<F::Output, JobError> {
    let expired = async {
        match deadline {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::info!(elapsed_ms = elapsed_ms(start), "video job cancelled");
            Err(JobError::Cancelled(elapsed_ms(start)))
        }
        _ = expired => {
            tracing::warn!(elapsed_ms = elapsed_ms(start), "video job exceeded its duration budget");
            Err(JobError::Timeout(elapsed_ms(start)))
        }
        out = fut => Ok(out),
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Sanitize a name for use in filenames. Only allows alphanumeric, `-`, `_`.
pub fn sanitize_file_stem(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Write a downloaded video to `{dir}/{timestamp}_{seq}_{operation}.mp4`.
async fn persist_video(
    dir: &Path,
    handle: &OperationHandle,
    blob: &[u8],
) -> Result<PathBuf, std::io::Error> {
    tokio::fs::create_dir_all(dir).await?;

    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let seq = PERSIST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let op_id = handle.as_str().rsplit('/').next().unwrap_or_default();
    let filename = format!("{ts}_{seq}_{}.mp4", sanitize_file_stem(op_id));
    let path = dir.join(&filename);

    // Temp file + rename so readers never see a partial video.
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, blob).await?;
    if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    Ok(path)
}
