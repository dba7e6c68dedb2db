pub mod gemini;

use std::sync::Arc;

use async_trait::async_trait;

use crate::credential::Credential;
use crate::error::ProviderError;
use crate::job::{AspectRatio, ImageMime, OperationHandle, OperationStatus, VideoInput};

/// Resolution requested for generated video.
pub const DEFAULT_RESOLUTION: &str = "720p";

/// What the provider receives when a video operation is created.
#[derive(Clone, Debug)]
pub struct VideoRequest<'a> {
    pub image: &'a [u8],
    pub mime_type: ImageMime,
    /// Already defaulted; never blank.
    pub prompt: &'a str,
    pub aspect_ratio: AspectRatio,
    pub resolution: &'a str,
}

impl<'a> VideoRequest<'a> {
    pub fn from_input(input: &'a VideoInput, resolution: &'a str) -> Self {
        Self {
            image: &input.image,
            mime_type: input.mime_type,
            prompt: input.effective_prompt(),
            aspect_ratio: input.aspect_ratio,
            resolution,
        }
    }
}

/// Remote media-generation backend driven by the poller.
#[async_trait]
pub trait MediaProviderClient: Send + Sync {
    /// Start a long-running image-to-video operation.
    async fn create_video_operation(
        &self,
        req: &VideoRequest<'_>,
        credential: &Credential,
    ) -> Result<OperationHandle, ProviderError>;

    /// Fetch the current state of an operation.
    async fn refresh_operation(
        &self,
        handle: &OperationHandle,
        credential: &Credential,
    ) -> Result<OperationStatus, ProviderError>;

    /// Download a finished result.
    async fn fetch_result(&self, uri: &str, credential: &Credential)
    -> Result<Vec<u8>, ProviderError>;

    /// Whether `uri` has to go through [`fetch_result`](Self::fetch_result)
    /// before a caller can use it.
    fn requires_fetch(&self, uri: &str) -> bool {
        uri.starts_with("https://") || uri.starts_with("http://")
    }
}

#[async_trait]
impl<P: MediaProviderClient + ?Sized> MediaProviderClient for Arc<P> {
    async fn create_video_operation(
        &self,
        req: &VideoRequest<'_>,
        credential: &Credential,
    ) -> Result<OperationHandle, ProviderError> {
        (**self).create_video_operation(req, credential).await
    }

    async fn refresh_operation(
        &self,
        handle: &OperationHandle,
        credential: &Credential,
    ) -> Result<OperationStatus, ProviderError> {
        (**self).refresh_operation(handle, credential).await
    }

    async fn fetch_result(
        &self,
        uri: &str,
        credential: &Credential,
    ) -> Result<Vec<u8>, ProviderError> {
        (**self).fetch_result(uri, credential).await
    }

    fn requires_fetch(&self, uri: &str) -> bool {
        (**self).requires_fetch(uri)
    }
}
