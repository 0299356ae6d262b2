use std::sync::Arc;

use log::debug;

use crate::error::{ProdhubError, ProdhubResult};
use crate::model::Version;
use crate::store::traits::ObjectStore;

/// Where a version's artifact comes from
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactSource {
    /// Already stored elsewhere; the URL is taken as given
    Url(String),
    /// Raw bytes to push through the object store first
    Upload { file_name: String, bytes: Vec<u8> },
}

/// Turns an artifact source into the URL recorded on a version. Reachability
/// of the URL is never checked; the object store's answer is trusted.
#[derive(Clone)]
pub struct ArtifactResolver {
    objects: Arc<dyn ObjectStore>,
}

impl ArtifactResolver {
    pub fn new(objects: Arc<dyn ObjectStore>) -> Self {
        Self { objects }
    }

    pub async fn resolve(&self, source: ArtifactSource) -> ProdhubResult<String> {
        match source {
            ArtifactSource::Url(url) => {
                if url.trim().is_empty() {
                    return Err(ProdhubError::Validation("url is required".to_string()));
                }
                Ok(url)
            }
            ArtifactSource::Upload { file_name, bytes } => {
                if bytes.is_empty() {
                    return Err(ProdhubError::Validation("uploaded file is empty".to_string()));
                }
                let size = bytes.len();
                let url = self.objects.store(bytes, &file_name).await?;
                debug!("Uploaded {} ({} bytes) to {}", file_name, size, url);
                Ok(url)
            }
        }
    }

    pub fn attach(version: &mut Version, url: String) {
        version.url = url;
    }
}
