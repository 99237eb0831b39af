//! Fetcher trait definition

use async_trait::async_trait;

use super::FetchError;
use crate::config::PreloadMethod;

/// HTTP method of an outbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMethod {
    Head,
    /// GET limited to the first byte
    Range,
    Purge,
}

impl From<PreloadMethod> for FetchMethod {
    fn from(method: PreloadMethod) -> Self {
        match method {
            PreloadMethod::Head => FetchMethod::Head,
            PreloadMethod::Range => FetchMethod::Range,
        }
    }
}

/// One outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: FetchMethod,
    pub url: String,
    pub user_agent: Option<String>,
}

/// Issues a request and reports the response status
///
/// The body is never read; only the status matters for classification.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<u16, FetchError>;
}
