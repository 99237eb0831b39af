//! reqwest-backed fetcher

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{RANGE, USER_AGENT};
use reqwest::{Client, Method};
use tracing::debug;

use super::{FetchError, FetchMethod, FetchRequest, Fetcher};

/// Fetcher issuing real HTTP requests
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        debug!(?timeout, "HttpFetcher::new: called");
        let http = Client::builder().timeout(timeout).build().map_err(FetchError::Network)?;
        Ok(Self { http, timeout })
    }

    fn method(method: FetchMethod) -> Result<Method, FetchError> {
        match method {
            FetchMethod::Head => Ok(Method::HEAD),
            FetchMethod::Range => Ok(Method::GET),
            FetchMethod::Purge => Method::from_bytes(b"PURGE").map_err(|e| FetchError::InvalidRequest(e.to_string())),
        }
    }

    fn classify(&self, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else if error.is_connect() {
            FetchError::Connection(error.to_string())
        } else if error.is_builder() {
            FetchError::InvalidRequest(error.to_string())
        } else {
            FetchError::Network(error)
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<u16, FetchError> {
        debug!(method = ?request.method, url = %request.url, "fetch: called");
        let url = reqwest::Url::parse(&request.url).map_err(|e| FetchError::InvalidRequest(e.to_string()))?;

        let mut builder = self.http.request(Self::method(request.method)?, url);
        if request.method == FetchMethod::Range {
            builder = builder.header(RANGE, "bytes=0-0");
        }
        if let Some(user_agent) = &request.user_agent {
            builder = builder.header(USER_AGENT, user_agent);
        }

        let response = builder.send().await.map_err(|e| self.classify(e))?;
        let status = response.status().as_u16();
        debug!(url = %request.url, status, "fetch: response");
        Ok(status)
    }
}
