//! Local origin server that records every request it receives

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct Hit {
    pub method: String,
    pub path: String,
    pub user_agent: Option<String>,
    pub range: Option<String>,
}

#[derive(Clone, Default)]
pub struct Origin {
    hits: Arc<Mutex<Vec<Hit>>>,
}

impl Origin {
    /// Serve on an ephemeral port; returns the base URL
    pub async fn start() -> (Self, String) {
        let origin = Origin::default();
        let app = Router::new().fallback(record).with_state(origin.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (origin, format!("http://{}", addr))
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.hits.lock().unwrap().clone()
    }

    pub fn hits_for(&self, path: &str) -> Vec<Hit> {
        self.hits().into_iter().filter(|h| h.path == path).collect()
    }
}

/// `/missing` answers 404, `/flaky` 503, `/slow` sleeps, everything else 200
async fn record(State(origin): State<Origin>, method: Method, uri: Uri, headers: HeaderMap) -> StatusCode {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(String::from);
    origin.hits.lock().unwrap().push(Hit {
        method: method.to_string(),
        path: uri.path().to_string(),
        user_agent: header("user-agent"),
        range: header("range"),
    });

    match uri.path() {
        "/missing" => StatusCode::NOT_FOUND,
        "/flaky" => StatusCode::SERVICE_UNAVAILABLE,
        "/slow" => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            StatusCode::OK
        }
        _ => StatusCode::OK,
    }
}

/// Poll `check` until it returns true or two seconds pass
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
