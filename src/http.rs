//! Blocking HTTP transport behind a trait, so providers can be tested with canned bodies.

use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HttpError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("failed to read response body: {0}")]
    Body(String),
    #[error("request task failed: {0}")]
    Join(String),
}

/// Status and body of a completed exchange. Non-2xx statuses are not errors here.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse, HttpError>;

    fn put_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpResponse, HttpError>;
}

/// `ureq` agent with a fixed User-Agent. No timeout beyond transport defaults.
pub struct UreqClient {
    agent: ureq::Agent,
    user_agent: String,
}

impl UreqClient {
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            user_agent: user_agent.into(),
        }
    }
}

impl HttpClient for UreqClient {
    fn get(&self, url: &str) -> Result<HttpResponse, HttpError> {
        let result = self.agent.get(url).set("User-Agent", &self.user_agent).call();
        into_response(result)
    }

    fn put_json(&self, url: &str, body: &serde_json::Value) -> Result<HttpResponse, HttpError> {
        let result = self
            .agent
            .put(url)
            .set("User-Agent", &self.user_agent)
            .send_json(body);
        into_response(result)
    }
}

fn into_response(result: Result<ureq::Response, ureq::Error>) -> Result<HttpResponse, HttpError> {
    match result {
        Ok(resp) => {
            let status = resp.status();
            let body = resp
                .into_string()
                .map_err(|e| HttpError::Body(e.to_string()))?;
            Ok(HttpResponse { status, body })
        }
        Err(ureq::Error::Status(status, resp)) => Ok(HttpResponse {
            status,
            body: resp.into_string().unwrap_or_default(),
        }),
        Err(ureq::Error::Transport(t)) => Err(HttpError::Transport(t.to_string())),
    }
}

/// Run a GET on the blocking pool.
pub async fn get_async(client: &Arc<dyn HttpClient>, url: String) -> Result<HttpResponse, HttpError> {
    let client = Arc::clone(client);
    tokio::task::spawn_blocking(move || client.get(&url))
        .await
        .map_err(|e| HttpError::Join(e.to_string()))?
}

/// Run a JSON PUT on the blocking pool.
pub async fn put_json_async<T: Serialize>(
    client: &Arc<dyn HttpClient>,
    url: String,
    body: &T,
) -> Result<HttpResponse, HttpError> {
    let value = serde_json::to_value(body).map_err(|e| HttpError::Body(e.to_string()))?;
    let client = Arc::clone(client);
    tokio::task::spawn_blocking(move || client.put_json(&url, &value))
        .await
        .map_err(|e| HttpError::Join(e.to_string()))?
}

/// Percent-encode a query component.
pub fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}
