//! Process-wide record of provider scripts, keyed by URL.
//!
//! At most one script tag is injected per URL. Concurrent loaders share the
//! in-flight load through a `watch` channel; each waiting loader holds one
//! receiver, so the receiver count is the number of pending listeners.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::sync::{oneshot, watch};

use super::host::{HostDocument, ScriptEvent};
use crate::error::TrackError;
use crate::tracking::lock;

type Outcome = Option<Result<(), String>>;

enum LoadState {
    Loading(watch::Sender<Outcome>),
    Ready,
    Failed(String),
}

#[derive(Clone, Default)]
pub struct ScriptLoadRegistry {
    entries: Arc<Mutex<HashMap<String, LoadState>>>,
}

static GLOBAL: OnceLock<Arc<ScriptLoadRegistry>> = OnceLock::new();

impl ScriptLoadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shared by every map view in the process.
    pub fn global() -> Arc<ScriptLoadRegistry> {
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ScriptLoadRegistry::new())))
    }

    pub fn is_ready(&self, url: &str) -> bool {
        matches!(lock(&self.entries).get(url), Some(LoadState::Ready))
    }

    /// Loaders currently waiting on the in-flight load of `url`.
    pub fn pending_listeners(&self, url: &str) -> usize {
        match lock(&self.entries).get(url) {
            Some(LoadState::Loading(tx)) => tx.receiver_count(),
            _ => 0,
        }
    }

    /// Make sure the provider script at `url` has loaded. Idempotent.
    pub async fn load(&self, url: &str, document: &dyn HostDocument) -> Result<(), TrackError> {
        let mut rx = {
            let mut entries = lock(&self.entries);
            match entries.get(url) {
                Some(LoadState::Ready) => return Ok(()),
                Some(LoadState::Failed(msg)) => return Err(TrackError::ProviderLoadFailure(msg.clone())),
                Some(LoadState::Loading(tx)) => tx.subscribe(),
                None => {
                    let completion = if document.script_present(url) {
                        if document.widget_api().is_some() {
                            tracing::debug!(url, "Provider script already loaded");
                            entries.insert(url.to_string(), LoadState::Ready);
                            return Ok(());
                        }
                        tracing::debug!(url, "Provider script present, waiting for load");
                        document.on_script_event(url)
                    } else {
                        tracing::info!(url = %redact_key(url), "Injecting provider script");
                        document.inject_script(url)
                    };
                    let (tx, rx) = watch::channel(None);
                    entries.insert(url.to_string(), LoadState::Loading(tx));
                    tokio::spawn(settle(Arc::clone(&self.entries), url.to_string(), completion));
                    rx
                }
            }
        };

        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| TrackError::ProviderLoadFailure("script loader went away".into()))?
            .clone();

        match outcome {
            Some(Ok(())) => Ok(()),
            Some(Err(msg)) => Err(TrackError::ProviderLoadFailure(msg)),
            None => Err(TrackError::ProviderLoadFailure("script load did not complete".into())),
        }
    }
}

async fn settle(
    entries: Arc<Mutex<HashMap<String, LoadState>>>,
    url: String,
    completion: oneshot::Receiver<ScriptEvent>,
) {
    let result = match completion.await {
        Ok(ScriptEvent::Loaded) => Ok(()),
        Ok(ScriptEvent::Failed(msg)) => Err(msg),
        Err(_) => Err("script listener dropped".to_string()),
    };

    let mut entries = lock(&entries);
    let next = match &result {
        Ok(()) => {
            tracing::info!(url = %redact_key(&url), "Provider script loaded");
            LoadState::Ready
        }
        Err(msg) => {
            tracing::warn!(url = %redact_key(&url), error = %msg, "Provider script failed to load");
            LoadState::Failed(msg.clone())
        }
    };
    if let Some(LoadState::Loading(tx)) = entries.insert(url, next) {
        tx.send_replace(Some(result));
    }
}

/// Strip the credential from a provider URL before logging it.
fn redact_key(url: &str) -> String {
    match url.find("key=") {
        Some(start) => {
            let rest = &url[start + 4..];
            let end = rest.find('&').map(|i| start + 4 + i).unwrap_or(url.len());
            format!("{}key=***{}", &url[..start], &url[end..])
        }
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::headless::HeadlessDocument;

    const URL: &str = "https://maps.test/api/js?key=abc&libraries=geometry";

    #[tokio::test]
    async fn test_concurrent_loads_inject_once() {
        let doc = HeadlessDocument::manual();
        let registry = ScriptLoadRegistry::new();

        let (a, b, _) = tokio::join!(registry.load(URL, &*doc), registry.load(URL, &*doc), async {
            tokio::task::yield_now().await;
            assert_eq!(registry.pending_listeners(URL), 2);
            doc.finish_script(URL, ScriptEvent::Loaded);
        });

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(doc.injected_scripts(), vec![URL.to_string()]);
        assert!(registry.is_ready(URL));
        assert_eq!(registry.pending_listeners(URL), 0);

        registry.load(URL, &*doc).await.unwrap();
        assert_eq!(doc.injected_scripts().len(), 1);
    }

    #[tokio::test]
    async fn test_present_and_available_is_ready() {
        let doc = HeadlessDocument::manual();
        doc.preload_script(URL, true);
        let registry = ScriptLoadRegistry::new();
        registry.load(URL, &*doc).await.unwrap();
        assert!(doc.injected_scripts().is_empty());
        assert!(registry.is_ready(URL));
    }

    #[tokio::test]
    async fn test_present_but_loading_waits_for_event() {
        let doc = HeadlessDocument::manual();
        doc.preload_script(URL, false);
        let registry = ScriptLoadRegistry::new();

        let (result, _) = tokio::join!(registry.load(URL, &*doc), async {
            tokio::task::yield_now().await;
            doc.finish_script(URL, ScriptEvent::Loaded);
        });
        result.unwrap();
        assert!(doc.injected_scripts().is_empty());
    }

    #[tokio::test]
    async fn test_load_error_is_remembered() {
        let doc = HeadlessDocument::manual();
        let registry = ScriptLoadRegistry::new();

        let (result, _) = tokio::join!(registry.load(URL, &*doc), async {
            tokio::task::yield_now().await;
            doc.finish_script(URL, ScriptEvent::Failed("net::ERR_BLOCKED_BY_CLIENT".into()));
        });
        assert_eq!(
            result.unwrap_err(),
            TrackError::ProviderLoadFailure("net::ERR_BLOCKED_BY_CLIENT".into())
        );
        assert!(matches!(
            registry.load(URL, &*doc).await,
            Err(TrackError::ProviderLoadFailure(_))
        ));
        assert_eq!(doc.injected_scripts().len(), 1);
    }

    #[test]
    fn test_redact_key() {
        assert_eq!(redact_key(URL), "https://maps.test/api/js?key=***&libraries=geometry");
        assert_eq!(redact_key("https://x/js?key="), "https://x/js?key=***");
        assert_eq!(redact_key("https://x/js"), "https://x/js");
    }
}
