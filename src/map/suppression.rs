//! Hides the provider's "can't load" error overlays.
//!
//! The provider paints a white dialog over the map when the credential is
//! rejected. The scrubber hides such elements (never removes them) on a fixed
//! interval and on every document mutation, for as long as it is running.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::host::{HostDocument, OverlayElement};

pub const SCRUB_INTERVAL: Duration = Duration::from_millis(300);

#[derive(Debug, Clone)]
pub struct SuppressionRule {
    /// Every fragment must appear in the inline style.
    pub style_fragments: Vec<String>,
    /// At least one phrase must appear in the text.
    pub phrases: Vec<String>,
}

impl Default for SuppressionRule {
    fn default() -> Self {
        Self {
            style_fragments: vec!["background-color: white".into(), "font-weight: 500".into()],
            phrases: vec![
                "can't load Google Maps".into(),
                "Do you own this website".into(),
                "This page can't load".into(),
            ],
        }
    }
}

impl SuppressionRule {
    pub fn matches(&self, element: &OverlayElement) -> bool {
        self.style_fragments.iter().all(|f| element.style.contains(f.as_str()))
            && self.phrases.iter().any(|p| element.text.contains(p.as_str()))
    }
}

/// Hide every visible match once. Returns how many were hidden.
pub fn scrub(document: &dyn HostDocument, rule: &SuppressionRule) -> usize {
    let mut hidden = 0;
    for element in document.overlay_elements() {
        if !element.hidden && rule.matches(&element) {
            document.hide_element(element.id);
            hidden += 1;
        }
    }
    if hidden > 0 {
        tracing::debug!(hidden, "Suppressed provider error overlays");
    }
    hidden
}

/// The running scrubber. Dropping it stops the task.
pub struct OverlaySuppressor {
    handle: Option<JoinHandle<()>>,
}

impl OverlaySuppressor {
    pub fn spawn(document: Arc<dyn HostDocument>, rule: SuppressionRule) -> Self {
        let handle = tokio::spawn(async move {
            let mut mutations = document.observe_mutations();
            let mut ticker = tokio::time::interval(SCRUB_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut observing = true;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    signal = mutations.recv(), if observing => {
                        if signal.is_none() {
                            observing = false;
                            continue;
                        }
                    }
                }
                scrub(&*document, &rule);
            }
        });
        Self { handle: Some(handle) }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub async fn stop(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for OverlaySuppressor {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::headless::HeadlessDocument;
    use crate::map::host::ElementId;

    const ERROR_STYLE: &str = "background-color: white; font-weight: 500; font-family: Roboto";

    #[test]
    fn test_rule_needs_style_and_phrase() {
        let rule = SuppressionRule::default();
        let el = |style: &str, text: &str| OverlayElement {
            id: ElementId(1),
            style: style.into(),
            text: text.into(),
            hidden: false,
        };
        assert!(rule.matches(&el(ERROR_STYLE, "This page can't load Google Maps correctly.")));
        assert!(rule.matches(&el(ERROR_STYLE, "Do you own this website?")));
        assert!(!rule.matches(&el("background-color: white", "This page can't load")));
        assert!(!rule.matches(&el(ERROR_STYLE, "Delivery Location")));
    }

    #[test]
    fn test_scrub_hides_only_matches() {
        let doc = HeadlessDocument::new();
        let bad = doc.add_element(ERROR_STYLE, "Oops! Something went wrong. This page can't load Google Maps correctly.");
        let good = doc.add_element(ERROR_STYLE, "Pincode: 560001");
        let plain = doc.add_element("color: red", "Do you own this website?");

        assert_eq!(scrub(&*doc, &SuppressionRule::default()), 1);
        assert!(doc.is_hidden(bad));
        assert!(!doc.is_hidden(good));
        assert!(!doc.is_hidden(plain));
        assert_eq!(doc.element_count(), 3);

        assert_eq!(scrub(&*doc, &SuppressionRule::default()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppressor_scrubs_on_mutation_between_ticks() {
        let doc = HeadlessDocument::new();
        let suppressor = OverlaySuppressor::spawn(doc.clone(), SuppressionRule::default());
        tokio::time::sleep(Duration::from_millis(10)).await;

        let dialog = doc.add_element(ERROR_STYLE, "Do you own this website?");
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(doc.is_hidden(dialog));
        suppressor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_suppressor_catches_late_overlay_and_stops() {
        let doc = HeadlessDocument::new();
        let suppressor = OverlaySuppressor::spawn(doc.clone(), SuppressionRule::default());
        tokio::time::sleep(Duration::from_millis(10)).await;

        let late = doc.add_element(ERROR_STYLE, "This page can't load Google Maps correctly.");
        tokio::time::sleep(SCRUB_INTERVAL).await;
        assert!(doc.is_hidden(late));

        assert!(suppressor.is_running());
        suppressor.stop().await;
        let after = doc.add_element(ERROR_STYLE, "This page can't load Google Maps correctly.");
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!doc.is_hidden(after));
    }
}
