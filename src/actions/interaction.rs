//! Element interaction: clicking and read-back of the last found element.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::browser::{ElementQuery, ElementSnapshot};
use crate::describe::describe;
use crate::errors::{ReaderError, ReaderResult};
use crate::state::{NavigationMode, StateField, StateUpdates};

use super::{ActionContext, ActionHandler, ActionOutcome};

/// Matching strategies in order: exact name, then substring, then link
/// target. The first strategy with a hit wins.
fn find_target(snapshots: &[ElementSnapshot], target: &str) -> Option<usize> {
    let needle = target.to_lowercase();
    let name = |s: &ElementSnapshot| {
        s.aria_label
            .as_deref()
            .unwrap_or(s.text.trim())
            .to_lowercase()
    };
    snapshots
        .iter()
        .position(|s| name(s) == needle)
        .or_else(|| snapshots.iter().position(|s| name(s).contains(&needle)))
        .or_else(|| {
            snapshots.iter().position(|s| {
                s.href
                    .as_deref()
                    .map(|h| h.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
        })
}

pub struct ClickElementHandler;

#[async_trait]
impl ActionHandler for ClickElementHandler {
    fn writes(&self) -> &'static [StateField] {
        &[StateField::CursorIndex, StateField::LastElement]
    }

    async fn run(&self, ctx: ActionContext<'_>) -> ReaderResult<ActionOutcome> {
        let Some(target) = ctx.payload_text() else {
            return Ok(ActionOutcome::message("Which element should I click?"));
        };
        let page = ctx.page()?;
        let handles = ctx.driver.query(page, ElementQuery::Focusable).await?;
        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in &handles {
            snapshots.push(ctx.driver.snapshot(*handle).await?);
        }
        let Some(position) = find_target(&snapshots, target) else {
            debug!(query = target, candidates = handles.len(), "no click target matched");
            return Err(ReaderError::ElementNotFound(target.to_string()));
        };
        let handle = handles[position];
        ctx.driver.scroll_into_view(handle).await?;
        ctx.driver.click(handle).await?;
        let description = describe(&snapshots[position]);
        let mut updates = StateUpdates {
            last_element: Some(Some(handle)),
            ..Default::default()
        };
        // The focusable index is the active one only in ALL mode.
        if ctx.state.mode == NavigationMode::All {
            updates.cursor_index = Some(position);
        }
        Ok(ActionOutcome::message(format!("Clicked {description}."))
            .with_output(json!({ "index": position }))
            .with_updates(updates))
    }
}

pub struct CheckElementHandler;

#[async_trait]
impl ActionHandler for CheckElementHandler {
    async fn run(&self, ctx: ActionContext<'_>) -> ReaderResult<ActionOutcome> {
        ctx.page()?;
        let Some(handle) = ctx.state.last_element else {
            return Ok(ActionOutcome::message(
                "No element to check yet. Move to or find an element first.",
            ));
        };
        let snapshot = match ctx.driver.snapshot(handle).await {
            Ok(snapshot) => snapshot,
            // Stale handle: the page changed underneath us.
            Err(_) => {
                return Ok(ActionOutcome::message(
                    "That element is no longer on the page.",
                ));
            }
        };
        let mut message = format!("That is {}.", describe(&snapshot));
        if let Some(href) = snapshot.href.as_deref() {
            message.push_str(&format!(" It links to {href}."));
        }
        Ok(ActionOutcome::message(message).with_output(json!({
            "tag": snapshot.tag,
            "role": snapshot.role,
            "href": snapshot.href,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{BrowserDriver, StaticBrowser, StaticElement, StaticPage};
    use crate::config::ReaderConfig;
    use crate::state::NavigationState;
    use std::time::Duration;
    use url::Url;

    async fn open(browser: &StaticBrowser, state: &mut NavigationState) {
        let url = Url::parse("https://example.com").unwrap();
        let page = browser.navigate(&url, Duration::from_secs(1)).await.unwrap();
        state.current_url = Some(url);
        state.page = Some(page);
    }

    #[tokio::test]
    async fn click_matches_exact_name_before_substring() {
        let page = StaticPage::new("example.com", "Buttons")
            .with_element(StaticElement::button("Sign in with Google"))
            .with_element(StaticElement::button("Sign in"));
        let browser = StaticBrowser::new(vec![page]);
        let mut state = NavigationState::new(50);
        open(&browser, &mut state).await;
        let cfg = ReaderConfig::default();
        let ctx = ActionContext {
            state: &state,
            payload: Some("sign in"),
            driver: &browser,
            config: &cfg,
        };
        let outcome = ClickElementHandler.run(ctx).await.unwrap();
        assert_eq!(outcome.updates.cursor_index, Some(1));
        assert_eq!(browser.clicked().len(), 1);
        assert!(outcome.message.starts_with("Clicked button: Sign in."));
    }

    #[tokio::test]
    async fn click_falls_back_to_substring() {
        let browser = StaticBrowser::with_sample_site();
        let mut state = NavigationState::new(50);
        open(&browser, &mut state).await;
        let cfg = ReaderConfig::default();
        let ctx = ActionContext {
            state: &state,
            payload: Some("information"),
            driver: &browser,
            config: &cfg,
        };
        let outcome = ClickElementHandler.run(ctx).await.unwrap();
        assert!(outcome.message.contains("More information"));
    }

    #[tokio::test]
    async fn missing_click_target_is_element_not_found() {
        let browser = StaticBrowser::with_sample_site();
        let mut state = NavigationState::new(50);
        open(&browser, &mut state).await;
        let cfg = ReaderConfig::default();
        let ctx = ActionContext {
            state: &state,
            payload: Some("log out"),
            driver: &browser,
            config: &cfg,
        };
        let err = ClickElementHandler.run(ctx).await.unwrap_err();
        assert!(matches!(err, ReaderError::ElementNotFound(_)));
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn check_without_last_element_is_guidance() {
        let browser = StaticBrowser::with_sample_site();
        let mut state = NavigationState::new(50);
        open(&browser, &mut state).await;
        let cfg = ReaderConfig::default();
        let ctx = ActionContext {
            state: &state,
            payload: None,
            driver: &browser,
            config: &cfg,
        };
        let outcome = CheckElementHandler.run(ctx).await.unwrap();
        assert!(outcome.message.contains("No element to check yet"));
    }

    #[tokio::test]
    async fn check_reads_back_the_clicked_element() {
        let browser = StaticBrowser::with_sample_site();
        let mut state = NavigationState::new(50);
        open(&browser, &mut state).await;
        let cfg = ReaderConfig::default();
        let click = ActionContext {
            state: &state,
            payload: Some("More information"),
            driver: &browser,
            config: &cfg,
        };
        let outcome = ClickElementHandler.run(click).await.unwrap();
        outcome.updates.apply(&mut state);
        let check = ActionContext {
            state: &state,
            payload: None,
            driver: &browser,
            config: &cfg,
        };
        let outcome = CheckElementHandler.run(check).await.unwrap();
        assert!(outcome.message.contains("link: More information"));
        assert!(outcome.message.contains("It links to https://example.com/more"));
    }
}
