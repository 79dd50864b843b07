//! Page navigation and cursor movement.

use async_trait::async_trait;
use serde_json::json;
use tracing::info;
use url::Url;

use crate::browser::{BrowserDriver, ElementQuery};
use crate::config::ReaderConfig;
use crate::errors::{ReaderError, ReaderResult};
use crate::index::ElementIndex;
use crate::state::{PageContext, StateField, StateUpdates};

use super::{ActionContext, ActionHandler, ActionOutcome};

/// Normalize user-supplied addresses: anything without an http(s) scheme
/// gets `https://` prepended.
pub(crate) fn normalize_url(raw: &str) -> ReaderResult<Url> {
    let trimmed = raw.trim();
    if let Ok(url) = Url::parse(trimmed) {
        if matches!(url.scheme(), "http" | "https") {
            return Ok(url);
        }
    }
    Url::parse(&format!("https://{trimmed}")).map_err(|e| ReaderError::Navigation {
        url: trimmed.to_string(),
        cause: e.to_string(),
    })
}

pub(crate) struct Arrival {
    pub url: Url,
    pub title: String,
    pub interactive_count: usize,
    pub updates: StateUpdates,
}

/// Open a page and build the full navigation state reset. State is only
/// touched through the returned updates, so a failed navigation commits
/// nothing.
pub(crate) async fn open_page(
    driver: &dyn BrowserDriver,
    config: &ReaderConfig,
    raw_url: &str,
) -> ReaderResult<Arrival> {
    let url = normalize_url(raw_url)?;
    let page = driver.navigate(&url, config.navigation_timeout()).await?;
    let title = driver.title(page).await?;
    let interactive_count = driver.query(page, ElementQuery::Focusable).await?.len();
    info!(%url, %title, interactive_count, "navigation complete");
    Ok(Arrival {
        updates: StateUpdates::for_navigation(url.clone(), page),
        url,
        title,
        interactive_count,
    })
}

pub struct NavigateHandler;

#[async_trait]
impl ActionHandler for NavigateHandler {
    fn writes(&self) -> &'static [StateField] {
        &[
            StateField::CurrentUrl,
            StateField::Page,
            StateField::Mode,
            StateField::HeadingLevel,
            StateField::CursorIndex,
            StateField::LastElement,
            StateField::Headlines,
            StateField::PageContext,
        ]
    }

    async fn run(&self, ctx: ActionContext<'_>) -> ReaderResult<ActionOutcome> {
        let Some(target) = ctx.payload_text() else {
            return Ok(ActionOutcome::message(
                "Please tell me which website to open.",
            ));
        };
        let arrival = open_page(ctx.driver, ctx.config, target).await?;
        let message = format!(
            "Navigated to {}: {}. {} interactive elements. Say 'next element' to start reading.",
            arrival.url, arrival.title, arrival.interactive_count
        );
        Ok(ActionOutcome::message(message)
            .with_output(json!({
                "url": arrival.url.to_string(),
                "title": arrival.title,
                "interactive_count": arrival.interactive_count,
            }))
            .with_updates(arrival.updates))
    }
}

pub struct NextElementHandler;

#[async_trait]
impl ActionHandler for NextElementHandler {
    fn writes(&self) -> &'static [StateField] {
        &[StateField::CursorIndex, StateField::LastElement]
    }

    async fn run(&self, ctx: ActionContext<'_>) -> ReaderResult<ActionOutcome> {
        let page = ctx.page()?;
        let index = ElementIndex::compute(
            ctx.driver,
            page,
            ctx.state.mode,
            ctx.state.heading_level,
        )
        .await?;
        if index.is_empty() {
            return Ok(ActionOutcome::message(format!(
                "No {} found on this page.",
                ctx.state.mode.as_str()
            )));
        }
        let cursor = index.clamp(ctx.state.cursor_index);
        if cursor + 1 >= index.len() {
            return Ok(ActionOutcome::message("Reached end of page")
                .with_output(json!({ "index": cursor, "count": index.len() })));
        }
        let next = cursor + 1;
        let handle = index
            .get(next)
            .ok_or_else(|| ReaderError::Browser("index changed during move".into()))?;
        ctx.driver.scroll_into_view(handle).await?;
        let snapshot = ctx.driver.snapshot(handle).await?;
        let description = crate::describe::describe(&snapshot);
        Ok(ActionOutcome::message(format!("Moved to {description}"))
            .with_output(json!({ "index": next, "count": index.len() }))
            .with_updates(StateUpdates {
                cursor_index: Some(next),
                last_element: Some(Some(handle)),
                ..Default::default()
            }))
    }
}

pub struct PreviousElementHandler;

#[async_trait]
impl ActionHandler for PreviousElementHandler {
    fn writes(&self) -> &'static [StateField] {
        &[StateField::CursorIndex, StateField::LastElement]
    }

    async fn run(&self, ctx: ActionContext<'_>) -> ReaderResult<ActionOutcome> {
        let page = ctx.page()?;
        let index = ElementIndex::compute(
            ctx.driver,
            page,
            ctx.state.mode,
            ctx.state.heading_level,
        )
        .await?;
        if index.is_empty() {
            return Ok(ActionOutcome::message(format!(
                "No {} found on this page.",
                ctx.state.mode.as_str()
            )));
        }
        let cursor = index.clamp(ctx.state.cursor_index);
        if cursor == 0 {
            return Ok(ActionOutcome::message("At start of page")
                .with_output(json!({ "index": 0, "count": index.len() })));
        }
        let previous = cursor - 1;
        let handle = index
            .get(previous)
            .ok_or_else(|| ReaderError::Browser("index changed during move".into()))?;
        ctx.driver.scroll_into_view(handle).await?;
        let snapshot = ctx.driver.snapshot(handle).await?;
        let description = crate::describe::describe(&snapshot);
        Ok(ActionOutcome::message(format!("Moved to {description}"))
            .with_output(json!({ "index": previous, "count": index.len() }))
            .with_updates(StateUpdates {
                cursor_index: Some(previous),
                last_element: Some(Some(handle)),
                ..Default::default()
            }))
    }
}

/// Internal auxiliary task: refresh the page context summary. Silent on the
/// speech channel; its value is the context it writes.
pub struct PageAnalysisHandler;

#[async_trait]
impl ActionHandler for PageAnalysisHandler {
    fn can_parallel(&self) -> bool {
        true
    }

    fn writes(&self) -> &'static [StateField] {
        &[StateField::PageContext]
    }

    async fn run(&self, ctx: ActionContext<'_>) -> ReaderResult<ActionOutcome> {
        let page = ctx.page()?;
        let title = ctx.driver.title(page).await?;
        let heading_count = ctx
            .driver
            .query(page, ElementQuery::Headings { level: None })
            .await?
            .len();
        let landmark_count = ctx.driver.query(page, ElementQuery::Landmarks).await?.len();
        let interactive_count = ctx.driver.query(page, ElementQuery::Focusable).await?.len();
        let page_type = if heading_count >= 4 {
            "article"
        } else if interactive_count >= 8 {
            "interactive"
        } else {
            "general"
        };
        let context = PageContext {
            title,
            page_type: page_type.to_string(),
            heading_count,
            landmark_count,
            interactive_count,
        };
        Ok(ActionOutcome::default()
            .with_output(json!({
                "page_type": context.page_type,
                "heading_count": heading_count,
                "landmark_count": landmark_count,
                "interactive_count": interactive_count,
            }))
            .with_updates(StateUpdates {
                page_context: Some(Some(context)),
                ..Default::default()
            }))
    }
}
