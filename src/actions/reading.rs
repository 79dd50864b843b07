//! Reading actions: cursor read-back, headings, headlines, text search,
//! section reading.

use async_trait::async_trait;
use serde_json::json;

use crate::browser::ElementQuery;
use crate::describe::describe;
use crate::errors::{ReaderError, ReaderResult};
use crate::index::ElementIndex;
use crate::state::{Headline, StateField, StateUpdates};

use super::navigation::open_page;
use super::{ActionContext, ActionHandler, ActionOutcome};

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

pub struct ReadCurrentHandler;

#[async_trait]
impl ActionHandler for ReadCurrentHandler {
    fn writes(&self) -> &'static [StateField] {
        &[StateField::LastElement]
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
                "No {} to read on this page.",
                ctx.state.mode.as_str()
            )));
        }
        let cursor = index.clamp(ctx.state.cursor_index);
        let handle = index
            .get(cursor)
            .ok_or_else(|| ReaderError::Browser("index changed during read".into()))?;
        let snapshot = ctx.driver.snapshot(handle).await?;
        let description = describe(&snapshot);
        Ok(ActionOutcome::message(format!(
            "Current element {} of {}: {description}",
            cursor + 1,
            index.len()
        ))
        .with_output(json!({ "index": cursor, "count": index.len() }))
        .with_updates(StateUpdates {
            last_element: Some(Some(handle)),
            ..Default::default()
        }))
    }
}

pub struct ListHeadingsHandler;

#[async_trait]
impl ActionHandler for ListHeadingsHandler {
    fn can_parallel(&self) -> bool {
        true
    }

    async fn run(&self, ctx: ActionContext<'_>) -> ReaderResult<ActionOutcome> {
        let page = ctx.page()?;
        let handles = ctx
            .driver
            .query(page, ElementQuery::Headings { level: None })
            .await?;
        if handles.is_empty() {
            return Ok(ActionOutcome::message("No headings found on this page."));
        }
        let mut lines = Vec::with_capacity(handles.len());
        let mut structured = Vec::with_capacity(handles.len());
        for handle in handles {
            let snapshot = ctx.driver.snapshot(handle).await?;
            let level = snapshot.heading_level.unwrap_or(1);
            let text = snapshot.text.trim().to_string();
            lines.push(format!("H{level}: {text}"));
            structured.push(json!({ "level": level, "text": text }));
        }
        Ok(ActionOutcome::message(format!(
            "Found {} headings:\n{}",
            lines.len(),
            lines.join("\n")
        ))
        .with_output(json!({ "headings": structured })))
    }
}

pub struct ListHeadlinesHandler;

#[async_trait]
impl ActionHandler for ListHeadlinesHandler {
    fn can_parallel(&self) -> bool {
        true
    }

    fn writes(&self) -> &'static [StateField] {
        &[StateField::Headlines]
    }

    async fn run(&self, ctx: ActionContext<'_>) -> ReaderResult<ActionOutcome> {
        let page = ctx.page()?;
        let handles = ctx
            .driver
            .query(page, ElementQuery::Headings { level: None })
            .await?;
        let mut headlines = Vec::new();
        for handle in handles {
            let snapshot = ctx.driver.snapshot(handle).await?;
            let text = snapshot.text.trim().to_string();
            // Short headings are section labels, not headlines.
            if text.chars().count() < ctx.config.headline_min_chars {
                continue;
            }
            headlines.push(Headline {
                index: headlines.len() + 1,
                text,
                href: snapshot.href.clone(),
            });
            if headlines.len() == ctx.config.headline_limit {
                break;
            }
        }
        if headlines.is_empty() {
            return Ok(ActionOutcome::message("No headlines found on this page."));
        }
        let listing: Vec<String> = headlines
            .iter()
            .map(|h| format!("{}. {}", h.index, truncate(&h.text, 100)))
            .collect();
        let message = format!(
            "Found {} headlines:\n{}\nSay 'go to headline' and a number to open one.",
            headlines.len(),
            listing.join("\n")
        );
        let structured: Vec<_> = headlines
            .iter()
            .map(|h| json!({ "index": h.index, "text": h.text, "href": h.href }))
            .collect();
        Ok(ActionOutcome::message(message)
            .with_output(json!({ "headlines": structured }))
            .with_updates(StateUpdates {
                headlines: Some(headlines),
                ..Default::default()
            }))
    }
}

pub struct GotoHeadlineHandler;

#[async_trait]
impl ActionHandler for GotoHeadlineHandler {
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
        ctx.page()?;
        let digits: String = ctx
            .payload_text()
            .unwrap_or_default()
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        let Ok(number) = digits.parse::<usize>() else {
            return Ok(ActionOutcome::message(
                "Which headline number should I open?",
            ));
        };
        if ctx.state.headlines.is_empty() {
            return Ok(ActionOutcome::message(
                "No headlines listed yet. Say 'list headlines' first.",
            ));
        }
        let count = ctx.state.headlines.len();
        let Some(headline) = ctx.state.headlines.get(number.wrapping_sub(1)) else {
            return Ok(ActionOutcome::message(format!(
                "There are {count} headlines. Pick a number from 1 to {count}."
            )));
        };
        let Some(href) = headline.href.as_deref() else {
            return Ok(ActionOutcome::message(format!(
                "Headline {number} has no link to follow."
            )));
        };
        let text = headline.text.clone();
        let arrival = open_page(ctx.driver, ctx.config, href).await?;
        Ok(ActionOutcome::message(format!(
            "Opening headline {number}: {text}. Now on {}.",
            arrival.title
        ))
        .with_output(json!({
            "headline": text,
            "url": arrival.url.to_string(),
            "title": arrival.title,
        }))
        .with_updates(arrival.updates))
    }
}

pub struct FindTextHandler;

#[async_trait]
impl ActionHandler for FindTextHandler {
    fn can_parallel(&self) -> bool {
        true
    }

    async fn run(&self, ctx: ActionContext<'_>) -> ReaderResult<ActionOutcome> {
        let Some(query) = ctx.payload_text() else {
            return Ok(ActionOutcome::message("What text should I search for?"));
        };
        let page = ctx.page()?;
        let blocks = ctx.driver.visible_text(page).await?;
        let needle = query.to_lowercase();
        let matches: Vec<String> = blocks
            .iter()
            .filter(|block| block.to_lowercase().contains(&needle))
            .map(|block| truncate(block.trim(), 160))
            .collect();
        if matches.is_empty() {
            return Ok(ActionOutcome::message(format!(
                "Text \"{query}\" not found on page"
            ))
            .with_output(json!({ "query": query, "matches": [] })));
        }
        let listing: Vec<String> = matches.iter().map(|m| format!("- {m}")).collect();
        Ok(ActionOutcome::message(format!(
            "Found {} matches for \"{query}\":\n{}",
            matches.len(),
            listing.join("\n")
        ))
        .with_output(json!({ "query": query, "matches": matches })))
    }
}

pub struct ReadSectionHandler;

#[async_trait]
impl ActionHandler for ReadSectionHandler {
    async fn run(&self, ctx: ActionContext<'_>) -> ReaderResult<ActionOutcome> {
        let page = ctx.page()?;
        let index = ElementIndex::compute(
            ctx.driver,
            page,
            ctx.state.mode,
            ctx.state.heading_level,
        )
        .await?;
        let mut text = String::new();
        if !index.is_empty() {
            let cursor = index.clamp(ctx.state.cursor_index);
            if let Some(handle) = index.get(cursor) {
                let snapshot = ctx.driver.snapshot(handle).await?;
                text = snapshot.text.trim().to_string();
            }
        }
        if text.is_empty() {
            // Fall back to the enclosing section, then to the page text.
            let landmarks = ctx.driver.query(page, ElementQuery::Landmarks).await?;
            for handle in landmarks {
                let snapshot = ctx.driver.snapshot(handle).await?;
                let candidate = snapshot.text.trim().to_string();
                if !candidate.is_empty() {
                    text = candidate;
                    break;
                }
            }
        }
        if text.is_empty() {
            if let Some(block) = ctx.driver.visible_text(page).await?.first() {
                text = block.trim().to_string();
            }
        }
        if text.is_empty() {
            return Ok(ActionOutcome::message(
                "No readable content found in this section.",
            ));
        }
        let text = truncate(&text, 500);
        Ok(ActionOutcome::message(format!("Reading section: {text}"))
            .with_output(json!({ "text": text })))
    }
}
