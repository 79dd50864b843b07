//! Landmark and heading browsing modes.

use async_trait::async_trait;
use serde_json::json;

use crate::browser::ElementQuery;
use crate::describe::describe;
use crate::errors::{ReaderError, ReaderResult};
use crate::state::{NavigationMode, StateField, StateUpdates};

use super::{ActionContext, ActionHandler, ActionOutcome};

const MODE_WRITES: &[StateField] = &[
    StateField::Mode,
    StateField::HeadingLevel,
    StateField::CursorIndex,
    StateField::LastElement,
];

fn parse_level(payload: Option<&str>) -> Option<u8> {
    let digits: String = payload?
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    match digits.parse::<u8>() {
        Ok(level @ 1..=6) => Some(level),
        _ => None,
    }
}

pub struct NavigateLandmarksHandler;

#[async_trait]
impl ActionHandler for NavigateLandmarksHandler {
    fn writes(&self) -> &'static [StateField] {
        MODE_WRITES
    }

    async fn run(&self, ctx: ActionContext<'_>) -> ReaderResult<ActionOutcome> {
        let page = ctx.page()?;
        let handles = ctx.driver.query(page, ElementQuery::Landmarks).await?;
        let mut updates = StateUpdates {
            mode: Some(NavigationMode::Landmarks),
            heading_level: Some(None),
            cursor_index: Some(0),
            last_element: Some(None),
            ..Default::default()
        };
        if handles.is_empty() {
            return Ok(ActionOutcome::message(
                "Switched to landmark navigation. No landmarks found on this page.",
            )
            .with_updates(updates));
        }
        let first = handles[0];
        ctx.driver.scroll_into_view(first).await?;
        let snapshot = ctx.driver.snapshot(first).await?;
        updates.last_element = Some(Some(first));
        Ok(ActionOutcome::message(format!(
            "Landmark navigation. 1 of {}: {}",
            handles.len(),
            describe(&snapshot)
        ))
        .with_output(json!({ "count": handles.len() }))
        .with_updates(updates))
    }
}

pub struct NavigateHeadingsHandler;

#[async_trait]
impl ActionHandler for NavigateHeadingsHandler {
    fn writes(&self) -> &'static [StateField] {
        MODE_WRITES
    }

    async fn run(&self, ctx: ActionContext<'_>) -> ReaderResult<ActionOutcome> {
        let page = ctx.page()?;
        let level = parse_level(ctx.payload);
        let handles = ctx.driver.query(page, ElementQuery::Headings { level }).await?;
        let label = match level {
            Some(l) => format!("level {l} headings"),
            None => "headings".to_string(),
        };
        let mut updates = StateUpdates {
            mode: Some(NavigationMode::Headings),
            heading_level: Some(level),
            cursor_index: Some(0),
            last_element: Some(None),
            ..Default::default()
        };
        if handles.is_empty() {
            return Ok(ActionOutcome::message(format!(
                "Switched to heading navigation. No {label} found on this page."
            ))
            .with_updates(updates));
        }
        let first = handles[0];
        ctx.driver.scroll_into_view(first).await?;
        let snapshot = ctx.driver.snapshot(first).await?;
        updates.last_element = Some(Some(first));
        Ok(ActionOutcome::message(format!(
            "Heading navigation, {label}. 1 of {}: {}",
            handles.len(),
            describe(&snapshot)
        ))
        .with_output(json!({ "count": handles.len(), "level": level }))
        .with_updates(updates))
    }
}

pub struct ChangeHeadingLevelHandler;

#[async_trait]
impl ActionHandler for ChangeHeadingLevelHandler {
    fn writes(&self) -> &'static [StateField] {
        &[
            StateField::HeadingLevel,
            StateField::CursorIndex,
            StateField::LastElement,
        ]
    }

    async fn run(&self, ctx: ActionContext<'_>) -> ReaderResult<ActionOutcome> {
        let page = ctx.page()?;
        if ctx.state.mode != NavigationMode::Headings {
            return Err(ReaderError::InvalidMode(
                "You're not navigating by headings. Say 'navigate by headings' first.".into(),
            ));
        }
        let direction = ctx.payload_text().unwrap_or_default().to_lowercase();
        let going_up = direction.contains("up");
        let going_down = direction.contains("down");
        if going_up == going_down {
            return Ok(ActionOutcome::message(
                "Say 'up' or 'down' to change the heading level.",
            ));
        }

        let all = ctx
            .driver
            .query(page, ElementQuery::Headings { level: None })
            .await?;
        if all.is_empty() {
            return Ok(ActionOutcome::message("No headings found on this page."));
        }
        let mut levels = Vec::new();
        for handle in &all {
            let snapshot = ctx.driver.snapshot(*handle).await?;
            if let Some(level) = snapshot.heading_level {
                if !levels.contains(&level) {
                    levels.push(level);
                }
            }
        }
        levels.sort_unstable();

        let current = match ctx.state.heading_level {
            Some(level) => level,
            None => {
                // No active filter: anchor on the heading under the cursor.
                let cursor = ctx.state.cursor_index.min(all.len() - 1);
                ctx.driver
                    .snapshot(all[cursor])
                    .await?
                    .heading_level
                    .unwrap_or(levels[0])
            }
        };

        // "Up" means toward h1, numerically smaller.
        let target = if going_up {
            levels.iter().rev().copied().find(|l| *l < current)
        } else {
            levels.iter().copied().find(|l| *l > current)
        };
        let Some(target) = target else {
            let boundary = if going_up { "highest" } else { "lowest" };
            return Ok(ActionOutcome::message(format!(
                "Already at the {boundary} heading level."
            )));
        };

        let handles = ctx
            .driver
            .query(page, ElementQuery::Headings { level: Some(target) })
            .await?;
        let first = handles
            .first()
            .copied()
            .ok_or_else(|| ReaderError::Browser("headings changed during level switch".into()))?;
        ctx.driver.scroll_into_view(first).await?;
        let snapshot = ctx.driver.snapshot(first).await?;
        Ok(ActionOutcome::message(format!(
            "Heading level {target}. 1 of {}: {}",
            handles.len(),
            describe(&snapshot)
        ))
        .with_output(json!({ "level": target, "count": handles.len() }))
        .with_updates(StateUpdates {
            heading_level: Some(Some(target)),
            cursor_index: Some(0),
            last_element: Some(Some(first)),
            ..Default::default()
        }))
    }
}

pub struct GotoLandmarkHandler;

#[async_trait]
impl ActionHandler for GotoLandmarkHandler {
    fn writes(&self) -> &'static [StateField] {
        MODE_WRITES
    }

    async fn run(&self, ctx: ActionContext<'_>) -> ReaderResult<ActionOutcome> {
        let Some(target) = ctx.payload_text() else {
            return Ok(ActionOutcome::message("Which section should I go to?"));
        };
        let page = ctx.page()?;
        let handles = ctx.driver.query(page, ElementQuery::Landmarks).await?;
        let needle = target.to_lowercase();
        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in &handles {
            snapshots.push(ctx.driver.snapshot(*handle).await?);
        }
        // Role, label, and tag identify a landmark more reliably than its
        // body text, so they match first.
        let by_identity = snapshots.iter().position(|s| {
            [
                s.role.as_deref().unwrap_or_default(),
                s.aria_label.as_deref().unwrap_or_default(),
                s.tag.as_str(),
            ]
            .iter()
            .any(|h| h.to_lowercase().contains(&needle))
        });
        let position = by_identity.or_else(|| {
            snapshots
                .iter()
                .position(|s| s.text.to_lowercase().contains(&needle))
        });
        let Some(position) = position else {
            return Ok(ActionOutcome::message(format!(
                "Could not find a landmark matching '{target}'."
            )));
        };
        let handle = handles[position];
        let snapshot = &snapshots[position];
        ctx.driver.scroll_into_view(handle).await?;
        let preview: String = snapshot.text.trim().chars().take(200).collect();
        let mut message = format!("Moved to {}.", describe(snapshot));
        if !preview.is_empty() {
            message.push(' ');
            message.push_str(&preview);
        }
        Ok(ActionOutcome::message(message)
            .with_output(json!({ "index": position, "count": handles.len() }))
            .with_updates(StateUpdates {
                mode: Some(NavigationMode::Landmarks),
                heading_level: Some(None),
                cursor_index: Some(position),
                last_element: Some(Some(handle)),
                ..Default::default()
            }))
    }
}

pub struct ListLandmarksHandler;

#[async_trait]
impl ActionHandler for ListLandmarksHandler {
    fn can_parallel(&self) -> bool {
        true
    }

    async fn run(&self, ctx: ActionContext<'_>) -> ReaderResult<ActionOutcome> {
        let page = ctx.page()?;
        let handles = ctx.driver.query(page, ElementQuery::Landmarks).await?;
        if handles.is_empty() {
            return Ok(ActionOutcome::message("No landmarks found on this page."));
        }
        let mut lines = Vec::with_capacity(handles.len());
        let mut structured = Vec::with_capacity(handles.len());
        for handle in handles {
            let snapshot = ctx.driver.snapshot(handle).await?;
            let role = snapshot
                .role
                .clone()
                .unwrap_or_else(|| snapshot.tag.clone());
            let preview: String = snapshot.text.trim().chars().take(60).collect();
            lines.push(format!("- {role}: {preview}"));
            structured.push(json!({ "role": role, "text": preview }));
        }
        Ok(ActionOutcome::message(format!(
            "Found {} landmarks:\n{}",
            lines.len(),
            lines.join("\n")
        ))
        .with_output(json!({ "landmarks": structured })))
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

    fn leveled_site() -> StaticBrowser {
        let page = StaticPage::new("example.com", "Levels")
            .with_element(StaticElement::heading(1, "Top"))
            .with_element(StaticElement::heading(2, "Mid one"))
            .with_element(StaticElement::heading(2, "Mid two"))
            .with_element(StaticElement::heading(4, "Deep"));
        StaticBrowser::new(vec![page])
    }

    #[tokio::test]
    async fn navigate_landmarks_switches_mode_and_describes_first() {
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
        let outcome = NavigateLandmarksHandler.run(ctx).await.unwrap();
        assert!(outcome.message.starts_with("Landmark navigation. 1 of 3:"));
        outcome.updates.apply(&mut state);
        assert_eq!(state.mode, NavigationMode::Landmarks);
        assert_eq!(state.cursor_index, 0);
    }

    #[tokio::test]
    async fn navigate_headings_honors_level_filter() {
        let browser = leveled_site();
        let mut state = NavigationState::new(50);
        open(&browser, &mut state).await;
        let cfg = ReaderConfig::default();
        let ctx = ActionContext {
            state: &state,
            payload: Some("level 2"),
            driver: &browser,
            config: &cfg,
        };
        let outcome = NavigateHeadingsHandler.run(ctx).await.unwrap();
        assert!(outcome.message.contains("level 2 headings. 1 of 2"));
        outcome.updates.apply(&mut state);
        assert_eq!(state.heading_level, Some(2));
    }

    #[tokio::test]
    async fn change_level_outside_heading_mode_is_invalid() {
        let browser = leveled_site();
        let mut state = NavigationState::new(50);
        open(&browser, &mut state).await;
        let cfg = ReaderConfig::default();
        let ctx = ActionContext {
            state: &state,
            payload: Some("up"),
            driver: &browser,
            config: &cfg,
        };
        let err = ChangeHeadingLevelHandler.run(ctx).await.unwrap_err();
        assert!(matches!(err, ReaderError::InvalidMode(_)));
    }

    #[tokio::test]
    async fn change_level_picks_nearest_existing_level() {
        let browser = leveled_site();
        let mut state = NavigationState::new(50);
        open(&browser, &mut state).await;
        state.mode = NavigationMode::Headings;
        state.heading_level = Some(4);
        let cfg = ReaderConfig::default();
        let ctx = ActionContext {
            state: &state,
            payload: Some("up"),
            driver: &browser,
            config: &cfg,
        };
        // No h3 exists, so up from 4 lands on 2.
        let outcome = ChangeHeadingLevelHandler.run(ctx).await.unwrap();
        assert!(outcome.message.starts_with("Heading level 2."));
        assert_eq!(outcome.updates.heading_level, Some(Some(2)));
    }

    #[tokio::test]
    async fn change_level_clamps_at_the_extreme() {
        let browser = leveled_site();
        let mut state = NavigationState::new(50);
        open(&browser, &mut state).await;
        state.mode = NavigationMode::Headings;
        state.heading_level = Some(1);
        let cfg = ReaderConfig::default();
        let ctx = ActionContext {
            state: &state,
            payload: Some("up"),
            driver: &browser,
            config: &cfg,
        };
        let outcome = ChangeHeadingLevelHandler.run(ctx).await.unwrap();
        assert_eq!(outcome.message, "Already at the highest heading level.");
        assert!(outcome.updates.heading_level.is_none());
    }

    #[tokio::test]
    async fn goto_landmark_matches_by_role() {
        let browser = StaticBrowser::with_sample_site();
        let mut state = NavigationState::new(50);
        open(&browser, &mut state).await;
        let cfg = ReaderConfig::default();
        let ctx = ActionContext {
            state: &state,
            payload: Some("main"),
            driver: &browser,
            config: &cfg,
        };
        let outcome = GotoLandmarkHandler.run(ctx).await.unwrap();
        assert!(outcome.message.starts_with("Moved to main"));
        outcome.updates.apply(&mut state);
        assert_eq!(state.mode, NavigationMode::Landmarks);
        assert_eq!(state.cursor_index, 1);
    }

    #[tokio::test]
    async fn goto_landmark_miss_is_guidance() {
        let browser = StaticBrowser::with_sample_site();
        let mut state = NavigationState::new(50);
        open(&browser, &mut state).await;
        let cfg = ReaderConfig::default();
        let ctx = ActionContext {
            state: &state,
            payload: Some("sidebar"),
            driver: &browser,
            config: &cfg,
        };
        let outcome = GotoLandmarkHandler.run(ctx).await.unwrap();
        assert!(outcome.message.contains("Could not find a landmark"));
        assert!(outcome.updates.fields().is_empty());
    }

    #[tokio::test]
    async fn list_landmarks_names_roles() {
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
        let outcome = ListLandmarksHandler.run(ctx).await.unwrap();
        assert!(outcome.message.contains("Found 3 landmarks"));
        assert!(outcome.message.contains("- banner:"));
        assert!(outcome.message.contains("- contentinfo:"));
    }
}
