//! Accessible element descriptions.
//!
//! The precedence here is a behavioral contract, matched exactly by the
//! tests below: identity comes from aria-label, else role, else input type,
//! else a tag fallback; state tokens follow in a fixed order; content is the
//! value, else the trimmed text (unless aria-label already supplied it);
//! aria-describedby text comes last after a period.

use crate::browser::ElementSnapshot;

/// Normalized description of one element. Stateless and recomputed on every
/// read; never cached across navigations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ElementDescriptor {
    /// The identity token: aria-label, role, input kind, or tag fallback.
    pub identity: String,
    /// Whether identity came from aria-label (suppresses text content).
    pub named_by_aria: bool,
    /// State tokens in announcement order.
    pub states: Vec<&'static str>,
    /// Value or text content, already trimmed.
    pub content: Option<String>,
    /// aria-describedby target text.
    pub detail: Option<String>,
}

/// Compute the normalized descriptor for a snapshot.
pub fn descriptor(snapshot: &ElementSnapshot) -> ElementDescriptor {
    let (identity, named_by_aria) = identity_of(snapshot);

    let mut states = Vec::new();
    if snapshot.required {
        states.push("required");
    }
    if snapshot.disabled {
        states.push("disabled");
    }
    match snapshot.expanded {
        Some(true) => states.push("expanded"),
        Some(false) => states.push("collapsed"),
        None => {}
    }
    match snapshot.checked {
        Some(true) => states.push("checked"),
        Some(false) => states.push("unchecked"),
        None => {}
    }

    let content = match &snapshot.value {
        Some(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
        _ => {
            let text = snapshot.text.trim();
            if text.is_empty() || named_by_aria {
                None
            } else {
                Some(text.to_string())
            }
        }
    };

    let detail = snapshot
        .described_by
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    ElementDescriptor {
        identity,
        named_by_aria,
        states,
        content,
        detail,
    }
}

/// Render a snapshot as a spoken description.
pub fn describe(snapshot: &ElementSnapshot) -> String {
    let d = descriptor(snapshot);
    let mut out = d.identity;
    if !d.states.is_empty() {
        out.push_str(" (");
        out.push_str(&d.states.join(", "));
        out.push(')');
    }
    if let Some(content) = d.content {
        out.push_str(": ");
        out.push_str(&content);
    }
    if let Some(detail) = d.detail {
        out.push_str(". ");
        out.push_str(&detail);
    }
    out
}

fn identity_of(snapshot: &ElementSnapshot) -> (String, bool) {
    if let Some(label) = snapshot.aria_label.as_deref() {
        if !label.is_empty() {
            return (label.to_string(), true);
        }
    }
    if let Some(role) = snapshot.role.as_deref() {
        if !role.is_empty() {
            return (role.to_string(), false);
        }
    }
    let identity = match snapshot.tag.as_str() {
        "input" | "select" | "textarea" => {
            let kind = snapshot
                .input_type
                .as_deref()
                .unwrap_or(if snapshot.tag == "input" {
                    "text"
                } else {
                    snapshot.tag.as_str()
                });
            format!("{kind} input")
        }
        "a" => "link".to_string(),
        "button" => "button".to_string(),
        tag => tag.to_string(),
    };
    (identity, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(tag: &str) -> ElementSnapshot {
        ElementSnapshot {
            tag: tag.into(),
            ..Default::default()
        }
    }

    #[test]
    fn aria_label_wins_and_suppresses_text() {
        let mut snap = base("button");
        snap.aria_label = Some("Close dialog".into());
        snap.text = "X".into();
        assert_eq!(describe(&snap), "Close dialog");
    }

    #[test]
    fn role_beats_tag_fallback() {
        let mut snap = base("div");
        snap.role = Some("menuitem".into());
        snap.text = "Settings".into();
        assert_eq!(describe(&snap), "menuitem: Settings");
    }

    #[test]
    fn input_identity_uses_type() {
        let mut snap = base("input");
        snap.input_type = Some("search".into());
        assert_eq!(describe(&snap), "search input");
    }

    #[test]
    fn bare_input_defaults_to_text() {
        let snap = base("input");
        assert_eq!(describe(&snap), "text input");
    }

    #[test]
    fn select_is_input_like() {
        let snap = base("select");
        assert_eq!(describe(&snap), "select input");
    }

    #[test]
    fn anchor_and_button_fallbacks() {
        let mut link = base("a");
        link.text = "More information".into();
        assert_eq!(describe(&link), "link: More information");

        let mut button = base("button");
        button.text = "Subscribe".into();
        assert_eq!(describe(&button), "button: Subscribe");

        let span = base("span");
        assert_eq!(describe(&span), "span");
    }

    #[test]
    fn state_tokens_in_fixed_order() {
        let mut snap = base("button");
        snap.required = true;
        snap.disabled = true;
        snap.expanded = Some(true);
        snap.checked = Some(true);
        snap.text = "Menu".into();
        assert_eq!(describe(&snap), "button (required, disabled, expanded, checked): Menu");
    }

    #[test]
    fn negative_states_are_announced() {
        let mut snap = base("input");
        snap.input_type = Some("checkbox".into());
        snap.expanded = None;
        snap.checked = Some(false);
        assert_eq!(describe(&snap), "checkbox input (unchecked)");

        let mut collapsed = base("button");
        collapsed.expanded = Some(false);
        collapsed.text = "Sections".into();
        assert_eq!(describe(&collapsed), "button (collapsed): Sections");
    }

    #[test]
    fn value_takes_precedence_over_text() {
        let mut snap = base("input");
        snap.input_type = Some("text".into());
        snap.value = Some("hello".into());
        snap.text = "ignored".into();
        assert_eq!(describe(&snap), "text input: hello");
    }

    #[test]
    fn describedby_appended_after_period() {
        let mut snap = base("input");
        snap.input_type = Some("email".into());
        snap.aria_label = Some("Email address".into());
        snap.required = true;
        snap.described_by = Some("Enter your work email".into());
        assert_eq!(
            describe(&snap),
            "Email address (required). Enter your work email"
        );
    }

    #[test]
    fn text_is_trimmed() {
        let mut snap = base("a");
        snap.text = "  Home \n".into();
        assert_eq!(describe(&snap), "link: Home");
    }

    #[test]
    fn describe_is_idempotent() {
        let mut snap = base("button");
        snap.text = "Go".into();
        snap.required = true;
        assert_eq!(describe(&snap), describe(&snap));
        assert_eq!(descriptor(&snap), descriptor(&snap));
    }
}
