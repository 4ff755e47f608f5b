//! Key name translation between the three naming conventions models and
//! backends use: human-readable ("ctrl+a", "enter"), X11 keysyms ("Return",
//! "BackSpace") and DOM key values ("Enter", "Backspace").
//!
//! Unrecognized tokens pass through unchanged so newer key names still reach
//! the backend.

use serde::{Deserialize, Serialize};

/// Keyboard naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyConvention {
    /// Lowercase human names: "ctrl", "enter", "pageup"
    Human,
    /// X11 keysyms as understood by xdotool
    #[default]
    X11,
    /// DOM `KeyboardEvent.key` values as understood by Playwright
    Dom,
}

struct KeyName {
    human: &'static str,
    x11: &'static str,
    dom: &'static str,
    aliases: &'static [&'static str],
}

const fn key(
    human: &'static str,
    x11: &'static str,
    dom: &'static str,
    aliases: &'static [&'static str],
) -> KeyName {
    KeyName {
        human,
        x11,
        dom,
        aliases,
    }
}

const KEY_TABLE: &[KeyName] = &[
    // Modifiers
    key("ctrl", "ctrl", "Control", &["control", "control_l", "ctrl_l"]),
    key("alt", "alt", "Alt", &["alt_l", "option"]),
    key("shift", "shift", "Shift", &["shift_l"]),
    key(
        "meta",
        "super",
        "Meta",
        &["super_l", "cmd", "command", "win", "windows"],
    ),
    // Editing and whitespace
    key("enter", "Return", "Enter", &["return"]),
    key("tab", "Tab", "Tab", &[]),
    key("escape", "Escape", "Escape", &["esc"]),
    key("backspace", "BackSpace", "Backspace", &["back"]),
    key("delete", "Delete", "Delete", &["del"]),
    key("insert", "Insert", "Insert", &["ins"]),
    key("space", "space", "Space", &[]),
    // Navigation
    key("up", "Up", "ArrowUp", &["arrowup"]),
    key("down", "Down", "ArrowDown", &["arrowdown"]),
    key("left", "Left", "ArrowLeft", &["arrowleft"]),
    key("right", "Right", "ArrowRight", &["arrowright"]),
    key("home", "Home", "Home", &[]),
    key("end", "End", "End", &[]),
    key("pageup", "Page_Up", "PageUp", &["page_up", "pgup", "prior"]),
    key(
        "pagedown",
        "Page_Down",
        "PageDown",
        &["page_down", "pgdn", "pgdown", "next"],
    ),
    // Locks and system
    key("capslock", "Caps_Lock", "CapsLock", &["caps_lock"]),
    key("numlock", "Num_Lock", "NumLock", &["num_lock"]),
    key("scrolllock", "Scroll_Lock", "ScrollLock", &["scroll_lock"]),
    key("printscreen", "Print", "PrintScreen", &["print", "prtsc"]),
    key("pause", "Pause", "Pause", &[]),
    // Symbols with names
    key("minus", "minus", "-", &[]),
    key("equal", "equal", "=", &["equals"]),
    key("plus", "plus", "+", &[]),
];

fn lookup(token: &str) -> Option<&'static KeyName> {
    let lower = token.to_lowercase();
    KEY_TABLE.iter().find(|k| {
        k.human == lower
            || k.x11.to_lowercase() == lower
            || k.dom.to_lowercase() == lower
            || k.aliases.contains(&lower.as_str())
    })
}

fn function_key(token: &str) -> Option<u8> {
    let lower = token.to_lowercase();
    let num = lower.strip_prefix('f')?.parse::<u8>().ok()?;
    (1..=24).contains(&num).then_some(num)
}

/// Translate one key token into the target convention.
pub fn translate_key(token: &str, to: KeyConvention) -> String {
    let trimmed = token.trim();
    if let Some(k) = lookup(trimmed) {
        return match to {
            KeyConvention::Human => k.human,
            KeyConvention::X11 => k.x11,
            KeyConvention::Dom => k.dom,
        }
        .to_string();
    }
    if let Some(num) = function_key(trimmed) {
        return match to {
            KeyConvention::Human => format!("f{num}"),
            KeyConvention::X11 | KeyConvention::Dom => format!("F{num}"),
        };
    }
    trimmed.to_string()
}

/// Split a combination like "ctrl+shift+t" into its tokens.
///
/// A literal plus key is accepted at the end ("ctrl++") or alone ("+").
pub fn parse_combo(combo: &str) -> Vec<String> {
    let trimmed = combo.trim();
    if trimmed == "+" {
        return vec!["+".to_string()];
    }
    let (body, trailing_plus) = match trimmed.strip_suffix("++") {
        Some(body) => (body, true),
        None => (trimmed, false),
    };
    let mut keys: Vec<String> = body
        .split('+')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if trailing_plus {
        keys.push("+".to_string());
    }
    keys
}

/// Parse a combination and canonicalize every token to the human convention.
pub fn normalize_combo(combo: &str) -> Vec<String> {
    parse_combo(combo)
        .iter()
        .map(|k| translate_key(k, KeyConvention::Human))
        .collect()
}

/// Render canonical key tokens for a backend in the given convention.
pub fn format_combo(keys: &[String], to: KeyConvention) -> String {
    keys.iter()
        .map(|k| translate_key(k, to))
        .collect::<Vec<_>>()
        .join("+")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_translate_simple() {
        assert_eq!(translate_key("enter", KeyConvention::X11), "Return");
        assert_eq!(translate_key("Return", KeyConvention::Dom), "Enter");
        assert_eq!(translate_key("Enter", KeyConvention::Human), "enter");
        assert_eq!(translate_key("BackSpace", KeyConvention::Dom), "Backspace");
        assert_eq!(translate_key("Backspace", KeyConvention::X11), "BackSpace");
        assert_eq!(translate_key("PageUp", KeyConvention::X11), "Page_Up");
        assert_eq!(translate_key("Page_Down", KeyConvention::Dom), "PageDown");
        assert_eq!(translate_key("ESC", KeyConvention::X11), "Escape");
    }

    #[test]
    fn test_translate_modifiers() {
        assert_eq!(translate_key("Control", KeyConvention::X11), "ctrl");
        assert_eq!(translate_key("ctrl", KeyConvention::Dom), "Control");
        assert_eq!(translate_key("cmd", KeyConvention::X11), "super");
        assert_eq!(translate_key("Super_L", KeyConvention::Dom), "Meta");
        assert_eq!(translate_key("Meta", KeyConvention::Human), "meta");
    }

    #[test]
    fn test_translate_function_keys() {
        assert_eq!(translate_key("f5", KeyConvention::X11), "F5");
        assert_eq!(translate_key("F12", KeyConvention::Human), "f12");
        assert_eq!(translate_key("F24", KeyConvention::Dom), "F24");
        // out of range passes through
        assert_eq!(translate_key("f25", KeyConvention::X11), "f25");
    }

    #[test]
    fn test_unknown_tokens_pass_through() {
        assert_eq!(translate_key("a", KeyConvention::X11), "a");
        assert_eq!(translate_key("XF86AudioPlay", KeyConvention::Dom), "XF86AudioPlay");
        assert_eq!(translate_key("  Z ", KeyConvention::Human), "Z");
    }

    #[test]
    fn test_symbol_keys_use_characters_in_dom() {
        assert_eq!(translate_key("minus", KeyConvention::Dom), "-");
        assert_eq!(translate_key("Equal", KeyConvention::Dom), "=");
        assert_eq!(translate_key("-", KeyConvention::X11), "minus");
        assert_eq!(translate_key("=", KeyConvention::X11), "equal");
        assert_eq!(
            format_combo(&normalize_combo("ctrl+minus"), KeyConvention::Dom),
            "Control+-"
        );
    }

    #[test]
    fn test_parse_combo() {
        assert_eq!(parse_combo("ctrl+shift+t"), vec!["ctrl", "shift", "t"]);
        assert_eq!(parse_combo(" Control + a "), vec!["Control", "a"]);
        assert_eq!(parse_combo("ctrl++"), vec!["ctrl", "+"]);
        assert_eq!(parse_combo("+"), vec!["+"]);
        assert!(parse_combo("").is_empty());
    }

    #[test]
    fn test_round_trip_through_conventions() {
        let keys = normalize_combo("Control+Shift+Page_Up");
        assert_eq!(keys, vec!["ctrl", "shift", "pageup"]);
        assert_eq!(format_combo(&keys, KeyConvention::X11), "ctrl+shift+Page_Up");
        assert_eq!(format_combo(&keys, KeyConvention::Dom), "Control+Shift+PageUp");
        assert_eq!(format_combo(&keys, KeyConvention::Human), "ctrl+shift+pageup");
    }
}
