//! Response parser: turns loosely structured model text into an
//! [`ActionBatch`].
//!
//! Pipeline, first success wins:
//! 1. direct JSON parse of the whole text
//! 2. slice from the first `{` to the last `}` (or `[`/`]` for array forms),
//!    fix smart quotes, trailing commas and `"null"` strings, parse
//! 3. balance unterminated strings and brackets, parse
//! 4. give up with a [`ParseError`]; nothing is guessed

use crate::error::ParseError;
use crate::prompt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```[A-Za-z0-9_-]*").expect("code fence pattern is valid"));
static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",(\s*[}\]])").expect("trailing comma pattern is valid"));
static NULL_STRING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#":\s*"null""#).expect("null string pattern is valid"));
static TEMPLATE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*[\w.-]*\s*\}\}").expect("template token pattern is valid"));

/// Keys accepted for the final answer, in priority order.
const FINAL_ANSWER_KEYS: &[&str] = &["final_response", "final_answer", "answer"];
const REASONING_KEYS: &[&str] = &["reasoning", "thought", "thoughts"];

// ===== Types =====

/// One action as the model wrote it, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAction {
    /// Vendor action name (e.g. "click_at", "left_click")
    #[serde(rename = "action")]
    pub name: String,
    /// Arguments, always an object
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl RawAction {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name: name.into(),
            args,
        }
    }
}

/// Ordered actions for one iteration plus the completion signal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionBatch {
    pub actions: Vec<RawAction>,
    #[serde(default)]
    pub done: bool,
    #[serde(
        rename = "final_response",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub final_answer: Option<String>,
    /// Free-text reasoning some models attach
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

// ===== Parsing =====

/// Parse raw model text into an action batch.
pub fn parse(raw: &str) -> Result<ActionBatch, ParseError> {
    let trimmed = raw.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return batch_from_value(value);
    }

    let unfenced = CODE_FENCE.replace_all(trimmed, "");
    let Some(start) = unfenced.find(['{', '[']) else {
        return Err(ParseError::NoJson);
    };

    let mut last_error = String::new();
    let mut repairs = Vec::with_capacity(2);
    if let Some(candidate) = extract_json(&unfenced) {
        let cleaned = clean_json(candidate);
        match serde_json::from_str::<Value>(&cleaned) {
            Ok(value) => return batch_from_value(value),
            Err(e) => last_error = e.to_string(),
        }
        debug!("[parser] cleaned slice did not parse: {}", last_error);
        repairs.push(balance(&cleaned));
    }
    // Truncated output may have no closing bracket at all.
    repairs.push(balance(&clean_json(&unfenced[start..])));

    for attempt in repairs {
        match serde_json::from_str::<Value>(&attempt) {
            Ok(value) => return batch_from_value(value),
            Err(e) => last_error = e.to_string(),
        }
    }

    warn!("[parser] Model response is not valid JSON: {}", last_error);
    Err(ParseError::Malformed(last_error))
}

fn extract_json(text: &str) -> Option<&str> {
    let object = span(text, '{', '}');
    let array = span(text, '[', ']');
    let (start, end) = match (object, array) {
        (Some(o), Some(a)) => {
            if a.0 < o.0 {
                a
            } else {
                o
            }
        }
        (Some(o), None) => o,
        (None, Some(a)) => a,
        (None, None) => return None,
    };
    Some(&text[start..=end])
}

fn span(text: &str, open: char, close: char) -> Option<(usize, usize)> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then_some((start, end))
}

fn clean_json(text: &str) -> String {
    let quoted: String = text
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect();
    let no_commas = TRAILING_COMMA.replace_all(&quoted, "$1");
    NULL_STRING.replace_all(&no_commas, ": null").into_owned()
}

/// Close unterminated strings and brackets, drop stray closers.
fn balance(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '{' => {
                stack.push('}');
                out.push(ch);
            }
            '[' => {
                stack.push(']');
                out.push(ch);
            }
            '}' | ']' => {
                if stack.contains(&ch) {
                    while let Some(closer) = stack.pop() {
                        trim_dangling(&mut out);
                        out.push(closer);
                        if closer == ch {
                            break;
                        }
                    }
                }
            }
            _ => out.push(ch),
        }
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    while let Some(closer) = stack.pop() {
        trim_dangling(&mut out);
        out.push(closer);
    }
    out
}

fn trim_dangling(out: &mut String) {
    let len = out.trim_end().len();
    out.truncate(len);
    if out.ends_with(',') {
        out.pop();
    }
    if out.ends_with(':') {
        out.push_str(" null");
    }
}

fn batch_from_value(value: Value) -> Result<ActionBatch, ParseError> {
    match value {
        Value::Array(items) => Ok(ActionBatch {
            actions: collect_actions(items),
            ..Default::default()
        }),
        Value::Object(mut map) => {
            let mut batch = ActionBatch {
                done: map.get("done").map(truthy).unwrap_or(false),
                final_answer: FINAL_ANSWER_KEYS
                    .iter()
                    .find_map(|k| map.get(*k).and_then(answer_text)),
                reasoning: REASONING_KEYS
                    .iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_str).map(str::to_string)),
                ..Default::default()
            };

            match map.remove("actions") {
                Some(Value::Array(items)) => batch.actions = collect_actions(items),
                Some(Value::Null) | None => {
                    if ["action", "action_type", "name"]
                        .iter()
                        .any(|k| map.contains_key(*k))
                    {
                        for key in ["done"].iter().chain(FINAL_ANSWER_KEYS).chain(REASONING_KEYS) {
                            map.remove(*key);
                        }
                        batch.actions = collect_actions(vec![Value::Object(map)]);
                    } else if !batch.done && batch.final_answer.is_none() {
                        return Err(ParseError::Shape(
                            "expected an actions array, a single action, or done".to_string(),
                        ));
                    }
                }
                Some(other) => {
                    return Err(ParseError::Shape(format!(
                        "actions must be an array, got {}",
                        type_name(&other)
                    )))
                }
            }
            Ok(batch)
        }
        other => Err(ParseError::Shape(format!(
            "expected a JSON object or array, got {}",
            type_name(&other)
        ))),
    }
}

fn collect_actions(items: Vec<Value>) -> Vec<RawAction> {
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => {
                let action = raw_action(map);
                if action.is_none() {
                    warn!("[parser] Skipping action entry without a name");
                }
                action
            }
            other => {
                warn!("[parser] Skipping non-object action entry: {}", other);
                None
            }
        })
        .collect()
}

fn raw_action(mut map: Map<String, Value>) -> Option<RawAction> {
    // n1 style carries flat arguments next to action_type
    if let Some(Value::String(name)) = map.remove("action_type") {
        return Some(RawAction { name, args: map });
    }

    let name = match map.remove("action").or_else(|| map.remove("name")) {
        Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
        _ => return None,
    };
    let mut args = match map.remove("args").or_else(|| map.remove("arguments")) {
        Some(Value::Object(args)) => args,
        _ => Map::new(),
    };
    // tolerate arguments written next to the action name
    for (key, value) in map {
        args.entry(key).or_insert(value);
    }
    Some(RawAction { name, args })
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_i64() == Some(1),
        _ => false,
    }
}

fn answer_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ===== Final Answer =====

/// Why a declared final answer was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerRejection {
    Empty,
    Placeholder,
    InvalidJson(String),
    /// The answer is itself an action batch the model meant to execute
    ActionBatch,
    UrlUnverified,
    UrlMismatch { expected: String, found: String },
}

impl AnswerRejection {
    /// Corrective instruction sent back to the model.
    pub fn correction(&self) -> &'static str {
        match self {
            AnswerRejection::Empty | AnswerRejection::Placeholder => {
                prompt::EMPTY_OR_PLACEHOLDER_ANSWER
            }
            AnswerRejection::InvalidJson(_) => prompt::INVALID_JSON_ANSWER,
            AnswerRejection::ActionBatch => prompt::ACTIONS_AS_ANSWER,
            AnswerRejection::UrlUnverified => prompt::URL_WITHOUT_PAGE_INFO,
            AnswerRejection::UrlMismatch { .. } => prompt::URL_MISMATCH,
        }
    }
}

impl std::fmt::Display for AnswerRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnswerRejection::Empty => write!(f, "final answer is empty"),
            AnswerRejection::Placeholder => write!(f, "final answer contains a placeholder"),
            AnswerRejection::InvalidJson(e) => write!(f, "final answer is invalid JSON: {e}"),
            AnswerRejection::ActionBatch => write!(f, "final answer is an action batch"),
            AnswerRejection::UrlUnverified => {
                write!(f, "final answer contains a URL but no page URL was observed")
            }
            AnswerRejection::UrlMismatch { expected, found } => {
                write!(f, "final answer URL {found} does not match current page {expected}")
            }
        }
    }
}

/// True when text carries an unresolved template token such as `{{url}}`.
pub fn contains_placeholder(text: &str) -> bool {
    TEMPLATE_TOKEN.is_match(text) || text.to_lowercase().contains("placeholder")
}

/// True when text holds actions meant for execution: an object with a
/// non-empty `actions` array, a single `action`/`action_type` object, or an
/// array of those. A bare `name` key is not enough; answers use it too.
pub fn is_action_batch(text: &str) -> bool {
    let trimmed = text.trim();
    let value = serde_json::from_str::<Value>(trimmed).ok().or_else(|| {
        let unfenced = CODE_FENCE.replace_all(trimmed, "");
        extract_json(&unfenced).and_then(|slice| serde_json::from_str(&clean_json(slice)).ok())
    });
    match value {
        Some(Value::Object(map)) => match map.get("actions") {
            Some(Value::Array(items)) => items.iter().any(names_action),
            _ => map_names_action(&map),
        },
        Some(Value::Array(items)) => !items.is_empty() && items.iter().all(names_action),
        _ => false,
    }
}

fn names_action(value: &Value) -> bool {
    value.as_object().is_some_and(map_names_action)
}

fn map_names_action(map: &Map<String, Value>) -> bool {
    let named = |key: &str| map.get(key).is_some_and(Value::is_string);
    named("action") || named("action_type") || (named("name") && map.contains_key("args"))
}

/// Accept a final answer only when it is non-empty, concrete, and valid JSON
/// whenever it looks like JSON.
pub fn validate_final_answer(answer: Option<&str>) -> Result<&str, AnswerRejection> {
    let answer = answer.map(str::trim).unwrap_or_default();
    if answer.is_empty() {
        return Err(AnswerRejection::Empty);
    }
    if contains_placeholder(answer) {
        return Err(AnswerRejection::Placeholder);
    }
    if is_action_batch(answer) {
        return Err(AnswerRejection::ActionBatch);
    }
    if answer.starts_with('{') || answer.starts_with('[') {
        match serde_json::from_str::<Value>(answer) {
            Ok(Value::Object(_)) => {}
            Ok(Value::Array(_)) if answer.starts_with('[') => {}
            Ok(_) => {
                return Err(AnswerRejection::InvalidJson(
                    "expected a JSON object".to_string(),
                ))
            }
            Err(e) => return Err(AnswerRejection::InvalidJson(e.to_string())),
        }
    }
    Ok(answer)
}

/// String values of URL-named keys in a JSON object answer.
pub fn answer_urls(answer: &str) -> Vec<String> {
    match serde_json::from_str::<Value>(answer.trim()) {
        Ok(Value::Object(map)) => map
            .iter()
            .filter(|(key, _)| key.to_lowercase().contains("url"))
            .filter_map(|(_, value)| value.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// URLs reported in the answer must match the page the browser is on.
pub fn check_answer_urls(answer: &str, last_url: Option<&str>) -> Result<(), AnswerRejection> {
    let urls = answer_urls(answer);
    if urls.is_empty() {
        return Ok(());
    }
    let Some(expected) = last_url else {
        return Err(AnswerRejection::UrlUnverified);
    };
    match urls.into_iter().find(|url| url != expected) {
        Some(found) => Err(AnswerRejection::UrlMismatch {
            expected: expected.to_string(),
            found,
        }),
        None => Ok(()),
    }
}
