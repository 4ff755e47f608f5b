//! Action normalizer: maps each vendor's action vocabulary onto [`Action`].
//!
//! Coordinates are converted to viewport pixels here, and every action is
//! validated against the live [`CoordinateSpace`] before it leaves. Unknown
//! action names become [`Action::Fail`] rather than a silent no-op.

use crate::action::{Action, ActionKind, CaptionLength, MouseButton, ScrollDirection};
use crate::coordinates::{CoordinateSpace, Point, SourceSpace};
use crate::error::ValidationError;
use crate::keys::{normalize_combo, translate_key, KeyConvention};
use crate::parser::contains_placeholder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

type Args = Map<String, Value>;

/// Scale used by models that emit normalized coordinates.
pub const NORMALIZED_SCALE: u32 = 1000;
/// Default document scroll, in pixels.
pub const DEFAULT_DOCUMENT_SCROLL: u32 = 500;
/// Default `scroll_at` magnitude, in normalized units.
const DEFAULT_SCROLL_AT_MAGNITUDE: f64 = 800.0;
/// Pixels per Anthropic scroll wheel click.
const ANTHROPIC_SCROLL_UNIT: f64 = 120.0;
/// Pixels per n1 scroll amount unit.
const YUTORI_SCROLL_UNIT: f64 = 100.0;
const MAX_WAIT_SECONDS: f64 = 100.0;
/// Largest scroll distance accepted from a model, in pixels.
const MAX_SCROLL_PX: f64 = 100_000.0;

/// Model family whose action vocabulary is being normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vendor {
    /// Gemini computer-use function calls, 0-1000 coordinates
    Gemini,
    /// Text models answering with a JSON action batch (Moondream + Groq)
    #[default]
    JsonBatch,
    /// Anthropic computer tool, pixel coordinates
    Anthropic,
    /// OpenAI computer-use-preview, pixel coordinates
    OpenAi,
    /// Yutori n1, 0-1000 coordinates
    Yutori,
}

impl Vendor {
    pub fn source_space(&self) -> SourceSpace {
        match self {
            Vendor::Gemini | Vendor::Yutori => SourceSpace::FixedScale(NORMALIZED_SCALE),
            Vendor::JsonBatch => SourceSpace::Ambiguous {
                declared_scale: NORMALIZED_SCALE,
            },
            Vendor::Anthropic | Vendor::OpenAi => SourceSpace::Pixel,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::Gemini => "gemini",
            Vendor::JsonBatch => "json_batch",
            Vendor::Anthropic => "anthropic",
            Vendor::OpenAi => "openai",
            Vendor::Yutori => "yutori",
        }
    }
}

impl std::str::FromStr for Vendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(Vendor::Gemini),
            "json_batch" | "json" | "moondream" | "groq" => Ok(Vendor::JsonBatch),
            "anthropic" | "claude" => Ok(Vendor::Anthropic),
            "openai" | "open_ai" | "cua" => Ok(Vendor::OpenAi),
            "yutori" | "n1" => Ok(Vendor::Yutori),
            other => Err(format!("unknown vendor: {other}")),
        }
    }
}

/// Loop state the normalizer reads but never mutates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeContext {
    /// Live viewport
    pub space: CoordinateSpace,
    /// Where the last pointer action landed
    pub last_pointer: Option<Point>,
    /// Result of the last vision "point" lookup
    pub last_located: Option<Point>,
}

/// Converts vendor action names and arguments into validated actions.
#[derive(Debug, Clone)]
pub struct ActionNormalizer {
    vendor: Vendor,
    document_scroll_px: u32,
}

impl ActionNormalizer {
    pub fn new(vendor: Vendor) -> Self {
        Self {
            vendor,
            document_scroll_px: DEFAULT_DOCUMENT_SCROLL,
        }
    }

    /// Scroll distance used when `scroll_document` has no magnitude.
    pub fn with_document_scroll(mut self, px: u32) -> Self {
        self.document_scroll_px = px;
        self
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    /// Normalize one raw action. Argument errors are returned before any
    /// side effect; unknown names yield `Action::Fail`.
    pub fn normalize(
        &self,
        name: &str,
        args: &Args,
        ctx: &NormalizeContext,
    ) -> Result<Action, ValidationError> {
        let name = name.trim();
        let action = match self.vendor {
            Vendor::Gemini | Vendor::JsonBatch => self.normalize_gemini(name, args, ctx)?,
            Vendor::Anthropic => self.normalize_anthropic(name, args, ctx)?,
            Vendor::OpenAi => self.normalize_openai(name, args, ctx)?,
            Vendor::Yutori => self.normalize_yutori(name, args, ctx)?,
        };
        let action = action.unwrap_or_else(|| {
            debug!("[normalizer] Unknown {} action: {}", self.vendor.as_str(), name);
            Action::Fail {
                reason: format!("unknown action: {name}"),
            }
        });
        action.validate(&ctx.space)?;
        Ok(action)
    }

    // ===== Gemini and JSON batch =====

    fn normalize_gemini(
        &self,
        name: &str,
        args: &Args,
        ctx: &NormalizeContext,
    ) -> Result<Option<Action>, ValidationError> {
        let source = self.vendor.source_space();
        let batch = self.vendor == Vendor::JsonBatch;

        let action = match name {
            "open_web_browser" => Action::Screenshot,
            "click_at" => {
                let kind = ActionKind::Click;
                let at = if batch {
                    point_or_located(args, ctx, kind, source)?
                } else {
                    require_point(args, "x", "y", ctx, kind, source)?
                };
                let count = get_u64(args, "clicks").unwrap_or(1).clamp(1, 3) as u8;
                Action::Click {
                    at,
                    button: button_arg(args, kind)?.unwrap_or_default(),
                    count,
                }
            }
            "hover_at" => Action::Hover {
                at: require_point(args, "x", "y", ctx, ActionKind::Hover, source)?,
            },
            "type_text_at" => {
                let kind = ActionKind::TypeText;
                let at = if batch {
                    point_or_located(args, ctx, kind, source)?
                } else {
                    require_point(args, "x", "y", ctx, kind, source)?
                };
                Action::TypeText {
                    at: Some(at),
                    text: require_text(args, "text", kind)?,
                    clear_first: get_bool(args, "clear_before_typing").unwrap_or(true),
                    press_enter_after: get_bool(args, "press_enter").unwrap_or(false),
                }
            }
            "scroll_document" => {
                let kind = ActionKind::ScrollDocument;
                let magnitude = match get_f64(args, "magnitude").filter(|m| *m > 0.0) {
                    Some(m) => scroll_delta(kind, "magnitude", m, 1.0)?.unsigned_abs(),
                    None => self.document_scroll_px,
                };
                Action::ScrollDocument {
                    direction: direction_arg(args, "direction", kind)?
                        .unwrap_or(ScrollDirection::Down),
                    magnitude,
                }
            }
            "scroll_at" => {
                let kind = ActionKind::ScrollAt;
                let at = require_point(args, "x", "y", ctx, kind, source)?;
                let direction =
                    direction_arg(args, "direction", kind)?.unwrap_or(ScrollDirection::Down);
                let magnitude = get_f64(args, "magnitude").unwrap_or(DEFAULT_SCROLL_AT_MAGNITUDE);
                if magnitude < 0.0 {
                    return Err(ValidationError::new(kind, "magnitude must be non-negative"));
                }
                // magnitude is on the normalized scale of the scrolled axis
                let extent = match direction {
                    ScrollDirection::Up | ScrollDirection::Down => ctx.space.height(),
                    ScrollDirection::Left | ScrollDirection::Right => ctx.space.width(),
                };
                let px = scroll_delta(
                    kind,
                    "magnitude",
                    magnitude / f64::from(NORMALIZED_SCALE),
                    f64::from(extent),
                )?;
                let (delta_x, delta_y) = direction.deltas(px);
                Action::ScrollAt {
                    at,
                    delta_x,
                    delta_y,
                }
            }
            "wait_5_seconds" => Action::Wait { duration_ms: 5000 },
            "go_back" => Action::GoBack,
            "go_forward" => Action::GoForward,
            // focus the address bar
            "search" => Action::KeyCombo {
                keys: vec!["ctrl".to_string(), "l".to_string()],
            },
            "navigate" => Action::Navigate {
                url: normalize_url(args.get("url"))?,
            },
            "key_combination" => Action::KeyCombo {
                keys: keys_arg(args, "keys", ActionKind::KeyCombo)?,
            },
            "drag_and_drop" => {
                let kind = ActionKind::Drag;
                Action::Drag {
                    start: require_point(args, "x", "y", ctx, kind, source)?,
                    end: require_point(args, "destination_x", "destination_y", ctx, kind, source)?,
                }
            }
            _ if batch => match self.normalize_batch_extras(name, args)? {
                Some(action) => action,
                None => return Ok(None),
            },
            _ => return Ok(None),
        };
        Ok(Some(action))
    }

    fn normalize_batch_extras(
        &self,
        name: &str,
        args: &Args,
    ) -> Result<Option<Action>, ValidationError> {
        let action = match name {
            "wait" => {
                let seconds = get_f64(args, "seconds")
                    .or_else(|| get_f64(args, "ms").map(|ms| ms / 1000.0))
                    .unwrap_or(1.0);
                Action::Wait {
                    duration_ms: wait_ms(seconds, ActionKind::Wait)?,
                }
            }
            "moondream_query" => Action::Query {
                question: require_text(args, "question", ActionKind::Query)?,
            },
            "moondream_caption" => Action::Caption {
                length: get_str(args, "length")
                    .map(CaptionLength::parse)
                    .unwrap_or_default(),
            },
            "moondream_point" => Action::Locate {
                object: require_text(args, "object", ActionKind::Locate)?,
            },
            "page_info" => Action::PageInfo,
            "done" => Action::Stop {
                final_answer: ["final_response", "final_answer", "answer"]
                    .iter()
                    .find_map(|k| get_str(args, k))
                    .map(str::to_string),
            },
            "fail" => Action::Fail {
                reason: ["reason", "error", "message"]
                    .iter()
                    .find_map(|k| get_str(args, k))
                    .unwrap_or("model reported failure")
                    .to_string(),
            },
            _ => return Ok(None),
        };
        Ok(Some(action))
    }

    // ===== Anthropic =====

    fn normalize_anthropic(
        &self,
        name: &str,
        args: &Args,
        ctx: &NormalizeContext,
    ) -> Result<Option<Action>, ValidationError> {
        let source = self.vendor.source_space();

        let action = match name {
            "key" | "type" => {
                let kind = if name == "key" {
                    ActionKind::KeyCombo
                } else {
                    ActionKind::TypeText
                };
                if args.contains_key("coordinate") {
                    return Err(ValidationError::new(
                        kind,
                        format!("coordinate is not accepted for {name}"),
                    ));
                }
                let text = require_text(args, "text", kind)?;
                if name == "key" {
                    Action::KeyCombo {
                        keys: normalize_combo(&text),
                    }
                } else {
                    Action::TypeText {
                        at: None,
                        text,
                        clear_first: false,
                        press_enter_after: false,
                    }
                }
            }
            "mouse_move" => Action::Hover {
                at: pair_arg(args, "coordinate", ActionKind::Hover, ctx, source)?.ok_or_else(
                    || ValidationError::new(ActionKind::Hover, "coordinate is required"),
                )?,
            },
            "left_click" | "right_click" | "middle_click" | "double_click" | "triple_click" => {
                let kind = match name {
                    "double_click" => ActionKind::DoubleClick,
                    "triple_click" => ActionKind::TripleClick,
                    _ => ActionKind::Click,
                };
                let at = pair_arg(args, "coordinate", kind, ctx, source)?
                    .or(ctx.last_pointer)
                    .ok_or_else(|| {
                        ValidationError::new(kind, "coordinate is required before any pointer move")
                    })?;
                match name {
                    "double_click" => Action::DoubleClick { at },
                    "triple_click" => Action::TripleClick { at },
                    _ => Action::Click {
                        at,
                        button: match name {
                            "right_click" => MouseButton::Right,
                            "middle_click" => MouseButton::Middle,
                            _ => MouseButton::Left,
                        },
                        count: 1,
                    },
                }
            }
            "left_click_drag" => {
                let kind = ActionKind::Drag;
                let end = pair_arg(args, "coordinate", kind, ctx, source)?
                    .ok_or_else(|| ValidationError::new(kind, "coordinate is required"))?;
                let start = pair_arg(args, "start_coordinate", kind, ctx, source)?
                    .or(ctx.last_pointer)
                    .ok_or_else(|| ValidationError::new(kind, "start_coordinate is required"))?;
                Action::Drag { start, end }
            }
            "scroll" => {
                let kind = ActionKind::ScrollAt;
                let direction = direction_arg(args, "scroll_direction", kind)?.ok_or_else(|| {
                    ValidationError::new(kind, "scroll_direction must be up, down, left or right")
                })?;
                let amount = match args.get("scroll_amount") {
                    Some(v) => v
                        .as_i64()
                        .filter(|n| *n >= 0)
                        .ok_or_else(|| {
                            ValidationError::new(kind, "scroll_amount must be a non-negative int")
                        })?,
                    None => 3,
                };
                let at = pair_arg(args, "coordinate", kind, ctx, source)?
                    .or(ctx.last_pointer)
                    .unwrap_or_else(|| ctx.space.center());
                let px = scroll_delta(kind, "scroll_amount", amount as f64, ANTHROPIC_SCROLL_UNIT)?;
                let (delta_x, delta_y) = direction.deltas(px);
                Action::ScrollAt {
                    at,
                    delta_x,
                    delta_y,
                }
            }
            "wait" => {
                let seconds = get_f64(args, "duration").ok_or_else(|| {
                    ValidationError::new(ActionKind::Wait, "duration must be a number")
                })?;
                Action::Wait {
                    duration_ms: wait_ms(seconds, ActionKind::Wait)?,
                }
            }
            "screenshot" => Action::Screenshot,
            "cursor_position" => {
                return Err(ValidationError::new(
                    ActionKind::Screenshot,
                    "cursor position is not available from the remote browser",
                ))
            }
            _ => return Ok(None),
        };
        Ok(Some(action))
    }

    // ===== OpenAI computer-use-preview =====

    fn normalize_openai(
        &self,
        name: &str,
        args: &Args,
        ctx: &NormalizeContext,
    ) -> Result<Option<Action>, ValidationError> {
        let source = self.vendor.source_space();

        let action = match name {
            "click" => {
                let kind = ActionKind::Click;
                match get_str(args, "button").unwrap_or("left") {
                    "back" => Action::GoBack,
                    "forward" => Action::GoForward,
                    "wheel" => Action::ScrollAt {
                        at: require_point(args, "x", "y", ctx, ActionKind::ScrollAt, source)?,
                        delta_x: 0,
                        delta_y: 0,
                    },
                    _ => Action::Click {
                        at: require_point(args, "x", "y", ctx, kind, source)?,
                        button: button_arg(args, kind)?.unwrap_or_default(),
                        count: 1,
                    },
                }
            }
            "double_click" => Action::DoubleClick {
                at: require_point(args, "x", "y", ctx, ActionKind::DoubleClick, source)?,
            },
            "type" => Action::TypeText {
                at: None,
                text: require_text(args, "text", ActionKind::TypeText)?,
                clear_first: false,
                press_enter_after: false,
            },
            "keypress" => Action::KeyCombo {
                keys: keys_arg(args, "keys", ActionKind::KeyCombo)?,
            },
            "scroll" => {
                let kind = ActionKind::ScrollAt;
                Action::ScrollAt {
                    at: require_point(args, "x", "y", ctx, kind, source)?,
                    delta_x: scroll_delta(
                        kind,
                        "scroll_x",
                        get_f64(args, "scroll_x").unwrap_or(0.0),
                        1.0,
                    )?,
                    delta_y: scroll_delta(
                        kind,
                        "scroll_y",
                        get_f64(args, "scroll_y").unwrap_or(0.0),
                        1.0,
                    )?,
                }
            }
            "move" => Action::Hover {
                at: require_point(args, "x", "y", ctx, ActionKind::Hover, source)?,
            },
            "drag" => {
                let kind = ActionKind::Drag;
                let path = match args.get("path") {
                    Some(Value::Array(points)) => points
                        .iter()
                        .map(|p| match p {
                            Value::Object(obj) => require_point(obj, "x", "y", ctx, kind, source),
                            other => pair_value(other, kind, ctx, source),
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    _ => Vec::new(),
                };
                match (path.first(), path.last()) {
                    (Some(start), Some(end)) if path.len() >= 2 => Action::Drag {
                        start: *start,
                        end: *end,
                    },
                    _ => {
                        return Err(ValidationError::new(
                            kind,
                            "path needs at least two points",
                        ))
                    }
                }
            }
            "wait" => Action::Wait {
                duration_ms: wait_ms(
                    get_f64(args, "ms").unwrap_or(1000.0) / 1000.0,
                    ActionKind::Wait,
                )?,
            },
            "screenshot" => Action::Screenshot,
            _ => return Ok(None),
        };
        Ok(Some(action))
    }

    // ===== Yutori n1 =====

    fn normalize_yutori(
        &self,
        name: &str,
        args: &Args,
        ctx: &NormalizeContext,
    ) -> Result<Option<Action>, ValidationError> {
        let source = self.vendor.source_space();
        // n1 falls back to the viewport center when coordinates are missing
        let center_or = |kind: ActionKind| -> Result<Point, ValidationError> {
            Ok(pair_arg(args, "center_coordinates", kind, ctx, source)?
                .unwrap_or_else(|| ctx.space.center()))
        };

        let action = match name {
            "click" => Action::Click {
                at: center_or(ActionKind::Click)?,
                button: MouseButton::Left,
                count: 1,
            },
            "hover" => Action::Hover {
                at: center_or(ActionKind::Hover)?,
            },
            "scroll" => {
                let kind = ActionKind::ScrollAt;
                let direction = direction_arg(args, "direction", kind)?.ok_or_else(|| {
                    ValidationError::new(kind, "direction must be up, down, left or right")
                })?;
                let amount = get_f64(args, "amount").unwrap_or(3.0);
                if amount < 0.0 {
                    return Err(ValidationError::new(kind, "amount must be non-negative"));
                }
                let px = scroll_delta(kind, "amount", amount, YUTORI_SCROLL_UNIT)?;
                let (delta_x, delta_y) = direction.deltas(px);
                Action::ScrollAt {
                    at: center_or(kind)?,
                    delta_x,
                    delta_y,
                }
            }
            "type" => Action::TypeText {
                at: None,
                text: require_text(args, "text", ActionKind::TypeText)?,
                clear_first: get_bool(args, "clear_before_typing").unwrap_or(false),
                press_enter_after: get_bool(args, "press_enter_after").unwrap_or(false),
            },
            "key_press" => Action::KeyCombo {
                keys: keys_arg(args, "key_comb", ActionKind::KeyCombo)?,
            },
            "drag" => {
                let kind = ActionKind::Drag;
                Action::Drag {
                    start: pair_arg(args, "start_coordinates", kind, ctx, source)?
                        .ok_or_else(|| ValidationError::new(kind, "start_coordinates is required"))?,
                    end: center_or(kind)?,
                }
            }
            "wait" => Action::Wait { duration_ms: 2000 },
            "refresh" => Action::KeyCombo {
                keys: vec![translate_key("F5", KeyConvention::Human)],
            },
            "go_back" => Action::GoBack,
            "goto_url" => Action::Navigate {
                url: normalize_url(args.get("url"))?,
            },
            "read_texts_and_links" => Action::PageInfo,
            "stop" => Action::Stop {
                final_answer: get_str(args, "answer").map(str::to_string),
            },
            _ => return Ok(None),
        };
        Ok(Some(action))
    }
}

// ===== Argument helpers =====

fn get_str<'a>(args: &'a Args, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn get_f64(args: &Args, key: &str) -> Option<f64> {
    match args.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `value * unit` rounded to whole pixels, rejected when it is not finite
/// or beyond [`MAX_SCROLL_PX`] in either direction.
fn scroll_delta(
    kind: ActionKind,
    key: &str,
    value: f64,
    unit: f64,
) -> Result<i32, ValidationError> {
    let px = (value * unit).round();
    if !px.is_finite() || px.abs() > MAX_SCROLL_PX {
        return Err(ValidationError::new(kind, format!("{key} is out of range")));
    }
    Ok(px as i32)
}

fn get_u64(args: &Args, key: &str) -> Option<u64> {
    get_f64(args, key).filter(|v| *v >= 0.0).map(|v| v as u64)
}

fn get_bool(args: &Args, key: &str) -> Option<bool> {
    match args.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn require_text(args: &Args, key: &str, kind: ActionKind) -> Result<String, ValidationError> {
    match args.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(ValidationError::new(kind, format!("{key} is required"))),
    }
}

fn coordinate_value(value: &Value, key: &str, kind: ActionKind) -> Result<f64, ValidationError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ValidationError::new(kind, format!("{key} must be a number"))),
        Value::String(s) if s.contains('{') || s.contains('}') => Err(ValidationError::new(
            kind,
            format!("{key} must be a number, not a placeholder"),
        )),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| ValidationError::new(kind, format!("{key} must be a number"))),
        _ => Err(ValidationError::new(kind, format!("{key} must be a number"))),
    }
}

/// Read an `(x, y)` pair from two keys. `None` when both are absent.
fn point_arg(
    args: &Args,
    x_key: &str,
    y_key: &str,
    ctx: &NormalizeContext,
    kind: ActionKind,
    source: SourceSpace,
) -> Result<Option<Point>, ValidationError> {
    match (args.get(x_key), args.get(y_key)) {
        (None, None) => Ok(None),
        (Some(x), Some(y)) => {
            let x = coordinate_value(x, x_key, kind)?;
            let y = coordinate_value(y, y_key, kind)?;
            ctx.space
                .to_pixel_point(x, y, source)
                .map(Some)
                .map_err(|e| ValidationError::coordinate(kind, e))
        }
        _ => Err(ValidationError::new(
            kind,
            format!("{x_key} and {y_key} are required"),
        )),
    }
}

fn require_point(
    args: &Args,
    x_key: &str,
    y_key: &str,
    ctx: &NormalizeContext,
    kind: ActionKind,
    source: SourceSpace,
) -> Result<Point, ValidationError> {
    point_arg(args, x_key, y_key, ctx, kind, source)?
        .ok_or_else(|| ValidationError::new(kind, format!("{x_key} and {y_key} are required")))
}

/// Coordinates, or the last located point when they are missing or unusable.
fn point_or_located(
    args: &Args,
    ctx: &NormalizeContext,
    kind: ActionKind,
    source: SourceSpace,
) -> Result<Point, ValidationError> {
    match require_point(args, "x", "y", ctx, kind, source) {
        Ok(point) => Ok(point),
        Err(err) => match ctx.last_located {
            Some(point) => {
                debug!("[normalizer] {}: {}; using last located point {}", kind, err.message, point);
                Ok(point)
            }
            None => Err(err),
        },
    }
}

/// Read a `[x, y]` array argument.
fn pair_arg(
    args: &Args,
    key: &str,
    kind: ActionKind,
    ctx: &NormalizeContext,
    source: SourceSpace,
) -> Result<Option<Point>, ValidationError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => pair_value(value, kind, ctx, source).map(Some),
    }
}

fn pair_value(
    value: &Value,
    kind: ActionKind,
    ctx: &NormalizeContext,
    source: SourceSpace,
) -> Result<Point, ValidationError> {
    match value.as_array().map(Vec::as_slice) {
        Some([x, y]) => {
            let x = coordinate_value(x, "x", kind)?;
            let y = coordinate_value(y, "y", kind)?;
            ctx.space
                .to_pixel_point(x, y, source)
                .map_err(|e| ValidationError::coordinate(kind, e))
        }
        _ => Err(ValidationError::new(
            kind,
            format!("invalid coordinates: {value}"),
        )),
    }
}

fn button_arg(args: &Args, kind: ActionKind) -> Result<Option<MouseButton>, ValidationError> {
    match args.get("button") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(Some(match n.as_u64() {
            Some(2) => MouseButton::Middle,
            Some(3) => MouseButton::Right,
            _ => MouseButton::Left,
        })),
        Some(Value::String(s)) => match s.to_lowercase().as_str() {
            "left" => Ok(Some(MouseButton::Left)),
            "right" => Ok(Some(MouseButton::Right)),
            "middle" => Ok(Some(MouseButton::Middle)),
            other => Err(ValidationError::new(
                kind,
                format!("unsupported mouse button: {other}"),
            )),
        },
        Some(other) => Err(ValidationError::new(
            kind,
            format!("unsupported mouse button: {other}"),
        )),
    }
}

fn direction_arg(
    args: &Args,
    key: &str,
    kind: ActionKind,
) -> Result<Option<ScrollDirection>, ValidationError> {
    match get_str(args, key) {
        None => Ok(None),
        Some(s) => ScrollDirection::parse(s).map(Some).ok_or_else(|| {
            ValidationError::new(kind, format!("invalid scroll direction: {s}"))
        }),
    }
}

/// Keys given either as a combination string or as a list of tokens.
fn keys_arg(args: &Args, key: &str, kind: ActionKind) -> Result<Vec<String>, ValidationError> {
    let keys = match args.get(key) {
        Some(Value::String(combo)) => normalize_combo(combo),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .flat_map(normalize_combo)
            .collect(),
        _ => Vec::new(),
    };
    if keys.is_empty() {
        return Err(ValidationError::new(kind, format!("{key} is required")));
    }
    Ok(keys)
}

fn wait_ms(seconds: f64, kind: ActionKind) -> Result<u64, ValidationError> {
    if !(0.0..=MAX_WAIT_SECONDS).contains(&seconds) {
        return Err(ValidationError::new(
            kind,
            format!("wait of {seconds}s must be between 0 and {MAX_WAIT_SECONDS}s"),
        ));
    }
    Ok((seconds * 1000.0).round() as u64)
}

/// Trim, reject placeholders, and default the scheme to https.
pub fn normalize_url(value: Option<&Value>) -> Result<String, ValidationError> {
    let kind = ActionKind::Navigate;
    let url = value.and_then(Value::as_str).map(str::trim).unwrap_or_default();
    if url.is_empty() {
        return Err(ValidationError::new(kind, "url is required"));
    }
    if contains_placeholder(url) {
        return Err(ValidationError::new(kind, "navigate url is placeholder"));
    }
    let has_scheme = url.contains("://")
        || ["about:", "data:", "chrome:", "file:"]
            .iter()
            .any(|p| url.starts_with(p));
    if has_scheme {
        Ok(url.to_string())
    } else {
        Ok(format!("https://{url}"))
    }
}
