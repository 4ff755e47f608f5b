//! Canonical action model.
//!
//! Every vendor vocabulary is normalized into [`Action`]. Coordinates are
//! always viewport pixels by the time an `Action` exists.

use crate::coordinates::{CoordinateSpace, Point};
use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ===== Supporting Types =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    /// Signed (dx, dy) for a scroll of `magnitude` pixels in this direction.
    pub fn deltas(&self, magnitude: i32) -> (i32, i32) {
        match self {
            ScrollDirection::Up => (0, -magnitude),
            ScrollDirection::Down => (0, magnitude),
            ScrollDirection::Left => (-magnitude, 0),
            ScrollDirection::Right => (magnitude, 0),
        }
    }
}

/// Caption detail level for vision captions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptionLength {
    Short,
    #[default]
    Normal,
    Long,
}

impl CaptionLength {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "short" => Self::Short,
            "long" => Self::Long,
            _ => Self::Normal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaptionLength::Short => "short",
            CaptionLength::Normal => "normal",
            CaptionLength::Long => "long",
        }
    }
}

// ===== Action =====

/// A single normalized browser action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Navigate {
        url: String,
    },
    Click {
        at: Point,
        button: MouseButton,
        count: u8,
    },
    DoubleClick {
        at: Point,
    },
    TripleClick {
        at: Point,
    },
    Hover {
        at: Point,
    },
    /// Types into whatever has focus, or clicks `at` first when given.
    TypeText {
        at: Option<Point>,
        text: String,
        clear_first: bool,
        press_enter_after: bool,
    },
    /// Canonical (human convention) key names, pressed together
    KeyCombo {
        keys: Vec<String>,
    },
    ScrollAt {
        at: Point,
        delta_x: i32,
        delta_y: i32,
    },
    ScrollDocument {
        direction: ScrollDirection,
        magnitude: u32,
    },
    Drag {
        start: Point,
        end: Point,
    },
    Wait {
        duration_ms: u64,
    },
    GoBack,
    GoForward,
    /// Vision question about the current screenshot
    Query {
        question: String,
    },
    Stop {
        final_answer: Option<String>,
    },
    Fail {
        reason: String,
    },
    /// Capture only
    Screenshot,
    /// Vision "point" lookup; the result becomes the fallback target
    Locate {
        object: String,
    },
    Caption {
        length: CaptionLength,
    },
    /// Report the current page URL
    PageInfo,
}

/// Discriminant of [`Action`], used in logs and step records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Navigate,
    Click,
    DoubleClick,
    TripleClick,
    Hover,
    TypeText,
    KeyCombo,
    ScrollAt,
    ScrollDocument,
    Drag,
    Wait,
    GoBack,
    GoForward,
    Query,
    Stop,
    Fail,
    Screenshot,
    Locate,
    Caption,
    PageInfo,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Navigate => "navigate",
            ActionKind::Click => "click",
            ActionKind::DoubleClick => "double_click",
            ActionKind::TripleClick => "triple_click",
            ActionKind::Hover => "hover",
            ActionKind::TypeText => "type_text",
            ActionKind::KeyCombo => "key_combo",
            ActionKind::ScrollAt => "scroll_at",
            ActionKind::ScrollDocument => "scroll_document",
            ActionKind::Drag => "drag",
            ActionKind::Wait => "wait",
            ActionKind::GoBack => "go_back",
            ActionKind::GoForward => "go_forward",
            ActionKind::Query => "query",
            ActionKind::Stop => "stop",
            ActionKind::Fail => "fail",
            ActionKind::Screenshot => "screenshot",
            ActionKind::Locate => "locate",
            ActionKind::Caption => "caption",
            ActionKind::PageInfo => "page_info",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Navigate { .. } => ActionKind::Navigate,
            Action::Click { .. } => ActionKind::Click,
            Action::DoubleClick { .. } => ActionKind::DoubleClick,
            Action::TripleClick { .. } => ActionKind::TripleClick,
            Action::Hover { .. } => ActionKind::Hover,
            Action::TypeText { .. } => ActionKind::TypeText,
            Action::KeyCombo { .. } => ActionKind::KeyCombo,
            Action::ScrollAt { .. } => ActionKind::ScrollAt,
            Action::ScrollDocument { .. } => ActionKind::ScrollDocument,
            Action::Drag { .. } => ActionKind::Drag,
            Action::Wait { .. } => ActionKind::Wait,
            Action::GoBack => ActionKind::GoBack,
            Action::GoForward => ActionKind::GoForward,
            Action::Query { .. } => ActionKind::Query,
            Action::Stop { .. } => ActionKind::Stop,
            Action::Fail { .. } => ActionKind::Fail,
            Action::Screenshot => ActionKind::Screenshot,
            Action::Locate { .. } => ActionKind::Locate,
            Action::Caption { .. } => ActionKind::Caption,
            Action::PageInfo => ActionKind::PageInfo,
        }
    }

    /// Whether this action is sent to the remote browser. Local actions are
    /// handled by the loop and never reach the executor.
    pub fn is_remote(&self) -> bool {
        !matches!(
            self,
            Action::Wait { .. }
                | Action::Query { .. }
                | Action::Stop { .. }
                | Action::Fail { .. }
                | Action::Locate { .. }
                | Action::Caption { .. }
                | Action::PageInfo
        )
    }

    /// Pixel targets carried by this action.
    pub fn points(&self) -> Vec<Point> {
        match self {
            Action::Click { at, .. }
            | Action::DoubleClick { at }
            | Action::TripleClick { at }
            | Action::Hover { at }
            | Action::ScrollAt { at, .. } => vec![*at],
            Action::TypeText { at, .. } => at.iter().copied().collect(),
            Action::Drag { start, end } => vec![*start, *end],
            _ => Vec::new(),
        }
    }

    /// Where the pointer rests once this action has run.
    pub fn pointer_after(&self) -> Option<Point> {
        match self {
            Action::Drag { end, .. } => Some(*end),
            other => other.points().first().copied(),
        }
    }

    /// Check coordinates and required arguments against the live viewport.
    pub fn validate(&self, space: &CoordinateSpace) -> Result<(), ValidationError> {
        let kind = self.kind();
        for point in self.points() {
            if !space.contains(point) {
                return Err(ValidationError::new(
                    kind,
                    format!(
                        "target {} is outside the {}x{} viewport",
                        point,
                        space.width(),
                        space.height()
                    ),
                ));
            }
        }

        match self {
            Action::Navigate { url } if url.trim().is_empty() => {
                Err(ValidationError::new(kind, "url is required"))
            }
            Action::Click { count, .. } if *count == 0 => {
                Err(ValidationError::new(kind, "click count must be at least 1"))
            }
            Action::KeyCombo { keys } if keys.is_empty() => {
                Err(ValidationError::new(kind, "at least one key is required"))
            }
            Action::Query { question } if question.trim().is_empty() => {
                Err(ValidationError::new(kind, "question is required"))
            }
            Action::Locate { object } if object.trim().is_empty() => {
                Err(ValidationError::new(kind, "object description is required"))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_remote_split() {
        assert!(Action::Navigate { url: "https://a".into() }.is_remote());
        assert!(Action::Screenshot.is_remote());
        assert!(Action::GoBack.is_remote());
        assert!(!Action::Wait { duration_ms: 10 }.is_remote());
        assert!(!Action::Stop { final_answer: None }.is_remote());
        assert!(!Action::PageInfo.is_remote());
        assert_eq!(Action::PageInfo.kind().to_string(), "page_info");
    }

    #[test]
    fn test_validate_bounds() {
        let space = CoordinateSpace::new(100, 50).unwrap();
        let ok = Action::Click {
            at: Point::new(99, 49),
            button: MouseButton::Left,
            count: 1,
        };
        assert!(ok.validate(&space).is_ok());

        let out = Action::Drag {
            start: Point::new(10, 10),
            end: Point::new(10, 50),
        };
        let err = out.validate(&space).unwrap_err();
        assert_eq!(err.kind, ActionKind::Drag);
        assert!(err.message.contains("outside the 100x50 viewport"));
    }

    #[test]
    fn test_validate_required_arguments() {
        let space = CoordinateSpace::default();
        assert!(Action::KeyCombo { keys: vec![] }.validate(&space).is_err());
        assert!(Action::Navigate { url: " ".into() }.validate(&space).is_err());
        assert!(Action::Click {
            at: Point::new(1, 1),
            button: MouseButton::Right,
            count: 0
        }
        .validate(&space)
        .is_err());
        assert!(Action::TypeText {
            at: None,
            text: "hi".into(),
            clear_first: false,
            press_enter_after: false
        }
        .validate(&space)
        .is_ok());
    }

    #[test]
    fn test_scroll_direction_deltas() {
        assert_eq!(ScrollDirection::parse("Down"), Some(ScrollDirection::Down));
        assert_eq!(ScrollDirection::Up.deltas(500), (0, -500));
        assert_eq!(ScrollDirection::Left.deltas(120), (-120, 0));
        assert_eq!(ScrollDirection::parse("sideways"), None);
    }

    #[test]
    fn test_action_serializes_tagged() {
        let json = serde_json::to_value(Action::Wait { duration_ms: 1000 }).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "wait", "duration_ms": 1000}));
    }
}
