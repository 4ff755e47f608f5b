//! Coordinate mapping between model-declared spaces and viewport pixels.
//!
//! Models speak in different coordinate conventions: raw pixels, the unit
//! interval, or a fixed scale such as 0-999 / 0-1000. Everything past the
//! normalizer works in pixels of the live [`CoordinateSpace`].
//!
//! When a model does not declare its space, [`classify`] applies a fallback
//! heuristic: values in `[0, 1]` are unit-interval, values in `[0, N]` are on
//! the model's fixed scale, anything larger is a pixel. This is a fallback, not
//! a guarantee; a pixel value of `1` on a 1000px axis is read as the unit
//! interval and lands on the far edge.

use crate::error::CoordinateError;
use serde::{Deserialize, Serialize};

/// Default viewport used until the first screenshot reports its size.
pub const DEFAULT_WIDTH: u32 = 1024;
pub const DEFAULT_HEIGHT: u32 = 768;

/// A pixel position inside the live viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// The coordinate convention a raw model value is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceSpace {
    /// Device pixels
    Pixel,
    /// 0.0 - 1.0
    UnitInterval,
    /// 0 - N, N declared by the model
    FixedScale(u32),
    /// Not declared; resolved per value with [`classify`]
    Ambiguous { declared_scale: u32 },
}

/// Live viewport dimensions. Both extents are always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateSpace {
    width: u32,
    height: u32,
}

impl Default for CoordinateSpace {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

impl CoordinateSpace {
    pub fn new(width: u32, height: u32) -> Result<Self, CoordinateError> {
        check_extent(width)?;
        check_extent(height)?;
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Apply newly discovered viewport dimensions (e.g. from a screenshot).
    /// Leaves the space untouched when either extent is zero.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), CoordinateError> {
        *self = Self::new(width, height)?;
        Ok(())
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x < self.width && point.y < self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.width / 2, self.height / 2)
    }

    /// Map a raw `(x, y)` pair to a pixel point.
    ///
    /// Ambiguous input is classified jointly: both values must agree on a
    /// space, otherwise the larger interpretation wins.
    pub fn to_pixel_point(
        &self,
        x: f64,
        y: f64,
        source: SourceSpace,
    ) -> Result<Point, CoordinateError> {
        let source = match source {
            SourceSpace::Ambiguous { declared_scale } => classify_point(x, y, declared_scale),
            other => other,
        };
        Ok(Point::new(
            to_pixel(x, self.width, source)?,
            to_pixel(y, self.height, source)?,
        ))
    }

    /// Express a pixel point on the model's fixed scale.
    pub fn to_normalized_point(&self, point: Point, scale: u32) -> Result<(u32, u32), CoordinateError> {
        Ok((
            to_normalized(point.x, self.width, scale)?,
            to_normalized(point.y, self.height, scale)?,
        ))
    }
}

fn check_extent(extent: u32) -> Result<(), CoordinateError> {
    if extent == 0 {
        return Err(CoordinateError::EmptyAxis(extent));
    }
    Ok(())
}

/// Resolve the space of a single undeclared value.
pub fn classify(value: f64, declared_scale: u32) -> SourceSpace {
    if (0.0..=1.0).contains(&value) {
        SourceSpace::UnitInterval
    } else if value >= 0.0 && value <= f64::from(declared_scale) {
        SourceSpace::FixedScale(declared_scale)
    } else {
        SourceSpace::Pixel
    }
}

/// Resolve the space of an undeclared point. A point is only unit-interval
/// when both components are, and only on the fixed scale when both fit it.
pub fn classify_point(x: f64, y: f64, declared_scale: u32) -> SourceSpace {
    match (classify(x, declared_scale), classify(y, declared_scale)) {
        (SourceSpace::UnitInterval, SourceSpace::UnitInterval) => SourceSpace::UnitInterval,
        (SourceSpace::Pixel, _) | (_, SourceSpace::Pixel) => SourceSpace::Pixel,
        _ => SourceSpace::FixedScale(declared_scale),
    }
}

/// Convert one coordinate to a pixel on an axis of `extent` pixels.
///
/// Scaled values are rounded to the nearest pixel; the top of the scale
/// (1.0, or N) maps to the last pixel rather than one past it.
pub fn to_pixel(value: f64, extent: u32, source: SourceSpace) -> Result<u32, CoordinateError> {
    check_extent(extent)?;
    if !value.is_finite() {
        return Err(CoordinateError::NotFinite(value));
    }
    if value < 0.0 {
        return Err(CoordinateError::OutOfBounds {
            value,
            pixel: value.floor() as i64,
            extent,
        });
    }

    let source = match source {
        SourceSpace::Ambiguous { declared_scale } => classify(value, declared_scale),
        other => other,
    };

    let raw = match source {
        SourceSpace::Pixel => value.round(),
        SourceSpace::UnitInterval => scaled(value, 1, extent)?,
        SourceSpace::FixedScale(scale) | SourceSpace::Ambiguous { declared_scale: scale } => {
            if scale == 0 {
                return Err(CoordinateError::EmptyAxis(scale));
            }
            scaled(value, scale, extent)?
        }
    };

    let pixel = raw as i64;
    if pixel < 0 || pixel >= i64::from(extent) {
        return Err(CoordinateError::OutOfBounds {
            value,
            pixel,
            extent,
        });
    }
    Ok(pixel as u32)
}

fn scaled(value: f64, scale: u32, extent: u32) -> Result<f64, CoordinateError> {
    let scale_f = f64::from(scale);
    if value > scale_f {
        return Err(CoordinateError::OutsideScale { value, scale });
    }
    let raw = (value / scale_f * f64::from(extent)).round();
    // top of scale lands on the last pixel
    Ok(raw.min(f64::from(extent - 1)))
}

/// Convert a pixel on an axis of `extent` pixels to the 0-`scale` range.
pub fn to_normalized(pixel: u32, extent: u32, scale: u32) -> Result<u32, CoordinateError> {
    check_extent(extent)?;
    if pixel >= extent {
        return Err(CoordinateError::OutOfBounds {
            value: f64::from(pixel),
            pixel: i64::from(pixel),
            extent,
        });
    }
    let n = (f64::from(pixel) / f64::from(extent) * f64::from(scale)).round() as u32;
    Ok(n.min(scale))
}
