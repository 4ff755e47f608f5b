//! Optional vision sub-query service (query, point, caption) over the
//! current screenshot.

use crate::action::CaptionLength;
use crate::error::VisionError;
use crate::screenshot::Screenshot;
use async_trait::async_trait;

#[async_trait]
pub trait VisionService: Send + Sync {
    /// Free-form question about the image.
    async fn query(&self, image: &Screenshot, question: &str) -> Result<String, VisionError>;

    /// Locate an object. Returns its center in unit space (0.0-1.0 on both
    /// axes), or `None` when nothing matched.
    async fn point(
        &self,
        image: &Screenshot,
        object: &str,
    ) -> Result<Option<(f64, f64)>, VisionError>;

    async fn caption(
        &self,
        image: &Screenshot,
        length: CaptionLength,
    ) -> Result<String, VisionError>;
}
