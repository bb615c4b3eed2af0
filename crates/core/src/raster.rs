//! Bridge to the raster renderer.
//!
//! The session needs to flatten ink into a PNG snapshot at save time and to
//! read the dimensions of a loaded snapshot, but pixel work lives in
//! `quillpad-render`. This trait inverts the dependency so the session (and
//! its tests) stay free of imaging code.

use crate::geometry::PageGeometry;
use crate::ink::Stroke;

#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("rasterization failed: {0}")]
    Failed(String),
}

pub trait InkRasterizer {
    /// Flatten the persisted snapshot (if any) and the stroke list into a
    /// PNG at document resolution. Equivalent to a forced full redraw: the
    /// result always reflects the latest strokes.
    fn rasterize(
        &self,
        strokes: &[Stroke],
        snapshot_png: Option<&[u8]>,
        geometry: &PageGeometry,
    ) -> Result<Vec<u8>, RasterError>;

    /// Pixel dimensions of an encoded snapshot, if it decodes.
    fn png_size(&self, png: &[u8]) -> Option<(u32, u32)>;
}
