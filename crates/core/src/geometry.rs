//! Document canvas geometry and the document↔screen coordinate transform.
//!
//! Ink is authored in document space: a fixed width, a height that grows in
//! fixed increments, and no dependence on the current zoom. Every input
//! handler and renderer converts through [`DocTransform`] so zoom and
//! device-pixel-ratio arithmetic lives in exactly one place.

use serde::{Deserialize, Serialize};

/// Fixed document width, set once per notebook session.
pub const DEFAULT_DOC_WIDTH: f32 = 800.0;

/// Page height a fresh note starts with.
pub const INITIAL_PAGE_HEIGHT: f32 = 1100.0;

/// Amount the page grows by when content approaches the bottom edge.
pub const PAGE_GROWTH_INCREMENT: f32 = 400.0;

/// Distance from the bottom edge at which growth is triggered.
pub const PAGE_BOTTOM_MARGIN: f32 = 80.0;

pub const MIN_ZOOM: f32 = 0.25;
pub const MAX_ZOOM: f32 = 4.0;

/// A point in unscaled document coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DocPoint {
    pub x: f32,
    pub y: f32,
}

impl DocPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A point in screen (client) coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
}

impl ScreenPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Page dimensions, zoom and device pixel ratio for one notebook session.
#[derive(Debug, Clone, PartialEq)]
pub struct PageGeometry {
    doc_width: f32,
    page_height: f32,
    zoom: f32,
    dpr: f32,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self { doc_width: DEFAULT_DOC_WIDTH, page_height: INITIAL_PAGE_HEIGHT, zoom: 1.0, dpr: 1.0 }
    }
}

impl PageGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_doc_width(doc_width: f32) -> Self {
        Self { doc_width: doc_width.max(1.0), ..Self::default() }
    }

    pub fn doc_width(&self) -> f32 {
        self.doc_width
    }

    pub fn page_height(&self) -> f32 {
        self.page_height
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn dpr(&self) -> f32 {
        self.dpr
    }

    /// Pure display scale; stored coordinates are unaffected.
    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    }

    pub fn set_dpr(&mut self, dpr: f32) {
        self.dpr = dpr.max(0.5);
    }

    /// Scale between document units and backing-store pixels.
    pub fn backing_scale(&self) -> f32 {
        self.zoom * self.dpr
    }

    /// Grow the page when `y` comes within the bottom margin. Existing
    /// content is anchored to absolute document coordinates, so growth only
    /// extends drawable area downward. Returns whether the page grew.
    pub fn ensure_room_for(&mut self, y: f32) -> bool {
        let mut grew = false;
        while y > self.page_height - PAGE_BOTTOM_MARGIN {
            self.page_height += PAGE_GROWTH_INCREMENT;
            grew = true;
        }
        grew
    }

    /// Expand (never shrink) the page to at least `height`, in growth
    /// increments. Used when a loaded snapshot implies a taller page.
    pub fn expand_to(&mut self, height: f32) -> bool {
        let mut grew = false;
        while self.page_height < height {
            self.page_height += PAGE_GROWTH_INCREMENT;
            grew = true;
        }
        grew
    }

    /// Recompute the page height for a content extent: at least the initial
    /// height, extended in growth increments until `content_bottom` clears
    /// the bottom margin. Unlike [`Self::ensure_room_for`] this may shrink
    /// the page when content got shorter.
    pub fn fit_to(&mut self, content_bottom: f32) {
        let mut height = INITIAL_PAGE_HEIGHT;
        while content_bottom > height - PAGE_BOTTOM_MARGIN {
            height += PAGE_GROWTH_INCREMENT;
        }
        self.page_height = height;
    }

    /// Reset the page height for a freshly loaded note.
    pub fn reset_page_height(&mut self) {
        self.page_height = INITIAL_PAGE_HEIGHT;
    }

    /// Transform for the current zoom, given the screen position of the
    /// document origin (i.e. the page's top-left corner after scrolling).
    pub fn transform(&self, origin: ScreenPoint) -> DocTransform {
        DocTransform { zoom: self.zoom, origin }
    }
}

/// Document-space ↔ screen-space conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocTransform {
    pub zoom: f32,
    pub origin: ScreenPoint,
}

impl DocTransform {
    pub fn identity() -> Self {
        Self { zoom: 1.0, origin: ScreenPoint::new(0.0, 0.0) }
    }

    pub fn to_doc(&self, p: ScreenPoint) -> DocPoint {
        DocPoint::new((p.x - self.origin.x) / self.zoom, (p.y - self.origin.y) / self.zoom)
    }

    pub fn to_screen(&self, p: DocPoint) -> ScreenPoint {
        ScreenPoint::new(p.x * self.zoom + self.origin.x, p.y * self.zoom + self.origin.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_round_trips() {
        let transform = DocTransform { zoom: 1.75, origin: ScreenPoint::new(40.0, 12.0) };
        let doc = DocPoint::new(123.0, 456.0);
        let screen = transform.to_screen(doc);
        let back = transform.to_doc(screen);
        assert!((back.x - doc.x).abs() < 1e-3);
        assert!((back.y - doc.y).abs() < 1e-3);
    }

    #[test]
    fn doc_coordinates_are_zoom_invariant() {
        // The same document-space gesture produces identical coordinates at
        // any zoom level.
        let targets = [DocPoint::new(10.0, 10.0), DocPoint::new(50.0, 10.0)];
        let mut recorded = Vec::new();
        for zoom in [0.5_f32, 1.0, 2.0, 4.0] {
            let transform = DocTransform { zoom, origin: ScreenPoint::new(0.0, 0.0) };
            let points: Vec<DocPoint> = targets
                .iter()
                .map(|d| transform.to_doc(transform.to_screen(*d)))
                .collect();
            recorded.push(points);
        }
        for points in &recorded[1..] {
            for (a, b) in points.iter().zip(&recorded[0]) {
                assert!((a.x - b.x).abs() < 1e-3);
                assert!((a.y - b.y).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn page_grows_by_exactly_one_increment() {
        let mut geometry = PageGeometry::new();
        let start = geometry.page_height();
        let grew = geometry.ensure_room_for(start - PAGE_BOTTOM_MARGIN + 1.0);
        assert!(grew);
        assert_eq!(geometry.page_height(), start + PAGE_GROWTH_INCREMENT);
    }

    #[test]
    fn page_does_not_grow_above_margin() {
        let mut geometry = PageGeometry::new();
        let start = geometry.page_height();
        assert!(!geometry.ensure_room_for(start - PAGE_BOTTOM_MARGIN - 1.0));
        assert_eq!(geometry.page_height(), start);
    }

    #[test]
    fn fit_to_grows_and_shrinks_in_increments() {
        let mut geometry = PageGeometry::new();
        geometry.fit_to(INITIAL_PAGE_HEIGHT + 200.0);
        assert!(geometry.page_height() > INITIAL_PAGE_HEIGHT);
        geometry.fit_to(100.0);
        assert_eq!(geometry.page_height(), INITIAL_PAGE_HEIGHT);
    }

    #[test]
    fn expand_to_rounds_up_in_increments() {
        let mut geometry = PageGeometry::new();
        let start = geometry.page_height();
        geometry.expand_to(start + 1.0);
        assert_eq!(geometry.page_height(), start + PAGE_GROWTH_INCREMENT);
        assert!(!geometry.expand_to(start));
    }

    #[test]
    fn zoom_is_clamped() {
        let mut geometry = PageGeometry::new();
        geometry.set_zoom(10.0);
        assert_eq!(geometry.zoom(), MAX_ZOOM);
        geometry.set_zoom(0.01);
        assert_eq!(geometry.zoom(), MIN_ZOOM);
    }
}
