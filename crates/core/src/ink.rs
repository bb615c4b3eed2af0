//! Freehand ink: strokes and the layer that captures them.
//!
//! A stroke is one continuous pointer gesture recorded in unscaled document
//! coordinates. The layer owns the committed stroke list, the redo stack and
//! the in-progress stroke; rendering is a separate concern
//! (`quillpad-render`) so the capture logic stays testable without pixels.

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::geometry::DocPoint;

/// Highlighter strokes never go below this width.
pub const HIGHLIGHTER_MIN_WIDTH: f32 = 12.0;

/// Highlighter opacity cap; combined with multiply blending, overlapping
/// passes darken naturally instead of stacking to full opacity.
pub const HIGHLIGHTER_MAX_OPACITY: f32 = 0.4;

/// What kind of mark a stroke leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrokeKind {
    Pen,
    Highlighter,
}

/// The active canvas tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Select,
    Pen,
    Highlighter,
}

/// Pointer device class. A pen or touch contact draws even when the select
/// tool is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputDevice {
    Mouse,
    Pen,
    Touch,
}

/// One sampled pointer position in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrokePoint {
    pub x: f32,
    pub y: f32,
    pub pressure: f32,
}

impl StrokePoint {
    pub fn new(x: f32, y: f32, pressure: f32) -> Self {
        Self { x, y, pressure }
    }

    pub fn from_doc(p: DocPoint, pressure: f32) -> Self {
        Self { x: p.x, y: p.y, pressure }
    }
}

/// A single continuous ink gesture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub kind: StrokeKind,
    pub color: Color,
    pub width: f32,
    pub opacity: f32,
    pub points: Vec<StrokePoint>,
    /// Unix timestamp (seconds).
    pub created_at: i64,
}

impl Stroke {
    fn begin(kind: StrokeKind, color: Color, width: f32, opacity: f32, first: StrokePoint) -> Self {
        let created_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        Self { kind, color, width, opacity, points: vec![first], created_at }
    }

    /// Bounding box `(min_x, min_y, max_x, max_y)`, ignoring stroke width.
    pub fn bounds(&self) -> Option<(f32, f32, f32, f32)> {
        let first = self.points.first()?;
        let mut bounds = (first.x, first.y, first.x, first.y);
        for p in &self.points[1..] {
            bounds.0 = bounds.0.min(p.x);
            bounds.1 = bounds.1.min(p.y);
            bounds.2 = bounds.2.max(p.x);
            bounds.3 = bounds.3.max(p.y);
        }
        Some(bounds)
    }
}

/// The ink layer: committed strokes plus capture state.
#[derive(Debug, Default)]
pub struct InkLayer {
    strokes: Vec<Stroke>,
    redo: Vec<Stroke>,
    active: Option<Stroke>,
    /// Active stroke is ruler-constrained: a single straight segment.
    constrained: bool,
}

impl InkLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore strokes persisted with a note.
    pub fn load_strokes(&mut self, strokes: Vec<Stroke>) {
        self.strokes = strokes;
        self.redo.clear();
        self.active = None;
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    /// Committed strokes plus the in-progress one, for display.
    pub fn visible_strokes(&self) -> impl Iterator<Item = &Stroke> {
        self.strokes.iter().chain(self.active.iter())
    }

    pub fn is_drawing(&self) -> bool {
        self.active.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty() && self.active.is_none()
    }

    pub fn can_undo(&self) -> bool {
        !self.strokes.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Start a stroke. Only the pen and highlighter tools draw, except that
    /// a non-mouse device (pen/touch) draws regardless of the active tool.
    /// Returns whether a stroke was started.
    #[allow(clippy::too_many_arguments)]
    pub fn begin_stroke(
        &mut self,
        point: StrokePoint,
        tool: Tool,
        device: InputDevice,
        color: Color,
        width: f32,
        opacity: f32,
        constrained: bool,
    ) -> bool {
        let kind = match tool {
            Tool::Pen => StrokeKind::Pen,
            Tool::Highlighter => StrokeKind::Highlighter,
            Tool::Select if device != InputDevice::Mouse => StrokeKind::Pen,
            Tool::Select => return false,
        };
        let (width, opacity) = match kind {
            StrokeKind::Pen => (width, opacity),
            StrokeKind::Highlighter => {
                (width.max(HIGHLIGHTER_MIN_WIDTH), opacity.min(HIGHLIGHTER_MAX_OPACITY))
            }
        };
        self.active = Some(Stroke::begin(kind, color, width, opacity, point));
        self.constrained = constrained;
        true
    }

    /// Append a point to the in-progress stroke. A constrained stroke stays
    /// a single straight segment: the end point is replaced instead of
    /// accumulating the pointer path.
    pub fn extend_stroke(&mut self, point: StrokePoint) {
        let constrained = self.constrained;
        if let Some(stroke) = &mut self.active {
            if constrained && stroke.points.len() >= 2 {
                let last = stroke.points.len() - 1;
                stroke.points[last] = point;
            } else {
                stroke.points.push(point);
            }
        }
    }

    /// Commit the in-progress stroke. A new stroke invalidates redo history.
    /// Returns whether a stroke was committed.
    pub fn end_stroke(&mut self) -> bool {
        match self.active.take() {
            Some(stroke) => {
                self.strokes.push(stroke);
                self.redo.clear();
                self.constrained = false;
                true
            }
            None => false,
        }
    }

    /// Move the most recent stroke to the redo stack.
    pub fn undo(&mut self) -> bool {
        match self.strokes.pop() {
            Some(stroke) => {
                self.redo.push(stroke);
                true
            }
            None => false,
        }
    }

    /// Bring back the most recently undone stroke.
    pub fn redo(&mut self) -> bool {
        match self.redo.pop() {
            Some(stroke) => {
                self.strokes.push(stroke);
                true
            }
            None => false,
        }
    }

    /// Discard all strokes and redo history. A previously saved snapshot is
    /// unaffected until the next save overwrites it.
    pub fn clear(&mut self) {
        self.strokes.clear();
        self.redo.clear();
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn begin_pen(layer: &mut InkLayer, x: f32, y: f32) -> bool {
        layer.begin_stroke(
            StrokePoint::new(x, y, 1.0),
            Tool::Pen,
            InputDevice::Mouse,
            Color::BLACK,
            2.0,
            1.0,
            false,
        )
    }

    #[test]
    fn select_tool_with_mouse_does_not_draw() {
        let mut layer = InkLayer::new();
        let started = layer.begin_stroke(
            StrokePoint::new(0.0, 0.0, 1.0),
            Tool::Select,
            InputDevice::Mouse,
            Color::BLACK,
            2.0,
            1.0,
            false,
        );
        assert!(!started);
        assert!(!layer.is_drawing());
    }

    #[test]
    fn select_tool_with_pen_device_draws() {
        let mut layer = InkLayer::new();
        let started = layer.begin_stroke(
            StrokePoint::new(0.0, 0.0, 0.7),
            Tool::Select,
            InputDevice::Pen,
            Color::BLACK,
            2.0,
            1.0,
            false,
        );
        assert!(started);
        layer.end_stroke();
        assert_eq!(layer.strokes()[0].kind, StrokeKind::Pen);
    }

    #[test]
    fn highlighter_enforces_width_and_opacity_clamps() {
        let mut layer = InkLayer::new();
        layer.begin_stroke(
            StrokePoint::new(0.0, 0.0, 1.0),
            Tool::Highlighter,
            InputDevice::Mouse,
            Color::YELLOW,
            2.0,
            1.0,
            false,
        );
        layer.end_stroke();
        let stroke = &layer.strokes()[0];
        assert_eq!(stroke.width, HIGHLIGHTER_MIN_WIDTH);
        assert_eq!(stroke.opacity, HIGHLIGHTER_MAX_OPACITY);
    }

    #[test]
    fn undo_redo_restores_exact_stroke_list() {
        let mut layer = InkLayer::new();
        for i in 0..3 {
            begin_pen(&mut layer, i as f32, 0.0);
            layer.extend_stroke(StrokePoint::new(i as f32, 10.0, 1.0));
            layer.end_stroke();
        }
        let before = layer.strokes().to_vec();

        assert!(layer.undo());
        assert_eq!(layer.strokes().len(), 2);
        assert!(layer.redo());
        assert_eq!(layer.strokes(), &before[..]);
    }

    #[test]
    fn new_stroke_after_undo_discards_redo() {
        let mut layer = InkLayer::new();
        begin_pen(&mut layer, 0.0, 0.0);
        layer.end_stroke();
        begin_pen(&mut layer, 5.0, 5.0);
        layer.end_stroke();

        assert!(layer.undo());
        assert!(layer.can_redo());

        begin_pen(&mut layer, 9.0, 9.0);
        layer.end_stroke();
        assert!(!layer.can_redo());
        assert!(!layer.redo());
        assert_eq!(layer.strokes().len(), 2);
    }

    #[test]
    fn constrained_stroke_keeps_two_points() {
        let mut layer = InkLayer::new();
        layer.begin_stroke(
            StrokePoint::new(100.0, 100.0, 1.0),
            Tool::Pen,
            InputDevice::Mouse,
            Color::BLACK,
            2.0,
            1.0,
            true,
        );
        layer.extend_stroke(StrokePoint::new(150.0, 100.0, 1.0));
        layer.extend_stroke(StrokePoint::new(200.0, 100.0, 1.0));
        layer.extend_stroke(StrokePoint::new(300.0, 100.0, 1.0));
        layer.end_stroke();

        let stroke = &layer.strokes()[0];
        assert_eq!(stroke.points.len(), 2);
        assert_eq!(stroke.points[1].x, 300.0);
    }

    #[test]
    fn clear_discards_everything() {
        let mut layer = InkLayer::new();
        begin_pen(&mut layer, 0.0, 0.0);
        layer.end_stroke();
        layer.undo();
        layer.clear();
        assert!(layer.is_empty());
        assert!(!layer.can_redo());
    }

    #[test]
    fn strokes_serialize_round_trip() {
        let mut layer = InkLayer::new();
        begin_pen(&mut layer, 1.5, 2.5);
        layer.extend_stroke(StrokePoint::new(3.5, 4.5, 0.5));
        layer.end_stroke();

        let json = serde_json::to_string(layer.strokes()).unwrap();
        let parsed: Vec<Stroke> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, layer.strokes());
    }

    #[test]
    fn stroke_bounds() {
        let mut layer = InkLayer::new();
        begin_pen(&mut layer, 10.0, 20.0);
        layer.extend_stroke(StrokePoint::new(50.0, 5.0, 1.0));
        layer.end_stroke();
        assert_eq!(layer.strokes()[0].bounds(), Some((10.0, 5.0, 50.0, 20.0)));
    }
}
