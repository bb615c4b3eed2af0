//! The virtual straightedge.
//!
//! The ruler lives in screen coordinates (it is an overlay, not document
//! content) and is never persisted. While enabled it constrains in-progress
//! strokes to the line through its anchor at its current angle: pointer
//! positions are projected onto that line, then converted back to document
//! coordinates through the active transform.

use crate::geometry::{DocPoint, DocTransform, ScreenPoint};

/// Default ruler length in screen pixels.
pub const DEFAULT_RULER_LENGTH: f32 = 420.0;

/// Hit-test band around the ruler's line, in screen pixels.
pub const RULER_BODY_WIDTH: f32 = 56.0;

/// Radius of the rotate handle at the ruler's far end.
pub const ROTATE_HANDLE_RADIUS: f32 = 14.0;

/// Which part of the ruler a pointer landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulerPart {
    Body,
    RotateHandle,
}

/// Interaction state. Dragging and rotating are mutually exclusive and both
/// exit only on pointer-up.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Interaction {
    Idle,
    /// Anchor follows the pointer with a fixed grab offset.
    Dragging { grab_dx: f32, grab_dy: f32 },
    Rotating,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ruler {
    /// Anchor position in screen coordinates.
    pub x: f32,
    pub y: f32,
    pub length: f32,
    /// Angle in radians, measured from the positive x axis.
    pub angle: f32,
    interaction: Interaction,
}

impl Ruler {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, length: DEFAULT_RULER_LENGTH, angle: 0.0, interaction: Interaction::Idle }
    }

    pub fn direction(&self) -> (f32, f32) {
        (self.angle.cos(), self.angle.sin())
    }

    /// Screen position of the rotate handle at the ruler's far end.
    pub fn handle_position(&self) -> ScreenPoint {
        let (dx, dy) = self.direction();
        ScreenPoint::new(self.x + dx * self.length, self.y + dy * self.length)
    }

    pub fn is_interacting(&self) -> bool {
        self.interaction != Interaction::Idle
    }

    /// Which part of the ruler, if any, is under `p`.
    pub fn hit_test(&self, p: ScreenPoint) -> Option<RulerPart> {
        let handle = self.handle_position();
        let hdx = p.x - handle.x;
        let hdy = p.y - handle.y;
        if (hdx * hdx + hdy * hdy).sqrt() <= ROTATE_HANDLE_RADIUS {
            return Some(RulerPart::RotateHandle);
        }

        let (dx, dy) = self.direction();
        let vx = p.x - self.x;
        let vy = p.y - self.y;
        let along = vx * dx + vy * dy;
        let across = (vx * -dy + vy * dx).abs();
        if (0.0..=self.length).contains(&along) && across <= RULER_BODY_WIDTH / 2.0 {
            return Some(RulerPart::Body);
        }
        None
    }

    /// Pointer-down on the ruler. The rotate handle enters `rotating`, the
    /// body enters `dragging`; anywhere else is ignored. The two states are
    /// mutually exclusive: a second pointer-down while one is active does
    /// not switch modes.
    pub fn pointer_down(&mut self, p: ScreenPoint) -> Option<RulerPart> {
        if self.is_interacting() {
            return None;
        }
        let part = self.hit_test(p)?;
        self.interaction = match part {
            RulerPart::RotateHandle => Interaction::Rotating,
            RulerPart::Body => Interaction::Dragging { grab_dx: self.x - p.x, grab_dy: self.y - p.y },
        };
        Some(part)
    }

    pub fn pointer_move(&mut self, p: ScreenPoint) {
        match self.interaction {
            Interaction::Idle => {}
            Interaction::Dragging { grab_dx, grab_dy } => {
                self.x = p.x + grab_dx;
                self.y = p.y + grab_dy;
            }
            Interaction::Rotating => {
                self.angle = (p.y - self.y).atan2(p.x - self.x);
            }
        }
    }

    pub fn pointer_up(&mut self) {
        self.interaction = Interaction::Idle;
    }

    /// Project a raw screen point onto the ruler's line and convert the
    /// result to unscaled document coordinates.
    pub fn project(&self, p: ScreenPoint, transform: &DocTransform) -> DocPoint {
        let (dx, dy) = self.direction();
        let t = (p.x - self.x) * dx + (p.y - self.y) * dy;
        let projected = ScreenPoint::new(self.x + t * dx, self.y + t * dy);
        transform.to_doc(projected)
    }
}
