use std::sync::Arc;

use crate::canvas::{Canvas, DrawMode, LineCap};
use crate::image::{Aperture, Image};
use crate::program::{Instruction, MacroProgram};
use crate::spacial::{Position, Vector};

/// One recorded [`Canvas`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasOp {
    MoveTo(Position),
    LineTo(Position),
    ClosePath,
    Arc {
        center: Position,
        radii: Vector,
        start_angle: f64,
        end_angle: f64,
    },
    Rectangle {
        corner: Position,
        width: f64,
        height: f64,
    },
    SetLineWidth(f64),
    SetLineCap(LineCap),
    SetDrawMode(DrawMode),
    Rotate(f64),
    Scale(f64, f64),
    Translate(f64, f64),
    Save,
    Restore,
    Fill,
    Stroke,
}

/// Canvas that only records the calls made to it, for headless tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingCanvas {
    pub ops: Vec<CanvasOp>,
}

impl RecordingCanvas {
    pub fn count(&self, predicate: impl Fn(&CanvasOp) -> bool) -> usize {
        self.ops
            .iter()
            .filter(|op| predicate(op))
            .count()
    }

    /// Center and radii of every recorded arc.
    pub fn arcs(&self) -> Vec<(Position, Vector)> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                CanvasOp::Arc {
                    center,
                    radii,
                    ..
                } => Some((*center, *radii)),
                _ => None,
            })
            .collect()
    }

    /// The recorded calls without state changes, i.e. the path building and painting calls only.
    pub fn geometry(&self) -> Vec<CanvasOp> {
        self.ops
            .iter()
            .filter(|op| {
                !matches!(
                    op,
                    CanvasOp::Save | CanvasOp::Restore | CanvasOp::SetLineCap(_) | CanvasOp::SetDrawMode(_)
                )
            })
            .cloned()
            .collect()
    }
}

impl Canvas for RecordingCanvas {
    fn move_to(&mut self, position: Position) {
        self.ops.push(CanvasOp::MoveTo(position));
    }

    fn line_to(&mut self, position: Position) {
        self.ops.push(CanvasOp::LineTo(position));
    }

    fn close_path(&mut self) {
        self.ops.push(CanvasOp::ClosePath);
    }

    fn arc(&mut self, center: Position, radii: Vector, start_angle: f64, end_angle: f64) {
        self.ops.push(CanvasOp::Arc {
            center,
            radii,
            start_angle,
            end_angle,
        });
    }

    fn rectangle(&mut self, corner: Position, width: f64, height: f64) {
        self.ops.push(CanvasOp::Rectangle {
            corner,
            width,
            height,
        });
    }

    fn set_line_width(&mut self, width: f64) {
        self.ops.push(CanvasOp::SetLineWidth(width));
    }

    fn set_line_cap(&mut self, cap: LineCap) {
        self.ops.push(CanvasOp::SetLineCap(cap));
    }

    fn set_draw_mode(&mut self, mode: DrawMode) {
        self.ops.push(CanvasOp::SetDrawMode(mode));
    }

    fn rotate(&mut self, radians: f64) {
        self.ops.push(CanvasOp::Rotate(radians));
    }

    fn scale(&mut self, sx: f64, sy: f64) {
        self.ops.push(CanvasOp::Scale(sx, sy));
    }

    fn translate(&mut self, dx: f64, dy: f64) {
        self.ops.push(CanvasOp::Translate(dx, dy));
    }

    fn save(&mut self) {
        self.ops.push(CanvasOp::Save);
    }

    fn restore(&mut self) {
        self.ops.push(CanvasOp::Restore);
    }

    fn fill(&mut self) {
        self.ops.push(CanvasOp::Fill);
    }

    fn stroke(&mut self) {
        self.ops.push(CanvasOp::Stroke);
    }
}

/// Macro drawing a single circle with `$1` as diameter and `$2`,`$3` as center.
pub fn circle_macro() -> Arc<MacroProgram> {
    Arc::new(MacroProgram::new("CIRCLE", vec![
        Instruction::PushValue(1.0),
        Instruction::PushParameter(1),
        Instruction::PushParameter(2),
        Instruction::PushParameter(3),
        Instruction::Primitive(1),
    ]))
}

/// An image with the given apertures and no nets.
pub fn image_with_apertures(apertures: impl IntoIterator<Item = (u32, Aperture)>) -> Image {
    let mut image = Image::new();
    for (index, aperture) in apertures {
        image
            .set_aperture(index, aperture)
            .expect("aperture index in range");
    }
    image
}
