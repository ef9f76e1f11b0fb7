use crate::spacial::{Position, Vector};

/// Whether painted geometry adds to the image or removes from it.
///
/// Vector backends can implement `Erase` with clipping or even-odd subtraction, raster backends with a blend mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DrawMode {
    #[default]
    Draw,
    Erase,
}

impl DrawMode {
    pub fn inverted(self) -> Self {
        match self {
            DrawMode::Draw => DrawMode::Erase,
            DrawMode::Erase => DrawMode::Draw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
    #[default]
    Butt,
    Round,
    Square,
}

/// The drawing surface the renderer and the macro interpreter paint onto.
///
/// Path semantics follow the usual 2D graphics model:
/// * `move_to` starts a new subpath, `arc` continues the current subpath with a straight segment when one is open.
/// * `fill` and `stroke` consume the current path.
/// * `fill` uses the even-odd rule, so holes are expressed as extra subpaths.
/// * transforms apply to coordinates given after the transform call, `save`/`restore` nest.
pub trait Canvas {
    fn move_to(&mut self, position: Position);
    fn line_to(&mut self, position: Position);
    fn close_path(&mut self);

    /// Elliptical arc, angles in radians. The sweep is `end_angle - start_angle` and keeps its sign.
    fn arc(&mut self, center: Position, radii: Vector, start_angle: f64, end_angle: f64);

    /// Closed axis-aligned rectangle subpath with `corner` as its minimum corner.
    fn rectangle(&mut self, corner: Position, width: f64, height: f64);

    fn set_line_width(&mut self, width: f64);
    fn set_line_cap(&mut self, cap: LineCap);
    fn set_draw_mode(&mut self, mode: DrawMode);

    /// Counterclockwise, in radians.
    fn rotate(&mut self, radians: f64);
    fn scale(&mut self, sx: f64, sy: f64);
    fn translate(&mut self, dx: f64, dy: f64);

    fn save(&mut self);
    fn restore(&mut self);

    fn fill(&mut self);
    fn stroke(&mut self);

    /// Full circle as a new subpath.
    fn circle(&mut self, center: Position, diameter: f64) {
        let radius = diameter / 2.0;
        self.move_to(Position::new(center.x + radius, center.y));
        self.arc(center, Vector::new(radius, radius), 0.0, 2.0 * std::f64::consts::PI);
    }
}
