use std::f64::consts::PI;

use log::{error, trace, warn};
use lyon::math::point;
use lyon::path::Path;
use lyon::tessellation::{
    BuffersBuilder, FillOptions, FillRule, FillTessellator, FillVertex, LineJoin, StrokeOptions, StrokeTessellator,
    StrokeVertex, VertexBuffers,
};
use nalgebra::{Matrix3, Vector3};

use crate::canvas::{Canvas, DrawMode, LineCap};
use crate::spacial::{Position, Vector};

/// Default number of straight segments used to approximate a full circle.
pub const DEFAULT_ARC_SEGMENTS: usize = 64;

/// Sweeps beyond this many full turns are flattened with proportionally fewer segments.
const MAX_ARC_TURNS: usize = 8;

#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub struct BoundingBox {
    pub min: Position,
    pub max: Position,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            min: Position::new(f64::MAX, f64::MAX),
            max: Position::new(f64::MIN, f64::MIN),
        }
    }
}

impl BoundingBox {
    /// Note that a bounding box of 0,0 -> 0,0 is NOT empty, only the one returned by `default` counts as empty.
    pub fn is_empty(&self) -> bool {
        self.eq(&BoundingBox::default())
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn expand(&mut self, other: &BoundingBox) {
        self.min.x = self.min.x.min(other.min.x);
        self.min.y = self.min.y.min(other.min.y);
        self.max.x = self.max.x.max(other.max.x);
        self.max.y = self.max.y.max(other.max.y);
    }

    pub fn from_points(points: &[Position]) -> Self {
        let mut bbox = Self::default();
        for position in points {
            bbox.min.x = bbox.min.x.min(position.x);
            bbox.min.y = bbox.min.y.min(position.y);
            bbox.max.x = bbox.max.x.max(position.x);
            bbox.max.y = bbox.max.y.max(position.y);
        }
        bbox
    }
}

/// Affine transform from canvas user space to device space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CanvasTransform {
    matrix: Matrix3<f64>,
}

impl Default for CanvasTransform {
    fn default() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }
}

impl CanvasTransform {
    pub fn rotate(&mut self, radians: f64) {
        let (sin_theta, cos_theta) = radians.sin_cos();
        #[rustfmt::skip]
        let rotation = Matrix3::new(
            cos_theta, -sin_theta, 0.0,
            sin_theta, cos_theta, 0.0,
            0.0, 0.0, 1.0,
        );
        self.matrix *= rotation;
    }

    pub fn scale(&mut self, sx: f64, sy: f64) {
        self.matrix *= Matrix3::new_nonuniform_scaling(&Vector::new(sx, sy));
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.matrix *= Matrix3::new_translation(&Vector::new(dx, dy));
    }

    pub fn apply_to_position(&self, position: Position) -> Position {
        let transformed = self.matrix * Vector3::new(position.x, position.y, 1.0);
        Position::new(transformed.x, transformed.y)
    }

    /// Factor applied to lengths such as line widths, the geometric mean of the axis scales.
    pub fn length_scale(&self) -> f64 {
        let determinant = self.matrix[(0, 0)] * self.matrix[(1, 1)] - self.matrix[(0, 1)] * self.matrix[(1, 0)];
        determinant.abs().sqrt()
    }
}

#[derive(Debug, Clone)]
pub struct PolygonMesh {
    pub vertices: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl PolygonMesh {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let points = self
            .vertices
            .iter()
            .map(|[x, y]| Position::new(*x as f64, *y as f64))
            .collect::<Vec<_>>();
        BoundingBox::from_points(&points)
    }

    pub fn triangles(&self) -> impl Iterator<Item = [[f32; 2]; 3]> + '_ {
        self.indices
            .chunks_exact(3)
            .map(|triangle| {
                [
                    self.vertices[triangle[0] as usize],
                    self.vertices[triangle[1] as usize],
                    self.vertices[triangle[2] as usize],
                ]
            })
    }
}

/// A tessellated fill or stroke together with the mode it was painted in.
#[derive(Debug, Clone)]
pub struct RenderedMesh {
    pub mode: DrawMode,
    pub mesh: PolygonMesh,
}

#[derive(Debug, Clone)]
struct SubPath {
    /// Device space.
    points: Vec<Position>,
    closed: bool,
}

#[derive(Debug, Clone, Copy)]
struct GraphicsState {
    transform: CanvasTransform,
    line_width: f64,
    line_cap: LineCap,
    draw_mode: DrawMode,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            transform: CanvasTransform::default(),
            line_width: 1.0,
            line_cap: LineCap::Butt,
            draw_mode: DrawMode::Draw,
        }
    }
}

/// Canvas backend that tessellates every fill and stroke into triangle meshes with lyon.
///
/// Paths are transformed into device space as they are built, arcs are flattened into line segments.
#[derive(Debug, Clone)]
pub struct MeshCanvas {
    state: GraphicsState,
    saved_states: Vec<GraphicsState>,
    subpaths: Vec<SubPath>,
    meshes: Vec<RenderedMesh>,
    arc_segments: usize,
}

impl Default for MeshCanvas {
    fn default() -> Self {
        Self::new(DEFAULT_ARC_SEGMENTS)
    }
}

impl MeshCanvas {
    pub fn new(arc_segments: usize) -> Self {
        Self {
            state: GraphicsState::default(),
            saved_states: Vec::new(),
            subpaths: Vec::new(),
            meshes: Vec::new(),
            arc_segments: arc_segments.max(4),
        }
    }

    pub fn meshes(&self) -> &[RenderedMesh] {
        &self.meshes
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = BoundingBox::default();
        for rendered in &self.meshes {
            bbox.expand(&rendered.mesh.bounding_box());
        }
        bbox
    }

    fn open_subpath(&mut self) -> Option<&mut SubPath> {
        self.subpaths
            .last_mut()
            .filter(|subpath| !subpath.closed)
    }

    fn push_device_point(&mut self, position: Position) {
        match self.open_subpath() {
            Some(subpath) => {
                if subpath.points.last() != Some(&position) {
                    subpath.points.push(position);
                }
            }
            None => self.subpaths.push(SubPath {
                points: vec![position],
                closed: false,
            }),
        }
    }

    /// Builds the lyon path from the current subpaths, skipping subpaths with coordinates that are not finite in
    /// `f32`. Returns the path and the number of skipped subpaths.
    fn build_path(&self) -> (Path, usize) {
        let mut path_builder = Path::builder();
        let mut skipped = 0;
        for subpath in &self.subpaths {
            let points = subpath
                .points
                .iter()
                .map(|position| point(position.x as f32, position.y as f32))
                .collect::<Vec<_>>();
            if points
                .iter()
                .any(|p| !p.x.is_finite() || !p.y.is_finite())
            {
                skipped += 1;
                continue;
            }

            let mut points = points.into_iter();
            let Some(first) = points.next() else { continue };
            path_builder.begin(first);
            for p in points {
                path_builder.line_to(p);
            }
            path_builder.end(subpath.closed);
        }
        (path_builder.build(), skipped)
    }

    /// Takes the current path for painting, logging subpaths that cannot be tessellated.
    fn take_path(&mut self, operation: &str) -> Path {
        let (path, skipped) = self.build_path();
        self.subpaths.clear();
        if skipped > 0 {
            warn!("{} skipped subpaths with non-finite coordinates. subpaths: {}", operation, skipped);
        }
        path
    }

    fn push_mesh(&mut self, geometry: VertexBuffers<[f32; 2], u32>) {
        let mesh = PolygonMesh {
            vertices: geometry.vertices,
            indices: geometry.indices,
        };
        trace!("mesh. mode: {:?}, triangles: {}", self.state.draw_mode, mesh.indices.len() / 3);
        if !mesh.is_empty() {
            self.meshes.push(RenderedMesh {
                mode: self.state.draw_mode,
                mesh,
            });
        }
    }
}

impl Canvas for MeshCanvas {
    fn move_to(&mut self, position: Position) {
        let position = self
            .state
            .transform
            .apply_to_position(position);
        self.subpaths.push(SubPath {
            points: vec![position],
            closed: false,
        });
    }

    fn line_to(&mut self, position: Position) {
        let position = self
            .state
            .transform
            .apply_to_position(position);
        self.push_device_point(position);
    }

    fn close_path(&mut self) {
        if let Some(subpath) = self.open_subpath() {
            subpath.closed = true;
        }
    }

    fn arc(&mut self, center: Position, radii: Vector, start_angle: f64, end_angle: f64) {
        let sweep = end_angle - start_angle;
        if !sweep.is_finite() {
            warn!("arc with non-finite sweep ignored. start: {}, end: {}", start_angle, end_angle);
            return;
        }
        let steps = ((sweep.abs() / (2.0 * PI)) * self.arc_segments as f64)
            .ceil()
            .clamp(1.0, (self.arc_segments * MAX_ARC_TURNS) as f64) as usize;

        for step in 0..=steps {
            let angle = start_angle + sweep * step as f64 / steps as f64;
            let local = Position::new(center.x + radii.x * angle.cos(), center.y + radii.y * angle.sin());
            let position = self
                .state
                .transform
                .apply_to_position(local);
            self.push_device_point(position);
        }
    }

    fn rectangle(&mut self, corner: Position, width: f64, height: f64) {
        self.move_to(corner);
        self.line_to(Position::new(corner.x + width, corner.y));
        self.line_to(Position::new(corner.x + width, corner.y + height));
        self.line_to(Position::new(corner.x, corner.y + height));
        self.close_path();
    }

    fn set_line_width(&mut self, width: f64) {
        self.state.line_width = width;
    }

    fn set_line_cap(&mut self, cap: LineCap) {
        self.state.line_cap = cap;
    }

    fn set_draw_mode(&mut self, mode: DrawMode) {
        self.state.draw_mode = mode;
    }

    fn rotate(&mut self, radians: f64) {
        self.state.transform.rotate(radians);
    }

    fn scale(&mut self, sx: f64, sy: f64) {
        self.state.transform.scale(sx, sy);
    }

    fn translate(&mut self, dx: f64, dy: f64) {
        self.state.transform.translate(dx, dy);
    }

    fn save(&mut self) {
        self.saved_states.push(self.state);
    }

    fn restore(&mut self) {
        match self.saved_states.pop() {
            Some(state) => self.state = state,
            None => warn!("canvas restore without matching save"),
        }
    }

    fn fill(&mut self) {
        let path = self.take_path("fill");

        let mut geometry: VertexBuffers<[f32; 2], u32> = VertexBuffers::new();
        let mut tessellator = FillTessellator::new();

        let result = tessellator.tessellate_path(
            &path,
            &FillOptions::default().with_fill_rule(FillRule::EvenOdd),
            &mut BuffersBuilder::new(&mut geometry, |vertex: FillVertex| {
                [vertex.position().x, vertex.position().y]
            }),
        );
        match result {
            Ok(()) => self.push_mesh(geometry),
            Err(cause) => error!("fill tessellation failed. cause: {:?}", cause),
        }
    }

    fn stroke(&mut self) {
        let path = self.take_path("stroke");

        let width = (self.state.line_width * self.state.transform.length_scale()) as f32;
        if !width.is_finite() || width < 0.0 {
            warn!("stroke with invalid line width ignored. width: {}", width);
            return;
        }
        let cap = match self.state.line_cap {
            LineCap::Butt => lyon::tessellation::LineCap::Butt,
            LineCap::Round => lyon::tessellation::LineCap::Round,
            LineCap::Square => lyon::tessellation::LineCap::Square,
        };

        let mut geometry: VertexBuffers<[f32; 2], u32> = VertexBuffers::new();
        let mut tessellator = StrokeTessellator::new();

        let result = tessellator.tessellate_path(
            &path,
            &StrokeOptions::default()
                .with_line_width(width)
                .with_line_cap(cap)
                .with_line_join(LineJoin::Miter),
            &mut BuffersBuilder::new(&mut geometry, |vertex: StrokeVertex| {
                [vertex.position().x, vertex.position().y]
            }),
        );
        match result {
            Ok(()) => self.push_mesh(geometry),
            Err(cause) => error!("stroke tessellation failed. cause: {:?}", cause),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use rstest::rstest;

    use super::*;

    fn mesh_covers(mesh: &PolygonMesh, x: f32, y: f32) -> bool {
        fn sign(p: [f32; 2], a: [f32; 2], b: [f32; 2]) -> f32 {
            (p[0] - b[0]) * (a[1] - b[1]) - (a[0] - b[0]) * (p[1] - b[1])
        }

        mesh.triangles()
            .any(|[a, b, c]| {
                let p = [x, y];
                let (d1, d2, d3) = (sign(p, a, b), sign(p, b, c), sign(p, c, a));
                let has_negative = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
                let has_positive = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
                !(has_negative && has_positive)
            })
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-3,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[rstest]
    #[case(BoundingBox::default(), true)]
    #[case(BoundingBox { min: Position::new(0.0, 0.0), max: Position::new(0.0, 0.0) }, false)]
    fn test_is_empty(#[case] input: BoundingBox, #[case] expected: bool) {
        assert_eq!(input.is_empty(), expected);
    }

    #[test]
    fn transform_composes_in_user_space() {
        // given
        let mut transform = CanvasTransform::default();

        // when
        transform.translate(10.0, 0.0);
        transform.rotate(FRAC_PI_2);
        transform.scale(2.0, 2.0);

        // then
        // (1,0) -> scaled (2,0) -> rotated (0,2) -> translated (10,2)
        let position = transform.apply_to_position(Position::new(1.0, 0.0));
        assert_close(position.x, 10.0);
        assert_close(position.y, 2.0);
        assert_close(transform.length_scale(), 2.0);
    }

    #[test]
    fn fill_rectangle_with_hole_uses_even_odd() {
        // given
        let mut canvas = MeshCanvas::default();

        // when
        canvas.rectangle(Position::new(0.0, 0.0), 10.0, 10.0);
        canvas.rectangle(Position::new(4.0, 4.0), 2.0, 2.0);
        canvas.fill();

        // then
        let meshes = canvas.meshes();
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].mode, DrawMode::Draw);
        assert!(mesh_covers(&meshes[0].mesh, 1.0, 1.0));
        assert!(!mesh_covers(&meshes[0].mesh, 5.0, 5.0));
    }

    #[rstest]
    #[case(LineCap::Butt, 0.0, 10.0)]
    #[case(LineCap::Square, -1.0, 11.0)]
    fn stroke_caps(#[case] cap: LineCap, #[case] min_x: f64, #[case] max_x: f64) {
        // given
        let mut canvas = MeshCanvas::default();

        // when
        canvas.set_line_width(2.0);
        canvas.set_line_cap(cap);
        canvas.move_to(Position::new(0.0, 0.0));
        canvas.line_to(Position::new(10.0, 0.0));
        canvas.stroke();

        // then
        let bbox = canvas.bounding_box();
        assert_close(bbox.min.x, min_x);
        assert_close(bbox.max.x, max_x);
        assert_close(bbox.min.y, -1.0);
        assert_close(bbox.max.y, 1.0);
    }

    #[test]
    fn stroke_width_follows_the_transform_scale() {
        let mut canvas = MeshCanvas::default();

        canvas.scale(10.0, 10.0);
        canvas.set_line_width(0.2);
        canvas.move_to(Position::new(0.0, 0.0));
        canvas.line_to(Position::new(1.0, 0.0));
        canvas.stroke();

        let bbox = canvas.bounding_box();
        assert_close(bbox.height(), 2.0);
        assert_close(bbox.width(), 10.0);
    }

    #[test]
    fn circle_fill_bounds() {
        let mut canvas = MeshCanvas::default();

        canvas.translate(5.0, 5.0);
        canvas.circle(Position::origin(), 2.0);
        canvas.fill();

        let bbox = canvas.bounding_box();
        assert_close(bbox.min.x, 4.0);
        assert_close(bbox.max.x, 6.0);
        assert_close(bbox.min.y, 4.0);
        assert_close(bbox.max.y, 6.0);
    }

    #[test]
    fn non_finite_subpaths_are_skipped() {
        // given
        let mut canvas = MeshCanvas::default();

        // when
        canvas.rectangle(Position::new(0.0, 0.0), 1.0, 1.0);
        canvas.circle(Position::origin(), f64::INFINITY);
        canvas.fill();
        canvas.circle(Position::origin(), f64::NAN);
        canvas.fill();
        // finite in f64, but not in f32
        canvas.rectangle(Position::new(0.0, 0.0), 1e300, 1.0);
        canvas.fill();

        // then
        assert_eq!(canvas.meshes().len(), 1);
        assert_close(canvas.bounding_box().max.x, 1.0);
    }

    #[rstest]
    #[case(f64::INFINITY)]
    #[case(f64::NAN)]
    fn stroke_with_invalid_width_is_skipped(#[case] width: f64) {
        let mut canvas = MeshCanvas::default();

        canvas.set_line_width(width);
        canvas.move_to(Position::new(0.0, 0.0));
        canvas.line_to(Position::new(1.0, 0.0));
        canvas.stroke();

        assert!(canvas.meshes().is_empty());
    }

    #[rstest]
    #[case(0.0, f64::INFINITY)]
    #[case(0.0, 1e12)]
    fn huge_arc_sweeps_are_bounded(#[case] start_angle: f64, #[case] end_angle: f64) {
        let mut canvas = MeshCanvas::default();

        canvas.arc(Position::origin(), Vector::new(1.0, 1.0), start_angle, end_angle);

        let points = canvas
            .subpaths
            .iter()
            .map(|subpath| subpath.points.len())
            .sum::<usize>();
        assert!(points <= DEFAULT_ARC_SEGMENTS * MAX_ARC_TURNS + 1);
    }

    #[test]
    fn restore_undoes_transforms_and_modes() {
        // given
        let mut canvas = MeshCanvas::default();

        // when
        canvas.save();
        canvas.translate(100.0, 100.0);
        canvas.set_draw_mode(DrawMode::Erase);
        canvas.restore();
        canvas.rectangle(Position::new(0.0, 0.0), 1.0, 1.0);
        canvas.fill();

        // then
        assert_eq!(canvas.meshes()[0].mode, DrawMode::Draw);
        assert_close(canvas.bounding_box().max.x, 1.0);
    }

    #[test]
    fn unbalanced_restore_is_ignored() {
        let mut canvas = MeshCanvas::default();

        canvas.restore();
        canvas.rectangle(Position::new(0.0, 0.0), 1.0, 1.0);
        canvas.fill();

        assert_eq!(canvas.meshes().len(), 1);
    }

    #[test]
    fn fill_consumes_the_path() {
        let mut canvas = MeshCanvas::default();

        canvas.rectangle(Position::new(0.0, 0.0), 1.0, 1.0);
        canvas.fill();
        canvas.fill();

        assert_eq!(canvas.meshes().len(), 1);
    }
}
