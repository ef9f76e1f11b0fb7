use std::sync::Arc;

use log::{trace, warn};
use thiserror::Error;

use crate::interpreter::MAX_PRIMITIVE_COUNT;
use crate::program::MacroProgram;
use crate::spacial::{Position, Vector};

/// Lowest aperture index a Gerber file may select (D10).
pub const APERTURE_MIN: u32 = 10;
/// Size of the aperture table; valid indices are `APERTURE_MIN..APERTURE_MAX`.
pub const APERTURE_MAX: u32 = 10000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ImageError {
    #[error("aperture index {index} is outside of {min}..{max}")]
    ApertureIndexOutOfRange { index: u32, min: u32, max: u32 },
}

/// Layer polarity of a single net.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Polarity {
    #[default]
    Dark,
    Clear,
}

/// Polarity of the whole image, a negative image swaps what dark and clear nets do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImagePolarity {
    #[default]
    Positive,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    LinearX1,
    LinearX10,
    LinearX01,
    LinearX001,
    ClockwiseCircular,
    CounterClockwiseCircular,
    MultiQuadrantClockwise,
    MultiQuadrantCounterClockwise,
    RegionStart,
    RegionFill,
    RegionEnd,
}

impl Interpolation {
    pub fn is_linear(&self) -> bool {
        matches!(
            self,
            Interpolation::LinearX1 | Interpolation::LinearX10 | Interpolation::LinearX01 | Interpolation::LinearX001
        )
    }

    pub fn is_circular(&self) -> bool {
        matches!(
            self,
            Interpolation::ClockwiseCircular
                | Interpolation::CounterClockwiseCircular
                | Interpolation::MultiQuadrantClockwise
                | Interpolation::MultiQuadrantCounterClockwise
        )
    }

    pub fn is_region(&self) -> bool {
        matches!(
            self,
            Interpolation::RegionStart | Interpolation::RegionFill | Interpolation::RegionEnd
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApertureState {
    /// Stroke from start to stop.
    On,
    /// Pen-up move.
    Off,
    /// Stamp the aperture at the stop point.
    Flash,
}

/// Ellipse segment of a circular interpolation, angles are in degrees.
///
/// `end_angle - start_angle` is signed; a negative sweep runs clockwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleSegment {
    pub center: Position,
    pub width: f64,
    pub height: f64,
    pub start_angle: f64,
    pub end_angle: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Net {
    pub start: Position,
    pub stop: Position,
    pub circle_segment: Option<CircleSegment>,
    pub interpolation: Interpolation,
    pub aperture_state: ApertureState,
    pub aperture: u32,
    pub polarity: Polarity,
    /// Number of corners of a region, only meaningful on a region start net.
    pub corner_count: usize,
}

impl Net {
    fn new(
        start: Position,
        stop: Position,
        interpolation: Interpolation,
        aperture_state: ApertureState,
        aperture: u32,
    ) -> Self {
        Self {
            start,
            stop,
            circle_segment: None,
            interpolation,
            aperture_state,
            aperture,
            polarity: Polarity::Dark,
            corner_count: 0,
        }
    }

    pub fn line(aperture: u32, start: Position, stop: Position) -> Self {
        Self::new(start, stop, Interpolation::LinearX1, ApertureState::On, aperture)
    }

    pub fn moved(aperture: u32, start: Position, stop: Position) -> Self {
        Self::new(start, stop, Interpolation::LinearX1, ApertureState::Off, aperture)
    }

    pub fn flash(aperture: u32, position: Position) -> Self {
        Self::new(position, position, Interpolation::LinearX1, ApertureState::Flash, aperture)
    }

    pub fn arc(aperture: u32, start: Position, stop: Position, segment: CircleSegment) -> Self {
        let interpolation = if segment.end_angle >= segment.start_angle {
            Interpolation::MultiQuadrantCounterClockwise
        } else {
            Interpolation::MultiQuadrantClockwise
        };
        Self {
            circle_segment: Some(segment),
            ..Self::new(start, stop, interpolation, ApertureState::On, aperture)
        }
    }

    pub fn region_start(start: Position, corner_count: usize) -> Self {
        Self {
            corner_count,
            ..Self::new(start, start, Interpolation::RegionStart, ApertureState::On, 0)
        }
    }

    pub fn region_fill(start: Position, stop: Position) -> Self {
        Self::new(start, stop, Interpolation::RegionFill, ApertureState::On, 0)
    }

    pub fn region_end(position: Position) -> Self {
        Self::new(position, position, Interpolation::RegionEnd, ApertureState::Off, 0)
    }

    pub fn with_polarity(mut self, polarity: Polarity) -> Self {
        self.polarity = polarity;
        self
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Hole {
    Round { diameter: f64 },
    Rectangular { width: f64, height: f64 },
}

impl Hole {
    /// Legacy encoding: both dimensions present makes a rectangular hole, one makes a round hole.
    fn from_parameters(first: f64, second: f64) -> Option<Self> {
        match (first > 0.0, second > 0.0) {
            (true, true) => Some(Hole::Rectangular {
                width: first,
                height: second,
            }),
            (true, false) => Some(Hole::Round {
                diameter: first,
            }),
            (false, true) => Some(Hole::Round {
                diameter: second,
            }),
            (false, false) => None,
        }
    }
}

/// The type tag used by parsers that hand over positional aperture parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApertureType {
    Circle,
    Rectangle,
    Oval,
    Polygon,
}

#[derive(Debug, Clone)]
pub enum ApertureKind {
    Circle {
        diameter: f64,
        hole: Option<Hole>,
    },
    Rectangle {
        width: f64,
        height: f64,
        hole: Option<Hole>,
    },
    Oval {
        width: f64,
        height: f64,
        hole: Option<Hole>,
    },
    Polygon {
        /// Diameter of the circumscribed circle.
        diameter: f64,
        vertices: u32,
        /// Degrees, counterclockwise.
        rotation: f64,
        hole: Option<Hole>,
    },
    Macro {
        program: Arc<MacroProgram>,
        parameters: Vec<f64>,
    },
}

#[derive(Debug, Clone)]
pub struct Aperture {
    pub kind: ApertureKind,
}

impl Aperture {
    pub fn new(kind: ApertureKind) -> Self {
        Self {
            kind,
        }
    }

    pub fn circle(diameter: f64) -> Self {
        Self::new(ApertureKind::Circle {
            diameter,
            hole: None,
        })
    }

    pub fn rectangle(width: f64, height: f64) -> Self {
        Self::new(ApertureKind::Rectangle {
            width,
            height,
            hole: None,
        })
    }

    pub fn oval(width: f64, height: f64) -> Self {
        Self::new(ApertureKind::Oval {
            width,
            height,
            hole: None,
        })
    }

    pub fn polygon(diameter: f64, vertices: u32, rotation: f64) -> Self {
        Self::new(ApertureKind::Polygon {
            diameter,
            vertices,
            rotation,
            hole: None,
        })
    }

    pub fn macro_aperture(program: Arc<MacroProgram>, parameters: Vec<f64>) -> Self {
        Self::new(ApertureKind::Macro {
            program,
            parameters,
        })
    }

    /// Decodes the positional parameter layout, missing parameters count as zero.
    pub fn from_parameters(aperture_type: ApertureType, parameters: &[f64]) -> Self {
        let parameter = |index: usize| parameters.get(index).copied().unwrap_or(0.0);

        let kind = match aperture_type {
            ApertureType::Circle => ApertureKind::Circle {
                diameter: parameter(0),
                hole: Hole::from_parameters(parameter(1), parameter(2)),
            },
            ApertureType::Rectangle => ApertureKind::Rectangle {
                width: parameter(0),
                height: parameter(1),
                hole: Hole::from_parameters(parameter(2), parameter(3)),
            },
            ApertureType::Oval => ApertureKind::Oval {
                width: parameter(0),
                height: parameter(1),
                hole: Hole::from_parameters(parameter(2), parameter(3)),
            },
            ApertureType::Polygon => ApertureKind::Polygon {
                diameter: parameter(0),
                vertices: polygon_vertices(parameter(1)),
                rotation: parameter(2),
                hole: Hole::from_parameters(parameter(3), parameter(4)),
            },
        };
        trace!("decoded aperture. type: {:?}, parameters: {:?}, kind: {:?}", aperture_type, parameters, kind);

        Self::new(kind)
    }

    /// Width used when the aperture strokes a line or arc, i.e. positional parameter 0.
    pub fn line_width(&self) -> f64 {
        match &self.kind {
            ApertureKind::Circle {
                diameter, ..
            } => *diameter,
            ApertureKind::Rectangle {
                width, ..
            } => *width,
            ApertureKind::Oval {
                width, ..
            } => *width,
            ApertureKind::Polygon {
                diameter, ..
            } => *diameter,
            ApertureKind::Macro {
                parameters, ..
            } => parameters.first().copied().unwrap_or(0.0),
        }
    }

    pub fn is_circle(&self) -> bool {
        matches!(self.kind, ApertureKind::Circle { .. })
    }
}

/// Unusable vertex counts decode as zero, which flashes as a circle.
fn polygon_vertices(value: f64) -> u32 {
    if !value.is_finite() || value > MAX_PRIMITIVE_COUNT as f64 {
        warn!("invalid polygon vertex count. value: {}", value);
        return 0;
    }
    value.max(0.0) as u32
}

#[derive(Debug, Clone)]
pub struct Image {
    pub polarity: ImagePolarity,
    /// Added to every coordinate before drawing.
    pub offset: Vector,
    nets: Vec<Net>,
    apertures: Vec<Option<Aperture>>,
}

impl Default for Image {
    fn default() -> Self {
        Self::new()
    }
}

impl Image {
    pub fn new() -> Self {
        Self {
            polarity: ImagePolarity::Positive,
            offset: Vector::zeros(),
            nets: Vec::new(),
            apertures: vec![None; APERTURE_MAX as usize],
        }
    }

    /// Stores `aperture` at `index`, returning the aperture previously stored there.
    pub fn set_aperture(&mut self, index: u32, aperture: Aperture) -> Result<Option<Aperture>, ImageError> {
        if !(APERTURE_MIN..APERTURE_MAX).contains(&index) {
            return Err(ImageError::ApertureIndexOutOfRange {
                index,
                min: APERTURE_MIN,
                max: APERTURE_MAX,
            });
        }
        Ok(self.apertures[index as usize].replace(aperture))
    }

    /// Never panics; indices outside of the table are simply unset.
    pub fn aperture(&self, index: u32) -> Option<&Aperture> {
        self.apertures
            .get(index as usize)
            .and_then(Option::as_ref)
    }

    /// Defined apertures in ascending index order.
    pub fn apertures(&self) -> impl Iterator<Item = (u32, &Aperture)> + '_ {
        self.apertures
            .iter()
            .enumerate()
            .filter_map(|(index, aperture)| {
                aperture
                    .as_ref()
                    .map(|aperture| (index as u32, aperture))
            })
    }

    pub fn push_net(&mut self, net: Net) {
        self.nets.push(net);
    }

    pub fn nets(&self) -> &[Net] {
        &self.nets
    }
}

impl Extend<Net> for Image {
    fn extend<T: IntoIterator<Item = Net>>(&mut self, iter: T) {
        self.nets.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0)]
    #[case(APERTURE_MIN - 1)]
    #[case(APERTURE_MAX)]
    fn set_aperture_rejects_reserved_indices(#[case] index: u32) {
        let mut image = Image::new();

        let result = image.set_aperture(index, Aperture::circle(0.1));

        assert_eq!(
            result.err(),
            Some(ImageError::ApertureIndexOutOfRange {
                index,
                min: APERTURE_MIN,
                max: APERTURE_MAX
            })
        );
    }

    #[test]
    fn unset_and_out_of_range_lookups_are_none() {
        let image = Image::new();

        assert!(image.aperture(0).is_none());
        assert!(image.aperture(11).is_none());
        assert!(image.aperture(u32::MAX).is_none());
    }

    #[test]
    fn apertures_are_listed_in_ascending_order() {
        // given
        let mut image = Image::new();
        image
            .set_aperture(22, Aperture::circle(0.2))
            .unwrap();
        image
            .set_aperture(10, Aperture::rectangle(0.1, 0.2))
            .unwrap();
        image
            .set_aperture(15, Aperture::oval(0.1, 0.2))
            .unwrap();

        // when
        let indices = image
            .apertures()
            .map(|(index, _)| index)
            .collect::<Vec<_>>();

        // then
        assert_eq!(indices, vec![10, 15, 22]);
    }

    #[test]
    fn replacing_an_aperture_returns_the_old_one() {
        let mut image = Image::new();
        image
            .set_aperture(10, Aperture::circle(0.1))
            .unwrap();

        let previous = image
            .set_aperture(10, Aperture::circle(0.2))
            .unwrap();

        assert!(matches!(previous.map(|aperture| aperture.kind), Some(ApertureKind::Circle { diameter, .. }) if diameter == 0.1));
    }

    #[rstest]
    #[case(&[0.1], None)]
    #[case(&[0.1, 0.05], Some(Hole::Round { diameter: 0.05 }))]
    #[case(&[0.1, 0.05, 0.02], Some(Hole::Rectangular { width: 0.05, height: 0.02 }))]
    #[case(&[0.1, 0.0, 0.02], Some(Hole::Round { diameter: 0.02 }))]
    fn circle_hole_decoding(#[case] parameters: &[f64], #[case] expected: Option<Hole>) {
        let aperture = Aperture::from_parameters(ApertureType::Circle, parameters);

        let ApertureKind::Circle {
            diameter,
            hole,
        } = aperture.kind
        else {
            panic!("expected a circle");
        };
        assert_eq!(diameter, 0.1);
        assert_eq!(hole, expected);
    }

    #[test]
    fn polygon_decoding() {
        let aperture = Aperture::from_parameters(ApertureType::Polygon, &[0.5, 6.0, 30.0, 0.1]);

        let ApertureKind::Polygon {
            diameter,
            vertices,
            rotation,
            hole,
        } = aperture.kind
        else {
            panic!("expected a polygon");
        };
        assert_eq!((diameter, vertices, rotation), (0.5, 6, 30.0));
        assert_eq!(hole, Some(Hole::Round { diameter: 0.1 }));
    }

    #[rstest]
    #[case(f64::INFINITY)]
    #[case(f64::NAN)]
    #[case(1e12)]
    #[case(-3.0)]
    fn unusable_polygon_vertex_counts_decode_as_zero(#[case] vertices: f64) {
        let aperture = Aperture::from_parameters(ApertureType::Polygon, &[0.5, vertices]);

        assert!(matches!(aperture.kind, ApertureKind::Polygon { vertices: 0, .. }));
    }

    #[test]
    fn line_width_is_the_first_parameter() {
        assert_eq!(Aperture::rectangle(0.3, 0.1).line_width(), 0.3);
        assert_eq!(Aperture::circle(0.25).line_width(), 0.25);
    }

    #[rstest]
    #[case(Interpolation::LinearX10, true, false, false)]
    #[case(Interpolation::ClockwiseCircular, false, true, false)]
    #[case(Interpolation::RegionFill, false, false, true)]
    fn interpolation_classes(
        #[case] interpolation: Interpolation,
        #[case] linear: bool,
        #[case] circular: bool,
        #[case] region: bool,
    ) {
        assert_eq!(interpolation.is_linear(), linear);
        assert_eq!(interpolation.is_circular(), circular);
        assert_eq!(interpolation.is_region(), region);
    }
}
