use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, info, trace, warn};
use thiserror::Error;

use crate::canvas::{Canvas, DrawMode, LineCap};
use crate::image::{Aperture, ApertureKind, ApertureState, Hole, Image, ImagePolarity, Interpolation, Net, Polarity};
use crate::interpreter::{self, regular_polygon, MacroError, MAX_PRIMITIVE_COUNT};
use crate::spacial::{Position, Vector};

/// What to do when a net cannot be drawn as described.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorPolicy {
    /// Skip the net, record the diagnostic and carry on.
    #[default]
    Lenient,
    /// Abort on the first error diagnostic, for exports where a silently wrong image is worse than none.
    ///
    /// Missing apertures are never fatal, they occur at the start of every file before an aperture is selected.
    Strict,
}

#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RenderConfiguration {
    pub error_policy: ErrorPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A problem found with a single net, `net` is the index into the image's net list.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Diagnostic {
    #[error("net {net}: aperture D{aperture} is not defined")]
    MissingAperture { net: usize, aperture: u32 },
    #[error("net {net}: {interpolation:?} drawn as 1x linear")]
    ScaledLinearInterpolation { net: usize, interpolation: Interpolation },
    #[error("net {net}: circular interpolation without a circle segment")]
    MissingCircleSegment { net: usize },
    #[error("net {net}: macro '{name}' of aperture D{aperture} has unhandled primitives {codes:?}")]
    UnhandledMacroPrimitives {
        net: usize,
        aperture: u32,
        name: String,
        codes: Vec<u32>,
    },
    #[error("net {net}: macro of aperture D{aperture} failed, cause: {cause}")]
    MacroFault {
        net: usize,
        aperture: u32,
        #[source]
        cause: MacroError,
    },
    #[error("net {net}: {interpolation:?} outside of a region")]
    RegionNotOpen { net: usize, interpolation: Interpolation },
    #[error("region started at net {net} is never closed")]
    UnterminatedRegion { net: usize },
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::MissingAperture { .. } | Diagnostic::ScaledLinearInterpolation { .. } => Severity::Warning,
            Diagnostic::MissingCircleSegment { .. }
            | Diagnostic::UnhandledMacroPrimitives { .. }
            | Diagnostic::MacroFault { .. }
            | Diagnostic::RegionNotOpen { .. }
            | Diagnostic::UnterminatedRegion { .. } => Severity::Error,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("rendering aborted: {0}")]
    Aborted(#[source] Diagnostic),
    #[error("rendering cancelled before net {net}")]
    Cancelled { net: usize },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderReport {
    pub nets_visited: usize,
    pub diagnostics: Vec<Diagnostic>,
}

impl RenderReport {
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|diagnostic| diagnostic.severity() == Severity::Error)
    }
}

/// Walks the nets of an image in order and paints them onto a [`Canvas`].
#[derive(Debug, Clone, Default)]
pub struct NetRenderer {
    configuration: RenderConfiguration,
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl NetRenderer {
    pub fn new(configuration: RenderConfiguration) -> Self {
        Self {
            configuration,
            cancel_flag: None,
        }
    }

    /// The flag is checked before each net, once set the render stops with [`RenderError::Cancelled`].
    pub fn with_cancel_flag(mut self, cancel_flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(cancel_flag);
        self
    }

    /// Paints `image`; the canvas' transform and draw mode are restored afterwards, also on error.
    #[profiling::function]
    pub fn render<C: Canvas + ?Sized>(&self, image: &Image, canvas: &mut C) -> Result<RenderReport, RenderError> {
        canvas.save();
        let result = self.render_nets(image, canvas);
        canvas.restore();

        match &result {
            Ok(report) => info!(
                "rendered image. nets: {}, diagnostics: {}",
                report.nets_visited,
                report.diagnostics.len()
            ),
            Err(cause) => error!("rendering failed. cause: {}", cause),
        }

        result
    }

    fn render_nets<C: Canvas + ?Sized>(&self, image: &Image, canvas: &mut C) -> Result<RenderReport, RenderError> {
        if image.offset != Vector::zeros() {
            canvas.translate(image.offset.x, image.offset.y);
        }

        let mut pass = RenderPass {
            image,
            policy: self.configuration.error_policy,
            report: RenderReport::default(),
            polarity: Polarity::Dark,
            region: None,
        };
        canvas.set_draw_mode(pass.draw_mode());

        for (index, net) in image.nets().iter().enumerate() {
            if self.is_cancelled() {
                debug!("render cancelled. net: {}", index);
                return Err(RenderError::Cancelled {
                    net: index,
                });
            }

            trace!("net: {}, {:?}", index, net);
            pass.report.nets_visited += 1;
            pass.render_net(index, net, canvas)?;
        }

        if let Some(region) = pass.region.take() {
            pass.record(Diagnostic::UnterminatedRegion {
                net: region.start_net,
            })?;
        }

        Ok(pass.report)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

#[derive(Debug)]
struct Region {
    start_net: usize,
    vertices: Vec<Position>,
}

struct RenderPass<'a> {
    image: &'a Image,
    policy: ErrorPolicy,
    report: RenderReport,
    polarity: Polarity,
    /// Some while between a region start and a region end.
    region: Option<Region>,
}

impl RenderPass<'_> {
    fn draw_mode(&self) -> DrawMode {
        let mode = match self.polarity {
            Polarity::Dark => DrawMode::Draw,
            Polarity::Clear => DrawMode::Erase,
        };
        match self.image.polarity {
            ImagePolarity::Positive => mode,
            ImagePolarity::Negative => mode.inverted(),
        }
    }

    fn record(&mut self, diagnostic: Diagnostic) -> Result<(), RenderError> {
        match diagnostic.severity() {
            Severity::Warning => warn!("{}", diagnostic),
            Severity::Error => error!("{}", diagnostic),
        }

        if self.policy == ErrorPolicy::Strict && diagnostic.severity() == Severity::Error {
            return Err(RenderError::Aborted(diagnostic));
        }
        self.report.diagnostics.push(diagnostic);
        Ok(())
    }

    fn update_polarity<C: Canvas + ?Sized>(&mut self, net: &Net, canvas: &mut C) {
        if net.polarity != self.polarity {
            self.polarity = net.polarity;
            debug!("polarity changed. polarity: {:?}", self.polarity);
            canvas.set_draw_mode(self.draw_mode());
        }
    }

    fn render_net<C: Canvas + ?Sized>(&mut self, index: usize, net: &Net, canvas: &mut C) -> Result<(), RenderError> {
        match net.interpolation {
            Interpolation::RegionStart => {
                self.update_polarity(net, canvas);
                if let Some(region) = self.region.take() {
                    self.record(Diagnostic::UnterminatedRegion {
                        net: region.start_net,
                    })?;
                }
                debug!("region start. net: {}, corners: {}", index, net.corner_count);

                let mut vertices = Vec::with_capacity(net.corner_count + 1);
                vertices.push(net.start);
                self.region = Some(Region {
                    start_net: index,
                    vertices,
                });
                Ok(())
            }
            Interpolation::RegionFill => match &mut self.region {
                Some(region) => {
                    region.vertices.push(net.stop);
                    Ok(())
                }
                None => self.record(Diagnostic::RegionNotOpen {
                    net: index,
                    interpolation: net.interpolation,
                }),
            },
            Interpolation::RegionEnd => match self.region.take() {
                Some(region) => {
                    debug!("region end. net: {}, vertices: {}", index, region.vertices.len());
                    fill_region(&region.vertices, canvas);
                    Ok(())
                }
                None => self.record(Diagnostic::RegionNotOpen {
                    net: index,
                    interpolation: net.interpolation,
                }),
            },
            Interpolation::LinearX1
            | Interpolation::LinearX10
            | Interpolation::LinearX01
            | Interpolation::LinearX001
            | Interpolation::ClockwiseCircular
            | Interpolation::CounterClockwiseCircular
            | Interpolation::MultiQuadrantClockwise
            | Interpolation::MultiQuadrantCounterClockwise => {
                self.update_polarity(net, canvas);
                self.render_aperture_net(index, net, canvas)
            }
        }
    }

    fn render_aperture_net<C: Canvas + ?Sized>(
        &mut self,
        index: usize,
        net: &Net,
        canvas: &mut C,
    ) -> Result<(), RenderError> {
        let Some(aperture) = self.image.aperture(net.aperture) else {
            return self.record(Diagnostic::MissingAperture {
                net: index,
                aperture: net.aperture,
            });
        };

        match net.aperture_state {
            ApertureState::On if net.interpolation.is_circular() => self.stroke_arc(index, net, aperture, canvas),
            ApertureState::On => self.stroke_line(index, net, aperture, canvas),
            ApertureState::Off => {
                trace!("move. net: {}, stop: {}", index, net.stop);
                Ok(())
            }
            ApertureState::Flash => self.flash(index, net, aperture, canvas),
        }
    }

    fn stroke_line<C: Canvas + ?Sized>(
        &mut self,
        index: usize,
        net: &Net,
        aperture: &Aperture,
        canvas: &mut C,
    ) -> Result<(), RenderError> {
        let cap = match aperture.kind {
            ApertureKind::Rectangle { .. } => LineCap::Square,
            _ => LineCap::Round,
        };

        canvas.set_line_width(aperture.line_width());
        canvas.set_line_cap(cap);
        canvas.move_to(net.start);
        canvas.line_to(net.stop);
        canvas.stroke();

        if net.interpolation != Interpolation::LinearX1 {
            self.record(Diagnostic::ScaledLinearInterpolation {
                net: index,
                interpolation: net.interpolation,
            })?;
        }
        Ok(())
    }

    fn stroke_arc<C: Canvas + ?Sized>(
        &mut self,
        index: usize,
        net: &Net,
        aperture: &Aperture,
        canvas: &mut C,
    ) -> Result<(), RenderError> {
        let Some(segment) = net.circle_segment else {
            return self.record(Diagnostic::MissingCircleSegment {
                net: index,
            });
        };

        canvas.set_line_width(aperture.line_width());
        canvas.set_line_cap(LineCap::Round);
        // the sweep keeps its sign, negative runs clockwise
        canvas.arc(
            segment.center,
            Vector::new(segment.width / 2.0, segment.height / 2.0),
            segment.start_angle.to_radians(),
            segment.end_angle.to_radians(),
        );
        canvas.stroke();
        Ok(())
    }

    #[cfg_attr(feature = "profile-renderables", profiling::function)]
    fn flash<C: Canvas + ?Sized>(
        &mut self,
        index: usize,
        net: &Net,
        aperture: &Aperture,
        canvas: &mut C,
    ) -> Result<(), RenderError> {
        canvas.save();
        canvas.translate(net.stop.x, net.stop.y);

        let origin = Position::origin();
        let diagnostic = match &aperture.kind {
            ApertureKind::Circle {
                diameter,
                hole,
            } => {
                canvas.circle(origin, *diameter);
                fill_with_hole(hole, canvas);
                None
            }
            ApertureKind::Rectangle {
                width,
                height,
                hole,
            } => {
                canvas.rectangle(origin - Vector::new(width / 2.0, height / 2.0), *width, *height);
                fill_with_hole(hole, canvas);
                None
            }
            ApertureKind::Oval {
                width,
                height,
                hole,
            } => {
                oval(canvas, *width, *height);
                fill_with_hole(hole, canvas);
                None
            }
            ApertureKind::Polygon {
                diameter,
                vertices,
                rotation,
                hole,
            } => {
                if *vertices < 3 || *vertices as usize > MAX_PRIMITIVE_COUNT {
                    warn!(
                        "polygon aperture with {} vertices drawn as a circle. aperture: D{}",
                        vertices, net.aperture
                    );
                    canvas.circle(origin, *diameter);
                } else {
                    regular_polygon(canvas, origin, *diameter, *vertices as usize, *rotation);
                }
                fill_with_hole(hole, canvas);
                None
            }
            ApertureKind::Macro {
                program,
                parameters,
            } => match interpreter::execute(program, parameters, canvas) {
                Ok(execution) if execution.is_fully_handled() => None,
                Ok(execution) => Some(Diagnostic::UnhandledMacroPrimitives {
                    net: index,
                    aperture: net.aperture,
                    name: program.name().to_string(),
                    codes: execution.unhandled,
                }),
                Err(cause) => Some(Diagnostic::MacroFault {
                    net: index,
                    aperture: net.aperture,
                    cause,
                }),
            },
        };

        canvas.restore();

        match diagnostic {
            Some(diagnostic) => self.record(diagnostic),
            None => Ok(()),
        }
    }
}

fn fill_region<C: Canvas + ?Sized>(vertices: &[Position], canvas: &mut C) {
    let mut vertices = vertices.iter();
    let Some(first) = vertices.next() else { return };

    canvas.move_to(*first);
    for vertex in vertices {
        canvas.line_to(*vertex);
    }
    canvas.close_path();
    canvas.fill();
}

/// Adds the hole as an extra subpath, the even-odd fill leaves it empty, then fills.
fn fill_with_hole<C: Canvas + ?Sized>(hole: &Option<Hole>, canvas: &mut C) {
    match hole {
        Some(Hole::Round {
            diameter,
        }) => canvas.circle(Position::origin(), *diameter),
        Some(Hole::Rectangular {
            width,
            height,
        }) => canvas.rectangle(Position::new(-width / 2.0, -height / 2.0), *width, *height),
        None => {}
    }
    canvas.fill();
}

/// Stadium centered on the origin, the semicircles sit on the shorter axis.
fn oval<C: Canvas + ?Sized>(canvas: &mut C, width: f64, height: f64) {
    if width > height {
        let radius = height / 2.0;
        let delta = width / 2.0 - radius;
        let radii = Vector::new(radius, radius);
        canvas.move_to(Position::new(delta, -radius));
        canvas.arc(Position::new(delta, 0.0), radii, -PI / 2.0, PI / 2.0);
        canvas.arc(Position::new(-delta, 0.0), radii, PI / 2.0, 3.0 * PI / 2.0);
    } else {
        let radius = width / 2.0;
        let delta = height / 2.0 - radius;
        let radii = Vector::new(radius, radius);
        canvas.move_to(Position::new(radius, -delta));
        canvas.arc(Position::new(0.0, delta), radii, 0.0, PI);
        canvas.arc(Position::new(0.0, -delta), radii, PI, 2.0 * PI);
    }
    canvas.close_path();
}
