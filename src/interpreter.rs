//! Stack machine for aperture macro programs.
//!
//! Every [`Instruction::Primitive`] treats the complete operand stack as the argument block of that primitive, draws
//! it, and then empties the stack so the next primitive starts clean.
//!
//! Two arithmetic operations keep the operand order of the legacy macro evaluator, existing macro tables depend on it:
//! * subtract computes `-pop() + pop()` with the most recent operand popped first, so pushing `[5, 2]` yields `3`.
//! * divide computes `1 / (a / b)` for pushed `[a, b]`, so pushing `[4, 2]` yields `0.5`.
//!
//! Division does not check for zero, infinities and NaN flow into the drawn geometry.

use std::f64::consts::PI;

use log::{trace, warn};
use thiserror::Error;

use crate::canvas::{Canvas, LineCap};
use crate::program::{Instruction, MacroProgram};
use crate::spacial::{rotate_position, Position, ToVector, Vector};

/// Extra stack slots on top of the program's literal pushes, parameter pushes need room too.
pub const STACK_SLACK: usize = 10;

pub const PRIMITIVE_CIRCLE: u32 = 1;
pub const PRIMITIVE_LINE: u32 = 2;
pub const PRIMITIVE_OUTLINE: u32 = 4;
pub const PRIMITIVE_POLYGON: u32 = 5;
pub const PRIMITIVE_MOIRE: u32 = 6;
pub const PRIMITIVE_THERMAL: u32 = 7;
pub const PRIMITIVE_VECTOR_LINE: u32 = 20;
pub const PRIMITIVE_CENTER_LINE: u32 = 21;
pub const PRIMITIVE_LOWER_LEFT_LINE: u32 = 22;

/// Upper bound for the vertex, side and ring counts a primitive reads from its argument block.
pub const MAX_PRIMITIVE_COUNT: usize = 10_000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MacroError {
    #[error("stack underflow at instruction {instruction}")]
    StackUnderflow { instruction: usize },
    #[error("parameter ${index} requested but only {len} parameters supplied")]
    ParameterOutOfRange { index: usize, len: usize },
    #[error("primitive {primitive} is missing its argument at offset {offset}")]
    MissingArgument { primitive: u32, offset: usize },
    #[error("primitive {primitive} has an invalid count {value} at offset {offset}")]
    InvalidArgument { primitive: u32, offset: usize, value: f64 },
}

/// Result of one program execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Execution {
    /// Primitive codes that were skipped because they are not supported, in program order.
    pub unhandled: Vec<u32>,
    pub primitives_drawn: usize,
}

impl Execution {
    pub fn is_fully_handled(&self) -> bool {
        self.unhandled.is_empty()
    }
}

/// Runs `program` with `parameters`, emitting the drawn primitives onto `canvas`.
///
/// Coordinates are relative to the canvas' current origin, the caller translates to the flash position.
#[profiling::function]
pub fn execute<C: Canvas + ?Sized>(
    program: &MacroProgram,
    parameters: &[f64],
    canvas: &mut C,
) -> Result<Execution, MacroError> {
    let mut stack = MacroStack::with_capacity(program.nuf_push() + STACK_SLACK);
    let mut execution = Execution::default();

    for (index, instruction) in program
        .instructions()
        .iter()
        .enumerate()
    {
        trace!("instruction: {}, {:?}, stack: {:?}", index, instruction, stack.values);
        match *instruction {
            Instruction::Nop => {}
            Instruction::PushValue(value) => stack.push(value),
            Instruction::PushParameter(parameter) => {
                let value = parameter
                    .checked_sub(1)
                    .and_then(|offset| parameters.get(offset))
                    .ok_or(MacroError::ParameterOutOfRange {
                        index: parameter,
                        len: parameters.len(),
                    })?;
                stack.push(*value);
            }
            Instruction::Add => {
                let (a, b) = stack.pop_pair(index)?;
                stack.push(a + b);
            }
            Instruction::Subtract => {
                let b = stack.pop(index)?;
                let a = stack.pop(index)?;
                stack.push(-b + a);
            }
            Instruction::Multiply => {
                let (a, b) = stack.pop_pair(index)?;
                stack.push(a * b);
            }
            Instruction::Divide => {
                let (a, b) = stack.pop_pair(index)?;
                stack.push(1.0 / (a / b));
            }
            Instruction::Primitive(code) => {
                let result = draw_primitive(code, &stack.values, canvas);
                stack.clear();
                match result? {
                    true => execution.primitives_drawn += 1,
                    false => {
                        warn!("unhandled macro primitive. macro: '{}', code: {}", program.name(), code);
                        execution.unhandled.push(code);
                    }
                }
            }
        }
    }

    Ok(execution)
}

#[derive(Debug)]
struct MacroStack {
    values: Vec<f64>,
}

impl MacroStack {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, value: f64) {
        self.values.push(value);
    }

    fn pop(&mut self, instruction: usize) -> Result<f64, MacroError> {
        self.values
            .pop()
            .ok_or(MacroError::StackUnderflow {
                instruction,
            })
    }

    /// Pops `b` then `a`, returned in push order.
    fn pop_pair(&mut self, instruction: usize) -> Result<(f64, f64), MacroError> {
        let b = self.pop(instruction)?;
        let a = self.pop(instruction)?;
        Ok((a, b))
    }

    fn clear(&mut self) {
        self.values.clear();
    }
}

/// Fixed-offset view over a primitive's argument block.
struct Arguments<'a> {
    primitive: u32,
    values: &'a [f64],
}

impl Arguments<'_> {
    fn get(&self, offset: usize) -> Result<f64, MacroError> {
        self.values
            .get(offset)
            .copied()
            .ok_or(MacroError::MissingArgument {
                primitive: self.primitive,
                offset,
            })
    }

    fn position(&self, offset: usize) -> Result<Position, MacroError> {
        Ok(Position::new(self.get(offset)?, self.get(offset + 1)?))
    }

    /// Negative counts are zero, non-finite counts and counts above [`MAX_PRIMITIVE_COUNT`] are rejected.
    fn count(&self, offset: usize) -> Result<usize, MacroError> {
        let value = self.get(offset)?;
        if !value.is_finite() || value > MAX_PRIMITIVE_COUNT as f64 {
            return Err(MacroError::InvalidArgument {
                primitive: self.primitive,
                offset,
                value,
            });
        }
        Ok(value.max(0.0) as usize)
    }
}

/// Returns `Ok(false)` for primitives that are not supported.
///
/// All arguments are read before the first canvas call, a short argument block never leaves a half drawn primitive.
fn draw_primitive<C: Canvas + ?Sized>(code: u32, values: &[f64], canvas: &mut C) -> Result<bool, MacroError> {
    let arguments = Arguments {
        primitive: code,
        values,
    };

    match code {
        PRIMITIVE_CIRCLE => {
            #[cfg(feature = "profile-renderables")]
            profiling::scope!("macro_circle");
            let diameter = arguments.get(1)?;
            let center = arguments.position(2)?;

            canvas.save();
            canvas.circle(center, diameter);
            canvas.fill();
            canvas.restore();
        }
        PRIMITIVE_LINE | PRIMITIVE_VECTOR_LINE => {
            #[cfg(feature = "profile-renderables")]
            profiling::scope!("macro_vector_line");
            let width = arguments.get(1)?;
            let start = arguments.position(2)?;
            let end = arguments.position(4)?;
            let rotation = arguments.get(6)?;

            canvas.save();
            canvas.rotate(rotation.to_radians());
            canvas.set_line_width(width);
            canvas.set_line_cap(LineCap::Butt);
            canvas.move_to(start);
            canvas.line_to(end);
            canvas.stroke();
            canvas.restore();
        }
        PRIMITIVE_OUTLINE => {
            #[cfg(feature = "profile-renderables")]
            profiling::scope!("macro_outline");
            // the first vertex is repeated as the last, so there are `n + 1` vertices
            let segments = arguments.count(1)?;
            let vertices = (0..=segments)
                .map(|vertex| arguments.position(2 + vertex * 2))
                .collect::<Result<Vec<_>, _>>()?;
            let rotation = arguments.get(2 + (segments + 1) * 2)?;

            canvas.save();
            canvas.rotate(rotation.to_radians());
            let mut vertices = vertices.into_iter();
            if let Some(first) = vertices.next() {
                canvas.move_to(first);
            }
            for vertex in vertices {
                canvas.line_to(vertex);
            }
            canvas.close_path();
            canvas.fill();
            canvas.restore();
        }
        PRIMITIVE_POLYGON => {
            #[cfg(feature = "profile-renderables")]
            profiling::scope!("macro_polygon");
            let sides = arguments.count(1)?;
            let center = arguments.position(2)?;
            let diameter = arguments.get(4)?;
            let rotation = arguments.get(5)?;

            canvas.save();
            canvas.rotate(rotation.to_radians());
            regular_polygon(canvas, center, diameter, sides, 0.0);
            canvas.fill();
            canvas.restore();
        }
        PRIMITIVE_MOIRE => {
            #[cfg(feature = "profile-renderables")]
            profiling::scope!("macro_moire");
            // no exposure argument, the published layout starts with the center
            let center = arguments.position(0)?;
            let outer_diameter = arguments.get(2)?;
            let ring_thickness = arguments.get(3)?;
            let gap = arguments.get(4)?;
            let max_rings = arguments.count(5)?;
            let cross_thickness = arguments.get(6)?;
            let cross_length = arguments.get(7)?;
            let rotation = arguments.get(8)?;

            canvas.save();
            canvas.rotate(rotation.to_radians());
            canvas.translate(center.x, center.y);

            canvas.set_line_width(ring_thickness);
            let mut previous_diameter = f64::INFINITY;
            for ring in 0..max_rings {
                let diameter = outer_diameter - ring as f64 * 2.0 * (ring_thickness + gap);
                // also stops on NaN and on rings that no longer shrink
                if diameter <= ring_thickness || !(diameter < previous_diameter) {
                    break;
                }
                previous_diameter = diameter;
                // stroke along the middle of the ring
                canvas.circle(Position::origin(), diameter - ring_thickness);
                canvas.stroke();
            }

            let half_length = cross_length / 2.0;
            canvas.set_line_width(cross_thickness);
            canvas.set_line_cap(LineCap::Butt);
            canvas.move_to(Position::new(-half_length, 0.0));
            canvas.line_to(Position::new(half_length, 0.0));
            canvas.move_to(Position::new(0.0, -half_length));
            canvas.line_to(Position::new(0.0, half_length));
            canvas.stroke();
            canvas.restore();
        }
        PRIMITIVE_CENTER_LINE => {
            #[cfg(feature = "profile-renderables")]
            profiling::scope!("macro_center_line");
            let width = arguments.get(1)?;
            let height = arguments.get(2)?;
            let center = arguments.position(3)?;
            let rotation = arguments.get(5)?;

            canvas.save();
            canvas.rotate(rotation.to_radians());
            canvas.rectangle(center - Vector::new(width / 2.0, height / 2.0), width, height);
            canvas.fill();
            canvas.restore();
        }
        PRIMITIVE_LOWER_LEFT_LINE => {
            #[cfg(feature = "profile-renderables")]
            profiling::scope!("macro_lower_left_line");
            let width = arguments.get(1)?;
            let height = arguments.get(2)?;
            let corner = arguments.position(3)?;
            let rotation = arguments.get(5)?;

            canvas.save();
            canvas.rotate(rotation.to_radians());
            canvas.rectangle(corner, width, height);
            canvas.fill();
            canvas.restore();
        }
        PRIMITIVE_THERMAL => return Ok(false),
        _ => return Ok(false),
    }

    Ok(true)
}

/// Adds a closed regular polygon subpath, the first vertex lies at `rotation` degrees.
pub(crate) fn regular_polygon<C: Canvas + ?Sized>(
    canvas: &mut C,
    center: Position,
    diameter: f64,
    sides: usize,
    rotation: f64,
) {
    let radius = diameter / 2.0;
    for side in 0..sides {
        let angle = rotation.to_radians() + 2.0 * PI * side as f64 / sides as f64;
        let vertex = center + rotate_position(Position::new(radius, 0.0), angle).to_vector();
        match side {
            0 => canvas.move_to(vertex),
            _ => canvas.line_to(vertex),
        }
    }
    canvas.close_path();
}
