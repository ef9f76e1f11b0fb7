use log::trace;

/// One aperture macro opcode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Instruction {
    Nop,
    PushValue(f64),
    /// 1-based index into the parameters the aperture supplies.
    PushParameter(usize),
    Add,
    Subtract,
    Multiply,
    Divide,
    /// Draw the primitive with the given code using the whole stack as its arguments.
    Primitive(u32),
}

impl Instruction {
    /// Decodes the numeric opcode encoding used by macro parsers.
    ///
    /// `data` carries the literal, the parameter index or the primitive code depending on the opcode.
    /// Unknown opcodes decode to [`Instruction::Nop`].
    pub fn decode(opcode: u32, data: f64) -> Self {
        match opcode {
            0 => Instruction::Nop,
            1 => Instruction::PushValue(data),
            2 => Instruction::PushParameter(data.max(0.0) as usize),
            3 => Instruction::Add,
            4 => Instruction::Subtract,
            5 => Instruction::Multiply,
            6 => Instruction::Divide,
            7 => Instruction::Primitive(data.max(0.0) as u32),
            _ => {
                trace!("ignoring unknown macro opcode: {}", opcode);
                Instruction::Nop
            }
        }
    }
}

/// The compiled form of one aperture macro.
///
/// Built once by the parser and executed for every flash of an aperture that references it.
#[derive(Debug, Clone, PartialEq)]
pub struct MacroProgram {
    name: String,
    instructions: Vec<Instruction>,
    nuf_push: usize,
}

impl MacroProgram {
    pub fn new(name: impl Into<String>, instructions: Vec<Instruction>) -> Self {
        let nuf_push = instructions
            .iter()
            .filter(|instruction| matches!(instruction, Instruction::PushValue(_)))
            .count();

        Self {
            name: name.into(),
            instructions,
            nuf_push,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Number of literal pushes in the program, used to size the evaluation stack.
    pub fn nuf_push(&self) -> usize {
        self.nuf_push
    }
}
