use crate::script::opcode::Opcode;
use crate::script::token::Span;

/// One statement of a Maestro script after parsing.
///
/// Block keywords (`begin`/`while`/`repeat`, `if`/`else`/`endif`) never reach
/// this level; the parser lowers them to jumps against synthesized labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// A run of consecutive number pushes.
    Push { values: Vec<u16>, span: Span },
    /// A device or stack instruction, with any numbers that appeared
    /// immediately before the mnemonic on the same line.
    Instruction {
        opcode: Opcode,
        operands: Vec<u16>,
        span: Span,
    },
    /// A call to a named subroutine.
    CallSub { name: String, span: Span },
    /// An unconditional or conditional (pops one value, taken on zero)
    /// branch to a label.
    Jump {
        target: String,
        conditional: bool,
        span: Span,
    },
    /// `name:`
    LabelDef { name: String, span: Span },
    /// `sub name:`
    SubDef { name: String, span: Span },
}

impl Statement {
    pub fn span(&self) -> Span {
        match self {
            Statement::Push { span, .. }
            | Statement::Instruction { span, .. }
            | Statement::CallSub { span, .. }
            | Statement::Jump { span, .. }
            | Statement::LabelDef { span, .. }
            | Statement::SubDef { span, .. } => *span,
        }
    }
}
