//! Compiler for the Maestro scripting language.
//!
//! Source text goes through four stages: the [`lexer`] splits it into
//! spanned tokens, the [`parser`] builds flat statements (lowering the
//! structured block forms to jumps), the [`resolver`] checks every label and
//! subroutine reference, and the [`emitter`] lays out bytecode and produces a
//! [`BytecodeImage`] ready for upload.

pub mod ast;
pub mod emitter;
pub mod error;
pub mod lexer;
pub mod listing;
pub mod opcode;
pub mod parser;
pub mod resolver;
pub mod token;

pub use emitter::{BytecodeImage, SubroutineEntry};
pub use error::{CompileError, SymbolKind};
pub use listing::listing;
pub use opcode::Opcode;

use crate::DeviceFamily;

/// Compile a script for the given device family.
pub fn compile(source: &str, family: DeviceFamily) -> Result<BytecodeImage, CompileError> {
    let tokens = lexer::Lexer::new(source).tokenize()?;
    let statements = parser::Parser::new(tokens, family).parse()?;
    let program = resolver::resolve(statements, family)?;
    let image = emitter::emit(program)?;
    tracing::debug!(
        family = %family,
        bytes = image.len(),
        subroutines = image.subroutines.len(),
        "compiled script"
    );
    Ok(image)
}
