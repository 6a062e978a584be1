use std::collections::BTreeMap;

use crate::script::ast::Statement;
use crate::script::error::{CompileError, SymbolKind};
use crate::DeviceFamily;

/// Subroutine call commands start here; the first 128 opcodes are reserved
/// for the instruction set.
pub const FIRST_CALL_COMMAND: u16 = 128;

/// Statements with every name checked against the symbol table.
#[derive(Debug)]
pub struct ResolvedProgram {
    pub statements: Vec<Statement>,
    pub symbols: BTreeMap<String, SymbolKind>,
    /// Subroutine names in definition order; a sub's position here is its
    /// number for `RestartScriptAtSubroutine`, and `128 + position` is its
    /// one-byte call command when that fits.
    pub subroutines: Vec<String>,
    pub family: DeviceFamily,
}

impl ResolvedProgram {
    pub fn subroutine_number(&self, name: &str) -> Option<usize> {
        self.subroutines.iter().position(|s| s == name)
    }
}

/// Checks symbol definitions and references across the whole program.
///
/// The first pass collects every label and subroutine definition, rejecting
/// duplicates (labels and subroutines share one namespace). The second pass
/// checks that every jump target and call site refers to a known symbol, so
/// forward references compile the same as backward ones.
pub fn resolve(
    statements: Vec<Statement>,
    family: DeviceFamily,
) -> Result<ResolvedProgram, CompileError> {
    let mut symbols: BTreeMap<String, SymbolKind> = BTreeMap::new();
    let mut subroutines: Vec<String> = Vec::new();

    for statement in &statements {
        let (name, kind) = match statement {
            Statement::LabelDef { name, .. } => (name, SymbolKind::Label),
            Statement::SubDef { name, .. } => (name, SymbolKind::Subroutine),
            _ => continue,
        };
        if let Some(existing) = symbols.get(name) {
            let span = statement.span();
            return Err(CompileError::DuplicateSymbol {
                name: name.clone(),
                kind: *existing,
                line: span.line,
                col: span.col,
            });
        }
        symbols.insert(name.clone(), kind);
        if kind == SymbolKind::Subroutine {
            subroutines.push(name.clone());
        }
    }

    // One-byte call commands run 128..=255; past that a call needs the
    // two-byte address form, which only the Mini interpreter has.
    if !family.is_mini() && subroutines.len() > 128 {
        return Err(CompileError::TooManySubroutines { limit: 128 });
    }

    for statement in &statements {
        match statement {
            Statement::CallSub { name, span } => match symbols.get(name) {
                Some(SymbolKind::Subroutine) => {}
                Some(SymbolKind::Label) => {
                    return Err(CompileError::parse(
                        format!("'{}' is a label, not a subroutine; use goto", name),
                        *span,
                    ));
                }
                None => {
                    return Err(CompileError::UnresolvedSymbol {
                        name: name.clone(),
                        line: span.line,
                        col: span.col,
                    });
                }
            },
            Statement::Jump { target, span, .. } => {
                // Jumping to a subroutine's entry point is allowed; it just
                // falls into the body without pushing a return address.
                if !symbols.contains_key(target) {
                    return Err(CompileError::UnresolvedSymbol {
                        name: target.clone(),
                        line: span.line,
                        col: span.col,
                    });
                }
            }
            _ => {}
        }
    }

    Ok(ResolvedProgram {
        statements,
        symbols,
        subroutines,
        family,
    })
}
