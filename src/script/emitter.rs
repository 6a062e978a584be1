use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::script::ast::Statement;
use crate::script::error::CompileError;
use crate::script::opcode::Opcode;
use crate::script::resolver::{ResolvedProgram, FIRST_CALL_COMMAND};
use crate::script::token::Span;
use crate::DeviceFamily;

/// A subroutine as it exists in the finished bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubroutineEntry {
    pub name: String,
    /// One-byte call command, or `None` when the subroutine overflowed the
    /// 128 available command slots and is called through the two-byte form.
    pub command: Option<u8>,
    /// Byte offset of the subroutine's entry point.
    pub offset: u16,
}

/// Compiled bytecode plus the subroutine map needed to upload and start it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BytecodeImage {
    pub bytes: Vec<u8>,
    /// Subroutines in definition order; a sub's index is its number for the
    /// restart-at-subroutine request.
    pub subroutines: Vec<SubroutineEntry>,
    pub family: DeviceFamily,
}

impl BytecodeImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn subroutine_offset(&self, name: &str) -> Option<u16> {
        self.subroutines.iter().find(|s| s.name == name).map(|s| s.offset)
    }

    pub fn subroutine_number(&self, name: &str) -> Option<usize> {
        self.subroutines.iter().position(|s| s.name == name)
    }

    /// The 256-byte subroutine address table as it is written to script
    /// memory: little-endian entry offsets indexed by call command, 0xFF
    /// fill for unused slots.
    pub fn subroutine_table(&self) -> [u8; 256] {
        let mut table = [0xFF; 256];
        for sub in &self.subroutines {
            if let Some(command) = sub.command {
                let at = 2 * (command as usize - FIRST_CALL_COMMAND as usize);
                table[at..at + 2].copy_from_slice(&sub.offset.to_le_bytes());
            }
        }
        table
    }

    /// Checksum the device stores in its script CRC parameter: CRC-16 over
    /// the 128 little-endian table addresses (zero for unused slots) followed
    /// by the bytecode.
    pub fn crc(&self) -> u16 {
        let mut addresses = [0u16; 128];
        for sub in &self.subroutines {
            if let Some(command) = sub.command {
                addresses[command as usize - FIRST_CALL_COMMAND as usize] = sub.offset;
            }
        }

        let mut message = Vec::with_capacity(256 + self.bytes.len());
        for address in addresses {
            message.extend(address.to_le_bytes());
        }
        message.extend(&self.bytes);

        crc16(&message)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<BytecodeImage, postcard::Error> {
        postcard::from_bytes(data)
    }
}

/// CRC-16 with the reflected polynomial 0xA001, zero initial value.
fn crc16(message: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in message {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = crc >> 1 ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Encode a run of number pushes as the shortest literal instruction.
fn literal_run(values: &[u16], limit: usize, span: Span) -> Result<Vec<u8>, CompileError> {
    if values.len() > limit {
        return Err(CompileError::TooManyLiterals {
            count: values.len(),
            limit,
            line: span.line,
            col: span.col,
        });
    }

    let wide = values.iter().any(|&v| v > 255);
    let mut out = Vec::with_capacity(2 + 2 * values.len());

    match (values.len(), wide) {
        (1, false) => {
            out.push(Opcode::Literal8 as u8);
            out.push(values[0] as u8);
        }
        (1, true) => {
            out.push(Opcode::Literal as u8);
            out.extend(values[0].to_le_bytes());
        }
        (n, false) => {
            out.push(Opcode::Literal8N as u8);
            out.push(n as u8);
            out.extend(values.iter().map(|&v| v as u8));
        }
        (n, true) => {
            out.push(Opcode::LiteralN as u8);
            out.push((2 * n) as u8);
            for &v in values {
                out.extend(v.to_le_bytes());
            }
        }
    }

    Ok(out)
}

fn imbalance(message: String, span: Span) -> CompileError {
    CompileError::StackImbalance {
        message,
        line: span.line,
        col: span.col,
    }
}

/// Check that every body of code leaves the interpreter stack where it found
/// it: never below zero, and exactly empty at `quit`, `return`, and each
/// subroutine boundary.
///
/// NOTE: the scan is linear through fall-through order and does not follow
/// jumps, so code whose two branches push different amounts can be reported
/// as imbalanced even when only one branch runs.
fn check_stack_balance(statements: &[Statement]) -> Result<(), CompileError> {
    let mut depth: isize = 0;
    let mut last_span = Span { line: 0, col: 0 };

    for statement in statements {
        let span = statement.span();
        last_span = span;

        match statement {
            Statement::Push { values, .. } => depth += values.len() as isize,
            Statement::Instruction {
                opcode, operands, ..
            } => {
                depth += operands.len() as isize;
                let (pops, pushes) = opcode.stack_effect();
                let mnemonic = opcode.mnemonic().unwrap_or("instruction");
                if depth < pops as isize {
                    return Err(imbalance(
                        format!(
                            "{} needs {} stack value{} but only {} {} available",
                            mnemonic,
                            pops,
                            if pops == 1 { "" } else { "s" },
                            depth,
                            if depth == 1 { "is" } else { "are" },
                        ),
                        span,
                    ));
                }
                depth += pushes as isize - pops as isize;
                if matches!(opcode, Opcode::Quit | Opcode::Return) && depth != 0 {
                    return Err(imbalance(
                        format!("the stack holds {} leftover values at {}", depth, mnemonic),
                        span,
                    ));
                }
            }
            Statement::Jump {
                conditional: true, ..
            } => {
                if depth < 1 {
                    return Err(imbalance(
                        "conditional jump needs a stack value for its condition".to_string(),
                        span,
                    ));
                }
                depth -= 1;
            }
            Statement::Jump { .. } | Statement::CallSub { .. } | Statement::LabelDef { .. } => {}
            Statement::SubDef { name, .. } => {
                if depth != 0 {
                    return Err(imbalance(
                        format!(
                            "the stack holds {} values where subroutine '{}' begins",
                            depth, name
                        ),
                        span,
                    ));
                }
            }
        }
    }

    if depth != 0 {
        return Err(imbalance(
            format!("the stack holds {} values at the end of the script", depth),
            last_span,
        ));
    }

    Ok(())
}

/// Generate bytecode for a resolved program.
///
/// Label and subroutine addresses only become known as code is laid out, so
/// jumps and two-byte calls emit a placeholder address that is patched once
/// the whole program has been measured.
pub fn emit(program: ResolvedProgram) -> Result<BytecodeImage, CompileError> {
    check_stack_balance(&program.statements)?;

    let family = program.family;
    let limit = family.stack_size();

    let mut bytes: Vec<u8> = Vec::new();
    let mut offsets: HashMap<&str, u16> = HashMap::new();
    let mut fixups: Vec<(usize, &str)> = Vec::new();

    for statement in &program.statements {
        match statement {
            Statement::Push { values, span } => {
                bytes.extend(literal_run(values, limit, *span)?);
            }
            Statement::Instruction {
                opcode,
                operands,
                span,
            } => {
                if !operands.is_empty() {
                    bytes.extend(literal_run(operands, limit, *span)?);
                }
                bytes.push(*opcode as u8);
            }
            Statement::CallSub { name, span } => {
                let number = program.subroutine_number(name).ok_or_else(|| {
                    CompileError::UnresolvedSymbol {
                        name: name.clone(),
                        line: span.line,
                        col: span.col,
                    }
                })?;
                let command = FIRST_CALL_COMMAND as usize + number;
                if command <= 255 {
                    bytes.push(command as u8);
                } else {
                    bytes.push(Opcode::Call as u8);
                    fixups.push((bytes.len(), name.as_str()));
                    bytes.extend([0, 0]);
                }
            }
            Statement::Jump {
                target,
                conditional,
                ..
            } => {
                let opcode = if *conditional { Opcode::JumpZ } else { Opcode::Jump };
                bytes.push(opcode as u8);
                fixups.push((bytes.len(), target.as_str()));
                bytes.extend([0, 0]);
            }
            Statement::LabelDef { name, .. } | Statement::SubDef { name, .. } => {
                offsets.insert(name.as_str(), bytes.len() as u16);
            }
        }
    }

    for (at, name) in fixups {
        let target = symbol_offset(&offsets, name)?;
        bytes[at..at + 2].copy_from_slice(&target.to_le_bytes());
    }

    if bytes.len() > family.script_capacity() {
        return Err(CompileError::ProgramTooLarge {
            len: bytes.len(),
            capacity: family.script_capacity(),
        });
    }

    let mut subroutines = Vec::with_capacity(program.subroutines.len());
    for (number, name) in program.subroutines.iter().enumerate() {
        let command = FIRST_CALL_COMMAND as usize + number;
        subroutines.push(SubroutineEntry {
            name: name.clone(),
            command: if command <= 255 { Some(command as u8) } else { None },
            offset: symbol_offset(&offsets, name)?,
        });
    }

    Ok(BytecodeImage {
        bytes,
        subroutines,
        family,
    })
}

fn symbol_offset(offsets: &HashMap<&str, u16>, name: &str) -> Result<u16, CompileError> {
    offsets
        .get(name)
        .copied()
        .ok_or_else(|| CompileError::UnresolvedSymbol {
            name: name.to_string(),
            line: 0,
            col: 0,
        })
}
