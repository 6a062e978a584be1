use std::fmt::Write;

use crate::script::emitter::BytecodeImage;
use crate::script::opcode::Opcode;
use crate::script::resolver::FIRST_CALL_COMMAND;

/// Render a human-readable listing of a compiled image: one line per
/// instruction with its offset and raw bytes, subroutine entry points marked,
/// and the subroutine command table at the end.
pub fn listing(image: &BytecodeImage) -> String {
    let mut out = String::new();
    let bytes = &image.bytes;
    let mut at = 0usize;

    while at < bytes.len() {
        for sub in &image.subroutines {
            if sub.offset as usize == at {
                let _ = writeln!(out, "{}:", sub.name);
            }
        }

        let size = instruction_size(bytes, at);
        let end = (at + size).min(bytes.len());

        let hex: Vec<String> = bytes[at..end].iter().map(|b| format!("{:02X}", b)).collect();
        let _ = writeln!(
            out,
            "{:04X}  {:<18} {}",
            at,
            hex.join(" "),
            describe(image, bytes, at, end)
        );

        at = end;
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Subroutines:");
    let _ = writeln!(out, "Hex  Decimal  Address  Name");
    for sub in &image.subroutines {
        match sub.command {
            Some(command) => {
                let _ = writeln!(
                    out,
                    "{:02X}   {:<7}  {:04X}     {}",
                    command, command, sub.offset, sub.name
                );
            }
            None => {
                let _ = writeln!(out, "--   --       {:04X}     {}", sub.offset, sub.name);
            }
        }
    }

    out
}

/// Total encoded size of the instruction starting at `at`.
fn instruction_size(bytes: &[u8], at: usize) -> usize {
    let opcode = bytes[at];

    if opcode >= FIRST_CALL_COMMAND as u8 {
        return 1;
    }

    match opcode {
        op if op == Opcode::Literal8 as u8 => 2,
        op if op == Opcode::Literal as u8
            || op == Opcode::Jump as u8
            || op == Opcode::JumpZ as u8
            || op == Opcode::Call as u8 =>
        {
            3
        }
        op if op == Opcode::LiteralN as u8 || op == Opcode::Literal8N as u8 => {
            2 + bytes.get(at + 1).copied().unwrap_or(0) as usize
        }
        _ => 1,
    }
}

fn describe(image: &BytecodeImage, bytes: &[u8], at: usize, end: usize) -> String {
    let opcode = bytes[at];

    if opcode >= FIRST_CALL_COMMAND as u8 {
        let name = image
            .subroutines
            .iter()
            .find(|s| s.command == Some(opcode))
            .map(|s| s.name.as_str())
            .unwrap_or("?");
        return format!("call {}", name);
    }

    let address = |lo: usize| -> u16 {
        let lo_byte = bytes.get(lo).copied().unwrap_or(0) as u16;
        let hi_byte = bytes.get(lo + 1).copied().unwrap_or(0) as u16;
        hi_byte << 8 | lo_byte
    };

    match opcode {
        op if op == Opcode::Literal8 as u8 => {
            format!("literal {}", bytes.get(at + 1).copied().unwrap_or(0))
        }
        op if op == Opcode::Literal as u8 => format!("literal {}", address(at + 1)),
        op if op == Opcode::Literal8N as u8 => {
            let values: Vec<String> = bytes[at + 2..end].iter().map(|b| b.to_string()).collect();
            format!("literal {}", values.join(" "))
        }
        op if op == Opcode::LiteralN as u8 => {
            let values: Vec<String> = bytes[at + 2..end]
                .chunks_exact(2)
                .map(|pair| (u16::from(pair[1]) << 8 | u16::from(pair[0])).to_string())
                .collect();
            format!("literal {}", values.join(" "))
        }
        op if op == Opcode::Jump as u8 => format!("jump {:04X}", address(at + 1)),
        op if op == Opcode::JumpZ as u8 => format!("jump_z {:04X}", address(at + 1)),
        op if op == Opcode::Call as u8 => format!("call {:04X}", address(at + 1)),
        op => match Opcode::from_byte(op) {
            Some(known) => known.mnemonic().unwrap_or("?").to_string(),
            None => format!("db {:02X}", op),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::compile;
    use crate::DeviceFamily;

    #[test]
    fn test_listing_of_canonical_program() {
        let img = compile("sub main:\n  9000 0 servo\n  quit\n", DeviceFamily::Micro6).unwrap();
        let text = listing(&img);

        assert!(text.starts_with("main:\n"));
        assert!(text.contains("0000  03 04 28 23 00 00  literal 9000 0"));
        assert!(text.contains("0006  2A                 servo"));
        assert!(text.contains("0007  00                 quit"));
        assert!(text.contains("Subroutines:"));
        assert!(text.contains("80   128      0000     main"));
    }

    #[test]
    fn test_listing_names_call_targets() {
        let img = compile(
            "sub main:\n  blink\n  quit\nsub blink:\n  return\n",
            DeviceFamily::Micro6,
        )
        .unwrap();
        let text = listing(&img);

        assert!(text.contains("call blink"));
        assert!(text.contains("blink:\n"));
        assert!(text.contains("return"));
    }

    #[test]
    fn test_listing_shows_jump_addresses() {
        let img = compile("goto skip\nskip:\nquit\n", DeviceFamily::Micro6).unwrap();
        let text = listing(&img);

        assert!(text.contains("jump 0003"));
    }
}
