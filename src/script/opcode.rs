use serde::{Deserialize, Serialize};

/// Bytecode operations understood by the Maestro script interpreter.
///
/// Discriminants are the wire encoding. `Literal` through `Literal8N` are
/// emitted by the compiler for number pushes and never appear as mnemonics
/// in source. Opcodes at `Pwm` and above exist only on the Mini family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    Quit = 0,
    Literal = 1,
    Literal8 = 2,
    LiteralN = 3,
    Literal8N = 4,
    Return = 5,
    Jump = 6,
    JumpZ = 7,
    Delay = 8,
    GetMs = 9,
    Depth = 10,
    Drop = 11,
    Dup = 12,
    Over = 13,
    Pick = 14,
    Swap = 15,
    Rot = 16,
    Roll = 17,
    BitwiseNot = 18,
    BitwiseAnd = 19,
    BitwiseOr = 20,
    BitwiseXor = 21,
    ShiftRight = 22,
    ShiftLeft = 23,
    LogicalNot = 24,
    LogicalAnd = 25,
    LogicalOr = 26,
    Negate = 27,
    Plus = 28,
    Minus = 29,
    Times = 30,
    Divide = 31,
    Mod = 32,
    Positive = 33,
    Negative = 34,
    Nonzero = 35,
    Equals = 36,
    NotEquals = 37,
    Min = 38,
    Max = 39,
    LessThan = 40,
    GreaterThan = 41,
    Servo = 42,
    Servo8Bit = 43,
    Speed = 44,
    Acceleration = 45,
    GetPosition = 46,
    GetMovingState = 47,
    LedOn = 48,
    LedOff = 49,
    Pwm = 50,
    Peek = 51,
    Poke = 52,
    SerialSendByte = 53,
    Call = 54,
}

impl Opcode {
    /// Source mnemonic, or `None` for compiler-internal opcodes.
    pub fn mnemonic(self) -> Option<&'static str> {
        Some(match self {
            Opcode::Quit => "quit",
            Opcode::Literal
            | Opcode::Literal8
            | Opcode::LiteralN
            | Opcode::Literal8N
            | Opcode::Jump
            | Opcode::JumpZ
            | Opcode::Call => return None,
            Opcode::Return => "return",
            Opcode::Delay => "delay",
            Opcode::GetMs => "get_ms",
            Opcode::Depth => "depth",
            Opcode::Drop => "drop",
            Opcode::Dup => "dup",
            Opcode::Over => "over",
            Opcode::Pick => "pick",
            Opcode::Swap => "swap",
            Opcode::Rot => "rot",
            Opcode::Roll => "roll",
            Opcode::BitwiseNot => "bitwise_not",
            Opcode::BitwiseAnd => "bitwise_and",
            Opcode::BitwiseOr => "bitwise_or",
            Opcode::BitwiseXor => "bitwise_xor",
            Opcode::ShiftRight => "shift_right",
            Opcode::ShiftLeft => "shift_left",
            Opcode::LogicalNot => "logical_not",
            Opcode::LogicalAnd => "logical_and",
            Opcode::LogicalOr => "logical_or",
            Opcode::Negate => "negate",
            Opcode::Plus => "plus",
            Opcode::Minus => "minus",
            Opcode::Times => "times",
            Opcode::Divide => "divide",
            Opcode::Mod => "mod",
            Opcode::Positive => "positive",
            Opcode::Negative => "negative",
            Opcode::Nonzero => "nonzero",
            Opcode::Equals => "equals",
            Opcode::NotEquals => "not_equals",
            Opcode::Min => "min",
            Opcode::Max => "max",
            Opcode::LessThan => "less_than",
            Opcode::GreaterThan => "greater_than",
            Opcode::Servo => "servo",
            Opcode::Servo8Bit => "servo_8bit",
            Opcode::Speed => "speed",
            Opcode::Acceleration => "acceleration",
            Opcode::GetPosition => "get_position",
            Opcode::GetMovingState => "get_moving_state",
            Opcode::LedOn => "led_on",
            Opcode::LedOff => "led_off",
            Opcode::Pwm => "pwm",
            Opcode::Peek => "peek",
            Opcode::Poke => "poke",
            Opcode::SerialSendByte => "serial_send_byte",
        })
    }

    /// Look up an opcode by its (lowercased) source mnemonic.
    pub fn from_mnemonic(name: &str) -> Option<Opcode> {
        ALL.iter().copied().find(|op| op.mnemonic() == Some(name))
    }

    /// Look up an opcode by its wire byte.
    pub fn from_byte(byte: u8) -> Option<Opcode> {
        ALL.iter().copied().find(|&op| op as u8 == byte)
    }

    /// Stack effect as (pops, pushes).
    pub fn stack_effect(self) -> (usize, usize) {
        match self {
            Opcode::Quit | Opcode::Return | Opcode::Jump => (0, 0),
            Opcode::Literal | Opcode::Literal8 => (0, 1),
            // LiteralN/Literal8N push a variable count; the emitter
            // accounts for them directly rather than through this table.
            Opcode::LiteralN | Opcode::Literal8N => (0, 0),
            Opcode::JumpZ => (1, 0),
            Opcode::Delay => (1, 0),
            Opcode::GetMs | Opcode::Depth => (0, 1),
            Opcode::Drop => (1, 0),
            Opcode::Dup => (1, 2),
            Opcode::Over => (2, 3),
            Opcode::Pick => (1, 1),
            Opcode::Swap => (2, 2),
            Opcode::Rot => (3, 3),
            Opcode::Roll => (1, 0),
            Opcode::BitwiseNot
            | Opcode::LogicalNot
            | Opcode::Negate
            | Opcode::Positive
            | Opcode::Negative
            | Opcode::Nonzero => (1, 1),
            Opcode::BitwiseAnd
            | Opcode::BitwiseOr
            | Opcode::BitwiseXor
            | Opcode::ShiftRight
            | Opcode::ShiftLeft
            | Opcode::LogicalAnd
            | Opcode::LogicalOr
            | Opcode::Plus
            | Opcode::Minus
            | Opcode::Times
            | Opcode::Divide
            | Opcode::Mod
            | Opcode::Equals
            | Opcode::NotEquals
            | Opcode::Min
            | Opcode::Max
            | Opcode::LessThan
            | Opcode::GreaterThan => (2, 1),
            Opcode::Servo | Opcode::Servo8Bit | Opcode::Speed | Opcode::Acceleration => (2, 0),
            Opcode::GetPosition | Opcode::GetMovingState => (1, 1),
            Opcode::LedOn | Opcode::LedOff => (0, 0),
            Opcode::Pwm => (2, 0),
            Opcode::Peek => (1, 1),
            Opcode::Poke => (2, 0),
            Opcode::SerialSendByte => (1, 0),
            Opcode::Call => (0, 0),
        }
    }

    /// Opcodes only implemented by the Mini family's interpreter.
    pub fn mini_only(self) -> bool {
        self as u8 >= Opcode::Pwm as u8
    }
}

const ALL: [Opcode; 55] = [
    Opcode::Quit,
    Opcode::Literal,
    Opcode::Literal8,
    Opcode::LiteralN,
    Opcode::Literal8N,
    Opcode::Return,
    Opcode::Jump,
    Opcode::JumpZ,
    Opcode::Delay,
    Opcode::GetMs,
    Opcode::Depth,
    Opcode::Drop,
    Opcode::Dup,
    Opcode::Over,
    Opcode::Pick,
    Opcode::Swap,
    Opcode::Rot,
    Opcode::Roll,
    Opcode::BitwiseNot,
    Opcode::BitwiseAnd,
    Opcode::BitwiseOr,
    Opcode::BitwiseXor,
    Opcode::ShiftRight,
    Opcode::ShiftLeft,
    Opcode::LogicalNot,
    Opcode::LogicalAnd,
    Opcode::LogicalOr,
    Opcode::Negate,
    Opcode::Plus,
    Opcode::Minus,
    Opcode::Times,
    Opcode::Divide,
    Opcode::Mod,
    Opcode::Positive,
    Opcode::Negative,
    Opcode::Nonzero,
    Opcode::Equals,
    Opcode::NotEquals,
    Opcode::Min,
    Opcode::Max,
    Opcode::LessThan,
    Opcode::GreaterThan,
    Opcode::Servo,
    Opcode::Servo8Bit,
    Opcode::Speed,
    Opcode::Acceleration,
    Opcode::GetPosition,
    Opcode::GetMovingState,
    Opcode::LedOn,
    Opcode::LedOff,
    Opcode::Pwm,
    Opcode::Peek,
    Opcode::Poke,
    Opcode::SerialSendByte,
    Opcode::Call,
];
