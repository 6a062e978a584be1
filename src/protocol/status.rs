use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian};

bitflags! {
    /// Error bits the firmware accumulates in its status variables. Reading
    /// them does not clear them; that takes an explicit clear-errors request.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ErrorFlags: u16 {
        const SERIAL_SIGNAL          = 1 << 0;
        const SERIAL_OVERRUN         = 1 << 1;
        const SERIAL_BUFFER_FULL     = 1 << 2;
        const SERIAL_CRC             = 1 << 3;
        const SERIAL_PROTOCOL        = 1 << 4;
        const SERIAL_TIMEOUT         = 1 << 5;
        const SCRIPT_STACK           = 1 << 6;
        const SCRIPT_CALL_STACK      = 1 << 7;
        const SCRIPT_PROGRAM_COUNTER = 1 << 8;
    }
}

impl ErrorFlags {
    /// Decode the u16 error field, dropping bits the firmware does not
    /// define.
    pub fn decode(raw: u16) -> ErrorFlags {
        ErrorFlags::from_bits_truncate(raw)
    }
}

/// Per-channel state as the firmware packs it: three little-endian u16
/// values and one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServoStatus {
    /// Current pulse width in quarter-microseconds.
    pub position: u16,
    /// Commanded pulse width in quarter-microseconds.
    pub target: u16,
    pub speed: u16,
    pub acceleration: u8,
}

impl ServoStatus {
    /// Packed size on the wire.
    pub const LEN: usize = 7;

    pub fn decode(data: &[u8]) -> ServoStatus {
        ServoStatus {
            position: LittleEndian::read_u16(&data[0..2]),
            target: LittleEndian::read_u16(&data[2..4]),
            speed: LittleEndian::read_u16(&data[4..6]),
            acceleration: data[6],
        }
    }

    /// Whether the channel is still slewing toward its target.
    pub fn moving(&self) -> bool {
        self.position != self.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_bit_decodes_to_one_flag() {
        assert_eq!(ErrorFlags::decode(0x0004), ErrorFlags::SERIAL_BUFFER_FULL);
    }

    #[test]
    fn test_combined_flags() {
        let flags = ErrorFlags::decode(0x0041);
        assert!(flags.contains(ErrorFlags::SERIAL_SIGNAL));
        assert!(flags.contains(ErrorFlags::SCRIPT_STACK));
        assert!(!flags.contains(ErrorFlags::SERIAL_CRC));
    }

    #[test]
    fn test_undefined_bits_dropped() {
        assert_eq!(ErrorFlags::decode(0xFE00), ErrorFlags::empty());
        assert_eq!(ErrorFlags::decode(0x0100), ErrorFlags::SCRIPT_PROGRAM_COUNTER);
    }

    #[test]
    fn test_servo_status_decode() {
        let status = ServoStatus::decode(&[0x28, 0x23, 0x40, 0x1F, 0x0A, 0x00, 3]);
        assert_eq!(status.position, 9000);
        assert_eq!(status.target, 8000);
        assert_eq!(status.speed, 10);
        assert_eq!(status.acceleration, 3);
        assert!(status.moving());
    }

    #[test]
    fn test_settled_servo_is_not_moving() {
        let status = ServoStatus::decode(&[0x40, 0x1F, 0x40, 0x1F, 0, 0, 0]);
        assert!(!status.moving());
    }
}
