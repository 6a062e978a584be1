//! Wire encoding for the Maestro's USB control protocol: the typed command
//! table in [`request`] and response field decoding in [`status`].

pub mod request;
pub mod status;

pub use request::{execute, Command, ControlRequest, Parameter, RequestCode, Response, ScriptDone};
pub use status::{ErrorFlags, ServoStatus};

/// Pulse widths on the wire are quarter-microseconds.
pub fn us_to_quarter_us(us: u16) -> u16 {
    us.saturating_mul(4)
}

pub fn quarter_us_to_us(quarter_us: u16) -> u16 {
    quarter_us / 4
}

/// Largest parameter a subroutine restart can carry; the device clamps
/// pushed values to 14 bits.
pub const MAX_SCRIPT_PARAMETER: u16 = 0x3FFF;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarter_us_conversions() {
        assert_eq!(us_to_quarter_us(1500), 6000);
        assert_eq!(quarter_us_to_us(6000), 1500);
        assert_eq!(us_to_quarter_us(u16::MAX), u16::MAX);
    }
}
