use std::time::Duration;

use thiserror::Error;

use crate::device::family::DeviceFamily;
use crate::device::transport::{ControlTransport, DeviceDescriptor, TransportError};
use crate::protocol::{
    execute, Command, ErrorFlags, Parameter, Response, ScriptDone, ServoStatus,
    MAX_SCRIPT_PARAMETER,
};
use crate::script::BytecodeImage;

/// Faults above the transport layer. Device-side error flags are not here:
/// they are status data, returned by [`DeviceSession::get_errors`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("channel {channel} is out of range: the {family} has {channels} channels")]
    ChannelOutOfRange {
        channel: u8,
        family: DeviceFamily,
        channels: u8,
    },

    #[error("the loaded script has no subroutine named '{0}'")]
    UnknownSubroutine(String),

    #[error("subroutine '{0}' has no call command slot and cannot be started directly")]
    SubroutineNotAddressable(String),

    #[error("upload verification failed: wrote CRC {expected:#06x}, device reports {actual:#06x}")]
    UploadVerification { expected: u16, actual: u16 },

    #[error("no script has been loaded in this session")]
    NoScriptLoaded,

    #[error("parameter {value} does not fit in 14 bits")]
    ParameterOutOfRange { value: u16 },

    #[error("script was compiled for the {image} but the device is a {device}")]
    FamilyMismatch {
        image: DeviceFamily,
        device: DeviceFamily,
    },

    #[error("PWM output requires a Mini Maestro")]
    PwmUnsupported,

    #[error("device {vendor_id:04x}:{product_id:04x} is not a recognized Maestro")]
    UnsupportedDevice { vendor_id: u16, product_id: u16 },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Where the session stands in its script lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    ScriptLoaded,
    Running,
    Stopped,
}

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Script memory is addressed in 16-byte write blocks.
const BLOCK_LEN: usize = 16;

/// A connected Maestro. All requests go through the owned transport;
/// dropping the session is the disconnect.
pub struct DeviceSession<T> {
    transport: T,
    family: DeviceFamily,
    timeout: Duration,
    state: SessionState,
    script: Option<BytecodeImage>,
    firmware: (u8, u8),
    errors: ErrorFlags,
}

impl<T: ControlTransport> DeviceSession<T> {
    /// Open a session: validate that the descriptor is a known Maestro, then
    /// read the firmware version as the capability handshake. On any failure
    /// no session exists.
    pub fn open(mut transport: T, descriptor: &DeviceDescriptor) -> Result<Self, DeviceError> {
        let family = (descriptor.vendor_id == DeviceFamily::VENDOR_ID)
            .then(|| DeviceFamily::from_product_id(descriptor.product_id))
            .flatten()
            .ok_or(DeviceError::UnsupportedDevice {
                vendor_id: descriptor.vendor_id,
                product_id: descriptor.product_id,
            })?;

        let firmware = match execute(&mut transport, &Command::GetFirmwareVersion, DEFAULT_TIMEOUT)?
        {
            Response::FirmwareVersion { major, minor } => (major, minor),
            _ => (0, 0),
        };

        tracing::info!(
            family = %family,
            firmware = format_args!("{}.{:02}", firmware.0, firmware.1),
            "session opened"
        );

        Ok(DeviceSession {
            transport,
            family,
            timeout: DEFAULT_TIMEOUT,
            state: SessionState::Connected,
            script: None,
            firmware,
            errors: ErrorFlags::empty(),
        })
    }

    pub fn family(&self) -> DeviceFamily {
        self.family
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Firmware version from the open handshake, as (major, minor).
    pub fn firmware_version(&self) -> (u8, u8) {
        self.firmware
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Error flags from the most recent [`get_errors`](Self::get_errors)
    /// refresh.
    pub fn last_errors(&self) -> ErrorFlags {
        self.errors
    }

    fn run(&mut self, command: &Command) -> Result<Response, TransportError> {
        execute(&mut self.transport, command, self.timeout)
    }

    fn check_channel(&self, channel: u8) -> Result<(), DeviceError> {
        if channel >= self.family.channels() {
            return Err(DeviceError::ChannelOutOfRange {
                channel,
                family: self.family,
                channels: self.family.channels(),
            });
        }
        Ok(())
    }

    // ==== servo control ====

    /// Command a channel to a pulse width in quarter-microseconds. Zero
    /// turns the channel off.
    pub fn set_target(&mut self, channel: u8, target: u16) -> Result<(), DeviceError> {
        self.check_channel(channel)?;
        self.run(&Command::SetTarget { channel, target })?;
        Ok(())
    }

    pub fn set_speed(&mut self, channel: u8, speed: u16) -> Result<(), DeviceError> {
        self.check_channel(channel)?;
        self.run(&Command::SetSpeed { channel, speed })?;
        Ok(())
    }

    pub fn set_acceleration(&mut self, channel: u8, acceleration: u8) -> Result<(), DeviceError> {
        self.check_channel(channel)?;
        self.run(&Command::SetAcceleration {
            channel,
            acceleration,
        })?;
        Ok(())
    }

    pub fn set_pwm(&mut self, duty_cycle: u16, period: u16) -> Result<(), DeviceError> {
        if !self.family.is_mini() {
            return Err(DeviceError::PwmUnsupported);
        }
        self.run(&Command::SetPwm { duty_cycle, period })?;
        Ok(())
    }

    /// Position, target, speed, and acceleration of every channel.
    pub fn get_servo_statuses(&mut self) -> Result<Vec<ServoStatus>, DeviceError> {
        match self.run(&Command::GetServoStatuses {
            family: self.family,
        })? {
            Response::ServoStatuses(statuses) => Ok(statuses),
            _ => Err(TransportError::MalformedResponse {
                expected: self.family.channels() as usize * ServoStatus::LEN,
                actual: 0,
            }
            .into()),
        }
    }

    /// Whether any channel is still slewing toward its target.
    pub fn get_moving_state(&mut self) -> Result<bool, DeviceError> {
        Ok(self.get_servo_statuses()?.iter().any(ServoStatus::moving))
    }

    // ==== device status ====

    /// Refresh and return the device's error flags. The snapshot is also
    /// kept on the session, see [`last_errors`](Self::last_errors).
    pub fn get_errors(&mut self) -> Result<ErrorFlags, DeviceError> {
        match self.run(&Command::GetErrors {
            family: self.family,
        })? {
            Response::Errors(flags) => {
                self.errors = flags;
                Ok(flags)
            }
            _ => Err(TransportError::MalformedResponse {
                expected: self.family.variables_len(),
                actual: 0,
            }
            .into()),
        }
    }

    pub fn clear_errors(&mut self) -> Result<(), DeviceError> {
        self.run(&Command::ClearErrors)?;
        self.errors = ErrorFlags::empty();
        Ok(())
    }

    /// Reload settings from flash and return every channel to its startup
    /// state.
    pub fn reinitialize(&mut self) -> Result<(), DeviceError> {
        self.run(&Command::Reinitialize)?;
        Ok(())
    }

    // ==== script lifecycle ====

    /// Upload a compiled image: halt the interpreter, erase script memory,
    /// write the subroutine address table and the bytecode in 16-byte
    /// blocks, then store the image CRC and read it back. A CRC mismatch
    /// leaves the session without a loaded script.
    pub fn load_script(&mut self, image: &BytecodeImage) -> Result<(), DeviceError> {
        if image.family != self.family {
            return Err(DeviceError::FamilyMismatch {
                image: image.family,
                device: self.family,
            });
        }

        self.run(&Command::SetScriptDone {
            mode: ScriptDone::Stop,
        })?;
        self.run(&Command::EraseScript)?;

        let table = image.subroutine_table();
        let base = self.family.subroutine_block_offset();
        for (i, chunk) in table.chunks(BLOCK_LEN).enumerate() {
            let mut data = [0u8; BLOCK_LEN];
            data.copy_from_slice(chunk);
            self.run(&Command::WriteScriptBlock {
                block: base + i as u16,
                data,
            })?;
        }

        // A script shorter than memory gets a trailing QUIT so the program
        // counter cannot run into stale bytes.
        let mut code = image.bytes.clone();
        if code.len() < self.family.script_capacity() {
            code.push(0);
        }
        for (i, chunk) in code.chunks(BLOCK_LEN).enumerate() {
            let mut data = [0xFF; BLOCK_LEN];
            data[..chunk.len()].copy_from_slice(chunk);
            self.run(&Command::WriteScriptBlock {
                block: i as u16,
                data,
            })?;
        }

        let expected = image.crc();
        self.run(&Command::SetParameter {
            parameter: Parameter::ScriptCrc,
            value: expected,
        })?;

        let actual = match self.run(&Command::GetParameter {
            parameter: Parameter::ScriptCrc,
        })? {
            Response::Parameter(value) => value,
            _ => 0,
        };
        if actual != expected {
            return Err(DeviceError::UploadVerification { expected, actual });
        }

        tracing::info!(bytes = image.len(), crc = expected, "script loaded");
        self.script = Some(image.clone());
        self.state = SessionState::ScriptLoaded;
        Ok(())
    }

    fn subroutine_number(&self, name: &str) -> Result<u16, DeviceError> {
        let script = self.script.as_ref().ok_or(DeviceError::NoScriptLoaded)?;
        let number = script
            .subroutine_number(name)
            .ok_or_else(|| DeviceError::UnknownSubroutine(name.to_string()))?;
        // Subroutines past the one-byte command slots have no table entry
        // for the firmware to look up.
        if script.subroutines[number].command.is_none() {
            return Err(DeviceError::SubroutineNotAddressable(name.to_string()));
        }
        Ok(number as u16)
    }

    /// Reset the interpreter to the named subroutine's entry point and start
    /// it.
    pub fn run_subroutine(&mut self, name: &str) -> Result<(), DeviceError> {
        let subroutine = self.subroutine_number(name)?;
        self.run(&Command::RestartScriptAtSubroutine { subroutine })?;
        self.run(&Command::SetScriptDone {
            mode: ScriptDone::Go,
        })?;
        self.state = SessionState::Running;
        Ok(())
    }

    /// Like [`run_subroutine`](Self::run_subroutine), with one value pushed
    /// on the interpreter stack first.
    pub fn run_subroutine_with_parameter(
        &mut self,
        name: &str,
        parameter: u16,
    ) -> Result<(), DeviceError> {
        if parameter > MAX_SCRIPT_PARAMETER {
            return Err(DeviceError::ParameterOutOfRange { value: parameter });
        }
        let subroutine = self.subroutine_number(name)?;
        self.run(&Command::RestartScriptAtSubroutineWithParameter {
            subroutine,
            parameter,
        })?;
        self.run(&Command::SetScriptDone {
            mode: ScriptDone::Go,
        })?;
        self.state = SessionState::Running;
        Ok(())
    }

    /// Restart the loaded script from the top and run it.
    pub fn restart_script(&mut self) -> Result<(), DeviceError> {
        if self.script.is_none() {
            return Err(DeviceError::NoScriptLoaded);
        }
        self.run(&Command::RestartScript)?;
        self.run(&Command::SetScriptDone {
            mode: ScriptDone::Go,
        })?;
        self.state = SessionState::Running;
        Ok(())
    }

    /// Halt the interpreter where it stands.
    pub fn stop_script(&mut self) -> Result<(), DeviceError> {
        if self.script.is_none() {
            return Err(DeviceError::NoScriptLoaded);
        }
        self.run(&Command::SetScriptDone {
            mode: ScriptDone::Stop,
        })?;
        self.state = SessionState::Stopped;
        Ok(())
    }

    /// Hand the device over to its bootloader. The device re-enumerates, so
    /// the session is consumed.
    pub fn start_bootloader(mut self) -> Result<(), DeviceError> {
        self.run(&Command::StartBootloader)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::compile;
    use std::collections::VecDeque;
    use pretty_assertions::assert_eq;

    struct MockTransport {
        writes: Vec<(u8, u16, u16, Vec<u8>)>,
        reads: VecDeque<Vec<u8>>,
    }

    impl MockTransport {
        fn new() -> Self {
            MockTransport {
                writes: Vec::new(),
                reads: VecDeque::new(),
            }
        }

        fn queue_read(&mut self, data: Vec<u8>) {
            self.reads.push_back(data);
        }

        fn queue_firmware(&mut self, major: u8, minor: u8) {
            let mut descriptor = vec![0u8; 18];
            descriptor[12] = (minor / 10) << 4 | minor % 10;
            descriptor[13] = (major / 10) << 4 | major % 10;
            self.queue_read(descriptor);
        }
    }

    impl ControlTransport for MockTransport {
        fn control_write(
            &mut self,
            _request_type: u8,
            request: u8,
            value: u16,
            index: u16,
            data: &[u8],
            _timeout: Duration,
        ) -> Result<(), TransportError> {
            self.writes.push((request, value, index, data.to_vec()));
            Ok(())
        }

        fn control_read(
            &mut self,
            _request_type: u8,
            _request: u8,
            _value: u16,
            _index: u16,
            len: usize,
            _timeout: Duration,
        ) -> Result<Vec<u8>, TransportError> {
            self.reads.pop_front().ok_or(TransportError::Timeout(Duration::ZERO)).map(|data| {
                assert_eq!(data.len(), len, "canned response length");
                data
            })
        }
    }

    fn micro_descriptor() -> DeviceDescriptor {
        DeviceDescriptor {
            vendor_id: 0x1ffb,
            product_id: 0x0089,
            serial_number: Some("00001234".to_string()),
        }
    }

    fn open_micro() -> DeviceSession<MockTransport> {
        let mut transport = MockTransport::new();
        transport.queue_firmware(1, 4);
        DeviceSession::open(transport, &micro_descriptor()).unwrap()
    }

    #[test]
    fn test_open_reads_firmware_version() {
        let session = open_micro();
        assert_eq!(session.family(), DeviceFamily::Micro6);
        assert_eq!(session.firmware_version(), (1, 4));
        assert_eq!(session.state(), SessionState::Connected);
    }

    #[test]
    fn test_open_rejects_unknown_device() {
        let err = DeviceSession::open(
            MockTransport::new(),
            &DeviceDescriptor {
                vendor_id: 0x1ffb,
                product_id: 0x0099,
                serial_number: None,
            },
        )
        .err()
        .unwrap();
        assert!(matches!(err, DeviceError::UnsupportedDevice { .. }));

        let err = DeviceSession::open(
            MockTransport::new(),
            &DeviceDescriptor {
                vendor_id: 0x1234,
                product_id: 0x0089,
                serial_number: None,
            },
        )
        .err()
        .unwrap();
        assert!(matches!(err, DeviceError::UnsupportedDevice { .. }));
    }

    #[test]
    fn test_open_fails_when_handshake_times_out() {
        // No canned firmware response queued.
        let err = DeviceSession::open(MockTransport::new(), &micro_descriptor())
            .err()
            .unwrap();
        assert!(matches!(err, DeviceError::Transport(TransportError::Timeout(_))));
    }

    #[test]
    fn test_channel_bounds_checked_before_transfer() {
        let mut session = open_micro();
        let err = session.set_target(6, 6000).unwrap_err();
        assert_eq!(
            err,
            DeviceError::ChannelOutOfRange {
                channel: 6,
                family: DeviceFamily::Micro6,
                channels: 6,
            }
        );
        // Only the handshake hit the wire.
        assert!(session.transport.writes.is_empty());

        session.set_target(5, 6000).unwrap();
        assert_eq!(session.transport.writes.last().unwrap(), &(0x85, 6000, 5, vec![]));
    }

    #[test]
    fn test_pwm_rejected_on_micro() {
        let mut session = open_micro();
        assert_eq!(session.set_pwm(100, 200).unwrap_err(), DeviceError::PwmUnsupported);
    }

    #[test]
    fn test_get_errors_caches_snapshot() {
        let mut session = open_micro();
        let mut variables = vec![0u8; 96];
        variables[2] = 0x04;
        session.transport.queue_read(variables);

        let flags = session.get_errors().unwrap();
        assert_eq!(flags, ErrorFlags::SERIAL_BUFFER_FULL);
        assert_eq!(session.last_errors(), ErrorFlags::SERIAL_BUFFER_FULL);

        session.clear_errors().unwrap();
        assert_eq!(session.last_errors(), ErrorFlags::empty());
    }

    #[test]
    fn test_load_script_write_sequence() {
        let image = compile("sub main:\n  9000 0 servo\n  quit\n", DeviceFamily::Micro6).unwrap();
        let mut session = open_micro();
        session
            .transport
            .queue_read(image.crc().to_le_bytes().to_vec());

        session.load_script(&image).unwrap();
        assert_eq!(session.state(), SessionState::ScriptLoaded);

        let writes = &session.transport.writes;
        // Halt, erase, 16 table blocks, one code block, CRC parameter.
        assert_eq!(writes.len(), 20);
        assert_eq!(writes[0], (0xA2, 1, 0, vec![]));
        assert_eq!(writes[1], (0xA0, 0, 0, vec![]));

        // Table blocks land past the code area; 'main' is command 128 at
        // offset zero, the rest of the table is empty.
        assert_eq!(writes[2].0, 0xA1);
        assert_eq!(writes[2].2, 64);
        let mut first_block = vec![0xFF; 16];
        first_block[0] = 0;
        first_block[1] = 0;
        assert_eq!(writes[2].3, first_block);
        assert_eq!(writes[17].2, 79);
        assert!(writes[3..18].iter().all(|w| w.0 == 0xA1));

        // Code: the eight image bytes, the QUIT pad, then 0xFF fill.
        let mut code_block = vec![3, 4, 0x28, 0x23, 0x00, 0x00, 42, 0, 0];
        code_block.resize(16, 0xFF);
        assert_eq!(writes[18], (0xA1, 0, 0, code_block));

        assert_eq!(writes[19], (0x82, image.crc(), 2 << 8 | 22, vec![]));
    }

    #[test]
    fn test_load_script_verification_mismatch() {
        let image = compile("sub main:\n  quit\n", DeviceFamily::Micro6).unwrap();
        let mut session = open_micro();
        let wrong = image.crc() ^ 0x5555;
        session.transport.queue_read(wrong.to_le_bytes().to_vec());

        let err = session.load_script(&image).unwrap_err();
        assert_eq!(
            err,
            DeviceError::UploadVerification {
                expected: image.crc(),
                actual: wrong,
            }
        );
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.run_subroutine("main").unwrap_err(), DeviceError::NoScriptLoaded);
    }

    #[test]
    fn test_load_script_family_mismatch() {
        let image = compile("quit\n", DeviceFamily::Mini12).unwrap();
        let mut session = open_micro();
        let err = session.load_script(&image).unwrap_err();
        assert!(matches!(err, DeviceError::FamilyMismatch { .. }));
    }

    #[test]
    fn test_run_subroutine_restarts_then_starts() {
        let image = compile("sub main:\n  9000 0 servo\n  quit\n", DeviceFamily::Micro6).unwrap();
        let mut session = open_micro();
        session
            .transport
            .queue_read(image.crc().to_le_bytes().to_vec());
        session.load_script(&image).unwrap();

        session.run_subroutine("main").unwrap();
        assert_eq!(session.state(), SessionState::Running);

        let writes = &session.transport.writes;
        // Restart at subroutine zero, then let the interpreter go.
        assert_eq!(writes[writes.len() - 2], (0xA3, 0, 0, vec![]));
        assert_eq!(writes[writes.len() - 1], (0xA2, 0, 0, vec![]));
    }

    #[test]
    fn test_run_unknown_subroutine() {
        let image = compile("sub main:\n  quit\n", DeviceFamily::Micro6).unwrap();
        let mut session = open_micro();
        session
            .transport
            .queue_read(image.crc().to_le_bytes().to_vec());
        session.load_script(&image).unwrap();

        let before = session.transport.writes.len();
        let err = session.run_subroutine("blink").unwrap_err();
        assert_eq!(err, DeviceError::UnknownSubroutine("blink".to_string()));
        assert_eq!(session.transport.writes.len(), before);
    }

    #[test]
    fn test_run_subroutine_with_parameter() {
        let image = compile(
            "sub wave:\n  100 delay\n  return\nsub main:\n  quit\n",
            DeviceFamily::Micro6,
        )
        .unwrap();

        let mut session = open_micro();
        session
            .transport
            .queue_read(image.crc().to_le_bytes().to_vec());
        session.load_script(&image).unwrap();

        session.run_subroutine_with_parameter("wave", 500).unwrap();
        let writes = &session.transport.writes;
        assert_eq!(writes[writes.len() - 2], (0xA4, 500, 0, vec![]));

        let err = session
            .run_subroutine_with_parameter("wave", 0x4000)
            .unwrap_err();
        assert_eq!(err, DeviceError::ParameterOutOfRange { value: 0x4000 });
    }

    #[test]
    fn test_stop_and_restart() {
        let image = compile("sub main:\n  quit\n", DeviceFamily::Micro6).unwrap();
        let mut session = open_micro();
        session
            .transport
            .queue_read(image.crc().to_le_bytes().to_vec());
        session.load_script(&image).unwrap();

        session.restart_script().unwrap();
        assert_eq!(session.state(), SessionState::Running);

        session.stop_script().unwrap();
        assert_eq!(session.state(), SessionState::Stopped);
        let writes = &session.transport.writes;
        assert_eq!(writes[writes.len() - 1], (0xA2, 1, 0, vec![]));
    }

    #[test]
    fn test_stop_without_script() {
        let mut session = open_micro();
        assert_eq!(session.stop_script().unwrap_err(), DeviceError::NoScriptLoaded);
    }

    #[test]
    fn test_moving_state() {
        let mut session = open_micro();

        let mut data = vec![0u8; 96 + 6 * 7];
        // Channel 2: position 5000, target 6000.
        let at = 96 + 2 * 7;
        data[at..at + 2].copy_from_slice(&5000u16.to_le_bytes());
        data[at + 2..at + 4].copy_from_slice(&6000u16.to_le_bytes());
        session.transport.queue_read(data.clone());
        assert!(session.get_moving_state().unwrap());

        data[at..at + 2].copy_from_slice(&6000u16.to_le_bytes());
        session.transport.queue_read(data);
        assert!(!session.get_moving_state().unwrap());
    }
}
