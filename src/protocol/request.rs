use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};

use crate::device::transport::{ControlTransport, TransportError};
use crate::protocol::status::{ErrorFlags, ServoStatus};
use crate::DeviceFamily;

/// Vendor request codes the firmware understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestCode {
    GetParameter = 0x81,
    SetParameter = 0x82,
    GetVariables = 0x83,
    SetServoVariable = 0x84,
    SetTarget = 0x85,
    ClearErrors = 0x86,
    GetServoSettings = 0x87,
    GetStack = 0x88,
    GetCallStack = 0x89,
    SetPwm = 0x8A,
    Reinitialize = 0x90,
    EraseScript = 0xA0,
    WriteScript = 0xA1,
    SetScriptDone = 0xA2,
    RestartScriptAtSubroutine = 0xA3,
    RestartScriptAtSubroutineWithParameter = 0xA4,
    RestartScript = 0xA5,
    StartBootloader = 0xFF,
}

/// bmRequestType for vendor requests, host to device.
pub const VENDOR_WRITE: u8 = 0x40;
/// bmRequestType for vendor requests, device to host.
pub const VENDOR_READ: u8 = 0xC0;
/// bmRequestType for standard device requests, device to host.
pub const STANDARD_READ: u8 = 0x80;
/// Standard GET_DESCRIPTOR request, used for the firmware version.
pub const GET_DESCRIPTOR: u8 = 6;

/// Firmware settings addressable through get/set-parameter. Only the ones
/// the driver itself needs are listed; the full settings space is the
/// configurator's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Parameter {
    Initialized = 0,
    ScriptCrc = 22,
    ScriptDone = 24,
}

impl Parameter {
    /// Width of the parameter in device memory.
    pub fn width(self) -> u16 {
        match self {
            Parameter::ScriptCrc => 2,
            Parameter::Initialized | Parameter::ScriptDone => 1,
        }
    }
}

/// Argument to the set-script-done request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ScriptDone {
    /// Resume the interpreter.
    Go = 0,
    /// Halt the interpreter.
    Stop = 1,
    /// Execute a single instruction, then halt.
    Step = 2,
}

/// One fully-encoded control transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub data: Vec<u8>,
    /// Expected response length; zero marks a host-to-device request.
    pub response_len: usize,
}

/// Every operation the driver issues, in typed form. [`Command::encode`]
/// maps a command onto the wire and [`Command::decode`] interprets the
/// raw response, so the pairing of value/index layouts with their response
/// shapes lives in one place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetTarget { channel: u8, target: u16 },
    SetSpeed { channel: u8, speed: u16 },
    SetAcceleration { channel: u8, acceleration: u8 },
    SetPwm { duty_cycle: u16, period: u16 },
    GetServoStatuses { family: DeviceFamily },
    GetErrors { family: DeviceFamily },
    ClearErrors,
    GetParameter { parameter: Parameter },
    SetParameter { parameter: Parameter, value: u16 },
    GetFirmwareVersion,
    Reinitialize,
    EraseScript,
    WriteScriptBlock { block: u16, data: [u8; 16] },
    SetScriptDone { mode: ScriptDone },
    RestartScriptAtSubroutine { subroutine: u16 },
    RestartScriptAtSubroutineWithParameter { subroutine: u16, parameter: u16 },
    RestartScript,
    StartBootloader,
}

fn write(request: RequestCode, value: u16, index: u16) -> ControlRequest {
    ControlRequest {
        request_type: VENDOR_WRITE,
        request: request as u8,
        value,
        index,
        data: Vec::new(),
        response_len: 0,
    }
}

fn read(request: RequestCode, value: u16, index: u16, response_len: usize) -> ControlRequest {
    ControlRequest {
        request_type: VENDOR_READ,
        request: request as u8,
        value,
        index,
        data: Vec::new(),
        response_len,
    }
}

impl Command {
    pub fn encode(&self) -> ControlRequest {
        match *self {
            Command::SetTarget { channel, target } => {
                write(RequestCode::SetTarget, target, channel as u16)
            }
            Command::SetSpeed { channel, speed } => {
                write(RequestCode::SetServoVariable, speed, channel as u16)
            }
            Command::SetAcceleration {
                channel,
                acceleration,
            } => {
                // Bit 7 of the index selects acceleration over speed.
                write(
                    RequestCode::SetServoVariable,
                    acceleration as u16,
                    channel as u16 | 0x80,
                )
            }
            Command::SetPwm { duty_cycle, period } => {
                write(RequestCode::SetPwm, duty_cycle, period)
            }
            Command::GetServoStatuses { family } => {
                if family.is_mini() {
                    read(
                        RequestCode::GetServoSettings,
                        0,
                        0,
                        family.channels() as usize * ServoStatus::LEN,
                    )
                } else {
                    // The Micro has no separate servo-settings request; its
                    // statuses trail the variables block.
                    read(
                        RequestCode::GetVariables,
                        0,
                        0,
                        family.variables_len() + family.channels() as usize * ServoStatus::LEN,
                    )
                }
            }
            Command::GetErrors { family } => {
                read(RequestCode::GetVariables, 0, 0, family.variables_len())
            }
            Command::ClearErrors => write(RequestCode::ClearErrors, 0, 0),
            Command::GetParameter { parameter } => read(
                RequestCode::GetParameter,
                0,
                parameter as u16,
                parameter.width() as usize,
            ),
            Command::SetParameter { parameter, value } => write(
                RequestCode::SetParameter,
                value,
                parameter.width() << 8 | parameter as u16,
            ),
            Command::GetFirmwareVersion => ControlRequest {
                request_type: STANDARD_READ,
                request: GET_DESCRIPTOR,
                value: 0x0100,
                index: 0,
                data: Vec::new(),
                response_len: 18,
            },
            Command::Reinitialize => write(RequestCode::Reinitialize, 0, 0),
            Command::EraseScript => write(RequestCode::EraseScript, 0, 0),
            Command::WriteScriptBlock { block, data } => ControlRequest {
                request_type: VENDOR_WRITE,
                request: RequestCode::WriteScript as u8,
                value: 0,
                index: block,
                data: data.to_vec(),
                response_len: 0,
            },
            Command::SetScriptDone { mode } => {
                write(RequestCode::SetScriptDone, mode as u16, 0)
            }
            Command::RestartScriptAtSubroutine { subroutine } => {
                write(RequestCode::RestartScriptAtSubroutine, subroutine, 0)
            }
            Command::RestartScriptAtSubroutineWithParameter {
                subroutine,
                parameter,
            } => write(
                RequestCode::RestartScriptAtSubroutineWithParameter,
                parameter,
                subroutine,
            ),
            Command::RestartScript => write(RequestCode::RestartScript, 0, 0),
            Command::StartBootloader => write(RequestCode::StartBootloader, 0, 0),
        }
    }

    pub fn decode(&self, data: &[u8]) -> Result<Response, TransportError> {
        let expected = self.encode().response_len;
        if data.len() != expected {
            return Err(TransportError::MalformedResponse {
                expected,
                actual: data.len(),
            });
        }

        Ok(match *self {
            Command::GetServoStatuses { family } => {
                let start = if family.is_mini() { 0 } else { family.variables_len() };
                let statuses = data[start..]
                    .chunks_exact(ServoStatus::LEN)
                    .map(ServoStatus::decode)
                    .collect();
                Response::ServoStatuses(statuses)
            }
            Command::GetErrors { .. } => {
                // The error field sits at byte offset 2 of the variables
                // block on every family.
                Response::Errors(ErrorFlags::decode(LittleEndian::read_u16(&data[2..4])))
            }
            Command::GetParameter { parameter } => Response::Parameter(match parameter.width() {
                1 => data[0] as u16,
                _ => LittleEndian::read_u16(&data[0..2]),
            }),
            Command::GetFirmwareVersion => Response::FirmwareVersion {
                minor: bcd(data[12]),
                major: bcd(data[13]),
            },
            _ => Response::None,
        })
    }
}

/// Decoded response to a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    None,
    ServoStatuses(Vec<ServoStatus>),
    Errors(ErrorFlags),
    Parameter(u16),
    FirmwareVersion { major: u8, minor: u8 },
}

fn bcd(byte: u8) -> u8 {
    (byte & 0xF) + (byte >> 4 & 0xF) * 10
}

/// Issue one command over the transport and decode its response.
pub fn execute<T: ControlTransport>(
    transport: &mut T,
    command: &Command,
    timeout: Duration,
) -> Result<Response, TransportError> {
    let request = command.encode();
    tracing::trace!(
        request = request.request,
        value = request.value,
        index = request.index,
        response_len = request.response_len,
        "control transfer"
    );

    if request.response_len == 0 {
        transport.control_write(
            request.request_type,
            request.request,
            request.value,
            request.index,
            &request.data,
            timeout,
        )?;
        Ok(Response::None)
    } else {
        let data = transport.control_read(
            request.request_type,
            request.request,
            request.value,
            request.index,
            request.response_len,
            timeout,
        )?;
        command.decode(&data)
    }
}
