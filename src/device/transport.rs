use std::time::Duration;

use thiserror::Error;

/// Failures at the USB control-transfer layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("control transfer timed out after {0:?}")]
    Timeout(Duration),

    #[error("device reported a fault (code {code})")]
    DeviceFault { code: i32 },

    #[error("malformed response: expected {expected} bytes, got {actual}")]
    MalformedResponse { expected: usize, actual: usize },
}

/// Identity of an attached USB device, checked before a session opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: Option<String>,
}

/// Blocking USB control transfers against one device.
///
/// The crate issues every request through this trait, so sessions can be
/// driven by a real USB stack or by a recording fake in tests. No retries
/// happen at this layer; a timeout surfaces as an error.
pub trait ControlTransport {
    fn control_write(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> Result<(), TransportError>;

    fn control_read(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;
}
