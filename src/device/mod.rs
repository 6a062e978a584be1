//! Talking to an attached Maestro: family identification, the control
//! transport seam, and the stateful [`DeviceSession`].

pub mod family;
pub mod session;
pub mod transport;

pub use family::DeviceFamily;
pub use session::{DeviceError, DeviceSession, SessionState};
pub use transport::{ControlTransport, DeviceDescriptor, TransportError};
