//! Host-side driver for the Pololu Micro/Mini Maestro USB servo controllers.
//!
//! The crate has two halves:
//!
//! - [`script`]: a compiler for the Maestro scripting language. Source text
//!   goes through a lexer, a concatenative-style parser, two-pass symbol
//!   resolution, and a bytecode emitter that produces a [`BytecodeImage`]
//!   sized for the device's script memory.
//! - [`protocol`] and [`device`]: the USB control-transfer command set and a
//!   [`DeviceSession`] that owns one connection, uploads compiled images in
//!   16-byte chunks, and starts/stops script execution at named subroutines.
//!
//! USB enumeration and driver binding are not handled here; callers supply
//! anything that implements [`ControlTransport`].
//!
//! ```
//! use maestro_usc::{compile, DeviceFamily};
//!
//! let image = compile("sub main:\n  9000 0 servo\n  quit\n", DeviceFamily::Micro6)?;
//! assert_eq!(image.subroutine_offset("main"), Some(0));
//! # Ok::<(), maestro_usc::CompileError>(())
//! ```

pub mod device;
pub mod protocol;
pub mod script;

pub use device::{
    ControlTransport, DeviceDescriptor, DeviceError, DeviceFamily, DeviceSession, SessionState,
    TransportError,
};
pub use protocol::{Command, ErrorFlags, Response, ServoStatus};
pub use script::{compile, listing, BytecodeImage, CompileError};
