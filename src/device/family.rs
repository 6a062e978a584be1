use serde::{Deserialize, Serialize};

/// The Maestro model families, distinguished by USB product ID.
///
/// The Micro and the three Minis run different firmware: they differ in
/// channel count, script memory, interpreter stack depth, and which opcodes
/// exist. Everything size-dependent in the crate keys off this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceFamily {
    Micro6,
    Mini12,
    Mini18,
    Mini24,
}

impl DeviceFamily {
    /// Pololu's USB vendor ID.
    pub const VENDOR_ID: u16 = 0x1ffb;

    pub fn from_product_id(product_id: u16) -> Option<DeviceFamily> {
        match product_id {
            0x0089 => Some(DeviceFamily::Micro6),
            0x008a => Some(DeviceFamily::Mini12),
            0x008b => Some(DeviceFamily::Mini18),
            0x008c => Some(DeviceFamily::Mini24),
            _ => None,
        }
    }

    pub fn product_id(self) -> u16 {
        match self {
            DeviceFamily::Micro6 => 0x0089,
            DeviceFamily::Mini12 => 0x008a,
            DeviceFamily::Mini18 => 0x008b,
            DeviceFamily::Mini24 => 0x008c,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DeviceFamily::Micro6 => "Micro Maestro 6",
            DeviceFamily::Mini12 => "Mini Maestro 12",
            DeviceFamily::Mini18 => "Mini Maestro 18",
            DeviceFamily::Mini24 => "Mini Maestro 24",
        }
    }

    pub fn channels(self) -> u8 {
        match self {
            DeviceFamily::Micro6 => 6,
            DeviceFamily::Mini12 => 12,
            DeviceFamily::Mini18 => 18,
            DeviceFamily::Mini24 => 24,
        }
    }

    pub fn is_mini(self) -> bool {
        !matches!(self, DeviceFamily::Micro6)
    }

    /// Script memory in bytes.
    pub fn script_capacity(self) -> usize {
        if self.is_mini() { 8192 } else { 1024 }
    }

    /// Interpreter data stack depth, which also bounds how many literals one
    /// instruction may push.
    pub fn stack_size(self) -> usize {
        if self.is_mini() { 126 } else { 32 }
    }

    pub fn call_stack_size(self) -> usize {
        if self.is_mini() { 126 } else { 10 }
    }

    /// Block number where the subroutine address table starts in script
    /// memory; 16-byte write blocks below this hold bytecode.
    pub fn subroutine_block_offset(self) -> u16 {
        if self.is_mini() { 512 } else { 64 }
    }

    /// Size of the packed status-variables struct the firmware returns.
    pub fn variables_len(self) -> usize {
        if self.is_mini() { 8 } else { 96 }
    }
}

impl std::fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_id_round_trip() {
        for family in [
            DeviceFamily::Micro6,
            DeviceFamily::Mini12,
            DeviceFamily::Mini18,
            DeviceFamily::Mini24,
        ] {
            assert_eq!(DeviceFamily::from_product_id(family.product_id()), Some(family));
        }
        assert_eq!(DeviceFamily::from_product_id(0x0001), None);
    }

    #[test]
    fn test_family_limits() {
        assert_eq!(DeviceFamily::Micro6.script_capacity(), 1024);
        assert_eq!(DeviceFamily::Mini24.script_capacity(), 8192);
        assert_eq!(DeviceFamily::Micro6.stack_size(), 32);
        assert_eq!(DeviceFamily::Mini12.stack_size(), 126);
        assert_eq!(DeviceFamily::Micro6.subroutine_block_offset(), 64);
        assert_eq!(DeviceFamily::Mini18.subroutine_block_offset(), 512);
    }

    #[test]
    fn test_channels() {
        assert_eq!(DeviceFamily::Micro6.channels(), 6);
        assert_eq!(DeviceFamily::Mini24.channels(), 24);
    }
}
