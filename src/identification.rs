/// Manufacturer and device ID of a GD25Q part, as returned by Read ID (90h).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Gd25qId {
    /// 0xC8 for GigaDevice.
    pub manufacturer_id: u8,
    pub device_id: u8,
}

impl Gd25qId {
    pub const LEN: usize = 2;

    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self {
            manufacturer_id: bytes[0],
            device_id: bytes[1],
        }
    }
}

/// JEDEC identification of an N25Q part (9Fh / AFh).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct N25qId {
    /// 0x20 for Micron.
    pub manufacturer_id: u8,
    pub memory_type: u8,
    /// Capacity code, log2 of the size in bytes (0x17 for 64 Mbit).
    pub memory_capacity: u8,
}

impl N25qId {
    pub const LEN: usize = 3;

    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Self {
            manufacturer_id: bytes[0],
            memory_type: bytes[1],
            memory_capacity: bytes[2],
        }
    }

    /// Device size in bytes as encoded by the capacity code.
    pub fn capacity_bytes(&self) -> Option<u32> {
        1u32.checked_shl(self.memory_capacity as u32)
    }
}
