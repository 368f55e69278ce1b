/// Byte-addressed access to a NOR flash device.
///
/// Both drivers implement this on top of their index-based operations, so code
/// that only needs "read, erase, program" does not care which part is fitted.
pub trait HardwareFlashDevice {
    type Error;

    /// Reads flash contents into `buf`, starting at `addr`.
    fn read(&mut self, addr: u32, data: &mut [u8]) -> Result<(), Self::Error>;

    /// Sets the smallest erasable unit containing `addr` to the erased state
    /// of all 1s (FFh).
    fn sector_erase(&mut self, addr: u32) -> Result<(), Self::Error>;

    /// Programs from one byte up to a page of data at previously erased (FFh)
    /// memory locations. Data past the end of the page wraps to its start.
    fn page_program(&mut self, addr: u32, data: &[u8]) -> Result<(), Self::Error>;

    /// Sets all memory within the device to the erased state of all 1s (FFh).
    fn chip_erase(&mut self) -> Result<(), Self::Error>;
}
