use embedded_hal::spi::{ErrorType, Mode};

/// Number of data lines used for a transfer phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoMode {
    /// Single line out (MOSI), single line in (MISO).
    #[default]
    Standard,
    /// Two bidirectional lines.
    Dual,
    /// Four bidirectional lines.
    Quad,
}

impl IoMode {
    /// Data lines driven per clock.
    pub const fn lines(self) -> u32 {
        match self {
            IoMode::Standard => 1,
            IoMode::Dual => 2,
            IoMode::Quad => 4,
        }
    }

    /// Bytes clocked during `cycles` clocks at this width, or `None` when the
    /// clocks do not fill a whole number of bytes.
    pub const fn cycles_to_bytes(self, cycles: u8) -> Option<usize> {
        let bits = cycles as u32 * self.lines();
        if bits % 8 == 0 {
            Some((bits / 8) as usize)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    Master,
    Slave,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitOrder {
    MsbFirst,
    LsbFirst,
}

/// A SPI master with software chip-select and a switchable bus width.
///
/// This is the surface the flash drivers need from the SoC's SPI block. Every
/// transfer is blocking: `write_bytes` and `read_bytes` return once the last
/// byte has been clocked. Chip-select is active low; `set_ss_level(false)`
/// selects the device.
pub trait SpiController: ErrorType {
    fn set_clock_divider(&mut self, div: u16) -> Result<(), Self::Error>;

    fn set_role(&mut self, role: Role) -> Result<(), Self::Error>;

    /// Selects the width used by subsequent `write_bytes`/`read_bytes` calls.
    fn set_io_mode(&mut self, mode: IoMode) -> Result<(), Self::Error>;

    /// Clock polarity and phase.
    fn set_clock_mode(&mut self, mode: Mode) -> Result<(), Self::Error>;

    fn set_bit_order(&mut self, order: BitOrder) -> Result<(), Self::Error>;

    /// Clocks inserted between chip-select assertion and the first edge.
    fn set_ss_delay(&mut self, clocks: u8) -> Result<(), Self::Error>;

    /// Hand chip-select to `set_ss_level` instead of the transfer engine.
    fn set_ss_software_control(&mut self, enabled: bool) -> Result<(), Self::Error>;

    fn set_ss_level(&mut self, high: bool) -> Result<(), Self::Error>;

    fn set_enabled(&mut self, enabled: bool) -> Result<(), Self::Error>;

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Drop anything left in the receive FIFO.
    fn reset_rx_fifo(&mut self) -> Result<(), Self::Error>;

    /// Drive chip-select low.
    fn select(&mut self) -> Result<(), Self::Error> {
        self.set_ss_level(false)
    }

    /// Drive chip-select high.
    fn deselect(&mut self) -> Result<(), Self::Error> {
        self.set_ss_level(true)
    }
}

impl<T: SpiController + ?Sized> SpiController for &mut T {
    fn set_clock_divider(&mut self, div: u16) -> Result<(), Self::Error> {
        T::set_clock_divider(self, div)
    }

    fn set_role(&mut self, role: Role) -> Result<(), Self::Error> {
        T::set_role(self, role)
    }

    fn set_io_mode(&mut self, mode: IoMode) -> Result<(), Self::Error> {
        T::set_io_mode(self, mode)
    }

    fn set_clock_mode(&mut self, mode: Mode) -> Result<(), Self::Error> {
        T::set_clock_mode(self, mode)
    }

    fn set_bit_order(&mut self, order: BitOrder) -> Result<(), Self::Error> {
        T::set_bit_order(self, order)
    }

    fn set_ss_delay(&mut self, clocks: u8) -> Result<(), Self::Error> {
        T::set_ss_delay(self, clocks)
    }

    fn set_ss_software_control(&mut self, enabled: bool) -> Result<(), Self::Error> {
        T::set_ss_software_control(self, enabled)
    }

    fn set_ss_level(&mut self, high: bool) -> Result<(), Self::Error> {
        T::set_ss_level(self, high)
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), Self::Error> {
        T::set_enabled(self, enabled)
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        T::write_bytes(self, data)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), Self::Error> {
        T::read_bytes(self, buf)
    }

    fn reset_rx_fifo(&mut self) -> Result<(), Self::Error> {
        T::reset_rx_fifo(self)
    }
}
