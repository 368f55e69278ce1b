use core::fmt::Debug;

use crate::spi::{BitOrder, IoMode, Role, SpiController};
use embedded_hal::digital::OutputPin;
use embedded_hal::spi::{ErrorKind, ErrorType, Mode, SpiBus};

/// Runs the flash drivers on any `embedded-hal` SPI bus plus a GPIO for
/// chip-select.
///
/// `SpiBus` only moves data on a single line, so the flash must stay in
/// [`IoMode::Standard`]. Clock rate and mode belong to the HAL that built the
/// bus; the matching controller settings are accepted and ignored.
pub struct BusAdapter<BUS, CS> {
    bus: BUS,
    cs: CS,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterError<B, P> {
    /// An SPI transfer failed.
    Bus(B),
    /// Driving chip-select failed.
    Pin(P),
    /// The setting cannot be expressed with `SpiBus`.
    Unsupported,
}

impl<B, P> embedded_hal::spi::Error for AdapterError<B, P>
where
    B: embedded_hal::spi::Error,
    P: Debug,
{
    fn kind(&self) -> ErrorKind {
        match self {
            AdapterError::Bus(bus) => bus.kind(),
            AdapterError::Pin(_) => ErrorKind::ChipSelectFault,
            AdapterError::Unsupported => ErrorKind::Other,
        }
    }
}

#[cfg(feature = "defmt")]
impl<B, P> defmt::Format for AdapterError<B, P> {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            AdapterError::Bus(_) => defmt::write!(fmt, "AdapterError::Bus"),
            AdapterError::Pin(_) => defmt::write!(fmt, "AdapterError::Pin"),
            AdapterError::Unsupported => defmt::write!(fmt, "AdapterError::Unsupported"),
        }
    }
}

impl<BUS, CS> BusAdapter<BUS, CS>
where
    BUS: SpiBus,
    CS: OutputPin,
{
    pub fn new(bus: BUS, cs: CS) -> Self {
        Self { bus, cs }
    }

    pub fn release(self) -> (BUS, CS) {
        (self.bus, self.cs)
    }
}

impl<BUS, CS> ErrorType for BusAdapter<BUS, CS>
where
    BUS: SpiBus,
    CS: OutputPin,
{
    type Error = AdapterError<BUS::Error, CS::Error>;
}

impl<BUS, CS> SpiController for BusAdapter<BUS, CS>
where
    BUS: SpiBus,
    CS: OutputPin,
{
    fn set_clock_divider(&mut self, _div: u16) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_role(&mut self, role: Role) -> Result<(), Self::Error> {
        match role {
            Role::Master => Ok(()),
            Role::Slave => Err(AdapterError::Unsupported),
        }
    }

    fn set_io_mode(&mut self, mode: IoMode) -> Result<(), Self::Error> {
        match mode {
            IoMode::Standard => Ok(()),
            IoMode::Dual | IoMode::Quad => {
                warn!("SpiBus cannot switch to {}", mode);
                Err(AdapterError::Unsupported)
            }
        }
    }

    fn set_clock_mode(&mut self, _mode: Mode) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_bit_order(&mut self, order: BitOrder) -> Result<(), Self::Error> {
        match order {
            BitOrder::MsbFirst => Ok(()),
            BitOrder::LsbFirst => Err(AdapterError::Unsupported),
        }
    }

    fn set_ss_delay(&mut self, _clocks: u8) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_ss_software_control(&mut self, _enabled: bool) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_ss_level(&mut self, high: bool) -> Result<(), Self::Error> {
        if high {
            self.cs.set_high().map_err(AdapterError::Pin)
        } else {
            self.cs.set_low().map_err(AdapterError::Pin)
        }
    }

    fn set_enabled(&mut self, _enabled: bool) -> Result<(), Self::Error> {
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.bus.write(data).map_err(AdapterError::Bus)?;
        self.bus.flush().map_err(AdapterError::Bus)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.bus.read(buf).map_err(AdapterError::Bus)?;
        self.bus.flush().map_err(AdapterError::Bus)
    }

    fn reset_rx_fifo(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
