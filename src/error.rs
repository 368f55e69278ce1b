use core::fmt::{self, Debug};
use embedded_hal::spi::ErrorType;

use crate::spi::IoMode;

/// The error type used by this library.
///
/// This wraps the SPI controller's own error, and adds the busy-poll timeout
/// on top of that, plus fast-read configurations the controller cannot clock.
/// Flash commands themselves never report failure.
pub enum Error<C: ErrorType> {
    /// An SPI transfer failed.
    Spi(C::Error),
    /// The busy bit stayed set for longer than the configured poll budget.
    DeviceTimeout,
    /// `cycles` dummy clocks cannot be issued at `mode`: the count is outside
    /// the part's range, or does not fill whole bytes, so a byte-granular
    /// controller would clock the wrong number and shift every data bit that
    /// follows.
    DummyCycles { cycles: u8, mode: IoMode },
}

#[cfg(feature = "defmt")]
impl<C: ErrorType> defmt::Format for Error<C> {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Error::Spi(_spi) => defmt::write!(fmt, "Error::Spi"),
            Error::DeviceTimeout => defmt::write!(fmt, "Error::DeviceTimeout"),
            Error::DummyCycles { cycles, mode } => {
                defmt::write!(fmt, "Error::DummyCycles({=u8} at {})", cycles, mode)
            }
        }
    }
}

impl<C: ErrorType> Debug for Error<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Spi(spi) => write!(f, "Error::Spi({:?})", spi),
            Error::DeviceTimeout => write!(f, "Error::DeviceTimeout"),
            Error::DummyCycles { cycles, mode } => {
                write!(f, "Error::DummyCycles({} at {:?})", cycles, mode)
            }
        }
    }
}
