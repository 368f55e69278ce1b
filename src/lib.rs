//! Blocking drivers for the GD25Q and N25Q serial NOR flash parts on the
//! SoC's SPI master.
//!
//! Each driver instance owns its SPI controller and I/O mode. Erase and
//! program calls bracket the command with write enable / write disable and
//! poll the busy bit in between; with the default [`BusyPoll`] that poll has no
//! timeout. Page and sector indices are not range checked.
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod adapter;
pub mod comms;
pub mod error;
pub mod gd25q;
pub mod identification;
pub mod mmio;
pub mod n25q;
pub mod spi;
pub mod traits;

pub use adapter::{AdapterError, BusAdapter};
pub use comms::{BusyPoll, Config, FlashSpi, NoDelay, Part, Status, PAGE_SIZE};
pub use error::Error;
pub use gd25q::{Gd25q, Gd25qFlash};
pub use identification::{Gd25qId, N25qId};
pub use mmio::{RegisterSpi, SPI0_BASE};
pub use n25q::{N25q, N25qFlash};
pub use spi::{BitOrder, IoMode, Role, SpiController};
pub use traits::HardwareFlashDevice;
