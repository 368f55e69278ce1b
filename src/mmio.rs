//! Register-level driver for the SoC's SPI master.
//!
//! One 32-bit control register, one status register and single-byte TX/RX
//! data registers. Transfers are byte-at-a-time: write TXDATA, spin on the
//! busy bit, and for reads pick the byte up from RXDATA.
use core::convert::Infallible;

use crate::spi::{BitOrder, IoMode, Role, SpiController};
use embedded_hal::spi::{ErrorType, Mode, Phase, Polarity};

/// Base address of the first SPI block.
pub const SPI0_BASE: usize = 0x0700_0000;

const CTRL0: usize = 0x0;
const STATUS: usize = 0x4;
const TXDATA: usize = 0x8;
const RXDATA: usize = 0xC;

mod ctrl0 {
    pub const ENABLE: u32 = 0;
    pub const ROLE_MODE: u32 = 3;
    pub const CP_MODE_OFFSET: u32 = 4;
    pub const CP_MODE_MASK: u32 = 0x3;
    pub const SPI_MODE_OFFSET: u32 = 6;
    pub const SPI_MODE_MASK: u32 = 0x3;
    pub const READ: u32 = 8;
    pub const MSB_FIRST: u32 = 9;
    pub const SS_SW_CTRL: u32 = 10;
    pub const SS_LEVEL: u32 = 11;
    pub const SS_DELAY_OFFSET: u32 = 12;
    pub const SS_DELAY_MASK: u32 = 0xF;
    pub const CLK_DIV_OFFSET: u32 = 29;
    pub const CLK_DIV_MASK: u32 = 0x7;
}

mod status {
    pub const RX_FIFO_EMPTY: u32 = 3;
    pub const BUSY: u32 = 4;
}

/// Read value clocked out while receiving.
const READ_FILL: u8 = 0xFF;

pub struct RegisterSpi {
    base: usize,
}

impl RegisterSpi {
    /// # Safety
    ///
    /// `base` must be the address of an SPI register block with nothing else
    /// driving it for as long as the returned value lives.
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    fn read(&self, offset: usize) -> u32 {
        // SAFETY: `new` requires `base` to be a valid register block.
        unsafe { core::ptr::read_volatile((self.base + offset) as *const u32) }
    }

    fn write(&mut self, offset: usize, value: u32) {
        // SAFETY: `new` requires `base` to be a valid register block.
        unsafe { core::ptr::write_volatile((self.base + offset) as *mut u32, value) }
    }

    fn set_bit(&mut self, bit: u32, on: bool) {
        let ctrl = self.read(CTRL0);
        let ctrl = if on { ctrl | (1 << bit) } else { ctrl & !(1 << bit) };
        self.write(CTRL0, ctrl);
    }

    fn set_field(&mut self, offset: u32, mask: u32, value: u32) {
        let ctrl = self.read(CTRL0) & !(mask << offset);
        self.write(CTRL0, ctrl | ((value & mask) << offset));
    }

    fn transmitting(&self) -> bool {
        self.read(STATUS) & (1 << status::BUSY) != 0
    }

    fn shift(&mut self, byte: u8) {
        self.write(TXDATA, byte as u32);
        while self.transmitting() {}
    }
}

impl ErrorType for RegisterSpi {
    type Error = Infallible;
}

impl SpiController for RegisterSpi {
    fn set_clock_divider(&mut self, div: u16) -> Result<(), Infallible> {
        self.set_field(ctrl0::CLK_DIV_OFFSET, ctrl0::CLK_DIV_MASK, div as u32);
        Ok(())
    }

    fn set_role(&mut self, role: Role) -> Result<(), Infallible> {
        self.set_bit(ctrl0::ROLE_MODE, role == Role::Slave);
        Ok(())
    }

    fn set_io_mode(&mut self, mode: IoMode) -> Result<(), Infallible> {
        let value = match mode {
            IoMode::Standard => 0,
            IoMode::Dual => 1,
            IoMode::Quad => 2,
        };
        self.set_field(ctrl0::SPI_MODE_OFFSET, ctrl0::SPI_MODE_MASK, value);
        Ok(())
    }

    fn set_clock_mode(&mut self, mode: Mode) -> Result<(), Infallible> {
        let cpol = match mode.polarity {
            Polarity::IdleLow => 0,
            Polarity::IdleHigh => 1,
        };
        let cpha = match mode.phase {
            Phase::CaptureOnFirstTransition => 0,
            Phase::CaptureOnSecondTransition => 1,
        };
        self.set_field(ctrl0::CP_MODE_OFFSET, ctrl0::CP_MODE_MASK, (cpol << 1) | cpha);
        Ok(())
    }

    fn set_bit_order(&mut self, order: BitOrder) -> Result<(), Infallible> {
        self.set_bit(ctrl0::MSB_FIRST, order == BitOrder::MsbFirst);
        Ok(())
    }

    fn set_ss_delay(&mut self, clocks: u8) -> Result<(), Infallible> {
        self.set_field(ctrl0::SS_DELAY_OFFSET, ctrl0::SS_DELAY_MASK, clocks as u32);
        Ok(())
    }

    fn set_ss_software_control(&mut self, enabled: bool) -> Result<(), Infallible> {
        self.set_bit(ctrl0::SS_SW_CTRL, enabled);
        Ok(())
    }

    fn set_ss_level(&mut self, high: bool) -> Result<(), Infallible> {
        self.set_bit(ctrl0::SS_LEVEL, high);
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), Infallible> {
        self.set_bit(ctrl0::ENABLE, enabled);
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), Infallible> {
        self.set_bit(ctrl0::READ, false);
        for &byte in data {
            self.shift(byte);
        }
        Ok(())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), Infallible> {
        self.set_bit(ctrl0::READ, true);
        for byte in buf.iter_mut() {
            self.shift(READ_FILL);
            *byte = self.read(RXDATA) as u8;
        }
        Ok(())
    }

    fn reset_rx_fifo(&mut self) -> Result<(), Infallible> {
        while self.read(STATUS) & (1 << status::RX_FIFO_EMPTY) == 0 {
            let _ = self.read(RXDATA);
        }
        Ok(())
    }
}
