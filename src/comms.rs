//! Command sequencing shared by every supported part.
//!
//! A [`FlashSpi`] owns one SPI controller and drives one flash chip on it. The
//! part type parameter supplies the opcodes and bit positions that differ
//! between chips; everything else (chip-select framing, write-enable
//! bracketing, busy polling, address serialization) lives here.
use core::fmt::Debug;

use crate::error::Error;
use crate::spi::{BitOrder, IoMode, Role, SpiController};
use crate::traits::HardwareFlashDevice;
use embedded_hal::delay::DelayNs;
use embedded_hal::spi::{ErrorType, MODE_0};

/// Bytes in one program page, on every supported part.
pub const PAGE_SIZE: usize = 256;
pub(crate) const PAGE_SHIFT: u32 = 8;

/// Opcodes with the same encoding on every supported part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Set the write enable latch.
    WriteEnable = 0x06,
    /// Clear the write enable latch.
    WriteDisable = 0x04,
    /// Read the 8-bit status register.
    ReadStatus = 0x05,
    /// Single-line read, no dummy cycles.
    Read = 0x03,
    /// Single-line page program.
    PageProg = 0x02,
}

bitflags::bitflags! {
    /// Status register bits.
    pub struct Status: u8 {
        /// Erase or write in progress.
        const BUSY = 1 << 0;
        /// Status of the **W**rite **E**nable **L**atch.
        const WEL = 1 << 1;
        /// The block protection bits.
        const PROT = 0b0111_1100;
        /// **S**tatus **R**egister **W**rite **D**isable bit.
        const SRWD = 1 << 7;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Status {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "Status({=u8:#010b})", self.bits())
    }
}

/// How a part performs a read when the session is in a multi-line mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastRead {
    pub opcode: u8,
    /// Width of the address phase. The opcode always goes out on one line.
    pub address_mode: IoMode,
    /// Whether a mode byte (sent as 0x00) follows the address.
    pub mode_byte: bool,
    /// Clocks between the address phase and the first data bit.
    pub dummy_cycles: u8,
    /// Width of the dummy and data phases.
    pub data_mode: IoMode,
}

/// Per-chip command table and geometry.
pub trait Part {
    /// Log2 of the smallest erasable unit.
    const ERASE_SHIFT: u32;
    /// Erase opcode for the smallest erasable unit.
    const ERASE_OPCODE: u8;
    const CHIP_ERASE_OPCODE: u8;

    /// Read sequence used when the session is not in [`IoMode::Standard`].
    fn fast_read(&self, mode: IoMode) -> FastRead;

    /// Page program opcode and data-phase width for the session mode.
    fn program(&self, mode: IoMode) -> (u8, IoMode);
}

/// Busy-poll policy for erase, program and register writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusyPoll {
    /// Delay between status reads. 0 spins.
    pub interval_us: u32,
    /// Give up with [`Error::DeviceTimeout`] after this many busy reads.
    /// `None` waits forever.
    pub max_polls: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Controller clock divider.
    pub clk_div: u16,
    /// Chip-select setup delay in controller clocks.
    pub ss_delay: u8,
    pub busy_poll: BusyPoll,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            clk_div: 5,
            ss_delay: 1,
            busy_poll: BusyPoll::default(),
        }
    }
}

/// Delay provider that returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// Big-endian 24-bit address as sent on the wire.
pub const fn address_bytes(addr: u32) -> [u8; 3] {
    [(addr >> 16) as u8, (addr >> 8) as u8, addr as u8]
}

pub const fn page_to_addr(page: u32) -> u32 {
    page << PAGE_SHIFT
}

/// Dummy bytes to clock for `fast`, or the error if its cycle count is not
/// byte aligned at the data width.
pub(crate) fn dummy_bytes<C: ErrorType>(fast: &FastRead) -> Result<usize, Error<C>> {
    fast.data_mode
        .cycles_to_bytes(fast.dummy_cycles)
        .ok_or(Error::DummyCycles {
            cycles: fast.dummy_cycles,
            mode: fast.data_mode,
        })
}

pub struct FlashSpi<P, C, D = NoDelay> {
    spi: C,
    delay: D,
    part: P,
    mode: IoMode,
    busy_poll: BusyPoll,
}

impl<P, C, D> Debug for FlashSpi<P, C, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FlashSpi")
            .field("mode", &self.mode)
            .field("busy_poll", &self.busy_poll)
            .finish()
    }
}

impl<P, C> FlashSpi<P, C, NoDelay>
where
    P: Part + Default,
    C: SpiController,
{
    /// Binds `spi` and configures it for talking to the flash: master,
    /// single-line, mode 0, MSB first, software chip-select held high.
    pub fn init(spi: C, clk_div: u16) -> Result<Self, Error<C>> {
        Self::init_with(
            spi,
            NoDelay,
            Config {
                clk_div,
                ..Config::default()
            },
        )
    }
}

impl<P, C, D> FlashSpi<P, C, D>
where
    P: Part + Default,
    C: SpiController,
    D: DelayNs,
{
    pub fn init_with(spi: C, delay: D, config: Config) -> Result<Self, Error<C>> {
        let mut this = Self {
            spi,
            delay,
            part: P::default(),
            mode: IoMode::Standard,
            busy_poll: config.busy_poll,
        };
        this.configure(config.clk_div, config.ss_delay)
            .map_err(Error::Spi)?;
        debug!("Flash controller configured: {}", config);
        Ok(this)
    }
}

impl<P, C, D> FlashSpi<P, C, D>
where
    P: Part,
    C: SpiController,
    D: DelayNs,
{
    fn configure(&mut self, clk_div: u16, ss_delay: u8) -> Result<(), C::Error> {
        let spi = &mut self.spi;
        spi.set_clock_divider(clk_div)?;
        spi.set_role(Role::Master)?;
        spi.set_io_mode(IoMode::Standard)?;
        spi.set_clock_mode(MODE_0)?;
        spi.set_bit_order(BitOrder::MsbFirst)?;
        spi.set_ss_delay(ss_delay)?;
        spi.set_ss_level(true)?;
        spi.set_ss_software_control(true)?;
        spi.set_enabled(true)
    }

    /// Sets the width used for data phases of later reads and programs.
    /// No bus traffic; enable the chip side first with `enable_quad_mode`.
    pub fn set_spi_mode(&mut self, mode: IoMode) {
        self.mode = mode;
    }

    pub fn spi_mode(&self) -> IoMode {
        self.mode
    }

    /// Rebinds the driver to another controller and hands back the old one.
    /// The new controller is used as-is; it is not reconfigured.
    pub fn set_spi_controller(&mut self, spi: C) -> C {
        core::mem::replace(&mut self.spi, spi)
    }

    pub fn set_busy_poll(&mut self, busy_poll: BusyPoll) {
        self.busy_poll = busy_poll;
    }

    pub fn spi(&self) -> &C {
        &self.spi
    }

    /// Direct controller access. Leave chip-select deasserted.
    pub fn spi_mut(&mut self) -> &mut C {
        &mut self.spi
    }

    pub fn part(&self) -> &P {
        &self.part
    }

    pub(crate) fn part_mut(&mut self) -> &mut P {
        &mut self.part
    }

    /// Gives back the controller and delay.
    pub fn release(self) -> (C, D) {
        (self.spi, self.delay)
    }

    /// Runs `f` with the chip selected. The opcode phase always starts on a
    /// single line; `f` switches width itself where a command needs it.
    fn transaction<F>(&mut self, f: F) -> Result<(), Error<C>>
    where
        F: FnOnce(&mut C) -> Result<(), C::Error>,
    {
        self.spi.set_io_mode(IoMode::Standard).map_err(Error::Spi)?;
        self.spi.select().map_err(Error::Spi)?;
        let result = f(&mut self.spi);
        let deselect = self.spi.deselect();
        result.and(deselect).map_err(Error::Spi)
    }

    /// Writes a command to the SPI bus
    pub(crate) fn command(&mut self, bytes: &[u8]) -> Result<(), Error<C>> {
        self.transaction(|spi| spi.write_bytes(bytes))
    }

    /// Writes a command to the SPI bus and reads the response into `response`
    pub(crate) fn command_with_response(
        &mut self,
        instruction: &[u8],
        response: &mut [u8],
    ) -> Result<(), Error<C>> {
        self.transaction(|spi| {
            spi.write_bytes(instruction)?;
            spi.read_bytes(response)
        })
    }

    /// Sets (`true`) or clears the write enable latch.
    ///
    /// The latch must be set before every page program, erase and register
    /// write, and is cleared again once the operation has finished.
    pub fn write_enable(&mut self, enable: bool) -> Result<(), Error<C>> {
        let opcode = if enable {
            Opcode::WriteEnable
        } else {
            Opcode::WriteDisable
        };
        self.command(&[opcode as u8])
    }

    pub fn read_reg(&mut self, cmd: u8) -> Result<u8, Error<C>> {
        let mut response = [0u8; 1];
        self.command_with_response(&[cmd], &mut response)?;
        Ok(response[0])
    }

    /// Sends `cmd` followed by one data byte. Does not touch the write enable
    /// latch; see [`FlashSpi::modify_reg`] for the bracketed version.
    pub fn write_reg(&mut self, cmd: u8, data: u8) -> Result<(), Error<C>> {
        self.command(&[cmd, data])
    }

    /// Reads the status register.
    pub fn read_status(&mut self) -> Result<Status, Error<C>> {
        let status = self.read_reg(Opcode::ReadStatus as u8)?;
        Ok(Status::from_bits_truncate(status))
    }

    pub fn is_busy(&mut self) -> Result<bool, Error<C>> {
        Ok(self.read_status()?.contains(Status::BUSY))
    }

    pub fn is_wel(&mut self) -> Result<bool, Error<C>> {
        Ok(self.read_status()?.contains(Status::WEL))
    }

    /// Block until the status of the device is not busy
    fn wait_done(&mut self) -> Result<(), Error<C>> {
        let mut polls: u32 = 0;
        while self.is_busy()? {
            polls = polls.saturating_add(1);
            if let Some(max_polls) = self.busy_poll.max_polls {
                if polls >= max_polls {
                    warn!("Flash still busy after {=u32} polls", polls);
                    return Err(Error::DeviceTimeout);
                }
            }
            if self.busy_poll.interval_us > 0 {
                self.delay.delay_us(self.busy_poll.interval_us);
            }
        }
        Ok(())
    }

    fn write_enable_checked(&mut self) -> Result<(), Error<C>> {
        self.write_enable(true)?;
        if !self.is_wel()? {
            warn!("WEL should be set: {}", self.read_status()?);
        }
        Ok(())
    }

    /// Read-modify-write of a one-byte register inside a write enable bracket.
    /// Returns the value written.
    pub fn modify_reg<F>(&mut self, read_cmd: u8, write_cmd: u8, f: F) -> Result<u8, Error<C>>
    where
        F: FnOnce(u8) -> u8,
    {
        self.write_enable(true)?;
        let value = f(self.read_reg(read_cmd)?);
        self.write_reg(write_cmd, value)?;
        self.wait_done()?;
        self.write_enable(false)?;
        Ok(value)
    }

    /// Reads `buf.len()` bytes starting at byte address `addr`.
    ///
    /// In standard mode this is a plain read (03h). In dual or quad mode the
    /// part's fast read is used: opcode on one line, then the address, dummy
    /// clocks and data at the width the part requires.
    ///
    /// Only 24 bits of `addr` are sent; higher bits are ignored. A fast read
    /// whose dummy clocks do not fill whole bytes fails with
    /// [`Error::DummyCycles`] before anything is sent.
    pub fn read(&mut self, buf: &mut [u8], addr: u32) -> Result<(), Error<C>> {
        let address = address_bytes(addr);
        if self.mode == IoMode::Standard {
            return self.transaction(|spi| {
                spi.write_bytes(&[Opcode::Read as u8])?;
                spi.write_bytes(&address)?;
                spi.read_bytes(buf)
            });
        }

        let fast = self.part.fast_read(self.mode);
        let dummy_len = dummy_bytes(&fast)?;
        let mut wire_address = [0u8; 4];
        wire_address[..3].copy_from_slice(&address);
        let address_len = if fast.mode_byte { 4 } else { 3 };

        self.transaction(|spi| {
            spi.write_bytes(&[fast.opcode])?;
            spi.set_io_mode(fast.address_mode)?;
            spi.write_bytes(&wire_address[..address_len])?;
            spi.set_io_mode(fast.data_mode)?;
            let mut scratch = [0u8; 8];
            let mut remaining = dummy_len;
            while remaining > 0 {
                let chunk = remaining.min(scratch.len());
                spi.read_bytes(&mut scratch[..chunk])?;
                remaining -= chunk;
            }
            spi.reset_rx_fifo()?;
            spi.read_bytes(buf)
        })
    }

    /// Programs `data` into page number `page` (256-byte pages).
    ///
    /// The target must have been erased and `data` must fit in the page;
    /// neither is checked.
    pub fn page_program(&mut self, data: &[u8], page: u32) -> Result<(), Error<C>> {
        self.program_at(page_to_addr(page), data)
    }

    fn program_at(&mut self, addr: u32, data: &[u8]) -> Result<(), Error<C>> {
        let (opcode, data_mode) = self.part.program(self.mode);
        let address = address_bytes(addr);

        self.write_enable_checked()?;
        trace!("Program {=usize} bytes at {=u32:#x}", data.len(), addr);
        self.transaction(|spi| {
            spi.write_bytes(&[opcode])?;
            spi.write_bytes(&address)?;
            spi.set_io_mode(data_mode)?;
            spi.write_bytes(data)
        })?;
        self.wait_done()?;
        self.write_enable(false)
    }

    /// Erases the unit containing byte address `addr` with `opcode`.
    pub(crate) fn erase_at(&mut self, opcode: u8, addr: u32) -> Result<(), Error<C>> {
        let [a2, a1, a0] = address_bytes(addr);

        self.write_enable_checked()?;
        trace!("Erase {=u8:#x} at {=u32:#x}", opcode, addr);
        self.command(&[opcode, a2, a1, a0])?;
        self.wait_done()?;
        self.write_enable(false)
    }

    /// Sets every byte of the device to FFh.
    pub fn erase_chip(&mut self) -> Result<(), Error<C>> {
        self.write_enable_checked()?;
        trace!("Chip erase");
        self.command(&[P::CHIP_ERASE_OPCODE])?;
        self.wait_done()?;
        self.write_enable(false)
    }
}

impl<P, C, D> HardwareFlashDevice for FlashSpi<P, C, D>
where
    P: Part,
    C: SpiController,
    D: DelayNs,
{
    type Error = Error<C>;

    fn read(&mut self, addr: u32, data: &mut [u8]) -> Result<(), Error<C>> {
        FlashSpi::read(self, data, addr)
    }

    fn sector_erase(&mut self, addr: u32) -> Result<(), Error<C>> {
        let unit = (1u32 << P::ERASE_SHIFT) - 1;
        self.erase_at(P::ERASE_OPCODE, addr & !unit)
    }

    fn page_program(&mut self, addr: u32, data: &[u8]) -> Result<(), Error<C>> {
        self.program_at(addr, data)
    }

    fn chip_erase(&mut self) -> Result<(), Error<C>> {
        self.erase_chip()
    }
}
