/// Refer to datasheet:
/// Micron N25Q064A, 64Mb 3V multiple I/O serial flash memory
///
/// 8 MiB organised as 32768 pages of 256 bytes, 2048 subsectors of 4 KiB and
/// 128 sectors of 64 KiB. The smallest erasable unit is a subsector.
use crate::comms::{dummy_bytes, FastRead, FlashSpi, NoDelay, Part};
use crate::error::Error;
use crate::identification::N25qId;
use crate::spi::{IoMode, SpiController};
use embedded_hal::delay::DelayNs;

pub const SUBSECTOR_SHIFT: u32 = 12;
pub const SECTOR_SHIFT: u32 = 16;
pub const SUBSECTOR_SIZE: usize = 1 << SUBSECTOR_SHIFT;
pub const SECTOR_SIZE: usize = 1 << SECTOR_SHIFT;
pub const CAPACITY: u32 = 8 * 1024 * 1024;

/// Dummy clocks assumed until `set_dummy_clock_cycles` is called, and the
/// count the chip falls back to when the VCR field holds 0 or 15.
pub const DEFAULT_DUMMY_CYCLES: u8 = 10;
/// Largest value the 4-bit VCR dummy clock field can hold.
pub const MAX_DUMMY_CYCLES: u8 = 0xF;

/// Quad I/O protocol bit of the enhanced volatile configuration register,
/// active low.
pub const EVCR_QUAD_DISABLE: u8 = 1 << 7;
/// Dual I/O protocol bit of the enhanced volatile configuration register,
/// active low.
pub const EVCR_DUAL_DISABLE: u8 = 1 << 6;

const VCR_DUMMY_SHIFT: u8 = 4;
const VCR_DUMMY_MASK: u8 = 0xF << VCR_DUMMY_SHIFT;

/// N25Q-specific opcodes. The shared ones live in [`crate::comms::Opcode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    PageProg = 0x02,
    DualOutputFastRead = 0x3B,
    QuadOutputFastRead = 0x6B,
    DualInputFastProg = 0xA2,
    QuadInputFastProg = 0x32,
    SubsectorErase = 0x20,
    ClearFlagStatus = 0x50,
    ReadFlagStatus = 0x70,
    BulkErase = 0xC7,
    SectorErase = 0xD8,
    /// Read the JEDEC manufacturer/device identification.
    ReadId = 0x9F,
    MultipleIoReadId = 0xAF,
    WriteEnhancedVolatileConfig = 0x61,
    ReadEnhancedVolatileConfig = 0x65,
    ReadVolatileConfig = 0x85,
    WriteVolatileConfig = 0x81,
}

/// Which identification command `read_id_with` sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IdCommand {
    ReadId,
    MultipleIoReadId,
}

bitflags::bitflags! {
    /// Flag status register bits.
    pub struct FlagStatus: u8 {
        /// Program/erase controller ready.
        const READY = 1 << 7;
        const ERASE_SUSPEND = 1 << 6;
        const ERASE_ERROR = 1 << 5;
        const PROGRAM_ERROR = 1 << 4;
        const VPP_ERROR = 1 << 3;
        const PROGRAM_SUSPEND = 1 << 2;
        /// Attempted access to a locked sector.
        const PROTECTION_ERROR = 1 << 1;
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for FlagStatus {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "FlagStatus({=u8:#010b})", self.bits())
    }
}

/// N25Q command table, plus the dummy clock count the chip was last
/// configured with.
#[derive(Debug, Clone, Copy)]
pub struct N25q {
    dummy_cycles: u8,
}

impl Default for N25q {
    fn default() -> Self {
        Self {
            dummy_cycles: DEFAULT_DUMMY_CYCLES,
        }
    }
}

impl N25q {
    pub fn dummy_cycles(&self) -> u8 {
        self.dummy_cycles
    }
}

impl Part for N25q {
    const ERASE_SHIFT: u32 = SUBSECTOR_SHIFT;
    const ERASE_OPCODE: u8 = Opcode::SubsectorErase as u8;
    const CHIP_ERASE_OPCODE: u8 = Opcode::BulkErase as u8;

    fn fast_read(&self, mode: IoMode) -> FastRead {
        let (opcode, data_mode) = match mode {
            IoMode::Dual => (Opcode::DualOutputFastRead, IoMode::Dual),
            IoMode::Standard | IoMode::Quad => (Opcode::QuadOutputFastRead, IoMode::Quad),
        };
        FastRead {
            opcode: opcode as u8,
            address_mode: IoMode::Standard,
            mode_byte: false,
            dummy_cycles: self.dummy_cycles,
            data_mode,
        }
    }

    fn program(&self, mode: IoMode) -> (u8, IoMode) {
        match mode {
            IoMode::Standard => (Opcode::PageProg as u8, IoMode::Standard),
            IoMode::Dual => (Opcode::DualInputFastProg as u8, IoMode::Dual),
            IoMode::Quad => (Opcode::QuadInputFastProg as u8, IoMode::Quad),
        }
    }
}

pub type N25qFlash<C, D = NoDelay> = FlashSpi<N25q, C, D>;

pub const fn subsector_to_addr(subsector: u32) -> u32 {
    subsector << SUBSECTOR_SHIFT
}

pub const fn sector_to_addr(sector: u32) -> u32 {
    sector << SECTOR_SHIFT
}

/// Enabling selects the quad protocol and turns dual off; disabling turns
/// both off (extended SPI).
pub const fn apply_quad_enable(evcr: u8, enable: bool) -> u8 {
    if enable {
        (evcr & !EVCR_QUAD_DISABLE) | EVCR_DUAL_DISABLE
    } else {
        evcr | EVCR_QUAD_DISABLE | EVCR_DUAL_DISABLE
    }
}

/// Dummy clocks the chip actually inserts for a VCR field value.
pub const fn effective_dummy_cycles(field: u8) -> u8 {
    match field & MAX_DUMMY_CYCLES {
        0 | MAX_DUMMY_CYCLES => DEFAULT_DUMMY_CYCLES,
        n => n,
    }
}

/// Replaces the dummy clock field (bits 7:4) of the volatile configuration
/// register.
pub const fn apply_dummy_cycles(vcr: u8, cycles: u8) -> u8 {
    (vcr & !VCR_DUMMY_MASK) | ((cycles << VCR_DUMMY_SHIFT) & VCR_DUMMY_MASK)
}

impl<C, D> FlashSpi<N25q, C, D>
where
    C: SpiController,
    D: DelayNs,
{
    /// Reads the JEDEC identification (9Fh).
    pub fn read_id(&mut self) -> Result<N25qId, Error<C>> {
        self.read_id_with(IdCommand::ReadId)
    }

    pub fn read_id_with(&mut self, command: IdCommand) -> Result<N25qId, Error<C>> {
        let opcode = match command {
            IdCommand::ReadId => Opcode::ReadId,
            IdCommand::MultipleIoReadId => Opcode::MultipleIoReadId,
        };
        let mut response = [0u8; N25qId::LEN];
        self.command_with_response(&[opcode as u8], &mut response)?;
        Ok(N25qId::from_bytes(response))
    }

    /// Subsector erase (20h). Sets the 4 KiB subsector number `subsector` to FFh.
    pub fn subsector_erase(&mut self, subsector: u32) -> Result<(), Error<C>> {
        self.erase_at(Opcode::SubsectorErase as u8, subsector_to_addr(subsector))
    }

    /// Sector erase (D8h). Sets the 64 KiB sector number `sector` to FFh.
    pub fn sector_erase(&mut self, sector: u32) -> Result<(), Error<C>> {
        self.erase_at(Opcode::SectorErase as u8, sector_to_addr(sector))
    }

    /// Bulk erase (C7h).
    pub fn bulk_erase(&mut self) -> Result<(), Error<C>> {
        self.erase_chip()
    }

    /// Switches the chip between quad and extended SPI protocol through the
    /// enhanced volatile configuration register. The setting is lost on power
    /// cycle.
    pub fn enable_quad_mode(&mut self, enable: bool) -> Result<(), Error<C>> {
        let evcr = self.modify_reg(
            Opcode::ReadEnhancedVolatileConfig as u8,
            Opcode::WriteEnhancedVolatileConfig as u8,
            |evcr| apply_quad_enable(evcr, enable),
        )?;
        debug!("N25Q enhanced volatile config: {=u8:#010b}", evcr);
        Ok(())
    }

    /// Programs the number of dummy clocks used by fast reads; later fast
    /// reads clock the same count. 0 and 15 select the part default.
    ///
    /// Fails with [`Error::DummyCycles`], without touching the chip, when
    /// `cycles` does not fit the 4-bit field or, in dual or quad mode, when
    /// the resulting count does not fill whole bytes at that width.
    pub fn set_dummy_clock_cycles(&mut self, cycles: u8) -> Result<(), Error<C>> {
        let mode = self.spi_mode();
        if cycles > MAX_DUMMY_CYCLES {
            return Err(Error::DummyCycles { cycles, mode });
        }
        if mode != IoMode::Standard {
            let part = N25q {
                dummy_cycles: effective_dummy_cycles(cycles),
            };
            dummy_bytes::<C>(&part.fast_read(mode))?;
        }

        let vcr = self.modify_reg(
            Opcode::ReadVolatileConfig as u8,
            Opcode::WriteVolatileConfig as u8,
            |vcr| apply_dummy_cycles(vcr, cycles),
        )?;
        self.part_mut().dummy_cycles = effective_dummy_cycles(vcr >> VCR_DUMMY_SHIFT);
        Ok(())
    }

    pub fn read_flag_status(&mut self) -> Result<FlagStatus, Error<C>> {
        let flags = self.read_reg(Opcode::ReadFlagStatus as u8)?;
        Ok(FlagStatus::from_bits_truncate(flags))
    }

    /// Clears the error bits of the flag status register.
    pub fn clear_flag_status(&mut self) -> Result<(), Error<C>> {
        self.command(&[Opcode::ClearFlagStatus as u8])
    }
}
