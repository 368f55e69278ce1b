/// Refer to datasheet:
/// GigaDevice GD25Q127C, 128M-bit serial NOR flash
///
/// 16 MiB organised as 65536 pages of 256 bytes, 4096 sectors of 4 KiB and
/// 256 blocks of 64 KiB. The smallest erasable unit is a sector.
use crate::comms::{FastRead, FlashSpi, NoDelay, Part};
use crate::error::Error;
use crate::identification::Gd25qId;
use crate::spi::{IoMode, SpiController};
use embedded_hal::delay::DelayNs;

pub const SECTOR_SHIFT: u32 = 12;
pub const BLOCK32K_SHIFT: u32 = 15;
pub const BLOCK64K_SHIFT: u32 = 16;
pub const SECTOR_SIZE: usize = 1 << SECTOR_SHIFT;
pub const CAPACITY: u32 = 16 * 1024 * 1024;

/// Quad Enable bit in status register 2.
pub const QE_BIT: u8 = 1 << 1;

/// Dummy clocks of the Quad I/O Fast Read after the mode byte.
const QUAD_IO_DUMMY_CYCLES: u8 = 4;
const DUAL_OUTPUT_DUMMY_CYCLES: u8 = 8;

/// GD25Q-specific opcodes. The shared ones live in [`crate::comms::Opcode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    WriteStatus1 = 0x01,
    WriteStatus2 = 0x31,
    WriteStatus3 = 0x11,
    ReadStatus1 = 0x05,
    ReadStatus2 = 0x35,
    ReadStatus3 = 0x15,
    PageProg = 0x02,
    QuadPageProg = 0x32,
    DualOutputFastRead = 0x3B,
    QuadIoFastRead = 0xEB,
    SectorErase = 0x20,
    Block32kErase = 0x52,
    Block64kErase = 0xD8,
    ChipErase = 0xC7,
    /// Read the 8-bit manufacturer and device IDs.
    ReadId = 0x90,
}

/// Status register selector for the GD25Q register accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StatusRegister {
    S1,
    S2,
    S3,
}

impl StatusRegister {
    fn opcodes(self) -> (Opcode, Opcode) {
        match self {
            StatusRegister::S1 => (Opcode::ReadStatus1, Opcode::WriteStatus1),
            StatusRegister::S2 => (Opcode::ReadStatus2, Opcode::WriteStatus2),
            StatusRegister::S3 => (Opcode::ReadStatus3, Opcode::WriteStatus3),
        }
    }
}

/// GD25Q command table.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gd25q;

impl Part for Gd25q {
    const ERASE_SHIFT: u32 = SECTOR_SHIFT;
    const ERASE_OPCODE: u8 = Opcode::SectorErase as u8;
    const CHIP_ERASE_OPCODE: u8 = Opcode::ChipErase as u8;

    fn fast_read(&self, mode: IoMode) -> FastRead {
        match mode {
            IoMode::Dual => FastRead {
                opcode: Opcode::DualOutputFastRead as u8,
                address_mode: IoMode::Standard,
                mode_byte: false,
                dummy_cycles: DUAL_OUTPUT_DUMMY_CYCLES,
                data_mode: IoMode::Dual,
            },
            // Address and M7-0 go out on four lines.
            IoMode::Standard | IoMode::Quad => FastRead {
                opcode: Opcode::QuadIoFastRead as u8,
                address_mode: IoMode::Quad,
                mode_byte: true,
                dummy_cycles: QUAD_IO_DUMMY_CYCLES,
                data_mode: IoMode::Quad,
            },
        }
    }

    fn program(&self, mode: IoMode) -> (u8, IoMode) {
        match mode {
            IoMode::Quad => (Opcode::QuadPageProg as u8, IoMode::Quad),
            // No dual-input program on this part.
            IoMode::Standard | IoMode::Dual => (Opcode::PageProg as u8, IoMode::Standard),
        }
    }
}

pub type Gd25qFlash<C, D = NoDelay> = FlashSpi<Gd25q, C, D>;

pub const fn sector_to_addr(sector: u32) -> u32 {
    sector << SECTOR_SHIFT
}

/// Sets or clears the QE bit, leaving the other bits of status register 2 alone.
pub const fn apply_quad_enable(status2: u8, enable: bool) -> u8 {
    if enable {
        status2 | QE_BIT
    } else {
        status2 & !QE_BIT
    }
}

impl<C, D> FlashSpi<Gd25q, C, D>
where
    C: SpiController,
    D: DelayNs,
{
    /// Reads the manufacturer and device ID (90h with address 000000h).
    pub fn read_id(&mut self) -> Result<Gd25qId, Error<C>> {
        let mut response = [0u8; Gd25qId::LEN];
        self.command_with_response(&[Opcode::ReadId as u8, 0, 0, 0], &mut response)?;
        Ok(Gd25qId::from_bytes(response))
    }

    pub fn read_status_register(&mut self, register: StatusRegister) -> Result<u8, Error<C>> {
        let (read, _) = register.opcodes();
        self.read_reg(read as u8)
    }

    /// Writes one status register inside a write enable bracket and waits for
    /// the non-volatile write to finish.
    pub fn write_status_register(
        &mut self,
        register: StatusRegister,
        value: u8,
    ) -> Result<(), Error<C>> {
        let (read, write) = register.opcodes();
        self.modify_reg(read as u8, write as u8, |_| value)?;
        Ok(())
    }

    /// Sector erase (20h). Sets the 4 KiB sector number `sector` to FFh.
    pub fn sector_erase(&mut self, sector: u32) -> Result<(), Error<C>> {
        self.erase_at(Opcode::SectorErase as u8, sector_to_addr(sector))
    }

    /// 32 KiB block erase (52h).
    pub fn block32k_erase(&mut self, block: u32) -> Result<(), Error<C>> {
        self.erase_at(Opcode::Block32kErase as u8, block << BLOCK32K_SHIFT)
    }

    /// 64 KiB block erase (D8h).
    pub fn block64k_erase(&mut self, block: u32) -> Result<(), Error<C>> {
        self.erase_at(Opcode::Block64kErase as u8, block << BLOCK64K_SHIFT)
    }

    /// Sets or clears QE in status register 2. The controller side is
    /// switched separately with `set_spi_mode`.
    pub fn enable_quad_mode(&mut self, enable: bool) -> Result<(), Error<C>> {
        let status2 = self.modify_reg(
            Opcode::ReadStatus2 as u8,
            Opcode::WriteStatus2 as u8,
            |status2| apply_quad_enable(status2, enable),
        )?;
        debug!("GD25Q status register 2: {=u8:#010b}", status2);
        Ok(())
    }
}
