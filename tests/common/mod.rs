//! A simulated SPI NOR chip sitting behind a `SpiController`.
//!
//! Every chip-select window is logged with the width each byte was clocked
//! at. The chip models the write enable latch, a busy countdown after
//! destructive commands, AND-only programming, and the configuration
//! registers the drivers touch. Fast reads are modeled clock by clock: the
//! chip starts driving data after exactly the configured number of dummy
//! clocks, so a miscounted dummy phase shows up as shifted data. Anything a
//! real chip would reject or misinterpret, and any access outside the
//! simulated array, is recorded in `violations` instead of panicking, so tests
//! can assert on it.
#![allow(dead_code)]

use std::convert::Infallible;

use embedded_hal::spi::{ErrorType, Mode};
use gd25q_n25q_nor_flash_rs::{BitOrder, IoMode, Role, SpiController};

pub const SIM_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chip {
    Gd25q,
    N25q,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    pub sent: Vec<(u8, IoMode)>,
    pub received: Vec<(u8, IoMode)>,
    pub started_busy: bool,
    /// Bytes received before the driver reset the RX FIFO.
    pub rx_reset_at: Option<usize>,
}

impl Transaction {
    pub fn opcode(&self) -> u8 {
        self.sent.first().map(|&(b, _)| b).unwrap_or(0)
    }

    pub fn sent_bytes(&self) -> Vec<u8> {
        self.sent.iter().map(|&(b, _)| b).collect()
    }

    pub fn received_bytes(&self) -> Vec<u8> {
        self.received.iter().map(|&(b, _)| b).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerState {
    pub clk_div: Option<u16>,
    pub role: Option<Role>,
    pub clock_mode: Option<Mode>,
    pub bit_order: Option<BitOrder>,
    pub ss_delay: Option<u8>,
    pub ss_software: bool,
    pub enabled: bool,
    /// Order in which configuration calls arrived.
    pub calls: Vec<&'static str>,
}

pub struct SimFlash {
    pub chip: Chip,
    pub mem: Vec<u8>,
    pub io_mode: IoMode,
    pub selected: bool,
    pub log: Vec<Transaction>,
    pub violations: Vec<String>,
    pub wel: bool,
    /// Status reads still reporting busy.
    pub busy_for: u32,
    /// Busy reads reported after each accepted erase or program.
    pub op_busy_polls: u32,
    pub status1: u8,
    pub status2: u8,
    pub status3: u8,
    pub evcr: u8,
    pub vcr: u8,
    pub flag: u8,
    pub id: Vec<u8>,
    pub ctrl: ControllerState,
    pub rx_resets: usize,
    current: Option<Transaction>,
    data_reads: usize,
}

impl SimFlash {
    fn new(chip: Chip, id: &[u8]) -> Self {
        Self {
            chip,
            mem: vec![0x00; SIM_SIZE],
            io_mode: IoMode::Standard,
            selected: false,
            log: Vec::new(),
            violations: Vec::new(),
            wel: false,
            busy_for: 0,
            op_busy_polls: 3,
            status1: 0,
            status2: 0,
            status3: 0,
            evcr: 0xFF,
            // 10 dummy clocks, XIP off, wrap disabled.
            vcr: 0xAB,
            flag: 0x80,
            id: id.to_vec(),
            ctrl: ControllerState::default(),
            rx_resets: 0,
            current: None,
            data_reads: 0,
        }
    }

    pub fn gd25q() -> Self {
        Self::new(Chip::Gd25q, &[0xC8, 0x40])
    }

    pub fn n25q() -> Self {
        Self::new(Chip::N25q, &[0x20, 0xBA, 0x17])
    }

    pub fn opcodes(&self) -> Vec<u8> {
        self.log.iter().map(Transaction::opcode).collect()
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
        self.violations.clear();
    }

    pub fn fill(&mut self, addr: usize, data: &[u8]) {
        self.mem[addr..addr + data.len()].copy_from_slice(data);
    }

    fn violation(&mut self, what: impl Into<String>) {
        self.violations.push(what.into());
    }

    fn status(&mut self) -> u8 {
        let busy = self.busy_for > 0;
        if busy {
            self.busy_for -= 1;
            if self.busy_for == 0 {
                self.wel = false;
            }
        }
        (self.status1 & 0b1111_1100) | ((self.wel as u8) << 1) | busy as u8
    }

    fn address(sent: &[(u8, IoMode)]) -> usize {
        let bytes: Vec<u8> = sent.iter().skip(1).take(3).map(|&(b, _)| b).collect();
        if bytes.len() < 3 {
            return 0;
        }
        (bytes[0] as usize) << 16 | (bytes[1] as usize) << 8 | bytes[2] as usize
    }

    fn mem_at(&mut self, addr: usize) -> u8 {
        match self.mem.get(addr) {
            Some(&byte) => byte,
            None => {
                self.violation(format!("read of {addr:#x} beyond the simulated array"));
                0xFF
            }
        }
    }

    /// Dummy clocks the chip inserts for the N25Q VCR field; 0 and 15 select
    /// the default of 10.
    fn n25q_dummy_cycles(&self) -> usize {
        match self.vcr >> 4 {
            0 | 15 => 10,
            n => n as usize,
        }
    }

    /// Dummy clocks and data width of a fast read opcode.
    fn fast_read(&self, opcode: u8) -> Option<(usize, IoMode)> {
        match (self.chip, opcode) {
            (Chip::Gd25q, 0xEB) => Some((4, IoMode::Quad)),
            (Chip::Gd25q, 0x3B) => Some((8, IoMode::Dual)),
            (Chip::N25q, 0x6B) => Some((self.n25q_dummy_cycles(), IoMode::Quad)),
            (Chip::N25q, 0x3B) => Some((self.n25q_dummy_cycles(), IoMode::Dual)),
            _ => None,
        }
    }

    /// Byte number `index` of a fast read response. Each clock carries
    /// `lines` bits; the chip drives ones during the dummy clocks and the data
    /// at `addr` MSB first after them.
    fn fast_read_byte(&mut self, addr: usize, index: usize, dummy: usize, width: IoMode) -> u8 {
        let lines = width.lines() as usize;
        let mask = (1u8 << lines) - 1;
        let per_byte = 8 / lines;
        let mut byte = 0u8;
        for k in 0..per_byte {
            let clock = index * per_byte + k;
            let group = if clock < dummy {
                mask
            } else {
                let bit = (clock - dummy) * lines;
                (self.mem_at(addr + bit / 8) >> (8 - lines - bit % 8)) & mask
            };
            byte = (byte << lines) | group;
        }
        byte
    }

    /// Width the address phase of `opcode` must use.
    fn address_width(&self, opcode: u8) -> IoMode {
        match (self.chip, opcode) {
            (Chip::Gd25q, 0xEB) => IoMode::Quad,
            _ => IoMode::Standard,
        }
    }

    fn respond(&mut self) -> u8 {
        let Some(current) = self.current.as_ref() else {
            self.violation("read without chip select");
            return 0xFF;
        };
        let opcode = current.opcode();
        let index = current.received.len();
        let addr = Self::address(&current.sent);

        if let Some((dummy, width)) = self.fast_read(opcode) {
            if self.io_mode != width {
                self.violation(format!("fast read {opcode:#04x} clocked at {:?}", self.io_mode));
            }
            return self.fast_read_byte(addr, index, dummy, width);
        }

        if self.io_mode != IoMode::Standard {
            self.violation(format!("{opcode:#04x} response clocked at {:?}", self.io_mode));
        }
        match opcode {
            0x05 => self.status(),
            0x35 => self.status2,
            0x15 => self.status3,
            0x65 => self.evcr,
            0x85 => self.vcr,
            0x70 => self.flag,
            0x90 if self.chip == Chip::Gd25q => self.id.get(index).copied().unwrap_or(0xFF),
            0x9F | 0xAF if self.chip == Chip::N25q => self.id.get(index).copied().unwrap_or(0xFF),
            0x03 => {
                let byte = self.mem_at(addr + self.data_reads);
                self.data_reads += 1;
                byte
            }
            other => {
                self.violation(format!("unexpected read during {other:#04x}"));
                0xFF
            }
        }
    }

    fn begin_busy_op(&mut self) {
        self.busy_for = self.op_busy_polls;
        if self.busy_for == 0 {
            self.wel = false;
        }
    }

    fn erase(&mut self, addr: usize, size: usize) {
        let start = addr & !(size - 1);
        match self.mem.get_mut(start..start + size) {
            Some(unit) => unit.fill(0xFF),
            None => self.violation(format!("erase of {start:#x} beyond the simulated array")),
        }
        self.begin_busy_op();
    }

    fn program(&mut self, t: &Transaction, width: IoMode) {
        let addr = Self::address(&t.sent);
        let page = addr & !0xFF;
        if page + 0x100 > self.mem.len() {
            self.violation(format!("program of {addr:#x} beyond the simulated array"));
            self.begin_busy_op();
            return;
        }
        for (i, &(byte, w)) in t.sent.iter().skip(4).enumerate() {
            if w != width {
                self.violation(format!("program data clocked at {w:?}, expected {width:?}"));
            }
            let offset = (addr + i) & 0xFF;
            self.mem[page + offset] &= byte;
        }
        self.begin_busy_op();
    }

    fn execute(&mut self, t: &Transaction) {
        let opcode = t.opcode();
        if t.sent.is_empty() {
            return;
        }
        if t.sent[0].1 != IoMode::Standard {
            self.violation(format!("opcode {opcode:#04x} clocked at {:?}", t.sent[0].1));
        }
        let address_width = self.address_width(opcode);
        if t.sent.iter().skip(1).take(3).any(|&(_, w)| w != address_width) {
            // Single-byte register writes carry data, not an address.
            if !matches!(opcode, 0x01 | 0x11 | 0x31 | 0x61 | 0x81) {
                self.violation(format!("address of {opcode:#04x} clocked at the wrong width"));
            }
        }
        if let Some((dummy, width)) = self.fast_read(opcode) {
            let clocked = t.rx_reset_at.unwrap_or(t.received.len()) * 8 / width.lines() as usize;
            if clocked != dummy {
                self.violation(format!(
                    "fast read {opcode:#04x} clocked {clocked} dummy cycles, chip expects {dummy}"
                ));
            }
        }
        if t.started_busy && !matches!(opcode, 0x05 | 0x70) {
            self.violation(format!("{opcode:#04x} issued while busy"));
            return;
        }

        let destructive = matches!(
            (self.chip, opcode),
            (_, 0x20 | 0xD8 | 0xC7 | 0x02 | 0x32 | 0x01 | 0x61 | 0x81)
                | (Chip::Gd25q, 0x52 | 0x31 | 0x11)
                | (Chip::N25q, 0xA2)
        );
        if destructive && !self.wel {
            self.violation(format!("{opcode:#04x} without write enable"));
            return;
        }

        let addr = Self::address(&t.sent);
        let data = t.sent.get(1).map(|&(b, _)| b).unwrap_or(0);
        match (self.chip, opcode) {
            (_, 0x06) => self.wel = true,
            (_, 0x04) => self.wel = false,
            (_, 0x20) => self.erase(addr, 4096),
            (Chip::Gd25q, 0x52) => self.erase(addr, 32 * 1024),
            (_, 0xD8) => self.erase(addr, 64 * 1024),
            (_, 0xC7) => self.erase(0, SIM_SIZE),
            (_, 0x02) => self.program(t, IoMode::Standard),
            (_, 0x32) => self.program(t, IoMode::Quad),
            (Chip::N25q, 0xA2) => self.program(t, IoMode::Dual),
            (_, 0x01) => {
                self.status1 = data;
                self.begin_busy_op();
            }
            (Chip::Gd25q, 0x31) => {
                self.status2 = data;
                self.begin_busy_op();
            }
            (Chip::Gd25q, 0x11) => {
                self.status3 = data;
                self.begin_busy_op();
            }
            (Chip::N25q, 0x61) => {
                self.evcr = data;
                self.wel = false;
            }
            (Chip::N25q, 0x81) => {
                self.vcr = data;
                self.wel = false;
            }
            (Chip::N25q, 0x50) => self.flag &= 0x80,
            _ => {}
        }
    }
}

impl ErrorType for SimFlash {
    type Error = Infallible;
}

impl SpiController for SimFlash {
    fn set_clock_divider(&mut self, div: u16) -> Result<(), Infallible> {
        self.ctrl.clk_div = Some(div);
        self.ctrl.calls.push("clk_div");
        Ok(())
    }

    fn set_role(&mut self, role: Role) -> Result<(), Infallible> {
        self.ctrl.role = Some(role);
        self.ctrl.calls.push("role");
        Ok(())
    }

    fn set_io_mode(&mut self, mode: IoMode) -> Result<(), Infallible> {
        self.io_mode = mode;
        if self.current.is_none() {
            self.ctrl.calls.push("io_mode");
        }
        Ok(())
    }

    fn set_clock_mode(&mut self, mode: Mode) -> Result<(), Infallible> {
        self.ctrl.clock_mode = Some(mode);
        self.ctrl.calls.push("clock_mode");
        Ok(())
    }

    fn set_bit_order(&mut self, order: BitOrder) -> Result<(), Infallible> {
        self.ctrl.bit_order = Some(order);
        self.ctrl.calls.push("bit_order");
        Ok(())
    }

    fn set_ss_delay(&mut self, clocks: u8) -> Result<(), Infallible> {
        self.ctrl.ss_delay = Some(clocks);
        self.ctrl.calls.push("ss_delay");
        Ok(())
    }

    fn set_ss_software_control(&mut self, enabled: bool) -> Result<(), Infallible> {
        self.ctrl.ss_software = enabled;
        self.ctrl.calls.push("ss_software");
        Ok(())
    }

    fn set_ss_level(&mut self, high: bool) -> Result<(), Infallible> {
        match (high, self.current.take()) {
            (false, None) => {
                self.selected = true;
                self.data_reads = 0;
                self.current = Some(Transaction {
                    started_busy: self.busy_for > 0,
                    ..Transaction::default()
                });
            }
            (false, Some(t)) => {
                self.violation("chip select asserted twice");
                self.current = Some(t);
            }
            (true, Some(t)) => {
                self.selected = false;
                self.execute(&t);
                self.log.push(t);
            }
            (true, None) => {
                if self.ctrl.calls.last() != Some(&"ss_level") {
                    self.ctrl.calls.push("ss_level");
                }
            }
        }
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), Infallible> {
        self.ctrl.enabled = enabled;
        self.ctrl.calls.push("enable");
        Ok(())
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), Infallible> {
        let mode = self.io_mode;
        match self.current.as_mut() {
            Some(t) => t.sent.extend(data.iter().map(|&b| (b, mode))),
            None => self.violation("write without chip select"),
        }
        Ok(())
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<(), Infallible> {
        for byte in buf.iter_mut() {
            *byte = self.respond();
            let mode = self.io_mode;
            if let Some(t) = self.current.as_mut() {
                t.received.push((*byte, mode));
            }
        }
        Ok(())
    }

    fn reset_rx_fifo(&mut self) -> Result<(), Infallible> {
        self.rx_resets += 1;
        if let Some(t) = self.current.as_mut() {
            t.rx_reset_at = Some(t.received.len());
        }
        Ok(())
    }
}
