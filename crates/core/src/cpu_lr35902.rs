//! Sharp LR35902 CPU core (Game Boy CPU)
//!
//! A Z80 relative with the index registers, shadow registers and I/O space
//! removed, and a handful of memory-mapped high-page loads added.
//!
//! The core is generic over [`MemoryLr35902`], so it runs against the full
//! machine bus as well as a flat 64 KiB array in tests. [`CpuLr35902::step`]
//! either services one interrupt or executes one instruction and returns the
//! T-cycles it took (always a multiple of 4).
//!
//! Opcodes are decoded from their bit fields (`xx yyy zzz`, with `yyy` split
//! into `pp q` for register-pair forms) instead of a flat 256-entry table.
//!
//! The eleven undefined opcodes (D3 DB DD E3 E4 EB EC ED F4 FC FD) execute as
//! 4-cycle no-ops. Each one is counted, remembered in
//! [`CpuLr35902::last_illegal_opcode`] and logged as a warning.

use serde::{Deserialize, Serialize};

use crate::logging::{log, LogCategory, LogLevel};
use crate::Cpu;

// Flag bit positions (in F register)
pub const FLAG_Z: u8 = 0b1000_0000; // Zero
pub const FLAG_N: u8 = 0b0100_0000; // Subtract (BCD)
pub const FLAG_H: u8 = 0b0010_0000; // Half Carry (BCD)
pub const FLAG_C: u8 = 0b0001_0000; // Carry

/// Interrupt-enable register address.
pub const IE_ADDR: u16 = 0xFFFF;
/// Interrupt-flag register address.
pub const IF_ADDR: u16 = 0xFF0F;

/// Handler addresses, indexed by IF/IE bit (lowest bit = highest priority).
pub const INTERRUPT_VECTORS: [u16; 5] = [0x0040, 0x0048, 0x0050, 0x0058, 0x0060];

/// Push PC + jump, including the two wait states.
const INTERRUPT_DISPATCH_CYCLES: u32 = 20;

/// Memory interface trait for the LR35902 CPU
pub trait MemoryLr35902 {
    /// Read a byte from memory
    fn read(&self, addr: u16) -> u8;

    /// Write a byte to memory
    fn write(&mut self, addr: u16, val: u8);

    /// Interrupts that are both requested and enabled, in the low five bits.
    fn pending_interrupts(&self) -> u8 {
        self.read(IE_ADDR) & self.read(IF_ADDR) & 0x1F
    }

    /// Clear the request bit of the interrupt being dispatched.
    fn acknowledge_interrupt(&mut self, bit: u8) {
        let flags = self.read(IF_ADDR);
        self.write(IF_ADDR, flags & !(1 << bit));
    }
}

/// Register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub sp: u16,
    pub pc: u16,
}

impl Registers {
    /// Values the DMG boot ROM leaves behind when it jumps to the cartridge.
    pub const fn post_boot() -> Self {
        Self {
            a: 0x01,
            f: 0xB0,
            b: 0x00,
            c: 0x13,
            d: 0x00,
            e: 0xD8,
            h: 0x01,
            l: 0x4D,
            sp: 0xFFFE,
            pc: 0x0100,
        }
    }

    pub fn af(&self) -> u16 {
        u16::from_be_bytes([self.a, self.f])
    }

    pub fn set_af(&mut self, val: u16) {
        let [a, f] = val.to_be_bytes();
        self.a = a;
        self.f = f & 0xF0; // Lower 4 bits always 0
    }

    pub fn bc(&self) -> u16 {
        u16::from_be_bytes([self.b, self.c])
    }

    pub fn set_bc(&mut self, val: u16) {
        [self.b, self.c] = val.to_be_bytes();
    }

    pub fn de(&self) -> u16 {
        u16::from_be_bytes([self.d, self.e])
    }

    pub fn set_de(&mut self, val: u16) {
        [self.d, self.e] = val.to_be_bytes();
    }

    pub fn hl(&self) -> u16 {
        u16::from_be_bytes([self.h, self.l])
    }

    pub fn set_hl(&mut self, val: u16) {
        [self.h, self.l] = val.to_be_bytes();
    }

    #[inline]
    pub fn flag(&self, flag: u8) -> bool {
        self.f & flag != 0
    }

    #[inline]
    pub fn set_flag(&mut self, flag: u8, on: bool) {
        if on {
            self.f |= flag;
        } else {
            self.f &= !flag;
        }
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::post_boot()
    }
}

/// An undefined opcode the core stepped over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IllegalOpcode {
    pub addr: u16,
    pub opcode: u8,
}

/// Serializable snapshot of everything but the memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuState {
    pub regs: Registers,
    pub ime: bool,
    pub ime_pending: bool,
    pub halted: bool,
    pub stopped: bool,
    pub cycles: u64,
}

/// Sharp LR35902 CPU state
#[derive(Debug)]
pub struct CpuLr35902<M: MemoryLr35902> {
    pub regs: Registers,
    /// Interrupt Master Enable flag
    pub ime: bool,
    /// Set by EI; IME turns on after the next instruction
    ime_pending: bool,
    pub halted: bool,
    /// STOP; treated like HALT, woken by any enabled pending interrupt
    pub stopped: bool,
    /// Total cycles executed
    pub cycles: u64,
    pub illegal_opcodes: u64,
    pub last_illegal_opcode: Option<IllegalOpcode>,
    pub memory: M,
}

impl<M: MemoryLr35902> CpuLr35902<M> {
    /// CPU in post-boot state, ready to run cartridge code at 0x0100.
    pub fn new(memory: M) -> Self {
        Self {
            regs: Registers::post_boot(),
            ime: false,
            ime_pending: false,
            halted: false,
            stopped: false,
            cycles: 0,
            illegal_opcodes: 0,
            last_illegal_opcode: None,
            memory,
        }
    }

    pub fn state(&self) -> CpuState {
        CpuState {
            regs: self.regs,
            ime: self.ime,
            ime_pending: self.ime_pending,
            halted: self.halted,
            stopped: self.stopped,
            cycles: self.cycles,
        }
    }

    pub fn restore(&mut self, state: &CpuState) {
        self.regs = state.regs;
        self.regs.f &= 0xF0;
        self.ime = state.ime;
        self.ime_pending = state.ime_pending;
        self.halted = state.halted;
        self.stopped = state.stopped;
        self.cycles = state.cycles;
    }

    /// Service one pending interrupt or execute one instruction.
    pub fn step(&mut self) -> u32 {
        let cycles = self.step_inner();
        self.cycles += cycles as u64;
        cycles
    }

    fn step_inner(&mut self) -> u32 {
        let pending = self.memory.pending_interrupts();

        if self.halted || self.stopped {
            if pending == 0 {
                return 4;
            }
            // Wakes even with IME off; the handler only runs when IME is on.
            self.halted = false;
            self.stopped = false;
        }

        if self.ime && pending != 0 {
            return self.dispatch_interrupt(pending);
        }

        let enable_ime = self.ime_pending;
        let opcode = self.fetch();
        let cycles = self.execute(opcode);
        if enable_ime && self.ime_pending {
            self.ime = true;
            self.ime_pending = false;
        }
        cycles
    }

    fn dispatch_interrupt(&mut self, pending: u8) -> u32 {
        let bit = pending.trailing_zeros() as u8;
        let vector = INTERRUPT_VECTORS[bit as usize];
        self.memory.acknowledge_interrupt(bit);
        self.ime = false;
        self.ime_pending = false;
        let return_addr = self.regs.pc;
        self.push(return_addr);
        self.regs.pc = vector;
        log(LogCategory::Interrupts, LogLevel::Trace, || {
            format!("dispatch bit {bit} to {vector:04X} (return {return_addr:04X})")
        });
        INTERRUPT_DISPATCH_CYCLES
    }

    fn fetch(&mut self) -> u8 {
        let val = self.memory.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        val
    }

    fn fetch_u16(&mut self) -> u16 {
        let lo = self.fetch();
        let hi = self.fetch();
        u16::from_le_bytes([lo, hi])
    }

    fn push(&mut self, val: u16) {
        let [hi, lo] = val.to_be_bytes();
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.memory.write(self.regs.sp, hi);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.memory.write(self.regs.sp, lo);
    }

    fn pop(&mut self) -> u16 {
        let lo = self.memory.read(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(1);
        let hi = self.memory.read(self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(1);
        u16::from_le_bytes([lo, hi])
    }

    /// Operand `r[idx]`: B C D E H L (HL) A.
    fn read_r8(&self, idx: u8) -> u8 {
        match idx & 7 {
            0 => self.regs.b,
            1 => self.regs.c,
            2 => self.regs.d,
            3 => self.regs.e,
            4 => self.regs.h,
            5 => self.regs.l,
            6 => self.memory.read(self.regs.hl()),
            _ => self.regs.a,
        }
    }

    fn write_r8(&mut self, idx: u8, val: u8) {
        match idx & 7 {
            0 => self.regs.b = val,
            1 => self.regs.c = val,
            2 => self.regs.d = val,
            3 => self.regs.e = val,
            4 => self.regs.h = val,
            5 => self.regs.l = val,
            6 => self.memory.write(self.regs.hl(), val),
            _ => self.regs.a = val,
        }
    }

    /// Register pair `rp[p]`: BC DE HL SP.
    fn read_rp(&self, p: u8) -> u16 {
        match p & 3 {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.regs.hl(),
            _ => self.regs.sp,
        }
    }

    fn write_rp(&mut self, p: u8, val: u16) {
        match p & 3 {
            0 => self.regs.set_bc(val),
            1 => self.regs.set_de(val),
            2 => self.regs.set_hl(val),
            _ => self.regs.sp = val,
        }
    }

    /// Condition `cc[y]`: NZ Z NC C.
    fn condition(&self, y: u8) -> bool {
        match y & 3 {
            0 => !self.regs.flag(FLAG_Z),
            1 => self.regs.flag(FLAG_Z),
            2 => !self.regs.flag(FLAG_C),
            _ => self.regs.flag(FLAG_C),
        }
    }

    fn set_znhc(&mut self, z: bool, n: bool, h: bool, c: bool) {
        self.regs.f = (if z { FLAG_Z } else { 0 })
            | (if n { FLAG_N } else { 0 })
            | (if h { FLAG_H } else { 0 })
            | (if c { FLAG_C } else { 0 });
    }

    /// `alu[op] A, val`: ADD ADC SUB SBC AND XOR OR CP.
    fn alu(&mut self, op: u8, val: u8) {
        let a = self.regs.a;
        let carry_in = (op == 1 || op == 3) && self.regs.flag(FLAG_C);
        let c = carry_in as u8;
        match op & 7 {
            0 | 1 => {
                let wide = a as u16 + val as u16 + c as u16;
                let result = wide as u8;
                self.set_znhc(result == 0, false, (a & 0x0F) + (val & 0x0F) + c > 0x0F, wide > 0xFF);
                self.regs.a = result;
            }
            2 | 3 | 7 => {
                let wide = (a as i16) - (val as i16) - (c as i16);
                let result = wide as u8;
                self.set_znhc(result == 0, true, (a & 0x0F) < (val & 0x0F) + c, wide < 0);
                if op != 7 {
                    self.regs.a = result;
                }
            }
            4 => {
                self.regs.a &= val;
                self.set_znhc(self.regs.a == 0, false, true, false);
            }
            5 => {
                self.regs.a ^= val;
                self.set_znhc(self.regs.a == 0, false, false, false);
            }
            _ => {
                self.regs.a |= val;
                self.set_znhc(self.regs.a == 0, false, false, false);
            }
        }
    }

    fn inc8(&mut self, val: u8) -> u8 {
        let result = val.wrapping_add(1);
        self.regs.set_flag(FLAG_Z, result == 0);
        self.regs.set_flag(FLAG_N, false);
        self.regs.set_flag(FLAG_H, val & 0x0F == 0x0F);
        result
    }

    fn dec8(&mut self, val: u8) -> u8 {
        let result = val.wrapping_sub(1);
        self.regs.set_flag(FLAG_Z, result == 0);
        self.regs.set_flag(FLAG_N, true);
        self.regs.set_flag(FLAG_H, val & 0x0F == 0);
        result
    }

    fn add_hl(&mut self, val: u16) {
        let hl = self.regs.hl();
        let (result, carry) = hl.overflowing_add(val);
        self.regs.set_flag(FLAG_N, false);
        self.regs.set_flag(FLAG_H, (hl & 0x0FFF) + (val & 0x0FFF) > 0x0FFF);
        self.regs.set_flag(FLAG_C, carry);
        self.regs.set_hl(result);
    }

    /// SP + signed offset; flags come from the unsigned low-byte add.
    fn sp_offset(&mut self) -> u16 {
        let offset = self.fetch();
        let sp = self.regs.sp;
        let half = (sp & 0x000F) + (offset as u16 & 0x000F) > 0x000F;
        let carry = (sp & 0x00FF) + (offset as u16) > 0x00FF;
        self.set_znhc(false, false, half, carry);
        sp.wrapping_add(offset as i8 as u16)
    }

    /// `rot[op]`: RLC RRC RL RR SLA SRA SWAP SRL. Sets Z and C, clears N and H.
    fn rotate(&mut self, op: u8, val: u8) -> u8 {
        let carry_in = self.regs.flag(FLAG_C) as u8;
        let (result, carry) = match op & 7 {
            0 => (val.rotate_left(1), val & 0x80 != 0),
            1 => (val.rotate_right(1), val & 0x01 != 0),
            2 => ((val << 1) | carry_in, val & 0x80 != 0),
            3 => ((val >> 1) | (carry_in << 7), val & 0x01 != 0),
            4 => (val << 1, val & 0x80 != 0),
            5 => ((val >> 1) | (val & 0x80), val & 0x01 != 0),
            6 => (val.rotate_left(4), false),
            _ => (val >> 1, val & 0x01 != 0),
        };
        self.set_znhc(result == 0, false, false, carry);
        result
    }

    fn daa(&mut self) {
        let mut a = self.regs.a;
        let mut carry = self.regs.flag(FLAG_C);
        if self.regs.flag(FLAG_N) {
            if carry {
                a = a.wrapping_sub(0x60);
            }
            if self.regs.flag(FLAG_H) {
                a = a.wrapping_sub(0x06);
            }
        } else {
            if carry || a > 0x99 {
                a = a.wrapping_add(0x60);
                carry = true;
            }
            if self.regs.flag(FLAG_H) || a & 0x0F > 0x09 {
                a = a.wrapping_add(0x06);
            }
        }
        self.regs.a = a;
        let n = self.regs.flag(FLAG_N);
        self.set_znhc(a == 0, n, false, carry);
    }

    fn jump_relative(&mut self, taken: bool) -> u32 {
        let offset = self.fetch() as i8;
        if taken {
            self.regs.pc = self.regs.pc.wrapping_add(offset as u16);
            12
        } else {
            8
        }
    }

    fn call(&mut self, taken: bool) -> u32 {
        let addr = self.fetch_u16();
        if taken {
            let ret = self.regs.pc;
            self.push(ret);
            self.regs.pc = addr;
            24
        } else {
            12
        }
    }

    fn illegal(&mut self, opcode: u8) -> u32 {
        let addr = self.regs.pc.wrapping_sub(1);
        self.illegal_opcodes += 1;
        self.last_illegal_opcode = Some(IllegalOpcode { addr, opcode });
        log(LogCategory::Cpu, LogLevel::Warn, || {
            format!("illegal opcode {opcode:02X} at {addr:04X}, executed as NOP")
        });
        4
    }

    fn execute(&mut self, opcode: u8) -> u32 {
        let x = opcode >> 6;
        let y = (opcode >> 3) & 7;
        let z = opcode & 7;
        let p = y >> 1;
        let q = y & 1;

        match (x, z) {
            (0, 0) => match y {
                0 => 4, // NOP
                1 => {
                    // LD (a16),SP
                    let addr = self.fetch_u16();
                    let [lo, hi] = self.regs.sp.to_le_bytes();
                    self.memory.write(addr, lo);
                    self.memory.write(addr.wrapping_add(1), hi);
                    20
                }
                2 => {
                    // STOP is two bytes long
                    self.fetch();
                    self.stopped = true;
                    4
                }
                3 => self.jump_relative(true),
                _ => {
                    let taken = self.condition(y - 4);
                    self.jump_relative(taken)
                }
            },
            (0, 1) => {
                if q == 0 {
                    let val = self.fetch_u16();
                    self.write_rp(p, val);
                    12
                } else {
                    self.add_hl(self.read_rp(p));
                    8
                }
            }
            (0, 2) => {
                // Indirect loads through BC, DE, HL+ and HL-
                let hl = self.regs.hl();
                let addr = match p {
                    0 => self.regs.bc(),
                    1 => self.regs.de(),
                    2 => {
                        self.regs.set_hl(hl.wrapping_add(1));
                        hl
                    }
                    _ => {
                        self.regs.set_hl(hl.wrapping_sub(1));
                        hl
                    }
                };
                if q == 0 {
                    self.memory.write(addr, self.regs.a);
                } else {
                    self.regs.a = self.memory.read(addr);
                }
                8
            }
            (0, 3) => {
                let val = self.read_rp(p);
                let val = if q == 0 { val.wrapping_add(1) } else { val.wrapping_sub(1) };
                self.write_rp(p, val);
                8
            }
            (0, 4) => {
                let val = self.read_r8(y);
                let result = self.inc8(val);
                self.write_r8(y, result);
                if y == 6 { 12 } else { 4 }
            }
            (0, 5) => {
                let val = self.read_r8(y);
                let result = self.dec8(val);
                self.write_r8(y, result);
                if y == 6 { 12 } else { 4 }
            }
            (0, 6) => {
                let val = self.fetch();
                self.write_r8(y, val);
                if y == 6 { 12 } else { 8 }
            }
            (0, _) => {
                match y {
                    // RLCA RRCA RLA RRA: like the CB forms but Z is always clear
                    0..=3 => {
                        self.regs.a = self.rotate(y, self.regs.a);
                        self.regs.set_flag(FLAG_Z, false);
                    }
                    4 => self.daa(),
                    5 => {
                        self.regs.a = !self.regs.a;
                        self.regs.set_flag(FLAG_N, true);
                        self.regs.set_flag(FLAG_H, true);
                    }
                    6 => {
                        self.regs.set_flag(FLAG_N, false);
                        self.regs.set_flag(FLAG_H, false);
                        self.regs.set_flag(FLAG_C, true);
                    }
                    _ => {
                        let carry = self.regs.flag(FLAG_C);
                        self.regs.set_flag(FLAG_N, false);
                        self.regs.set_flag(FLAG_H, false);
                        self.regs.set_flag(FLAG_C, !carry);
                    }
                }
                4
            }
            (1, _) => {
                if y == 6 && z == 6 {
                    self.halted = true;
                    return 4;
                }
                let val = self.read_r8(z);
                self.write_r8(y, val);
                if y == 6 || z == 6 { 8 } else { 4 }
            }
            (2, _) => {
                let val = self.read_r8(z);
                self.alu(y, val);
                if z == 6 { 8 } else { 4 }
            }
            (_, 0) => match y {
                0..=3 => {
                    if self.condition(y) {
                        self.regs.pc = self.pop();
                        20
                    } else {
                        8
                    }
                }
                4 => {
                    let addr = 0xFF00 | self.fetch() as u16;
                    self.memory.write(addr, self.regs.a);
                    12
                }
                5 => {
                    self.regs.sp = self.sp_offset();
                    16
                }
                6 => {
                    let addr = 0xFF00 | self.fetch() as u16;
                    self.regs.a = self.memory.read(addr);
                    12
                }
                _ => {
                    let val = self.sp_offset();
                    self.regs.set_hl(val);
                    12
                }
            },
            (_, 1) => {
                if q == 0 {
                    let val = self.pop();
                    match p {
                        0 => self.regs.set_bc(val),
                        1 => self.regs.set_de(val),
                        2 => self.regs.set_hl(val),
                        _ => self.regs.set_af(val),
                    }
                    return 12;
                }
                match p {
                    0 => {
                        self.regs.pc = self.pop();
                        16
                    }
                    1 => {
                        // RETI
                        self.regs.pc = self.pop();
                        self.ime = true;
                        16
                    }
                    2 => {
                        self.regs.pc = self.regs.hl();
                        4
                    }
                    _ => {
                        self.regs.sp = self.regs.hl();
                        8
                    }
                }
            }
            (_, 2) => match y {
                0..=3 => {
                    let addr = self.fetch_u16();
                    if self.condition(y) {
                        self.regs.pc = addr;
                        16
                    } else {
                        12
                    }
                }
                4 => {
                    self.memory.write(0xFF00 | self.regs.c as u16, self.regs.a);
                    8
                }
                5 => {
                    let addr = self.fetch_u16();
                    self.memory.write(addr, self.regs.a);
                    16
                }
                6 => {
                    self.regs.a = self.memory.read(0xFF00 | self.regs.c as u16);
                    8
                }
                _ => {
                    let addr = self.fetch_u16();
                    self.regs.a = self.memory.read(addr);
                    16
                }
            },
            (_, 3) => match y {
                0 => {
                    self.regs.pc = self.fetch_u16();
                    16
                }
                1 => {
                    let cb = self.fetch();
                    self.execute_cb(cb)
                }
                6 => {
                    self.ime = false;
                    self.ime_pending = false;
                    4
                }
                7 => {
                    self.ime_pending = true;
                    4
                }
                _ => self.illegal(opcode),
            },
            (_, 4) => {
                if y < 4 {
                    let taken = self.condition(y);
                    self.call(taken)
                } else {
                    self.illegal(opcode)
                }
            }
            (_, 5) => {
                if q == 0 {
                    let val = match p {
                        0 => self.regs.bc(),
                        1 => self.regs.de(),
                        2 => self.regs.hl(),
                        _ => self.regs.af(),
                    };
                    self.push(val);
                    16
                } else if p == 0 {
                    self.call(true)
                } else {
                    self.illegal(opcode)
                }
            }
            (_, 6) => {
                let val = self.fetch();
                self.alu(y, val);
                8
            }
            _ => {
                // RST
                let ret = self.regs.pc;
                self.push(ret);
                self.regs.pc = (y as u16) * 8;
                16
            }
        }
    }

    fn execute_cb(&mut self, opcode: u8) -> u32 {
        let y = (opcode >> 3) & 7;
        let z = opcode & 7;
        let val = self.read_r8(z);
        let on_hl = z == 6;

        match opcode >> 6 {
            0 => {
                let result = self.rotate(y, val);
                self.write_r8(z, result);
            }
            1 => {
                // BIT leaves C alone and never writes back
                self.regs.set_flag(FLAG_Z, val & (1 << y) == 0);
                self.regs.set_flag(FLAG_N, false);
                self.regs.set_flag(FLAG_H, true);
                return if on_hl { 12 } else { 8 };
            }
            2 => self.write_r8(z, val & !(1 << y)),
            _ => self.write_r8(z, val | (1 << y)),
        }
        if on_hl { 16 } else { 8 }
    }
}

impl<M: MemoryLr35902> Cpu for CpuLr35902<M> {
    fn reset(&mut self) {
        self.regs = Registers::post_boot();
        self.ime = false;
        self.ime_pending = false;
        self.halted = false;
        self.stopped = false;
        self.cycles = 0;
        self.illegal_opcodes = 0;
        self.last_illegal_opcode = None;
    }

    fn step(&mut self) -> u32 {
        CpuLr35902::step(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ArrayMemory {
        data: Vec<u8>,
    }

    impl ArrayMemory {
        fn with_program(program: &[u8]) -> Self {
            let mut data = vec![0u8; 0x10000];
            data[0x0100..0x0100 + program.len()].copy_from_slice(program);
            Self { data }
        }
    }

    impl MemoryLr35902 for ArrayMemory {
        fn read(&self, addr: u16) -> u8 {
            self.data[addr as usize]
        }

        fn write(&mut self, addr: u16, val: u8) {
            self.data[addr as usize] = val;
        }
    }

    fn cpu_with(program: &[u8]) -> CpuLr35902<ArrayMemory> {
        CpuLr35902::new(ArrayMemory::with_program(program))
    }

    #[test]
    fn test_post_boot_registers() {
        let cpu = cpu_with(&[]);
        assert_eq!(cpu.regs.af(), 0x01B0);
        assert_eq!(cpu.regs.bc(), 0x0013);
        assert_eq!(cpu.regs.de(), 0x00D8);
        assert_eq!(cpu.regs.hl(), 0x014D);
        assert_eq!(cpu.regs.sp, 0xFFFE);
        assert_eq!(cpu.regs.pc, 0x0100);
    }

    #[test]
    fn test_add_half_carry_and_carry() {
        // LD A,0x0F ; ADD A,0x01 ; LD A,0xFF ; ADD A,0x01
        let mut cpu = cpu_with(&[0x3E, 0x0F, 0xC6, 0x01, 0x3E, 0xFF, 0xC6, 0x01]);
        cpu.step();
        assert_eq!(cpu.step(), 8);
        assert_eq!(cpu.regs.a, 0x10);
        assert_eq!(cpu.regs.f, FLAG_H);
        cpu.step();
        cpu.step();
        assert_eq!(cpu.regs.a, 0x00);
        assert_eq!(cpu.regs.f, FLAG_Z | FLAG_H | FLAG_C);
    }

    #[test]
    fn test_cp_does_not_store() {
        // LD A,0x10 ; CP 0x20
        let mut cpu = cpu_with(&[0x3E, 0x10, 0xFE, 0x20]);
        cpu.step();
        cpu.step();
        assert_eq!(cpu.regs.a, 0x10);
        assert_eq!(cpu.regs.f, FLAG_N | FLAG_C);
    }

    #[test]
    fn test_sbc_uses_carry() {
        // SCF ; LD A,0x10 ; SBC A,0x0F
        let mut cpu = cpu_with(&[0x37, 0x3E, 0x10, 0xDE, 0x0F]);
        cpu.step();
        cpu.step();
        cpu.step();
        assert_eq!(cpu.regs.a, 0x00);
        assert_eq!(cpu.regs.f, FLAG_Z | FLAG_N | FLAG_H);
    }

    #[test]
    fn test_daa_after_add() {
        // LD A,0x45 ; ADD A,0x38 ; DAA
        let mut cpu = cpu_with(&[0x3E, 0x45, 0xC6, 0x38, 0x27]);
        cpu.step();
        cpu.step();
        cpu.step();
        assert_eq!(cpu.regs.a, 0x83);
        assert!(!cpu.regs.flag(FLAG_C));
        assert!(!cpu.regs.flag(FLAG_H));
    }

    #[test]
    fn test_inc_dec_hl_indirect() {
        // LD HL,0xC000 ; LD (HL),0xFF ; INC (HL) ; DEC (HL)
        let mut cpu = cpu_with(&[0x21, 0x00, 0xC0, 0x36, 0xFF, 0x34, 0x35]);
        cpu.step();
        assert_eq!(cpu.step(), 12);
        assert_eq!(cpu.step(), 12);
        assert_eq!(cpu.memory.data[0xC000], 0x00);
        assert!(cpu.regs.flag(FLAG_Z));
        assert!(cpu.regs.flag(FLAG_H));
        cpu.step();
        assert_eq!(cpu.memory.data[0xC000], 0xFF);
        assert!(cpu.regs.flag(FLAG_N));
    }

    #[test]
    fn test_jr_cycle_counts() {
        // XOR A ; JR NZ,+2 ; JR Z,+2
        let mut cpu = cpu_with(&[0xAF, 0x20, 0x02, 0x28, 0x02]);
        cpu.step();
        assert_eq!(cpu.step(), 8);
        assert_eq!(cpu.regs.pc, 0x0103);
        assert_eq!(cpu.step(), 12);
        assert_eq!(cpu.regs.pc, 0x0107);
    }

    #[test]
    fn test_call_and_ret() {
        // CALL 0x0200 ... at 0x0200: RET
        let mut cpu = cpu_with(&[0xCD, 0x00, 0x02]);
        cpu.memory.data[0x0200] = 0xC9;
        assert_eq!(cpu.step(), 24);
        assert_eq!(cpu.regs.pc, 0x0200);
        assert_eq!(cpu.regs.sp, 0xFFFC);
        assert_eq!(cpu.memory.data[0xFFFC], 0x03);
        assert_eq!(cpu.memory.data[0xFFFD], 0x01);
        assert_eq!(cpu.step(), 16);
        assert_eq!(cpu.regs.pc, 0x0103);
    }

    #[test]
    fn test_pop_af_masks_low_nibble() {
        // LD BC,0x12FF ; PUSH BC ; POP AF
        let mut cpu = cpu_with(&[0x01, 0xFF, 0x12, 0xC5, 0xF1]);
        cpu.step();
        cpu.step();
        cpu.step();
        assert_eq!(cpu.regs.a, 0x12);
        assert_eq!(cpu.regs.f, 0xF0);
    }

    #[test]
    fn test_cb_ops_on_hl() {
        // LD HL,0xC000 ; SET 7,(HL) ; BIT 7,(HL) ; SWAP (HL) ; RES 3,(HL)
        let mut cpu = cpu_with(&[0x21, 0x00, 0xC0, 0xCB, 0xFE, 0xCB, 0x7E, 0xCB, 0x36, 0xCB, 0x9E]);
        cpu.step();
        assert_eq!(cpu.step(), 16);
        assert_eq!(cpu.memory.data[0xC000], 0x80);
        assert_eq!(cpu.step(), 12);
        assert!(!cpu.regs.flag(FLAG_Z));
        cpu.step();
        assert_eq!(cpu.memory.data[0xC000], 0x08);
        cpu.step();
        assert_eq!(cpu.memory.data[0xC000], 0x00);
    }

    #[test]
    fn test_add_sp_negative_offset() {
        // LD SP,0x0005 ; ADD SP,-1 ; LD HL,SP+2
        let mut cpu = cpu_with(&[0x31, 0x05, 0x00, 0xE8, 0xFF, 0xF8, 0x02]);
        cpu.step();
        assert_eq!(cpu.step(), 16);
        assert_eq!(cpu.regs.sp, 0x0004);
        assert_eq!(cpu.regs.f, FLAG_H | FLAG_C);
        assert_eq!(cpu.step(), 12);
        assert_eq!(cpu.regs.hl(), 0x0006);
        assert_eq!(cpu.regs.f, 0);
    }

    #[test]
    fn test_interrupt_dispatch_priority() {
        let mut cpu = cpu_with(&[0x00]);
        cpu.ime = true;
        cpu.memory.data[IE_ADDR as usize] = 0x1F;
        cpu.memory.data[IF_ADDR as usize] = 0x05; // V-blank and timer
        assert_eq!(cpu.step(), 20);
        assert_eq!(cpu.regs.pc, 0x0040);
        assert!(!cpu.ime);
        assert_eq!(cpu.memory.data[IF_ADDR as usize], 0x04);
        assert_eq!(cpu.memory.data[0xFFFC], 0x00);
        assert_eq!(cpu.memory.data[0xFFFD], 0x01);
    }

    #[test]
    fn test_interrupt_not_taken_when_disabled_in_ie() {
        let mut cpu = cpu_with(&[0x00]);
        cpu.ime = true;
        cpu.memory.data[IF_ADDR as usize] = 0x01;
        assert_eq!(cpu.step(), 4);
        assert_eq!(cpu.regs.pc, 0x0101);
    }

    #[test]
    fn test_ei_takes_effect_after_next_instruction() {
        // EI ; NOP ; NOP
        let mut cpu = cpu_with(&[0xFB, 0x00, 0x00]);
        cpu.memory.data[IE_ADDR as usize] = 0x04;
        cpu.memory.data[IF_ADDR as usize] = 0x04;
        cpu.step();
        assert!(!cpu.ime);
        cpu.step();
        assert_eq!(cpu.regs.pc, 0x0102, "instruction after EI still runs");
        assert!(cpu.ime);
        assert_eq!(cpu.step(), 20);
        assert_eq!(cpu.regs.pc, 0x0050);
    }

    #[test]
    fn test_di_cancels_pending_ei() {
        // EI ; DI ; NOP
        let mut cpu = cpu_with(&[0xFB, 0xF3, 0x00]);
        cpu.step();
        cpu.step();
        cpu.step();
        assert!(!cpu.ime);
    }

    #[test]
    fn test_halt_wakes_without_ime() {
        // HALT ; INC A
        let mut cpu = cpu_with(&[0x76, 0x3C]);
        cpu.memory.data[IE_ADDR as usize] = 0x01;
        cpu.step();
        assert!(cpu.halted);
        assert_eq!(cpu.step(), 4);
        assert!(cpu.halted);

        cpu.memory.data[IF_ADDR as usize] = 0x01;
        cpu.step();
        assert!(!cpu.halted);
        assert_eq!(cpu.regs.a, 0x02);
        assert_eq!(cpu.memory.data[IF_ADDR as usize], 0x01, "request stays set without IME");
    }

    #[test]
    fn test_illegal_opcode_is_counted_nop() {
        let mut cpu = cpu_with(&[0xD3, 0x00]);
        let before = cpu.regs;
        assert_eq!(cpu.step(), 4);
        assert_eq!(cpu.regs.pc, 0x0101);
        assert_eq!(cpu.regs.a, before.a);
        assert_eq!(cpu.regs.sp, before.sp);
        assert_eq!(cpu.illegal_opcodes, 1);
        assert_eq!(
            cpu.last_illegal_opcode,
            Some(IllegalOpcode { addr: 0x0100, opcode: 0xD3 })
        );
    }

    #[test]
    fn test_state_roundtrip() {
        let mut cpu = cpu_with(&[0x3C, 0x3C]);
        cpu.step();
        let state = cpu.state();
        let json = serde_json::to_string(&state).expect("serialize");
        cpu.step();
        let restored: CpuState = serde_json::from_str(&json).expect("deserialize");
        cpu.restore(&restored);
        assert_eq!(cpu.regs.a, 0x02);
        assert_eq!(cpu.regs.pc, 0x0101);
        assert_eq!(cpu.cycles, 4);
    }
}
