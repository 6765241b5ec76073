//! Z80 CPU core: register file, micro-op driver and instruction dispatch.

mod execute;

use emu_core::{Bus, Cpu};

use crate::flags::{CF, PF, SF, ZF};
use crate::microcode::{MicroOp, MicroOpQueue};
use crate::registers::Registers;

/// No prefix active; the next opcode is unprefixed.
const PREFIX_NONE: u8 = 0;
/// `CB` prefix: rotate/shift/BIT/RES/SET on an 8-bit operand.
const PREFIX_CB: u8 = 1;
/// `DD` prefix: substitute IX for HL.
const PREFIX_DD: u8 = 2;
/// `ED` prefix: extended instructions.
const PREFIX_ED: u8 = 3;
/// `FD` prefix: substitute IY for HL.
const PREFIX_FD: u8 = 4;
/// `DD CB d op` - CB-style op on `(IX+d)`.
const PREFIX_DDCB: u8 = 5;
/// `FD CB d op` - CB-style op on `(IY+d)`.
const PREFIX_FDCB: u8 = 6;

/// Which table a queued [`MicroOp::Execute`] should dispatch through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Dispatch the just-fetched opcode through the appropriate decode table.
    Decode,
    /// A displacement byte for `(IX+d)`/`(IY+d)` has been fetched; resolve the
    /// effective address and issue whatever access the opcode needs.
    Displaced,
    /// A decode stage queued a memory/IO access; finish the instruction now
    /// that it has completed.
    Followup,
}

/// A cycle-accurate Z80 core.
///
/// `Z80` does not own its bus: each [`Z80::run`] call borrows one, so the
/// same core can drive memory and I/O that live behind contention, paging or
/// peripheral logic owned elsewhere (see [`emu_core::Bus`]). Every access is
/// tagged with the absolute master-clock T-state at which it occurs.
#[derive(Debug, Clone)]
pub struct Z80 {
    regs: Registers,
    micro_ops: MicroOpQueue,

    /// Opcode byte of the instruction currently executing (or, under a CB
    /// family prefix, the CB-style opcode byte).
    opcode: u8,
    /// Active prefix, one of the `PREFIX_*` constants.
    prefix: u8,
    stage: Stage,

    /// Displacement byte for `(IX+d)`/`(IY+d)`, as a raw two's-complement byte.
    displacement: u8,
    /// Effective address for the current memory access.
    addr: u16,
    /// Low byte of an in-flight immediate/memory operand.
    data_lo: u8,
    /// High byte of an in-flight immediate/memory operand.
    data_hi: u8,

    /// Selects the second stage of ED's `LD (nn),rr`/`LD rr,(nn)`.
    ed_phase: u8,
    /// Selects the second stage of other two-stage follow-ups (`LD A,(nn)`,
    /// `LD HL,(nn)` and their IX/IY forms).
    followup_phase: u8,

    nmi_pending: bool,
    int_pending: bool,
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}

impl Z80 {
    /// Create a new core with registers zeroed, as after power-on (before
    /// [`Cpu::reset`] sets PC, SP and I to their post-RESET values).
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Registers::default(),
            micro_ops: MicroOpQueue::new(),
            opcode: 0,
            prefix: PREFIX_NONE,
            stage: Stage::Decode,
            displacement: 0,
            addr: 0,
            data_lo: 0,
            data_hi: 0,
            ed_phase: 0,
            followup_phase: 0,
            nmi_pending: false,
            int_pending: false,
        }
    }

    /// Mutable access to the register file, for test setup and debuggers.
    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    /// Run the core against `bus` for up to `budget` T-states, starting at
    /// absolute clock `slice_origin`. Stops only at a T-state boundary once
    /// the budget is exhausted - never mid micro-op - and returns the number
    /// of T-states actually consumed (which may exceed `budget` by at most
    /// one micro-op's worth, since a micro-op cannot be interrupted).
    pub fn run(&mut self, bus: &mut impl Bus, slice_origin: u64, budget: u32) -> u32 {
        let mut consumed: u32 = 0;

        while consumed < budget {
            if self.micro_ops.is_empty() {
                let t_state = slice_origin + u64::from(consumed);
                if self.maybe_accept_interrupt(bus, t_state) {
                    // An Internal op burning the acceptance T-states was queued.
                } else if self.regs.halted {
                    // HALT re-executes internally without touching PC; R still
                    // increments once per M1-equivalent cycle.
                    self.bump_r();
                    self.micro_ops.push_internal(4);
                } else {
                    self.micro_ops.push(MicroOp::FetchOpcode);
                }
            }

            let Some(op) = self.micro_ops.current() else {
                break;
            };
            let duration = self.micro_ops.current_duration().unwrap_or(0);
            let t_state = slice_origin + u64::from(consumed);

            match op {
                MicroOp::FetchOpcode => {
                    self.opcode = bus.mem_read(self.regs.pc, t_state);
                    self.regs.pc = self.regs.pc.wrapping_add(1);
                    self.bump_r();
                }
                MicroOp::FetchCbOpcode => {
                    self.opcode = bus.mem_read(self.regs.pc, t_state);
                    self.regs.pc = self.regs.pc.wrapping_add(1);
                }
                MicroOp::FetchDisplacement => {
                    self.displacement = bus.mem_read(self.regs.pc, t_state);
                    self.regs.pc = self.regs.pc.wrapping_add(1);
                }
                MicroOp::ReadImm8 | MicroOp::ReadImm16Lo => {
                    self.data_lo = bus.mem_read(self.regs.pc, t_state);
                    self.regs.pc = self.regs.pc.wrapping_add(1);
                }
                MicroOp::ReadImm16Hi => {
                    self.data_hi = bus.mem_read(self.regs.pc, t_state);
                    self.regs.pc = self.regs.pc.wrapping_add(1);
                }
                MicroOp::ReadMem => {
                    self.data_lo = bus.mem_read(self.addr, t_state);
                }
                MicroOp::ReadMem16Lo => {
                    self.data_lo = bus.mem_read(self.addr, t_state);
                    self.addr = self.addr.wrapping_add(1);
                }
                MicroOp::ReadMem16Hi => {
                    self.data_hi = bus.mem_read(self.addr, t_state);
                }
                MicroOp::WriteMem => {
                    bus.mem_write(self.addr, self.data_lo, t_state);
                }
                MicroOp::WriteMem16Lo => {
                    bus.mem_write(self.addr, self.data_lo, t_state);
                    self.addr = self.addr.wrapping_add(1);
                }
                MicroOp::WriteMem16Hi => {
                    bus.mem_write(self.addr, self.data_hi, t_state);
                }
                MicroOp::WriteMemHiFirst => {
                    self.regs.sp = self.regs.sp.wrapping_sub(1);
                    bus.mem_write(self.regs.sp, self.data_hi, t_state);
                }
                MicroOp::WriteMemLoSecond => {
                    self.regs.sp = self.regs.sp.wrapping_sub(1);
                    bus.mem_write(self.regs.sp, self.data_lo, t_state);
                }
                MicroOp::IoRead => {
                    self.data_lo = bus.io_read(self.addr, t_state);
                }
                MicroOp::IoWrite => {
                    bus.io_write(self.addr, self.data_lo, t_state);
                }
                MicroOp::Internal => {}
                MicroOp::Execute => self.dispatch(),
            }

            self.micro_ops.advance();
            consumed += u32::from(duration);

            if matches!(op, MicroOp::FetchOpcode) {
                self.after_fetch_opcode();
            }
        }

        consumed
    }

    /// Called once a `FetchOpcode` completes. Detects prefix bytes (which the
    /// decode tables never have arms for) and otherwise queues the decode
    /// dispatch for the opcode just fetched.
    fn after_fetch_opcode(&mut self) {
        let byte = self.opcode;
        match self.prefix {
            PREFIX_NONE => match byte {
                0xCB => {
                    self.prefix = PREFIX_CB;
                    self.micro_ops.push(MicroOp::FetchOpcode);
                }
                0xDD => {
                    self.prefix = PREFIX_DD;
                    self.micro_ops.push(MicroOp::FetchOpcode);
                }
                0xED => {
                    self.prefix = PREFIX_ED;
                    self.micro_ops.push(MicroOp::FetchOpcode);
                }
                0xFD => {
                    self.prefix = PREFIX_FD;
                    self.micro_ops.push(MicroOp::FetchOpcode);
                }
                _ => self.queue_decode(),
            },
            PREFIX_DD | PREFIX_FD if byte == 0xCB => {
                // DD/FD CB d op: the displacement and final opcode byte are
                // plain reads, not M1 cycles - R was already bumped twice,
                // once for DD/FD and once for this CB byte.
                self.prefix = if self.prefix == PREFIX_DD { PREFIX_DDCB } else { PREFIX_FDCB };
                self.micro_ops.push(MicroOp::FetchDisplacement);
                self.micro_ops.push(MicroOp::FetchCbOpcode);
                self.queue_decode();
            }
            PREFIX_DD | PREFIX_FD if byte == 0xDD || byte == 0xFD => {
                // Repeated index prefix: only the last one before the opcode
                // takes effect.
                self.prefix = if byte == 0xDD { PREFIX_DD } else { PREFIX_FD };
                self.micro_ops.push(MicroOp::FetchOpcode);
            }
            PREFIX_DD | PREFIX_FD if byte == 0xED => {
                // Undocumented: an index prefix immediately followed by ED
                // is simply discarded.
                self.prefix = PREFIX_ED;
                self.micro_ops.push(MicroOp::FetchOpcode);
            }
            _ => self.queue_decode(),
        }
    }

    fn queue_decode(&mut self) {
        self.stage = Stage::Decode;
        self.micro_ops.push(MicroOp::Execute);
    }

    /// Dispatch the queued `Execute` through whichever table `self.stage` and
    /// `self.prefix` select, then tidy up if the instruction is complete.
    fn dispatch(&mut self) {
        match self.stage {
            Stage::Decode => match self.prefix {
                PREFIX_NONE => self.execute_unprefixed(),
                PREFIX_CB => self.execute_cb(),
                PREFIX_DD | PREFIX_FD => self.execute_dd_fd(),
                PREFIX_ED => self.execute_ed(),
                PREFIX_DDCB | PREFIX_FDCB => self.execute_ddcb_fdcb(),
                _ => unreachable!("invalid prefix byte"),
            },
            Stage::Displaced => self.resolve_displaced_operand(),
            Stage::Followup => match self.prefix {
                PREFIX_ED => self.execute_ed_followup(),
                PREFIX_CB | PREFIX_DDCB | PREFIX_FDCB => self.execute_cb_followup(),
                _ => self.execute_followup(),
            },
        }

        if self.micro_ops.is_empty() {
            self.finish_instruction();
        }
    }

    fn finish_instruction(&mut self) {
        self.prefix = PREFIX_NONE;
        self.stage = Stage::Decode;
        self.ed_phase = 0;
        self.followup_phase = 0;
    }

    fn queue_execute_followup(&mut self) {
        self.stage = Stage::Followup;
        self.micro_ops.push(MicroOp::Execute);
    }

    fn queue_displacement_followup(&mut self) {
        self.stage = Stage::Displaced;
        self.micro_ops.push(MicroOp::Execute);
    }

    fn queue_internal(&mut self, t_states: u8) {
        self.micro_ops.push_internal(t_states);
    }

    fn bump_r(&mut self) {
        self.regs.r = (self.regs.r & 0x80) | (self.regs.r.wrapping_add(1) & 0x7F);
    }

    /// 8-bit register named by a 3-bit register code (0=B,1=C,2=D,3=E,4=H,
    /// 5=L,7=A; 6 denotes `(HL)` and is handled at the call site instead).
    fn get_reg8(&self, r: u8) -> u8 {
        match r {
            0 => self.regs.b,
            1 => self.regs.c,
            2 => self.regs.d,
            3 => self.regs.e,
            4 => self.regs.h,
            5 => self.regs.l,
            7 => self.regs.a,
            _ => unreachable!("register code 6 denotes (HL)"),
        }
    }

    fn set_reg8(&mut self, r: u8, value: u8) {
        match r {
            0 => self.regs.b = value,
            1 => self.regs.c = value,
            2 => self.regs.d = value,
            3 => self.regs.e = value,
            4 => self.regs.h = value,
            5 => self.regs.l = value,
            7 => self.regs.a = value,
            _ => unreachable!("register code 6 denotes (HL)"),
        }
    }

    /// 16-bit register pair named by a 2-bit code, always BC/DE/HL/SP - used
    /// by ED's `ADC`/`SBC HL,rr` and `LD (nn),rr`/`LD rr,(nn)`, which ignore
    /// any DD/FD prefix in effect.
    fn get_reg16(&self, rp: u8) -> u16 {
        match rp {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.regs.hl(),
            3 => self.regs.sp,
            _ => unreachable!("2-bit register pair code"),
        }
    }

    fn set_reg16(&mut self, rp: u8, value: u16) {
        match rp {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.regs.set_hl(value),
            3 => self.regs.sp = value,
            _ => unreachable!("2-bit register pair code"),
        }
    }

    fn condition(&self, cc: u8) -> bool {
        match cc {
            0 => self.regs.f & ZF == 0,
            1 => self.regs.f & ZF != 0,
            2 => self.regs.f & CF == 0,
            3 => self.regs.f & CF != 0,
            4 => self.regs.f & PF == 0,
            5 => self.regs.f & PF != 0,
            6 => self.regs.f & SF == 0,
            7 => self.regs.f & SF != 0,
            _ => unreachable!("3-bit condition code"),
        }
    }

    /// HL under no prefix, IX under DD/DDCB, IY under FD/FDCB.
    fn get_index_reg(&self) -> u16 {
        if self.prefix == PREFIX_FD || self.prefix == PREFIX_FDCB {
            self.regs.iy
        } else {
            self.regs.ix
        }
    }

    fn set_index_reg(&mut self, value: u16) {
        if self.prefix == PREFIX_FD || self.prefix == PREFIX_FDCB {
            self.regs.iy = value;
        } else {
            self.regs.ix = value;
        }
    }

    /// Undocumented IXH/IXL/IYH/IYL half of the active index register
    /// (`half==4` selects the high byte, `half==5` the low byte).
    fn get_reg8_indexed(&self, half: u8) -> u8 {
        let idx = self.get_index_reg();
        if half == 4 { (idx >> 8) as u8 } else { idx as u8 }
    }

    fn set_reg8_indexed(&mut self, half: u8, value: u8) {
        let idx = self.get_index_reg();
        let new = if half == 4 {
            (idx & 0x00FF) | (u16::from(value) << 8)
        } else {
            (idx & 0xFF00) | u16::from(value)
        };
        self.set_index_reg(new);
    }

    /// HL under no prefix, the active index register under DD/DDCB/FD/FDCB.
    /// Needed because `LD HL,nn`/`LD (nn),HL`/`LD HL,(nn)` are decoded in the
    /// same table entries as their `LD IX,nn`/`LD IY,nn` equivalents.
    fn hl_or_index(&self) -> u16 {
        match self.prefix {
            PREFIX_DD | PREFIX_DDCB => self.regs.ix,
            PREFIX_FD | PREFIX_FDCB => self.regs.iy,
            _ => self.regs.hl(),
        }
    }

    fn set_hl_or_index(&mut self, value: u16) {
        match self.prefix {
            PREFIX_DD | PREFIX_DDCB => self.regs.ix = value,
            PREFIX_FD | PREFIX_FDCB => self.regs.iy = value,
            _ => self.regs.set_hl(value),
        }
    }

    /// Accept a pending NMI or maskable interrupt at an instruction boundary,
    /// pushing PC and jumping to the handler synchronously, then queuing an
    /// `Internal` op for the T-states the acceptance sequence consumes. This
    /// skips modelling the push as individual bus-timed micro-ops since no
    /// contention depends on it; only the total duration and final bus state
    /// matter here.
    fn maybe_accept_interrupt(&mut self, bus: &mut impl Bus, t_state: u64) -> bool {
        if self.nmi_pending {
            self.nmi_pending = false;
            self.regs.halted = false;
            self.regs.iff2 = self.regs.iff1;
            self.regs.iff1 = false;
            self.push_pc(bus, t_state);
            self.regs.pc = 0x0066;
            self.queue_internal(11);
            return true;
        }

        if self.int_pending && self.regs.iff1 {
            self.int_pending = false;
            self.regs.halted = false;
            self.regs.iff1 = false;
            self.regs.iff2 = false;
            self.push_pc(bus, t_state);
            match self.regs.im {
                2 => {
                    let vector_addr = (u16::from(self.regs.i) << 8) | 0xFE;
                    let lo = bus.mem_read(vector_addr, t_state);
                    let hi = bus.mem_read(vector_addr.wrapping_add(1), t_state);
                    self.regs.pc = u16::from(lo) | (u16::from(hi) << 8);
                    self.queue_internal(19);
                }
                _ => {
                    // IM 0 and IM 1 both vector to 0x0038 here: IM 0 assumes
                    // the interrupting device places a RST 38h on the bus,
                    // which is what every real Spectrum ULA does.
                    self.regs.pc = 0x0038;
                    self.queue_internal(13);
                }
            }
            return true;
        }

        false
    }

    fn push_pc(&mut self, bus: &mut impl Bus, t_state: u64) {
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.mem_write(self.regs.sp, (self.regs.pc >> 8) as u8, t_state);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.mem_write(self.regs.sp, self.regs.pc as u8, t_state);
    }
}

impl Cpu for Z80 {
    type Registers = Registers;

    fn pc(&self) -> u32 {
        u32::from(self.regs.pc)
    }

    fn registers(&self) -> Registers {
        self.regs
    }

    fn is_halted(&self) -> bool {
        self.regs.halted
    }

    fn interrupt(&mut self) -> bool {
        self.int_pending = true;
        self.regs.iff1
    }

    fn nmi(&mut self) {
        self.nmi_pending = true;
    }

    fn reset(&mut self) {
        self.regs = Registers::default();
        self.micro_ops.clear();
        self.opcode = 0;
        self.prefix = PREFIX_NONE;
        self.stage = Stage::Decode;
        self.displacement = 0;
        self.addr = 0;
        self.data_lo = 0;
        self.data_hi = 0;
        self.ed_phase = 0;
        self.followup_phase = 0;
        self.nmi_pending = false;
        self.int_pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FlatMemory {
        mem: [u8; 0x1_0000],
        io: [u8; 0x1_0000],
    }

    impl FlatMemory {
        fn new() -> Self {
            Self { mem: [0; 0x1_0000], io: [0; 0x1_0000] }
        }
    }

    impl Bus for FlatMemory {
        fn mem_read(&mut self, address: u16, _t_state: u64) -> u8 {
            self.mem[address as usize]
        }

        fn mem_write(&mut self, address: u16, value: u8, _t_state: u64) {
            self.mem[address as usize] = value;
        }

        fn io_read(&mut self, port: u16, _t_state: u64) -> u8 {
            self.io[port as usize]
        }

        fn io_write(&mut self, port: u16, value: u8, _t_state: u64) {
            self.io[port as usize] = value;
        }
    }

    #[test]
    fn nop_consumes_four_t_states() {
        let mut cpu = Z80::new();
        let mut bus = FlatMemory::new();
        let consumed = cpu.run(&mut bus, 0, 4);
        assert_eq!(consumed, 4);
        assert_eq!(cpu.pc(), 1);
    }

    #[test]
    fn ld_bc_nn_loads_immediate() {
        let mut cpu = Z80::new();
        let mut bus = FlatMemory::new();
        bus.mem[0] = 0x01; // LD BC, nn
        bus.mem[1] = 0x34;
        bus.mem[2] = 0x12;
        cpu.run(&mut bus, 0, 10);
        assert_eq!(cpu.registers().bc(), 0x1234);
    }

    #[test]
    fn ld_ix_nn_does_not_alias_hl() {
        let mut cpu = Z80::new();
        let mut bus = FlatMemory::new();
        bus.mem[0] = 0xDD;
        bus.mem[1] = 0x21; // LD IX, nn
        bus.mem[2] = 0x78;
        bus.mem[3] = 0x56;
        cpu.run(&mut bus, 0, 14);
        assert_eq!(cpu.registers().ix, 0x5678);
        assert_eq!(cpu.registers().hl(), 0);
    }

    #[test]
    fn ld_hl_from_memory_pointer() {
        let mut cpu = Z80::new();
        let mut bus = FlatMemory::new();
        bus.mem[0] = 0x2A; // LD HL, (nn)
        bus.mem[1] = 0x10;
        bus.mem[2] = 0x00;
        bus.mem[0x10] = 0xCD;
        bus.mem[0x11] = 0xAB;
        cpu.run(&mut bus, 0, 16);
        assert_eq!(cpu.registers().hl(), 0xABCD);
    }

    #[test]
    fn ld_a_from_memory_pointer() {
        let mut cpu = Z80::new();
        let mut bus = FlatMemory::new();
        bus.mem[0] = 0x3A; // LD A, (nn)
        bus.mem[1] = 0x20;
        bus.mem[2] = 0x00;
        bus.mem[0x20] = 0x42;
        cpu.run(&mut bus, 0, 13);
        assert_eq!(cpu.registers().a, 0x42);
    }

    #[test]
    fn halt_sets_flag_and_idles() {
        let mut cpu = Z80::new();
        let mut bus = FlatMemory::new();
        bus.mem[0] = 0x76; // HALT
        cpu.run(&mut bus, 0, 4);
        assert!(cpu.is_halted());
        let pc_before = cpu.pc();
        cpu.run(&mut bus, 4, 8);
        assert!(cpu.is_halted());
        assert_eq!(cpu.pc(), pc_before);
    }

    #[test]
    fn dd_76_halts_without_displacement() {
        let mut cpu = Z80::new();
        let mut bus = FlatMemory::new();
        bus.mem[0] = 0xDD;
        bus.mem[1] = 0x76;
        bus.mem[2] = 0xFF; // would be misread as a displacement if mishandled
        cpu.run(&mut bus, 0, 8);
        assert!(cpu.is_halted());
        assert_eq!(cpu.pc(), 2);
    }

    #[test]
    fn ldir_copies_block_and_decrements_bc() {
        let mut cpu = Z80::new();
        let mut bus = FlatMemory::new();
        bus.mem[0] = 0xED;
        bus.mem[1] = 0xB0; // LDIR
        cpu.registers_mut().set_hl(0x100);
        cpu.registers_mut().set_de(0x200);
        cpu.registers_mut().set_bc(3);
        bus.mem[0x100] = 1;
        bus.mem[0x101] = 2;
        bus.mem[0x102] = 3;
        cpu.run(&mut bus, 0, 100);
        assert_eq!(bus.mem[0x200], 1);
        assert_eq!(bus.mem[0x201], 2);
        assert_eq!(bus.mem[0x202], 3);
        assert_eq!(cpu.registers().bc(), 0);
    }

    #[test]
    fn interrupt_vectors_through_im1() {
        let mut cpu = Z80::new();
        let mut bus = FlatMemory::new();
        cpu.registers_mut().iff1 = true;
        cpu.registers_mut().im = 1;
        cpu.registers_mut().sp = 0x8000;
        cpu.registers_mut().pc = 0x4000;
        cpu.interrupt();
        cpu.run(&mut bus, 0, 13);
        assert_eq!(cpu.pc(), 0x0038);
        assert!(!cpu.registers().iff1);
    }

    #[test]
    fn cb_rlc_b_rotates_left() {
        let mut cpu = Z80::new();
        let mut bus = FlatMemory::new();
        bus.mem[0] = 0xCB;
        bus.mem[1] = 0x00; // RLC B
        cpu.registers_mut().b = 0x80;
        cpu.run(&mut bus, 0, 8);
        assert_eq!(cpu.registers().b, 0x01);
        assert!(cpu.registers().f & CF != 0);
    }

    #[test]
    fn ddcb_bit_on_displaced_address_does_not_write_back() {
        let mut cpu = Z80::new();
        let mut bus = FlatMemory::new();
        bus.mem[0] = 0xDD;
        bus.mem[1] = 0xCB;
        bus.mem[2] = 0x05; // displacement +5
        bus.mem[3] = 0x46; // BIT 0, (IX+d)
        cpu.registers_mut().ix = 0x1000;
        bus.mem[0x1005] = 0x01;
        cpu.run(&mut bus, 0, 20);
        assert!(cpu.registers().f & ZF == 0);
        assert_eq!(bus.mem[0x1005], 0x01);
    }
}
