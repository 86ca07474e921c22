//! Executes a decoded instruction against the register file and memory bus.

use platform::memory_bus::{BusFault, MemoryBus, Width};

use crate::barrel_shifter::{shift, ShiftKind};
use crate::decode::{AluOp, Condition, DecodedInstruction, Operand2};
use crate::exceptions::Exception;
use crate::registers::RegisterFile;

/// What the caller (`Cpu::step`) must do after an instruction executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Execution completed normally; PC already advanced if needed.
    Normal,
    /// The instruction requests an exception be delivered.
    Raise(Exception),
}

fn resolve_operand2(regs: &RegisterFile, operand2: Operand2, carry_in: bool) -> (u32, bool) {
    match operand2 {
        Operand2::Immediate { imm8, rotate } => {
            let rot = (rotate as u32) * 2;
            if rot == 0 {
                (imm8 as u32, carry_in)
            } else {
                shift(imm8 as u32, ShiftKind::Ror, rot as u8, carry_in)
            }
        }
        Operand2::RegisterImmShift { rm, kind, amount } => {
            let value = regs.get(rm);
            shift(value, kind, amount, carry_in)
        }
        Operand2::RegisterRegShift { rm, kind, rs } => {
            let value = regs.get(rm);
            let amount = (regs.get(rs) & 0xFF) as u8;
            shift(value, kind, amount, carry_in)
        }
    }
}

fn add_with_flags(a: u32, b: u32, carry_in: u32) -> (u32, bool, bool) {
    let (r1, c1) = a.overflowing_add(b);
    let (result, c2) = r1.overflowing_add(carry_in);
    let carry = c1 || c2;
    let overflow = ((a ^ result) & (b ^ result)) & 0x8000_0000 != 0;
    (result, carry, overflow)
}

fn sub_with_flags(a: u32, b: u32) -> (u32, bool, bool) {
    let (result, borrow) = a.overflowing_sub(b);
    let carry = !borrow; // ARM carry-out on SUB is "no borrow"
    let overflow = ((a ^ b) & (a ^ result)) & 0x8000_0000 != 0;
    (result, carry, overflow)
}

fn execute_data_processing(
    regs: &mut RegisterFile,
    op: AluOp,
    set_flags: bool,
    rn: u8,
    rd: u8,
    operand2: Operand2,
) {
    let carry_in = regs.cpsr().c();
    let (op2, shifter_carry) = resolve_operand2(regs, operand2, carry_in);
    let op1 = regs.get(rn);

    let (result, carry_out, overflow) = match op {
        AluOp::And | AluOp::Tst => (op1 & op2, shifter_carry, regs.cpsr().v()),
        AluOp::Eor | AluOp::Teq => (op1 ^ op2, shifter_carry, regs.cpsr().v()),
        AluOp::Sub | AluOp::Cmp => sub_with_flags(op1, op2),
        AluOp::Rsb => sub_with_flags(op2, op1),
        AluOp::Add | AluOp::Cmn => add_with_flags(op1, op2, 0),
        AluOp::Adc => add_with_flags(op1, op2, u32::from(carry_in)),
        AluOp::Sbc => {
            let (r, c, v) = sub_with_flags(op1, op2);
            let borrow_extra = !carry_in;
            if borrow_extra {
                let (r2, b2) = r.overflowing_sub(1);
                (r2, c && !b2, v)
            } else {
                (r, c, v)
            }
        }
        AluOp::Rsc => {
            let (r, c, v) = sub_with_flags(op2, op1);
            let borrow_extra = !carry_in;
            if borrow_extra {
                let (r2, b2) = r.overflowing_sub(1);
                (r2, c && !b2, v)
            } else {
                (r, c, v)
            }
        }
        AluOp::Orr => (op1 | op2, shifter_carry, regs.cpsr().v()),
        AluOp::Mov => (op2, shifter_carry, regs.cpsr().v()),
        AluOp::Bic => (op1 & !op2, shifter_carry, regs.cpsr().v()),
        AluOp::Mvn => (!op2, shifter_carry, regs.cpsr().v()),
    };

    if !op.is_comparison() {
        if rd == 15 && set_flags {
            // Exception-return idiom: restore CPSR from the current mode's SPSR.
            let spsr = regs.spsr(regs.cpsr().mode());
            *regs.cpsr_mut() = spsr;
        }
        regs.set(rd, result);
    }

    if set_flags && rd != 15 {
        let n = result & 0x8000_0000 != 0;
        let z = result == 0;
        regs.cpsr_mut().set_nzcv(n, z, carry_out, overflow);
    }
}

fn load_store_address(regs: &RegisterFile, rn: u8, add_offset: bool, offset_value: u32) -> u32 {
    let base = regs.get(rn);
    if add_offset {
        base.wrapping_add(offset_value)
    } else {
        base.wrapping_sub(offset_value)
    }
}

/// Execute one decoded instruction. Returns `Ok(ExecOutcome::Raise(_))` when
/// the instruction itself requests an exception (SWI, undefined encoding);
/// returns `Err(BusFault)` when a memory access faults, leaving exception
/// dispatch to the caller so both paths share one delivery routine.
pub fn execute(
    regs: &mut RegisterFile,
    instr: DecodedInstruction,
    bus: &mut MemoryBus,
) -> Result<ExecOutcome, BusFault> {
    let cond = instruction_condition(instr);
    let psr = regs.cpsr();
    if !cond.holds(psr.n(), psr.z(), psr.c(), psr.v()) {
        return Ok(ExecOutcome::Normal);
    }

    match instr {
        DecodedInstruction::DataProcessing { op, set_flags, rn, rd, operand2, .. } => {
            execute_data_processing(regs, op, set_flags, rn, rd, operand2);
            Ok(ExecOutcome::Normal)
        }
        DecodedInstruction::Branch { link, offset, .. } => {
            let target = regs.get(15).wrapping_add(offset as u32).wrapping_sub(8);
            if link {
                regs.set(14, regs.pc().wrapping_add(4));
            }
            regs.set_pc(target);
            Ok(ExecOutcome::Normal)
        }
        DecodedInstruction::BranchExchange { rm, .. } => {
            let target = regs.get(rm);
            regs.cpsr_mut().0 = (regs.cpsr().0 & !(1 << 5)) | ((target & 1) << 5);
            regs.set_pc(target & !1);
            Ok(ExecOutcome::Normal)
        }
        DecodedInstruction::SoftwareInterrupt { .. } => Ok(ExecOutcome::Raise(Exception::SoftwareInterrupt)),
        DecodedInstruction::Undefined { .. } => Ok(ExecOutcome::Raise(Exception::Undefined)),
        DecodedInstruction::Multiply { accumulate, set_flags, rd, rn, rs, rm, .. } => {
            let product = regs.get(rm).wrapping_mul(regs.get(rs));
            let result = if accumulate { product.wrapping_add(regs.get(rn)) } else { product };
            regs.set(rd, result);
            if set_flags {
                regs.cpsr_mut().set_nzcv(result & 0x8000_0000 != 0, result == 0, regs.cpsr().c(), regs.cpsr().v());
            }
            Ok(ExecOutcome::Normal)
        }
        DecodedInstruction::MultiplyLong { signed, accumulate, set_flags, rd_hi, rd_lo, rs, rm, .. } => {
            let product: u64 = if signed {
                (i64::from(regs.get(rm) as i32) * i64::from(regs.get(rs) as i32)) as u64
            } else {
                u64::from(regs.get(rm)) * u64::from(regs.get(rs))
            };
            let acc = if accumulate {
                (u64::from(regs.get(rd_hi)) << 32 | u64::from(regs.get(rd_lo))).wrapping_add(product)
            } else {
                product
            };
            regs.set(rd_hi, (acc >> 32) as u32);
            regs.set(rd_lo, acc as u32);
            if set_flags {
                regs.cpsr_mut().set_nzcv(acc & 0x8000_0000_0000_0000 != 0, acc == 0, regs.cpsr().c(), regs.cpsr().v());
            }
            Ok(ExecOutcome::Normal)
        }
        DecodedInstruction::SingleTransfer { load, byte, pre_index, add_offset, write_back, rn, rd, offset, .. } => {
            let offset_value = match offset {
                Operand2::Immediate { imm8, .. } => imm8 as u32,
                other => resolve_operand2(regs, other, regs.cpsr().c()).0,
            };
            let effective = load_store_address(regs, rn, add_offset, offset_value);
            let addr = if pre_index { effective } else { regs.get(rn) };
            let width = if byte { Width::Byte } else { Width::Word };

            if load {
                let value = bus.read(addr, width)?;
                let value = if width == Width::Word { value.rotate_right((addr & 0x3) * 8) } else { value };
                regs.set(rd, value);
            } else {
                let value = regs.get(rd);
                bus.write(addr, width, value)?;
            }
            if !pre_index || write_back {
                regs.set(rn, effective);
            }
            Ok(ExecOutcome::Normal)
        }
        DecodedInstruction::HalfwordTransfer { load, pre_index, add_offset, write_back, signed, halfword, rn, rd, offset_imm, offset_reg, .. } => {
            let offset_value = offset_imm.map(u32::from).unwrap_or_else(|| offset_reg.map(|r| regs.get(r)).unwrap_or(0));
            let effective = load_store_address(regs, rn, add_offset, offset_value);
            let addr = if pre_index { effective } else { regs.get(rn) };
            let width = if halfword { Width::Half } else { Width::Byte };

            if load {
                let raw = bus.read(addr, width)?;
                let value = if signed {
                    if halfword {
                        (raw as i16) as i32 as u32
                    } else {
                        (raw as i8) as i32 as u32
                    }
                } else {
                    raw
                };
                regs.set(rd, value);
            } else {
                bus.write(addr, width, regs.get(rd))?;
            }
            if !pre_index || write_back {
                regs.set(rn, effective);
            }
            Ok(ExecOutcome::Normal)
        }
        DecodedInstruction::BlockTransfer { load, pre_index, add_offset, write_back, rn, register_list, .. } => {
            let mut addr = regs.get(rn);
            let count = register_list.count_ones();
            let total = count.wrapping_mul(4);
            let mut cursor = if add_offset { addr } else { addr.wrapping_sub(total) };

            for reg in 0u8..16 {
                if register_list & (1 << reg) == 0 {
                    continue;
                }
                if pre_index {
                    cursor = cursor.wrapping_add(4);
                }
                if load {
                    let value = bus.read(cursor, Width::Word)?;
                    regs.set(reg, value);
                } else {
                    bus.write(cursor, Width::Word, regs.get(reg))?;
                }
                if !pre_index {
                    cursor = cursor.wrapping_add(4);
                }
            }

            if add_offset {
                addr = addr.wrapping_add(total);
            } else {
                addr = addr.wrapping_sub(total);
            }
            if write_back {
                regs.set(rn, addr);
            }
            Ok(ExecOutcome::Normal)
        }
        DecodedInstruction::Swap { byte, rn, rd, rm, .. } => {
            let addr = regs.get(rn);
            let width = if byte { Width::Byte } else { Width::Word };
            let old = bus.read(addr, width)?;
            bus.write(addr, width, regs.get(rm))?;
            regs.set(rd, old);
            Ok(ExecOutcome::Normal)
        }
        DecodedInstruction::StatusTransfer { to_status, spsr, rd, immediate, rm, .. } => {
            if to_status {
                let value = match immediate {
                    Some((rotate, imm8)) => {
                        let rot = (rotate as u32) * 2;
                        if rot == 0 { imm8 as u32 } else { (imm8 as u32).rotate_right(rot) }
                    }
                    None => regs.get(rm),
                };
                if spsr {
                    // Only the flag bits (31-28) are modelled as writable here;
                    // full control-field MSR is out of scope for this emulator.
                    let mode = regs.cpsr().mode();
                    let mut s = regs.spsr(mode);
                    s.0 = (s.0 & 0x0FFF_FFFF) | (value & 0xF000_0000);
                    regs.enter_mode(mode, regs.cpsr(), s);
                } else {
                    let mut c = regs.cpsr();
                    c.0 = (c.0 & 0x0FFF_FFFF) | (value & 0xF000_0000);
                    *regs.cpsr_mut() = c;
                }
            } else {
                let value = if spsr { regs.spsr(regs.cpsr().mode()) } else { regs.cpsr() };
                regs.set(rd, value.0);
            }
            Ok(ExecOutcome::Normal)
        }
        DecodedInstruction::CoprocessorRegisterTransfer { .. } => {
            // Scope note (spec §4.4): CP15 moves may be no-ops; this
            // emulator does not model a coprocessor register file.
            Ok(ExecOutcome::Normal)
        }
    }
}

fn instruction_condition(instr: DecodedInstruction) -> Condition {
    match instr {
        DecodedInstruction::DataProcessing { cond, .. }
        | DecodedInstruction::Multiply { cond, .. }
        | DecodedInstruction::MultiplyLong { cond, .. }
        | DecodedInstruction::SingleTransfer { cond, .. }
        | DecodedInstruction::HalfwordTransfer { cond, .. }
        | DecodedInstruction::BlockTransfer { cond, .. }
        | DecodedInstruction::Branch { cond, .. }
        | DecodedInstruction::BranchExchange { cond, .. }
        | DecodedInstruction::SoftwareInterrupt { cond, .. }
        | DecodedInstruction::StatusTransfer { cond, .. }
        | DecodedInstruction::CoprocessorRegisterTransfer { cond, .. }
        | DecodedInstruction::Swap { cond, .. }
        | DecodedInstruction::Undefined { cond, .. } => cond,
    }
}
