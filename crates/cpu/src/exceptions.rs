//! Exception vector table and entry sequencing, per spec §4.4.

use crate::registers::{Mode, Psr, RegisterFile};

/// The seven ARM7TDMI exception types, in priority order (highest first)
/// for [`crate::Cpu::step`]'s pending-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    Reset,
    DataAbort,
    Fiq,
    Irq,
    PrefetchAbort,
    SoftwareInterrupt,
    Undefined,
}

impl Exception {
    /// Vector offset from the vector base (0x00-0x1C, skipping the reserved
    /// 0x14 slot).
    pub fn vector_offset(self) -> u32 {
        match self {
            Exception::Reset => 0x00,
            Exception::Undefined => 0x04,
            Exception::SoftwareInterrupt => 0x08,
            Exception::PrefetchAbort => 0x0C,
            Exception::DataAbort => 0x10,
            Exception::Irq => 0x18,
            Exception::Fiq => 0x1C,
        }
    }

    /// Mode the processor enters to service this exception.
    pub fn target_mode(self) -> Mode {
        match self {
            Exception::Reset => Mode::Svc,
            Exception::Undefined => Mode::Und,
            Exception::SoftwareInterrupt => Mode::Svc,
            Exception::PrefetchAbort => Mode::Abt,
            Exception::DataAbort => Mode::Abt,
            Exception::Irq => Mode::Irq,
            Exception::Fiq => Mode::Fiq,
        }
    }

    /// Offset subtracted from (the biased) PC to form LR on entry, i.e. the
    /// "return address" the handler's epilogue must add back.
    pub fn lr_offset(self) -> u32 {
        match self {
            Exception::SoftwareInterrupt | Exception::Undefined => 4,
            Exception::PrefetchAbort | Exception::Irq => 4,
            Exception::DataAbort => 8,
            Exception::Fiq => 4,
            Exception::Reset => 0,
        }
    }
}

/// Vector base address: the low vector table (`0x0000_0000`) or the high
/// one (`0xFFFF_0000`), selected by the platform's boot configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorBase {
    Low,
    High,
}

impl VectorBase {
    fn address(self) -> u32 {
        match self {
            VectorBase::Low => 0x0000_0000,
            VectorBase::High => 0xFFFF_0000,
        }
    }
}

/// Deliver `exception`: bank registers into the target mode, capture the
/// pre-entry CPSR as the target mode's SPSR, compute and store LR, mask
/// interrupts per the architectural rule, clear Thumb, and set PC to the
/// vector. `pc_for_return` is the address of the *next* instruction that
/// would have executed (i.e. the biased PC read, `regs.get(15)`), matching
/// how real hardware computes the return address at entry time.
pub fn enter(regs: &mut RegisterFile, exception: Exception, vector_base: VectorBase, pc_for_return: u32) {
    let pre_entry = regs.cpsr();

    let mut new_cpsr = Psr(pre_entry.0);
    new_cpsr.set_mode(exception.target_mode());
    new_cpsr.set_irq_masked(true);
    // FIQ masks both IRQ and FIQ; other exceptions only mask IRQ and never
    // unmask an already-masked FIQ.
    if exception == Exception::Fiq {
        new_cpsr.set_fiq_masked(true);
    }
    // Clear Thumb: exception handlers always run in ARM state.
    new_cpsr.0 &= !(1 << 5);

    regs.enter_mode(exception.target_mode(), new_cpsr, pre_entry);

    let lr = pc_for_return.wrapping_sub(exception.lr_offset());
    regs.set(14, lr);
    regs.set_pc(vector_base.address().wrapping_add(exception.vector_offset()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irq_entry_matches_spec_scenario() {
        let mut regs = RegisterFile::reset();
        regs.cpsr_mut().set_mode(Mode::User);
        regs.cpsr_mut().set_irq_masked(false);
        regs.set_pc(0x1000);
        let pre_entry = regs.cpsr();
        let return_pc = regs.get(15); // PC + 8, the biased read at entry time

        enter(&mut regs, Exception::Irq, VectorBase::Low, return_pc);

        assert_eq!(regs.pc(), 0x0000_0018);
        assert_eq!(regs.cpsr().mode(), Mode::Irq);
        assert!(regs.cpsr().irq_masked());
        assert_eq!(regs.cpsr().fiq_masked(), pre_entry.fiq_masked());
        assert_eq!(regs.spsr(Mode::Irq), pre_entry);
        assert_eq!(regs.get(14), return_pc.wrapping_sub(4));
    }

    #[test]
    fn fiq_masks_both_irq_and_fiq() {
        let mut regs = RegisterFile::reset();
        regs.cpsr_mut().set_fiq_masked(false);
        regs.cpsr_mut().set_irq_masked(false);
        enter(&mut regs, Exception::Fiq, VectorBase::Low, 0x100);
        assert!(regs.cpsr().irq_masked());
        assert!(regs.cpsr().fiq_masked());
    }

    #[test]
    fn non_fiq_exception_never_unmasks_fiq() {
        let mut regs = RegisterFile::reset();
        regs.cpsr_mut().set_fiq_masked(true);
        enter(&mut regs, Exception::SoftwareInterrupt, VectorBase::Low, 0x100);
        assert!(regs.cpsr().fiq_masked());
    }

    #[test]
    fn high_vector_base_selected() {
        let mut regs = RegisterFile::reset();
        enter(&mut regs, Exception::DataAbort, VectorBase::High, 0x100);
        assert_eq!(regs.pc(), 0xFFFF_0010);
    }
}
