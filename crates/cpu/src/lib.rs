//! ARM7TDMI fetch/decode/execute emulator.
//!
//! `crates/platform` supplies the memory bus and interrupt controller this
//! crate steps against; this crate never touches a real register and has no
//! notion of wall-clock time, matching spec §4.4's "behaviourally accurate,
//! not timing-accurate" non-goal.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

pub mod barrel_shifter;
pub mod decode;
pub mod execute;
pub mod exceptions;
pub mod registers;

use platform::interrupt::InterruptController;
use platform::memory_bus::{BusFault, MemoryBus};

pub use exceptions::{Exception, VectorBase};
pub use registers::{Mode, Psr, RegisterFile};

/// What happened during one [`Cpu::step`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// An instruction executed normally.
    Executed,
    /// The CPU is halted (via [`Cpu::halt`]) and did not step.
    Halted,
    /// The program counter hit the configured breakpoint before fetch.
    BreakpointHit,
    /// An exception was delivered (interrupt, SWI, undefined, or bus fault).
    ExceptionDelivered(Exception),
}

/// The ARM7TDMI core: register file plus the small amount of control state
/// (halt flag, breakpoint, vector base) spec §4.4's "Step" contract needs.
pub struct Cpu {
    regs: RegisterFile,
    halted: bool,
    breakpoint: Option<u32>,
    vector_base: VectorBase,
}

impl Cpu {
    /// A core at architectural reset.
    pub fn reset() -> Self {
        Self {
            regs: RegisterFile::reset(),
            halted: false,
            breakpoint: None,
            vector_base: VectorBase::Low,
        }
    }

    /// Borrow the register file.
    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    /// Mutably borrow the register file (for test fixtures and the
    /// simulator's initial program load).
    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.regs
    }

    /// Stop stepping until [`Cpu::resume`] is called.
    pub fn halt(&mut self) {
        self.halted = true;
    }

    /// Resume stepping after [`Cpu::halt`] or a breakpoint hit.
    pub fn resume(&mut self) {
        self.halted = false;
    }

    /// `true` if the core is halted.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Set or clear the single breakpoint address.
    pub fn set_breakpoint(&mut self, addr: Option<u32>) {
        self.breakpoint = addr;
    }

    /// Select the low or high exception vector base.
    pub fn set_vector_base(&mut self, base: VectorBase) {
        self.vector_base = base;
    }

    /// Perform one step: pending-interrupt check (FIQ before IRQ), halted
    /// check, breakpoint check, fetch, decode, execute. Matches spec §4.4's
    /// "Step" contract.
    pub fn step(&mut self, bus: &mut MemoryBus, interrupts: &InterruptController) -> StepOutcome {
        if interrupts.fiq_active() {
            self.deliver(Exception::Fiq);
            return StepOutcome::ExceptionDelivered(Exception::Fiq);
        }
        if interrupts.irq_active() {
            self.deliver(Exception::Irq);
            return StepOutcome::ExceptionDelivered(Exception::Irq);
        }

        if self.halted {
            return StepOutcome::Halted;
        }

        if self.breakpoint == Some(self.regs.pc()) {
            self.halted = true;
            return StepOutcome::BreakpointHit;
        }

        let fetch = bus.read(self.regs.pc(), platform::memory_bus::Width::Word);
        let word = match fetch {
            Ok(w) => w,
            Err(_fault) => {
                self.deliver(Exception::PrefetchAbort);
                return StepOutcome::ExceptionDelivered(Exception::PrefetchAbort);
            }
        };

        let instr = decode::decode(word);
        self.regs.set_pc(self.regs.pc().wrapping_add(4));

        match execute::execute(&mut self.regs, instr, bus) {
            Ok(execute::ExecOutcome::Normal) => StepOutcome::Executed,
            Ok(execute::ExecOutcome::Raise(exception)) => {
                self.deliver(exception);
                StepOutcome::ExceptionDelivered(exception)
            }
            Err(BusFault::Unmapped(_)) | Err(BusFault::Misaligned { .. }) | Err(BusFault::WriteProtected(_)) => {
                self.deliver(Exception::DataAbort);
                StepOutcome::ExceptionDelivered(Exception::DataAbort)
            }
        }
    }

    fn deliver(&mut self, exception: Exception) {
        let return_pc = self.regs.get(15);
        exceptions::enter(&mut self.regs, exception, self.vector_base, return_pc);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform::interrupt::InterruptSource;
    use platform::memory_bus::{IdeAperture, PeripheralAperture};

    struct NullAperture;
    impl PeripheralAperture for NullAperture {
        fn read_word(&mut self, _offset: u32) -> u32 {
            0
        }
        fn write_word(&mut self, _offset: u32, _value: u32) {}
        fn len(&self) -> u32 {
            0
        }
    }
    impl IdeAperture for NullAperture {
        fn read_word(&mut self, _offset: u32) -> u32 {
            0
        }
        fn write_word(&mut self, _offset: u32, _value: u32) {}
        fn len(&self) -> u32 {
            0
        }
    }

    fn run_program(words: &[u32], steps: usize) -> Cpu {
        let rom = [0u8; 16];
        let mut sdram = vec![0u8; 4096];
        for (i, word) in words.iter().enumerate() {
            sdram[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
        }
        let mut flash = [0u8; 16];
        let mut sram = [0u8; 16];
        let mut periph = NullAperture;
        let mut ide = NullAperture;
        let mut bus = MemoryBus::new(&rom, &mut sdram, &mut flash, &mut sram, &mut periph, &mut ide);
        let mut cpu = Cpu::reset();
        cpu.registers_mut().set_pc(platform::memory_bus::SDRAM_BASE);
        cpu.registers_mut().cpsr_mut().set_irq_masked(false);
        let interrupts = InterruptController::new();
        for _ in 0..steps {
            cpu.step(&mut bus, &interrupts);
        }
        cpu
    }

    #[test]
    fn arm_sequence_from_spec_scenario_5() {
        let cpu = run_program(&[0xE3A0_000A, 0xE3A0_1014, 0xE080_2001], 3);
        assert_eq!(cpu.registers().get(0), 10);
        assert_eq!(cpu.registers().get(1), 20);
        assert_eq!(cpu.registers().get(2), 30);
    }

    #[test]
    fn subs_equal_operands_sets_z_and_c_clears_n_v() {
        let cpu = run_program(
            &[
                0xE3A0_0005,       // MOV R0, #5
                0xE250_1005,       // SUBS R1, R0, #5
            ],
            2,
        );
        let psr = cpu.registers().cpsr();
        assert!(psr.z());
        assert!(psr.c());
        assert!(!psr.n());
        assert!(!psr.v());
    }

    #[test]
    fn adds_max_positive_plus_one_sets_n_and_v() {
        use decode::{AluOp, DecodedInstruction, Operand2};
        let rom = [0u8; 16];
        let mut sdram = vec![0u8; 16];
        let mut flash = [0u8; 16];
        let mut sram = [0u8; 16];
        let mut periph = NullAperture;
        let mut ide = NullAperture;
        let mut bus = MemoryBus::new(&rom, &mut sdram, &mut flash, &mut sram, &mut periph, &mut ide);
        let mut regs = RegisterFile::reset();
        regs.set(0, 0x7FFF_FFFF);
        regs.set(1, 1);
        let instr = DecodedInstruction::DataProcessing {
            cond: decode::Condition::Al,
            op: AluOp::Add,
            set_flags: true,
            rn: 0,
            rd: 2,
            operand2: Operand2::RegisterImmShift { rm: 1, kind: barrel_shifter::ShiftKind::Lsl, amount: 0 },
        };
        execute::execute(&mut regs, instr, &mut bus).unwrap();
        assert_eq!(regs.get(2), 0x8000_0000);
        assert!(regs.cpsr().n());
        assert!(regs.cpsr().v());
        assert!(!regs.cpsr().z());
    }

    #[test]
    fn mov_zero_with_s_bit_sets_z() {
        let cpu = run_program(&[0xE3B0_0000], 1); // MOVS R0, #0
        assert!(cpu.registers().cpsr().z());
    }

    #[test]
    fn breakpoint_halts_at_configured_pc() {
        let rom = [0u8; 16];
        let mut sdram = vec![0u8; 64];
        for i in 0..9 {
            sdram[i * 4..i * 4 + 4].copy_from_slice(&0xE1A0_0000u32.to_le_bytes()); // NOP (MOV R0, R0)
        }
        let mut flash = [0u8; 16];
        let mut sram = [0u8; 16];
        let mut periph = NullAperture;
        let mut ide = NullAperture;
        let mut bus = MemoryBus::new(&rom, &mut sdram, &mut flash, &mut sram, &mut periph, &mut ide);
        let mut cpu = Cpu::reset();
        cpu.registers_mut().set_pc(platform::memory_bus::SDRAM_BASE);
        cpu.set_breakpoint(Some(platform::memory_bus::SDRAM_BASE + 0x10));
        let interrupts = InterruptController::new();
        let mut outcome = StepOutcome::Executed;
        for _ in 0..100 {
            outcome = cpu.step(&mut bus, &interrupts);
            if outcome == StepOutcome::BreakpointHit {
                break;
            }
        }
        assert_eq!(outcome, StepOutcome::BreakpointHit);
        assert_eq!(cpu.registers().pc(), platform::memory_bus::SDRAM_BASE + 0x10);
        assert!(cpu.is_halted());
    }

    #[test]
    fn timer_irq_is_delivered_when_enabled() {
        let rom = [0u8; 16];
        let mut sdram = vec![0u8; 64];
        let mut flash = [0u8; 16];
        let mut sram = [0u8; 16];
        let mut periph = NullAperture;
        let mut ide = NullAperture;
        let mut bus = MemoryBus::new(&rom, &mut sdram, &mut flash, &mut sram, &mut periph, &mut ide);
        let mut cpu = Cpu::reset();
        cpu.registers_mut().cpsr_mut().set_irq_masked(false);
        let mut interrupts = InterruptController::new();
        interrupts.set_global_enable(true);
        let timer_src = InterruptSource::primary(0);
        interrupts.set_enable(timer_src, true);
        interrupts.raise(timer_src);
        let outcome = cpu.step(&mut bus, &interrupts);
        assert_eq!(outcome, StepOutcome::ExceptionDelivered(Exception::Irq));
        assert_eq!(cpu.registers().cpsr().mode(), Mode::Irq);
    }
}
