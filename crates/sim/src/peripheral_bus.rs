//! Combines the interrupt controller and timer system into the single
//! register aperture the memory bus expects, per spec §4.6's note that
//! "peripheral register aperture" is one dyn-trait-backed region covering
//! everything that isn't storage.
//!
//! Register map (word offsets):
//! - `0..28`: interrupt controller, per [`platform::interrupt::InterruptController::read_register`].
//! - `32`/`48`: timer 0/1 reload-and-start (write `reload` to arm).
//! - `36`/`52`: timer 0/1 stop (any write).
//! - `40`/`56`: timer 0/1 count (read) / control (write: bit0 irq-enable, bit1 auto-reload).

use platform::{InterruptController, InterruptSource, TimerSystem};

const TIMER0_START: u32 = 32;
const TIMER0_STOP: u32 = 36;
const TIMER0_COUNT_CONTROL: u32 = 40;
const TIMER1_START: u32 = 48;
const TIMER1_STOP: u32 = 52;
const TIMER1_COUNT_CONTROL: u32 = 56;

/// The IRQ source raised when timer 0 (or 1) expires.
pub fn timer_irq_source(index: usize) -> InterruptSource {
    InterruptSource::primary(index as u8)
}

/// Owns the interrupt controller and timer system, and presents them as a
/// single [`platform::memory_bus::PeripheralAperture`].
pub struct PeripheralBus {
    pub interrupts: InterruptController,
    pub timers: TimerSystem,
}

impl PeripheralBus {
    /// A fresh bus with both subsystems at reset state.
    pub fn new() -> Self {
        Self { interrupts: InterruptController::new(), timers: TimerSystem::new() }
    }

    /// Advance the timer system by `micros` and raise any IRQ sources for
    /// timers that expired during this tick.
    pub fn tick(&mut self, micros: u32) {
        let expired = self.timers.tick(micros);
        for (index, did_expire) in expired.into_iter().enumerate() {
            if did_expire && self.timers.timer(index).irq_enabled {
                self.interrupts.raise(timer_irq_source(index));
            }
        }
    }
}

impl Default for PeripheralBus {
    fn default() -> Self {
        Self::new()
    }
}

impl platform::memory_bus::PeripheralAperture for PeripheralBus {
    fn read_word(&mut self, offset: u32) -> u32 {
        match offset {
            0..=27 => self.interrupts.read_register(offset),
            TIMER0_COUNT_CONTROL => self.timers.timer(0).count,
            TIMER1_COUNT_CONTROL => self.timers.timer(1).count,
            _ => 0,
        }
    }

    fn write_word(&mut self, offset: u32, value: u32) {
        match offset {
            0..=27 => self.interrupts.write_register(offset, value),
            TIMER0_START => self.timers.timer_mut(0).start(value),
            TIMER0_STOP => self.timers.timer_mut(0).stop(),
            TIMER0_COUNT_CONTROL => {
                self.timers.timer_mut(0).irq_enabled = value & 0x1 != 0;
                self.timers.timer_mut(0).auto_reload = value & 0x2 != 0;
            }
            TIMER1_START => self.timers.timer_mut(1).start(value),
            TIMER1_STOP => self.timers.timer_mut(1).stop(),
            TIMER1_COUNT_CONTROL => {
                self.timers.timer_mut(1).irq_enabled = value & 0x1 != 0;
                self.timers.timer_mut(1).auto_reload = value & 0x2 != 0;
            }
            _ => {}
        }
    }

    fn len(&self) -> u32 {
        64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use platform::memory_bus::PeripheralAperture;

    #[test]
    fn timer_expiry_raises_its_irq_source_when_enabled() {
        let mut bus = PeripheralBus::new();
        bus.write_word(TIMER1_COUNT_CONTROL, 0x1); // irq-enable timer 1
        bus.write_word(TIMER1_START, 50);
        bus.interrupts.set_enable(timer_irq_source(1), true);
        bus.interrupts.set_global_enable(true);
        bus.tick(100);
        assert!(bus.interrupts.irq_active());
    }

    #[test]
    fn interrupt_register_writes_pass_through() {
        let mut bus = PeripheralBus::new();
        bus.interrupts.raise(InterruptSource::primary(0));
        assert_eq!(bus.read_word(0), 1);
        bus.write_word(0, 1);
        assert_eq!(bus.read_word(0), 0);
    }
}
