//! Interrupt controller model — primary/secondary status+enable word pairs
//! plus a dedicated FIQ status/mask pair, matching spec §4.5.
//!
//! An interrupt line is active when `(status & enable) != 0` for its word
//! AND the controller's global enable is set. Sources are grouped into a
//! primary bank (32 lines) and a secondary bank (32 more lines) so a single
//! `u32` pair covers the common case while still reaching 64 IRQ sources;
//! FIQ is a single separate fast line per the ARM7TDMI exception model.

/// A single interrupt source, identified by bank and bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptSource {
    /// `false` selects the primary 32-line bank, `true` the secondary bank.
    pub secondary: bool,
    /// Bit position within the bank, `0..32`.
    pub bit: u8,
}

impl InterruptSource {
    /// Construct a primary-bank source.
    pub const fn primary(bit: u8) -> Self {
        Self { secondary: false, bit }
    }

    /// Construct a secondary-bank source.
    pub const fn secondary(bit: u8) -> Self {
        Self { secondary: true, bit }
    }

    fn mask(self) -> u32 {
        1u32 << (self.bit & 0x1F)
    }
}

/// The interrupt controller: two IRQ banks and one FIQ line.
#[derive(Debug, Default, Clone, Copy)]
pub struct InterruptController {
    irq_status: [u32; 2],
    irq_enable: [u32; 2],
    fiq_status: u32,
    fiq_mask: u32,
    global_enable: bool,
}

impl InterruptController {
    /// Construct a controller with all lines masked and globally disabled,
    /// matching reset state.
    pub const fn new() -> Self {
        Self {
            irq_status: [0; 2],
            irq_enable: [0; 2],
            fiq_status: 0,
            fiq_mask: 0,
            global_enable: false,
        }
    }

    /// Enable or disable interrupt delivery globally. Pending status bits
    /// are retained across a disable; only delivery is gated.
    pub fn set_global_enable(&mut self, enabled: bool) {
        self.global_enable = enabled;
    }

    /// Assert a source's status bit. Typically called by a peripheral model
    /// (timer expiry, DMA completion) rather than the CPU.
    pub fn raise(&mut self, source: InterruptSource) {
        let bank = usize::from(source.secondary);
        self.irq_status[bank] |= source.mask();
    }

    /// Clear a source's status bit, mirroring a guest write-1-to-clear.
    pub fn clear(&mut self, source: InterruptSource) {
        let bank = usize::from(source.secondary);
        self.irq_status[bank] &= !source.mask();
    }

    /// Enable or disable a source's contribution to the active-IRQ line.
    pub fn set_enable(&mut self, source: InterruptSource, enabled: bool) {
        let bank = usize::from(source.secondary);
        if enabled {
            self.irq_enable[bank] |= source.mask();
        } else {
            self.irq_enable[bank] &= !source.mask();
        }
    }

    /// Assert the FIQ status bit for `bit`.
    pub fn raise_fiq(&mut self, bit: u8) {
        self.fiq_status |= 1u32 << (bit & 0x1F);
    }

    /// Clear the FIQ status bit for `bit`.
    pub fn clear_fiq(&mut self, bit: u8) {
        self.fiq_status &= !(1u32 << (bit & 0x1F));
    }

    /// Enable or disable a FIQ source.
    pub fn set_fiq_enable(&mut self, bit: u8, enabled: bool) {
        if enabled {
            self.fiq_mask |= 1u32 << (bit & 0x1F);
        } else {
            self.fiq_mask &= !(1u32 << (bit & 0x1F));
        }
    }

    /// `true` if any enabled IRQ source is pending and delivery is globally
    /// enabled.
    pub fn irq_active(&self) -> bool {
        self.global_enable
            && ((self.irq_status[0] & self.irq_enable[0]) != 0
                || (self.irq_status[1] & self.irq_enable[1]) != 0)
    }

    /// `true` if any enabled FIQ source is pending and delivery is globally
    /// enabled.
    pub fn fiq_active(&self) -> bool {
        self.global_enable && (self.fiq_status & self.fiq_mask) != 0
    }

    /// Raw status/enable words for the peripheral aperture's register
    /// read/write dispatch. Offsets: 0=irq_status[0], 4=irq_status[1],
    /// 8=irq_enable[0], 12=irq_enable[1], 16=fiq_status, 20=fiq_mask,
    /// 24=global_enable (bit 0).
    pub fn read_register(&self, offset: u32) -> u32 {
        match offset {
            0 => self.irq_status[0],
            4 => self.irq_status[1],
            8 => self.irq_enable[0],
            12 => self.irq_enable[1],
            16 => self.fiq_status,
            20 => self.fiq_mask,
            24 => u32::from(self.global_enable),
            _ => 0,
        }
    }

    /// Apply a guest write to a register offset. Status registers clear the
    /// bits written with a 1 (write-1-to-clear), matching the convention
    /// used by [`InterruptController::clear`].
    pub fn write_register(&mut self, offset: u32, value: u32) {
        match offset {
            0 => self.irq_status[0] &= !value,
            4 => self.irq_status[1] &= !value,
            8 => self.irq_enable[0] = value,
            12 => self.irq_enable[1] = value,
            16 => self.fiq_status &= !value,
            20 => self.fiq_mask = value,
            24 => self.global_enable = value & 1 != 0,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn irq_inactive_without_global_enable() {
        let mut ctrl = InterruptController::new();
        let src = InterruptSource::primary(3);
        ctrl.raise(src);
        ctrl.set_enable(src, true);
        assert!(!ctrl.irq_active());
    }

    #[test]
    fn irq_active_requires_status_and_enable() {
        let mut ctrl = InterruptController::new();
        ctrl.set_global_enable(true);
        let src = InterruptSource::primary(3);
        ctrl.set_enable(src, true);
        assert!(!ctrl.irq_active());
        ctrl.raise(src);
        assert!(ctrl.irq_active());
    }

    #[test]
    fn clear_deasserts_status() {
        let mut ctrl = InterruptController::new();
        ctrl.set_global_enable(true);
        let src = InterruptSource::secondary(10);
        ctrl.set_enable(src, true);
        ctrl.raise(src);
        assert!(ctrl.irq_active());
        ctrl.clear(src);
        assert!(!ctrl.irq_active());
    }

    #[test]
    fn fiq_is_independent_of_irq_banks() {
        let mut ctrl = InterruptController::new();
        ctrl.set_global_enable(true);
        ctrl.set_fiq_enable(2, true);
        ctrl.raise_fiq(2);
        assert!(ctrl.fiq_active());
        assert!(!ctrl.irq_active());
    }

    #[test]
    fn register_write_one_to_clear() {
        let mut ctrl = InterruptController::new();
        ctrl.raise(InterruptSource::primary(0));
        ctrl.raise(InterruptSource::primary(1));
        assert_eq!(ctrl.read_register(0), 0b11);
        ctrl.write_register(0, 0b01);
        assert_eq!(ctrl.read_register(0), 0b10);
    }
}
