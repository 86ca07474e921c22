//! Programmable timer subsystem — two down-counters, a free-running
//! microsecond counter, and a 1 Hz RTC tick, per spec §4.5.
//!
//! Each [`Timer`] is a 28-bit down-counter clocked at 1 MHz. When it reaches
//! zero it raises an interrupt (if enabled) and either stops or reloads,
//! depending on `auto_reload`. [`TimerSystem`] owns the pair plus the
//! free-running counters and advances everything by a caller-supplied
//! microsecond delta per simulator tick.

const COUNTER_MASK: u32 = (1 << 28) - 1;

/// A single programmable down-counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timer {
    /// Counter enabled and counting down.
    pub enabled: bool,
    /// Reload the counter from `reload` on expiry instead of stopping.
    pub auto_reload: bool,
    /// Raise an interrupt on expiry.
    pub irq_enabled: bool,
    /// Value loaded into `count` on start or reload (28 bits significant).
    pub reload: u32,
    /// Current count, in microseconds remaining.
    pub count: u32,
    /// Set when the counter reached zero since the last time it was read.
    pub expired: bool,
}

impl Timer {
    /// A disabled timer with a zero reload value.
    pub const fn new() -> Self {
        Self {
            enabled: false,
            auto_reload: false,
            irq_enabled: false,
            reload: 0,
            count: 0,
            expired: false,
        }
    }

    /// Program the reload value and start counting from it immediately.
    pub fn start(&mut self, reload: u32) {
        self.reload = reload & COUNTER_MASK;
        self.count = self.reload;
        self.enabled = true;
        self.expired = false;
    }

    /// Stop the counter without clearing its programmed reload value.
    pub fn stop(&mut self) {
        self.enabled = false;
    }

    /// Advance the counter by `micros` microseconds. Returns `true` exactly
    /// once per tick if the counter reaches zero during this call — a timer
    /// can expire at most once per call regardless of how large `micros` is,
    /// matching the single-expiry-wave-per-tick contract the interrupt
    /// controller expects.
    pub fn advance(&mut self, micros: u32) -> bool {
        if !self.enabled {
            return false;
        }
        if micros >= self.count {
            self.count = if self.auto_reload { self.reload } else { 0 };
            if !self.auto_reload {
                self.enabled = false;
            }
            self.expired = true;
            true
        } else {
            self.count -= micros;
            false
        }
    }
}

/// Owns both programmable timers plus the free-running clocks.
#[derive(Debug, Default)]
pub struct TimerSystem {
    timers: [Timer; 2],
    /// Free-running microsecond counter since boot; never stops or wraps
    /// within any realistic session length below 2^64 µs.
    pub free_running_micros: u64,
    /// 1 Hz real-time counter, incremented once per full second of elapsed
    /// `free_running_micros`.
    pub rtc_seconds: u64,
    rtc_remainder_micros: u32,
}

impl TimerSystem {
    /// A fresh timer system with both timers disabled and clocks at zero.
    pub const fn new() -> Self {
        Self {
            timers: [Timer::new(), Timer::new()],
            free_running_micros: 0,
            rtc_seconds: 0,
            rtc_remainder_micros: 0,
        }
    }

    /// Borrow timer 0 or 1 mutably.
    pub fn timer_mut(&mut self, index: usize) -> &mut Timer {
        &mut self.timers[index & 1]
    }

    /// Borrow timer 0 or 1.
    pub fn timer(&self, index: usize) -> &Timer {
        &self.timers[index & 1]
    }

    /// Advance all clocks by `micros`. Returns a two-element array of
    /// expiry flags, one per timer, for the caller to forward into the
    /// interrupt controller.
    pub fn tick(&mut self, micros: u32) -> [bool; 2] {
        self.free_running_micros += u64::from(micros);

        self.rtc_remainder_micros += micros;
        while self.rtc_remainder_micros >= 1_000_000 {
            self.rtc_remainder_micros -= 1_000_000;
            self.rtc_seconds += 1;
        }

        [self.timers[0].advance(micros), self.timers[1].advance(micros)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_expires_after_reload_elapses() {
        let mut t = Timer::new();
        t.start(1000);
        assert!(!t.advance(999));
        assert!(t.advance(1));
        assert!(!t.enabled, "one-shot timer stops after expiry");
    }

    #[test]
    fn auto_reload_timer_keeps_running() {
        let mut t = Timer::new();
        t.auto_reload = true;
        t.start(500);
        assert!(t.advance(500));
        assert!(t.enabled);
        assert_eq!(t.count, 500);
    }

    #[test]
    fn disabled_timer_never_expires() {
        let mut t = Timer::new();
        assert!(!t.advance(1_000_000));
    }

    #[test]
    fn rtc_increments_once_per_second() {
        let mut sys = TimerSystem::new();
        sys.tick(999_999);
        assert_eq!(sys.rtc_seconds, 0);
        sys.tick(1);
        assert_eq!(sys.rtc_seconds, 1);
    }

    #[test]
    fn tick_reports_per_timer_expiry() {
        let mut sys = TimerSystem::new();
        sys.timer_mut(0).start(100);
        sys.timer_mut(1).start(200);
        assert_eq!(sys.tick(100), [true, false]);
        assert_eq!(sys.tick(100), [false, true]);
    }

    #[test]
    fn large_micro_step_expires_at_most_once() {
        let mut sys = TimerSystem::new();
        sys.timer_mut(0).auto_reload = true;
        sys.timer_mut(0).start(10);
        // A single huge tick should still only report one expiry, not the
        // (incorrect) floor-division count of reloads that fit.
        assert_eq!(sys.tick(10_000), [true, false]);
    }
}
