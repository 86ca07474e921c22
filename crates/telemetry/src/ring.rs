//! Telemetry ring buffer, per spec §3 "Telemetry event" and §6 "Persisted
//! state"/"Telemetry binary": a fixed-layout 16-byte event, preceded by a
//! header (magic, version, boot count, write index, wrap count), written
//! for post-mortem inspection over JTAG and never read at runtime by the
//! core itself.

use crate::error::TelemetryError;

const MAGIC: [u8; 4] = *b"ZPTL";
const HEADER_SIZE: usize = 16;
const EVENT_SIZE: usize = 16;

/// An event-type tag. Kept small and explicit rather than a free-form
/// string so the 16-byte record stays fixed-width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventKind {
    Boot = 0,
    AudioUnderrun = 1,
    DmaArmFailure = 2,
    AtaTimeout = 3,
    EmulatorFault = 4,
    Panic = 5,
    Warning = 6,
}

impl EventKind {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Boot),
            1 => Some(Self::AudioUnderrun),
            2 => Some(Self::DmaArmFailure),
            3 => Some(Self::AtaTimeout),
            4 => Some(Self::EmulatorFault),
            5 => Some(Self::Panic),
            6 => Some(Self::Warning),
            _ => None,
        }
    }
}

/// One 16-byte telemetry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryEvent {
    pub timestamp_ms: u64,
    pub kind: EventKind,
    pub short_datum: u16,
    pub extended_datum: u32,
}

impl TelemetryEvent {
    fn encode(&self) -> [u8; EVENT_SIZE] {
        let mut out = [0u8; EVENT_SIZE];
        out[0..8].copy_from_slice(&self.timestamp_ms.to_le_bytes());
        out[8] = self.kind as u8;
        out[10..12].copy_from_slice(&self.short_datum.to_le_bytes());
        out[12..16].copy_from_slice(&self.extended_datum.to_le_bytes());
        out
    }

    fn decode(bytes: &[u8; EVENT_SIZE]) -> Option<Self> {
        Some(Self {
            timestamp_ms: u64::from_le_bytes(bytes[0..8].try_into().ok()?),
            kind: EventKind::from_u8(bytes[8])?,
            short_datum: u16::from_le_bytes([bytes[10], bytes[11]]),
            extended_datum: u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
        })
    }
}

/// A fixed-capacity ring of `CAPACITY` events, overwriting the oldest
/// entry once full. Used in-place (e.g. a `static` backed by SRAM) so the
/// layout on disk/over JTAG matches this struct's field order exactly.
pub struct TelemetryRing<const CAPACITY: usize> {
    events: [Option<TelemetryEvent>; CAPACITY],
    boot_count: u16,
    write_index: u32,
    wrap_count: u32,
}

impl<const CAPACITY: usize> TelemetryRing<CAPACITY> {
    /// An empty ring for the given boot count.
    pub const fn new(boot_count: u16) -> Self {
        Self { events: [None; CAPACITY], boot_count, write_index: 0, wrap_count: 0 }
    }

    /// Append an event, overwriting the oldest slot once the ring is full.
    pub fn push(&mut self, event: TelemetryEvent) {
        let index = self.write_index as usize % CAPACITY.max(1);
        self.events[index] = Some(event);
        self.write_index += 1;
        if self.write_index as usize % CAPACITY.max(1) == 0 {
            self.wrap_count += 1;
        }
    }

    /// Events in chronological order (oldest first), skipping unwritten slots.
    pub fn iter_chronological(&self) -> impl Iterator<Item = TelemetryEvent> + '_ {
        let total_written = self.write_index as usize;
        let start = if total_written >= CAPACITY { total_written % CAPACITY } else { 0 };
        (0..CAPACITY.min(total_written.max(CAPACITY))).filter_map(move |offset| {
            let index = (start + offset) % CAPACITY;
            self.events[index]
        })
    }

    /// Serialize the header and every live event into a flat byte buffer
    /// (the "telemetry binary" format an external analysis tool parses).
    pub fn encode(&self) -> heapless::Vec<u8, { HEADER_SIZE + CAPACITY * EVENT_SIZE }> {
        let mut out = heapless::Vec::new();
        let mut header = [0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(&MAGIC);
        header[4] = 1; // version
        header[6..8].copy_from_slice(&self.boot_count.to_le_bytes());
        header[8..12].copy_from_slice(&self.write_index.to_le_bytes());
        header[12..16].copy_from_slice(&self.wrap_count.to_le_bytes());
        let _ = out.extend_from_slice(&header);
        for event in self.iter_chronological() {
            let _ = out.extend_from_slice(&event.encode());
        }
        out
    }
}

/// Aggregate health report produced by the analysis tool from a decoded
/// telemetry binary, per spec §6 "Telemetry binary".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub boot_count: u16,
    pub underrun_count: u32,
    pub arm_failure_count: u32,
    pub ata_timeout_count: u32,
    pub panic_count: u32,
    pub warning_count: u32,
}

/// Parse a telemetry binary and summarize it into a [`HealthReport`].
pub fn summarize(bytes: &[u8]) -> Result<HealthReport, TelemetryError> {
    if bytes.len() < HEADER_SIZE {
        return Err(TelemetryError::Truncated);
    }
    if bytes[0..4] != MAGIC {
        return Err(TelemetryError::BadMagic);
    }
    let boot_count = u16::from_le_bytes([bytes[6], bytes[7]]);

    let mut report = HealthReport { boot_count, ..Default::default() };
    let mut cursor = HEADER_SIZE;
    while cursor + EVENT_SIZE <= bytes.len() {
        let chunk: [u8; EVENT_SIZE] = bytes[cursor..cursor + EVENT_SIZE].try_into().unwrap_or([0u8; EVENT_SIZE]);
        if let Some(event) = TelemetryEvent::decode(&chunk) {
            match event.kind {
                EventKind::AudioUnderrun => report.underrun_count += 1,
                EventKind::DmaArmFailure => report.arm_failure_count += 1,
                EventKind::AtaTimeout => report.ata_timeout_count += 1,
                EventKind::Panic => report.panic_count += 1,
                EventKind::Warning => report.warning_count += 1,
                EventKind::Boot | EventKind::EmulatorFault => {}
            }
        }
        cursor += EVENT_SIZE;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_wraps_after_capacity_and_counts_wraps() {
        let mut ring: TelemetryRing<4> = TelemetryRing::new(1);
        for i in 0..6u32 {
            ring.push(TelemetryEvent { timestamp_ms: u64::from(i), kind: EventKind::Warning, short_datum: 0, extended_datum: i });
        }
        assert_eq!(ring.wrap_count, 1);
        let newest: Vec<_> = ring.iter_chronological().collect();
        assert_eq!(newest.len(), 4);
        assert_eq!(newest.last().unwrap().extended_datum, 5);
    }

    #[test]
    fn encode_then_summarize_counts_event_kinds() {
        let mut ring: TelemetryRing<8> = TelemetryRing::new(3);
        ring.push(TelemetryEvent { timestamp_ms: 0, kind: EventKind::AudioUnderrun, short_datum: 0, extended_datum: 0 });
        ring.push(TelemetryEvent { timestamp_ms: 1, kind: EventKind::Panic, short_datum: 0, extended_datum: 0 });
        ring.push(TelemetryEvent { timestamp_ms: 2, kind: EventKind::AudioUnderrun, short_datum: 0, extended_datum: 0 });

        let bytes = ring.encode();
        let report = summarize(&bytes).unwrap();
        assert_eq!(report.boot_count, 3);
        assert_eq!(report.underrun_count, 2);
        assert_eq!(report.panic_count, 1);
    }

    #[test]
    fn summarize_rejects_bad_magic() {
        let bytes = [0u8; HEADER_SIZE];
        assert_eq!(summarize(&bytes).unwrap_err(), TelemetryError::BadMagic);
    }
}
