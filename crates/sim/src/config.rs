//! Host simulator CLI configuration, per spec SPEC_FULL.md §10's "small
//! `SimConfig`... parsed with `clap` derive" note.

use std::path::PathBuf;

use clap::Parser;

/// Host-side simulator: runs the ARM7TDMI core against a firmware image and
/// (optionally) pumps an audio file through the same double-buffer pipeline
/// real firmware drives, per spec §5's "single thread drives the CPU and a
/// single thread drives the audio producer" description (modeled here as one
/// cooperative loop rather than two OS threads, since nothing in this
/// simulator needs real wall-clock concurrency to be faithful).
#[derive(Debug, Parser)]
#[command(name = "sim", version, about)]
pub struct SimConfig {
    /// Path to a disk image file. Falls back to a zero-filled in-memory
    /// disk if omitted.
    #[arg(long)]
    pub disk_image: Option<PathBuf>,

    /// Path to a firmware image (`telemetry::image` 128-byte header format)
    /// to verify and load into SDRAM before running.
    #[arg(long)]
    pub firmware_image: Option<PathBuf>,

    /// Path to a boot ROM binary. Falls back to an all-zero ROM if omitted.
    #[arg(long)]
    pub boot_rom: Option<PathBuf>,

    /// Audio file to load and play through the pipeline alongside the CPU
    /// step loop.
    #[arg(long)]
    pub audio_file: Option<PathBuf>,

    /// Number of CPU steps to execute per simulated tick.
    #[arg(long, default_value_t = 1000)]
    pub steps_per_tick: usize,

    /// Total number of ticks to run before exiting.
    #[arg(long, default_value_t = 100)]
    pub ticks: usize,

    /// Microseconds of timer/clock advance per tick.
    #[arg(long, default_value_t = 1000)]
    pub tick_micros: u32,

    /// Stop the CPU at this address instead of running the full tick budget.
    #[arg(long, value_parser = parse_hex_u32)]
    pub breakpoint: Option<u32>,
}

fn parse_hex_u32(s: &str) -> Result<u32, std::num::ParseIntError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u32::from_str_radix(s, 16)
}
