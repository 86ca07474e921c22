//! Host simulator binary, per spec §2/§5: drives the ARM7TDMI core and
//! storage/audio subsystems in a single cooperative tick loop.

mod config;
mod disk;
mod peripheral_bus;

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use cpu::{Cpu, StepOutcome};
use platform::memory_bus::{MemoryBus, SDRAM_BASE};
use storage::backend::{FileDisk, MemDisk};
use storage::AtaController;

use config::SimConfig;
use disk::SimDisk;
use peripheral_bus::PeripheralBus;

const BOOT_ROM_SIZE: usize = 16 * 1024;
const SDRAM_SIZE: usize = 4 * 1024 * 1024;
const FLASH_SIZE: usize = 1 * 1024 * 1024;
const SRAM_SIZE: usize = 64 * 1024;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let config = SimConfig::parse();

    let boot_rom = load_or_zero(config.boot_rom.as_deref(), BOOT_ROM_SIZE)?;
    let mut sdram = vec![0u8; SDRAM_SIZE];
    let mut flash = vec![0u8; FLASH_SIZE];
    let mut sram = vec![0u8; SRAM_SIZE];

    if let Some(path) = &config.firmware_image {
        load_firmware_image(path, &mut sdram)?;
    }

    let disk = match &config.disk_image {
        Some(path) => SimDisk::File(FileDisk::open(path, false).with_context(|| format!("opening disk image {path:?}"))?),
        None => SimDisk::Memory(MemDisk::new(2048)),
    };
    let mut ata = AtaController::new(disk);

    let mut peripherals = PeripheralBus::new();
    peripherals.interrupts.set_global_enable(true);

    let mut player = player::PlayerFacade::new();
    if let Some(audio_path) = &config.audio_file {
        player
            .load_file(audio_path)
            .map_err(|e| anyhow::anyhow!("loading audio file {audio_path:?}: {e}"))?;
        player.play().map_err(|e| anyhow::anyhow!("starting playback: {e}"))?;
    }

    let mut cpu = Cpu::reset();
    cpu.registers_mut().set_pc(SDRAM_BASE);
    if let Some(bp) = config.breakpoint {
        cpu.set_breakpoint(Some(bp));
    }

    tracing::info!(ticks = config.ticks, steps_per_tick = config.steps_per_tick, "starting simulator");

    'ticks: for tick in 0..config.ticks {
        for _ in 0..config.steps_per_tick {
            // Snapshot interrupt state before building the bus: `step` needs
            // an immutable view of the controller alongside a mutable view
            // of the full peripheral aperture (which embeds that same
            // controller), and a `dyn PeripheralAperture` borrow can't be
            // split field-by-field, so a per-step `Copy` snapshot stands in.
            let interrupts = peripherals.interrupts;
            let mut bus = MemoryBus::new(&boot_rom, &mut sdram, &mut flash, &mut sram, &mut peripherals, &mut ata);
            match cpu.step(&mut bus, &interrupts) {
                StepOutcome::BreakpointHit => {
                    tracing::info!(pc = cpu.registers().pc(), "breakpoint hit, stopping");
                    break 'ticks;
                }
                StepOutcome::Halted => break,
                StepOutcome::Executed | StepOutcome::ExceptionDelivered(_) => {}
            }
        }

        peripherals.tick(config.tick_micros);
        player.process();

        if tick % 10 == 0 {
            let stats = player.stats();
            tracing::debug!(
                tick,
                samples_played = player.samples_played(),
                underruns = stats.fill_underruns,
                arm_failures = stats.arm_failures,
                "tick"
            );
        }
    }

    tracing::info!(
        samples_played = player.samples_played(),
        underruns = player.stats().fill_underruns,
        "simulator run complete"
    );
    Ok(())
}

fn load_or_zero(path: Option<&Path>, size: usize) -> anyhow::Result<Vec<u8>> {
    match path {
        Some(path) => {
            let mut bytes = std::fs::read(path).with_context(|| format!("reading {path:?}"))?;
            bytes.resize(size, 0);
            Ok(bytes)
        }
        None => Ok(vec![0u8; size]),
    }
}

fn load_firmware_image(path: &Path, sdram: &mut [u8]) -> anyhow::Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("reading firmware image {path:?}"))?;
    let image = telemetry::FirmwareImage::parse(&bytes).map_err(|e| anyhow::anyhow!("parsing firmware image: {e}"))?;
    if !image.verify() {
        anyhow::bail!("firmware image failed CRC/SHA verification");
    }
    let load_len = image.payload.len().min(sdram.len());
    sdram[..load_len].copy_from_slice(&image.payload[..load_len]);
    tracing::info!(version = %image.header.version_string(), bytes = load_len, "loaded firmware image");
    Ok(())
}
