//! Firmware image verification and post-mortem telemetry, per spec §6.
//!
//! Every layout in this crate is a hand-encoded fixed-byte-offset struct
//! rather than a derived serialization format: the firmware image header,
//! telemetry ring, and persisted-state record are all read by tools outside
//! this workspace (a flashing tool, a JTAG-based analysis tool), so their
//! byte layout is the interface.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod error;
pub mod image;
pub mod persisted_state;
pub mod ring;

pub use error::TelemetryError;
pub use image::{build_image, FirmwareImage, ImageHeader};
pub use persisted_state::{PersistedState, ShutdownReason};
pub use ring::{summarize, EventKind, HealthReport, TelemetryEvent, TelemetryRing};
