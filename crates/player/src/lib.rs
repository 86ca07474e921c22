//! Application-facing audio façade, per spec §4.7: the surface a UI/menu
//! layer drives (`load_file`, transport controls, volume, the main-loop
//! pump), wiring together `codecs::TrackDecoder`, `audio::AudioPipeline`,
//! and `audio::volume`.

pub mod error;
pub mod facade;

pub use error::{ErrorState, PlayerError, Severity};
pub use facade::{PlayerFacade, MAX_TRACK_BYTES};
