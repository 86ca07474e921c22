//! Façade error taxonomy and process-wide error-severity state, per spec §4.7
//! and §7's "Propagation policy": main-loop code surfaces errors through
//! typed returns, which the façade records as a severity-tagged entry.

use codecs::DecodeError;

/// Errors [`crate::PlayerFacade`]'s operations can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror_no_std::Error)]
pub enum PlayerError {
    /// The path/handle given to `load_file` does not exist or is unreadable.
    #[error("file not found")]
    FileNotFound,
    /// Content detection found no matching container.
    #[error("unsupported format")]
    UnsupportedFormat,
    /// The file exceeds the façade's track-buffer capacity.
    #[error("file too large")]
    FileTooLarge,
    /// The decoder failed to parse the stream after format detection
    /// succeeded.
    #[error("decoder error: {0}")]
    DecoderError(DecodeError),
    /// An operation that requires a loaded track was called with none loaded.
    #[error("player not initialized")]
    NotInitialized,
    /// `load_file` failed for a reason not covered by a more specific variant.
    #[error("load failed")]
    LoadFailed,
}

impl From<DecodeError> for PlayerError {
    fn from(err: DecodeError) -> Self {
        Self::DecoderError(err)
    }
}

/// Severity of an error recorded in the façade's process-wide error state,
/// ordered so `Ord` gives the "monotone to the highest observed" comparison
/// spec §7 requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Severity {
    /// Nothing to report.
    #[default]
    None,
    /// Transient hardware hiccup; operation continues.
    Warning,
    /// Surfaced to the caller as a typed error; not fatal to the system.
    Significant,
    /// Logged; the system attempts a safe-stop of audio and continues.
    Critical,
}

/// The façade's process-wide error state feeding a status-bar indicator.
/// Monotone to the highest severity observed within a session until
/// explicitly cleared.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorState {
    highest: Severity,
}

impl ErrorState {
    /// A clean error state.
    pub const fn new() -> Self {
        Self { highest: Severity::None }
    }

    /// Record an observation, raising `highest` if `severity` exceeds it.
    pub fn record(&mut self, severity: Severity) {
        if severity > self.highest {
            self.highest = severity;
        }
    }

    /// The highest severity observed since the last [`ErrorState::clear`].
    pub fn highest(&self) -> Severity {
        self.highest
    }

    /// Reset to [`Severity::None`].
    pub fn clear(&mut self) {
        self.highest = Severity::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_monotone_until_cleared() {
        let mut state = ErrorState::new();
        state.record(Severity::Warning);
        state.record(Severity::None);
        assert_eq!(state.highest(), Severity::Warning);
        state.record(Severity::Critical);
        assert_eq!(state.highest(), Severity::Critical);
        state.record(Severity::Significant);
        assert_eq!(state.highest(), Severity::Critical);
        state.clear();
        assert_eq!(state.highest(), Severity::None);
    }
}
