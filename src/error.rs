use thiserror::Error;

use crate::backend::{BufferId, ChannelId};
use crate::sound_system::{LoopingSoundHandle, SoundId};

/// Errors reported by an audio backend.
///
/// Setup variants (`DeviceUnavailable`, `ContextCreationFailed`) are fatal to
/// the sound system. The remaining variants describe a single failed call and
/// only abort the operation that issued it.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("No audio output device available: {0}")]
    DeviceUnavailable(String),

    #[error("Failed to create audio context: {0}")]
    ContextCreationFailed(String),

    #[error("Failed to create playback channel: {0}")]
    ChannelCreationFailed(String),

    #[error("Failed to upload audio buffer: {0}")]
    BufferCreationFailed(String),

    #[error("Unknown channel: {0}")]
    UnknownChannel(ChannelId),

    #[error("Unknown buffer: {0}")]
    UnknownBuffer(BufferId),

    #[error("Backend rejected {op}: {reason}")]
    InvalidOperation { op: &'static str, reason: String },
}

impl BackendError {
    pub(crate) fn invalid(op: &'static str, reason: impl Into<String>) -> Self {
        BackendError::InvalidOperation {
            op,
            reason: reason.into(),
        }
    }
}

/// Errors produced while turning a sound file into PCM samples.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to read sound file")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode WAV data")]
    Wav(#[from] hound::Error),

    #[error("Failed to decode compressed audio")]
    Codec(#[from] symphonia::core::errors::Error),

    #[error("No supported audio tracks found")]
    NoTrack,

    #[error("Missing stream parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Decoded stream contains no samples")]
    Empty,
}

/// Errors returned by the sound system to its caller.
#[derive(Error, Debug)]
pub enum SoundError {
    #[error("Sound {0} is already loaded")]
    DuplicateIdentifier(SoundId),

    #[error("Sound {0} is not loaded")]
    UnknownIdentifier(SoundId),

    #[error("Failed to load sound file: {path}")]
    DecodeFailure {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("A source named '{0}' already exists")]
    DuplicateName(String),

    #[error("No source named '{0}'")]
    UnknownSource(String),

    #[error("Cannot play unknown sound {0}")]
    UnknownSound(SoundId),

    #[error("Gain {0} is outside [0, 1]")]
    GainOutOfRange(f32),

    #[error("Looping sound handle {0} no longer owns its channel")]
    StaleHandle(LoopingSoundHandle),

    #[error("Sound system has been shut down")]
    Closed,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to save configuration to {path}")]
    SaveFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Could not determine the platform config directory")]
    NoConfigDir,
}

/// Type alias for application Results using anyhow for context chaining
pub type AppResult<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound_system::SoundType;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = SoundError::GainOutOfRange(1.5);
        assert_eq!(err.to_string(), "Gain 1.5 is outside [0, 1]");

        let err = SoundError::UnknownIdentifier(SoundId::Typed(SoundType::ClosedHat));
        assert_eq!(err.to_string(), "Sound type 'Closed Hat' is not loaded");

        let err = SoundError::DuplicateName("s1".to_string());
        assert_eq!(err.to_string(), "A source named 's1' already exists");
    }

    #[test]
    fn test_error_source_chain() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = SoundError::DecodeFailure {
            path: "/sounds/missing.wav".to_string(),
            source: Box::new(DecodeError::from(io_err)),
        };

        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "Failed to load sound file: /sounds/missing.wav");
    }

    #[test]
    fn test_backend_error_is_transparent() {
        let err = SoundError::from(BackendError::invalid("play", "no buffer bound"));
        assert_eq!(err.to_string(), "Backend rejected play: no buffer bound");
    }
}
