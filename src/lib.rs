//! Sound-effect scheduling over a fixed pool of playback channels.
//!
//! One-shot sounds are queued and started on the next scheduler pass,
//! looping sounds start immediately and are stopped through a handle, and
//! a handful of named sources can be driven directly. Everything runs on
//! top of an [`AudioBackend`]: [`RodioBackend`] for real output and
//! [`MockBackend`] for tests and dry runs.

pub mod backend;
pub mod config;
pub mod decoder;
pub mod diagnostics;
pub mod error;
pub mod sound_system;

pub use backend::{
    AudioBackend, BackendSession, BufferId, ChannelId, ChannelState, MockBackend, MockProbe, PcmData,
    RodioBackend, Vec3,
};
pub use config::{Config, ConfigOrigin};
pub use diagnostics::{DiagnosticBus, SoundEvent};
pub use error::{AppResult, BackendError, ConfigError, DecodeError, SoundError};
pub use sound_system::{DrainReport, LoopingSoundHandle, SoundId, SoundSystem, SoundType};
