/// Diagnostic events
///
/// Events describe something the sound system already did (past tense).
use crate::backend::ChannelId;
use crate::sound_system::{LoopingSoundHandle, SoundId};

#[derive(Debug, Clone, PartialEq)]
pub enum SoundEvent {
    /// A queued one-shot sound started on a pool channel
    OneShotStarted { sound: SoundId, channel: ChannelId },

    /// A queued one-shot sound was discarded because every pool channel was busy
    OneShotDropped { sound: SoundId },

    /// A looping sound started on a pool channel
    LoopStarted { sound: SoundId, handle: LoopingSoundHandle },

    /// A looping sound could not start because every pool channel was busy
    LoopRejected { sound: SoundId },

    /// A looping sound was stopped and its channel released
    LoopStopped { handle: LoopingSoundHandle },

    /// `stop_looping_sound` found its channel already idle
    StopOnIdleChannel { handle: LoopingSoundHandle },

    /// A named source was (re)started
    NamedSourcePlayed { source: String, sound: SoundId },

    /// A backend call failed; the operation that issued it was abandoned
    BackendCallFailed { operation: &'static str, message: String },

    /// The backend was torn down
    Shutdown,
}

impl SoundEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            SoundEvent::OneShotStarted { sound, channel } => {
                format!("Started {} on channel {}", sound, channel)
            }
            SoundEvent::OneShotDropped { sound } => {
                format!("Dropped {}: no free channel", sound)
            }
            SoundEvent::LoopStarted { sound, handle } => {
                format!("Looping {} as {}", sound, handle)
            }
            SoundEvent::LoopRejected { sound } => {
                format!("Cannot loop {}: no free channel", sound)
            }
            SoundEvent::LoopStopped { handle } => format!("Stopped loop {}", handle),
            SoundEvent::StopOnIdleChannel { handle } => {
                format!("Loop {} was not playing when stopped", handle)
            }
            SoundEvent::NamedSourcePlayed { source, sound } => {
                format!("Source '{}' playing {}", source, sound)
            }
            SoundEvent::BackendCallFailed { operation, message } => {
                format!("Backend call failed during {}: {}", operation, message)
            }
            SoundEvent::Shutdown => "Sound system shut down".to_string(),
        }
    }

    /// Whether this event reports something going wrong
    pub fn is_problem(&self) -> bool {
        matches!(
            self,
            SoundEvent::OneShotDropped { .. }
                | SoundEvent::LoopRejected { .. }
                | SoundEvent::StopOnIdleChannel { .. }
                | SoundEvent::BackendCallFailed { .. }
        )
    }
}
