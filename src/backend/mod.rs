//! Audio backend capability surface.
//!
//! The sound system never talks to an audio device directly. Everything it
//! needs (device and context lifetime, buffer upload, channel creation and
//! per-channel playback control, listener placement) goes through the
//! [`AudioBackend`] trait. Two implementations ship with the crate:
//!
//! - [`mock::MockBackend`]: deterministic, in-memory, used by tests and dry runs
//! - [`rodio_backend::RodioBackend`]: real output through rodio spatial sinks
//!
//! Device and context ownership is explicit: a [`BackendSession`] opens both
//! when created and releases both when dropped.

use std::fmt;
use std::num::NonZeroU32;
use std::ops::{Add, Deref, DerefMut, Sub};

use serde::{Deserialize, Serialize};

use crate::error::BackendError;

pub mod mock;
pub mod rodio_backend;

pub use mock::{MockBackend, MockCall, MockChannel, MockFailure, MockProbe};
pub use rodio_backend::RodioBackend;

/// Opaque identifier for decoded audio uploaded to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(NonZeroU32);

/// Opaque identifier for a backend playback channel.
///
/// Zero is never a valid channel, so "no channel available" is expressed as
/// `Option::<ChannelId>::None` rather than a sentinel value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(NonZeroU32);

macro_rules! raw_handle {
    ($name:ident) => {
        impl $name {
            /// Wrap a raw backend id. Returns `None` for the reserved zero value.
            pub fn from_raw(raw: u32) -> Option<Self> {
                NonZeroU32::new(raw).map(Self)
            }

            pub fn get(self) -> u32 {
                self.0.get()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "#{}", self.0)
            }
        }
    };
}

raw_handle!(BufferId);
raw_handle!(ChannelId);

/// Playback state of a backend channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    /// Never played since creation or since its buffer was detached
    #[default]
    Initial,
    Playing,
    Paused,
    Stopped,
}

impl ChannelState {
    /// A channel is busy only while it is producing audio.
    pub fn is_busy(self) -> bool {
        matches!(self, ChannelState::Playing)
    }

    /// Playing or paused: the channel still holds live content.
    pub fn is_active(self) -> bool {
        matches!(self, ChannelState::Playing | ChannelState::Paused)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Initial => write!(f, "Initial"),
            ChannelState::Playing => write!(f, "Playing"),
            ChannelState::Paused => write!(f, "Paused"),
            ChannelState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// 3D vector used for emitter and listener placement.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);
    pub const UP: Vec3 = Vec3::new(0.0, 1.0, 0.0);
    /// Listener default facing direction (right-handed, looking down -Z)
    pub const FORWARD: Vec3 = Vec3::new(0.0, 0.0, -1.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    pub fn scale(self, factor: f32) -> Vec3 {
        Vec3::new(self.x * factor, self.y * factor, self.z * factor)
    }

    /// Unit vector in the same direction, or zero for a zero-length input.
    pub fn normalized(self) -> Vec3 {
        let len = self.length();
        if len > f32::EPSILON {
            self.scale(1.0 / len)
        } else {
            Vec3::ZERO
        }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from(v: [f32; 3]) -> Self {
        Vec3::new(v[0], v[1], v[2])
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Decoded, interleaved 16-bit PCM ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmData {
    pub channels: u16,
    pub sample_rate: u32,
    pub samples: Vec<i16>,
}

impl PcmData {
    pub fn new(channels: u16, sample_rate: u32, samples: Vec<i16>) -> Self {
        Self {
            channels,
            sample_rate,
            samples,
        }
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// The contract every audio backend fulfils.
///
/// All calls are synchronous and bounded. Calls that mutate backend state
/// return `Err` when the backend refuses them; the caller aborts the
/// operation that issued the call and leaves everything else untouched.
pub trait AudioBackend {
    fn open_device(&mut self) -> Result<(), BackendError>;
    fn create_context(&mut self) -> Result<(), BackendError>;
    fn make_current(&mut self) -> Result<(), BackendError>;
    fn destroy_context(&mut self);
    fn close_device(&mut self);

    /// Human readable name of the opened device, if the backend knows one.
    fn device_name(&self) -> Option<String> {
        None
    }

    fn create_buffer_from_pcm(&mut self, pcm: &PcmData) -> Result<BufferId, BackendError>;
    fn destroy_buffer(&mut self, buffer: BufferId);

    fn create_channel(&mut self) -> Result<ChannelId, BackendError>;
    fn destroy_channel(&mut self, channel: ChannelId);
    fn channel_state(&self, channel: ChannelId) -> ChannelState;

    /// Bind a buffer. Rejected while the channel is playing or paused.
    fn bind_buffer(&mut self, channel: ChannelId, buffer: BufferId) -> Result<(), BackendError>;
    /// Detach the bound buffer, returning the channel to `Initial`.
    /// Rejected while the channel is playing or paused.
    fn detach_buffer(&mut self, channel: ChannelId) -> Result<(), BackendError>;

    fn set_channel_position(&mut self, channel: ChannelId, position: Vec3) -> Result<(), BackendError>;
    fn set_channel_gain(&mut self, channel: ChannelId, gain: f32) -> Result<(), BackendError>;
    fn set_channel_looping(&mut self, channel: ChannelId, looping: bool) -> Result<(), BackendError>;

    fn play(&mut self, channel: ChannelId) -> Result<(), BackendError>;
    fn stop(&mut self, channel: ChannelId) -> Result<(), BackendError>;

    fn set_listener_position(&mut self, position: Vec3) -> Result<(), BackendError>;
    /// `forward` and `up` must be perpendicular; this is not checked.
    fn set_listener_orientation(&mut self, forward: Vec3, up: Vec3) -> Result<(), BackendError>;
}

/// Owns a backend whose device is open and whose context is current.
///
/// Dropping the session destroys the context and closes the device. If
/// opening fails partway, whatever was already acquired is released before
/// the error is returned.
pub struct BackendSession<B: AudioBackend> {
    backend: B,
}

impl<B: AudioBackend> BackendSession<B> {
    pub fn open(mut backend: B) -> Result<Self, BackendError> {
        backend.open_device()?;

        if let Err(e) = backend.create_context() {
            tracing::error!("Could not create audio context: {}", e);
            backend.close_device();
            return Err(e);
        }

        if let Err(e) = backend.make_current() {
            tracing::error!("Could not make audio context current: {}", e);
            backend.destroy_context();
            backend.close_device();
            return Err(e);
        }

        tracing::info!(
            "Opened audio device \"{}\"",
            backend.device_name().unwrap_or_else(|| "<unknown>".to_string())
        );

        Ok(Self { backend })
    }
}

impl<B: AudioBackend> Deref for BackendSession<B> {
    type Target = B;

    fn deref(&self) -> &B {
        &self.backend
    }
}

impl<B: AudioBackend> DerefMut for BackendSession<B> {
    fn deref_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: AudioBackend> Drop for BackendSession<B> {
    fn drop(&mut self) {
        self.backend.destroy_context();
        self.backend.close_device();
        tracing::debug!("Closed audio device");
    }
}
