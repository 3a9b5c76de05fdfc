/// Rodio-backed audio backend
///
/// Each channel is a rodio `SpatialSink`. Buffers are shared PCM blocks that
/// are replayed through `SamplesBuffer` on every `play`. The listener is
/// modelled as a pair of ears placed either side of the listener position
/// along `forward x up`.
use std::collections::HashMap;
use std::sync::Arc;

use rodio::buffer::SamplesBuffer;
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{OutputStream, OutputStreamHandle, Source, SpatialSink};

use super::{AudioBackend, BufferId, ChannelId, ChannelState, PcmData, Vec3};
use crate::error::BackendError;

/// Distance from the listener position to each ear.
const EAR_OFFSET: f32 = 0.1;

#[derive(Debug, Clone, Copy)]
struct Listener {
    position: Vec3,
    forward: Vec3,
    up: Vec3,
}

impl Listener {
    fn ears(&self) -> ([f32; 3], [f32; 3]) {
        let mut right = self.forward.cross(self.up).normalized();
        if right == Vec3::ZERO {
            right = Vec3::new(1.0, 0.0, 0.0);
        }
        let offset = right.scale(EAR_OFFSET);
        (
            (self.position - offset).to_array(),
            (self.position + offset).to_array(),
        )
    }
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::FORWARD,
            up: Vec3::UP,
        }
    }
}

struct RodioChannel {
    sink: SpatialSink,
    buffer: Option<BufferId>,
    position: Vec3,
    gain: f32,
    looping: bool,
    /// Set once the channel has been played; distinguishes Initial from Stopped
    started: bool,
}

/// Audio backend that plays through the default output device.
pub struct RodioBackend {
    stream: Option<(OutputStream, OutputStreamHandle)>,
    device_name: Option<String>,
    context_ready: bool,
    next_id: u32,
    buffers: HashMap<BufferId, Arc<PcmData>>,
    channels: HashMap<ChannelId, RodioChannel>,
    listener: Listener,
}

impl RodioBackend {
    pub fn new() -> Self {
        Self {
            stream: None,
            device_name: None,
            context_ready: false,
            next_id: 1,
            buffers: HashMap::new(),
            channels: HashMap::new(),
            listener: Listener::default(),
        }
    }

    fn handle(&self, op: &'static str) -> Result<&OutputStreamHandle, BackendError> {
        if !self.context_ready {
            return Err(BackendError::invalid(op, "no current context"));
        }
        self.stream
            .as_ref()
            .map(|(_, handle)| handle)
            .ok_or_else(|| BackendError::invalid(op, "device not open"))
    }

    fn new_sink(&self, position: Vec3, gain: f32) -> Result<SpatialSink, BackendError> {
        let handle = self.handle("create_channel")?;
        let (left, right) = self.listener.ears();
        let sink = SpatialSink::try_new(handle, position.to_array(), left, right)
            .map_err(|e| BackendError::ChannelCreationFailed(e.to_string()))?;
        sink.set_volume(gain);
        Ok(sink)
    }

    fn next_raw_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        id
    }

    fn channel(&self, channel: ChannelId) -> Result<&RodioChannel, BackendError> {
        self.channels
            .get(&channel)
            .ok_or(BackendError::UnknownChannel(channel))
    }

    fn channel_mut(&mut self, channel: ChannelId) -> Result<&mut RodioChannel, BackendError> {
        self.channels
            .get_mut(&channel)
            .ok_or(BackendError::UnknownChannel(channel))
    }

    /// Stopping a sink empties its queue asynchronously, so the sink is
    /// replaced to make the channel observably idle right away.
    fn reset_sink(&mut self, channel: ChannelId) -> Result<(), BackendError> {
        let (position, gain) = {
            let ch = self.channel(channel)?;
            ch.sink.stop();
            (ch.position, ch.gain)
        };
        let sink = self.new_sink(position, gain)?;
        self.channel_mut(channel)?.sink = sink;
        Ok(())
    }

    /// Queue the bound buffer on an empty sink and start it in the
    /// channel's current looping mode.
    fn queue_buffer(&mut self, channel: ChannelId) -> Result<(), BackendError> {
        let (buffer, restart) = {
            let ch = self.channel(channel)?;
            let buffer = ch
                .buffer
                .ok_or_else(|| BackendError::invalid("play", "no buffer bound"))?;
            (buffer, !ch.sink.empty())
        };
        let pcm = self
            .buffers
            .get(&buffer)
            .cloned()
            .ok_or(BackendError::UnknownBuffer(buffer))?;

        if restart {
            self.reset_sink(channel)?;
        }

        let ch = self.channel_mut(channel)?;
        // SamplesBuffer needs owned samples; the shared PCM block is cloned per play
        let source = SamplesBuffer::new(pcm.channels, pcm.sample_rate, pcm.samples.clone());
        if ch.looping {
            ch.sink.append(source.repeat_infinite());
        } else {
            ch.sink.append(source);
        }
        ch.sink.set_volume(ch.gain);
        ch.sink.play();
        ch.started = true;

        tracing::trace!("rodio channel {} playing buffer {}", channel, buffer);
        Ok(())
    }

    fn apply_listener(&self) {
        let (left, right) = self.listener.ears();
        for ch in self.channels.values() {
            ch.sink.set_left_ear_position(left);
            ch.sink.set_right_ear_position(right);
        }
    }

    fn state_of(ch: &RodioChannel) -> ChannelState {
        if ch.sink.empty() {
            if ch.started {
                ChannelState::Stopped
            } else {
                ChannelState::Initial
            }
        } else if ch.sink.is_paused() {
            ChannelState::Paused
        } else {
            ChannelState::Playing
        }
    }
}

impl Default for RodioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for RodioBackend {
    fn open_device(&mut self) -> Result<(), BackendError> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| BackendError::DeviceUnavailable(e.to_string()))?;
        self.device_name = rodio::cpal::default_host()
            .default_output_device()
            .and_then(|device| device.name().ok());
        self.stream = Some((stream, handle));
        Ok(())
    }

    fn create_context(&mut self) -> Result<(), BackendError> {
        if self.stream.is_none() {
            return Err(BackendError::ContextCreationFailed("device not open".to_string()));
        }
        Ok(())
    }

    fn make_current(&mut self) -> Result<(), BackendError> {
        if self.stream.is_none() {
            return Err(BackendError::invalid("make_current", "device not open"));
        }
        self.context_ready = true;
        Ok(())
    }

    fn destroy_context(&mut self) {
        self.context_ready = false;
    }

    fn close_device(&mut self) {
        for ch in self.channels.values() {
            ch.sink.stop();
        }
        self.channels.clear();
        self.buffers.clear();
        self.stream = None;
    }

    fn device_name(&self) -> Option<String> {
        self.device_name.clone()
    }

    fn create_buffer_from_pcm(&mut self, pcm: &PcmData) -> Result<BufferId, BackendError> {
        self.handle("create_buffer")?;
        if pcm.is_empty() || pcm.channels == 0 || pcm.sample_rate == 0 {
            return Err(BackendError::BufferCreationFailed(format!(
                "unusable PCM: {} channels, {} Hz, {} samples",
                pcm.channels,
                pcm.sample_rate,
                pcm.samples.len()
            )));
        }
        let raw = self.next_raw_id();
        let id = BufferId::from_raw(raw)
            .ok_or_else(|| BackendError::BufferCreationFailed("id space exhausted".to_string()))?;
        self.buffers.insert(id, Arc::new(pcm.clone()));
        Ok(id)
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        self.buffers.remove(&buffer);
    }

    fn create_channel(&mut self) -> Result<ChannelId, BackendError> {
        let sink = self.new_sink(Vec3::ZERO, 1.0)?;
        let raw = self.next_raw_id();
        let id = ChannelId::from_raw(raw)
            .ok_or_else(|| BackendError::ChannelCreationFailed("id space exhausted".to_string()))?;
        self.channels.insert(
            id,
            RodioChannel {
                sink,
                buffer: None,
                position: Vec3::ZERO,
                gain: 1.0,
                looping: false,
                started: false,
            },
        );
        Ok(id)
    }

    fn destroy_channel(&mut self, channel: ChannelId) {
        if let Some(ch) = self.channels.remove(&channel) {
            ch.sink.stop();
        }
    }

    fn channel_state(&self, channel: ChannelId) -> ChannelState {
        self.channels
            .get(&channel)
            .map(Self::state_of)
            .unwrap_or_default()
    }

    fn bind_buffer(&mut self, channel: ChannelId, buffer: BufferId) -> Result<(), BackendError> {
        if !self.buffers.contains_key(&buffer) {
            return Err(BackendError::UnknownBuffer(buffer));
        }
        let ch = self.channel_mut(channel)?;
        if Self::state_of(ch).is_active() {
            return Err(BackendError::invalid("bind_buffer", "channel is playing or paused"));
        }
        ch.buffer = Some(buffer);
        Ok(())
    }

    fn detach_buffer(&mut self, channel: ChannelId) -> Result<(), BackendError> {
        let ch = self.channel_mut(channel)?;
        if Self::state_of(ch).is_active() {
            return Err(BackendError::invalid("detach_buffer", "channel is playing or paused"));
        }
        ch.buffer = None;
        ch.started = false;
        Ok(())
    }

    fn set_channel_position(&mut self, channel: ChannelId, position: Vec3) -> Result<(), BackendError> {
        let ch = self.channel_mut(channel)?;
        ch.position = position;
        ch.sink.set_emitter_position(position.to_array());
        Ok(())
    }

    fn set_channel_gain(&mut self, channel: ChannelId, gain: f32) -> Result<(), BackendError> {
        let ch = self.channel_mut(channel)?;
        ch.gain = gain;
        ch.sink.set_volume(gain);
        Ok(())
    }

    /// Switching the mode of a playing or paused channel requeues its
    /// buffer from the start, keeping it paused if it was.
    fn set_channel_looping(&mut self, channel: ChannelId, looping: bool) -> Result<(), BackendError> {
        let ch = self.channel_mut(channel)?;
        if ch.looping == looping {
            return Ok(());
        }
        ch.looping = looping;

        let state = Self::state_of(ch);
        if state.is_active() {
            self.queue_buffer(channel)?;
            if state == ChannelState::Paused {
                self.channel(channel)?.sink.pause();
            }
            tracing::trace!("rodio channel {} requeued with looping={}", channel, looping);
        }
        Ok(())
    }

    fn play(&mut self, channel: ChannelId) -> Result<(), BackendError> {
        self.queue_buffer(channel)
    }

    fn stop(&mut self, channel: ChannelId) -> Result<(), BackendError> {
        self.reset_sink(channel)?;
        self.channel_mut(channel)?.started = true;
        Ok(())
    }

    fn set_listener_position(&mut self, position: Vec3) -> Result<(), BackendError> {
        self.handle("set_listener_position")?;
        self.listener.position = position;
        self.apply_listener();
        Ok(())
    }

    fn set_listener_orientation(&mut self, forward: Vec3, up: Vec3) -> Result<(), BackendError> {
        self.handle("set_listener_orientation")?;
        self.listener.forward = forward;
        self.listener.up = up;
        self.apply_listener();
        Ok(())
    }
}
