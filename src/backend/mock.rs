/// In-memory audio backend
///
/// Simulates device, context, buffers and channels without touching audio
/// hardware. Channel state follows the usual source semantics: a buffer can
/// only be bound or detached while the channel is not playing or paused,
/// `play` restarts a playing channel, and a one-shot channel keeps playing
/// until the test calls [`MockProbe::finish`].
///
/// The backend is moved into the sound system, so tests inspect and steer it
/// through a [`MockProbe`] that shares the same state.
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{AudioBackend, BufferId, ChannelId, ChannelState, PcmData, Vec3};
use crate::error::BackendError;

/// A successful, state-changing backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    OpenDevice,
    CreateContext,
    MakeCurrent,
    DestroyContext,
    CloseDevice,
    CreateBuffer(BufferId),
    DestroyBuffer(BufferId),
    CreateChannel(ChannelId),
    DestroyChannel(ChannelId),
    BindBuffer(ChannelId, BufferId),
    DetachBuffer(ChannelId),
    SetPosition(ChannelId, Vec3),
    SetGain(ChannelId, f32),
    SetLooping(ChannelId, bool),
    Play(ChannelId),
    Stop(ChannelId),
    ListenerPosition(Vec3),
    ListenerOrientation(Vec3, Vec3),
}

/// Calls that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockFailure {
    OpenDevice,
    CreateContext,
    MakeCurrent,
    CreateBuffer,
    CreateChannel,
    BindBuffer,
    DetachBuffer,
    SetGain,
    Play,
    Stop,
}

/// Snapshot of one simulated channel.
#[derive(Debug, Clone, PartialEq)]
pub struct MockChannel {
    pub state: ChannelState,
    pub buffer: Option<BufferId>,
    pub position: Vec3,
    pub gain: f32,
    pub looping: bool,
    /// Number of successful `play` calls
    pub plays: u32,
}

impl MockChannel {
    fn new() -> Self {
        Self {
            state: ChannelState::Initial,
            buffer: None,
            position: Vec3::ZERO,
            gain: 1.0,
            looping: false,
            plays: 0,
        }
    }

    /// Indistinguishable from a freshly created channel.
    pub fn is_idle(&self) -> bool {
        *self == MockChannel {
            plays: self.plays,
            ..MockChannel::new()
        }
    }
}

#[derive(Debug)]
struct MockState {
    device_open: bool,
    context_created: bool,
    context_current: bool,
    next_id: u32,
    buffers: HashMap<BufferId, usize>,
    channels: BTreeMap<ChannelId, MockChannel>,
    listener_position: Vec3,
    listener_orientation: (Vec3, Vec3),
    failures: HashSet<MockFailure>,
    calls: Vec<MockCall>,
}

impl MockState {
    fn new() -> Self {
        Self {
            device_open: false,
            context_created: false,
            context_current: false,
            next_id: 1,
            buffers: HashMap::new(),
            channels: BTreeMap::new(),
            listener_position: Vec3::ZERO,
            listener_orientation: (Vec3::FORWARD, Vec3::UP),
            failures: HashSet::new(),
            calls: Vec::new(),
        }
    }

    fn check(&self, failure: MockFailure, op: &'static str) -> Result<(), BackendError> {
        if self.failures.contains(&failure) {
            return Err(BackendError::invalid(op, "injected failure"));
        }
        Ok(())
    }

    fn require_context(&self, op: &'static str) -> Result<(), BackendError> {
        if !self.context_current {
            return Err(BackendError::invalid(op, "no current context"));
        }
        Ok(())
    }

    fn next_raw_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn channel_mut(&mut self, channel: ChannelId) -> Result<&mut MockChannel, BackendError> {
        self.channels
            .get_mut(&channel)
            .ok_or(BackendError::UnknownChannel(channel))
    }
}

/// Shared view into a [`MockBackend`]'s state.
#[derive(Debug, Clone)]
pub struct MockProbe {
    state: Arc<Mutex<MockState>>,
}

impl MockProbe {
    /// Every successful state-changing call, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn channel(&self, channel: ChannelId) -> Option<MockChannel> {
        self.state.lock().channels.get(&channel).cloned()
    }

    /// Live channels in creation order.
    pub fn channels(&self) -> Vec<(ChannelId, MockChannel)> {
        self.state
            .lock()
            .channels
            .iter()
            .map(|(id, ch)| (*id, ch.clone()))
            .collect()
    }

    pub fn live_channels(&self) -> usize {
        self.state.lock().channels.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    /// Frame count of an uploaded buffer.
    pub fn buffer_frames(&self, buffer: BufferId) -> Option<usize> {
        self.state.lock().buffers.get(&buffer).copied()
    }

    pub fn playing_count(&self) -> usize {
        self.state
            .lock()
            .channels
            .values()
            .filter(|ch| ch.state == ChannelState::Playing)
            .count()
    }

    pub fn device_open(&self) -> bool {
        self.state.lock().device_open
    }

    pub fn context_current(&self) -> bool {
        self.state.lock().context_current
    }

    pub fn listener_position(&self) -> Vec3 {
        self.state.lock().listener_position
    }

    pub fn listener_orientation(&self) -> (Vec3, Vec3) {
        self.state.lock().listener_orientation
    }

    pub fn fail_on(&self, failure: MockFailure) {
        self.state.lock().failures.insert(failure);
    }

    pub fn clear_failure(&self, failure: MockFailure) {
        self.state.lock().failures.remove(&failure);
    }

    /// Complete a one-shot sound. Looping channels keep playing.
    /// Returns true if the channel transitioned to `Stopped`.
    pub fn finish(&self, channel: ChannelId) -> bool {
        let mut state = self.state.lock();
        match state.channels.get_mut(&channel) {
            Some(ch) if ch.state == ChannelState::Playing && !ch.looping => {
                ch.state = ChannelState::Stopped;
                true
            }
            _ => false,
        }
    }

    /// Complete every playing one-shot sound.
    pub fn finish_all(&self) -> usize {
        let mut state = self.state.lock();
        let mut finished = 0;
        for ch in state.channels.values_mut() {
            if ch.state == ChannelState::Playing && !ch.looping {
                ch.state = ChannelState::Stopped;
                finished += 1;
            }
        }
        finished
    }

    /// Pause a playing channel from outside the sound system.
    pub fn pause(&self, channel: ChannelId) -> bool {
        let mut state = self.state.lock();
        match state.channels.get_mut(&channel) {
            Some(ch) if ch.state == ChannelState::Playing => {
                ch.state = ChannelState::Paused;
                true
            }
            _ => false,
        }
    }
}

/// Deterministic audio backend for tests and dry runs.
#[derive(Debug)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::new())),
        }
    }

    pub fn probe(&self) -> MockProbe {
        MockProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for MockBackend {
    fn open_device(&mut self) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if state.failures.contains(&MockFailure::OpenDevice) {
            return Err(BackendError::DeviceUnavailable("injected failure".to_string()));
        }
        state.device_open = true;
        state.calls.push(MockCall::OpenDevice);
        Ok(())
    }

    fn create_context(&mut self) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if state.failures.contains(&MockFailure::CreateContext) || !state.device_open {
            return Err(BackendError::ContextCreationFailed("injected failure".to_string()));
        }
        state.context_created = true;
        state.calls.push(MockCall::CreateContext);
        Ok(())
    }

    fn make_current(&mut self) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.check(MockFailure::MakeCurrent, "make_current")?;
        if !state.context_created {
            return Err(BackendError::invalid("make_current", "no context"));
        }
        state.context_current = true;
        state.calls.push(MockCall::MakeCurrent);
        Ok(())
    }

    fn destroy_context(&mut self) {
        let mut state = self.state.lock();
        if state.context_created {
            state.context_created = false;
            state.context_current = false;
            state.calls.push(MockCall::DestroyContext);
        }
    }

    fn close_device(&mut self) {
        let mut state = self.state.lock();
        if state.device_open {
            state.device_open = false;
            state.calls.push(MockCall::CloseDevice);
        }
    }

    fn device_name(&self) -> Option<String> {
        Some("mock-device".to_string())
    }

    fn create_buffer_from_pcm(&mut self, pcm: &PcmData) -> Result<BufferId, BackendError> {
        let mut state = self.state.lock();
        state.require_context("create_buffer")?;
        if state.failures.contains(&MockFailure::CreateBuffer) {
            return Err(BackendError::BufferCreationFailed("injected failure".to_string()));
        }
        let raw = state.next_raw_id();
        let id = BufferId::from_raw(raw)
            .ok_or_else(|| BackendError::BufferCreationFailed("id space exhausted".to_string()))?;
        state.buffers.insert(id, pcm.frames());
        state.calls.push(MockCall::CreateBuffer(id));
        Ok(id)
    }

    fn destroy_buffer(&mut self, buffer: BufferId) {
        let mut state = self.state.lock();
        if state.buffers.remove(&buffer).is_some() {
            state.calls.push(MockCall::DestroyBuffer(buffer));
        }
    }

    fn create_channel(&mut self) -> Result<ChannelId, BackendError> {
        let mut state = self.state.lock();
        state.require_context("create_channel")?;
        if state.failures.contains(&MockFailure::CreateChannel) {
            return Err(BackendError::ChannelCreationFailed("injected failure".to_string()));
        }
        let raw = state.next_raw_id();
        let id = ChannelId::from_raw(raw)
            .ok_or_else(|| BackendError::ChannelCreationFailed("id space exhausted".to_string()))?;
        state.channels.insert(id, MockChannel::new());
        state.calls.push(MockCall::CreateChannel(id));
        Ok(id)
    }

    fn destroy_channel(&mut self, channel: ChannelId) {
        let mut state = self.state.lock();
        if state.channels.remove(&channel).is_some() {
            state.calls.push(MockCall::DestroyChannel(channel));
        }
    }

    fn channel_state(&self, channel: ChannelId) -> ChannelState {
        self.state
            .lock()
            .channels
            .get(&channel)
            .map(|ch| ch.state)
            .unwrap_or_default()
    }

    fn bind_buffer(&mut self, channel: ChannelId, buffer: BufferId) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.check(MockFailure::BindBuffer, "bind_buffer")?;
        if !state.buffers.contains_key(&buffer) {
            return Err(BackendError::UnknownBuffer(buffer));
        }
        let ch = state.channel_mut(channel)?;
        if ch.state.is_active() {
            return Err(BackendError::invalid("bind_buffer", "channel is playing or paused"));
        }
        ch.buffer = Some(buffer);
        state.calls.push(MockCall::BindBuffer(channel, buffer));
        Ok(())
    }

    fn detach_buffer(&mut self, channel: ChannelId) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.check(MockFailure::DetachBuffer, "detach_buffer")?;
        let ch = state.channel_mut(channel)?;
        if ch.state.is_active() {
            return Err(BackendError::invalid("detach_buffer", "channel is playing or paused"));
        }
        ch.buffer = None;
        ch.state = ChannelState::Initial;
        state.calls.push(MockCall::DetachBuffer(channel));
        Ok(())
    }

    fn set_channel_position(&mut self, channel: ChannelId, position: Vec3) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.channel_mut(channel)?.position = position;
        state.calls.push(MockCall::SetPosition(channel, position));
        Ok(())
    }

    fn set_channel_gain(&mut self, channel: ChannelId, gain: f32) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.check(MockFailure::SetGain, "set_gain")?;
        state.channel_mut(channel)?.gain = gain;
        state.calls.push(MockCall::SetGain(channel, gain));
        Ok(())
    }

    fn set_channel_looping(&mut self, channel: ChannelId, looping: bool) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.channel_mut(channel)?.looping = looping;
        state.calls.push(MockCall::SetLooping(channel, looping));
        Ok(())
    }

    fn play(&mut self, channel: ChannelId) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.check(MockFailure::Play, "play")?;
        let ch = state.channel_mut(channel)?;
        if ch.buffer.is_none() {
            return Err(BackendError::invalid("play", "no buffer bound"));
        }
        ch.state = ChannelState::Playing;
        ch.plays += 1;
        state.calls.push(MockCall::Play(channel));
        Ok(())
    }

    fn stop(&mut self, channel: ChannelId) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.check(MockFailure::Stop, "stop")?;
        state.channel_mut(channel)?.state = ChannelState::Stopped;
        state.calls.push(MockCall::Stop(channel));
        Ok(())
    }

    fn set_listener_position(&mut self, position: Vec3) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.require_context("set_listener_position")?;
        state.listener_position = position;
        state.calls.push(MockCall::ListenerPosition(position));
        Ok(())
    }

    fn set_listener_orientation(&mut self, forward: Vec3, up: Vec3) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        state.require_context("set_listener_orientation")?;
        state.listener_orientation = (forward, up);
        state.calls.push(MockCall::ListenerOrientation(forward, up));
        Ok(())
    }
}
