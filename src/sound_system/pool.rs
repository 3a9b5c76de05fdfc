/// Channel pool
///
/// A fixed set of anonymous backend channels created up front. Allocation
/// is a linear scan in creation order for the first channel that is not
/// playing. There is no preemption or eviction; a request that finds every
/// channel busy is the caller's to drop.
///
/// Every time a slot is claimed for new content its generation advances.
/// A [`LoopingSoundHandle`] records the generation it was issued with, so a
/// handle whose channel has since been handed to another sound is detected
/// instead of silently stopping the newer sound.
use std::fmt;

use crate::backend::{AudioBackend, BufferId, ChannelId, ChannelState, Vec3};
use crate::error::{BackendError, SoundError};

/// Token for a looping sound started on a pool channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopingSoundHandle {
    slot: usize,
    channel: ChannelId,
    generation: u32,
}

impl LoopingSoundHandle {
    /// Backend channel the sound was started on
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for LoopingSoundHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel {} (slot {}, gen {})", self.channel, self.slot, self.generation)
    }
}

/// What to play on a channel and how.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Playback {
    pub buffer: BufferId,
    pub position: Vec3,
    pub gain: f32,
    pub looping: bool,
}

/// Outcome of releasing a looping sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// The channel was playing or paused and has been stopped
    Stopped,
    /// The channel had already stopped on its own
    AlreadyIdle(ChannelState),
}

#[derive(Debug, Default)]
pub struct ChannelPool {
    channels: Vec<ChannelId>,
    generations: Vec<u32>,
}

impl ChannelPool {
    /// Create exactly `size` backend channels.
    ///
    /// If any creation fails the channels already created are destroyed
    /// before the error is returned.
    pub fn new<B: AudioBackend>(backend: &mut B, size: usize) -> Result<Self, BackendError> {
        let mut channels = Vec::with_capacity(size);

        for i in 0..size {
            match backend.create_channel() {
                Ok(channel) => channels.push(channel),
                Err(e) => {
                    tracing::error!("Created only {} of {} pool channels: {}", i, size, e);
                    for channel in channels {
                        backend.destroy_channel(channel);
                    }
                    return Err(e);
                }
            }
        }

        tracing::debug!("Created channel pool with {} channels", channels.len());

        Ok(Self {
            generations: vec![0; channels.len()],
            channels,
        })
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Pool channels in creation order.
    pub fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    /// First slot, in creation order, whose channel is not playing.
    pub fn find_free_slot<B: AudioBackend>(&self, backend: &B) -> Option<usize> {
        self.channels
            .iter()
            .position(|&channel| !backend.channel_state(channel).is_busy())
    }

    /// First channel, in creation order, that is not playing.
    ///
    /// Pure query: repeated calls against unchanged channel states return
    /// the same channel.
    pub fn acquire_free_channel<B: AudioBackend>(&self, backend: &B) -> Option<ChannelId> {
        self.find_free_slot(backend).map(|slot| self.channels[slot])
    }

    pub fn busy_count<B: AudioBackend>(&self, backend: &B) -> usize {
        self.channels
            .iter()
            .filter(|&&channel| backend.channel_state(channel).is_busy())
            .count()
    }

    /// Reserve `slot` for new content, invalidating every handle issued
    /// for it before.
    pub fn claim(&mut self, slot: usize) -> LoopingSoundHandle {
        let generation = self.generations[slot].wrapping_add(1);
        self.generations[slot] = generation;
        LoopingSoundHandle {
            slot,
            channel: self.channels[slot],
            generation,
        }
    }

    /// Whether `handle` still owns its channel.
    pub fn is_current(&self, handle: &LoopingSoundHandle) -> bool {
        self.channels.get(handle.slot) == Some(&handle.channel)
            && self.generations.get(handle.slot) == Some(&handle.generation)
    }

    /// Stop a looping sound and return its channel to the state of a freshly
    /// created one: not looping, unbound, unit gain, at the origin.
    ///
    /// Stale handles are rejected without touching the backend.
    pub fn release<B: AudioBackend>(
        &mut self,
        backend: &mut B,
        handle: &LoopingSoundHandle,
    ) -> Result<Release, SoundError> {
        if !self.is_current(handle) {
            return Err(SoundError::StaleHandle(*handle));
        }

        let channel = handle.channel;
        let state = backend.channel_state(channel);
        let outcome = if state.is_active() {
            backend.stop(channel)?;
            Release::Stopped
        } else {
            Release::AlreadyIdle(state)
        };

        backend.set_channel_looping(channel, false)?;
        backend.detach_buffer(channel)?;
        backend.set_channel_gain(channel, 1.0)?;
        backend.set_channel_position(channel, Vec3::ZERO)?;
        Ok(outcome)
    }

    /// Remove every channel, returning them in creation order.
    pub fn drain(&mut self) -> Vec<ChannelId> {
        self.generations.clear();
        std::mem::take(&mut self.channels)
    }
}

/// Configure `channel` for `playback` and start it.
///
/// A paused channel is stopped first since a buffer cannot be rebound while
/// it holds live content. Stops at the first failing backend call.
pub fn start_channel<B: AudioBackend>(
    backend: &mut B,
    channel: ChannelId,
    playback: &Playback,
) -> Result<(), BackendError> {
    if backend.channel_state(channel).is_active() {
        backend.stop(channel)?;
    }
    backend.set_channel_looping(channel, playback.looping)?;
    backend.bind_buffer(channel, playback.buffer)?;
    backend.set_channel_position(channel, playback.position)?;
    backend.set_channel_gain(channel, playback.gain)?;
    backend.play(channel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendSession, MockBackend, MockFailure, MockProbe, PcmData};

    fn setup(size: usize) -> (BackendSession<MockBackend>, MockProbe, ChannelPool, BufferId) {
        let backend = MockBackend::new();
        let probe = backend.probe();
        let mut session = BackendSession::open(backend).unwrap();
        let pool = ChannelPool::new(&mut *session, size).unwrap();
        let buffer = session
            .create_buffer_from_pcm(&PcmData::new(1, 8000, vec![0; 16]))
            .unwrap();
        (session, probe, pool, buffer)
    }

    fn one_shot(buffer: BufferId) -> Playback {
        Playback {
            buffer,
            position: Vec3::new(1.0, 2.0, 3.0),
            gain: 0.5,
            looping: false,
        }
    }

    #[test]
    fn test_pool_creates_exact_size() {
        let (_session, probe, pool, _) = setup(4);
        assert_eq!(pool.len(), 4);
        assert_eq!(probe.live_channels(), 4);
    }

    #[test]
    fn test_empty_pool_never_has_free_channel() {
        let (session, _probe, pool, _) = setup(0);
        assert!(pool.is_empty());
        assert_eq!(pool.acquire_free_channel(&*session), None);
    }

    #[test]
    fn test_failed_creation_releases_created_channels() {
        let backend = MockBackend::new();
        let probe = backend.probe();
        let mut session = BackendSession::open(backend).unwrap();
        ChannelPool::new(&mut *session, 2).unwrap();
        let before = probe.live_channels();

        probe.fail_on(MockFailure::CreateChannel);
        assert!(ChannelPool::new(&mut *session, 3).is_err());
        assert_eq!(probe.live_channels(), before);
    }

    #[test]
    fn test_acquire_is_deterministic_and_in_creation_order() {
        let (mut session, _probe, pool, buffer) = setup(3);
        let first = pool.acquire_free_channel(&*session).unwrap();
        assert_eq!(first, pool.channels()[0]);
        assert_eq!(pool.acquire_free_channel(&*session), Some(first));

        start_channel(&mut *session, first, &one_shot(buffer)).unwrap();
        assert_eq!(pool.acquire_free_channel(&*session), Some(pool.channels()[1]));
        assert_eq!(pool.acquire_free_channel(&*session), Some(pool.channels()[1]));
    }

    #[test]
    fn test_finished_channel_is_reused() {
        let (mut session, probe, pool, buffer) = setup(1);
        let channel = pool.acquire_free_channel(&*session).unwrap();
        start_channel(&mut *session, channel, &one_shot(buffer)).unwrap();
        assert_eq!(pool.acquire_free_channel(&*session), None);

        probe.finish(channel);
        assert_eq!(pool.acquire_free_channel(&*session), Some(channel));
    }

    #[test]
    fn test_start_channel_applies_parameters() {
        let (mut session, probe, pool, buffer) = setup(1);
        let channel = pool.channels()[0];
        start_channel(&mut *session, channel, &one_shot(buffer)).unwrap();

        let ch = probe.channel(channel).unwrap();
        assert_eq!(ch.state, ChannelState::Playing);
        assert_eq!(ch.buffer, Some(buffer));
        assert_eq!(ch.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(ch.gain, 0.5);
        assert!(!ch.looping);
    }

    #[test]
    fn test_start_channel_stops_paused_channel_first() {
        let (mut session, probe, pool, buffer) = setup(1);
        let channel = pool.channels()[0];
        start_channel(&mut *session, channel, &one_shot(buffer)).unwrap();
        probe.pause(channel);

        start_channel(&mut *session, channel, &one_shot(buffer)).unwrap();
        assert_eq!(probe.channel(channel).unwrap().plays, 2);
    }

    #[test]
    fn test_claim_invalidates_previous_handle() {
        let (_session, _probe, mut pool, _) = setup(2);
        let first = pool.claim(0);
        assert!(pool.is_current(&first));

        let second = pool.claim(0);
        assert!(!pool.is_current(&first));
        assert!(pool.is_current(&second));
        assert_eq!(second.generation(), first.generation() + 1);
    }

    #[test]
    fn test_release_restores_idle_channel() {
        let (mut session, probe, mut pool, buffer) = setup(1);
        let handle = pool.claim(0);
        let looping = Playback {
            looping: true,
            ..one_shot(buffer)
        };
        start_channel(&mut *session, handle.channel(), &looping).unwrap();

        assert_eq!(pool.release(&mut *session, &handle).unwrap(), Release::Stopped);
        let ch = probe.channel(handle.channel()).unwrap();
        assert!(ch.is_idle());
        assert_eq!(ch.gain, 1.0);
        assert_eq!(ch.position, Vec3::ZERO);
    }

    #[test]
    fn test_release_failure_is_reported() {
        let (mut session, probe, mut pool, buffer) = setup(1);
        let handle = pool.claim(0);
        let looping = Playback {
            looping: true,
            ..one_shot(buffer)
        };
        start_channel(&mut *session, handle.channel(), &looping).unwrap();

        probe.fail_on(MockFailure::DetachBuffer);
        let err = pool.release(&mut *session, &handle).unwrap_err();
        assert!(matches!(err, SoundError::Backend(_)));

        // The handle still owns the channel, so a retry succeeds
        probe.clear_failure(MockFailure::DetachBuffer);
        assert_eq!(
            pool.release(&mut *session, &handle).unwrap(),
            Release::AlreadyIdle(ChannelState::Stopped)
        );
    }

    #[test]
    fn test_release_of_idle_channel_is_tolerated() {
        let (mut session, _probe, mut pool, _) = setup(1);
        let handle = pool.claim(0);

        let outcome = pool.release(&mut *session, &handle).unwrap();
        assert_eq!(outcome, Release::AlreadyIdle(ChannelState::Initial));
    }

    #[test]
    fn test_release_stale_handle_touches_nothing() {
        let (mut session, probe, mut pool, _) = setup(1);
        let stale = pool.claim(0);
        pool.claim(0);
        let before = probe.call_count();

        let err = pool.release(&mut *session, &stale).unwrap_err();
        assert!(matches!(err, SoundError::StaleHandle(h) if h == stale));
        assert_eq!(probe.call_count(), before);
    }
}
