/// Sound system
///
/// Owns the backend session and every resource created through it: the
/// buffer registry, the channel pool, the named sources and the playback
/// queue. Single-threaded by contract: the backend context belongs to the
/// thread that built the system, and every operation takes `&mut self`.
///
/// Teardown runs exactly once, on [`SoundSystem::shutdown`] or on drop,
/// destroying buffers, then named channels, then pool channels, then the
/// context and device. A fatal error (failed decode) triggers the same
/// teardown; afterwards every operation reports [`SoundError::Closed`].
use std::path::Path;

use super::named::NamedSources;
use super::pool::{self, ChannelPool, LoopingSoundHandle, Playback, Release};
use super::queue::{DrainReport, PlaybackQueue, QueuedSound};
use super::registry::BufferRegistry;
use super::source::SoundId;
use crate::backend::{AudioBackend, BackendSession, BufferId, ChannelId, PcmData, Vec3};
use crate::config::Config;
use crate::diagnostics::{DiagnosticBus, SoundEvent};
use crate::error::SoundError;

/// Pool and registry manager for short sound effects and loops.
pub struct SoundSystem<B: AudioBackend> {
    session: Option<BackendSession<B>>,
    registry: BufferRegistry,
    pool: ChannelPool,
    named: NamedSources,
    queue: PlaybackQueue,
    bus: DiagnosticBus,
}

fn live<B: AudioBackend>(session: &mut Option<BackendSession<B>>) -> Result<&mut B, SoundError> {
    session.as_deref_mut().ok_or(SoundError::Closed)
}

/// Log and publish a backend-call failure carried by `result`.
fn reported<T>(bus: &DiagnosticBus, operation: &'static str, result: Result<T, SoundError>) -> Result<T, SoundError> {
    if let Err(SoundError::Backend(e)) = &result {
        tracing::error!("Backend call failed during {}: {}", operation, e);
        bus.publish(SoundEvent::BackendCallFailed {
            operation,
            message: e.to_string(),
        });
    }
    result
}

fn validate_gain(gain: f32) -> Result<f32, SoundError> {
    // NaN fails the range check too
    if (0.0..=1.0).contains(&gain) {
        Ok(gain)
    } else {
        Err(SoundError::GainOutOfRange(gain))
    }
}

impl<B: AudioBackend> SoundSystem<B> {
    /// Open the backend and create a pool of `pool_size` channels.
    ///
    /// On failure nothing stays acquired: a partially built system is torn
    /// down before the error is returned.
    pub fn new(backend: B, pool_size: usize) -> Result<Self, SoundError> {
        let session = BackendSession::open(backend)?;
        let mut system = Self {
            session: Some(session),
            registry: BufferRegistry::new(),
            pool: ChannelPool::default(),
            named: NamedSources::new(),
            queue: PlaybackQueue::new(),
            bus: DiagnosticBus::new(),
        };

        system.pool = ChannelPool::new(live(&mut system.session)?, pool_size)?;
        tracing::info!("Sound system ready with {} pool channels", pool_size);
        Ok(system)
    }

    /// Build a system from configuration: pool, sounds, named sources and
    /// listener placement.
    pub fn from_config(backend: B, config: &Config) -> Result<Self, SoundError> {
        let mut system = Self::new(backend, config.pool_size)?;

        for entry in &config.typed_sounds {
            system.load_sound(entry.sound, config.sound_path(&entry.path))?;
        }
        for entry in &config.named_sounds {
            system.load_sound(entry.name.as_str(), config.sound_path(&entry.path))?;
        }
        for name in &config.named_sources {
            system.create_source(name)?;
        }

        system.set_listener_position(config.listener.position)?;
        system.set_listener_orientation(config.listener.forward, config.listener.up)?;

        Ok(system)
    }

    // ---- buffer registry ----

    /// Decode a sound file and register it.
    ///
    /// A decode failure is fatal: the system is torn down before the error
    /// is returned.
    pub fn load_sound(&mut self, id: impl Into<SoundId>, path: impl AsRef<Path>) -> Result<BufferId, SoundError> {
        let backend = live(&mut self.session)?;
        match self.registry.register(backend, id.into(), path.as_ref()) {
            Err(e @ SoundError::DecodeFailure { .. }) => {
                tracing::error!("{}; shutting down sound system", e);
                self.shutdown();
                Err(e)
            }
            other => other,
        }
    }

    /// Register already-decoded PCM.
    pub fn load_sound_from_pcm(&mut self, id: impl Into<SoundId>, pcm: &PcmData) -> Result<BufferId, SoundError> {
        let backend = live(&mut self.session)?;
        self.registry.register_pcm(backend, id.into(), pcm)
    }

    pub fn lookup(&self, id: &SoundId) -> Result<BufferId, SoundError> {
        self.ensure_open()?;
        self.registry.lookup(id)
    }

    pub fn is_loaded(&self, id: &SoundId) -> bool {
        self.registry.contains(id)
    }

    pub fn loaded_count(&self) -> usize {
        self.registry.len()
    }

    // ---- one-shot queue ----

    /// Queue a one-shot sound for the next [`play_all_sounds`](Self::play_all_sounds).
    ///
    /// The identifier and gain are validated here, not when the queue drains.
    pub fn queue_sound(&mut self, id: impl Into<SoundId>, position: Vec3, gain: f32) -> Result<(), SoundError> {
        self.ensure_open()?;
        let sound = id.into();
        let gain = validate_gain(gain)?;
        let buffer = self.registry.lookup(&sound)?;

        self.queue.push(QueuedSound {
            sound,
            buffer,
            position,
            gain,
        });
        Ok(())
    }

    /// Drain the queue onto free pool channels. Requests that find no free
    /// channel are dropped with a diagnostic.
    pub fn play_all_sounds(&mut self) -> DrainReport {
        let Some(backend) = self.session.as_deref_mut() else {
            return DrainReport::default();
        };

        let report = self.queue.play_all(backend, &mut self.pool, &self.bus);
        if report.total() > 0 {
            tracing::trace!(
                "Scheduler pass: {} started, {} dropped, {} failed",
                report.started,
                report.dropped,
                report.failed
            );
        }
        report
    }

    pub fn pending_sounds(&self) -> usize {
        self.queue.len()
    }

    /// Discard every queued request without playing it.
    pub fn clear_queue(&mut self) -> usize {
        self.queue.clear()
    }

    // ---- channel pool ----

    /// First pool channel that is not currently playing.
    pub fn acquire_free_channel(&self) -> Option<ChannelId> {
        let backend = self.session.as_deref()?;
        self.pool.acquire_free_channel(backend)
    }

    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    pub fn busy_channels(&self) -> usize {
        self.session
            .as_deref()
            .map(|backend| self.pool.busy_count(backend))
            .unwrap_or(0)
    }

    // ---- looping sounds ----

    /// Start a looping sound on a free pool channel right away.
    ///
    /// Returns `Ok(None)` without touching the backend when every pool
    /// channel is playing. The returned handle is the only way to stop the
    /// sound again.
    pub fn queue_looping_sound(
        &mut self,
        id: impl Into<SoundId>,
        position: Vec3,
        gain: f32,
    ) -> Result<Option<LoopingSoundHandle>, SoundError> {
        let backend = live(&mut self.session)?;
        let sound = id.into();
        let gain = validate_gain(gain)?;
        let buffer = self.registry.lookup(&sound)?;

        let Some(slot) = self.pool.find_free_slot(backend) else {
            tracing::warn!("No free channel to loop {}", sound);
            self.bus.publish(SoundEvent::LoopRejected { sound });
            return Ok(None);
        };

        let handle = self.pool.claim(slot);
        let playback = Playback {
            buffer,
            position,
            gain,
            looping: true,
        };

        if let Err(e) = pool::start_channel(backend, handle.channel(), &playback) {
            tracing::error!("Failed to start loop {} on {}", sound, handle);
            // Best effort: don't leave a half-configured loop on a free channel
            let _ = self.pool.release(backend, &handle);
            return reported(&self.bus, "queue_looping_sound", Err(e.into()));
        }

        tracing::info!("Looping {} on {}", sound, handle);
        self.bus.publish(SoundEvent::LoopStarted { sound, handle });
        Ok(Some(handle))
    }

    /// Stop a looping sound and release its channel back to the pool.
    ///
    /// Stopping a loop whose channel is already idle is tolerated and only
    /// reported as a diagnostic. A stale handle, whose channel has since
    /// been claimed by another sound, is rejected and nothing is stopped.
    pub fn stop_looping_sound(&mut self, handle: LoopingSoundHandle) -> Result<(), SoundError> {
        let backend = live(&mut self.session)?;

        match self.pool.release(backend, &handle) {
            Ok(Release::Stopped) => {
                tracing::info!("Stopped loop on {}", handle);
                self.bus.publish(SoundEvent::LoopStopped { handle });
                Ok(())
            }
            Ok(Release::AlreadyIdle(state)) => {
                tracing::warn!("Loop on {} was not playing ({}) when stopped", handle, state);
                self.bus.publish(SoundEvent::StopOnIdleChannel { handle });
                Ok(())
            }
            Err(SoundError::StaleHandle(stale)) => {
                tracing::warn!("Ignoring stop for stale loop handle {}", stale);
                Err(SoundError::StaleHandle(stale))
            }
            Err(e) => reported(&self.bus, "stop_looping_sound", Err(e)),
        }
    }

    /// Whether `handle` still owns its pool channel.
    pub fn is_loop_current(&self, handle: &LoopingSoundHandle) -> bool {
        self.pool.is_current(handle)
    }

    // ---- named sources ----

    pub fn create_source(&mut self, name: &str) -> Result<ChannelId, SoundError> {
        let backend = live(&mut self.session)?;
        let result = self.named.create(backend, name);
        reported(&self.bus, "create_source", result)
    }

    pub fn source_channel(&self, name: &str) -> Result<ChannelId, SoundError> {
        self.ensure_open()?;
        self.named.get(name)
    }

    pub fn source_count(&self) -> usize {
        self.named.len()
    }

    /// Play a registered sound on a named source, preempting whatever the
    /// source was playing.
    pub fn play_by_name(&mut self, source: &str, sound: impl Into<SoundId>) -> Result<(), SoundError> {
        let backend = live(&mut self.session)?;
        let sound = sound.into();
        let buffer = self.registry.lookup(&sound).map_err(|e| match e {
            SoundError::UnknownIdentifier(id) => SoundError::UnknownSound(id),
            other => other,
        })?;

        let result = self.named.play(backend, source, buffer);
        let channel = reported(&self.bus, "play_by_name", result)?;
        tracing::debug!("Source '{}' (channel {}) playing {}", source, channel, sound);
        self.bus.publish(SoundEvent::NamedSourcePlayed {
            source: source.to_string(),
            sound,
        });
        Ok(())
    }

    pub fn set_gain_by_name(&mut self, source: &str, gain: f32) -> Result<(), SoundError> {
        let backend = live(&mut self.session)?;
        let gain = validate_gain(gain)?;
        let result = self.named.set_gain(backend, source, gain);
        reported(&self.bus, "set_gain_by_name", result)
    }

    pub fn set_looping_by_name(&mut self, source: &str, looping: bool) -> Result<(), SoundError> {
        let backend = live(&mut self.session)?;
        let result = self.named.set_looping(backend, source, looping);
        reported(&self.bus, "set_looping_by_name", result)
    }

    // ---- listener ----

    pub fn set_listener_position(&mut self, position: Vec3) -> Result<(), SoundError> {
        let result = live(&mut self.session)?
            .set_listener_position(position)
            .map_err(SoundError::from);
        reported(&self.bus, "set_listener_position", result)
    }

    /// `forward` and `up` must be perpendicular; spatialization is undefined
    /// otherwise. Not validated.
    pub fn set_listener_orientation(&mut self, forward: Vec3, up: Vec3) -> Result<(), SoundError> {
        let result = live(&mut self.session)?
            .set_listener_orientation(forward, up)
            .map_err(SoundError::from);
        reported(&self.bus, "set_listener_orientation", result)
    }

    // ---- lifecycle ----

    pub fn diagnostics(&self) -> &DiagnosticBus {
        &self.bus
    }

    pub fn backend(&self) -> Option<&B> {
        self.session.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.session.is_none()
    }

    /// Release every backend resource. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };

        let buffers = self.registry.drain();
        let named = self.named.drain();
        let pooled = self.pool.drain();
        let discarded = self.queue.clear();

        for buffer in &buffers {
            session.destroy_buffer(*buffer);
        }
        for channel in named.iter().chain(pooled.iter()) {
            session.destroy_channel(*channel);
        }
        drop(session);

        tracing::info!(
            "Sound system shut down: {} buffers, {} named and {} pool channels released, {} queued sounds discarded",
            buffers.len(),
            named.len(),
            pooled.len(),
            discarded
        );
        self.bus.publish(SoundEvent::Shutdown);
    }

    fn ensure_open(&self) -> Result<(), SoundError> {
        if self.session.is_none() {
            return Err(SoundError::Closed);
        }
        Ok(())
    }
}

impl<B: AudioBackend> Drop for SoundSystem<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MockBackend, MockFailure};
    use crate::sound_system::SoundType;

    fn pcm() -> PcmData {
        PcmData::new(1, 8000, vec![0; 32])
    }

    fn failed_operations(events: &crossbeam_channel::Receiver<SoundEvent>) -> Vec<&'static str> {
        events
            .try_iter()
            .filter_map(|event| match event {
                SoundEvent::BackendCallFailed { operation, .. } => Some(operation),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_validate_gain() {
        assert!(validate_gain(0.0).is_ok());
        assert!(validate_gain(1.0).is_ok());
        assert!(validate_gain(-0.01).is_err());
        assert!(validate_gain(1.01).is_err());
        assert!(validate_gain(f32::NAN).is_err());
    }

    #[test]
    fn test_new_fails_cleanly_without_device() {
        let backend = MockBackend::new();
        let probe = backend.probe();
        probe.fail_on(MockFailure::OpenDevice);

        let result = SoundSystem::new(backend, 4);
        assert!(matches!(result, Err(SoundError::Backend(_))));
        assert!(probe.calls().is_empty());
    }

    #[test]
    fn test_new_releases_everything_when_pool_fails() {
        let backend = MockBackend::new();
        let probe = backend.probe();
        probe.fail_on(MockFailure::CreateChannel);

        assert!(SoundSystem::new(backend, 4).is_err());
        assert!(!probe.device_open());
        assert!(!probe.context_current());
        assert_eq!(probe.live_channels(), 0);
    }

    #[test]
    fn test_queue_sound_validates_at_enqueue_time() {
        let mut system = SoundSystem::new(MockBackend::new(), 2).unwrap();
        system.load_sound_from_pcm("laser", &pcm()).unwrap();

        assert!(matches!(
            system.queue_sound(SoundType::BassDrum, Vec3::ZERO, 1.0),
            Err(SoundError::UnknownIdentifier(_))
        ));
        assert!(matches!(
            system.queue_sound("laser", Vec3::ZERO, 2.0),
            Err(SoundError::GainOutOfRange(_))
        ));
        assert_eq!(system.pending_sounds(), 0);

        system.queue_sound("laser", Vec3::ZERO, 0.3).unwrap();
        assert_eq!(system.pending_sounds(), 1);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let backend = MockBackend::new();
        let probe = backend.probe();
        let mut system = SoundSystem::new(backend, 2).unwrap();
        assert!(system.backend().is_some());

        system.shutdown();
        assert!(system.backend().is_none());
        let calls = probe.call_count();
        system.shutdown();
        drop(system);

        assert_eq!(probe.call_count(), calls);
    }

    #[test]
    fn test_closed_system_rejects_operations() {
        let mut system = SoundSystem::new(MockBackend::new(), 1).unwrap();
        system.load_sound_from_pcm("laser", &pcm()).unwrap();
        system.shutdown();

        assert!(system.is_closed());
        assert!(matches!(system.queue_sound("laser", Vec3::ZERO, 1.0), Err(SoundError::Closed)));
        assert!(matches!(system.create_source("s1"), Err(SoundError::Closed)));
        assert_eq!(system.play_all_sounds(), DrainReport::default());
        assert_eq!(system.acquire_free_channel(), None);
        assert_eq!(system.busy_channels(), 0);
    }

    #[test]
    fn test_named_source_failures_are_published() {
        let backend = MockBackend::new();
        let probe = backend.probe();
        let mut system = SoundSystem::new(backend, 1).unwrap();
        system.create_source("s1").unwrap();
        let (events, _id) = system.diagnostics().subscribe();

        probe.fail_on(MockFailure::SetGain);
        assert!(matches!(system.set_gain_by_name("s1", 0.5), Err(SoundError::Backend(_))));

        probe.fail_on(MockFailure::CreateChannel);
        assert!(matches!(system.create_source("s2"), Err(SoundError::Backend(_))));

        assert_eq!(failed_operations(&events), vec!["set_gain_by_name", "create_source"]);
    }

    #[test]
    fn test_play_by_name_failure_is_published() {
        let backend = MockBackend::new();
        let probe = backend.probe();
        let mut system = SoundSystem::new(backend, 1).unwrap();
        system.load_sound_from_pcm("x", &pcm()).unwrap();
        let channel = system.create_source("s1").unwrap();
        let (events, _id) = system.diagnostics().subscribe();

        probe.fail_on(MockFailure::BindBuffer);
        assert!(matches!(system.play_by_name("s1", "x"), Err(SoundError::Backend(_))));

        assert_eq!(failed_operations(&events), vec!["play_by_name"]);
        assert_eq!(probe.channel(channel).unwrap().plays, 0);
    }

    #[test]
    fn test_loop_start_failure_frees_the_channel() {
        let backend = MockBackend::new();
        let probe = backend.probe();
        let mut system = SoundSystem::new(backend, 1).unwrap();
        system.load_sound_from_pcm("hum", &pcm()).unwrap();
        let (events, _id) = system.diagnostics().subscribe();

        probe.fail_on(MockFailure::Play);
        let result = system.queue_looping_sound("hum", Vec3::new(1.0, 0.0, 0.0), 0.3);
        assert!(matches!(result, Err(SoundError::Backend(_))));
        assert_eq!(failed_operations(&events), vec!["queue_looping_sound"]);

        let channel = system.acquire_free_channel().unwrap();
        assert!(probe.channel(channel).unwrap().is_idle());

        probe.clear_failure(MockFailure::Play);
        let handle = system.queue_looping_sound("hum", Vec3::ZERO, 0.3).unwrap().unwrap();
        assert_eq!(handle.channel(), channel);
    }

    #[test]
    fn test_loop_stop_failure_is_published_and_retryable() {
        let backend = MockBackend::new();
        let probe = backend.probe();
        let mut system = SoundSystem::new(backend, 1).unwrap();
        system.load_sound_from_pcm("hum", &pcm()).unwrap();
        let handle = system.queue_looping_sound("hum", Vec3::ZERO, 0.3).unwrap().unwrap();
        let (events, _id) = system.diagnostics().subscribe();

        probe.fail_on(MockFailure::Stop);
        assert!(matches!(system.stop_looping_sound(handle), Err(SoundError::Backend(_))));
        assert_eq!(failed_operations(&events), vec!["stop_looping_sound"]);
        assert!(system.is_loop_current(&handle));
        assert!(probe.channel(handle.channel()).unwrap().looping);

        probe.clear_failure(MockFailure::Stop);
        system.stop_looping_sound(handle).unwrap();
        assert!(probe.channel(handle.channel()).unwrap().is_idle());
    }
}
