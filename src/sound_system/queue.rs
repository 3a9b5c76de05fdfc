/// Playback queue and scheduler
///
/// One-shot requests are appended by the caller and drained, in FIFO
/// order, by [`PlaybackQueue::play_all`], normally once per application
/// tick. A request that finds no free pool channel is dropped, never
/// retried.
use std::collections::VecDeque;

use super::pool::{self, ChannelPool, Playback};
use super::source::SoundId;
use crate::backend::{AudioBackend, BufferId, Vec3};
use crate::diagnostics::{DiagnosticBus, SoundEvent};

/// A pending one-shot playback request.
///
/// The buffer is resolved when the request is queued, so draining never
/// needs to consult the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedSound {
    pub sound: SoundId,
    pub buffer: BufferId,
    pub position: Vec3,
    pub gain: f32,
}

/// Result of one scheduler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Requests that started playing
    pub started: usize,
    /// Requests discarded because every pool channel was busy
    pub dropped: usize,
    /// Requests abandoned because a backend call failed
    pub failed: usize,
}

impl DrainReport {
    pub fn total(&self) -> usize {
        self.started + self.dropped + self.failed
    }
}

/// Unbounded FIFO of one-shot requests.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    pending: VecDeque<QueuedSound>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always accepted: no backpressure, no deduplication.
    pub fn push(&mut self, request: QueuedSound) {
        self.pending.push_back(request);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        discarded
    }

    /// Drain the queue, starting each request on the first free pool channel.
    ///
    /// Leaves the queue empty. A backend failure abandons only the request
    /// being serviced.
    pub fn play_all<B: AudioBackend>(
        &mut self,
        backend: &mut B,
        pool: &mut ChannelPool,
        bus: &DiagnosticBus,
    ) -> DrainReport {
        let mut report = DrainReport::default();

        while let Some(request) = self.pending.pop_front() {
            let Some(slot) = pool.find_free_slot(backend) else {
                tracing::warn!("No free channel for {}, dropping it", request.sound);
                bus.publish(SoundEvent::OneShotDropped { sound: request.sound });
                report.dropped += 1;
                continue;
            };

            let channel = pool.claim(slot).channel();
            let playback = Playback {
                buffer: request.buffer,
                position: request.position,
                gain: request.gain,
                looping: false,
            };

            match pool::start_channel(backend, channel, &playback) {
                Ok(()) => {
                    tracing::debug!("Playing {} on channel {}", request.sound, channel);
                    bus.publish(SoundEvent::OneShotStarted {
                        sound: request.sound,
                        channel,
                    });
                    report.started += 1;
                }
                Err(e) => {
                    tracing::error!("Failed to start {} on channel {}: {}", request.sound, channel, e);
                    bus.publish(SoundEvent::BackendCallFailed {
                        operation: "play_all_sounds",
                        message: e.to_string(),
                    });
                    report.failed += 1;
                }
            }
        }

        report
    }
}
