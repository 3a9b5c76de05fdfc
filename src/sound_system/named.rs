/// Named-source registry
///
/// Dedicated channels outside the pool, created one at a time under a
/// caller-chosen name and controlled directly. They are never reused for
/// pool work and are only destroyed at teardown.
use std::collections::HashMap;

use crate::backend::{AudioBackend, BufferId, ChannelId};
use crate::error::SoundError;

#[derive(Debug, Default)]
pub struct NamedSources {
    sources: HashMap<String, ChannelId>,
}

impl NamedSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create<B: AudioBackend>(&mut self, backend: &mut B, name: &str) -> Result<ChannelId, SoundError> {
        if self.sources.contains_key(name) {
            return Err(SoundError::DuplicateName(name.to_string()));
        }

        let channel = backend.create_channel()?;
        self.sources.insert(name.to_string(), channel);
        tracing::debug!("Created named source '{}' on channel {}", name, channel);
        Ok(channel)
    }

    pub fn get(&self, name: &str) -> Result<ChannelId, SoundError> {
        self.sources
            .get(name)
            .copied()
            .ok_or_else(|| SoundError::UnknownSource(name.to_string()))
    }

    /// Play `buffer` on the named source.
    ///
    /// Whatever the source is currently playing is stopped first, so a
    /// second call preempts the first rather than layering sounds.
    pub fn play<B: AudioBackend>(
        &self,
        backend: &mut B,
        name: &str,
        buffer: BufferId,
    ) -> Result<ChannelId, SoundError> {
        let channel = self.get(name)?;

        if backend.channel_state(channel).is_active() {
            tracing::debug!("Source '{}' busy, stopping it before rebinding", name);
            backend.stop(channel)?;
        }

        backend.bind_buffer(channel, buffer)?;
        backend.play(channel)?;
        Ok(channel)
    }

    pub fn set_gain<B: AudioBackend>(&self, backend: &mut B, name: &str, gain: f32) -> Result<(), SoundError> {
        let channel = self.get(name)?;
        backend.set_channel_gain(channel, gain)?;
        Ok(())
    }

    pub fn set_looping<B: AudioBackend>(&self, backend: &mut B, name: &str, looping: bool) -> Result<(), SoundError> {
        let channel = self.get(name)?;
        backend.set_channel_looping(channel, looping)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Remove every source, returning the channels in creation order.
    pub fn drain(&mut self) -> Vec<ChannelId> {
        let mut channels: Vec<ChannelId> = self.sources.drain().map(|(_, c)| c).collect();
        channels.sort();
        channels
    }
}
