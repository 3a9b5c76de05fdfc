/// Buffer registry
///
/// Maps sound identifiers to uploaded buffers. Append-only: entries are
/// added while loading and only removed, all at once, at teardown.
use std::collections::HashMap;
use std::path::Path;

use super::source::{SoundId, SoundType};
use crate::backend::{AudioBackend, BufferId, PcmData};
use crate::decoder;
use crate::error::SoundError;

#[derive(Debug, Default)]
pub struct BufferRegistry {
    named: HashMap<String, BufferId>,
    typed: HashMap<SoundType, BufferId>,
}

impl BufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `path`, upload it and register the buffer under `id`.
    ///
    /// The duplicate check runs before any decoding so a rejected call has
    /// no side effects.
    pub fn register<B: AudioBackend>(
        &mut self,
        backend: &mut B,
        id: SoundId,
        path: &Path,
    ) -> Result<BufferId, SoundError> {
        self.ensure_vacant(&id)?;
        let buffer = decoder::decode_and_upload(backend, path)?;
        tracing::info!("Loaded sound {} from {} as buffer {}", id, path.display(), buffer);
        self.insert(id, buffer);
        Ok(buffer)
    }

    /// Upload already-decoded PCM and register it under `id`.
    pub fn register_pcm<B: AudioBackend>(
        &mut self,
        backend: &mut B,
        id: SoundId,
        pcm: &PcmData,
    ) -> Result<BufferId, SoundError> {
        self.ensure_vacant(&id)?;
        let buffer = backend.create_buffer_from_pcm(pcm)?;
        tracing::info!("Loaded sound {} from memory ({} frames) as buffer {}", id, pcm.frames(), buffer);
        self.insert(id, buffer);
        Ok(buffer)
    }

    pub fn lookup(&self, id: &SoundId) -> Result<BufferId, SoundError> {
        let found = match id {
            SoundId::Named(name) => self.named.get(name),
            SoundId::Typed(kind) => self.typed.get(kind),
        };
        found.copied().ok_or_else(|| SoundError::UnknownIdentifier(id.clone()))
    }

    pub fn contains(&self, id: &SoundId) -> bool {
        self.lookup(id).is_ok()
    }

    pub fn len(&self) -> usize {
        self.named.len() + self.typed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every entry, returning the buffers in upload order.
    pub fn drain(&mut self) -> Vec<BufferId> {
        let mut buffers: Vec<BufferId> = self
            .named
            .drain()
            .map(|(_, b)| b)
            .chain(self.typed.drain().map(|(_, b)| b))
            .collect();
        buffers.sort();
        buffers
    }

    fn ensure_vacant(&self, id: &SoundId) -> Result<(), SoundError> {
        if self.contains(id) {
            return Err(SoundError::DuplicateIdentifier(id.clone()));
        }
        Ok(())
    }

    fn insert(&mut self, id: SoundId, buffer: BufferId) {
        match id {
            SoundId::Named(name) => {
                self.named.insert(name, buffer);
            }
            SoundId::Typed(kind) => {
                self.typed.insert(kind, buffer);
            }
        }
    }
}
