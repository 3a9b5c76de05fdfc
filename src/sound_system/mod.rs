pub mod manager;
pub mod named;
pub mod pool;
pub mod queue;
pub mod registry;
/// Sound system module
///
/// Schedules short sound effects and looping sounds over a small, fixed
/// pool of backend channels.
///
/// ## Architecture
///
/// ```text
/// SoundSystem
///   ├── BufferRegistry   (SoundId -> BufferId, by name or by SoundType)
///   ├── PlaybackQueue    (FIFO of one-shot requests, drained per tick)
///   ├── ChannelPool      (N anonymous channels, first-free scan)
///   ├── NamedSources     (dedicated channels addressed by name)
///   └── BackendSession   (device + context, released on drop)
/// ```
///
/// ## Usage
///
/// ```rust,ignore
/// use sound_pool::{MockBackend, SoundSystem, SoundType, Vec3};
///
/// let mut system = SoundSystem::new(MockBackend::new(), 16)?;
/// system.load_sound(SoundType::BassDrum, "assets/sounds/BD2575.WAV")?;
///
/// // One-shot sounds go through the queue
/// system.queue_sound(SoundType::BassDrum, Vec3::new(1.0, 0.0, 0.0), 0.8)?;
/// system.play_all_sounds();
///
/// // Loops start immediately and must be stopped explicitly
/// if let Some(handle) = system.queue_looping_sound(SoundType::BassDrum, Vec3::ZERO, 0.5)? {
///     system.stop_looping_sound(handle)?;
/// }
/// ```
pub mod source;

// Re-export commonly used types
pub use manager::SoundSystem;
pub use named::NamedSources;
pub use pool::{ChannelPool, LoopingSoundHandle};
pub use queue::{DrainReport, PlaybackQueue, QueuedSound};
pub use registry::BufferRegistry;
pub use source::{SoundId, SoundType};
