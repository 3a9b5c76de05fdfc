/// Diagnostics side channel
///
/// Scheduling decisions that are not errors (a sound dropped because every
/// channel is busy, a stop issued on an idle channel, a backend call that
/// failed mid-operation) are logged through `tracing` and also published
/// as [`SoundEvent`]s so that callers and tests can observe them.
///
/// ```text
/// ┌─────────────┐  publish   ┌───────────────┐  try_send   ┌────────────┐
/// │ SoundSystem │ ─────────> │ DiagnosticBus │ ──────────> │ Subscriber │
/// └─────────────┘            └───────────────┘             └────────────┘
/// ```
///
/// ## Usage
///
/// ```rust,ignore
/// let (rx, _id) = system.diagnostics().subscribe();
/// system.play_all_sounds();
/// while let Ok(event) = rx.try_recv() {
///     if let SoundEvent::OneShotDropped { sound } = event {
///         tracing::warn!("dropped {}", sound);
///     }
/// }
/// ```

pub mod bus;
pub mod events;

pub use bus::{DiagnosticBus, SubscriberId};
pub use events::SoundEvent;
