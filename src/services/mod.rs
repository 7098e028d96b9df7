/// Command routing from the chat layer to the registry.
pub mod commands;
/// Per-game orchestration around the pure game state.
pub mod engine;
/// Messaging collaborator and the per-game delivery queue.
pub mod outbox;
/// Day deadline watchdog.
pub mod timer;

#[cfg(test)]
pub(crate) mod fakes;
