//! Payloads handed to the messaging collaborator and returned to command callers.

/// Public channel announcements and private role messages.
pub mod announcement;
/// Read-only snapshot of a running game.
pub mod status;
