//! The reply pipeline as seen by a conversation view.

pub mod playback;
pub mod reconcile;
pub mod session;

pub use playback::{classify_segment, FixedDice, RandomDice, VoiceDice, VoicePolicy};
pub use reconcile::spawn_reconciler;
pub use session::{ChatOptions, ChatSession, ContactSummary};
