pub mod cadence;
pub mod summary;
pub mod turn;

pub use cadence::{CadenceState, CadenceVerdict, TriggerReason};
pub use summary::{InsertedSummary, SummaryRow};
pub use turn::{ClientTurn, ConversationTurn, DialogueRole, DialogueTurn, Role};
