//! Batch ticket generation.
//!
//! One job carries a chunk of a batch. For each ticket the handler signs a
//! token and renders the artifacts for its mode. Per-ticket failures are
//! recorded as outcomes and never abort sibling tickets.

mod handler;
mod types;

pub use handler::{GenerationMode, TicketGenerationHandler};
pub use types::{BatchResult, BatchStatus, RendererOptions, TicketBatchPayload, TicketOutcome};
