//! This module contains the models used within PescaLead API endpoint interactions.

/// Api structures for the campaign queue.
pub mod campaign;
/// Api structures for the company registry.
pub mod cnpj;
/// Api structures for the follow-up queue.
pub mod follow_up;
/// Api structures for health endpoints.
pub mod health;
/// Api structures for funnels, columns, leads and stats.
pub mod kanban;
/// Api structures for the AI message sender.
pub mod messaging;
/// Api structures for the AI pipeline.
pub mod pipeline;
