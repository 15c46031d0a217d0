//! Route tree tests against a mocked managed database.

mod common;
mod kanban;
mod pipeline;
