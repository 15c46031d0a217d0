#![doc = include_str!("../README.md")]
#![deny(missing_docs)]

pub mod api;
pub mod auth;
pub mod campaign;
pub mod cnpj;
pub mod common;
pub mod config;
pub mod context;
pub mod cors;
pub mod database;
pub mod follow_up;
pub mod kanban;
pub mod logging;
pub mod messaging;
pub mod openrouter;
pub mod pipeline;
pub mod rate_limit;
pub mod token_cache;
pub mod whatsapp;
