//! This module contains the route configurations, request handlers and models of the PescaLead API.

/// Defined handlers for the PescaLead API.
pub mod handlers;
/// Data models for the PescaLead API.
pub mod models;
/// Route configuration for the PescaLead API.
pub mod routes;
