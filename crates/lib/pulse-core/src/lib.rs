//! Core types and services for pulse-mcp.
//!
//! This crate renders the warehouse query templates, drains `BigQuery` result
//! cursors into plain records, wraps every outcome in the response envelope,
//! and talks to the `ClickUp` task API.

pub mod clickup;
pub mod control;
pub mod envelope;
pub mod query;
pub mod warehouse;
