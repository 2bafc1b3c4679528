//! MCP tool modules.
//!
//! Tools are grouped by domain: warehouse queries and metadata lookups,
//! `ClickUp` task lookups, and contextual help.

pub mod clickup;
pub mod context;
pub mod warehouse;
