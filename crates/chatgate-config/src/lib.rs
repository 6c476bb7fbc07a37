// crates/chatgate-config/src/lib.rs
// ============================================================================
// Module: Chatgate Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for chatgate.toml semantics.
// Dependencies: chatgate-core, serde, toml
// ============================================================================

//! ## Overview
//! `chatgate-config` defines the configuration model for the chatgate proxy.
//! Files are parsed with strict size and path limits, environment overrides
//! are applied on top, and the result is validated fail-closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
