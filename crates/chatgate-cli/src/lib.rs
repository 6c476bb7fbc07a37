// crates/chatgate-cli/src/lib.rs
// ============================================================================
// Module: Chatgate CLI Library
// Description: Shared helpers for the chatgate command-line interface.
// Purpose: Keep bind policy checks testable outside the binary.
// Dependencies: chatgate-config
// ============================================================================

//! ## Overview
//! This library houses the serve policy used by the `chatgate` binary. The
//! binary entry point (`src/main.rs`) imports these helpers so bind checks and
//! startup warnings stay consistent with what the tests exercise.

// ============================================================================
// SECTION: Modules
// ============================================================================

/// Bind exposure policy and startup warnings.
pub mod serve_policy;
