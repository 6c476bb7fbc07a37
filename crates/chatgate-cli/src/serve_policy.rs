// crates/chatgate-cli/src/serve_policy.rs
// ============================================================================
// Module: Serve Policy
// Description: Network exposure policy checks for the CLI server launcher.
// Purpose: Keep binds local by default and require explicit opt-in otherwise.
// Dependencies: chatgate-config, std
// ============================================================================

//! ## Overview
//! A loopback bind is always accepted. A non-loopback bind is only accepted
//! when `server.localhost_only` is off and the operator opted in with
//! `--allow-non-loopback` or [`ALLOW_NON_LOOPBACK_ENV`]. The accepted bind is
//! summarized as a [`BindOutcome`], from which [`startup_warnings`] derives the
//! lines printed to stderr before the server starts.

use std::env;
use std::fmt;
use std::net::SocketAddr;

use chatgate_config::ChatgateConfig;

/// Environment variable enabling non-loopback server binds.
pub const ALLOW_NON_LOOPBACK_ENV: &str = "CHATGATE_ALLOW_NON_LOOPBACK";

/// Bind outcome metadata for startup warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindOutcome {
    /// Bound socket address.
    pub bind_addr: SocketAddr,
    /// True when the server is bound to a non-loopback address.
    pub network_exposed: bool,
    /// Whether audit records are written.
    pub audit_enabled: bool,
    /// Whether the per-trace rate limit is active.
    pub rate_limit_enabled: bool,
    /// Whether the per-trace concurrency gate is active.
    pub concurrency_enabled: bool,
    /// Whether a tool registry is configured.
    pub registry_configured: bool,
}

/// Serve policy failures for bind safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServePolicyError {
    /// Environment variable was set to an invalid value.
    InvalidEnv {
        /// Raw environment value.
        value: String,
    },
    /// Bind string failed to parse.
    InvalidBind {
        /// Raw bind value.
        bind: String,
        /// Parse error message.
        error: String,
    },
    /// `server.localhost_only` forbids the requested bind.
    LocalhostOnly {
        /// Bind address.
        bind: String,
    },
    /// Non-loopback binding requires explicit opt-in.
    NonLoopbackOptInRequired {
        /// Bind address.
        bind: String,
    },
}

impl fmt::Display for ServePolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnv {
                value,
            } => write!(f, "{ALLOW_NON_LOOPBACK_ENV} has invalid value: {value}"),
            Self::InvalidBind {
                bind,
                error,
            } => write!(f, "invalid bind address {bind}: {error}"),
            Self::LocalhostOnly {
                bind,
            } => write!(f, "bind {bind} is not loopback and server.localhost_only is set"),
            Self::NonLoopbackOptInRequired {
                bind,
            } => write!(
                f,
                "bind {bind} is not loopback; pass --allow-non-loopback or set \
                 {ALLOW_NON_LOOPBACK_ENV}=1"
            ),
        }
    }
}

impl std::error::Error for ServePolicyError {}

/// Resolves the non-loopback opt-in flag from CLI and environment.
///
/// # Errors
/// Returns [`ServePolicyError::InvalidEnv`] when the environment value is invalid.
pub fn resolve_allow_non_loopback(flag: bool) -> Result<bool, ServePolicyError> {
    if flag {
        return Ok(true);
    }
    let Some(value) = env::var_os(ALLOW_NON_LOOPBACK_ENV) else {
        return Ok(false);
    };
    parse_allow_non_loopback_value(&value.to_string_lossy())
}

/// Checks the configured bind against the exposure policy.
///
/// # Errors
/// Returns [`ServePolicyError`] when the bind is malformed or exposed without
/// opt-in.
pub fn enforce_bind_policy(
    config: &ChatgateConfig,
    allow_non_loopback: bool,
) -> Result<BindOutcome, ServePolicyError> {
    let bind = config.server.bind.trim();
    let bind_addr: SocketAddr =
        bind.parse().map_err(|err: std::net::AddrParseError| ServePolicyError::InvalidBind {
            bind: bind.to_string(),
            error: err.to_string(),
        })?;
    let network_exposed = !bind_addr.ip().is_loopback();
    if network_exposed {
        if config.server.localhost_only {
            return Err(ServePolicyError::LocalhostOnly {
                bind: bind.to_string(),
            });
        }
        if !allow_non_loopback {
            return Err(ServePolicyError::NonLoopbackOptInRequired {
                bind: bind.to_string(),
            });
        }
    }
    let admission = config.admission_config();
    Ok(BindOutcome {
        bind_addr,
        network_exposed,
        audit_enabled: config.audit.enabled,
        rate_limit_enabled: admission.rate_limit_enabled(),
        concurrency_enabled: admission.concurrency_enabled(),
        registry_configured: config.registry.base_url.is_some(),
    })
}

/// Returns the warnings to print before serving.
#[must_use]
pub fn startup_warnings(outcome: &BindOutcome) -> Vec<String> {
    let mut warnings = Vec::new();
    if !outcome.registry_configured {
        warnings.push(
            "warning: no tool registry configured; tool calls will fail as tool results"
                .to_string(),
        );
    }
    if !outcome.network_exposed {
        return warnings;
    }
    warnings.push(format!(
        "warning: chatgate is reachable from the network on {}; the proxy has no \
         client authentication",
        outcome.bind_addr
    ));
    warnings.push(format!(
        "warning: audit={} rate_limit={} concurrency_gate={}",
        on_off(outcome.audit_enabled),
        on_off(outcome.rate_limit_enabled),
        on_off(outcome.concurrency_enabled)
    ));
    warnings
}

/// Renders a flag for warning lines.
const fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

/// Parses a bool-ish string (true/false/1/0/yes/no/on/off).
fn parse_boolish(value: &str) -> Option<bool> {
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Parses an env value for allow-non-loopback.
fn parse_allow_non_loopback_value(value: &str) -> Result<bool, ServePolicyError> {
    parse_boolish(value).ok_or_else(|| ServePolicyError::InvalidEnv {
        value: value.to_string(),
    })
}
