// crates/chatgate-config/src/config.rs
// ============================================================================
// Module: Chatgate Configuration
// Description: Configuration loading, overrides, and validation.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: chatgate-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path
//! limits. Every field has a default, so an empty file is valid. After
//! parsing, `CHATGATE_*` environment variables override admission and tool
//! settings, and the merged result is validated. Environment access goes
//! through a lookup function so overrides can be exercised without touching
//! the process environment.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use chatgate_core::AdmissionConfig;
use chatgate_core::ApprovalPolicy;
use chatgate_core::LoopConfig;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "chatgate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "CHATGATE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum request body size accepted by validation.
pub(crate) const MAX_BODY_BYTES_LIMIT: usize = 16 * 1024 * 1024;
/// Maximum requests per rate window.
pub(crate) const MAX_RATE_LIMIT_COUNT: u32 = 1_000_000;
/// Maximum rate window length in seconds.
pub(crate) const MAX_RATE_LIMIT_WINDOW_SECONDS: u64 = 86_400;
/// Maximum concurrent requests per trace.
pub(crate) const MAX_CONCURRENT_PER_TRACE: usize = 1_024;
/// Maximum concurrency wait in seconds.
pub(crate) const MAX_CONCURRENCY_WAIT_SECONDS: f64 = 3_600.0;
/// Maximum upstream calls per request.
pub(crate) const MAX_TOOL_ITERATIONS: u32 = 64;
/// Maximum number of approval-gated tool names.
pub(crate) const MAX_APPROVAL_TOOLS: usize = 256;
/// Maximum tool name length.
pub(crate) const MAX_TOOL_NAME_LENGTH: usize = 128;
/// Maximum parked approvals.
pub(crate) const MAX_PENDING_APPROVALS: usize = 65_536;
/// Maximum HTTP timeout in milliseconds.
pub(crate) const MAX_TIMEOUT_MS: u64 = 600_000;
/// Maximum base URL length.
pub(crate) const MAX_URL_LENGTH: usize = 2_048;

/// Environment override keys.
pub mod env_keys {
    /// Server bind address.
    pub const BIND: &str = "CHATGATE_BIND";
    /// Loopback-only mode.
    pub const LOCALHOST_ONLY: &str = "CHATGATE_LOCALHOST_ONLY";
    /// Requests per rate window.
    pub const RATE_LIMIT_COUNT: &str = "CHATGATE_RATE_LIMIT_COUNT";
    /// Rate window length in seconds.
    pub const RATE_LIMIT_WINDOW_SECONDS: &str = "CHATGATE_RATE_LIMIT_WINDOW_SECONDS";
    /// Concurrent requests per trace.
    pub const MAX_CONCURRENT_PER_TRACE: &str = "CHATGATE_MAX_CONCURRENT_PER_TRACE";
    /// Concurrency wait in seconds.
    pub const CONCURRENCY_WAIT_SECONDS: &str = "CHATGATE_CONCURRENCY_WAIT_SECONDS";
    /// Automatic tool execution.
    pub const AUTO_MCP_TOOLS: &str = "CHATGATE_AUTO_MCP_TOOLS";
    /// Upstream call budget.
    pub const MAX_TOOL_ITERATIONS: &str = "CHATGATE_MAX_TOOL_ITERATIONS";
    /// Comma-separated approval-gated tool names.
    pub const APPROVAL_TOOL_NAMES: &str = "CHATGATE_APPROVAL_TOOL_NAMES";
    /// Skip approval for non-streaming requests.
    pub const AUTO_APPROVE_NONSTREAM: &str = "CHATGATE_AUTO_APPROVE_NONSTREAM";
    /// Upstream gateway base URL.
    pub const UPSTREAM_BASE_URL: &str = "CHATGATE_UPSTREAM_BASE_URL";
    /// Tool registry base URL.
    pub const REGISTRY_BASE_URL: &str = "CHATGATE_REGISTRY_BASE_URL";
}

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Chatgate proxy configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatgateConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Admission limits.
    #[serde(default)]
    pub admission: AdmissionSettings,
    /// Tool loop and approval configuration.
    #[serde(default)]
    pub tools: ToolSettings,
    /// Upstream gateway configuration.
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Tool registry configuration.
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Audit logging configuration.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl ChatgateConfig {
    /// Loads configuration from disk using the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| env::var(key).ok())
    }

    /// Loads configuration from disk, reading overrides through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading, an override, or validation fails.
    pub fn load_with_env<F>(path: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolved = resolve_path(path, &lookup)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.apply_env_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates configuration text without overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `CHATGATE_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when an override cannot be parsed.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(env_keys::BIND) {
            self.server.bind = value.trim().to_string();
        }
        override_parsed(
            &lookup,
            env_keys::LOCALHOST_ONLY,
            parse_bool,
            &mut self.server.localhost_only,
        )?;
        override_parsed(
            &lookup,
            env_keys::RATE_LIMIT_COUNT,
            parse_number,
            &mut self.admission.rate_limit_count,
        )?;
        override_parsed(
            &lookup,
            env_keys::RATE_LIMIT_WINDOW_SECONDS,
            parse_number,
            &mut self.admission.rate_limit_window_seconds,
        )?;
        override_parsed(
            &lookup,
            env_keys::MAX_CONCURRENT_PER_TRACE,
            parse_number,
            &mut self.admission.max_concurrent_per_trace,
        )?;
        override_parsed(
            &lookup,
            env_keys::CONCURRENCY_WAIT_SECONDS,
            parse_number,
            &mut self.admission.concurrency_wait_seconds,
        )?;
        override_parsed(
            &lookup,
            env_keys::AUTO_MCP_TOOLS,
            parse_bool,
            &mut self.tools.auto_mcp_tools,
        )?;
        override_parsed(
            &lookup,
            env_keys::MAX_TOOL_ITERATIONS,
            parse_number,
            &mut self.tools.max_tool_iterations,
        )?;
        if let Some(value) = lookup(env_keys::APPROVAL_TOOL_NAMES) {
            self.tools.approval_tool_names = value
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }
        override_parsed(
            &lookup,
            env_keys::AUTO_APPROVE_NONSTREAM,
            parse_bool,
            &mut self.tools.auto_approve_nonstream,
        )?;
        if let Some(value) = lookup(env_keys::UPSTREAM_BASE_URL) {
            self.upstream.base_url = value.trim().to_string();
        }
        if let Some(value) = lookup(env_keys::REGISTRY_BASE_URL) {
            let trimmed = value.trim();
            self.registry.base_url =
                if trimmed.is_empty() { None } else { Some(trimmed.to_string()) };
        }
        Ok(())
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.admission.validate()?;
        self.tools.validate()?;
        self.upstream.validate()?;
        self.registry.validate()?;
        self.audit.validate()?;
        Ok(())
    }

    /// Returns the admission limits for the runtime.
    #[must_use]
    pub fn admission_config(&self) -> AdmissionConfig {
        AdmissionConfig {
            rate_limit_count: self.admission.rate_limit_count,
            rate_limit_window: Duration::from_secs(self.admission.rate_limit_window_seconds),
            max_concurrent: self.admission.max_concurrent_per_trace,
            concurrency_wait: Duration::try_from_secs_f64(self.admission.concurrency_wait_seconds)
                .unwrap_or(Duration::ZERO),
        }
    }

    /// Returns the approval policy for the runtime.
    #[must_use]
    pub fn approval_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::new(
            self.tools.approval_tool_names.iter().cloned(),
            self.tools.auto_approve_nonstream,
        )
    }

    /// Returns the tool loop limits for the runtime.
    #[must_use]
    pub const fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            auto_tools: self.tools.auto_mcp_tools,
            max_tool_iterations: self.tools.max_tool_iterations,
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Require a loopback bind and refuse non-loopback peers.
    #[serde(default = "default_localhost_only")]
    pub localhost_only: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
            localhost_only: default_localhost_only(),
        }
    }
}

impl ServerConfig {
    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid bind address: {}", self.bind)))
    }

    /// Validates server settings.
    fn validate(&self) -> Result<(), ConfigError> {
        let addr = self.bind_addr()?;
        if self.localhost_only && !addr.ip().is_loopback() {
            return Err(ConfigError::Invalid(
                "server.localhost_only requires a loopback bind address".to_string(),
            ));
        }
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_BODY_BYTES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "server.max_body_bytes must be between 1 and {MAX_BODY_BYTES_LIMIT}"
            )));
        }
        Ok(())
    }
}

/// Per-trace admission limits. Zero disables the corresponding check.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdmissionSettings {
    /// Requests allowed per window.
    #[serde(default = "default_rate_limit_count")]
    pub rate_limit_count: u32,
    /// Window length in seconds.
    #[serde(default = "default_rate_limit_window_seconds")]
    pub rate_limit_window_seconds: u64,
    /// Concurrent requests per trace.
    #[serde(default = "default_max_concurrent_per_trace")]
    pub max_concurrent_per_trace: usize,
    /// Longest wait for a concurrency slot, in seconds.
    #[serde(default = "default_concurrency_wait_seconds")]
    pub concurrency_wait_seconds: f64,
}

impl Default for AdmissionSettings {
    fn default() -> Self {
        Self {
            rate_limit_count: default_rate_limit_count(),
            rate_limit_window_seconds: default_rate_limit_window_seconds(),
            max_concurrent_per_trace: default_max_concurrent_per_trace(),
            concurrency_wait_seconds: default_concurrency_wait_seconds(),
        }
    }
}

impl AdmissionSettings {
    /// Validates admission limits.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit_count > MAX_RATE_LIMIT_COUNT {
            return Err(ConfigError::Invalid(format!(
                "admission.rate_limit_count must be at most {MAX_RATE_LIMIT_COUNT}"
            )));
        }
        if self.rate_limit_window_seconds > MAX_RATE_LIMIT_WINDOW_SECONDS {
            return Err(ConfigError::Invalid(format!(
                "admission.rate_limit_window_seconds must be at most \
                 {MAX_RATE_LIMIT_WINDOW_SECONDS}"
            )));
        }
        if self.max_concurrent_per_trace > MAX_CONCURRENT_PER_TRACE {
            return Err(ConfigError::Invalid(format!(
                "admission.max_concurrent_per_trace must be at most {MAX_CONCURRENT_PER_TRACE}"
            )));
        }
        let wait = self.concurrency_wait_seconds;
        if !wait.is_finite() || !(0.0 ..= MAX_CONCURRENCY_WAIT_SECONDS).contains(&wait) {
            return Err(ConfigError::Invalid(format!(
                "admission.concurrency_wait_seconds must be between 0 and \
                 {MAX_CONCURRENCY_WAIT_SECONDS}"
            )));
        }
        Ok(())
    }
}

/// Tool loop and approval settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolSettings {
    /// Execute tools automatically through the registry.
    #[serde(default = "default_auto_mcp_tools")]
    pub auto_mcp_tools: bool,
    /// Upstream call budget per request.
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,
    /// Tool names that need human approval.
    #[serde(default)]
    pub approval_tool_names: Vec<String>,
    /// Skip approval for non-streaming requests.
    #[serde(default)]
    pub auto_approve_nonstream: bool,
    /// Maximum parked approvals.
    #[serde(default = "default_max_pending_approvals")]
    pub max_pending_approvals: usize,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            auto_mcp_tools: default_auto_mcp_tools(),
            max_tool_iterations: default_max_tool_iterations(),
            approval_tool_names: Vec::new(),
            auto_approve_nonstream: false,
            max_pending_approvals: default_max_pending_approvals(),
        }
    }
}

impl ToolSettings {
    /// Validates tool settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tool_iterations > MAX_TOOL_ITERATIONS {
            return Err(ConfigError::Invalid(format!(
                "tools.max_tool_iterations must be at most {MAX_TOOL_ITERATIONS}"
            )));
        }
        if self.approval_tool_names.len() > MAX_APPROVAL_TOOLS {
            return Err(ConfigError::Invalid(format!(
                "tools.approval_tool_names exceeds {MAX_APPROVAL_TOOLS} entries"
            )));
        }
        for name in &self.approval_tool_names {
            if name.trim().is_empty() || name.trim() != name {
                return Err(ConfigError::Invalid(
                    "tools.approval_tool_names entries must be non-empty and trimmed".to_string(),
                ));
            }
            if name.len() > MAX_TOOL_NAME_LENGTH {
                return Err(ConfigError::Invalid(format!(
                    "tools.approval_tool_names entry exceeds {MAX_TOOL_NAME_LENGTH} bytes"
                )));
            }
        }
        if self.max_pending_approvals == 0 || self.max_pending_approvals > MAX_PENDING_APPROVALS {
            return Err(ConfigError::Invalid(format!(
                "tools.max_pending_approvals must be between 1 and {MAX_PENDING_APPROVALS}"
            )));
        }
        Ok(())
    }
}

/// Upstream chat gateway configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Gateway base URL.
    #[serde(default = "default_upstream_base_url")]
    pub base_url: String,
    /// Chat-completions path.
    #[serde(default = "default_chat_path")]
    pub chat_path: String,
    /// Environment variable holding the gateway bearer token.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Request timeout in milliseconds.
    #[serde(default = "default_upstream_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_base_url(),
            chat_path: default_chat_path(),
            api_key_env: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_upstream_timeout_ms(),
        }
    }
}

impl UpstreamConfig {
    /// Validates upstream settings.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_base_url("upstream.base_url", &self.base_url)?;
        validate_request_path("upstream.chat_path", &self.chat_path)?;
        if let Some(name) = &self.api_key_env
            && name.trim().is_empty()
        {
            return Err(ConfigError::Invalid(
                "upstream.api_key_env must be non-empty".to_string(),
            ));
        }
        validate_timeout("upstream.connect_timeout_ms", self.connect_timeout_ms)?;
        validate_timeout("upstream.request_timeout_ms", self.request_timeout_ms)
    }
}

/// Tool registry configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Registry base URL; tools are unavailable when unset.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Tool invocation path.
    #[serde(default = "default_registry_call_path")]
    pub call_path: String,
    /// Tool listing path.
    #[serde(default = "default_registry_list_path")]
    pub list_path: String,
    /// Connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Request timeout in milliseconds.
    #[serde(default = "default_registry_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            call_path: default_registry_call_path(),
            list_path: default_registry_list_path(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_registry_timeout_ms(),
        }
    }
}

impl RegistryConfig {
    /// Validates registry settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(base_url) = &self.base_url {
            validate_base_url("registry.base_url", base_url)?;
        }
        validate_request_path("registry.call_path", &self.call_path)?;
        validate_request_path("registry.list_path", &self.list_path)?;
        validate_timeout("registry.connect_timeout_ms", self.connect_timeout_ms)?;
        validate_timeout("registry.request_timeout_ms", self.request_timeout_ms)
    }
}

/// Audit logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Whether audit records are written.
    #[serde(default = "default_audit_enabled")]
    pub enabled: bool,
    /// Append-only JSON-lines file; stderr when unset.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: default_audit_enabled(),
            path: None,
        }
    }
}

impl AuditConfig {
    /// Validates audit settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("audit.path", path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the caller or environment defaults.
fn resolve_path<F>(path: Option<&Path>, lookup: &F) -> Result<PathBuf, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Some(env_path) = lookup(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates an HTTP base URL.
fn validate_base_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConfigError::Invalid(format!("{field} must include http:// or https://")));
    }
    if trimmed.len() > MAX_URL_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    Ok(())
}

/// Validates an absolute request path.
fn validate_request_path(field: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with('/') || value.len() > MAX_URL_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} must be an absolute path")));
    }
    Ok(())
}

/// Validates an HTTP timeout.
fn validate_timeout(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 || value > MAX_TIMEOUT_MS {
        return Err(ConfigError::Invalid(format!(
            "{field} must be between 1 and {MAX_TIMEOUT_MS}"
        )));
    }
    Ok(())
}

/// Replaces `target` with the parsed override for `key`, when present.
fn override_parsed<F, T>(
    lookup: &F,
    key: &str,
    parse: fn(&str) -> Option<T>,
    target: &mut T,
) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        *target = parse(raw.trim())
            .ok_or_else(|| ConfigError::Invalid(format!("{key} has invalid value: {raw}")))?;
    }
    Ok(())
}

/// Parses a boolean override.
fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parses a numeric override.
fn parse_number<T: std::str::FromStr>(value: &str) -> Option<T> {
    value.parse().ok()
}

/// Default bind address.
fn default_bind() -> String {
    "127.0.0.1:8088".to_string()
}

/// Default maximum request body size in bytes.
const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Default loopback-only mode.
const fn default_localhost_only() -> bool {
    true
}

/// Default requests per window.
const fn default_rate_limit_count() -> u32 {
    60
}

/// Default window length in seconds.
const fn default_rate_limit_window_seconds() -> u64 {
    60
}

/// Default concurrent requests per trace.
const fn default_max_concurrent_per_trace() -> usize {
    2
}

/// Default concurrency wait in seconds.
const fn default_concurrency_wait_seconds() -> f64 {
    30.0
}

/// Default automatic tool execution.
const fn default_auto_mcp_tools() -> bool {
    true
}

/// Default upstream call budget.
const fn default_max_tool_iterations() -> u32 {
    8
}

/// Default parked approval capacity.
const fn default_max_pending_approvals() -> usize {
    1_024
}

/// Default upstream base URL.
fn default_upstream_base_url() -> String {
    "http://127.0.0.1:4000".to_string()
}

/// Default chat-completions path.
fn default_chat_path() -> String {
    "/v1/chat/completions".to_string()
}

/// Default registry invocation path.
fn default_registry_call_path() -> String {
    "/tools/call".to_string()
}

/// Default registry listing path.
fn default_registry_list_path() -> String {
    "/tools/list".to_string()
}

/// Default connect timeout in milliseconds.
const fn default_connect_timeout_ms() -> u64 {
    2_000
}

/// Default upstream request timeout in milliseconds.
const fn default_upstream_timeout_ms() -> u64 {
    120_000
}

/// Default registry request timeout in milliseconds.
const fn default_registry_timeout_ms() -> u64 {
    30_000
}

/// Default audit enablement.
const fn default_audit_enabled() -> bool {
    true
}
