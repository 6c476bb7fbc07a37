//! Config file loading tests for chatgate-config.
// crates/chatgate-config/tests/file_loading.rs
// ============================================================================
// Module: Config File Loading Tests
// Description: Validate path resolution, size limits, and re-validation.
// Purpose: Ensure configs load from disk and fail closed on bad input.
// ============================================================================

use std::fs;

use chatgate_config::CONFIG_ENV_VAR;
use chatgate_config::ChatgateConfig;
use chatgate_config::env_keys;

mod common;

use crate::common::TestResult;
use crate::common::assert_invalid;
use crate::common::env_lookup;

#[test]
fn loads_explicit_path_and_applies_overrides() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("chatgate.toml");
    fs::write(&path, "[admission]\nrate_limit_count = 10\n").map_err(|err| err.to_string())?;
    let config = ChatgateConfig::load_with_env(
        Some(&path),
        env_lookup(&[(env_keys::RATE_LIMIT_COUNT, "2")]),
    )
    .map_err(|err| err.to_string())?;
    if config.admission.rate_limit_count != 2 {
        return Err(format!("expected override 2, got {}", config.admission.rate_limit_count));
    }
    Ok(())
}

#[test]
fn resolves_path_from_environment() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("from-env.toml");
    fs::write(&path, "[tools]\nmax_tool_iterations = 2\n").map_err(|err| err.to_string())?;
    let path_text = path.to_string_lossy().to_string();
    let config = ChatgateConfig::load_with_env(None, env_lookup(&[(CONFIG_ENV_VAR, &path_text)]))
        .map_err(|err| err.to_string())?;
    if config.tools.max_tool_iterations != 2 {
        return Err("config from env path not loaded".to_string());
    }
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("absent.toml");
    assert_invalid(ChatgateConfig::load_with_env(Some(&path), env_lookup(&[])), "config io error")
}

#[test]
fn oversized_file_is_rejected() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("huge.toml");
    let padding = format!("# {}\n", "x".repeat(2 * 1024 * 1024));
    fs::write(&path, padding).map_err(|err| err.to_string())?;
    assert_invalid(ChatgateConfig::load_with_env(Some(&path), env_lookup(&[])), "size limit")
}

#[test]
fn non_utf8_file_is_rejected() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("binary.toml");
    fs::write(&path, [0xff_u8, 0xfe, 0x00]).map_err(|err| err.to_string())?;
    assert_invalid(ChatgateConfig::load_with_env(Some(&path), env_lookup(&[])), "utf-8")
}

#[test]
fn overrides_are_revalidated() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("chatgate.toml");
    fs::write(&path, "").map_err(|err| err.to_string())?;
    let result = ChatgateConfig::load_with_env(
        Some(&path),
        env_lookup(&[(env_keys::BIND, "0.0.0.0:8088")]),
    );
    assert_invalid(result, "loopback bind")
}

#[test]
fn long_path_component_is_rejected() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("x".repeat(300));
    assert_invalid(
        ChatgateConfig::load_with_env(Some(&path), env_lookup(&[])),
        "path component too long",
    )
}
