//! Environment override tests for chatgate-config.
// crates/chatgate-config/tests/env_overrides.rs
// ============================================================================
// Module: Environment Override Tests
// Description: Validate CHATGATE_* overrides on top of parsed config.
// Purpose: Ensure overrides apply per key and malformed values fail closed.
// ============================================================================

#![allow(clippy::use_debug, reason = "Test diagnostics print config values.")]

use chatgate_config::env_keys;

mod common;

use crate::common::TestResult;
use crate::common::assert_invalid;
use crate::common::env_lookup;
use crate::common::minimal_config;

#[test]
fn admission_keys_override_file_values() -> TestResult {
    let mut config = minimal_config()?;
    let lookup = env_lookup(&[
        (env_keys::RATE_LIMIT_COUNT, "2"),
        (env_keys::RATE_LIMIT_WINDOW_SECONDS, "5"),
        (env_keys::MAX_CONCURRENT_PER_TRACE, "1"),
        (env_keys::CONCURRENCY_WAIT_SECONDS, "0.25"),
    ]);
    config.apply_env_overrides(lookup).map_err(|err| err.to_string())?;
    config.validate().map_err(|err| err.to_string())?;
    if config.admission.rate_limit_count != 2
        || config.admission.rate_limit_window_seconds != 5
        || config.admission.max_concurrent_per_trace != 1
    {
        return Err(format!("overrides not applied: {:?}", config.admission));
    }
    if (config.admission.concurrency_wait_seconds - 0.25).abs() > f64::EPSILON {
        return Err("concurrency wait override not applied".to_string());
    }
    Ok(())
}

#[test]
fn tool_keys_override_file_values() -> TestResult {
    let mut config = minimal_config()?;
    let lookup = env_lookup(&[
        (env_keys::AUTO_MCP_TOOLS, "false"),
        (env_keys::MAX_TOOL_ITERATIONS, "3"),
        (env_keys::APPROVAL_TOOL_NAMES, "deploy, delete ,,"),
        (env_keys::AUTO_APPROVE_NONSTREAM, "yes"),
    ]);
    config.apply_env_overrides(lookup).map_err(|err| err.to_string())?;
    if config.tools.auto_mcp_tools || config.tools.max_tool_iterations != 3 {
        return Err(format!("tool overrides not applied: {:?}", config.tools));
    }
    if config.tools.approval_tool_names != vec!["deploy".to_string(), "delete".to_string()] {
        return Err(format!("unexpected names: {:?}", config.tools.approval_tool_names));
    }
    if !config.tools.auto_approve_nonstream {
        return Err("auto_approve_nonstream override not applied".to_string());
    }
    Ok(())
}

#[test]
fn absent_keys_leave_values_untouched() -> TestResult {
    let mut config = minimal_config()?;
    let before = config.admission.rate_limit_count;
    config.apply_env_overrides(env_lookup(&[])).map_err(|err| err.to_string())?;
    if config.admission.rate_limit_count != before {
        return Err("rate limit changed without override".to_string());
    }
    Ok(())
}

#[test]
fn malformed_numbers_fail_closed() -> TestResult {
    let mut config = minimal_config()?;
    let result = config.apply_env_overrides(env_lookup(&[(env_keys::RATE_LIMIT_COUNT, "many")]));
    assert_invalid(result, env_keys::RATE_LIMIT_COUNT)
}

#[test]
fn malformed_booleans_fail_closed() -> TestResult {
    let mut config = minimal_config()?;
    let result = config.apply_env_overrides(env_lookup(&[(env_keys::LOCALHOST_ONLY, "maybe")]));
    assert_invalid(result, env_keys::LOCALHOST_ONLY)
}

#[test]
fn empty_registry_url_clears_the_registry() -> TestResult {
    let mut config = minimal_config()?;
    config.registry.base_url = Some("http://127.0.0.1:9000".to_string());
    config
        .apply_env_overrides(env_lookup(&[(env_keys::REGISTRY_BASE_URL, " ")]))
        .map_err(|err| err.to_string())?;
    if config.registry.base_url.is_some() {
        return Err("blank registry override should clear the url".to_string());
    }
    Ok(())
}
