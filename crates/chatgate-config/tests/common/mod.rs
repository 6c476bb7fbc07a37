// crates/chatgate-config/tests/common/mod.rs
// ============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config validation tests.
// Purpose: Reduce duplication across chatgate-config integration tests.
// ============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::collections::HashMap;

use chatgate_config::ChatgateConfig;
use chatgate_config::ConfigError;

/// Test result alias used by config suites.
pub type TestResult = Result<(), String>;

/// Returns a config with all defaults applied.
pub fn minimal_config() -> Result<ChatgateConfig, String> {
    ChatgateConfig::from_toml("").map_err(|err| err.to_string())
}

/// Builds an environment lookup over fixed pairs.
pub fn env_lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
    let map: HashMap<String, String> =
        pairs.iter().map(|(key, value)| ((*key).to_string(), (*value).to_string())).collect();
    move |key| map.get(key).cloned()
}

/// Asserts that validation failed with a message containing `needle`.
pub fn assert_invalid<T>(result: Result<T, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config".to_string()),
    }
}
