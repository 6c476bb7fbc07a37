// crates/chatgate-core/tests/approval.rs
// ============================================================================
// Module: Approval Gate Tests
// Description: Approval predicate matrix and property checks.
// Purpose: Pin when listed tools halt the loop.
// Dependencies: chatgate-core, proptest
// ============================================================================

//! Approval predicate tests.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions."
)]

use std::collections::BTreeSet;

use chatgate_core::ApprovalPolicy;
use chatgate_core::ResponseMode;
use chatgate_core::requires_approval;
use proptest::prelude::*;

fn listed() -> BTreeSet<String> {
    ["deploy", "delete_repo"].iter().map(ToString::to_string).collect()
}

#[test]
fn listed_tool_needs_approval_when_streaming() {
    assert!(requires_approval("deploy", true, false, &listed()));
    assert!(requires_approval("deploy", true, true, &listed()));
}

#[test]
fn auto_approve_applies_only_to_nonstream() {
    assert!(!requires_approval("deploy", false, true, &listed()));
    assert!(requires_approval("deploy", false, false, &listed()));
}

#[test]
fn unlisted_tool_never_needs_approval() {
    for (streaming, auto) in [(true, true), (true, false), (false, true), (false, false)] {
        assert!(!requires_approval("search", streaming, auto, &listed()));
    }
}

#[test]
fn policy_maps_response_mode() {
    let policy = ApprovalPolicy::new(["deploy"], true);
    assert!(policy.requires_approval("deploy", ResponseMode::Streaming));
    assert!(!policy.requires_approval("deploy", ResponseMode::Aggregated));
}

proptest! {
    #[test]
    fn predicate_matches_its_definition(
        names in proptest::collection::btree_set("[a-c]{1,2}", 0 .. 5),
        tool in "[a-c]{1,2}",
        streaming in any::<bool>(),
        auto in any::<bool>(),
    ) {
        let expected = names.contains(&tool) && (streaming || !auto);
        prop_assert_eq!(requires_approval(&tool, streaming, auto, &names), expected);
    }
}
