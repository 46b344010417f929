//! Process exit codes. These are a CI contract: scripts branch on them,
//! so the numbers are frozen.

use cloudsweep_core::finding::{Confidence, Finding};

pub const EXIT_OK: i32 = 0;
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_POLICY_VIOLATION: i32 = 2;
pub const EXIT_PERMISSION_ERROR: i32 = 3;

/// Decide the exit code from the surviving findings and the scan's
/// completeness.
///
/// Precedence: `--fail-on-findings` fails on any finding; otherwise
/// findings at or above the confidence threshold fail, where the
/// default threshold is HIGH. A scan that skipped scopes never exits 0,
/// even when the surviving findings pass the policy: partial results
/// must stay distinguishable from a clean scan in scripts.
pub fn determine_exit_code(
    findings: &[Finding],
    partial: bool,
    fail_on_findings: bool,
    fail_on_confidence: Option<Confidence>,
) -> i32 {
    let policy = policy_code(findings, fail_on_findings, fail_on_confidence);
    if policy == EXIT_OK && partial {
        return EXIT_ERROR;
    }
    policy
}

fn policy_code(
    findings: &[Finding],
    fail_on_findings: bool,
    fail_on_confidence: Option<Confidence>,
) -> i32 {
    if findings.is_empty() {
        return EXIT_OK;
    }
    if fail_on_findings {
        return EXIT_POLICY_VIOLATION;
    }
    let threshold = fail_on_confidence.unwrap_or(Confidence::High);
    if findings.iter().any(|f| f.confidence >= threshold) {
        return EXIT_POLICY_VIOLATION;
    }
    EXIT_OK
}
