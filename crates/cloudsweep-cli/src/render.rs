//! Report renderers. All three formats consume the final [`ScanReport`]
//! only; nothing here re-inspects descriptors or re-runs policy.

use anyhow::Result;
use colored::Colorize;

use cloudsweep_core::finding::Confidence;
use cloudsweep_core::report::ScanReport;

/// Column order is frozen; downstream spreadsheets key on it.
const CSV_FIELDS: [&str; 11] = [
    "provider",
    "rule_id",
    "resource_type",
    "resource_id",
    "scope",
    "title",
    "summary",
    "reason",
    "risk",
    "confidence",
    "detected_at",
];

pub fn render_json(report: &ScanReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn render_csv(report: &ScanReport) -> String {
    let mut out = String::new();
    out.push_str(&CSV_FIELDS.join(","));
    out.push('\n');
    for finding in &report.findings {
        let row = [
            finding.provider.as_str().to_string(),
            finding.rule_id.clone(),
            finding.resource_type.as_str().to_string(),
            finding.resource_id.clone(),
            finding.scope.clone().unwrap_or_default(),
            finding.title.clone(),
            finding.summary.clone(),
            finding.reason.clone(),
            finding.risk.as_str().to_string(),
            finding.confidence.as_str().to_string(),
            finding.detected_at.to_rfc3339(),
        ];
        let escaped: Vec<String> = row.iter().map(|field| csv_escape(field)).collect();
        out.push_str(&escaped.join(","));
        out.push('\n');
    }
    out
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn render_human(report: &ScanReport) -> String {
    let mut out = String::new();

    if report.findings.is_empty() {
        if report.is_partial() {
            out.push_str("No hygiene issues detected in the scopes that completed.\n");
        } else {
            out.push_str("No hygiene issues detected.\n");
        }
    } else {
        out.push_str(&format!(
            "Found {} hygiene issue(s):\n\n",
            report.findings.len()
        ));
        for (i, finding) in report.findings.iter().enumerate() {
            out.push_str(&format!(
                "{}. [{}] {}\n",
                i + 1,
                finding.provider.as_str().to_uppercase(),
                finding.title
            ));
            out.push_str(&format!(
                "   Confidence : {}\n",
                paint_confidence(finding.confidence)
            ));
            out.push_str(&format!("   Risk       : {}\n", finding.risk.as_str()));
            out.push_str(&format!(
                "   Resource   : {} / {}\n",
                finding.resource_type.as_str(),
                finding.resource_id
            ));
            if let Some(scope) = &finding.scope {
                out.push_str(&format!("   Scope      : {}\n", scope));
            }
            out.push_str(&format!("   Rule       : {}\n", finding.rule_id));
            out.push_str(&format!("   Reason     : {}\n", finding.reason));
            if !finding.details.is_empty() {
                out.push_str("   Details:\n");
                for (key, value) in &finding.details {
                    out.push_str(&format!("     - {}: {}\n", key, value));
                }
            }
            out.push('\n');
        }
    }

    out.push_str(&format!(
        "Scopes: {} attempted, {} succeeded\n",
        report.summary.scopes_attempted, report.summary.scopes_succeeded
    ));
    if report.summary.ignored_by_tag_policy > 0 {
        out.push_str(&format!(
            "Ignored by tag policy: {}\n",
            report.summary.ignored_by_tag_policy
        ));
    }
    if !report.scopes_failed.is_empty() {
        out.push_str("Failed scopes:\n");
        for (scope, reason) in &report.scopes_failed {
            out.push_str(&format!("  - {}: {}\n", scope, reason));
        }
        out.push_str("Results are PARTIAL: the failed scopes were not scanned.\n");
    }
    if let Some(highest) = report.summary.highest_confidence {
        out.push_str(&format!(
            "Highest confidence: {}\n",
            paint_confidence(highest)
        ));
    }
    out
}

fn paint_confidence(confidence: Confidence) -> String {
    match confidence {
        Confidence::High => confidence.as_str().red().bold().to_string(),
        Confidence::Medium => confidence.as_str().yellow().to_string(),
        Confidence::Low => confidence.as_str().normal().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::Utc;
    use cloudsweep_core::descriptor::{Provider, ResourceType};
    use cloudsweep_core::finding::{Evidence, Finding, Risk};
    use cloudsweep_core::report;

    fn finding(summary: &str) -> Finding {
        Finding {
            provider: Provider::Aws,
            rule_id: "aws.ebs.volume.unattached".into(),
            resource_type: ResourceType::Volume,
            resource_id: "vol-1".into(),
            scope: Some("us-east-1".into()),
            title: "Unattached EBS volume".into(),
            summary: summary.into(),
            reason: "detached for 30 days".into(),
            risk: Risk::Low,
            confidence: Confidence::High,
            detected_at: Utc::now(),
            tags: BTreeMap::new(),
            details: BTreeMap::new(),
            evidence: Evidence::default(),
        }
    }

    fn report_with(findings: Vec<Finding>, failed: BTreeMap<String, String>) -> ScanReport {
        report::build(Provider::Aws, findings, 2, failed, 0, Utc::now())
    }

    #[test]
    fn csv_quotes_fields_with_commas() {
        let report = report_with(vec![finding("one, two")], BTreeMap::new());
        let csv = render_csv(&report);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some(CSV_FIELDS.join(",").as_str()));
        assert!(csv.contains("\"one, two\""));
    }

    #[test]
    fn csv_doubles_embedded_quotes() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn clean_scan_and_partial_scan_render_differently() {
        let clean = render_human(&report_with(Vec::new(), BTreeMap::new()));
        assert!(clean.contains("No hygiene issues detected."));
        assert!(!clean.contains("PARTIAL"));

        let partial = render_human(&report_with(
            Vec::new(),
            BTreeMap::from([("eu-west-1".to_string(), "auth: expired".to_string())]),
        ));
        assert!(partial.contains("scopes that completed"));
        assert!(partial.contains("eu-west-1: auth: expired"));
        assert!(partial.contains("PARTIAL"));
    }

    #[test]
    fn human_output_lists_findings_with_scope() {
        let text = render_human(&report_with(vec![finding("s")], BTreeMap::new()));
        assert!(text.contains("1. [AWS] Unattached EBS volume"));
        assert!(text.contains("Scope      : us-east-1"));
        assert!(text.contains("aws.ebs.volume.unattached"));
    }

    #[test]
    fn json_round_trips_the_report() {
        let report = report_with(vec![finding("s")], BTreeMap::new());
        let json = render_json(&report).expect("serializes");
        let parsed: ScanReport = serde_json::from_str(&json).expect("parses back");
        assert_eq!(parsed.findings.len(), 1);
        assert_eq!(parsed.schema_version, report.schema_version);
    }
}
