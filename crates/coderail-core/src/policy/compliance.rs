//! Data-protection compliance heuristics
//!
//! Phrase-based flags for retention-policy violations, audit bypass,
//! privacy-weakening language, and PII processing that lacks a co-occurring
//! consent phrase. Heuristics, same caveat as the security scan.

use crate::types::{Severity, Violation, ViolationKind};

const RETENTION_PHRASES: &[&str] = &[
    "keep forever",
    "never delete",
    "retain indefinitely",
    "store permanently",
    "bypass retention",
    "ignore retention",
];

const AUDIT_BYPASS_PHRASES: &[&str] = &[
    "skip audit",
    "disable audit",
    "without audit",
    "no audit trail",
    "disable logging",
    "without logging",
    "off the record",
];

const PRIVACY_WEAKENING_PHRASES: &[&str] = &[
    "plaintext",
    "plain text password",
    "unencrypted",
    "disable encryption",
    "without encryption",
    "publicly accessible",
    "public bucket",
    "expose publicly",
];

const PII_PHRASES: &[&str] = &[
    "ssn",
    "social security",
    "credit card",
    "card number",
    "date of birth",
    "passport number",
    "home address",
    "medical record",
];

const CONSENT_PHRASES: &[&str] = &[
    "consent",
    "consented",
    "authorized",
    "authorised",
    "with permission",
    "opt-in",
    "opted in",
    "gdpr-compliant",
];

fn contains_any(haystack: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| haystack.contains(p))
}

/// Scan input text for compliance-policy breaches
pub fn scan(text: &str) -> Vec<Violation> {
    let lower = text.to_lowercase();
    let mut violations = Vec::new();

    if contains_any(&lower, RETENTION_PHRASES) {
        violations.push(Violation::new(
            ViolationKind::RetentionViolation,
            Severity::High,
            "request conflicts with the data-retention policy",
        ));
    }
    if contains_any(&lower, AUDIT_BYPASS_PHRASES) {
        violations.push(Violation::new(
            ViolationKind::AuditBypass,
            Severity::Critical,
            "request attempts to bypass the audit trail",
        ));
    }
    if contains_any(&lower, PRIVACY_WEAKENING_PHRASES) {
        violations.push(Violation::new(
            ViolationKind::PrivacyWeakening,
            Severity::High,
            "request weakens encryption or exposure guarantees",
        ));
    }
    if contains_any(&lower, PII_PHRASES) && !contains_any(&lower, CONSENT_PHRASES) {
        violations.push(Violation::new(
            ViolationKind::MissingConsent,
            Severity::High,
            "request processes PII without a co-occurring consent or authorization phrase",
        ));
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_phrase() {
        let violations = scan("Generate a job that will keep forever all user records");
        assert!(violations
            .iter()
            .any(|v| v.kind == ViolationKind::RetentionViolation));
    }

    #[test]
    fn test_audit_bypass_is_critical() {
        let violations = scan("run this but skip audit logging please");
        let v = violations
            .iter()
            .find(|v| v.kind == ViolationKind::AuditBypass)
            .unwrap();
        assert_eq!(v.severity, Severity::Critical);
    }

    #[test]
    fn test_pii_without_consent() {
        let violations = scan("export every customer's credit card number to a csv");
        assert!(violations
            .iter()
            .any(|v| v.kind == ViolationKind::MissingConsent));
    }

    #[test]
    fn test_pii_with_consent_passes() {
        let violations = scan("process the credit card data we have explicit consent for");
        assert!(violations.is_empty());
    }

    #[test]
    fn test_clean_request() {
        let violations = scan("create a branch and add a login feature");
        assert!(violations.is_empty());
    }
}
