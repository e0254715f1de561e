//! Security checks over raw input and generated output
//!
//! Detection is pattern-based, not semantic. False positives and negatives
//! are expected and acceptable: the goal is defense-in-depth before and
//! after the model call, not proof.

use lazy_static::lazy_static;
use regex::Regex;

use crate::types::{Severity, Violation, ViolationKind};

lazy_static! {
    // --- Input patterns ---
    static ref CREDENTIAL: Regex = Regex::new(
        r#"(?i)\b(password|passwd|secret|api[_-]?key|access[_-]?key|auth[_-]?token|private[_-]?key)\b\s*[:=]\s*['"]?[^\s'"]{4,}"#
    ).expect("credential regex");
    static ref EMAIL: Regex =
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("email regex");
    static ref SSN: Regex = Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").expect("ssn regex");
    static ref CARD: Regex =
        Regex::new(r"\b\d{4}[ -]?\d{4}[ -]?\d{4}[ -]?\d{1,4}\b").expect("card regex");
    static ref IBAN: Regex =
        Regex::new(r"\b[A-Z]{2}\d{2}[A-Z0-9]{11,30}\b").expect("iban regex");
    static ref PHONE: Regex =
        Regex::new(r"\+\d{1,3}[\s.-]?\d{2,4}[\s.-]?\d{3,4}[\s.-]?\d{2,4}").expect("phone regex");
    static ref SCRIPT_TAG: Regex = Regex::new(r"(?i)<\s*script\b").expect("script regex");
    static ref EVAL_CALL: Regex = Regex::new(r"\beval\s*\(").expect("eval regex");
    static ref JS_SCHEME: Regex = Regex::new(r"(?i)javascript\s*:").expect("js scheme regex");
    static ref DOM_SINK: Regex = Regex::new(
        r"(?i)(\.innerHTML\s*=|\.outerHTML\s*=|document\.write\s*\()"
    ).expect("dom sink regex");

    // --- Generated-output patterns ---
    static ref UNSAFE_PROCESS: Regex = Regex::new(
        r"(?i)(child_process|execSync\s*\(|spawnSync\s*\(|std::process::Command|subprocess\.(run|call|Popen)|rm\s+-rf)"
    ).expect("unsafe process regex");
    static ref UNSAFE_FS: Regex = Regex::new(
        r"(?i)(fs\.(unlink|rm|rmdir)Sync?\s*\(|shutil\.rmtree|os\.remove\s*\()"
    ).expect("unsafe fs regex");
    static ref INJECTION_SINK: Regex =
        Regex::new(r"(?i)(new\s+Function\s*\(|setTimeout\s*\(\s*['\x22])").expect("sink regex");
    static ref EXFILTRATION: Regex = Regex::new(
        r"(?i)(\balert\s*\(|\bconfirm\s*\(|\bprompt\s*\(|window\.location\s*=|location\.href\s*=)"
    ).expect("exfiltration regex");
}

/// Scan raw user input before any generation happens
pub fn scan_input(text: &str) -> Vec<Violation> {
    let mut violations = Vec::new();

    if CREDENTIAL.is_match(text) {
        violations.push(Violation::new(
            ViolationKind::CredentialExposure,
            Severity::Critical,
            "input contains a credential-like key/value pair",
        ));
    }
    if SSN.is_match(text) {
        violations.push(Violation::new(
            ViolationKind::PiiDetected,
            Severity::High,
            "input contains an SSN-shaped token",
        ));
    }
    if CARD.is_match(text) {
        violations.push(Violation::new(
            ViolationKind::PiiDetected,
            Severity::High,
            "input contains a card-number-shaped token",
        ));
    }
    if IBAN.is_match(text) {
        violations.push(Violation::new(
            ViolationKind::PiiDetected,
            Severity::High,
            "input contains an IBAN-shaped token",
        ));
    }
    if EMAIL.is_match(text) {
        violations.push(Violation::new(
            ViolationKind::PiiDetected,
            Severity::Medium,
            "input contains an email address",
        ));
    }
    if PHONE.is_match(text) {
        violations.push(Violation::new(
            ViolationKind::PiiDetected,
            Severity::Medium,
            "input contains a phone-shaped token",
        ));
    }
    if SCRIPT_TAG.is_match(text) || EVAL_CALL.is_match(text) || JS_SCHEME.is_match(text) {
        violations.push(Violation::new(
            ViolationKind::InjectionPattern,
            Severity::High,
            "input contains an injection marker",
        ));
    }
    if DOM_SINK.is_match(text) {
        violations.push(Violation::new(
            ViolationKind::InjectionPattern,
            Severity::High,
            "input contains a DOM-sink assignment pattern",
        ));
    }

    violations
}

/// Scan generated output before it is written anywhere
pub fn scan_output(text: &str) -> Vec<Violation> {
    let mut violations = Vec::new();

    if CREDENTIAL.is_match(text) {
        violations.push(Violation::new(
            ViolationKind::CredentialExposure,
            Severity::Critical,
            "generated output hard-codes a credential",
        ));
    }
    if UNSAFE_PROCESS.is_match(text) || UNSAFE_FS.is_match(text) {
        violations.push(Violation::new(
            ViolationKind::UnsafeGeneratedCode,
            Severity::High,
            "generated output performs unsafe process or filesystem operations",
        ));
    }
    if EVAL_CALL.is_match(text) || DOM_SINK.is_match(text) || INJECTION_SINK.is_match(text) {
        violations.push(Violation::new(
            ViolationKind::InjectionPattern,
            Severity::High,
            "generated output contains an injection sink",
        ));
    }
    if EXFILTRATION.is_match(text) {
        violations.push(Violation::new(
            ViolationKind::DataExfiltration,
            Severity::High,
            "generated output contains a data-exfiltration call",
        ));
    }

    violations
}
