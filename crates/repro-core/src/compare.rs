//! Structural comparison of expected vs. actual artifacts.
//!
//! The comparator walks the expected value tree and records a mismatch at
//! every point where the actual value diverges:
//! - objects: every expected key must exist in actual; extra keys are ignored
//! - arrays: lengths must match; elements compared positionally
//! - numbers: combined relative/absolute closeness with a single tolerance
//! - strings, bools, null: exact equality
//! - any type disagreement is a mismatch and stops descent at that node

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ArtifactExpectation, ArtifactKind, ArtifactResult};
use crate::workspace::Workspace;

/// A single divergence between expected and actual values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    /// Dotted/bracketed path, e.g. `regions.north.mean_yield[0]`. Empty at the root.
    pub path: String,

    pub kind: MismatchKind,
}

/// What went wrong at a [`Mismatch`] path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MismatchKind {
    MissingKey,
    TypeMismatch { expected: String, actual: Value },
    LengthMismatch { expected: usize, actual: usize },
    NotNumeric { actual: Value },
    OutOfTolerance { expected: f64, actual: f64, tolerance: f64 },
    ValueMismatch { expected: Value, actual: Value },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() {
            "<root>"
        } else {
            self.path.as_str()
        };
        match &self.kind {
            MismatchKind::MissingKey => write!(f, "{path} missing from output"),
            MismatchKind::TypeMismatch { expected, actual } => {
                write!(f, "{path} expected {expected}, got {}", type_name(actual))
            }
            MismatchKind::LengthMismatch { expected, actual } => {
                write!(f, "{path} length mismatch ({expected} != {actual})")
            }
            MismatchKind::NotNumeric { actual } => {
                write!(f, "{path} expected numeric value, got {actual}")
            }
            MismatchKind::OutOfTolerance {
                expected,
                actual,
                tolerance,
            } => write!(f, "{path} expected {expected} ±{tolerance}, got {actual}"),
            MismatchKind::ValueMismatch { expected, actual } => {
                write!(f, "{path} expected {expected}, got {actual}")
            }
        }
    }
}

/// Result of comparing two value trees.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Comparison {
    pub mismatches: Vec<Mismatch>,
}

impl Comparison {
    pub fn success(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// `"; "`-joined mismatch list, or `"Match"`.
    pub fn details(&self) -> String {
        if self.mismatches.is_empty() {
            return "Match".to_string();
        }
        self.mismatches
            .iter()
            .map(Mismatch::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Compare `actual` against `expected` with a combined numeric tolerance.
pub fn compare_values(expected: &Value, actual: &Value, tolerance: f64) -> Comparison {
    let mut mismatches = Vec::new();
    walk(expected, actual, tolerance, String::new(), &mut mismatches);
    Comparison { mismatches }
}

/// `|a - b| <= max(tol * max(|a|, |b|), tol)`.
pub fn is_close(expected: f64, actual: f64, tolerance: f64) -> bool {
    if expected == actual {
        return true;
    }
    if !expected.is_finite() || !actual.is_finite() {
        return false;
    }
    let diff = (expected - actual).abs();
    let rel_bound = tolerance * expected.abs().max(actual.abs());
    diff <= rel_bound.max(tolerance)
}

fn walk(expected: &Value, actual: &Value, tol: f64, path: String, out: &mut Vec<Mismatch>) {
    match expected {
        Value::Object(exp_map) => {
            let Some(act_map) = actual.as_object() else {
                out.push(type_mismatch(path, "object", actual));
                return;
            };
            for (key, exp_val) in exp_map {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                match act_map.get(key) {
                    Some(act_val) => walk(exp_val, act_val, tol, child, out),
                    None => out.push(Mismatch {
                        path: child,
                        kind: MismatchKind::MissingKey,
                    }),
                }
            }
        }
        Value::Array(exp_items) => {
            let Some(act_items) = actual.as_array() else {
                out.push(type_mismatch(path, "array", actual));
                return;
            };
            if exp_items.len() != act_items.len() {
                out.push(Mismatch {
                    path: path.clone(),
                    kind: MismatchKind::LengthMismatch {
                        expected: exp_items.len(),
                        actual: act_items.len(),
                    },
                });
            }
            for (idx, (exp_item, act_item)) in exp_items.iter().zip(act_items).enumerate() {
                walk(exp_item, act_item, tol, format!("{path}[{idx}]"), out);
            }
        }
        Value::Number(exp_num) => {
            let (Some(exp), Some(act)) = (exp_num.as_f64(), actual.as_f64()) else {
                out.push(Mismatch {
                    path,
                    kind: MismatchKind::NotNumeric {
                        actual: actual.clone(),
                    },
                });
                return;
            };
            if !is_close(exp, act, tol) {
                out.push(Mismatch {
                    path,
                    kind: MismatchKind::OutOfTolerance {
                        expected: exp,
                        actual: act,
                        tolerance: tol,
                    },
                });
            }
        }
        Value::String(_) | Value::Bool(_) | Value::Null => {
            if std::mem::discriminant(expected) != std::mem::discriminant(actual) {
                out.push(type_mismatch(path, type_name(expected), actual));
            } else if expected != actual {
                out.push(Mismatch {
                    path,
                    kind: MismatchKind::ValueMismatch {
                        expected: expected.clone(),
                        actual: actual.clone(),
                    },
                });
            }
        }
    }
}

fn type_mismatch(path: String, expected: &str, actual: &Value) -> Mismatch {
    Mismatch {
        path,
        kind: MismatchKind::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.clone(),
        },
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Check one expected artifact inside a workspace.
///
/// Never fails: missing, unreadable, or malformed artifacts become an
/// unsuccessful [`ArtifactResult`].
pub fn check_artifact(workspace: &Workspace, expectation: &ArtifactExpectation) -> ArtifactResult {
    let target = match workspace.resolve(&expectation.path) {
        Ok(target) => target,
        Err(e) => {
            return ArtifactResult {
                path: expectation.path.clone(),
                success: false,
                details: e.to_string(),
                actual_path: workspace.root().join(&expectation.path),
            }
        }
    };
    let (success, details) = check_file(&target, expectation);
    ArtifactResult {
        path: expectation.path.clone(),
        success,
        details,
        actual_path: target,
    }
}

fn check_file(target: &Path, expectation: &ArtifactExpectation) -> (bool, String) {
    if !target.is_file() {
        return (false, "Artifact missing".to_string());
    }
    let text = match std::fs::read_to_string(target) {
        Ok(text) => text,
        Err(e) => return (false, format!("Artifact unreadable: {e}")),
    };
    match expectation.kind {
        ArtifactKind::Json => match serde_json::from_str::<Value>(&text) {
            Ok(actual) => {
                let cmp = compare_values(
                    &expectation.expected,
                    &actual,
                    expectation.effective_tolerance(),
                );
                (cmp.success(), cmp.details())
            }
            Err(e) => (false, format!("Artifact is not valid JSON: {e}")),
        },
        ArtifactKind::Text => {
            let expected = match &expectation.expected {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if text.trim() == expected.trim() {
                (true, "Exact match".to_string())
            } else {
                (false, "Content mismatch".to_string())
            }
        }
    }
}
