//! Code review of submitted sources.
//!
//! Reviews are advisory: they are attached to the evaluation, fed to the
//! scorer and quoted in correction briefs, but never affect the verdict.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const MISSING_FILE_SUMMARY: &str = "File missing; unable to review";

/// Opaque per-file review output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewNote {
    /// Path relative to the workspace root.
    pub path: String,
    pub heuristics: Value,
    pub summary: String,
    /// Free-form feedback from an external reviewer, empty when none ran.
    #[serde(default)]
    pub feedback: String,
}

/// Produces review notes for files inside a workspace.
pub trait Reviewer: Send + Sync {
    fn review(&self, root: &Path, targets: &[String]) -> Vec<ReviewNote>;
}

/// Language-neutral text metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicReviewer;

impl Reviewer for HeuristicReviewer {
    fn review(&self, root: &Path, targets: &[String]) -> Vec<ReviewNote> {
        targets
            .iter()
            .map(|target| match std::fs::read(root.join(target)) {
                Ok(bytes) => {
                    let code = String::from_utf8_lossy(&bytes);
                    let heuristics = compute_heuristics(&code);
                    ReviewNote {
                        path: target.clone(),
                        summary: summarize(&heuristics),
                        heuristics: heuristics.to_json(),
                        feedback: String::new(),
                    }
                }
                Err(_) => ReviewNote {
                    path: target.clone(),
                    heuristics: json!({}),
                    summary: MISSING_FILE_SUMMARY.to_string(),
                    feedback: String::new(),
                },
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Heuristics {
    lines: usize,
    function_defs: usize,
    todo_count: usize,
    comment_lines: usize,
    avg_line_length: f64,
}

impl Heuristics {
    fn to_json(&self) -> Value {
        json!({
            "lines": self.lines,
            "function_defs": self.function_defs,
            "todo_count": self.todo_count,
            "comments_present": self.comment_lines > 0,
            "comment_lines": self.comment_lines,
            "avg_line_length": self.avg_line_length,
        })
    }
}

const COMMENT_PREFIXES: &[&str] = &["#", "//", "--", ";", "/*", "*"];
const FUNCTION_PREFIXES: &[&str] = &["def ", "fn ", "pub fn ", "function ", "func ", "async def "];

fn compute_heuristics(code: &str) -> Heuristics {
    let lines: Vec<&str> = code.lines().collect();
    let total_len: usize = lines.iter().map(|l| l.chars().count()).sum();
    let avg = total_len as f64 / lines.len().max(1) as f64;

    let trimmed = || lines.iter().map(|l| l.trim_start());
    Heuristics {
        lines: lines.len(),
        function_defs: trimmed()
            .filter(|l| FUNCTION_PREFIXES.iter().any(|p| l.starts_with(p)))
            .count(),
        todo_count: code.to_lowercase().matches("todo").count(),
        comment_lines: trimmed()
            .filter(|l| {
                // `#!` shebangs and `#[` attributes are not comments
                !l.starts_with("#!")
                    && !l.starts_with("#[")
                    && COMMENT_PREFIXES.iter().any(|p| l.starts_with(p))
            })
            .count(),
        avg_line_length: (avg * 100.0).round() / 100.0,
    }
}

fn summarize(h: &Heuristics) -> String {
    let mut notes = Vec::new();
    if h.lines < 10 {
        notes.push("File is very small; hard to judge structure.");
    }
    if h.todo_count > 0 {
        notes.push("Leftover TODO comments detected.");
    }
    if h.function_defs == 0 {
        notes.push("No functions detected; consider factoring logic.");
    }
    if h.comment_lines > 0 {
        notes.push("Comments present.");
    } else {
        notes.push("No comments found.");
    }
    if h.avg_line_length > 100.0 {
        notes.push("Long lines reduce readability.");
    }
    notes.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_target() {
        let dir = tempdir().unwrap();
        let notes = HeuristicReviewer.review(dir.path(), &["absent.py".to_string()]);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].path, "absent.py");
        assert_eq!(notes[0].summary, MISSING_FILE_SUMMARY);
        assert_eq!(notes[0].heuristics, json!({}));
    }

    #[test]
    fn test_heuristics_for_small_script() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("run.py"),
            "#!/usr/bin/env python\n# fit the model\ndef main():\n    pass  # TODO tune\n",
        )
        .unwrap();
        let notes = HeuristicReviewer.review(dir.path(), &["run.py".to_string()]);
        let h = &notes[0].heuristics;
        assert_eq!(h["lines"], 4);
        assert_eq!(h["function_defs"], 1);
        assert_eq!(h["todo_count"], 1);
        assert_eq!(h["comment_lines"], 1);
        assert_eq!(h["comments_present"], true);
        assert!(notes[0].summary.contains("very small"));
        assert!(notes[0].summary.contains("TODO"));
        assert!(!notes[0].summary.contains("No functions"));
    }

    #[test]
    fn test_empty_file_has_zero_average() {
        let h = compute_heuristics("");
        assert_eq!(h.lines, 0);
        assert_eq!(h.avg_line_length, 0.0);
        assert!(summarize(&h).contains("No comments found."));
    }
}
