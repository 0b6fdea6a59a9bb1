//! Submission payloads received from the transport layer.
//!
//! Entries keep `files` and `commands` as raw JSON so that shape errors
//! surface as [`ReproError::MalformedSubmission`] during the attempt
//! instead of rejecting the whole batch at parse time.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{ReproError, Result};

/// A file the participant wants materialized in the workspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmittedFile {
    pub path: String,
    pub content: String,
}

/// One experiment's part of a submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmissionEntry {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,

    #[serde(default = "empty_list")]
    pub files: Value,

    #[serde(default = "empty_list")]
    pub commands: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

fn empty_list() -> Value {
    Value::Array(Vec::new())
}

impl SubmissionEntry {
    /// Create an empty entry for `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            variant: None,
            files: empty_list(),
            commands: empty_list(),
            notes: None,
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    /// Append a file entry. No-op if `files` is not a list.
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        if let Value::Array(files) = &mut self.files {
            files.push(serde_json::json!({
                "path": path.into(),
                "content": content.into(),
            }));
        }
        self
    }

    /// Append an argv command. No-op if `commands` is not a list.
    pub fn with_command<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Value::Array(commands) = &mut self.commands {
            let argv: Vec<Value> = argv.into_iter().map(|s| Value::String(s.into())).collect();
            commands.push(Value::Array(argv));
        }
        self
    }

    /// Variant label, or `"unspecified"`.
    pub fn variant_label(&self) -> &str {
        self.variant.as_deref().unwrap_or("unspecified")
    }

    /// Validate and extract the file list.
    pub fn files(&self) -> Result<Vec<SubmittedFile>> {
        let items = self
            .files
            .as_array()
            .ok_or_else(|| ReproError::MalformedSubmission("files must be a list".to_string()))?;
        items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                serde_json::from_value::<SubmittedFile>(item.clone()).map_err(|e| {
                    ReproError::MalformedSubmission(format!("files[{idx}] is invalid: {e}"))
                })
            })
            .collect()
    }

    /// Validate and normalize the command list into argv vectors.
    ///
    /// A bare string is split on whitespace.
    pub fn commands(&self) -> Result<Vec<Vec<String>>> {
        let items = self.commands.as_array().ok_or_else(|| {
            ReproError::MalformedSubmission("commands must be a list".to_string())
        })?;
        items
            .iter()
            .enumerate()
            .map(|(idx, item)| normalize_command(item).ok_or_else(|| {
                ReproError::MalformedSubmission(format!(
                    "commands[{idx}] must be a string or a list of strings"
                ))
            }))
            .collect()
    }
}

fn normalize_command(item: &Value) -> Option<Vec<String>> {
    match item {
        Value::String(line) => Some(line.split_whitespace().map(str::to_string).collect()),
        Value::Array(parts) => parts
            .iter()
            .map(|p| p.as_str().map(str::to_string))
            .collect(),
        _ => None,
    }
}

/// A full submission covering one or more experiments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Submission {
    #[serde(default)]
    pub experiments: Vec<SubmissionEntry>,
}

impl Submission {
    pub fn new(experiments: Vec<SubmissionEntry>) -> Self {
        Self { experiments }
    }

    /// Parse a submission document.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Entry for `id`. When an id repeats, the last entry wins.
    pub fn entry(&self, id: &str) -> Option<&SubmissionEntry> {
        self.experiments.iter().rev().find(|e| e.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_command_split_on_whitespace() {
        let entry: SubmissionEntry = serde_json::from_value(json!({
            "id": "exp",
            "commands": ["python  run.py --fast", ["echo", "two words"]],
        }))
        .unwrap();
        let commands = entry.commands().unwrap();
        assert_eq!(commands[0], vec!["python", "run.py", "--fast"]);
        assert_eq!(commands[1], vec!["echo", "two words"]);
    }

    #[test]
    fn test_missing_fields_default_to_empty_lists() {
        let entry: SubmissionEntry = serde_json::from_value(json!({"id": "exp"})).unwrap();
        assert!(entry.files().unwrap().is_empty());
        assert!(entry.commands().unwrap().is_empty());
        assert_eq!(entry.variant_label(), "unspecified");
    }

    #[test]
    fn test_non_list_files_is_malformed() {
        let entry: SubmissionEntry =
            serde_json::from_value(json!({"id": "exp", "files": {"path": "a"}})).unwrap();
        let err = entry.files().unwrap_err();
        assert!(matches!(err, ReproError::MalformedSubmission(_)));
        assert!(err.to_string().contains("files must be a list"));
    }

    #[test]
    fn test_non_list_commands_is_malformed() {
        let entry: SubmissionEntry =
            serde_json::from_value(json!({"id": "exp", "commands": "python run.py"})).unwrap();
        assert!(matches!(
            entry.commands().unwrap_err(),
            ReproError::MalformedSubmission(_)
        ));
    }

    #[test]
    fn test_command_with_non_string_argv_is_malformed() {
        let entry: SubmissionEntry =
            serde_json::from_value(json!({"id": "exp", "commands": [["echo", 3]]})).unwrap();
        let err = entry.commands().unwrap_err();
        assert!(err.to_string().contains("commands[0]"));
    }

    #[test]
    fn test_file_entry_missing_content_is_malformed() {
        let entry: SubmissionEntry =
            serde_json::from_value(json!({"id": "exp", "files": [{"path": "a.py"}]})).unwrap();
        assert!(entry.files().unwrap_err().to_string().contains("files[0]"));
    }

    #[test]
    fn test_builder_helpers() {
        let entry = SubmissionEntry::new("exp")
            .with_variant("bad")
            .with_file("run.py", "print(1)")
            .with_command(["python", "run.py"]);
        assert_eq!(entry.variant_label(), "bad");
        assert_eq!(entry.files().unwrap()[0].path, "run.py");
        assert_eq!(entry.commands().unwrap()[0], vec!["python", "run.py"]);
    }

    #[test]
    fn test_submission_entry_lookup_last_wins() {
        let submission = Submission::from_json_str(
            r#"{"experiments": [
                {"id": "a", "variant": "bad"},
                {"id": "b"},
                {"id": "a", "variant": "good"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(submission.entry("a").unwrap().variant_label(), "good");
        assert!(submission.entry("missing").is_none());
    }
}
