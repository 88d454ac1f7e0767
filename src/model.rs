//! Shared request/result data model.

use serde::{Deserialize, Serialize};

pub const MAX_INPUT: usize = 5;
pub const MAX_OUTPUT: usize = 5;
/// Implementer-set ceiling on source size.
pub const MAX_SOURCE_BYTES: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("source code exceeds the maximum size of {0} bytes")]
    SourceTooLarge(usize),
    #[error("too many declared input files: {0} exceeds the maximum of {1}")]
    TooManyInputs(usize, usize),
    #[error("too many declared output files: {0} exceeds the maximum of {1}")]
    TooManyOutputs(usize, usize),
    #[error("uploaded file count ({0}) does not match declared input count ({1})")]
    InputCountMismatch(usize, usize),
    #[error("declared filename must be a basename: {0}")]
    NotBasename(String),
    #[error("duplicate declared filename: {0}")]
    DuplicateBasename(String),
    #[error("uploaded filenames do not match declared input filenames")]
    UploadedMismatch,
}

/// One code-only submission, with no input or output files.
#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub programming_language: String,
    pub source_code: String,
}

impl CreateTaskRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.source_code.len() > MAX_SOURCE_BYTES {
            return Err(ValidationError::SourceTooLarge(MAX_SOURCE_BYTES));
        }
        Ok(())
    }
}

/// One code-with-files submission, prior to file persistence.
#[derive(Debug)]
pub struct FileTaskRequest {
    pub programming_language: String,
    pub source_code: String,
    pub declared_inputs: Vec<String>,
    pub declared_outputs: Vec<String>,
    pub uploaded_names: Vec<String>,
}

impl FileTaskRequest {
    /// Enforces every construction invariant: counts, basenames, no duplicates, and
    /// uploaded/declared consistency by basename set equality.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.source_code.len() > MAX_SOURCE_BYTES {
            return Err(ValidationError::SourceTooLarge(MAX_SOURCE_BYTES));
        }
        if self.declared_inputs.len() > MAX_INPUT {
            return Err(ValidationError::TooManyInputs(
                self.declared_inputs.len(),
                MAX_INPUT,
            ));
        }
        if self.uploaded_names.len() > MAX_INPUT {
            return Err(ValidationError::TooManyInputs(
                self.uploaded_names.len(),
                MAX_INPUT,
            ));
        }
        if self.declared_outputs.len() > MAX_OUTPUT {
            return Err(ValidationError::TooManyOutputs(
                self.declared_outputs.len(),
                MAX_OUTPUT,
            ));
        }
        if self.uploaded_names.len() != self.declared_inputs.len() {
            return Err(ValidationError::InputCountMismatch(
                self.uploaded_names.len(),
                self.declared_inputs.len(),
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for name in &self.declared_inputs {
            let base = basename(name).ok_or_else(|| ValidationError::NotBasename(name.clone()))?;
            if !seen.insert(base) {
                return Err(ValidationError::DuplicateBasename(name.clone()));
            }
        }

        let declared: std::collections::HashSet<_> = self
            .declared_inputs
            .iter()
            .filter_map(|n| basename(n))
            .collect();
        let uploaded: std::collections::HashSet<_> = self
            .uploaded_names
            .iter()
            .filter_map(|n| basename(n))
            .collect();
        if declared != uploaded {
            return Err(ValidationError::UploadedMismatch);
        }

        Ok(())
    }
}

fn basename(name: &str) -> Option<String> {
    let path = std::path::Path::new(name);
    if path.components().count() != 1 {
        return None;
    }
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// A single produced output file, as returned in `TaskResult::output_files`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputFileEntry {
    pub name: String,
    pub path: String,
    pub size: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(inputs: Vec<&str>, uploaded: Vec<&str>) -> FileTaskRequest {
        FileTaskRequest {
            programming_language: "python".to_string(),
            source_code: "print(1)".to_string(),
            declared_inputs: inputs.into_iter().map(String::from).collect(),
            declared_outputs: vec![],
            uploaded_names: uploaded.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn accepts_matching_inputs() {
        assert!(req(vec!["a.txt", "b.txt"], vec!["a.txt", "b.txt"])
            .validate()
            .is_ok());
    }

    #[test]
    fn rejects_count_mismatch() {
        assert!(matches!(
            req(vec!["a.txt"], vec![]).validate().unwrap_err(),
            ValidationError::InputCountMismatch(0, 1)
        ));
    }

    #[test]
    fn rejects_uploaded_name_mismatch_by_basename() {
        assert!(matches!(
            req(vec!["a.txt"], vec!["b.txt"]).validate().unwrap_err(),
            ValidationError::UploadedMismatch
        ));
    }

    #[test]
    fn rejects_non_basename_declared_input() {
        assert!(matches!(
            req(vec!["../a.txt"], vec!["../a.txt"])
                .validate()
                .unwrap_err(),
            ValidationError::NotBasename(_)
        ));
    }

    #[test]
    fn rejects_duplicate_basenames() {
        assert!(matches!(
            req(vec!["a.txt", "a.txt"], vec!["a.txt", "a.txt"])
                .validate()
                .unwrap_err(),
            ValidationError::DuplicateBasename(_)
        ));
    }

    #[test]
    fn rejects_too_many_inputs() {
        let inputs: Vec<&str> = vec!["a", "b", "c", "d", "e", "f"];
        assert!(matches!(
            req(inputs.clone(), inputs).validate().unwrap_err(),
            ValidationError::TooManyInputs(6, MAX_INPUT)
        ));
    }

    #[test]
    fn boundary_of_five_inputs_is_accepted() {
        let inputs: Vec<&str> = vec!["a", "b", "c", "d", "e"];
        assert!(req(inputs.clone(), inputs).validate().is_ok());
    }
}
