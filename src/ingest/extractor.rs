use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::debug;

use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DocId;

/// Title and ordered body tokens for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub title: String,
    pub body_tokens: Vec<String>,
}

/// Seam between the engine and the external tokenizer program; tests
/// substitute a stub.
pub trait Extractor: Send + Sync {
    fn extract(&self, source_path: &Path, doc_id: DocId) -> Result<ExtractedDocument>;
}

#[derive(Debug, Deserialize)]
struct ExtractorOutput {
    #[serde(default)]
    title: String,
    #[serde(default)]
    body_tokens: Vec<String>,
}

/// Default extractor: spawns the external program as
/// `program [script] <source_path> <doc_id> <output_json>`, reads the
/// output JSON and deletes it. Non-zero exit, unreadable output, and empty
/// token lists are per-document failures.
pub struct CommandExtractor {
    program: PathBuf,
    script: Option<PathBuf>,
    temp_dir: PathBuf,
}

impl CommandExtractor {
    pub fn new(program: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        CommandExtractor {
            program: program.into(),
            script: None,
            temp_dir: temp_dir.into(),
        }
    }

    /// Runs `program script …` instead of `program …`, for interpreter
    /// based extractors.
    pub fn with_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.script = Some(script.into());
        self
    }

    /// The conventional setup: a project-local virtualenv python when one
    /// exists, the system `python3` otherwise.
    pub fn python_default(temp_dir: impl Into<PathBuf>) -> Self {
        let venv = Path::new("venv/bin/python");
        let program = if venv.exists() {
            venv.to_path_buf()
        } else {
            PathBuf::from("python3")
        };
        CommandExtractor::new(program, temp_dir)
            .with_script("scripts/tokenize_single_pdf.py")
    }
}

impl Extractor for CommandExtractor {
    fn extract(&self, source_path: &Path, doc_id: DocId) -> Result<ExtractedDocument> {
        let output_path = self.temp_dir.join(format!("temp_{}.json", doc_id));

        let mut command = Command::new(&self.program);
        if let Some(script) = &self.script {
            command.arg(script);
        }
        let status = command
            .arg(source_path)
            .arg(doc_id.to_string())
            .arg(&output_path)
            .status()
            .map_err(|err| {
                Error::new(
                    ErrorKind::Extraction,
                    format!("could not spawn extractor {}: {}", self.program.display(), err),
                )
            })?;
        if !status.success() {
            let _ = fs::remove_file(&output_path);
            return Err(Error::new(
                ErrorKind::Extraction,
                format!("extractor exited with {} for {}", status, source_path.display()),
            ));
        }

        let parsed: Result<ExtractorOutput> = (|| {
            let bytes = fs::read(&output_path)?;
            Ok(serde_json::from_slice(&bytes)?)
        })();
        let _ = fs::remove_file(&output_path);
        let output = parsed?;

        if output.body_tokens.is_empty() {
            return Err(Error::new(
                ErrorKind::Extraction,
                format!("no tokens extracted from {}", source_path.display()),
            ));
        }
        debug!(
            doc_id,
            tokens = output.body_tokens.len(),
            "document extracted"
        );
        let title = if output.title.is_empty() {
            "Untitled".to_string()
        } else {
            output.title
        };
        Ok(ExtractedDocument {
            title,
            body_tokens: output.body_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    /// A tiny shell extractor that copies a canned JSON payload into the
    /// requested output file.
    fn shell_extractor(dir: &Path, payload: &str, exit_code: i32) -> CommandExtractor {
        let script = dir.join("extract.sh");
        let mut file = fs::File::create(&script).unwrap();
        writeln!(
            file,
            "#!/bin/sh\ncat > \"$3\" <<'EOF'\n{}\nEOF\nexit {}",
            payload, exit_code
        )
        .unwrap();
        let mut perms = fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&script, perms).unwrap();
        CommandExtractor::new(script, dir)
    }

    #[test]
    fn reads_output_json_and_removes_it() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = shell_extractor(
            dir.path(),
            r#"{"title": "A Paper", "body_tokens": ["deep", "learning"]}"#,
            0,
        );
        let extracted = extractor.extract(Path::new("ignored.pdf"), 7).unwrap();
        assert_eq!(extracted.title, "A Paper");
        assert_eq!(extracted.body_tokens, vec!["deep", "learning"]);
        assert!(!dir.path().join("temp_7.json").exists());
    }

    #[test]
    fn nonzero_exit_is_an_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = shell_extractor(dir.path(), "{}", 3);
        let err = extractor.extract(Path::new("x.pdf"), 1).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Extraction);
    }

    #[test]
    fn empty_token_list_is_an_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let extractor =
            shell_extractor(dir.path(), r#"{"title": "T", "body_tokens": []}"#, 0);
        let err = extractor.extract(Path::new("x.pdf"), 2).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Extraction);
    }

    #[test]
    fn missing_title_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = shell_extractor(dir.path(), r#"{"body_tokens": ["one"]}"#, 0);
        let extracted = extractor.extract(Path::new("x.pdf"), 3).unwrap();
        assert_eq!(extracted.title, "Untitled");
    }
}
