use riskscope_core::{Error, Result};
use std::path::Path;
use tracing::debug;

/// Extensions accepted for analysis uploads.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["json", "jsonl", "log", "txt"];

/// Read an agent log for analysis.
///
/// A file holding a single JSON document is pretty-printed; anything else,
/// JSON Lines included, is returned exactly as read.
pub fn load_log_file(path: &Path) -> Result<String> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(Error::Validation(format!(
            "Unsupported log file '{}': expected one of .{}",
            path.display(),
            ACCEPTED_EXTENSIONS.join(", .")
        )));
    }
    if !path.exists() {
        return Err(Error::NotFound(format!("{}", path.display())));
    }

    let content = std::fs::read_to_string(path)?;
    Ok(normalize_log_text(&content))
}

pub fn normalize_log_text(content: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(content) {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(pretty) => {
                debug!("Uploaded log is a JSON document, pretty-printing");
                pretty
            }
            Err(_) => content.to_string(),
        },
        Err(_) => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_json_document_is_pretty_printed() {
        assert_eq!(
            normalize_log_text(r#"{"steps":[1,2]}"#),
            "{\n  \"steps\": [\n    1,\n    2\n  ]\n}"
        );
    }

    #[test]
    fn test_jsonl_and_text_are_verbatim() {
        let jsonl = "{\"step\":1}\n{\"step\":2}\n";
        assert_eq!(normalize_log_text(jsonl), jsonl);
        assert_eq!(normalize_log_text("plain log\n"), "plain log\n");
    }

    #[test]
    fn test_load_checks_extension_and_existence() {
        let dir = TempDir::new().unwrap();

        let bad = dir.path().join("trace.csv");
        std::fs::write(&bad, "a,b").unwrap();
        assert!(matches!(load_log_file(&bad), Err(Error::Validation(_))));

        let missing = dir.path().join("missing.log");
        assert!(matches!(load_log_file(&missing), Err(Error::NotFound(_))));

        let good = dir.path().join("run.JSONL");
        std::fs::write(&good, "{\"step\":1}\n").unwrap();
        assert_eq!(load_log_file(&good).unwrap(), "{\"step\":1}\n");
    }
}
