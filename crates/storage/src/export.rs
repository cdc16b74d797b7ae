use riskscope_core::{Error, Mode, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const HISTORY_FILE: &str = "history.jsonl";

/// One line of the export history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub session_id: String,
    pub mode: Mode,
    pub actions: usize,
    pub annotations_file: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub exported_at: String,
}

/// Writes session exports into one directory.
///
/// Files are named after the session id: `annotated_<id>.json` for the
/// actions, `agent_log_<id>.txt` or `uploaded_log_<id>.txt` for the log.
pub struct ExportStore {
    dir: PathBuf,
}

impl ExportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn annotations_path(&self, session_id: &str) -> PathBuf {
        self.dir
            .join(format!("annotated_{}.json", file_safe(session_id)))
    }

    pub fn log_path(&self, session_id: &str, mode: Mode) -> PathBuf {
        let prefix = match mode {
            Mode::Exploration => "agent_log",
            Mode::Analysis => "uploaded_log",
        };
        self.dir
            .join(format!("{}_{}.txt", prefix, file_safe(session_id)))
    }

    pub fn write_annotations(&self, session_id: &str, json: &str) -> Result<PathBuf> {
        let path = self.annotations_path(session_id);
        self.write_file(&path, json)?;
        info!(path = %path.display(), "Exported annotated actions");
        Ok(path)
    }

    pub fn write_log(&self, session_id: &str, mode: Mode, text: &str) -> Result<PathBuf> {
        let path = self.log_path(session_id, mode);
        self.write_file(&path, text)?;
        info!(path = %path.display(), "Exported log");
        Ok(path)
    }

    /// Append a record to the export history.
    pub fn record(&self, record: &ExportRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(HISTORY_FILE))?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }

    /// Export history, oldest first. Unreadable lines are skipped.
    pub fn history(&self) -> Result<Vec<ExportRecord>> {
        let path = self.dir.join(HISTORY_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ExportRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => debug!(error = %e, "Failed to parse history line, skipping"),
            }
        }
        Ok(records)
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)
            .map_err(|e| Error::Export(format!("Failed to write {}: {}", path.display(), e)))
    }
}

impl ExportRecord {
    pub fn new(session_id: &str, mode: Mode, actions: usize) -> Self {
        Self {
            session_id: session_id.to_string(),
            mode,
            actions,
            annotations_file: None,
            log_file: None,
            exported_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Session ids come from the service; keep them from escaping the directory.
fn file_safe(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "session".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_names_follow_mode() {
        let store = ExportStore::new("/tmp/exports");
        assert!(store
            .annotations_path("ab12cd34")
            .ends_with("annotated_ab12cd34.json"));
        assert!(store
            .log_path("ab12cd34", Mode::Exploration)
            .ends_with("agent_log_ab12cd34.txt"));
        assert!(store
            .log_path("ab12cd34", Mode::Analysis)
            .ends_with("uploaded_log_ab12cd34.txt"));
    }

    #[test]
    fn test_session_id_cannot_escape_dir() {
        let store = ExportStore::new("/tmp/exports");
        let path = store.annotations_path("../../etc/passwd");
        assert_eq!(path.parent(), Some(Path::new("/tmp/exports")));
        assert_eq!(file_safe(""), "session");
    }

    #[test]
    fn test_write_and_history() {
        let dir = TempDir::new().unwrap();
        let store = ExportStore::new(dir.path().join("exports"));
        assert!(store.history().unwrap().is_empty());

        let json_path = store.write_annotations("s1", "[]\n").unwrap();
        assert_eq!(std::fs::read_to_string(&json_path).unwrap(), "[]\n");
        let log_path = store.write_log("s1", Mode::Analysis, "raw log").unwrap();
        assert_eq!(std::fs::read_to_string(&log_path).unwrap(), "raw log");

        let mut record = ExportRecord::new("s1", Mode::Analysis, 0);
        record.annotations_file = Some(json_path);
        record.log_file = Some(log_path);
        store.record(&record).unwrap();
        store
            .record(&ExportRecord::new("s2", Mode::Exploration, 3))
            .unwrap();

        let history = store.history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], record);
        assert_eq!(history[1].actions, 3);
    }
}
