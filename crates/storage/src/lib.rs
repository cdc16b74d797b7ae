pub mod export;
pub mod upload;

pub use export::{ExportRecord, ExportStore};
pub use upload::{load_log_file, normalize_log_text, ACCEPTED_EXTENSIONS};
