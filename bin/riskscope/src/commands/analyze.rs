use riskscope_core::{Config, Paths};
use riskscope_storage::load_log_file;
use std::path::Path;
use tracing::info;

use super::session_run;

pub async fn run(file: &Path, export: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;

    let log_text = load_log_file(file)?;
    info!(file = %file.display(), bytes = log_text.len(), "Loaded log for analysis");

    let mut controller = session_run::controller(config.clone());
    controller.start_analysis(log_text).await?;

    session_run::finish(&mut controller, &config, &paths, export).await
}
