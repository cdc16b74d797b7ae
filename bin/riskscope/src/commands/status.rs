use riskscope_core::{Config, Mode, Paths};
use riskscope_storage::ExportStore;

const RECENT_EXPORTS: usize = 5;

pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();

    println!("riskscope status");
    println!("================");
    println!();

    let config_path = paths.config_file();
    let config_exists = config_path.exists();
    println!(
        "Config:    {} {}",
        config_path.display(),
        if config_exists { "✓" } else { "(defaults)" }
    );
    let config = Config::load_or_default(&paths)?;

    println!("Service:   {}", config.service_base_url());
    for mode in [Mode::Exploration, Mode::Analysis] {
        match config.endpoint(mode) {
            Ok(url) => println!("  {:<12} {}", mode.as_str(), url),
            Err(e) => println!("  {:<12} ✗ {}", mode.as_str(), e),
        }
    }

    let exports_dir = config.exports_dir(&paths);
    println!();
    println!(
        "Exports:   {} {}",
        exports_dir.display(),
        if exports_dir.exists() { "✓" } else { "✗ (not created yet)" }
    );

    let history = ExportStore::new(exports_dir).history()?;
    if history.is_empty() {
        println!("  No exports yet.");
        return Ok(());
    }
    println!("  Recent:");
    for record in history.iter().rev().take(RECENT_EXPORTS) {
        println!(
            "  {}  {:<12} {:<12} {} actions",
            record.exported_at, record.mode.as_str(), record.session_id, record.actions
        );
    }
    Ok(())
}
