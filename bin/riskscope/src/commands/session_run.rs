use riskscope_channels::WsConnector;
use riskscope_core::{Config, Paths};
use riskscope_session::{Session, SessionController, SessionState, SessionView};
use riskscope_storage::{ExportRecord, ExportStore};
use std::sync::Arc;
use tracing::warn;

use super::render::{print_result, ConsoleObserver};

pub fn controller(config: Config) -> SessionController {
    let mut controller = SessionController::new(config, Arc::new(WsConnector::new()));
    controller.subscribe(Arc::new(ConsoleObserver::new()));
    controller
}

/// Run the started session to its end, tearing it down on Ctrl-C, then
/// print the outcome and export it when asked.
pub async fn finish(
    controller: &mut SessionController,
    config: &Config,
    paths: &Paths,
    export: bool,
) -> anyhow::Result<()> {
    let finished = tokio::select! {
        state = controller.run_until_terminal() => state,
        _ = tokio::signal::ctrl_c() => None,
    };
    if finished.is_none() {
        warn!("Interrupted, ending session");
    }
    controller.teardown().await;

    let Some(session) = controller.session() else {
        return Ok(());
    };
    print_result(&SessionView::from_session(session));

    if export {
        if session.state() == SessionState::Completed {
            export_session(session, config, paths)?;
        } else {
            println!("Nothing exported: the session did not complete.");
        }
    }

    if session.state() == SessionState::Failed {
        anyhow::bail!("Session {} failed", session.display_id());
    }
    Ok(())
}

fn export_session(session: &Session, config: &Config, paths: &Paths) -> anyhow::Result<()> {
    let store = ExportStore::new(config.exports_dir(paths));
    let id = session.display_id();

    let annotations = store.write_annotations(id, &session.export_json()?)?;
    let log = store.write_log(id, session.mode(), session.export_log())?;

    let actions = session.result().map(|r| r.len()).unwrap_or(0);
    let mut record = ExportRecord::new(id, session.mode(), actions);
    record.annotations_file = Some(annotations.clone());
    record.log_file = Some(log.clone());
    store.record(&record)?;

    println!();
    println!("✓ Exported {}", annotations.display());
    println!("✓ Exported {}", log.display());
    Ok(())
}
