use riskscope_core::{Config, Paths};

use super::session_run;

pub async fn run(
    url: &str,
    instruction: &str,
    max_steps: Option<&str>,
    export: bool,
) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;

    let mut controller = session_run::controller(config.clone());
    controller
        .start_exploration(url, instruction, max_steps)
        .await?;

    session_run::finish(&mut controller, &config, &paths, export).await
}
