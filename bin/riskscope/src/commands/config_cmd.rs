use riskscope_core::{Config, Paths};
use serde_json::Value;

/// Show the current configuration as pretty-printed JSON.
pub async fn show() -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;

    println!();
    println!("📋 Current Configuration");
    println!("  File: {}", paths.config_file().display());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Get a config value by dot-separated key path.
pub async fn get(key: &str) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    let json = serde_json::to_value(&config)?;

    match resolve_json_path(&json, key) {
        Some(Value::String(s)) => println!("{}", s),
        Some(v) => println!("{}", serde_json::to_string_pretty(&v)?),
        None => anyhow::bail!("Key '{}' not found in config.", key),
    }
    Ok(())
}

/// Set a config value by dot-separated key path.
pub async fn set(key: &str, value: &str) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    let updated = apply_setting(&config, key, value)?;
    updated.save(&paths.config_file())?;

    println!("✓ Set {} = {}", key, value);
    Ok(())
}

/// Restore the default service and channel settings. Exports are untouched.
pub async fn reset(force: bool) -> anyhow::Result<()> {
    let paths = Paths::new();
    let config_file = paths.config_file();

    let prompt = format!(
        "Reset {} to defaults? Exported sessions are kept. [y/N] ",
        config_file.display()
    );
    if !force && !confirm(&prompt)? {
        println!("Configuration left unchanged.");
        return Ok(());
    }

    let defaults = Config::default();
    defaults.save(&config_file)?;
    println!("✓ Defaults restored, service at {}", defaults.service.base_url);
    Ok(())
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    use std::io::Write;
    print!("{}", prompt);
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

/// Apply `key = value` and re-validate the result as a [`Config`].
fn apply_setting(config: &Config, key: &str, value: &str) -> anyhow::Result<Config> {
    let mut json = serde_json::to_value(config)?;

    // JSON literals keep their type; anything else is taken as a string.
    let parsed: Value =
        serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    if !replace_at_path(&mut json, key, parsed) {
        anyhow::bail!("Unknown config key '{}'", key);
    }

    let updated: Config = serde_json::from_value(json)
        .map_err(|e| anyhow::anyhow!("Invalid value for '{}': {}", key, e))?;
    Ok(updated)
}

/// Look up a dot-separated key; each segment may be camelCase or snake_case.
fn resolve_json_path(json: &Value, path: &str) -> Option<Value> {
    let mut current = json;
    for part in path.split('.') {
        let node = current;
        current = node.get(to_camel_case(part)).or_else(|| node.get(part))?;
    }
    Some(current.clone())
}

/// Replace the value at an existing key. Returns `false` if the key is unknown;
/// new keys are never created.
fn replace_at_path(json: &mut Value, path: &str, value: Value) -> bool {
    let mut segments = path.split('.').peekable();
    let mut node = json;
    while let Some(segment) = segments.next() {
        let Some(object) = node.as_object_mut() else {
            return false;
        };
        let camel = to_camel_case(segment);
        let key = if object.contains_key(&camel) {
            camel
        } else {
            segment.to_string()
        };
        let Some(slot) = object.get_mut(&key) else {
            return false;
        };
        if segments.peek().is_none() {
            *slot = value;
            return true;
        }
        node = slot;
    }
    false
}

/// `event_buffer` → `eventBuffer`. Already camelCase input is returned as is.
fn to_camel_case(s: &str) -> String {
    let mut segments = s.split('_');
    let mut out = segments.next().unwrap_or_default().to_string();
    for segment in segments {
        let mut chars = segment.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}
