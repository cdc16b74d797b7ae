use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{Error, Result};
use crate::paths::Paths;
use crate::types::Mode;

/// Environment variable that overrides `service.baseUrl`.
pub const SERVICE_URL_ENV: &str = "RISKSCOPE_SERVICE_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Base address of the annotation service. The WebSocket scheme is
    /// derived from it: `http` → `ws`, `https` → `wss`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_explore_path")]
    pub explore_path: String,
    #[serde(default = "default_analyze_path")]
    pub analyze_path: String,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_explore_path() -> String {
    "/ws/agent".to_string()
}

fn default_analyze_path() -> String {
    "/ws/analyze".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            explore_path: default_explore_path(),
            analyze_path: default_analyze_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelConfig {
    /// Depth of the channel event queue feeding the session loop.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_event_buffer() -> usize {
    256
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            event_buffer: default_event_buffer(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExportsConfig {
    /// Overrides `~/.riskscope/exports`.
    #[serde(default)]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub exports: ExportsConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn load_or_default(paths: &Paths) -> Result<Self> {
        let config_path = paths.config_file();
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Service base URL, honouring the environment override.
    pub fn service_base_url(&self) -> String {
        match std::env::var(SERVICE_URL_ENV) {
            Ok(url) if !url.trim().is_empty() => url.trim().to_string(),
            _ => self.service.base_url.clone(),
        }
    }

    /// WebSocket endpoint for the given mode.
    pub fn endpoint(&self, mode: Mode) -> Result<Url> {
        let path = match mode {
            Mode::Exploration => &self.service.explore_path,
            Mode::Analysis => &self.service.analyze_path,
        };
        endpoint_from_base(&self.service_base_url(), path)
    }

    pub fn exports_dir(&self, paths: &Paths) -> PathBuf {
        match self.exports.dir.as_deref().map(str::trim) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => paths.exports_dir(),
        }
    }
}

/// Build a WebSocket URL from an HTTP(S) or WS(S) base address.
pub fn endpoint_from_base(base: &str, path: &str) -> Result<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| Error::Config(format!("Invalid service URL '{}': {}", base, e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(Error::Config(format!(
                "Unsupported service URL scheme '{}' (expected http, https, ws or wss)",
                other
            )))
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| Error::Config(format!("Cannot use scheme '{}' for {}", scheme, base)))?;

    let prefix = url.path().trim_end_matches('/').to_string();
    let suffix = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    url.set_path(&format!("{}{}", prefix, suffix));
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.service.base_url, "http://localhost:8000");
        assert_eq!(cfg.service.explore_path, "/ws/agent");
        assert_eq!(cfg.service.analyze_path, "/ws/analyze");
        assert_eq!(cfg.channel.event_buffer, 256);
        assert!(cfg.exports.dir.is_none());
    }

    #[test]
    fn test_camel_case_keys() {
        let raw = r#"{
  "service": { "baseUrl": "https://annotate.example.org/", "explorePath": "/agent" },
  "channel": { "eventBuffer": 16 }
}"#;
        let cfg: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.service.base_url, "https://annotate.example.org/");
        assert_eq!(cfg.service.explore_path, "/agent");
        assert_eq!(cfg.service.analyze_path, "/ws/analyze");
        assert_eq!(cfg.channel.event_buffer, 16);
    }

    #[test]
    fn test_endpoint_scheme_matching() {
        let insecure = endpoint_from_base("http://localhost:8000", "/ws/agent").unwrap();
        assert_eq!(insecure.as_str(), "ws://localhost:8000/ws/agent");

        let secure = endpoint_from_base("https://annotate.example.org", "/ws/analyze").unwrap();
        assert_eq!(secure.as_str(), "wss://annotate.example.org/ws/analyze");
    }

    #[test]
    fn test_endpoint_keeps_base_prefix() {
        let url = endpoint_from_base("https://example.org/api/", "ws/agent").unwrap();
        assert_eq!(url.as_str(), "wss://example.org/api/ws/agent");
    }

    #[test]
    fn test_endpoint_rejects_unknown_scheme() {
        assert!(endpoint_from_base("ftp://example.org", "/ws/agent").is_err());
        assert!(endpoint_from_base("not a url", "/ws/agent").is_err());
    }

    #[test]
    fn test_endpoints_differ_by_mode() {
        let cfg = Config::default();
        let explore = endpoint_from_base(&cfg.service.base_url, &cfg.service.explore_path).unwrap();
        let analyze = endpoint_from_base(&cfg.service.base_url, &cfg.service.analyze_path).unwrap();
        assert_ne!(explore, analyze);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let paths = Paths::with_base(dir.path().to_path_buf());
        let mut cfg = Config::default();
        cfg.exports.dir = Some("/tmp/riskscope-out".to_string());
        cfg.save(&paths.config_file()).unwrap();

        let loaded = Config::load_or_default(&paths).unwrap();
        assert_eq!(loaded.exports.dir.as_deref(), Some("/tmp/riskscope-out"));
        assert_eq!(loaded.exports_dir(&paths), PathBuf::from("/tmp/riskscope-out"));
    }

    #[test]
    fn test_exports_dir_defaults_to_paths() {
        let paths = Paths::with_base(PathBuf::from("/base"));
        let cfg = Config::default();
        assert_eq!(cfg.exports_dir(&paths), PathBuf::from("/base/exports"));
    }
}
