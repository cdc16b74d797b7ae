use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Paths {
    pub base: PathBuf,
}

impl Paths {
    pub fn new() -> Self {
        let base = dirs::home_dir()
            .map(|h| h.join(".riskscope"))
            .unwrap_or_else(|| PathBuf::from(".riskscope"));
        Self { base }
    }

    pub fn with_base(base: PathBuf) -> Self {
        Self { base }
    }

    pub fn config_file(&self) -> PathBuf {
        self.base.join("config.json")
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.base.join("exports")
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}
