use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Host and port of the monitoring service, e.g. "localhost:8000".
    pub server: String,
    pub topic: String,
    pub quiz_seconds: u32,
    pub capture_interval_ms: u64,
    pub warning_threshold: u32,
    pub reconnect_delay_ms: u64,
    /// How long the "terminated" notice stays on screen before the outcome
    /// is reported, when termination was warning-triggered.
    pub termination_display_delay_ms: u64,
    /// Directory of image files used as the camera stand-in.
    pub frames_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: "localhost:8000".to_string(),
            topic: "os".to_string(),
            quiz_seconds: 600,
            capture_interval_ms: 50,
            warning_threshold: 3,
            reconnect_delay_ms: 3000,
            termination_display_delay_ms: 3000,
            frames_dir: None,
        }
    }
}

impl Config {
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.server)
    }

    pub fn reset_url(&self) -> String {
        format!("http://{}/reset_proctoring", self.server)
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "invigil") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("invigil_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        if let Ok(bytes) = fs::read(&self.path) {
            if let Ok(cfg) = serde_json::from_slice::<Config>(&bytes) {
                return cfg;
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).unwrap_or_default();
        fs::write(&self.path, data)
    }
}
