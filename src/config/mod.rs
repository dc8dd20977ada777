use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::dates::WeekStart;

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "PlannerSync";
const APP_NAME: &str = "planner";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn with_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<EngineConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = EngineConfig::default();
            default_cfg.post_load(&self.paths)?;
            self.write_default_config(&default_cfg)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<EngineConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: EngineConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load(&self.paths)?;
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &EngineConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub cache_dir: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var("PLANNER_SYNC_CONFIG").ok().map(PathBuf::from);
        let override_data = env::var("PLANNER_SYNC_DATA").ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let data_root = override_data.unwrap_or_else(|| project_dirs.data_dir().to_path_buf());
        let cache_dir = project_dirs.cache_dir().to_path_buf();

        Ok(Self {
            config_dir,
            config_file,
            database_path: data_root.join("planner.db"),
            data_dir: data_root,
            cache_dir,
        })
    }

    /// Every location under one root directory.
    pub fn rooted_at(root: &Path) -> Self {
        let config_dir = root.join("config");
        let data_dir = root.join("data");
        Self {
            config_file: config_dir.join("config.toml"),
            config_dir,
            database_path: data_dir.join("planner.db"),
            data_dir,
            cache_dir: root.join("cache"),
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.data_dir, &self.cache_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub window: WindowConfig,
    pub render: RenderConfig,
    pub undo: UndoConfig,
    pub cache: CacheConfig,
    pub integrity: IntegrityConfig,
}

impl EngineConfig {
    fn post_load(&mut self, paths: &ConfigPaths) -> Result<()> {
        self.cache.resolve(paths);
        if self.render.edge_tiers.is_empty() {
            tracing::warn!("no scroll edge tiers in config, falling back to defaults");
            self.render.edge_tiers = RenderConfig::default().edge_tiers;
        }
        if self.render.initial_weeks == 0 {
            tracing::warn!("render.initial_weeks must be positive, using 1");
            self.render.initial_weeks = 1;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub sweep_interval_secs: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
        }
    }
}

impl WindowConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub initial_weeks: u32,
    pub weeks_before_today: u32,
    pub week_start: WeekStart,
    /// Checked nearest first: the first tier whose threshold exceeds the edge distance wins.
    pub edge_tiers: Vec<EdgeTier>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            initial_weeks: 5,
            weeks_before_today: 1,
            week_start: WeekStart::Monday,
            edge_tiers: vec![
                EdgeTier {
                    within_px: 60.0,
                    weeks: 3,
                },
                EdgeTier {
                    within_px: 67.0,
                    weeks: 2,
                },
                EdgeTier {
                    within_px: 70.0,
                    weeks: 1,
                },
            ],
        }
    }
}

impl RenderConfig {
    /// Window length the far edge is trimmed back toward.
    pub fn optimum_days(&self) -> i64 {
        7 * i64::from(self.initial_weeks.max(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeTier {
    pub within_px: f64,
    pub weeks: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UndoConfig {
    pub session_timeout_secs: u64,
    pub max_entries: usize,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: 30 * 60,
            max_entries: 500,
        }
    }
}

impl UndoConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    #[serde(skip)]
    pub dates_path: PathBuf,
    #[serde(skip)]
    pub styles_path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dates_path: PathBuf::new(),
            styles_path: PathBuf::new(),
        }
    }
}

impl CacheConfig {
    fn resolve(&mut self, paths: &ConfigPaths) {
        if self.dates_path.as_os_str().is_empty() {
            self.dates_path = paths.cache_dir.join("dates.json");
        }
        if self.styles_path.as_os_str().is_empty() {
            self.styles_path = paths.cache_dir.join("styles.json");
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    /// Also write reconstructed predecessors back for records whose link was broken.
    pub repair_broken_links: bool,
}
