use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::CacheConfig;
use crate::model::{DateEntry, DateLabel, PlanDate, PlanRecord, PlanStyle};

const TMP_EXTENSION: &str = "json.tmp";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct StoredDate {
    label: Option<DateLabel>,
    plans: Vec<PlanRecord>,
}

#[derive(Debug, Clone)]
pub struct CachePersister {
    dates_path: PathBuf,
    styles_path: PathBuf,
}

impl CachePersister {
    pub fn new(dates_path: PathBuf, styles_path: PathBuf) -> Self {
        Self {
            dates_path,
            styles_path,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        if !config.enabled || config.dates_path.as_os_str().is_empty() {
            return None;
        }
        Some(Self::new(
            config.dates_path.clone(),
            config.styles_path.clone(),
        ))
    }

    /// Entries that fail to decode come back as empty dates. Any file-level failure
    /// yields an empty map.
    pub fn load_dates(&self) -> BTreeMap<PlanDate, DateEntry> {
        let raw: BTreeMap<String, Value> = match read_json(&self.dates_path) {
            Ok(Some(raw)) => raw,
            Ok(None) => return BTreeMap::new(),
            Err(err) => {
                tracing::warn!(?err, "discarding unreadable date cache");
                return BTreeMap::new();
            }
        };
        let mut dates = BTreeMap::new();
        for (key, value) in raw {
            let Ok(date) = key.parse::<PlanDate>() else {
                tracing::warn!(%key, "skipping cached entry with malformed date");
                continue;
            };
            let stored = serde_json::from_value::<StoredDate>(value).unwrap_or_else(|err| {
                tracing::warn!(%date, ?err, "cached date entry is malformed");
                StoredDate::default()
            });
            dates.insert(
                date,
                DateEntry {
                    date,
                    label: stored.label,
                    plans: stored.plans,
                },
            );
        }
        dates
    }

    pub fn load_styles(&self) -> BTreeMap<String, PlanStyle> {
        match read_json(&self.styles_path) {
            Ok(Some(styles)) => styles,
            Ok(None) => BTreeMap::new(),
            Err(err) => {
                tracing::warn!(?err, "discarding unreadable style cache");
                BTreeMap::new()
            }
        }
    }

    pub fn save_dates(&self, dates: &BTreeMap<PlanDate, DateEntry>) -> Result<()> {
        let stored: BTreeMap<&PlanDate, StoredDateRef<'_>> = dates
            .iter()
            .map(|(date, entry)| {
                (
                    date,
                    StoredDateRef {
                        label: entry.label.as_ref(),
                        plans: &entry.plans,
                    },
                )
            })
            .collect();
        let json = serde_json::to_vec(&stored).context("serialising date cache")?;
        write_atomic(&self.dates_path, &json)
    }

    pub fn save_styles(&self, styles: &BTreeMap<String, PlanStyle>) -> Result<()> {
        let json = serde_json::to_vec(styles).context("serialising style cache")?;
        write_atomic(&self.styles_path, &json)
    }
}

#[derive(Serialize)]
struct StoredDateRef<'a> {
    label: Option<&'a DateLabel>,
    plans: &'a [PlanRecord],
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read(path).with_context(|| format!("reading cache {}", path.display()))?;
    let parsed = serde_json::from_slice(&raw)
        .with_context(|| format!("parsing cache {}", path.display()))?;
    Ok(Some(parsed))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("ensuring cache dir {}", dir.display()))?;
    }
    let tmp_path = path.with_extension(TMP_EXTENSION);
    fs::write(&tmp_path, bytes)
        .with_context(|| format!("writing temporary cache {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("atomically persisting cache {}", path.display()))?;
    Ok(())
}
