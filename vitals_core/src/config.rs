//! Configuration file support for vitals.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/vitals/config.toml`.

use crate::derive::{BodyProfile, HEIGHT_CM, NECK_CM};
use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub body: BodyConfig,

    #[serde(default)]
    pub chart: ChartConfig,
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default = "default_store_file")]
    pub store_file: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            store_file: default_store_file(),
        }
    }
}

impl DataConfig {
    /// Full path of the store document inside `data_dir`
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(&self.store_file)
    }
}

/// Fixed body measurements used by the body-fat estimate
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BodyConfig {
    #[serde(default = "default_neck_cm")]
    pub neck_cm: f64,

    #[serde(default = "default_height_cm")]
    pub height_cm: f64,
}

impl Default for BodyConfig {
    fn default() -> Self {
        Self {
            neck_cm: default_neck_cm(),
            height_cm: default_height_cm(),
        }
    }
}

impl BodyConfig {
    pub fn profile(&self) -> BodyProfile {
        BodyProfile {
            neck_cm: self.neck_cm,
            height_cm: self.height_cm,
        }
    }
}

/// Smoothing, trend and goal parameters for chart assembly
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(default = "default_ema_window")]
    pub ema_window: usize,

    /// Number of most recent present points used for the trend fit
    #[serde(default = "default_trend_window")]
    pub trend_window: usize,

    #[serde(default = "default_projection_end")]
    pub projection_end: NaiveDate,

    #[serde(default = "default_net_kcal_goal")]
    pub net_kcal_goal: Option<f64>,

    #[serde(default = "default_mass_goal_kg")]
    pub mass_goal_kg: Option<f64>,

    #[serde(default)]
    pub body_fat_goal_pct: Option<f64>,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            ema_window: default_ema_window(),
            trend_window: default_trend_window(),
            projection_end: default_projection_end(),
            net_kcal_goal: default_net_kcal_goal(),
            mass_goal_kg: default_mass_goal_kg(),
            body_fat_goal_pct: None,
        }
    }
}

// Default value functions
fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| {
        std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".local/share"))
            .unwrap_or_else(|| PathBuf::from("."))
    });
    base.join("vitals")
}

fn default_store_file() -> String {
    "store.json".into()
}

fn default_neck_cm() -> f64 {
    NECK_CM
}

fn default_height_cm() -> f64 {
    HEIGHT_CM
}

fn default_ema_window() -> usize {
    7
}

fn default_trend_window() -> usize {
    28
}

fn default_projection_end() -> NaiveDate {
    NaiveDate::from_ymd_opt(2027, 11, 8).unwrap_or(NaiveDate::MAX)
}

fn default_net_kcal_goal() -> Option<f64> {
    Some(1500.0)
}

fn default_mass_goal_kg() -> Option<f64> {
    Some(100.0)
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_path
            );
            Ok(Self::default())
        }
    }

    /// Load and validate configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|| PathBuf::from("."))
        });
        base.join("vitals").join("config.toml")
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.chart.ema_window == 0 {
            return Err(Error::Config("chart.ema_window must be at least 1".into()));
        }
        if self.chart.trend_window < 2 {
            return Err(Error::Config("chart.trend_window must be at least 2".into()));
        }
        if !(self.body.neck_cm > 0.0) || !(self.body.height_cm > 0.0) {
            return Err(Error::Config(
                "body.neck_cm and body.height_cm must be positive".into(),
            ));
        }
        if self.data.store_file.trim().is_empty() {
            return Err(Error::Config("data.store_file must not be empty".into()));
        }
        Ok(())
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
