use std::env;
use std::path::PathBuf;

use anyhow::{Result, bail};

use crate::gbt::GbtParams;

pub const DEFAULT_BASE_URL: &str = "https://apirest.wyscout.com";
pub const DEFAULT_API_VERSION: u32 = 3;
/// Big Ten men's soccer.
pub const DEFAULT_COMPETITION_ID: i64 = 43236;
pub const DEFAULT_TEAM_LABEL: &str = "Michigan Wolverines";

/// Credentials and locations for the event provider. Built once by the
/// fetch binary and passed down; library code never reads the environment.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_version: u32,
    pub username: String,
    pub password: String,
    pub competition_id: i64,
    pub output_dir: PathBuf,
    pub team_label: String,
    pub verbose: bool,
}

impl ProviderConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let Some(username) = get("WYSCOUT_API_USERNAME") else {
            bail!("WYSCOUT_API_USERNAME is not set");
        };
        let Some(password) = get("WYSCOUT_API_PASSWORD") else {
            bail!("WYSCOUT_API_PASSWORD is not set");
        };

        Ok(Self {
            base_url: get("WYSCOUT_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_version: DEFAULT_API_VERSION,
            username,
            password,
            competition_id: get("WYSCOUT_COMPETITION_ID")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_COMPETITION_ID),
            output_dir: get("BASE_PATH").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
            team_label: get("VAEP_TEAM_LABEL").unwrap_or_else(|| DEFAULT_TEAM_LABEL.to_string()),
            verbose: get("WYSCOUT_VERBOSE").is_some_and(|v| env_flag(&v)),
        })
    }

    pub fn api_root(&self) -> String {
        format!("{}/v{}", self.base_url, self.api_version)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_folder: PathBuf,
    pub league_events_csv: PathBuf,
    pub team_events_csv: PathBuf,
    pub ranking_file: String,
    /// Actions per gamestate when building stored features.
    pub window_size: usize,
    /// Actions of context the models see (`_a0` only when 1).
    pub model_prev_actions: usize,
    pub label_horizon: usize,
    pub gbt: GbtParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_folder: PathBuf::from("./vaep_data"),
            league_events_csv: PathBuf::from("seasonEvents25.csv"),
            team_events_csv: PathBuf::from("umichOnlyEvents25.csv"),
            ranking_file: "michigan_player_vaep.csv".to_string(),
            window_size: 3,
            model_prev_actions: 1,
            label_horizon: 10,
            gbt: GbtParams::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let mut cfg = Self::default();
        if let Some(v) = get("VAEP_DATA_FOLDER") {
            cfg.data_folder = PathBuf::from(v);
        }
        if let Some(v) = get("VAEP_LEAGUE_EVENTS") {
            cfg.league_events_csv = PathBuf::from(v);
        }
        if let Some(v) = get("VAEP_TEAM_EVENTS") {
            cfg.team_events_csv = PathBuf::from(v);
        }
        if let Some(v) = get("VAEP_WINDOW").and_then(|v| v.parse::<usize>().ok()) {
            cfg.window_size = v.clamp(1, 10);
        }
        if let Some(v) = get("VAEP_MODEL_PREV_ACTIONS").and_then(|v| v.parse::<usize>().ok()) {
            cfg.model_prev_actions = v.clamp(1, cfg.window_size);
        }
        cfg
    }

    pub fn ranking_path(&self) -> PathBuf {
        self.data_folder.join(&self.ranking_file)
    }

    pub fn ranking_workbook_path(&self) -> PathBuf {
        self.ranking_path().with_extension("xlsx")
    }

    pub fn models_path(&self) -> PathBuf {
        self.data_folder.join("models.json")
    }
}

fn env_flag(v: &str) -> bool {
    let t = v.trim().to_ascii_lowercase();
    !(t.is_empty() || t == "0" || t == "false" || t == "off" || t == "no")
}
