use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::ProviderConfig;
use crate::http_client::{build_http_client, get_json};

/// Columns the provider attaches to events that nothing downstream reads.
pub const DROPPED_EVENT_COLUMNS: [&str; 5] = [
    "matchTimestamp",
    "videoTimestamp",
    "relatedEventId",
    "possession",
    "id",
];

pub const SEASON_EVENTS_FILE: &str = "seasonEvents25.csv";
pub const TEAM_GAME_EVENTS_FILE: &str = "umichGameEvents25.csv";
pub const TEAM_ONLY_EVENTS_FILE: &str = "umichOnlyEvents25.csv";

#[derive(Debug, Clone, PartialEq)]
pub struct MatchRef {
    pub match_id: i64,
    pub label: String,
}

/// The two calls the download jobs need from the provider.
pub trait EventSource {
    fn season_matches(&self, season_id: i64) -> Result<Vec<MatchRef>>;
    fn match_events(&self, match_id: i64) -> Result<Vec<Value>>;
}

pub struct ProviderClient {
    cfg: ProviderConfig,
    http: Client,
}

impl ProviderClient {
    pub fn new(cfg: ProviderConfig) -> Result<Self> {
        Ok(Self {
            http: build_http_client()?,
            cfg,
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.cfg
    }

    fn get(&self, path: &str) -> Result<Value> {
        let url = format!("{}/{}", self.cfg.api_root(), path.trim_start_matches('/'));
        get_json(&self.http, &self.cfg, &url)
    }

    pub fn areas(&self) -> Result<Value> {
        self.get("areas")
    }

    pub fn competitions(&self, area_id: &str) -> Result<Value> {
        self.get(&format!("competitions?areaId={area_id}"))
    }

    pub fn seasons(&self, competition_id: i64) -> Result<Value> {
        self.get(&format!("competitions/{competition_id}/seasons"))
    }

    /// First active season of the configured competition, if any.
    pub fn current_season_id(&self) -> Result<Option<i64>> {
        let body = self.get(&format!(
            "competitions/{}/seasons?active=true",
            self.cfg.competition_id
        ))?;
        let Some(first) = body
            .get("seasons")
            .and_then(|v| v.as_array())
            .and_then(|a| a.first())
        else {
            warn!("no active season found via api flag");
            return Ok(None);
        };
        let season_id = first.get("seasonId").and_then(as_i64_any);
        let name = first
            .pointer("/season/name")
            .and_then(|v| v.as_str())
            .unwrap_or("?");
        if let Some(id) = season_id {
            info!(season = name, season_id = id, "live season detected");
        }
        Ok(season_id)
    }
}

impl EventSource for ProviderClient {
    fn season_matches(&self, season_id: i64) -> Result<Vec<MatchRef>> {
        let body = self.get(&format!("seasons/{season_id}/matches"))?;
        Ok(parse_matches(&body))
    }

    fn match_events(&self, match_id: i64) -> Result<Vec<Value>> {
        let body = self.get(&format!(
            "matches/{match_id}/events?fetch=teams,players,match,coaches,referees,formations,substitutions"
        ))?;
        Ok(body
            .get("events")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default())
    }
}

pub fn parse_matches(body: &Value) -> Vec<MatchRef> {
    body.get("matches")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|m| {
                    Some(MatchRef {
                        match_id: m.get("matchId").and_then(as_i64_any)?,
                        label: m
                            .get("label")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Default)]
pub struct DownloadReport {
    pub matches_considered: usize,
    pub matches_fetched: usize,
    pub skipped: Vec<(i64, String)>,
    pub events_written: usize,
    pub path: Option<PathBuf>,
}

/// Fetch every match accepted by `keep_match` one at a time, keep the events
/// accepted by `keep_event` and write them as one CSV. A failing match is
/// logged and skipped.
pub fn download_events(
    source: &dyn EventSource,
    season_id: i64,
    output: &Path,
    keep_match: impl Fn(&MatchRef) -> bool,
    keep_event: impl Fn(&Value) -> bool,
) -> Result<DownloadReport> {
    let matches = source
        .season_matches(season_id)
        .with_context(|| format!("load matches for season {season_id}"))?;

    let mut report = DownloadReport::default();
    let mut events = Vec::new();
    for m in matches.iter().filter(|m| keep_match(m)) {
        report.matches_considered += 1;
        match source.match_events(m.match_id) {
            Ok(batch) => {
                report.matches_fetched += 1;
                events.extend(batch.into_iter().filter(|e| keep_event(e)));
                info!(label = %m.label, "downloaded match");
            }
            Err(err) => {
                warn!(match_id = m.match_id, error = %err, "skipping match");
                report.skipped.push((m.match_id, err.to_string()));
            }
        }
    }

    if events.is_empty() {
        warn!(path = %output.display(), "no events found to save");
        return Ok(report);
    }
    report.events_written = write_events_csv(&events, output)?;
    report.path = Some(output.to_path_buf());
    info!(events = report.events_written, path = %output.display(), "saved events");
    Ok(report)
}

/// Every event of the season.
pub fn download_season(client: &ProviderClient, season_id: i64) -> Result<DownloadReport> {
    let output = client.config().output_dir.join(SEASON_EVENTS_FILE);
    download_events(client, season_id, &output, |_| true, |_| true)
}

/// Both teams' events from every match of the configured team.
pub fn download_team_matches(client: &ProviderClient, season_id: i64) -> Result<DownloadReport> {
    let label = client.config().team_label.clone();
    let output = client.config().output_dir.join(TEAM_GAME_EVENTS_FILE);
    download_events(
        client,
        season_id,
        &output,
        |m| m.label.contains(&label),
        |_| true,
    )
}

/// Only the configured team's own events.
pub fn download_team_only(client: &ProviderClient, season_id: i64) -> Result<DownloadReport> {
    let label = client.config().team_label.clone();
    let output = client.config().output_dir.join(TEAM_ONLY_EVENTS_FILE);
    download_events(
        client,
        season_id,
        &output,
        |m| m.label.contains(&label),
        |e| event_team_name(e).is_some_and(|name| name.contains(&label)),
    )
}

fn event_team_name(event: &Value) -> Option<&str> {
    event.pointer("/team/name").and_then(|v| v.as_str())
}

/// Flatten events into one CSV row each. Columns appear in first-seen
/// order; nested values are written as JSON text.
pub fn write_events_csv(events: &[Value], path: &Path) -> Result<usize> {
    let mut columns: Vec<String> = Vec::new();
    for event in events {
        if let Some(obj) = event.as_object() {
            for key in obj.keys() {
                if !DROPPED_EVENT_COLUMNS.contains(&key.as_str()) && !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    writer.write_record(&columns).context("write csv header")?;
    for event in events {
        let record: Vec<String> = columns
            .iter()
            .map(|c| cell_text(event.get(c)))
            .collect();
        writer.write_record(&record).context("write event row")?;
    }
    writer.flush().context("flush events csv")?;
    Ok(events.len())
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn as_i64_any(v: &Value) -> Option<i64> {
    v.as_i64()
        .or_else(|| v.as_f64().map(|f| f as i64))
        .or_else(|| v.as_str()?.trim().parse().ok())
}
