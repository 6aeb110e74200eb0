use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::frame::SchemaError;
use crate::literal::{safe_parse, truthy};

/// Columns every event table must carry for translation.
pub const TRANSLATE_COLUMNS: [&str; 8] = [
    "matchId",
    "matchPeriod",
    "second",
    "team",
    "type",
    "pass",
    "shot",
    "location",
];

/// Extra column needed to attribute actions to players.
pub const PLAYER_COLUMN: &str = "player";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TeamRef {
    pub id: i64,
    pub name: Option<String>,
    pub formation: Option<String>,
}

impl TeamRef {
    fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            id: map.get("id").and_then(as_i64_any).unwrap_or(0),
            name: map.get("name").and_then(|v| v.as_str()).map(str::to_string),
            formation: map
                .get("formation")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        }
    }
}

/// Provider event as delivered, with each nested block decoded once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEvent {
    pub match_id: i64,
    pub match_period: Option<String>,
    pub second: f64,
    pub team: TeamRef,
    pub opponent_team: TeamRef,
    pub location: Map<String, Value>,
    pub type_block: Map<String, Value>,
    pub pass: Map<String, Value>,
    pub shot: Map<String, Value>,
    pub ground_duel: Map<String, Value>,
    pub carry: Map<String, Value>,
    pub player: Map<String, Value>,
}

impl RawEvent {
    /// Build from a flattened row; `cell` returns the raw text of a column.
    pub fn from_cells<'a>(cell: impl Fn(&str) -> Option<&'a str>) -> Self {
        let nested = |name: &str| cell(name).map(safe_parse).unwrap_or_default();
        let match_id = cell("matchId").and_then(parse_i64_text).unwrap_or(0);
        let second = cell("second")
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(0.0);
        let match_period = cell("matchPeriod")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let ground_duel = match cell("ground_duel") {
            Some(raw) => safe_parse(raw),
            None => nested("groundDuel"),
        };
        Self {
            match_id,
            match_period,
            second,
            team: TeamRef::from_map(&nested("team")),
            opponent_team: TeamRef::from_map(&nested("opponentTeam")),
            location: nested("location"),
            type_block: nested("type"),
            pass: nested("pass"),
            shot: nested("shot"),
            ground_duel,
            carry: nested("carry"),
            player: nested("player"),
        }
    }

    /// Build from one event object of the provider's JSON payload.
    pub fn from_json(event: &Value) -> Self {
        let block = |name: &str| {
            event
                .get(name)
                .and_then(|v| v.as_object())
                .cloned()
                .unwrap_or_default()
        };
        let ground_duel = match event.get("groundDuel").and_then(|v| v.as_object()) {
            Some(map) => map.clone(),
            None => block("ground_duel"),
        };
        Self {
            match_id: event.get("matchId").and_then(as_i64_any).unwrap_or(0),
            match_period: event
                .get("matchPeriod")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            second: event.get("second").and_then(|v| v.as_f64()).unwrap_or(0.0),
            team: TeamRef::from_map(&block("team")),
            opponent_team: TeamRef::from_map(&block("opponentTeam")),
            location: block("location"),
            type_block: block("type"),
            pass: block("pass"),
            shot: block("shot"),
            ground_duel,
            carry: block("carry"),
            player: block("player"),
        }
    }

    /// Lower-cased primary type tag.
    pub fn primary(&self) -> String {
        match self.type_block.get("primary") {
            Some(Value::String(s)) => s.to_lowercase(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string().to_lowercase(),
        }
    }

    pub fn secondary(&self) -> Vec<&str> {
        self.type_block
            .get("secondary")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn has_secondary(&self, tag: &str) -> bool {
        self.secondary().contains(&tag)
    }

    pub fn type_success(&self) -> bool {
        truthy(self.type_block.get("success"))
    }

    /// Raw provider coordinates (0-100 units); absent values read as 0.
    pub fn raw_location(&self) -> (f64, f64) {
        (
            coord(self.location.get("x")),
            coord(self.location.get("y")),
        )
    }

    /// Explicit end location from the pass block, then the carry block.
    pub fn raw_end_location(&self) -> Option<(f64, f64)> {
        let from = |block: &Map<String, Value>| {
            block
                .get("endLocation")
                .filter(|v| truthy(Some(*v)))
                .and_then(|v| v.as_object())
                .map(|loc| (coord(loc.get("x")), coord(loc.get("y"))))
        };
        from(&self.pass).or_else(|| from(&self.carry))
    }

    pub fn player_name(&self) -> Option<&str> {
        self.player
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn shot_xg(&self) -> f64 {
        self.shot.get("xg").and_then(|v| v.as_f64()).unwrap_or(0.0)
    }

    pub fn shot_is_goal(&self) -> bool {
        self.shot.get("isGoal").and_then(|v| v.as_bool()) == Some(true)
    }
}

pub fn read_events_csv(path: &Path, required: &[&str]) -> Result<Vec<RawEvent>> {
    let file = fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    read_events(file, required).with_context(|| format!("read events {}", path.display()))
}

/// Read a flattened event table. Missing required columns are fatal.
pub fn read_events<R: Read>(rdr: R, required: &[&str]) -> Result<Vec<RawEvent>> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(rdr);
    let headers = reader.headers().context("read csv header")?.clone();
    let columns: Vec<&str> = headers.iter().collect();
    for name in required {
        if !columns.contains(name) {
            return Err(SchemaError::MissingColumn {
                column: (*name).to_string(),
                context: "event table".to_string(),
            }
            .into());
        }
    }

    let mut out = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("decode event row {}", idx + 1))?;
        let event = RawEvent::from_cells(|name| {
            headers
                .iter()
                .position(|h| h == name)
                .and_then(|pos| record.get(pos))
        });
        out.push(event);
    }
    Ok(out)
}

fn coord(v: Option<&Value>) -> f64 {
    v.and_then(|v| v.as_f64()).filter(|v| v.is_finite()).unwrap_or(0.0)
}

fn parse_i64_text(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Some(n);
    }
    let f = trimmed.parse::<f64>().ok()?;
    if f.is_finite() { Some(f as i64) } else { None }
}

fn as_i64_any(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    if let Some(f) = v.as_f64() {
        return Some(f as i64);
    }
    parse_i64_text(v.as_str()?)
}
