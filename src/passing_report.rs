use serde::Serialize;
use serde_json::Value;

use crate::events::RawEvent;

pub const PASSING_FILE: &str = "michigan_passing_distribution.csv";

pub const PASSING_COLUMNS: [&str; 5] = ["matchId", "team", "opponentTeam", "type", "location"];

const DEFENSIVE_THIRD_END: f64 = 33.0;
const MIDDLE_THIRD_END: f64 = 67.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassingRow {
    #[serde(rename = "Opponent")]
    pub opponent: String,
    #[serde(rename = "Total Passes")]
    pub total_passes: usize,
    #[serde(rename = "Def Dist %")]
    pub def_pct: f64,
    #[serde(rename = "Mid Dist %")]
    pub mid_pct: f64,
    #[serde(rename = "Att Dist %")]
    pub att_pct: f64,
}

/// Where on the pitch `team_label` passed from, per match, as shares of its
/// passes. Raw provider x (0-100) is split into thirds; passes without a
/// location count toward the total only.
pub fn passes_by_match(events: &[RawEvent], team_label: &str) -> Vec<PassingRow> {
    let mut order: Vec<i64> = Vec::new();
    let mut per_match: Vec<(String, [usize; 3], usize)> = Vec::new();

    for e in events {
        if e.primary() != "pass" || e.team.name.as_deref() != Some(team_label) {
            continue;
        }
        let slot = match order.iter().position(|id| *id == e.match_id) {
            Some(slot) => slot,
            None => {
                order.push(e.match_id);
                per_match.push((
                    e.opponent_team.name.clone().unwrap_or_default(),
                    [0; 3],
                    0,
                ));
                order.len() - 1
            }
        };
        let (_, zones, total) = &mut per_match[slot];
        *total += 1;
        if let Some(x) = e.location.get("x").and_then(Value::as_f64) {
            let zone = if x < DEFENSIVE_THIRD_END {
                0
            } else if x < MIDDLE_THIRD_END {
                1
            } else {
                2
            };
            zones[zone] += 1;
        }
    }

    per_match
        .into_iter()
        .map(|(opponent, zones, total)| {
            let pct = |n: usize| n as f64 / total as f64 * 100.0;
            PassingRow {
                opponent,
                total_passes: total,
                def_pct: pct(zones[0]),
                mid_pct: pct(zones[1]),
                att_pct: pct(zones[2]),
            }
        })
        .collect()
}
