use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::events::RawEvent;

pub const LEAGUE_XG_FILE: &str = "big10_xg.csv";
pub const FORMATION_XG_FILE: &str = "michigan_formation_stats.csv";

/// Columns the xG reports read from an event table.
pub const XG_COLUMNS: [&str; 5] = ["matchId", "team", "opponentTeam", "type", "shot"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamXg {
    #[serde(rename = "Team")]
    pub team: String,
    #[serde(rename = "xG_For_Per_Game")]
    pub xg_for_per_game: f64,
    #[serde(rename = "xG_Against_Per_Game")]
    pub xg_against_per_game: f64,
    #[serde(rename = "Total_xG_For")]
    pub total_xg_for: f64,
    #[serde(rename = "Total_G_For")]
    pub total_g_for: u32,
    #[serde(rename = "Total_xG_Against")]
    pub total_xg_against: f64,
    #[serde(rename = "Total_G_Against")]
    pub total_g_against: u32,
    #[serde(rename = "Games_Played")]
    pub games_played: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormationXg {
    #[serde(rename = "Formation")]
    pub formation: String,
    #[serde(rename = "Adj_xG_For_Per_Game")]
    pub adj_xg_for_per_game: f64,
    #[serde(rename = "Adj_xG_Against_Per_Game")]
    pub adj_xg_against_per_game: f64,
    #[serde(rename = "xG_For_Per_Game")]
    pub xg_for_per_game: f64,
    #[serde(rename = "xG_Against_Per_Game")]
    pub xg_against_per_game: f64,
    #[serde(rename = "Total_xG_For")]
    pub total_xg_for: f64,
    #[serde(rename = "Total_G_For")]
    pub total_g_for: u32,
    #[serde(rename = "Total_xG_Against")]
    pub total_xg_against: f64,
    #[serde(rename = "Total_G_Against")]
    pub total_g_against: u32,
    #[serde(rename = "Games_Played")]
    pub games_played: usize,
}

#[derive(Default)]
struct ShotTotals {
    xg: f64,
    goals: u32,
}

/// Shot xG and goals for and against every team, per game. Only teams that
/// both took and faced shots are reported.
pub fn team_xg_summary(events: &[RawEvent]) -> Vec<TeamXg> {
    let mut shots_for: BTreeMap<&str, ShotTotals> = BTreeMap::new();
    let mut shots_against: BTreeMap<&str, ShotTotals> = BTreeMap::new();
    let mut games: HashMap<&str, BTreeSet<i64>> = HashMap::new();

    for e in events {
        if let Some(team) = e.team.name.as_deref() {
            games.entry(team).or_default().insert(e.match_id);
        }
        if e.primary() != "shot" {
            continue;
        }
        let xg = e.shot_xg();
        let goal = u32::from(e.shot_is_goal());
        if let Some(team) = e.team.name.as_deref() {
            let t = shots_for.entry(team).or_default();
            t.xg += xg;
            t.goals += goal;
        }
        if let Some(opp) = e.opponent_team.name.as_deref() {
            let t = shots_against.entry(opp).or_default();
            t.xg += xg;
            t.goals += goal;
        }
    }

    shots_for
        .iter()
        .filter_map(|(team, f)| {
            let against = shots_against.get(team)?;
            let played = games.get(team)?.len();
            Some(TeamXg {
                team: team.to_string(),
                xg_for_per_game: f.xg / played as f64,
                xg_against_per_game: against.xg / played as f64,
                total_xg_for: f.xg,
                total_g_for: f.goals,
                total_xg_against: against.xg,
                total_g_against: against.goals,
                games_played: played,
            })
        })
        .collect()
}

#[derive(Default)]
struct FormationTotals {
    adj_xg: f64,
    xg: f64,
    goals: u32,
}

/// Opponent-adjusted xG for and against `team_label`, per formation used.
/// Each shot is scaled by how the opponent compares with the league mean.
pub fn formation_xg(events: &[RawEvent], league: &[TeamXg], team_label: &str) -> Vec<FormationXg> {
    let n = league.len().max(1) as f64;
    let mean_for = league.iter().map(|t| t.xg_for_per_game).sum::<f64>() / n;
    let mean_against = league.iter().map(|t| t.xg_against_per_game).sum::<f64>() / n;
    let by_team: HashMap<&str, &TeamXg> = league.iter().map(|t| (t.team.as_str(), t)).collect();

    let mut for_by_form: BTreeMap<&str, FormationTotals> = BTreeMap::new();
    let mut against_by_form: BTreeMap<&str, FormationTotals> = BTreeMap::new();
    let mut games_by_form: BTreeMap<&str, BTreeSet<i64>> = BTreeMap::new();

    for e in events {
        let xg = e.shot_xg();
        let goal = u32::from(e.shot_is_goal());
        let is_team = e.team.name.as_deref() == Some(team_label);

        if is_team {
            let Some(formation) = e.team.formation.as_deref() else {
                continue;
            };
            games_by_form.entry(formation).or_default().insert(e.match_id);
            let opp_def = e
                .opponent_team
                .name
                .as_deref()
                .and_then(|o| by_team.get(o))
                .map(|t| t.xg_against_per_game);
            let t = for_by_form.entry(formation).or_default();
            t.adj_xg += adjusted(xg, opp_def, mean_against);
            t.xg += xg;
            t.goals += goal;
        } else {
            let Some(formation) = e.opponent_team.formation.as_deref() else {
                continue;
            };
            let opp_off = e
                .team
                .name
                .as_deref()
                .and_then(|o| by_team.get(o))
                .map(|t| t.xg_for_per_game);
            let t = against_by_form.entry(formation).or_default();
            t.adj_xg += adjusted(xg, opp_off, mean_for);
            t.xg += xg;
            t.goals += goal;
        }
    }

    games_by_form
        .iter()
        .map(|(formation, games)| {
            let played = games.len();
            let g = played as f64;
            let empty = FormationTotals::default();
            let f = for_by_form.get(formation).unwrap_or(&empty);
            let a = against_by_form.get(formation).unwrap_or(&empty);
            FormationXg {
                formation: formation.to_string(),
                adj_xg_for_per_game: f.adj_xg / g,
                adj_xg_against_per_game: a.adj_xg / g,
                xg_for_per_game: f.xg / g,
                xg_against_per_game: a.xg / g,
                total_xg_for: f.xg,
                total_g_for: f.goals,
                total_xg_against: a.xg,
                total_g_against: a.goals,
                games_played: played,
            }
        })
        .collect()
}

/// `xg / (opponent_rate / league_mean)`; unknown opponents contribute nothing.
fn adjusted(xg: f64, opponent_rate: Option<f64>, league_mean: f64) -> f64 {
    let Some(rate) = opponent_rate else {
        return 0.0;
    };
    let v = xg / (rate / league_mean);
    if v.is_finite() { v } else { 0.0 }
}

pub fn write_csv<T: Serialize>(rows: &[T], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
    }
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    for row in rows {
        writer.serialize(row).context("write report row")?;
    }
    writer.flush().context("flush report csv")?;
    Ok(())
}

pub fn read_league_xg(path: &Path) -> Result<Vec<TeamXg>> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("open {}", path.display()))?;
    let mut out = Vec::new();
    for row in reader.deserialize() {
        out.push(row.with_context(|| format!("decode league xg row in {}", path.display()))?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::safe_parse;
    use assert_float_eq::assert_float_absolute_eq;

    fn shot(match_id: i64, team: &str, form: &str, opp: &str, opp_form: &str, xg: f64, goal: bool) -> RawEvent {
        let match_raw = match_id.to_string();
        let team_raw = format!("{{'id': 1, 'name': '{team}', 'formation': '{form}'}}");
        let opp_raw = format!("{{'id': 2, 'name': '{opp}', 'formation': '{opp_form}'}}");
        let goal = if goal { "True" } else { "False" };
        let shot_raw = format!("{{'xg': {xg}, 'isGoal': {goal}}}");
        RawEvent::from_cells(|name| match name {
            "matchId" => Some(match_raw.as_str()),
            "team" => Some(team_raw.as_str()),
            "opponentTeam" => Some(opp_raw.as_str()),
            "type" => Some("{'primary': 'shot', 'secondary': []}"),
            "shot" => Some(shot_raw.as_str()),
            _ => None,
        })
    }

    fn pass(match_id: i64, team: &str, form: &str, opp: &str) -> RawEvent {
        let mut e = shot(match_id, team, form, opp, "4-4-2", 0.0, false);
        e.type_block = safe_parse("{'primary': 'pass'}");
        e.shot.clear();
        e
    }

    fn season() -> Vec<RawEvent> {
        vec![
            shot(1, "Michigan Wolverines", "4-3-3", "Ohio State", "4-4-2", 0.4, true),
            shot(1, "Ohio State", "4-4-2", "Michigan Wolverines", "4-3-3", 0.2, false),
            shot(2, "Michigan Wolverines", "3-5-2", "Indiana", "4-2-3-1", 0.1, false),
            shot(2, "Indiana", "4-2-3-1", "Michigan Wolverines", "3-5-2", 0.3, true),
            pass(3, "Maryland", "4-4-2", "Indiana"),
        ]
    }

    #[test]
    fn summary_joins_for_and_against() {
        let summary = team_xg_summary(&season());
        let names: Vec<&str> = summary.iter().map(|t| t.team.as_str()).collect();
        // Maryland never shot or faced a shot.
        assert_eq!(names, vec!["Indiana", "Michigan Wolverines", "Ohio State"]);

        let mich = &summary[1];
        assert_eq!(mich.games_played, 2);
        assert_float_absolute_eq!(mich.total_xg_for, 0.5, 1e-12);
        assert_float_absolute_eq!(mich.total_xg_against, 0.5, 1e-12);
        assert_eq!((mich.total_g_for, mich.total_g_against), (1, 1));
        assert_float_absolute_eq!(mich.xg_for_per_game, 0.25, 1e-12);
    }

    #[test]
    fn formation_xg_scales_by_opponent_strength() {
        let events = season();
        let league = team_xg_summary(&events);
        let rows = formation_xg(&events, &league, "Michigan Wolverines");
        assert_eq!(rows.len(), 2);
        let f433 = rows.iter().find(|r| r.formation == "4-3-3").unwrap();
        assert_eq!(f433.games_played, 1);
        assert_float_absolute_eq!(f433.total_xg_for, 0.4, 1e-12);
        assert_float_absolute_eq!(f433.total_xg_against, 0.2, 1e-12);

        let mean_against = league.iter().map(|t| t.xg_against_per_game).sum::<f64>() / 3.0;
        let ohio = league.iter().find(|t| t.team == "Ohio State").unwrap();
        assert_float_absolute_eq!(
            f433.adj_xg_for_per_game,
            0.4 / (ohio.xg_against_per_game / mean_against),
            1e-12
        );
    }

    #[test]
    fn unknown_opponent_contributes_nothing() {
        assert_eq!(adjusted(0.5, None, 1.0), 0.0);
        assert_eq!(adjusted(0.5, Some(0.0), 1.0), 0.0);
        assert_float_absolute_eq!(adjusted(0.5, Some(2.0), 1.0), 0.25, 1e-12);
    }

    #[test]
    fn league_file_round_trips_through_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LEAGUE_XG_FILE);
        let summary = team_xg_summary(&season());
        write_csv(&summary, &path).unwrap();
        let header = fs::read_to_string(&path).unwrap();
        assert!(header.starts_with(
            "Team,xG_For_Per_Game,xG_Against_Per_Game,Total_xG_For,Total_G_For,Total_xG_Against,Total_G_Against,Games_Played"
        ));
        assert_eq!(read_league_xg(&path).unwrap(), summary);
    }
}
