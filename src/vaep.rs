use std::collections::HashMap;

use serde::Serialize;

use crate::frame::{Frame, SchemaError};
use crate::labels::{CONCEDES, SCORES};
use crate::spadl::{Action, HALFWAY_X, NamedAction, split_games};

/// Consecutive actions further apart than this are treated as separate phases.
const SAME_PHASE_SECONDS: f64 = 10.0;
/// Successful defensive actions never cost more than this.
pub const DEFENSIVE_FLOOR: f64 = -0.005;
/// Added to successful defensive actions in the defending team's own half.
pub const OWN_HALF_BONUS: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ActionValue {
    pub offensive_value: f64,
    pub defensive_value: f64,
    pub vaep_value: f64,
}

impl ActionValue {
    fn new(offensive_value: f64, defensive_value: f64) -> Self {
        Self {
            offensive_value,
            defensive_value,
            vaep_value: offensive_value + defensive_value,
        }
    }
}

/// Probability-difference values for an ordered action table. Each game is
/// valued on its own; the first action of a game is its own predecessor.
pub fn value(actions: &[Action], p_scores: &[f64], p_concedes: &[f64]) -> Vec<ActionValue> {
    let mut out = Vec::with_capacity(actions.len());
    let mut offset = 0usize;
    for game in split_games(actions) {
        let end = offset + game.len();
        out.extend(value_game(
            game,
            &p_scores[offset..end],
            &p_concedes[offset..end],
        ));
        offset = end;
    }
    out
}

fn value_game(actions: &[Action], p_scores: &[f64], p_concedes: &[f64]) -> Vec<ActionValue> {
    (0..actions.len())
        .map(|i| {
            let prev_idx = i.saturating_sub(1);
            let prev = &actions[prev_idx];
            let current = &actions[i];

            let (mut prev_scores, mut prev_concedes) = if prev.team_id == current.team_id {
                (p_scores[prev_idx], p_concedes[prev_idx])
            } else {
                (p_concedes[prev_idx], p_scores[prev_idx])
            };
            // A long pause or a goal resets the game state.
            if (current.time_seconds - prev.time_seconds).abs() > SAME_PHASE_SECONDS
                || prev.is_goal()
            {
                prev_scores = 0.0;
                prev_concedes = 0.0;
            }

            let offensive = p_scores[i] - prev_scores;
            let defensive = -(p_concedes[i] - prev_concedes);
            ActionValue::new(offensive, defensive)
        })
        .collect()
}

/// Floor and own-half bonus for successful defensive actions; other actions
/// pass through unchanged.
pub fn corrected_defensive_value(action: &Action, defensive_value: f64) -> f64 {
    if !action.is_successful_defensive() {
        return defensive_value;
    }
    let mut v = defensive_value.max(DEFENSIVE_FLOOR);
    if action.start_x < HALFWAY_X {
        v += OWN_HALF_BONUS;
    }
    v
}

pub fn apply_corrections(actions: &[Action], values: &mut [ActionValue]) {
    for (action, v) in actions.iter().zip(values.iter_mut()) {
        *v = ActionValue::new(
            v.offensive_value,
            corrected_defensive_value(action, v.defensive_value),
        );
    }
}

/// Value every action from a prediction frame with `scores` and `concedes`
/// columns, then apply the defensive corrections.
pub fn value_actions(actions: &[Action], predictions: &Frame) -> Result<Vec<ActionValue>, SchemaError> {
    if predictions.n_rows() != actions.len() {
        return Err(SchemaError::RowCount {
            context: "actions vs predictions".to_string(),
            left: actions.len(),
            right: predictions.n_rows(),
        });
    }
    let p_scores = predictions.numeric_column(SCORES)?;
    let p_concedes = predictions.numeric_column(CONCEDES)?;
    let mut values = value(actions, &p_scores, &p_concedes);
    apply_corrections(actions, &mut values);
    Ok(values)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerAggregate {
    pub player_name: String,
    pub vaep_value: f64,
    pub offensive_value: f64,
    pub defensive_value: f64,
    pub action_count: usize,
}

/// Per-player sums, best first; equal totals order by name.
pub fn aggregate_players(actions: &[NamedAction], values: &[ActionValue]) -> Vec<PlayerAggregate> {
    let mut by_name: HashMap<&str, PlayerAggregate> = HashMap::new();
    for (a, v) in actions.iter().zip(values) {
        let entry = by_name
            .entry(a.player_name.as_str())
            .or_insert_with(|| PlayerAggregate {
                player_name: a.player_name.clone(),
                vaep_value: 0.0,
                offensive_value: 0.0,
                defensive_value: 0.0,
                action_count: 0,
            });
        entry.vaep_value += v.vaep_value;
        entry.offensive_value += v.offensive_value;
        entry.defensive_value += v.defensive_value;
        entry.action_count += 1;
    }

    let mut out: Vec<PlayerAggregate> = by_name.into_values().collect();
    out.sort_by(|a, b| {
        b.vaep_value
            .total_cmp(&a.vaep_value)
            .then_with(|| a.player_name.cmp(&b.player_name))
    });
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub player_name: String,
    pub type_name: &'static str,
    pub start_x: f64,
    pub start_y: f64,
    pub defensive_value: f64,
}

/// The `n` lowest defensive values among successful defensive actions.
pub fn defensive_audit(actions: &[NamedAction], values: &[ActionValue], n: usize) -> Vec<AuditEntry> {
    let mut entries: Vec<AuditEntry> = actions
        .iter()
        .zip(values)
        .filter(|(a, _)| a.action.is_successful_defensive())
        .map(|(a, v)| AuditEntry {
            player_name: a.player_name.clone(),
            type_name: a.action.action_type.name(),
            start_x: a.action.start_x,
            start_y: a.action.start_y,
            defensive_value: v.defensive_value,
        })
        .collect();
    entries.sort_by(|a, b| a.defensive_value.total_cmp(&b.defensive_value));
    entries.truncate(n);
    entries
}
