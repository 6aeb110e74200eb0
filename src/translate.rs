use serde_json::Value;

use crate::events::RawEvent;
use crate::literal::truthy;
use crate::spadl::{Action, ActionResult, ActionType, BodyPart, PITCH_LENGTH, PITCH_WIDTH};

const X_SCALE: f64 = PITCH_LENGTH / 100.0;
const Y_SCALE: f64 = PITCH_WIDTH / 100.0;
/// Distance a won defensive action is assumed to move the ball upfield.
const DEFENSIVE_CARRY_METRES: f64 = 10.0;
const DEFENSIVE_DUEL_TOKENS: [&str; 4] = ["recoveredpossession", "stoppedprogress", "win", "success"];

/// Translate a whole event table; one action per event, order preserved.
pub fn translate_all(events: &[RawEvent]) -> Vec<Action> {
    events.iter().map(translate).collect()
}

/// Map one provider event onto the action schema. Never fails: unknown
/// patterns fall back to `ActionType::Other` with a failed result.
pub fn translate(event: &RawEvent) -> Action {
    let primary = event.primary();
    let action_type = classify_type(event, &primary);
    let result = ActionResult::from_success(classify_success(event, &primary, action_type));

    let (raw_x, raw_y) = event.raw_location();
    let start_x = scale_x(raw_x);
    let start_y = scale_y(raw_y);

    let (end_x, end_y) = match event.raw_end_location() {
        Some((x, y)) => (scale_x(x), scale_y(y)),
        None if result == ActionResult::Success && action_type.is_defensive() => {
            ((start_x + DEFENSIVE_CARRY_METRES).min(PITCH_LENGTH), start_y)
        }
        None => (start_x, start_y),
    };

    let bodypart = if event.has_secondary("head_pass") {
        BodyPart::Head
    } else {
        BodyPart::Other
    };

    Action {
        game_id: event.match_id,
        period_id: period_id(event.match_period.as_deref()),
        time_seconds: event.second,
        team_id: event.team.id,
        start_x,
        start_y,
        end_x,
        end_y,
        action_type,
        result,
        bodypart,
    }
}

fn classify_type(event: &RawEvent, primary: &str) -> ActionType {
    if !event.shot.is_empty() {
        return ActionType::Shot;
    }
    match primary {
        "clearance" => ActionType::Clearance,
        "interception" => ActionType::Interception,
        "duel" => {
            if event.has_secondary("defensive_duel") {
                ActionType::DefensiveDuel
            } else if event.has_secondary("offensive_duel") {
                ActionType::OffensiveDuel
            } else {
                ActionType::DefensiveDuel
            }
        }
        "touch" if event.has_secondary("carry") => ActionType::Carry,
        _ => ActionType::Other,
    }
}

fn classify_success(event: &RawEvent, primary: &str, action_type: ActionType) -> bool {
    if primary == "interception" || primary == "clearance" {
        return true;
    }
    match action_type {
        ActionType::DefensiveDuel => {
            let serialized = Value::Object(event.ground_duel.clone())
                .to_string()
                .to_lowercase();
            DEFENSIVE_DUEL_TOKENS
                .iter()
                .any(|token| serialized.contains(token))
                || event.type_success()
                // Ball out of play or a neutral outcome still counts for the defender.
                || event.has_secondary("out")
                || event.has_secondary("neutral")
        }
        ActionType::OffensiveDuel => {
            truthy(event.ground_duel.get("progressedWithBall"))
                || truthy(event.ground_duel.get("keptPossession"))
        }
        _ => {
            truthy(event.shot.get("isGoal"))
                || truthy(event.shot.get("onTarget"))
                || truthy(event.pass.get("accurate"))
                || event.type_success()
        }
    }
}

fn period_id(raw: Option<&str>) -> u8 {
    match raw.map(str::trim) {
        Some("2H") => 2,
        _ => 1,
    }
}

fn scale_x(raw: f64) -> f64 {
    (raw * X_SCALE).clamp(0.0, PITCH_LENGTH)
}

fn scale_y(raw: f64) -> f64 {
    (raw * Y_SCALE).clamp(0.0, PITCH_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::safe_parse;

    fn event(type_block: &str) -> RawEvent {
        RawEvent {
            match_id: 10,
            match_period: Some("1H".to_string()),
            second: 5.0,
            type_block: safe_parse(type_block),
            location: safe_parse("{'x': 40, 'y': 30}"),
            ..RawEvent::default()
        }
    }

    #[test]
    fn shot_block_outranks_primary_tag() {
        let mut e = event("{'primary': 'clearance', 'secondary': []}");
        e.shot = safe_parse("{'isGoal': False, 'onTarget': False}");
        let action = translate(&e);
        assert_eq!(action.action_type, ActionType::Shot);
        // The clearance tag still marks the result as successful.
        assert_eq!(action.result, ActionResult::Success);
    }

    #[test]
    fn defensive_duel_win_token_is_success() {
        let mut e = event("{'primary': 'duel', 'secondary': ['defensive_duel']}");
        e.ground_duel = safe_parse("{'duelType': 'defensive_duel', 'outcome': 'win'}");
        let action = translate(&e);
        assert_eq!(action.type_id(), 9);
        assert_eq!(action.result_id(), 1);
        // Synthesized end location 10m upfield.
        assert!((action.start_x - 42.0).abs() < 1e-9);
        assert!((action.end_x - 52.0).abs() < 1e-9);
        assert_eq!(action.end_y, action.start_y);
    }

    #[test]
    fn defensive_duel_out_of_play_counts_as_success() {
        let e = event("{'primary': 'duel', 'secondary': ['defensive_duel', 'out']}");
        assert_eq!(translate(&e).result, ActionResult::Success);

        let lost = event("{'primary': 'duel', 'secondary': ['defensive_duel']}");
        let action = translate(&lost);
        assert_eq!(action.result, ActionResult::Fail);
        assert_eq!(action.end_x, action.start_x);
    }

    #[test]
    fn untagged_duel_defaults_to_defensive() {
        let e = event("{'primary': 'duel', 'secondary': ['ground_duel']}");
        assert_eq!(translate(&e).action_type, ActionType::DefensiveDuel);
    }

    #[test]
    fn offensive_duel_needs_progress_or_possession() {
        let mut e = event("{'primary': 'duel', 'secondary': ['offensive_duel']}");
        e.ground_duel = safe_parse("{'progressedWithBall': False, 'keptPossession': True}");
        let action = translate(&e);
        assert_eq!(action.action_type, ActionType::OffensiveDuel);
        assert!(action.is_success());
    }

    #[test]
    fn carry_uses_carry_end_location() {
        let mut e = event("{'primary': 'touch', 'secondary': ['carry']}");
        e.carry = safe_parse("{'endLocation': {'x': 100, 'y': 100}}");
        let action = translate(&e);
        assert_eq!(action.action_type, ActionType::Carry);
        assert_eq!(action.end_x, 105.0);
        assert_eq!(action.end_y, 68.0);
    }

    #[test]
    fn interception_near_goal_line_is_clamped() {
        let mut e = event("{'primary': 'interception', 'secondary': []}");
        e.location = safe_parse("{'x': 98, 'y': 10}");
        let action = translate(&e);
        assert!(action.is_success());
        assert_eq!(action.end_x, PITCH_LENGTH);
    }

    #[test]
    fn accurate_pass_and_head_flag() {
        let mut e = event("{'primary': 'pass', 'secondary': ['head_pass']}");
        e.pass = safe_parse("{'accurate': True, 'endLocation': {'x': 60, 'y': 40}}");
        let action = translate(&e);
        assert_eq!(action.action_type, ActionType::Other);
        assert!(action.is_success());
        assert_eq!(action.bodypart, BodyPart::Head);
        assert!((action.end_x - 63.0).abs() < 1e-9);
        assert!((action.end_y - 27.2).abs() < 1e-9);
    }

    #[test]
    fn unknown_period_defaults_to_first() {
        let mut e = event("{}");
        e.match_period = Some("E1".to_string());
        assert_eq!(translate(&e).period_id, 1);
        e.match_period = Some("2H".to_string());
        assert_eq!(translate(&e).period_id, 2);
        e.match_period = None;
        assert_eq!(translate(&e).period_id, 1);
    }
}
