use crate::frame::{Cell, ColumnSpec, Frame};
use crate::spadl::Action;

pub const SCORES: &str = "scores";
pub const CONCEDES: &str = "concedes";

/// Whether action `i`'s team (or, for `concedes`, the other team) scores in
/// actions `i..i + horizon`, stopping at the end of the game period.
fn lookahead(actions: &[Action], horizon: usize, same_team: bool) -> Vec<bool> {
    let n = actions.len();
    let mut out = vec![false; n];
    for (i, a) in actions.iter().enumerate() {
        let mut j = i;
        while j < n && j < i + horizon {
            let b = &actions[j];
            if b.game_id != a.game_id || b.period_id != a.period_id {
                break;
            }
            if b.is_goal() && (b.team_id == a.team_id) == same_team {
                out[i] = true;
                break;
            }
            j += 1;
        }
    }
    out
}

pub fn scores(actions: &[Action], horizon: usize) -> Vec<bool> {
    lookahead(actions, horizon, true)
}

pub fn concedes(actions: &[Action], horizon: usize) -> Vec<bool> {
    lookahead(actions, horizon, false)
}

/// Both label columns as a frame, one row per action.
pub fn compute_labels(actions: &[Action], horizon: usize) -> Frame {
    let s = scores(actions, horizon);
    let c = concedes(actions, horizon);
    let mut frame = Frame::new(vec![ColumnSpec::numeric(SCORES), ColumnSpec::numeric(CONCEDES)]);
    for (s, c) in s.into_iter().zip(c) {
        frame.push_row(vec![Cell::flag(s), Cell::flag(c)]);
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spadl::{ActionResult, ActionType, BodyPart};

    fn action(period_id: u8, team_id: i64, goal: bool) -> Action {
        Action {
            game_id: 1,
            period_id,
            time_seconds: 0.0,
            team_id,
            start_x: 0.0,
            start_y: 0.0,
            end_x: 0.0,
            end_y: 0.0,
            action_type: if goal { ActionType::Shot } else { ActionType::Other },
            result: ActionResult::Success,
            bodypart: BodyPart::Other,
        }
    }

    #[test]
    fn goal_marks_scoring_and_conceding_sides() {
        let actions = vec![
            action(1, 1, false),
            action(1, 2, false),
            action(1, 1, true),
            action(1, 2, false),
        ];
        assert_eq!(scores(&actions, 10), vec![true, false, true, false]);
        assert_eq!(concedes(&actions, 10), vec![false, true, false, false]);
    }

    #[test]
    fn horizon_counts_the_action_itself() {
        let actions = vec![action(1, 1, false), action(1, 1, false), action(1, 1, true)];
        assert_eq!(scores(&actions, 2), vec![false, true, true]);
        assert_eq!(scores(&actions, 1), vec![false, false, true]);
    }

    #[test]
    fn lookahead_stops_at_period_end() {
        let actions = vec![action(1, 1, false), action(2, 1, true)];
        assert_eq!(scores(&actions, 10), vec![false, true]);
    }

    #[test]
    fn failed_shot_is_not_a_goal() {
        let mut miss = action(1, 1, true);
        miss.result = ActionResult::Fail;
        assert_eq!(scores(&[miss], 10), vec![false]);
    }

    #[test]
    fn label_frame_has_two_flag_columns() {
        let frame = compute_labels(&[action(1, 1, true)], 10);
        assert_eq!(frame.column_names(), vec![SCORES, CONCEDES]);
        assert_eq!(frame.rows[0], vec![Cell::Num(1.0), Cell::Num(0.0)]);
    }
}
