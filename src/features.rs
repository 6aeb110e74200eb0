use crate::frame::{Cell, ColumnKind, ColumnSpec, Frame};
use crate::gamestate::{Gamestate, gamestates};
use crate::spadl::{Action, ActionResult, ActionType, BodyPart, GOAL_X, GOAL_Y};

/// One entry of the feature registry: a pure function from a gamestate to a
/// fixed, named group of columns.
pub trait FeatureExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Output columns for windows of `window` actions, in emission order.
    fn columns(&self, window: usize) -> Vec<ColumnSpec>;

    /// Append this extractor's cells for `state`; must match `columns`.
    fn extract(&self, state: &Gamestate<'_>, out: &mut Vec<Cell>);
}

/// A feature computed from one action at a time. Wrapped in [`PerAction`]
/// it is evaluated for every action of the window and suffixed `_a{i}`.
pub trait ActionFeature: Send + Sync {
    fn name(&self) -> &'static str;
    fn base_columns(&self) -> Vec<ColumnSpec>;
    fn values(&self, action: &Action, out: &mut Vec<Cell>);
}

pub struct PerAction<F>(pub F);

impl<F: ActionFeature> FeatureExtractor for PerAction<F> {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn columns(&self, window: usize) -> Vec<ColumnSpec> {
        let base = self.0.base_columns();
        (0..window)
            .flat_map(|i| {
                base.iter().map(move |c| ColumnSpec {
                    name: format!("{}_a{i}", c.name),
                    kind: c.kind,
                })
            })
            .collect()
    }

    fn extract(&self, state: &Gamestate<'_>, out: &mut Vec<Cell>) {
        for action in state.iter() {
            self.0.values(action, out);
        }
    }
}

pub struct ActionTypeCategory;
pub struct ActionTypeOneHot;
pub struct BodyPartCategory;
pub struct BodyPartOneHot;
pub struct ResultCategory;
pub struct ResultOneHot;
pub struct StartLocation;
pub struct EndLocation;
pub struct Movement;
pub struct StartPolar;
pub struct EndPolar;

impl ActionFeature for ActionTypeCategory {
    fn name(&self) -> &'static str {
        "actiontype"
    }
    fn base_columns(&self) -> Vec<ColumnSpec> {
        vec![ColumnSpec::categorical("actiontype")]
    }
    fn values(&self, action: &Action, out: &mut Vec<Cell>) {
        out.push(Cell::Cat(action.action_type.name().to_string()));
    }
}

impl ActionFeature for ActionTypeOneHot {
    fn name(&self) -> &'static str {
        "actiontype_onehot"
    }
    fn base_columns(&self) -> Vec<ColumnSpec> {
        ActionType::ALL
            .iter()
            .map(|t| ColumnSpec::numeric(format!("actiontype_{}", t.name())))
            .collect()
    }
    fn values(&self, action: &Action, out: &mut Vec<Cell>) {
        out.extend(ActionType::ALL.iter().map(|t| Cell::flag(*t == action.action_type)));
    }
}

impl ActionFeature for BodyPartCategory {
    fn name(&self) -> &'static str {
        "bodypart"
    }
    fn base_columns(&self) -> Vec<ColumnSpec> {
        vec![ColumnSpec::categorical("bodypart")]
    }
    fn values(&self, action: &Action, out: &mut Vec<Cell>) {
        out.push(Cell::Cat(action.bodypart.name().to_string()));
    }
}

impl ActionFeature for BodyPartOneHot {
    fn name(&self) -> &'static str {
        "bodypart_onehot"
    }
    fn base_columns(&self) -> Vec<ColumnSpec> {
        BodyPart::ALL
            .iter()
            .map(|b| ColumnSpec::numeric(format!("bodypart_{}", b.name())))
            .collect()
    }
    fn values(&self, action: &Action, out: &mut Vec<Cell>) {
        out.extend(BodyPart::ALL.iter().map(|b| Cell::flag(*b == action.bodypart)));
    }
}

impl ActionFeature for ResultCategory {
    fn name(&self) -> &'static str {
        "result"
    }
    fn base_columns(&self) -> Vec<ColumnSpec> {
        vec![ColumnSpec::categorical("result")]
    }
    fn values(&self, action: &Action, out: &mut Vec<Cell>) {
        out.push(Cell::Cat(action.result.name().to_string()));
    }
}

impl ActionFeature for ResultOneHot {
    fn name(&self) -> &'static str {
        "result_onehot"
    }
    fn base_columns(&self) -> Vec<ColumnSpec> {
        ActionResult::ALL
            .iter()
            .map(|r| ColumnSpec::numeric(format!("result_{}", r.name())))
            .collect()
    }
    fn values(&self, action: &Action, out: &mut Vec<Cell>) {
        out.extend(ActionResult::ALL.iter().map(|r| Cell::flag(*r == action.result)));
    }
}

impl ActionFeature for StartLocation {
    fn name(&self) -> &'static str {
        "startlocation"
    }
    fn base_columns(&self) -> Vec<ColumnSpec> {
        vec![ColumnSpec::numeric("start_x"), ColumnSpec::numeric("start_y")]
    }
    fn values(&self, action: &Action, out: &mut Vec<Cell>) {
        out.push(Cell::Num(action.start_x));
        out.push(Cell::Num(action.start_y));
    }
}

impl ActionFeature for EndLocation {
    fn name(&self) -> &'static str {
        "endlocation"
    }
    fn base_columns(&self) -> Vec<ColumnSpec> {
        vec![ColumnSpec::numeric("end_x"), ColumnSpec::numeric("end_y")]
    }
    fn values(&self, action: &Action, out: &mut Vec<Cell>) {
        out.push(Cell::Num(action.end_x));
        out.push(Cell::Num(action.end_y));
    }
}

impl ActionFeature for Movement {
    fn name(&self) -> &'static str {
        "movement"
    }
    fn base_columns(&self) -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::numeric("dx"),
            ColumnSpec::numeric("dy"),
            ColumnSpec::numeric("movement"),
        ]
    }
    fn values(&self, action: &Action, out: &mut Vec<Cell>) {
        let dx = action.end_x - action.start_x;
        let dy = action.end_y - action.start_y;
        out.push(Cell::Num(dx));
        out.push(Cell::Num(dy));
        out.push(Cell::Num(dx.hypot(dy)));
    }
}

impl ActionFeature for StartPolar {
    fn name(&self) -> &'static str {
        "startpolar"
    }
    fn base_columns(&self) -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::numeric("start_dist_to_goal"),
            ColumnSpec::numeric("start_angle_to_goal"),
        ]
    }
    fn values(&self, action: &Action, out: &mut Vec<Cell>) {
        let (dist, angle) = polar_to_goal(action.start_x, action.start_y);
        out.push(Cell::Num(dist));
        out.push(Cell::Num(angle));
    }
}

impl ActionFeature for EndPolar {
    fn name(&self) -> &'static str {
        "endpolar"
    }
    fn base_columns(&self) -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::numeric("end_dist_to_goal"),
            ColumnSpec::numeric("end_angle_to_goal"),
        ]
    }
    fn values(&self, action: &Action, out: &mut Vec<Cell>) {
        let (dist, angle) = polar_to_goal(action.end_x, action.end_y);
        out.push(Cell::Num(dist));
        out.push(Cell::Num(angle));
    }
}

/// Distance and angle to the centre of the opponent goal. On the goal line
/// the angle is a right angle, or zero when standing in the goal mouth.
fn polar_to_goal(x: f64, y: f64) -> (f64, f64) {
    let dx = (GOAL_X - x).abs();
    let dy = (GOAL_Y - y).abs();
    let angle = if dx > 0.0 {
        (dy / dx).atan()
    } else if dy > 0.0 {
        std::f64::consts::FRAC_PI_2
    } else {
        0.0
    };
    (dx.hypot(dy), angle)
}

/// Running score before the action, from the acting team's point of view.
pub struct GoalScore;

impl FeatureExtractor for GoalScore {
    fn name(&self) -> &'static str {
        "goalscore"
    }

    fn columns(&self, _window: usize) -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::numeric("goalscore_team"),
            ColumnSpec::numeric("goalscore_opponent"),
            ColumnSpec::numeric("goalscore_diff"),
        ]
    }

    fn extract(&self, state: &Gamestate<'_>, out: &mut Vec<Cell>) {
        let team = f64::from(state.team_goals);
        let opponent = f64::from(state.opponent_goals);
        out.push(Cell::Num(team));
        out.push(Cell::Num(opponent));
        out.push(Cell::Num(team - opponent));
    }
}

/// Ball displacement from the end of each earlier action to the start of
/// the current one.
pub struct SpaceDelta;

impl FeatureExtractor for SpaceDelta {
    fn name(&self) -> &'static str {
        "space_delta"
    }

    fn columns(&self, window: usize) -> Vec<ColumnSpec> {
        (1..window)
            .flat_map(|i| {
                [
                    ColumnSpec::numeric(format!("dx_a0{i}")),
                    ColumnSpec::numeric(format!("dy_a0{i}")),
                    ColumnSpec::numeric(format!("mov_a0{i}")),
                ]
            })
            .collect()
    }

    fn extract(&self, state: &Gamestate<'_>, out: &mut Vec<Cell>) {
        let a0 = state.current();
        for a in state.iter().skip(1) {
            let dx = a.end_x - a0.start_x;
            let dy = a.end_y - a0.start_y;
            out.push(Cell::Num(dx));
            out.push(Cell::Num(dy));
            out.push(Cell::Num(dx.hypot(dy)));
        }
    }
}

/// Whether each earlier action was by the same team as the current one.
pub struct Team;

impl FeatureExtractor for Team {
    fn name(&self) -> &'static str {
        "team"
    }

    fn columns(&self, window: usize) -> Vec<ColumnSpec> {
        (1..window)
            .map(|i| ColumnSpec::numeric(format!("team_{i}")))
            .collect()
    }

    fn extract(&self, state: &Gamestate<'_>, out: &mut Vec<Cell>) {
        let a0 = state.current();
        out.extend(state.iter().skip(1).map(|a| Cell::flag(a.team_id == a0.team_id)));
    }
}

/// Seconds elapsed since each earlier action of the window.
pub struct TimeDelta;

impl FeatureExtractor for TimeDelta {
    fn name(&self) -> &'static str {
        "time_delta"
    }

    fn columns(&self, window: usize) -> Vec<ColumnSpec> {
        (1..window)
            .map(|i| ColumnSpec::numeric(format!("time_delta_{i}")))
            .collect()
    }

    fn extract(&self, state: &Gamestate<'_>, out: &mut Vec<Cell>) {
        let a0 = state.current();
        out.extend(
            state
                .iter()
                .skip(1)
                .map(|a| Cell::Num(a0.time_seconds - a.time_seconds)),
        );
    }
}

/// The registry in its fixed order. The feature table schema follows it.
pub fn standard_registry() -> Vec<Box<dyn FeatureExtractor>> {
    vec![
        Box::new(PerAction(ActionTypeCategory)),
        Box::new(PerAction(ActionTypeOneHot)),
        Box::new(PerAction(BodyPartCategory)),
        Box::new(PerAction(BodyPartOneHot)),
        Box::new(PerAction(ResultCategory)),
        Box::new(PerAction(ResultOneHot)),
        Box::new(GoalScore),
        Box::new(PerAction(StartLocation)),
        Box::new(PerAction(EndLocation)),
        Box::new(PerAction(Movement)),
        Box::new(SpaceDelta),
        Box::new(PerAction(StartPolar)),
        Box::new(PerAction(EndPolar)),
        Box::new(Team),
        Box::new(TimeDelta),
    ]
}

/// An ordered registry bound to a window size.
pub struct FeatureSet {
    extractors: Vec<Box<dyn FeatureExtractor>>,
    window: usize,
}

impl FeatureSet {
    pub fn new(extractors: Vec<Box<dyn FeatureExtractor>>, window: usize) -> Self {
        Self {
            extractors,
            window: window.max(1),
        }
    }

    pub fn standard(window: usize) -> Self {
        Self::new(standard_registry(), window)
    }

    pub fn columns(&self) -> Vec<ColumnSpec> {
        self.extractors
            .iter()
            .flat_map(|e| e.columns(self.window))
            .collect()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns().into_iter().map(|c| c.name).collect()
    }

    pub fn row(&self, state: &Gamestate<'_>) -> Vec<Cell> {
        let mut out = Vec::new();
        for extractor in &self.extractors {
            extractor.extract(state, &mut out);
        }
        out
    }

    /// One feature row per action, in input order.
    pub fn compute(&self, actions: &[Action]) -> Frame {
        let mut frame = Frame::new(self.columns());
        for state in gamestates(actions, self.window) {
            frame.push_row(self.row(&state));
        }
        frame
    }
}

/// Columns the models consume when they look `nb_prev_actions` deep.
pub fn feature_column_names(nb_prev_actions: usize) -> Vec<String> {
    FeatureSet::standard(nb_prev_actions).column_names()
}

/// Names of the categorical columns within `columns`.
pub fn categorical_columns(columns: &[ColumnSpec]) -> Vec<String> {
    columns
        .iter()
        .filter(|c| c.kind == ColumnKind::Categorical)
        .map(|c| c.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_float_eq::assert_float_absolute_eq;

    fn action(t: f64, team_id: i64, x: f64, y: f64, kind: ActionType) -> Action {
        Action {
            game_id: 1,
            period_id: 1,
            time_seconds: t,
            team_id,
            start_x: x,
            start_y: y,
            end_x: x + 5.0,
            end_y: y,
            action_type: kind,
            result: ActionResult::Success,
            bodypart: BodyPart::Other,
        }
    }

    #[test]
    fn model_columns_use_current_action_only() {
        let names = feature_column_names(1);
        assert_eq!(names[0], "actiontype_a0");
        assert!(names.contains(&"goalscore_diff".to_string()));
        assert!(names.contains(&"start_angle_to_goal_a0".to_string()));
        assert!(names.iter().all(|n| !n.ends_with("_a1")));
        assert!(!names.iter().any(|n| n.starts_with("team_") || n.starts_with("time_delta")));
    }

    #[test]
    fn full_window_columns_are_ordered_by_action_then_column() {
        let names = FeatureSet::standard(3).column_names();
        let pos = |n: &str| names.iter().position(|c| c == n).unwrap();
        assert!(pos("start_x_a0") < pos("start_y_a0"));
        assert!(pos("start_y_a0") < pos("start_x_a1"));
        assert!(pos("actiontype_a2") < pos("actiontype_pass_a0"));
        assert!(names.contains(&"actiontype_tackle_a2".to_string()));
        assert!(pos("dx_a01") < pos("mov_a02"));
        assert_eq!(names.last().map(String::as_str), Some("time_delta_2"));
    }

    #[test]
    fn rows_match_schema_width() {
        let actions = vec![
            action(0.0, 1, 10.0, 10.0, ActionType::Other),
            action(4.0, 2, 50.0, 30.0, ActionType::DefensiveDuel),
            action(9.0, 1, 90.0, 34.0, ActionType::Shot),
        ];
        let fs = FeatureSet::standard(3);
        let frame = fs.compute(&actions);
        assert_eq!(frame.n_rows(), 3);
        assert!(frame.rows.iter().all(|r| r.len() == frame.n_cols()));

        let team_1 = frame.column_index("team_1").unwrap();
        assert_eq!(frame.rows[2][team_1], Cell::Num(0.0));
        let td_2 = frame.column_index("time_delta_2").unwrap();
        assert_eq!(frame.rows[2][td_2], Cell::Num(9.0));
        let dx01 = frame.column_index("dx_a01").unwrap();
        assert_eq!(frame.rows[2][dx01], Cell::Num(55.0 - 90.0));
        let kind = frame.column_index("actiontype_a0").unwrap();
        assert_eq!(frame.rows[2][kind], Cell::Cat("shot".into()));
    }

    #[test]
    fn polar_angle_handles_goal_line() {
        let (dist, angle) = polar_to_goal(105.0, 34.0);
        assert_eq!((dist, angle), (0.0, 0.0));
        let (_, angle) = polar_to_goal(105.0, 20.0);
        assert_float_absolute_eq!(angle, std::f64::consts::FRAC_PI_2, 1e-12);
        let (dist, angle) = polar_to_goal(95.0, 24.0);
        assert_float_absolute_eq!(dist, 200.0_f64.sqrt(), 1e-12);
        assert_float_absolute_eq!(angle, std::f64::consts::FRAC_PI_4, 1e-12);
    }

    #[test]
    fn categorical_columns_are_tagged() {
        let cats = categorical_columns(&FeatureSet::standard(1).columns());
        assert_eq!(cats, vec!["actiontype_a0", "bodypart_a0", "result_a0"]);
    }
}
