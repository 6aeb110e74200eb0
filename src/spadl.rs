use serde::{Deserialize, Serialize};

pub const PITCH_LENGTH: f64 = 105.0;
pub const PITCH_WIDTH: f64 = 68.0;
pub const HALFWAY_X: f64 = PITCH_LENGTH / 2.0;
pub const GOAL_X: f64 = PITCH_LENGTH;
pub const GOAL_Y: f64 = PITCH_WIDTH / 2.0;

/// Action vocabulary emitted by the translator. Ids and names follow SPADL:
/// undifferentiated events keep the default id 0 (`pass`), offensive duels
/// map to `take_on`, defensive duels to `tackle` and carries to `dribble`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionType {
    Other,
    OffensiveDuel,
    DefensiveDuel,
    Interception,
    Shot,
    Clearance,
    Carry,
}

impl ActionType {
    pub const ALL: [ActionType; 7] = [
        ActionType::Other,
        ActionType::OffensiveDuel,
        ActionType::DefensiveDuel,
        ActionType::Interception,
        ActionType::Shot,
        ActionType::Clearance,
        ActionType::Carry,
    ];

    pub fn id(self) -> u8 {
        match self {
            ActionType::Other => 0,
            ActionType::OffensiveDuel => 7,
            ActionType::DefensiveDuel => 9,
            ActionType::Interception => 10,
            ActionType::Shot => 11,
            ActionType::Clearance => 18,
            ActionType::Carry => 21,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ActionType::Other => "pass",
            ActionType::OffensiveDuel => "take_on",
            ActionType::DefensiveDuel => "tackle",
            ActionType::Interception => "interception",
            ActionType::Shot => "shot",
            ActionType::Clearance => "clearance",
            ActionType::Carry => "dribble",
        }
    }

    /// Tackles, interceptions and clearances.
    pub fn is_defensive(self) -> bool {
        matches!(
            self,
            ActionType::DefensiveDuel | ActionType::Interception | ActionType::Clearance
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionResult {
    Fail,
    Success,
}

impl ActionResult {
    pub const ALL: [ActionResult; 2] = [ActionResult::Fail, ActionResult::Success];

    pub fn id(self) -> u8 {
        match self {
            ActionResult::Fail => 0,
            ActionResult::Success => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ActionResult::Fail => "fail",
            ActionResult::Success => "success",
        }
    }

    pub fn from_success(success: bool) -> Self {
        if success {
            ActionResult::Success
        } else {
            ActionResult::Fail
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyPart {
    Other,
    Head,
}

impl BodyPart {
    pub const ALL: [BodyPart; 2] = [BodyPart::Other, BodyPart::Head];

    pub fn id(self) -> u8 {
        match self {
            BodyPart::Other => 0,
            BodyPart::Head => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BodyPart::Other => "other",
            BodyPart::Head => "head",
        }
    }
}

/// One standardized on-ball action on a 105x68 pitch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub game_id: i64,
    pub period_id: u8,
    pub time_seconds: f64,
    pub team_id: i64,
    pub start_x: f64,
    pub start_y: f64,
    pub end_x: f64,
    pub end_y: f64,
    pub action_type: ActionType,
    pub result: ActionResult,
    pub bodypart: BodyPart,
}

impl Action {
    pub fn type_id(&self) -> u8 {
        self.action_type.id()
    }

    pub fn result_id(&self) -> u8 {
        self.result.id()
    }

    pub fn is_success(&self) -> bool {
        self.result == ActionResult::Success
    }

    /// A successful shot counts as a goal for scoreline and label purposes.
    pub fn is_goal(&self) -> bool {
        self.action_type == ActionType::Shot && self.is_success()
    }

    pub fn is_successful_defensive(&self) -> bool {
        self.action_type.is_defensive() && self.is_success()
    }
}

/// An action joined with the acting player's resolved name.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedAction {
    pub action: Action,
    pub player_name: String,
}

/// Split an ordered action table into contiguous per-game slices.
pub fn split_games(actions: &[Action]) -> Vec<&[Action]> {
    let mut out = Vec::new();
    let mut start = 0usize;
    for idx in 1..=actions.len() {
        if idx == actions.len() || actions[idx].game_id != actions[start].game_id {
            if idx > start {
                out.push(&actions[start..idx]);
            }
            start = idx;
        }
    }
    out
}
