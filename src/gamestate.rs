use std::collections::HashMap;

use crate::spadl::Action;

/// Trailing context ending at one action: `actions[0]` is the action itself,
/// `actions[i]` the i-th predecessor, clamped to the first action of the
/// same game period.
#[derive(Debug, Clone)]
pub struct Gamestate<'a> {
    actions: Vec<&'a Action>,
    /// Goals scored by the acting team before this action, within the game.
    pub team_goals: u32,
    /// Goals scored by the other side before this action, within the game.
    pub opponent_goals: u32,
}

impl<'a> Gamestate<'a> {
    pub fn current(&self) -> &'a Action {
        self.actions[0]
    }

    pub fn action(&self, i: usize) -> &'a Action {
        self.actions[i]
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Action> + '_ {
        self.actions.iter().copied()
    }
}

/// Lazily window an ordered action table into one gamestate per action.
pub fn gamestates(actions: &[Action], k: usize) -> Gamestates<'_> {
    Gamestates {
        actions,
        k: k.max(1),
        idx: 0,
        period_start: 0,
        goals: HashMap::new(),
        goals_total: 0,
    }
}

#[derive(Debug, Clone)]
pub struct Gamestates<'a> {
    actions: &'a [Action],
    k: usize,
    idx: usize,
    period_start: usize,
    goals: HashMap<i64, u32>,
    goals_total: u32,
}

impl<'a> Iterator for Gamestates<'a> {
    type Item = Gamestate<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.idx;
        let current = self.actions.get(idx)?;
        let previous = idx.checked_sub(1).map(|p| &self.actions[p]);

        let new_game = previous.is_none_or(|p| p.game_id != current.game_id);
        if new_game {
            self.goals.clear();
            self.goals_total = 0;
        }
        if new_game || previous.is_some_and(|p| p.period_id != current.period_id) {
            self.period_start = idx;
        }

        let window = (0..self.k)
            .map(|i| {
                let j = if idx >= self.period_start + i {
                    idx - i
                } else {
                    self.period_start
                };
                &self.actions[j]
            })
            .collect();

        let team_goals = self.goals.get(&current.team_id).copied().unwrap_or(0);
        let state = Gamestate {
            actions: window,
            team_goals,
            opponent_goals: self.goals_total - team_goals,
        };

        if current.is_goal() {
            *self.goals.entry(current.team_id).or_insert(0) += 1;
            self.goals_total += 1;
        }
        self.idx += 1;
        Some(state)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.actions.len() - self.idx;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Gamestates<'_> {}
