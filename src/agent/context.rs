use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};

/// What a participant knows about the game it is playing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameContext {
    /// The tournament id.
    pub id: String,
    /// The game name.
    pub name: String,
    pub player_id: String,
    /// The current round, starting from 1.
    pub round: usize,
    pub rounds: usize,
    /// Prompt templates, keyed by name.
    pub prompts: BTreeMap<String, String>,
    /// Rendered prompts. Refreshed every round.
    #[serde(default)]
    pub rendered_prompts: BTreeMap<String, String>,
    pub working_dir: PathBuf,
}

impl GameContext {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        player_id: impl Into<String>,
        rounds: usize,
        prompts: BTreeMap<String, String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        let mut context = GameContext {
            id: id.into(),
            name: name.into(),
            player_id: player_id.into(),
            round: 1,
            rounds,
            prompts,
            rendered_prompts: BTreeMap::new(),
            working_dir: working_dir.into(),
        };
        context.render_prompts();
        context
    }

    /// Substitute `{{round}}`, `{{rounds}}`, `{{player_id}}` and
    /// `{{game_name}}` in `template`.
    pub fn render(&self, template: &str) -> String {
        template
            .replace("{{round}}", &self.round.to_string())
            .replace("{{rounds}}", &self.rounds.to_string())
            .replace("{{player_id}}", &self.player_id)
            .replace("{{game_name}}", &self.name)
    }

    /// Re-render every prompt for the current round.
    pub fn render_prompts(&mut self) {
        self.rendered_prompts = self
            .prompts
            .iter()
            .map(|(key, template)| (key.clone(), self.render(template)))
            .collect();
    }

    pub fn set_round(&mut self, round: usize) {
        self.round = round;
        self.render_prompts();
    }

    pub fn prompt(&self, key: &str) -> Option<&str> {
        self.rendered_prompts.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts_follow_the_round() {
        let mut prompts = BTreeMap::new();
        prompts.insert(
            "system".to_string(),
            "You are {{player_id}} in {{game_name}}, round {{round}} of {{rounds}}.".to_string(),
        );
        let mut context = GameContext::new("t1", "BattleSnake", "alice", 3, prompts, "/alice");
        assert_eq!(
            context.prompt("system"),
            Some("You are alice in BattleSnake, round 1 of 3.")
        );

        context.set_round(2);
        assert_eq!(
            context.prompt("system"),
            Some("You are alice in BattleSnake, round 2 of 3.")
        );
        assert_eq!(context.prompt("missing"), None);
    }
}
