use dartcam_core::{locate, RingRadii};
use log::info;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::score::{classify_remaining, ScoreLabel, VisitOutcome};

/// Game-side scoring collaborator of the visit scorer.
///
/// Positions are board-plane coordinates in the canonical unit square.
pub trait Scoreboard {
    /// Label of a dart landing at `position`.
    fn label_for_position(&self, position: Point2<f64>) -> ScoreLabel;

    /// Points a label is worth in the current game.
    fn point_value(&self, label: ScoreLabel) -> i32 {
        label.value() as i32
    }

    /// Score the current player has left before the visit in progress.
    fn current_player_score(&self) -> i32;

    /// Apply a finished visit. Called exactly once per visit.
    fn commit_visit(&mut self, labels: &[ScoreLabel]);

    fn is_game_over(&self) -> bool {
        false
    }
}

/// Game setup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameParams {
    pub players: Vec<String>,
    pub starting_score: i32,
    /// Board geometry used to label dart positions.
    pub radii: RingRadii,
}

impl Default for GameParams {
    fn default() -> Self {
        Self {
            players: vec!["Player 1".to_string(), "Player 2".to_string()],
            starting_score: 501,
            radii: RingRadii::default(),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("a game needs at least one player")]
    NoPlayers,
    #[error("starting score must be greater than 1, got {0}")]
    InvalidStartingScore(i32),
}

impl GameParams {
    pub fn validate(&self) -> Result<(), GameError> {
        if self.players.is_empty() {
            return Err(GameError::NoPlayers);
        }
        if self.starting_score <= 1 {
            return Err(GameError::InvalidStartingScore(self.starting_score));
        }
        Ok(())
    }
}

/// One committed visit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub darts: Vec<ScoreLabel>,
    pub total: i32,
    pub bust: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub name: String,
    pub score: i32,
    pub visits: Vec<VisitRecord>,
}

impl Player {
    fn new(name: String, score: i32) -> Self {
        Self {
            name,
            score,
            visits: Vec::new(),
        }
    }

    pub fn darts_thrown(&self) -> usize {
        self.visits.iter().map(|v| v.darts.len()).sum()
    }

    /// Dart count recorded after every visit.
    pub fn dart_count_history(&self) -> Vec<usize> {
        self.visits
            .iter()
            .scan(0, |acc, v| {
                *acc += v.darts.len();
                Some(*acc)
            })
            .collect()
    }
}

/// Countdown x01 game with double-out, players taking turns in order.
#[derive(Clone, Debug)]
pub struct X01Scoreboard {
    players: Vec<Player>,
    current: usize,
    winner: Option<usize>,
    radii: RingRadii,
}

impl X01Scoreboard {
    pub fn new(params: &GameParams) -> Result<Self, GameError> {
        params.validate()?;
        Ok(Self {
            players: params
                .players
                .iter()
                .map(|name| Player::new(name.clone(), params.starting_score))
                .collect(),
            current: 0,
            winner: None,
            radii: params.radii,
        })
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn current_player(&self) -> &Player {
        &self.players[self.current]
    }

    #[inline]
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Set the player whose turn it is. Out-of-range indices wrap.
    pub fn set_current(&mut self, index: usize) {
        self.current = index % self.players.len();
    }

    pub fn winner(&self) -> Option<&Player> {
        self.winner.map(|i| &self.players[i])
    }
}

impl Scoreboard for X01Scoreboard {
    fn label_for_position(&self, position: Point2<f64>) -> ScoreLabel {
        ScoreLabel::from_hit(locate(position, &self.radii))
    }

    fn current_player_score(&self) -> i32 {
        self.players[self.current].score
    }

    fn commit_visit(&mut self, labels: &[ScoreLabel]) {
        if self.winner.is_some() {
            return;
        }
        let total: i32 = labels.iter().map(|&l| self.point_value(l)).sum();
        let player = &mut self.players[self.current];
        let outcome = classify_remaining(player.score - total, labels.last().copied());
        let bust = outcome == VisitOutcome::Bust;
        if let Some(remaining) = outcome.remaining() {
            player.score = remaining;
        }
        player.visits.push(VisitRecord {
            darts: labels.to_vec(),
            total,
            bust,
        });
        info!(
            "{}: visit {} = {total} -> {outcome}",
            player.name,
            labels
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" ")
        );

        if outcome == VisitOutcome::Checkout {
            info!("{} wins", player.name);
            self.winner = Some(self.current);
        } else {
            self.current = (self.current + 1) % self.players.len();
        }
    }

    fn is_game_over(&self) -> bool {
        self.winner.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dartcam_core::point_on_board;

    fn game(players: &[&str], start: i32) -> X01Scoreboard {
        X01Scoreboard::new(&GameParams {
            players: players.iter().map(|s| s.to_string()).collect(),
            starting_score: start,
            ..GameParams::default()
        })
        .unwrap()
    }

    #[test]
    fn labels_from_board_positions() {
        let board = game(&["a"], 501);
        let radii = RingRadii::default();
        assert_eq!(
            board.label_for_position(point_on_board(20, radii.treble_mid()).unwrap()),
            ScoreLabel::Treble(20)
        );
        assert_eq!(
            board.label_for_position(point_on_board(16, radii.double_mid()).unwrap()),
            ScoreLabel::Double(16)
        );
        assert_eq!(
            board.label_for_position(Point2::new(0.5, 0.5)),
            ScoreLabel::Bull
        );
        assert_eq!(
            board.label_for_position(Point2::new(0.01, 0.01)),
            ScoreLabel::Miss
        );
    }

    #[test]
    fn commit_advances_turn() {
        let mut board = game(&["a", "b"], 501);
        board.commit_visit(&[ScoreLabel::Treble(20); 3]);
        assert_eq!(board.players()[0].score, 321);
        assert_eq!(board.current_index(), 1);
        assert_eq!(board.current_player_score(), 501);
    }

    #[test]
    fn bust_leaves_score_unchanged() {
        let mut board = game(&["a", "b"], 40);
        board.commit_visit(&[ScoreLabel::Treble(7), ScoreLabel::Single(20)]);
        let a = &board.players()[0];
        assert_eq!(a.score, 40);
        assert!(a.visits[0].bust);
        assert_eq!(a.visits[0].total, 41);
        assert_eq!(board.current_index(), 1);
    }

    #[test]
    fn checkout_ends_game() {
        let mut board = game(&["a", "b"], 32);
        board.commit_visit(&[ScoreLabel::Double(16)]);
        assert!(board.is_game_over());
        assert_eq!(board.winner().map(|p| p.name.as_str()), Some("a"));
        assert_eq!(board.current_index(), 0);

        // later commits are ignored
        board.commit_visit(&[ScoreLabel::Single(1)]);
        assert_eq!(board.players()[0].visits.len(), 1);
    }

    #[test]
    fn dart_counts_accumulate() {
        let mut board = game(&["solo"], 501);
        board.commit_visit(&[ScoreLabel::Single(1); 3]);
        board.commit_visit(&[ScoreLabel::Single(1), ScoreLabel::Miss]);
        let solo = board.current_player();
        assert_eq!(solo.darts_thrown(), 5);
        assert_eq!(solo.dart_count_history(), vec![3, 5]);
    }

    #[test]
    fn invalid_setups_are_rejected() {
        let no_players = GameParams {
            players: Vec::new(),
            ..GameParams::default()
        };
        assert_eq!(
            X01Scoreboard::new(&no_players).err(),
            Some(GameError::NoPlayers)
        );
        let too_low = GameParams {
            starting_score: 1,
            ..GameParams::default()
        };
        assert_eq!(
            X01Scoreboard::new(&too_low).err(),
            Some(GameError::InvalidStartingScore(1))
        );
    }
}
