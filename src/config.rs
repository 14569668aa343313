//! Search configuration parameters.
//!
//! These hyperparameters control selection, backpropagation and the
//! simulation budget. Defaults follow the EfficientZero setup for Atari.

use serde::{Deserialize, Serialize};

use crate::error::{MctsError, Result};

/// How values are attributed between movers.
///
/// Selected once from the configured player count so that the scoring and
/// backup code dispatch on a single tag instead of comparing integers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Players {
    /// One agent; `to_play` is always 0 and values are never negated.
    #[default]
    Single,
    /// Two movers (1 and 2) alternating every step; zero-sum.
    TwoPlayer,
    /// `n` movers (1..=n) rotating every step. A value is positive for the
    /// mover it was predicted for and negated for everyone else.
    NPlayer(u8),
}

impl Players {
    /// Map a player count onto the attribution mode.
    pub fn from_count(count: usize) -> Result<Self> {
        match count {
            0 => Err(MctsError::InvalidConfig("player count must be at least 1".into())),
            1 => Ok(Players::Single),
            2 => Ok(Players::TwoPlayer),
            n if n <= i8::MAX as usize => Ok(Players::NPlayer(n as u8)),
            n => Err(MctsError::InvalidConfig(format!("player count {n} is too large"))),
        }
    }

    /// Number of movers.
    pub fn count(self) -> usize {
        match self {
            Players::Single => 1,
            Players::TwoPlayer => 2,
            Players::NPlayer(n) => n as usize,
        }
    }

    #[inline]
    pub fn is_single(self) -> bool {
        matches!(self, Players::Single)
    }

    /// Mover after one more step has been taken.
    #[inline]
    pub fn next_to_play(self, to_play: i8) -> i8 {
        match self {
            Players::Single => to_play,
            Players::TwoPlayer => {
                if to_play == 1 {
                    2
                } else {
                    1
                }
            }
            Players::NPlayer(n) => ((to_play.max(1) as i16 % n as i16) + 1) as i8,
        }
    }

    /// Express a child's value from its parent's point of view.
    ///
    /// The child's value is stored for the child's mover; it is negated
    /// when that mover differs from the parent's.
    #[inline]
    pub fn value_for_parent(self, parent_to_play: i8, child_to_play: i8, child_value: f32) -> f32 {
        if self.is_single() || parent_to_play == child_to_play {
            child_value
        } else {
            -child_value
        }
    }
}

/// Tree search configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// PUCT exploration constant base.
    /// Part of the formula: c = pb_c_init + log((N + pb_c_base + 1) / pb_c_base)
    pub pb_c_base: f32,

    /// PUCT exploration constant init.
    pub pb_c_init: f32,

    /// Per-step discount applied to bootstrapped values.
    pub discount_factor: f32,

    /// Fraction of the root prior replaced with exploration noise.
    /// 0 = no exploration noise, 1 = pure noise.
    pub root_noise_weight: f32,

    /// Smallest range used when normalizing Q values. Keeps early searches,
    /// where only a handful of nearly equal values were observed, from
    /// blowing tiny differences up to the full [0, 1] range.
    pub value_delta_max: f32,

    /// Value attribution mode.
    pub players: Players,

    /// Maximum number of actions taken from the root in one traversal.
    pub max_depth: usize,

    /// Number of traverse/evaluate/backpropagate cycles per search.
    pub num_simulations: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            pb_c_base: 19652.0,
            pb_c_init: 1.25,
            discount_factor: 0.997,
            root_noise_weight: 0.25,
            value_delta_max: 0.01,
            players: Players::Single,
            max_depth: 256,
            num_simulations: 50,
        }
    }
}

impl SearchConfig {
    /// Create a new config with the specified number of simulations.
    pub fn with_simulations(num_simulations: usize) -> Self {
        Self {
            num_simulations,
            ..Default::default()
        }
    }

    /// Create a config for a board game with `count` alternating movers.
    pub fn for_players(count: usize) -> Result<Self> {
        Ok(Self {
            players: Players::from_count(count)?,
            discount_factor: 1.0,
            ..Default::default()
        })
    }

    pub fn discount(mut self, discount_factor: f32) -> Self {
        self.discount_factor = discount_factor;
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Check that every parameter is inside its meaningful range.
    pub fn validate(&self) -> Result<()> {
        if !(self.pb_c_base > 0.0) {
            return Err(MctsError::InvalidConfig(format!(
                "pb_c_base must be positive, got {}",
                self.pb_c_base
            )));
        }
        if !(0.0..=1.0).contains(&self.discount_factor) {
            return Err(MctsError::InvalidConfig(format!(
                "discount_factor must be in [0, 1], got {}",
                self.discount_factor
            )));
        }
        if !(0.0..=1.0).contains(&self.root_noise_weight) {
            return Err(MctsError::InvalidConfig(format!(
                "root_noise_weight must be in [0, 1], got {}",
                self.root_noise_weight
            )));
        }
        if self.value_delta_max < 0.0 {
            return Err(MctsError::InvalidConfig(format!(
                "value_delta_max must be non-negative, got {}",
                self.value_delta_max
            )));
        }
        if let Players::NPlayer(n) = self.players {
            if n < 3 {
                return Err(MctsError::InvalidConfig(format!(
                    "NPlayer needs at least 3 movers, got {n}"
                )));
            }
            if n as usize > i8::MAX as usize {
                return Err(MctsError::InvalidConfig(format!(
                    "NPlayer supports at most {} movers, got {n}",
                    i8::MAX
                )));
            }
        }
        if self.max_depth == 0 {
            return Err(MctsError::InvalidConfig("max_depth must be at least 1".into()));
        }
        if self.num_simulations == 0 {
            return Err(MctsError::InvalidConfig("num_simulations must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SearchConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_discount() {
        let config = SearchConfig::default().discount(1.5);
        assert!(matches!(config.validate(), Err(MctsError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_depth_rejected() {
        let config = SearchConfig::default().max_depth(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_too_many_movers_rejected() {
        let config = SearchConfig {
            players: Players::NPlayer(200),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(MctsError::InvalidConfig(_))));
    }

    #[test]
    fn test_players_from_count() {
        assert_eq!(Players::from_count(1).unwrap(), Players::Single);
        assert_eq!(Players::from_count(2).unwrap(), Players::TwoPlayer);
        assert_eq!(Players::from_count(4).unwrap(), Players::NPlayer(4));
        assert!(Players::from_count(0).is_err());
        assert_eq!(Players::from_count(127).unwrap(), Players::NPlayer(127));
        assert!(Players::from_count(128).is_err());
        assert_eq!(Players::NPlayer(127).next_to_play(127), 1);
    }

    #[test]
    fn test_next_to_play() {
        assert_eq!(Players::Single.next_to_play(0), 0);
        assert_eq!(Players::TwoPlayer.next_to_play(1), 2);
        assert_eq!(Players::TwoPlayer.next_to_play(2), 1);
        assert_eq!(Players::NPlayer(3).next_to_play(1), 2);
        assert_eq!(Players::NPlayer(3).next_to_play(2), 3);
        assert_eq!(Players::NPlayer(3).next_to_play(3), 1);
    }

    #[test]
    fn test_value_for_parent() {
        assert_eq!(Players::Single.value_for_parent(0, 0, 0.7), 0.7);
        assert_eq!(Players::TwoPlayer.value_for_parent(1, 2, 0.7), -0.7);
        assert_eq!(Players::TwoPlayer.value_for_parent(1, 1, 0.7), 0.7);
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: SearchConfig =
            serde_json::from_str(r#"{"num_simulations": 16, "players": "two_player"}"#).unwrap();
        assert_eq!(config.num_simulations, 16);
        assert_eq!(config.players, Players::TwoPlayer);
        assert_eq!(config.pb_c_base, 19652.0);
        assert!(config.validate().is_ok());
    }
}
