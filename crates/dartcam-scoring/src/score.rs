use std::fmt;
use std::str::FromStr;

use dartcam_core::{BoardHit, Ring};
use serde::{Deserialize, Serialize};

/// Score label of a single dart.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ScoreLabel {
    Miss,
    Single(u8),
    Double(u8),
    Treble(u8),
    /// 25
    OuterBull,
    /// 50, counts as a double for checkouts.
    Bull,
}

impl ScoreLabel {
    pub fn value(self) -> u32 {
        match self {
            ScoreLabel::Miss => 0,
            ScoreLabel::Single(n) => n as u32,
            ScoreLabel::Double(n) => 2 * n as u32,
            ScoreLabel::Treble(n) => 3 * n as u32,
            ScoreLabel::OuterBull => 25,
            ScoreLabel::Bull => 50,
        }
    }

    #[inline]
    pub fn is_double(self) -> bool {
        matches!(self, ScoreLabel::Double(_) | ScoreLabel::Bull)
    }

    pub fn from_hit(hit: BoardHit) -> Self {
        match hit.ring {
            Ring::DoubleBull => ScoreLabel::Bull,
            Ring::Bull => ScoreLabel::OuterBull,
            Ring::InnerSingle | Ring::OuterSingle => ScoreLabel::Single(hit.sector),
            Ring::Treble => ScoreLabel::Treble(hit.sector),
            Ring::Double => ScoreLabel::Double(hit.sector),
            Ring::Outside => ScoreLabel::Miss,
        }
    }
}

impl fmt::Display for ScoreLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreLabel::Miss => f.write_str("MISS"),
            ScoreLabel::Single(n) => write!(f, "{n}"),
            ScoreLabel::Double(n) => write!(f, "D{n}"),
            ScoreLabel::Treble(n) => write!(f, "T{n}"),
            ScoreLabel::OuterBull => f.write_str("25"),
            ScoreLabel::Bull => f.write_str("DB"),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid score label `{0}`")]
pub struct ParseScoreLabelError(pub String);

impl FromStr for ScoreLabel {
    type Err = ParseScoreLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseScoreLabelError(s.to_string());
        let t = s.trim().to_ascii_uppercase();
        match t.as_str() {
            "MISS" | "0" => return Ok(ScoreLabel::Miss),
            "25" | "B" => return Ok(ScoreLabel::OuterBull),
            "DB" | "50" | "BULL" => return Ok(ScoreLabel::Bull),
            _ => {}
        }
        let (ctor, digits): (fn(u8) -> ScoreLabel, &str) = if let Some(rest) = t.strip_prefix('S')
        {
            (ScoreLabel::Single, rest)
        } else if let Some(rest) = t.strip_prefix('D') {
            (ScoreLabel::Double, rest)
        } else if let Some(rest) = t.strip_prefix('T') {
            (ScoreLabel::Treble, rest)
        } else {
            (ScoreLabel::Single, t.as_str())
        };
        let n: u8 = digits.parse().map_err(|_| err())?;
        if !(1..=20).contains(&n) {
            return Err(err());
        }
        Ok(ctor(n))
    }
}

impl TryFrom<String> for ScoreLabel {
    type Error = ParseScoreLabelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScoreLabel> for String {
    fn from(label: ScoreLabel) -> Self {
        label.to_string()
    }
}

/// What the player is left with after a visit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "remaining", rename_all = "snake_case")]
pub enum VisitOutcome {
    Remaining(i32),
    Checkout,
    Bust,
}

impl VisitOutcome {
    /// Numeric remaining score, `None` for a bust.
    pub fn remaining(self) -> Option<i32> {
        match self {
            VisitOutcome::Remaining(n) => Some(n),
            VisitOutcome::Checkout => Some(0),
            VisitOutcome::Bust => None,
        }
    }
}

impl fmt::Display for VisitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisitOutcome::Remaining(n) => write!(f, "{n}"),
            VisitOutcome::Checkout => f.write_str("0"),
            VisitOutcome::Bust => f.write_str("BUST"),
        }
    }
}

/// Double-out x01 rule.
///
/// `deciding` is the dart that brought the remaining score to its final
/// value; only it is checked for the double when `remaining == 0`.
pub fn classify_remaining(remaining: i32, deciding: Option<ScoreLabel>) -> VisitOutcome {
    match remaining {
        r if r < 0 || r == 1 => VisitOutcome::Bust,
        0 if deciding.is_some_and(ScoreLabel::is_double) => VisitOutcome::Checkout,
        0 => VisitOutcome::Bust,
        r => VisitOutcome::Remaining(r),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values() {
        assert_eq!(ScoreLabel::Treble(20).value(), 60);
        assert_eq!(ScoreLabel::Double(1).value(), 2);
        assert_eq!(ScoreLabel::Single(7).value(), 7);
        assert_eq!(ScoreLabel::OuterBull.value(), 25);
        assert_eq!(ScoreLabel::Bull.value(), 50);
        assert_eq!(ScoreLabel::Miss.value(), 0);
    }

    #[test]
    fn display_and_parse_agree() {
        for label in [
            ScoreLabel::Miss,
            ScoreLabel::Single(20),
            ScoreLabel::Double(16),
            ScoreLabel::Treble(19),
            ScoreLabel::OuterBull,
            ScoreLabel::Bull,
        ] {
            assert_eq!(label.to_string().parse::<ScoreLabel>(), Ok(label));
        }
        assert_eq!("s5".parse::<ScoreLabel>(), Ok(ScoreLabel::Single(5)));
        assert!("T21".parse::<ScoreLabel>().is_err());
        assert!("D0".parse::<ScoreLabel>().is_err());
        assert!("".parse::<ScoreLabel>().is_err());
    }

    #[test]
    fn bust_when_overshooting() {
        // 40 left, 41 scored
        assert_eq!(
            classify_remaining(40 - 41, Some(ScoreLabel::Single(1))),
            VisitOutcome::Bust
        );
    }

    #[test]
    fn checkout_on_double() {
        assert_eq!(
            classify_remaining(2 - 2, Some(ScoreLabel::Double(1))),
            VisitOutcome::Checkout
        );
        assert_eq!(
            classify_remaining(0, Some(ScoreLabel::Bull)),
            VisitOutcome::Checkout
        );
    }

    #[test]
    fn zero_without_double_is_bust() {
        assert_eq!(
            classify_remaining(0, Some(ScoreLabel::Single(2))),
            VisitOutcome::Bust
        );
        assert_eq!(classify_remaining(0, None), VisitOutcome::Bust);
    }

    #[test]
    fn one_left_is_bust_regardless_of_label() {
        for label in [ScoreLabel::Double(1), ScoreLabel::Single(2), ScoreLabel::Bull] {
            assert_eq!(classify_remaining(1, Some(label)), VisitOutcome::Bust);
        }
    }

    #[test]
    fn outcome_serializes_with_kind() {
        let json = serde_json::to_string(&VisitOutcome::Remaining(441)).unwrap();
        assert_eq!(json, r#"{"kind":"remaining","remaining":441}"#);
        let json = serde_json::to_string(&VisitOutcome::Bust).unwrap();
        assert_eq!(json, r#"{"kind":"bust"}"#);
    }
}
