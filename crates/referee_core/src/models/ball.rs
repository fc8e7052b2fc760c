//! Ball identity
//!
//! Detector labels are `"cueball"` and `"bi1"` .. `"bi9"`. Anything else is
//! rejected at the boundary so the rest of the crate only ever sees
//! well-formed identities.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::InputError;

pub const CUE_LABEL: &str = "cueball";
pub const OBJECT_PREFIX: &str = "bi";
pub const NINE_BALL: u8 = 9;

/// Identity of a ball on the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BallId {
    Cue,
    /// Numbered object ball, 1..=9
    Object(u8),
}

impl BallId {
    /// Object ball from its number
    pub fn object(number: u8) -> Result<Self, InputError> {
        if (1..=NINE_BALL).contains(&number) {
            Ok(BallId::Object(number))
        } else {
            Err(InputError::MalformedBallId(format!("{}{}", OBJECT_PREFIX, number)))
        }
    }

    /// Ball number for object balls, `None` for the cue
    pub fn number(&self) -> Option<u8> {
        match self {
            BallId::Cue => None,
            BallId::Object(n) => Some(*n),
        }
    }

    pub fn is_cue(&self) -> bool {
        matches!(self, BallId::Cue)
    }

    /// Detector label for this ball
    pub fn label(&self) -> String {
        self.to_string()
    }

    /// All object balls in rack order
    pub fn objects() -> impl Iterator<Item = BallId> {
        (1..=NINE_BALL).map(BallId::Object)
    }
}

impl fmt::Display for BallId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BallId::Cue => write!(f, "{}", CUE_LABEL),
            BallId::Object(n) => write!(f, "{}{}", OBJECT_PREFIX, n),
        }
    }
}

impl FromStr for BallId {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == CUE_LABEL {
            return Ok(BallId::Cue);
        }
        s.strip_prefix(OBJECT_PREFIX)
            .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|digits| digits.parse::<u8>().ok())
            .filter(|n| (1..=NINE_BALL).contains(n))
            .map(BallId::Object)
            .ok_or_else(|| InputError::MalformedBallId(s.to_string()))
    }
}

impl Serialize for BallId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BallId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        label.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// BallSet
// =============================================================================

/// Set of numbered balls (1..=9) packed into a bitmask
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BallSet(u16);

impl BallSet {
    pub const fn empty() -> Self {
        BallSet(0)
    }

    /// Balls 1..=9: a fresh rack
    pub const fn full_rack() -> Self {
        BallSet(0b11_1111_1110)
    }

    pub fn contains(&self, number: u8) -> bool {
        (1..=NINE_BALL).contains(&number) && self.0 & (1 << number) != 0
    }

    /// Returns true if the ball was not already present
    pub fn insert(&mut self, number: u8) -> bool {
        if !(1..=NINE_BALL).contains(&number) || self.contains(number) {
            return false;
        }
        self.0 |= 1 << number;
        true
    }

    /// Returns true if the ball was present
    pub fn remove(&mut self, number: u8) -> bool {
        if !self.contains(number) {
            return false;
        }
        self.0 &= !(1 << number);
        true
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn min(&self) -> Option<u8> {
        self.iter().next()
    }

    /// Ascending ball numbers
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (1..=NINE_BALL).filter(move |n| self.contains(*n))
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.iter().collect()
    }
}

impl fmt::Debug for BallSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<u8> for BallSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        let mut set = BallSet::empty();
        for n in iter {
            set.insert(n);
        }
        set
    }
}

impl Serialize for BallSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for BallSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let numbers = Vec::<u8>::deserialize(deserializer)?;
        Ok(numbers.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labels() {
        assert_eq!("cueball".parse::<BallId>().unwrap(), BallId::Cue);
        assert_eq!("bi1".parse::<BallId>().unwrap(), BallId::Object(1));
        assert_eq!("bi9".parse::<BallId>().unwrap(), BallId::Object(9));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["bi0", "bi10", "ball3", "bi", "", "BI3", "bi-1", "cue"] {
            assert!(
                matches!(bad.parse::<BallId>(), Err(InputError::MalformedBallId(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_display_round_trips_label() {
        assert_eq!(BallId::Object(7).to_string(), "bi7");
        assert_eq!(BallId::Cue.label(), "cueball");
    }

    #[test]
    fn test_ball_set_operations() {
        let mut set = BallSet::full_rack();
        assert_eq!(set.len(), 9);
        assert_eq!(set.min(), Some(1));
        assert!(set.remove(1));
        assert!(!set.remove(1));
        assert_eq!(set.min(), Some(2));
        assert!(!set.insert(10));
        assert!(set.insert(1));
        assert_eq!(set.to_vec(), vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_ball_set_serializes_as_list() {
        let set: BallSet = [3u8, 9, 5].into_iter().collect();
        assert_eq!(serde_json::to_string(&set).unwrap(), "[3,5,9]");
        let back: BallSet = serde_json::from_str("[3,5,9]").unwrap();
        assert_eq!(back, set);
    }
}
