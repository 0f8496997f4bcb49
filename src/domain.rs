use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AtlasError;

static TOI_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i:toi[-\s]?)?(\d+)\.(\d{1,2})$").expect("valid regex"));

/// Integer TOI number identifying every candidate of one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToiNumber(u32);

impl ToiNumber {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Conventional id of the first candidate, e.g. `100.01`.
    pub fn first_candidate(self) -> ToiId {
        ToiId {
            number: self,
            candidate: 1,
        }
    }
}

impl fmt::Display for ToiNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ToiNumber {
    type Err = AtlasError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let digits = trimmed
            .strip_prefix("TOI")
            .or_else(|| trimmed.strip_prefix("toi"))
            .map(|rest| rest.trim_start_matches(['-', ' ']))
            .unwrap_or(trimmed);
        digits
            .parse::<u32>()
            .map(Self)
            .map_err(|_| AtlasError::InvalidToi(value.to_string()))
    }
}

/// Fractional candidate id; the fractional part is the candidate index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ToiId {
    number: ToiNumber,
    candidate: u8,
}

impl ToiId {
    pub fn new(number: ToiNumber, candidate: u8) -> Self {
        Self { number, candidate }
    }

    pub fn number(self) -> ToiNumber {
        self.number
    }

    pub fn candidate(self) -> u8 {
        self.candidate
    }
}

impl fmt::Display for ToiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.number, self.candidate)
    }
}

impl FromStr for ToiId {
    type Err = AtlasError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let captures = TOI_ID_RE
            .captures(value.trim())
            .ok_or_else(|| AtlasError::InvalidToi(value.to_string()))?;
        let number = captures[1]
            .parse::<u32>()
            .map_err(|_| AtlasError::InvalidToi(value.to_string()))?;
        // "100.1" is how a float column renders 100.10
        let fraction = &captures[2];
        let candidate = if fraction.len() == 1 {
            format!("{fraction}0")
        } else {
            fraction.to_string()
        };
        let candidate = candidate
            .parse::<u8>()
            .map_err(|_| AtlasError::InvalidToi(value.to_string()))?;
        Ok(Self {
            number: ToiNumber(number),
            candidate,
        })
    }
}

impl Serialize for ToiId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// TESS Input Catalog identifier of a star.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicId(u64);

impl TicId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TicId {
    type Err = AtlasError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let digits = trimmed
            .strip_prefix("TIC")
            .map(str::trim_start)
            .unwrap_or(trimmed);
        // catalog exports sometimes render integer columns as floats
        let digits = digits.strip_suffix(".0").unwrap_or(digits);
        digits
            .parse::<u64>()
            .map(Self)
            .map_err(|_| AtlasError::InvalidTic(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ToiCategory {
    All,
    Multi,
    Single,
    Norm,
}

impl fmt::Display for ToiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToiCategory::All => write!(f, "all"),
            ToiCategory::Multi => write!(f, "multi"),
            ToiCategory::Single => write!(f, "single"),
            ToiCategory::Norm => write!(f, "norm"),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_toi_number_with_prefix() {
        let toi: ToiNumber = "TOI-103".parse().unwrap();
        assert_eq!(toi.get(), 103);
        let toi: ToiNumber = " 42 ".parse().unwrap();
        assert_eq!(toi.get(), 42);
    }

    #[test]
    fn parse_toi_number_invalid() {
        let err = "abc".parse::<ToiNumber>().unwrap_err();
        assert_matches!(err, AtlasError::InvalidToi(_));
    }

    #[test]
    fn parse_toi_id_fraction() {
        let id: ToiId = "100.01".parse().unwrap();
        assert_eq!(id.number().get(), 100);
        assert_eq!(id.candidate(), 1);
        assert_eq!(id.to_string(), "100.01");

        let id: ToiId = "270.1".parse().unwrap();
        assert_eq!(id.candidate(), 10);
    }

    #[test]
    fn toi_id_orders_by_number_then_candidate() {
        let a: ToiId = "100.02".parse().unwrap();
        let b: ToiId = "100.10".parse().unwrap();
        let c: ToiId = "101.01".parse().unwrap();
        assert!(a < b && b < c);
    }

    #[test]
    fn parse_tic_id_variants() {
        assert_eq!("TIC 12345".parse::<TicId>().unwrap().get(), 12345);
        assert_eq!("231663901.0".parse::<TicId>().unwrap().get(), 231663901);
        assert_matches!("TIC x".parse::<TicId>(), Err(AtlasError::InvalidTic(_)));
    }
}
