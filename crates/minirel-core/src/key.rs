//! Sort/join key selection and record comparison.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::record::Record;

/// Which record field(s) define ordering and equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyMode {
    ById,
    ByNumeric,
    ByText,
    ByNumericThenText,
}

/// Compare two records under the given key mode. Text comparison is
/// byte-lexicographic; the composite mode compares the numeric key first
/// and breaks ties on text.
pub fn compare(a: &Record, b: &Record, mode: KeyMode) -> Ordering {
    match mode {
        KeyMode::ById => a.id.cmp(&b.id),
        KeyMode::ByNumeric => a.num.cmp(&b.num),
        KeyMode::ByText => a.text_bytes().cmp(b.text_bytes()),
        KeyMode::ByNumericThenText => a
            .num
            .cmp(&b.num)
            .then_with(|| a.text_bytes().cmp(b.text_bytes())),
    }
}

impl TryFrom<u8> for KeyMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Error> {
        match value {
            0 => Ok(KeyMode::ById),
            1 => Ok(KeyMode::ByNumeric),
            2 => Ok(KeyMode::ByText),
            3 => Ok(KeyMode::ByNumericThenText),
            other => Err(Error::Config(format!("unknown key mode {other}"))),
        }
    }
}

impl FromStr for KeyMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "id" => Ok(KeyMode::ById),
            "num" => Ok(KeyMode::ByNumeric),
            "text" => Ok(KeyMode::ByText),
            "num-text" => Ok(KeyMode::ByNumericThenText),
            other => Err(Error::Config(format!(
                "unknown key mode '{other}' (expected id, num, text or num-text)"
            ))),
        }
    }
}
