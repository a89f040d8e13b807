use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::error::SelectionError;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
enum PeriodUnit {
    Year,
    Month,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    unit: PeriodUnit,
    start: NaiveDate,
}

impl Period {
    pub fn year(year: i32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, 1, 1).map(|start| Self {
            unit: PeriodUnit::Year,
            start,
        })
    }

    pub fn month(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|start| Self {
            unit: PeriodUnit::Month,
            start,
        })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn is_year(&self) -> bool {
        self.unit == PeriodUnit::Year
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            PeriodUnit::Year => write!(f, "{}", self.start.year()),
            PeriodUnit::Month => write!(f, "{}-{:02}", self.start.year(), self.start.month()),
        }
    }
}

impl FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let invalid = || format!("invalid period {s:?}: expected YYYY or YYYY-MM");
        match trimmed.split_once('-') {
            None => {
                let year = trimmed.parse::<i32>().map_err(|_| invalid())?;
                Period::year(year).ok_or_else(invalid)
            }
            Some((year, month)) => {
                let year = year.parse::<i32>().map_err(|_| invalid())?;
                let month = month.parse::<u32>().map_err(|_| invalid())?;
                Period::month(year, month).ok_or_else(invalid)
            }
        }
    }
}

impl TryFrom<String> for Period {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(value: Period) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum InputValue {
    Constant(f64),
    ByPeriod(IndexMap<String, f64>),
}

impl InputValue {
    pub fn value_for(&self, period: &Period) -> Option<f64> {
        match self {
            InputValue::Constant(v) => Some(*v),
            InputValue::ByPeriod(values) => values.get(&period.to_string()).copied(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Household {
    #[serde(default)]
    pub adults: Vec<String>,
    #[serde(default)]
    pub children: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Scenario {
    #[serde(default)]
    pub persons: IndexMap<String, IndexMap<String, InputValue>>,
    #[serde(default)]
    pub households: IndexMap<String, Household>,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntitySelector {
    #[default]
    First,
    Index(usize),
    Sum,
}

impl EntitySelector {
    pub fn select(self, values: &[f64]) -> Result<f64, SelectionError> {
        if values.is_empty() {
            return Err(SelectionError::Empty);
        }
        match self {
            EntitySelector::First => Ok(values[0]),
            EntitySelector::Index(index) => {
                values
                    .get(index)
                    .copied()
                    .ok_or(SelectionError::OutOfRange {
                        index,
                        len: values.len(),
                    })
            }
            EntitySelector::Sum => Ok(values.iter().sum()),
        }
    }
}
