use std::io;

use chrono::NaiveDate;
use thiserror::Error;

use super::types::Period;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParameterError {
    #[error("parameter not found: {path}")]
    NotFound { path: String },
    #[error("{path} is a parameter node, not a dated parameter")]
    NotAParameter { path: String },
    #[error("invalid parameter path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("parameter {path} has no value in force on {date}")]
    NoValue { path: String, date: NaiveDate },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    #[error("variable {0} is not defined in this legislation")]
    UnknownVariable(String),
    #[error("variable {variable} cannot be computed for period {period}")]
    UnsupportedPeriod { variable: String, period: Period },
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    #[error("circular definition while computing {variable} for {period}")]
    Cycle { variable: String, period: Period },
    #[error("household {household} references unknown person {person}")]
    UnknownPerson { household: String, person: String },
    #[error("invalid input {variable} for {entity}: {reason}")]
    InvalidInput {
        variable: String,
        entity: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SelectionError {
    #[error("simulation returned no values")]
    Empty,
    #[error("entity index {index} out of range for {len} results")]
    OutOfRange { index: usize, len: usize },
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to write chart {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("scenario {scenario}: cannot start simulation for {variant}: {source}")]
    Instantiate {
        scenario: String,
        variant: String,
        #[source]
        source: SimulationError,
    },
    #[error("scenario {scenario}: {variant}.{quantity} failed for {period}: {source}")]
    Calculate {
        scenario: String,
        variant: String,
        quantity: String,
        period: Period,
        #[source]
        source: SimulationError,
    },
    #[error("scenario {scenario}: {variant}.{quantity} for {period}: {source}")]
    Select {
        scenario: String,
        variant: String,
        quantity: String,
        period: Period,
        #[source]
        source: SelectionError,
    },
    #[error("scenario {scenario}: {source}")]
    Render {
        scenario: String,
        #[source]
        source: RenderError,
    },
}
