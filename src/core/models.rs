//! Data structures shared by the pipeline, the batch processor and callers.

use crate::utils::smtp::SmtpOutcome;
use serde::{Deserialize, Serialize};

/// A raw input record, e.g. one row of an uploaded list.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// A mail exchange host and its preference (lower is preferred).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MxRecord {
    pub priority: u16,
    pub exchange: String,
}

impl MxRecord {
    pub fn new(priority: u16, exchange: impl Into<String>) -> Self {
        Self {
            priority,
            exchange: exchange.into(),
        }
    }
}

/// Pass/fail flag for every pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checks {
    pub format: bool,
    pub dns: bool,
    pub mx: bool,
    pub spf: bool,
    pub smtp: bool,
    pub mailbox: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationDetails {
    pub mx_records: Vec<MxRecord>,
    pub spf_record: Option<String>,
    pub smtp_response: Option<SmtpOutcome>,
}

/// The verdict for one address. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub email: String,
    pub valid: bool,
    pub reason: String,
    pub checks: Checks,
    pub details: ValidationDetails,
}

impl ValidationResult {
    /// A result that failed before any check could pass.
    pub fn failed(email: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            valid: false,
            reason: reason.into(),
            checks: Checks::default(),
            details: ValidationDetails::default(),
        }
    }
}

/// A source record augmented with its validation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    #[serde(flatten)]
    pub fields: Record,
    pub validation: ValidationResult,
}

/// Progress events emitted by [`crate::validate_batch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchEvent {
    Init {
        total_records: usize,
        field_names: Vec<String>,
    },
    Progress {
        /// `processed * 100 / total`, never decreasing.
        percent: u8,
        records: Vec<BatchRecord>,
    },
    Error {
        message: String,
    },
    Complete,
}
