//! Bank — the isolation boundary
//!
//! Every other entity in the store belongs to exactly one bank. A bank also
//! carries the tuning knobs (`BankConfig`) that `retain`/`recall`/
//! `consolidate` read at call time, merged call-site > bank > instance
//! defaults > hard-coded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length of `Bank::mission` once it has been through an LLM merge.
pub const MAX_MISSION_LEN: usize = 500;

/// LLM extraction prompt selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    #[default]
    Concise,
    Verbose,
    Custom,
}

/// Agent iteration budget for `reflect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReflectBudget {
    Low,
    #[default]
    Mid,
    High,
}

impl ReflectBudget {
    /// Agent iterations this budget maps to.
    pub fn iterations(self) -> u32 {
        match self {
            ReflectBudget::Low => 3,
            ReflectBudget::Mid => 5,
            ReflectBudget::High => 8,
        }
    }
}

/// Per-bank tuning knobs. Every field is optional so call-site,
/// bank-level, and instance-level configs can be merged by taking the
/// first `Some` in that priority order.
///
/// Any additional knob a future caller serializes into the `config` JSON
/// column that this struct doesn't know about is ignored gracefully on
/// deserialization (`#[serde(default)]` everywhere, no `deny_unknown_fields`
/// here — unlike input DTOs at the API boundary).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_mode: Option<ExtractionMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_guidelines: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_consolidation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflect_budget: Option<ReflectBudget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_threshold: Option<f64>,
}

impl BankConfig {
    /// Merge `self` (call-site) over `bank` over `defaults`, taking the
    /// first `Some` for each field.
    pub fn merge(&self, bank: &BankConfig, defaults: &BankConfig) -> BankConfig {
        BankConfig {
            extraction_mode: self
                .extraction_mode
                .or(bank.extraction_mode)
                .or(defaults.extraction_mode),
            custom_guidelines: self
                .custom_guidelines
                .clone()
                .or_else(|| bank.custom_guidelines.clone())
                .or_else(|| defaults.custom_guidelines.clone()),
            enable_consolidation: self
                .enable_consolidation
                .or(bank.enable_consolidation)
                .or(defaults.enable_consolidation),
            reflect_budget: self
                .reflect_budget
                .or(bank.reflect_budget)
                .or(defaults.reflect_budget),
            dedup_threshold: self
                .dedup_threshold
                .or(bank.dedup_threshold)
                .or(defaults.dedup_threshold),
        }
    }

    pub fn extraction_mode_or_default(&self) -> ExtractionMode {
        self.extraction_mode.unwrap_or_default()
    }

    pub fn enable_consolidation_or_default(&self) -> bool {
        self.enable_consolidation.unwrap_or(true)
    }

    pub fn dedup_threshold_or_default(&self) -> f64 {
        self.dedup_threshold.unwrap_or(0.92)
    }
}

/// Three integer personality traits, each clamped to `[1,5]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disposition {
    pub skepticism: u8,
    pub literalism: u8,
    pub empathy: u8,
}

impl Default for Disposition {
    fn default() -> Self {
        Self {
            skepticism: 3,
            literalism: 3,
            empathy: 3,
        }
    }
}

impl Disposition {
    fn clamp_trait(v: u8) -> u8 {
        v.clamp(1, 5)
    }

    /// Build a disposition, clamping every trait into `[1,5]`.
    pub fn new(skepticism: u8, literalism: u8, empathy: u8) -> Self {
        Self {
            skepticism: Self::clamp_trait(skepticism),
            literalism: Self::clamp_trait(literalism),
            empathy: Self::clamp_trait(empathy),
        }
    }

    pub fn is_valid(&self) -> bool {
        (1..=5).contains(&self.skepticism)
            && (1..=5).contains(&self.literalism)
            && (1..=5).contains(&self.empathy)
    }
}

/// An isolation boundary. Every other entity belongs to exactly one bank.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bank {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub config: BankConfig,
    pub disposition: Disposition,
    pub mission: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a bank.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateBankInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: BankConfig,
    #[serde(default)]
    pub disposition: Option<Disposition>,
    #[serde(default)]
    pub mission: Option<String>,
}
