use serde::{Serialize, Serializer};

use crate::period::MonthKey;

/// The six counters tracked per advisor per month. Always fully populated;
/// a missing value is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricVector {
    /// Appointments held.
    pub consulenze: i64,
    /// Contracts signed.
    pub contratti: i64,
    pub prod_danni: f64,
    pub prod_vprot: f64,
    pub prod_vpr: f64,
    pub prod_vpu: f64,
}

impl MetricVector {
    /// Add every field of `other` into `self`.
    pub fn accumulate(&mut self, other: &MetricVector) {
        self.consulenze += other.consulenze;
        self.contratti += other.contratti;
        self.prod_danni += other.prod_danni;
        self.prod_vprot += other.prod_vprot;
        self.prod_vpr += other.prod_vpr;
        self.prod_vpu += other.prod_vpu;
    }

    /// Total production across the four product lines.
    pub fn production(&self) -> f64 {
        self.prod_danni + self.prod_vprot + self.prod_vpr + self.prod_vpu
    }

    pub fn is_zero(&self) -> bool {
        *self == MetricVector::default()
    }
}

/// Whose numbers a row carries: one advisor, or the synthetic team sum.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AdvisorScope {
    Advisor(String),
    Team,
}

impl AdvisorScope {
    pub const TEAM_KEY: &'static str = "TEAM";

    pub fn advisor(id: impl Into<String>) -> Self {
        AdvisorScope::Advisor(id.into())
    }

    pub fn is_team(&self) -> bool {
        matches!(self, AdvisorScope::Team)
    }
}

impl std::fmt::Display for AdvisorScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdvisorScope::Advisor(id) => write!(f, "{id}"),
            AdvisorScope::Team => write!(f, "{}", Self::TEAM_KEY),
        }
    }
}

impl Serialize for AdvisorScope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// One advisor-month (or team-month) of metrics. Used for both targets and
/// realized values; see [`GoalsRow`] and [`ProgressRow`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRow {
    pub advisor_scope: AdvisorScope,
    pub month: MonthKey,
    pub metrics: MetricVector,
}

/// A monthly target.
pub type GoalsRow = MonthlyRow;

/// Realized monthly values.
pub type ProgressRow = MonthlyRow;

/// Yearly target for an advisor or the team.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnualGoals {
    pub advisor_scope: AdvisorScope,
    pub year: i32,
    pub metrics: MetricVector,
}

/// Goal and actual side by side for one month of a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRow {
    pub month: MonthKey,
    pub label: String,
    pub goal: MetricVector,
    pub actual: MetricVector,
}

/// Range-wide sums of the goal and actual vectors.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Totals {
    pub goal: MetricVector,
    pub actual: MetricVector,
}

/// Percent of goal reached per metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Completion {
    pub consulenze: f64,
    pub contratti: f64,
    pub prod_danni: f64,
    pub prod_vprot: f64,
    pub prod_vpr: f64,
    pub prod_vpu: f64,
    pub production: f64,
}
