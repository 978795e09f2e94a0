pub mod types;

pub use types::*;

use std::collections::{BTreeMap, HashMap};

use crate::period::{month_range, MonthKey};

/// Sum per-advisor rows into one `TEAM` row per month.
///
/// Rows come back sorted by month; callers should not rely on it since
/// [`merge`] re-keys by month anyway.
pub fn aggregate_team(rows: &[MonthlyRow]) -> Vec<MonthlyRow> {
    let mut by_month: BTreeMap<MonthKey, MetricVector> = BTreeMap::new();
    for row in rows {
        by_month.entry(row.month).or_default().accumulate(&row.metrics);
    }
    by_month
        .into_iter()
        .map(|(month, metrics)| MonthlyRow {
            advisor_scope: AdvisorScope::Team,
            month,
            metrics,
        })
        .collect()
}

/// Sum per-advisor annual goals into one `TEAM` entry per year.
pub fn aggregate_team_annual(rows: &[AnnualGoals]) -> Vec<AnnualGoals> {
    let mut by_year: BTreeMap<i32, MetricVector> = BTreeMap::new();
    for row in rows {
        by_year.entry(row.year).or_default().accumulate(&row.metrics);
    }
    by_year
        .into_iter()
        .map(|(year, metrics)| AnnualGoals {
            advisor_scope: AdvisorScope::Team,
            year,
            metrics,
        })
        .collect()
}

/// Line up goals and actuals month by month over `[from, to]`.
///
/// Every month in the range gets a row, zero-filled when neither side has
/// data. When several rows share a month the last one wins.
pub fn merge(
    goals: &[GoalsRow],
    progress: &[ProgressRow],
    from: MonthKey,
    to: MonthKey,
) -> Vec<MergedRow> {
    let goal_by_month = index_by_month(goals);
    let actual_by_month = index_by_month(progress);

    month_range(from, to)
        .into_iter()
        .map(|month| MergedRow {
            month,
            label: month.label(),
            goal: goal_by_month.get(&month).copied().unwrap_or_default(),
            actual: actual_by_month.get(&month).copied().unwrap_or_default(),
        })
        .collect()
}

fn index_by_month(rows: &[MonthlyRow]) -> HashMap<MonthKey, MetricVector> {
    let mut map = HashMap::with_capacity(rows.len());
    for row in rows {
        if map.insert(row.month, row.metrics).is_some() {
            log::debug!(
                "Duplicate row for {} in {}, keeping the last one",
                row.advisor_scope,
                row.month
            );
        }
    }
    map
}

/// Sum goal and actual vectors across every merged row.
pub fn totals(rows: &[MergedRow]) -> Totals {
    let mut totals = Totals::default();
    for row in rows {
        totals.goal.accumulate(&row.goal);
        totals.actual.accumulate(&row.actual);
    }
    totals
}

/// Percent of `goal` reached by `actual`. A zero goal reads as 0%.
pub fn pct_complete(actual: f64, goal: f64) -> f64 {
    if goal.abs() < f64::EPSILON {
        0.0
    } else {
        actual / goal * 100.0
    }
}

impl Totals {
    pub fn completion(&self) -> Completion {
        let (g, a) = (&self.goal, &self.actual);
        Completion {
            consulenze: pct_complete(a.consulenze as f64, g.consulenze as f64),
            contratti: pct_complete(a.contratti as f64, g.contratti as f64),
            prod_danni: pct_complete(a.prod_danni, g.prod_danni),
            prod_vprot: pct_complete(a.prod_vprot, g.prod_vprot),
            prod_vpr: pct_complete(a.prod_vpr, g.prod_vpr),
            prod_vpu: pct_complete(a.prod_vpu, g.prod_vpu),
            production: pct_complete(a.production(), g.production()),
        }
    }
}
