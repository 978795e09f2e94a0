pub mod source;
pub mod view;

pub use source::{MonthlySource, RelationSource, ReportSources, SourceList};
pub use view::{Applied, ReportView, RequestToken};

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::metrics::{
    self, AdvisorScope, AnnualGoals, Completion, GoalsRow, MergedRow, ProgressRow, Totals,
};
use crate::period::{month_range, months_by_year, MonthKey};
use crate::storage::{repository, Database};

/// What a report covers: a month range and the advisors in scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRequest {
    pub from: MonthKey,
    pub to: MonthKey,
    pub advisor_ids: Vec<String>,
    /// Sum the advisors into a single `TEAM` series.
    pub team: bool,
}

impl ReportRequest {
    /// Build a request, rejecting ranges that end before they start.
    pub fn new(from: MonthKey, to: MonthKey, advisor_ids: Vec<String>, team: bool) -> Result<Self> {
        if to < from {
            return Err(Error::InvalidRange(format!("{to} is before {from}")));
        }
        Ok(Self {
            from,
            to,
            advisor_ids,
            team,
        })
    }

    pub fn months_by_year(&self) -> BTreeMap<i32, Vec<u32>> {
        months_by_year(&month_range(self.from, self.to))
    }

    /// The scope label rows of this report carry.
    pub fn scope(&self) -> AdvisorScope {
        match (self.team, self.advisor_ids.as_slice()) {
            (false, [only]) => AdvisorScope::Advisor(only.clone()),
            _ => AdvisorScope::Team,
        }
    }
}

/// Goal vs. actual for a month range, ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub scope: AdvisorScope,
    pub from: MonthKey,
    pub to: MonthKey,
    pub rows: Vec<MergedRow>,
    pub totals: Totals,
    pub completion: Completion,
    /// Yearly targets for each year the range touches.
    pub annual: Vec<AnnualGoals>,
}

/// Monthly goals for the advisors, trying each goal source in order.
pub async fn fetch_goals(
    db: &Database,
    sources: &ReportSources,
    months_by_year: &BTreeMap<i32, Vec<u32>>,
    advisor_ids: &[String],
) -> Result<Vec<GoalsRow>> {
    fetch_monthly(db, sources.goals.clone(), months_by_year, advisor_ids).await
}

/// Realized monthly values for the advisors.
pub async fn fetch_progress(
    db: &Database,
    sources: &ReportSources,
    months_by_year: &BTreeMap<i32, Vec<u32>>,
    advisor_ids: &[String],
) -> Result<Vec<ProgressRow>> {
    fetch_monthly(db, sources.progress.clone(), months_by_year, advisor_ids).await
}

async fn fetch_monthly(
    db: &Database,
    sources: SourceList,
    months_by_year: &BTreeMap<i32, Vec<u32>>,
    advisor_ids: &[String],
) -> Result<Vec<metrics::MonthlyRow>> {
    if advisor_ids.is_empty() {
        return Ok(Vec::new());
    }
    let months_by_year = months_by_year.clone();
    let advisor_ids = advisor_ids.to_vec();
    db.reader()
        .call(move |conn| {
            source::fetch_with_fallback(conn, &sources, &months_by_year, &advisor_ids)
        })
        .await
        .map_err(|e| Error::Database(e.to_string()))
}

/// Yearly targets for the advisors.
pub async fn fetch_annual_goals(
    db: &Database,
    years: &[i32],
    advisor_ids: &[String],
) -> Result<Vec<AnnualGoals>> {
    if advisor_ids.is_empty() {
        return Ok(Vec::new());
    }
    let years = years.to_vec();
    let advisor_ids = advisor_ids.to_vec();
    db.reader()
        .call(move |conn| repository::query_annual_goals(conn, &years, &advisor_ids))
        .await
        .map_err(|e| Error::Database(e.to_string()))
}

/// Fetch, aggregate, merge and total one report.
///
/// Goals and progress are fetched concurrently; either failing fails the
/// report.
pub async fn build_report(
    db: &Database,
    sources: &ReportSources,
    request: &ReportRequest,
) -> Result<Report> {
    let by_year = request.months_by_year();
    let years: Vec<i32> = by_year.keys().copied().collect();
    log::debug!(
        "Building report {}..{} for {} advisors (team: {})",
        request.from,
        request.to,
        request.advisor_ids.len(),
        request.team
    );

    let (goals, progress, annual) = tokio::try_join!(
        fetch_goals(db, sources, &by_year, &request.advisor_ids),
        fetch_progress(db, sources, &by_year, &request.advisor_ids),
        fetch_annual_goals(db, &years, &request.advisor_ids),
    )?;

    let scope = request.scope();
    let (goals, progress, annual) = if scope.is_team() {
        (
            metrics::aggregate_team(&goals),
            metrics::aggregate_team(&progress),
            metrics::aggregate_team_annual(&annual),
        )
    } else {
        (goals, progress, annual)
    };

    let rows = metrics::merge(&goals, &progress, request.from, request.to);
    let totals = metrics::totals(&rows);
    let completion = totals.completion();

    Ok(Report {
        scope,
        from: request.from,
        to: request.to,
        rows,
        totals,
        completion,
        annual,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::metrics::MetricVector;
    use crate::scope::{Advisor, Role};
    use crate::storage::repository::ProductLine;

    fn mk(s: &str) -> MonthKey {
        MonthKey::parse(s).unwrap()
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    async fn seed(db: &Database) {
        db.writer()
            .call(|conn| {
                for (id, role, lead) in [
                    ("lead", Role::TeamLead, None),
                    ("a1", Role::Junior, Some("lead")),
                    ("a2", Role::Junior, Some("lead")),
                ] {
                    repository::upsert_advisor(
                        conn,
                        &Advisor {
                            id: id.to_string(),
                            name: id.to_string(),
                            email: None,
                            role,
                            team_lead_id: lead.map(|s: &str| s.to_string()),
                        },
                    )?;
                }
                let goal = |c| MetricVector {
                    consulenze: c,
                    ..Default::default()
                };
                let jan = MonthKey { year: 2025, month: 1 };
                let mar = MonthKey { year: 2025, month: 3 };
                repository::set_monthly_goal(conn, "a1", jan, &goal(10))?;
                repository::set_monthly_goal(conn, "a1", mar, &goal(5))?;
                repository::set_monthly_goal(conn, "a2", jan, &goal(4))?;

                for day in 1..=7 {
                    let date = format!("2025-01-{day:02}");
                    repository::insert_appointment(conn, "a1", None, &date, "completed")?;
                }
                repository::insert_appointment(conn, "a2", None, "2025-01-15", "completed")?;
                repository::insert_contract(
                    conn,
                    "a2",
                    None,
                    "2025-02-10",
                    ProductLine::Vpr,
                    1500.0,
                )?;

                repository::set_annual_goal(conn, "a1", 2025, &goal(60))?;
                repository::set_annual_goal(conn, "a2", 2025, &goal(40))?;
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[test]
    fn test_request_rejects_reversed_range() {
        let err = ReportRequest::new(mk("2025-03"), mk("2025-01"), ids(&["a1"]), false);
        assert!(matches!(err, Err(Error::InvalidRange(_))));
    }

    #[test]
    fn test_request_scope() {
        let single = ReportRequest::new(mk("2025-01"), mk("2025-01"), ids(&["a1"]), false).unwrap();
        assert_eq!(single.scope(), AdvisorScope::advisor("a1"));
        let team = ReportRequest::new(mk("2025-01"), mk("2025-01"), ids(&["a1"]), true).unwrap();
        assert_eq!(team.scope(), AdvisorScope::Team);
    }

    #[tokio::test]
    async fn test_personal_report() {
        let db = Database::open_memory().await.unwrap();
        seed(&db).await;

        let request =
            ReportRequest::new(mk("2025-01"), mk("2025-03"), ids(&["a1"]), false).unwrap();
        let report = build_report(&db, &ReportSources::default(), &request).await.unwrap();

        assert_eq!(report.scope, AdvisorScope::advisor("a1"));
        assert_eq!(report.rows.len(), 3);
        let goal: Vec<i64> = report.rows.iter().map(|r| r.goal.consulenze).collect();
        let actual: Vec<i64> = report.rows.iter().map(|r| r.actual.consulenze).collect();
        assert_eq!(goal, vec![10, 0, 5]);
        assert_eq!(actual, vec![7, 0, 0]);
        assert_eq!(report.totals.goal.consulenze, 15);
        assert_eq!(report.totals.actual.consulenze, 7);
        assert!((report.completion.consulenze - 7.0 / 15.0 * 100.0).abs() < 1e-9);
        assert_eq!(report.annual.len(), 1);
        assert_eq!(report.annual[0].metrics.consulenze, 60);
    }

    #[tokio::test]
    async fn test_team_report_sums_advisors() {
        let db = Database::open_memory().await.unwrap();
        seed(&db).await;

        let team = ids(&["lead", "a1", "a2"]);
        let request = ReportRequest::new(mk("2025-01"), mk("2025-02"), team, true).unwrap();
        let report = build_report(&db, &ReportSources::default(), &request).await.unwrap();

        assert_eq!(report.scope, AdvisorScope::Team);
        assert_eq!(report.rows[0].goal.consulenze, 14);
        assert_eq!(report.rows[0].actual.consulenze, 8);
        assert_eq!(report.rows[1].actual.contratti, 1);
        assert_eq!(report.rows[1].actual.prod_vpr, 1500.0);
        assert_eq!(report.annual.len(), 1);
        assert!(report.annual[0].advisor_scope.is_team());
        assert_eq!(report.annual[0].metrics.consulenze, 100);
    }

    #[tokio::test]
    async fn test_empty_scope_is_all_zero() {
        let db = Database::open_memory().await.unwrap();
        seed(&db).await;

        let request = ReportRequest::new(mk("2024-12"), mk("2025-02"), Vec::new(), true).unwrap();
        let report = build_report(&db, &ReportSources::default(), &request).await.unwrap();
        assert_eq!(report.rows.len(), 3);
        assert!(report.rows.iter().all(|r| r.goal.is_zero() && r.actual.is_zero()));
        assert!(report.annual.is_empty());
    }

    #[tokio::test]
    async fn test_goals_fall_back_to_annual_view() {
        let db = Database::open_memory().await.unwrap();
        seed(&db).await;
        db.writer()
            .call(|conn| conn.execute_batch("DROP TABLE advisor_goals_monthly"))
            .await
            .unwrap();

        let request =
            ReportRequest::new(mk("2025-01"), mk("2025-02"), ids(&["a1"]), false).unwrap();
        let report = build_report(&db, &ReportSources::default(), &request).await.unwrap();
        // 60 a year spread over twelve months
        assert!(report.rows.iter().all(|r| r.goal.consulenze == 5));
    }

    #[tokio::test]
    async fn test_annual_view_months_add_up_to_annual_goal() {
        let db = Database::open_memory().await.unwrap();
        seed(&db).await;
        db.writer()
            .call(|conn| {
                conn.execute_batch("DROP TABLE advisor_goals_monthly")?;
                let goal = MetricVector {
                    consulenze: 5,
                    contratti: 30,
                    ..Default::default()
                };
                repository::set_annual_goal(conn, "a2", 2025, &goal)
            })
            .await
            .unwrap();

        let request =
            ReportRequest::new(mk("2025-01"), mk("2025-12"), ids(&["a2"]), false).unwrap();
        let report = build_report(&db, &ReportSources::default(), &request).await.unwrap();
        assert_eq!(report.rows.len(), 12);
        assert_eq!(report.totals.goal.consulenze, 5);
        assert_eq!(report.totals.goal.contratti, 30);
        // Remainders land on the first months of the year
        assert_eq!(report.rows[0].goal.consulenze, 1);
        assert_eq!(report.rows[11].goal.consulenze, 0);
        assert_eq!(report.rows[0].goal.contratti, 3);
        assert_eq!(report.rows[11].goal.contratti, 2);
    }

    #[tokio::test]
    async fn test_progress_failure_fails_report() {
        let db = Database::open_memory().await.unwrap();
        seed(&db).await;

        let sources = ReportSources {
            progress: vec![Arc::new(RelationSource(
                repository::MonthlyRelation::GoalsTable,
            ))],
            ..ReportSources::default()
        };
        db.writer()
            .call(|conn| conn.execute_batch("DROP TABLE advisor_goals_monthly"))
            .await
            .unwrap();

        let request =
            ReportRequest::new(mk("2025-01"), mk("2025-02"), ids(&["a1"]), false).unwrap();
        let result = build_report(&db, &sources, &request).await;
        assert!(matches!(result, Err(Error::Database(_))));
    }
}
