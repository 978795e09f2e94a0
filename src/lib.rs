pub mod calendar;
pub mod date_util;
pub mod error;
pub mod metrics;
pub mod period;
pub mod report;
pub mod scope;
pub mod storage;

pub use error::{Error, Result};
pub use metrics::{
    AdvisorScope, AnnualGoals, Completion, GoalsRow, MergedRow, MetricVector, MonthlyRow,
    ProgressRow, Totals,
};
pub use period::{month_range, MonthKey};
pub use report::{Applied, Report, ReportRequest, ReportSources, ReportView};
pub use scope::{Advisor, Role, ScopeSelection};
pub use storage::repository::ProductLine;
pub use storage::Database;

use storage::repository;

/// Config key holding the id of the advisor running reports.
pub const CURRENT_ADVISOR_KEY: &str = "current_advisor";

/// Main entry point for the advisor dashboard's reporting side.
pub struct AdvisorMonitor {
    db: Database,
    sources: ReportSources,
}

impl AdvisorMonitor {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            sources: ReportSources::default(),
        }
    }

    /// Use a different set of goal/progress sources.
    pub fn with_sources(mut self, sources: ReportSources) -> Self {
        self.sources = sources;
        self
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    // ── Identity ───────────────────────────────────────────────────

    /// The advisor configured as the current user.
    pub async fn current_advisor(&self) -> Result<Advisor> {
        let id = self.config_get(CURRENT_ADVISOR_KEY).await?.ok_or_else(|| {
            Error::Config(format!(
                "no current advisor. Run: advisor-monitor config set {CURRENT_ADVISOR_KEY} <ID>"
            ))
        })?;
        self.advisor(&id).await
    }

    pub async fn advisor(&self, advisor_id: &str) -> Result<Advisor> {
        let found = self
            .db
            .reader()
            .call({
                let advisor_id = advisor_id.to_string();
                move |conn| repository::get_advisor(conn, &advisor_id)
            })
            .await?;
        found.ok_or_else(|| Error::NotFound(format!("advisor {advisor_id}")))
    }

    pub async fn advisors(&self) -> Result<Vec<Advisor>> {
        self.db
            .reader()
            .call(|conn| repository::list_advisors(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn upsert_advisor(&self, advisor: Advisor) -> Result<()> {
        if advisor.id == AdvisorScope::TEAM_KEY {
            return Err(Error::Other(format!(
                "{} is reserved for team totals",
                AdvisorScope::TEAM_KEY
            )));
        }
        if let Some(lead) = &advisor.team_lead_id {
            if lead == &advisor.id {
                return Err(Error::Other(format!("{} cannot lead themselves", advisor.id)));
            }
        }
        self.db
            .writer()
            .call(move |conn| repository::upsert_advisor(conn, &advisor))
            .await?;
        Ok(())
    }

    /// Advisor ids the current user gets for `selection`.
    pub async fn resolve_scope(&self, selection: &ScopeSelection) -> Result<Vec<String>> {
        let current = self.current_advisor().await?;
        let directory = self.advisors().await?;
        scope::resolve_scope(&current, &directory, selection)
    }

    // ── Reports ────────────────────────────────────────────────────

    /// Build the report the current user sees for `selection` over `[from, to]`.
    pub async fn report(
        &self,
        from: MonthKey,
        to: MonthKey,
        selection: &ScopeSelection,
    ) -> Result<Report> {
        let request = self.request(from, to, selection).await?;
        report::build_report(&self.db, &self.sources, &request).await
    }

    /// Like [`report`](Self::report), but applies the result to `view`.
    ///
    /// The view's token is taken before scope resolution, so a later call
    /// always supersedes this one. Scope errors are applied like report errors.
    pub async fn load_into(
        &self,
        view: &ReportView,
        from: MonthKey,
        to: MonthKey,
        selection: &ScopeSelection,
    ) -> Applied {
        let token = view.begin();
        match self.request(from, to, selection).await {
            Ok(request) => view.load_with(token, &self.db, &self.sources, &request).await,
            Err(e) => view.apply(token, Err(e)),
        }
    }

    async fn request(
        &self,
        from: MonthKey,
        to: MonthKey,
        selection: &ScopeSelection,
    ) -> Result<ReportRequest> {
        let advisor_ids = self.resolve_scope(selection).await?;
        let team = matches!(selection, ScopeSelection::Team);
        ReportRequest::new(from, to, advisor_ids, team)
    }

    // ── Goals ──────────────────────────────────────────────────────

    async fn check_goal_permission(&self, target_id: &str) -> Result<()> {
        let editor = self.current_advisor().await?;
        let directory = self.advisors().await?;
        if !directory.iter().any(|a| a.id == target_id) {
            return Err(Error::NotFound(format!("advisor {target_id}")));
        }
        if scope::can_edit_goals(&editor, target_id, &directory) {
            Ok(())
        } else {
            Err(Error::Forbidden(format!(
                "{} ({}) cannot edit goals for {target_id}",
                editor.id, editor.role
            )))
        }
    }

    pub async fn set_monthly_goal(
        &self,
        advisor_id: &str,
        month: MonthKey,
        metrics: MetricVector,
    ) -> Result<()> {
        self.check_goal_permission(advisor_id).await?;
        self.db
            .writer()
            .call({
                let advisor_id = advisor_id.to_string();
                move |conn| repository::set_monthly_goal(conn, &advisor_id, month, &metrics)
            })
            .await?;
        log::info!("Monthly goal for {advisor_id} in {month} updated");
        Ok(())
    }

    pub async fn set_annual_goal(
        &self,
        advisor_id: &str,
        year: i32,
        metrics: MetricVector,
    ) -> Result<()> {
        self.check_goal_permission(advisor_id).await?;
        self.db
            .writer()
            .call({
                let advisor_id = advisor_id.to_string();
                move |conn| repository::set_annual_goal(conn, &advisor_id, year, &metrics)
            })
            .await?;
        log::info!("Annual goal for {advisor_id} in {year} updated");
        Ok(())
    }

    // ── Activity ───────────────────────────────────────────────────

    pub async fn record_appointment(
        &self,
        advisor_id: &str,
        lead_name: Option<&str>,
        scheduled_on: chrono::NaiveDate,
        status: &str,
    ) -> Result<i64> {
        let advisor_id = advisor_id.to_string();
        let lead_name = lead_name.map(|s| s.to_string());
        let scheduled_on = date_util::date_key(scheduled_on);
        let status = status.to_string();
        let id = self
            .db
            .writer()
            .call(move |conn| {
                repository::insert_appointment(
                    conn,
                    &advisor_id,
                    lead_name.as_deref(),
                    &scheduled_on,
                    &status,
                )
            })
            .await?;
        Ok(id)
    }

    pub async fn record_contract(
        &self,
        advisor_id: &str,
        client_name: Option<&str>,
        signed_on: chrono::NaiveDate,
        product_line: ProductLine,
        amount: f64,
    ) -> Result<i64> {
        let advisor_id = advisor_id.to_string();
        let client_name = client_name.map(|s| s.to_string());
        let signed_on = date_util::date_key(signed_on);
        let id = self
            .db
            .writer()
            .call(move |conn| {
                repository::insert_contract(
                    conn,
                    &advisor_id,
                    client_name.as_deref(),
                    &signed_on,
                    product_line,
                    amount,
                )
            })
            .await?;
        Ok(id)
    }

    /// Appointments per day in `month` for the advisors in `selection`.
    pub async fn appointment_counts(
        &self,
        month: MonthKey,
        selection: &ScopeSelection,
    ) -> Result<std::collections::BTreeMap<chrono::NaiveDate, usize>> {
        let advisor_ids = self.resolve_scope(selection).await?;
        let (Some(start), Some(end)) = (
            date_util::first_day_of_month(month.year, month.month),
            date_util::last_day_of_month(month.year, month.month),
        ) else {
            return Err(Error::PeriodParse(month.to_key()));
        };
        let start = date_util::date_key(start);
        let end = date_util::date_key(end);
        let dates = self
            .db
            .reader()
            .call(move |conn| {
                repository::appointment_dates_in_range(conn, &advisor_ids, &start, &end)
            })
            .await?;
        Ok(calendar::count_by_day(&dates))
    }

    // ── Config ─────────────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::task::Poll;

    use super::*;

    fn advisor(id: &str, role: Role, lead: Option<&str>) -> Advisor {
        Advisor {
            id: id.to_string(),
            name: id.to_string(),
            email: None,
            role,
            team_lead_id: lead.map(|s| s.to_string()),
        }
    }

    fn mk(s: &str) -> MonthKey {
        MonthKey::parse(s).unwrap()
    }

    async fn monitor_as(current: &str) -> AdvisorMonitor {
        let db = Database::open_memory().await.unwrap();
        let monitor = AdvisorMonitor::new(db);
        monitor.upsert_advisor(advisor("boss", Role::Admin, None)).await.unwrap();
        monitor.upsert_advisor(advisor("lead", Role::TeamLead, None)).await.unwrap();
        monitor.upsert_advisor(advisor("jr1", Role::Junior, Some("lead"))).await.unwrap();
        monitor.upsert_advisor(advisor("jr2", Role::Junior, Some("boss"))).await.unwrap();
        monitor.config_set(CURRENT_ADVISOR_KEY, current).await.unwrap();
        monitor
    }

    #[tokio::test]
    async fn test_current_advisor_requires_config() {
        let monitor = AdvisorMonitor::new(Database::open_memory().await.unwrap());
        assert!(matches!(monitor.current_advisor().await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_self_lead_rejected() {
        let monitor = AdvisorMonitor::new(Database::open_memory().await.unwrap());
        let result = monitor.upsert_advisor(advisor("x", Role::TeamLead, Some("x"))).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_team_key_is_not_an_advisor_id() {
        let monitor = AdvisorMonitor::new(Database::open_memory().await.unwrap());
        let result = monitor
            .upsert_advisor(advisor(AdvisorScope::TEAM_KEY, Role::Junior, None))
            .await;
        assert!(matches!(result, Err(Error::Other(_))));
        assert!(monitor.advisors().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_team_lead_report_over_team() {
        let monitor = monitor_as("lead").await;
        let goal = |consulenze| MetricVector {
            consulenze,
            ..Default::default()
        };
        monitor.set_monthly_goal("jr1", mk("2025-01"), goal(3)).await.unwrap();
        monitor.set_monthly_goal("lead", mk("2025-01"), goal(4)).await.unwrap();
        let day = chrono::NaiveDate::from_ymd_opt(2025, 1, 9).unwrap();
        monitor.record_appointment("jr1", Some("Rossi"), day, "completed").await.unwrap();
        monitor
            .record_contract("lead", None, day, ProductLine::Danni, 300.0)
            .await
            .unwrap();

        let report = monitor
            .report(mk("2025-01"), mk("2025-01"), &ScopeSelection::Team)
            .await
            .unwrap();
        assert_eq!(report.scope, AdvisorScope::Team);
        assert_eq!(report.totals.goal.consulenze, 7);
        assert_eq!(report.totals.actual.consulenze, 1);
        assert_eq!(report.totals.actual.prod_danni, 300.0);

        let personal = monitor
            .report(mk("2025-01"), mk("2025-01"), &ScopeSelection::Personal)
            .await
            .unwrap();
        assert_eq!(personal.scope, AdvisorScope::advisor("lead"));
        assert_eq!(personal.totals.goal.consulenze, 4);
    }

    #[tokio::test]
    async fn test_goal_permissions() {
        let monitor = monitor_as("lead").await;
        let m = MetricVector::default();
        assert!(monitor.set_monthly_goal("jr1", mk("2025-01"), m).await.is_ok());
        assert!(matches!(
            monitor.set_monthly_goal("jr2", mk("2025-01"), m).await,
            Err(Error::Forbidden(_))
        ));
        assert!(matches!(
            monitor.set_annual_goal("ghost", 2025, m).await,
            Err(Error::NotFound(_))
        ));

        let junior = monitor_as("jr1").await;
        assert!(matches!(
            junior.set_annual_goal("jr1", 2025, m).await,
            Err(Error::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_advisor_selection_outside_team_forbidden() {
        let monitor = monitor_as("lead").await;
        let result = monitor
            .report(mk("2025-01"), mk("2025-02"), &ScopeSelection::Advisor("jr2".into()))
            .await;
        assert!(matches!(result, Err(Error::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_load_into_view() {
        let monitor = monitor_as("boss").await;
        let view = ReportView::new();
        let applied = monitor
            .load_into(&view, mk("2025-01"), mk("2025-06"), &ScopeSelection::Team)
            .await;
        assert_eq!(applied, Applied::Updated);
        assert_eq!(view.report().unwrap().rows.len(), 6);
    }

    #[tokio::test]
    async fn test_load_into_older_call_never_overwrites_newer() {
        let monitor = monitor_as("boss").await;
        let view = ReportView::new();
        let team = ScopeSelection::Team;

        // Start the older load and leave it waiting on scope resolution
        let mut older = Box::pin(monitor.load_into(&view, mk("2025-01"), mk("2025-01"), &team));
        let first_poll = std::future::poll_fn(|cx| Poll::Ready(older.as_mut().poll(cx))).await;
        assert!(first_poll.is_pending());

        let newer = monitor.load_into(&view, mk("2025-02"), mk("2025-03"), &team).await;
        assert_eq!(newer, Applied::Updated);
        assert_eq!(older.await, Applied::Discarded);
        assert_eq!(view.report().unwrap().from, mk("2025-02"));
    }

    #[tokio::test]
    async fn test_load_into_scope_error_is_applied() {
        let monitor = monitor_as("lead").await;
        let view = ReportView::new();
        monitor
            .load_into(&view, mk("2025-01"), mk("2025-01"), &ScopeSelection::Personal)
            .await;

        let applied = monitor
            .load_into(&view, mk("2025-02"), mk("2025-02"), &ScopeSelection::Advisor("jr2".into()))
            .await;
        assert_eq!(applied, Applied::Failed);
        assert!(view.error().unwrap().contains("jr2"));
        assert_eq!(view.report().unwrap().from, mk("2025-01"));
    }

    #[tokio::test]
    async fn test_appointment_counts() {
        let monitor = monitor_as("jr1").await;
        let d = |day| chrono::NaiveDate::from_ymd_opt(2025, 3, day).unwrap();
        monitor.record_appointment("jr1", None, d(3), "scheduled").await.unwrap();
        monitor.record_appointment("jr1", None, d(3), "completed").await.unwrap();
        monitor.record_appointment("jr1", None, d(4), "cancelled").await.unwrap();

        let counts = monitor
            .appointment_counts(mk("2025-03"), &ScopeSelection::Personal)
            .await
            .unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[&d(3)], 2);
    }
}
