use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::{build_report, Report, ReportRequest, ReportSources};
use crate::error::Result;
use crate::storage::Database;

/// Identifies one load of a [`ReportView`]. Only the most recent token's
/// result is ever applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestToken(u64);

impl RequestToken {
    pub fn generation(&self) -> u64 {
        self.0
    }
}

/// What happened to a finished load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The report is now the one on display.
    Updated,
    /// The load failed; the previous report is still on display.
    Failed,
    /// A newer load was started in the meantime; the result was dropped.
    Discarded,
}

#[derive(Debug, Default)]
struct ViewState {
    report: Option<Report>,
    error: Option<String>,
}

/// One on-screen report: the last successfully loaded report plus the last
/// error, guarded against out-of-order responses.
#[derive(Debug, Default)]
pub struct ReportView {
    generation: AtomicU64,
    state: Mutex<ViewState>,
}

impl ReportView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new load, superseding any load still in flight.
    pub fn begin(&self) -> RequestToken {
        RequestToken(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, token: RequestToken) -> bool {
        self.generation.load(Ordering::SeqCst) == token.0
    }

    /// Record the outcome of the load identified by `token`.
    pub fn apply(&self, token: RequestToken, result: Result<Report>) -> Applied {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        // Checked under the lock so two finishing loads cannot interleave.
        if !self.is_current(token) {
            log::info!(
                "Discarding stale report response (generation {}, latest {})",
                token.0,
                self.generation.load(Ordering::SeqCst)
            );
            return Applied::Discarded;
        }
        match result {
            Ok(report) => {
                state.report = Some(report);
                state.error = None;
                Applied::Updated
            }
            Err(e) => {
                log::error!("Report load failed: {e}");
                state.error = Some(e.to_string());
                Applied::Failed
            }
        }
    }

    /// Build a report for `request` and apply it to this view.
    pub async fn load(
        &self,
        db: &Database,
        sources: &ReportSources,
        request: &ReportRequest,
    ) -> Applied {
        let token = self.begin();
        self.load_with(token, db, sources, request).await
    }

    /// Like [`load`](Self::load), for a token taken before the request was
    /// known.
    pub async fn load_with(
        &self,
        token: RequestToken,
        db: &Database,
        sources: &ReportSources,
        request: &ReportRequest,
    ) -> Applied {
        let result = build_report(db, sources, request).await;
        self.apply(token, result)
    }

    /// The report currently on display.
    pub fn report(&self) -> Option<Report> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .report
            .clone()
    }

    /// The error from the latest applied load, if it failed.
    pub fn error(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .error
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::metrics::{self, AdvisorScope};
    use crate::period::MonthKey;

    fn report(label_month: &str) -> Report {
        let m = MonthKey::parse(label_month).unwrap();
        let rows = metrics::merge(&[], &[], m, m);
        let totals = metrics::totals(&rows);
        Report {
            scope: AdvisorScope::advisor("a1"),
            from: m,
            to: m,
            completion: totals.completion(),
            rows,
            totals,
            annual: Vec::new(),
        }
    }

    #[test]
    fn test_latest_token_applies() {
        let view = ReportView::new();
        let token = view.begin();
        assert!(view.is_current(token));
        assert_eq!(view.apply(token, Ok(report("2025-01"))), Applied::Updated);
        assert_eq!(view.report().unwrap().from, MonthKey::parse("2025-01").unwrap());
    }

    #[test]
    fn test_superseded_response_is_discarded() {
        let view = ReportView::new();
        let first = view.begin();
        let second = view.begin();
        assert!(second.generation() > first.generation());
        assert!(!view.is_current(first));

        // The newer load finishes first, then the older one straggles in
        assert_eq!(view.apply(second, Ok(report("2025-02"))), Applied::Updated);
        assert_eq!(view.apply(first, Ok(report("2025-01"))), Applied::Discarded);
        assert_eq!(view.report().unwrap().from, MonthKey::parse("2025-02").unwrap());
    }

    #[test]
    fn test_stale_response_before_latest_is_discarded() {
        let view = ReportView::new();
        let first = view.begin();
        let _second = view.begin();
        assert_eq!(view.apply(first, Ok(report("2025-01"))), Applied::Discarded);
        assert!(view.report().is_none());
    }

    #[test]
    fn test_failure_keeps_previous_report() {
        let view = ReportView::new();
        let token = view.begin();
        view.apply(token, Ok(report("2025-01")));

        let token = view.begin();
        let applied = view.apply(token, Err(Error::Database("connection lost".into())));
        assert_eq!(applied, Applied::Failed);
        assert!(view.error().unwrap().contains("connection lost"));
        assert_eq!(view.report().unwrap().from, MonthKey::parse("2025-01").unwrap());

        // A later success clears the error
        let token = view.begin();
        view.apply(token, Ok(report("2025-03")));
        assert!(view.error().is_none());
    }

    #[tokio::test]
    async fn test_load_applies_report() {
        let db = Database::open_memory().await.unwrap();
        let view = ReportView::new();
        let m = MonthKey::parse("2025-01").unwrap();
        let request = ReportRequest::new(m, m.next(), vec!["a1".into()], false).unwrap();

        let applied = view.load(&db, &ReportSources::default(), &request).await;
        assert_eq!(applied, Applied::Updated);
        assert_eq!(view.report().unwrap().rows.len(), 2);
    }

    #[tokio::test]
    async fn test_load_with_superseded_token_is_discarded() {
        let db = Database::open_memory().await.unwrap();
        let view = ReportView::new();
        let jan = MonthKey::parse("2025-01").unwrap();
        let older = ReportRequest::new(jan, jan, vec!["a1".into()], false).unwrap();
        let newer = ReportRequest::new(jan.next(), jan.next(), vec!["a1".into()], false).unwrap();
        let sources = ReportSources::default();

        let stale = view.begin();
        assert_eq!(view.load(&db, &sources, &newer).await, Applied::Updated);
        assert_eq!(view.load_with(stale, &db, &sources, &older).await, Applied::Discarded);
        assert_eq!(view.report().unwrap().from, jan.next());
    }
}
