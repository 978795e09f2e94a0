use std::collections::BTreeMap;
use std::sync::Arc;

use rusqlite::Connection;

use crate::metrics::MonthlyRow;
use crate::storage::repository::{self, MonthlyRelation};

/// One way of reading monthly rows for a single year.
///
/// Goal and progress lookups hold an ordered list of these; the first one
/// that answers every year wins.
pub trait MonthlySource: Send + Sync {
    fn name(&self) -> &str;

    fn fetch_year(
        &self,
        conn: &Connection,
        year: i32,
        months: &[u32],
        advisor_ids: &[String],
    ) -> Result<Vec<MonthlyRow>, rusqlite::Error>;
}

/// Reads from one of the store's monthly tables or views.
#[derive(Debug, Clone, Copy)]
pub struct RelationSource(pub MonthlyRelation);

impl MonthlySource for RelationSource {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn fetch_year(
        &self,
        conn: &Connection,
        year: i32,
        months: &[u32],
        advisor_ids: &[String],
    ) -> Result<Vec<MonthlyRow>, rusqlite::Error> {
        repository::query_monthly(conn, self.0, year, months, advisor_ids)
    }
}

pub type SourceList = Vec<Arc<dyn MonthlySource>>;

/// Where a report reads its goals and its progress from.
#[derive(Clone)]
pub struct ReportSources {
    pub goals: SourceList,
    pub progress: SourceList,
}

impl Default for ReportSources {
    /// Per-month goal table first, then the view derived from annual goals.
    fn default() -> Self {
        Self {
            goals: vec![
                Arc::new(RelationSource(MonthlyRelation::GoalsTable)),
                Arc::new(RelationSource(MonthlyRelation::GoalsView)),
            ],
            progress: vec![Arc::new(RelationSource(MonthlyRelation::ProgressView))],
        }
    }
}

/// Run one source over every year, one query per year.
fn fetch_all_years(
    conn: &Connection,
    source: &dyn MonthlySource,
    months_by_year: &BTreeMap<i32, Vec<u32>>,
    advisor_ids: &[String],
) -> Result<Vec<MonthlyRow>, rusqlite::Error> {
    let mut rows = Vec::new();
    for (year, months) in months_by_year {
        let batch = source.fetch_year(conn, *year, months, advisor_ids)?;
        log::debug!(
            "{}: {} rows for {year} (months {:?}, {} advisors)",
            source.name(),
            batch.len(),
            months,
            advisor_ids.len()
        );
        rows.extend(batch);
    }
    Ok(rows)
}

/// Try each source in order until one answers every year.
///
/// A failing source's partial rows are dropped before the next source runs.
/// If every source fails, the last error is returned. No advisors means no
/// rows, and no query is issued.
pub fn fetch_with_fallback(
    conn: &Connection,
    sources: &[Arc<dyn MonthlySource>],
    months_by_year: &BTreeMap<i32, Vec<u32>>,
    advisor_ids: &[String],
) -> Result<Vec<MonthlyRow>, rusqlite::Error> {
    if advisor_ids.is_empty() || months_by_year.is_empty() {
        return Ok(Vec::new());
    }

    let mut last_err = None;
    for source in sources {
        match fetch_all_years(conn, source.as_ref(), months_by_year, advisor_ids) {
            Ok(rows) => return Ok(rows),
            Err(e) => {
                log::warn!("Source {} failed, trying next: {e}", source.name());
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        rusqlite::Error::InvalidParameterName("no sources configured".to_string())
    }))
}
