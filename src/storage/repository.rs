use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::metrics::{AdvisorScope, AnnualGoals, MetricVector, MonthlyRow};
use crate::period::MonthKey;
use crate::scope::{Advisor, Role};

// ── Advisors ───────────────────────────────────────────────────────

pub fn upsert_advisor(conn: &Connection, advisor: &Advisor) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO advisors (advisor_id, name, email, role, team_lead_id)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(advisor_id) DO UPDATE SET
           name = excluded.name,
           email = COALESCE(excluded.email, advisors.email),
           role = excluded.role,
           team_lead_id = excluded.team_lead_id",
        params![
            advisor.id,
            advisor.name,
            advisor.email,
            advisor.role.as_str(),
            advisor.team_lead_id,
        ],
    )?;
    Ok(())
}

fn advisor_from_row(row: &Row<'_>) -> Result<Advisor, rusqlite::Error> {
    let role_str: String = row.get(3)?;
    let role = Role::parse(&role_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Advisor {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role,
        team_lead_id: row.get(4)?,
    })
}

pub fn get_advisor(
    conn: &Connection,
    advisor_id: &str,
) -> Result<Option<Advisor>, rusqlite::Error> {
    conn.query_row(
        "SELECT advisor_id, name, email, role, team_lead_id FROM advisors WHERE advisor_id = ?1",
        params![advisor_id],
        advisor_from_row,
    )
    .optional()
}

pub fn list_advisors(conn: &Connection) -> Result<Vec<Advisor>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT advisor_id, name, email, role, team_lead_id FROM advisors
         ORDER BY name, advisor_id",
    )?;
    let rows = stmt.query_map([], advisor_from_row)?;
    rows.collect()
}

// ── Goals ──────────────────────────────────────────────────────────

pub fn set_annual_goal(
    conn: &Connection,
    advisor_id: &str,
    year: i32,
    metrics: &MetricVector,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO advisor_goals_annual (
            advisor_id, year, consulenze, contratti,
            prod_danni, prod_vprot, prod_vpr, prod_vpu, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, datetime('now'))
        ON CONFLICT(advisor_id, year) DO UPDATE SET
            consulenze=excluded.consulenze, contratti=excluded.contratti,
            prod_danni=excluded.prod_danni, prod_vprot=excluded.prod_vprot,
            prod_vpr=excluded.prod_vpr, prod_vpu=excluded.prod_vpu,
            updated_at=excluded.updated_at",
        params![
            advisor_id,
            year,
            metrics.consulenze,
            metrics.contratti,
            metrics.prod_danni,
            metrics.prod_vprot,
            metrics.prod_vpr,
            metrics.prod_vpu,
        ],
    )?;
    Ok(())
}

pub fn set_monthly_goal(
    conn: &Connection,
    advisor_id: &str,
    month: MonthKey,
    metrics: &MetricVector,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO advisor_goals_monthly (
            advisor_id, year, month, consulenze, contratti,
            prod_danni, prod_vprot, prod_vpr, prod_vpu, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, datetime('now'))
        ON CONFLICT(advisor_id, year, month) DO UPDATE SET
            consulenze=excluded.consulenze, contratti=excluded.contratti,
            prod_danni=excluded.prod_danni, prod_vprot=excluded.prod_vprot,
            prod_vpr=excluded.prod_vpr, prod_vpu=excluded.prod_vpu,
            updated_at=excluded.updated_at",
        params![
            advisor_id,
            month.year,
            month.month,
            metrics.consulenze,
            metrics.contratti,
            metrics.prod_danni,
            metrics.prod_vprot,
            metrics.prod_vpr,
            metrics.prod_vpu,
        ],
    )?;
    Ok(())
}

// ── Monthly metric queries ─────────────────────────────────────────

/// Relations that expose `advisor_id, year, month` plus the six metric
/// columns. Table names cannot be bound as parameters, so only these are
/// accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonthlyRelation {
    GoalsTable,
    GoalsView,
    ProgressView,
}

impl MonthlyRelation {
    pub fn name(&self) -> &'static str {
        match self {
            MonthlyRelation::GoalsTable => "advisor_goals_monthly",
            MonthlyRelation::GoalsView => "v_goals_monthly",
            MonthlyRelation::ProgressView => "v_progress_monthly",
        }
    }
}

/// Read metrics, treating NULL columns as zero. Expects the six metric
/// columns to start at `offset`.
fn metrics_from_row(row: &Row<'_>, offset: usize) -> Result<MetricVector, rusqlite::Error> {
    Ok(MetricVector {
        consulenze: row.get::<_, Option<i64>>(offset)?.unwrap_or(0),
        contratti: row.get::<_, Option<i64>>(offset + 1)?.unwrap_or(0),
        prod_danni: row.get::<_, Option<f64>>(offset + 2)?.unwrap_or(0.0),
        prod_vprot: row.get::<_, Option<f64>>(offset + 3)?.unwrap_or(0.0),
        prod_vpr: row.get::<_, Option<f64>>(offset + 4)?.unwrap_or(0.0),
        prod_vpu: row.get::<_, Option<f64>>(offset + 5)?.unwrap_or(0.0),
    })
}

fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Monthly rows for one year, restricted to `months` and `advisor_ids`.
pub fn query_monthly(
    conn: &Connection,
    relation: MonthlyRelation,
    year: i32,
    months: &[u32],
    advisor_ids: &[String],
) -> Result<Vec<MonthlyRow>, rusqlite::Error> {
    if months.is_empty() || advisor_ids.is_empty() {
        return Ok(Vec::new());
    }

    let month_ph = placeholders(2, months.len());
    let advisor_ph = placeholders(2 + months.len(), advisor_ids.len());
    let sql = format!(
        "SELECT advisor_id, year, month,
                consulenze, contratti, prod_danni, prod_vprot, prod_vpr, prod_vpu
         FROM {}
         WHERE year = ?1 AND month IN ({month_ph}) AND advisor_id IN ({advisor_ph})
         ORDER BY advisor_id, month",
        relation.name()
    );

    let mut values: Vec<Value> = Vec::with_capacity(1 + months.len() + advisor_ids.len());
    values.push(year.into());
    values.extend(months.iter().map(|m| Value::from(*m)));
    values.extend(advisor_ids.iter().map(|id| Value::from(id.clone())));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values), |row| {
        let advisor_id: String = row.get(0)?;
        let year: i32 = row.get(1)?;
        let month: u32 = row.get(2)?;
        Ok(MonthlyRow {
            advisor_scope: AdvisorScope::Advisor(advisor_id),
            month: MonthKey { year, month },
            metrics: metrics_from_row(row, 3)?,
        })
    })?;
    rows.collect()
}

/// Annual goals for the given years and advisors.
pub fn query_annual_goals(
    conn: &Connection,
    years: &[i32],
    advisor_ids: &[String],
) -> Result<Vec<AnnualGoals>, rusqlite::Error> {
    if years.is_empty() || advisor_ids.is_empty() {
        return Ok(Vec::new());
    }

    let year_ph = placeholders(1, years.len());
    let advisor_ph = placeholders(1 + years.len(), advisor_ids.len());
    let sql = format!(
        "SELECT advisor_id, year,
                consulenze, contratti, prod_danni, prod_vprot, prod_vpr, prod_vpu
         FROM advisor_goals_annual
         WHERE year IN ({year_ph}) AND advisor_id IN ({advisor_ph})
         ORDER BY advisor_id, year"
    );

    let mut values: Vec<Value> = Vec::with_capacity(years.len() + advisor_ids.len());
    values.extend(years.iter().map(|y| Value::from(*y)));
    values.extend(advisor_ids.iter().map(|id| Value::from(id.clone())));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values), |row| {
        Ok(AnnualGoals {
            advisor_scope: AdvisorScope::Advisor(row.get(0)?),
            year: row.get(1)?,
            metrics: metrics_from_row(row, 2)?,
        })
    })?;
    rows.collect()
}

// ── Activity ───────────────────────────────────────────────────────

/// Product lines contracts are booked under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductLine {
    Danni,
    Vprot,
    Vpr,
    Vpu,
}

impl ProductLine {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "danni" => Some(ProductLine::Danni),
            "vprot" => Some(ProductLine::Vprot),
            "vpr" => Some(ProductLine::Vpr),
            "vpu" => Some(ProductLine::Vpu),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProductLine::Danni => "danni",
            ProductLine::Vprot => "vprot",
            ProductLine::Vpr => "vpr",
            ProductLine::Vpu => "vpu",
        }
    }
}

pub fn insert_appointment(
    conn: &Connection,
    advisor_id: &str,
    lead_name: Option<&str>,
    scheduled_on: &str,
    status: &str,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO appointments (advisor_id, lead_name, scheduled_on, status)
         VALUES (?1, ?2, ?3, ?4)",
        params![advisor_id, lead_name, scheduled_on, status],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_contract(
    conn: &Connection,
    advisor_id: &str,
    client_name: Option<&str>,
    signed_on: &str,
    product_line: ProductLine,
    amount: f64,
) -> Result<i64, rusqlite::Error> {
    conn.execute(
        "INSERT INTO contracts (advisor_id, client_name, signed_on, product_line, amount)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![advisor_id, client_name, signed_on, product_line.as_str(), amount],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Dates (`YYYY-MM-DD`) of non-cancelled appointments in `[start, end]`.
pub fn appointment_dates_in_range(
    conn: &Connection,
    advisor_ids: &[String],
    start: &str,
    end: &str,
) -> Result<Vec<String>, rusqlite::Error> {
    if advisor_ids.is_empty() {
        return Ok(Vec::new());
    }
    let advisor_ph = placeholders(3, advisor_ids.len());
    let sql = format!(
        "SELECT scheduled_on FROM appointments
         WHERE scheduled_on >= ?1 AND scheduled_on <= ?2
           AND status != 'cancelled'
           AND advisor_id IN ({advisor_ph})
         ORDER BY scheduled_on"
    );
    let mut values = vec![Value::from(start.to_string()), Value::from(end.to_string())];
    values.extend(advisor_ids.iter().map(|id| Value::from(id.clone())));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values), |row| row.get(0))?;
    rows.collect()
}

// ── Config ─────────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value, updated_at)
         VALUES (?1, ?2, datetime('now'))",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}
