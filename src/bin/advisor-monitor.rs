use advisor_monitor::calendar;
use advisor_monitor::{
    Advisor, AdvisorMonitor, MetricVector, MonthKey, ProductLine, Report, Role, ScopeSelection,
};
use chrono::Datelike;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "advisor-monitor", about = "Advisor goal vs. actual reports")]
struct Cli {
    /// Database path (default: ~/.advisor-monitor/monitor.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the advisor directory
    Advisor {
        #[command(subcommand)]
        action: AdvisorAction,
    },
    /// Show the current advisor
    Whoami,
    /// Set goals for an advisor
    Goal {
        #[command(subcommand)]
        action: GoalAction,
    },
    /// Record appointments and contracts
    Activity {
        #[command(subcommand)]
        action: ActivityAction,
    },
    /// Goal vs. actual for a month range
    Report {
        /// First month (YYYY-MM, default: January of the current year)
        #[arg(long)]
        from: Option<String>,
        /// Last month (YYYY-MM, default: current month)
        #[arg(long)]
        to: Option<String>,
        /// Sum everyone visible to the current advisor
        #[arg(long, conflicts_with = "advisor")]
        team: bool,
        /// Report on one advisor visible to the current advisor
        #[arg(long)]
        advisor: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Appointments per day for a month or a week
    Calendar {
        /// Month to show (YYYY-MM, default: current month)
        #[arg(long)]
        month: Option<String>,
        /// Show only the week containing this date (YYYY-MM-DD)
        #[arg(long, conflicts_with = "month")]
        week: Option<String>,
        /// Include everyone visible to the current advisor
        #[arg(long)]
        team: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show store status
    Status,
}

#[derive(Subcommand)]
enum AdvisorAction {
    /// Add or update an advisor
    Add {
        /// Advisor id
        id: String,
        /// Display name
        name: String,
        /// Role: admin, team_lead, junior
        #[arg(long, default_value = "junior")]
        role: String,
        #[arg(long)]
        email: Option<String>,
        /// Id of the team lead this advisor reports to
        #[arg(long)]
        team_lead: Option<String>,
    },
    /// List advisors
    List {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct MetricArgs {
    #[arg(long, default_value = "0")]
    consulenze: i64,
    #[arg(long, default_value = "0")]
    contratti: i64,
    #[arg(long, default_value = "0")]
    danni: f64,
    #[arg(long, default_value = "0")]
    vprot: f64,
    #[arg(long, default_value = "0")]
    vpr: f64,
    #[arg(long, default_value = "0")]
    vpu: f64,
}

impl From<MetricArgs> for MetricVector {
    fn from(a: MetricArgs) -> Self {
        MetricVector {
            consulenze: a.consulenze,
            contratti: a.contratti,
            prod_danni: a.danni,
            prod_vprot: a.vprot,
            prod_vpr: a.vpr,
            prod_vpu: a.vpu,
        }
    }
}

#[derive(Subcommand)]
enum GoalAction {
    /// Set the goal for one month
    SetMonthly {
        advisor_id: String,
        /// Month (YYYY-MM)
        month: String,
        #[command(flatten)]
        metrics: MetricArgs,
    },
    /// Set the goal for a whole year
    SetAnnual {
        advisor_id: String,
        year: i32,
        #[command(flatten)]
        metrics: MetricArgs,
    },
}

#[derive(Subcommand)]
enum ActivityAction {
    /// Record an appointment
    Appointment {
        advisor_id: String,
        /// Date (YYYY-MM-DD)
        date: String,
        #[arg(long)]
        lead: Option<String>,
        /// scheduled, completed, cancelled
        #[arg(long, default_value = "scheduled")]
        status: String,
    },
    /// Record a signed contract
    Contract {
        advisor_id: String,
        /// Date (YYYY-MM-DD)
        date: String,
        /// Product line: danni, vprot, vpr, vpu
        product_line: String,
        amount: f64,
        #[arg(long)]
        client: Option<String>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

fn parse_date(s: &str) -> anyhow::Result<chrono::NaiveDate> {
    chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| anyhow::anyhow!("invalid date '{s}', expected YYYY-MM-DD"))
}

fn selection(team: bool, advisor: Option<String>) -> ScopeSelection {
    match (team, advisor) {
        (_, Some(id)) => ScopeSelection::Advisor(id),
        (true, None) => ScopeSelection::Team,
        (false, None) => ScopeSelection::Personal,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => advisor_monitor::Database::open_at(path).await?,
        None => advisor_monitor::Database::open().await?,
    };
    let monitor = AdvisorMonitor::new(db);

    match cli.command {
        Commands::Advisor { action } => handle_advisor(&monitor, action).await?,
        Commands::Whoami => {
            let me = monitor.current_advisor().await?;
            println!("{} ({}) - {}", me.name, me.id, me.role);
        }
        Commands::Goal { action } => handle_goal(&monitor, action).await?,
        Commands::Activity { action } => handle_activity(&monitor, action).await?,
        Commands::Report {
            from,
            to,
            team,
            advisor,
            json,
        } => {
            let to = match to {
                Some(s) => MonthKey::parse(&s)?,
                None => MonthKey::current(),
            };
            let from = match from {
                Some(s) => MonthKey::parse(&s)?,
                None => MonthKey::new(to.year, 1)?,
            };
            let report = monitor.report(from, to, &selection(team, advisor)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Calendar { month, week, team } => {
            handle_calendar(&monitor, month, week, team).await?;
        }
        Commands::Config { action } => handle_config(&monitor, action).await?,
        Commands::Status => print_status(&monitor).await?,
    }

    Ok(())
}

async fn handle_advisor(monitor: &AdvisorMonitor, action: AdvisorAction) -> anyhow::Result<()> {
    match action {
        AdvisorAction::Add {
            id,
            name,
            role,
            email,
            team_lead,
        } => {
            let advisor = Advisor {
                id,
                name,
                email,
                role: Role::parse(&role)?,
                team_lead_id: team_lead,
            };
            let id = advisor.id.clone();
            monitor.upsert_advisor(advisor).await?;
            println!("Saved advisor {id}.");
        }
        AdvisorAction::List { json } => {
            let advisors = monitor.advisors().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&advisors)?);
            } else if advisors.is_empty() {
                println!("No advisors.");
            } else {
                for a in advisors {
                    let lead = a.team_lead_id.as_deref().unwrap_or("-");
                    println!("{:<12} {:<24} {:<10} lead: {lead}", a.id, a.name, a.role.as_str());
                }
            }
        }
    }
    Ok(())
}

async fn handle_goal(monitor: &AdvisorMonitor, action: GoalAction) -> anyhow::Result<()> {
    match action {
        GoalAction::SetMonthly {
            advisor_id,
            month,
            metrics,
        } => {
            let month = MonthKey::parse(&month)?;
            monitor
                .set_monthly_goal(&advisor_id, month, metrics.into())
                .await?;
            println!("Goal for {advisor_id} in {month} updated.");
        }
        GoalAction::SetAnnual {
            advisor_id,
            year,
            metrics,
        } => {
            monitor
                .set_annual_goal(&advisor_id, year, metrics.into())
                .await?;
            println!("Annual goal for {advisor_id} in {year} updated.");
        }
    }
    Ok(())
}

async fn handle_activity(monitor: &AdvisorMonitor, action: ActivityAction) -> anyhow::Result<()> {
    match action {
        ActivityAction::Appointment {
            advisor_id,
            date,
            lead,
            status,
        } => {
            let id = monitor
                .record_appointment(&advisor_id, lead.as_deref(), parse_date(&date)?, &status)
                .await?;
            println!("Recorded appointment #{id}.");
        }
        ActivityAction::Contract {
            advisor_id,
            date,
            product_line,
            amount,
            client,
        } => {
            let line = ProductLine::parse(&product_line).ok_or_else(|| {
                anyhow::anyhow!("unknown product line '{product_line}' (danni, vprot, vpr, vpu)")
            })?;
            let id = monitor
                .record_contract(&advisor_id, client.as_deref(), parse_date(&date)?, line, amount)
                .await?;
            println!("Recorded contract #{id}.");
        }
    }
    Ok(())
}

async fn handle_calendar(
    monitor: &AdvisorMonitor,
    month: Option<String>,
    week: Option<String>,
    team: bool,
) -> anyhow::Result<()> {
    let scope = selection(team, None);

    if let Some(day) = week {
        let day = parse_date(&day)?;
        let days = calendar::week_of(day);
        let mut counts = monitor
            .appointment_counts(MonthKey::from_date(days[0]), &scope)
            .await?;
        if days[6].month() != days[0].month() {
            counts.extend(
                monitor
                    .appointment_counts(MonthKey::from_date(days[6]), &scope)
                    .await?,
            );
        }
        for d in days {
            let n = counts.get(&d).copied().unwrap_or(0);
            println!("{} {}  {n}", d.format("%a"), d);
        }
        return Ok(());
    }

    let month = match month {
        Some(s) => MonthKey::parse(&s)?,
        None => MonthKey::current(),
    };
    let counts = monitor.appointment_counts(month, &scope).await?;
    println!("{month}");
    println!(" Mon  Tue  Wed  Thu  Fri  Sat  Sun");
    for week in calendar::month_grid(month) {
        let line: Vec<String> = week
            .iter()
            .map(|cell| match cell {
                Some(d) => match counts.get(d) {
                    Some(n) => format!("{:>2}:{n:<2}", d.day()),
                    None => format!("{:>2}   ", d.day()),
                },
                None => "     ".to_string(),
            })
            .collect();
        println!("{}", line.join(""));
    }
    Ok(())
}

async fn handle_config(monitor: &AdvisorMonitor, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match monitor.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            monitor.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = monitor.config_list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}

async fn print_status(monitor: &AdvisorMonitor) -> anyhow::Result<()> {
    let stats = monitor
        .db()
        .reader()
        .call(|conn| {
            let advisors: i64 =
                conn.query_row("SELECT COUNT(*) FROM advisors", [], |row| row.get(0))?;
            let appointments: i64 =
                conn.query_row("SELECT COUNT(*) FROM appointments", [], |row| row.get(0))?;
            let contracts: i64 =
                conn.query_row("SELECT COUNT(*) FROM contracts", [], |row| row.get(0))?;
            let goal_months: i64 = conn.query_row(
                "SELECT COUNT(*) FROM advisor_goals_monthly",
                [],
                |row| row.get(0),
            )?;
            let last_activity: Option<String> = conn
                .query_row("SELECT MAX(scheduled_on) FROM appointments", [], |row| {
                    row.get(0)
                })
                .ok()
                .flatten();
            Ok::<_, rusqlite::Error>((
                advisors,
                appointments,
                contracts,
                goal_months,
                last_activity,
            ))
        })
        .await?;

    let (advisors, appointments, contracts, goal_months, last_activity) = stats;
    println!("Monitor Status");
    println!("  Advisors:      {advisors}");
    println!("  Appointments:  {appointments}");
    println!("  Contracts:     {contracts}");
    println!("  Goal months:   {goal_months}");
    println!(
        "  Last activity: {}",
        last_activity.unwrap_or_else(|| "never".to_string())
    );
    Ok(())
}

fn print_report(report: &Report) {
    println!("Report: {} ({} - {})", report.scope, report.from, report.to);
    println!(
        "  {:<6} {:>11} {:>11} {:>13} {:>13}",
        "Month", "Consulenze", "Contratti", "Prod. goal", "Prod. actual"
    );
    for row in &report.rows {
        println!(
            "  {:<6} {:>5}/{:<5} {:>5}/{:<5} {:>13.2} {:>13.2}",
            row.label,
            row.actual.consulenze,
            row.goal.consulenze,
            row.actual.contratti,
            row.goal.contratti,
            row.goal.production(),
            row.actual.production(),
        );
    }
    let t = &report.totals;
    let c = &report.completion;
    println!("  Totals:");
    println!(
        "    Consulenze: {}/{} ({:.1}%)",
        t.actual.consulenze, t.goal.consulenze, c.consulenze
    );
    println!(
        "    Contratti:  {}/{} ({:.1}%)",
        t.actual.contratti, t.goal.contratti, c.contratti
    );
    let amounts = [
        ("Danni", t.actual.prod_danni, t.goal.prod_danni, c.prod_danni),
        ("VProt", t.actual.prod_vprot, t.goal.prod_vprot, c.prod_vprot),
        ("VPR", t.actual.prod_vpr, t.goal.prod_vpr, c.prod_vpr),
        ("VPU", t.actual.prod_vpu, t.goal.prod_vpu, c.prod_vpu),
        ("Production", t.actual.production(), t.goal.production(), c.production),
    ];
    for (label, actual, goal, pct) in amounts {
        println!("    {:<11} {actual:.2}/{goal:.2} ({pct:.1}%)", format!("{label}:"));
    }
    for annual in &report.annual {
        println!(
            "  Annual {} target: {} consulenze, {} contratti, {:.2} production",
            annual.year,
            annual.metrics.consulenze,
            annual.metrics.contratti,
            annual.metrics.production()
        );
    }
}
