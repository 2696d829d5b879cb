use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use marketpulse::{FixedClock, GrowthSubject, MarketPulse, Period, Report, ReportRequest};

#[derive(Parser)]
#[command(name = "marketpulse", about = "Marketplace analytics and reporting CLI")]
struct Cli {
    /// Database path (default: ~/.marketpulse/marketpulse.db)
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
    /// Assemble the dashboard report
    Report {
        /// Comma-separated sections, e.g. stats,top-brands (default: all)
        #[arg(long)]
        sections: Option<String>,
        /// Compute as if today were this date (YYYY-MM-DD)
        #[arg(long)]
        as_of: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Growth of a metric over a period against the previous period
    Growth {
        /// revenue, users or campaigns
        #[arg(long)]
        metric: String,
        /// Period: 2025, 2025-Q1, 2025-03, 30d, mtd, qtd, ytd
        #[arg(long, default_value = "mtd")]
        period: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Load a JSON dataset into the store
    Import {
        /// File with one array per collection
        file: String,
    },
    /// Show row counts per collection
    Status,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
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
        Some(path) => marketpulse::Database::open_at(path).await?,
        None => marketpulse::Database::open().await?,
    };

    match cli.command {
        Commands::Report {
            sections,
            as_of,
            json,
        } => {
            let mp = match as_of {
                Some(date) => {
                    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                        .map_err(|e| anyhow::anyhow!("invalid --as-of date {date:?}: {e}"))?;
                    MarketPulse::with_clock(db, Arc::new(FixedClock::on(date)))
                }
                None => MarketPulse::new(db),
            };
            let request = match sections {
                Some(list) => ReportRequest::parse(&list)?,
                None => ReportRequest::all(),
            };
            let (report, diagnostics) = mp.report_with_diagnostics(&request).await?;
            for d in &diagnostics {
                eprintln!("warning: {} {:?}: {}", d.section, d.kind, d.message);
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report, &request);
            }
        }
        Commands::Growth {
            metric,
            period,
            json,
        } => {
            let mp = MarketPulse::new(db);
            let subject: GrowthSubject = metric.parse()?;
            let period = Period::parse(&period, mp.today())?;
            let growth = mp.growth(subject, &period).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&growth)?);
            } else {
                println!("{subject} growth for {period} (vs {})", period.previous());
                println!("  Current:  {:.2}", growth.current_value);
                println!("  Previous: {:.2}", growth.previous_value);
                println!("  Change:   {:+.1}%", growth.percent_change);
            }
        }
        Commands::Import { file } => {
            let text = std::fs::read_to_string(&file)?;
            let summary = MarketPulse::new(db).import_json(&text).await?;
            println!("Imported {} records from {file}", summary.total());
            println!("  Brands:         {}", summary.brands);
            println!("  Influencers:    {}", summary.influencers);
            println!("  Snapshots:      {}", summary.influencer_analytics);
            println!("  Campaigns:      {}", summary.campaigns);
            println!("  Collaborations: {}", summary.collaborations);
            println!("  Payments:       {}", summary.payments);
            println!("  Customers:      {}", summary.customers);
        }
        Commands::Status => {
            let counts = MarketPulse::new(db).status().await?;
            println!("Store Status");
            for (collection, n) in counts {
                println!("  {:<22} {n}", collection.table());
            }
        }
        Commands::Config { action } => {
            handle_config(&MarketPulse::new(db), action).await?;
        }
    }

    Ok(())
}

fn print_report(report: &Report, request: &ReportRequest) {
    use marketpulse::Section;

    println!("Report as of {}", report.as_of);

    if request.contains(Section::Stats) {
        println!();
        for card in &report.stats {
            println!("  {:<20} {}", card.label, card.value);
        }
    }

    if request.contains(Section::Revenue) {
        let r = &report.revenue;
        println!();
        println!("Revenue");
        println!("  Total:      {:.2}", r.total_revenue);
        println!("  Pending:    {:.2}", r.pending_amount);
        println!("  Average:    {:.2}", r.average_payment);
        println!("  Payments:   {}", r.completed_payments);
        println!("  Brands:     {}", r.paying_brands);
    }

    if request.contains(Section::Growth) {
        let g = &report.growth;
        println!();
        println!("Growth (month over month)");
        for (name, m) in [("Revenue", g.revenue), ("Users", g.users), ("Campaigns", g.campaigns)] {
            println!(
                "  {name:<10} {:>12.2} vs {:>12.2}  {:+.1}%",
                m.current_value, m.previous_value, m.percent_change
            );
        }
    }

    for (section, title, list) in [
        (Section::TopBrands, "Top brands", &report.rankings.top_brands),
        (Section::TopInfluencers, "Top influencers", &report.rankings.top_influencers),
        (Section::TopCampaigns, "Top campaigns", &report.rankings.top_campaigns),
    ] {
        if !request.contains(section) {
            continue;
        }
        println!();
        println!("{title}");
        if list.is_empty() {
            println!("  (none)");
        }
        for (i, e) in list.iter().enumerate() {
            println!("  {}. {} ({}) {:.2}", i + 1, e.display_name, e.subject_id, e.primary_metric);
        }
    }

    for chart in &report.charts {
        println!();
        println!("{}", chart.title);
        for (label, value) in chart.labels.iter().zip(&chart.values) {
            println!("  {label:<10} {value:.2}");
        }
    }

    if request.contains(Section::Notifications) {
        println!();
        println!("Notifications");
        for n in &report.notifications {
            println!("  [{:?}] {}: {}", n.priority, n.title, n.message);
        }
    }
}

async fn handle_config(mp: &MarketPulse, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match mp.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            mp.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = mp.config_list().await?;
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
