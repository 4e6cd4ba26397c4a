use anyhow::Result;
use clap::{Parser, Subcommand};

use qamedic::config::Config;
use qamedic::dispatch::{Dispatcher, RunRequest, RunStatus};
use qamedic::report::ReportManager;
use qamedic::storage::{self, RunFilter};

#[derive(Parser)]
#[command(
    name = "qamedic",
    about = "Appliance-grade QA test orchestration: run, record, report",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + dispatcher)
    Serve {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0:8080")]
        bind: String,
    },

    /// Run a test and record the result
    Run {
        /// Test category: unit, e2e, sample, custom, or a configured plugin
        #[arg(long)]
        category: String,

        /// Test file under the category directory (unit/sample)
        #[arg(long)]
        file: Option<String>,

        /// Label for the result row (sample/custom)
        #[arg(long)]
        name: Option<String>,

        /// Explicit URL to check (e2e)
        #[arg(long)]
        url: Option<String>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Browse recorded test runs
    History {
        /// Filter by category
        #[arg(long)]
        category: Option<String>,

        /// Filter by status: pass or fail
        #[arg(long)]
        status: Option<String>,

        /// Only runs from the last N days
        #[arg(long)]
        days: Option<i64>,

        /// Maximum rows to show
        #[arg(long, default_value = "50")]
        limit: u32,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Show aggregate statistics
    Stats {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Manage the e2e URL list
    Urls {
        #[command(subcommand)]
        action: UrlsAction,
    },

    /// Render or serve the external report
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },

    /// Delete runs (and their artifacts) older than a threshold
    Cleanup {
        /// Age threshold in days
        #[arg(long, default_value = "30")]
        days: i64,
    },

    /// Delete every recorded run. Irreversible.
    Reset {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum UrlsAction {
    /// List configured e2e URLs
    List,

    /// Add a URL
    Add {
        #[arg(long)]
        url: String,
    },

    /// Remove a URL
    Remove {
        #[arg(long)]
        url: String,
    },
}

#[derive(Subcommand)]
enum ReportAction {
    /// Generate the rendered report from raw results
    Generate {
        /// Output directory
        #[arg(long, default_value = "allure-report")]
        output: String,
    },

    /// Serve the report interactively
    Serve,
}

fn print_results(results: &[qamedic::dispatch::RunResult]) {
    println!("\n{:<10} | {:<8} | {:<10} | Name", "Category", "Status", "Duration");
    println!("{:-<10}-|-{:-<8}-|-{:-<10}-|-{:-<40}", "", "", "", "");
    for r in results {
        let status = match r.status {
            RunStatus::Pass => "PASS",
            RunStatus::Fail => "FAIL",
        };
        println!(
            "{:<10} | {:<8} | {:<10} | {}",
            r.category,
            status,
            format!("{:.2}s", r.duration),
            r.name
        );
        if let Some(error) = &r.error_message {
            println!("{:<10} | {:<8} | {:<10} |   -> {}", "", "", "", error.lines().next().unwrap_or(""));
        }
    }
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind } => {
            tracing::info!(%bind, "Starting qamedic daemon");
            let config = Config::load_or_default();
            qamedic::serve(&bind, config).await?;
        }
        Commands::Run {
            category,
            file,
            name,
            url,
            json,
        } => {
            let config = Config::load_or_default();
            let pool = storage::open_pool(&config.effective_database_path())?;
            let dispatcher = Dispatcher::new(pool, config);
            for (plugin, reason) in dispatcher.plugin_failures() {
                tracing::warn!(%plugin, %reason, "plugin entry did not resolve");
            }

            let results = dispatcher
                .run(&category, RunRequest { file, name, url })
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                print_results(&results);
            }
        }
        Commands::History {
            category,
            status,
            days,
            limit,
            json,
        } => {
            let config = Config::load_or_default();
            let pool = storage::open_pool(&config.effective_database_path())?;

            let status = match status.as_deref() {
                None => None,
                Some(raw) => Some(raw.parse::<RunStatus>().map_err(anyhow::Error::from)?),
            };
            let filter = RunFilter {
                category,
                status,
                since: days.map(|d| chrono::Utc::now() - chrono::Duration::days(d)),
                until: None,
                limit: Some(limit),
            };
            let runs = storage::query_runs(&pool, &filter)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&runs)?);
            } else if runs.is_empty() {
                println!("No test runs found.");
            } else {
                println!(
                    "\n{:<5} | {:<20} | {:<8} | {:<6} | {:<10} | Name",
                    "Id", "Timestamp", "Category", "Status", "Duration"
                );
                println!(
                    "{:-<5}-|-{:-<20}-|-{:-<8}-|-{:-<6}-|-{:-<10}-|-{:-<40}",
                    "", "", "", "", "", ""
                );
                for run in &runs {
                    println!(
                        "{:<5} | {:<20} | {:<8} | {:<6} | {:<10} | {}",
                        run.id,
                        run.created_at.format("%Y-%m-%d %H:%M:%S"),
                        run.category,
                        run.status,
                        format!("{:.2}s", run.duration),
                        run.name
                    );
                }
                println!();
            }
        }
        Commands::Stats { json } => {
            let config = Config::load_or_default();
            let pool = storage::open_pool(&config.effective_database_path())?;
            let stats = storage::statistics(&pool)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("\nTest Run Statistics");
                println!("{:<12} : {}", "Total", stats.total);
                println!("{:<12} : {}", "Passed", stats.passed);
                println!("{:<12} : {}", "Failed", stats.failed);
                println!("{:<12} : {:.1}%", "Pass rate", stats.pass_rate);
                println!();
            }
        }
        Commands::Urls { action } => {
            let mut config = Config::load_or_default();
            match action {
                UrlsAction::List => {
                    if config.e2e_urls.is_empty() {
                        println!("No e2e URLs configured.");
                    } else {
                        for url in &config.e2e_urls {
                            println!("{url}");
                        }
                    }
                }
                UrlsAction::Add { url } => {
                    if config.register_e2e_url(&url)? {
                        println!("Added {url}");
                    } else {
                        println!("URL already configured: {url}");
                    }
                }
                UrlsAction::Remove { url } => {
                    if config.remove_e2e_url(&url)? {
                        println!("Removed {url}");
                    } else {
                        println!("URL not configured: {url}");
                    }
                }
            }
        }
        Commands::Report { action } => {
            let config = Config::load_or_default();
            let results_dir = config
                .reporting
                .allure_results_dir
                .clone()
                .unwrap_or_else(|| "allure-results".into());

            let outcome = match action {
                ReportAction::Generate { output } => {
                    qamedic::report::allure::generate(&results_dir, std::path::Path::new(&output))
                        .map(|()| format!("Report generated at {output}"))
                }
                ReportAction::Serve => {
                    qamedic::report::allure::serve(&results_dir).map(|()| String::new())
                }
            };

            match outcome {
                Ok(message) => {
                    if !message.is_empty() {
                        println!("{message}");
                    }
                }
                Err(qamedic::report::allure::RenderToolError::NotInstalled) => {
                    eprintln!("The allure tool is not installed or not on PATH.");
                    eprintln!("Install it from https://allurereport.org and retry.");
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Cleanup { days } => {
            let config = Config::load_or_default();
            let pool = storage::open_pool(&config.effective_database_path())?;

            let deleted = storage::cleanup_old(&pool, days)?;
            let swept = ReportManager::from_config(&config).sweep_old(days.max(0) as u64);
            println!("Deleted {deleted} run(s) older than {days} day(s), swept {swept} orphaned report file(s).");
        }
        Commands::Reset { yes } => {
            if !yes {
                eprintln!("This deletes every recorded test run and cannot be undone.");
                eprintln!("Re-run with --yes to confirm.");
                std::process::exit(1);
            }
            let config = Config::load_or_default();
            let pool = storage::open_pool(&config.effective_database_path())?;
            let deleted = storage::clear_all(&pool)?;
            println!("Deleted {deleted} test run(s).");
        }
    }

    Ok(())
}
