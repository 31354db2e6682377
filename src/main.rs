mod chart;
mod config;
mod cost;
mod data_dir;
mod extract;
mod hit;
mod import;
mod pipeline;
mod query;
mod report;
#[cfg(feature = "serve")]
mod serve;
mod snapshot;
mod warehouse;

use clap::{Parser, Subcommand, ValueEnum};
use config::JourneysConfig;
use data_dir::DataDir;
use report::Report;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Extract sessions that cross between a primary site and its sign-in
/// domains from a day-partitioned analytics warehouse, then report which
/// hosts, pages and journeys they use.
#[derive(Parser, Debug)]
#[command(name = "journeys", version, about)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "journeys.toml", global = true)]
    config: PathBuf,

    /// Debug logging (dry-run details, extraction counts)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dry-run, confirm the cost, query the warehouse and report
    Extract {
        /// First day, YYYYMMDD
        #[arg(long)]
        start: String,

        /// Last day (inclusive), YYYYMMDD
        #[arg(long)]
        end: String,

        /// Seed host (repeatable; overrides config)
        #[arg(long = "seed-host", value_name = "HOST")]
        seed_hosts: Vec<String>,

        /// Save extracted hits as an interim snapshot
        #[arg(long)]
        save: bool,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Report on a saved snapshot without querying the warehouse
    Report {
        /// Snapshot file written by `extract --save`
        snapshot: PathBuf,

        /// Only rank the pages of this hostname
        #[arg(long)]
        host: Option<String>,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Load newline-delimited JSON raw hits into a day partition
    Import {
        /// Partition day, YYYYMMDD
        #[arg(long)]
        date: String,

        /// Input file, one raw hit per line
        file: PathBuf,
    },
    /// Serve a snapshot's report as HTML charts and JSON
    #[cfg(feature = "serve")]
    Serve {
        snapshot: PathBuf,

        /// Port (overrides config)
        #[arg(long)]
        port: Option<u16>,

        /// Rows per chart (overrides config)
        #[arg(long)]
        top: Option<usize>,
    },
}

#[derive(clap::Args, Debug)]
struct OutputArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Table)]
    format: Format,

    /// Rows per table (overrides config)
    #[arg(long)]
    top: Option<usize>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Table,
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    tracing::debug!(?cli, "parsed CLI arguments");

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = JourneysConfig::load(&cli.config)?;
    let data_dir = DataDir::new(&config.storage.data_dir);

    match cli.command {
        Command::Extract {
            start,
            end,
            seed_hosts,
            save,
            output,
        } => {
            let range = query::DateRange::parse(&start, &end)?;
            let params = extract::ExtractParams::from_config(&config.extract, &seed_hosts)?;
            let job = query::QueryJob::new(range, config.extract.excluded_path_prefixes.clone());

            data_dir.ensure_initialized()?;
            let warehouse = open_warehouse(&config, &data_dir)?;
            let guard = cost::CostGuard::from_config(&config.cost);

            tracing::info!(
                start = %range.start_suffix(),
                end = %range.end_suffix(),
                primary = %params.primary_host,
                seeds = ?params.seed_hosts,
                "extracting cross-domain sessions"
            );
            let stdin = std::io::stdin();
            let extraction = pipeline::run_guarded(
                &warehouse,
                &job,
                &params,
                &guard,
                stdin.lock(),
                std::io::stderr(),
            )?;
            tracing::info!(
                sessions = extraction.stats.qualifying_sessions,
                hits = extraction.hits.len(),
                "extraction finished"
            );

            if save {
                snapshot::save(&data_dir.snapshot_file(&range), &extraction.hits)?;
            }

            let report = Report::build(&extraction.hits);
            print_report(&report, &output, config.report.top_n)?;
        }
        Command::Report {
            snapshot,
            host,
            output,
        } => {
            let hits = snapshot::load(&snapshot)?;
            let top_n = output.top.unwrap_or(config.report.top_n);
            match host {
                Some(host) => {
                    let mut pages = report::top_pages_for_host(&hits, &host);
                    pages.truncate(top_n);
                    match output.format {
                        Format::Json => println!("{}", serde_json::to_string_pretty(&pages)?),
                        Format::Table => println!(
                            "{}",
                            chart::render_text(&chart::Chart {
                                title: format!("Top pages on {host}"),
                                bars: pages
                                    .iter()
                                    .map(|p| chart::Bar::new(&p.page_path, p.sessions))
                                    .collect(),
                            })
                        ),
                    }
                }
                None => print_report(&Report::build(&hits), &output, config.report.top_n)?,
            }
        }
        Command::Import { date, file } => {
            let day = query::parse_day(&date, "date")?;
            data_dir.ensure_initialized()?;
            let mut warehouse = open_warehouse(&config, &data_dir)?;
            let rows = import::import_file(&mut warehouse, day, &file)?;
            println!(
                "Imported {rows} rows into {}.",
                warehouse.partition_name(day)
            );
        }
        #[cfg(feature = "serve")]
        Command::Serve {
            snapshot,
            port,
            top,
        } => {
            let hits = snapshot::load(&snapshot)?;
            let mut serve_config = config.serve.clone();
            if let Some(port) = port {
                serve_config.port = port;
            }
            let top_n = top.unwrap_or(config.report.top_n);
            serve::run(&serve_config, Report::build(&hits), top_n).await?;
        }
    }

    Ok(())
}

fn open_warehouse(
    config: &JourneysConfig,
    data_dir: &DataDir,
) -> Result<warehouse::SqliteWarehouse, warehouse::WarehouseError> {
    let path = data_dir.resolve(&config.warehouse.path);
    tracing::debug!(
        path = %path.display(),
        data_dir = %data_dir.root().display(),
        "opening warehouse"
    );
    warehouse::SqliteWarehouse::open(&path, &config.warehouse.table_prefix)
}

fn print_report(
    report: &Report,
    output: &OutputArgs,
    default_top_n: usize,
) -> Result<(), serde_json::Error> {
    match output.format {
        Format::Json => println!("{}", serde_json::to_string_pretty(report)?),
        Format::Table => println!(
            "{}",
            chart::render_report_text(report, output.top.unwrap_or(default_top_n))
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn extract_collects_repeated_seed_hosts() {
        let cli = Cli::try_parse_from([
            "journeys",
            "extract",
            "--start",
            "20220524",
            "--end",
            "20220525",
            "--seed-host",
            "account.gov.uk",
            "--seed-host",
            "signin.account.gov.uk",
            "--format",
            "json",
        ])
        .unwrap();

        match cli.command {
            Command::Extract {
                seed_hosts, output, ..
            } => {
                assert_eq!(seed_hosts.len(), 2);
                assert_eq!(output.format, Format::Json);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.config, PathBuf::from("journeys.toml"));
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        let err = Cli::try_parse_from(["journeys", "-v", "-q", "import", "--date", "20220524", "x"]);
        assert!(err.is_err());
    }

    #[test]
    fn report_accepts_host_filter() {
        let cli = Cli::try_parse_from([
            "journeys",
            "report",
            "snap.jsonl.zst",
            "--host",
            "account.gov.uk",
            "--top",
            "5",
        ])
        .unwrap();
        match cli.command {
            Command::Report { host, output, .. } => {
                assert_eq!(host.as_deref(), Some("account.gov.uk"));
                assert_eq!(output.top, Some(5));
                assert_eq!(output.format, Format::Table);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
