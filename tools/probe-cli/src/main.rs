use anyhow::Context;
use clap::{Parser, Subcommand};
use probe_core::{FixtureStore, Settings};
use request_engine::{add_query_params, build_endpoint, final_request_body, MapSource, OverrideSet, Resolver};
use run_report::{summary_line, AllureSummary, CliqNotifier, CliqOptions, DEFAULT_RESULTS_DIR};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Everything after this flag belongs to the Cliq notifier, not to clap.
const SEND_CLIQ_FLAG: &str = "--sendCliq";

#[derive(Parser)]
#[command(name = "probe")]
#[command(about = "Probe CLI - API verification fixtures, endpoints and run reports")]
#[command(version = probe_core::VERSION)]
#[command(after_help = "Append `--sendCliq [key:value ...]` to `report` to post the summary to Zoho Cliq.")]
struct Cli {
    /// Fixture directory, overriding TEST_DATA_DIR
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarise Allure results, optionally notifying Cliq
    Report {
        #[arg(long, default_value = DEFAULT_RESULTS_DIR)]
        results: PathBuf,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Request-body fixture commands
    Fixtures {
        #[command(subcommand)]
        action: FixturesAction,
    },
    /// Preview a built endpoint
    Endpoint {
        /// Endpoint template, or the name of a `*_ENDPOINT` variable
        template: String,
        /// Path placeholder replacement
        #[arg(long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,
        /// Query string parameter
        #[arg(long = "query", value_parser = parse_key_value)]
        query: Vec<(String, String)>,
    },
    /// Show configuration status
    Status,
}

#[derive(Subcommand)]
enum FixturesAction {
    /// List request-body templates
    List,
    /// Show a request body with overrides applied
    Show {
        key: String,
        /// Override as `field.path=value`; `__REMOVE__` deletes the field
        #[arg(long = "set", value_parser = parse_key_value)]
        overrides: Vec<(String, String)>,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.trim().to_string(), value.to_string()))
        .filter(|(key, _)| !key.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

/// Splits argv at `--sendCliq`. The tail is `None` when the flag is absent.
fn split_cliq_args(args: Vec<String>) -> (Vec<String>, Option<Vec<String>>) {
    match args.iter().position(|arg| arg == SEND_CLIQ_FLAG) {
        Some(index) => {
            let mut head = args;
            let tail = head.split_off(index + 1);
            head.pop();
            (head, Some(tail))
        }
        None => (args, None),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (args, cliq_args) = split_cliq_args(std::env::args().collect());
    let cli = Cli::parse_from(args);
    let mut settings = Settings::from_env()?;
    if let Some(dir) = cli.data_dir {
        settings.test_data_dir = dir;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    if cliq_args.is_some() && !matches!(cli.command, Commands::Report { .. }) {
        anyhow::bail!("{} is only supported by the report command", SEND_CLIQ_FLAG);
    }

    match cli.command {
        Commands::Report { results, json } => handle_report(results, json, cliq_args).await,
        Commands::Fixtures { action } => handle_fixtures_action(&settings, action),
        Commands::Endpoint {
            template,
            params,
            query,
        } => handle_endpoint(&settings, &template, params, query),
        Commands::Status => handle_status(&settings),
    }
}

async fn handle_report(
    results: PathBuf,
    json: bool,
    cliq_args: Option<Vec<String>>,
) -> anyhow::Result<()> {
    let cliq = cliq_args.map(|args| CliqOptions::parse(&args));
    if cliq.as_ref().is_some_and(|options| options.help) {
        println!("{}", CliqOptions::usage());
        return Ok(());
    }

    let summary = AllureSummary::from_dir(&results)
        .with_context(|| format!("failed to summarise {}", results.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("📊 Probe Run Summary");
        for (index, feature) in summary.features.iter().enumerate() {
            println!(
                "{:>3}. {:<40} total {:>3}  passed {:>3}  failed {:>3}  skipped {:>3}",
                index + 1,
                feature.name,
                feature.total(),
                feature.passed,
                feature.failed,
                feature.skipped
            );
        }
        println!(
            " --  {:<40} total {:>3}  passed {:>3}  failed {:>3}  skipped {:>3}",
            "Total",
            summary.total(),
            summary.passed,
            summary.failed,
            summary.skipped
        );
    }

    if let Some(options) = cliq {
        println!("🔔 {}", summary_line(&summary, &options.env));
        let notifier = CliqNotifier::from_env(options)?;
        if notifier.notify(&summary).await {
            println!("✅ Results sent to Cliq channel {}", notifier.options().channel);
        } else {
            println!("⚠️  Results were not sent to Cliq");
        }
    }
    Ok(())
}

fn handle_fixtures_action(settings: &Settings, action: FixturesAction) -> anyhow::Result<()> {
    let store = FixtureStore::open(settings.test_data_dir.clone());
    match action {
        FixturesAction::List => {
            println!("📋 Request bodies in {}", store.dir().display());
            for name in store.template_names()? {
                println!("  {}", name);
            }
        }
        FixturesAction::Show { key, overrides } => {
            let overrides = if overrides.is_empty() {
                None
            } else {
                let rows: Vec<Vec<String>> = overrides
                    .into_iter()
                    .map(|(field, value)| vec![field, value])
                    .collect();
                let mut set = OverrideSet::from_rows(rows)?;
                let data = store.test_data()?;
                set.resolve_test_data(&data);
                let source = MapSource::new("test data", data.as_map());
                set.resolve_placeholders(&Resolver::new().with_source(&source))?;
                Some(set)
            };
            let body = final_request_body(&store, Some(key.as_str()), overrides.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }
    Ok(())
}

fn handle_endpoint(
    settings: &Settings,
    template: &str,
    params: Vec<(String, String)>,
    query: Vec<(String, String)>,
) -> anyhow::Result<()> {
    let template = if template.ends_with("_ENDPOINT") {
        settings.endpoint(template)?
    } else {
        template
    };

    let to_map = |pairs: Vec<(String, String)>| -> Map<String, Value> {
        pairs
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect()
    };

    let built = build_endpoint(template, &to_map(params))?;
    for warning in &built.warnings {
        eprintln!("⚠️  {}", warning);
    }
    println!("{}", add_query_params(built.as_str(), &to_map(query)));
    Ok(())
}

fn handle_status(settings: &Settings) -> anyhow::Result<()> {
    println!("📊 {}", probe_core::BUILD_INFO);
    println!(
        "🎯 Base URL: {}",
        settings.base_url.as_deref().unwrap_or("not configured")
    );
    println!(
        "🔑 Access token: {}",
        if settings.access_token.is_some() { "configured" } else { "not configured" }
    );
    println!("⏱️  HTTP timeout: {} ms", settings.http_timeout.as_millis());

    match &settings.db {
        Some(db) => println!("🗄️  Database: {}:{}", db.host, db.port),
        None => println!("🗄️  Database: not configured"),
    }

    let store = FixtureStore::open(settings.test_data_dir.clone());
    match store.template_names() {
        Ok(names) => println!(
            "📁 Test data: {} ({} request bodies)",
            store.dir().display(),
            names.len()
        ),
        Err(e) => println!("📁 Test data: {} ({})", store.dir().display(), e),
    }

    println!("🔗 Endpoints: {}", settings.endpoints.len());
    for (var, path) in &settings.endpoints {
        println!("  {} = {}", var, path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(raw: &str) -> Vec<String> {
        raw.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_split_at_send_cliq() {
        let (head, tail) = split_cliq_args(argv("probe report --results out --sendCliq channel:qa --help"));
        assert_eq!(head, argv("probe report --results out"));
        assert_eq!(tail, Some(argv("channel:qa --help")));

        let (head, tail) = split_cliq_args(argv("probe status"));
        assert_eq!(head, argv("probe status"));
        assert_eq!(tail, None);
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("device_configuration.os=__REMOVE__"),
            Ok(("device_configuration.os".to_string(), "__REMOVE__".to_string()))
        );
        assert_eq!(
            parse_key_value("filter=a=b"),
            Ok(("filter".to_string(), "a=b".to_string()))
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_cli_shape() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
