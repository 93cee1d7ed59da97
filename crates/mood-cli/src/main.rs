//! `budget-mood` command line runner

mod logging;
mod spinner;

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use mood_core::{
    classify, ConfigError, DocumentStore, MoodConfig, PageTarget, RunSummary, Runner,
    RunnerOptions,
};
use mood_notion::{NotionClient, NotionOptions};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

const DEFAULT_CONFIG: &str = "budget-mood.toml";

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .short('c')
        .default_value(DEFAULT_CONFIG)
        .value_parser(value_parser!(PathBuf))
        .help("Path to the TOML configuration")
}

fn cli() -> Command {
    Command::new("budget-mood")
        .version(mood_core::VERSION)
        .about("Keeps the budget mood image on Notion pages in sync with progress")
        .subcommand_required(true)
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("text")
                .value_parser(["text", "json"])
                .help("Console log format"),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Also append JSON logs to this file"),
        )
        .subcommand(
            Command::new("run")
                .about("Update the mood image on every configured page")
                .arg(config_arg())
                .arg(
                    Arg::new("page")
                        .long("page")
                        .short('p')
                        .action(ArgAction::Append)
                        .help("Only process the page with this name (repeatable)"),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Locate image blocks without updating them"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the summary as JSON"),
                )
                .arg(
                    Arg::new("no-spinner")
                        .long("no-spinner")
                        .action(ArgAction::SetTrue)
                        .help("Never draw the progress spinner"),
                ),
        )
        .subcommand(
            Command::new("check-config")
                .about("Load and validate the configuration")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("classify")
                .about("Show the mood bucket for a progress percentage")
                .arg(
                    Arg::new("progress")
                        .required(true)
                        .allow_negative_numbers(true)
                        .value_parser(value_parser!(f64))
                        .help("Progress percentage, e.g. 42 for 42%"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .short('c')
                        .value_parser(value_parser!(PathBuf))
                        .help("Resolve the image URL with this configuration"),
                ),
        )
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();

    let format = logging::LogFormat::parse(
        matches
            .get_one::<String>("log-format")
            .map_or("text", String::as_str),
    );
    let log_file = matches.get_one::<PathBuf>("log-file").map(PathBuf::as_path);
    if let Err(e) = logging::init(format, log_file) {
        eprintln!("error: {e:#}");
        return ExitCode::FAILURE;
    }

    let result = match matches.subcommand() {
        Some(("run", args)) => run(args).await,
        Some(("check-config", args)) => check_config(args),
        Some(("classify", args)) => classify_command(args),
        _ => Ok(ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: &Path) -> Result<MoodConfig> {
    MoodConfig::load(path).with_context(|| format!("loading configuration {}", path.display()))
}

async fn run(args: &ArgMatches) -> Result<ExitCode> {
    let path = args
        .get_one::<PathBuf>("config")
        .context("missing --config")?;
    let config = load_config(path)?;

    let names: Vec<String> = args
        .get_many::<String>("page")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let targets = select_pages(config.targets(), &names)?;

    let dry_run = args.get_flag("dry-run");
    let accounts = build_clients(&config, &targets)?;
    let runner = Runner::new(
        accounts,
        config.image_table()?,
        RunnerOptions {
            max_concurrent_pages: config.runtime.max_concurrent_pages,
            request_timeout: config.request_timeout(),
            processor: config.processor_options(dry_run),
        },
    );

    let spinner = spinner::Spinner::start(
        format!("Updating {} page(s)", targets.len()),
        !args.get_flag("no-spinner") && !args.get_flag("json"),
    );
    let summary = runner.run(targets).await;
    spinner.stop().await;
    let summary = summary?;

    if args.get_flag("json") {
        let rows = summary.rows();
        let out = serde_json::json!({
            "run_id": summary.run_id.to_string(),
            "started_at": summary.started_at,
            "finished_at": summary.finished_at,
            "updated": summary.succeeded(),
            "not_found": summary.not_found(),
            "failed": summary.failed(),
            "pages": rows,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        print!("{}", render_summary(&summary));
    }

    Ok(if run_succeeded(&summary) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Pages without an image block are warnings; only real failures fail the run
fn run_succeeded(summary: &RunSummary) -> bool {
    summary.failed() == 0
}

/// Keep only the named pages, in configuration order
fn select_pages(targets: Vec<PageTarget>, names: &[String]) -> Result<Vec<PageTarget>> {
    if names.is_empty() {
        return Ok(targets);
    }
    if let Some(unknown) = names
        .iter()
        .find(|name| !targets.iter().any(|t| &t.name == *name))
    {
        bail!("no configured page is named {unknown:?}");
    }
    Ok(targets
        .into_iter()
        .filter(|t| names.contains(&t.name))
        .collect())
}

/// One Notion client per account used by `targets`
fn build_clients(
    config: &MoodConfig,
    targets: &[PageTarget],
) -> Result<HashMap<String, Arc<dyn DocumentStore>>> {
    let options = NotionOptions::default().with_timeout(config.request_timeout());
    let mut clients: HashMap<String, Arc<dyn DocumentStore>> = HashMap::new();

    for target in targets {
        if clients.contains_key(&target.account) {
            continue;
        }
        let Some(account) = config.accounts.get(&target.account) else {
            // The runner reports unknown accounts with the page name attached.
            continue;
        };
        let key = account.resolve_api_key(&target.account)?;
        let client = NotionClient::new(&key, options.clone())
            .with_context(|| format!("building client for account {}", target.account))?;
        clients.insert(target.account.clone(), Arc::new(client));
    }
    Ok(clients)
}

fn render_summary(summary: &RunSummary) -> String {
    use std::fmt::Write;

    let elapsed = summary.finished_at - summary.started_at;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Run {} finished in {:.1}s: {} updated, {} not found, {} failed",
        summary.run_id,
        elapsed.num_milliseconds() as f64 / 1000.0,
        summary.succeeded(),
        summary.not_found(),
        summary.failed()
    );
    for row in summary.rows() {
        let detail = match (&row.progress, &row.bucket, &row.image_url, &row.error) {
            (Some(progress), Some(bucket), Some(url), _) => {
                format!("{progress:.1}% -> bucket {bucket} ({url})")
            }
            (_, _, _, Some(error)) => error.clone(),
            _ => String::new(),
        };
        let _ = writeln!(out, "  [{:<18}] {}: {}", row.status, row.name, detail);
    }
    out
}

fn check_config(args: &ArgMatches) -> Result<ExitCode> {
    let path = args
        .get_one::<PathBuf>("config")
        .context("missing --config")?;
    let config = load_config(path)?;
    config.image_table()?;

    let mut missing_keys = 0usize;
    for (name, problem) in account_key_status(&config, |var| std::env::var(var).ok()) {
        match problem {
            Some(e) => {
                missing_keys += 1;
                println!("account {name}: {e}");
            }
            None => println!("account {name}: key available"),
        }
    }
    for target in config.targets() {
        println!(
            "page {} (account {}, database {}, page {})",
            target.name, target.account, target.source_id, target.page_id
        );
    }

    if missing_keys > 0 {
        bail!("{missing_keys} account(s) have no usable API key");
    }
    println!("{} is valid", path.display());
    Ok(ExitCode::SUCCESS)
}

/// Key resolution result for every account a page uses, in name order
///
/// Accounts no page references are skipped, matching what `run` builds.
fn account_key_status<F>(config: &MoodConfig, lookup: F) -> Vec<(String, Option<ConfigError>)>
where
    F: Fn(&str) -> Option<String>,
{
    let used: BTreeSet<&str> = config.pages.iter().map(|p| p.account.as_str()).collect();
    used.into_iter()
        .filter_map(|name| {
            let account = config.accounts.get(name)?;
            let problem = account.resolve_api_key_with(name, &lookup).err();
            Some((name.to_string(), problem))
        })
        .collect()
}

fn classify_command(args: &ArgMatches) -> Result<ExitCode> {
    let progress = *args
        .get_one::<f64>("progress")
        .context("missing progress")?;
    let bucket = classify(progress);

    match args.get_one::<PathBuf>("config") {
        Some(path) => {
            let image = load_config(path)?.image_table()?.image_for_bucket(bucket);
            println!("bucket {} -> {}", image.bucket, image.url);
        }
        None => println!("bucket {bucket}"),
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mood_test_utils::blocks::{image, paragraph};
    use mood_test_utils::{test_image_table, InMemoryStore};
    use pretty_assertions::assert_eq;

    fn targets() -> Vec<PageTarget> {
        vec![
            PageTarget::new("household", "personal", "db-1", "p-1"),
            PageTarget::new("travel", "personal", "db-2", "p-2"),
            PageTarget::new("team", "work", "db-3", "p-3"),
        ]
    }

    #[test]
    fn cli_is_well_formed() {
        cli().debug_assert();
    }

    #[test]
    fn parses_run_flags() {
        let matches = cli()
            .try_get_matches_from([
                "budget-mood",
                "run",
                "--config",
                "moods.toml",
                "--page",
                "travel",
                "--page",
                "team",
                "--dry-run",
            ])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "run");
        assert!(args.get_flag("dry-run"));
        assert!(!args.get_flag("json"));
        let pages: Vec<&String> = args.get_many::<String>("page").unwrap().collect();
        assert_eq!(pages, vec!["travel", "team"]);
    }

    #[test]
    fn classify_accepts_negative_progress() {
        let matches = cli()
            .try_get_matches_from(["budget-mood", "classify", "-5"])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert_eq!(args.get_one::<f64>("progress"), Some(&-5.0));
    }

    #[test]
    fn selects_named_pages_in_config_order() {
        let selected =
            select_pages(targets(), &["team".to_string(), "household".to_string()]).unwrap();
        let names: Vec<&str> = selected.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["household", "team"]);
    }

    #[test]
    fn empty_selection_keeps_everything() {
        assert_eq!(select_pages(targets(), &[]).unwrap().len(), 3);
    }

    #[test]
    fn unknown_page_name_is_rejected() {
        let err = select_pages(targets(), &["garden".to_string()]).unwrap_err();
        assert!(err.to_string().contains("garden"));
    }

    #[tokio::test]
    async fn missing_image_block_does_not_fail_the_run() {
        let store = Arc::new(
            InMemoryStore::new()
                .with_progress("db-1", Some(0.3))
                .with_children("p-1", vec![image("img")])
                .with_progress("db-2", Some(0.3))
                .with_children("p-2", vec![paragraph("text")]),
        );
        let mut accounts: HashMap<String, Arc<dyn DocumentStore>> = HashMap::new();
        accounts.insert("personal".to_string(), store);
        let runner = Runner::new(accounts, test_image_table(), RunnerOptions::default());

        let summary = runner.run(targets()[..2].to_vec()).await.unwrap();
        assert_eq!(summary.succeeded(), 1);
        assert_eq!(summary.not_found(), 1);
        assert!(run_succeeded(&summary));
    }

    #[tokio::test]
    async fn failed_page_fails_the_run() {
        let store = Arc::new(
            InMemoryStore::new()
                .with_progress("db-1", None)
                .with_children("p-1", vec![image("img")]),
        );
        let mut accounts: HashMap<String, Arc<dyn DocumentStore>> = HashMap::new();
        accounts.insert("personal".to_string(), store);
        let runner = Runner::new(accounts, test_image_table(), RunnerOptions::default());

        let summary = runner.run(targets()[..1].to_vec()).await.unwrap();
        assert_eq!(summary.failed(), 1);
        assert!(!run_succeeded(&summary));
    }

    const TWO_ACCOUNTS: &str = r#"
        asset_base_url = "https://img/"

        [accounts.personal]
        api_key_env = "MOOD_PERSONAL_KEY"

        [accounts.spare]
        api_key_env = "MOOD_SPARE_KEY"

        [[pages]]
        name = "household"
        account = "personal"
        database_id = "db-1"
        page_id = "p-1"
    "#;

    #[test]
    fn key_check_ignores_unused_accounts() {
        let config = MoodConfig::from_toml_str(TWO_ACCOUNTS).unwrap();

        let status = account_key_status(&config, |var| {
            (var == "MOOD_PERSONAL_KEY").then(|| "secret_personal".to_string())
        });
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].0, "personal");
        assert!(status[0].1.is_none());
    }

    #[test]
    fn key_check_reports_used_account_without_key() {
        let config = MoodConfig::from_toml_str(TWO_ACCOUNTS).unwrap();

        let status = account_key_status(&config, |_| None);
        assert_eq!(status.len(), 1);
        assert!(matches!(
            status[0].1,
            Some(ConfigError::MissingApiKey { ref account, .. }) if account == "personal"
        ));
    }

    #[test]
    fn clients_only_for_used_accounts() {
        let config = MoodConfig::from_toml_str(
            r#"
            asset_base_url = "https://img/"

            [accounts.personal]
            api_key = "secret_personal"

            [accounts.work]
            api_key_env = "BUDGET_MOOD_TEST_UNSET_VARIABLE"

            [[pages]]
            name = "household"
            account = "personal"
            database_id = "db-1"
            page_id = "p-1"
            "#,
        )
        .unwrap();

        let clients = build_clients(&config, &config.targets()).unwrap();
        assert_eq!(clients.len(), 1);
        assert!(clients.contains_key("personal"));
    }
}
