use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kennel::config::{self, Config, Credentials};
use kennel::service::datadog::DEFAULT_BASE_URL;
use kennel::{Action, AlertSummary, DatadogClient, Kennel, ReconcileReport, Tags};
use log::{error, info, warn};
use std::path::PathBuf;

/// Command-line arguments for kennel
#[derive(Parser)]
#[command(
    name = "kennel",
    about = "Keep monitoring alerts in sync with their declarative definitions",
    long_about = "Expands templated alert definitions from TOML files, splits composite alerts \
                  into sub-alerts and applies the create/update/delete plan that makes the \
                  monitoring service match them."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to an alert file or a directory of alert files
    #[arg(
        short,
        long,
        global = true,
        value_name = "PATH",
        help = "Alert definitions: a TOML file or a directory of TOML files (default: ./alerts)"
    )]
    config: Option<PathBuf>,

    /// Restrict the operation to alerts carrying these tags
    #[arg(
        short,
        long = "tag",
        global = true,
        value_name = "KEY:VALUE",
        help = "Only act on alerts carrying this tag (repeatable, all must match)"
    )]
    tags: Vec<String>,

    /// Report the plan without changing anything
    #[arg(
        short = 'n',
        long,
        global = true,
        help = "Show what would change without calling the service"
    )]
    dry_run: bool,

    /// Base URL of the monitoring API
    #[arg(long, global = true, value_name = "URL", default_value = DEFAULT_BASE_URL)]
    api_url: String,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        global = true,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// List managed alerts and their state
    List,
    /// Create, update and delete alerts to match the definitions
    Update,
    /// Delete managed alerts
    Delete,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// # Returns
    ///
    /// `Ok(())` if all arguments are valid, `Err(String)` with error message otherwise
    fn validate(&self) -> Result<(), String> {
        let path = self.config_path();
        if !path.exists() {
            return Err(format!("Alert definitions not found: {}", path.display()));
        }
        if path.is_file() && path.extension().is_some_and(|ext| ext != "toml") {
            warn!("Alert file does not have .toml extension: {}", path.display());
        }

        self.filter()?;

        if self.dry_run && self.command == Command::List {
            warn!("--dry-run has no effect on list");
        }
        Ok(())
    }

    fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(config::config::default_path)
    }

    /// Tag filter built from the repeated `--tag` arguments
    fn filter(&self) -> Result<Tags, String> {
        self.tags
            .iter()
            .map(|tag| {
                Tags::parse_pair(tag)
                    .ok_or_else(|| format!("Invalid tag '{}': expected KEY:VALUE", tag))
            })
            .collect()
    }
}

/// Render the listing as a plain left-aligned table
fn render_table(summaries: &[AlertSummary]) -> String {
    let rows: Vec<[String; 3]> = summaries
        .iter()
        .map(|s| {
            [
                s.name.clone(),
                s.state.clone().unwrap_or_else(|| "-".to_string()),
                s.tags.join(", "),
            ]
        })
        .collect();

    let header = ["Name".to_string(), "State".to_string(), "Tags".to_string()];
    let mut widths = header.clone().map(|h| h.len());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    std::iter::once(&header)
        .chain(rows.iter())
        .map(|row| {
            format!(
                "{:<w0$}  {:<w1$}  {}",
                row[0],
                row[1],
                row[2],
                w0 = widths[0],
                w1 = widths[1]
            )
            .trim_end()
            .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// One line per action, prefixed when nothing was actually changed
fn render_report(report: &ReconcileReport) -> String {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    let mut lines: Vec<String> = report
        .actions
        .iter()
        .filter(|action| !matches!(action, Action::Unchanged { .. }))
        .map(|action| {
            let (verb, id) = match action {
                Action::Create { id, .. } => ("create", id.as_ref().map(|id| id.to_string())),
                Action::Update { id, .. } => ("update", Some(id.to_string())),
                Action::Delete { id, .. } => ("delete", Some(id.to_string())),
                Action::Unchanged { id, .. } => ("keep", id.as_ref().map(|id| id.to_string())),
            };
            match id {
                Some(id) => format!("{}{} {} ({})", prefix, verb, action.name(), id),
                None => format!("{}{} {}", prefix, verb, action.name()),
            }
        })
        .collect();

    lines.push(format!(
        "{}{} created, {} updated, {} deleted",
        prefix,
        report.creates(),
        report.updates(),
        report.deletes()
    ));
    lines.join("\n")
}

fn run(cli: &Cli) -> Result<()> {
    let filter = cli.filter().map_err(anyhow::Error::msg)?;
    let path = cli.config_path();
    let config = Config::load(&path)
        .with_context(|| format!("Failed to load alert definitions from {}", path.display()))?;

    let credentials = Credentials::resolve(None, None).context("Failed to resolve credentials")?;
    let client = DatadogClient::with_base_url(credentials, cli.api_url.clone())
        .context("Failed to initialize monitoring API client")?;
    let kennel = Kennel::new(config, client);
    info!(
        "Loaded alert definitions for team(s): {}",
        kennel.config().teams().collect::<Vec<_>>().join(", ")
    );

    match cli.command {
        Command::List => {
            let summaries = kennel.list(&filter).context("Failed to list alerts")?;
            println!("{}", render_table(&summaries));
        }
        Command::Update => {
            let report = kennel
                .update(cli.dry_run, &filter)
                .context("Failed to update alerts")?;
            println!("{}", render_report(&report));
        }
        Command::Delete => {
            let report = kennel
                .delete(cli.dry_run, &filter)
                .context("Failed to delete alerts")?;
            println!("{}", render_report(&report));
        }
    }
    Ok(())
}

fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    info!("Starting kennel {:?}", cli.command);

    // Validate CLI arguments
    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(&cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kennel::AlertId;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("kennel").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_update_with_flags() {
        let cli = cli(&["update", "--dry-run", "--tag", "tier:gold", "-t", "zone:eu"]);

        assert_eq!(cli.command, Command::Update);
        assert!(cli.dry_run);
        assert_eq!(cli.tags, vec!["tier:gold", "zone:eu"]);
        assert_eq!(cli.api_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_global_flags_before_subcommand() {
        let cli = cli(&["--verbose", "-c", "alerts.toml", "delete"]);

        assert_eq!(cli.command, Command::Delete);
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("alerts.toml")));
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["kennel"]).is_err());
    }

    #[test]
    fn test_filter_from_tags() {
        let cli = cli(&["list", "--tag", "tier:gold", "--tag", "url:http://x"]);

        let filter = cli.filter().unwrap();

        assert_eq!(filter.get("tier"), Some("gold"));
        assert_eq!(filter.get("url"), Some("http://x"));
    }

    #[test]
    fn test_filter_rejects_bare_tag() {
        let cli = cli(&["list", "--tag", "gold"]);
        assert!(cli.filter().is_err());
    }

    #[test]
    fn test_cli_validation_with_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alerts.toml");
        std::fs::write(&path, "[kennel]\nteam = \"core\"\n").unwrap();

        let cli = cli(&["list", "--config", path.to_str().unwrap()]);

        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_cli_validation_with_directory() {
        let dir = TempDir::new().unwrap();

        let cli = cli(&["update", "--config", dir.path().to_str().unwrap()]);

        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_cli_validation_with_missing_path() {
        let cli = cli(&["update", "--config", "/nonexistent/alerts.toml"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_cli_validation_with_bad_tag() {
        let dir = TempDir::new().unwrap();
        let cli = cli(&["update", "--config", dir.path().to_str().unwrap(), "--tag", ":x"]);
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_render_table() {
        let summaries = vec![
            AlertSummary {
                name: "[KN] core | cpu".to_string(),
                state: Some("OK".to_string()),
                tags: vec!["source:kennel".to_string(), "team:core".to_string()],
            },
            AlertSummary {
                name: "[KN] core | x".to_string(),
                state: None,
                tags: vec![],
            },
        ];

        let table = render_table(&summaries);
        let lines: Vec<_> = table.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Name"));
        assert_eq!(lines[1], "[KN] core | cpu  OK     source:kennel, team:core");
        assert_eq!(lines[2], "[KN] core | x    -");
    }

    #[test]
    fn test_render_report_hides_unchanged() {
        let report = ReconcileReport {
            dry_run: true,
            actions: vec![
                Action::Create {
                    name: "a".to_string(),
                    id: Some(AlertId::from("ABC123ABC123")),
                },
                Action::Unchanged {
                    name: "b".to_string(),
                    id: Some(AlertId::from(2)),
                },
                Action::Delete {
                    name: "c".to_string(),
                    id: AlertId::from(3),
                },
            ],
        };

        let rendered = render_report(&report);

        assert_eq!(
            rendered,
            "[dry-run] create a (ABC123ABC123)\n[dry-run] delete c (3)\n[dry-run] 1 created, 0 updated, 1 deleted"
        );
    }
}
