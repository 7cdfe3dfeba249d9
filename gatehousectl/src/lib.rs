use std::io;
use std::path::PathBuf;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use thiserror::Error;

use gatehouse_core::portal::catalog;
use gatehouse_core::{
    load_portal_config, Credentials, Operation, OperationOutput, PortalConfig, SearchQuery,
    SessionOrchestrator,
};

pub const USERNAME_ENV: &str = "GATEHOUSE_USERNAME";
pub const PASSWORD_ENV: &str = "GATEHOUSE_PASSWORD";

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] gatehouse_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("credentials missing: set {0} and {1}")]
    MissingCredentials(&'static str, &'static str),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Support-portal scraping control interface", long_about = None)]
pub struct Cli {
    /// Path to a gatehouse.toml overriding the built-in defaults
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Run the browser with a visible window
    #[arg(long, default_value_t = false)]
    pub headed: bool,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search the portal's knowledge base
    Search(SearchArgs),
    /// Fetch one document by its direct URL
    Document(DocumentArgs),
    /// Product advisories (deprecated; always prints an empty list)
    Alerts(AlertsArgs),
    /// Print the known filter vocabulary
    #[command(subcommand)]
    Catalog(CatalogCommands),
    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search phrase
    pub query: String,
    /// Product filter, repeatable
    #[arg(long = "product")]
    pub products: Vec<String>,
    /// Document-type filter, repeatable
    #[arg(long = "doc-type")]
    pub doc_types: Vec<String>,
    /// Result page number
    #[arg(long, default_value_t = 1)]
    pub page: u32,
    /// Results per page
    #[arg(long, default_value_t = gatehouse_core::portal::DEFAULT_ROWS)]
    pub rows: u32,
    /// Sort order (relevant, "lastModifiedDate desc", ...)
    #[arg(long, default_value = gatehouse_core::portal::DEFAULT_SORT)]
    pub sort: String,
}

#[derive(Args, Debug)]
pub struct DocumentArgs {
    /// Document URL
    pub url: String,
}

#[derive(Args, Debug)]
pub struct AlertsArgs {
    /// Product name
    pub product: String,
}

#[derive(Subcommand, Debug)]
pub enum CatalogCommands {
    /// List known products
    Products,
    /// List known document types
    DocTypes,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    pub shell: Shell,
}

pub fn run(cli: Cli) -> Result<()> {
    init_tracing();

    match cli.command {
        Commands::Completions(args) => {
            let mut command = Cli::command();
            clap_complete::generate(args.shell, &mut command, "gatehousectl", &mut io::stdout());
            Ok(())
        }
        Commands::Catalog(command) => {
            let entries: &[&str] = match command {
                CatalogCommands::Products => catalog::AVAILABLE_PRODUCTS,
                CatalogCommands::DocTypes => catalog::DOCUMENT_TYPES,
            };
            match cli.format {
                OutputFormat::Text => {
                    for entry in entries {
                        println!("{entry}");
                    }
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(entries)?);
                }
            }
            Ok(())
        }
        Commands::Search(args) => {
            let operation = Operation::Search(search_query(args));
            execute(&cli.config, cli.headed, cli.format, operation)
        }
        Commands::Document(args) => {
            let operation = Operation::GetDocument { url: args.url };
            execute(&cli.config, cli.headed, cli.format, operation)
        }
        Commands::Alerts(args) => {
            let operation = Operation::GetAlerts {
                product: args.product,
            };
            execute(&cli.config, cli.headed, cli.format, operation)
        }
    }
}

fn execute(
    config_path: &Option<PathBuf>,
    headed: bool,
    format: OutputFormat,
    operation: Operation,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => load_portal_config(path)?,
        None => PortalConfig::default(),
    };
    if headed {
        config.chromium.headless = false;
    }
    // Credentials come from the environment only; there is no built-in
    // fallback and no way to pass them on the command line.
    let credentials = credentials_from_env()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let orchestrator = SessionOrchestrator::new(config);
    let output = runtime.block_on(orchestrator.run(&credentials, operation));
    render(&output, format)
}

pub fn search_query(args: SearchArgs) -> SearchQuery {
    let mut query = SearchQuery::new(args.query);
    query.products = args.products;
    query.doc_types = args.doc_types;
    query.page = args.page;
    query.rows = args.rows;
    query.sort = args.sort;
    query
}

pub fn credentials_from_env() -> Result<Credentials> {
    let username = std::env::var(USERNAME_ENV).unwrap_or_default();
    let password = std::env::var(PASSWORD_ENV).unwrap_or_default();
    if username.is_empty() || password.is_empty() {
        return Err(AppError::MissingCredentials(USERNAME_ENV, PASSWORD_ENV));
    }
    Ok(Credentials::new(username, password))
}

fn render(output: &OperationOutput, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(output)?);
            Ok(())
        }
        OutputFormat::Text => {
            print!("{}", format_text(output));
            Ok(())
        }
    }
}

pub fn format_text(output: &OperationOutput) -> String {
    let mut out = String::new();
    match output {
        OperationOutput::Search(records) => {
            if records.is_empty() {
                out.push_str("no results\n");
            }
            for (index, record) in records.iter().enumerate() {
                out.push_str(&format!("{}. {}\n", index + 1, record.title));
                out.push_str(&format!("   {}\n", record.url));
                out.push_str(&format!(
                    "   {} | {}\n",
                    record.doc_type, record.last_updated
                ));
                out.push_str(&format!("   {}\n", record.summary));
            }
        }
        OperationOutput::Document(record) => {
            out.push_str(&format!("{}\n{}\n", record.title, record.url));
            for (label, value) in &record.metadata {
                out.push_str(&format!("{label}: {value}\n"));
            }
            out.push('\n');
            out.push_str(&record.content);
            out.push('\n');
        }
        OperationOutput::Alerts(alerts) => {
            out.push_str(&format!(
                "{} advisories (operation is deprecated)\n",
                alerts.len()
            ));
        }
        OperationOutput::Failure { error } => {
            out.push_str(&format!("error: {error}\n"));
        }
    }
    out
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_core::portal::records::{DocumentRecord, SearchResultRecord};
    use std::collections::BTreeMap;

    #[test]
    fn cli_parses_a_filtered_search() {
        let cli = Cli::try_parse_from([
            "gatehousectl",
            "--format",
            "json",
            "search",
            "memory leak",
            "--product",
            "Red Hat Enterprise Linux",
            "--doc-type",
            "Solution",
            "--sort",
            "lastModifiedDate desc",
            "--rows",
            "50",
        ])
        .unwrap();
        let Commands::Search(args) = cli.command else {
            panic!("expected search command");
        };
        let query = search_query(args);
        assert_eq!(query.query, "memory leak");
        assert_eq!(query.products, vec!["Red Hat Enterprise Linux"]);
        assert_eq!(query.doc_types, vec!["Solution"]);
        assert_eq!(query.rows, 50);
        assert_eq!(query.sort, "lastModifiedDate desc");
    }

    #[test]
    fn credentials_require_both_environment_variables() {
        std::env::remove_var(USERNAME_ENV);
        std::env::remove_var(PASSWORD_ENV);
        assert!(matches!(
            credentials_from_env(),
            Err(AppError::MissingCredentials(_, _))
        ));

        std::env::set_var(USERNAME_ENV, "user@example.com");
        assert!(credentials_from_env().is_err());

        std::env::set_var(PASSWORD_ENV, "hunter2");
        let credentials = credentials_from_env().unwrap();
        assert_eq!(credentials.username, "user@example.com");

        std::env::remove_var(USERNAME_ENV);
        std::env::remove_var(PASSWORD_ENV);
    }

    #[test]
    fn text_rendering_covers_every_output_shape() {
        let search = OperationOutput::Search(vec![SearchResultRecord {
            title: "A title".into(),
            url: "https://portal.example/1".into(),
            summary: "summary".into(),
            doc_type: "Solution".into(),
            last_updated: "2025-01-01".into(),
        }]);
        let text = format_text(&search);
        assert!(text.contains("1. A title"));
        assert!(text.contains("Solution | 2025-01-01"));

        let document = OperationOutput::Document(DocumentRecord {
            title: "Doc".into(),
            content: "Body".into(),
            url: "https://portal.example/2".into(),
            metadata: BTreeMap::from([("Component".to_string(), "kernel".to_string())]),
        });
        let text = format_text(&document);
        assert!(text.contains("Component: kernel"));
        assert!(text.contains("Body"));

        let failure = OperationOutput::failure("login failed");
        assert_eq!(format_text(&failure), "error: login failed\n");

        let alerts = OperationOutput::Alerts(Vec::new());
        assert!(format_text(&alerts).contains("deprecated"));
    }
}
