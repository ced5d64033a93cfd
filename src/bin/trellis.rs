//! Trellis CLI - Run nested requests against a SQLite database
//!
//! Usage:
//!   trellis read <invoice.json>
//!   trellis write <invoice.json>
//!   trellis plan <invoice.json> [--dialect <dialect>]
//!   trellis schema
//!
//! The database and read defaults come from trellis.toml (see
//! `Settings::load`); `--database` overrides the configured path.
//! Set `TRELLIS_LOG=debug` to log every executed statement.

use clap::{Parser, Subcommand, ValueEnum};
use std::error::Error as StdError;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use trellis::builder::QueryBuilder;
use trellis::config::Settings;
use trellis::execution::{ReadClient, SqliteConnection, WriteClient};
use trellis::notation::Invoice;
use trellis::schema::Schema;
use trellis::space::{Space, TrackUnit};
use trellis::sql::Dialect;

type CliResult = Result<(), Box<dyn StdError>>;

#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "Trellis - nested declarative reads and writes over SQL")]
#[command(version)]
struct Cli {
    /// Path to a config file (defaults to the usual search locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path, overriding the configured one
    #[arg(long, global = true)]
    database: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read an invoice and print the resulting views as JSON
    Read {
        /// Path to the invoice JSON file
        file: PathBuf,
    },

    /// Write an invoice inside one transaction
    Write {
        /// Path to the invoice JSON file
        file: PathBuf,
    },

    /// Print the SQL for each top-level bucket without executing it
    Plan {
        /// Path to the invoice JSON file
        file: PathBuf,

        /// SQL dialect to render (defaults to the configured one)
        #[arg(short, long)]
        dialect: Option<DialectArg>,
    },

    /// Print tables, foreign keys and resolvable links
    Schema,
}

#[derive(Clone, ValueEnum)]
enum DialectArg {
    Postgres,
    Mysql,
    Tsql,
    Duckdb,
    Sqlite,
}

impl From<DialectArg> for Dialect {
    fn from(arg: DialectArg) -> Self {
        match arg {
            DialectArg::Postgres => Dialect::Postgres,
            DialectArg::Mysql => Dialect::MySql,
            DialectArg::Tsql => Dialect::TSql,
            DialectArg::Duckdb => Dialect::DuckDb,
            DialectArg::Sqlite => Dialect::Sqlite,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match load_settings(&cli) {
        Ok(settings) => run(cli.command, settings).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::WARN.into())
        .with_env_var("TRELLIS_LOG")
        .from_env_lossy();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("warning: tracing subscriber already installed");
    }
}

fn load_settings(cli: &Cli) -> Result<Settings, Box<dyn StdError>> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load()?,
    };
    if let Some(path) = &cli.database {
        settings.database.path = path.clone();
    }
    Ok(settings)
}

async fn run(command: Commands, settings: Settings) -> CliResult {
    let conn = Arc::new(open(&settings)?);
    let schema = Arc::new(
        settings
            .apply_junctions(Schema::builder().tables(conn.introspect().await?))
            .build()?,
    );

    match command {
        Commands::Read { file } => cmd_read(file, schema, conn, &settings).await,
        Commands::Write { file } => cmd_write(file, schema, conn).await,
        Commands::Plan { file, dialect } => {
            let dialect = dialect.map(Dialect::from).unwrap_or(settings.database.dialect);
            cmd_plan(file, &schema, dialect, &settings)
        }
        Commands::Schema => {
            cmd_schema(&schema);
            Ok(())
        }
    }
}

fn open(settings: &Settings) -> Result<SqliteConnection, Box<dyn StdError>> {
    if settings.database.is_in_memory() {
        return Ok(SqliteConnection::open_in_memory()?);
    }
    Ok(SqliteConnection::open(settings.database.resolved_path()?)?)
}

fn read_invoice(file: &PathBuf) -> Result<Invoice, Box<dyn StdError>> {
    let source = fs::read_to_string(file)
        .map_err(|e| format!("reading '{}': {}", file.display(), e))?;
    Ok(serde_json::from_str(&source)?)
}

async fn cmd_read(
    file: PathBuf,
    schema: Arc<Schema>,
    conn: Arc<SqliteConnection>,
    settings: &Settings,
) -> CliResult {
    let invoice = read_invoice(&file)?;
    let client = ReadClient::new(schema, conn)
        .with_collapse_none(settings.read.collapse_none)
        .with_total_field(settings.read.total_field.clone());

    let views = client.read(&invoice).await?;
    println!("{}", serde_json::to_string_pretty(&views)?);
    Ok(())
}

async fn cmd_write(file: PathBuf, schema: Arc<Schema>, conn: Arc<SqliteConnection>) -> CliResult {
    let invoice = read_invoice(&file)?;
    let affected = WriteClient::new(schema, conn).write(&invoice).await?;
    println!("{} row(s) affected", affected);
    Ok(())
}

fn cmd_plan(file: PathBuf, schema: &Schema, dialect: Dialect, settings: &Settings) -> CliResult {
    let invoice = read_invoice(&file)?;
    let builder = QueryBuilder::new(schema).with_total_field(&settings.read.total_field);

    for bucket in &invoice {
        let statement = builder.build(bucket)?;
        println!("-- {} ({})", bucket.name, statement.kind());
        println!("{};", statement.to_sql(dialect));
        println!();
    }
    Ok(())
}

fn cmd_schema(schema: &Schema) {
    println!("Tables:");
    for table in schema.table_defs() {
        println!("  - {} ({})", table.name, table.columns.join(", "));
    }
    println!();

    println!("Foreign keys:");
    for fk in schema.foreign_keys() {
        println!("  - {}", fk);
    }
    println!();

    println!("Links:");
    let names: Vec<&str> = schema.table_defs().map(|t| t.name.as_str()).collect();
    for source in &names {
        for target in &names {
            if source == target {
                continue;
            }
            let from = Space::root(TrackUnit::new(*source));
            let to = Space::root(TrackUnit::new(*target));
            match schema.get_link(&from, &to) {
                Ok(Some(link)) => println!("  - {} -> {}: {}", source, target, link),
                Ok(None) => {}
                Err(e) => println!("  - {} -> {}: {}", source, target, e),
            }
        }
    }
}
