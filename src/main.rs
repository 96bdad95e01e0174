//! Binary entrypoint for the mudmigrate CLI.
//!
//! Commands:
//! - `status` - per-entity record counts on every reachable backend
//! - `export [source]` - relational backend -> document files
//! - `import [target]` - document files -> relational backend
//! - `backup [--verify <dir> | --list]` - copy local stores, check or list backups
//! - `switch <target>` - backup, migrate and record the new active backend
//!
//! See the library crate docs for module-level details: `mudmigrate::`.
use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use mudmigrate::config::{Config, DEFAULT_CONFIG_FILE};
use mudmigrate::migrate::{BackupSummary, Migrator};
use mudmigrate::storage::BackendKind;

#[derive(Parser)]
#[command(name = "mudmigrate")]
#[command(about = "Move MUD game state between document, SQLite and PostgreSQL backends")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: String,

    /// Document directory (overrides [storage] data_dir)
    #[arg(long, global = true)]
    data_dir: Option<String>,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    /// SQLite database file (defaults to <data_dir>/mud.db)
    #[arg(long, global = true)]
    sqlite_path: Option<String>,

    /// Treat this backend as the active one, ignoring the state file
    #[arg(long, global = true, value_parser = parse_backend)]
    backend: Option<BackendKind>,

    /// Skip the switch confirmation prompt
    #[arg(long, global = true)]
    force: bool,

    /// Read and report without writing anything
    #[arg(long, global = true)]
    dry_run: bool,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Show per-entity record counts on every backend
    Status,
    /// Export a relational backend into the document directory
    Export {
        #[arg(value_parser = parse_backend)]
        source: Option<BackendKind>,
    },
    /// Import the document directory into a relational backend
    Import {
        #[arg(value_parser = parse_backend)]
        target: Option<BackendKind>,
    },
    /// Back up document files, the SQLite database and the state file
    Backup {
        /// Verify an existing backup directory instead of creating one
        #[arg(long, value_name = "DIR", conflicts_with = "list")]
        verify: Option<PathBuf>,
        /// List existing backups, newest first
        #[arg(long)]
        list: bool,
    },
    /// Migrate to another backend and make it the active one
    Switch {
        #[arg(value_parser = parse_backend)]
        target: BackendKind,
    },
}

fn parse_backend(s: &str) -> std::result::Result<BackendKind, String> {
    s.parse::<BackendKind>().map_err(|e| e.to_string())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load_or_default(&cli.config)
        .await
        .with_context(|| format!("loading {}", cli.config))?;
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }
    if let Some(path) = cli.sqlite_path {
        config.storage.sqlite_path = Some(path);
    }
    if let Some(url) = cli.database_url {
        config.storage.database_url = Some(url);
    }
    init_logging(&config, cli.verbose);

    let active = config.resolve_active(cli.backend)?;
    info!("mudmigrate v{} (active backend: {})", env!("CARGO_PKG_VERSION"), active);
    let migrator = Migrator::new(config, active, cli.dry_run);

    match cli.command {
        Commands::Status => {
            println!("{}", migrator.status().await);
        }
        Commands::Export { source } => {
            println!("{}", migrator.export(source).await?);
        }
        Commands::Import { target } => {
            println!("{}", migrator.import(target).await?);
        }
        Commands::Backup { list: true, .. } => {
            let backups = migrator.list_backups()?;
            if backups.is_empty() {
                println!("No backups in {}", migrator.config().backup_dir().display());
            }
            for dir in backups {
                println!("{}", dir.display());
            }
        }
        Commands::Backup { verify: Some(dir), .. } => {
            let report = migrator.verify_backup(&dir)?;
            println!("{report}");
            if !report.is_ok() {
                anyhow::bail!("backup {} failed verification", dir.display());
            }
        }
        Commands::Backup { verify: None, .. } => {
            let metadata = migrator.backup()?;
            println!("{}", BackupSummary(&metadata));
        }
        Commands::Switch { target } => {
            if target != migrator.active()
                && !cli.force
                && !migrator.is_dry_run()
                && !confirm(&migrator, target)?
            {
                println!("Switch cancelled.");
                return Ok(());
            }
            println!("{}", migrator.switch(target).await?);
        }
    }
    Ok(())
}

fn confirm(migrator: &Migrator, target: BackendKind) -> Result<bool> {
    print!(
        "Switch active backend from {} to {}? The game server must be stopped. [y/N] ",
        migrator.active(),
        target
    );
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

fn init_logging(config: &Config, verbosity: u8) {
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match verbosity {
        0 => config
            .logging
            .level
            .parse::<log::LevelFilter>()
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    // sqlx logs every statement at info
    builder.filter_module("sqlx", log::LevelFilter::Warn);

    let file = config.logging.file.as_ref().and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });
    if let Some(f) = file {
        let mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Echo to the console only when attached to a terminal
        let is_tty = atty::is(atty::Stream::Stderr);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
