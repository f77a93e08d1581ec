//! Fresh Subversion checkout tool.
//!
//! Wipes each location's local directory, checks it out again and reports
//! the `svn:externals` found in the fresh working copy as JSON.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use updater::checkout::CheckoutTask;
use updater::core::types::{CheckoutLocation, Depth, External, Revision};
use updater::exit_codes;
use updater::io::client::CancelToken;
use updater::io::config::{DEFAULT_CONFIG_FILE, UpdaterConfig, load_config, write_config};
use updater::io::revision::UrlRevisionResolver;
use updater::io::sink::WriterSink;
use updater::io::svn::SvnCommandClient;
use updater::logging;

#[derive(Parser)]
#[command(
    name = "updater",
    version,
    about = "Fresh Subversion checkouts with externals discovery"
)]
struct Cli {
    /// Config file (missing file means defaults).
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check out a single remote location.
    Checkout {
        /// Repository URL, optionally pinned with `@REV`.
        remote: String,
        /// Directory below the workspace (defaults to the last URL segment).
        #[arg(long)]
        local: Option<String>,
        #[arg(long, default_value = "infinity")]
        depth: Depth,
        #[arg(long)]
        ignore_externals: bool,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Check out every location listed in the config file.
    Run {
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(clap::Args)]
struct CommonArgs {
    /// Workspace root (overrides the config file).
    #[arg(long)]
    workspace: Option<PathBuf>,
    /// Revision for locations without an `@REV` pin (`HEAD`, a number or `{DATE}`).
    #[arg(long)]
    at: Option<Revision>,
    /// Write discovered externals as JSON here instead of stdout.
    #[arg(long)]
    externals_out: Option<PathBuf>,
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::FAILED);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Checkout {
            remote,
            local,
            depth,
            ignore_externals,
            common,
        } => {
            let cfg = load_config(&cli.config)?;
            let mut location = CheckoutLocation::new(remote)
                .with_depth(depth)
                .with_ignore_externals(ignore_externals);
            if let Some(local) = local {
                location = location.with_local(local);
            }
            location.validate()?;
            cmd_checkout(&cfg, vec![location], &common)
        }
        Command::Run { common } => {
            let cfg = load_config(&cli.config)?;
            if cfg.locations.is_empty() {
                anyhow::bail!("no locations configured in {}", cli.config.display());
            }
            let locations = cfg.locations.clone();
            cmd_checkout(&cfg, locations, &common)
        }
        Command::Init { force } => cmd_init(&cli.config, force),
    }
}

fn cmd_checkout(
    cfg: &UpdaterConfig,
    locations: Vec<CheckoutLocation>,
    common: &CommonArgs,
) -> Result<i32> {
    let workspace = common
        .workspace
        .clone()
        .unwrap_or_else(|| cfg.workspace.clone());
    let client = SvnCommandClient::new(cfg.svn.clone());
    let resolver = match &common.at {
        Some(revision) => UrlRevisionResolver::with_fallback(revision.clone()),
        None => UrlRevisionResolver::new(),
    };
    let cancel = CancelToken::new();
    cancel
        .cancel_on_termination(exit_codes::CANCELLED)
        .context("install termination handler")?;
    let mut sink = WriterSink::new(io::stdout());

    let mut externals: Vec<External> = Vec::new();
    let mut code = exit_codes::OK;
    for location in locations {
        let task = CheckoutTask::new(&workspace, location).with_cancel_token(cancel.clone());
        match task.perform(&client, &resolver, &mut sink) {
            Ok(Some(found)) => externals.extend(found),
            Ok(None) => {
                info!(remote = %task.location().remote, "authentication failed, continuing");
                code = exit_codes::AUTH_FAILED;
            }
            Err(err) => {
                error!(err = %err, "checkout failed");
                code = if err.is_interrupted() {
                    exit_codes::CANCELLED
                } else {
                    exit_codes::FAILED
                };
                eprintln!("{:#}", anyhow::Error::from(err));
                break;
            }
        }
    }

    write_externals(common.externals_out.as_deref(), &externals)?;
    Ok(code)
}

fn write_externals(path: Option<&Path>, externals: &[External]) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(externals).context("serialize externals")?;
    payload.push('\n');
    match path {
        Some(path) => {
            fs::write(path, payload).with_context(|| format!("write {}", path.display()))
        }
        None => {
            print!("{payload}");
            Ok(())
        }
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &UpdaterConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}
