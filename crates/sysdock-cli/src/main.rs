mod commands;
mod workspace;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use commands::hex_utils::parse_size;
use commands::{Switch, TargetArgs};
use workspace::Workspace;

#[derive(Parser)]
#[command(name = "sysdock")]
#[command(about = "Pattern-scanning patcher for running system services")]
#[command(version)]
struct Args {
    /// Directory holding config.toml and log.toml
    #[arg(long, global = true, env = "SYSDOCK_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// JSON catalog replacing the built-in patch groups
    #[arg(long, global = true, env = "SYSDOCK_CATALOG")]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Patch the running target processes
    Run {
        #[command(flatten)]
        target: TargetArgs,

        /// Scan buffer size in bytes (decimal or 0x hex)
        #[arg(long, value_parser = parse_size, default_value = "0x1000")]
        chunk_size: usize,

        /// procfs mount used to find processes (Linux)
        #[arg(long, default_value = "/proc")]
        proc_root: PathBuf,
    },
    /// Patch a dump of one group's code region and write the result to a file
    Image {
        /// Raw code dump
        file: PathBuf,

        /// Patch group to apply
        #[arg(short, long)]
        group: String,

        /// Load address of the dump (hex)
        #[arg(short, long, default_value = "0")]
        base: String,

        /// Output file (default: <file>.patched)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        target: TargetArgs,

        #[arg(long, value_parser = parse_size, default_value = "0x1000")]
        chunk_size: usize,
    },
    /// List patch groups and their templates
    Catalog {
        /// Print the catalog as JSON
        #[arg(long)]
        json: bool,

        /// Write the catalog to a JSON file
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Turn a feature of a patch group on or off
    Toggle {
        group: String,
        key: String,
        state: Switch,
    },
    /// Show run options, or set one
    Options {
        key: Option<String>,
        state: Option<Switch>,
    },
    /// Show the result log of the last run
    Log,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("sysdock=info".parse()?))
        .init();

    let args = Args::parse();
    let workspace = Workspace::new(args.config_dir, args.catalog)?;

    match args.command {
        Command::Run {
            target,
            chunk_size,
            proc_root,
        } => commands::run::run(&workspace, &target, chunk_size, &proc_root),
        Command::Image {
            file,
            group,
            base,
            output,
            target,
            chunk_size,
        } => commands::image::run(
            &workspace,
            &file,
            &group,
            &base,
            output.as_deref(),
            &target,
            chunk_size,
        ),
        Command::Catalog { json, export } => {
            commands::catalog::run(&workspace, json, export.as_deref())
        }
        Command::Toggle { group, key, state } => {
            commands::toggle::run(&workspace, &group, &key, state)
        }
        Command::Options { key, state } => {
            commands::options::run(&workspace, key.as_deref(), state)
        }
        Command::Log => commands::log::run(&workspace),
    }
}
