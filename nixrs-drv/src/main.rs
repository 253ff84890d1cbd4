use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use nixrs_derivation::context::BadNixStringContextElem;
use nixrs_derivation::derivation::{HashModuloError, ParseDerivationError};
use nixrs_derivation::experimental::ExperimentalFeatureSettings;
use nixrs_derivation::store::{DirStore, StoreError};
use nixrs_derivation::store_path::{ParseStorePathError, StoreDir};
use thiserror::Error;
use tracing::{Level, error};
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

mod commands;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    HashModulo(#[from] HashModuloError),
    #[error(transparent)]
    Path(#[from] ParseStorePathError),
    #[error(transparent)]
    Context(#[from] BadNixStringContextElem),
    #[error("error parsing '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: ParseDerivationError,
    },
    #[error("cannot derive a derivation name from '{0}'; pass --name")]
    NoName(PathBuf),
    #[error("could not read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Parser)]
#[command(version, about = "Inspect and hash Nix derivations")]
pub struct App {
    /// Logical store directory that paths are printed and parsed with.
    #[arg(long, env = "NIX_STORE_DIR", default_value_t = StoreDir::default())]
    store_dir: StoreDir,
    /// Directory holding the store files. Defaults to the store directory.
    #[arg(long)]
    store_root: Option<PathBuf>,
    #[arg(long, short, env = "NIXRS_LOG", default_value_t = Level::INFO)]
    log_level: Level,
    #[arg(long, env = "NIX_EXPERIMENTAL_FEATURES", default_value = "")]
    experimental_features: ExperimentalFeatureSettings,
    /// Only compute paths, never write to the store.
    #[arg(long, global = true)]
    read_only: bool,
    /// Print results as JSON.
    #[arg(long)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

impl App {
    pub fn init_logger(&self) {
        let filter = tracing_subscriber::filter::Targets::new()
            .with_default(self.log_level)
            .with_target("tokio", Level::WARN);
        let layer = tracing_subscriber::fmt::layer()
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr);

        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .init();
    }

    pub fn store(&self) -> DirStore {
        let store = match &self.store_root {
            Some(root) => DirStore::with_root(self.store_dir.clone(), root),
            None => DirStore::new(self.store_dir.clone()),
        };
        store.read_only(self.read_only)
    }

    pub fn print<T: serde::Serialize>(&self, value: &T, text: String) -> Result<(), Error> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{text}");
        }
        Ok(())
    }
}

#[derive(Clone, Subcommand)]
enum Command {
    /// Print the hash modulo fixed-output derivations of stored derivations.
    HashModulo(commands::hash_modulo::Args),
    /// Parse a derivation file and add it to the store.
    Write(commands::write::Args),
    /// Print the outputs and inputs of a stored derivation.
    Show(commands::show::Args),
    /// Parse string context elements.
    Context(commands::context::Args),
    /// Print the placeholders for output names.
    Placeholder(commands::placeholder::Args),
}

#[tokio::main]
async fn main() -> ExitCode {
    let app = App::parse();
    app.init_logger();
    let res = match app.command.clone() {
        Command::HashModulo(args) => commands::hash_modulo::run_command(&app, args).await,
        Command::Write(args) => commands::write::run_command(&app, args).await,
        Command::Show(args) => commands::show::run_command(&app, args).await,
        Command::Context(args) => commands::context::run_command(&app, args),
        Command::Placeholder(args) => commands::placeholder::run_command(&app, args),
    };
    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
