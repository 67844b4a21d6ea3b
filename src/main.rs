//! Save Vault entry point
//!
//! Native: a small CLI over a directory-backed store.
//! Web: opens the LocalStorage-backed store on page load.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
mod wasm_app {
    use save_vault::platform::LocalStorage;
    use save_vault::{StateStore, StoreSettings, UpdateOp, schema};
    use serde_json::json;

    pub fn run() {
        console_error_panic_hook::set_once();
        console_log::init_with_level(log::Level::Info).expect("Failed to init logger");

        log::info!("Save Vault starting...");

        let settings = StoreSettings::load(&LocalStorage::new());
        let engine = match schema::engine(&settings) {
            Ok(engine) => engine,
            Err(e) => {
                log::error!("Migration registry is misconfigured: {}", e);
                return;
            }
        };

        match StateStore::open(LocalStorage::new(), engine, settings) {
            Ok(mut store) => {
                log::info!("State loaded ({:?})", store.outcome());
                if let Err(e) = store.update("stats.global.sessions", json!(1), UpdateOp::Increment) {
                    log::warn!("Could not count session: {}", e);
                }
            }
            Err(e) => log::error!("Saved data is from a newer version: {}", e),
        }
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn wasm_main() {
    wasm_app::run();
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}

#[cfg(not(target_arch = "wasm32"))]
mod cli {
    use std::path::PathBuf;

    use anyhow::{Context, Result, bail};
    use clap::{Parser, Subcommand};
    use save_vault::consts::DEFAULT_NATIVE_DIR;
    use save_vault::platform::FileStorage;
    use save_vault::{StateStore, StorageGateway, StoreSettings, UpdateOp, schema};
    use serde_json::Value;

    #[derive(Parser, Debug)]
    #[command(name = "save-vault")]
    #[command(version, about = "Versioned local state store", long_about = None)]
    pub struct Cli {
        /// Store directory
        #[arg(long, env = "SAVE_VAULT_DIR", default_value = DEFAULT_NATIVE_DIR, value_name = "DIR")]
        pub dir: PathBuf,

        #[command(subcommand)]
        pub command: Command,
    }

    #[derive(Subcommand, Debug, PartialEq)]
    pub enum Command {
        /// Print the current state
        Show,
        /// Preview the migrations the stored data needs
        Path,
        /// Print the value at a dot path
        Get { path: String },
        /// Store a JSON value at a dot path (bare words are stored as strings)
        Set { path: String, value: String },
        /// Add n to the number at a dot path
        Incr {
            path: String,
            #[arg(allow_negative_numbers = true)]
            n: String,
        },
        /// Raise the number at a dot path to at least n
        Max {
            path: String,
            #[arg(allow_negative_numbers = true)]
            n: String,
        },
        /// Replace the state with a JSON file (migrated first)
        Import { file: PathBuf },
        /// Print the state as JSON
        Export,
        /// Restore factory defaults
        Reset,
    }

    /// Parse a numeric operand for `incr`/`max`
    fn parse_number(n: &str) -> Result<Value> {
        let value: Value = serde_json::from_str(n).with_context(|| format!("not a number: {n}"))?;
        if !value.is_number() {
            bail!("not a number: {n}");
        }
        Ok(value)
    }

    pub fn run(cli: Cli) -> Result<()> {
        let storage = FileStorage::open(&cli.dir)
            .with_context(|| format!("Failed to open store directory {}", cli.dir.display()))?;
        let settings = StoreSettings::load(&storage);
        let engine = schema::engine(&settings).context("Migration registry is misconfigured")?;

        if cli.command == Command::Path {
            let raw = storage.read(&settings.data_key);
            let hops = engine
                .migration_path(raw.as_deref())
                .context("Stored data cannot be migrated")?;
            if hops.is_empty() {
                println!("up to date (version {})", engine.current_version());
            }
            for hop in hops {
                println!("v{} -> v{}: {}", hop.from, hop.to, hop.description);
            }
            return Ok(());
        }

        let mut store = StateStore::open(storage, engine, settings).context("Failed to open store")?;
        log::info!("Store opened ({:?})", store.outcome());

        match cli.command {
            Command::Show | Command::Export => {
                println!("{}", store.export_json().context("Failed to serialize state")?);
            }
            Command::Get { path } => {
                println!("{}", store.get(&path, Value::Null));
            }
            Command::Set { path, value } => {
                let value: Value =
                    serde_json::from_str(&value).unwrap_or(Value::String(value));
                store
                    .set(&path, value)
                    .with_context(|| format!("Failed to set {path}"))?;
            }
            Command::Incr { path, n } => {
                let value = store
                    .update(&path, parse_number(&n)?, UpdateOp::Increment)
                    .with_context(|| format!("Failed to increment {path}"))?;
                println!("{value}");
            }
            Command::Max { path, n } => {
                let value = store
                    .update(&path, parse_number(&n)?, UpdateOp::Max)
                    .with_context(|| format!("Failed to raise {path}"))?;
                println!("{value}");
            }
            Command::Import { file } => {
                let json = std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let outcome = store.import_json(&json).context("Import rejected")?;
                println!("{outcome:?}");
            }
            Command::Reset => {
                if !store.reset() {
                    bail!("Failed to write defaults");
                }
            }
            Command::Path => unreachable!("handled before opening the store"),
        }

        if !store.settings().autosave {
            store.save();
        }
        Ok(())
    }

    pub fn main() -> Result<()> {
        env_logger::init();
        run(Cli::parse())
    }

}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    cli::main()
}
