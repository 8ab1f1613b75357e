use romaneio_check::config::Config;
use romaneio_check::error::ExtractionFailure;
use romaneio_check::manifest::{CatalogEntry, ManifestParser, ProductGroup};
use romaneio_check::normalize::normalize_pages;
use romaneio_check::pdf_extract::load_manifest;
use romaneio_check::reconcile::Session;
use romaneio_check::result_store::{ResultSink, ResultStore};
use romaneio_check::scan::{ConferenceEnd, Control, StdinScanner, run_conference};
use std::env;
use std::error::Error;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage:
  romaneio_check parse <manifest.pdf|manifest.txt>
  romaneio_check check <manifest.pdf|manifest.txt>
  romaneio_check result
  romaneio_check catalog-add <code> <name...>";

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Parse(&'a str),
    Check(&'a str),
    Result,
    CatalogAdd { code: &'a str, name: String },
}

fn command(args: &[String]) -> Result<Command<'_>, &'static str> {
    let file = || args.get(1).map(String::as_str).ok_or(USAGE);
    match args.first().map(String::as_str) {
        Some("parse") => Ok(Command::Parse(file()?)),
        Some("check") => Ok(Command::Check(file()?)),
        Some("result") => Ok(Command::Result),
        Some("catalog-add") => Ok(Command::CatalogAdd {
            code: file()?,
            name: args[2..].join(" "),
        }),
        _ => Err(USAGE),
    }
}

fn config_path() -> PathBuf {
    env::var("ROMANEIO_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("romaneio.toml"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // init tracing; stdout is reserved for JSON output
    tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = command(&args)?;
    let cfg = Config::load_or_default(config_path())?;

    match command {
        Command::Parse(file) => {
            let groups = parse_file(&cfg, file).await?;
            for group in &groups {
                info!(
                    code = %group.product_code,
                    name = %group.product_name,
                    total_kg = ?group.total_weight_value(),
                    lots = group.lots.len(),
                    "Parsed product"
                );
            }
            println!("{}", serde_json::to_string_pretty(&groups)?);
        }
        Command::Check(file) => check(&cfg, file).await?,
        Command::Result => {
            let store = ResultStore::new(&cfg.db_path)?;
            match store.load(&cfg.result_key)? {
                Some(result) => {
                    if let Some(meta) = store.info(&cfg.result_key)? {
                        info!(key = %meta.key, saved_at = meta.saved_at, digest = %meta.digest, "Loaded stored result");
                    }
                    println!("{}", serde_json::to_string_pretty(&result)?);
                }
                None => println!("No result found"),
            }
        }
        Command::CatalogAdd { code, name } => {
            let entry = CatalogEntry {
                code: code.to_string(),
                name,
            };
            Config::add_catalog_entry(config_path(), &entry)?;
            info!(code = %entry.code, name = %entry.name, "Catalog entry added");
        }
    }

    Ok(())
}

/// Extract, normalize and parse a manifest on the blocking pool.
async fn parse_file(cfg: &Config, file: &str) -> Result<Vec<ProductGroup>, Box<dyn Error>> {
    let parser = ManifestParser::from_config(&cfg.parser);
    let path = PathBuf::from(file);

    let outcome = tokio::task::spawn_blocking(move || {
        let pages = load_manifest(&path)?;
        let normalized = normalize_pages(&pages);
        Ok::<_, ExtractionFailure>(parser.parse(&normalized.text))
    })
    .await?;

    Ok(outcome??)
}

async fn check(cfg: &Config, file: &str) -> Result<(), Box<dyn Error>> {
    let groups = parse_file(cfg, file).await?;
    let store = ResultStore::new(&cfg.db_path)?;
    let session = Session::start(groups);

    let (ctrl_tx, ctrl_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrl_tx.send(Control::Cancel).await;
        }
    });

    eprintln!("Scan lot codes, one per line. End of input finalizes, Ctrl-C cancels.");
    let mut scanner = StdinScanner::new();

    match run_conference(session, &mut scanner, ctrl_rx).await {
        ConferenceEnd::Finalized(result) => {
            for lot in result.pending_lots() {
                warn!(lot = %lot.lot_identifier, product = %lot.product_name, "Lot not scanned");
            }
            store.save(&cfg.result_key, &result)?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        ConferenceEnd::Cancelled => {
            info!("Conference cancelled, nothing saved");
            // a pending stdin read cannot be interrupted; don't wait for it
            std::process::exit(130);
        }
    }

    Ok(())
}
