//! export_alerts - dump stored alerts to a local JSON artifact

use anyhow::Result;
use clap::Parser;

use safewatch::{AlertStore, SqliteAlertStore};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the safewatch database.
    #[arg(long, default_value = "safewatch.db")]
    db_path: String,
    /// Maximum number of alerts to export, most recent first.
    #[arg(long, default_value_t = 100)]
    limit: usize,
    /// Output file path. Writes to stdout when omitted.
    #[arg(long)]
    output: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let store = SqliteAlertStore::open(&args.db_path)?;
    let alerts = store.query_recent(args.limit)?;
    let json = serde_json::to_vec_pretty(&alerts)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &json)?;
            println!("{} alerts written to {}", alerts.len(), path);
        }
        None => {
            println!("{}", String::from_utf8_lossy(&json));
        }
    }
    Ok(())
}
