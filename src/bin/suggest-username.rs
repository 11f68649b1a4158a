use clap::Parser;
use canvas_accounts::{Registry, config};
use std::sync::Arc;

// cargo run --bin suggest-username -- "Ada Lovelace"
// cargo run --bin suggest-username -- --database-url memory "Ada Lovelace"

#[derive(Debug, Parser)]
#[command(name = "suggest-username", version, about = "Show the username a display name would be given at signup")]
struct Args {
    /// Display name as it would be entered on the signup form
    name: String,

    /// Override database URL (if omitted, use env/config)
    #[arg(long)]
    database_url: Option<String>,

    /// Give up after this many taken candidates
    #[arg(long)]
    max_probes: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut cfg = config::Config::from_env()?;
    if let Some(url) = args.database_url {
        cfg.database_url = url;
    }
    if args.max_probes.is_some() {
        cfg.username_max_probes = args.max_probes;
    }

    let registry = Registry::connect(Arc::new(cfg)).await?;
    let username = registry.services.account.suggest_username(&args.name).await?;

    println!("base:      {}", canvas_accounts::normalize(&args.name));
    println!("available: {}", username);

    Ok(())
}
