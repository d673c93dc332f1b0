//! postline-publish - Publish a stored draft immediately

use clap::Parser;
use libpostline::{Config, Database, Dispatcher, Result};

#[derive(Parser, Debug)]
#[command(name = "postline-publish")]
#[command(version)]
#[command(about = "Publish a stored draft immediately", long_about = "\
postline-publish - Publish a stored draft immediately

DESCRIPTION:
    Runs the full publish pipeline for one draft: claim, account
    resolution, platform dispatch with bounded retry, and the audit log
    write. The draft must belong to the given user.

EXIT CODES:
    0 - Published
    1 - Publish failed (retries exhausted or runtime error)
    2 - No usable account / authentication problem
    3 - Invalid input
    4 - Draft not found
")]
struct Cli {
    /// Draft to publish
    draft_id: String,

    /// Owning user id
    #[arg(short, long)]
    user: i64,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    libpostline::logging::init_from_env(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;
    let dispatcher = Dispatcher::from_config(db, &config)?;

    let outcome = dispatcher.publish(cli.user, &cli.draft_id).await?;

    match cli.format.as_str() {
        "json" => {
            let value = serde_json::json!({
                "draft_id": cli.draft_id,
                "success": outcome.success,
                "external_id": outcome.external_id,
                "canonical_url": outcome.canonical_url,
                "message": outcome.message,
            });
            println!("{}", value);
        }
        _ => {
            println!("{}", outcome.message);
            if let Some(url) = &outcome.canonical_url {
                println!("{}", url);
            }
        }
    }

    Ok(())
}
