//! bookshelf CLI: serve the API, inspect settings, query the catalog.

use anyhow::Context;
use clap::{Parser, Subcommand};

use bookshelf_app::modules::books::catalog::{self, OpenLibraryClient};
use bookshelf_app::query::{ListParams, RawListParams};
use bookshelf_kernel::settings::Settings;

#[derive(Parser)]
#[command(name = "bookshelf", version, about = "Book shop and personal library service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server until ctrl-c.
    Serve,

    /// Print the effective settings as JSON.
    Settings,

    /// Search the catalog and print one page of cards.
    Search {
        /// Search term, at least three characters.
        term: String,

        #[arg(long, default_value = "1")]
        page: usize,

        #[arg(long, default_value = "10")]
        limit: usize,

        /// `asc` or `desc` by title.
        #[arg(long, default_value = "asc")]
        sort: String,

        #[arg(long)]
        category: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load().context("failed to load bookshelf settings")?;
    bookshelf_telemetry::init(&settings.telemetry);

    match cli.command {
        Commands::Serve => bookshelf_app::run(settings).await,
        Commands::Settings => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
        Commands::Search {
            term,
            page,
            limit,
            sort,
            category,
        } => {
            let params = ListParams::from_raw(RawListParams {
                q: Some(term),
                page: Some(page.to_string()),
                limit: Some(limit.to_string()),
                sort: Some(sort),
                category,
                ..RawListParams::default()
            })?;
            let client = OpenLibraryClient::new(&settings.catalog)?;
            let results = catalog::search_page(&client, &params).await?;

            if let Some(message) = &results.message {
                eprintln!("{message}");
            }
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }
    }
}
