//! CLI binary for procura.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use procura::{ProcuraConfig, Warmup, build_service, init_tracing};
use procura_search::{GroupedResults, QueryContext, ResultFilter, SortOrder};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Procura: search supplier catalogues at once.
#[derive(Parser)]
#[command(name = "procura", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, default_value = "procura.toml")]
    config: PathBuf,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Search every catalogue for a query.
    Search {
        /// Query words.
        #[arg(required = true)]
        query: Vec<String>,

        #[command(flatten)]
        view: ViewArgs,
    },

    /// Search, then retry catalogues that came back empty with the longer
    /// update budget.
    Update {
        /// Query words.
        #[arg(required = true)]
        query: Vec<String>,

        #[command(flatten)]
        view: ViewArgs,
    },

    /// Read queries from stdin, one per line, keeping refinement history.
    Interactive {
        #[command(flatten)]
        view: ViewArgs,
    },

    /// Refresh the configured warm-up queries.
    Warmup {
        /// Run one round and exit.
        #[arg(long)]
        once: bool,
    },
}

#[derive(Args, Clone)]
struct ViewArgs {
    /// Only listings that are in stock.
    #[arg(long)]
    available_only: bool,

    /// Lowest price to show.
    #[arg(long)]
    min_price: Option<f64>,

    /// Highest price to show.
    #[arg(long)]
    max_price: Option<f64>,

    /// Listing order within each catalogue.
    #[arg(long, value_enum, default_value_t = SortArg::Relevance)]
    sort: SortArg,

    /// Print JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Relevance,
    PriceAsc,
    PriceDesc,
}

impl ViewArgs {
    fn filter(&self) -> ResultFilter {
        ResultFilter {
            available_only: self.available_only,
            min_price: self.min_price,
            max_price: self.max_price,
            sort: match self.sort {
                SortArg::Relevance => SortOrder::Relevance,
                SortArg::PriceAsc => SortOrder::PriceAsc,
                SortArg::PriceDesc => SortOrder::PriceDesc,
            },
        }
    }

    fn print(&self, results: &GroupedResults) -> anyhow::Result<()> {
        let filter = self.filter();
        let shown = if filter.is_noop() {
            results.clone()
        } else {
            filter.apply(results)
        };
        if self.json {
            println!("{}", serde_json::to_string_pretty(&shown)?);
            return Ok(());
        }
        for (source, group) in shown.iter() {
            println!("== {source} ({})", group.count);
            for product in &group.products {
                let price = if product.price_display.is_empty() {
                    "-"
                } else {
                    product.price_display.as_str()
                };
                println!(
                    "  {:>6.1}  {}  [{price}]  {}",
                    product.similarity, product.name, product.link
                );
            }
        }
        println!("{} listings", shown.total());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ProcuraConfig::from_file(&cli.config)?;
    let _logging = init_tracing(&config.logging)?;

    let service = Arc::new(build_service(&config).await?);

    let outcome = match cli.command {
        Command::Search { query, view } => {
            let cancel = cancel_on_ctrl_c();
            let mut ctx = QueryContext::new();
            let results = service
                .search_with_cancel(&query.join(" "), &mut ctx, cancel)
                .await?;
            view.print(&results)
        }
        Command::Update { query, view } => {
            let text = query.join(" ");
            service.search(&text, &mut QueryContext::new()).await?;
            let results = service.search_update(&text).await?;
            view.print(&results)
        }
        Command::Interactive { view } => run_interactive(&service, &view).await,
        Command::Warmup { once } => {
            let warmup = Warmup::new(Arc::clone(&service), &config.warmup);
            if once || !config.warmup.enabled {
                warmup.run_round().await;
            } else {
                warmup.run(cancel_on_ctrl_c()).await;
            }
            Ok(())
        }
    };

    service.shutdown().await;
    outcome
}

async fn run_interactive(
    service: &procura_search::SearchService<procura_search::HttpSessionBackend>,
    view: &ViewArgs,
) -> anyhow::Result<()> {
    let mut ctx = QueryContext::new();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    // Stdin is blocking; read it on its own thread.
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    while let Some(line) = rx.recv().await {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        match service.search(text, &mut ctx).await {
            Ok(results) => view.print(&results)?,
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, cancelling");
            trigger.cancel();
        }
    });
    cancel
}
