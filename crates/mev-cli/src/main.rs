use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use indicatif::{ProgressBar, ProgressStyle};
use mev_analysis::pnl::{PnlContext, DEFAULT_CONCURRENCY};
use mev_analysis::report::{ArbitrageRecord, SandwichRecord, SpamRecord};
use mev_analysis::{emit_block, handle_block, EmitStats, EventSink, JsonLinesSink, MevEvent};
use mev_data::prices::LLAMA_BASE_URL;
use mev_data::{ChainConstants, LlamaPriceOracle, PriceOracle, RichBlock, StaticPriceOracle};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct AppContext {
    price_api: String,
}

#[derive(Parser, Debug)]
#[command(name = "mev-classify")]
#[command(about = "Classify arbitrage, sandwich and spam activity in EVM blocks")]
#[command(version)]
struct Cli {
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify MEV in one or more block files.
    Classify(ClassifyArgs),
    /// List the built-in chain presets.
    Chains,
}

/// Arguments for the `classify` subcommand.
///
/// Block files are JSON documents holding the transactions, value-transfer
/// traces and receipts of one block.
#[derive(Args, Debug)]
struct ClassifyArgs {
    /// Block file(s) to classify.
    #[arg(long = "block", required = true, num_args = 1..)]
    blocks: Vec<PathBuf>,

    /// Chain preset name or id.
    #[arg(long, default_value = "ethereum")]
    chain: String,

    /// JSON chain configuration; overrides `--chain`.
    #[arg(long)]
    chain_config: Option<PathBuf>,

    /// JSON price table (token address -> {price, decimals}).
    #[arg(long, conflicts_with = "live_prices")]
    prices: Option<PathBuf>,

    /// Fetch historical prices over HTTP (base URL from MEV_PRICE_API).
    #[arg(long)]
    live_prices: bool,

    /// Maximum concurrent price lookups.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Output format: table (default) or json.
    #[arg(long, default_value = "table")]
    output: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet)?;

    let ctx = AppContext {
        price_api: std::env::var("MEV_PRICE_API").unwrap_or_else(|_| LLAMA_BASE_URL.to_string()),
    };

    match cli.command {
        Commands::Classify(args) => handle_classify(&ctx, args).await,
        Commands::Chains => handle_chains(),
    }
}

fn init_tracing(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        Level::WARN
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.as_str()))
        .wrap_err("failed to initialize tracing filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

fn resolve_chain(args: &ClassifyArgs) -> Result<ChainConstants> {
    match &args.chain_config {
        Some(path) => ChainConstants::load(path),
        None => ChainConstants::preset(&args.chain).ok_or_else(|| {
            eyre!(
                "unknown chain '{}'; run `mev-classify chains` for the list",
                args.chain
            )
        }),
    }
}

fn resolve_oracle(ctx: &AppContext, args: &ClassifyArgs) -> Result<Box<dyn PriceOracle>> {
    if args.live_prices {
        let oracle = LlamaPriceOracle::new(&ctx.price_api)
            .wrap_err("failed to build HTTP price oracle")?;
        return Ok(Box::new(oracle));
    }
    match &args.prices {
        Some(path) => {
            let table = StaticPriceOracle::load(path)?;
            info!(tokens = table.len(), "loaded static price table");
            Ok(Box::new(table))
        }
        None => {
            warn!("no price source given; every arbitrage and sandwich will be suppressed");
            Ok(Box::new(StaticPriceOracle::new()))
        }
    }
}

async fn handle_classify(ctx: &AppContext, args: ClassifyArgs) -> Result<()> {
    if args.output != "table" && args.output != "json" {
        return Err(eyre!(
            "invalid output format '{}': expected table or json",
            args.output
        ));
    }

    let chain = resolve_chain(&args)?;
    let oracle = resolve_oracle(ctx, &args)?;
    let blocks = RichBlock::load_many(args.blocks.as_slice()).wrap_err("failed to load block files")?;

    let pb = if blocks.len() > 1 {
        let pb = ProgressBar::new(blocks.len() as u64);
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} blocks")
                .wrap_err("failed to create progress style")?
                .progress_chars("#>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut events: Vec<MevEvent> = Vec::new();
    let mut totals = EmitStats::default();
    let mut txs_scanned: usize = 0;

    for block in &blocks {
        txs_scanned += block.transactions.len();
        let result = handle_block(block, &chain);
        let pnl_ctx = PnlContext::for_block(&chain, block, args.concurrency);
        let stats = emit_block(
            block.number,
            &result,
            &pnl_ctx,
            &chain,
            oracle.as_ref(),
            &mut events,
        )
        .await
        .wrap_err_with(|| format!("failed to emit results of block {}", block.number))?;

        totals.arbitrages += stats.arbitrages;
        totals.sandwiches += stats.sandwiches;
        totals.spam += stats.spam;
        totals.suppressed += stats.suppressed;
        pb.inc(1);
    }

    pb.finish_and_clear();

    match args.output.as_str() {
        "json" => {
            let mut sink = JsonLinesSink::new(std::io::stdout().lock());
            for event in events {
                sink.emit(event)?;
            }
        }
        _ => print_tables(&events, &chain, blocks.len(), txs_scanned, &totals),
    }

    info!(
        blocks = blocks.len(),
        txs_scanned,
        arbitrages = totals.arbitrages,
        sandwiches = totals.sandwiches,
        spam = totals.spam,
        suppressed = totals.suppressed,
        "classify command completed"
    );

    Ok(())
}

fn print_tables(
    events: &[MevEvent],
    chain: &ChainConstants,
    block_count: usize,
    txs_scanned: usize,
    totals: &EmitStats,
) {
    let arbs: Vec<&ArbitrageRecord> = events
        .iter()
        .filter_map(|e| match e {
            MevEvent::Arbitrage(r) => Some(r),
            _ => None,
        })
        .collect();
    let sandwiches: Vec<&SandwichRecord> = events
        .iter()
        .filter_map(|e| match e {
            MevEvent::Sandwich(r) => Some(r),
            _ => None,
        })
        .collect();
    let spam: Vec<&SpamRecord> = events
        .iter()
        .filter_map(|e| match e {
            MevEvent::Spam(r) => Some(r),
            _ => None,
        })
        .collect();

    if !arbs.is_empty() {
        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(vec![
            "Block", "Index", "Contract", "Traders", "Revenue $", "Cost $", "Profit $", "Builder",
            "Link",
        ]);
        for r in &arbs {
            table.add_row(vec![
                r.block_number.to_string(),
                r.index.to_string(),
                truncate_hash(&format!("{:#x}", r.mev_contract)),
                r.traders.len().to_string(),
                format!("{:.2}", r.revenue),
                format!("{:.2}", r.cost),
                format!("{:.2}", r.profit),
                r.paid_builder
                    .map(|a| truncate_hash(&format!("{a:#x}")))
                    .unwrap_or_default(),
                r.link.clone(),
            ]);
        }
        println!("\nArbitrage\n{table}");
    }

    if !sandwiches.is_empty() {
        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(vec![
            "Block", "Front", "Back", "Contract", "Revenue $", "Cost $", "Profit $", "Link",
        ]);
        for r in &sandwiches {
            table.add_row(vec![
                r.block_number.to_string(),
                r.front_index.to_string(),
                r.index.to_string(),
                truncate_hash(&format!("{:#x}", r.mev_contract)),
                format!("{:.2}", r.revenue),
                format!("{:.2}", r.cost),
                format!("{:.2}", r.profit),
                r.link.clone(),
            ]);
        }
        println!("\nSandwich\n{table}");
    }

    if !spam.is_empty() {
        let mut table = Table::new();
        table.load_preset(UTF8_BORDERS_ONLY);
        table.set_header(vec![
            "Block", "Contract", "Gas (gwei)", "Count", "Index range", "Distinct input",
        ]);
        for r in &spam {
            table.add_row(vec![
                r.block_number.to_string(),
                truncate_hash(&format!("{:#x}", r.mev_contract)),
                format!("{}", r.gas),
                r.count.to_string(),
                format!("{}..={}", r.min_index, r.max_index),
                r.distinct_input.to_string(),
            ]);
        }
        println!("\nSpam\n{table}");
    }

    let mut summary = Table::new();
    summary.load_preset(UTF8_BORDERS_ONLY);
    summary.set_header(vec!["Metric", "Value"]);
    summary.add_row(vec!["Chain".to_string(), chain.name.clone()]);
    summary.add_row(vec!["Blocks scanned".to_string(), block_count.to_string()]);
    summary.add_row(vec!["Transactions analyzed".to_string(), txs_scanned.to_string()]);
    summary.add_row(vec!["Arbitrage txs".to_string(), totals.arbitrages.to_string()]);
    summary.add_row(vec!["Sandwiches".to_string(), totals.sandwiches.to_string()]);
    summary.add_row(vec!["Spam groups".to_string(), totals.spam.to_string()]);
    summary.add_row(vec![
        "Suppressed (no priced revenue)".to_string(),
        totals.suppressed.to_string(),
    ]);
    println!("\n{summary}\n");
}

fn handle_chains() -> Result<()> {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec![
        "Name", "Chain id", "Wrapped native", "Blacklist", "Watched", "Explorer",
    ]);
    for chain in ChainConstants::presets() {
        table.add_row(vec![
            chain.name.clone(),
            chain.chain_id.to_string(),
            format!("{:#x}", chain.native_wrapped),
            chain.blacklist.len().to_string(),
            chain.watch_spam.len().to_string(),
            chain.explorer_link.clone(),
        ]);
    }
    println!("{table}");
    Ok(())
}

/// Truncate a hex hash/address for compact table display.
fn truncate_hash(hash: &str) -> String {
    if hash.len() > 14 {
        format!("{}…{}", &hash[..8], &hash[hash.len() - 4..])
    } else {
        hash.to_string()
    }
}
