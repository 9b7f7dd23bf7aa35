use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use indicatif::{ProgressBar, ProgressStyle};
use profiler_data::units::format_ether;
use profiler_data::{AlloyGateway, CancelFlag, ProfilerConfig, RunSummary, TraceMode, TxType};
use profiler_export::{
    load_per_block_csv, load_summary_json, scenario_specs, scenarios_yaml, summarize_rows,
    write_artifacts, ScenarioDefaults,
};
use profiler_scan::Scanner;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct AppContext {
    rpc_url: Option<String>,
    quiet: bool,
}

#[derive(Parser, Debug)]
#[command(name = "block-profiler")]
#[command(about = "Profiles the transaction mix of an EVM block range")]
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
    /// Scan a block range over JSON-RPC and write every artifact.
    Scan(ScanArgs),
    /// Re-derive a summary and Spamoor scenarios from exported files.
    Load(LoadArgs),
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// JSON-RPC endpoint; falls back to PROFILER_RPC_URL.
    #[arg(long)]
    rpc_url: Option<String>,

    #[arg(long)]
    start_block: u64,

    /// Last block, inclusive.
    #[arg(long)]
    end_block: u64,

    #[arg(long, default_value_t = 50)]
    page_size: u64,

    #[arg(long, default_value_t = 8)]
    concurrency: usize,

    /// Classify without eth_getCode lookups.
    #[arg(long)]
    skip_contract_check: bool,

    /// Find token activity with eth_getLogs first and fetch receipts only for those txs.
    #[arg(long)]
    dual_pass: bool,

    #[arg(long, default_value_t = 10)]
    log_step: u64,

    #[arg(long)]
    tx_cap: Option<u64>,

    /// Per-call RPC timeout in seconds.
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// none, erigon or geth.
    #[arg(long, default_value = "none")]
    trace: String,

    /// Skip symbol/name/decimals lookups.
    #[arg(long)]
    no_resolve: bool,

    #[arg(long, default_value = "out")]
    out_dir: PathBuf,
}

#[derive(Args, Debug)]
struct LoadArgs {
    /// A per_block.csv from an earlier run.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// A summary.json from an earlier run.
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Write artifacts here; scenarios go to stdout otherwise.
    #[arg(long)]
    out_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet)?;

    let ctx = AppContext {
        rpc_url: std::env::var("PROFILER_RPC_URL").ok(),
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Scan(args) => handle_scan(&ctx, args).await,
        Commands::Load(args) => handle_load(args),
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

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

async fn handle_scan(ctx: &AppContext, args: ScanArgs) -> Result<()> {
    let rpc_url = args
        .rpc_url
        .or_else(|| ctx.rpc_url.clone())
        .ok_or_else(|| eyre!("--rpc-url or PROFILER_RPC_URL is required for scan"))?;
    let trace_mode: TraceMode = args.trace.parse().wrap_err("invalid --trace value")?;

    let config = ProfilerConfig {
        rpc_url,
        start_block: args.start_block,
        end_block: args.end_block,
        page_size: args.page_size,
        concurrency: args.concurrency,
        skip_contract_check: args.skip_contract_check,
        dual_pass: args.dual_pass,
        log_step: args.log_step,
        tx_cap: args.tx_cap,
        rpc_timeout_secs: args.timeout,
        trace_mode,
        resolve_tokens: !args.no_resolve,
    };
    config.validate().wrap_err("invalid scan configuration")?;

    let gateway = AlloyGateway::connect(&config.rpc_url, config.rpc_timeout())
        .await
        .wrap_err("failed to connect to RPC endpoint")?;

    let cancel = CancelFlag::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && on_signal.cancel() {
            warn!("interrupt received, finishing in-flight work");
        }
    });

    let progress = if ctx.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(config.block_count());
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} blocks ({eta})",
            )
            .wrap_err("failed to create progress style")?
            .progress_chars("=>-"),
        );
        pb
    };

    let out_dir = args.out_dir;
    let scanner = Scanner::new(Arc::new(gateway), config, cancel)
        .wrap_err("invalid scan configuration")?
        .with_progress(progress);
    let report = scanner.run().await;

    let paths = write_artifacts(
        &out_dir,
        &report.summary,
        &report.rows,
        &report.tokens,
        &ScenarioDefaults::default(),
    )
    .wrap_err("failed to write artifacts")?;

    print_totals(&report.summary);
    info!(
        out_dir = %out_dir.display(),
        scenarios = paths.scenario_files.len(),
        tokens = report.tokens.len(),
        partial = report.summary.partial,
        cancelled = report.summary.cancelled,
        "scan command finished"
    );

    Ok(())
}

fn handle_load(args: LoadArgs) -> Result<()> {
    if args.csv.is_none() && args.summary.is_none() {
        return Err(eyre!("at least one of --csv or --summary is required"));
    }

    let rows = match &args.csv {
        Some(path) => {
            let file = File::open(path)
                .wrap_err_with(|| format!("failed to open {}", path.display()))?;
            load_per_block_csv(file)
                .wrap_err_with(|| format!("failed to load {}", path.display()))?
        }
        None => Vec::new(),
    };

    let summary = match &args.summary {
        Some(path) => {
            let file = File::open(path)
                .wrap_err_with(|| format!("failed to open {}", path.display()))?;
            let summary = load_summary_json(file)
                .wrap_err_with(|| format!("failed to load {}", path.display()))?;
            if !rows.is_empty() && !summary.consistent_with(&rows) {
                warn!("per-block rows and summary totals disagree; using summary totals");
            }
            summary
        }
        None => summarize_rows(&rows),
    };

    let defaults = ScenarioDefaults::default();
    print_totals(&summary);

    match args.out_dir {
        Some(dir) => {
            let paths = write_artifacts(&dir, &summary, &rows, &[], &defaults)
                .wrap_err("failed to write artifacts")?;
            info!(
                out_dir = %dir.display(),
                scenarios = paths.scenario_files.len(),
                "load command finished"
            );
        }
        None => {
            let specs = scenario_specs(&summary, &rows, &defaults);
            let yaml = scenarios_yaml(&specs).wrap_err("failed to serialize scenarios")?;
            println!("{yaml}");
        }
    }

    Ok(())
}

fn print_totals(summary: &RunSummary) {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec![
        "Type",
        "Count",
        "Gas Used",
        "Avg Gas Price (gwei)",
        "Value (ETH)",
    ]);

    for tx_type in TxType::ALL {
        let Some(stat) = summary.tx_types.get(&tx_type) else {
            continue;
        };
        table.add_row(vec![
            tx_type.to_string(),
            stat.count.to_string(),
            stat.gas_used_sum.to_string(),
            stat.avg_gas_price_gwei(),
            format_ether(stat.eth_value_wei_sum),
        ]);
    }

    println!("{}\n", table);
    println!(
        "Blocks {}..={} ({} blocks), {} txs",
        summary.start_block, summary.end_block, summary.block_count, summary.total_tx
    );
    println!(
        "Unique senders: {}, unique receivers: {}",
        summary.unique_senders, summary.unique_receivers
    );
    println!(
        "ETH transferred: {} (internal: {})",
        format_ether(summary.total_eth_wei),
        format_ether(summary.internal_value_wei)
    );
    if summary.partial {
        println!(
            "Partial result: {} failed units{}",
            summary.failures.len(),
            if summary.cancelled { ", cancelled" } else { "" }
        );
    }
}
