use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use trapbot::api::{DeltaClient, ReplaySource};
use trapbot::execution::{
    BotState, CandleFeed, CycleReport, Executor, IntervalScheduler, ManualScheduler,
    PaperOrderSink, Runner,
};
use trapbot::persistence::SignalArchive;
use trapbot::strategy::ReversalStrategy;
use trapbot::Settings;

#[derive(Parser, Debug)]
#[command(name = "trapbot", about = "Fake-breakout and M/W reversal signal bot")]
struct Cli {
    /// Settings file (defaults to ./trapbot.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the exchange and paper-trade every interval
    Run,
    /// Run one cycle against live candles and print the signal table
    Scan,
    /// Feed a CSV of candles through the engine bar by bar
    Replay {
        #[arg(short, long)]
        file: PathBuf,
        /// Bars revealed before the first cycle (defaults to candle_limit)
        #[arg(long)]
        warmup: Option<usize>,
        /// Write processed bars to the daily signal archive
        #[arg(long)]
        archive: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    setup_logging();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;

    tracing::info!(
        symbol = %settings.symbol,
        product_id = settings.product_id,
        resolution = %settings.resolution,
        balance = settings.balance,
        risk_fraction = settings.risk_fraction,
        "trapbot starting"
    );

    match cli.command {
        Command::Run => run_live(&settings).await,
        Command::Scan => scan(&settings).await,
        Command::Replay {
            file,
            warmup,
            archive,
        } => replay(&settings, file, warmup, archive).await,
    }
}

fn setup_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trapbot=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn executor(settings: &Settings) -> Executor<ReversalStrategy, PaperOrderSink> {
    Executor::new(
        settings.symbol.clone(),
        ReversalStrategy::new(settings.reversal_config()),
        settings.position_manager(),
        PaperOrderSink::new(),
    )
}

async fn run_live(settings: &Settings) -> anyhow::Result<()> {
    let feed = CandleFeed::new(
        DeltaClient::new(settings.base_url.clone()),
        settings.symbol.clone(),
        settings.resolution.clone(),
        settings.candle_limit,
    );
    let mut runner = Runner::new(feed, executor(settings), settings.balance)
        .with_archive(SignalArchive::new(&settings.signals_dir));
    let mut scheduler = IntervalScheduler::new(settings.poll_interval());

    tracing::info!(
        interval_secs = settings.poll_interval_secs,
        signals_dir = %settings.signals_dir,
        "Polling started, press Ctrl+C to stop"
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        summary = runner.run(&mut scheduler) => {
            tracing::warn!(?summary, "Scheduler stopped");
        }
    }

    let position = &runner.state().position;
    tracing::info!(side = ?position.side, size = position.size, "trapbot stopped");
    Ok(())
}

async fn scan(settings: &Settings) -> anyhow::Result<()> {
    let mut feed = CandleFeed::new(
        DeltaClient::new(settings.base_url.clone()),
        settings.symbol.clone(),
        settings.resolution.clone(),
        settings.candle_limit,
    );
    let snapshot = feed.refresh().await.context("failed to fetch candles")?;

    let (state, report) = executor(settings)
        .run_cycle(
            BotState::default(),
            &snapshot.candles,
            snapshot.current_price,
            settings.balance,
            Utc::now(),
        )
        .await;

    print_report(&report);
    println!("Position: {:?}", state.position);
    Ok(())
}

async fn replay(
    settings: &Settings,
    file: PathBuf,
    warmup: Option<usize>,
    archive: bool,
) -> anyhow::Result<()> {
    let source = ReplaySource::from_csv(&file, warmup.unwrap_or(settings.candle_limit))
        .with_context(|| format!("failed to load {}", file.display()))?;
    // Cycles run on the replayed bar times so archives land on the recorded dates
    let mut scheduler = ManualScheduler::new(source.cycle_times());

    let feed = CandleFeed::new(
        source,
        settings.symbol.clone(),
        settings.resolution.clone(),
        settings.candle_limit,
    );
    let mut runner = Runner::new(feed, executor(settings), settings.balance);
    if archive {
        runner = runner.with_archive(SignalArchive::new(&settings.signals_dir));
    }

    let summary = runner.run(&mut scheduler).await;

    let sink = runner.executor().sink();
    let fills = sink.fills();
    println!(
        "Replayed {} cycles ({} skipped): {} fills, {} errors",
        summary.cycles, summary.skipped, summary.fills, summary.errors
    );
    if fills.len() < sink.total_fills() {
        println!("  last {} of {} fills:", fills.len(), sink.total_fills());
    }
    for fill in &fills {
        println!(
            "  {} {} {:.6} {}",
            fill.accepted_at.format("%Y-%m-%d %H:%M:%S"),
            fill.side,
            fill.size,
            fill.order_id
        );
    }
    println!("Final position: {:?}", runner.state().position);
    Ok(())
}

fn print_report(report: &CycleReport) {
    println!(
        "support={:?} resistance={:?} bars={}",
        report.analysis.support,
        report.analysis.resistance,
        report.analysis.records.len()
    );
    println!(
        "{:>4}  {:<20} {:>12} {:>12} {:>12} {:>12}  signal",
        "bar", "timestamp", "open", "high", "low", "close"
    );
    for record in report.analysis.signals() {
        println!(
            "{:>4}  {:<20} {:>12.2} {:>12.2} {:>12.2} {:>12.2}  {}",
            record.bar,
            record.timestamp.format("%Y-%m-%d %H:%M"),
            record.open,
            record.high,
            record.low,
            record.close,
            record.signal
        );
    }
    for err in &report.errors {
        println!("error at bar {:?}: {}", err.bar, err.error);
    }
}
