use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use sportsmatrix::{
    Board, Canvas, Config, ConsoleMatrix, ImageMatrix, MatrixCanvas, MatrixError, Rect,
    ScreenSchedule, ScrollCanvas, SharedMatrix, SportsMatrix,
    demo::{PatternBoard, TickerBoard, flaky_counter},
};

#[derive(Parser, Debug)]
#[command(name = "sportsmatrix", version)]
struct Cli {
    /// Log filter used when RUST_LOG is not set.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rotate the demo boards on a virtual matrix and serve the HTTP API.
    Run(RunArgs),
    /// Load a config file, apply defaults and print the result.
    CheckConfig(CheckArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Config JSON. Defaults are used when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where frames go.
    #[arg(long, value_enum, default_value_t = DeviceChoice::Console)]
    device: DeviceChoice,

    /// Output PNG for `--device png`, rewritten on every frame.
    #[arg(long, default_value = "frame.png")]
    png_out: PathBuf,

    /// Seconds each demo board stays on screen.
    #[arg(long, default_value_t = 10)]
    hold_secs: u64,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Config JSON.
    #[arg(long)]
    config: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DeviceChoice {
    Console,
    Png,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .with_context(|| format!("parse log filter '{}'", cli.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.cmd {
        Command::Run(args) => cmd_run(args).await,
        Command::CheckConfig(args) => cmd_check_config(args),
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(p) => Config::load(p).with_context(|| format!("load config '{}'", p.display())),
        None => {
            let mut cfg = Config::default();
            cfg.defaults();
            Ok(cfg)
        }
    }
}

fn cmd_check_config(args: CheckArgs) -> anyhow::Result<()> {
    let cfg = load_config(Some(&args.config))?;
    let out = serde_json::to_string_pretty(&cfg).with_context(|| "serialize config")?;
    println!("{out}");
    Ok(())
}

async fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let cfg = load_config(args.config.as_ref())?;
    let hw = cfg.hardware();
    let (width, height) = hw.geometry();

    tracing::info!(
        cols = hw.cols,
        rows = hw.rows,
        brightness = hw.brightness,
        mapping = %hw.hardware_mapping,
        "initializing matrix"
    );

    let matrix = match args.device {
        DeviceChoice::Console => {
            SharedMatrix::new(ConsoleMatrix::new(width, height, std::io::stdout()))
        }
        DeviceChoice::Png => {
            if let Some(parent) = args.png_out.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create output dir '{}'", parent.display()))?;
            }
            SharedMatrix::new(ImageMatrix::new(width, height).with_png_output(&args.png_out))
        }
    };
    matrix.set_brightness(hw.brightness)?;

    let canvas: Box<dyn Canvas> = if cfg.scroll_mode {
        Box::new(
            ScrollCanvas::new(matrix.clone())
                .with_interval(cfg.scroll_interval())
                .with_direction(cfg.scroll_direction),
        )
    } else {
        Box::new(MatrixCanvas::new(matrix.clone()))
    };

    let hold_for = Duration::from_secs(args.hold_secs);
    let pattern: Arc<dyn Board> = Arc::new(PatternBoard::new(
        "Pattern",
        Rect::from_size(width, height),
        4,
        hold_for,
    ));
    let ticker: Arc<dyn Board> = Arc::new(TickerBoard::new("Ticker", flaky_counter(), hold_for));
    let boards = vec![pattern, ticker];

    let controller = SportsMatrix::new(canvas, boards, cfg.pacing);
    let cancel = CancellationToken::new();

    let app = sportsmatrix::http::router(controller.clone())?;
    let listener = TcpListener::bind(("0.0.0.0", cfg.http_listen_port))
        .await
        .with_context(|| format!("bind http port {}", cfg.http_listen_port))?;
    let http = tokio::spawn(sportsmatrix::http::serve(listener, app, cancel.clone()));

    let schedule = ScreenSchedule::new(&cfg.screen_off_times, &cfg.screen_on_times)?;
    if !schedule.is_empty() {
        tokio::spawn(schedule.run(controller.clone(), cancel.clone()));
    }

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                return;
            }
            tracing::warn!("interrupt received, shutting down");
            cancel.cancel();
        });
    }

    let result = controller.serve(cancel.clone()).await;
    cancel.cancel();
    controller.close();
    matrix.close()?;

    match http.await {
        Ok(Err(e)) => tracing::error!(error = %e, "http server failed"),
        Err(e) => tracing::error!(error = %e, "http server task failed"),
        Ok(Ok(())) => {}
    }

    match result {
        Ok(()) | Err(MatrixError::Canceled) | Err(MatrixError::Closed) => Ok(()),
        Err(e) => Err(e).with_context(|| "serve boards"),
    }
}
