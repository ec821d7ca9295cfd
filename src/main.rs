use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{error, info, warn};

use slidepipe::AppContext;
use slidepipe::bootstrap::{check_conversion_command, initialize_folders, initialize_logger};
use slidepipe::common::errors::handle_error;
use slidepipe::config::AppConfig;
use slidepipe::operations::{import_dataset, recover_interrupted_images};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

fn main() -> ExitCode {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Invalid configuration: {}", err);
            return ExitCode::FAILURE;
        }
    };
    initialize_logger(&config.log_filter);

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            handle_error(err);
            ExitCode::FAILURE
        }
    }
}

fn run(config: AppConfig) -> Result<()> {
    let start_time = Instant::now();
    initialize_folders(&config)?;
    check_conversion_command(config.step_settings()?.converter.as_ref());

    let ctx = AppContext::from_config(&config)?;
    recover_interrupted_images(&ctx)?;
    if let Some(path) = &config.import_path {
        import_dataset(&ctx, path.clone());
    }
    info!(
        duration = &*format!("{:?}", start_time.elapsed());
        "slidepipe ready; press Ctrl-C to stop"
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", err);
        }
    });

    info!("Shutting down");
    ctx.scheduler.shutdown();
    if !ctx.scheduler.wait_idle(SHUTDOWN_GRACE) {
        warn!(
            "{} job(s) still running after {:?}; they will be failed by recovery on next start",
            ctx.scheduler.active_jobs().len(),
            SHUTDOWN_GRACE
        );
    }
    Ok(())
}
