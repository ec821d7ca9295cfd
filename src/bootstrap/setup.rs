//! Startup tasks: logger, folders and the external converter check.

use std::fs;
use std::io::Write;
use std::process::Command;

use anstyle::{AnsiColor, Style};
use anyhow::{Context, Result};
use env_logger::{Builder, WriteStyle};
use log::kv::Key;
use log::{error, info, warn};

use crate::background::steps::ExternalConverter;
use crate::config::AppConfig;

// ────────────────────────────────────────────────────────────────
// Logger
// ────────────────────────────────────────────────────────────────

const DURATION_WIDTH: usize = 10;

/// `filter` uses env_logger's directive syntax, e.g. `info,slidepipe::background=debug`.
pub fn initialize_logger(filter: &str) {
    let grey = Style::new().fg_color(Some(AnsiColor::BrightBlack.into()));
    let cyan = Style::new().fg_color(Some(AnsiColor::Cyan.into()));

    let result = Builder::new()
        .write_style(WriteStyle::Auto)
        .parse_filters(filter)
        .format(move |buf, record| {
            let ts = buf.timestamp();
            let level_style = buf.default_level_style(record.level());

            // "1.234567ms" -> "1.23 ms"
            let dur_raw = record
                .key_values()
                .get(Key::from("duration"))
                .map(|v| {
                    let s = format!("{}", v);
                    if let Some(idx) = s.find(|c: char| c.is_alphabetic()) {
                        let (num, unit) = (&s[..idx], &s[idx..]);
                        if let Ok(val) = num.parse::<f32>() {
                            return format!("{:.2} {}", val, unit);
                        }
                    }
                    s
                })
                .unwrap_or_default();
            let dur = if dur_raw.is_empty() {
                " ".repeat(DURATION_WIDTH)
            } else {
                format!("{cyan}{:>width$}{cyan:#}", dur_raw, width = DURATION_WIDTH)
            };

            writeln!(
                buf,
                "{} {level_style}{}{level_style:#} {grey}{}{grey:#}",
                ts,
                record.level(),
                record.target()
            )?;

            let message = format!("{}", record.args());
            let mut lines = message.lines();
            if let Some(first_line) = lines.next() {
                writeln!(buf, "{} {}", dur, first_line)?;
            }
            let indent = " ".repeat(DURATION_WIDTH + 1);
            for line in lines {
                writeln!(buf, "{}{}", indent, line)?;
            }
            Ok(())
        })
        .try_init();

    if let Err(err) = result {
        // Tests and embedders may have installed a logger already.
        eprintln!("logger already initialized: {}", err);
    }
}

// ────────────────────────────────────────────────────────────────
// Folders
// ────────────────────────────────────────────────────────────────

pub fn initialize_folders(config: &AppConfig) -> Result<()> {
    let mut folders = vec![
        config.storage_root.as_path(),
        config.working_root.as_path(),
    ];
    if let Some(parent) = config.db_path.parent() {
        folders.push(parent);
    }
    for folder in folders {
        if folder.as_os_str().is_empty() {
            continue;
        }
        fs::create_dir_all(folder)
            .with_context(|| format!("failed to create folder {}", folder.display()))?;
    }
    if config.source_url_template.is_none() && !config.source_root.is_dir() {
        warn!(
            "Source folder {} does not exist; downloads will fail until it does",
            config.source_root.display()
        );
    }
    Ok(())
}

// ────────────────────────────────────────────────────────────────
// External converter
// ────────────────────────────────────────────────────────────────

/// Logs whether the configured converter can be started. Slide formats fail
/// their conversion step without one.
pub fn check_conversion_command(converter: Option<&ExternalConverter>) {
    let Some(converter) = converter else {
        info!("No external converter configured; only raster formats can be converted");
        return;
    };
    let program = converter.program();
    match Command::new(program).arg("--version").output() {
        Ok(output) if output.status.success() => {
            let version_info = String::from_utf8_lossy(&output.stdout);
            let version = version_info.lines().next().unwrap_or("unknown version");
            info!("{} version: {}", program, version);
        }
        Ok(_) => {
            warn!(
                "`{}` was found but `--version` returned an error; conversions may fail",
                program
            );
        }
        Err(_) => {
            error!(
                "`{}` is not installed or not available in PATH. Slide conversion will fail.",
                program
            );
        }
    }
}
