//! File and stderr logging for the CLI
//!
//! Every command appends to `{log_dir}/impactsim.log`. A long study can log
//! a lot at debug level, so an oversized log is shifted to `impactsim.log.1`
//! (and older generations up to [`KEPT_GENERATIONS`]) before a new command
//! starts writing.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE: &str = "impactsim.log";

/// Size at which the current log is shifted out (5 MB)
const ROTATE_AT: u64 = 5 * 1024 * 1024;

/// Previous logs kept as `impactsim.log.1` ..= `impactsim.log.N`
const KEPT_GENERATIONS: usize = 3;

fn generation(log_path: &Path, n: usize) -> PathBuf {
    let mut name = log_path.as_os_str().to_owned();
    name.push(format!(".{n}"));
    PathBuf::from(name)
}

/// Shift `log_path` to generation 1 once it reaches [`ROTATE_AT`].
///
/// The oldest generation is dropped. Returns whether anything moved.
fn shift_generations(log_path: &Path) -> io::Result<bool> {
    match fs::metadata(log_path) {
        Ok(meta) if meta.len() >= ROTATE_AT => {}
        Ok(_) => return Ok(false),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    }

    let oldest = generation(log_path, KEPT_GENERATIONS);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..KEPT_GENERATIONS).rev() {
        let from = generation(log_path, n);
        if from.exists() {
            fs::rename(&from, generation(log_path, n + 1))?;
        }
    }
    fs::rename(log_path, generation(log_path, 1))?;
    Ok(true)
}

/// Install the global subscriber.
///
/// The file gets everything the filter lets through; stderr only shows
/// warnings and errors so command output stays readable. `RUST_LOG`
/// overrides `level`.
pub fn init_logging(log_dir: &Path, level: &str) -> color_eyre::Result<()> {
    fs::create_dir_all(log_dir)?;
    let log_path = log_dir.join(LOG_FILE);

    let rotated = shift_generations(&log_path).unwrap_or_else(|e| {
        eprintln!("Warning: could not rotate {}: {e}", log_path.display());
        false
    });

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("impactsim={level},impactsim_core={level}"))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true),
        )
        .with(
            fmt::layer()
                .compact()
                .with_writer(io::stderr)
                .with_target(false)
                .with_filter(LevelFilter::WARN),
        )
        .init();

    tracing::info!(log_path = %log_path.display(), rotated, "Logging initialized");
    Ok(())
}
