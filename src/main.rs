//! # Smush - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Caricamento della configurazione (file JSON, variabili `OPTIMIZE_*`, flag CLI)
//! - Esecuzione parallela delle richieste, limitata da un semaforo
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (input, output, workers, timeout, etc.)
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose, `RUST_LOG` se presente)
//! 3. Costruisce la `Config` e il `Dispatcher` (override risolti all'avvio)
//! 4. Espande le directory in file immagine e calcola i path di output
//! 5. Ottimizza i file in parallelo; Ctrl-C interrompe le richieste in corso
//!
//! ## Esempio di utilizzo:
//! ```bash
//! smush photos/ --output optimized/ --workers 8 --optimizer PNG:verbose
//! ```

use anyhow::Result;
use clap::Parser;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use smush::{
    Config, Dispatcher, FileManager, OptimizationStats, ProgressManager, StopSignal, ToolPathResolver,
};

#[derive(Parser)]
#[command(name = "smush")]
#[command(about = "Shrink PNG and JPEG images with external optimizers, never growing a file")]
struct Args {
    /// Image files or directories to optimize
    #[arg(required_unless_present = "check_tools")]
    inputs: Vec<PathBuf>,

    /// Output file (single input) or directory (if not specified, results go to <input dir>/<dest>/)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Destination directory name used when no output is given
    #[arg(long)]
    dest: Option<String>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Preserve JPEG metadata
    #[arg(long)]
    keep_meta: bool,

    /// Let pngcrush print its progress
    #[arg(long)]
    verbose_tools: bool,

    /// Timeout for each external pass, in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Number of parallel workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Optimizer override for a format, e.g. PNG:verbose or JPEG:keep (repeatable)
    #[arg(long = "optimizer", value_name = "KEY[:ARG]")]
    optimizers: Vec<String>,

    /// Report which external tools are available and exit
    #[arg(long)]
    check_tools: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.check_tools {
        println!("{}", ToolPathResolver::new().get_tools_report());
        return Ok(());
    }

    let config = load_config(&args).await?;
    let jobs = plan_jobs(&args.inputs, args.output.as_deref(), &config)?;
    if jobs.is_empty() {
        warn!("No image files found");
        return Ok(());
    }

    let (stop_handle, stop) = StopSignal::channel();
    let dispatcher = Arc::new(Dispatcher::new(config.clone())?.with_stop_signal(stop));

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping running optimizations...");
            stop_handle.stop();
        }
    });

    info!("Optimizing {} file(s) with {} worker(s)", jobs.len(), config.workers);

    let semaphore = Arc::new(Semaphore::new(config.workers));
    let progress = if jobs.len() > 1 {
        ProgressManager::new(jobs.len() as u64)
    } else {
        ProgressManager::hidden()
    };

    let tasks = jobs.into_iter().map(|(input, output)| {
        let dispatcher = dispatcher.clone();
        let semaphore = semaphore.clone();
        let progress = progress.clone();

        tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await?;
            let result = dispatcher.smush(&input, output.as_deref()).await;

            let name = input
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| input.display().to_string());
            match &result {
                Ok(report) => progress.update(&format!("✅ {}: {:.1}% saved", name, report.reduction_percent())),
                Err(e) if e.is_unsupported() => {
                    warn!("Skipping {}: {}", input.display(), e);
                    progress.update(&format!("⏭️ {}: skipped", name));
                }
                Err(e) => {
                    error!("Failed to optimize {}: {}", input.display(), e);
                    progress.update(&format!("❌ {}: failed", name));
                }
            }

            Ok::<_, anyhow::Error>(result)
        })
    });

    let mut stats = OptimizationStats::new();
    for joined in join_all(tasks).await {
        match joined {
            Ok(Ok(result)) => stats.record(&result),
            Ok(Err(e)) => {
                error!("Worker error: {}", e);
                stats.add_error();
            }
            Err(e) => {
                error!("Task failed: {}", e);
                stats.add_error();
            }
        }
    }

    progress.finish("Done");
    info!("📊 {}", stats.format_summary());

    if stats.errors > 0 {
        return Err(anyhow::anyhow!("{} file(s) could not be optimized", stats.errors));
    }

    Ok(())
}

/// File, then `OPTIMIZE_*` environment, then command line
async fn load_config(args: &Args) -> Result<Config> {
    let mut config = match args.config {
        Some(ref path) => Config::from_file(path).await?,
        None => Config::default(),
    };
    config.apply_env_overrides()?;

    if let Some(ref dest) = args.dest {
        config.default_dest = dest.clone();
    }
    if args.keep_meta {
        config.strip_meta = false;
    }
    if args.verbose_tools {
        config.quiet = false;
    }
    if let Some(timeout) = args.timeout {
        config.pass_timeout_secs = timeout;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config.optimizers.extend(args.optimizers.iter().cloned());

    config.validate()?;
    Ok(config)
}

/// Expands directories and pairs every input file with its output path.
///
/// `None` means the default destination next to the input.
fn plan_jobs(inputs: &[PathBuf], output: Option<&Path>, config: &Config) -> Result<Vec<(PathBuf, Option<PathBuf>)>> {
    let mut files = Vec::new();
    let mut roots = Vec::new();
    for input in inputs {
        if input.is_dir() {
            files.extend(FileManager::find_image_files(input, config));
            roots.push(input.clone());
        } else if input.is_file() {
            files.push(input.clone());
            roots.push(input.parent().map(Path::to_path_buf).unwrap_or_default());
        } else {
            return Err(anyhow::anyhow!("Input does not exist: {}", input.display()));
        }
    }

    let Some(output) = output else {
        return Ok(files.into_iter().map(|file| (file, None)).collect());
    };

    // A single file names its output directly unless it points at a directory
    if let [input] = inputs {
        if input.is_file() {
            let target = if output.is_dir() {
                output.join(input.file_name().unwrap_or(input.as_os_str()))
            } else {
                output.to_path_buf()
            };
            return Ok(vec![(input.clone(), Some(target))]);
        }
    }

    let base = FileManager::common_path_prefix(&roots);
    files
        .into_iter()
        .map(|file| {
            let target = FileManager::mirrored_output_path(&file, &base, output)?;
            Ok((file, Some(target)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_plan_without_output_uses_default_destination() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.png");
        std::fs::write(&file, b"x").unwrap();

        let jobs = plan_jobs(&[file.clone()], None, &Config::default()).unwrap();
        assert_eq!(jobs, vec![(file, None)]);
    }

    #[test]
    fn test_plan_single_file_output() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.png");
        std::fs::write(&file, b"x").unwrap();
        let out_dir = dir.path().join("out");
        std::fs::create_dir(&out_dir).unwrap();

        let jobs = plan_jobs(&[file.clone()], Some(dir.path().join("b.png").as_path()), &Config::default()).unwrap();
        assert_eq!(jobs[0].1, Some(dir.path().join("b.png")));

        let jobs = plan_jobs(&[file.clone()], Some(out_dir.as_path()), &Config::default()).unwrap();
        assert_eq!(jobs[0].1, Some(out_dir.join("a.png")));
    }

    #[test]
    fn test_plan_directory_mirrors_layout() {
        let dir = TempDir::new().unwrap();
        let photos = dir.path().join("photos");
        std::fs::create_dir_all(photos.join("2023")).unwrap();
        std::fs::write(photos.join("2023/img.jpg"), b"x").unwrap();
        std::fs::write(photos.join("logo.png"), b"x").unwrap();
        let out = dir.path().join("out");

        let jobs = plan_jobs(&[photos.clone()], Some(out.as_path()), &Config::default()).unwrap();
        let targets: Vec<PathBuf> = jobs.into_iter().filter_map(|(_, target)| target).collect();
        assert_eq!(targets, vec![out.join("2023/img.jpg"), out.join("logo.png")]);
    }

    #[test]
    fn test_plan_missing_input_fails() {
        let dir = TempDir::new().unwrap();
        assert!(plan_jobs(&[dir.path().join("absent.png")], None, &Config::default()).is_err());
    }
}
