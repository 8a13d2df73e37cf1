//! # Optimizer Module
//!
//! Il modulo separa le responsabilità in sottomoduli:
//! - `template`: template dei comandi con placeholder `__INPUT__` / `__OUTPUT__`
//! - `runner`: esecuzione dei tool esterni con timeout e cancellazione
//! - `keeper`: confronto delle dimensioni e pubblicazione atomica del risultato
//! - `png` / `jpeg`: le pipeline specifiche per formato
//! - `registry`: mappa format id → optimizer e risoluzione da configurazione
//!
//! Un `Optimizer` è immutabile e condivisibile tra richieste concorrenti;
//! tutto lo stato di una singola richiesta vive nel `RunContext`.

pub mod jpeg;
pub mod keeper;
pub mod png;
pub mod registry;
pub mod runner;
pub mod template;

pub use jpeg::JpegOptimizer;
pub use png::PngOptimizer;
pub use registry::{OptimizerSpec, Registry};
pub use runner::{PassOutcome, ProcessRunner, StopHandle, StopSignal};
pub use template::CommandTemplate;

use crate::config::Config;
use crate::error::OptimizeError;
use crate::file_manager::FileManager;
use std::fmt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Capability shared by every optimizer variant
pub trait Squish {
    /// Format identifier the optimizer is registered under
    fn format_id(&self) -> &'static str;

    /// Command templates, in execution order
    fn commands(&self) -> &[CommandTemplate];
}

/// The closed set of optimizer variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptimizerKind {
    Png,
    Jpeg,
}

impl OptimizerKind {
    pub const ALL: [OptimizerKind; 2] = [OptimizerKind::Png, OptimizerKind::Jpeg];

    pub fn format_id(self) -> &'static str {
        match self {
            Self::Png => PngOptimizer::ID,
            Self::Jpeg => JpegOptimizer::ID,
        }
    }

    /// Factory: builds the variant from configuration and an optional
    /// `key:argument` argument
    pub fn make(self, config: &Config, arg: Option<&str>) -> Result<Optimizer, OptimizeError> {
        match self {
            Self::Png => PngOptimizer::make(config, arg).map(Optimizer::Png),
            Self::Jpeg => JpegOptimizer::make(config, arg).map(Optimizer::Jpeg),
        }
    }
}

/// A format-specific optimization strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Optimizer {
    Png(PngOptimizer),
    Jpeg(JpegOptimizer),
}

impl Optimizer {
    pub fn kind(&self) -> OptimizerKind {
        match self {
            Self::Png(_) => OptimizerKind::Png,
            Self::Jpeg(_) => OptimizerKind::Jpeg,
        }
    }

    /// Runs the variant's pipeline inside `ctx`
    pub async fn squish(&self, ctx: &mut RunContext, runner: &ProcessRunner) -> Result<(), OptimizeError> {
        debug!("Squishing {} with the {} optimizer", ctx.input().display(), self);
        match self {
            Self::Png(png) => png.squish(ctx, runner).await,
            Self::Jpeg(jpeg) => jpeg.squish(ctx, runner).await,
        }
    }
}

impl Squish for Optimizer {
    fn format_id(&self) -> &'static str {
        self.kind().format_id()
    }

    fn commands(&self) -> &[CommandTemplate] {
        match self {
            Self::Png(png) => png.commands(),
            Self::Jpeg(jpeg) => jpeg.commands(),
        }
    }
}

impl fmt::Display for Optimizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.format_id())
    }
}

/// Optimizers compare equal to the configuration value naming them
impl PartialEq<str> for Optimizer {
    fn eq(&self, other: &str) -> bool {
        self.format_id().eq_ignore_ascii_case(other)
    }
}

impl PartialEq<&str> for Optimizer {
    fn eq(&self, other: &&str) -> bool {
        self == *other
    }
}

/// One executed (or attempted) pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassRecord {
    pub index: usize,
    pub command: String,
    pub outcome: PassOutcome,
    /// Size of the file the pass produced, when it produced one
    pub output_size: Option<u64>,
}

/// Summary of a completed request
#[derive(Debug, Clone)]
pub struct SquishReport {
    pub format: String,
    pub input: PathBuf,
    pub output: PathBuf,
    pub original_size: u64,
    pub final_size: u64,
    pub passes: Vec<PassRecord>,
}

impl SquishReport {
    pub fn bytes_saved(&self) -> u64 {
        self.original_size.saturating_sub(self.final_size)
    }

    pub fn reduction_percent(&self) -> f64 {
        FileManager::calculate_reduction(self.original_size, self.final_size)
    }

    /// Number of passes whose tool exited successfully
    pub fn successful_passes(&self) -> usize {
        self.passes.iter().filter(|p| p.outcome.is_success()).count()
    }
}

/// Per-request state: paths, pass counter, scratch directory and the best
/// file produced so far.
///
/// Scratch files live in a private `TempDir` and are removed when the
/// context is dropped, whatever way the request ends.
#[derive(Debug)]
pub struct RunContext {
    input: PathBuf,
    output: PathBuf,
    /// Working copy of the input inside the scratch directory
    original: PathBuf,
    extension: String,
    pass_index: usize,
    best: Option<PathBuf>,
    stop: StopSignal,
    passes: Vec<PassRecord>,
    scratch: TempDir,
}

impl RunContext {
    /// Creates the scratch directory and a working copy of `input`
    pub async fn prepare(input: &Path, output: &Path, stop: StopSignal) -> Result<Self, OptimizeError> {
        let scratch = tempfile::Builder::new().prefix("smush-").tempdir()?;
        Self::with_scratch(scratch, input, output, stop).await
    }

    /// Like `prepare`, with the scratch directory created under `root`
    pub async fn prepare_in(
        root: &Path,
        input: &Path,
        output: &Path,
        stop: StopSignal,
    ) -> Result<Self, OptimizeError> {
        let scratch = tempfile::Builder::new().prefix("smush-").tempdir_in(root)?;
        Self::with_scratch(scratch, input, output, stop).await
    }

    async fn with_scratch(
        scratch: TempDir,
        input: &Path,
        output: &Path,
        stop: StopSignal,
    ) -> Result<Self, OptimizeError> {
        let extension = input
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("img")
            .to_lowercase();

        let original = scratch.path().join(format!("original.{}", extension));
        tokio::fs::copy(input, &original).await?;

        Ok(Self {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            original,
            extension,
            pass_index: 0,
            best: None,
            stop,
            passes: Vec::new(),
            scratch,
        })
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Index of the next pass to run
    pub fn pass_index(&self) -> usize {
        self.pass_index
    }

    pub fn passes(&self) -> &[PassRecord] {
        &self.passes
    }

    /// The working copy of the untouched input
    pub fn original(&self) -> &Path {
        &self.original
    }

    /// The smallest file obtained so far (the original if no pass has been kept)
    pub fn current(&self) -> &Path {
        self.best.as_deref().unwrap_or(&self.original)
    }

    fn check_stop(&self) -> Result<(), OptimizeError> {
        if self.stop.should_stop() {
            Err(OptimizeError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Runs `template` with `source` as input and a fresh scratch file as
    /// output. Returns the produced file, or `None` when the pass failed or
    /// produced nothing. Only cancellation is an error.
    pub async fn run_pass(
        &mut self,
        runner: &ProcessRunner,
        template: &CommandTemplate,
        source: &Path,
    ) -> Result<Option<PathBuf>, OptimizeError> {
        self.check_stop()?;

        let index = self.pass_index;
        self.pass_index += 1;

        let candidate = self
            .scratch
            .path()
            .join(format!("pass-{}.{}", index, self.extension));
        let args = template.resolve(source, &candidate);
        let outcome = runner.execute(&args, &mut self.stop).await;

        let output_size = if outcome.is_success() {
            tokio::fs::metadata(&candidate).await.ok().map(|m| m.len())
        } else {
            None
        };
        self.passes.push(PassRecord {
            index,
            command: template.to_string(),
            outcome,
            output_size,
        });

        match outcome {
            PassOutcome::Cancelled => Err(OptimizeError::Cancelled),
            PassOutcome::Succeeded if output_size.is_some() => Ok(Some(candidate)),
            PassOutcome::Succeeded => {
                warn!("{} succeeded but produced no output file", template.program());
                Ok(None)
            }
            _ => {
                warn!(
                    "Pass {} ({}) failed with {:?}, continuing with best result so far",
                    index,
                    template.program(),
                    outcome
                );
                self.discard(&candidate).await;
                Ok(None)
            }
        }
    }

    /// Compares `candidate` with the current best and keeps it only when it
    /// is strictly smaller
    pub async fn accept(&mut self, candidate: PathBuf) {
        let reference = self.current().to_path_buf();
        let reference_size = match tokio::fs::metadata(&reference).await {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                warn!("Unable to measure {}: {}", reference.display(), e);
                self.discard(&candidate).await;
                return;
            }
        };

        match keeper::keep_smallest(&reference, &candidate).await {
            // A failed restore also reports `Kept::Candidate`, with the
            // candidate's own (not smaller) size
            Ok(result) if result.kept == keeper::Kept::Candidate && result.size < reference_size => {
                if let Some(previous) = self.best.replace(candidate) {
                    self.discard(&previous).await;
                }
            }
            Ok(_) => self.discard(&candidate).await,
            Err(e) => {
                warn!("Discarding candidate {}: {}", candidate.display(), e);
                self.discard(&candidate).await;
            }
        }
    }

    /// Deletes a scratch file that is no longer needed
    pub async fn discard(&self, path: &Path) {
        if path == self.original || self.best.as_deref() == Some(path) {
            return;
        }
        if let Err(e) = keeper::remove_scratch(path).await {
            warn!("Failed to remove scratch file {}: {}", path.display(), e);
        }
    }

    /// Publishes the best result to the output path
    pub async fn finish(self, format: &str) -> Result<SquishReport, OptimizeError> {
        self.check_stop()?;

        let original_size = tokio::fs::metadata(&self.original).await?.len();
        let source = match self.best {
            Some(ref best) => match tokio::fs::metadata(best).await {
                Ok(metadata) if metadata.len() <= original_size => best.clone(),
                _ => self.original.clone(),
            },
            None => self.original.clone(),
        };

        let final_size = keeper::publish(&source, &self.output).await?;

        Ok(SquishReport {
            format: format.to_string(),
            input: self.input,
            output: self.output,
            original_size,
            final_size,
            passes: self.passes,
        })
    }
}
