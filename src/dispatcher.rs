//! # Dispatcher Module
//!
//! Punto d'ingresso di una richiesta di ottimizzazione.
//!
//! ## Flusso di una richiesta:
//! 1. Rileva il formato dal contenuto del file (`image_format`)
//! 2. Sceglie l'optimizer: override da configurazione, altrimenti il registry
//! 3. Prepara il `RunContext` (copia di lavoro + directory scratch)
//! 4. Esegue la pipeline dell'optimizer
//! 5. Pubblica il risultato migliore sul path di output
//!
//! Se il formato non è riconosciuto o non ha un optimizer, nessun processo
//! esterno viene avviato e l'output non viene toccato.
//!
//! ## Esempio:
//! ```rust,ignore
//! let dispatcher = Dispatcher::new(config)?;
//! let report = dispatcher.smush(Path::new("photos/logo.png"), None).await?;
//! println!("{} -> {}", report.input.display(), report.output.display());
//! ```

use crate::config::Config;
use crate::error::OptimizeError;
use crate::file_manager::FileManager;
use crate::image_format;
use crate::optimizer::{Optimizer, ProcessRunner, Registry, RunContext, Squish, SquishReport, StopSignal};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Routes input files to the optimizer registered for their format
#[derive(Debug, Clone)]
pub struct Dispatcher {
    config: Arc<Config>,
    registry: Arc<Registry>,
    runner: ProcessRunner,
    stop: StopSignal,
    /// Format id → optimizer taking precedence over the registry
    overrides: HashMap<String, Optimizer>,
    /// Where request scratch directories are created (system temp dir if unset)
    scratch_root: Option<PathBuf>,
}

impl Dispatcher {
    /// A dispatcher backed by the built-in registry.
    ///
    /// The `optimizers` configuration values are resolved here, so a bad
    /// value fails at startup rather than on the first matching file.
    pub fn new(config: Config) -> Result<Self, OptimizeError> {
        Self::with_registry(config, Registry::builtin())
    }

    pub fn with_registry(config: Config, registry: Arc<Registry>) -> Result<Self, OptimizeError> {
        let mut overrides = HashMap::new();
        for value in &config.optimizers {
            if let Some(optimizer) = registry.resolve(Some(value.as_str().into()), &config)? {
                debug!("Using {:?} for {} files", value, optimizer.format_id());
                overrides.insert(optimizer.format_id().to_string(), optimizer);
            }
        }

        Ok(Self {
            runner: ProcessRunner::new(config.pass_timeout()),
            config: Arc::new(config),
            registry,
            stop: StopSignal::never(),
            overrides,
            scratch_root: None,
        })
    }

    /// Replace the process runner
    pub fn with_runner(mut self, runner: ProcessRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Stop signal observed by every request of this dispatcher
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    /// Create request scratch directories under `root`
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    /// Use `optimizer` for its format instead of the registry entry
    pub fn with_optimizer(mut self, optimizer: Optimizer) -> Self {
        self.overrides.insert(optimizer.format_id().to_string(), optimizer);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The optimizer that would handle `format_id`
    pub fn optimizer_for(&self, format_id: &str) -> Result<Optimizer, OptimizeError> {
        match self.overrides.get(&format_id.to_ascii_uppercase()) {
            Some(optimizer) => Ok(optimizer.clone()),
            None => self.registry.lookup(format_id, &self.config),
        }
    }

    /// Optimizes `input` into `output`.
    ///
    /// On success `output` holds a file no larger than `input`. On any
    /// error `output` is left as it was. File system failures that leave no
    /// result to publish are reported as `OutputUnavailable`.
    pub async fn process(&self, input: &Path, output: &Path) -> Result<SquishReport, OptimizeError> {
        let detected = image_format::detect(input)
            .await
            .ok_or_else(|| OptimizeError::FormatUndetectable {
                path: input.to_path_buf(),
            })?;

        let optimizer = self.optimizer_for(&detected.id)?;

        let report = self
            .run(&optimizer, &detected.id, input, output)
            .await
            .map_err(|e| match e {
                OptimizeError::Io(e) => OptimizeError::OutputUnavailable {
                    path: output.to_path_buf(),
                    reason: e.to_string(),
                },
                other => other,
            })?;

        info!(
            "✅ {}: {} -> {} ({:.1}% saved)",
            report.input.display(),
            FileManager::format_size(report.original_size),
            FileManager::format_size(report.final_size),
            report.reduction_percent()
        );

        Ok(report)
    }

    async fn run(
        &self,
        optimizer: &Optimizer,
        format_id: &str,
        input: &Path,
        output: &Path,
    ) -> Result<SquishReport, OptimizeError> {
        let mut ctx = match self.scratch_root {
            Some(ref root) => RunContext::prepare_in(root, input, output, self.stop.clone()).await?,
            None => RunContext::prepare(input, output, self.stop.clone()).await?,
        };
        optimizer.squish(&mut ctx, &self.runner).await?;
        ctx.finish(format_id).await
    }

    /// Like `process`, writing to `<input dir>/<default_dest>/<file name>`
    /// when no output is given
    pub async fn smush(&self, input: &Path, output: Option<&Path>) -> Result<SquishReport, OptimizeError> {
        let output = match output {
            Some(output) => output.to_path_buf(),
            None => self.default_output(input)?,
        };
        self.process(input, &output).await
    }

    fn default_output(&self, input: &Path) -> Result<PathBuf, OptimizeError> {
        FileManager::default_output_path(input, &self.config.default_dest)
            .map_err(|e| OptimizeError::Validation(e.to_string()))
    }
}
