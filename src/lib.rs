//! # Smush Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Errori a livello di richiesta
//! - `image_format`: Rilevamento del formato dal contenuto del file
//! - `file_manager`: Operazioni sui file e discovery immagini
//! - `tool_resolver`: Ricerca dei tool esterni (pngnq, pngcrush, jpegtran)
//! - `optimizer`: Template, runner, pipeline PNG/JPEG e registry
//! - `dispatcher`: Orchestratore di una singola richiesta
//! - `progress`: Progress tracking e statistiche
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use smush::{Config, Dispatcher};
//!
//! let dispatcher = Dispatcher::new(Config::default())?;
//! let report = dispatcher.process(&input, &output).await?;
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod file_manager;
pub mod image_format;
pub mod optimizer;
pub mod progress;
pub mod tool_resolver;

pub use config::Config;
pub use dispatcher::Dispatcher;
pub use error::OptimizeError;
pub use file_manager::FileManager;
pub use image_format::{detect_format, DetectedFormat};
pub use optimizer::{
    CommandTemplate, JpegOptimizer, Optimizer, OptimizerKind, OptimizerSpec, PassOutcome, PngOptimizer,
    ProcessRunner, Registry, RunContext, Squish, SquishReport, StopHandle, StopSignal,
};
pub use progress::{OptimizationStats, ProgressManager};
pub use tool_resolver::ToolPathResolver;
