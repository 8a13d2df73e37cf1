//! # Error Types Module
//!
//! Questo modulo definisce i tipi di errore che una richiesta di ottimizzazione
//! può restituire al chiamante.
//!
//! ## Responsabilità:
//! - Definisce `OptimizeError` per tutti i fallimenti a livello di richiesta
//! - Fornisce messaggi descrittivi con il contesto (path, formato, valore)
//! - Integra con `thiserror` per la conversione automatica da `std::io::Error`
//!
//! ## Categorie di errori:
//! - `FormatUndetectable`: il contenuto del file non è un'immagine riconosciuta
//! - `OptimizerNotFound`: formato rilevato ma nessun optimizer registrato
//! - `OptimizerResolution`: valore di configurazione non risolvibile
//! - `OutputUnavailable`: nessun file di output pubblicabile
//! - `Cancelled`: richiesta interrotta tra un pass e l'altro
//!
//! I fallimenti dei singoli pass esterni NON sono errori: vengono assorbiti
//! dalla pipeline (vedi `optimizer::runner::PassOutcome`).
//!
//! ## Esempio:
//! ```rust,ignore
//! match dispatcher.process(&input, &output).await {
//!     Err(OptimizeError::FormatUndetectable { path }) => warn!("skip {}", path.display()),
//!     other => other?,
//! }
//! ```

use std::path::PathBuf;

/// Custom error types for image optimization requests
#[derive(thiserror::Error, Debug)]
pub enum OptimizeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unable to determine image format of {}", path.display())]
    FormatUndetectable { path: PathBuf },

    #[error("No optimizer registered for format {format}")]
    OptimizerNotFound { format: String },

    #[error("{value:?} cannot be resolved to {purpose}")]
    OptimizerResolution { value: String, purpose: String },

    #[error("An optimizer is already registered for format {format}")]
    DuplicateOptimizer { format: String },

    #[error("Invalid command template: {template}")]
    InvalidTemplate { template: String },

    #[error("No output could be produced at {}: {reason}", path.display())]
    OutputUnavailable { path: PathBuf, reason: String },

    #[error("Optimization cancelled")]
    Cancelled,

    #[error("Validation error: {0}")]
    Validation(String),
}

impl OptimizeError {
    /// Input this tool does not handle (unrecognized content, or a format
    /// without an optimizer). Batch runs count these as skipped.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::FormatUndetectable { .. } | Self::OptimizerNotFound { .. }
        )
    }
}
