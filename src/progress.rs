//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress tracking e le statistiche di una
//! esecuzione batch.
//!
//! ## Componenti principali:
//! - `ProgressManager`: barra di progresso `indicatif`, un tick per file
//! - `OptimizationStats`: statistiche cumulative dei risultati
//!
//! ## Statistiche tracciate:
//! - **files_processed**: Totale file elaborati
//! - **files_optimized**: Richieste completate con successo
//! - **files_skipped**: Formato non riconosciuto o senza optimizer registrato
//! - **total_bytes_saved**: Byte totali risparmiati
//! - **errors**: Richieste fallite per altri motivi
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:12] [========================================] 42/42 (100%) ✅ logo.png: 31.4% saved
//! ```

use crate::error::OptimizeError;
use crate::file_manager::FileManager;
use crate::optimizer::SquishReport;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Manages progress reporting for a batch of files
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total_files: u64) -> Self {
        let bar = ProgressBar::new(total_files);

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// A progress manager that draws nothing
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Update progress with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Statistics tracker for optimization results
#[derive(Debug, Default)]
pub struct OptimizationStats {
    pub files_processed: usize,
    pub files_optimized: usize,
    pub files_skipped: usize,
    pub total_bytes_saved: u64,
    pub total_original_size: u64,
    pub errors: usize,
}

impl OptimizationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_optimized(&mut self, original_size: u64, new_size: u64) {
        self.files_processed += 1;
        self.files_optimized += 1;
        self.total_original_size += original_size;
        self.total_bytes_saved += original_size.saturating_sub(new_size);
    }

    pub fn add_skipped(&mut self) {
        self.files_processed += 1;
        self.files_skipped += 1;
    }

    pub fn add_error(&mut self) {
        self.files_processed += 1;
        self.errors += 1;
    }

    /// Classify one request result
    pub fn record(&mut self, result: &Result<SquishReport, OptimizeError>) {
        match result {
            Ok(report) => self.add_optimized(report.original_size, report.final_size),
            Err(e) if e.is_unsupported() => self.add_skipped(),
            Err(_) => self.add_error(),
        }
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        if self.total_original_size > 0 {
            (self.total_bytes_saved as f64 / self.total_original_size as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Processed: {} files | Optimized: {} | Skipped: {} | Errors: {} | Total saved: {} ({:.2}%)",
            self.files_processed,
            self.files_optimized,
            self.files_skipped,
            self.errors,
            FileManager::format_size(self.total_bytes_saved),
            self.overall_reduction_percent()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn report(original_size: u64, final_size: u64) -> SquishReport {
        SquishReport {
            format: "PNG".to_string(),
            input: PathBuf::from("in.png"),
            output: PathBuf::from("min/in.png"),
            original_size,
            final_size,
            passes: Vec::new(),
        }
    }

    #[test]
    fn test_record_classifies_results() {
        let mut stats = OptimizationStats::new();
        stats.record(&Ok(report(1000, 600)));
        stats.record(&Ok(report(1000, 1000)));
        stats.record(&Err(OptimizeError::OptimizerNotFound { format: "GIF".to_string() }));
        stats.record(&Err(OptimizeError::FormatUndetectable { path: PathBuf::from("x") }));
        stats.record(&Err(OptimizeError::Cancelled));

        assert_eq!(stats.files_processed, 5);
        assert_eq!(stats.files_optimized, 2);
        assert_eq!(stats.files_skipped, 2);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.total_bytes_saved, 400);
        assert_eq!(stats.overall_reduction_percent(), 20.0);
    }

    #[test]
    fn test_summary_mentions_counts() {
        let mut stats = OptimizationStats::new();
        stats.add_optimized(2048, 1024);
        let summary = stats.format_summary();
        assert!(summary.contains("Optimized: 1"));
        assert!(summary.contains("1.00 KB"));
    }

    #[test]
    fn test_hidden_progress_does_not_panic() {
        let progress = ProgressManager::hidden();
        progress.update("a.png");
        progress.finish("done");
    }
}
