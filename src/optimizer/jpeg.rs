//! # JPEG Optimizer
//!
//! JPEG pipeline: a lossless `jpegtran` optimize pass, followed by a
//! progressive re-encode only when the optimized file is large enough to
//! benefit from it.

use super::template::CommandTemplate;
use super::{ProcessRunner, RunContext};
use crate::config::Config;
use crate::error::OptimizeError;
use std::path::Path;
use tracing::{debug, warn};

/// Baseline results above this many bytes get a progressive pass
pub const PROGRESSIVE_THRESHOLD: u64 = 10_000;

const STRIP_BASELINE: &str = r#"jpegtran -outfile "__OUTPUT__" -optimise -copy none "__INPUT__""#;
const STRIP_PROGRESSIVE: &str = r#"jpegtran -outfile "__OUTPUT__" -optimise -progressive -copy none "__INPUT__""#;
const KEEP_BASELINE: &str = r#"jpegtran -outfile "__OUTPUT__" -optimise -copy all "__INPUT__""#;
const KEEP_PROGRESSIVE: &str = r#"jpegtran -outfile "__OUTPUT__" -optimise -progressive -copy all "__INPUT__""#;

/// Whether a baseline result of `size` bytes should be re-encoded progressively
pub fn wants_progressive(size: u64) -> bool {
    size > PROGRESSIVE_THRESHOLD
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpegOptimizer {
    strip_meta: bool,
    /// Baseline pass, then progressive pass
    commands: [CommandTemplate; 2],
}

impl JpegOptimizer {
    pub const ID: &'static str = "JPEG";

    pub fn new(strip_meta: bool) -> Result<Self, OptimizeError> {
        let [baseline, progressive] = Self::get_commands(strip_meta);
        Self::with_commands(baseline, progressive).map(|optimizer| Self {
            strip_meta,
            ..optimizer
        })
    }

    /// An optimizer with custom baseline and progressive templates
    pub fn with_commands(baseline: &str, progressive: &str) -> Result<Self, OptimizeError> {
        Ok(Self {
            strip_meta: true,
            commands: [
                CommandTemplate::parse(baseline)?,
                CommandTemplate::parse(progressive)?,
            ],
        })
    }

    /// Factory used by the registry. Accepts `strip` or `keep` as argument.
    pub fn make(config: &Config, arg: Option<&str>) -> Result<Self, OptimizeError> {
        let strip_meta = match arg.map(|a| a.trim().to_lowercase()) {
            None => config.strip_meta,
            Some(a) if a == "strip" => true,
            Some(a) if a == "keep" => false,
            Some(a) => {
                return Err(OptimizeError::OptimizerResolution {
                    value: format!("{}:{}", Self::ID, a),
                    purpose: "a JPEG optimizer (expected strip or keep)".to_string(),
                })
            }
        };
        Self::new(strip_meta)
    }

    pub fn get_commands(strip_meta: bool) -> [&'static str; 2] {
        if strip_meta {
            [STRIP_BASELINE, STRIP_PROGRESSIVE]
        } else {
            [KEEP_BASELINE, KEEP_PROGRESSIVE]
        }
    }

    pub fn strips_meta(&self) -> bool {
        self.strip_meta
    }

    pub fn commands(&self) -> &[CommandTemplate] {
        &self.commands
    }

    /// Runs the baseline pass, then decides on the progressive pass from the
    /// baseline result's size (the original's size if the baseline pass
    /// produced nothing).
    ///
    /// Small results are compared with the original and the pipeline stops.
    /// Large results are not compared: the progressive pass re-encodes them
    /// and only its output is compared with the original. If the progressive
    /// pass fails, the baseline result is compared instead.
    pub async fn squish(&self, ctx: &mut RunContext, runner: &ProcessRunner) -> Result<(), OptimizeError> {
        let [baseline_command, progressive_command] = &self.commands;
        let original = ctx.current().to_path_buf();

        let baseline = ctx.run_pass(runner, baseline_command, &original).await?;
        let measured = baseline.as_deref().unwrap_or(original.as_path());
        let size = file_size(measured).await?;

        if !wants_progressive(size) {
            debug!("{} bytes, skipping progressive pass", size);
            if let Some(candidate) = baseline {
                ctx.accept(candidate).await;
            }
            return Ok(());
        }

        warn!(
            "{} is {} bytes (> {} bytes) - will be converted to progressive",
            ctx.input().display(),
            size,
            PROGRESSIVE_THRESHOLD
        );

        let source = baseline.clone().unwrap_or(original);
        let progressive = ctx.run_pass(runner, progressive_command, &source).await?;

        match (progressive, baseline) {
            (Some(candidate), baseline) => {
                if let Some(ref intermediate) = baseline {
                    ctx.discard(intermediate).await;
                }
                ctx.accept(candidate).await;
            }
            (None, Some(candidate)) => ctx.accept(candidate).await,
            (None, None) => {}
        }

        Ok(())
    }
}

async fn file_size(path: &Path) -> Result<u64, OptimizeError> {
    Ok(tokio::fs::metadata(path).await?.len())
}

#[cfg(all(test, unix))]
mod tests {
    use super::super::test_support::*;
    use super::super::{PassOutcome, StopSignal};
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn runner() -> ProcessRunner {
        ProcessRunner::new(Duration::from_secs(10))
    }

    #[test]
    fn test_threshold_boundary() {
        assert!(!wants_progressive(9_999));
        assert!(!wants_progressive(10_000));
        assert!(wants_progressive(10_001));
    }

    #[test]
    fn test_strip_meta_selects_copy_mode() {
        let strip = JpegOptimizer::new(true).unwrap();
        assert!(strip.commands()[0].as_str().contains("-copy none"));
        assert!(strip.commands()[1].as_str().contains("-progressive"));
        // The progressive pass may run on the untouched original
        assert!(strip.commands()[1].as_str().contains("-copy none"));
        assert!(strip.strips_meta());

        let keep = JpegOptimizer::new(false).unwrap();
        assert!(keep.commands()[0].as_str().contains("-copy all"));
        assert!(keep.commands()[1].as_str().contains("-copy all"));
        assert!(!keep.strips_meta());
    }

    #[test]
    fn test_make_uses_config_and_arguments() {
        let mut config = Config::default();
        config.strip_meta = false;
        assert!(!JpegOptimizer::make(&config, None).unwrap().strips_meta());
        assert!(JpegOptimizer::make(&config, Some("strip")).unwrap().strips_meta());
        assert!(JpegOptimizer::make(&config, Some("bogus")).is_err());
    }

    async fn run_with_size(len: usize) -> Vec<PassOutcome> {
        let dir = TempDir::new().unwrap();
        let input = write_file(dir.path(), "in.jpg", len);
        let output = dir.path().join("out.jpg");

        let optimizer = JpegOptimizer::with_commands("cp __INPUT__ __OUTPUT__", "cp __INPUT__ __OUTPUT__").unwrap();
        let mut ctx = RunContext::prepare(&input, &output, StopSignal::never()).await.unwrap();
        optimizer.squish(&mut ctx, &runner()).await.unwrap();
        let report = ctx.finish(JpegOptimizer::ID).await.unwrap();

        assert!(report.final_size <= len as u64);
        report.passes.iter().map(|p| p.outcome).collect()
    }

    #[tokio::test]
    async fn test_exactly_threshold_skips_progressive() {
        let passes = run_with_size(10_000).await;
        assert_eq!(passes, vec![PassOutcome::Succeeded]);
    }

    #[tokio::test]
    async fn test_above_threshold_attempts_progressive() {
        let passes = run_with_size(10_001).await;
        assert_eq!(passes, vec![PassOutcome::Succeeded, PassOutcome::Succeeded]);
    }

    #[tokio::test]
    async fn test_small_file_runs_single_pass() {
        let passes = run_with_size(5_000).await;
        assert_eq!(passes.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_progressive_keeps_baseline() {
        let dir = TempDir::new().unwrap();
        let input = write_file(dir.path(), "in.jpg", 30_000);
        let baseline = write_file(dir.path(), "baseline.jpg", 20_000);
        let output = dir.path().join("out.jpg");

        let baseline_command = format!("cp {} __OUTPUT__", baseline.display());
        let optimizer = JpegOptimizer::with_commands(&baseline_command, "false __INPUT__ __OUTPUT__").unwrap();

        let mut ctx = RunContext::prepare(&input, &output, StopSignal::never()).await.unwrap();
        optimizer.squish(&mut ctx, &runner()).await.unwrap();
        let report = ctx.finish(JpegOptimizer::ID).await.unwrap();

        assert_eq!(report.passes.len(), 2);
        assert_eq!(report.passes[1].outcome, PassOutcome::Failed { code: Some(1) });
        assert_eq!(report.final_size, 20_000);
    }

    #[tokio::test]
    async fn test_progressive_result_compared_with_original() {
        let dir = TempDir::new().unwrap();
        let input = write_file(dir.path(), "in.jpg", 12_000);
        let bigger = write_file(dir.path(), "bigger.jpg", 15_000);
        let output = dir.path().join("out.jpg");

        let grow = format!("cp {} __OUTPUT__", bigger.display());
        let optimizer = JpegOptimizer::with_commands("cp __INPUT__ __OUTPUT__", &grow).unwrap();

        let mut ctx = RunContext::prepare(&input, &output, StopSignal::never()).await.unwrap();
        optimizer.squish(&mut ctx, &runner()).await.unwrap();
        let report = ctx.finish(JpegOptimizer::ID).await.unwrap();

        assert_eq!(report.passes.len(), 2);
        assert_eq!(report.final_size, 12_000);
        assert_eq!(std::fs::read(&output).unwrap(), std::fs::read(&input).unwrap());
    }
}
