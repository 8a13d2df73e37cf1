//! # PNG Optimizer
//!
//! PNG pipeline: `pngnq` quantization, then `pngcrush` on the result.

use super::template::{parse_all, CommandTemplate};
use super::{ProcessRunner, RunContext};
use crate::config::Config;
use crate::error::OptimizeError;

const PNGNQ: &str = r#"pngnq -n 256 -o "__OUTPUT__" "__INPUT__""#;
const PNGCRUSH_QUIET: &str = r#"pngcrush -rem alla -brute -reduce -q "__INPUT__" "__OUTPUT__""#;
const PNGCRUSH: &str = r#"pngcrush -rem alla -brute -reduce "__INPUT__" "__OUTPUT__""#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PngOptimizer {
    quiet: bool,
    commands: Vec<CommandTemplate>,
}

impl PngOptimizer {
    pub const ID: &'static str = "PNG";

    pub fn new(quiet: bool) -> Result<Self, OptimizeError> {
        Ok(Self {
            quiet,
            commands: parse_all(Self::get_commands(quiet))?,
        })
    }

    /// An optimizer running arbitrary templates in order
    pub fn with_commands<'a, I>(templates: I) -> Result<Self, OptimizeError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        Ok(Self {
            quiet: true,
            commands: parse_all(templates)?,
        })
    }

    /// Factory used by the registry. Accepts `quiet` or `verbose` as argument.
    pub fn make(config: &Config, arg: Option<&str>) -> Result<Self, OptimizeError> {
        let quiet = match arg.map(|a| a.trim().to_lowercase()) {
            None => config.quiet,
            Some(a) if a == "quiet" => true,
            Some(a) if a == "verbose" => false,
            Some(a) => {
                return Err(OptimizeError::OptimizerResolution {
                    value: format!("{}:{}", Self::ID, a),
                    purpose: "a PNG optimizer (expected quiet or verbose)".to_string(),
                })
            }
        };
        Self::new(quiet)
    }

    pub fn get_commands(quiet: bool) -> [&'static str; 2] {
        if quiet {
            [PNGNQ, PNGCRUSH_QUIET]
        } else {
            [PNGNQ, PNGCRUSH]
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn commands(&self) -> &[CommandTemplate] {
        &self.commands
    }

    /// Each pass reads the smallest file so far; every produced file is
    /// compared with it, so no pass can grow the result. Failed passes are
    /// skipped.
    pub async fn squish(&self, ctx: &mut RunContext, runner: &ProcessRunner) -> Result<(), OptimizeError> {
        for command in &self.commands {
            let source = ctx.current().to_path_buf();
            if let Some(candidate) = ctx.run_pass(runner, command, &source).await? {
                ctx.accept(candidate).await;
            }
        }
        Ok(())
    }
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
    fn test_quiet_flag_selects_pngcrush_variant() {
        let quiet = PngOptimizer::new(true).unwrap();
        assert!(quiet.commands()[1].as_str().contains(" -q "));
        assert_eq!(quiet.commands()[0].program(), "pngnq");

        let verbose = PngOptimizer::new(false).unwrap();
        assert!(!verbose.commands()[1].as_str().contains(" -q "));
        assert_eq!(verbose.commands()[1].program(), "pngcrush");
    }

    #[test]
    fn test_make_arguments() {
        let config = Config::default();
        assert!(PngOptimizer::make(&config, None).unwrap().is_quiet());
        assert!(!PngOptimizer::make(&config, Some("verbose")).unwrap().is_quiet());
        assert!(matches!(
            PngOptimizer::make(&config, Some("loud")),
            Err(OptimizeError::OptimizerResolution { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_first_tool_continues_with_original() {
        let dir = TempDir::new().unwrap();
        let input = write_file(dir.path(), "in.png", 500);
        let output = dir.path().join("out.png");

        let optimizer = PngOptimizer::with_commands([
            "no-such-pngnq-binary -o __OUTPUT__ __INPUT__",
            "cp __INPUT__ __OUTPUT__",
        ])
        .unwrap();

        let mut ctx = RunContext::prepare(&input, &output, StopSignal::never()).await.unwrap();
        optimizer.squish(&mut ctx, &runner()).await.unwrap();

        assert_eq!(ctx.passes()[0].outcome, PassOutcome::LaunchFailed);
        assert_eq!(ctx.passes()[1].outcome, PassOutcome::Succeeded);
        assert_eq!(ctx.passes()[1].output_size, Some(500));

        let report = ctx.finish(PngOptimizer::ID).await.unwrap();
        assert_eq!(report.final_size, 500);
        assert!(size_of(&output) <= size_of(&input));
    }

    #[tokio::test]
    async fn test_second_pass_reads_first_pass_output() {
        let dir = TempDir::new().unwrap();
        let input = write_file(dir.path(), "in.png", 400);
        let small = write_file(dir.path(), "small.png", 150);
        let output = dir.path().join("out.png");

        let first = format!("cp {} __OUTPUT__", small.display());
        let optimizer = PngOptimizer::with_commands([first.as_str(), "cp __INPUT__ __OUTPUT__"]).unwrap();

        let mut ctx = RunContext::prepare(&input, &output, StopSignal::never()).await.unwrap();
        optimizer.squish(&mut ctx, &runner()).await.unwrap();
        assert_eq!(ctx.passes()[1].output_size, Some(150));

        let report = ctx.finish(PngOptimizer::ID).await.unwrap();
        assert_eq!(report.final_size, 150);
        assert_eq!(std::fs::read(&output).unwrap(), std::fs::read(&small).unwrap());
    }

    #[tokio::test]
    async fn test_larger_pass_output_is_rejected() {
        let dir = TempDir::new().unwrap();
        let input = write_file(dir.path(), "in.png", 100);
        let big = write_file(dir.path(), "big.png", 300);
        let output = dir.path().join("out.png");

        let grow = format!("cp {} __OUTPUT__", big.display());
        let optimizer = PngOptimizer::with_commands([grow.as_str()]).unwrap();

        let mut ctx = RunContext::prepare(&input, &output, StopSignal::never()).await.unwrap();
        optimizer.squish(&mut ctx, &runner()).await.unwrap();
        let report = ctx.finish(PngOptimizer::ID).await.unwrap();

        assert_eq!(report.final_size, 100);
        assert_eq!(std::fs::read(&output).unwrap(), std::fs::read(&input).unwrap());
    }
}
