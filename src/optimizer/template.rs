//! # Command Templates
//!
//! Command templates with `__INPUT__` / `__OUTPUT__` placeholders.
//!
//! A template is written the way it would be typed in a shell
//! (`pngcrush -q "__INPUT__" "__OUTPUT__"`) but is never handed to a shell:
//! it is split once into an argument vector and the placeholders are
//! substituted inside each argument, so a path containing spaces or quotes
//! always stays a single argument.

use crate::error::OptimizeError;
use std::fmt;
use std::path::Path;

/// Marker replaced by the pass input path
pub const INPUT_PLACEHOLDER: &str = "__INPUT__";
/// Marker replaced by the pass output path
pub const OUTPUT_PLACEHOLDER: &str = "__OUTPUT__";

/// A parsed external command line with placeholders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    source: String,
    words: Vec<String>,
}

impl CommandTemplate {
    /// Parses a shell-quoted template.
    ///
    /// Templates without placeholders are accepted; a pass that needs an
    /// output file will simply fail to produce one later.
    pub fn parse(template: &str) -> Result<Self, OptimizeError> {
        let words = shlex::split(template)
            .filter(|words| !words.is_empty())
            .ok_or_else(|| OptimizeError::InvalidTemplate {
                template: template.to_string(),
            })?;

        Ok(Self {
            source: template.to_string(),
            words,
        })
    }

    /// Name of the executable (first word)
    pub fn program(&self) -> &str {
        &self.words[0]
    }

    /// Template text as written
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Builds the argument vector for one invocation
    pub fn resolve(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();

        self.words
            .iter()
            .map(|word| {
                word.replace(INPUT_PLACEHOLDER, &input)
                    .replace(OUTPUT_PLACEHOLDER, &output)
            })
            .collect()
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Parses a list of static templates
pub(crate) fn parse_all<'a, I>(templates: I) -> Result<Vec<CommandTemplate>, OptimizeError>
where
    I: IntoIterator<Item = &'a str>,
{
    templates.into_iter().map(CommandTemplate::parse).collect()
}
