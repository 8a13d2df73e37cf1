//! # Optimizer Registry
//!
//! Optimizer registry: maps format identifiers to optimizer factories and
//! resolves configuration values to optimizers.
//!
//! The built-in table is created once, on first use, and is read-only
//! afterwards; it can be shared freely between concurrent requests.

use super::{Optimizer, OptimizerKind};
use crate::config::Config;
use crate::error::OptimizeError;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Builds an optimizer from configuration and an optional argument
pub type Factory = fn(&Config, Option<&str>) -> Result<Optimizer, OptimizeError>;

/// A configuration value naming an optimizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizerSpec {
    /// An already-built optimizer, returned as-is
    Instance(Optimizer),
    /// A variant, built through its factory
    Kind(OptimizerKind),
    /// `key` or `key:argument`, looked up in the registry
    Key(String),
}

impl From<Optimizer> for OptimizerSpec {
    fn from(optimizer: Optimizer) -> Self {
        Self::Instance(optimizer)
    }
}

impl From<OptimizerKind> for OptimizerSpec {
    fn from(kind: OptimizerKind) -> Self {
        Self::Kind(kind)
    }
}

impl From<&str> for OptimizerSpec {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for OptimizerSpec {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

/// Format id → optimizer factory
#[derive(Clone)]
pub struct Registry {
    factories: HashMap<String, Factory>,
    allow_none: bool,
    purpose: String,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("formats", &self.format_ids())
            .field("allow_none", &self.allow_none)
            .field("purpose", &self.purpose)
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new("an optimizer implementation")
    }
}

impl Registry {
    /// An empty registry. `purpose` describes what values resolve to, for
    /// error messages.
    pub fn new(purpose: impl Into<String>) -> Self {
        Self {
            factories: HashMap::new(),
            allow_none: true,
            purpose: purpose.into(),
        }
    }

    /// Whether resolving an empty value yields `None` rather than an error
    pub fn allow_none(mut self, allow_none: bool) -> Self {
        self.allow_none = allow_none;
        self
    }

    /// A registry holding every built-in variant, plus `JPG` as an alias of `JPEG`
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        let builtins: [(&str, Factory); 3] = [
            (OptimizerKind::Png.format_id(), |config, arg| OptimizerKind::Png.make(config, arg)),
            (OptimizerKind::Jpeg.format_id(), |config, arg| OptimizerKind::Jpeg.make(config, arg)),
            ("JPG", |config, arg| OptimizerKind::Jpeg.make(config, arg)),
        ];
        for (format_id, factory) in builtins {
            registry.factories.insert(normalize(format_id), factory);
        }
        registry
    }

    /// The shared built-in registry
    pub fn builtin() -> Arc<Registry> {
        static INSTANCE: OnceLock<Arc<Registry>> = OnceLock::new();
        INSTANCE.get_or_init(|| Arc::new(Self::with_builtins())).clone()
    }

    /// Adds a factory under `format_id`; ids are unique (case-insensitive)
    pub fn register(&mut self, format_id: &str, factory: Factory) -> Result<(), OptimizeError> {
        let key = normalize(format_id);
        if key.is_empty() {
            return Err(OptimizeError::Validation("format id must not be empty".to_string()));
        }
        if self.factories.contains_key(&key) {
            return Err(OptimizeError::DuplicateOptimizer { format: key });
        }
        debug!("Registered optimizer for {}", key);
        self.factories.insert(key, factory);
        Ok(())
    }

    pub fn contains(&self, format_id: &str) -> bool {
        self.factories.contains_key(&normalize(format_id))
    }

    /// Registered ids, sorted
    pub fn format_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Builds the optimizer for a detected format
    pub fn lookup(&self, format_id: &str, config: &Config) -> Result<Optimizer, OptimizeError> {
        let factory = self
            .factories
            .get(&normalize(format_id))
            .ok_or_else(|| OptimizeError::OptimizerNotFound {
                format: format_id.to_string(),
            })?;
        factory(config, None)
    }

    /// Resolves a configuration value to an optimizer.
    ///
    /// Instances are returned unchanged, kinds are built through their
    /// factory, and strings are split on the first `:` into a registry key
    /// and an argument passed to the factory. Empty values give `Ok(None)`
    /// when the registry allows it.
    pub fn resolve(
        &self,
        spec: Option<OptimizerSpec>,
        config: &Config,
    ) -> Result<Option<Optimizer>, OptimizeError> {
        let spec = match spec {
            Some(OptimizerSpec::Key(ref key)) if key.trim().is_empty() => None,
            other => other,
        };

        let Some(spec) = spec else {
            return if self.allow_none {
                Ok(None)
            } else {
                Err(self.unresolvable(""))
            };
        };

        match spec {
            OptimizerSpec::Instance(optimizer) => Ok(Some(optimizer)),
            OptimizerSpec::Kind(kind) => kind.make(config, None).map(Some),
            OptimizerSpec::Key(value) => {
                let (key, arg) = match value.split_once(':') {
                    Some((key, arg)) => (key, Some(arg).filter(|a| !a.is_empty())),
                    None => (value.as_str(), None),
                };
                let factory = self
                    .factories
                    .get(&normalize(key))
                    .ok_or_else(|| self.unresolvable(&value))?;
                factory(config, arg).map(Some)
            }
        }
    }

    fn unresolvable(&self, value: &str) -> OptimizeError {
        OptimizeError::OptimizerResolution {
            value: value.to_string(),
            purpose: self.purpose.clone(),
        }
    }
}

fn normalize(format_id: &str) -> String {
    format_id.trim().to_ascii_uppercase()
}
