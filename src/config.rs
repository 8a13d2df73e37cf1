//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'ottimizzatore.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con le opzioni riconosciute
//! - Fornisce validazione dei parametri
//! - Supporta caricamento/salvataggio da/verso file JSON
//! - Applica override da variabili d'ambiente con prefisso `OPTIMIZE_`
//!
//! ## Parametri di configurazione:
//! - `default_dest`: Directory di destinazione relativa all'input (default: "min")
//! - `image_extensions`: Estensioni usate per il pre-filtro dei file (default: jpg, jpeg, png, gif)
//! - `strip_meta`: Rimuove i metadata JPEG (default: true)
//! - `quiet`: Esegue pngcrush in modalità silenziosa (default: true)
//! - `pass_timeout_secs`: Timeout per ogni pass esterno (default: 180)
//! - `workers`: Numero di richieste parallele in modalità batch (default: 4)
//! - `optimizers`: Override per formato nella forma `key[:arg]` (default: nessuno)
//!
//! ## Esempio:
//! ```rust,ignore
//! let mut config = Config::from_file(&path).await?;
//! config.apply_env_overrides()?;
//! config.validate()?;
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

/// Prefix of the environment variables that override file configuration
pub const ENV_PREFIX: &str = "OPTIMIZE_";

/// Configuration for image optimization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Destination directory, relative to the input's directory, used when
    /// no explicit output path is given
    pub default_dest: String,
    /// Extensions used to pre-filter candidate files (not for format detection)
    pub image_extensions: BTreeSet<String>,
    /// Strip all JPEG metadata instead of preserving it
    pub strip_meta: bool,
    /// Run pngcrush quietly
    pub quiet: bool,
    /// Upper bound for a single external pass, in seconds
    pub pass_timeout_secs: u64,
    /// Number of files optimized in parallel in batch mode
    pub workers: usize,
    /// Optimizer overrides such as `PNG:verbose`, resolved at startup
    pub optimizers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_dest: "min".to_string(),
            image_extensions: ["jpg", "jpeg", "png", "gif"]
                .into_iter()
                .map(String::from)
                .collect(),
            strip_meta: true,
            quiet: true,
            pass_timeout_secs: 180,
            workers: 4,
            optimizers: Vec::new(),
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.default_dest.trim().is_empty() {
            return Err(anyhow::anyhow!("Default destination must not be empty"));
        }

        if self.image_extensions.is_empty() {
            return Err(anyhow::anyhow!("At least one image extension is required"));
        }

        if self.pass_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Pass timeout must be greater than 0"));
        }

        if self.workers == 0 {
            return Err(anyhow::anyhow!("Number of workers must be greater than 0"));
        }

        Ok(())
    }

    /// Per-pass timeout as a `Duration`
    pub fn pass_timeout(&self) -> Duration {
        Duration::from_secs(self.pass_timeout_secs)
    }

    /// Whether `ext` (without the dot) is one of the configured extensions
    pub fn accepts_extension(&self, ext: &str) -> bool {
        let ext_lower = ext.to_lowercase();
        self.image_extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext_lower))
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid configuration file {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    /// Apply `OPTIMIZE_DEFAULT_DEST`, `OPTIMIZE_IMAGE_EXTENSIONS` and
    /// `OPTIMIZE_STRIP_META` from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(format!("{}{}", ENV_PREFIX, key)).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dest) = lookup("DEFAULT_DEST") {
            self.default_dest = dest;
        }

        if let Some(extensions) = lookup("IMAGE_EXTENSIONS") {
            self.image_extensions = extensions
                .split(',')
                .map(|e| e.trim().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect();
        }

        if let Some(strip) = lookup("STRIP_META") {
            self.strip_meta = parse_bool(&strip).ok_or_else(|| {
                anyhow::anyhow!("{}STRIP_META must be a boolean, got {:?}", ENV_PREFIX, strip)
            })?;
        }

        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.workers = 0;
        assert!(config.validate().is_err());

        config.workers = 4;
        config.pass_timeout_secs = 0;
        assert!(config.validate().is_err());

        config.pass_timeout_secs = 30;
        config.default_dest = "  ".to_string();
        assert!(config.validate().is_err());

        config.default_dest = "min".to_string();
        config.image_extensions.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.default_dest, "min");
        assert!(config.strip_meta);
        assert!(config.quiet);
        assert_eq!(config.pass_timeout_secs, 180);
        assert_eq!(config.workers, 4);
        for ext in ["jpg", "jpeg", "png", "gif"] {
            assert!(config.image_extensions.contains(ext));
        }
        assert_eq!(config.image_extensions.len(), 4);
        assert!(config.optimizers.is_empty());
    }

    #[test]
    fn test_accepts_extension_case_insensitive() {
        let config = Config::default();
        assert!(config.accepts_extension("PNG"));
        assert!(config.accepts_extension("jpeg"));
        assert!(!config.accepts_extension("bmp"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("DEFAULT_DEST", "optimized"),
            ("IMAGE_EXTENSIONS", "png, .JPG ,,webp"),
            ("STRIP_META", "no"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.default_dest, "optimized");
        assert!(!config.strip_meta);
        assert_eq!(
            config.image_extensions.iter().cloned().collect::<Vec<_>>(),
            vec!["jpg".to_string(), "png".to_string(), "webp".to_string()]
        );
    }

    #[test]
    fn test_env_override_rejects_bad_bool() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| (key == "STRIP_META").then(|| "maybe".to_string()));
        assert!(result.is_err());
        assert!(config.strip_meta);
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let original_config = Config {
            default_dest: "out".to_string(),
            strip_meta: false,
            quiet: false,
            pass_timeout_secs: 60,
            workers: 8,
            optimizers: vec!["PNG:verbose".to_string()],
            ..Default::default()
        };

        original_config.save_to_file(&config_path).await.unwrap();
        let loaded_config = Config::from_file(&config_path).await.unwrap();

        assert_eq!(loaded_config.default_dest, "out");
        assert!(!loaded_config.strip_meta);
        assert!(!loaded_config.quiet);
        assert_eq!(loaded_config.pass_timeout_secs, 60);
        assert_eq!(loaded_config.workers, 8);
        assert_eq!(loaded_config.optimizers, vec!["PNG:verbose".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::from_file(&temp_dir.path().join("absent.json")).await.unwrap();
        assert_eq!(config.default_dest, "min");
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");
        tokio::fs::write(&config_path, r#"{ "strip_meta": false }"#).await.unwrap();

        let config = Config::from_file(&config_path).await.unwrap();
        assert!(!config.strip_meta);
        assert_eq!(config.workers, 4);
    }
}
