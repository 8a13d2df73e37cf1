//! # File Management Module
//!
//! Questo modulo gestisce le operazioni sui file e la discovery delle immagini.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva di immagini in directory (pre-filtro per estensione)
//! - Calcolo del path di destinazione (`DEFAULT_DEST` o directory di output)
//! - Prefisso comune di più path, per riprodurre la struttura delle directory
//! - Utilità per dimensioni e percentuali
//!
//! Il pre-filtro per estensione serve solo a scegliere i candidati: il
//! formato reale viene sempre rilevato dal contenuto (`image_format`).
//!
//! ## Esempio:
//! ```rust,ignore
//! let files = FileManager::find_image_files(Path::new("/photos"), &config);
//! let output = FileManager::default_output_path(&files[0], &config.default_dest)?;
//! ```

use crate::config::Config;
use anyhow::Result;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Find all candidate image files in a directory
    pub fn find_image_files(dir: &Path, config: &Config) -> Vec<PathBuf> {
        let dest = config.default_dest.as_str();
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            // Skip previous results stored in the default destination
            .filter_entry(|e| e.depth() == 0 || !(e.file_type().is_dir() && e.file_name() == dest))
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|path| Self::has_image_extension(path, config))
            .collect();

        files.sort();
        files
    }

    /// Check if a file has one of the configured image extensions
    pub fn has_image_extension(path: &Path, config: &Config) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| config.accepts_extension(ext))
            .unwrap_or(false)
    }

    /// `<input dir>/<dest>/<file name>`
    pub fn default_output_path(input: &Path, dest: &str) -> Result<PathBuf> {
        let file_name = input
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", input.display()))?;
        let parent = input.parent().unwrap_or(Path::new(""));
        Ok(parent.join(dest).join(file_name))
    }

    /// Output path under `output_dir` preserving the layout below `base`
    pub fn mirrored_output_path(input: &Path, base: &Path, output_dir: &Path) -> Result<PathBuf> {
        let relative = input.strip_prefix(base).unwrap_or_else(|_| {
            input
                .file_name()
                .map(Path::new)
                .unwrap_or(input)
        });
        if relative.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Invalid file name: {}", input.display()));
        }
        Ok(output_dir.join(relative))
    }

    /// Longest shared directory prefix, compared component by component
    /// (so `/a/bc` and `/a/bd` share `/a`, not `/a/b`)
    pub fn common_path_prefix<P: AsRef<Path>>(paths: &[P]) -> PathBuf {
        let mut iter = paths.iter();
        let Some(first) = iter.next() else {
            return PathBuf::new();
        };

        let mut prefix: Vec<Component> = first.as_ref().components().collect();
        for path in iter {
            let shared = prefix
                .iter()
                .zip(path.as_ref().components())
                .take_while(|(a, b)| *a == b)
                .count();
            prefix.truncate(shared);
        }

        prefix.iter().collect()
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
