//! # Tool Path Resolver
//!
//! This module finds the external optimization tools:
//! - A directory named by `SMUSH_TOOLS_DIR` (bundled tools, checked first)
//! - The system `PATH`
//!
//! Programs given with a path component (`./bin/pngcrush`) are used as-is.

use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable pointing at a directory of bundled tools
pub const TOOLS_DIR_ENV: &str = "SMUSH_TOOLS_DIR";

/// Tools the built-in optimizers invoke, grouped by format
pub const KNOWN_TOOLS: &[(&str, &[&str])] = &[
    ("PNG", &["pngnq", "pngcrush"]),
    ("JPEG", &["jpegtran"]),
];

/// Tool path resolver for bundled and system-installed tools
#[derive(Debug, Clone, Default)]
pub struct ToolPathResolver {
    /// Directory searched before `PATH`
    tools_dir: Option<PathBuf>,
}

impl ToolPathResolver {
    /// Create a resolver honouring `SMUSH_TOOLS_DIR`
    pub fn new() -> Self {
        let tools_dir = env::var_os(TOOLS_DIR_ENV)
            .map(PathBuf::from)
            .filter(|dir| dir.is_dir());

        if let Some(ref dir) = tools_dir {
            debug!("Using bundled tools directory: {:?}", dir);
        }

        Self { tools_dir }
    }

    /// Create a resolver with an explicit bundled tools directory
    pub fn with_tools_dir(tools_dir: impl Into<PathBuf>) -> Self {
        Self {
            tools_dir: Some(tools_dir.into()),
        }
    }

    /// Resolve the path to a specific tool
    pub fn resolve_tool(&self, tool_name: &str) -> Option<PathBuf> {
        let as_path = Path::new(tool_name);
        if as_path.components().count() > 1 {
            return as_path.is_file().then(|| as_path.to_path_buf());
        }

        if let Some(ref tools_dir) = self.tools_dir {
            let bundled_path = tools_dir.join(executable_name(tool_name));
            if bundled_path.is_file() {
                debug!("Using bundled tool: {} -> {:?}", tool_name, bundled_path);
                return Some(bundled_path);
            }
        }

        let found = self.find_in_system_path(tool_name);
        if let Some(ref path) = found {
            debug!("Using system tool: {} -> {:?}", tool_name, path);
        }
        found
    }

    /// Find tool in system PATH
    fn find_in_system_path(&self, tool_name: &str) -> Option<PathBuf> {
        let tool_with_ext = executable_name(tool_name);

        env::split_paths(&env::var_os("PATH")?)
            .map(|dir| dir.join(&tool_with_ext))
            .find(|path| path.is_file())
    }

    /// Check if a specific tool is available
    pub fn is_tool_available(&self, tool_name: &str) -> bool {
        self.resolve_tool(tool_name).is_some()
    }

    /// Get a report of tool availability
    pub fn get_tools_report(&self) -> String {
        let mut report = String::new();
        report.push_str("Tool Path Resolver Report\n");
        report.push_str(&format!("Bundled tools dir: {:?}\n", self.tools_dir));

        for (format, tools) in KNOWN_TOOLS {
            report.push_str(&format!("\n{}:\n", format));
            for tool in tools.iter() {
                match self.resolve_tool(tool) {
                    Some(path) => report.push_str(&format!("  ✅ {} -> {:?}\n", tool, path)),
                    None => report.push_str(&format!(
                        "  ❌ {} (install with: {})\n",
                        tool,
                        install_instructions(tool)
                    )),
                }
            }
        }

        report
    }
}

fn executable_name(tool_name: &str) -> String {
    if cfg!(windows) {
        format!("{}.exe", tool_name)
    } else {
        tool_name.to_string()
    }
}

/// Get installation instructions for a tool on Linux
fn install_instructions(tool_name: &str) -> String {
    match tool_name {
        "jpegtran" => "sudo apt-get install libjpeg-turbo-progs".to_string(),
        "pngcrush" => "sudo apt-get install pngcrush".to_string(),
        "pngnq" => "sudo apt-get install pngnq".to_string(),
        _ => format!("sudo apt-get install {}", tool_name),
    }
}
