// External tool detection for the yt-dlp adapter

use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};

/// Environment override for the yt-dlp binary
pub const YTDLP_ENV: &str = "LCTC_YTDLP";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub version: Option<String>,
    pub path: Option<String>,
    pub is_available: bool,
}

pub struct ToolManager {
    binary_name: String,
    env_override: Option<&'static str>,
}

impl ToolManager {
    pub fn new() -> Self {
        Self {
            binary_name: "yt-dlp".to_string(),
            env_override: Some(YTDLP_ENV),
        }
    }

    pub fn for_binary(binary_name: impl Into<String>) -> Self {
        Self {
            binary_name: binary_name.into(),
            env_override: None,
        }
    }

    pub fn get_tool_info(&self) -> ToolInfo {
        let path = self.locate();
        let version = path.as_deref().and_then(|p| self.get_version(p));

        ToolInfo {
            name: self.binary_name.clone(),
            is_available: version.is_some(),
            version,
            path,
        }
    }

    /// Resolve the binary: env override, common install paths, then PATH
    pub fn locate(&self) -> Option<String> {
        if let Some(path) = self.env_override.and_then(|key| std::env::var(key).ok()) {
            let path = path.trim();
            if !path.is_empty() {
                return Some(path.to_string());
            }
        }

        let common_paths = [
            format!("/opt/homebrew/bin/{}", self.binary_name), // Homebrew on Apple Silicon
            format!("/usr/local/bin/{}", self.binary_name),    // Homebrew on Intel Mac
            format!("/usr/bin/{}", self.binary_name),          // System installation
        ];

        for path in common_paths {
            if Path::new(&path).exists() {
                return Some(path);
            }
        }

        if let Ok(output) = Command::new("which").arg(&self.binary_name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(path);
                }
            }
        }

        None
    }

    fn get_version(&self, path: &str) -> Option<String> {
        match Command::new(path).arg("--version").output() {
            Ok(output) if output.status.success() => {
                Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
            }
            _ => None,
        }
    }
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new()
    }
}
