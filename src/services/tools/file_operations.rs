//! `file_operations` tool: read / write UTF-8 text files inside allow-listed directories.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use super::ToolError;
use super::error::round2;
use crate::config::FilesConfig;

const MAX_PATH_LENGTH: usize = 4096;
const SUSPICIOUS_PATTERNS: &[&str] = &["~/", "..\\", "%2e%2e", "..%2f", "..%5c"];

#[derive(Debug, Deserialize)]
pub struct FileArgs {
    pub operation: String,
    pub filepath: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FileOperations {
    allowed_dirs: Vec<PathBuf>,
    max_file_size_bytes: u64,
    allowed_extensions: Vec<String>,
}

impl FileOperations {
    pub fn new(config: &FilesConfig) -> Self {
        Self {
            allowed_dirs: config.allowed_paths.clone(),
            max_file_size_bytes: config.max_file_size_bytes,
            allowed_extensions: config.allowed_extensions.clone(),
        }
    }

    pub async fn execute(&self, args: FileArgs) -> Result<Value, ToolError> {
        let operation = args.operation.trim().to_ascii_lowercase();
        if operation != "read" && operation != "write" {
            return Err(ToolError::InvalidParams {
                message: format!("Invalid operation: {}", args.operation),
                data: Some(json!({"valid_operations": ["read", "write"]})),
            });
        }

        let path = self.validate_path(&args.filepath).await?;
        self.validate_extension(&args.filepath)?;

        match (operation.as_str(), args.content) {
            ("read", _) => self.read(&path).await,
            (_, Some(content)) => self.write(&path, &content).await,
            (_, None) => Err(ToolError::InvalidParams {
                message: "Content is required for write operation".into(),
                data: Some(json!({"operation": "write", "filepath": args.filepath})),
            }),
        }
    }

    async fn validate_path(&self, filepath: &str) -> Result<PathBuf, ToolError> {
        let not_allowed = |reason: String| ToolError::PathNotAllowed {
            path: filepath.to_string(),
            reason,
            allowed: self
                .allowed_dirs
                .iter()
                .map(|d| d.display().to_string())
                .collect(),
        };

        if filepath.is_empty() {
            return Err(not_allowed("File path cannot be empty".into()));
        }
        if filepath.len() > MAX_PATH_LENGTH {
            return Err(not_allowed(format!(
                "File path too long ({} chars, max {MAX_PATH_LENGTH})",
                filepath.len()
            )));
        }
        if filepath.contains('\0') {
            return Err(not_allowed("File path contains null bytes".into()));
        }
        if filepath.contains("..") {
            return Err(not_allowed("Path traversal detected: '..' not allowed in path".into()));
        }
        let lowered = filepath.to_ascii_lowercase();
        if let Some(pattern) = SUSPICIOUS_PATTERNS.iter().find(|p| lowered.contains(*p)) {
            return Err(not_allowed(format!("Suspicious pattern detected in path: {pattern}")));
        }

        let resolved = resolve(Path::new(filepath))
            .await
            .map_err(|e| not_allowed(format!("Invalid file path: {e}")))?;

        for dir in &self.allowed_dirs {
            // allowed dirs may not exist yet; compare against whatever resolves
            let dir = resolve(dir).await.unwrap_or_else(|_| dir.clone());
            if resolved.starts_with(&dir) {
                return Ok(resolved);
            }
        }

        Err(not_allowed(format!(
            "Path '{filepath}' is not within allowed directories"
        )))
    }

    fn validate_extension(&self, filepath: &str) -> Result<(), ToolError> {
        let extension = Path::new(filepath)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
            .unwrap_or_default();

        if extension.is_empty() || !self.allowed_extensions.contains(&extension) {
            return Err(ToolError::InvalidExtension {
                extension,
                allowed: self.allowed_extensions.clone(),
            });
        }
        Ok(())
    }

    async fn read(&self, path: &Path) -> Result<Value, ToolError> {
        let shown = path.display().to_string();

        let metadata = tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => ToolError::FileNotFound(shown.clone()),
            _ => ToolError::PermissionDenied {
                path: shown.clone(),
                operation: "read",
            },
        })?;

        if !metadata.is_file() {
            return Err(ToolError::InvalidParams {
                message: format!("Path is not a file: {shown}"),
                data: Some(json!({"filepath": shown, "is_directory": metadata.is_dir()})),
            });
        }

        let size = metadata.len();
        if size > self.max_file_size_bytes {
            return Err(ToolError::FileTooLarge {
                size_bytes: size,
                max_bytes: self.max_file_size_bytes,
            });
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|_| ToolError::PermissionDenied {
                path: shown.clone(),
                operation: "read",
            })?;
        let content = String::from_utf8(bytes).map_err(|e| ToolError::InvalidParams {
            message: format!("File is not valid UTF-8: {shown}"),
            data: Some(json!({"filepath": shown, "error": e.to_string()})),
        })?;

        let modified_at = metadata
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339());

        tracing::info!(filepath = %shown, size_bytes = size, "file read");

        Ok(json!({
            "content": content,
            "metadata": {
                "filepath": shown,
                "size_bytes": size,
                "modified_at": modified_at,
                "encoding": "utf-8",
            }
        }))
    }

    async fn write(&self, path: &Path, content: &str) -> Result<Value, ToolError> {
        let shown = path.display().to_string();
        let size = content.len() as u64;

        if size > self.max_file_size_bytes {
            return Err(ToolError::FileTooLarge {
                size_bytes: size,
                max_bytes: self.max_file_size_bytes,
            });
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|_| ToolError::PermissionDenied {
                    path: parent.display().to_string(),
                    operation: "create directory",
                })?;
        }

        tokio::fs::write(path, content.as_bytes())
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::StorageFull => ToolError::DiskFull(format!("Unable to write file: {e}")),
                _ => ToolError::PermissionDenied {
                    path: shown.clone(),
                    operation: "write",
                },
            })?;

        tracing::info!(filepath = %shown, size_bytes = size, "file written");

        Ok(json!({
            "success": true,
            "filepath": shown,
            "bytes_written": size,
            "size_kb": round2(size as f64 / 1024.0),
        }))
    }
}

// Canonicalizes the longest existing prefix and re-appends the rest, so write
// targets that do not exist yet still resolve through symlinks.
async fn resolve(path: &Path) -> std::io::Result<PathBuf> {
    let mut existing = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let mut missing: Vec<OsString> = Vec::new();

    loop {
        match tokio::fs::canonicalize(&existing).await {
            Ok(mut resolved) => {
                for component in missing.iter().rev() {
                    resolved.push(component);
                }
                return Ok(resolved);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                match (existing.file_name(), existing.parent()) {
                    (Some(name), Some(parent)) => {
                        missing.push(name.to_os_string());
                        existing = parent.to_path_buf();
                    }
                    _ => return Err(e),
                }
            }
            Err(e) => return Err(e),
        }
    }
}
