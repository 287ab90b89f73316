//! `fileops`: read, write, list, stat and existence checks.

use crate::args::{optional_bool, optional_str, required_str, schema_object};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::fs::Metadata;
use std::io;
use std::path::{Component, Path, PathBuf};
use tokio_util::sync::CancellationToken;
use zephyr_core::{Arguments, Error, JsonObject, Result, ToolOutput};
use zephyr_plugin::DynamicPlugin;

/// Largest file `read` or `write` will handle, in bytes.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Supported operations.
pub const OPERATIONS: &[&str] = &["read", "write", "list", "stat", "exists"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Utf8,
    Base64,
}

impl Encoding {
    fn parse(args: &Arguments) -> Result<Self> {
        match optional_str(args, "encoding")?.unwrap_or("utf8") {
            "utf8" | "utf-8" => Ok(Self::Utf8),
            "base64" => Ok(Self::Base64),
            other => Err(Error::InvalidArgument(format!(
                "unsupported encoding: {other} (expected utf8 or base64)"
            ))),
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Utf8 => "utf8",
            Self::Base64 => "base64",
        }
    }
}

/// File system operations relative to the working directory.
#[derive(Debug, Clone)]
pub struct FileOps {
    max_size: u64,
}

impl Default for FileOps {
    fn default() -> Self {
        Self {
            max_size: MAX_FILE_SIZE,
        }
    }
}

impl FileOps {
    /// Tool name.
    pub const NAME: &'static str = "fileops";

    /// Overrides the size cap.
    #[must_use]
    pub const fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Runs one operation.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] for a missing or malformed argument,
    ///   a path with `..` components, or a file over the size cap
    /// - [`Error::Io`] when the file system operation fails
    pub async fn run(&self, args: &Arguments) -> Result<Value> {
        let operation = required_str(args, "operation")?;
        let path = resolve(required_str(args, "path")?)?;

        match operation {
            "read" => self.read(&path, Encoding::parse(args)?).await,
            "write" => self.write(&path, args).await,
            "list" => list(&path).await,
            "stat" => stat(&path).await,
            "exists" => Ok(exists(&path).await),
            other => Err(Error::InvalidArgument(format!(
                "unsupported operation: {other} (expected one of: {})",
                OPERATIONS.join(", ")
            ))),
        }
    }

    async fn read(&self, path: &Path, encoding: Encoding) -> Result<Value> {
        let meta = metadata(path).await?;
        if meta.is_dir() {
            return Err(Error::InvalidArgument(format!(
                "path is a directory, not a file: {}",
                path.display()
            )));
        }
        self.check_size(meta.len())?;

        let data = tokio::fs::read(path)
            .await
            .map_err(|source| io_error("reading", path, source))?;
        let content = match encoding {
            Encoding::Utf8 => String::from_utf8(data).map_err(|_| {
                Error::InvalidArgument(format!(
                    "{} is not valid UTF-8; read it with encoding base64",
                    path.display()
                ))
            })?,
            Encoding::Base64 => BASE64.encode(data),
        };

        Ok(json!({
            "operation": "read",
            "path": path.display().to_string(),
            "size": meta.len(),
            "encoding": encoding.as_str(),
            "content": content,
        }))
    }

    async fn write(&self, path: &Path, args: &Arguments) -> Result<Value> {
        let content = optional_str(args, "content")?.ok_or_else(|| {
            Error::InvalidArgument("'content' is required for write".to_string())
        })?;
        let encoding = Encoding::parse(args)?;
        let create_dirs = optional_bool(args, "create_dirs")?.unwrap_or(false);

        let data = match encoding {
            Encoding::Utf8 => content.as_bytes().to_vec(),
            Encoding::Base64 => BASE64
                .decode(content)
                .map_err(|e| Error::InvalidArgument(format!("invalid base64 content: {e}")))?,
        };
        self.check_size(data.len() as u64)?;

        if create_dirs && let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_error("creating directories for", path, source))?;
        }
        tokio::fs::write(path, &data)
            .await
            .map_err(|source| io_error("writing", path, source))?;

        Ok(json!({
            "operation": "write",
            "path": path.display().to_string(),
            "size": data.len(),
            "encoding": encoding.as_str(),
            "create_dirs": create_dirs,
        }))
    }

    fn check_size(&self, size: u64) -> Result<()> {
        if size > self.max_size {
            return Err(Error::InvalidArgument(format!(
                "file too large: {size} bytes (max: {} bytes)",
                self.max_size
            )));
        }
        Ok(())
    }
}

async fn list(path: &Path) -> Result<Value> {
    let meta = metadata(path).await?;
    if !meta.is_dir() {
        return Err(Error::InvalidArgument(format!(
            "path is not a directory: {}",
            path.display()
        )));
    }

    let mut reader = tokio::fs::read_dir(path)
        .await
        .map_err(|source| io_error("listing", path, source))?;
    let mut files = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|source| io_error("listing", path, source))?
    {
        // Entries that vanish between listing and stat are skipped.
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        files.push(json!({
            "name": entry.file_name().to_string_lossy(),
            "type": kind(&meta),
            "size": meta.len(),
            "modified": modified(&meta),
        }));
    }
    files.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

    Ok(json!({
        "operation": "list",
        "path": path.display().to_string(),
        "count": files.len(),
        "files": files,
    }))
}

async fn stat(path: &Path) -> Result<Value> {
    let meta = metadata(path).await?;
    Ok(json!({
        "operation": "stat",
        "path": path.display().to_string(),
        "type": kind(&meta),
        "size": meta.len(),
        "readonly": meta.permissions().readonly(),
        "modified": modified(&meta),
    }))
}

async fn exists(path: &Path) -> Value {
    let meta = tokio::fs::metadata(path).await.ok();
    json!({
        "operation": "exists",
        "path": path.display().to_string(),
        "exists": meta.is_some(),
        "type": meta.as_ref().map(kind),
    })
}

/// Rejects `..` components and anchors relative paths at the working directory.
fn resolve(raw: &str) -> Result<PathBuf> {
    if raw.trim().is_empty() {
        return Err(Error::InvalidArgument("'path' must not be empty".to_string()));
    }
    let path = Path::new(raw);
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(Error::InvalidArgument(format!(
            "directory traversal not allowed: {raw}"
        )));
    }
    std::path::absolute(path).map_err(|source| io_error("resolving", path, source))
}

async fn metadata(path: &Path) -> Result<Metadata> {
    tokio::fs::metadata(path).await.map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            Error::InvalidArgument(format!("not found: {}", path.display()))
        } else {
            io_error("inspecting", path, source)
        }
    })
}

fn kind(meta: &Metadata) -> &'static str {
    if meta.is_dir() {
        "directory"
    } else if meta.is_symlink() {
        "symlink"
    } else {
        "file"
    }
}

fn modified(meta: &Metadata) -> Option<String> {
    meta.modified()
        .ok()
        .map(|time| DateTime::<Utc>::from(time).to_rfc3339())
}

fn io_error(action: &str, path: &Path, source: io::Error) -> Error {
    Error::Io {
        context: format!("{action} {}", path.display()),
        source,
    }
}

#[async_trait]
impl DynamicPlugin for FileOps {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "File system operations: read, write, list, stat, exists"
    }

    fn input_schema(&self) -> JsonObject {
        schema_object(json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "description": "One of read, write, list, stat, exists",
                    "enum": OPERATIONS,
                },
                "path": {
                    "type": "string",
                    "description": "File or directory path",
                },
                "content": {
                    "type": "string",
                    "description": "Content to write",
                },
                "encoding": {
                    "type": "string",
                    "description": "utf8 or base64",
                    "default": "utf8",
                },
                "create_dirs": {
                    "type": "boolean",
                    "description": "Create missing parent directories on write",
                    "default": false,
                },
            },
            "required": ["operation", "path"],
        }))
    }

    async fn execute(&self, _ct: CancellationToken, args: Arguments) -> Result<ToolOutput> {
        self.run(&args).await.map(ToolOutput::structured)
    }
}
