//! Source snapshot export: walks a project tree and writes a JSON index of
//! every text file (hash, language, redacted content) plus one plain dump per
//! file, for sharing code with external reviewers.

pub mod manifest;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RosterError};

pub use manifest::{ExportCounts, FileRecord, Manifest};

pub const INDEX_FILE: &str = "code-index.json";
pub const DEFAULT_CONFIG_FILE: &str = "code-export.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExportConfig {
    /// Globs relative to the root. Empty means `src/**/*`.
    ///
    /// Globs follow gitignore rules: a pattern without a slash, such as
    /// `*.ts`, matches at any depth. Anchor it with a leading slash
    /// (`/*.ts`) to match only files directly under the root.
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Files larger than this are skipped
    pub max_file_bytes: Option<u64>,
    /// Files up to this size are exported as a single chunk
    pub max_preview_bytes: u64,
    pub chunk_bytes: usize,
    /// Regexes whose matches are replaced by `[REDACTED]`
    pub redact: Vec<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            include: vec!["src/**/*".to_string()],
            exclude: Vec::new(),
            max_file_bytes: None,
            max_preview_bytes: 250_000,
            chunk_bytes: 64_000,
            redact: Vec::new(),
        }
    }
}

impl ExportConfig {
    /// Read an explicit config file, or `<root>/code-export.json` when present,
    /// or fall back to defaults.
    pub fn load(root: &Path, path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let candidate = root.join(DEFAULT_CONFIG_FILE);
                if !candidate.exists() {
                    return Ok(Self::default());
                }
                candidate
            }
        };
        let text = fs::read_to_string(&path).map_err(|e| {
            RosterError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| RosterError::Config(format!("invalid {}: {}", path.display(), e)))
    }

    fn include_globs(&self) -> Vec<String> {
        if self.include.is_empty() {
            Self::default().include
        } else {
            self.include.clone()
        }
    }

    pub fn compile_redactions(&self) -> Result<Vec<Regex>> {
        self.redact
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| RosterError::Config(format!("invalid redact pattern {:?}: {}", p, e)))
            })
            .collect()
    }
}

/// Path relative to `root` with forward slashes.
fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Walk `root` and build the manifest without writing anything.
pub fn collect(root: &Path, config: &ExportConfig, skip_dir: Option<&Path>) -> Result<Manifest> {
    let patterns = config.compile_redactions()?;

    let mut overrides = OverrideBuilder::new(root);
    for glob in config.include_globs() {
        overrides
            .add(&glob)
            .map_err(|e| RosterError::Config(format!("invalid include glob {:?}: {}", glob, e)))?;
    }
    for glob in &config.exclude {
        overrides
            .add(&format!("!{}", glob))
            .map_err(|e| RosterError::Config(format!("invalid exclude glob {:?}: {}", glob, e)))?;
    }
    let overrides = overrides
        .build()
        .map_err(|e| RosterError::Config(e.to_string()))?;

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(true)
        .follow_links(false)
        .overrides(overrides)
        .sort_by_file_path(|a, b| a.cmp(b))
        .build();

    let mut counts = ExportCounts::default();
    let mut files = Vec::new();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable entry");
                counts.skipped += 1;
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let path = entry.path();
        if skip_dir.is_some_and(|dir| path.starts_with(dir)) {
            continue;
        }
        let Some(rel) = relative_path(root, path) else {
            continue;
        };

        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %rel, error = %e, "Skipping unreadable file");
                counts.skipped += 1;
                continue;
            }
        };
        if config
            .max_file_bytes
            .is_some_and(|max| bytes.len() as u64 > max)
        {
            tracing::debug!(path = %rel, size = bytes.len(), "Skipping oversized file");
            counts.skipped += 1;
            continue;
        }
        if manifest::is_probably_binary(&bytes) {
            tracing::debug!(path = %rel, "Skipping binary file");
            counts.skipped += 1;
            continue;
        }

        let record = manifest::build_record(rel, &bytes, config, &patterns);
        counts.files += 1;
        counts.bytes += record.size;
        files.push(record);
    }

    let root_name = root
        .canonicalize()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .unwrap_or_else(|| root.display().to_string());

    Ok(Manifest {
        generated_at: Utc::now(),
        root: root_name,
        counts,
        config: config.clone(),
        files,
    })
}

/// Export `root` into `out`: `code-index.json` plus `files/<path>` dumps.
pub fn run(root: &Path, config: &ExportConfig, out: &Path) -> Result<Manifest> {
    let skip_dir = out.canonicalize().ok().filter(|o| {
        root.canonicalize()
            .map(|r| o.starts_with(r))
            .unwrap_or(false)
    });
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let manifest = collect(&root, config, skip_dir.as_deref())?;

    fs::create_dir_all(out)?;
    let index_path = out.join(INDEX_FILE);
    fs::write(&index_path, serde_json::to_string_pretty(&manifest)?)?;
    tracing::info!(
        files = manifest.counts.files,
        bytes = manifest.counts.bytes,
        skipped = manifest.counts.skipped,
        path = %index_path.display(),
        "Wrote export index"
    );

    let dump_root = out.join("files");
    for file in &manifest.files {
        let dest: PathBuf = file.path.split('/').fold(dump_root.clone(), |p, part| p.join(part));
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, file.text())?;
    }
    tracing::info!(files = manifest.files.len(), dir = %dump_root.display(), "Wrote per-file dumps");

    Ok(manifest)
}
