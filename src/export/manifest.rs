use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::export::ExportConfig;

const BINARY_PROBE_BYTES: usize = 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportCounts {
    pub files: usize,
    pub bytes: u64,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub i: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub path: String,
    pub size: u64,
    pub sha256: String,
    pub lang: String,
    pub chunks: Vec<Chunk>,
}

impl FileRecord {
    /// Redacted file text, chunks joined back together.
    pub fn text(&self) -> String {
        self.chunks.iter().map(|c| c.text.as_str()).collect()
    }
}

/// Contents of `code-index.json`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub generated_at: DateTime<Utc>,
    pub root: String,
    pub counts: ExportCounts,
    pub config: ExportConfig,
    pub files: Vec<FileRecord>,
}

/// Any NUL byte in the first KiB marks a file as binary.
pub fn is_probably_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(BINARY_PROBE_BYTES).any(|b| *b == 0)
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

pub fn detect_language(path: &str) -> String {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let Some((_, ext)) = file_name.rsplit_once('.') else {
        return "text".to_string();
    };
    let ext = ext.to_ascii_lowercase();
    let lang = match ext.as_str() {
        "ts" => "typescript",
        "tsx" => "tsx",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "jsx",
        "css" => "css",
        "scss" => "scss",
        "sass" => "sass",
        "less" => "less",
        "html" => "html",
        "md" => "markdown",
        "json" => "json",
        "yml" | "yaml" => "yaml",
        "toml" => "toml",
        "sql" => "sql",
        "go" => "go",
        "rs" => "rust",
        "py" => "python",
        "java" => "java",
        "cs" => "csharp",
        "php" => "php",
        "rb" => "ruby",
        "kt" => "kotlin",
        "swift" => "swift",
        "cpp" => "cpp",
        "c" => "c",
        "" => "text",
        other => return other.to_string(),
    };
    lang.to_string()
}

pub fn redact(text: &str, patterns: &[Regex]) -> String {
    patterns.iter().fold(text.to_string(), |acc, re| {
        re.replace_all(&acc, "[REDACTED]").into_owned()
    })
}

/// Split into slices of at most `step` bytes, never inside a character.
/// A character wider than `step` gets a slice of its own.
pub fn split_chunks(text: &str, step: usize) -> Vec<&str> {
    let step = step.max(1);
    let mut out = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + step).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        if end == start {
            end = start + 1;
            while !text.is_char_boundary(end) {
                end += 1;
            }
        }
        out.push(&text[start..end]);
        start = end;
    }
    out
}

/// Build the manifest record for one readable, non-binary file.
pub fn build_record(
    path: String,
    bytes: &[u8],
    config: &ExportConfig,
    patterns: &[Regex],
) -> FileRecord {
    let content = String::from_utf8_lossy(bytes);
    let size = bytes.len() as u64;

    let chunks = if size <= config.max_preview_bytes {
        vec![Chunk {
            i: 0,
            text: redact(&content, patterns),
        }]
    } else {
        split_chunks(&content, config.chunk_bytes)
            .into_iter()
            .enumerate()
            .map(|(i, slice)| Chunk {
                i,
                text: redact(slice, patterns),
            })
            .collect()
    };

    FileRecord {
        sha256: sha256_hex(content.as_bytes()),
        lang: detect_language(&path),
        path,
        size,
        chunks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nul_in_probe_window_is_binary() {
        assert!(is_probably_binary(b"abc\0def"));
        assert!(!is_probably_binary(b"plain text"));
        let mut late = vec![b'a'; 2048];
        late[1500] = 0;
        assert!(!is_probably_binary(&late));
    }

    #[test]
    fn languages_by_extension() {
        assert_eq!(detect_language("src/App.TSX"), "tsx");
        assert_eq!(detect_language("scripts/run.mjs"), "javascript");
        assert_eq!(detect_language("Makefile"), "text");
        assert_eq!(detect_language("src/shader.glsl"), "glsl");
        assert_eq!(detect_language(".config/dir.d/file"), "text");
    }

    #[test]
    fn chunks_respect_char_boundaries() {
        let text = "aäöb";
        let chunks = split_chunks(text, 2);
        assert_eq!(chunks, vec!["a", "ä", "ö", "b"]);
        assert_eq!(chunks.concat(), text);
        assert_eq!(split_chunks("€", 1), vec!["€"]);
    }

    #[test]
    fn redaction_applies_every_pattern() {
        let patterns = vec![
            Regex::new(r"(?i)api_key=\w+").unwrap(),
            Regex::new(r"sk-[a-z0-9]+").unwrap(),
        ];
        assert_eq!(
            redact("API_KEY=abc token sk-12ab", &patterns),
            "[REDACTED] token [REDACTED]"
        );
    }

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn large_file_is_chunked() {
        let config = ExportConfig {
            max_preview_bytes: 4,
            chunk_bytes: 3,
            ..Default::default()
        };
        let record = build_record("src/a.rs".to_string(), b"abcdefgh", &config, &[]);
        assert_eq!(record.chunks.len(), 3);
        assert_eq!(record.chunks[2].i, 2);
        assert_eq!(record.text(), "abcdefgh");
        assert_eq!(record.lang, "rust");
    }
}
