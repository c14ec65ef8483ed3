//! Library manifest parsing and re-emission
//!
//! The manifest is the SOAPdenovo-style configuration file that every backend
//! is driven from: optional global `key=value` lines followed by `[LIB]`
//! sections. Backends that need their own input format (SPAdes datasets, MIRA
//! manifests) are rendered from the parsed [`LibraryManifest`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::core::PipelineError;

/// Most libraries MIRA accepts in one manifest
pub const MAX_LIBRARIES: usize = 7;

/// Read length used for gap closing when the manifest does not set `max_rd_len`
pub const DEFAULT_READ_LENGTH: u32 = 100;

const LIBRARY_MARKER: &str = "[LIB]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadFile {
    /// Manifest key, e.g. `q1`, `q2`, `f`
    pub key: String,
    pub path: PathBuf,
}

/// Relative orientation of paired reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadOrientation {
    /// `---> <---`
    Inward,
    /// `---> --->`
    Forward,
    /// `<--- <---`
    Reverse,
    /// `<--- --->`
    Outward,
}

impl ReadOrientation {
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        match normalized.as_str() {
            "---> <---" => Some(Self::Inward),
            "---> --->" => Some(Self::Forward),
            "<--- <---" => Some(Self::Reverse),
            "<--- --->" => Some(Self::Outward),
            _ => None,
        }
    }

    /// Arrow notation, as written in manifests and MIRA segment placements
    pub fn arrows(&self) -> &'static str {
        match self {
            Self::Inward => "---> <---",
            Self::Forward => "---> --->",
            Self::Reverse => "<--- <---",
            Self::Outward => "<--- --->",
        }
    }

    /// SPAdes dataset orientation code
    pub fn spades_code(&self) -> &'static str {
        match self {
            Self::Inward => "fr",
            Self::Forward | Self::Reverse => "ff",
            Self::Outward => "rf",
        }
    }
}

/// One `[LIB]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Library {
    /// 1-based position in the manifest
    pub index: usize,
    pub rank: Option<u32>,
    pub reads: Vec<ReadFile>,
    pub technology: Option<String>,
    pub orientation: Option<ReadOrientation>,
    pub avg_insert: Option<u32>,
    pub default_quality: Option<u32>,
    pub max_read_length: Option<u32>,
    /// Keys not interpreted here, kept for re-emission
    pub extra: Vec<(String, String)>,
}

impl Library {
    pub fn is_paired(&self) -> bool {
        self.reads.len() > 1
    }

    pub fn technology_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.technology.as_deref().unwrap_or(fallback)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LibraryManifest {
    /// Lines before the first `[LIB]` marker
    pub global: Vec<(String, String)>,
    pub libraries: Vec<Library>,
    /// Sections dropped because the manifest exceeded [`MAX_LIBRARIES`]
    pub dropped_libraries: usize,
}

impl LibraryManifest {
    /// Parse and resolve relative read paths against the manifest's directory
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read library manifest: {}", path.display()))?;

        let mut manifest = Self::parse(&text)
            .with_context(|| format!("Invalid library manifest: {}", path.display()))?;

        let base = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let base = fs::canonicalize(&base).unwrap_or(base);
        manifest.resolve_paths(&base);

        Ok(manifest)
    }

    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        let mut manifest = LibraryManifest::default();
        let mut sections_seen = 0usize;
        let mut current: Option<Library> = None;

        for (line_no, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if line.eq_ignore_ascii_case(LIBRARY_MARKER) {
                sections_seen += 1;
                if let Some(done) = current.take() {
                    manifest.libraries.push(done);
                }
                if sections_seen <= MAX_LIBRARIES {
                    current = Some(Library {
                        index: sections_seen,
                        ..Library::default()
                    });
                }
                continue;
            }

            let (key, value) = split_entry(line).ok_or_else(|| PipelineError::Manifest {
                line: line_no + 1,
                message: format!("expected key=value, found '{line}'"),
            })?;

            if sections_seen > MAX_LIBRARIES {
                continue;
            }

            match current.as_mut() {
                Some(library) => apply_library_entry(library, key, value, line_no + 1)?,
                None => manifest.global.push((key.to_string(), value.to_string())),
            }
        }

        if let Some(done) = current.take() {
            manifest.libraries.push(done);
        }

        if manifest.libraries.is_empty() {
            return Err(PipelineError::Manifest {
                line: 0,
                message: format!("no {LIBRARY_MARKER} sections found"),
            });
        }

        if sections_seen > MAX_LIBRARIES {
            manifest.dropped_libraries = sections_seen - MAX_LIBRARIES;
            warn!(
                "⚠️  Manifest has {} libraries; only the first {} will be used",
                sections_seen, MAX_LIBRARIES
            );
        }

        debug!(
            "Parsed manifest with {} libraries, {} global entries",
            manifest.libraries.len(),
            manifest.global.len()
        );

        Ok(manifest)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for read in self.libraries.iter_mut().flat_map(|lib| lib.reads.iter_mut()) {
            if read.path.is_relative() {
                read.path = base.join(&read.path);
            }
        }
    }

    /// Read length handed to gap closing
    pub fn read_length(&self) -> u32 {
        self.global
            .iter()
            .find(|(key, _)| key == "max_rd_len")
            .and_then(|(_, value)| value.parse().ok())
            .or_else(|| self.libraries.iter().find_map(|lib| lib.max_read_length))
            .unwrap_or(DEFAULT_READ_LENGTH)
    }

    pub fn read_files(&self) -> impl Iterator<Item = &Path> {
        self.libraries
            .iter()
            .flat_map(|lib| lib.reads.iter().map(|read| read.path.as_path()))
    }

    /// Render back to manifest text, with resolved read paths
    pub fn render(&self) -> String {
        let mut out = String::new();

        for (key, value) in &self.global {
            let _ = writeln!(out, "{key}={value}");
        }

        for library in &self.libraries {
            let _ = writeln!(out, "{LIBRARY_MARKER}");
            if let Some(rank) = library.rank {
                let _ = writeln!(out, "rank={rank}");
            }
            if let Some(avg_insert) = library.avg_insert {
                let _ = writeln!(out, "avg_ins={avg_insert}");
            }
            if let Some(technology) = &library.technology {
                let _ = writeln!(out, "technology={technology}");
            }
            if let Some(orientation) = library.orientation {
                let _ = writeln!(out, "orientation={}", orientation.arrows());
            }
            if let Some(quality) = library.default_quality {
                let _ = writeln!(out, "default_qual={quality}");
            }
            if let Some(max_len) = library.max_read_length {
                let _ = writeln!(out, "max_rd_len={max_len}");
            }
            for (key, value) in &library.extra {
                let _ = writeln!(out, "{key}={value}");
            }
            for read in &library.reads {
                let _ = writeln!(out, "{}={}", read.key, read.path.display());
            }
        }

        out
    }
}

fn split_entry(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, value.trim()))
}

fn parse_number(key: &str, value: &str, line: usize) -> Result<u32, PipelineError> {
    value.parse().map_err(|_| PipelineError::Manifest {
        line,
        message: format!("{key} must be a non-negative integer, found '{value}'"),
    })
}

fn apply_library_entry(
    library: &mut Library,
    key: &str,
    value: &str,
    line: usize,
) -> Result<(), PipelineError> {
    match key {
        "rank" => library.rank = Some(parse_number(key, value, line)?),
        "avg_ins" => library.avg_insert = Some(parse_number(key, value, line)?),
        "default_qual" => library.default_quality = Some(parse_number(key, value, line)?),
        "max_rd_len" => library.max_read_length = Some(parse_number(key, value, line)?),
        "technology" => library.technology = Some(value.to_string()),
        "orientation" => {
            let orientation =
                ReadOrientation::parse(value).ok_or_else(|| PipelineError::Manifest {
                    line,
                    message: format!("unknown orientation '{value}'"),
                })?;
            library.orientation = Some(orientation);
        }
        _ if key.starts_with('q') || key.starts_with('f') => library.reads.push(ReadFile {
            key: key.to_string(),
            path: PathBuf::from(value),
        }),
        _ => library.extra.push((key.to_string(), value.to_string())),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TWO_LIBRARIES: &str = "\
max_rd_len=150
[LIB]
avg_ins=300
reverse_seq=0
asm_flags=3
rank=1
orientation=---> <---
q1=reads_1.fastq
q2=reads_2.fastq
[LIB]
technology=pacbio
q=long.fastq
";

    #[test]
    fn test_parse_libraries() {
        let manifest = LibraryManifest::parse(TWO_LIBRARIES).unwrap();

        assert_eq!(manifest.libraries.len(), 2);
        assert_eq!(manifest.dropped_libraries, 0);
        assert_eq!(manifest.read_length(), 150);

        let paired = &manifest.libraries[0];
        assert_eq!(paired.index, 1);
        assert!(paired.is_paired());
        assert_eq!(paired.avg_insert, Some(300));
        assert_eq!(paired.orientation, Some(ReadOrientation::Inward));
        assert_eq!(paired.rank, Some(1));
        assert_eq!(paired.extra.len(), 2);

        let single = &manifest.libraries[1];
        assert!(!single.is_paired());
        assert_eq!(single.technology_or("solexa"), "pacbio");
    }

    #[test]
    fn test_more_than_seven_libraries_truncates() {
        let mut text = String::new();
        for i in 1..=9 {
            text.push_str(&format!("[LIB]\nq=lib{i}.fastq\n"));
        }

        let manifest = LibraryManifest::parse(&text).unwrap();
        assert_eq!(manifest.libraries.len(), MAX_LIBRARIES);
        assert_eq!(manifest.dropped_libraries, 2);
        assert_eq!(
            manifest.libraries.last().unwrap().reads[0].path,
            PathBuf::from("lib7.fastq")
        );
    }

    #[test]
    fn test_malformed_entries_rejected() {
        let err = LibraryManifest::parse("[LIB]\nq1 reads.fastq\n").unwrap_err();
        assert!(matches!(err, PipelineError::Manifest { line: 2, .. }));

        let err = LibraryManifest::parse("[LIB]\navg_ins=abc\n").unwrap_err();
        assert!(matches!(err, PipelineError::Manifest { line: 2, .. }));

        assert!(LibraryManifest::parse("max_rd_len=100\n").is_err());
    }

    #[test]
    fn test_default_read_length() {
        let manifest = LibraryManifest::parse("[LIB]\nq=reads.fastq\n").unwrap();
        assert_eq!(manifest.read_length(), DEFAULT_READ_LENGTH);
    }

    #[test]
    fn test_from_file_resolves_relative_reads() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("libraries.config");
        std::fs::write(&path, TWO_LIBRARIES).unwrap();

        let manifest = LibraryManifest::from_file(&path).unwrap();
        assert!(manifest.read_files().all(|p| p.is_absolute()));

        let rendered = manifest.render();
        let reparsed = LibraryManifest::parse(&rendered).unwrap();
        assert_eq!(reparsed.libraries, manifest.libraries);
        assert_eq!(reparsed.read_length(), 150);
    }
}
