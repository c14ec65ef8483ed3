use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// Core data structures for candidate assemblies and k-mer parameters

/// One candidate assembly outcome, as scored by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    /// Assembled sequence (may contain `N` gap bases)
    pub sequence: String,
    /// Fragments meeting minimal acceptance criteria, lower is better
    pub valid_contigs: u32,
    pub present_features: u32,
    pub important_features: u32,
    pub split_genes: u32,
    pub complete_genes: u32,
    pub trna_count: u32,
    pub is_circular: bool,
}

impl BuildResult {
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Bases that are not gaps (`N`/`n`)
    pub fn informative_bases(&self) -> usize {
        self.len() - count_gap_bases(&self.sequence)
    }

    pub fn has_all_important_features(&self) -> bool {
        self.present_features >= self.important_features
    }
}

pub fn count_gap_bases(sequence: &str) -> usize {
    sequence.bytes().filter(|b| matches!(b, b'N' | b'n')).count()
}

/// GC percentage over the full sequence length, as reported in the stats file
pub fn gc_content(sequence: &str) -> f64 {
    if sequence.is_empty() {
        return 0.0;
    }

    let gc = sequence
        .bytes()
        .filter(|b| matches!(b, b'G' | b'C' | b'g' | b'c' | b'S' | b's'))
        .count();

    (gc as f64 / sequence.len() as f64) * 100.0
}

/// A single k-mer parameter handed to an assembler backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum KmerValue {
    /// Let the backend choose its own k-mer
    Default,
    Value(u32),
}

impl KmerValue {
    pub fn as_explicit(&self) -> Option<u32> {
        match self {
            Self::Default => None,
            Self::Value(k) => Some(*k),
        }
    }

    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

impl fmt::Display for KmerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Value(k) => write!(f, "{k}"),
        }
    }
}

impl FromStr for KmerValue {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("default") {
            return Ok(Self::Default);
        }

        let k: u32 = trimmed
            .parse()
            .map_err(|_| anyhow!("Invalid k-mer value: '{trimmed}'"))?;
        if k == 0 {
            return Err(anyhow!("K-mer value must be greater than 0"));
        }
        Ok(Self::Value(k))
    }
}

impl From<KmerValue> for String {
    fn from(value: KmerValue) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for KmerValue {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Ordered k-mer candidates. Order is both evaluation order and tie-break order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KmerParameterList {
    values: Vec<KmerValue>,
}

impl KmerParameterList {
    /// Build the list for a backend.
    ///
    /// Backends with an auto-k mode get `Default` prepended unless the caller
    /// already asked for it. Backends without one never see the sentinel.
    pub fn for_backend(requested: &[KmerValue], supports_default: bool) -> Result<Self> {
        let mut values = Vec::with_capacity(requested.len() + 1);

        if supports_default {
            if !requested.contains(&KmerValue::Default) {
                values.push(KmerValue::Default);
            }
            values.extend(requested.iter().copied());
        } else {
            values.extend(requested.iter().copied().filter(|k| !k.is_default()));
        }

        if values.is_empty() {
            return Err(anyhow!("No usable k-mer values were supplied"));
        }

        Ok(Self { values })
    }

    /// Parse a comma separated list such as `23,31,default`
    pub fn parse_requested(raw: &str) -> Result<Vec<KmerValue>> {
        raw.split(',')
            .filter(|part| !part.trim().is_empty())
            .map(KmerValue::from_str)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KmerValue> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[KmerValue] {
        &self.values
    }
}

/// Acceptable target length range plus the optimum the validator aims for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeWindow {
    pub min: u64,
    pub max: u64,
    pub optimum: u64,
}

/// Where, if anywhere, the sequence closes on itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircularizationVerdict {
    pub is_circular: bool,
    pub start: usize,
    pub end: usize,
}

impl CircularizationVerdict {
    pub fn not_circular() -> Self {
        Self {
            is_circular: false,
            start: 0,
            end: 0,
        }
    }
}
