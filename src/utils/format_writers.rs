//! Sequence and report file readers/writers used between pipeline stages

use anyhow::{anyhow, Context, Result};
use bio::io::fasta;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, warn};

use crate::core::{CircularizationVerdict, KmerValue, SequenceStats};

/// A named sequence read from or written to FASTA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedSequence {
    pub id: String,
    pub sequence: String,
}

/// Read the first record of a FASTA file. Extra records are ignored with a warning.
pub fn read_first_sequence<P: AsRef<Path>>(path: P) -> Result<NamedSequence> {
    let path = path.as_ref();
    let reader = fasta::Reader::from_file(path)
        .with_context(|| format!("Failed to open FASTA file: {}", path.display()))?;

    let mut records = reader.records();
    let record = records
        .next()
        .ok_or_else(|| anyhow!("FASTA file has no records: {}", path.display()))?
        .with_context(|| format!("Failed to parse FASTA file: {}", path.display()))?;

    let extra = records.count();
    if extra > 0 {
        warn!(
            "⚠️  {} holds {} additional records; using the first ({})",
            path.display(),
            extra,
            record.id()
        );
    }

    let sequence = std::str::from_utf8(record.seq())
        .with_context(|| format!("Non UTF-8 sequence in {}", path.display()))?
        .to_string();

    Ok(NamedSequence {
        id: record.id().to_string(),
        sequence,
    })
}

/// Length of the first record, used for reference-driven size windows
pub fn sequence_length<P: AsRef<Path>>(path: P) -> Result<usize> {
    Ok(read_first_sequence(path)?.sequence.len())
}

pub fn write_fasta<P: AsRef<Path>>(path: P, id: &str, sequence: &str) -> Result<()> {
    let path = path.as_ref();
    let mut writer = fasta::Writer::to_file(path)
        .with_context(|| format!("Failed to create FASTA file: {}", path.display()))?;
    writer
        .write(id, None, sequence.as_bytes())
        .with_context(|| format!("Failed to write FASTA record to {}", path.display()))?;
    writer.flush()?;

    debug!("Wrote {} bp to {}", sequence.len(), path.display());
    Ok(())
}

/// Write the `.stats` summary of the final sequence
pub fn write_stats<P: AsRef<Path>>(
    path: P,
    stats: &SequenceStats,
    verdict: &CircularizationVerdict,
    kmer: &KmerValue,
) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create stats file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);

    writeln!(writer, "Statistics for final sequence:")?;
    writeln!(writer)?;
    writeln!(writer, "Length: {}", stats.length)?;
    writeln!(writer, "GC content: {:.2}%", stats.gc_content)?;
    writeln!(writer, "Length without Ns: {}", stats.length_without_gaps())?;
    writeln!(writer, "Number of Ns: {}", stats.gap_bases)?;
    writeln!(
        writer,
        "Circularization: {}",
        if verdict.is_circular { "Yes" } else { "No" }
    )?;
    writeln!(writer, "K-mer used: {}", kmer)?;

    writer.flush()?;
    Ok(())
}
