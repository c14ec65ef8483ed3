mod common;

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::tempdir;

use common::{build, search_loop, ScriptedBackend};
use mito_forge::assembly::{ComparisonMode, KmerSearchLoop, Selection, ValidatorVerdict};
use mito_forge::core::{BuildResult, KmerParameterList, KmerValue, PipelineError};
use mito_forge::utils::interrupt::{interrupt_channel, InterruptSignal};
use mito_forge::utils::RunLayout;

fn strict_search(
    layout: &RunLayout,
    backend: ScriptedBackend,
    verdicts: HashMap<KmerValue, ValidatorVerdict>,
) -> KmerSearchLoop {
    search_loop(layout, backend, verdicts, ComparisonMode::Strict, InterruptSignal::never())
}

fn scored(kmer: u32, result: BuildResult) -> HashMap<KmerValue, ValidatorVerdict> {
    HashMap::from([(KmerValue::Value(kmer), ValidatorVerdict::Scored(result))])
}

fn kmers(values: &[u32]) -> KmerParameterList {
    let requested: Vec<KmerValue> = values.iter().map(|&k| KmerValue::Value(k)).collect();
    KmerParameterList::for_backend(&requested, false).unwrap()
}

#[tokio::test]
async fn test_more_complete_build_replaces_incumbent() -> Result<()> {
    let temp_dir = tempdir()?;
    let layout = RunLayout::new(temp_dir.path(), "frog")?;

    let first = build(16500, 5, 4);
    let second = build(16550, 6, 4);
    let verdicts = HashMap::from([
        (KmerValue::Value(23), ValidatorVerdict::Scored(first)),
        (KmerValue::Value(31), ValidatorVerdict::Scored(second.clone())),
    ]);

    let backend = ScriptedBackend::new();
    let calls = backend.calls.clone();
    let search = strict_search(&layout, backend, verdicts);

    let outcome = search.run(&kmers(&[23, 31])).await?;

    assert_eq!(outcome.kmer, KmerValue::Value(31));
    assert_eq!(outcome.selection, Selection::BestEffort(second));
    assert_eq!(outcome.attempted, 2);
    assert!(outcome.degraded_by.is_none());
    assert_eq!(
        *calls.lock().unwrap(),
        vec![KmerValue::Value(23), KmerValue::Value(31)]
    );
    Ok(())
}

#[tokio::test]
async fn test_accepted_build_stops_the_search() -> Result<()> {
    let temp_dir = tempdir()?;
    let layout = RunLayout::new(temp_dir.path(), "frog")?;
    let seed = temp_dir.path().join("kmer_23").join("frog.fasta");

    let verdicts = HashMap::from([
        (
            KmerValue::Value(23),
            ValidatorVerdict::Accepted { seed: seed.clone() },
        ),
        (KmerValue::Value(31), ValidatorVerdict::Scored(build(17000, 6, 13))),
    ]);

    let backend = ScriptedBackend::new();
    let calls = backend.calls.clone();
    let search = strict_search(&layout, backend, verdicts);

    let outcome = search.run(&kmers(&[23, 31])).await?;

    assert_eq!(outcome.kmer, KmerValue::Value(23));
    assert_eq!(outcome.selection, Selection::Accepted { seed });
    assert_eq!(outcome.attempted, 1);
    assert_eq!(*calls.lock().unwrap(), vec![KmerValue::Value(23)]);
    assert!(!layout.kmer_dir(&KmerValue::Value(31)).exists());
    Ok(())
}

#[tokio::test]
async fn test_kmers_visited_in_list_order() -> Result<()> {
    let temp_dir = tempdir()?;
    let layout = RunLayout::new(temp_dir.path(), "frog")?;

    let backend = ScriptedBackend::new();
    let calls = backend.calls.clone();
    let verdicts = scored(19, build(900, 1, 1));
    let search = strict_search(&layout, backend, verdicts);

    search.run(&kmers(&[43, 19, 31, 27])).await?;

    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            KmerValue::Value(43),
            KmerValue::Value(19),
            KmerValue::Value(31),
            KmerValue::Value(27)
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_nothing_usable_is_no_candidate_produced() -> Result<()> {
    let temp_dir = tempdir()?;
    let layout = RunLayout::new(temp_dir.path(), "frog")?;
    let search = strict_search(&layout, ScriptedBackend::new(), HashMap::new());

    match search.run(&kmers(&[23, 31, 43])).await {
        Err(PipelineError::NoCandidateProduced { attempts }) => assert_eq!(attempts, 3),
        other => panic!("expected NoCandidateProduced, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_backend_failure_degrades_to_incumbent() -> Result<()> {
    let temp_dir = tempdir()?;
    let layout = RunLayout::new(temp_dir.path(), "frog")?;

    let mut backend = ScriptedBackend::new();
    backend.fail_on = vec![KmerValue::Value(31)];
    let calls = backend.calls.clone();
    let incumbent = build(16000, 6, 13);
    let verdicts = scored(23, incumbent.clone());
    let search = strict_search(&layout, backend, verdicts);

    let outcome = search.run(&kmers(&[23, 31, 43])).await?;

    assert_eq!(outcome.kmer, KmerValue::Value(23));
    assert_eq!(outcome.selection, Selection::BestEffort(incumbent));
    assert!(matches!(
        outcome.degraded_by,
        Some(PipelineError::BackendInvocation { kmer: KmerValue::Value(31), .. })
    ));
    // The search stops at the failure instead of moving on to 43
    assert_eq!(calls.lock().unwrap().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_backend_failure_without_incumbent_is_fatal() -> Result<()> {
    let temp_dir = tempdir()?;
    let layout = RunLayout::new(temp_dir.path(), "frog")?;

    let mut backend = ScriptedBackend::new();
    backend.fail_on = vec![KmerValue::Value(23)];
    let search = strict_search(&layout, backend, HashMap::new());

    let err = search.run(&kmers(&[23, 31])).await.unwrap_err();
    assert!(matches!(err, PipelineError::BackendInvocation { .. }));
    Ok(())
}

#[tokio::test]
async fn test_interrupt_discards_incumbent() -> Result<()> {
    let temp_dir = tempdir()?;
    let layout = RunLayout::new(temp_dir.path(), "frog")?;
    let (trigger, signal) = interrupt_channel();

    let mut backend = ScriptedBackend::new();
    backend.interrupt_on = Some((KmerValue::Value(31), Arc::new(trigger)));
    let calls = backend.calls.clone();
    let verdicts = scored(23, build(16000, 6, 13));
    let search = search_loop(&layout, backend, verdicts, ComparisonMode::Strict, signal);

    let err = search.run(&kmers(&[23, 31, 43])).await.unwrap_err();

    assert!(matches!(err, PipelineError::Interrupted));
    assert_eq!(calls.lock().unwrap().len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_relaxed_mode_only_compares_length() -> Result<()> {
    let temp_dir = tempdir()?;
    let verdicts = || {
        HashMap::from([
            (KmerValue::Value(23), ValidatorVerdict::Scored(build(15000, 6, 13))),
            (KmerValue::Value(31), ValidatorVerdict::Scored(build(15200, 2, 3))),
        ])
    };

    let strict_layout = RunLayout::new(temp_dir.path().join("strict"), "frog")?;
    let strict = search_loop(
        &strict_layout,
        ScriptedBackend::new(),
        verdicts(),
        ComparisonMode::Strict,
        InterruptSignal::never(),
    )
    .run(&kmers(&[23, 31]))
    .await?;
    assert_eq!(strict.kmer, KmerValue::Value(23));

    let relaxed_layout = RunLayout::new(temp_dir.path().join("relaxed"), "frog")?;
    let relaxed = search_loop(
        &relaxed_layout,
        ScriptedBackend::new(),
        verdicts(),
        ComparisonMode::Relaxed,
        InterruptSignal::never(),
    )
    .run(&kmers(&[23, 31]))
    .await?;
    assert_eq!(relaxed.kmer, KmerValue::Value(31));
    Ok(())
}

#[tokio::test]
async fn test_workdir_recreated_with_manifest() -> Result<()> {
    let temp_dir = tempdir()?;
    let layout = RunLayout::new(temp_dir.path(), "frog")?;
    let workdir = layout.kmer_dir(&KmerValue::Value(23));
    std::fs::create_dir_all(&workdir)?;
    std::fs::write(workdir.join("stale.out"), "from an aborted run")?;

    let verdicts = scored(23, build(900, 1, 1));
    strict_search(&layout, ScriptedBackend::new(), verdicts)
        .run(&kmers(&[23]))
        .await?;

    assert!(!workdir.join("stale.out").exists());
    let manifest = std::fs::read_to_string(workdir.join("manifest.config"))?;
    assert!(manifest.contains("[LIB]"));
    assert!(workdir.join("contigs.fasta").exists());
    Ok(())
}
