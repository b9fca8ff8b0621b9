// tests/runner.rs
use anyhow::Result;
use ironbeam_cogroup::testing::sorted_rows;
use ironbeam_cogroup::*;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

fn events(n: u32, tag: &str) -> Vec<(u32, String)> {
    (0..n).map(|i| (i % 17, format!("{tag}{i}"))).collect()
}

/// Three inputs over a 4-way hash target; the last one is already partitioned
/// that way and is read narrowly.
fn three_way() -> Result<CoGroupedDataset<u32, String>> {
    let target: Arc<dyn Partitioner<u32>> = Arc::new(HashPartitioner::<u32>::new(4)?);
    let clicks = MemoryDataset::from_vec(events(60, "c"), 3).named("clicks");
    let views = MemoryDataset::from_vec(events(25, "v"), 5).named("views");
    let users = MemoryDataset::partition_by(events(17, "u"), Arc::clone(&target))?.named("users");
    let inputs: Vec<Arc<dyn KeyedDataset<u32, String>>> = vec![Arc::new(clicks), Arc::new(views), Arc::new(users)];
    Ok(CoGroupedDataset::new(
        inputs,
        target,
        CoGroupEnv::local(Arc::new(LocalShuffleService::default())),
    )?)
}

#[test]
fn sequential_and_parallel_agree() -> Result<()> {
    let seq = sorted_rows(Runner::new(ExecMode::Sequential).collect(&three_way()?)?);
    let par = sorted_rows(Runner::new(ExecMode::Parallel { threads: Some(3) }).collect(&three_way()?)?);
    assert_eq!(seq, par);
    assert_eq!(seq.len(), 17);

    // Key 3 received clicks 3, 20, 37, 54; views 3, 20; user 3.
    let (_, buckets) = &seq[3];
    assert_eq!(buckets[0], vec!["c3", "c20", "c37", "c54"]);
    assert_eq!(buckets[1], vec!["v3", "v20"]);
    assert_eq!(buckets[2], vec!["u3"]);
    Ok(())
}

#[test]
fn job_reports_every_partition_in_order() -> Result<()> {
    let op = three_way()?;
    let runner = Runner::new(ExecMode::Parallel { threads: None });
    let outcome = runner.run_job(&op)?;

    let ids: Vec<PartitionId> = outcome.tasks.iter().map(|t| t.partition).collect();
    assert_eq!(ids, vec![0, 1, 2, 3]);
    assert_eq!(outcome.failed(), 0);
    assert_eq!(runner.task_states(), vec![TaskState::Computed; 4]);

    let rows: usize = outcome
        .tasks
        .iter()
        .map(|t| t.result.as_ref().map_or(0, Vec::len))
        .sum();
    assert_eq!(rows, 17);
    Ok(())
}

#[test]
fn job_metrics_split_narrow_and_shuffle_reads() -> Result<()> {
    let outcome = Runner::new(ExecMode::Sequential).run_job(&three_way()?)?;
    assert_eq!(outcome.metrics.shuffle_read().records_read(), 85);
    assert_eq!(outcome.metrics.input().records_read(), 17);
    assert!(outcome.metrics.shuffle_read().bytes_read() > 0);
    assert_eq!(outcome.metrics.value()["input"]["records"], 17);
    Ok(())
}

#[test]
fn map_stage_reads_are_reported_once() -> Result<()> {
    let op = three_way()?;
    let runner = Runner::new(ExecMode::Sequential);

    let first = runner.run_job(&op)?;
    // Clicks and views are read by the map stage; users never are.
    assert_eq!(first.map_stage.input().records_read(), 85);
    assert_eq!(first.map_stage.shuffle_read().records_read(), 0);

    let again = runner.run_job(&op)?;
    assert_eq!(again.map_stage.input().records_read(), 0);
    assert_eq!(again.metrics.shuffle_read().records_read(), 85);
    Ok(())
}

#[test]
fn interrupt_flag_kills_every_task() -> Result<()> {
    let flag = Arc::new(AtomicBool::new(true));
    let runner = Runner::new(ExecMode::Sequential).with_interrupt_flag(flag);
    let outcome = runner.run_job(&three_way()?);
    // The map stage shares the flag, so the job fails before any task runs.
    assert!(outcome.is_err());
    Ok(())
}

#[test]
fn config_drives_the_runner() -> Result<()> {
    let cfg = CoGroupConfig::from_json_str(r#"{ "exec_mode": { "mode": "parallel", "threads": 2 }, "interrupt_check_interval": 64 }"#)?;
    let runner = Runner::from_config(&cfg);
    assert_eq!(runner.mode, ExecMode::Parallel { threads: Some(2) });
    assert_eq!(runner.interrupt_check_interval, 64);
    assert_eq!(runner.collect(&three_way()?)?.len(), 17);
    Ok(())
}

#[test]
fn runner_reuses_planning_across_jobs() -> Result<()> {
    let svc = Arc::new(LocalShuffleService::default());
    let (inputs, target) = testing::scenario_inputs()?;
    let op = CoGroupedDataset::new(inputs, target, CoGroupEnv::local(Arc::clone(&svc)))?;
    let runner = Runner::default();
    let first = sorted_rows(runner.collect(&op)?);
    let second = sorted_rows(runner.collect(&op)?);
    assert_eq!(first, second);
    assert_eq!(svc.registered_shuffles(), 2);
    Ok(())
}
