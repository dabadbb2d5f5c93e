//! Driving `doca_bench` over a sweep.

use log::{info, warn};

use spurs_util::escape_for_bash;

use crate::error::StepError;
use crate::remote::Local;
use crate::sweep::{BenchConfig, Grid, SweepPoint};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub completed: usize,
    pub failed: usize,
}

fn describe(point: &SweepPoint) -> String {
    format!(
        "job_size={} threads={} batch={}",
        point.job_size, point.threads, point.batch
    )
}

/// Run `doca_bench` once per point of `grid`. Every run appends a row to
/// `cfg.csv_output`; a run that fails is logged and skipped. `before_job_size` is called
/// whenever the sweep moves to a new job size.
pub fn run_sweep<F>(
    local: &Local,
    cfg: &BenchConfig,
    grid: &Grid,
    mut before_job_size: F,
) -> Result<SweepSummary, failure::Error>
where
    F: FnMut(usize) -> Result<(), failure::Error>,
{
    let mut summary = SweepSummary::default();
    let mut current_job_size = None;

    info!(
        "Sweeping {} points of {} on {} ({:?}), results in {}",
        grid.len(),
        cfg.pipeline.kind(),
        cfg.device.name(),
        cfg.side,
        cfg.csv_output
    );

    for point in grid.points() {
        if current_job_size != Some(point.job_size) {
            before_job_size(point.job_size)?;
            current_job_size = Some(point.job_size);
        }

        match local.spawn(&cfg.doca_bench, &cfg.args(&point)) {
            Ok(_) => summary.completed += 1,
            Err(err) => match err.downcast_ref::<StepError>() {
                Some(StepError::Failed { .. }) => {
                    warn!("doca_bench failed at {}: {}", describe(&point), err);
                    summary.failed += 1;
                }
                _ => return Err(err),
            },
        }
    }

    info!(
        "✔ {} sweep done: {} completed, {} failed",
        cfg.pipeline.kind(),
        summary.completed,
        summary.failed
    );

    Ok(summary)
}

/// The same sweep as a bash script, for machines that run it without this binary.
pub fn sweep_script(cfg: &BenchConfig, grid: &Grid) -> String {
    let bench = escape_for_bash(&cfg.doca_bench);
    let mut script = String::new();

    script.push_str("#!/usr/bin/env bash\n");
    script.push_str(&format!(
        "# {} sweep on {} ({:?}), {} points\n",
        cfg.pipeline.kind(),
        cfg.device.name(),
        cfg.side,
        grid.len()
    ));
    script.push_str(&format!(
        "command -v {} >/dev/null || {{ echo \"{} not found\" >&2; exit 127; }}\n",
        bench, cfg.doca_bench
    ));

    for point in grid.points() {
        let args = cfg
            .args(&point)
            .iter()
            .map(|a| escape_for_bash(a))
            .collect::<Vec<_>>()
            .join(" ");
        script.push_str(&format!(
            "{} {} >/dev/null || echo \"failed: {}\" >&2\n",
            bench,
            args,
            describe(&point)
        ));
    }

    script.push_str(&format!("echo {}\n", escape_for_bash(&cfg.csv_output)));
    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::{Companion, Device, Pipeline, Side};
    use crate::remote::Shell;

    fn cfg(bench: &str) -> BenchConfig {
        BenchConfig {
            doca_bench: bench.into(),
            device: Device::Bf3,
            side: Side::Host,
            companion: Companion::new(Device::Bf3, Side::Host, "ubuntu"),
            run_limit_seconds: 1,
            csv_output: "/tmp/dma-results-test.csv".into(),
            pipeline: Pipeline::Dma,
        }
    }

    fn small_grid() -> Grid {
        Grid {
            job_sizes: vec![64, 128],
            thread_counts: vec![1],
            batch_sizes: vec![1, 2],
        }
    }

    #[test]
    fn every_point_is_dispatched_once() {
        let local = Local::new(".", true);
        let mut job_sizes = vec![];
        let summary = run_sweep(&local, &cfg("doca_bench"), &small_grid(), |size| {
            job_sizes.push(size);
            Ok(())
        })
        .unwrap();

        assert_eq!(summary.completed, 4);
        assert_eq!(summary.failed, 0);
        assert_eq!(job_sizes, vec![64, 128]);

        let history = local.history();
        assert_eq!(history.len(), 4);
        assert!(history[0].contains("--uniform-job-size 64"));
        assert!(history[0].contains("--data-provider-job-count 1"));
        assert!(history[3].contains("--uniform-job-size 128"));
        assert!(history[3].contains("--data-provider-job-count 2"));
    }

    #[test]
    fn failing_runs_are_skipped() {
        // `false` ignores its arguments and exits 1.
        let local = Local::new(".", false);
        let summary = run_sweep(&local, &cfg("false"), &small_grid(), |_| Ok(())).unwrap();
        assert_eq!(summary.completed, 0);
        assert_eq!(summary.failed, 4);
    }

    #[test]
    fn missing_binary_aborts_the_sweep() {
        let local = Local::new(".", false);
        let err = run_sweep(
            &local,
            &cfg("/nonexistent/doca_bench"),
            &small_grid(),
            |_| Ok(()),
        )
        .unwrap_err();
        match err.downcast_ref::<StepError>() {
            Some(StepError::ToolMissing { .. }) => {}
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(local.history().len(), 1);
    }

    #[test]
    fn script_has_one_guarded_line_per_point() {
        let script = sweep_script(&cfg("/opt/mellanox/doca/tools/doca_bench"), &small_grid());
        let prefix = format!("{} ", escape_for_bash("/opt/mellanox/doca/tools/doca_bench"));
        let runs: Vec<_> = script
            .lines()
            .filter(|l| l.starts_with(&prefix))
            .collect();
        assert_eq!(runs.len(), 4);
        assert!(runs.iter().all(|l| l.contains("|| echo \"failed: ")));
        assert!(!script.contains("doca_compress"));
        assert!(script.starts_with("#!/usr/bin/env bash\n"));
        assert!(script.contains("exit 127"));
    }

    #[test]
    fn script_arguments_survive_bash() {
        let mut lz4 = cfg("/opt/mellanox/doca/tools/doca_bench");
        lz4.pipeline = Pipeline::Lz4Decompress {
            input_fs: "/dev/shm/lz4_raw_stream.fs".into(),
        };
        let script = sweep_script(&lz4, &small_grid());
        let bench = escape_for_bash(&lz4.doca_bench);
        let first = script
            .lines()
            .find(|l| l.starts_with(&format!("{} ", bench)))
            .unwrap();

        // Let bash split the line back into words and compare with the argv we built.
        let words = first.split(" >/dev/null").next().unwrap();
        let local = Local::new(".", false);
        let out = local.exec(&format!("printf '%s\\n' {}", words)).unwrap();
        let mut expected = vec![lz4.doca_bench.clone()];
        expected.extend(lz4.args(&small_grid().points().next().unwrap()));
        assert_eq!(out.lines().collect::<Vec<_>>(), expected);
        assert!(out.contains("doca_compress.algorithm=\"lz4_stream\""));
    }
}
