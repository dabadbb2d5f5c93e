//! The co-processing experiment: each workload split between the CPU and the card's
//! engine at several shares, once per machine.

use log::info;

use std::time::Duration;

use crate::figures::coprocess::{COMPRESS, DECOMPRESS_DEFLATE, DECOMPRESS_LZ4};
use crate::remote::Local;
use crate::testbed::{Role, Testbed};

pub const RESULT_GLOBS: [&str; 2] = ["results-*.json", "results-*.size"];

pub fn experiment_dir() -> String {
    dir!(crate::EXPERIMENTS_PATH, "co-processing")
}

#[derive(Copy, Clone, Debug)]
pub struct Job {
    pub workload: &'static str,
    pub role: Role,
    /// Extra flags for `measure-<workload>.sh`.
    pub flags: &'static str,
    /// Directory under `results/coprocess/<workload>/`.
    pub device_dir: &'static str,
}

pub const JOBS: [Job; 8] = [
    Job {
        workload: COMPRESS,
        role: Role::Bf2Host,
        flags: "",
        device_dir: "bf2",
    },
    Job {
        workload: COMPRESS,
        role: Role::Bf2Dpu,
        flags: "--arm",
        device_dir: "bf2-arm",
    },
    Job {
        workload: DECOMPRESS_DEFLATE,
        role: Role::Bf2Host,
        flags: "--v2",
        device_dir: "bf2",
    },
    Job {
        workload: DECOMPRESS_DEFLATE,
        role: Role::Bf2Dpu,
        flags: "--arm --v2",
        device_dir: "bf2-arm",
    },
    Job {
        workload: DECOMPRESS_DEFLATE,
        role: Role::Local,
        flags: "--v3",
        device_dir: "bf3",
    },
    Job {
        workload: DECOMPRESS_DEFLATE,
        role: Role::Bf3Dpu,
        flags: "--arm --v3",
        device_dir: "bf3-arm",
    },
    Job {
        workload: DECOMPRESS_LZ4,
        role: Role::Local,
        flags: "",
        device_dir: "bf3",
    },
    Job {
        workload: DECOMPRESS_LZ4,
        role: Role::Bf3Dpu,
        flags: "--arm",
        device_dir: "bf3-arm",
    },
];

impl Job {
    pub fn command(&self) -> String {
        let mut cmd = format!("bash measure-{}.sh", self.workload);
        if !self.flags.is_empty() {
            cmd.push(' ');
            cmd.push_str(self.flags);
        }
        cmd
    }
}

pub fn run(
    local: &Local,
    testbed: &Testbed,
    timers: &mut Vec<(String, Duration)>,
) -> Result<(), failure::Error> {
    info!("Running co-processing on bf2-host, bf3-host, bf2-arm and bf3-arm");
    for job in JOBS.iter() {
        run_job(local, testbed, job, timers)?;
    }
    info!("✔ co-processing completed");
    Ok(())
}

fn run_job(
    local: &Local,
    testbed: &Testbed,
    job: &Job,
    timers: &mut Vec<(String, Duration)>,
) -> Result<(), failure::Error> {
    let exp_dir = experiment_dir();

    // Stale results would be fetched along with the new ones.
    testbed.clean(local, job.role, &exp_dir, &RESULT_GLOBS)?;

    time!(
        timers,
        format!("{} {}", job.workload, job.device_dir),
        testbed.run_script(local, job.role, &exp_dir, &job.command())
    )?;
    info!("✔ {} {} completed", job.device_dir, job.workload);

    let dest = local
        .cwd()
        .join(crate::RESULTS_PATH)
        .join("coprocess")
        .join(job.workload)
        .join(job.device_dir);
    local.ensure_dir(&dest)?;
    for glob in RESULT_GLOBS.iter() {
        testbed.fetch(local, job.role, &dir!(&exp_dir, glob), &dest)?;
    }

    testbed.clean(local, job.role, &exp_dir, &RESULT_GLOBS)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::figures::coprocess::SERIES;

    #[test]
    fn jobs_feed_every_series() {
        for series in SERIES.iter() {
            if series.device == "host-results" {
                continue;
            }
            assert!(
                JOBS.iter()
                    .any(|j| j.workload == series.workload && j.device_dir == series.device),
                "no job produces {}/{}",
                series.workload,
                series.device
            );
        }
        assert_eq!(JOBS[3].command(), "bash measure-decompress-deflate.sh --arm --v2");
        assert_eq!(JOBS[6].command(), "bash measure-decompress-lz4.sh");
    }

    #[test]
    fn dry_run_cleans_around_each_job() {
        let local = Local::new("/repo", true);
        let mut timers = vec![];
        run(&local, &Testbed::default(), &mut timers).unwrap();

        let history = local.history();
        assert_eq!(
            history[0],
            "ssh cloud-48 cd dpu-paper/experiments/co-processing && rm -rf results-*.json results-*.size"
        );
        assert_eq!(
            history[1],
            "ssh cloud-48 cd dpu-paper/experiments/co-processing && bash measure-compress.sh"
        );
        assert_eq!(history[2], "mkdir -p /repo/scripts/tex/figures/results/coprocess/compress/bf2");
        assert_eq!(
            history[3],
            "scp cloud-48:dpu-paper/experiments/co-processing/results-*.json /repo/scripts/tex/figures/results/coprocess/compress/bf2"
        );

        assert!(history.iter().any(|l| l
            == "bash -c mv /repo/experiments/co-processing/results-*.size /repo/scripts/tex/figures/results/coprocess/decompress-lz4/bf3"));
        assert_eq!(timers.len(), JOBS.len());
    }
}
