//! The compression experiment: CPU codecs on all four machines, the DOCA compress
//! engine on both cards.

use log::info;

use std::time::Duration;

use crate::remote::Local;
use crate::testbed::{Role, Testbed};

/// Where the measurement scripts live, relative to the repository root.
pub fn experiment_dir() -> String {
    dir!(crate::EXPERIMENTS_PATH, "local-compress")
}

/// `measure-cpu.sh` flag per machine.
const CPU_RUNS: [(Role, &str); 4] = [
    (Role::Local, "--bf3-host"),
    (Role::Bf2Host, "--bf2-host"),
    (Role::Bf3Dpu, "--bf3-dpu"),
    (Role::Bf2Dpu, "--bf2-dpu"),
];

/// `measure-dpu.sh` flag per card.
const DOCA_RUNS: [(Role, &str); 2] = [(Role::Bf3Dpu, "--v3"), (Role::Bf2Dpu, "--v2")];

/// (machine, files under `build/results`, destination under the results tree)
const GATHER: [(Role, &str, &str); 6] = [
    (Role::Local, "bf3-host/*.csv", "bf3-host"),
    (Role::Bf2Host, "bf2-host/cpu*.csv", "bf2-host"),
    (Role::Bf3Dpu, "bf3-dpu/cpu*.csv", "bf3"),
    (Role::Bf2Dpu, "bf2-dpu/cpu*.csv", "bf2"),
    (Role::Bf3Dpu, "doca/*.csv", "bf3"),
    (Role::Bf2Dpu, "doca/*.csv", "bf2"),
];

pub fn run(
    local: &Local,
    testbed: &Testbed,
    timers: &mut Vec<(String, Duration)>,
) -> Result<(), failure::Error> {
    let exp_dir = experiment_dir();

    for (role, flag) in CPU_RUNS.iter() {
        time!(
            timers,
            format!("CPU compress {}", role),
            testbed.run_script(
                local,
                *role,
                &exp_dir,
                &format!("bash measure-cpu.sh {}", flag)
            )
        )?;
        info!("✔ {} CPU compress completed", role);
    }

    for (role, flag) in DOCA_RUNS.iter() {
        time!(
            timers,
            format!("DOCA compress {}", role),
            testbed.run_script(
                local,
                *role,
                &exp_dir,
                &format!("bash measure-dpu.sh {}", flag)
            )
        )?;
        info!("✔ {} DOCA compress completed", role);
    }

    let results_dir = local.cwd().join(crate::RESULTS_PATH);
    for (role, files, dest) in GATHER.iter() {
        let dest = results_dir.join(dest);
        local.ensure_dir(&dest)?;
        let glob = dir!(&exp_dir, "build/results", files);
        testbed.fetch(local, *role, &glob, &dest)?;
    }

    info!("✔ compression completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_run_measures_then_gathers() {
        let local = Local::new("/repo", true);
        let testbed = Testbed::default();
        let mut timers = vec![];

        run(&local, &testbed, &mut timers).unwrap();
        let history = local.history();

        assert_eq!(history[0], "bash -c bash measure-cpu.sh --bf3-host");
        assert_eq!(
            history[1],
            "ssh cloud-48 cd dpu-paper/experiments/local-compress && bash measure-cpu.sh --bf2-host"
        );
        assert!(history[3].starts_with("ssh cloud-48 ssh bf-pcie "));
        assert!(history[3].contains(r"measure\-cpu\.sh\ \-\-bf2\-dpu"));
        assert_eq!(
            history[4],
            "ssh bf-pcie cd dpu-paper/experiments/local-compress && bash measure-dpu.sh --v3"
        );
        assert!(history[5].starts_with("ssh cloud-48 ssh bf-pcie "));
        assert!(history[5].contains(r"measure\-dpu\.sh\ \-\-v2"));

        assert!(history.iter().any(|l| l
            == "bash -c mv /repo/experiments/local-compress/build/results/bf3-host/*.csv /repo/scripts/tex/figures/results/bf3-host"));
        assert!(history.iter().any(|l| l
            == "scp bf-pcie:dpu-paper/experiments/local-compress/build/results/doca/*.csv /repo/scripts/tex/figures/results/bf3"));

        assert_eq!(timers.len(), CPU_RUNS.len() + DOCA_RUNS.len());
    }
}
