//! The DMA experiment: one `doca_bench` sweep per platform, each CSV brought home as
//! `results/<platform>/dma-results-latest.csv`.

use log::{info, warn};

use std::path::Path;
use std::time::Duration;

use crate::dma_bench::testbed_config;
use crate::doca_bench::{run_sweep, sweep_script};
use crate::error::is_step_failure;
use crate::figures::dma::{Platform, LATEST_RESULTS};
use crate::remote::{Local, Shell};
use crate::sweep::{Device, Grid, Side};
use crate::testbed::{Role, Testbed};
use crate::util::Timestamp;

/// A sweep run on a remote machine from a shipped script.
struct RemoteSweep {
    role: Role,
    device: Device,
    side: Side,
    /// Where the remote sweep leaves its CSV.
    results_glob: &'static str,
    platform: Platform,
}

const REMOTE_SWEEPS: [RemoteSweep; 2] = [
    RemoteSweep {
        role: Role::Bf3Dpu,
        device: Device::Bf3,
        side: Side::Dpu,
        results_glob: "/tmp/dma-results*",
        platform: Platform::BlueField3,
    },
    RemoteSweep {
        role: Role::Bf2Host,
        device: Device::Bf2,
        side: Side::Host,
        results_glob: "/tmp/dma-results*host*",
        platform: Platform::HostBf2,
    },
];

fn side_name(side: Side) -> &'static str {
    match side {
        Side::Host => "host",
        Side::Dpu => "dpu",
    }
}

pub fn run(
    local: &Local,
    testbed: &Testbed,
    timers: &mut Vec<(String, Duration)>,
) -> Result<(), failure::Error> {
    let ts = Timestamp::now();
    let results_dir = local.cwd().join(crate::RESULTS_PATH);

    info!("Setting up tmfifo interfaces, sudo may ask for a password");
    local.exec_tty(&format!(
        "sudo ifconfig tmfifo_net1 {}",
        testbed.tmfifo_host_addr
    ))?;
    info!("✔ tmfifo_net1 set up");
    testbed
        .shell(local, Role::Bf2Host)?
        .exec_tty(&format!(
            "sudo ifconfig tmfifo_net0 {}",
            testbed.tmfifo_host_addr
        ))?;
    info!("✔ tmfifo_net0 set up on {}", Role::Bf2Host);

    // BF3 host side runs right here.
    let cfg = testbed_config(testbed, Device::Bf3, Side::Host, &ts);
    let grid = Grid::dma(Device::Bf3, Side::Host);
    time!(
        timers,
        "DMA bf3-host",
        run_sweep(local, &cfg, &grid, |_| Ok(()))
    )?;
    let dest = results_dir.join(Platform::HostBf3.results_dir());
    local.ensure_dir(&dest)?;
    testbed.fetch(local, Role::Local, &cfg.csv_output, &dest.join(LATEST_RESULTS))?;
    info!("✔ bf3-host DMA completed");

    for sweep in REMOTE_SWEEPS.iter() {
        run_remote(local, testbed, sweep, &ts, &results_dir, timers)?;
    }

    Ok(())
}

fn run_remote(
    local: &Local,
    testbed: &Testbed,
    sweep: &RemoteSweep,
    ts: &Timestamp,
    results_dir: &Path,
    timers: &mut Vec<(String, Duration)>,
) -> Result<(), failure::Error> {
    let cfg = testbed_config(testbed, sweep.device, sweep.side, ts);
    let grid = Grid::dma(sweep.device, sweep.side);

    let name = format!(
        "dma-sweep-{}-{}-{}.sh",
        sweep.device.name(),
        side_name(sweep.side),
        ts
    );
    let script = std::env::temp_dir().join(&name);
    std::fs::write(&script, sweep_script(&cfg, &grid))
        .map_err(|err| failure::format_err!("{}: {}", script.display(), err))?;

    let remote_script = format!("/tmp/{}", name);
    match testbed.push(local, sweep.role, &script, &remote_script) {
        Ok(()) => {}
        Err(err) if is_step_failure(&err) => {
            warn!("Copying {} to {} failed: {}", name, sweep.role, err)
        }
        Err(err) => return Err(err),
    }

    let shell = testbed.shell(local, sweep.role)?;
    time!(
        timers,
        format!("DMA {}", sweep.role),
        shell.exec(&format!("bash {}", remote_script))
    )?;

    let newest = testbed.latest(local, sweep.role, sweep.results_glob)?;
    let dest = results_dir.join(sweep.platform.results_dir());
    local.ensure_dir(&dest)?;
    testbed.fetch(local, sweep.role, &newest, &dest.join(LATEST_RESULTS))?;
    info!("✔ {} DMA completed", sweep.role);

    Ok(())
}
