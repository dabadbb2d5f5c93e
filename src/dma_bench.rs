//! Sweep the DMA engine with `doca_bench`, from either end of a card.

use clap::clap_app;

use log::info;

use serde::{Deserialize, Serialize};

use crate::doca_bench::{run_sweep, sweep_script};
use crate::remote::Local;
use crate::sweep::{results_file, BenchConfig, Companion, Device, Grid, Pipeline, Side};
use crate::testbed::Testbed;
use crate::util::{validator, Timestamp};

pub fn cli_options() -> clap::App<'static, 'static> {
    clap_app! { dma_bench =>
        (about: "Sweep DOCA DMA throughput over job size, thread count and batch size.")
        (@setting DisableVersion)
        (@arg BF3: --bf3
         "Use the BlueField-3 configuration (default: BlueField-2).")
        (@arg ON_DPU: --on_dpu
         "The sweep runs on the DPU arm cores rather than on the host.")
        (@arg DOCA_BENCH: --doca_bench +takes_value
         "Path to doca_bench (default: /opt/mellanox/doca/tools/doca_bench).")
        (@arg COMPANION_USER: --companion_user +takes_value
         "The account the companion process logs in as.")
        (@arg RUN_LIMIT: --run_limit +takes_value {validator::is::<usize>}
         "Seconds per sweep point (default: 5).")
        (@arg OUTPUT_DIR: --output_dir +takes_value
         "Where to put the results CSV (default: /tmp).")
        (@arg SCRIPT: --script
         "Print the sweep as a bash script instead of running it.")
        (@arg DRY_RUN: --dry_run
         "Print the doca_bench command lines instead of running them.")
    }
}

/// Options shared by the `doca_bench` sweeps.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BenchArgs {
    pub device: Device,
    pub side: Side,
    pub doca_bench: String,
    pub companion_user: String,
    pub run_limit_seconds: usize,
    pub output_dir: String,
    pub timestamp: Timestamp,
}

impl BenchArgs {
    pub fn from_matches(sub_m: &clap::ArgMatches<'_>) -> Self {
        let testbed = Testbed::default();
        let device = if sub_m.is_present("BF3") {
            Device::Bf3
        } else {
            Device::Bf2
        };
        let side = if sub_m.is_present("ON_DPU") {
            Side::Dpu
        } else {
            Side::Host
        };

        BenchArgs {
            device,
            side,
            doca_bench: sub_m
                .value_of("DOCA_BENCH")
                .map_or(testbed.doca_bench.clone(), Into::into),
            companion_user: sub_m
                .value_of("COMPANION_USER")
                .map_or_else(|| companion_user(&testbed, device, side), Into::into),
            run_limit_seconds: sub_m
                .value_of("RUN_LIMIT")
                .map_or(testbed.run_limit_seconds, |s| s.parse().unwrap()),
            output_dir: sub_m.value_of("OUTPUT_DIR").unwrap_or("/tmp").into(),
            timestamp: Timestamp::now(),
        }
    }

    pub fn config(&self, pipeline: Pipeline) -> BenchConfig {
        BenchConfig {
            doca_bench: self.doca_bench.clone(),
            device: self.device,
            side: self.side,
            companion: Companion::new(self.device, self.side, &self.companion_user),
            run_limit_seconds: self.run_limit_seconds,
            csv_output: results_file(
                pipeline.kind(),
                self.device,
                self.side,
                &self.timestamp,
                &self.output_dir,
            ),
            pipeline,
        }
    }
}

/// The companion logs into the other end of the card: the arm cores when the sweep runs
/// on the host, the host when it runs on the arm cores.
pub fn companion_user(testbed: &Testbed, device: Device, side: Side) -> String {
    match (side, device) {
        (Side::Host, _) => testbed.dpu_user.clone(),
        (Side::Dpu, Device::Bf2) => testbed.bf2_host_user.clone(),
        (Side::Dpu, Device::Bf3) => testbed.bf3_host_user.clone(),
    }
}

/// The DMA sweep for `device`/`side` as configured by `testbed`.
pub fn testbed_config(testbed: &Testbed, device: Device, side: Side, ts: &Timestamp) -> BenchConfig {
    BenchArgs {
        device,
        side,
        doca_bench: testbed.doca_bench.clone(),
        companion_user: companion_user(testbed, device, side),
        run_limit_seconds: testbed.run_limit_seconds,
        output_dir: "/tmp".into(),
        timestamp: *ts,
    }
    .config(Pipeline::Dma)
}

pub fn run(sub_m: &clap::ArgMatches<'_>) -> Result<(), failure::Error> {
    let args = BenchArgs::from_matches(sub_m);
    let cfg = args.config(Pipeline::Dma);
    let grid = Grid::dma(args.device, args.side);

    if sub_m.is_present("SCRIPT") {
        print!("{}", sweep_script(&cfg, &grid));
        return Ok(());
    }

    info!(
        "Running on {}, dev={}, on_dpu={}",
        args.device.name(),
        args.device.pci_address(),
        args.side == Side::Dpu
    );

    let local = Local::new(".", sub_m.is_present("DRY_RUN"));
    run_sweep(&local, &cfg, &grid, |_| Ok(()))?;

    println!("RESULTS: {}", cfg.csv_output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn companion_users_follow_the_testbed() {
        let tb = Testbed::default();
        assert_eq!(companion_user(&tb, Device::Bf3, Side::Host), "ubuntu");
        assert_eq!(companion_user(&tb, Device::Bf2, Side::Dpu), "dimitrios");
        assert_eq!(companion_user(&tb, Device::Bf3, Side::Dpu), "dimitrios-ldap");
    }

    #[test]
    fn cli_defaults() {
        let m = cli_options().get_matches_from(vec!["dma_bench", "--bf3", "--on_dpu"]);
        let args = BenchArgs::from_matches(&m);
        assert_eq!(args.device, Device::Bf3);
        assert_eq!(args.side, Side::Dpu);
        assert_eq!(args.run_limit_seconds, 5);
        assert_eq!(args.doca_bench, "/opt/mellanox/doca/tools/doca_bench");

        let cfg = args.config(Pipeline::Dma);
        assert!(cfg.csv_output.starts_with("/tmp/dma-results-bf3-2"));
        assert_eq!(
            cfg.companion.to_string(),
            "proto=tcp,user=dimitrios-ldap,port=12345,addr=192.168.100.1,dev=87:00.0"
        );
    }

    #[test]
    fn testbed_sweeps_write_to_tmp() {
        let ts = Timestamp::now();
        let cfg = testbed_config(&Testbed::default(), Device::Bf2, Side::Host, &ts);
        assert_eq!(cfg.csv_output, format!("/tmp/dma-results-bf2-host-{}.csv", ts));
        assert_eq!(cfg.device_arg(), "41:00.0");
    }
}
