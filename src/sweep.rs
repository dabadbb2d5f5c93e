//! Parameter grids for `doca_bench` and the command lines they expand to.

use serde::{Deserialize, Serialize};

use crate::util::Timestamp;

/// PCI function of the card as seen from its own arm cores.
pub const DPU_LOCAL_PCI: &str = "03:00.0";

pub const COMPANION_PORT: u16 = 12345;

/// tmfifo addresses of the host and the arm cores.
pub const HOST_TMFIFO_ADDR: &str = "192.168.100.1";
pub const DPU_TMFIFO_ADDR: &str = "192.168.100.2";

pub const BATCH_SIZES: [usize; 9] = [1, 2, 4, 8, 16, 32, 64, 128, 256];

/// Largest LZ4 input whose compressed form still fits a 2 MiB BF3 job.
pub const BF3_LZ4_MAX_JOB_SIZE: usize = 2_088_940;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    Bf2,
    Bf3,
}

impl Device {
    /// PCI address of the card on its host.
    pub fn pci_address(self) -> &'static str {
        match self {
            Device::Bf2 => "41:00.0",
            Device::Bf3 => "87:00.0",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Device::Bf2 => "bf2",
            Device::Bf3 => "bf3",
        }
    }
}

/// Which end of the card a sweep runs on.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Host,
    Dpu,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SweepPoint {
    pub job_size: usize,
    pub threads: usize,
    pub batch: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    pub job_sizes: Vec<usize>,
    pub thread_counts: Vec<usize>,
    pub batch_sizes: Vec<usize>,
}

/// `[2^lo, 2^(lo+1), ..., 2^(hi-1)]`
pub fn pow2_range(lo: u32, hi: u32) -> Vec<usize> {
    (lo..hi).map(|e| 1usize << e).collect()
}

impl Grid {
    pub fn dma(device: Device, side: Side) -> Self {
        let (job_sizes, mut thread_counts) = match device {
            // 64 B to 128 MiB
            Device::Bf2 => (pow2_range(6, 28), vec![1, 2, 4, 8]),
            // 64 B to 2 MiB
            Device::Bf3 => (pow2_range(6, 22), vec![1, 2, 4, 8, 15]),
        };

        // The BF2 arm complex has 8 cores and one of them runs the OS.
        if device == Device::Bf2 && side == Side::Dpu {
            if let Some(last) = thread_counts.last_mut() {
                *last = 7;
            }
        }

        Grid {
            job_sizes,
            thread_counts,
            batch_sizes: BATCH_SIZES.to_vec(),
        }
    }

    pub fn lz4(device: Device, side: Side) -> Self {
        let mut grid = Self::dma(device, side);
        if device == Device::Bf3 {
            if let Some(last) = grid.job_sizes.last_mut() {
                *last = BF3_LZ4_MAX_JOB_SIZE;
            }
        }
        grid
    }

    pub fn len(&self) -> usize {
        self.job_sizes.len() * self.thread_counts.len() * self.batch_sizes.len()
    }

    /// Every point of the grid, job size first, then threads, then batch size.
    pub fn points(&self) -> impl Iterator<Item = SweepPoint> + '_ {
        self.job_sizes.iter().flat_map(move |&job_size| {
            self.thread_counts.iter().flat_map(move |&threads| {
                self.batch_sizes.iter().map(move |&batch| SweepPoint {
                    job_size,
                    threads,
                    batch,
                })
            })
        })
    }
}

/// Cores `doca_bench` may pin workers to. Core 0 is left to the OS.
pub fn core_list(device: Device, side: Side) -> String {
    let last = match (device, side) {
        (Device::Bf2, Side::Dpu) => 7,
        _ => 15,
    };
    (1..=last)
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// The other end of a `doca_bench` run, given as `--companion-connection-string`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Companion {
    pub user: String,
    pub port: u16,
    pub addr: String,
    pub dev: String,
    pub rep: Option<String>,
}

impl Companion {
    /// When running on the host the companion is the card's arm cores, which see the card
    /// at `03:00.0` and need the host's representor. When running on the arm cores the
    /// companion is the host.
    pub fn new(device: Device, side: Side, user: &str) -> Self {
        match side {
            Side::Host => Companion {
                user: user.into(),
                port: COMPANION_PORT,
                addr: DPU_TMFIFO_ADDR.into(),
                dev: DPU_LOCAL_PCI.into(),
                rep: Some(device.pci_address().into()),
            },
            Side::Dpu => Companion {
                user: user.into(),
                port: COMPANION_PORT,
                addr: HOST_TMFIFO_ADDR.into(),
                dev: device.pci_address().into(),
                rep: None,
            },
        }
    }
}

impl std::fmt::Display for Companion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "proto=tcp,user={},port={},addr={},dev={}",
            self.user, self.port, self.addr, self.dev
        )?;
        if let Some(rep) = &self.rep {
            write!(f, ",rep={}", rep)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pipeline {
    /// Host/DPU memory copies with the DMA engine.
    Dma,
    /// LZ4 stream decompression on the compress engine, fed from a file set.
    Lz4Decompress { input_fs: String },
}

impl Pipeline {
    pub fn kind(&self) -> &'static str {
        match self {
            Pipeline::Dma => "dma",
            Pipeline::Lz4Decompress { .. } => "lz4",
        }
    }
}

/// Everything about a `doca_bench` invocation except the sweep point.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BenchConfig {
    pub doca_bench: String,
    pub device: Device,
    pub side: Side,
    pub companion: Companion,
    pub run_limit_seconds: usize,
    pub csv_output: String,
    pub pipeline: Pipeline,
}

impl BenchConfig {
    /// The `--device` argument: the card's own function when on the arm cores.
    pub fn device_arg(&self) -> &str {
        match self.side {
            Side::Host => self.device.pci_address(),
            Side::Dpu => DPU_LOCAL_PCI,
        }
    }

    pub fn args(&self, point: &SweepPoint) -> Vec<String> {
        let core_list = core_list(self.device, self.side);
        let mut args: Vec<String> = vec!["--mode".into(), "throughput".into()];

        match &self.pipeline {
            Pipeline::Dma => {
                args.extend(
                    [
                        "--pipeline-steps",
                        "doca_dma",
                        "--device",
                        self.device_arg(),
                        "--data-provider",
                        "random-data",
                    ]
                    .iter()
                    .map(|s| s.to_string()),
                );
                args.extend(vec![
                    "--uniform-job-size".into(),
                    point.job_size.to_string(),
                    "--job-output-buffer-size".into(),
                    point.job_size.to_string(),
                    "--data-provider-job-count".into(),
                    point.batch.to_string(),
                    "--use-remote-output-buffers".into(),
                    "--companion-connection-string".into(),
                    self.companion.to_string(),
                    "--core-count".into(),
                    point.threads.to_string(),
                    "--core-list".into(),
                    core_list,
                ]);
            }
            Pipeline::Lz4Decompress { input_fs } => {
                args.extend(vec![
                    "--core-list".into(),
                    core_list,
                    "--core-count".into(),
                    point.threads.to_string(),
                    "--threads-per-core".into(),
                    "1".into(),
                    "--pipeline-steps".into(),
                    "doca_compress::decompress".into(),
                    "--device".into(),
                    self.device_arg().into(),
                    "--data-provider".into(),
                    "file-set".into(),
                    "--data-provider-input-file".into(),
                    input_fs.clone(),
                    "--job-output-buffer-size".into(),
                    point.job_size.to_string(),
                    "--data-provider-job-count".into(),
                    point.batch.to_string(),
                    "--attribute".into(),
                    "doca_compress.algorithm=\"lz4_stream\"".into(),
                    "--attribute".into(),
                    "doca_compress.algorithm.has_block_checksum=false".into(),
                    "--attribute".into(),
                    "doca_compress.algorithm.are_blocks_independent=true".into(),
                ]);
            }
        }

        args.extend(vec![
            "--run-limit-seconds".into(),
            self.run_limit_seconds.to_string(),
            "--csv-append-mode".into(),
            "--csv-output-file".into(),
            self.csv_output.clone(),
        ]);
        if self.pipeline == Pipeline::Dma && self.side == Side::Dpu {
            args.push("--representor".into());
            args.push(DPU_LOCAL_PCI.into());
        }
        args
    }
}

/// `<dir>/<kind>-results-<device>[-host]-<timestamp>.csv`
pub fn results_file(kind: &str, device: Device, side: Side, ts: &Timestamp, dir: &str) -> String {
    let suffix = match side {
        Side::Host => "-host",
        Side::Dpu => "",
    };
    dir!(
        dir,
        format!("{}-results-{}{}-{}.csv", kind, device.name(), suffix, ts)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(device: Device, side: Side, pipeline: Pipeline) -> BenchConfig {
        BenchConfig {
            doca_bench: "doca_bench".into(),
            device,
            side,
            companion: Companion::new(device, side, "ubuntu"),
            run_limit_seconds: 5,
            csv_output: "/tmp/out.csv".into(),
            pipeline,
        }
    }

    #[test]
    fn bf2_host_grid() {
        let grid = Grid::dma(Device::Bf2, Side::Host);
        assert_eq!(grid.job_sizes.len(), 22);
        assert_eq!(grid.job_sizes[0], 64);
        assert_eq!(*grid.job_sizes.last().unwrap(), 128 << 20);
        assert_eq!(grid.thread_counts, vec![1, 2, 4, 8]);
        assert_eq!(grid.len(), 22 * 4 * 9);
    }

    #[test]
    fn bf2_dpu_grid_leaves_a_core_for_the_os() {
        let grid = Grid::dma(Device::Bf2, Side::Dpu);
        assert_eq!(grid.thread_counts, vec![1, 2, 4, 7]);
        assert_eq!(core_list(Device::Bf2, Side::Dpu), "1,2,3,4,5,6,7");
        assert_eq!(
            core_list(Device::Bf3, Side::Dpu),
            "1,2,3,4,5,6,7,8,9,10,11,12,13,14,15"
        );
    }

    #[test]
    fn bf3_grid() {
        let grid = Grid::dma(Device::Bf3, Side::Dpu);
        assert_eq!(grid.job_sizes, pow2_range(6, 22));
        assert_eq!(*grid.job_sizes.last().unwrap(), 2 << 20);
        assert_eq!(grid.thread_counts, vec![1, 2, 4, 8, 15]);
        assert_eq!(grid.len(), 16 * 5 * 9);

        let lz4 = Grid::lz4(Device::Bf3, Side::Host);
        assert_eq!(*lz4.job_sizes.last().unwrap(), BF3_LZ4_MAX_JOB_SIZE);
        assert_eq!(lz4.job_sizes[..15], grid.job_sizes[..15]);
        assert_eq!(Grid::lz4(Device::Bf2, Side::Host), Grid::dma(Device::Bf2, Side::Host));
    }

    #[test]
    fn points_are_the_cartesian_product_in_order() {
        let grid = Grid {
            job_sizes: vec![64, 128],
            thread_counts: vec![1, 2],
            batch_sizes: vec![1, 2, 4],
        };
        let points: Vec<_> = grid.points().collect();
        assert_eq!(points.len(), grid.len());
        assert_eq!(
            points[0],
            SweepPoint {
                job_size: 64,
                threads: 1,
                batch: 1
            }
        );
        assert_eq!(
            points[4],
            SweepPoint {
                job_size: 64,
                threads: 2,
                batch: 2
            }
        );
        assert_eq!(
            points[11],
            SweepPoint {
                job_size: 128,
                threads: 2,
                batch: 4
            }
        );

        let mut unique = points.clone();
        unique.dedup();
        assert_eq!(unique.len(), 12);
    }

    #[test]
    fn companion_strings() {
        assert_eq!(
            Companion::new(Device::Bf3, Side::Host, "ubuntu").to_string(),
            "proto=tcp,user=ubuntu,port=12345,addr=192.168.100.2,dev=03:00.0,rep=87:00.0"
        );
        assert_eq!(
            Companion::new(Device::Bf2, Side::Dpu, "dimitrios").to_string(),
            "proto=tcp,user=dimitrios,port=12345,addr=192.168.100.1,dev=41:00.0"
        );
    }

    #[test]
    fn dma_args_on_host() {
        let c = cfg(Device::Bf3, Side::Host, Pipeline::Dma);
        let args = c.args(&SweepPoint {
            job_size: 4096,
            threads: 2,
            batch: 16,
        });
        let line = args.join(" ");
        assert!(line.starts_with("--mode throughput --pipeline-steps doca_dma --device 87:00.0"));
        assert!(line.contains("--uniform-job-size 4096 --job-output-buffer-size 4096"));
        assert!(line.contains("--data-provider-job-count 16 --use-remote-output-buffers"));
        assert!(line.contains("--core-count 2 --core-list 1,2,3"));
        assert!(line.ends_with("--run-limit-seconds 5 --csv-append-mode --csv-output-file /tmp/out.csv"));
        assert!(!args.contains(&"--representor".to_string()));
    }

    #[test]
    fn dma_args_on_dpu_use_the_local_function_and_representor() {
        let c = cfg(Device::Bf2, Side::Dpu, Pipeline::Dma);
        let args = c.args(&SweepPoint {
            job_size: 64,
            threads: 7,
            batch: 1,
        });
        let dev = args.iter().position(|a| a == "--device").unwrap();
        assert_eq!(args[dev + 1], "03:00.0");
        assert_eq!(args[args.len() - 2..], ["--representor", "03:00.0"]);
        let comp = args
            .iter()
            .position(|a| a == "--companion-connection-string")
            .unwrap();
        assert!(args[comp + 1].contains("dev=41:00.0"));
    }

    #[test]
    fn lz4_args_read_the_file_set() {
        let c = cfg(
            Device::Bf3,
            Side::Dpu,
            Pipeline::Lz4Decompress {
                input_fs: "/dev/shm/lz4_raw_stream.fs".into(),
            },
        );
        let line = c
            .args(&SweepPoint {
                job_size: 1024,
                threads: 4,
                batch: 8,
            })
            .join(" ");
        assert!(line.contains("--threads-per-core 1 --pipeline-steps doca_compress::decompress"));
        assert!(line.contains("--data-provider file-set --data-provider-input-file /dev/shm/lz4_raw_stream.fs"));
        assert!(line.contains("doca_compress.algorithm=\"lz4_stream\""));
        assert!(!line.contains("companion"));
    }

    #[test]
    fn results_file_names() {
        let ts = Timestamp::now();
        let host = results_file("dma", Device::Bf3, Side::Host, &ts, "/tmp");
        assert_eq!(host, format!("/tmp/dma-results-bf3-host-{}.csv", ts));
        let dpu = results_file("lz4", Device::Bf2, Side::Dpu, &ts, "/tmp");
        assert_eq!(dpu, format!("/tmp/lz4-results-bf2-{}.csv", ts));
    }
}
