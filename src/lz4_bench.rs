//! Sweep LZ4 stream decompression on the compress engine with `doca_bench`.
//!
//! `doca_bench` reads its input from a file set: a list of files, each holding one
//! length-prefixed LZ4 block. The set is rebuilt for every job size so that each block
//! decompresses to exactly one job.

use clap::clap_app;

use log::info;

use rand::RngCore;

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::dma_bench::BenchArgs;
use crate::doca_bench::{run_sweep, sweep_script};
use crate::remote::Local;
use crate::sweep::{BenchConfig, Grid, Pipeline, Side};
use crate::util::validator;

pub const DEFAULT_NUM_FILES: usize = 1024;
pub const DEFAULT_FS_ROOT: &str = "/dev/shm";

pub fn cli_options() -> clap::App<'static, 'static> {
    clap_app! { lz4_bench =>
        (about: "Sweep DOCA LZ4 decompression throughput over job size, thread count and \
                 batch size.")
        (@setting DisableVersion)
        (@arg BF3: --bf3
         "Use the BlueField-3 configuration (default: BlueField-2).")
        (@arg ON_DPU: --on_dpu
         "The sweep runs on the DPU arm cores rather than on the host.")
        (@arg DOCA_BENCH: --doca_bench +takes_value
         "Path to doca_bench (default: /opt/mellanox/doca/tools/doca_bench).")
        (@arg COMPANION_USER: --companion_user +takes_value
         "The account the companion process logs in as. Decompression runs without one.")
        (@arg RUN_LIMIT: --run_limit +takes_value {validator::is::<usize>}
         "Seconds per sweep point (default: 5).")
        (@arg OUTPUT_DIR: --output_dir +takes_value
         "Where to put the results CSV (default: /tmp).")
        (@arg NUM_FILES: --num_files +takes_value {validator::is::<usize>}
         "Number of compressed blocks in the file set (default: 1024).")
        (@arg FS_ROOT: --fs_root +takes_value
         "Directory to build the file set in (default: /dev/shm).")
        (@arg SCRIPT: --script
         "Print the sweep as a bash script instead of running it. The script does not \
          rebuild the file set between job sizes.")
        (@arg DRY_RUN: --dry_run
         "Print the doca_bench command lines instead of running them.")
    }
}

/// A set of LZ4 blocks on disk and the list file that names them.
#[derive(Clone, Debug)]
pub struct Lz4FileSet {
    pub dir: PathBuf,
    pub list: PathBuf,
    pub num_files: usize,
}

impl Lz4FileSet {
    pub fn new<P: AsRef<Path>>(root: P, num_files: usize) -> Self {
        Lz4FileSet {
            dir: root.as_ref().join("lz4_raw"),
            list: root.as_ref().join("lz4_raw_stream.fs"),
            num_files,
        }
    }

    /// Replace the set with `num_files` blocks of `block_size` random bytes each. Every
    /// file holds the compressed length as a little-endian `u32` followed by one
    /// independent raw LZ4 block.
    pub fn rebuild(&self, block_size: usize) -> Result<(), failure::Error> {
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir)?;
        }
        std::fs::create_dir_all(&self.dir)?;
        if self.list.exists() {
            std::fs::remove_file(&self.list)?;
        }

        let mut rng = rand::thread_rng();
        let mut plain = vec![0u8; block_size];
        let mut paths = Vec::with_capacity(self.num_files);

        for i in 0..self.num_files {
            rng.fill_bytes(&mut plain);
            let block = lz4_flex::block::compress(&plain);

            let path = self.dir.join(format!("{:04}.lz4s", i));
            let mut file = std::io::BufWriter::new(std::fs::File::create(&path)?);
            file.write_all(&(block.len() as u32).to_le_bytes())?;
            file.write_all(&block)?;
            file.flush()?;
            paths.push(path);
        }

        paths.sort();
        let mut list = std::io::BufWriter::new(std::fs::File::create(&self.list)?);
        for path in &paths {
            writeln!(list, "{}", path.display())?;
        }
        list.flush()?;

        info!("Wrote file set with block size={}", block_size);
        Ok(())
    }
}

/// The file set, the sweep configuration and its grid as selected on the command line.
fn sweep_from_matches(
    sub_m: &clap::ArgMatches<'_>,
) -> (BenchArgs, Lz4FileSet, BenchConfig, Grid) {
    let args = BenchArgs::from_matches(sub_m);
    let num_files = sub_m
        .value_of("NUM_FILES")
        .map_or(DEFAULT_NUM_FILES, |s| s.parse().unwrap());
    let fs = Lz4FileSet::new(sub_m.value_of("FS_ROOT").unwrap_or(DEFAULT_FS_ROOT), num_files);

    let cfg = args.config(Pipeline::Lz4Decompress {
        input_fs: fs.list.display().to_string(),
    });
    let grid = Grid::lz4(args.device, args.side);
    (args, fs, cfg, grid)
}

pub fn run(sub_m: &clap::ArgMatches<'_>) -> Result<(), failure::Error> {
    let (args, fs, cfg, grid) = sweep_from_matches(sub_m);
    let dry_run = sub_m.is_present("DRY_RUN");

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

    let local = Local::new(".", dry_run);
    run_sweep(&local, &cfg, &grid, |job_size| {
        if dry_run {
            info!("[dry run] rebuild {} with block size={}", fs.list.display(), job_size);
            Ok(())
        } else {
            fs.rebuild(job_size)
        }
    })?;

    println!("RESULTS: {}", cfg.csv_output);
    Ok(())
}
