//! Reproduce the paper: run the requested experiments, reduce their results into the
//! figures and tables, then build the PDF.

use clap::clap_app;

use log::{info, warn};

use serde::{Deserialize, Serialize};

use spurs_util::escape_for_bash;

use std::path::Path;
use std::time::Duration;

use crate::error::is_step_failure;
use crate::remote::{Local, Shell};
use crate::testbed::Testbed;
use crate::util::{timings_str, Timestamp};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Experiment {
    Dma,
    Compress,
    Coprocess,
}

impl Experiment {
    /// In the order they run.
    pub const ALL: [Experiment; 3] = [Experiment::Dma, Experiment::Compress, Experiment::Coprocess];

    pub fn name(self) -> &'static str {
        match self {
            Experiment::Dma => "dma",
            Experiment::Compress => "compress",
            Experiment::Coprocess => "coprocess",
        }
    }

    fn flag(self) -> &'static str {
        match self {
            Experiment::Dma => "DMA",
            Experiment::Compress => "COMPRESS",
            Experiment::Coprocess => "COPROCESS",
        }
    }

    fn run(
        self,
        local: &Local,
        testbed: &Testbed,
        timers: &mut Vec<(String, Duration)>,
    ) -> Result<(), failure::Error> {
        match self {
            Experiment::Dma => crate::dma_exp::run(local, testbed, timers),
            Experiment::Compress => crate::compress_exp::run(local, testbed, timers),
            Experiment::Coprocess => crate::coprocess_exp::run(local, testbed, timers),
        }
    }

    fn figures(self, root: &Path) -> Result<(), failure::Error> {
        let results = root.join(crate::RESULTS_PATH);
        match self {
            Experiment::Dma => {
                crate::figures::dma::figures(&results, &root.join(crate::FIGURES_PATH))
            }
            Experiment::Compress => crate::figures::compress::figures(&results),
            Experiment::Coprocess => crate::figures::coprocess::figures(&results),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Config {
    exp: String,
    experiments: Vec<Experiment>,
    only_figs: bool,
    no_pdf: bool,
    dry_run: bool,
    root: String,
    testbed: Testbed,
    timestamp: Timestamp,
}

impl Config {
    fn file_name(&self, ext: &str) -> String {
        format!("{}-{}.{}", self.exp, self.timestamp, ext)
    }
}

pub fn cli_options() -> clap::App<'static, 'static> {
    clap_app! { repro_exp =>
        (about: "Run the paper's experiments, regenerate its figures and build the PDF.")
        (@setting DisableVersion)
        (@arg DMA: --dma
         "Run the DMA throughput sweeps. Requires `sudo` for the tmfifo interfaces.")
        (@arg COMPRESS: --compress
         "Run the CPU and DOCA compression measurements.")
        (@arg COPROCESS: --coprocess
         "Run the CPU/DPU co-processing measurements.")
        (@arg ALL: --all
         "Run every experiment. Overrides the other selections.")
        (@arg ONLY_FIGS: --only_figs
         "Regenerate the figures from existing results without running anything.")
        (@arg NO_PDF: --no_pdf
         "Do not build the PDF.")
        (@arg ROOT: --root +takes_value
         "The root of the repository checkout (default: the current directory).")
        (@arg TESTBED: --testbed +takes_value
         "A JSON file describing the testbed. Missing fields take the paper's values.")
        (@arg DRY_RUN: --dry_run
         "Log the commands instead of running them. Figures are not regenerated.")
    }
}

fn selected(sub_m: &clap::ArgMatches<'_>) -> Vec<Experiment> {
    if sub_m.is_present("ALL") {
        info!("Requested all experiments");
        return Experiment::ALL.to_vec();
    }
    Experiment::ALL
        .iter()
        .copied()
        .filter(|e| sub_m.is_present(e.flag()))
        .collect()
}

pub fn run(sub_m: &clap::ArgMatches<'_>) -> Result<(), failure::Error> {
    let testbed = match sub_m.value_of("TESTBED") {
        Some(path) => Testbed::load(path)?,
        None => Testbed::default(),
    };

    let cfg = Config {
        exp: "repro_exp".into(),
        experiments: selected(sub_m),
        only_figs: sub_m.is_present("ONLY_FIGS"),
        no_pdf: sub_m.is_present("NO_PDF"),
        dry_run: sub_m.is_present("DRY_RUN"),
        root: sub_m.value_of("ROOT").unwrap_or(".").into(),
        testbed,
        timestamp: Timestamp::now(),
    };

    let local = Local::new(&cfg.root, cfg.dry_run);
    run_inner(&local, &cfg)
}

fn run_inner(local: &Local, cfg: &Config) -> Result<(), failure::Error> {
    let mut timers = vec![];

    let results_dir = local.cwd().join(crate::RESULTS_PATH);
    local.ensure_dir(&results_dir)?;
    let params_file = dir!(&results_dir, cfg.file_name("params"));
    let time_file = dir!(&results_dir, cfg.file_name("time"));

    local.exec(&format!(
        "echo {} > {}",
        escape_for_bash(&serde_json::to_string(&cfg)?),
        params_file
    ))?;

    for exp in cfg.experiments.iter() {
        if !cfg.only_figs {
            info!("Running the {} experiment", exp.name());
            match exp.run(local, &cfg.testbed, &mut timers) {
                Ok(()) => info!("✔ {} experiment completed", exp.name()),
                Err(err) if is_step_failure(&err) => {
                    warn!("The {} experiment stopped early: {}", exp.name(), err)
                }
                Err(err) => return Err(err),
            }
        }

        if cfg.dry_run {
            info!("[dry run] skipping {} figures", exp.name());
            continue;
        }
        time!(
            timers,
            format!("{} figures", exp.name()),
            exp.figures(local.cwd())
        )?;
        info!("✔ {} figures ready", exp.name());
    }

    if !cfg.no_pdf {
        match time!(timers, "PDF", crate::pdf::build(local)) {
            Ok(_) => {}
            Err(err) if is_step_failure(&err) => warn!("Failed to build the PDF: {}", err),
            Err(err) => return Err(err),
        }
    }

    local.exec(&format!(
        "echo {} > {}",
        escape_for_bash(&timings_str(&timers)),
        time_file
    ))?;

    println!("RESULTS: {}", results_dir.display());
    Ok(())
}
