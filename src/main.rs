#[macro_use]
mod util;

mod error;
mod remote;
mod testbed;

mod sweep;
mod doca_bench;
mod dma_bench;
mod lz4_bench;
mod prep_compressed;

mod figures;
mod pdf;

mod dma_exp;
mod compress_exp;
mod coprocess_exp;
mod repro_exp;

/// Paths relative to the repository root.
const TEX_PATH: &str = "scripts/tex/";
const FIGURES_PATH: &str = "scripts/tex/figures/";
const RESULTS_PATH: &str = "scripts/tex/figures/results/";
const EXPERIMENTS_PATH: &str = "experiments/";

fn run() -> Result<(), failure::Error> {
    let matches = clap::App::new("repro")
        .about("Reproduce the DPU paper: benchmarks, figures and PDF.")
        .subcommand(crate::repro_exp::cli_options())
        .subcommand(crate::dma_bench::cli_options())
        .subcommand(crate::lz4_bench::cli_options())
        .subcommand(crate::prep_compressed::cli_options())
        .setting(clap::AppSettings::SubcommandRequiredElseHelp)
        .setting(clap::AppSettings::DisableVersion)
        .get_matches();

    match matches.subcommand() {
        ("repro_exp", Some(sub_m)) => crate::repro_exp::run(sub_m),
        ("dma_bench", Some(sub_m)) => crate::dma_bench::run(sub_m),
        ("lz4_bench", Some(sub_m)) => crate::lz4_bench::run(sub_m),
        ("prep_compressed", Some(sub_m)) => crate::prep_compressed::run(sub_m),
        _ => {
            unreachable!();
        }
    }
}

fn main() {
    use console::style;

    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info"))
        .init();

    std::env::set_var("RUST_BACKTRACE", "1");

    // If an error returned, try to print something helpful
    if let Err(err) = run() {
        const MESSAGE: &str = r#"== ERROR ==================================================================================
`repro` encountered an error. The command log above may offer clues. If the error pertains to SSH,
you may be able to get useful information by setting the RUST_LOG=debug environment variable. A
failed benchmark or remote step only stops its own experiment; this error stopped the whole run.
"#;

        println!("{}", style(MESSAGE).red().bold());

        // Errors from SSH commands
        if err.downcast_ref::<spurs::SshError>().is_some() {
            println!("An error occurred while attempting to run a command over SSH");
        }

        // Print error and backtrace
        println!(
            "`repro` encountered the following error:\n{}\n{}",
            err.as_fail(),
            err.backtrace(),
        );

        std::process::exit(101);
    }
}
