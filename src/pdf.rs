//! Build the paper with `latexmk` once the figures are in place.

use log::info;

use crate::remote::Local;

const LATEXMK: &str = "latexmk";

fn args(a: &[&str]) -> Vec<String> {
    a.iter().map(|s| s.to_string()).collect()
}

fn latexmk_runs() -> Vec<Vec<String>> {
    vec![
        args(&["-C", "-silent", "-interaction=nonstopmode"]),
        args(&["-pdf", "-silent", "-interaction=nonstopmode", "main.tex"]),
        args(&["-c", "-silent"]),
    ]
}

/// Clean, build `main.tex`, then drop the auxiliary files. Returns the PDF path.
pub fn build(local: &Local) -> Result<String, failure::Error> {
    let tex_dir = local.cwd().join(crate::TEX_PATH);
    info!("Building the paper in {}", tex_dir.display());

    for args in latexmk_runs() {
        local.spawn_at(&tex_dir, LATEXMK, &args)?;
    }

    let pdf = dir!(&tex_dir, "main.pdf");
    info!("✔ PDF built: {}", pdf);
    Ok(pdf)
}
