//! Compression and decompression throughput tables.
//!
//! Two kinds of input per device directory under the results tree:
//!
//! - DOCA measurements (`measurements-{orig,variable}*{dflt,lz4}.csv`): header-less CSV
//!   rows of the engine benchmark, one per task.
//! - CPU measurements (`cpu-{orig,variable}*{dflt,libdeflate,lz4}*.csv`): whitespace
//!   separated tables with a header, one row per (dataset, level, input).
//!
//! `orig` runs use the paper's datasets, `variable` runs vary the input size.

use log::{error, info};

use serde::Deserialize;

use std::collections::BTreeMap;
use std::path::Path;

use super::newest_file;
use super::table::{fmt_float, group_mean, mean, write_records, Pivot};

const MIB: f64 = 1_048_576.0;

pub const COMPRESS_DEFLATE: &str = "CDFLT";
pub const DECOMPRESS_DEFLATE: &str = "DDFLT";
pub const DECOMPRESS_LZ4: &str = "DLZ4";

/// One row of the DOCA measurement CSV, in column order.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct DocaRow {
    pub configuration: String,
    pub dataset: String,
    pub filename: String,
    pub input_size: f64,
    pub output_size: f64,
    pub doca_buffer: f64,
    pub doca_buffers: f64,
    pub total_time: f64,
    pub task_time: f64,
    pub ctx_time: f64,
    pub mem_time: f64,
    pub dev_time: f64,
    pub cb_time: f64,
    /// MB/s seen by the completion callback, i.e. the engine alone.
    pub cb_tput: f64,
    /// MB/s end to end.
    pub task_tput: f64,
    pub cb_start: f64,
    pub cb_end: f64,
}

impl DocaRow {
    fn numbers(&self) -> [f64; 14] {
        [
            self.input_size,
            self.output_size,
            self.doca_buffer,
            self.doca_buffers,
            self.total_time,
            self.task_time,
            self.ctx_time,
            self.mem_time,
            self.dev_time,
            self.cb_time,
            self.cb_tput,
            self.task_tput,
            self.cb_start,
            self.cb_end,
        ]
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CpuRow {
    pub dataset: String,
    pub level: i64,
    pub size: f64,
    pub csize: f64,
    pub ctime: f64,
    pub dtime: f64,
}

impl CpuRow {
    fn compression_mbps(&self) -> f64 {
        self.size / MIB / self.ctime
    }

    fn decompression_mbps(&self) -> f64 {
        self.csize / MIB / self.dtime
    }
}

#[derive(Clone, Debug, Default)]
pub struct Runs<T> {
    pub orig: Vec<T>,
    pub var: Vec<T>,
}

#[derive(Clone, Debug, Default)]
pub struct CpuAlgos {
    pub dflt: Runs<CpuRow>,
    pub libdeflate: Runs<CpuRow>,
    pub lz4: Runs<CpuRow>,
}

/// Everything the compression figures are computed from.
#[derive(Clone, Debug, Default)]
pub struct Measurements {
    pub bf2_dflt: Runs<DocaRow>,
    pub bf3_dflt: Runs<DocaRow>,
    pub bf3_lz4: Runs<DocaRow>,
    /// Keyed by device name, with the DPU directories renamed `bf2-dpu` and `bf3-dpu`.
    pub cpu: BTreeMap<String, CpuAlgos>,
}

impl Measurements {
    fn doca_dflt(&self) -> [(&'static str, &Runs<DocaRow>); 2] {
        [("bf2", &self.bf2_dflt), ("bf3", &self.bf3_dflt)]
    }
}

pub fn load_doca(path: &Path) -> Result<Vec<DocaRow>, failure::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|err| failure::format_err!("{}: {}", path.display(), err))?;

    let mut rows = vec![];
    for (i, record) in reader.deserialize().enumerate() {
        let row: DocaRow =
            record.map_err(|err| failure::format_err!("{} row {}: {}", path.display(), i, err))?;
        rows.push(row);
    }

    if rows.iter().any(|r| r.numbers().iter().any(|&v| v < 0.0)) {
        error!("Rows with errors in {}", path.display());
    }
    Ok(rows)
}

pub fn load_cpu(path: &Path) -> Result<Vec<CpuRow>, failure::Error> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| failure::format_err!("{}: {}", path.display(), err))?;
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());

    let header: Vec<&str> = match lines.next() {
        Some(header) => header.split_whitespace().collect(),
        None => failure::bail!("{}: empty file", path.display()),
    };
    let column = |name: &str| {
        header
            .iter()
            .position(|h| *h == name)
            .ok_or_else(|| failure::format_err!("{}: no column {}", path.display(), name))
    };
    let (dataset, level, size, csize, ctime, dtime) = (
        column("dataset")?,
        column("level")?,
        column("size")?,
        column("csize")?,
        column("ctime")?,
        column("dtime")?,
    );

    let mut rows = vec![];
    for (i, line) in lines.enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let field = |idx: usize| {
            fields.get(idx).copied().ok_or_else(|| {
                failure::format_err!("{} row {}: missing column {}", path.display(), i, header[idx])
            })
        };
        let number = |idx: usize| -> Result<f64, failure::Error> {
            let raw = field(idx)?;
            raw.parse().map_err(|_| {
                failure::format_err!("{} row {}: bad {} {:?}", path.display(), i, header[idx], raw)
            })
        };
        let raw_level = field(level)?;
        rows.push(CpuRow {
            dataset: field(dataset)?.to_owned(),
            level: raw_level.parse().map_err(|_| {
                failure::format_err!("{} row {}: bad level {:?}", path.display(), i, raw_level)
            })?,
            size: number(size)?,
            csize: number(csize)?,
            ctime: number(ctime)?,
            dtime: number(dtime)?,
        });
    }
    Ok(rows)
}

fn load_doca_runs(dir: &Path, algo: &str) -> Result<Runs<DocaRow>, failure::Error> {
    Ok(Runs {
        orig: load_doca(&newest_file(dir, &format!("measurements-orig*{}.csv", algo))?)?,
        var: load_doca(&newest_file(dir, &format!("measurements-variable*{}.csv", algo))?)?,
    })
}

fn load_cpu_runs(dir: &Path, algo: &str) -> Result<Runs<CpuRow>, failure::Error> {
    Ok(Runs {
        orig: load_cpu(&newest_file(dir, &format!("cpu-orig*{}*.csv", algo))?)?,
        var: load_cpu(&newest_file(dir, &format!("cpu-variable*{}*.csv", algo))?)?,
    })
}

/// Load the DOCA runs of `bf2` and `bf3` and the CPU runs of every device directory
/// holding `cpu-*.csv` files.
pub fn load(results_dir: &Path) -> Result<Measurements, failure::Error> {
    let mut m = Measurements {
        bf2_dflt: load_doca_runs(&results_dir.join("bf2"), "dflt")?,
        bf3_dflt: load_doca_runs(&results_dir.join("bf3"), "dflt")?,
        bf3_lz4: load_doca_runs(&results_dir.join("bf3"), "lz4")?,
        cpu: BTreeMap::new(),
    };

    let mut dirs = vec![];
    for entry in std::fs::read_dir(results_dir)? {
        let path = entry?.path();
        if path.is_dir() && !super::find_files(&path, "cpu-*.csv")?.is_empty() {
            dirs.push(path);
        }
    }
    dirs.sort();

    for dir in dirs {
        let name = match dir.file_name().and_then(|n| n.to_str()) {
            Some("bf2") => "bf2-dpu".to_owned(),
            Some("bf3") => "bf3-dpu".to_owned(),
            Some(other) => other.to_owned(),
            None => continue,
        };
        let algos = CpuAlgos {
            dflt: load_cpu_runs(&dir, "dflt")?,
            libdeflate: load_cpu_runs(&dir, "libdeflate")?,
            lz4: load_cpu_runs(&dir, "lz4")?,
        };
        m.cpu.insert(name, algos);
    }
    Ok(m)
}

/// BF2 rows whose callback never fired carry no usable timing.
fn with_callbacks(rows: &[DocaRow]) -> Vec<DocaRow> {
    rows.iter().filter(|r| r.cb_tput > 0.0).cloned().collect()
}

fn of_config<'a>(rows: &'a [DocaRow], config: &str) -> Vec<&'a DocaRow> {
    rows.iter().filter(|r| r.configuration == config).collect()
}

/// Rows of one configuration averaged per input file.
fn per_file(rows: &[DocaRow], config: &str) -> Vec<DocaRow> {
    let mut files: BTreeMap<&str, Vec<&DocaRow>> = BTreeMap::new();
    for row in of_config(rows, config) {
        files.entry(&row.filename).or_default().push(row);
    }

    files
        .into_iter()
        .map(|(filename, group)| {
            let avg = |f: fn(&DocaRow) -> f64| mean(group.iter().map(|r| f(r)));
            DocaRow {
                configuration: config.to_owned(),
                dataset: group[0].dataset.clone(),
                filename: filename.to_owned(),
                input_size: avg(|r| r.input_size),
                output_size: avg(|r| r.output_size),
                doca_buffer: avg(|r| r.doca_buffer),
                doca_buffers: avg(|r| r.doca_buffers),
                total_time: avg(|r| r.total_time),
                task_time: avg(|r| r.task_time),
                ctx_time: avg(|r| r.ctx_time),
                mem_time: avg(|r| r.mem_time),
                dev_time: avg(|r| r.dev_time),
                cb_time: avg(|r| r.cb_time),
                cb_tput: avg(|r| r.cb_tput),
                task_tput: avg(|r| r.task_tput),
                cb_start: avg(|r| r.cb_start),
                cb_end: avg(|r| r.cb_end),
            }
        })
        .collect()
}

/// Columns `<device>` (end to end) and `<device>-asic` (callback) by input size.
fn doca_by_size(
    pivot: &mut Pivot<u64, String>,
    device: &str,
    rows: &[DocaRow],
    config: &str,
) -> Result<(), failure::Error> {
    let rows = of_config(rows, config);
    pivot.insert_column(
        device.to_owned(),
        group_mean(&rows, |r| r.input_size as u64, |r| r.task_tput),
    )?;
    pivot.insert_column(
        format!("{}-asic", device),
        group_mean(&rows, |r| r.input_size as u64, |r| r.cb_tput),
    )
}

/// `comp-dflt-size-vs-throughput.csv`
pub fn comp_dflt_size_vs_throughput(m: &Measurements) -> Result<Pivot<u64, String>, failure::Error> {
    let mut pivot = Pivot::new("size");
    for (device, runs) in m.doca_dflt().iter() {
        doca_by_size(&mut pivot, device, &runs.var, COMPRESS_DEFLATE)?;
    }
    for (device, algos) in &m.cpu {
        pivot.insert_column(
            device.clone(),
            group_mean(&algos.dflt.var, |r| r.size as u64, CpuRow::compression_mbps),
        )?;
    }
    Ok(pivot)
}

/// `comp-algos-avg.csv`
pub fn comp_algos_avg(m: &Measurements) -> Result<Pivot<String, String>, failure::Error> {
    let mut dflt: Vec<(String, f64)> = vec![];
    for (device, runs) in m.doca_dflt().iter() {
        let rows = if *device == "bf2" {
            with_callbacks(&runs.var)
        } else {
            runs.var.clone()
        };
        for row in per_file(&rows, COMPRESS_DEFLATE) {
            dflt.push((device.to_string(), row.task_tput));
        }
    }

    let mut levels: Vec<(String, String, f64)> = vec![];
    for (device, algos) in &m.cpu {
        for row in &algos.dflt.orig {
            dflt.push((device.clone(), row.compression_mbps()));
        }
        for row in algos.libdeflate.orig.iter().filter(|r| r.level != 2) {
            levels.push((
                format!("libdeflate-{}", row.level),
                device.clone(),
                row.compression_mbps(),
            ));
        }
        for row in algos.lz4.orig.iter().filter(|r| r.level != 6) {
            levels.push((format!("lz4-{}", row.level), device.clone(), row.compression_mbps()));
        }
    }

    let mut pivot = Pivot::new("algo");
    for (device, v) in group_mean(&dflt, |r| r.0.clone(), |r| r.1) {
        pivot.insert("dflt".to_owned(), device, v)?;
    }
    for ((algo, device), v) in group_mean(&levels, |r| (r.0.clone(), r.1.clone()), |r| r.2) {
        pivot.insert(algo, device, v)?;
    }
    Ok(pivot)
}

/// `decomp-dflt-size-vs-throughput.csv`
pub fn decomp_dflt_size_vs_throughput(
    m: &Measurements,
) -> Result<Pivot<u64, String>, failure::Error> {
    let mut pivot = Pivot::new("size");
    for (device, runs) in m.doca_dflt().iter() {
        let rows = if *device == "bf2" {
            with_callbacks(&runs.var)
        } else {
            runs.var.clone()
        };
        doca_by_size(&mut pivot, device, &rows, DECOMPRESS_DEFLATE)?;
    }
    for (device, algos) in &m.cpu {
        pivot.insert_column(
            device.clone(),
            group_mean(&algos.dflt.var, |r| r.csize as u64, CpuRow::decompression_mbps),
        )?;
    }
    Ok(pivot)
}

/// `decomp-lz4-size-vs-throughput.csv`. Only BF3 decompresses LZ4 in hardware.
pub fn decomp_lz4_size_vs_throughput(
    m: &Measurements,
) -> Result<Pivot<u64, String>, failure::Error> {
    let mut pivot = Pivot::new("size");
    doca_by_size(&mut pivot, "bf3", &m.bf3_lz4.var, DECOMPRESS_LZ4)?;
    for (device, algos) in &m.cpu {
        pivot.insert_column(
            device.clone(),
            group_mean(&algos.lz4.var, |r| r.csize as u64, CpuRow::decompression_mbps),
        )?;
    }
    Ok(pivot)
}

/// `decomp-algos-avg.csv`
pub fn decomp_algos_avg(m: &Measurements) -> Result<Pivot<String, String>, failure::Error> {
    // (algo, device, MB/s)
    let mut samples: Vec<(&'static str, String, f64)> = vec![];

    let doca = [
        ("dflt", "bf2", &m.bf2_dflt.orig, DECOMPRESS_DEFLATE),
        ("dflt", "bf3", &m.bf3_dflt.orig, DECOMPRESS_DEFLATE),
        ("lz4", "bf3", &m.bf3_lz4.orig, DECOMPRESS_LZ4),
    ];
    for (algo, device, rows, config) in doca.iter() {
        for row in per_file(rows, config) {
            samples.push((*algo, device.to_string(), row.task_tput));
            samples.push((*algo, format!("{}-asic", device), row.cb_tput));
        }
    }

    for (device, algos) in &m.cpu {
        for row in &algos.dflt.orig {
            samples.push(("dflt", device.clone(), row.decompression_mbps()));
        }
        for row in algos.libdeflate.orig.iter().filter(|r| r.level != 2) {
            samples.push(("libdeflate", device.clone(), row.decompression_mbps()));
        }
        for row in algos.lz4.orig.iter().filter(|r| r.level != 6) {
            samples.push(("lz4", device.clone(), row.decompression_mbps()));
        }
    }

    let mut pivot = Pivot::new("algo");
    for ((algo, device), v) in group_mean(&samples, |r| (r.0, r.1.clone()), |r| r.2) {
        pivot.insert(algo.to_owned(), device, v)?;
    }
    Ok(pivot)
}

/// Mean timings of one (device, operation), used for the time breakdown figure.
#[derive(Clone, Debug, PartialEq)]
pub struct Breakdown {
    pub device: String,
    pub e2e_mbps: f64,
    pub cb_mbps: f64,
    pub ctx_time: f64,
    pub mem_time: f64,
    pub dev_time: f64,
    pub cb_time: f64,
    pub cb_start: f64,
    pub cb_end: f64,
}

impl Breakdown {
    fn of(device: &str, rows: &[DocaRow]) -> Self {
        let avg = |f: fn(&DocaRow) -> f64| mean(rows.iter().map(f));
        Breakdown {
            device: device.to_owned(),
            e2e_mbps: avg(|r| r.task_tput),
            cb_mbps: avg(|r| r.cb_tput),
            ctx_time: avg(|r| r.ctx_time),
            mem_time: avg(|r| r.mem_time),
            dev_time: avg(|r| r.dev_time),
            cb_time: avg(|r| r.cb_time),
            cb_start: avg(|r| r.cb_start),
            cb_end: avg(|r| r.cb_end),
        }
    }
}

/// BF2 compression, BF2 and BF3 DEFLATE decompression, BF3 LZ4 decompression.
pub fn breakdowns(m: &Measurements) -> Vec<Breakdown> {
    let bf2 = with_callbacks(&m.bf2_dflt.var);
    vec![
        Breakdown::of("bf2", &per_file(&bf2, COMPRESS_DEFLATE)),
        Breakdown::of("bf2", &per_file(&bf2, DECOMPRESS_DEFLATE)),
        Breakdown::of("bf3", &per_file(&m.bf3_dflt.orig, DECOMPRESS_DEFLATE)),
        Breakdown::of("bf3", &per_file(&m.bf3_lz4.orig, DECOMPRESS_LZ4)),
    ]
}

/// `avg_time_breakdown.csv`: one row of mean phase times.
pub fn time_breakdown(records: &[Breakdown]) -> Vec<Vec<String>> {
    let avg = |f: fn(&Breakdown) -> f64| fmt_float(mean(records.iter().map(f)));
    vec![
        vec!["cb_end", "cb_time", "dev_time", "mem_time", "ctx_time"]
            .into_iter()
            .map(String::from)
            .collect(),
        vec![
            avg(|b| b.cb_end),
            avg(|b| b.cb_time),
            avg(|b| b.dev_time),
            avg(|b| b.mem_time),
            avg(|b| b.ctx_time),
        ],
    ]
}

/// `avg_tput_breakdown.csv`: per device, end-to-end and callback throughput on the
/// figure's axis scale.
pub fn tput_breakdown(records: &[Breakdown]) -> Vec<Vec<String>> {
    let e2e = group_mean(records, |b| b.device.clone(), |b| b.e2e_mbps / 102.0);
    let cb = group_mean(records, |b| b.device.clone(), |b| b.cb_mbps / 1024.0);

    let mut out = vec![vec![
        "device".to_owned(),
        "e2e_mbps".to_owned(),
        "cb_mbps".to_owned(),
    ]];
    for (device, e2e) in e2e {
        let cb = cb.get(&device).copied().unwrap_or(f64::NAN);
        out.push(vec![device, fmt_float(e2e), fmt_float(cb)]);
    }
    out
}

/// Write every compression table into `results_dir`.
pub fn figures(results_dir: &Path) -> Result<(), failure::Error> {
    let m = load(results_dir)?;
    info!(
        "Loaded DOCA runs for bf2 and bf3, CPU runs for {:?}",
        m.cpu.keys().collect::<Vec<_>>()
    );

    let out = |name: &str| results_dir.join(name);
    comp_dflt_size_vs_throughput(&m)?.write_csv(&out("comp-dflt-size-vs-throughput.csv"), 0.0)?;
    comp_algos_avg(&m)?.write_csv(&out("comp-algos-avg.csv"), 0.0)?;
    decomp_dflt_size_vs_throughput(&m)?
        .write_csv(&out("decomp-dflt-size-vs-throughput.csv"), 0.0)?;
    decomp_lz4_size_vs_throughput(&m)?
        .write_csv(&out("decomp-lz4-size-vs-throughput.csv"), 0.0)?;
    decomp_algos_avg(&m)?.write_csv(&out("decomp-algos-avg.csv"), 1.0)?;

    let records = breakdowns(&m);
    write_records(&out("avg_time_breakdown.csv"), &time_breakdown(&records))?;
    write_records(&out("avg_tput_breakdown.csv"), &tput_breakdown(&records))?;

    info!("✔ compression tables written to {}", results_dir.display());
    Ok(())
}
