//! DMA throughput heatmaps: buffer size against batch size, one per platform.

use log::info;

use serde::Deserialize;

use std::path::Path;

use super::heatmap;
use super::table::{mean, Pivot};
use super::units::{
    format_bytes_label, format_throughput_bytes, parse_bytes_throughput, parse_ops_throughput,
};

/// Buffer sizes shown in the paper.
pub const SELECTED_BUFFER_SIZES: [u64; 6] = [2097152, 1048576, 524288, 131072, 65536, 8192];
pub const MAX_BUFFER_SIZE: u64 = 2 * 1024 * 1024;
pub const MAX_JOB_COUNT: u64 = 16;

pub const LATEST_RESULTS: &str = "dma-results-latest.csv";

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Platform {
    HostBf2,
    BlueField3,
    HostBf3,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::HostBf2, Platform::BlueField3, Platform::HostBf3];

    pub fn label(self) -> &'static str {
        match self {
            Platform::HostBf2 => "HostBF2",
            Platform::BlueField3 => "BlueField3",
            Platform::HostBf3 => "HostBF3",
        }
    }

    /// Directory under the results tree holding this platform's sweep.
    pub fn results_dir(self) -> &'static str {
        match self {
            Platform::HostBf2 => "bf2",
            Platform::BlueField3 => "bf3",
            Platform::HostBf3 => "bf3-host",
        }
    }
}

/// The columns of a `doca_bench` results row used here.
#[derive(Debug, Deserialize)]
struct Row {
    #[serde(rename = "stats.output.throughput.bytes", default)]
    throughput_bytes: String,
    #[serde(rename = "stats.output.throughput.rate", default)]
    throughput_rate: String,
    #[serde(
        rename = "cfg.data_provider.output_buffer_size",
        deserialize_with = "csv::invalid_option",
        default
    )]
    buffer_size: Option<f64>,
    #[serde(
        rename = "cfg.core_count",
        deserialize_with = "csv::invalid_option",
        default
    )]
    core_count: Option<f64>,
    #[serde(
        rename = "cfg.data_provider_job_count",
        deserialize_with = "csv::invalid_option",
        default
    )]
    job_count: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub buffer_size: u64,
    pub core_count: u64,
    pub job_count: u64,
    pub bytes_per_sec: Option<f64>,
    pub ops_per_sec: Option<f64>,
}

/// Read a results CSV. Rows lacking any of the sweep parameters are dropped.
pub fn load_samples(path: &Path) -> Result<Vec<Sample>, failure::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|err| failure::format_err!("{}: {}", path.display(), err))?;

    let mut samples = vec![];
    for (i, record) in reader.deserialize().enumerate() {
        let row: Row =
            record.map_err(|err| failure::format_err!("{} row {}: {}", path.display(), i, err))?;
        if let (Some(buffer_size), Some(core_count), Some(job_count)) =
            (row.buffer_size, row.core_count, row.job_count)
        {
            samples.push(Sample {
                buffer_size: buffer_size as u64,
                core_count: core_count as u64,
                job_count: job_count as u64,
                bytes_per_sec: parse_bytes_throughput(&row.throughput_bytes),
                ops_per_sec: parse_ops_throughput(&row.throughput_rate),
            });
        }
    }
    Ok(samples)
}

/// The part of the sweep plotted in the paper.
pub fn select_for_paper(samples: &[Sample]) -> Vec<Sample> {
    samples
        .iter()
        .filter(|s| {
            s.buffer_size <= MAX_BUFFER_SIZE
                && s.job_count <= MAX_JOB_COUNT
                && SELECTED_BUFFER_SIZES.contains(&s.buffer_size)
        })
        .cloned()
        .collect()
}

/// Mean bytes per second by (buffer size, job count). Cells without a parseable
/// throughput are left out.
pub fn throughput_pivot(samples: &[Sample]) -> Result<Pivot<u64, u64>, failure::Error> {
    let mut cells: std::collections::BTreeMap<(u64, u64), Vec<f64>> = Default::default();
    for s in samples {
        if let Some(v) = s.bytes_per_sec {
            cells
                .entry((s.buffer_size, s.job_count))
                .or_default()
                .push(v);
        }
    }

    let mut pivot = Pivot::new("buffer_size");
    for ((buffer, jobs), values) in cells {
        pivot.insert(buffer, jobs, mean(values))?;
    }
    Ok(pivot)
}

/// A platform's heatmap, scaled to the unit of its best cell.
#[derive(Clone, Debug)]
pub struct Heatmap {
    pub platform: Platform,
    pub scaled: Pivot<u64, u64>,
    pub best_buffer: u64,
    pub best_jobs: u64,
    pub best_bytes_per_sec: f64,
    pub label: String,
    pub unit: &'static str,
}

pub fn heatmap(platform: Platform, samples: &[Sample]) -> Result<Option<Heatmap>, failure::Error> {
    let pivot = throughput_pivot(&select_for_paper(samples))?;
    let (best_buffer, best_jobs, best) = match pivot.max_cell() {
        Some(best) => best,
        None => return Ok(None),
    };

    let (scaled_best, unit) = format_throughput_bytes(best);
    let factor = if scaled_best == 0 {
        1.0
    } else {
        best / scaled_best as f64
    };

    // Which core count achieved the best cell, for the log.
    let best_sample = samples
        .iter()
        .filter(|s| s.buffer_size == best_buffer && s.job_count == best_jobs)
        .filter(|s| s.bytes_per_sec.is_some())
        .max_by(|a, b| {
            a.bytes_per_sec
                .partial_cmp(&b.bytes_per_sec)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    if let Some(s) = best_sample {
        info!(
            "{}: best {} {} at {} x {} with {} cores ({} ops/s)",
            platform.label(),
            scaled_best,
            unit,
            format_bytes_label(best_buffer as f64),
            best_jobs,
            s.core_count,
            s.ops_per_sec.map_or("?".into(), |o| o.to_string()),
        );
    }

    Ok(Some(Heatmap {
        platform,
        scaled: pivot.map_values(|v| v / factor),
        best_buffer,
        best_jobs,
        best_bytes_per_sec: best,
        label: format!("{}", scaled_best),
        unit,
    }))
}

/// Render `dma-buf-vs-jobs-<platform>.{svg,csv}` into `figures_dir` from the latest sweep
/// of every platform under `results_dir`.
pub fn figures(results_dir: &Path, figures_dir: &Path) -> Result<(), failure::Error> {
    let mut all = vec![];
    for platform in Platform::ALL.iter() {
        let path = results_dir.join(platform.results_dir()).join(LATEST_RESULTS);
        if !path.exists() {
            failure::bail!(
                "One or some result files not found: {} is missing",
                path.display()
            );
        }
        all.push((*platform, load_samples(&path)?));
    }

    std::fs::create_dir_all(figures_dir)?;
    for (platform, samples) in all {
        let map = match heatmap(platform, &samples)? {
            Some(map) => map,
            None => {
                log::warn!("{}: no usable DMA samples", platform.label());
                continue;
            }
        };

        let stem = format!("dma-buf-vs-jobs-{}", platform.label());
        map.scaled
            .write_csv(&figures_dir.join(format!("{}.csv", stem)), f64::NAN)?;
        heatmap::render(&figures_dir.join(format!("{}.svg", stem)), &map)?;
        info!("✔ {} rendered", stem);
    }
    Ok(())
}
