//! CPU/DPU co-processing: throughput by the share of work handed to the DPU.
//!
//! Each run leaves, per input file and split, `results-<cpu%>-<dpu%>-<name>-cpu-<workload>.json`
//! and `...-doca-<workload>.json` with elapsed times in seconds, plus
//! `results-<cpu%>-<dpu%>-<name>.size` whose first line ends with the input size in bytes.

use log::{info, warn};

use serde_json::Value;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::find_files;
use super::table::{fmt_float, mean, write_records};

const MIB: f64 = 1_048_576.0;

pub const COMPRESS: &str = "compress";
pub const DECOMPRESS_DEFLATE: &str = "decompress-deflate";
pub const DECOMPRESS_LZ4: &str = "decompress-lz4";

/// A (workload, device directory) pair and the table it produces.
#[derive(Copy, Clone, Debug)]
pub struct Series {
    pub workload: &'static str,
    pub device: &'static str,
    pub output: &'static str,
}

pub const SERIES: [Series; 7] = [
    Series {
        workload: COMPRESS,
        device: "bf2",
        output: "coprocessing-compress-deflate.csv",
    },
    Series {
        workload: COMPRESS,
        device: "bf2-arm",
        output: "coprocessing-compress-deflate-arm.csv",
    },
    Series {
        workload: DECOMPRESS_DEFLATE,
        device: "bf2",
        output: "coprocessing-decompress-deflate.csv",
    },
    Series {
        workload: DECOMPRESS_DEFLATE,
        device: "bf2-arm",
        output: "coprocessing-decompress-deflate-arm.csv",
    },
    Series {
        workload: DECOMPRESS_LZ4,
        device: "bf3",
        output: "coprocessing-decompress-lz4-r.csv",
    },
    Series {
        workload: DECOMPRESS_LZ4,
        device: "bf3-arm",
        output: "coprocessing-decompress-lz4-arm.csv",
    },
    Series {
        workload: DECOMPRESS_LZ4,
        device: "host-results",
        output: "coprocessing-decompress-lz4-host.csv",
    },
];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Engine {
    Cpu,
    Doca,
}

impl Engine {
    fn name(self) -> &'static str {
        match self {
            Engine::Cpu => "cpu",
            Engine::Doca => "doca",
        }
    }
}

/// The split encoded in a result file name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Split {
    pub cpu: u32,
    pub dpu: u32,
    pub name: String,
}

impl Split {
    pub fn parse(file_name: &str, engine: Engine, workload: &str) -> Option<Split> {
        let suffix = format!("-{}-{}.json", engine.name(), workload);
        let rest = file_name.strip_prefix("results-")?.strip_suffix(&suffix)?;
        let mut parts = rest.splitn(3, '-');
        let cpu = parts.next()?.parse().ok()?;
        let dpu = parts.next()?.parse().ok()?;
        let name = parts.next().filter(|n| !n.is_empty())?;
        Some(Split {
            cpu,
            dpu,
            name: name.to_owned(),
        })
    }

    fn stem(&self) -> String {
        format!("results-{}-{}-{}", self.cpu, self.dpu, self.name)
    }

    fn json(&self, dir: &Path, engine: Engine, workload: &str) -> PathBuf {
        dir.join(format!("{}-{}-{}.json", self.stem(), engine.name(), workload))
    }

    /// Input size in bytes: the last token of the first line of the `.size` file.
    fn input_bytes(&self, dir: &Path) -> Result<u64, failure::Error> {
        let path = dir.join(format!("{}.size", self.stem()));
        let text = std::fs::read_to_string(&path)
            .map_err(|err| failure::format_err!("{}: {}", path.display(), err))?;
        text.lines()
            .next()
            .and_then(|line| line.split_whitespace().last())
            .and_then(|token| token.parse().ok())
            .ok_or_else(|| failure::format_err!("{}: no input size", path.display()))
    }
}

fn read_json(path: &Path) -> Result<Value, failure::Error> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| failure::format_err!("{}: {}", path.display(), err))?;
    serde_json::from_str(&text).map_err(|err| failure::format_err!("{}: {}", path.display(), err))
}

/// A field in seconds. Some runs write numbers, others numeric strings.
pub fn seconds(doc: &Value, field: &str, path: &Path) -> Result<f64, failure::Error> {
    let value = match doc.get(field) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    value.ok_or_else(|| failure::format_err!("{}: no numeric {}", path.display(), field))
}

/// Wall time of the DPU side including context teardown.
fn doca_wall_time(doc: &Value, path: &Path) -> Result<f64, failure::Error> {
    Ok(seconds(doc, "overall_submission_elapsed", path)? + seconds(doc, "ctx_stop_elapsed", path)?)
}

/// Result files in `dir`, or none if the directory was never collected.
fn results_in(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, failure::Error> {
    if !dir.is_dir() {
        warn!("{} does not exist, skipping", dir.display());
        return Ok(vec![]);
    }
    find_files(dir, pattern)
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

/// One row of a co-processing table.
#[derive(Clone, Debug, PartialEq)]
pub struct SharingPoint {
    /// Percentage of the work given to the DPU.
    pub dpu_share: u32,
    /// MiB/s with a fixed split.
    pub static_mibps: f64,
    /// MiB/s counting the DPU's context teardown as part of the run.
    pub reconfiguration_mibps: f64,
}

/// Average throughput per DPU share for one workload on one device.
pub fn sharing_series(dir: &Path, workload: &str) -> Result<Vec<SharingPoint>, failure::Error> {
    let mut fixed: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    let mut reconfigured: BTreeMap<u32, Vec<f64>> = BTreeMap::new();

    for path in results_in(dir, &format!("results-*-cpu-{}.json", workload))? {
        let split = match Split::parse(file_name(&path), Engine::Cpu, workload) {
            Some(split) => split,
            None => continue,
        };
        let mib = split.input_bytes(dir)? as f64 / MIB;
        let joined = seconds(&read_json(&path)?, "joined_submission_elapsed", &path)?;

        fixed.entry(split.dpu).or_default().push(mib / joined);
        let reconf = reconfigured.entry(split.dpu).or_default();
        if 0 < split.cpu && split.cpu < 100 {
            let doca = split.json(dir, Engine::Doca, workload);
            let wall = doca_wall_time(&read_json(&doca)?, &doca)?;
            reconf.push(mib / joined.max(wall));
        } else if split.cpu == 100 {
            reconf.push(mib / joined);
        }
    }

    // DPU-only runs leave no CPU file.
    for path in results_in(dir, &format!("results-0-100-*-doca-{}.json", workload))? {
        let split = match Split::parse(file_name(&path), Engine::Doca, workload) {
            Some(split) => split,
            None => continue,
        };
        let mib = split.input_bytes(dir)? as f64 / MIB;
        let doc = read_json(&path)?;
        let joined = seconds(&doc, "joined_submission_elapsed", &path)?;
        let wall = doca_wall_time(&doc, &path)?;

        fixed.entry(split.dpu).or_default().push(mib / joined);
        reconfigured
            .entry(split.dpu)
            .or_default()
            .push(mib / joined.max(wall));
    }

    Ok(fixed
        .into_iter()
        .map(|(dpu_share, values)| SharingPoint {
            dpu_share,
            static_mibps: mean(values),
            reconfiguration_mibps: reconfigured
                .remove(&dpu_share)
                .map_or(f64::NAN, mean),
        })
        .collect())
}

pub fn sharing_records(points: &[SharingPoint]) -> Vec<Vec<String>> {
    let mut out = vec![vec![
        "sharing_percentage".to_owned(),
        "static".to_owned(),
        "reconfiguration".to_owned(),
    ]];
    for p in points {
        out.push(vec![
            p.dpu_share.to_string(),
            fmt_float(p.static_mibps),
            fmt_float(p.reconfiguration_mibps),
        ]);
    }
    out
}

/// CPU time of each input file by CPU share.
pub fn cpu_times(
    dir: &Path,
    workload: &str,
) -> Result<BTreeMap<String, BTreeMap<u32, f64>>, failure::Error> {
    let mut times: BTreeMap<String, BTreeMap<u32, f64>> = BTreeMap::new();
    for path in results_in(dir, &format!("results-*-cpu-{}.json", workload))? {
        if let Some(split) = Split::parse(file_name(&path), Engine::Cpu, workload) {
            let t = seconds(&read_json(&path)?, "cpu_time_elapsed", &path)?;
            times.entry(split.name).or_default().insert(split.cpu, t);
        }
    }
    Ok(times)
}

/// What the slowest split's CPU time is compared against.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Baseline {
    /// The split with the least CPU time.
    Fastest,
    /// A fixed CPU share, e.g. the split with the best throughput.
    CpuShare(u32),
}

/// Mean over input files of the CPU time saved relative to the slowest split, in percent.
pub fn average_reduction(
    times: &BTreeMap<String, BTreeMap<u32, f64>>,
    baseline: Baseline,
) -> Result<f64, failure::Error> {
    let mut reductions = vec![];
    for (name, by_share) in times {
        let max = by_share.values().cloned().fold(f64::NAN, f64::max);
        let reference = match baseline {
            Baseline::Fastest => by_share.values().cloned().fold(f64::NAN, f64::min),
            Baseline::CpuShare(share) => match by_share.get(&share) {
                Some(&t) => t,
                None => failure::bail!("{}: no run with {}% on the CPU", name, share),
            },
        };
        reductions.push((max - reference) / max * 100.0);
    }
    Ok(mean(reductions))
}

/// `cpu-reduction.csv`. `-1` marks combinations that were not measured.
pub fn cpu_reduction_records(coprocess_dir: &Path) -> Result<Vec<Vec<String>>, failure::Error> {
    let reduction = |workload: &str, device: &str, baseline: Baseline| -> Result<String, failure::Error> {
        let times = cpu_times(&coprocess_dir.join(workload).join(device), workload)?;
        Ok(fmt_float(average_reduction(&times, baseline)?))
    };
    let na = || "-1".to_owned();

    Ok(vec![
        vec!["category".to_owned(), "bf2".to_owned(), "bf3".to_owned()],
        vec![
            "Compr".to_owned(),
            reduction(COMPRESS, "bf2", Baseline::Fastest)?,
            na(),
        ],
        vec![
            "Dec-Defl".to_owned(),
            reduction(DECOMPRESS_DEFLATE, "bf2", Baseline::Fastest)?,
            reduction(DECOMPRESS_DEFLATE, "bf3", Baseline::Fastest)?,
        ],
        vec![
            "Dec-LZ4".to_owned(),
            na(),
            reduction(DECOMPRESS_LZ4, "bf3", Baseline::CpuShare(10))?,
        ],
    ])
}

/// Reduce `results_dir/coprocess` into the co-processing tables in `results_dir`.
pub fn figures(results_dir: &Path) -> Result<(), failure::Error> {
    let coprocess_dir = results_dir.join("coprocess");

    for series in SERIES.iter() {
        let dir = coprocess_dir.join(series.workload).join(series.device);
        let points = sharing_series(&dir, series.workload)?;
        write_records(&results_dir.join(series.output), &sharing_records(&points))?;
        info!("✔ {} ({} shares)", series.output, points.len());
    }

    write_records(
        &results_dir.join("cpu-reduction.csv"),
        &cpu_reduction_records(&coprocess_dir)?,
    )?;
    info!("✔ cpu-reduction.csv");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOUR_MIB: &str = "input 4194304\n";

    fn put(dir: &Path, name: &str, text: &str) {
        std::fs::write(dir.join(name), text).unwrap();
    }

    #[test]
    fn file_names() {
        assert_eq!(
            Split::parse("results-30-70-my-file-cpu-compress.json", Engine::Cpu, COMPRESS),
            Some(Split {
                cpu: 30,
                dpu: 70,
                name: "my-file".into()
            })
        );
        assert_eq!(
            Split::parse(
                "results-0-100-x-doca-decompress-lz4.json",
                Engine::Doca,
                DECOMPRESS_LZ4
            )
            .map(|s| (s.cpu, s.dpu)),
            Some((0, 100))
        );
        assert_eq!(
            Split::parse(
                "results-30-70-x-cpu-decompress-deflate.json",
                Engine::Cpu,
                COMPRESS
            ),
            None
        );
        assert_eq!(Split::parse("results-a-70-x-cpu-compress.json", Engine::Cpu, COMPRESS), None);
        assert_eq!(Split::parse("results-30-70--cpu-compress.json", Engine::Cpu, COMPRESS), None);
    }

    #[test]
    fn elapsed_as_number_or_string() {
        let doc: Value = serde_json::json!({"a": 1.5, "b": " 2.5", "c": "soon", "d": null});
        let p = Path::new("x.json");
        assert_eq!(seconds(&doc, "a", p).unwrap(), 1.5);
        assert_eq!(seconds(&doc, "b", p).unwrap(), 2.5);
        assert!(seconds(&doc, "c", p).is_err());
        assert!(seconds(&doc, "d", p).is_err());
        assert!(seconds(&doc, "e", p).is_err());
    }

    fn compress_runs(dir: &Path) {
        put(
            dir,
            "results-50-50-a-cpu-compress.json",
            r#"{"joined_submission_elapsed": 2.0, "cpu_time_elapsed": 4.0}"#,
        );
        put(
            dir,
            "results-50-50-a-doca-compress.json",
            r#"{"joined_submission_elapsed": 1.0, "overall_submission_elapsed": "2.5", "ctx_stop_elapsed": 0.5}"#,
        );
        put(dir, "results-50-50-a.size", FOUR_MIB);
        put(
            dir,
            "results-100-0-a-cpu-compress.json",
            r#"{"joined_submission_elapsed": "4", "cpu_time_elapsed": 8.0}"#,
        );
        put(dir, "results-100-0-a.size", FOUR_MIB);
        put(
            dir,
            "results-0-100-a-doca-compress.json",
            r#"{"joined_submission_elapsed": 1.0, "overall_submission_elapsed": 1.5, "ctx_stop_elapsed": 0.5}"#,
        );
        put(dir, "results-0-100-a.size", FOUR_MIB);
    }

    #[test]
    fn static_and_reconfiguration_averages() {
        let dir = tempfile::tempdir().unwrap();
        compress_runs(dir.path());

        let points = sharing_series(dir.path(), COMPRESS).unwrap();
        assert_eq!(
            points,
            vec![
                SharingPoint {
                    dpu_share: 0,
                    static_mibps: 1.0,
                    reconfiguration_mibps: 1.0
                },
                SharingPoint {
                    dpu_share: 50,
                    static_mibps: 2.0,
                    reconfiguration_mibps: 4.0 / 3.0
                },
                SharingPoint {
                    dpu_share: 100,
                    static_mibps: 4.0,
                    reconfiguration_mibps: 2.0
                },
            ]
        );

        let records = sharing_records(&points);
        assert_eq!(records[0], vec!["sharing_percentage", "static", "reconfiguration"]);
        assert_eq!(records[3], vec!["100", "4.0", "2.0"]);
    }

    #[test]
    fn missing_directory_yields_an_empty_series() {
        let dir = tempfile::tempdir().unwrap();
        let points = sharing_series(&dir.path().join("host-results"), DECOMPRESS_LZ4).unwrap();
        assert!(points.is_empty());
        assert_eq!(sharing_records(&points).len(), 1);
    }

    #[test]
    fn missing_dpu_timing_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        put(
            dir.path(),
            "results-50-50-a-cpu-compress.json",
            r#"{"joined_submission_elapsed": 2.0}"#,
        );
        put(dir.path(), "results-50-50-a.size", FOUR_MIB);
        assert!(sharing_series(dir.path(), COMPRESS).is_err());
    }

    #[test]
    fn reductions() {
        let mut times = BTreeMap::new();
        let mut a = BTreeMap::new();
        a.insert(10, 3.0);
        a.insert(50, 2.0);
        a.insert(100, 6.0);
        times.insert("a".to_string(), a);
        let mut b = BTreeMap::new();
        b.insert(10, 5.0);
        b.insert(100, 10.0);
        times.insert("b".to_string(), b);

        assert_eq!(
            average_reduction(&times, Baseline::CpuShare(10)).unwrap(),
            50.0
        );
        let fastest = average_reduction(&times, Baseline::Fastest).unwrap();
        assert!((fastest - (400.0 / 6.0 + 50.0) / 2.0).abs() < 1e-9);

        times.get_mut("b").unwrap().remove(&10);
        assert!(average_reduction(&times, Baseline::CpuShare(10)).is_err());
        assert!(average_reduction(&BTreeMap::new(), Baseline::Fastest)
            .unwrap()
            .is_nan());
    }

    #[test]
    fn tables_from_disk() {
        let root = tempfile::tempdir().unwrap();
        let bf2 = root.path().join("coprocess").join(COMPRESS).join("bf2");
        std::fs::create_dir_all(&bf2).unwrap();
        compress_runs(&bf2);

        figures(root.path()).unwrap();

        let compress =
            std::fs::read_to_string(root.path().join("coprocessing-compress-deflate.csv")).unwrap();
        assert_eq!(
            compress.lines().collect::<Vec<_>>(),
            vec![
                "sharing_percentage,static,reconfiguration",
                "0,1.0,1.0",
                format!("50,2.0,{:?}", 4.0f64 / 3.0).as_str(),
                "100,4.0,2.0",
            ]
        );

        let reduction = std::fs::read_to_string(root.path().join("cpu-reduction.csv")).unwrap();
        let rows: Vec<_> = reduction.lines().collect();
        assert_eq!(rows[0], "category,bf2,bf3");
        assert_eq!(rows[1], "Compr,50.0,-1");
        assert_eq!(rows[2], "Dec-Defl,,");
        assert_eq!(rows[3], "Dec-LZ4,-1,");
    }
}
