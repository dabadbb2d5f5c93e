//! Group-by, mean and pivot over typed rows, plus CSV output for pgfplots.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::path::Path;

/// Mean of the finite values, NaN when there are none.
pub fn mean<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let (sum, n) = values
        .into_iter()
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Mean of `value` over the rows sharing a `key`, ordered by key.
pub fn group_mean<T, K, FK, FV>(rows: &[T], key: FK, value: FV) -> BTreeMap<K, f64>
where
    K: Ord,
    FK: Fn(&T) -> K,
    FV: Fn(&T) -> f64,
{
    let mut groups: BTreeMap<K, Vec<f64>> = BTreeMap::new();
    for row in rows {
        groups.entry(key(row)).or_default().push(value(row));
    }
    groups.into_iter().map(|(k, vs)| (k, mean(vs))).collect()
}

/// Floats as pandas writes them: shortest round-trip form with a trailing `.0` for
/// integral values, a signed two-digit exponent (`1e-07`) outside `[1e-4, 1e16)`, empty
/// for NaN.
pub fn fmt_float(v: f64) -> String {
    if v.is_nan() {
        return String::new();
    }
    let s = format!("{:?}", v);
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => s,
    }
}

/// A two-dimensional table keyed by row and column, both kept sorted.
#[derive(Clone, Debug)]
pub struct Pivot<R: Ord, C: Ord> {
    index_name: String,
    columns: BTreeSet<C>,
    cells: BTreeMap<R, BTreeMap<C, f64>>,
}

impl<R, C> Pivot<R, C>
where
    R: Ord + Clone + Display,
    C: Ord + Clone + Display,
{
    pub fn new(index_name: &str) -> Self {
        Pivot {
            index_name: index_name.into(),
            columns: BTreeSet::new(),
            cells: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, row: R, col: C, value: f64) -> Result<(), failure::Error> {
        let cells = self.cells.entry(row.clone()).or_default();
        if cells.contains_key(&col) {
            failure::bail!(
                "duplicate entry for ({}, {}) in pivot over {}",
                row,
                col,
                self.index_name
            );
        }
        cells.insert(col.clone(), value);
        self.columns.insert(col);
        Ok(())
    }

    /// Insert a whole column, e.g. the result of `group_mean`.
    pub fn insert_column<I>(&mut self, col: C, series: I) -> Result<(), failure::Error>
    where
        I: IntoIterator<Item = (R, f64)>,
    {
        for (row, value) in series {
            self.insert(row, col.clone(), value)?;
        }
        Ok(())
    }

    pub fn get(&self, row: &R, col: &C) -> Option<f64> {
        self.cells.get(row).and_then(|cells| cells.get(col)).copied()
    }

    pub fn rows(&self) -> impl Iterator<Item = &R> {
        self.cells.keys()
    }

    pub fn columns(&self) -> impl Iterator<Item = &C> {
        self.columns.iter()
    }

    /// `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        (self.cells.len(), self.columns.len())
    }

    /// The largest non-NaN cell.
    pub fn max_cell(&self) -> Option<(R, C, f64)> {
        let mut best: Option<(R, C, f64)> = None;
        for (row, cells) in &self.cells {
            for (col, &v) in cells {
                if v.is_nan() {
                    continue;
                }
                if best.as_ref().map_or(true, |(_, _, b)| v > *b) {
                    best = Some((row.clone(), col.clone(), v));
                }
            }
        }
        best
    }

    /// A copy with every cell passed through `f`.
    pub fn map_values<F: Fn(f64) -> f64>(&self, f: F) -> Self {
        Pivot {
            index_name: self.index_name.clone(),
            columns: self.columns.clone(),
            cells: self
                .cells
                .iter()
                .map(|(r, cells)| {
                    (
                        r.clone(),
                        cells.iter().map(|(c, &v)| (c.clone(), f(v))).collect(),
                    )
                })
                .collect(),
        }
    }

    /// Header and rows as strings, missing cells replaced by `fill`.
    pub fn records(&self, fill: f64) -> Vec<Vec<String>> {
        let mut out = Vec::with_capacity(self.cells.len() + 1);

        let mut header = vec![self.index_name.clone()];
        header.extend(self.columns.iter().map(|c| c.to_string()));
        out.push(header);

        for (row, cells) in &self.cells {
            let mut record = vec![row.to_string()];
            for col in &self.columns {
                record.push(fmt_float(cells.get(col).copied().unwrap_or(fill)));
            }
            out.push(record);
        }
        out
    }

    pub fn write_csv(&self, path: &Path, fill: f64) -> Result<(), failure::Error> {
        write_records(path, &self.records(fill))
    }
}

pub fn write_records(path: &Path, records: &[Vec<String>]) -> Result<(), failure::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.write_record(record)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_skips_nan() {
        assert_eq!(mean(vec![1.0, f64::NAN, 3.0]), 2.0);
        assert!(mean(vec![f64::NAN]).is_nan());
        assert!(mean(Vec::new()).is_nan());
    }

    #[test]
    fn floats_print_like_python() {
        assert_eq!(fmt_float(2.0), "2.0");
        assert_eq!(fmt_float(30.5), "30.5");
        assert_eq!(fmt_float(0.0001), "0.0001");
        assert_eq!(fmt_float(1e-7), "1e-07");
        assert_eq!(fmt_float(-2.5e-12), "-2.5e-12");
        assert_eq!(fmt_float(1e16), "1e+16");
        assert_eq!(fmt_float(1.5e300), "1.5e+300");
        assert_eq!(fmt_float(f64::NAN), "");
    }

    #[test]
    fn group_mean_orders_by_key() {
        let rows = vec![("b", 1.0), ("a", 2.0), ("b", 3.0), ("a", f64::NAN)];
        let means = group_mean(&rows, |r| r.0, |r| r.1);
        assert_eq!(means.into_iter().collect::<Vec<_>>(), vec![("a", 2.0), ("b", 2.0)]);
    }

    #[test]
    fn pivot_shape_and_fill() {
        let mut p: Pivot<u64, String> = Pivot::new("size");
        p.insert(4096, "bf2".into(), 10.0).unwrap();
        p.insert(1024, "bf3".into(), 30.5).unwrap();
        p.insert(4096, "bf3".into(), 20.0).unwrap();

        assert_eq!(p.shape(), (2, 2));
        assert_eq!(p.get(&1024, &"bf2".to_string()), None);
        assert_eq!(
            p.records(0.0),
            vec![
                vec!["size", "bf2", "bf3"],
                vec!["1024", "0.0", "30.5"],
                vec!["4096", "10.0", "20.0"],
            ]
        );
        assert_eq!(p.max_cell(), Some((1024, "bf3".into(), 30.5)));
        assert!(p.insert(4096, "bf2".into(), 1.0).is_err());
    }

    #[test]
    fn numeric_columns_sort_numerically() {
        let mut p: Pivot<u64, u64> = Pivot::new("buffer");
        p.insert(8, 16, 1.0).unwrap();
        p.insert(8, 2, 2.0).unwrap();
        let cols: Vec<_> = p.columns().copied().collect();
        assert_eq!(cols, vec![2, 16]);
        let halved = p.map_values(|v| v / 2.0);
        assert_eq!(halved.get(&8, &2), Some(1.0));
    }

    #[test]
    fn csv_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        let mut p: Pivot<String, String> = Pivot::new("algo");
        p.insert_column("bf3-dpu".into(), vec![("lz4".to_string(), 2.0)])
            .unwrap();
        p.write_csv(&path, 1.0).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "algo,bf3-dpu\nlz4,2.0\n"
        );
    }
}
