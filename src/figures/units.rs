//! Throughput strings as printed by `doca_bench` (`"3.5 GiB/s"`, `"12.1 MOperations/s"`).

/// Bytes per second in one of each unit `doca_bench` may print.
pub fn byte_unit_multiplier(unit: &str) -> Option<f64> {
    const KI: f64 = 1024.0;
    let m = match unit {
        "B/s" => 1.0,
        "KiB/s" => KI,
        "MiB/s" => KI * KI,
        "GiB/s" => KI * KI * KI,
        "TiB/s" => KI * KI * KI * KI,
        "kb/s" => 1e3 / 8.0,
        "Mb/s" => 1e6 / 8.0,
        "Gb/s" => 1e9 / 8.0,
        "Tb/s" => 1e12 / 8.0,
        "Kib/s" => KI / 8.0,
        "Mib/s" => KI * KI / 8.0,
        "Gib/s" => KI * KI * KI / 8.0,
        "Tib/s" => KI * KI * KI * KI / 8.0,
        _ => return None,
    };
    Some(m)
}

/// `"<number> <unit>"` to bytes per second. Anything else is `None`.
pub fn parse_bytes_throughput(value: &str) -> Option<f64> {
    let mut parts = value.split_whitespace();
    let (number, unit) = match (parts.next(), parts.next(), parts.next()) {
        (Some(number), Some(unit), None) => (number, unit),
        _ => return None,
    };
    let number: f64 = number.parse().ok()?;
    Some(number * byte_unit_multiplier(unit)?)
}

/// The leading number of an operation rate.
pub fn parse_ops_throughput(value: &str) -> Option<f64> {
    value.split_whitespace().next()?.parse().ok()
}

const THROUGHPUT_UNITS: [&str; 5] = ["B/s", "KiB/s", "MiB/s", "GiB/s", "TiB/s"];

/// Scale bytes per second to the largest binary unit below 1024 and round to an integer,
/// e.g. `(12, "GiB/s")`.
pub fn format_throughput_bytes(mut value: f64) -> (i64, &'static str) {
    let mut idx = 0;
    while value >= 1024.0 && idx < THROUGHPUT_UNITS.len() - 1 {
        value /= 1024.0;
        idx += 1;
    }
    (round_half_even(value), THROUGHPUT_UNITS[idx])
}

/// Heatmap row label for a buffer size, e.g. `"64 KiB"`.
pub fn format_bytes_label(value: f64) -> String {
    let (scaled, unit) = format_throughput_bytes(value);
    if scaled >= 1 {
        format!("{} {}", scaled, unit.trim_end_matches("/s"))
    } else {
        format!("{} B", value as i64)
    }
}

fn round_half_even(value: f64) -> i64 {
    // `{:.0}` rounds ties to even.
    format!("{:.0}", value).parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(got: Option<f64>, want: f64) {
        let got = got.unwrap();
        assert!((got - want).abs() <= want.abs() * 1e-12, "{} != {}", got, want);
    }

    #[test]
    fn every_byte_unit() {
        assert_close(parse_bytes_throughput("1 B/s"), 1.0);
        assert_close(parse_bytes_throughput("2 KiB/s"), 2048.0);
        assert_close(parse_bytes_throughput("1.5 MiB/s"), 1.5 * 1048576.0);
        assert_close(parse_bytes_throughput("3.5 GiB/s"), 3.5 * 1073741824.0);
        assert_close(parse_bytes_throughput("1 TiB/s"), 1099511627776.0);
        assert_close(parse_bytes_throughput("8 kb/s"), 1000.0);
        assert_close(parse_bytes_throughput("8 Mb/s"), 1e6);
        assert_close(parse_bytes_throughput("100 Gb/s"), 12.5e9);
        assert_close(parse_bytes_throughput("2 Tb/s"), 0.25e12);
        assert_close(parse_bytes_throughput("8 Kib/s"), 1024.0);
        assert_close(parse_bytes_throughput("8 Mib/s"), 1048576.0);
        assert_close(parse_bytes_throughput("8 Gib/s"), 1073741824.0);
        assert_close(parse_bytes_throughput("8 Tib/s"), 1099511627776.0);
    }

    #[test]
    fn malformed_throughput_is_none() {
        assert_eq!(parse_bytes_throughput(""), None);
        assert_eq!(parse_bytes_throughput("3.5"), None);
        assert_eq!(parse_bytes_throughput("3.5 PiB/s"), None);
        assert_eq!(parse_bytes_throughput("fast GiB/s"), None);
        assert_eq!(parse_bytes_throughput("3.5 GiB/s extra"), None);
        assert_eq!(parse_bytes_throughput("3.5 gib/s"), None);
    }

    #[test]
    fn ops_rate_takes_the_leading_number() {
        assert_eq!(parse_ops_throughput("12.5 MOperations/s"), Some(12.5));
        assert_eq!(parse_ops_throughput("n/a"), None);
        assert_eq!(parse_ops_throughput(""), None);
    }

    #[test]
    fn formatting_scales_by_1024() {
        assert_eq!(format_throughput_bytes(512.0), (512, "B/s"));
        assert_eq!(format_throughput_bytes(3.0 * 1073741824.0), (3, "GiB/s"));
        assert_eq!(format_throughput_bytes(12.4 * 1073741824.0), (12, "GiB/s"));
        assert_eq!(format_throughput_bytes(5000.0 * 1099511627776.0), (5000, "TiB/s"));
        assert_eq!(format_bytes_label(65536.0), "64 KiB");
        assert_eq!(format_bytes_label(2097152.0), "2 MiB");
        assert_eq!(format_bytes_label(8192.0), "8 KiB");
        assert_eq!(format_bytes_label(0.25), "0 B");
    }
}
