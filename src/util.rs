//! Small helpers shared by every subcommand: path joining, step timing, timestamps and
//! CLI validators.

use serde::{Deserialize, Serialize};

use std::time::Duration;

/// Join path components into a `String`, e.g. `dir!(&root, RESULTS_PATH, "bf2")`.
macro_rules! dir {
    ($first:expr $(, $part:expr)* $(,)?) => {{
        #[allow(unused_mut)]
        let mut path = std::path::PathBuf::from($first);
        $(
            path.push($part);
        )*
        path.to_string_lossy().into_owned()
    }};
}

/// Time the evaluation of `$body` and push `($label, elapsed)` onto `$timers`.
macro_rules! time {
    ($timers:ident, $label:expr, $body:expr) => {{
        let start = std::time::Instant::now();
        let result = $body;
        $timers.push((String::from($label), start.elapsed()));
        result
    }};
}

/// Wall-clock timestamp used to name result files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(chrono::DateTime<chrono::Local>);

impl Timestamp {
    pub const FORMAT: &'static str = "%Y-%m-%d-%H-%M-%S";

    pub fn now() -> Self {
        Timestamp(chrono::Local::now())
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use chrono::TimeZone;

        let s = String::deserialize(deserializer)?;
        let naive = chrono::NaiveDateTime::parse_from_str(&s, Self::FORMAT)
            .map_err(serde::de::Error::custom)?;
        chrono::Local
            .from_local_datetime(&naive)
            .single()
            .map(Timestamp)
            .ok_or_else(|| serde::de::Error::custom(format!("ambiguous local time: {}", s)))
    }
}

/// Render the timers collected with `time!` one per line.
pub fn timings_str(timers: &[(String, Duration)]) -> String {
    let mut s = String::new();
    for (label, d) in timers {
        s.push_str(&format!("{}: {:?}\n", label, d));
    }
    s
}

pub mod validator {
    /// clap validator accepting anything that parses as a `T`.
    pub fn is<T: std::str::FromStr>(s: String) -> Result<(), String> {
        s.parse::<T>()
            .map(|_| ())
            .map_err(|_| format!("Not a valid {}: {}", std::any::type_name::<T>(), s))
    }
}
