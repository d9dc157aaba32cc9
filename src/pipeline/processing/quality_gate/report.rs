//! Human-readable rendering of a [`ValidationReport`].

use std::fmt::{self, Display, Formatter};

use super::{CheckResult, CheckStatus, Findings, ValidationReport};

const RULE: &str = "============================================================";

fn range(r: Option<(f64, f64)>) -> String {
    match r {
        Some((lo, hi)) => format!("{:.4} to {:.4}", lo, hi),
        None => "n/a".to_string(),
    }
}

fn write_findings(f: &mut Formatter<'_>, check: &CheckResult) -> fmt::Result {
    match &check.findings {
        Findings::None => Ok(()),
        Findings::NegativeResolution { examples } => {
            for e in examples {
                writeln!(
                    f,
                    "         {} | {} | {} days | requested {} closed {}",
                    e.service_request_id.as_deref().unwrap_or("-"),
                    e.service_name.as_deref().unwrap_or("-"),
                    e.resolution_days,
                    e.date_requested,
                    e.date_closed.map(|d| d.to_string()).unwrap_or_else(|| "-".into()),
                )?;
            }
            Ok(())
        }
        Findings::GeoOutliers { lat_range, lng_range } => {
            if check.affected > 0 {
                writeln!(f, "         lat {} | lng {}", range(*lat_range), range(*lng_range))?;
            }
            Ok(())
        }
        Findings::ExtremeResolution { max_days, buckets } => {
            for b in buckets {
                writeln!(f, "         {}: {}", b.bucket, b.count)?;
            }
            if let Some(max) = max_days {
                writeln!(f, "         max resolution: {} days", max)?;
            }
            Ok(())
        }
        Findings::MissingFields { fields } => {
            for m in fields {
                writeln!(f, "         [{:<4}] {:<18} {:>8} ({:.2}%)", m.status, m.field, m.missing, m.pct)?;
            }
            Ok(())
        }
        Findings::Duplicates { duplicated_ids, total_rows } => {
            if *duplicated_ids > 0 {
                writeln!(f, "         {} ids repeated across {} rows", duplicated_ids, total_rows)?;
            }
            Ok(())
        }
        Findings::StatusDistribution { statuses } => {
            for s in statuses {
                writeln!(
                    f,
                    "         {:<20} {:>8} ({:.1}%)",
                    s.status.as_deref().unwrap_or("(NULL)"),
                    s.count,
                    s.pct
                )?;
            }
            Ok(())
        }
        Findings::YearOverYear { years } => {
            for y in years {
                let change = y
                    .change_pct
                    .map(|c| format!("{:+.1}%", c))
                    .unwrap_or_default();
                let flag = if y.anomaly { "  <-- anomaly" } else { "" };
                writeln!(f, "         {} {:>8} {:>8}{}", y.year, y.count, change, flag)?;
            }
            Ok(())
        }
        Findings::AggregationFiles { files } => {
            for file in files {
                match (file.status, file.rows) {
                    (CheckStatus::Pass, Some(rows)) => writeln!(
                        f,
                        "         [PASS] {:<32} {:>8} rows {:>10} bytes",
                        file.file,
                        rows,
                        file.bytes.unwrap_or_default()
                    )?,
                    _ => match &file.error {
                        Some(e) => writeln!(f, "         [FAIL] {:<32} unreadable: {}", file.file, e)?,
                        None => writeln!(f, "         [FAIL] {:<32} missing", file.file)?,
                    },
                }
            }
            Ok(())
        }
        Findings::MapConsistency { map_points, expected } => match map_points {
            Some(n) => writeln!(f, "         map_points: {} | in-bounds canonical rows: {}", n, expected),
            None => writeln!(f, "         map_points file not present, skipped"),
        },
    }
}

impl Display for ValidationReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", RULE)?;
        writeln!(f, "DATA QUALITY VALIDATION")?;
        writeln!(f, "{}", RULE)?;
        writeln!(f, "Rows: {}", self.total_rows)?;
        if let Some((first, last)) = self.date_range {
            writeln!(f, "Date range: {} to {}", first, last)?;
        }
        writeln!(f)?;

        for check in &self.checks {
            writeln!(f, "{:>2}. [{:<4}] {} ({})", check.number, check.status, check.title, check.affected)?;
            write_findings(f, check)?;
        }

        writeln!(f)?;
        writeln!(f, "{}", RULE)?;
        if self.passed() {
            writeln!(f, "All checks passed.")?;
        } else {
            writeln!(f, "{} issue(s) found.", self.issues)?;
        }
        write!(f, "{}", RULE)
    }
}
