use std::cmp::Ordering;

/// Round half away from zero to one decimal place
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Continuous percentile with linear interpolation between closest ranks.
/// `sorted` must be ascending.
pub fn percentile_cont(sorted: &[i64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let lo_val = sorted[lo] as f64;
    let hi_val = sorted[hi] as f64;
    Some(lo_val + (pos - lo as f64) * (hi_val - lo_val))
}

/// `closed / total * 100`, rounded to one decimal
pub fn close_rate_pct(closed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round1(closed as f64 * 100.0 / total as f64)
}

/// Running per-group tallies for the resolution metrics
#[derive(Debug, Clone, Default)]
pub struct GroupStats {
    pub total: u64,
    pub closed: u64,
    resolution_days: Vec<i64>,
    sorted: bool,
}

impl GroupStats {
    pub fn add(&mut self, closed: bool, resolution_days: Option<i64>) {
        self.total += 1;
        if closed {
            self.closed += 1;
        }
        if let Some(days) = resolution_days {
            self.resolution_days.push(days);
            self.sorted = false;
        }
    }

    fn sorted_days(&mut self) -> &[i64] {
        if !self.sorted {
            self.resolution_days.sort_unstable();
            self.sorted = true;
        }
        &self.resolution_days
    }

    pub fn avg_days(&self) -> Option<f64> {
        if self.resolution_days.is_empty() {
            return None;
        }
        let sum: i64 = self.resolution_days.iter().sum();
        Some(round1(sum as f64 / self.resolution_days.len() as f64))
    }

    pub fn median_days(&mut self) -> Option<f64> {
        percentile_cont(self.sorted_days(), 0.5)
    }

    pub fn p90_days(&mut self) -> Option<f64> {
        percentile_cont(self.sorted_days(), 0.9)
    }

    pub fn close_rate_pct(&self) -> f64 {
        close_rate_pct(self.closed, self.total)
    }
}

/// Ascending order with `None` after every value
pub fn cmp_nulls_last<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
