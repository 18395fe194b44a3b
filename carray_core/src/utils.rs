/// Longest container or table printed in full; longer ones show the first
/// and last three items.
pub(crate) const DISPLAY_FULL_LIMIT: usize = 100;

/// Render a byte count with a binary unit suffix.
pub fn human_bytes(n: usize) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

/// Compression ratio, 1.0 for empty containers.
pub(crate) fn ratio(nbytes: usize, cbytes: usize) -> f64 {
    if cbytes == 0 {
        return 1.0;
    }
    nbytes as f64 / cbytes as f64
}

/// Number of items in `start..stop` taken every `step`.
pub(crate) fn range_len(start: usize, stop: usize, step: usize) -> usize {
    if stop <= start {
        0
    } else {
        (stop - start).div_ceil(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_bytes_units() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(1536), "1.50 KB");
        assert_eq!(human_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn strided_range_length() {
        assert_eq!(range_len(0, 10, 3), 4);
        assert_eq!(range_len(5, 5, 1), 0);
        assert_eq!(range_len(7, 2, 1), 0);
    }
}
