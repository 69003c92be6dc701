//! Periodicity and printable-text signals

/// Longest period considered by [`repeating_period`].
pub const MAX_PERIOD: usize = 32;

/// Fewer comparisons than this say nothing about periodicity.
const MIN_CHECKS: usize = 4;

/// Smallest period `p` in `1..=32` for which `buf[i] == buf[i + p]` holds on
/// a strict majority of the checked offsets.
///
/// A period is only considered when the buffer holds at least two full
/// repetitions of it. A leftover XOR layer with a short key shows up here.
pub fn repeating_period(buf: &[u8]) -> Option<usize> {
    (1..=MAX_PERIOD)
        .take_while(|&p| buf.len() >= 2 * p)
        .find(|&p| {
            let checks = buf.len() - p;
            if checks < MIN_CHECKS {
                return false;
            }
            let matches = buf
                .iter()
                .zip(&buf[p..])
                .filter(|(a, b)| a == b)
                .count();
            matches * 2 > checks
        })
}

/// Printable ASCII plus tab, newline and carriage return.
pub fn is_printable(b: u8) -> bool {
    matches!(b, 0x20..=0x7E | b'\t' | b'\n' | b'\r')
}

pub fn longest_ascii_run(buf: &[u8]) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for &b in buf {
        if is_printable(b) {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

pub fn printable_ratio(buf: &[u8]) -> f64 {
    if buf.is_empty() {
        return 0.0;
    }
    let printable = buf.iter().filter(|&&b| is_printable(b)).count();
    printable as f64 / buf.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_buffer_has_period_one() {
        assert_eq!(repeating_period(&[0xAB; 40]), Some(1));
    }

    #[test]
    fn exact_period_four() {
        let buf: Vec<u8> = b"\x01\x02\x03\x04".iter().copied().cycle().take(40).collect();
        assert_eq!(repeating_period(&buf), Some(4));
    }

    #[test]
    fn period_survives_minority_noise() {
        let mut buf: Vec<u8> = b"WXYZ".iter().copied().cycle().take(64).collect();
        buf[10] = 0;
        buf[33] = 0xFF;
        assert_eq!(repeating_period(&buf), Some(4));
    }

    #[test]
    fn short_or_aperiodic_buffers_have_no_period() {
        assert_eq!(repeating_period(b"abc"), None);
        assert_eq!(repeating_period(b"The quick brown fox jumps over the lazy dog"), None);
        let counting: Vec<u8> = (0..=255u8).collect();
        assert_eq!(repeating_period(&counting), None);
    }

    #[test]
    fn ascii_runs() {
        assert_eq!(longest_ascii_run(b""), 0);
        assert_eq!(longest_ascii_run(b"\x00hello\x01hi\x02"), 5);
        assert_eq!(longest_ascii_run(b"line one\r\nline two"), 18);
    }

    #[test]
    fn printable_ratio_counts_whitespace() {
        assert_eq!(printable_ratio(b""), 0.0);
        assert_eq!(printable_ratio(b"a\tb\n"), 1.0);
        assert_eq!(printable_ratio(b"ab\x00\xFF"), 0.5);
    }
}
