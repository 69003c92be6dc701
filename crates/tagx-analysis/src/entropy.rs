//! Byte histogram and Shannon entropy

/// Occurrence count of each byte value; always 256 entries.
pub fn histogram(buf: &[u8]) -> Vec<u32> {
    let mut counts = vec![0u32; 256];
    for &b in buf {
        counts[b as usize] += 1;
    }
    counts
}

/// Base-2 Shannon entropy in bits per byte, in `[0, 8]`.
///
/// `total` is the number of bytes the histogram was built from. Returns 0.0
/// for an empty histogram.
pub fn shannon_entropy(hist: &[u32], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let n = total as f64;
    let h: f64 = hist
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = f64::from(c) / n;
            -p * p.log2()
        })
        .sum();
    // rounding can leave -0.0 or a hair above 8
    h.clamp(0.0, 8.0)
}
