//! String helpers for rule messages and heuristics.

/// Shannon entropy of `s` in bits per byte.
///
/// Random tokens such as API keys score above 4.5; prose and identifiers
/// stay well below.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn shannon_entropy(s: &str) -> f64 {
    let bytes = s.as_bytes();
    if bytes.is_empty() {
        return 0.0;
    }

    let mut histogram = [0u32; 256];
    for &b in bytes {
        histogram[usize::from(b)] += 1;
    }

    let len = bytes.len() as f64;
    histogram
        .iter()
        .filter(|&&count| count > 0)
        .map(|&count| {
            let p = f64::from(count) / len;
            -p * p.log2()
        })
        .sum()
}

/// Shortens `s` to at most `max` characters, appending `...` when cut.
#[must_use]
pub fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &s[..end]),
        None => s.to_string(),
    }
}
