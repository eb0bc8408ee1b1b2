// Log-domain helpers shared by the sampler and the Stirling engine.

use rand::Rng;

/// Computes ln(exp(a) + exp(b)) without leaving the log domain.
pub fn log_add(a: f64, b: f64) -> f64 {
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    if lo == f64::NEG_INFINITY {
        return hi;
    }
    hi + (1.0 + (lo - hi).exp()).ln()
}

/// Computes ln(sum(exp(logs))).
pub fn sum_in_log_domain(logs: &[f64]) -> f64 {
    let max = logs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = logs.iter().map(|&x| (x - max).exp()).sum();
    max + sum.ln()
}

/// Shifts `logs` in place so that the exponentiated values sum to one.
pub fn normalize_in_log_domain(logs: &mut [f64]) {
    let log_sum = sum_in_log_domain(logs);
    for x in logs.iter_mut() {
        *x -= log_sum;
    }
}

/// Computes log((c|d)_n), the log Pochhammer symbol with increment d.
pub fn log_pochhammer(c: f64, d: f64, n: usize) -> f64 {
    if d == 0.0 {
        n as f64 * c.ln()
    } else {
        n as f64 * d.ln() + log_gamma_ratio(c / d, n)
    }
}

/// Computes log(Gamma(t + n) / Gamma(t)) by direct product.
pub fn log_gamma_ratio(t: f64, n: usize) -> f64 {
    (0..n).map(|i| (i as f64 + t).ln()).sum()
}

/// Draws an index from a normalized probability vector by inverse CDF.
pub fn sample_categorical<T: Rng>(rng: &mut T, probs: &[f64]) -> usize {
    let r: f64 = rng.random();
    let mut chosen = 0;
    let mut cumulative = probs[0];
    while r > cumulative && chosen + 1 < probs.len() {
        chosen += 1;
        cumulative += probs[chosen];
    }
    chosen
}
