//! Significance of the difference between two players' round scores.

/// Two sided exact binomial test of `k` successes out of `n` trials against
/// a fair coin.
pub fn binomial_two_sided_p(k: u64, n: u64) -> f64 {
    if n == 0 {
        return 1.0;
    }
    let tail = k.min(n - k);
    if 2 * tail == n {
        return 1.0;
    }
    // pmf(i) computed in log space so large n does not overflow.
    let mut log_pmf = -(n as f64) * std::f64::consts::LN_2;
    let mut sum = log_pmf.exp();
    for i in 0..tail {
        log_pmf += ((n - i) as f64).ln() - ((i + 1) as f64).ln();
        sum += log_pmf.exp();
    }
    (2.0 * sum).min(1.0)
}

/// p-value of a sign test on two score counts, for example simulations won
/// by each player. Scores are rounded to whole counts; negative scores
/// count as zero.
pub fn sign_test_p_value(first: f64, second: f64) -> f64 {
    let count = |score: f64| {
        if score.is_finite() && score > 0.0 {
            score.round() as u64
        } else {
            0
        }
    };
    let (a, b) = (count(first), count(second));
    binomial_two_sided_p(a, a + b)
}
