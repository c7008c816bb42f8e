/// Bayes' theorem: probability of B given that A was observed.
///
/// - `prior_p_to_b`: prior probability of B.
/// - `prior_p_from_a_to_b`: probability of A when B follows.
/// - `prior_p_not_from_a_to_b`: probability of A when B does not follow.
///
/// Returns 0 when there is no evidence at all (zero denominator). Inputs are
/// not range-checked.
pub fn bayes(prior_p_to_b: f64, prior_p_from_a_to_b: f64, prior_p_not_from_a_to_b: f64) -> f64 {
    let x = prior_p_to_b * prior_p_from_a_to_b;
    let y = x + (1.0 - prior_p_to_b) * prior_p_not_from_a_to_b;

    if y == 0.0 {
        return 0.0;
    }

    x / y
}
