//! Percentage interpolation for polling phases.

/// Returns the progress value reported on `attempt` (zero based) out of
/// `attempts`, advancing linearly from `start` to `finish`.
///
/// The result is non-decreasing in `attempt`, never below `start` and never
/// above `finish`. The last attempt reports exactly `finish`.
#[must_use]
pub fn interpolate(start: u8, finish: u8, attempt: u32, attempts: u32) -> u8 {
    let lower = u32::from(start.min(finish));
    let upper = u32::from(finish);
    let steps = attempts.saturating_sub(1);
    if steps == 0 {
        return start.min(finish);
    }

    let span = upper - lower;
    let offset = span
        .saturating_mul(attempt.min(steps))
        .checked_div(steps)
        .unwrap_or(0);
    u8::try_from(lower + offset).unwrap_or(finish)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(25, 60, 0, 8, 25)]
    #[case(25, 60, 7, 8, 60)]
    #[case(30, 70, 2, 5, 50)]
    #[case(0, 100, 1, 3, 50)]
    #[case(40, 40, 3, 10, 40)]
    fn interpolates_linearly(
        #[case] start: u8,
        #[case] finish: u8,
        #[case] attempt: u32,
        #[case] attempts: u32,
        #[case] expected: u8,
    ) {
        assert_eq!(interpolate(start, finish, attempt, attempts), expected);
    }

    #[test]
    fn single_attempt_reports_start() {
        assert_eq!(interpolate(10, 90, 0, 1), 10);
        assert_eq!(interpolate(10, 90, 0, 0), 10);
    }

    #[test]
    fn attempts_past_budget_stay_at_finish() {
        assert_eq!(interpolate(10, 20, 50, 4), 20);
    }

    #[test]
    fn sequence_is_monotonic_and_bounded() {
        for attempts in 1..40_u32 {
            let values: Vec<u8> = (0..attempts)
                .map(|attempt| interpolate(35, 60, attempt, attempts))
                .collect();
            assert!(
                values.windows(2).all(|pair| pair.first() <= pair.last()),
                "non-monotonic sequence for {attempts} attempts: {values:?}"
            );
            assert!(values.iter().all(|value| (35..=60).contains(value)));
        }
    }

    #[test]
    fn inverted_bounds_collapse_to_finish() {
        assert_eq!(interpolate(80, 20, 0, 5), 20);
        assert_eq!(interpolate(80, 20, 4, 5), 20);
    }
}
