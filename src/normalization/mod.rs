//! Derived-statistic helpers shared by both title normalizers.

pub mod rank;

/// Kills+assists per death, rounded to 2 decimals. Zero deaths is a sentinel
/// (the sum itself), never a division.
pub fn kda(kills: i64, assists: i64, deaths: i64) -> f64 {
    let ka = (kills + assists) as f64;
    if deaths > 0 {
        round2(ka / deaths as f64)
    } else {
        ka
    }
}

/// Ratio as a percentage in [0, 100], rounded to 1 decimal. A zero or
/// negative denominator yields 0, never NaN/inf.
pub fn percentage(numerator: f64, denominator: f64) -> f64 {
    if denominator <= 0.0 {
        return 0.0;
    }
    round1((numerator / denominator * 100.0).clamp(0.0, 100.0))
}

pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kda_with_zero_deaths_is_kills_plus_assists() {
        assert_eq!(kda(4, 2, 0), 6.0);
        assert_eq!(kda(0, 0, 0), 0.0);
    }

    #[test]
    fn kda_divides_and_rounds_when_deaths_positive() {
        assert_eq!(kda(4, 2, 2), 3.0);
        assert_eq!(kda(10, 0, 3), 3.33);
    }

    #[test]
    fn percentage_zero_denominator_is_zero() {
        assert_eq!(percentage(5.0, 0.0), 0.0);
        assert_eq!(percentage(0.0, 0.0), 0.0);
    }

    #[test]
    fn percentage_stays_within_bounds() {
        assert_eq!(percentage(3.0, 4.0), 75.0);
        assert_eq!(percentage(7.0, 7.0), 100.0);
        // Denominator smaller than numerator clamps rather than exceeding 100.
        assert_eq!(percentage(9.0, 3.0), 100.0);
    }

    #[test]
    fn percentage_rounds_to_one_decimal() {
        assert_eq!(percentage(1.0, 3.0), 33.3);
    }
}
