//! Persistence rule: a weak regime needs two consecutive below-average periods.

/// 1 where the z-score is negative. Undefined z-scores never count as weak.
pub fn weak_signals(zscores: &[Option<f64>]) -> Vec<u8> {
    zscores
        .iter()
        .map(|z| u8::from(matches!(z, Some(value) if *value < 0.0)))
        .collect()
}

/// Label series: 1 at `t` iff the weak signal holds at both `t` and `t - 1`.
pub fn regime_labels(zscores: &[Option<f64>]) -> Vec<u8> {
    let weak = weak_signals(zscores);
    weak.iter()
        .enumerate()
        .map(|(idx, signal)| {
            let previous = idx.checked_sub(1).map(|prev| weak[prev]).unwrap_or(0);
            u8::from(*signal == 1 && previous == 1)
        })
        .collect()
}

/// Label of the most recent period. `None` unless both the latest z-score
/// and the one before it are defined.
pub fn latest_label(zscores: &[Option<f64>]) -> Option<u8> {
    match zscores {
        [.., Some(previous), Some(current)] => Some(u8::from(*previous < 0.0 && *current < 0.0)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_negative_period_is_noise() {
        let z = vec![Some(0.5), Some(-1.0), Some(0.2)];
        assert_eq!(regime_labels(&z), vec![0, 0, 0]);
    }

    #[test]
    fn two_consecutive_negatives_trigger_label() {
        let z = vec![Some(0.5), Some(-1.0), Some(-0.1), Some(-0.3), Some(0.4)];
        assert_eq!(regime_labels(&z), vec![0, 0, 1, 1, 0]);
        assert_eq!(latest_label(&z), Some(0));
    }

    #[test]
    fn undefined_zscore_breaks_persistence() {
        let z = vec![Some(-1.0), None, Some(-1.0), Some(-2.0)];
        assert_eq!(weak_signals(&z), vec![1, 0, 1, 1]);
        assert_eq!(regime_labels(&z), vec![0, 0, 0, 1]);
    }

    #[test]
    fn zero_zscore_is_not_weak() {
        let z = vec![Some(0.0), Some(0.0)];
        assert_eq!(latest_label(&z), Some(0));
        assert_eq!(latest_label(&[]), None);
    }

    #[test]
    fn latest_label_needs_both_recent_zscores() {
        assert_eq!(latest_label(&[None, None, None]), None);
        assert_eq!(latest_label(&[Some(-1.0), None]), None);
        assert_eq!(latest_label(&[None, Some(-1.0)]), None);
        assert_eq!(latest_label(&[Some(-1.0)]), None);
        assert_eq!(latest_label(&[None, Some(-1.0), Some(-0.2)]), Some(1));
    }
}
