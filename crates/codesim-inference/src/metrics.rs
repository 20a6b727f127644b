//! Binary classification metrics for labelled evaluation sets.

/// Accuracy, precision, recall and F1 of the positive class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinaryMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl BinaryMetrics {
    /// Compare predictions with ground truth. `None` for empty or
    /// mismatched inputs. Undefined ratios are reported as 0.
    pub fn compute(predicted: &[u8], truth: &[u8]) -> Option<Self> {
        if predicted.is_empty() || predicted.len() != truth.len() {
            return None;
        }

        let (mut tp, mut fp, mut fn_, mut tn) = (0usize, 0usize, 0usize, 0usize);
        for (&p, &t) in predicted.iter().zip(truth) {
            match (p == 1, t == 1) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, true) => fn_ += 1,
                (false, false) => tn += 1,
            }
        }

        let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };

        Some(Self {
            accuracy: ratio(tp + tn, predicted.len()),
            precision,
            recall,
            f1,
            support: predicted.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_predictions() {
        let m = BinaryMetrics::compute(&[1, 1, 0, 0, 1], &[1, 0, 0, 1, 1]).unwrap();
        assert!((m.accuracy - 0.6).abs() < 1e-12);
        assert!((m.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.f1 - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(m.support, 5);
    }

    #[test]
    fn test_no_positive_predictions() {
        let m = BinaryMetrics::compute(&[0, 0], &[1, 0]).unwrap();
        assert_eq!(m.precision, 0.0);
        assert_eq!(m.f1, 0.0);
        assert_eq!(m.accuracy, 0.5);
    }

    #[test]
    fn test_mismatched_lengths() {
        assert!(BinaryMetrics::compute(&[1], &[1, 0]).is_none());
        assert!(BinaryMetrics::compute(&[], &[]).is_none());
    }
}
