use serde::{Deserialize, Serialize};

/// Measured correction polynomial, coefficients highest degree first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationPolynomial {
    coefficients: Vec<f64>,
}

impl CalibrationPolynomial {
    pub fn new(coefficients: impl Into<Vec<f64>>) -> Self {
        Self {
            coefficients: coefficients.into(),
        }
    }

    /// Horner evaluation in stored order: `out = out * x + c[i]`.
    ///
    /// An empty polynomial evaluates to zero.
    pub fn evaluate(&self, x: f64) -> f64 {
        self.coefficients.iter().fold(0.0, |out, &c| out * x + c)
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    /// Highest power, `None` when empty
    pub fn degree(&self) -> Option<usize> {
        self.coefficients.len().checked_sub(1)
    }

    pub(crate) fn is_finite(&self) -> bool {
        self.coefficients.iter().all(|c| c.is_finite())
    }
}

impl From<Vec<f64>> for CalibrationPolynomial {
    fn from(coefficients: Vec<f64>) -> Self {
        Self::new(coefficients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_horner_quadratic() {
        let p = CalibrationPolynomial::new(vec![1.0, 2.0, 3.0]);
        assert_eq!(p.evaluate(2.0), 11.0);
        assert_eq!(p.degree(), Some(2));
    }

    #[test]
    fn test_horner_degree_zero_and_one() {
        let constant = CalibrationPolynomial::new(vec![-54.852]);
        assert_eq!(constant.evaluate(123.0), -54.852);
        assert_eq!(constant.degree(), Some(0));

        let line = CalibrationPolynomial::new(vec![-0.5192, 243.9]);
        assert!((line.evaluate(10.0) - (243.9 - 5.192)).abs() < 1e-12);
    }

    #[test]
    fn test_horner_degree_seven() {
        let coefs = [2.0, -1.0, 0.5, 3.0, -4.0, 0.25, 1.0, -7.0];
        let p = CalibrationPolynomial::new(coefs.to_vec());
        assert_eq!(p.degree(), Some(7));

        let x: f64 = 1.5;
        let expected: f64 = coefs
            .iter()
            .enumerate()
            .map(|(i, c)| c * x.powi(7 - i as i32))
            .sum();
        assert!((p.evaluate(x) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_empty_is_zero() {
        let p = CalibrationPolynomial::default();
        assert!(p.is_empty());
        assert_eq!(p.degree(), None);
        assert_eq!(p.evaluate(42.0), 0.0);
    }

    #[test]
    fn test_serializes_as_plain_list() {
        let p = CalibrationPolynomial::new(vec![1.0, 2.5]);
        assert_eq!(serde_json::to_string(&p).unwrap(), "[1.0,2.5]");
    }
}
