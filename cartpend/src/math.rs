use nalgebra::{DMatrix, DVector};

/// Discrete convolution, which is also polynomial multiplication on
/// descending coefficient vectors.
pub fn convolve(a: &DVector<f64>, b: &DVector<f64>) -> DVector<f64> {
    let n = a.len();
    let m = b.len();
    let mut result = DVector::from_element(n + m - 1, 0.0);

    for i in 0..(n + m - 1) {
        let mut sum = 0.0;
        for k in 0..=i {
            if k < n && (i - k) < m {
                sum += a[k] * b[i - k];
            }
        }
        result[i] = sum;
    }

    result
}

/// Add two descending coefficient vectors, front-padding the shorter one.
pub fn polynomial_sum(a: &DVector<f64>, b: &DVector<f64>) -> DVector<f64> {
    let n = a.len().max(b.len());
    let mut result = DVector::from_element(n, 0.0);
    for (i, x) in a.iter().enumerate() {
        result[n - a.len() + i] += x;
    }
    for (i, x) in b.iter().enumerate() {
        result[n - b.len() + i] += x;
    }

    result
}

pub fn expm(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    let n = matrix.nrows();
    let mut result = DMatrix::identity(n, n);
    let mut power = DMatrix::identity(n, n);
    let mut factorial = 1.0;

    for i in 1..=20 {
        power *= matrix;
        factorial *= i as f64;
        result += &power / factorial;
    }

    result
}

pub fn factorial(n: usize) -> usize {
    if n == 0 {
        1
    } else {
        n * factorial(n - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector};

    #[test]
    fn test_convolve() {
        let a = dvector![1.0, 2.0, 3.0];
        let b = dvector![4.0, 5.0];
        assert_relative_eq!(convolve(&a, &b), dvector![4.0, 13.0, 22.0, 15.0]);
    }

    #[test]
    fn test_polynomial_sum() {
        let a = dvector![1.0, 0.0, -2.0];
        let b = dvector![3.0, 1.0];
        assert_relative_eq!(polynomial_sum(&a, &b), dvector![1.0, 3.0, -1.0]);
        assert_relative_eq!(polynomial_sum(&b, &a), dvector![1.0, 3.0, -1.0]);
    }

    #[test]
    fn test_expm() {
        let x = dmatrix![1.0, 1.0; -1.0, 1.0];
        let result = expm(&x);
        assert_relative_eq!(
            result,
            dmatrix![1.46869394, 2.28735529; -2.28735529,  1.46869394],
            epsilon = 1e-8
        );
    }

    #[test]
    fn test_factorial() {
        assert_eq!(factorial(0), 1);
        assert_eq!(factorial(5), 120);
    }
}
