//! Numeric transfer functions and state-space simulation.
//!
//! Coefficients are stored in descending powers of `s`. Simulation goes
//! through the controllable canonical form and an exact matrix-exponential
//! discretization of the combined state/input block matrix, so marginally
//! stable plants (the cart-pole has poles on the axis) do not drift the way
//! a naive Euler stepper would.

use std::ops::{Add, Mul, Neg};

use nalgebra::{stack, DMatrix, DVector};

use crate::error::{Error, Result};
use crate::math::{convolve, expm, polynomial_sum};
use crate::model::NumericGains;

#[derive(Clone, Debug, PartialEq)]
pub struct TransferFunction {
    pub num: DVector<f64>,
    pub den: DVector<f64>,
}

impl TransferFunction {
    pub fn new(num: DVector<f64>, den: DVector<f64>) -> Result<Self> {
        if den.iter().all(|c| *c == 0.0) {
            return Err(Error::SingularDenominator);
        }
        Ok(Self { num, den })
    }

    /// `-c / (s^2 - d)`
    pub fn force_to_angle(gains: &NumericGains) -> Result<Self> {
        Self::new(
            DVector::from_vec(vec![-gains.c]),
            DVector::from_vec(vec![1.0, 0.0, -gains.d]),
        )
    }

    /// `(a s^2 - a d + b c) / (s^4 - d s^2)`
    pub fn force_to_position(gains: &NumericGains) -> Result<Self> {
        Self::new(
            DVector::from_vec(vec![gains.a, 0.0, gains.b * gains.c - gains.a * gains.d]),
            DVector::from_vec(vec![1.0, 0.0, -gains.d, 0.0, 0.0]),
        )
    }

    /// Strip leading zero coefficients and scale to a monic denominator.
    pub fn normalized(&self) -> Result<Self> {
        let den_lead = self
            .den
            .iter()
            .position(|c| *c != 0.0)
            .ok_or(Error::SingularDenominator)?;
        let num_lead = self
            .num
            .iter()
            .position(|c| *c != 0.0)
            .unwrap_or(self.num.len() - 1);

        let scale = self.den[den_lead];
        let num = self.num.rows(num_lead, self.num.len() - num_lead) / scale;
        let den = self.den.rows(den_lead, self.den.len() - den_lead) / scale;
        Self::new(num.into_owned(), den.into_owned())
    }

    pub fn impulse_response(&self, t: &DVector<f64>) -> Result<DVector<f64>> {
        let state_space = StateSpace::from(self.normalized()?);
        Ok(state_space.impulse(t))
    }
}

impl Neg for &TransferFunction {
    type Output = TransferFunction;

    fn neg(self) -> TransferFunction {
        TransferFunction {
            num: -self.num.clone(),
            den: self.den.clone(),
        }
    }
}

impl Mul for &TransferFunction {
    type Output = TransferFunction;

    fn mul(self, rhs: &TransferFunction) -> TransferFunction {
        TransferFunction {
            num: convolve(&self.num, &rhs.num),
            den: convolve(&self.den, &rhs.den),
        }
    }
}

impl Add for &TransferFunction {
    type Output = TransferFunction;

    fn add(self, rhs: &TransferFunction) -> TransferFunction {
        TransferFunction {
            num: polynomial_sum(
                &convolve(&self.num, &rhs.den),
                &convolve(&rhs.num, &self.den),
            ),
            den: convolve(&self.den, &rhs.den),
        }
    }
}

#[derive(Clone, Debug)]
pub struct StateSpace {
    pub a: DMatrix<f64>,
    pub b: DMatrix<f64>,
    pub c: DMatrix<f64>,
    pub d: DMatrix<f64>,
}

impl From<TransferFunction> for StateSpace {
    /// Controllable canonical form. The transfer function must be proper;
    /// [`TransferFunction::normalized`] produces the expected shape.
    fn from(tf: TransferFunction) -> Self {
        assert!(
            tf.den.len() >= tf.num.len(),
            "The order of the denominator must be greater than or equal to the order of the numerator."
        );
        assert!(
            tf.den.len() >= 2,
            "The denominator must have at least one pole."
        );
        let n = tf.den.len() - 1;

        let num = stack![DVector::zeros(tf.den.len() - tf.num.len()); tf.num.clone()] / tf.den[0];
        let den = tf.den.clone() / tf.den[0];

        let a = stack![
            -den.rows(1, n).transpose();
            DMatrix::identity(n - 1, n)
        ];
        let b = DMatrix::identity(n, 1);
        let c = DMatrix::from_row_slice(1, n, num.rows(1, n).as_slice())
            - num[0] * DMatrix::from_row_slice(1, n, den.rows(1, n).as_slice());
        let d = DMatrix::from_row_slice(1, 1, &[num[0]]);

        StateSpace { a, b, c, d }
    }
}

impl StateSpace {
    /// Simulate from `x0` over a uniform time grid with linearly
    /// interpolated inputs, via the exact block-matrix discretization.
    pub fn simulate(&self, x0: &DVector<f64>, inputs: &DVector<f64>, t: &DVector<f64>) -> DVector<f64> {
        let n_states = self.a.nrows();
        let n_inputs = self.b.ncols();

        let mut xout = DMatrix::<f64>::zeros(t.len(), n_states);
        xout.set_row(0, &x0.transpose());

        let dt = t[1] - t[0];

        let m = stack![
            stack![self.a.clone() * dt, self.b.clone() * dt, DMatrix::zeros(n_states, n_inputs)];
            stack![DMatrix::zeros(n_inputs, n_states + n_inputs), DMatrix::identity(n_inputs, n_inputs)];
            DMatrix::zeros(n_inputs, n_states + 2 * n_inputs);
        ];

        let exp_mt = expm(&m.transpose());
        let ad = exp_mt.view((0, 0), (n_states, n_states));
        let bd1 = exp_mt.view(
            (n_states + n_inputs, 0),
            (m.nrows() - n_states - n_inputs, n_states),
        );
        let bd0 = exp_mt.view((n_states, 0), (n_inputs, n_states)) - bd1;

        for i in 1..t.len() {
            xout.set_row(
                i,
                &(xout.row(i - 1) * ad + inputs[i - 1] * &bd0 + inputs[i] * bd1),
            );
        }

        let mut output =
            DVector::from_column_slice((xout * self.c.transpose()).column(0).as_slice());
        for i in 0..t.len() {
            output[i] += self.d[(0, 0)] * inputs[i];
        }

        output
    }

    /// Impulse response: start from `x0 = b` with zero input.
    pub fn impulse(&self, t: &DVector<f64>) -> DVector<f64> {
        let x0: DVector<f64> = self.b.column(0).into();
        let inputs = DVector::from_element(t.len(), 0.0);

        self.simulate(&x0, &inputs, t)
    }
}
