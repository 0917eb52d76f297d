//! Symbolic transfer functions of the linearized cart-pole.
//!
//! The two plant models transfer the disturbance force to rod angle and to
//! cart position:
//!
//! ```text
//! G_theta(s) = -c / (s^2 - d)
//! G_x(s)     = (a s^2 - a d + b c) / (s^4 - d s^2)
//! ```
//!
//! Denominators are stored factored as `s^k * prod(quadratics)` rather than
//! expanded, so the response solver sees the pole structure directly and no
//! pole-zero cancellation can sneak in. `G_x` keeps its double pole at the
//! origin even though `a d = b c + something` could tempt a cancellation for
//! particular parameters; the marginal ramp behavior is the point of the
//! analysis.

use std::collections::BTreeMap;

use nalgebra::DVector;

use crate::error::Result;
use crate::expr::{Expr, Symbol};
use crate::model::LinearGains;
use crate::tf::TransferFunction;

/// Dense symbolic polynomial in `s`, coefficients in descending degree.
#[derive(Clone, Debug, PartialEq)]
pub struct Poly {
    coeffs: Vec<Expr>,
}

impl Poly {
    pub fn new(coeffs: Vec<Expr>) -> Self {
        assert!(!coeffs.is_empty(), "polynomial needs at least one coefficient");
        Poly { coeffs }
    }

    pub fn constant(value: Expr) -> Self {
        Poly { coeffs: vec![value] }
    }

    pub fn coeffs(&self) -> &[Expr] {
        &self.coeffs
    }

    pub fn degree(&self) -> usize {
        self.coeffs.len() - 1
    }

    /// Coefficient of `s^k`, zero beyond the stored degree.
    pub fn coeff(&self, k: usize) -> Expr {
        if k > self.degree() {
            Expr::num(0)
        } else {
            self.coeffs[self.degree() - k].clone()
        }
    }

    pub fn is_zero(&self) -> bool {
        self.coeffs.iter().all(Expr::is_zero)
    }

    pub fn simplify(&self) -> Poly {
        Poly {
            coeffs: self.coeffs.iter().map(Expr::simplify).collect(),
        }
    }

    /// Drop leading zero coefficients, keeping at least one.
    pub fn trimmed(&self) -> Poly {
        let simplified = self.simplify();
        let lead = simplified
            .coeffs
            .iter()
            .position(|c| !c.is_zero())
            .unwrap_or(simplified.coeffs.len() - 1);
        Poly {
            coeffs: simplified.coeffs[lead..].to_vec(),
        }
    }

    pub fn scale(&self, factor: &Expr) -> Poly {
        Poly {
            coeffs: self
                .coeffs
                .iter()
                .map(|c| (factor.clone() * c.clone()).simplify())
                .collect(),
        }
    }

    pub fn mul(&self, other: &Poly) -> Poly {
        let mut coeffs = vec![Expr::num(0); self.coeffs.len() + other.coeffs.len() - 1];
        for (i, a) in self.coeffs.iter().enumerate() {
            for (j, b) in other.coeffs.iter().enumerate() {
                let entry = coeffs[i + j].clone() + a.clone() * b.clone();
                coeffs[i + j] = entry;
            }
        }
        Poly {
            coeffs: coeffs.into_iter().map(|c| c.simplify()).collect(),
        }
    }

    /// Horner evaluation at a symbolic point.
    pub fn eval(&self, at: &Expr) -> Expr {
        let mut acc = Expr::num(0);
        for coeff in &self.coeffs {
            acc = acc * at.clone() + coeff.clone();
        }
        acc.simplify()
    }

    pub fn derivative(&self) -> Poly {
        if self.degree() == 0 {
            return Poly::constant(Expr::num(0));
        }
        let n = self.degree();
        let coeffs = self
            .coeffs
            .iter()
            .take(n)
            .enumerate()
            .map(|(i, c)| (Expr::num((n - i) as i64) * c.clone()).simplify())
            .collect();
        Poly { coeffs }
    }

    pub fn to_numeric(&self, values: &BTreeMap<Symbol, f64>) -> Result<DVector<f64>> {
        let mut out = DVector::zeros(self.coeffs.len());
        for (i, coeff) in self.coeffs.iter().enumerate() {
            out[i] = coeff.eval(values)?;
        }
        Ok(out)
    }
}

/// An irreducible quadratic denominator factor in `s`.
///
/// Viewed in `u = s^2` both kinds are linear, with root `p` (hyperbolic,
/// poles at `+-sqrt(p)`) or `-w^2` (oscillatory, poles at `+-iw`). The
/// stored expressions are the simplified `p` and `w`.
#[derive(Clone, Debug, PartialEq)]
pub enum QuadFactor {
    /// `s^2 - p` with `p > 0`.
    Hyperbolic(Expr),
    /// `s^2 + w^2`.
    Oscillatory(Expr),
}

impl QuadFactor {
    pub fn poly(&self) -> Poly {
        match self {
            QuadFactor::Hyperbolic(p) => {
                Poly::new(vec![Expr::num(1), Expr::num(0), (-p.clone()).simplify()])
            }
            QuadFactor::Oscillatory(w) => {
                Poly::new(vec![Expr::num(1), Expr::num(0), w.clone().powi(2).simplify()])
            }
        }
    }

    /// Root of the factor in the `u = s^2` variable.
    pub fn u_root(&self) -> Expr {
        match self {
            QuadFactor::Hyperbolic(p) => p.clone(),
            QuadFactor::Oscillatory(w) => (-w.clone().powi(2)).simplify(),
        }
    }
}

/// Transfer function with a structurally factored denominator
/// `s^s_power * prod(quads)`.
#[derive(Clone, Debug, PartialEq)]
pub struct SymbolicTransferFunction {
    pub num: Poly,
    pub s_power: usize,
    pub quads: Vec<QuadFactor>,
}

impl SymbolicTransferFunction {
    /// Disturbance-force-to-angle plant `-c / (s^2 - d)`.
    pub fn force_to_angle(gains: &LinearGains) -> Self {
        SymbolicTransferFunction {
            num: Poly::constant((-gains.c.clone()).simplify()),
            s_power: 0,
            quads: vec![QuadFactor::Hyperbolic(gains.d.simplify())],
        }
    }

    /// Disturbance-force-to-position plant
    /// `(a s^2 - a d + b c) / (s^2 (s^2 - d))`. The factored denominator is
    /// built directly from the gains, so the double pole at the origin is
    /// never cancelled against the numerator.
    pub fn force_to_position(gains: &LinearGains) -> Self {
        let constant_term =
            (gains.b.clone() * gains.c.clone() - gains.a.clone() * gains.d.clone()).simplify();
        SymbolicTransferFunction {
            num: Poly::new(vec![gains.a.simplify(), Expr::num(0), constant_term]),
            s_power: 2,
            quads: vec![QuadFactor::Hyperbolic(gains.d.simplify())],
        }
    }

    /// The expanded denominator polynomial, full degree.
    pub fn denominator(&self) -> Poly {
        let mut den = Poly::new({
            let mut coeffs = vec![Expr::num(1)];
            coeffs.extend(std::iter::repeat_with(|| Expr::num(0)).take(self.s_power));
            coeffs
        });
        for quad in &self.quads {
            den = den.mul(&quad.poly());
        }
        den
    }

    /// Substitute numeric parameter values into every coefficient.
    pub fn to_numeric(&self, values: &BTreeMap<Symbol, f64>) -> Result<TransferFunction> {
        let num = self.num.to_numeric(values)?;
        let den = self.denominator().to_numeric(values)?;
        TransferFunction::new(num, den)
    }

    pub fn denominator_degree(&self) -> usize {
        self.s_power + 2 * self.quads.len()
    }
}

impl std::fmt::Display for SymbolicTransferFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let num: Vec<String> = self.num.coeffs().iter().map(|c| c.to_string()).collect();
        let den: Vec<String> = self
            .denominator()
            .coeffs()
            .iter()
            .map(|c| c.to_string())
            .collect();
        write!(f, "({}) / ({})", num.join(", "), den.join(", "))
    }
}
