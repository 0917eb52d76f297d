//! Closed-form time responses via symbolic inverse Laplace transforms.
//!
//! Every transfer function in this crate has a denominator of the form
//! `s^k * prod(s^2 - p) * prod(s^2 + w^2)`, and the supported inputs
//! (impulse `1`, step `1/s`, sinusoid `w/(s^2 + w^2)`) preserve that shape.
//! Substituting `u = s^2` therefore turns every branch of the response into
//! a strictly proper rational function of `u` with known real roots, which
//! is inverted by exact partial fractions against a small table of basis
//! transforms. Nothing here ever factors an expanded polynomial and no
//! pole-zero cancellation occurs, so a resonant `(s^2 + w^2)^2` stays a
//! double pole and produces the secular `t*cos(wt)` term it should.

use crate::error::{Error, Result};
use crate::expr::{Expr, Symbol};
use crate::math;
use crate::symtf::{Poly, QuadFactor, SymbolicTransferFunction};

/// The closed set of input transforms.
#[derive(Clone, Debug, PartialEq)]
pub enum InputTransform {
    /// Unit impulse, transform `1`.
    Impulse,
    /// Unit step, transform `1/s`.
    Step,
    /// `sin(w t)`, transform `w / (s^2 + w^2)`.
    Sinusoid { omega: Expr },
}

/// Pole of the response in the `u = s^2` variable.
#[derive(Clone, Debug, PartialEq)]
enum PoleKind {
    Origin,
    Hyperbolic(Expr),
    Oscillatory(Expr),
}

impl PoleKind {
    fn u_root(&self) -> Expr {
        match self {
            PoleKind::Origin => Expr::num(0),
            PoleKind::Hyperbolic(p) => p.clone(),
            PoleKind::Oscillatory(w) => (-w.clone().powi(2)).simplify(),
        }
    }
}

#[derive(Clone, Debug)]
struct Pole {
    kind: PoleKind,
    multiplicity: usize,
}

/// How a `u`-domain term maps back to `s`: the branch is either even
/// (`f(u)`), carries a spare `s` factor, or sits over one.
#[derive(Clone, Copy, Debug, PartialEq)]
enum SBias {
    None,
    MulS,
    DivS,
}

/// Exact time response of `tf` to `input`, as an expression in `time`.
pub fn time_response(
    tf: &SymbolicTransferFunction,
    input: &InputTransform,
    time: &Symbol,
) -> Result<Expr> {
    let mut num = tf.num.clone();
    let mut s_power = tf.s_power;
    let mut quads = tf.quads.clone();

    match input {
        InputTransform::Impulse => {}
        InputTransform::Step => s_power += 1,
        InputTransform::Sinusoid { omega } => {
            let omega = omega.simplify();
            if omega.is_zero() {
                return Err(Error::UnsupportedInputTransform(
                    "sinusoid with zero frequency".to_string(),
                ));
            }
            num = num.scale(&omega);
            quads.push(QuadFactor::Oscillatory(omega));
        }
    }

    let sigma = s_power % 2;
    let poles = collect_poles(s_power / 2, &quads)?;
    let (even, odd) = split_parity(&num);

    let t = Expr::sym(time);
    let (even_bias, odd_bias) = if sigma == 1 {
        (SBias::DivS, SBias::None)
    } else {
        (SBias::None, SBias::MulS)
    };
    let even_part = invert_branch(&even, &poles, even_bias, &t)?;
    let odd_part = invert_branch(&odd, &poles, odd_bias, &t)?;

    Ok((even_part + odd_part).simplify())
}

/// Group the origin power and quadratic factors into distinct `u`-poles,
/// merging factors whose roots coincide symbolically.
fn collect_poles(origin_mult: usize, quads: &[QuadFactor]) -> Result<Vec<Pole>> {
    let mut poles: Vec<Pole> = Vec::new();
    if origin_mult > 0 {
        poles.push(Pole {
            kind: PoleKind::Origin,
            multiplicity: origin_mult,
        });
    }

    for quad in quads {
        let kind = match quad {
            QuadFactor::Hyperbolic(p) => {
                let p = p.simplify();
                if p.is_zero() {
                    PoleKind::Origin
                } else {
                    PoleKind::Hyperbolic(p)
                }
            }
            QuadFactor::Oscillatory(w) => {
                let w = w.simplify();
                if w.is_zero() {
                    PoleKind::Origin
                } else {
                    PoleKind::Oscillatory(w)
                }
            }
        };
        match poles.iter_mut().find(|pole| same_pole(&pole.kind, &kind)) {
            Some(pole) => pole.multiplicity += 1,
            None => poles.push(Pole {
                kind,
                multiplicity: 1,
            }),
        }
    }

    for pole in &poles {
        if pole.multiplicity > 2 {
            return Err(Error::UnsupportedInputTransform(
                "pole multiplicity above two".to_string(),
            ));
        }
    }
    Ok(poles)
}

fn same_pole(a: &PoleKind, b: &PoleKind) -> bool {
    match (a, b) {
        (PoleKind::Origin, PoleKind::Origin) => true,
        (PoleKind::Hyperbolic(p), PoleKind::Hyperbolic(q)) => {
            (p.clone() - q.clone()).simplify().is_zero()
        }
        (PoleKind::Oscillatory(v), PoleKind::Oscillatory(w)) => {
            (v.clone() - w.clone()).simplify().is_zero()
                || (v.clone() + w.clone()).simplify().is_zero()
        }
        _ => false,
    }
}

/// Split an `s`-polynomial `N(s)` into `E(u) + s * O(u)` with `u = s^2`.
fn split_parity(num: &Poly) -> (Poly, Poly) {
    let degree = num.degree();
    let mut even = Vec::new();
    let mut odd = Vec::new();
    for k in (0..=degree).rev() {
        let coeff = num.coeff(k);
        if k % 2 == 0 {
            even.push(coeff);
        } else {
            odd.push(coeff);
        }
    }
    let pad = |mut coeffs: Vec<Expr>| {
        if coeffs.is_empty() {
            coeffs.push(Expr::num(0));
        }
        Poly::new(coeffs)
    };
    (pad(even).trimmed(), pad(odd).trimmed())
}

/// Invert `P(u) / (s^bias * prod (u - r_i)^{m_i})` by partial fractions.
fn invert_branch(numerator: &Poly, poles: &[Pole], bias: SBias, t: &Expr) -> Result<Expr> {
    let numerator = numerator.trimmed();
    if numerator.is_zero() {
        return Ok(Expr::num(0));
    }

    let den_degree: usize = poles.iter().map(|p| p.multiplicity).sum();
    if den_degree == 0 {
        // A constant over a bare 1/s is still a step.
        if bias == SBias::DivS && numerator.degree() == 0 {
            return Ok(numerator.coeff(0));
        }
        return Err(Error::UnsupportedInputTransform(
            "transform has no poles".to_string(),
        ));
    }
    if numerator.degree() >= den_degree {
        return Err(Error::UnsupportedInputTransform(
            "improper transfer function".to_string(),
        ));
    }

    let mut terms = Vec::new();
    for (i, pole) in poles.iter().enumerate() {
        let root = pole.kind.u_root();
        // 1/O(r) for O(u) = prod over other poles of (u - r_j)^{m_j}, built
        // as a product of per-root reciprocal atoms. Multiplying the gaps
        // out first would hand the simplifier an expanded polynomial it
        // cannot factor back. The logarithmic derivative O'(r)/O(r) feeds
        // the repeated-pole residue.
        let mut o_recip = Expr::num(1);
        let mut log_deriv = Expr::num(0);
        for (j, partner) in poles.iter().enumerate() {
            if i == j {
                continue;
            }
            let gap = (root.clone() - partner.kind.u_root()).simplify();
            let mult = Expr::num(partner.multiplicity as i64);
            o_recip = o_recip * gap.clone().powi(-(partner.multiplicity as i64));
            log_deriv = log_deriv + mult * gap.recip();
        }

        let p_at = numerator.eval(&root);
        match pole.multiplicity {
            1 => {
                let residue = (p_at * o_recip).simplify();
                terms.push(residue * basis(&pole.kind, 1, bias, t));
            }
            2 => {
                let top = (p_at.clone() * o_recip.clone()).simplify();
                let p_prime = numerator.derivative().eval(&root);
                let lower = ((p_prime - p_at * log_deriv) * o_recip).simplify();
                terms.push(top * basis(&pole.kind, 2, bias, t));
                terms.push(lower * basis(&pole.kind, 1, bias, t));
            }
            _ => unreachable!("multiplicity capped in collect_poles"),
        }
    }
    Ok(Expr::Add(terms).simplify())
}

/// Inverse Laplace transform of `1 / (s^bias * (u - r)^order)` for each pole
/// kind, as a function of time.
fn basis(kind: &PoleKind, order: usize, bias: SBias, t: &Expr) -> Expr {
    match kind {
        PoleKind::Origin => {
            // 1 / s^n with n = 2 * order adjusted by the bias.
            let n = match bias {
                SBias::None => 2 * order,
                SBias::MulS => 2 * order - 1,
                SBias::DivS => 2 * order + 1,
            };
            Expr::ratio(1, math::factorial(n - 1) as i64) * t.clone().powi(n as i64 - 1)
        }
        PoleKind::Hyperbolic(p) => {
            let p = p.clone();
            let arg = p.clone().sqrt() * t.clone();
            match (order, bias) {
                (1, SBias::None) => p.pow(crate::expr::Rational::new(-1, 2)) * arg.sinh(),
                (1, SBias::MulS) => arg.cosh(),
                (1, SBias::DivS) => p.recip() * (arg.cosh() - Expr::num(1)),
                (2, SBias::None) => {
                    Expr::ratio(1, 2)
                        * p.clone().recip()
                        * (t.clone() * arg.clone().cosh()
                            - p.pow(crate::expr::Rational::new(-1, 2)) * arg.sinh())
                }
                (2, SBias::MulS) => {
                    Expr::ratio(1, 2)
                        * p.pow(crate::expr::Rational::new(-1, 2))
                        * t.clone()
                        * arg.sinh()
                }
                (2, SBias::DivS) => {
                    Expr::ratio(1, 2)
                        * p.clone().pow(crate::expr::Rational::new(-3, 2))
                        * t.clone()
                        * arg.clone().sinh()
                        - p.powi(-2) * (arg.cosh() - Expr::num(1))
                }
                _ => unreachable!("multiplicity capped in collect_poles"),
            }
        }
        PoleKind::Oscillatory(w) => {
            let w = w.clone();
            let arg = w.clone() * t.clone();
            match (order, bias) {
                (1, SBias::None) => w.recip() * arg.sin(),
                (1, SBias::MulS) => arg.cos(),
                (1, SBias::DivS) => w.powi(-2) * (Expr::num(1) - arg.cos()),
                (2, SBias::None) => {
                    Expr::ratio(1, 2)
                        * w.powi(-3)
                        * (arg.clone().sin() - arg.clone() * arg.cos())
                }
                (2, SBias::MulS) => {
                    Expr::ratio(1, 2) * w.recip() * t.clone() * arg.sin()
                }
                (2, SBias::DivS) => {
                    w.clone().powi(-4) * (Expr::num(1) - arg.clone().cos())
                        - Expr::ratio(1, 2) * w.powi(-3) * t.clone() * arg.sin()
                }
                _ => unreachable!("multiplicity capped in collect_poles"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LinearGains;

    fn t() -> Symbol {
        Symbol::new("t")
    }

    fn gains() -> LinearGains {
        LinearGains {
            a: Expr::sym(&Symbol::new("a")),
            b: Expr::sym(&Symbol::new("b")),
            c: Expr::sym(&Symbol::new("c")),
            d: Expr::sym(&Symbol::new("d")),
        }
    }

    fn tv() -> Expr {
        Expr::sym(&t())
    }

    #[test]
    fn test_angle_impulse_response() {
        // -c / (s^2 - d) -> -c sinh(sqrt(d) t) / sqrt(d)
        let g = gains();
        let tf = SymbolicTransferFunction::force_to_angle(&g);
        let response = time_response(&tf, &InputTransform::Impulse, &t()).unwrap();
        let arg = g.d.clone().sqrt() * tv();
        let expected =
            (-g.c * g.d.pow(crate::expr::Rational::new(-1, 2)) * arg.sinh()).simplify();
        assert_eq!(response, expected);
    }

    #[test]
    fn test_angle_step_response() {
        // -c / (s (s^2 - d)) -> -c (cosh(sqrt(d) t) - 1) / d
        let g = gains();
        let tf = SymbolicTransferFunction::force_to_angle(&g);
        let response = time_response(&tf, &InputTransform::Step, &t()).unwrap();
        let arg = g.d.clone().sqrt() * tv();
        let expected = (-g.c * g.d.recip() * (arg.cosh() - Expr::num(1))).simplify();
        assert_eq!(response, expected);
    }

    #[test]
    fn test_angle_sinusoid_response() {
        // Forced and natural parts, scaled by 1 / (d + w^2).
        let g = gains();
        let w = Expr::sym(&Symbol::new("w"));
        let tf = SymbolicTransferFunction::force_to_angle(&g);
        let input = InputTransform::Sinusoid { omega: w.clone() };
        let response = time_response(&tf, &input, &t()).unwrap();

        let shift = (g.d.clone() + w.clone().powi(2)).recip();
        let natural = -g.c.clone()
            * w.clone()
            * shift.clone()
            * g.d.clone().pow(crate::expr::Rational::new(-1, 2))
            * (g.d.clone().sqrt() * tv()).sinh();
        let forced = g.c * shift * (w * tv()).sin();
        assert_eq!(response, (natural + forced).simplify());
    }

    #[test]
    fn test_position_impulse_response() {
        // Ramp plus hyperbolic part: (a - bc/d) t + bc sinh(sqrt(d) t) / d^(3/2)
        let g = gains();
        let tf = SymbolicTransferFunction::force_to_position(&g);
        let response = time_response(&tf, &InputTransform::Impulse, &t()).unwrap();

        let bc_over_d = g.b.clone() * g.c.clone() * g.d.clone().recip();
        let ramp = (g.a.clone() - bc_over_d.clone()) * tv();
        let hyperbolic = g.b.clone()
            * g.c.clone()
            * g.d.clone().pow(crate::expr::Rational::new(-3, 2))
            * (g.d.sqrt() * tv()).sinh();
        assert_eq!(response, (ramp + hyperbolic).simplify());
    }

    #[test]
    fn test_position_step_response() {
        // Parabola plus hyperbolic part.
        let g = gains();
        let tf = SymbolicTransferFunction::force_to_position(&g);
        let response = time_response(&tf, &InputTransform::Step, &t()).unwrap();

        let bc_over_d = g.b.clone() * g.c.clone() * g.d.clone().recip();
        let parabola =
            Expr::ratio(1, 2) * (g.a.clone() - bc_over_d.clone()) * tv().powi(2);
        let hyperbolic = g.b.clone() * g.c.clone() * g.d.clone().powi(-2)
            * ((g.d.sqrt() * tv()).cosh() - Expr::num(1));
        assert_eq!(response, (parabola + hyperbolic).simplify());
    }

    #[test]
    fn test_position_sinusoid_response() {
        let g = gains();
        let w = Expr::sym(&Symbol::new("w"));
        let tf = SymbolicTransferFunction::force_to_position(&g);
        let input = InputTransform::Sinusoid { omega: w.clone() };
        let response = time_response(&tf, &input, &t()).unwrap();

        let shift = (g.d.clone() + w.clone().powi(2)).recip();
        let ramp = (g.a.clone() - g.b.clone() * g.c.clone() * g.d.clone().recip())
            * w.clone().recip()
            * tv();
        let hyperbolic = g.b.clone()
            * g.c.clone()
            * w.clone()
            * g.d.clone().pow(crate::expr::Rational::new(-3, 2))
            * shift.clone()
            * (g.d.clone().sqrt() * tv()).sinh();
        let forced = (g.b * g.c - g.a.clone() * g.d - g.a * w.clone().powi(2))
            * w.clone().powi(-2)
            * shift
            * (w * tv()).sin();
        assert_eq!(response, (ramp + hyperbolic + forced).simplify());
    }

    #[test]
    fn test_resonance_keeps_secular_term() {
        // 1/(s^2 + w^2) driven at its own frequency: the double pole must
        // survive and produce the t cos(wt) growth.
        let w = Expr::sym(&Symbol::new("w"));
        let tf = SymbolicTransferFunction {
            num: Poly::constant(Expr::num(1)),
            s_power: 0,
            quads: vec![QuadFactor::Oscillatory(w.clone())],
        };
        let input = InputTransform::Sinusoid { omega: w.clone() };
        let response = time_response(&tf, &input, &t()).unwrap();

        let arg = w.clone() * tv();
        let expected = (Expr::ratio(1, 2)
            * w.powi(-2)
            * (arg.clone().sin() - arg.clone() * arg.cos()))
        .simplify();
        assert_eq!(response, expected);
    }

    #[test]
    fn test_sinusoid_with_zero_frequency_is_rejected() {
        let tf = SymbolicTransferFunction::force_to_angle(&gains());
        let input = InputTransform::Sinusoid { omega: Expr::num(0) };
        assert_eq!(
            time_response(&tf, &input, &t()),
            Err(Error::UnsupportedInputTransform(
                "sinusoid with zero frequency".to_string()
            ))
        );
    }

    #[test]
    fn test_triple_pole_is_rejected() {
        let w = Expr::sym(&Symbol::new("w"));
        let tf = SymbolicTransferFunction {
            num: Poly::constant(Expr::num(1)),
            s_power: 0,
            quads: vec![
                QuadFactor::Oscillatory(w.clone()),
                QuadFactor::Oscillatory(w.clone()),
            ],
        };
        let input = InputTransform::Sinusoid { omega: w };
        assert_eq!(
            time_response(&tf, &input, &t()),
            Err(Error::UnsupportedInputTransform(
                "pole multiplicity above two".to_string()
            ))
        );
    }

    #[test]
    fn test_symbolic_response_matches_numeric_simulation() {
        // Evaluate the closed-form impulse response of -c/(s^2 - d) on a
        // grid and compare against the state-space simulation of the same
        // plant with c = 2, d = 9: both are -2 sinh(3t) / 3.
        use crate::model::NumericGains;
        use crate::tf::TransferFunction;
        use approx::assert_relative_eq;
        use nalgebra::DVector;
        use std::collections::BTreeMap;

        let g = gains();
        let tf = SymbolicTransferFunction::force_to_angle(&g);
        let response = time_response(&tf, &InputTransform::Impulse, &t()).unwrap();

        let numeric = NumericGains {
            a: 0.0,
            b: 0.0,
            c: 2.0,
            d: 9.0,
        };
        let plant = TransferFunction::force_to_angle(&numeric).unwrap();
        let grid = DVector::from_fn(101, |i, _| i as f64 * 0.005);
        let simulated = plant.impulse_response(&grid).unwrap();

        for (i, y_i) in simulated.iter().enumerate() {
            let values = BTreeMap::from([
                (Symbol::new("c"), 2.0),
                (Symbol::new("d"), 9.0),
                (t(), grid[i]),
            ]);
            let closed_form = response.eval(&values).unwrap();
            assert_relative_eq!(
                closed_form,
                -2.0 * (3.0 * grid[i]).sinh() / 3.0,
                epsilon = 1e-12,
                max_relative = 1e-12
            );
            assert_relative_eq!(*y_i, closed_form, epsilon = 1e-6, max_relative = 1e-6);
        }
    }

    #[test]
    fn test_response_is_deterministic() {
        let tf = SymbolicTransferFunction::force_to_position(&gains());
        let first = time_response(&tf, &InputTransform::Step, &t()).unwrap();
        let second = time_response(&tf, &InputTransform::Step, &t()).unwrap();
        assert_eq!(first, second);
    }
}
