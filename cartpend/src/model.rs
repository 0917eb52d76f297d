//! Nonlinear cart-pole model and its linearization about the upright
//! equilibrium.
//!
//! The state is `(x1, x2, x3, x4)` for cart position, cart velocity, rod
//! angle from vertical, and rod angular velocity, with `F` the horizontal
//! force on the cart. The accelerations come from the standard rigid-rod
//! model with a uniform rod of half-length `l`:
//!
//! ```text
//! x2' = phi(F, x3, x4)      cart acceleration
//! x4' = psi(F, x3, x4)      rod angular acceleration
//! ```
//!
//! Both share the denominator `4(M + m) - 3 m cos^2(x3)`, which is strictly
//! positive for physical masses, so the model is well defined everywhere.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::expr::{Bindings, Expr, Symbol};

/// The symbol set of the cart-pole model. Every evaluation is validated
/// against this set, so a stray binding fails loudly instead of being
/// silently ignored.
#[derive(Clone, Debug)]
pub struct CartPoleSymbols {
    pub x1: Symbol,
    pub x2: Symbol,
    pub x3: Symbol,
    pub x4: Symbol,
    pub force: Symbol,
    pub cart_mass: Symbol,
    pub rod_mass: Symbol,
    pub rod_half_length: Symbol,
    pub gravity: Symbol,
}

impl Default for CartPoleSymbols {
    fn default() -> Self {
        CartPoleSymbols {
            x1: Symbol::new("x1"),
            x2: Symbol::new("x2"),
            x3: Symbol::new("x3"),
            x4: Symbol::new("x4"),
            force: Symbol::new("F"),
            cart_mass: Symbol::new("M"),
            rod_mass: Symbol::new("m"),
            rod_half_length: Symbol::new("l"),
            gravity: Symbol::new("g"),
        }
    }
}

impl CartPoleSymbols {
    pub fn all(&self) -> BTreeSet<Symbol> {
        BTreeSet::from([
            self.x1.clone(),
            self.x2.clone(),
            self.x3.clone(),
            self.x4.clone(),
            self.force.clone(),
            self.cart_mass.clone(),
            self.rod_mass.clone(),
            self.rod_half_length.clone(),
            self.gravity.clone(),
        ])
    }

    pub fn parameters(&self) -> BTreeSet<Symbol> {
        BTreeSet::from([
            self.cart_mass.clone(),
            self.rod_mass.clone(),
            self.rod_half_length.clone(),
            self.gravity.clone(),
        ])
    }
}

/// Physical constants for numeric evaluation, in SI units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhysicalParams {
    pub cart_mass: f64,
    pub rod_mass: f64,
    pub rod_half_length: f64,
    pub gravity: f64,
}

impl Default for PhysicalParams {
    fn default() -> Self {
        PhysicalParams {
            cart_mass: 0.3,
            rod_mass: 0.1,
            rod_half_length: 0.35,
            gravity: 9.81,
        }
    }
}

impl PhysicalParams {
    pub fn values(&self, symbols: &CartPoleSymbols) -> BTreeMap<Symbol, f64> {
        BTreeMap::from([
            (symbols.cart_mass.clone(), self.cart_mass),
            (symbols.rod_mass.clone(), self.rod_mass),
            (symbols.rod_half_length.clone(), self.rod_half_length),
            (symbols.gravity.clone(), self.gravity),
        ])
    }
}

/// Symbolic cart-pole dynamics.
#[derive(Clone, Debug)]
pub struct CartPole {
    symbols: CartPoleSymbols,
    phi: Expr,
    psi: Expr,
    denominator: Expr,
}

impl CartPole {
    pub fn new() -> Self {
        Self::with_symbols(CartPoleSymbols::default())
    }

    pub fn with_symbols(symbols: CartPoleSymbols) -> Self {
        let force = Expr::sym(&symbols.force);
        let x3 = Expr::sym(&symbols.x3);
        let x4 = Expr::sym(&symbols.x4);
        let cart_mass = Expr::sym(&symbols.cart_mass);
        let rod_mass = Expr::sym(&symbols.rod_mass);
        let length = Expr::sym(&symbols.rod_half_length);
        let gravity = Expr::sym(&symbols.gravity);

        let denominator = Expr::num(4) * (cart_mass.clone() + rod_mass.clone())
            - Expr::num(3) * rod_mass.clone() * x3.clone().cos().powi(2);

        let phi = (Expr::num(4) * rod_mass.clone() * length.clone() * x4.clone().powi(2)
            * x3.clone().sin()
            + Expr::num(4) * force.clone()
            - Expr::num(3) * rod_mass.clone() * gravity.clone() * x3.clone().sin()
                * x3.clone().cos())
            / denominator.clone();

        let psi = (Expr::num(-3)
            * (rod_mass.clone() * length.clone() * x4.powi(2) * x3.clone().sin()
                * x3.clone().cos()
                + force * x3.clone().cos()
                - (cart_mass + rod_mass) * gravity * x3.sin()))
            / (length * denominator.clone());

        CartPole {
            symbols,
            phi,
            psi,
            denominator,
        }
    }

    pub fn symbols(&self) -> &CartPoleSymbols {
        &self.symbols
    }

    /// Cart acceleration `x2' = phi(F, x3, x4)`.
    pub fn cart_acceleration(&self) -> &Expr {
        &self.phi
    }

    /// Rod angular acceleration `x4' = psi(F, x3, x4)`.
    pub fn rod_acceleration(&self) -> &Expr {
        &self.psi
    }

    /// The denominator `4(M + m) - 3m cos^2(x3)` shared by both
    /// accelerations. Strictly positive for M, m > 0, with minimum `4M + m`
    /// at cos^2(x3) = 1; the model relies on this precondition instead of
    /// checking it per evaluation.
    pub fn shared_denominator(&self) -> &Expr {
        &self.denominator
    }

    /// The upright equilibrium `(F, x3, x4) = (0, 0, 0)`.
    pub fn equilibrium(&self) -> Bindings {
        Bindings::new()
            .bind(&self.symbols.force, Expr::num(0))
            .bind(&self.symbols.x3, Expr::num(0))
            .bind(&self.symbols.x4, Expr::num(0))
    }

    /// Substitute bindings into `expr` and simplify. Every bound symbol must
    /// belong to the model's declared symbol set; symbols the expression
    /// does not contain are allowed and ignored. A free symbol outside the
    /// declared set surviving the substitution is an error, never a
    /// partially-substituted result.
    pub fn evaluate_at(&self, expr: &Expr, bindings: &Bindings) -> Result<Expr> {
        let declared = self.symbols.all();
        for symbol in bindings.symbols() {
            if !declared.contains(symbol) {
                return Err(Error::UnknownBinding(symbol.name().to_string()));
            }
        }
        let result = expr.substitute(bindings).simplify();
        for symbol in result.free_symbols() {
            if !declared.contains(&symbol) {
                return Err(Error::UnboundSymbol(symbol.name().to_string()));
            }
        }
        Ok(result)
    }

    pub fn at_equilibrium(&self, expr: &Expr) -> Expr {
        expr.substitute(&self.equilibrium()).simplify()
    }

    /// Linearize about the upright equilibrium. Differentiation happens
    /// first and the equilibrium substitution second; substituting first
    /// would zero out every angle-dependent term and produce wrong gains.
    pub fn linearize(&self) -> Result<LinearGains> {
        let s = &self.symbols;
        let eq = self.equilibrium();

        let a = self.evaluate_at(&self.phi.diff(&s.force), &eq)?;
        let b = self.evaluate_at(&(-self.phi.diff(&s.x3)), &eq)?;
        let c = self.evaluate_at(&(-self.psi.diff(&s.force)), &eq)?;
        let d = self.evaluate_at(&self.psi.diff(&s.x3), &eq)?;

        Ok(LinearGains { a, b, c, d })
    }
}

impl Default for CartPole {
    fn default() -> Self {
        Self::new()
    }
}

/// Gains of the linearized model
///
/// ```text
/// x2' =  a F - b x3
/// x4' = -c F + d x3
/// ```
///
/// so positive `a..d` for physical parameter values.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearGains {
    pub a: Expr,
    pub b: Expr,
    pub c: Expr,
    pub d: Expr,
}

impl LinearGains {
    /// The closed-form gains, for cross-checking the linearization:
    ///
    /// ```text
    /// a = 4 / (4M + m)              b = 3mg / (4M + m)
    /// c = 3 / (l (4M + m))          d = 3(M + m)g / (l (4M + m))
    /// ```
    pub fn from_symbols(symbols: &CartPoleSymbols) -> Self {
        let cart_mass = Expr::sym(&symbols.cart_mass);
        let rod_mass = Expr::sym(&symbols.rod_mass);
        let length = Expr::sym(&symbols.rod_half_length);
        let gravity = Expr::sym(&symbols.gravity);
        let total = Expr::num(4) * cart_mass.clone() + rod_mass.clone();

        LinearGains {
            a: (Expr::num(4) / total.clone()).simplify(),
            b: (Expr::num(3) * rod_mass.clone() * gravity.clone() / total.clone()).simplify(),
            c: (Expr::num(3) / (length.clone() * total.clone())).simplify(),
            d: (Expr::num(3) * (cart_mass + rod_mass) * gravity / (length * total)).simplify(),
        }
    }

    pub fn eval(&self, symbols: &CartPoleSymbols, params: &PhysicalParams) -> Result<NumericGains> {
        let values = params.values(symbols);
        Ok(NumericGains {
            a: self.a.eval(&values)?,
            b: self.b.eval(&values)?,
            c: self.c.eval(&values)?,
            d: self.d.eval(&values)?,
        })
    }
}

/// Numeric gains of the linearized model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NumericGains {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linearize_matches_closed_form_gains() {
        let model = CartPole::new();
        let gains = model.linearize().unwrap();
        let expected = LinearGains::from_symbols(model.symbols());
        assert_eq!(gains, expected);
    }

    #[test]
    fn test_linearize_golden_numerics() {
        let model = CartPole::new();
        let gains = model
            .linearize()
            .unwrap()
            .eval(model.symbols(), &PhysicalParams::default())
            .unwrap();
        assert_relative_eq!(gains.a, 3.076_923_076_923_077, max_relative = 1e-12);
        assert_relative_eq!(gains.b, 2.263_846_153_846_153_8, max_relative = 1e-12);
        assert_relative_eq!(gains.c, 6.593_406_593_406_593, max_relative = 1e-12);
        assert_relative_eq!(gains.d, 25.872_527_472_527_473, max_relative = 1e-12);
    }

    #[test]
    fn test_shared_denominator_stays_positive() {
        // 4(M + m) - 3m cos^2(x3) >= 4M + m for all x3, with equality at
        // cos^2(x3) = 1.
        let model = CartPole::new();
        let s = model.symbols();
        let params = PhysicalParams::default();
        let floor = 4.0 * params.cart_mass + params.rod_mass;

        for i in 0..64 {
            let x3 = i as f64 * std::f64::consts::TAU / 64.0;
            let mut values = params.values(s);
            values.insert(s.x3.clone(), x3);
            let value = model.shared_denominator().eval(&values).unwrap();
            assert!(value >= floor - 1e-12, "denominator {value} below {floor}");
        }

        let mut values = params.values(s);
        values.insert(s.x3.clone(), 0.0);
        let at_minimum = model.shared_denominator().eval(&values).unwrap();
        assert_relative_eq!(at_minimum, floor, max_relative = 1e-12);
    }

    #[test]
    fn test_accelerations_vanish_at_equilibrium() {
        let model = CartPole::new();
        assert!(model.at_equilibrium(model.cart_acceleration()).is_zero());
        assert!(model.at_equilibrium(model.rod_acceleration()).is_zero());
    }

    #[test]
    fn test_substitute_before_diff_loses_angle_terms() {
        // Substituting x3 = 0 and then differentiating in x3 yields zero,
        // which is not the linearized gain. The crate differentiates first.
        let model = CartPole::new();
        let s = model.symbols();
        let upright = Bindings::new().bind(&s.x3, Expr::num(0)).bind(&s.x4, Expr::num(0));

        let wrong = model
            .rod_acceleration()
            .substitute(&upright)
            .diff(&s.x3)
            .simplify();
        assert!(wrong.is_zero());

        let right = model.linearize().unwrap().d;
        assert!(!right.is_zero());
    }

    #[test]
    fn test_force_derivative_commutes_with_angle_substitution() {
        // d/dF is unaffected by fixing the angle state, so either order
        // agrees for the force gain.
        let model = CartPole::new();
        let s = model.symbols();
        let upright = Bindings::new().bind(&s.x3, Expr::num(0)).bind(&s.x4, Expr::num(0));

        let diff_then_subs = model
            .cart_acceleration()
            .diff(&s.force)
            .substitute(&upright)
            .simplify();
        let subs_then_diff = model
            .cart_acceleration()
            .substitute(&upright)
            .diff(&s.force)
            .simplify();
        assert_eq!(diff_then_subs, subs_then_diff);
    }

    #[test]
    fn test_evaluate_at_rejects_foreign_binding() {
        let model = CartPole::new();
        let stray = Symbol::new("q");
        let bindings = Bindings::new().bind(&stray, Expr::num(1));
        let result = model.evaluate_at(model.cart_acceleration(), &bindings);
        assert_eq!(result, Err(Error::UnknownBinding("q".to_string())));
    }

    #[test]
    fn test_evaluate_at_rejects_surviving_foreign_symbol() {
        // A symbol outside the declared set that the bindings do not cover
        // must fail instead of leaking through half-substituted.
        let model = CartPole::new();
        let s = model.symbols();
        let stray = Symbol::new("q");
        let expr = Expr::sym(&s.x3).sin() + Expr::sym(&stray);
        let result = model.evaluate_at(&expr, &model.equilibrium());
        assert_eq!(result, Err(Error::UnboundSymbol("q".to_string())));
    }

    #[test]
    fn test_evaluate_at_allows_unused_declared_binding() {
        // The equilibrium binds x4 even when the expression does not
        // mention it; that must not be an error.
        let model = CartPole::new();
        let s = model.symbols();
        let expr = Expr::sym(&s.x3).sin();
        let result = model.evaluate_at(&expr, &model.equilibrium()).unwrap();
        assert!(result.is_zero());
    }

    #[test]
    fn test_linearize_is_deterministic() {
        let model = CartPole::new();
        assert_eq!(model.linearize().unwrap(), model.linearize().unwrap());
    }
}
