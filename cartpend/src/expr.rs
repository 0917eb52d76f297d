//! Symbolic expression trees with exact rational constants.
//!
//! Expressions are immutable value objects built from an explicit set of
//! [`Symbol`]s; there is no shared registry, so independent analyses never
//! couple through hidden state. Differentiation returns the raw derivative
//! tree; [`Expr::simplify`] is a separate, deliberate step that produces a
//! canonical expanded form, and structural equality of simplified trees is
//! the crate's notion of symbolic equality.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::Arc;

use num::rational::Ratio;
use num::{One, Signed, Zero};

use crate::error::{Error, Result};

pub type Rational = Ratio<i64>;

/// A named symbolic variable or parameter.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(Arc<str>);

impl Symbol {
    pub fn new(name: &str) -> Self {
        Symbol(Arc::from(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Expr {
    Num(Rational),
    Sym(Symbol),
    Add(Vec<Expr>),
    Mul(Vec<Expr>),
    Pow(Box<Expr>, Rational),
    Sin(Box<Expr>),
    Cos(Box<Expr>),
    Sinh(Box<Expr>),
    Cosh(Box<Expr>),
}

impl Expr {
    pub fn num(n: i64) -> Self {
        Expr::Num(Rational::from_integer(n))
    }

    pub fn ratio(numer: i64, denom: i64) -> Self {
        Expr::Num(Rational::new(numer, denom))
    }

    pub fn sym(symbol: &Symbol) -> Self {
        Expr::Sym(symbol.clone())
    }

    pub fn pow(self, exponent: Rational) -> Self {
        Expr::Pow(Box::new(self), exponent)
    }

    pub fn powi(self, exponent: i64) -> Self {
        self.pow(Rational::from_integer(exponent))
    }

    pub fn sqrt(self) -> Self {
        self.pow(Rational::new(1, 2))
    }

    pub fn recip(self) -> Self {
        self.powi(-1)
    }

    pub fn sin(self) -> Self {
        Expr::Sin(Box::new(self))
    }

    pub fn cos(self) -> Self {
        Expr::Cos(Box::new(self))
    }

    pub fn sinh(self) -> Self {
        Expr::Sinh(Box::new(self))
    }

    pub fn cosh(self) -> Self {
        Expr::Cosh(Box::new(self))
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Num(r) if r.is_zero())
    }

    pub fn free_symbols(&self) -> BTreeSet<Symbol> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut BTreeSet<Symbol>) {
        match self {
            Expr::Num(_) => {}
            Expr::Sym(s) => {
                out.insert(s.clone());
            }
            Expr::Add(items) | Expr::Mul(items) => {
                for item in items {
                    item.collect_symbols(out);
                }
            }
            Expr::Pow(base, _) => base.collect_symbols(out),
            Expr::Sin(u) | Expr::Cos(u) | Expr::Sinh(u) | Expr::Cosh(u) => u.collect_symbols(out),
        }
    }

    /// Exact partial derivative with respect to `var`. The result is left
    /// unsimplified; call [`Expr::simplify`] as a separate step.
    pub fn diff(&self, var: &Symbol) -> Expr {
        match self {
            Expr::Num(_) => Expr::num(0),
            Expr::Sym(s) => {
                if s == var {
                    Expr::num(1)
                } else {
                    Expr::num(0)
                }
            }
            Expr::Add(terms) => Expr::Add(terms.iter().map(|t| t.diff(var)).collect()),
            Expr::Mul(factors) => {
                let mut terms = Vec::with_capacity(factors.len());
                for i in 0..factors.len() {
                    let mut product = factors.clone();
                    product[i] = factors[i].diff(var);
                    terms.push(Expr::Mul(product));
                }
                Expr::Add(terms)
            }
            Expr::Pow(base, r) => Expr::Mul(vec![
                Expr::Num(*r),
                base.as_ref().clone().pow(*r - Rational::one()),
                base.diff(var),
            ]),
            Expr::Sin(u) => Expr::Mul(vec![u.as_ref().clone().cos(), u.diff(var)]),
            Expr::Cos(u) => Expr::Mul(vec![
                Expr::num(-1),
                u.as_ref().clone().sin(),
                u.diff(var),
            ]),
            Expr::Sinh(u) => Expr::Mul(vec![u.as_ref().clone().cosh(), u.diff(var)]),
            Expr::Cosh(u) => Expr::Mul(vec![u.as_ref().clone().sinh(), u.diff(var)]),
        }
    }

    /// Structural substitution of bound symbols. Unbound symbols are left in
    /// place; validation against a declared symbol set lives in the model.
    pub fn substitute(&self, bindings: &Bindings) -> Expr {
        match self {
            Expr::Num(_) => self.clone(),
            Expr::Sym(s) => bindings.get(s).cloned().unwrap_or_else(|| self.clone()),
            Expr::Add(terms) => Expr::Add(terms.iter().map(|t| t.substitute(bindings)).collect()),
            Expr::Mul(factors) => {
                Expr::Mul(factors.iter().map(|f| f.substitute(bindings)).collect())
            }
            Expr::Pow(base, r) => Expr::Pow(Box::new(base.substitute(bindings)), *r),
            Expr::Sin(u) => Expr::Sin(Box::new(u.substitute(bindings))),
            Expr::Cos(u) => Expr::Cos(Box::new(u.substitute(bindings))),
            Expr::Sinh(u) => Expr::Sinh(Box::new(u.substitute(bindings))),
            Expr::Cosh(u) => Expr::Cosh(Box::new(u.substitute(bindings))),
        }
    }

    /// Evaluate to a concrete value. Every free symbol must have a value.
    pub fn eval(&self, values: &BTreeMap<Symbol, f64>) -> Result<f64> {
        match self {
            Expr::Num(r) => Ok(*r.numer() as f64 / *r.denom() as f64),
            Expr::Sym(s) => values
                .get(s)
                .copied()
                .ok_or_else(|| Error::UnboundSymbol(s.name().to_string())),
            Expr::Add(terms) => {
                let mut sum = 0.0;
                for term in terms {
                    sum += term.eval(values)?;
                }
                Ok(sum)
            }
            Expr::Mul(factors) => {
                let mut product = 1.0;
                for factor in factors {
                    product *= factor.eval(values)?;
                }
                Ok(product)
            }
            Expr::Pow(base, r) => {
                let exponent = *r.numer() as f64 / *r.denom() as f64;
                Ok(base.eval(values)?.powf(exponent))
            }
            Expr::Sin(u) => Ok(u.eval(values)?.sin()),
            Expr::Cos(u) => Ok(u.eval(values)?.cos()),
            Expr::Sinh(u) => Ok(u.eval(values)?.sinh()),
            Expr::Cosh(u) => Ok(u.eval(values)?.cosh()),
        }
    }

    /// Explicit normalization pass: flattens sums and products, distributes
    /// products over sums, collects like terms with exact coefficients,
    /// merges exponents over equal bases, and folds constants. Deterministic
    /// and idempotent.
    pub fn simplify(&self) -> Expr {
        match self {
            Expr::Num(_) | Expr::Sym(_) => self.clone(),
            Expr::Add(terms) => simplify_sum(terms.iter().map(Expr::simplify).collect()),
            Expr::Mul(factors) => simplify_product(factors.iter().map(Expr::simplify).collect()),
            Expr::Pow(base, r) => simplify_pow(base.simplify(), *r),
            Expr::Sin(u) => simplify_odd(u.simplify(), Expr::sin),
            Expr::Cos(u) => simplify_even(u.simplify(), Expr::cos),
            Expr::Sinh(u) => simplify_odd(u.simplify(), Expr::sinh),
            Expr::Cosh(u) => simplify_even(u.simplify(), Expr::cosh),
        }
    }
}

/// Typed mapping from symbol to replacement expression.
#[derive(Clone, Debug, Default)]
pub struct Bindings {
    map: BTreeMap<Symbol, Expr>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, symbol: &Symbol, value: Expr) -> Self {
        self.map.insert(symbol.clone(), value);
        self
    }

    pub fn get(&self, symbol: &Symbol) -> Option<&Expr> {
        self.map.get(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.map.keys()
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        Expr::Add(vec![self, rhs])
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        Expr::Add(vec![self, -rhs])
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        Expr::Mul(vec![self, rhs])
    }
}

impl Div for Expr {
    type Output = Expr;

    fn div(self, rhs: Expr) -> Expr {
        Expr::Mul(vec![self, rhs.recip()])
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::Mul(vec![Expr::num(-1), self])
    }
}

fn simplify_sum(terms: Vec<Expr>) -> Expr {
    let mut flat = Vec::with_capacity(terms.len());
    for term in terms {
        if let Expr::Add(inner) = term {
            flat.extend(inner);
        } else {
            flat.push(term);
        }
    }

    let mut constant = Rational::zero();
    let mut collected: BTreeMap<Expr, Rational> = BTreeMap::new();
    for term in flat {
        match split_coefficient(term) {
            (c, None) => constant += c,
            (c, Some(key)) => {
                *collected
                    .entry(key)
                    .or_insert_with(|| Rational::zero()) += c;
            }
        }
    }

    let mut out = Vec::new();
    if !constant.is_zero() {
        out.push(Expr::Num(constant));
    }
    for (key, coeff) in collected {
        if coeff.is_zero() {
            continue;
        }
        out.push(apply_coefficient(coeff, key));
    }
    match out.len() {
        0 => Expr::num(0),
        1 => out.pop().unwrap(),
        _ => Expr::Add(out),
    }
}

/// Split a simplified term into its rational coefficient and monomial key.
fn split_coefficient(term: Expr) -> (Rational, Option<Expr>) {
    match term {
        Expr::Num(r) => (r, None),
        Expr::Mul(factors) => {
            let mut coeff = Rational::one();
            let mut rest = Vec::with_capacity(factors.len());
            for factor in factors {
                if let Expr::Num(r) = factor {
                    coeff *= r;
                } else {
                    rest.push(factor);
                }
            }
            match rest.len() {
                0 => (coeff, None),
                1 => (coeff, Some(rest.pop().unwrap())),
                _ => (coeff, Some(Expr::Mul(rest))),
            }
        }
        other => (Rational::one(), Some(other)),
    }
}

fn apply_coefficient(coeff: Rational, key: Expr) -> Expr {
    if coeff.is_one() {
        return key;
    }
    match key {
        Expr::Mul(mut factors) => {
            factors.insert(0, Expr::Num(coeff));
            Expr::Mul(factors)
        }
        other => Expr::Mul(vec![Expr::Num(coeff), other]),
    }
}

fn simplify_product(factors: Vec<Expr>) -> Expr {
    let mut flat = Vec::with_capacity(factors.len());
    for factor in factors {
        if let Expr::Mul(inner) = factor {
            flat.extend(inner);
        } else {
            flat.push(factor);
        }
    }

    // Distribute over the first sum encountered; the recursion bottoms out
    // because each expanded term carries one fewer sum factor.
    if let Some(pos) = flat.iter().position(|f| matches!(f, Expr::Add(_))) {
        let sum = flat.remove(pos);
        let Expr::Add(addends) = sum else { unreachable!() };
        let expanded = addends
            .into_iter()
            .map(|addend| {
                let mut product = flat.clone();
                product.push(addend);
                simplify_product(product)
            })
            .collect();
        return simplify_sum(expanded);
    }

    let mut coeff = Rational::one();
    let mut exponents: BTreeMap<Expr, Rational> = BTreeMap::new();
    for factor in flat {
        match factor {
            Expr::Num(r) => {
                if r.is_zero() {
                    return Expr::num(0);
                }
                coeff *= r;
            }
            Expr::Pow(base, r) => {
                *exponents.entry(*base).or_insert_with(|| Rational::zero()) += r;
            }
            other => {
                *exponents
                    .entry(other)
                    .or_insert_with(|| Rational::zero()) += Rational::one();
            }
        }
    }

    let mut out: Vec<Expr> = Vec::new();
    for (base, r) in exponents {
        if r.is_zero() {
            continue;
        }
        push_factor(simplify_pow(base, r), &mut coeff, &mut out);
    }
    if coeff.is_zero() {
        return Expr::num(0);
    }
    out.sort();
    if out.is_empty() {
        return Expr::Num(coeff);
    }
    if !coeff.is_one() {
        out.insert(0, Expr::Num(coeff));
    }
    if out.len() == 1 {
        out.pop().unwrap()
    } else {
        Expr::Mul(out)
    }
}

fn push_factor(factor: Expr, coeff: &mut Rational, out: &mut Vec<Expr>) {
    match factor {
        Expr::Num(r) => *coeff *= r,
        Expr::Mul(inner) => {
            for f in inner {
                push_factor(f, coeff, out);
            }
        }
        other => out.push(other),
    }
}

fn simplify_pow(base: Expr, r: Rational) -> Expr {
    if r.is_zero() {
        return Expr::num(1);
    }
    if r.is_one() {
        return base;
    }
    match base {
        Expr::Num(n) => pow_rational(n, r),
        Expr::Pow(inner, r2) => simplify_pow(*inner, r2 * r),
        Expr::Mul(factors) => {
            let powered = factors.into_iter().map(|f| simplify_pow(f, r)).collect();
            simplify_product(powered)
        }
        Expr::Add(_) if r.is_integer() && sum_is_negative(&base) => {
            // Normalize the base sign so (−x − y)^n and (x + y)^n share an atom.
            let flipped = simplify_product(vec![Expr::num(-1), base]);
            let powered = simplify_pow(flipped, r);
            if r.to_integer() % 2 == 0 {
                powered
            } else {
                simplify_product(vec![Expr::num(-1), powered])
            }
        }
        other => Expr::Pow(Box::new(other), r),
    }
}

/// A canonical sum is "negative" when its leading term has a negative
/// coefficient.
fn sum_is_negative(sum: &Expr) -> bool {
    if let Expr::Add(terms) = sum {
        if let Some(first) = terms.first() {
            let (coeff, _) = split_coefficient(first.clone());
            return coeff.is_negative();
        }
    }
    false
}

fn pow_rational(n: Rational, r: Rational) -> Expr {
    if n.is_zero() {
        return if r.is_negative() {
            Expr::Pow(Box::new(Expr::Num(n)), r)
        } else {
            Expr::num(0)
        };
    }
    if n.is_one() {
        return Expr::num(1);
    }
    if r.is_integer() {
        return Expr::Num(n.pow(r.to_integer() as i32));
    }
    let powed = n.pow(*r.numer() as i32);
    if powed.is_negative() {
        return Expr::Pow(Box::new(Expr::Num(n)), r);
    }
    let q = *r.denom() as u32;
    match (integer_root(*powed.numer(), q), integer_root(*powed.denom(), q)) {
        (Some(a), Some(b)) => Expr::Num(Rational::new(a, b)),
        _ => Expr::Pow(Box::new(Expr::Num(n)), r),
    }
}

fn integer_root(x: i64, q: u32) -> Option<i64> {
    if x < 0 {
        return None;
    }
    let guess = (x as f64).powf(1.0 / q as f64).round() as i64;
    for candidate in guess.saturating_sub(1)..=guess + 1 {
        if candidate >= 0 && candidate.checked_pow(q) == Some(x) {
            return Some(candidate);
        }
    }
    None
}

fn simplify_odd(arg: Expr, wrap: fn(Expr) -> Expr) -> Expr {
    if arg.is_zero() {
        return Expr::num(0);
    }
    let (coeff, _) = split_coefficient(arg.clone());
    if coeff.is_negative() {
        let negated = simplify_product(vec![Expr::num(-1), arg]);
        return simplify_product(vec![Expr::num(-1), wrap(negated)]);
    }
    wrap(arg)
}

fn simplify_even(arg: Expr, wrap: fn(Expr) -> Expr) -> Expr {
    if arg.is_zero() {
        return Expr::num(1);
    }
    let (coeff, _) = split_coefficient(arg.clone());
    if coeff.is_negative() {
        let negated = simplify_product(vec![Expr::num(-1), arg]);
        return wrap(negated);
    }
    wrap(arg)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Num(r) => {
                if r.is_integer() {
                    write!(f, "{}", r.numer())
                } else {
                    write!(f, "{}/{}", r.numer(), r.denom())
                }
            }
            Expr::Sym(s) => write!(f, "{}", s),
            Expr::Add(terms) => {
                for (i, term) in terms.iter().enumerate() {
                    let (coeff, key) = split_coefficient(term.clone());
                    if i == 0 {
                        write!(f, "{}", term)?;
                    } else if coeff.is_negative() {
                        let positive = match key {
                            Some(key) => apply_coefficient(-coeff, key),
                            None => Expr::Num(-coeff),
                        };
                        write!(f, " - {}", positive)?;
                    } else {
                        write!(f, " + {}", term)?;
                    }
                }
                Ok(())
            }
            Expr::Mul(factors) => {
                let mut rest = factors.as_slice();
                if let Some(Expr::Num(r)) = factors.first() {
                    if *r == -Rational::one() && factors.len() > 1 {
                        write!(f, "-")?;
                        rest = &factors[1..];
                    }
                }
                for (i, factor) in rest.iter().enumerate() {
                    if i > 0 {
                        write!(f, "*")?;
                    }
                    if matches!(factor, Expr::Add(_)) {
                        write!(f, "({})", factor)?;
                    } else {
                        write!(f, "{}", factor)?;
                    }
                }
                Ok(())
            }
            Expr::Pow(base, r) => {
                if matches!(base.as_ref(), Expr::Add(_) | Expr::Mul(_)) {
                    write!(f, "({})", base)?;
                } else {
                    write!(f, "{}", base)?;
                }
                if r.is_integer() && !r.is_negative() {
                    write!(f, "^{}", r.numer())
                } else if r.is_integer() {
                    write!(f, "^({})", r.numer())
                } else {
                    write!(f, "^({}/{})", r.numer(), r.denom())
                }
            }
            Expr::Sin(u) => write!(f, "sin({})", u),
            Expr::Cos(u) => write!(f, "cos({})", u),
            Expr::Sinh(u) => write!(f, "sinh({})", u),
            Expr::Cosh(u) => write!(f, "cosh({})", u),
        }
    }
}
