//! Two's-complement bit vectors of boolean diagrams.
//!
//! A bit vector is a `Vec<Dd>` of boolean diagrams, least-significant bit
//! first; the last bit is the sign. All functions return vectors of owned
//! handles and leave their arguments alone. Results of [`Context::twocpl_add`]
//! and friends are one bit wider than their widest operand, so they never
//! overflow.

use log::debug;

use crate::context::Context;
use crate::dd::Dd;
use crate::error::{DdError, Result};
use crate::operator::Operator;

/// Smallest two's-complement width that holds `n`.
fn width_of(n: i64) -> usize {
    let magnitude = if n < 0 { !n as u64 } else { n as u64 };
    (64 - magnitude.leading_zeros()) as usize + 1
}

impl Context {
    /// Bit vector of the constant `n`, as narrow as possible.
    pub fn twocpl_from_int(&self, n: i64) -> Result<Vec<Dd>> {
        self.twocpl_from_int_width(n, width_of(n))
    }

    /// Bit vector of the constant `n` with exactly `bits` bits.
    pub fn twocpl_from_int_width(&self, n: i64, bits: usize) -> Result<Vec<Dd>> {
        if bits < width_of(n) {
            return Err(DdError::Arithmetic(format!(
                "{} does not fit into {} bits",
                n, bits
            )));
        }
        self.collect_owned((0..bits).map(|i| self.new_constant(n >> i.min(63) & 1 == 1)))
    }

    /// Copy of `a`, widened to `bits` by repeating the sign bit.
    pub fn twocpl_sign_extend(&self, a: &[Dd], bits: usize) -> Result<Vec<Dd>> {
        let sign = *a
            .last()
            .ok_or_else(|| DdError::Arithmetic("empty bit vector".to_string()))?;
        self.collect_owned(
            (0..bits.max(a.len())).map(|i| self.retain(a.get(i).copied().unwrap_or(sign))),
        )
    }

    /// Run `f` on `a` and `b` sign-extended to `bits`. The extended copies are
    /// released afterwards, whatever `f` returns.
    fn with_extended<T>(
        &self,
        a: &[Dd],
        b: &[Dd],
        bits: usize,
        f: impl FnOnce(&[Dd], &[Dd]) -> Result<T>,
    ) -> Result<T> {
        let a = self.twocpl_sign_extend(a, bits)?;
        let b = self.twocpl_sign_extend(b, bits);
        let b = self.release_on_error(&a, b)?;
        let res = f(&a, &b);
        self.consume(&[&a[..], &b[..]].concat(), res)
    }

    /// `a * 2`.
    pub fn twocpl_shift_left(&self, a: &[Dd]) -> Result<Vec<Dd>> {
        let low = self.new_false()?;
        let rest = self.retain_all(a);
        let rest = self.release_on_error(&[low], rest)?;
        let mut res = vec![low];
        res.extend(rest);
        Ok(res)
    }

    /// Bitwise `if cond then a else b`.
    pub fn twocpl_ite(&self, cond: Dd, a: &[Dd], b: &[Dd]) -> Result<Vec<Dd>> {
        self.with_extended(a, b, a.len().max(b.len()), |a, b| {
            self.collect_owned(a.iter().zip(b).map(|(&x, &y)| self.ite(cond, x, y)))
        })
    }

    /// Carry out of a full adder: at least two of `x`, `y`, `c` hold.
    fn majority(&self, x: Dd, y: Dd, c: Dd) -> Result<Dd> {
        let pairs = [(x, y), (x, c), (y, c)];
        let pairs = self.collect_owned(pairs.iter().map(|&(p, q)| self.and(p, q)))?;
        self.consume(&pairs, self.apply(Operator::Or, &pairs))
    }

    /// Ripple-carry sum of `a` and `b`, both sign-extended to `bits`, modulo `2^bits`.
    fn add_modulo(&self, a: &[Dd], b: &[Dd], bits: usize) -> Result<Vec<Dd>> {
        self.with_extended(a, b, bits, |a, b| {
            let mut carry = self.new_false()?;
            let mut res = Vec::with_capacity(bits);
            for (&x, &y) in a.iter().zip(b).take(bits) {
                let step = self.apply(Operator::Xor, &[x, y, carry]).and_then(|sum| {
                    let next = self.majority(x, y, carry);
                    self.release_on_error(&[sum], next).map(|next| (sum, next))
                });
                match step {
                    Ok((sum, next)) => {
                        res.push(sum);
                        self.release(carry)?;
                        carry = next;
                    }
                    Err(e) => {
                        res.push(carry);
                        return self.release_on_error(&res, Err(e));
                    }
                }
            }
            self.release(carry)?;
            Ok(res)
        })
    }

    pub fn twocpl_add(&self, a: &[Dd], b: &[Dd]) -> Result<Vec<Dd>> {
        debug!("twocpl_add({} bits, {} bits)", a.len(), b.len());
        self.add_modulo(a, b, a.len().max(b.len()) + 1)
    }

    /// `-a`.
    pub fn twocpl_add_inverse(&self, a: &[Dd]) -> Result<Vec<Dd>> {
        let inverted = self.collect_owned(a.iter().map(|&x| self.not(x)))?;
        let one = self.twocpl_from_int(1);
        let one = self.release_on_error(&inverted, one)?;
        self.consume(
            &[&inverted[..], &one[..]].concat(),
            self.twocpl_add(&inverted, &one),
        )
    }

    pub fn twocpl_subtract(&self, a: &[Dd], b: &[Dd]) -> Result<Vec<Dd>> {
        let neg = self.twocpl_add_inverse(b)?;
        self.consume(&neg, self.twocpl_add(a, &neg))
    }

    /// Shift-and-add product. The result has `a.len() + b.len()` bits.
    pub fn twocpl_multiply(&self, a: &[Dd], b: &[Dd]) -> Result<Vec<Dd>> {
        debug!("twocpl_multiply({} bits, {} bits)", a.len(), b.len());
        let bits = a.len() + b.len();
        self.with_extended(a, b, bits, |a, b| {
            let mut acc = self.twocpl_from_int_width(0, bits)?;
            for (i, &bi) in b.iter().enumerate() {
                let term = self.collect_owned((0..bits).map(|j| {
                    if j < i {
                        self.new_false()
                    } else {
                        self.and(bi, a[j - i])
                    }
                }));
                let term = self.release_on_error(&acc, term)?;
                let next = self.add_modulo(&acc, &term, bits);
                acc = self.consume(&[&acc[..], &term[..]].concat(), next)?;
            }
            Ok(acc)
        })
    }

    /// Pairwise equivalence of two lists of the same length.
    pub fn eq_lists(&self, a: &[Dd], b: &[Dd]) -> Result<Dd> {
        if a.len() != b.len() {
            return Err(DdError::TypeMismatch(format!(
                "lists of length {} and {}",
                a.len(),
                b.len()
            )));
        }
        let mut res = self.new_true()?;
        for (&x, &y) in a.iter().zip(b) {
            let same = self.iff(x, y);
            let same = self.release_on_error(&[res], same)?;
            res = self.and_with(res, same)?;
        }
        Ok(res)
    }

    pub fn twocpl_eq(&self, a: &[Dd], b: &[Dd]) -> Result<Dd> {
        self.with_extended(a, b, a.len().max(b.len()), |a, b| self.eq_lists(a, b))
    }

    pub fn twocpl_ne(&self, a: &[Dd], b: &[Dd]) -> Result<Dd> {
        self.not_with(self.twocpl_eq(a, b)?)
    }

    /// `a < b`: the sign of `a - b`.
    pub fn twocpl_lt(&self, a: &[Dd], b: &[Dd]) -> Result<Dd> {
        let diff = self.twocpl_subtract(a, b)?;
        let res = diff
            .last()
            .copied()
            .ok_or_else(|| DdError::Arithmetic("empty bit vector".to_string()))
            .and_then(|sign| self.retain(sign));
        self.consume(&diff, res)
    }

    pub fn twocpl_le(&self, a: &[Dd], b: &[Dd]) -> Result<Dd> {
        let lt = self.twocpl_lt(a, b)?;
        let eq = self.twocpl_eq(a, b);
        let eq = self.release_on_error(&[lt], eq)?;
        self.or_with(lt, eq)
    }

    pub fn twocpl_gt(&self, a: &[Dd], b: &[Dd]) -> Result<Dd> {
        self.twocpl_lt(b, a)
    }

    pub fn twocpl_ge(&self, a: &[Dd], b: &[Dd]) -> Result<Dd> {
        self.twocpl_le(b, a)
    }

    pub fn twocpl_min(&self, a: &[Dd], b: &[Dd]) -> Result<Vec<Dd>> {
        let lt = self.twocpl_lt(a, b)?;
        self.consume(&[lt], self.twocpl_ite(lt, a, b))
    }

    pub fn twocpl_max(&self, a: &[Dd], b: &[Dd]) -> Result<Vec<Dd>> {
        let lt = self.twocpl_lt(a, b)?;
        self.consume(&[lt], self.twocpl_ite(lt, b, a))
    }
}
