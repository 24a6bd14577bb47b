//! Arithmetic and bitwise operations on `Var`
//!
//! All operations are type-strict: no implicit int/float coercion anywhere.
//! Every float-producing operation checks its result; a value that would be
//! NaN or infinite never comes into existence (E_FLOAT instead). Division
//! and modulus check the right operand for zero before computing (E_DIV).
//!
//! Integer overflow is undefined by the language; we wrap rather than trap
//! so that hostile scripts cannot panic the server.

use crate::error::Error;
use crate::string::MooStr;
use crate::value::Var;

/// Reject NaN and infinity so they never become values.
pub fn check_float(f: f64) -> Result<Var, Error> {
    if f.is_finite() {
        Ok(Var::Float(f))
    } else {
        Err(Error::Float)
    }
}

/// `a + b`: numeric addition, or string concatenation.
pub fn add(a: &Var, b: &Var) -> Result<Var, Error> {
    match (a, b) {
        (Var::Int(x), Var::Int(y)) => Ok(Var::Int(x.wrapping_add(*y))),
        (Var::Float(x), Var::Float(y)) => check_float(x + y),
        (Var::Str(x), Var::Str(y)) => {
            let mut bytes = Vec::with_capacity(x.len() + y.len());
            bytes.extend_from_slice(x.as_bytes());
            bytes.extend_from_slice(y.as_bytes());
            Ok(Var::Str(MooStr::from_bytes(bytes)))
        }
        _ => Err(Error::Type),
    }
}

pub fn sub(a: &Var, b: &Var) -> Result<Var, Error> {
    match (a, b) {
        (Var::Int(x), Var::Int(y)) => Ok(Var::Int(x.wrapping_sub(*y))),
        (Var::Float(x), Var::Float(y)) => check_float(x - y),
        _ => Err(Error::Type),
    }
}

pub fn mul(a: &Var, b: &Var) -> Result<Var, Error> {
    match (a, b) {
        (Var::Int(x), Var::Int(y)) => Ok(Var::Int(x.wrapping_mul(*y))),
        (Var::Float(x), Var::Float(y)) => check_float(x * y),
        _ => Err(Error::Type),
    }
}

/// `a / b`. A zero right operand raises E_DIV before any computation, for
/// floats as well as ints.
pub fn div(a: &Var, b: &Var) -> Result<Var, Error> {
    match (a, b) {
        (Var::Int(_), Var::Int(0)) => Err(Error::Div),
        (Var::Int(x), Var::Int(y)) => Ok(Var::Int(x.wrapping_div(*y))),
        (Var::Float(_), Var::Float(y)) if *y == 0.0 => Err(Error::Div),
        (Var::Float(x), Var::Float(y)) => check_float(x / y),
        _ => Err(Error::Type),
    }
}

/// `a % b`, with the sign conventions of C's `%` / `fmod`.
pub fn rem(a: &Var, b: &Var) -> Result<Var, Error> {
    match (a, b) {
        (Var::Int(_), Var::Int(0)) => Err(Error::Div),
        (Var::Int(x), Var::Int(y)) => Ok(Var::Int(x.wrapping_rem(*y))),
        (Var::Float(_), Var::Float(y)) if *y == 0.0 => Err(Error::Div),
        (Var::Float(x), Var::Float(y)) => check_float(x % y),
        _ => Err(Error::Type),
    }
}

/// Exponentiation. `INT ^ INT` stays integral (negative exponent E_TYPE);
/// a FLOAT base accepts either exponent type; `INT ^ FLOAT` is E_TYPE.
pub fn pow(a: &Var, b: &Var) -> Result<Var, Error> {
    match (a, b) {
        (Var::Int(_), Var::Int(y)) if *y < 0 => Err(Error::Type),
        (Var::Int(x), Var::Int(y)) => {
            let mut acc: i64 = 1;
            let mut base = *x;
            let mut exp = *y as u64;
            while exp > 0 {
                if exp & 1 == 1 {
                    acc = acc.wrapping_mul(base);
                }
                base = base.wrapping_mul(base);
                exp >>= 1;
            }
            Ok(Var::Int(acc))
        }
        (Var::Float(x), Var::Int(y)) => check_float(x.powi(*y as i32)),
        (Var::Float(x), Var::Float(y)) => check_float(x.powf(*y)),
        _ => Err(Error::Type),
    }
}

/// Unary minus.
pub fn neg(a: &Var) -> Result<Var, Error> {
    match a {
        Var::Int(x) => Ok(Var::Int(x.wrapping_neg())),
        Var::Float(x) => check_float(-x),
        _ => Err(Error::Type),
    }
}

/// Bitwise operators are INT-only.
pub fn bit_and(a: &Var, b: &Var) -> Result<Var, Error> {
    match (a, b) {
        (Var::Int(x), Var::Int(y)) => Ok(Var::Int(x & y)),
        _ => Err(Error::Type),
    }
}

pub fn bit_or(a: &Var, b: &Var) -> Result<Var, Error> {
    match (a, b) {
        (Var::Int(x), Var::Int(y)) => Ok(Var::Int(x | y)),
        _ => Err(Error::Type),
    }
}

pub fn bit_xor(a: &Var, b: &Var) -> Result<Var, Error> {
    match (a, b) {
        (Var::Int(x), Var::Int(y)) => Ok(Var::Int(x ^ y)),
        _ => Err(Error::Type),
    }
}

/// Shifts mask the count to the word width, like the hardware does.
pub fn shl(a: &Var, b: &Var) -> Result<Var, Error> {
    match (a, b) {
        (Var::Int(x), Var::Int(y)) => Ok(Var::Int(x.wrapping_shl(*y as u32))),
        _ => Err(Error::Type),
    }
}

pub fn shr(a: &Var, b: &Var) -> Result<Var, Error> {
    match (a, b) {
        (Var::Int(x), Var::Int(y)) => Ok(Var::Int(x.wrapping_shr(*y as u32))),
        _ => Err(Error::Type),
    }
}
