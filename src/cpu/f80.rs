//! Software implementation of the x87 extended precision format (binary80).
//!
//! A value has a sign bit, a 15-bit biased exponent and a 64-bit significand
//! with an *explicit* integer bit. All arithmetic is performed exactly on
//! 128-bit intermediates and rounded once, according to a `RoundingMode`.

use std::cmp::Ordering;
use std::fmt;

const BIAS: i32 = 16383;
const MAX_EXPONENT: u16 = 0x7FFF;
const INTEGER_BIT: u64 = 1 << 63;
const QUIET_BIT: u64 = 1 << 62;

bitflags! {
    /// Floating-point exceptions, with the bit positions they have in the
    /// x87 status and control words.
    pub struct Exceptions: u16 {
        /// Invalid operation.
        const IE = 1 << 0;
        /// Denormal operand.
        const DE = 1 << 1;
        /// Division by zero.
        const ZE = 1 << 2;
        /// Overflow.
        const OE = 1 << 3;
        /// Underflow.
        const UE = 1 << 4;
        /// Precision (inexact result).
        const PE = 1 << 5;
    }
}

/// The rounding-control field of the control word.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromPrimitive)]
pub enum RoundingMode {
    /// Round to nearest, ties to even.
    Nearest = 0,
    /// Round towards negative infinity.
    Down = 1,
    /// Round towards positive infinity.
    Up = 2,
    /// Truncate.
    Zero = 3,
}

/// An 80-bit extended precision floating-point number.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct F80 {
    sign: bool,
    exponent: u16,
    significand: u64,
}

/// A value broken up for arithmetic. Finite values are normalized:
/// `sig * 2^(exp - 63)` with bit 63 of `sig` set.
enum Class {
    Zero,
    Finite { exp: i32, sig: u64 },
    Infinite,
    Nan,
}

impl F80 {
    pub const ZERO: F80 = F80 { sign: false, exponent: 0, significand: 0 };
    pub const ONE: F80 = F80 { sign: false, exponent: BIAS as u16, significand: INTEGER_BIT };
    pub const INFINITY: F80 = F80 { sign: false, exponent: MAX_EXPONENT, significand: INTEGER_BIT };
    /// The default NaN produced by invalid operations ("real indefinite").
    pub const INDEFINITE: F80 = F80 { sign: true, exponent: MAX_EXPONENT, significand: INTEGER_BIT | QUIET_BIT };

    pub fn new(sign: bool, exponent: u16, significand: u64) -> Self {
        F80 { sign, exponent: exponent & MAX_EXPONENT, significand }
    }

    fn zero(sign: bool) -> Self {
        F80 { sign, ..F80::ZERO }
    }

    fn infinity(sign: bool) -> Self {
        F80 { sign, ..F80::INFINITY }
    }

    pub fn sign(&self) -> bool {
        self.sign
    }

    pub fn exponent(&self) -> u16 {
        self.exponent
    }

    pub fn significand(&self) -> u64 {
        self.significand
    }

    pub fn is_zero(&self) -> bool {
        self.exponent == 0 && self.significand == 0
    }

    pub fn is_nan(&self) -> bool {
        self.exponent == MAX_EXPONENT && self.significand << 1 != 0
    }

    pub fn is_signaling(&self) -> bool {
        self.is_nan() && self.significand & QUIET_BIT == 0
    }

    pub fn is_infinite(&self) -> bool {
        self.exponent == MAX_EXPONENT && self.significand << 1 == 0
    }

    pub fn is_denormal(&self) -> bool {
        self.exponent == 0 && self.significand != 0
    }

    pub fn neg(self) -> Self {
        F80 { sign: !self.sign, ..self }
    }

    pub fn abs(self) -> Self {
        F80 { sign: false, ..self }
    }

    fn quiet(self) -> Self {
        F80 { significand: self.significand | QUIET_BIT, ..self }
    }

    fn classify(&self) -> Class {
        if self.exponent == MAX_EXPONENT {
            if self.significand << 1 == 0 {
                Class::Infinite
            } else {
                Class::Nan
            }
        } else if self.significand == 0 {
            Class::Zero
        } else {
            let shift = self.significand.leading_zeros();
            Class::Finite {
                exp: i32::from(self.exponent.max(1)) - BIAS - shift as i32,
                sig: self.significand << shift,
            }
        }
    }

    /// Decodes the 10-byte memory representation.
    pub fn from_bytes(bytes: [u8; 10]) -> Self {
        let mut significand = 0;
        for &byte in bytes[..8].iter().rev() {
            significand = significand << 8 | u64::from(byte);
        }
        let top = u16::from(bytes[9]) << 8 | u16::from(bytes[8]);
        F80::new(top & 0x8000 != 0, top, significand)
    }

    pub fn to_bytes(&self) -> [u8; 10] {
        let mut bytes = [0; 10];
        for (i, byte) in bytes[..8].iter_mut().enumerate() {
            *byte = (self.significand >> (i * 8)) as u8;
        }
        let top = (self.sign as u16) << 15 | self.exponent;
        bytes[8] = top as u8;
        bytes[9] = (top >> 8) as u8;
        bytes
    }

    /// Converts a binary32 value. Exact.
    pub fn from_f32(value: f32) -> Self {
        F80::from_ieee(u64::from(value.to_bits()), 23, 8)
    }

    /// Converts a binary64 value. Exact.
    pub fn from_f64(value: f64) -> Self {
        F80::from_ieee(value.to_bits(), 52, 11)
    }

    /// Converts a 64-bit integer. Exact, since the significand has 64 bits.
    pub fn from_i64(value: i64) -> Self {
        if value == 0 {
            return F80::ZERO;
        }

        let magnitude = value.wrapping_abs() as u64;
        let shift = magnitude.leading_zeros();
        F80 {
            sign: value < 0,
            exponent: (BIAS + 63 - shift as i32) as u16,
            significand: magnitude << shift,
        }
    }

    /// Rounds to binary32.
    pub fn to_f32(&self, mode: RoundingMode) -> (f32, Exceptions) {
        let (bits, exc) = self.to_ieee(23, 8, mode);
        (f32::from_bits(bits as u32), exc)
    }

    /// Rounds to binary64.
    pub fn to_f64(&self, mode: RoundingMode) -> (f64, Exceptions) {
        let (bits, exc) = self.to_ieee(52, 11, mode);
        (f64::from_bits(bits), exc)
    }

    /// Rounds to an integer according to `mode`.
    ///
    /// Returns `None` for NaNs, infinities and values outside the `i64`
    /// range.
    pub fn to_i64(&self, mode: RoundingMode) -> Option<i64> {
        match self.classify() {
            Class::Nan | Class::Infinite => None,
            Class::Zero => Some(0),
            Class::Finite { exp, sig } => {
                if exp > 63 {
                    return None;
                }

                let magnitude = if exp == 63 {
                    u128::from(sig)
                } else {
                    shift_right_round(u128::from(sig), (63 - exp) as u32, self.sign, mode).0
                };

                if self.sign {
                    if magnitude <= 1 << 63 {
                        Some((magnitude as u64).wrapping_neg() as i64)
                    } else {
                        None
                    }
                } else if magnitude < 1 << 63 {
                    Some(magnitude as i64)
                } else {
                    None
                }
            }
        }
    }

    fn from_ieee(bits: u64, frac_bits: u32, exp_bits: u32) -> Self {
        let sign = (bits >> (frac_bits + exp_bits)) & 1 != 0;
        let max_exp = (1 << exp_bits) - 1;
        let biased = (bits >> frac_bits) & max_exp;
        let frac = bits & ((1 << frac_bits) - 1);
        let bias = (1 << (exp_bits - 1)) - 1;

        if biased == max_exp {
            if frac == 0 {
                F80::infinity(sign)
            } else {
                F80 { sign, exponent: MAX_EXPONENT, significand: INTEGER_BIT | frac << (63 - frac_bits) }
            }
        } else if biased == 0 {
            if frac == 0 {
                return F80::zero(sign);
            }

            let shift = frac.leading_zeros();
            let exp = (63 - shift as i32) + 1 - bias - frac_bits as i32;
            F80 { sign, exponent: (exp + BIAS) as u16, significand: frac << shift }
        } else {
            F80 {
                sign,
                exponent: (biased as i32 - bias + BIAS) as u16,
                significand: INTEGER_BIT | frac << (63 - frac_bits),
            }
        }
    }

    fn to_ieee(&self, frac_bits: u32, exp_bits: u32, mode: RoundingMode) -> (u64, Exceptions) {
        let sign_bit = (self.sign as u64) << (frac_bits + exp_bits);
        let max_exp = (1u64 << exp_bits) - 1;
        let bias = (1i32 << (exp_bits - 1)) - 1;

        match self.classify() {
            Class::Zero => (sign_bit, Exceptions::empty()),
            Class::Infinite => (sign_bit | max_exp << frac_bits, Exceptions::empty()),
            Class::Nan => {
                let payload = (self.significand << 1) >> (64 - frac_bits);
                let exc = if self.is_signaling() { Exceptions::IE } else { Exceptions::empty() };
                (sign_bit | max_exp << frac_bits | payload | 1 << (frac_bits - 1), exc)
            }
            Class::Finite { exp, sig } => {
                let precision = frac_bits + 1;
                let mut biased = exp + bias;
                let mut shift = (64 - precision) as i32;
                if biased <= 0 {
                    shift += 1 - biased;
                    biased = 0;
                }

                let (mut kept, inexact) = shift_right_round(u128::from(sig), shift as u32, self.sign, mode);
                if kept >> precision != 0 {
                    kept >>= 1;
                    biased += 1;
                } else if biased == 0 && kept >> frac_bits != 0 {
                    biased = 1;
                }

                let mut exc = Exceptions::empty();
                if inexact {
                    exc |= Exceptions::PE;
                    if biased == 0 {
                        exc |= Exceptions::UE;
                    }
                }

                if biased as u64 >= max_exp {
                    let bits = if rounds_to_infinity(self.sign, mode) {
                        max_exp << frac_bits
                    } else {
                        (max_exp - 1) << frac_bits | ((1 << frac_bits) - 1)
                    };
                    return (sign_bit | bits, exc | Exceptions::OE | Exceptions::PE);
                }

                let frac = kept as u64 & ((1 << frac_bits) - 1);
                (sign_bit | (biased as u64) << frac_bits | frac, exc)
            }
        }
    }

    pub fn add(self, other: F80, mode: RoundingMode) -> (F80, Exceptions) {
        match (self.classify(), other.classify()) {
            (Class::Nan, _) | (_, Class::Nan) => propagate_nan(self, other),
            (Class::Infinite, Class::Infinite) => {
                if self.sign == other.sign {
                    (self, Exceptions::empty())
                } else {
                    (F80::INDEFINITE, Exceptions::IE)
                }
            }
            (Class::Infinite, _) => (self, Exceptions::empty()),
            (_, Class::Infinite) => (other, Exceptions::empty()),
            (Class::Zero, Class::Zero) => {
                let sign = if self.sign == other.sign {
                    self.sign
                } else {
                    mode == RoundingMode::Down
                };
                (F80::zero(sign), Exceptions::empty())
            }
            (Class::Zero, _) => (other, Exceptions::empty()),
            (_, Class::Zero) => (self, Exceptions::empty()),
            (Class::Finite { exp: ea, sig: sa }, Class::Finite { exp: eb, sig: sb }) => {
                let ((big_sign, big_exp, big), (small_sign, small_exp, small)) = if ea >= eb {
                    ((self.sign, ea, sa), (other.sign, eb, sb))
                } else {
                    ((other.sign, eb, sb), (self.sign, ea, sa))
                };

                // 62 guard bits below the significand; whatever is shifted
                // out beyond them only matters as a sticky bit.
                let big = u128::from(big) << 62;
                let small = u128::from(small) << 62;
                let diff = (big_exp - small_exp) as u32;
                let small = if diff >= 127 {
                    1
                } else {
                    let shifted = small >> diff;
                    shifted | (shifted << diff != small) as u128
                };
                let exp = big_exp - 63 - 62;

                if big_sign == small_sign {
                    round_pack(big_sign, exp, big + small, mode)
                } else if big > small {
                    round_pack(big_sign, exp, big - small, mode)
                } else if big < small {
                    round_pack(small_sign, exp, small - big, mode)
                } else {
                    (F80::zero(mode == RoundingMode::Down), Exceptions::empty())
                }
            }
        }
    }

    pub fn sub(self, other: F80, mode: RoundingMode) -> (F80, Exceptions) {
        self.add(other.neg(), mode)
    }

    pub fn mul(self, other: F80, mode: RoundingMode) -> (F80, Exceptions) {
        let sign = self.sign != other.sign;
        match (self.classify(), other.classify()) {
            (Class::Nan, _) | (_, Class::Nan) => propagate_nan(self, other),
            (Class::Infinite, Class::Zero) | (Class::Zero, Class::Infinite) => (F80::INDEFINITE, Exceptions::IE),
            (Class::Infinite, _) | (_, Class::Infinite) => (F80::infinity(sign), Exceptions::empty()),
            (Class::Zero, _) | (_, Class::Zero) => (F80::zero(sign), Exceptions::empty()),
            (Class::Finite { exp: ea, sig: sa }, Class::Finite { exp: eb, sig: sb }) => {
                round_pack(sign, ea - 63 + eb - 63, u128::from(sa) * u128::from(sb), mode)
            }
        }
    }

    pub fn div(self, other: F80, mode: RoundingMode) -> (F80, Exceptions) {
        let sign = self.sign != other.sign;
        match (self.classify(), other.classify()) {
            (Class::Nan, _) | (_, Class::Nan) => propagate_nan(self, other),
            (Class::Infinite, Class::Infinite) | (Class::Zero, Class::Zero) => (F80::INDEFINITE, Exceptions::IE),
            (Class::Infinite, _) => (F80::infinity(sign), Exceptions::empty()),
            (_, Class::Infinite) => (F80::zero(sign), Exceptions::empty()),
            (_, Class::Zero) => (F80::infinity(sign), Exceptions::ZE),
            (Class::Zero, _) => (F80::zero(sign), Exceptions::empty()),
            (Class::Finite { exp: ea, sig: sa }, Class::Finite { exp: eb, sig: sb }) => {
                // Long division in two steps: 64 + 32 quotient bits, then a
                // sticky bit for the remainder.
                let divisor = u128::from(sb);
                let num = u128::from(sa) << 64;
                let (q1, r1) = (num / divisor, num % divisor);
                let num = r1 << 32;
                let (q2, r2) = (num / divisor, num % divisor);
                let quotient = (q1 << 32 | q2) << 1 | (r2 != 0) as u128;
                round_pack(sign, ea - eb - 97, quotient, mode)
            }
        }
    }

    /// Compares two values. Returns `None` if either one is a NaN.
    ///
    /// Zeros compare equal regardless of their sign.
    pub fn compare(&self, other: &F80) -> Option<Ordering> {
        if self.is_nan() || other.is_nan() {
            return None;
        }
        if self.is_zero() && other.is_zero() {
            return Some(Ordering::Equal);
        }
        if self.sign != other.sign {
            return Some(if self.sign { Ordering::Less } else { Ordering::Greater });
        }

        let magnitude = (self.exponent, self.significand).cmp(&(other.exponent, other.significand));
        Some(if self.sign { magnitude.reverse() } else { magnitude })
    }
}

impl fmt::Display for F80 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_f64(RoundingMode::Nearest).0)
    }
}

fn propagate_nan(a: F80, b: F80) -> (F80, Exceptions) {
    let exc = if a.is_signaling() || b.is_signaling() {
        Exceptions::IE
    } else {
        Exceptions::empty()
    };
    let nan = if a.is_nan() { a } else { b };
    (nan.quiet(), exc)
}

fn rounds_to_infinity(sign: bool, mode: RoundingMode) -> bool {
    match mode {
        RoundingMode::Nearest => true,
        RoundingMode::Down => sign,
        RoundingMode::Up => !sign,
        RoundingMode::Zero => false,
    }
}

/// Shifts `value` right by `shift > 0` bits and rounds the result. Also
/// returns whether any nonzero bits were shifted out.
fn shift_right_round(value: u128, shift: u32, sign: bool, mode: RoundingMode) -> (u128, bool) {
    let (kept, half, inexact) = if shift > 128 {
        (0, Ordering::Less, value != 0)
    } else if shift == 128 {
        (0, value.cmp(&(1 << 127)), value != 0)
    } else {
        let rest = value & ((1 << shift) - 1);
        (value >> shift, rest.cmp(&(1 << (shift - 1))), rest != 0)
    };

    let round_up = match mode {
        RoundingMode::Nearest => half == Ordering::Greater || (half == Ordering::Equal && kept & 1 == 1),
        RoundingMode::Down => inexact && sign,
        RoundingMode::Up => inexact && !sign,
        RoundingMode::Zero => false,
    };

    (kept + round_up as u128, inexact)
}

/// Rounds the exact value `value * 2^exp` to extended precision.
fn round_pack(sign: bool, exp: i32, value: u128, mode: RoundingMode) -> (F80, Exceptions) {
    if value == 0 {
        return (F80::zero(sign), Exceptions::empty());
    }

    let top = 127 - value.leading_zeros() as i32;
    let mut biased = exp + top + BIAS;
    let mut shift = top - 63;
    if biased <= 0 {
        shift += 1 - biased;
        biased = 0;
    }

    let (mut sig, inexact) = if shift <= 0 {
        (value << (-shift) as u32, false)
    } else {
        shift_right_round(value, shift as u32, sign, mode)
    };

    if sig >> 64 != 0 {
        sig >>= 1;
        biased += 1;
    } else if biased == 0 && sig >> 63 != 0 {
        biased = 1;
    }

    let mut exc = Exceptions::empty();
    if inexact {
        exc |= Exceptions::PE;
        if biased == 0 {
            exc |= Exceptions::UE;
        }
    }

    if biased >= i32::from(MAX_EXPONENT) {
        let result = if rounds_to_infinity(sign, mode) {
            F80::infinity(sign)
        } else {
            F80 { sign, exponent: MAX_EXPONENT - 1, significand: !0 }
        };
        return (result, exc | Exceptions::OE | Exceptions::PE);
    }

    (F80 { sign, exponent: biased as u16, significand: sig as u64 }, exc)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEAREST: RoundingMode = RoundingMode::Nearest;

    fn f(value: f64) -> F80 {
        F80::from_f64(value)
    }

    fn back(value: F80) -> f64 {
        value.to_f64(NEAREST).0
    }

    #[test]
    fn f64_round_trip() {
        let values = [
            0.0, -0.0, 1.0, -1.5, 0.1, 1.0 / 3.0, 123456789.0, 1e300, -1e-300,
            std::f64::consts::PI, std::f64::MAX, std::f64::MIN_POSITIVE,
            5e-324, -2.2250738585072e-310, std::f64::INFINITY, std::f64::NEG_INFINITY,
        ];
        for &value in &values {
            let (result, exc) = f(value).to_f64(NEAREST);
            assert_eq!(result.to_bits(), value.to_bits(), "{}", value);
            assert!(exc.is_empty());
        }

        assert!(back(f(std::f64::NAN)).is_nan());
    }

    #[test]
    fn f32_round_trip() {
        for &value in &[0.5f32, -3.25, 1e-40, std::f32::MAX, 16777217.0] {
            let (result, _) = F80::from_f32(value).to_f32(NEAREST);
            assert_eq!(result.to_bits(), value.to_bits());
        }
    }

    #[test]
    fn narrowing_rounds() {
        let third = F80::ONE.div(f(3.0), NEAREST).0;
        let (result, exc) = third.to_f64(NEAREST);
        assert_eq!(result, 1.0 / 3.0);
        assert_eq!(exc, Exceptions::PE);

        let (result, exc) = f(1e300).to_f32(NEAREST);
        assert_eq!(result, std::f32::INFINITY);
        assert!(exc.contains(Exceptions::OE));

        let (result, _) = f(1e300).to_f32(RoundingMode::Zero);
        assert_eq!(result, std::f32::MAX);
    }

    #[test]
    fn memory_format() {
        assert_eq!(F80::ONE.to_bytes(), [0, 0, 0, 0, 0, 0, 0, 0x80, 0xFF, 0x3F]);
        assert_eq!(f(-2.0).to_bytes(), [0, 0, 0, 0, 0, 0, 0, 0x80, 0x00, 0xC0]);
        let pi = f(std::f64::consts::PI);
        assert_eq!(F80::from_bytes(pi.to_bytes()), pi);
    }

    #[test]
    fn arithmetic() {
        assert_eq!(back(f(1.0).add(f(2.0), NEAREST).0), 3.0);
        assert_eq!(back(f(1.5).mul(f(2.25), NEAREST).0), 3.375);
        assert_eq!(back(f(10.0).div(f(4.0), NEAREST).0), 2.5);
        assert_eq!(back(f(1.0).sub(f(0.25), NEAREST).0), 0.75);
        assert_eq!(back(f(-7.0).add(f(2.0), NEAREST).0), -5.0);
        assert_eq!(back(f(1e-20).add(f(1.0), NEAREST).0), 1.0);
        assert_eq!(back(f(3.0).mul(f(-0.5), NEAREST).0), -1.5);

        let (result, exc) = f(3.0).add(f(1e-30), NEAREST);
        assert_eq!(back(result), 3.0);
        assert_eq!(exc, Exceptions::PE);

        // exact in extended precision, but not in double precision
        let big = f(9007199254740992.0).add(F80::ONE, NEAREST).0;
        assert_eq!(big.to_i64(NEAREST), Some(9007199254740993));
    }

    #[test]
    fn signed_zeros() {
        let (zero, _) = f(1.0).sub(f(1.0), NEAREST);
        assert!(zero.is_zero() && !zero.sign());
        let (zero, _) = f(1.0).sub(f(1.0), RoundingMode::Down);
        assert!(zero.sign());
        assert!(f(-0.0).add(f(-0.0), NEAREST).0.sign());
        assert!(f(-2.0).mul(F80::ZERO, NEAREST).0.sign());
    }

    #[test]
    fn special_values() {
        let (result, exc) = F80::ONE.div(F80::ZERO, NEAREST);
        assert_eq!(result, F80::INFINITY);
        assert_eq!(exc, Exceptions::ZE);
        assert_eq!(f(-1.0).div(F80::ZERO, NEAREST).0, F80::INFINITY.neg());

        assert_eq!(F80::ZERO.div(F80::ZERO, NEAREST), (F80::INDEFINITE, Exceptions::IE));
        assert_eq!(F80::INFINITY.sub(F80::INFINITY, NEAREST), (F80::INDEFINITE, Exceptions::IE));
        assert_eq!(F80::INFINITY.mul(F80::ZERO, NEAREST), (F80::INDEFINITE, Exceptions::IE));

        let (result, exc) = F80::INDEFINITE.add(F80::ONE, NEAREST);
        assert!(result.is_nan());
        assert!(exc.is_empty());

        let signaling = F80::new(false, 0x7FFF, INTEGER_BIT | 1);
        let (result, exc) = signaling.mul(F80::ONE, NEAREST);
        assert!(result.is_nan() && !result.is_signaling());
        assert_eq!(exc, Exceptions::IE);
    }

    #[test]
    fn overflow_and_underflow() {
        let huge = F80::new(false, 0x7FFE, !0);
        let (result, exc) = huge.mul(f(2.0), NEAREST);
        assert_eq!(result, F80::INFINITY);
        assert!(exc.contains(Exceptions::OE));

        let tiny = F80::new(false, 1, INTEGER_BIT);
        let (result, exc) = tiny.div(f(3.0), NEAREST);
        assert!(result.is_denormal());
        assert!(exc.contains(Exceptions::UE | Exceptions::PE));
    }

    #[test]
    fn comparisons() {
        assert_eq!(f(1.0).compare(&f(2.0)), Some(Ordering::Less));
        assert_eq!(f(-1.0).compare(&f(-2.0)), Some(Ordering::Greater));
        assert_eq!(f(-1.0).compare(&f(0.5)), Some(Ordering::Less));
        assert_eq!(f(0.0).compare(&f(-0.0)), Some(Ordering::Equal));
        assert_eq!(F80::INFINITY.compare(&f(1e300)), Some(Ordering::Greater));
        assert_eq!(F80::INDEFINITE.compare(&F80::ONE), None);
        assert_eq!(f(5e-324).compare(&f(1e-300)), Some(Ordering::Less));
    }

    #[test]
    fn integers() {
        for &value in &[0, 1, -1, 42, -1000000, i64::max_value(), i64::min_value()] {
            assert_eq!(F80::from_i64(value).to_i64(NEAREST), Some(value));
        }

        let cases = [
            (RoundingMode::Nearest, 2, -2, 4),
            (RoundingMode::Down, 2, -3, 3),
            (RoundingMode::Up, 3, -2, 4),
            (RoundingMode::Zero, 2, -2, 3),
        ];
        for &(mode, pos, neg, odd) in &cases {
            assert_eq!(f(2.5).to_i64(mode), Some(pos), "{:?}", mode);
            assert_eq!(f(-2.5).to_i64(mode), Some(neg), "{:?}", mode);
            assert_eq!(f(3.5).to_i64(mode), Some(odd), "{:?}", mode);
        }

        assert_eq!(f(0.25).to_i64(RoundingMode::Up), Some(1));
        assert_eq!(f(1e30).to_i64(NEAREST), None);
        assert_eq!(f(9223372036854775808.0).to_i64(NEAREST), None);
        assert_eq!(f(-9223372036854775808.0).to_i64(NEAREST), Some(i64::min_value()));
        assert_eq!(F80::INFINITY.to_i64(NEAREST), None);
        assert_eq!(F80::INDEFINITE.to_i64(NEAREST), None);
    }
}
