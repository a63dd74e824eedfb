//! Answer normalization.
//!
//! Typed answers are parsed into exact rationals so that grading never depends on
//! formatting ("6/2", "3", "3.0" and "2 2/2" all mean the same thing) and never goes
//! through floating point.

use std::fmt;

/// Longest decimal fraction part accepted; keeps `10^k` inside `i64`.
const MAX_DECIMAL_PLACES: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fraction {
    numerator: i64,
    denominator: i64,
}

impl Fraction {
    /// `None` for a zero denominator, or when either part is `i64::MIN` and so has no
    /// positive counterpart to carry the sign.
    pub fn new(numerator: i64, denominator: i64) -> Option<Self> {
        if denominator == 0 || numerator == i64::MIN || denominator == i64::MIN {
            return None;
        }
        Some(Self {
            numerator,
            denominator,
        })
    }

    pub fn whole(value: i64) -> Self {
        Self {
            numerator: value,
            denominator: 1,
        }
    }

    pub fn numerator(&self) -> i64 {
        self.numerator
    }

    pub fn denominator(&self) -> i64 {
        self.denominator
    }

    /// Reduced by GCD with the sign carried on the numerator; zero is always `0/1`.
    pub fn simplify(&self) -> Self {
        if self.numerator == 0 {
            return Self::whole(0);
        }

        let (mut n, mut d) = (self.numerator, self.denominator);
        if d < 0 {
            n = -n;
            d = -d;
        }
        // d is positive and at most i64::MAX, so the divisor fits.
        let g = gcd(n.unsigned_abs(), d.unsigned_abs()) as i64;
        Self {
            numerator: n / g,
            denominator: d / g,
        }
    }

    pub fn equals(&self, other: &Fraction) -> bool {
        let a = self.simplify();
        let b = other.simplify();
        a.numerator == b.numerator && a.denominator == b.denominator
    }
}

impl fmt::Display for Fraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator == 1 {
            write!(f, "{}", self.numerator)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a.max(1)
}

/// Parse a whole number, simple fraction `n/d`, mixed number `w n/d`, or decimal.
///
/// Anything else is `None`. The result is not simplified.
pub fn parse(input: &str) -> Option<Fraction> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    match input.split_once('/') {
        Some((head, tail)) => parse_fractional(head, tail),
        None => parse_decimal(input),
    }
}

fn parse_fractional(head: &str, tail: &str) -> Option<Fraction> {
    let denominator = parse_unsigned(tail.trim())?;
    if denominator == 0 {
        return None;
    }

    let tokens: Vec<&str> = head.split_whitespace().collect();
    match tokens.as_slice() {
        [numerator] => {
            let (negative, digits) = split_sign(numerator);
            let n = parse_unsigned(digits)?;
            Fraction::new(if negative { -n } else { n }, denominator)
        }
        [whole, numerator] => {
            let (negative, digits) = split_sign(whole);
            let w = parse_unsigned(digits)?;
            let n = parse_unsigned(numerator)?;
            let magnitude = w.checked_mul(denominator)?.checked_add(n)?;
            Fraction::new(if negative { -magnitude } else { magnitude }, denominator)
        }
        _ => None,
    }
}

fn parse_decimal(input: &str) -> Option<Fraction> {
    let (negative, body) = split_sign(input);
    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, f),
        None => (body, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if frac_part.len() as u32 > MAX_DECIMAL_PLACES {
        return None;
    }

    let whole = if int_part.is_empty() {
        0
    } else {
        parse_unsigned(int_part)?
    };
    let fraction = if frac_part.is_empty() {
        0
    } else {
        parse_unsigned(frac_part)?
    };
    let scale = 10i64.checked_pow(frac_part.len() as u32)?;
    let magnitude = whole.checked_mul(scale)?.checked_add(fraction)?;

    Fraction::new(if negative { -magnitude } else { magnitude }, scale)
}

fn split_sign(s: &str) -> (bool, &str) {
    if let Some(rest) = s.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        (false, rest)
    } else {
        (false, s)
    }
}

fn parse_unsigned(s: &str) -> Option<i64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<i64>().ok()
}

pub fn simplify(fraction: Fraction) -> Fraction {
    fraction.simplify()
}

pub fn equals(a: &Fraction, b: &Fraction) -> bool {
    a.equals(b)
}

/// True iff `answer` parses and equals any parseable candidate.
pub fn matches_any<S: AsRef<str>>(answer: &str, candidates: &[S]) -> bool {
    let Some(parsed) = parse(answer) else {
        return false;
    };
    candidates
        .iter()
        .filter_map(|c| parse(c.as_ref()))
        .any(|candidate| parsed.equals(&candidate))
}
