use std::fmt;
use std::sync::Arc;

/// Whitespace skipped around numeric strings. Only the ASCII set counts.
pub const NUMERIC_WHITESPACE: [char; 6] = [' ', '\t', '\n', '\r', '\x0b', '\x0c'];

/// A concrete runtime value known at analysis time.
///
/// Only scalar values are represented; anything else is never a compile-time
/// constant as far as the interpreter is concerned.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstValue {
    Null,
    Bool(bool),
    Int(i64),
    Dbl(f64),
    Str(Arc<str>),
}

impl ConstValue {
    pub fn str(s: impl Into<Arc<str>>) -> Self {
        ConstValue::Str(s.into())
    }

    /// Boolean conversion as performed by conditional jumps and `Not`.
    pub fn to_bool(&self) -> bool {
        match self {
            ConstValue::Null => false,
            ConstValue::Bool(b) => *b,
            ConstValue::Int(i) => *i != 0,
            ConstValue::Dbl(d) => *d != 0.0,
            ConstValue::Str(s) => !(s.is_empty() || &**s == "0"),
        }
    }

    /// String conversion as performed by concatenation.
    pub fn to_php_string(&self) -> Arc<str> {
        match self {
            ConstValue::Null | ConstValue::Bool(false) => Arc::from(""),
            ConstValue::Bool(true) => Arc::from("1"),
            ConstValue::Int(i) => Arc::from(i.to_string()),
            ConstValue::Dbl(d) => Arc::from(format_dbl(*d)),
            ConstValue::Str(s) => s.clone(),
        }
    }

    /// Numeric conversion for arithmetic. Strings only convert when they are
    /// fully numeric; anything else would raise at runtime.
    pub fn to_num(&self) -> Option<ConstValue> {
        match self {
            ConstValue::Null => Some(ConstValue::Int(0)),
            ConstValue::Bool(b) => Some(ConstValue::Int(i64::from(*b))),
            ConstValue::Int(_) | ConstValue::Dbl(_) => Some(self.clone()),
            ConstValue::Str(s) => {
                let s = s.trim_matches(NUMERIC_WHITESPACE);
                if let Ok(i) = s.parse::<i64>() {
                    Some(ConstValue::Int(i))
                } else if let Ok(d) = s.parse::<f64>() {
                    d.is_finite().then_some(ConstValue::Dbl(d))
                } else {
                    None
                }
            }
        }
    }

    pub fn add(&self, other: &Self) -> Option<ConstValue> {
        self.arith(other, i64::checked_add, |a, b| a + b)
    }

    pub fn sub(&self, other: &Self) -> Option<ConstValue> {
        self.arith(other, i64::checked_sub, |a, b| a - b)
    }

    pub fn mul(&self, other: &Self) -> Option<ConstValue> {
        self.arith(other, i64::checked_mul, |a, b| a * b)
    }

    /// Integer overflow promotes to a double, matching the runtime.
    fn arith(
        &self,
        other: &Self,
        int_op: fn(i64, i64) -> Option<i64>,
        dbl_op: fn(f64, f64) -> f64,
    ) -> Option<ConstValue> {
        match (self.to_num()?, other.to_num()?) {
            (ConstValue::Int(a), ConstValue::Int(b)) => Some(match int_op(a, b) {
                Some(v) => ConstValue::Int(v),
                None => ConstValue::Dbl(dbl_op(a as f64, b as f64)),
            }),
            (a, b) => Some(ConstValue::Dbl(dbl_op(a.as_f64()?, b.as_f64()?))),
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            ConstValue::Int(i) => Some(*i as f64),
            ConstValue::Dbl(d) => Some(*d),
            _ => None,
        }
    }

    /// Strict (`===`) equality.
    pub fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (ConstValue::Null, ConstValue::Null) => true,
            (ConstValue::Bool(a), ConstValue::Bool(b)) => a == b,
            (ConstValue::Int(a), ConstValue::Int(b)) => a == b,
            (ConstValue::Dbl(a), ConstValue::Dbl(b)) => a == b,
            (ConstValue::Str(a), ConstValue::Str(b)) => a == b,
            _ => false,
        }
    }
}

/// Significant digits used when a double is converted to a string.
const DBL_PRECISION: i32 = 14;

/// Formats `d` the way the runtime's `%.14G` conversion does: at most 14
/// significant digits, exponent form outside `1e-5 <= |d| < 1e15`.
fn format_dbl(d: f64) -> String {
    if d.is_nan() {
        return "NAN".to_string();
    }
    if d.is_infinite() {
        let inf = if d > 0.0 { "INF" } else { "-INF" };
        return inf.to_string();
    }
    let sci = format!("{:.*e}", (DBL_PRECISION - 1) as usize, d.abs());
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return format!("{d}");
    };
    let Ok(exp) = exp.parse::<i32>() else {
        return format!("{d}");
    };
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    let digits = match digits.trim_end_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };

    let mut out = String::new();
    if d.is_sign_negative() {
        out.push('-');
    }
    if exp < -4 || exp >= DBL_PRECISION {
        let (first, rest) = digits.split_at(1);
        out.push_str(first);
        out.push('.');
        out.push_str(if rest.is_empty() { "0" } else { rest });
        out.push_str(&format!("E{}{}", if exp < 0 { '-' } else { '+' }, exp.abs()));
    } else if exp < 0 {
        out.push_str("0.");
        out.extend(std::iter::repeat_n('0', (-exp - 1) as usize));
        out.push_str(digits);
    } else {
        let int_len = exp as usize + 1;
        if digits.len() <= int_len {
            out.push_str(digits);
            out.extend(std::iter::repeat_n('0', int_len - digits.len()));
        } else {
            let (int, frac) = digits.split_at(int_len);
            out.push_str(int);
            out.push('.');
            out.push_str(frac);
        }
    }
    out
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Null => f.write_str("null"),
            ConstValue::Bool(b) => write!(f, "{b}"),
            ConstValue::Int(i) => write!(f, "{i}"),
            ConstValue::Dbl(d) => write!(f, "{d:?}"),
            ConstValue::Str(s) => write!(f, "\"{}\"", s.escape_debug()),
        }
    }
}
