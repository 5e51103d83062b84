/// Decoded Cottontail DB values
///
/// `Value` is the client-side counterpart of the wire `Literal` oneof. Scalars
/// map to Rust scalars, dates to `DateTime<Utc>`, vectors to ordered numeric
/// sequences and null to `Value::Null`. Literals without a decoding (scalar
/// complex numbers, unset literals) are carried as `Value::Raw`.
use chrono::{DateTime, Utc};
use ctdb_proto as proto;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Date(DateTime<Utc>),
    FloatVector(Vec<f32>),
    DoubleVector(Vec<f64>),
    IntVector(Vec<i32>),
    LongVector(Vec<i64>),
    BoolVector(Vec<bool>),
    /// (real, imaginary) pairs
    Complex32Vector(Vec<(f32, f32)>),
    /// (real, imaginary) pairs
    Complex64Vector(Vec<(f64, f64)>),
    Raw(proto::Literal),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view over `Int` and `Long`
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(i64::from(*i)),
            Value::Long(l) => Some(*l),
            _ => None,
        }
    }

    /// Numeric view over every scalar number type
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(f64::from(*i)),
            Value::Long(l) => Some(*l as f64),
            Value::Float(f) => Some(f64::from(*f)),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Real-valued vectors widened to `f64`; `None` for scalars and complex vectors
    pub fn as_vector(&self) -> Option<Vec<f64>> {
        match self {
            Value::FloatVector(v) => Some(v.iter().map(|x| f64::from(*x)).collect()),
            Value::DoubleVector(v) => Some(v.clone()),
            Value::IntVector(v) => Some(v.iter().map(|x| f64::from(*x)).collect()),
            Value::LongVector(v) => Some(v.iter().map(|x| *x as f64).collect()),
            Value::BoolVector(v) => Some(v.iter().map(|b| if *b { 1.0 } else { 0.0 }).collect()),
            _ => None,
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_complex<T: fmt::Display>(items: &[(T, T)]) -> String {
    items
        .iter()
        .map(|(re, im)| format!("{}+{}i", re, im))
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Long(l) => write!(f, "{}", l),
            Value::Float(x) => write!(f, "{}", x),
            Value::Double(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.to_rfc3339()),
            Value::FloatVector(v) => write!(f, "[{}]", join(v)),
            Value::DoubleVector(v) => write!(f, "[{}]", join(v)),
            Value::IntVector(v) => write!(f, "[{}]", join(v)),
            Value::LongVector(v) => write!(f, "[{}]", join(v)),
            Value::BoolVector(v) => write!(f, "[{}]", join(v)),
            Value::Complex32Vector(v) => write!(f, "[{}]", join_complex(v)),
            Value::Complex64Vector(v) => write!(f, "[{}]", join_complex(v)),
            Value::Raw(literal) => write!(f, "{:?}", literal),
        }
    }
}

macro_rules! impl_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Boolean,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => String,
    DateTime<Utc> => Date,
    Vec<f32> => FloatVector,
    Vec<f64> => DoubleVector,
    Vec<i32> => IntVector,
    Vec<i64> => LongVector,
    Vec<bool> => BoolVector,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
