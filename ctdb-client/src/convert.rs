/// Conversions between wire literals and client values
use crate::value::Value;
use chrono::{TimeZone, Utc};
use ctdb_proto::{self as proto, literal::Data, vector::VectorData};

// ============================================================================
// Literal -> Value
// ============================================================================

/// Decode a wire literal.
///
/// Dates arrive as milliseconds since the epoch. Literals that carry a scalar
/// complex number, an out-of-range date or nothing at all are returned as
/// `Value::Raw` so the caller still sees what the server sent.
pub fn literal_to_value(literal: proto::Literal) -> Value {
    let data = match literal.data {
        Some(data) => data,
        None => return Value::Raw(literal),
    };

    match data {
        Data::BooleanData(b) => Value::Boolean(b),
        Data::IntData(i) => Value::Int(i),
        Data::LongData(l) => Value::Long(l),
        Data::FloatData(f) => Value::Float(f),
        Data::DoubleData(d) => Value::Double(d),
        Data::StringData(s) => Value::String(s),
        Data::DateData(date) => match Utc.timestamp_millis_opt(date.utc_timestamp).single() {
            Some(ts) => Value::Date(ts),
            None => Value::Raw(proto::Literal {
                data: Some(Data::DateData(date)),
            }),
        },
        Data::VectorData(vector) => vector_to_value(vector),
        Data::NullData(_) => Value::Null,
        other @ (Data::Complex32Data(_) | Data::Complex64Data(_)) => {
            Value::Raw(proto::Literal { data: Some(other) })
        }
    }
}

fn vector_to_value(vector: proto::Vector) -> Value {
    match vector.vector_data {
        Some(VectorData::FloatVector(v)) => Value::FloatVector(v.vector),
        Some(VectorData::DoubleVector(v)) => Value::DoubleVector(v.vector),
        Some(VectorData::IntVector(v)) => Value::IntVector(v.vector),
        Some(VectorData::LongVector(v)) => Value::LongVector(v.vector),
        Some(VectorData::BoolVector(v)) => Value::BoolVector(v.vector),
        Some(VectorData::Complex32Vector(v)) => Value::Complex32Vector(
            v.vector.into_iter().map(|c| (c.real, c.imaginary)).collect(),
        ),
        Some(VectorData::Complex64Vector(v)) => Value::Complex64Vector(
            v.vector.into_iter().map(|c| (c.real, c.imaginary)).collect(),
        ),
        None => Value::Raw(proto::Literal {
            data: Some(Data::VectorData(proto::Vector { vector_data: None })),
        }),
    }
}

// ============================================================================
// Value -> Literal
// ============================================================================

/// Encode a client value as a wire literal
pub fn value_to_literal(value: &Value) -> proto::Literal {
    let data = match value {
        Value::Null => Data::NullData(proto::Null {}),
        Value::Boolean(b) => Data::BooleanData(*b),
        Value::Int(i) => Data::IntData(*i),
        Value::Long(l) => Data::LongData(*l),
        Value::Float(f) => Data::FloatData(*f),
        Value::Double(d) => Data::DoubleData(*d),
        Value::String(s) => Data::StringData(s.clone()),
        Value::Date(d) => Data::DateData(proto::Date {
            utc_timestamp: d.timestamp_millis(),
        }),
        Value::FloatVector(v) => vector(VectorData::FloatVector(proto::FloatVector {
            vector: v.clone(),
        })),
        Value::DoubleVector(v) => vector(VectorData::DoubleVector(proto::DoubleVector {
            vector: v.clone(),
        })),
        Value::IntVector(v) => vector(VectorData::IntVector(proto::IntVector {
            vector: v.clone(),
        })),
        Value::LongVector(v) => vector(VectorData::LongVector(proto::LongVector {
            vector: v.clone(),
        })),
        Value::BoolVector(v) => vector(VectorData::BoolVector(proto::BoolVector {
            vector: v.clone(),
        })),
        Value::Complex32Vector(v) => vector(VectorData::Complex32Vector(proto::Complex32Vector {
            vector: v
                .iter()
                .map(|(real, imaginary)| proto::Complex32 {
                    real: *real,
                    imaginary: *imaginary,
                })
                .collect(),
        })),
        Value::Complex64Vector(v) => vector(VectorData::Complex64Vector(proto::Complex64Vector {
            vector: v
                .iter()
                .map(|(real, imaginary)| proto::Complex64 {
                    real: *real,
                    imaginary: *imaginary,
                })
                .collect(),
        })),
        Value::Raw(literal) => return literal.clone(),
    };

    proto::Literal { data: Some(data) }
}

fn vector(data: VectorData) -> Data {
    Data::VectorData(proto::Vector {
        vector_data: Some(data),
    })
}

/// Shorthand for a float vector literal, the usual shape of a query vector
pub fn float_vector(elements: &[f32]) -> proto::Literal {
    value_to_literal(&Value::FloatVector(elements.to_vec()))
}
