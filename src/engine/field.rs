//! Conversions between entity fields and SQL values

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::adapter::SqlValue;
use super::error::ConversionError;
use super::value::StorageType;

/// A Rust type that can back a scanned column.
///
/// `from_value` receives values already coerced to [`SqlField::STORAGE`];
/// the loader never hands it NULL unless the field is nullable.
pub trait SqlField: Sized {
    const STORAGE: StorageType;
    const NULLABLE: bool = false;

    fn to_value(&self) -> SqlValue;

    fn from_value(value: SqlValue) -> Result<Self, ConversionError>;
}

fn incompatible(expected: StorageType, found: &SqlValue) -> ConversionError {
    match found {
        SqlValue::Null => ConversionError::UnexpectedNull,
        other => ConversionError::Incompatible {
            expected,
            found: other.kind(),
        },
    }
}

macro_rules! integer_field {
    ($($ty:ty),*) => {
        $(
            impl SqlField for $ty {
                const STORAGE: StorageType = StorageType::Integer;

                fn to_value(&self) -> SqlValue {
                    SqlValue::Integer(i64::from(*self))
                }

                fn from_value(value: SqlValue) -> Result<Self, ConversionError> {
                    match value {
                        SqlValue::Integer(i) => <$ty>::try_from(i).map_err(|_| {
                            ConversionError::OutOfRange {
                                value: i.to_string(),
                                target: stringify!($ty),
                            }
                        }),
                        other => Err(incompatible(Self::STORAGE, &other)),
                    }
                }
            }
        )*
    };
}

integer_field!(i8, i16, i32, i64, u8, u16, u32);

impl SqlField for u64 {
    const STORAGE: StorageType = StorageType::Integer;

    fn to_value(&self) -> SqlValue {
        // SQLite integers are signed 64-bit; larger ids only survive as text.
        i64::try_from(*self)
            .map(SqlValue::Integer)
            .unwrap_or_else(|_| SqlValue::Text(self.to_string()))
    }

    fn from_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Integer(i) => u64::try_from(i).map_err(|_| ConversionError::OutOfRange {
                value: i.to_string(),
                target: "u64",
            }),
            other => Err(incompatible(Self::STORAGE, &other)),
        }
    }
}

impl SqlField for f64 {
    const STORAGE: StorageType = StorageType::Real;

    fn to_value(&self) -> SqlValue {
        SqlValue::Real(*self)
    }

    fn from_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Real(f) => Ok(f),
            other => Err(incompatible(Self::STORAGE, &other)),
        }
    }
}

impl SqlField for f32 {
    const STORAGE: StorageType = StorageType::Real;

    fn to_value(&self) -> SqlValue {
        SqlValue::Real(f64::from(*self))
    }

    fn from_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Real(f) => Ok(f as f32),
            other => Err(incompatible(Self::STORAGE, &other)),
        }
    }
}

impl SqlField for bool {
    const STORAGE: StorageType = StorageType::Bool;

    fn to_value(&self) -> SqlValue {
        SqlValue::Bool(*self)
    }

    fn from_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Bool(b) => Ok(b),
            other => Err(incompatible(Self::STORAGE, &other)),
        }
    }
}

impl SqlField for String {
    const STORAGE: StorageType = StorageType::Text;

    fn to_value(&self) -> SqlValue {
        SqlValue::Text(self.clone())
    }

    fn from_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Text(s) => Ok(s),
            other => Err(incompatible(Self::STORAGE, &other)),
        }
    }
}

impl SqlField for Vec<u8> {
    const STORAGE: StorageType = StorageType::Blob;

    fn to_value(&self) -> SqlValue {
        SqlValue::Blob(self.clone())
    }

    fn from_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Blob(b) => Ok(b),
            other => Err(incompatible(Self::STORAGE, &other)),
        }
    }
}

impl SqlField for DateTime<Utc> {
    const STORAGE: StorageType = StorageType::Timestamp;

    fn to_value(&self) -> SqlValue {
        SqlValue::Timestamp(*self)
    }

    fn from_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Timestamp(t) => Ok(t),
            other => Err(incompatible(Self::STORAGE, &other)),
        }
    }
}

impl SqlField for Uuid {
    const STORAGE: StorageType = StorageType::Uuid;

    fn to_value(&self) -> SqlValue {
        SqlValue::Uuid(*self)
    }

    fn from_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Uuid(u) => Ok(u),
            other => Err(incompatible(Self::STORAGE, &other)),
        }
    }
}

impl<T: SqlField> SqlField for Option<T> {
    const STORAGE: StorageType = T::STORAGE;
    const NULLABLE: bool = true;

    fn to_value(&self) -> SqlValue {
        match self {
            Some(v) => v.to_value(),
            None => SqlValue::Null,
        }
    }

    fn from_value(value: SqlValue) -> Result<Self, ConversionError> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsigned_range_checks() {
        assert_eq!(u32::from_value(SqlValue::Integer(7)).unwrap(), 7);
        assert!(matches!(
            u32::from_value(SqlValue::Integer(-1)),
            Err(ConversionError::OutOfRange { target: "u32", .. })
        ));
        assert!(u8::from_value(SqlValue::Integer(256)).is_err());
    }

    #[test]
    fn test_non_nullable_rejects_null() {
        assert_eq!(
            String::from_value(SqlValue::Null),
            Err(ConversionError::UnexpectedNull)
        );
    }

    #[test]
    fn test_option_field() {
        assert_eq!(Option::<u32>::from_value(SqlValue::Null).unwrap(), None);
        assert_eq!(
            Option::<u32>::from_value(SqlValue::Integer(2)).unwrap(),
            Some(2)
        );
        assert_eq!(Some(5u32).to_value(), 5u32.to_value());
        assert!(<Option<u32> as SqlField>::NULLABLE);
        assert_eq!(<Option<u32> as SqlField>::STORAGE, StorageType::Integer);
    }

    #[test]
    fn test_large_u64_renders_as_text() {
        assert_eq!(u64::MAX.to_value(), SqlValue::Text(u64::MAX.to_string()));
    }
}
