//! Record descriptions
//!
//! A record type describes its persisted fields once through
//! [`Entity::describe`] and exposes positional access to them through
//! [`Entity::get`] and [`Entity::set`]. The [`entity!`](crate::entity) macro
//! writes all three from a struct definition with optional tag strings:
//!
//! ```
//! cqlmap_mapper::entity! {
//!     #[derive(Debug, Clone, Default, PartialEq)]
//!     pub struct User {
//!         pub id: String => "primary_key",
//!         pub name: String => "json:displayName",
//!         pub email: Option<String>,
//!         pub version: i32 => "version",
//!     }
//! }
//! ```

use crate::{CqlValue, MapperError, MapperResult};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A persisted record type
pub trait Entity: Default + Send + Sync + 'static {
    /// Static description of the type and its fields
    fn describe() -> TypeDescriptor;

    /// Value of the field at `index` in the described field list
    fn get(&self, index: usize) -> CqlValue;

    /// Assign the field at `index` from a stored value
    fn set(&mut self, index: usize, value: CqlValue) -> MapperResult<()>;
}

/// What kind of type a descriptor describes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeShape {
    Record(Vec<FieldDescriptor>),
    Scalar,
    Sequence,
    Map,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub name: String,
    pub shape: TypeShape,
}

impl TypeDescriptor {
    pub fn record<S: Into<String>>(name: S, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            shape: TypeShape::Record(fields),
        }
    }

    pub fn scalar<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            shape: TypeShape::Scalar,
        }
    }

    pub fn fields(&self) -> Option<&[FieldDescriptor]> {
        match &self.shape {
            TypeShape::Record(fields) => Some(fields),
            _ => None,
        }
    }
}

/// Storage annotations for one struct field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub column: Option<String>,
    pub json: Option<String>,
    pub primary_key: bool,
    pub version: bool,
    pub ignore: bool,
    pub insertable: bool,
    pub updatable: bool,
    /// Stored in place of `true` when a patch carries a boolean
    pub true_value: Option<String>,
    /// Stored in place of `false` when a patch carries a boolean
    pub false_value: Option<String>,
}

impl FieldDescriptor {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            column: None,
            json: None,
            primary_key: false,
            version: false,
            ignore: false,
            insertable: true,
            updatable: true,
            true_value: None,
            false_value: None,
        }
    }

    pub fn column<S: Into<String>>(mut self, column: S) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn json<S: Into<String>>(mut self, json: S) -> Self {
        self.json = Some(json.into());
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn version(mut self) -> Self {
        self.version = true;
        self
    }

    pub fn ignore(mut self) -> Self {
        self.ignore = true;
        self
    }

    pub fn no_insert(mut self) -> Self {
        self.insertable = false;
        self
    }

    pub fn no_update(mut self) -> Self {
        self.updatable = false;
        self
    }

    pub fn bool_values<S: Into<String>>(mut self, true_value: S, false_value: S) -> Self {
        self.true_value = Some(true_value.into());
        self.false_value = Some(false_value.into());
        self
    }

    /// Apply a `;`-separated tag string, e.g. `"column:user_id;primary_key"`.
    ///
    /// Unknown entries are ignored.
    pub fn with_tag(mut self, tag: &str) -> Self {
        for entry in tag.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (key, value) = match entry.split_once(':') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (entry, None),
            };
            match (key, value) {
                ("column", Some(v)) if !v.is_empty() => self.column = Some(v.to_string()),
                ("json", Some(v)) if !v.is_empty() => self.json = Some(v.to_string()),
                ("primary_key", None) => self.primary_key = true,
                ("version", None) => self.version = true,
                ("-", None) | ("ignore", None) => self.ignore = true,
                ("insert", Some("false")) => self.insertable = false,
                ("update", Some("false")) => self.updatable = false,
                ("true", Some(v)) => self.true_value = Some(v.to_string()),
                ("false", Some(v)) => self.false_value = Some(v.to_string()),
                _ => {}
            }
        }
        self
    }
}

/// Conversion of a field value into its stored form
pub trait ToCql {
    fn to_cql(&self) -> CqlValue;
}

/// Conversion of a stored value back into a field value
pub trait FromCql: Sized {
    fn from_cql(value: CqlValue) -> MapperResult<Self>;
}

fn unexpected<T>(expected: &str, value: &CqlValue) -> MapperResult<T> {
    Err(MapperError::conversion(format!(
        "expected {expected}, found {}",
        value.type_name()
    )))
}

impl ToCql for CqlValue {
    fn to_cql(&self) -> CqlValue {
        self.clone()
    }
}

impl FromCql for CqlValue {
    fn from_cql(value: CqlValue) -> MapperResult<Self> {
        Ok(value)
    }
}

impl ToCql for String {
    fn to_cql(&self) -> CqlValue {
        CqlValue::Text(self.clone())
    }
}

impl FromCql for String {
    fn from_cql(value: CqlValue) -> MapperResult<Self> {
        match value {
            CqlValue::Text(s) => Ok(s),
            CqlValue::Null => Ok(String::new()),
            other => unexpected("text", &other),
        }
    }
}

impl ToCql for bool {
    fn to_cql(&self) -> CqlValue {
        CqlValue::Boolean(*self)
    }
}

impl FromCql for bool {
    fn from_cql(value: CqlValue) -> MapperResult<Self> {
        match value {
            CqlValue::Boolean(b) => Ok(b),
            CqlValue::Null => Ok(false),
            other => unexpected("boolean", &other),
        }
    }
}

macro_rules! integer_conversions {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl ToCql for $ty {
                fn to_cql(&self) -> CqlValue {
                    CqlValue::$variant(*self)
                }
            }

            impl FromCql for $ty {
                fn from_cql(value: CqlValue) -> MapperResult<Self> {
                    if value.is_null() {
                        return Ok(0);
                    }
                    match value.as_i64() {
                        Some(n) => <$ty>::try_from(n).map_err(|_| {
                            MapperError::conversion(format!(
                                "{n} is out of range for {}",
                                stringify!($ty)
                            ))
                        }),
                        None => unexpected("integer", &value),
                    }
                }
            }
        )*
    };
}

integer_conversions!(i8 => Tinyint, i16 => Smallint, i32 => Int, i64 => Bigint);

impl ToCql for f32 {
    fn to_cql(&self) -> CqlValue {
        CqlValue::Float(*self)
    }
}

impl FromCql for f32 {
    fn from_cql(value: CqlValue) -> MapperResult<Self> {
        match value {
            CqlValue::Float(f) => Ok(f),
            CqlValue::Double(f) => Ok(f as f32),
            CqlValue::Null => Ok(0.0),
            other => unexpected("float", &other),
        }
    }
}

impl ToCql for f64 {
    fn to_cql(&self) -> CqlValue {
        CqlValue::Double(*self)
    }
}

impl FromCql for f64 {
    fn from_cql(value: CqlValue) -> MapperResult<Self> {
        match value {
            CqlValue::Double(f) => Ok(f),
            CqlValue::Float(f) => Ok(f64::from(f)),
            CqlValue::Null => Ok(0.0),
            other => match other.as_i64() {
                Some(n) => Ok(n as f64),
                None => unexpected("double", &other),
            },
        }
    }
}

impl ToCql for Vec<u8> {
    fn to_cql(&self) -> CqlValue {
        CqlValue::Blob(self.clone())
    }
}

impl FromCql for Vec<u8> {
    fn from_cql(value: CqlValue) -> MapperResult<Self> {
        match value {
            CqlValue::Blob(bytes) => Ok(bytes),
            CqlValue::Null => Ok(Vec::new()),
            other => unexpected("blob", &other),
        }
    }
}

impl ToCql for DateTime<Utc> {
    fn to_cql(&self) -> CqlValue {
        CqlValue::Timestamp(*self)
    }
}

impl FromCql for DateTime<Utc> {
    fn from_cql(value: CqlValue) -> MapperResult<Self> {
        match value {
            CqlValue::Timestamp(ts) => Ok(ts),
            CqlValue::Null => Ok(DateTime::<Utc>::default()),
            other => unexpected("timestamp", &other),
        }
    }
}

impl ToCql for Uuid {
    fn to_cql(&self) -> CqlValue {
        CqlValue::Uuid(*self)
    }
}

impl FromCql for Uuid {
    fn from_cql(value: CqlValue) -> MapperResult<Self> {
        match value {
            CqlValue::Uuid(id) => Ok(id),
            CqlValue::Text(s) => Uuid::parse_str(&s)
                .map_err(|e| MapperError::conversion(format!("invalid uuid '{s}': {e}"))),
            CqlValue::Null => Ok(Uuid::nil()),
            other => unexpected("uuid", &other),
        }
    }
}

impl<T: ToCql> ToCql for Option<T> {
    fn to_cql(&self) -> CqlValue {
        match self {
            Some(v) => v.to_cql(),
            None => CqlValue::Null,
        }
    }
}

impl<T: FromCql> FromCql for Option<T> {
    fn from_cql(value: CqlValue) -> MapperResult<Self> {
        match value {
            CqlValue::Null => Ok(None),
            other => T::from_cql(other).map(Some),
        }
    }
}

/// Declare a struct and implement [`Entity`] for it.
///
/// Each field may carry a tag string after `=>` using the vocabulary
/// understood by [`FieldDescriptor::with_tag`]. Derive `Default` on the
/// struct; the scanner allocates destinations with it.
#[macro_export]
macro_rules! entity {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $ty:ty $(=> $tag:literal)?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $field: $ty,
            )*
        }

        impl $crate::Entity for $name {
            fn describe() -> $crate::TypeDescriptor {
                $crate::TypeDescriptor::record(
                    stringify!($name),
                    vec![
                        $(
                            $crate::FieldDescriptor::new(stringify!($field))
                                .with_tag(concat!("" $(, $tag)?)),
                        )*
                    ],
                )
            }

            #[allow(unused_assignments, unused_mut)]
            fn get(&self, index: usize) -> $crate::CqlValue {
                let mut position = 0usize;
                $(
                    if position == index {
                        return $crate::ToCql::to_cql(&self.$field);
                    }
                    position += 1;
                )*
                $crate::CqlValue::Null
            }

            #[allow(unused_assignments, unused_mut)]
            fn set(&mut self, index: usize, value: $crate::CqlValue) -> $crate::MapperResult<()> {
                let mut position = 0usize;
                $(
                    if position == index {
                        self.$field = <$ty as $crate::FromCql>::from_cql(value)
                            .map_err(|e| e.in_field(stringify!($field)))?;
                        return Ok(());
                    }
                    position += 1;
                )*
                Err($crate::MapperError::schema_mismatch(format!(
                    "{} has no field at index {}",
                    stringify!($name),
                    index
                )))
            }
        }
    };
}
