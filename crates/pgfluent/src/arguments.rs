//! Parameter binding: values, positional slots and the immutable setter builder.
//!
//! An [`ArgumentSetterBuilder`] collects one closure per `$n` placeholder and
//! folds them into a single [`ArgumentSetter`]. Every `add*` call returns a new
//! builder, so a partially bound builder can be branched:
//!
//! ```ignore
//! use pgfluent::ArgumentSetterBuilder;
//!
//! let base = ArgumentSetterBuilder::new().add(10_000_i64);
//! let hello = base.add("Hello").build();
//! let bye = base.add("Bye").build();
//! ```

use crate::LOG_TARGET;
use crate::error::{FluentError, FluentResult};
use bytes::{BufMut, BytesMut};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::error::Error;
use std::fmt::{self, Write as _};
use std::sync::Arc;
use tokio_postgres::types::{IsNull, ToSql, Type, WrongType};
use uuid::Uuid;

/// A value bound to one statement placeholder.
#[derive(Debug, Clone)]
pub enum SqlParam {
    Bool(bool),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Text(Option<String>),
    Timestamp(Option<NaiveDateTime>),
    TimestampTz(Option<DateTime<Utc>>),
    Uuid(Option<Uuid>),
    Bytes(Option<Vec<u8>>),
    /// Raw JSON text for a `json`/`jsonb` parameter; the server validates it.
    Json(Option<String>),
    /// SQL NULL declared with a type; accepted by any placeholder.
    Null(Type),
    /// Any driver-supported value, declared with its PostgreSQL type.
    Typed {
        value: Arc<dyn ToSql + Send + Sync>,
        ty: Type,
    },
}

impl SqlParam {
    /// Type tag used in the parameter log line.
    pub fn label(&self) -> String {
        match self {
            Self::Bool(_) => "(bool)".into(),
            Self::Short(_) => "(i16)".into(),
            Self::Int(_) => "(i32)".into(),
            Self::Long(_) => "(i64)".into(),
            Self::Float(_) => "(f32)".into(),
            Self::Double(_) => "(f64)".into(),
            Self::Text(_) => "(text)".into(),
            Self::Timestamp(_) => "(timestamp)".into(),
            Self::TimestampTz(_) => "(timestamptz)".into(),
            Self::Uuid(_) => "(uuid)".into(),
            Self::Bytes(_) => "(bytea)".into(),
            Self::Json(_) => "(json)".into(),
            Self::Null(ty) | Self::Typed { ty, .. } => format!("(typed {ty})"),
        }
    }

    /// Whether the value is SQL NULL.
    pub fn is_null(&self) -> bool {
        matches!(
            self,
            Self::Text(None)
                | Self::Timestamp(None)
                | Self::TimestampTz(None)
                | Self::Uuid(None)
                | Self::Bytes(None)
                | Self::Json(None)
                | Self::Null(_)
        )
    }

    fn write_json(
        text: Option<&str>,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        if *ty != Type::JSON && *ty != Type::JSONB {
            return Err(format!("cannot bind JSON text to a parameter of type {ty}").into());
        }
        let Some(text) = text else {
            return Ok(IsNull::Yes);
        };
        if *ty == Type::JSONB {
            out.put_u8(1);
        }
        out.put_slice(text.as_bytes());
        Ok(IsNull::No)
    }
}

/// Log rendering of the value: strings quoted, absent values as `null`.
impl fmt::Display for SqlParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt<T: fmt::Display>(f: &mut fmt::Formatter<'_>, v: &Option<T>) -> fmt::Result {
            match v {
                Some(v) => write!(f, "{v}"),
                None => f.write_str("null"),
            }
        }

        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Short(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Text(Some(v)) => write!(f, "'{v}'"),
            Self::Text(None) => f.write_str("null"),
            Self::Timestamp(v) => opt(f, v),
            Self::TimestampTz(v) => opt(f, v),
            Self::Uuid(v) => opt(f, v),
            Self::Bytes(Some(v)) => write!(f, "<{} bytes>", v.len()),
            Self::Bytes(None) => f.write_str("null"),
            Self::Json(v) => opt(f, v),
            Self::Null(_) => f.write_str("null"),
            Self::Typed { value, .. } => write!(f, "{value:?}"),
        }
    }
}

impl ToSql for SqlParam {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        self.to_sql_checked(ty, out)
    }

    // Per-variant checks happen in `to_sql_checked`.
    fn accepts(_ty: &Type) -> bool {
        true
    }

    /// Encode for a placeholder of type `ty`, widening or narrowing where no
    /// information is lost: integers fit any of `int2`/`int4`/`int8` when in
    /// range, `f32` binds to `float8` and timestamps cross between
    /// `timestamp` and `timestamptz` as UTC.
    fn to_sql_checked(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            Self::Bool(v) => v.to_sql_checked(ty, out),
            Self::Short(v) => write_integer(*v, ty, out),
            Self::Int(v) => write_integer(*v, ty, out),
            Self::Long(v) => write_integer(*v, ty, out),
            Self::Float(v) if *ty == Type::FLOAT8 => f64::from(*v).to_sql(ty, out),
            Self::Float(v) => v.to_sql_checked(ty, out),
            Self::Double(v) => v.to_sql_checked(ty, out),
            Self::Text(v) => v.to_sql_checked(ty, out),
            Self::Timestamp(v) if *ty == Type::TIMESTAMPTZ => {
                v.map(|v| v.and_utc()).to_sql(ty, out)
            }
            Self::Timestamp(v) => v.to_sql_checked(ty, out),
            Self::TimestampTz(v) if *ty == Type::TIMESTAMP => {
                v.map(|v| v.naive_utc()).to_sql(ty, out)
            }
            Self::TimestampTz(v) => v.to_sql_checked(ty, out),
            Self::Uuid(v) => v.to_sql_checked(ty, out),
            Self::Bytes(v) => v.to_sql_checked(ty, out),
            Self::Json(v) => Self::write_json(v.as_deref(), ty, out),
            Self::Null(_) => Ok(IsNull::Yes),
            Self::Typed { value, ty: declared } => {
                if declared != ty {
                    return Err(declared_type_mismatch(declared, ty).into());
                }
                (**value).to_sql_checked(ty, out)
            }
        }
    }
}

fn write_integer<T>(
    value: T,
    ty: &Type,
    out: &mut BytesMut,
) -> Result<IsNull, Box<dyn Error + Sync + Send>>
where
    T: Into<i64> + Copy + fmt::Display,
{
    let wide: i64 = value.into();
    let out_of_range = || format!("{value} is out of range for a parameter of type {ty}");
    match *ty {
        Type::INT2 => i16::try_from(wide)
            .map_err(|_| out_of_range())?
            .to_sql(ty, out),
        Type::INT4 => i32::try_from(wide)
            .map_err(|_| out_of_range())?
            .to_sql(ty, out),
        Type::INT8 => wide.to_sql(ty, out),
        _ => Err(Box::new(WrongType::new::<T>(ty.clone()))),
    }
}

fn declared_type_mismatch(declared: &Type, placeholder: &Type) -> String {
    format!("parameter declared as {declared} cannot bind to a placeholder of type {placeholder}")
}

macro_rules! impl_from_for_param {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for SqlParam {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )+
    };
}

macro_rules! impl_from_nullable_for_param {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for SqlParam {
                fn from(value: $ty) -> Self {
                    Self::$variant(Some(value))
                }
            }

            impl From<Option<$ty>> for SqlParam {
                fn from(value: Option<$ty>) -> Self {
                    Self::$variant(value)
                }
            }
        )+
    };
}

impl_from_for_param!(
    bool => Bool,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
);

impl_from_nullable_for_param!(
    String => Text,
    NaiveDateTime => Timestamp,
    DateTime<Utc> => TimestampTz,
    Uuid => Uuid,
    Vec<u8> => Bytes,
);

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        Self::Text(Some(value.to_owned()))
    }
}

impl From<Option<&str>> for SqlParam {
    fn from(value: Option<&str>) -> Self {
        Self::Text(value.map(str::to_owned))
    }
}

impl From<&[u8]> for SqlParam {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(Some(value.to_vec()))
    }
}

/// Positional parameter slots of one statement execution, numbered from 1
/// like the `$n` placeholders.
#[derive(Debug, Clone, Default)]
pub struct ParamSlots {
    slots: Vec<Option<SqlParam>>,
}

impl ParamSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `value` into slot `index` (1-based), replacing any earlier value.
    pub fn set(&mut self, index: usize, value: SqlParam) -> FluentResult<()> {
        if index == 0 {
            return Err(FluentError::parameter("parameter positions start at 1"));
        }
        if self.slots.len() < index {
            self.slots.resize(index, None);
        }
        self.slots[index - 1] = Some(value);
        Ok(())
    }

    /// Value in slot `index` (1-based).
    pub fn get(&self, index: usize) -> Option<&SqlParam> {
        index
            .checked_sub(1)
            .and_then(|i| self.slots.get(i))
            .and_then(Option::as_ref)
    }

    /// Highest bound position.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots in placeholder order, ready for the driver.
    ///
    /// Fails when a position below the highest bound one was never written.
    pub fn as_params(&self) -> FluentResult<Vec<&(dyn ToSql + Sync)>> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.as_ref()
                    .map(|p| p as &(dyn ToSql + Sync))
                    .ok_or_else(|| {
                        FluentError::parameter(format!("parameter ${} was never bound", i + 1))
                    })
            })
            .collect()
    }

    /// Compare values bound with a declared type against the statement's
    /// placeholder types.
    pub fn check_declared_types(&self, placeholders: &[Type]) -> FluentResult<()> {
        for (index, (slot, placeholder)) in (1..).zip(self.slots.iter().zip(placeholders)) {
            match slot {
                Some(SqlParam::Typed { ty: declared, .. }) if declared != placeholder => {
                    return Err(FluentError::parameter(format!(
                        "${index}: {}",
                        declared_type_mismatch(declared, placeholder)
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

type SetAllArguments = dyn Fn(&mut ParamSlots) -> FluentResult<()> + Send + Sync;
type SetOneArgument = dyn Fn(&mut ParamSlots, usize) -> FluentResult<()> + Send + Sync;

/// Writes one full parameter set into the slots of a prepared statement.
#[derive(Clone)]
pub struct ArgumentSetter {
    apply: Arc<SetAllArguments>,
}

impl ArgumentSetter {
    /// Wrap an arbitrary slot writer.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&mut ParamSlots) -> FluentResult<()> + Send + Sync + 'static,
    {
        Self { apply: Arc::new(f) }
    }

    /// A setter that binds nothing.
    pub fn noop() -> Self {
        Self::from_fn(|_| Ok(()))
    }

    /// Write the parameters into `slots`.
    pub fn set_arguments(&self, slots: &mut ParamSlots) -> FluentResult<()> {
        (self.apply)(slots)
    }

    /// Bind into a fresh set of slots.
    pub fn bind(&self) -> FluentResult<ParamSlots> {
        let mut slots = ParamSlots::new();
        self.set_arguments(&mut slots)?;
        Ok(slots)
    }
}

impl fmt::Debug for ArgumentSetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgumentSetter").finish_non_exhaustive()
    }
}

/// Immutable builder of an [`ArgumentSetter`].
#[derive(Clone)]
pub struct ArgumentSetterBuilder {
    setters: Vec<Arc<SetOneArgument>>,
    log_text: String,
    logging: bool,
}

impl Default for ArgumentSetterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArgumentSetterBuilder {
    /// Builder whose setter logs the bound values at debug level.
    pub fn new() -> Self {
        Self {
            setters: Vec::new(),
            log_text: String::new(),
            logging: true,
        }
    }

    /// Builder that keeps no log text and emits no parameter line.
    pub fn without_logging() -> Self {
        Self {
            logging: false,
            ..Self::new()
        }
    }

    fn next_with(&self, param: SqlParam) -> Self {
        let mut next = self.clone();
        if next.logging {
            let _ = write!(
                next.log_text,
                "{}) {} {} ",
                next.setters.len() + 1,
                param.label(),
                param
            );
        }
        next.setters
            .push(Arc::new(move |slots: &mut ParamSlots, index: usize| {
                slots.set(index, param.clone())
            }));
        next
    }

    /// Bind the next placeholder.
    pub fn add(&self, value: impl Into<SqlParam>) -> Self {
        self.next_with(value.into())
    }

    /// Bind JSON text to a `json`/`jsonb` placeholder.
    pub fn add_pg_json(&self, json: &str) -> Self {
        self.next_with(SqlParam::Json(Some(json.to_owned())))
    }

    /// Bind optional JSON text; `None` binds NULL.
    pub fn add_pg_json_opt(&self, json: Option<&str>) -> Self {
        self.next_with(SqlParam::Json(json.map(str::to_owned)))
    }

    /// Bind a JSON document to a `json`/`jsonb` placeholder.
    pub fn add_pg_json_value(&self, json: &serde_json::Value) -> Self {
        self.next_with(SqlParam::Json(Some(json.to_string())))
    }

    /// Bind any driver-supported value, declared with its PostgreSQL type.
    pub fn add_typed<V>(&self, value: V, ty: Type) -> Self
    where
        V: ToSql + Send + Sync + 'static,
    {
        self.next_with(SqlParam::Typed {
            value: Arc::new(value),
            ty,
        })
    }

    /// Bind SQL NULL declared with `ty`.
    pub fn add_null(&self, ty: Type) -> Self {
        self.next_with(SqlParam::Null(ty))
    }

    /// Number of bound placeholders.
    pub fn len(&self) -> usize {
        self.setters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.setters.is_empty()
    }

    /// Accumulated log text, e.g. `1) (i32) 47 2) (text) 'Hello' `.
    pub fn log_text(&self) -> &str {
        &self.log_text
    }

    /// Fold the bound values into one setter writing positions `1..=N`.
    pub fn build(&self) -> ArgumentSetter {
        let setters = self.setters.clone();
        let log_text = self.logging.then(|| self.log_text.clone());
        ArgumentSetter::from_fn(move |slots| {
            if let Some(text) = &log_text {
                tracing::debug!(target: LOG_TARGET, params = %text, "setting SQL parameters");
            }
            for (index, setter) in (1..).zip(setters.iter()) {
                setter(slots, index)?;
            }
            Ok(())
        })
    }
}

impl fmt::Debug for ArgumentSetterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgumentSetterBuilder")
            .field("len", &self.setters.len())
            .field("log_text", &self.log_text)
            .finish()
    }
}
