use crate::ObjectRef;

/// A single stack, static, or local variable slot.
///
/// - **Int**:    64-bit signed integer (booleans are `0` / `1`).
/// - **Double**: IEEE double.
/// - **Object**: reference into the heap, `None` is the null reference.
///
/// The variant doubles as the collector's "is this slot a reference" flag,
/// so slot contents and flag can never disagree.
#[derive(Clone, Copy, PartialEq)]
pub enum Value {
    Int(i64),
    Double(f64),
    Object(Option<ObjectRef>),
}

impl Value {
    pub const NULL: Value = Value::Object(None);

    #[inline(always)]
    pub const fn is_pointer(self) -> bool {
        matches!(self, Value::Object(_))
    }

    #[inline(always)]
    pub const fn is_null(self) -> bool {
        matches!(self, Value::Object(None))
    }

    #[inline(always)]
    pub const fn as_int(self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(n),
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn as_double(self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(d),
            _ => None,
        }
    }

    /// The referenced object, `None` for null and for scalar slots.
    #[inline(always)]
    pub const fn as_object(self) -> Option<ObjectRef> {
        match self {
            Value::Object(r) => r,
            _ => None,
        }
    }

    #[inline(always)]
    pub const fn from_bool(b: bool) -> Self {
        Value::Int(b as i64)
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Int(0)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<ObjectRef> for Value {
    fn from(r: ObjectRef) -> Self {
        Value::Object(Some(r))
    }
}

impl From<Option<ObjectRef>> for Value {
    fn from(r: Option<ObjectRef>) -> Self {
        Value::Object(r)
    }
}

impl core::fmt::Debug for Value {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Value::Int(n) => write!(f, "Int({n})"),
            Value::Double(d) => write!(f, "Double({d})"),
            Value::Object(Some(r)) => write!(f, "Ref({}#{})", r.index(), r.generation()),
            Value::Object(None) => write!(f, "Null"),
        }
    }
}
