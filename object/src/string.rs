use std::sync::Arc;

/// String payload.
///
/// Literal strings borrow their text from the executable's constant table,
/// so they are charged nothing beyond the object header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DvmString {
    is_literal: bool,
    chars: Arc<str>,
}

impl DvmString {
    pub fn new(chars: impl Into<Arc<str>>) -> Self {
        Self {
            is_literal: false,
            chars: chars.into(),
        }
    }

    pub fn literal(chars: Arc<str>) -> Self {
        Self {
            is_literal: true,
            chars,
        }
    }

    #[inline(always)]
    pub fn is_literal(&self) -> bool {
        self.is_literal
    }

    #[inline(always)]
    pub fn as_str(&self) -> &str {
        &self.chars
    }

    /// Length in characters, which is what scripts observe.
    pub fn len(&self) -> usize {
        self.chars.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn payload_size(&self) -> usize {
        if self.is_literal { 0 } else { self.chars.len() }
    }
}
