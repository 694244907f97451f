use std::fmt;

/// Typed argument substituted into an error message template.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageArgument {
    Int(i64),
    Double(f64),
    String(String),
    Character(char),
    /// Object identity, rendered as an address-like hex number.
    Pointer(usize),
}

impl fmt::Display for MessageArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageArgument::Int(n) => write!(f, "{n}"),
            MessageArgument::Double(d) => write!(f, "{d}"),
            MessageArgument::String(s) => f.write_str(s),
            MessageArgument::Character(c) => write!(f, "{c}"),
            MessageArgument::Pointer(p) => write!(f, "{p:#x}"),
        }
    }
}

/// The closed set of runtime errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    BadMultibyteCharacter,
    FunctionNotFound { name: String },
    FunctionMultipleDefine { name: String },
    IndexOutOfBounds { index: i64, size: usize },
    DivisionByZero,
    NullPointer,
}

impl ErrorKind {
    /// Message template; `$(name)` is replaced by the argument `name`.
    pub const fn template(&self) -> &'static str {
        match self {
            ErrorKind::BadMultibyteCharacter => {
                "a bad multibyte character was found"
            }
            ErrorKind::FunctionNotFound { .. } => {
                "function $(name) was not found"
            }
            ErrorKind::FunctionMultipleDefine { .. } => {
                "function $(name) is defined more than once"
            }
            ErrorKind::IndexOutOfBounds { .. } => {
                "array index out of bounds: the array has size $(size), the index is $(index)"
            }
            ErrorKind::DivisionByZero => "integer division by zero",
            ErrorKind::NullPointer => "null pointer dereference",
        }
    }

    pub fn arguments(&self) -> Vec<(&'static str, MessageArgument)> {
        match self {
            ErrorKind::FunctionNotFound { name }
            | ErrorKind::FunctionMultipleDefine { name } => {
                vec![("name", MessageArgument::String(name.clone()))]
            }
            ErrorKind::IndexOutOfBounds { index, size } => vec![
                ("size", MessageArgument::Int(*size as i64)),
                ("index", MessageArgument::Int(*index)),
            ],
            ErrorKind::BadMultibyteCharacter
            | ErrorKind::DivisionByZero
            | ErrorKind::NullPointer => Vec::new(),
        }
    }

    pub fn message(&self) -> String {
        format_message(self.template(), &self.arguments())
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// Fills `$(name)` placeholders of `template` from `args`.
///
/// Placeholders without a matching argument are copied verbatim.
pub fn format_message(
    template: &str,
    args: &[(&str, MessageArgument)],
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("$(") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find(')') else {
            rest = &rest[start..];
            break;
        };
        let name = &after[..end];
        match args.iter().find(|(arg, _)| *arg == name) {
            Some((_, value)) => out.push_str(&value.to_string()),
            None => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Where an error was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub executable: String,
    /// `None` for top-level code.
    pub function: Option<String>,
    pub pc: usize,
    pub line: Option<u32>,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{line}", self.executable)?,
            None => write!(f, "{}:pc {}", self.executable, self.pc)?,
        }
        if let Some(function) = &self.function {
            write!(f, " (in {function})")?;
        }
        Ok(())
    }
}

/// A terminal runtime error, raised up to the embedding host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{}", render(&.kind, &.location))]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub location: Option<SourceLocation>,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, location: Option<SourceLocation>) -> Self {
        Self { kind, location }
    }
}

impl From<ErrorKind> for RuntimeError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind, None)
    }
}

fn render(kind: &ErrorKind, location: &Option<SourceLocation>) -> String {
    match location {
        Some(location) => format!("{location}: {}", kind.message()),
        None => kind.message(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_filled_by_name() {
        let msg = format_message(
            "size $(size), index $(index)",
            &[
                ("index", MessageArgument::Int(-1)),
                ("size", MessageArgument::Int(4)),
            ],
        );
        assert_eq!(msg, "size 4, index -1");
    }

    #[test]
    fn unknown_placeholder_is_kept() {
        let msg = format_message("got $(what) here", &[]);
        assert_eq!(msg, "got $(what) here");
    }

    #[test]
    fn unterminated_placeholder_is_kept() {
        let msg = format_message("broken $(name", &[("name", MessageArgument::Character('x'))]);
        assert_eq!(msg, "broken $(name");
    }

    #[test]
    fn argument_kinds_render() {
        assert_eq!(MessageArgument::Double(1.5).to_string(), "1.5");
        assert_eq!(MessageArgument::Character('λ').to_string(), "λ");
        assert_eq!(MessageArgument::Pointer(255).to_string(), "0xff");
    }

    #[test]
    fn kind_messages() {
        let kind = ErrorKind::FunctionNotFound { name: "min".into() };
        assert_eq!(kind.message(), "function min was not found");
        let kind = ErrorKind::IndexOutOfBounds { index: 3, size: 3 };
        assert_eq!(
            kind.to_string(),
            "array index out of bounds: the array has size 3, the index is 3"
        );
    }

    #[test]
    fn error_display_includes_location() {
        let err = RuntimeError::new(
            ErrorKind::DivisionByZero,
            Some(SourceLocation {
                executable: "main.dkm".into(),
                function: Some("avg".into()),
                pc: 12,
                line: Some(7),
            }),
        );
        assert_eq!(err.to_string(), "main.dkm:7 (in avg): integer division by zero");

        let err = RuntimeError::new(
            ErrorKind::NullPointer,
            Some(SourceLocation {
                executable: "main.dkm".into(),
                function: None,
                pc: 3,
                line: None,
            }),
        );
        assert_eq!(err.to_string(), "main.dkm:pc 3: null pointer dereference");
    }

    #[test]
    fn error_without_location() {
        let err: RuntimeError = ErrorKind::BadMultibyteCharacter.into();
        assert_eq!(err.to_string(), "a bad multibyte character was found");
    }
}
