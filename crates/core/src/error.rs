//! MOO error codes
//!
//! Errors are first-class values of the `Err` variant, drawn from a closed
//! enumeration. There are no user-defined error codes. Each code carries a
//! canonical name (`E_TYPE`) used by `toliteral` and a human message used by
//! `tostr` and traceback lines.

use std::fmt;

/// The closed set of MOO error codes.
///
/// Reordering breaks `toint(err)` and the snapshot format, so new codes are
/// appended at the end only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Error {
    None = 0,
    Type,
    Div,
    Perm,
    PropNf,
    VerbNf,
    VarNf,
    InvInd,
    RecMove,
    MaxRec,
    Range,
    Args,
    Nacc,
    InvArg,
    Quota,
    Float,
    File,
    Exec,
    Intrpt,
}

/// All codes in numeric order, for `toerr` style conversion and iteration.
pub const ALL_ERRORS: [Error; 19] = [
    Error::None,
    Error::Type,
    Error::Div,
    Error::Perm,
    Error::PropNf,
    Error::VerbNf,
    Error::VarNf,
    Error::InvInd,
    Error::RecMove,
    Error::MaxRec,
    Error::Range,
    Error::Args,
    Error::Nacc,
    Error::InvArg,
    Error::Quota,
    Error::Float,
    Error::File,
    Error::Exec,
    Error::Intrpt,
];

impl Error {
    /// Canonical literal name, e.g. `E_TYPE`.
    pub fn name(&self) -> &'static str {
        match self {
            Error::None => "E_NONE",
            Error::Type => "E_TYPE",
            Error::Div => "E_DIV",
            Error::Perm => "E_PERM",
            Error::PropNf => "E_PROPNF",
            Error::VerbNf => "E_VERBNF",
            Error::VarNf => "E_VARNF",
            Error::InvInd => "E_INVIND",
            Error::RecMove => "E_RECMOVE",
            Error::MaxRec => "E_MAXREC",
            Error::Range => "E_RANGE",
            Error::Args => "E_ARGS",
            Error::Nacc => "E_NACC",
            Error::InvArg => "E_INVARG",
            Error::Quota => "E_QUOTA",
            Error::Float => "E_FLOAT",
            Error::File => "E_FILE",
            Error::Exec => "E_EXEC",
            Error::Intrpt => "E_INTRPT",
        }
    }

    /// Human-readable message, used by `tostr` and default raise messages.
    pub fn message(&self) -> &'static str {
        match self {
            Error::None => "No error",
            Error::Type => "Type mismatch",
            Error::Div => "Division by zero",
            Error::Perm => "Permission denied",
            Error::PropNf => "Property not found",
            Error::VerbNf => "Verb not found",
            Error::VarNf => "Variable not found",
            Error::InvInd => "Invalid indirection",
            Error::RecMove => "Recursive move",
            Error::MaxRec => "Too many verb calls",
            Error::Range => "Range error",
            Error::Args => "Incorrect number of arguments",
            Error::Nacc => "Move refused by destination",
            Error::InvArg => "Invalid argument",
            Error::Quota => "Resource limit exceeded",
            Error::Float => "Floating-point arithmetic error",
            Error::File => "File system error",
            Error::Exec => "Exec error",
            Error::Intrpt => "Interrupted",
        }
    }

    /// Parse a canonical name (case-insensitive) back to a code.
    pub fn parse(name: &str) -> Option<Error> {
        let upper = name.to_ascii_uppercase();
        ALL_ERRORS.iter().copied().find(|e| e.name() == upper)
    }

    /// Numeric code as reported by `toint`.
    pub fn code(&self) -> i64 {
        *self as i64
    }

    /// Inverse of [`Error::code`].
    pub fn from_code(code: i64) -> Option<Error> {
        usize::try_from(code).ok().and_then(|i| ALL_ERRORS.get(i).copied())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for e in ALL_ERRORS {
            assert_eq!(Error::parse(e.name()), Some(e));
        }
    }

    #[test]
    fn codes_round_trip() {
        for e in ALL_ERRORS {
            assert_eq!(Error::from_code(e.code()), Some(e));
        }
        assert_eq!(Error::from_code(-1), None);
        assert_eq!(Error::from_code(999), None);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Error::parse("e_type"), Some(Error::Type));
        assert_eq!(Error::parse("E_QUOTA"), Some(Error::Quota));
        assert_eq!(Error::parse("E_BOGUS"), None);
    }

    #[test]
    fn none_is_zero() {
        assert_eq!(Error::None.code(), 0);
        assert_eq!(Error::Intrpt.code(), 18);
    }
}
