//! Unified error type for the tool, and the mapping from error kinds to the
//! result codes used for the process exit status.

use thiserror::Error;

use crate::result_model::ResultCode;

/// Everything that can go wrong outside of a normal (possibly non-success)
/// directory operation result.
///
/// This is deliberately narrow: a failed `add`/`modify`/... is *not* routed
/// through `ToolError`, it's an `OperationOutcome` (see `result_model`) that
/// the engine's policy logic decides how to react to. `ToolError` covers the
/// "local", "parameter" and "transport" kinds of `spec.md` §7.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("LDAP error: {0}")]
    Ldap(#[from] ldap3::LdapError),

    #[error("LDIF parse error at line {line}: {message}")]
    Ldif { line: usize, message: String },

    #[error("invalid argument: {0}")]
    Param(String),

    #[error("required response control not returned: {0}")]
    MissingControl(&'static str),
}

impl ToolError {
    /// The final result code this error maps to, per `spec.md` §7's
    /// taxonomy (Local / Parameter errors each have one fixed code).
    pub fn result_code(&self) -> ResultCode {
        match self {
            ToolError::Io(_) | ToolError::Ldif { .. } | ToolError::Ldap(_) => {
                ResultCode::LOCAL_ERROR
            }
            ToolError::Param(_) => ResultCode::PARAM_ERROR,
            ToolError::MissingControl(_) => ResultCode::CONTROL_NOT_FOUND,
        }
    }
}

pub type Result<T> = std::result::Result<T, ToolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_error_maps_to_param_code() {
        let e = ToolError::Param("--useTransaction and --multiUpdateErrorBehavior are mutually exclusive".into());
        assert_eq!(e.result_code(), ResultCode::PARAM_ERROR);
    }

    #[test]
    fn missing_control_maps_to_control_not_found() {
        let e = ToolError::MissingControl("simple paged results");
        assert_eq!(e.result_code(), ResultCode::CONTROL_NOT_FOUND);
    }
}
