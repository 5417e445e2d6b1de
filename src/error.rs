//! Unified aggregate-engine error model and mapping helpers.
//! Every failure the engine can surface is an `AggError`; callers that speak the
//! Postgres wire protocol can map them with `pgwire_fields`.

use thiserror::Error;

use crate::datum::Oid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AggError {
    #[error("aggregate {aggfnoid} does not exist")]
    NotFound { aggfnoid: Oid },
    #[error("aggregate {name} does not exist")]
    NotFoundByName { name: String },
    #[error("invalid aggregate descriptor {aggfnoid}: {}", .violations.join("; "))]
    InvalidDescriptor { aggfnoid: Oid, violations: Vec<String> },
    #[error("aggregate {aggfnoid} has no combine function")]
    CombineUnsupported { aggfnoid: Oid },
    #[error("transition state of aggregate {aggfnoid} cannot cross a serialization boundary")]
    SerializationUnsupported { aggfnoid: Oid },
    #[error("inverse transition of aggregate {aggfnoid} cannot be applied safely")]
    InverseUnsafe { aggfnoid: Oid },
    #[error("{proc_name}: {message}")]
    TransitionFailed { proc_name: String, sqlstate: &'static str, message: String },
    #[error("aggregate {aggfnoid} accumulator is already finalized")]
    Finalized { aggfnoid: Oid },
    #[error("seed row {line}: {message}")]
    Seed { line: usize, message: String },
    #[error("worker failed: {message}")]
    Worker { message: String },
}

impl AggError {
    pub fn code_str(&self) -> &'static str {
        match self {
            AggError::NotFound { .. } | AggError::NotFoundByName { .. } => "not_found",
            AggError::InvalidDescriptor { .. } => "invalid_descriptor",
            AggError::CombineUnsupported { .. } => "combine_unsupported",
            AggError::SerializationUnsupported { .. } => "serialization_unsupported",
            AggError::InverseUnsafe { .. } => "inverse_unsafe",
            AggError::TransitionFailed { .. } => "transition_failed",
            AggError::Finalized { .. } => "finalized",
            AggError::Seed { .. } => "seed_error",
            AggError::Worker { .. } => "worker_error",
        }
    }

    pub fn invalid(aggfnoid: Oid, violation: impl Into<String>) -> Self {
        AggError::InvalidDescriptor { aggfnoid, violations: vec![violation.into()] }
    }

    pub fn seed<S: Into<String>>(line: usize, msg: S) -> Self { AggError::Seed { line, message: msg.into() } }

    /// A support function rejected its input (bad argument value).
    pub fn invalid_input<S: Into<String>>(proc_name: &str, msg: S) -> Self {
        AggError::TransitionFailed { proc_name: proc_name.to_string(), sqlstate: "22023", message: msg.into() }
    }

    /// A support function overflowed its result type.
    pub fn overflow(proc_name: &str, what: &str) -> Self {
        AggError::TransitionFailed { proc_name: proc_name.to_string(), sqlstate: "22003", message: format!("{} out of range", what) }
    }

    /// A support function was handed a state or argument of the wrong shape.
    pub fn bad_state<S: Into<String>>(proc_name: &str, msg: S) -> Self {
        AggError::TransitionFailed { proc_name: proc_name.to_string(), sqlstate: "XX000", message: msg.into() }
    }

    /// Only `TransitionFailed` is expected during steady-state execution; every
    /// other variant is a contract violation detectable without running user code.
    pub fn is_contract_violation(&self) -> bool {
        !matches!(self, AggError::TransitionFailed { .. } | AggError::Worker { .. })
    }

    /// Pgwire mapping: return (sqlstate, severity, message)
    pub fn pgwire_fields(&self) -> (&'static str, &'static str, String) {
        let msg = self.to_string();
        match self {
            AggError::NotFound { .. } | AggError::NotFoundByName { .. } => ("42883", "ERROR", msg), // undefined_function
            AggError::InvalidDescriptor { .. } => ("42P13", "ERROR", msg),  // invalid_function_definition
            AggError::CombineUnsupported { .. } | AggError::SerializationUnsupported { .. } => ("0A000", "ERROR", msg), // feature_not_supported
            AggError::InverseUnsafe { .. } => ("XX000", "ERROR", msg),
            AggError::TransitionFailed { sqlstate, .. } => (sqlstate, "ERROR", msg),
            AggError::Finalized { .. } => ("55000", "ERROR", msg),          // object_not_in_prerequisite_state
            AggError::Seed { .. } => ("F0000", "FATAL", msg),               // config_file_error
            AggError::Worker { .. } => ("XX000", "ERROR", msg),             // internal_error
        }
    }
}

pub type AggResult<T> = Result<T, AggError>;

impl From<tokio::task::JoinError> for AggError {
    fn from(err: tokio::task::JoinError) -> Self {
        AggError::Worker { message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_mapping() {
        assert_eq!(AggError::NotFound { aggfnoid: 1 }.code_str(), "not_found");
        assert_eq!(AggError::invalid(1, "x").code_str(), "invalid_descriptor");
        assert_eq!(AggError::CombineUnsupported { aggfnoid: 1 }.code_str(), "combine_unsupported");
        assert_eq!(AggError::overflow("int8pl", "bigint").code_str(), "transition_failed");
        assert_eq!(AggError::seed(3, "bad").code_str(), "seed_error");
    }

    #[test]
    fn pgwire_fields_mapping() {
        let (code, sev, msg) = AggError::NotFound { aggfnoid: 42 }.pgwire_fields();
        assert_eq!(code, "42883");
        assert_eq!(sev, "ERROR");
        assert_eq!(msg, "aggregate 42 does not exist");

        let (code, _, msg) = AggError::overflow("int4_sum", "bigint").pgwire_fields();
        assert_eq!(code, "22003");
        assert_eq!(msg, "int4_sum: bigint out of range");

        let (code, sev, _) = AggError::seed(1, "x").pgwire_fields();
        assert_eq!(code, "F0000");
        assert_eq!(sev, "FATAL");
    }

    #[test]
    fn invalid_descriptor_lists_every_violation() {
        let err = AggError::InvalidDescriptor { aggfnoid: 7, violations: vec!["a".into(), "b".into()] };
        assert_eq!(err.to_string(), "invalid aggregate descriptor 7: a; b");
        assert!(err.is_contract_violation());
        assert!(!AggError::invalid_input("f", "x").is_contract_violation());
    }
}
