use extbind_sys as sys;
use thiserror::Error;

use crate::variant::VariantKind;

pub type BindResult<T> = std::result::Result<T, BindError>;

/// Failures while loading the binding. All of them abort plugin load.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    #[error("engine passed a null interface")]
    NullInterface,

    #[error("engine ABI {found} is not compatible with required {required}")]
    VersionMismatch {
        found: sys::Version,
        required: sys::Version,
    },

    #[error("engine function table has no entry for '{0}'")]
    MissingSymbol(&'static str),

    #[error("engine provides no {constructor} for {kind:?}")]
    MissingConstructor {
        kind: VariantKind,
        constructor: &'static str,
    },

    #[error("engine has no packed array interface for {0:?}")]
    UnknownPackedKind(VariantKind),

    #[error("class '{0}' is unknown to the engine")]
    UnknownClass(&'static str),

    #[error("method '{class}::{method}' could not be resolved")]
    UnresolvedMethod {
        class: &'static str,
        method: &'static str,
    },

    #[error("binding is already initialized")]
    AlreadyInitialized,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantError {
    #[error("expected a {expected:?} variant, found {actual:?}")]
    KindMismatch {
        expected: VariantKind,
        actual: VariantKind,
    },

    #[error("variant holds a null object")]
    NullObject,

    #[error("object is not an instance of '{expected}'")]
    ClassMismatch { expected: &'static str },

    #[error("engine string is not valid UTF-8")]
    InvalidUtf8,
}

/// Status of a call through the engine's calling conventions.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallError {
    #[error("method does not exist")]
    InvalidMethod,

    #[error("argument {argument} should be {expected:?}")]
    InvalidArgument {
        argument: usize,
        expected: VariantKind,
    },

    #[error("too many arguments, method takes {expected}")]
    TooManyArguments { expected: usize },

    #[error("too few arguments, method takes {expected}")]
    TooFewArguments { expected: usize },

    #[error("receiver is null or freed")]
    InstanceIsNull,

    #[error("method is not const")]
    MethodNotConst,

    #[error("host instance is already borrowed")]
    BorrowConflict,

    #[error("engine wrote no return value")]
    NoReturn,

    #[error("engine reported call error {0}")]
    Unknown(u32),
}

impl CallError {
    /// Reads the status the engine wrote for a variant call.
    pub fn check(status: &sys::CallError) -> Result<(), CallError> {
        let argument = status.argument.max(0) as usize;
        let expected = status.expected.max(0) as usize;
        match status.error {
            sys::CALL_OK => Ok(()),
            sys::CALL_ERROR_INVALID_METHOD => Err(CallError::InvalidMethod),
            sys::CALL_ERROR_INVALID_ARGUMENT => Err(CallError::InvalidArgument {
                argument,
                expected: VariantKind::from_sys(status.expected as sys::VariantType),
            }),
            sys::CALL_ERROR_TOO_MANY_ARGUMENTS => Err(CallError::TooManyArguments { expected }),
            sys::CALL_ERROR_TOO_FEW_ARGUMENTS => Err(CallError::TooFewArguments { expected }),
            sys::CALL_ERROR_INSTANCE_IS_NULL => Err(CallError::InstanceIsNull),
            sys::CALL_ERROR_METHOD_NOT_CONST => Err(CallError::MethodNotConst),
            code => Err(CallError::Unknown(code)),
        }
    }

    /// The status to report back to the engine.
    pub fn to_sys(self) -> sys::CallError {
        let (error, argument, expected) = match self {
            CallError::InvalidMethod => (sys::CALL_ERROR_INVALID_METHOD, 0, 0),
            CallError::InvalidArgument { argument, expected } => (
                sys::CALL_ERROR_INVALID_ARGUMENT,
                argument as i32,
                expected.sys() as i32,
            ),
            CallError::TooManyArguments { expected } => {
                (sys::CALL_ERROR_TOO_MANY_ARGUMENTS, 0, expected as i32)
            }
            CallError::TooFewArguments { expected } => {
                (sys::CALL_ERROR_TOO_FEW_ARGUMENTS, 0, expected as i32)
            }
            CallError::InstanceIsNull | CallError::BorrowConflict => {
                (sys::CALL_ERROR_INSTANCE_IS_NULL, 0, 0)
            }
            CallError::MethodNotConst => (sys::CALL_ERROR_METHOD_NOT_CONST, 0, 0),
            CallError::NoReturn => (sys::CALL_ERROR_INVALID_METHOD, 0, 0),
            CallError::Unknown(code) => (code, 0, 0),
        };
        sys::CallError {
            error,
            argument,
            expected,
        }
    }
}

/// Any failure surfaced by the binding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error(transparent)]
    Init(#[from] InitError),

    #[error(transparent)]
    Variant(#[from] VariantError),

    #[error("call failed: {0}")]
    Call(#[from] CallError),

    #[error("object cannot be cast to '{0}'")]
    DowncastFailed(&'static str),

    #[error("object #{0} has been freed")]
    DeadReference(sys::InstanceId),

    #[error("engine could not construct '{0}'")]
    ConstructFailed(String),

    #[error("registration failed: {0}")]
    Registration(String),

    #[error("signal '{0}' is not connected to this callable")]
    NotConnected(String),

    #[error("property '{0}' could not be accessed")]
    UnknownProperty(String),

    #[error("engine returned error code {0}")]
    Engine(i64),
}

impl BindError {
    /// Maps an engine `Error` return code, 0 being success.
    pub fn from_code(code: i64) -> BindResult<()> {
        match code {
            0 => Ok(()),
            code => Err(BindError::Engine(code)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_status_round_trips() {
        let errors = [
            CallError::InvalidMethod,
            CallError::InvalidArgument {
                argument: 2,
                expected: VariantKind::Vector2,
            },
            CallError::TooFewArguments { expected: 3 },
            CallError::TooManyArguments { expected: 0 },
            CallError::MethodNotConst,
        ];
        for error in errors {
            assert_eq!(CallError::check(&error.to_sys()), Err(error));
        }
        assert_eq!(CallError::check(&sys::CallError::default()), Ok(()));
    }

    #[test]
    fn borrow_conflict_reports_a_null_instance() {
        let status = CallError::BorrowConflict.to_sys();
        assert_eq!(status.error, sys::CALL_ERROR_INSTANCE_IS_NULL);
    }

    #[test]
    fn engine_codes() {
        assert_eq!(BindError::from_code(0), Ok(()));
        assert_eq!(BindError::from_code(31), Err(BindError::Engine(31)));
    }
}
