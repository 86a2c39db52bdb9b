use nw_core::TrackError;

/// Alias for `Result<T, SimError>`.
pub type SimResult<T> = Result<T, SimError>;

/// Errors raised by scheduled objects and their configuration.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// A schedule parameter had the wrong type.
    #[error("{what} should have type {expected}, was {found}")]
    TypeMismatch {
        /// The parameter.
        what: &'static str,
        /// The type it should have.
        expected: &'static str,
        /// The value it had.
        found: String,
    },

    /// The object's class has no `update`.
    #[error("{class} must define an update() method")]
    NotImplemented {
        /// Short type name of the class.
        class: &'static str,
    },

    /// A clock was given a zero, negative or non-finite timestep.
    #[error("clock timestep must be finite and positive, got {0}")]
    InvalidTimestep(f64),

    /// Failure in the tracking layer.
    #[error(transparent)]
    Track(#[from] TrackError),
}

impl SimError {
    pub(crate) fn type_mismatch(
        what: &'static str,
        expected: &'static str,
        found: &serde_json::Value,
    ) -> Self {
        Self::TypeMismatch {
            what,
            expected,
            found: describe(found),
        }
    }
}

/// Short "kind value" rendering of a JSON value for error messages.
fn describe(value: &serde_json::Value) -> String {
    use serde_json::Value;
    match value {
        Value::Null => "null".to_owned(),
        Value::Bool(b) => format!("bool {b}"),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => format!("string {s:?}"),
        Value::Array(items) => format!("array of {} items", items.len()),
        Value::Object(_) => "object".to_owned(),
    }
}
