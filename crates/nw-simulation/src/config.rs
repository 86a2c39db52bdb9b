use std::sync::Arc;

use serde_json::Value;

use crate::clock::{Clock, default_clock};
use crate::error::{SimError, SimResult};

/// Phase label used when none is given.
pub const DEFAULT_WHEN: &str = "start";
/// Tie-break order used when none is given.
pub const DEFAULT_ORDER: f64 = 0.0;

const KNOWN_KEYS: [&str; 3] = ["when", "order", "clock"];

/// Scheduling parameters for a new scheduled object.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    /// Phase label the scheduler groups objects by.
    pub when: String,
    /// Tie-break order within a phase, lowest first.
    pub order: f64,
    /// Time base. `None` means the process-wide default clock.
    pub clock: Option<Arc<Clock>>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            when: DEFAULT_WHEN.to_owned(),
            order: DEFAULT_ORDER,
            clock: None,
        }
    }
}

impl ScheduleConfig {
    /// Set the phase label.
    pub fn with_when(mut self, when: impl Into<String>) -> Self {
        self.when = when.into();
        self
    }

    /// Set the tie-break order.
    pub fn with_order(mut self, order: f64) -> Self {
        self.order = order;
        self
    }

    /// Set the time base.
    pub fn with_clock(mut self, clock: Arc<Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// The configured clock, or the default one.
    pub fn resolve_clock(&self) -> Arc<Clock> {
        self.clock.clone().unwrap_or_else(default_clock)
    }

    /// Read parameters from a dynamic table such as
    /// `{"when": "end", "order": 2, "clock": {"dt": 0.001}}`.
    ///
    /// Missing keys keep their defaults. A `clock` must be `null` or an object
    /// with a numeric `dt`, which builds a fresh clock.
    pub fn from_json(params: &Value) -> SimResult<Self> {
        let Some(table) = params.as_object() else {
            return Err(SimError::type_mismatch("parameters", "object", params));
        };

        let mut config = Self::default();
        if let Some(value) = table.get("when") {
            let when = value
                .as_str()
                .ok_or_else(|| SimError::type_mismatch("when", "string", value))?;
            config.when = when.to_owned();
        }
        if let Some(value) = table.get("order") {
            config.order = value
                .as_f64()
                .ok_or_else(|| SimError::type_mismatch("order", "number", value))?;
        }
        if let Some(value) = table.get("clock") {
            config.clock = clock_from_json(value)?;
        }

        for key in table.keys().filter(|k| !KNOWN_KEYS.contains(&k.as_str())) {
            tracing::warn!(key = key.as_str(), "ignoring unknown schedule parameter");
        }
        Ok(config)
    }
}

fn clock_from_json(value: &Value) -> SimResult<Option<Arc<Clock>>> {
    match value {
        Value::Null => Ok(None),
        Value::Object(fields) => {
            let dt = fields
                .get("dt")
                .and_then(Value::as_f64)
                .ok_or_else(|| SimError::type_mismatch("clock", "Clock", value))?;
            Ok(Some(Arc::new(Clock::new(dt)?)))
        }
        other => Err(SimError::type_mismatch("clock", "Clock", other)),
    }
}
