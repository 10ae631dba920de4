use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::payload::PayloadMap;

/// Type-specific firing rule of a trigger.
///
/// Each variant carries only the fields it needs; compilation on the worker
/// matches exhaustively over the three shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerRule {
    /// Fixed-rate repetition. The period is given in milliseconds and is
    /// truncated to whole seconds by the compiler.
    Period { period_ms: Option<f64> },

    /// Cron expression with an optional timezone name or fixed offset.
    Cron {
        expression: String,
        #[serde(default)]
        timezone: Option<String>,
    },

    /// Single fire at `start_at`, or immediately upon scheduling.
    OneTime,
}

/// Declarative firing rule attached to a job definition.
///
/// A job owns any number of triggers; each compiles independently into
/// zero or more concrete schedule entries on the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerDefinition {
    /// Optional stable name; a generated short id is used when absent.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_at: Option<DateTime<Utc>>,
    /// Key-values merged into fired executions, overriding the job payload.
    #[serde(default)]
    pub payload: PayloadMap,
    #[serde(flatten)]
    pub rule: TriggerRule,
}

impl TriggerDefinition {
    /// A fixed-period trigger with no bounds.
    pub fn period(period_ms: f64) -> Self {
        Self {
            name: None,
            start_at: None,
            end_at: None,
            payload: PayloadMap::new(),
            rule: TriggerRule::Period {
                period_ms: Some(period_ms),
            },
        }
    }

    /// A cron trigger with no bounds.
    pub fn cron(expression: impl Into<String>, timezone: Option<String>) -> Self {
        Self {
            name: None,
            start_at: None,
            end_at: None,
            payload: PayloadMap::new(),
            rule: TriggerRule::Cron {
                expression: expression.into(),
                timezone,
            },
        }
    }

    /// A trigger firing once, at `start_at` when set.
    pub fn one_time(start_at: Option<DateTime<Utc>>) -> Self {
        Self {
            name: None,
            start_at,
            end_at: None,
            payload: PayloadMap::new(),
            rule: TriggerRule::OneTime,
        }
    }
}
