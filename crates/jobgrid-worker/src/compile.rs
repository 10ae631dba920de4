use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};
use uuid::Uuid;

use jobgrid_model::{JobDefinition, PayloadMap, TriggerDefinition, TriggerRule};

/// Identity of a concrete schedule entry.
///
/// The scope is the owning job's `code:group`, so two jobs sharing a
/// trigger name never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TriggerKey {
    pub name: String,
    pub scope: String,
}

impl std::fmt::Display for TriggerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.scope)
    }
}

/// Timezone a cron expression is evaluated in.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerZone {
    Utc,
    Named(Tz),
    Fixed(FixedOffset),
}

impl TriggerZone {
    /// Resolve a timezone string: named zone first, then a fixed offset
    /// like `+02:00`; anything else falls back to the engine default UTC.
    pub fn resolve(timezone: Option<&str>) -> Self {
        let Some(tz) = timezone.map(str::trim).filter(|s| !s.is_empty()) else {
            return TriggerZone::Utc;
        };

        if let Ok(named) = Tz::from_str(tz) {
            return TriggerZone::Named(named);
        }
        if let Some(offset) = parse_fixed_offset(tz) {
            return TriggerZone::Fixed(offset);
        }

        warn!(timezone = %tz, "unresolvable timezone, falling back to UTC");
        TriggerZone::Utc
    }

    /// Next fire strictly after `after`, evaluated in this zone and
    /// converted back to UTC.
    fn next_after(&self, schedule: &cron::Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TriggerZone::Utc => schedule.after(&after).next(),
            TriggerZone::Named(tz) => schedule
                .after(&after.with_timezone(tz))
                .next()
                .map(|dt| dt.with_timezone(&Utc)),
            TriggerZone::Fixed(offset) => schedule
                .after(&after.with_timezone(offset))
                .next()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

/// How a schedule entry computes its fire times.
#[derive(Debug, Clone)]
pub enum FirePolicy {
    /// Repeat forever at a fixed cadence.
    FixedRate { period: Duration },
    /// Follow a cron expression in a resolved timezone.
    Cron {
        schedule: cron::Schedule,
        zone: TriggerZone,
    },
    /// Fire exactly once.
    OneShot,
}

/// A compiled, engine-native trigger: one firing rule armed with its next
/// fire time. Destroyed when the owning job is rescheduled or unscheduled.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub key: TriggerKey,
    pub policy: FirePolicy,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    /// Trigger payload, overriding the job payload in merged lookups.
    pub payload: PayloadMap,
    /// Next time this entry fires; `None` once exhausted.
    pub next_fire: Option<DateTime<Utc>>,
}

impl ScheduleEntry {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_fire.is_some_and(|at| at <= now)
    }

    pub fn is_exhausted(&self) -> bool {
        self.next_fire.is_none()
    }

    /// Compute the first fire time as of `now`.
    fn arm(&mut self, now: DateTime<Utc>) {
        let first = match &self.policy {
            // a start in the past fires immediately, then settles into cadence
            FirePolicy::FixedRate { .. } | FirePolicy::OneShot => {
                Some(self.start_at.map_or(now, |start| start.max(now)))
            }
            FirePolicy::Cron { schedule, zone } => {
                let after = self.start_at.map_or(now, |start| start.max(now));
                zone.next_after(schedule, after)
            }
        };
        self.next_fire = first.filter(|at| self.within_end(*at));
    }

    /// Step past a fire at `now`; clears `next_fire` when exhausted.
    pub fn advance(&mut self, now: DateTime<Utc>) {
        let next = match &self.policy {
            FirePolicy::FixedRate { period } => {
                // step from the planned time, skipping windows already missed
                let mut next = self.next_fire.unwrap_or(now) + *period;
                while next <= now {
                    next = next + *period;
                }
                Some(next)
            }
            FirePolicy::Cron { schedule, zone } => zone.next_after(schedule, now),
            FirePolicy::OneShot => None,
        };
        self.next_fire = next.filter(|at| self.within_end(*at));
    }

    fn within_end(&self, at: DateTime<Utc>) -> bool {
        self.end_at.is_none_or(|end| at <= end)
    }
}

/// Compile every trigger of `definition` into armed schedule entries.
///
/// Invalid trigger configuration (zero/NaN period, malformed cron) is
/// logged and yields no entry; it never surfaces as an error. A job whose
/// triggers all compile to nothing stays registered and simply never fires.
pub fn compile_triggers(definition: &JobDefinition, now: DateTime<Utc>) -> Vec<ScheduleEntry> {
    definition
        .triggers
        .iter()
        .filter_map(|trigger| compile_trigger(definition, trigger, now))
        .collect()
}

fn compile_trigger(
    definition: &JobDefinition,
    trigger: &TriggerDefinition,
    now: DateTime<Utc>,
) -> Option<ScheduleEntry> {
    let key = TriggerKey {
        name: trigger_name(trigger),
        scope: definition.identity(),
    };

    let policy = match &trigger.rule {
        TriggerRule::Period { period_ms } => {
            let period_ms = match period_ms {
                Some(ms) if !ms.is_nan() && ms.abs() >= 1e-8 => *ms,
                _ => {
                    warn!(trigger = %key, "period trigger without a usable period, skipping");
                    return None;
                }
            };

            // truncate to whole seconds; a sub-second or negative period is
            // treated as a configuration error and fails closed
            let period_secs = (period_ms / 1000.0) as i64;
            if period_secs <= 0 {
                warn!(trigger = %key, period_ms, "period does not truncate to a positive number of seconds, skipping");
                return None;
            }

            FirePolicy::FixedRate {
                period: Duration::seconds(period_secs),
            }
        }

        TriggerRule::Cron {
            expression,
            timezone,
        } => {
            let schedule = match cron::Schedule::from_str(expression) {
                Ok(schedule) => schedule,
                Err(e) => {
                    warn!(trigger = %key, expression = %expression, error = %e, "invalid cron expression, skipping");
                    return None;
                }
            };
            FirePolicy::Cron {
                schedule,
                zone: TriggerZone::resolve(timezone.as_deref()),
            }
        }

        TriggerRule::OneTime => FirePolicy::OneShot,
    };

    let mut entry = ScheduleEntry {
        key,
        policy,
        start_at: trigger.start_at,
        end_at: trigger.end_at,
        payload: trigger.payload.clone(),
        next_fire: None,
    };
    entry.arm(now);
    debug!(trigger = %entry.key, next_fire = ?entry.next_fire, "trigger compiled");
    Some(entry)
}

/// The trigger's name, or a generated 8-character id when absent.
fn trigger_name(trigger: &TriggerDefinition) -> String {
    match trigger.name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => Uuid::new_v4().simple().to_string()[..8].to_string(),
    }
}

/// Parse a `±HH:MM` UTC offset.
fn parse_fixed_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.chars().next()? {
        '+' => (1, &s[1..]),
        '-' => (-1, &s[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
