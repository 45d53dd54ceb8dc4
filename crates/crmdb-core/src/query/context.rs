//! Per-call execution context.

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use uuid::Uuid;

use super::fiscal::FiscalSettings;

/// Default strict-validation setting.
pub const DEFAULT_STRICT: bool = false;

/// Default case sensitivity of text comparisons.
pub const DEFAULT_CASE_SENSITIVE: bool = false;

/// Default first day of the week for the week operators.
pub const DEFAULT_WEEK_START: Weekday = Weekday::Sun;

/// Source of the current instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    /// Read the system clock on every call.
    #[default]
    System,
    /// Always report the same instant.
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// The current instant.
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(instant) => *instant,
        }
    }
}

/// Everything a query evaluation needs from its caller.
///
/// The clock is read each time a date operator is evaluated, never once per
/// query, so a context with [`Clock::System`] always sees the live time.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Source of "now" for the date operators.
    pub clock: Clock,
    /// Calling user, for the user-id operators.
    pub caller_id: Uuid,
    /// Caller's business unit, for the business-id operators.
    pub business_unit_id: Uuid,
    /// Organization fiscal settings.
    pub fiscal: FiscalSettings,
    /// Fail on attributes missing from metadata instead of treating them as null.
    pub strict: bool,
    /// Compare text case-sensitively.
    pub case_sensitive: bool,
    /// First day of the week.
    pub week_start: Weekday,
}

impl ExecutionContext {
    /// Create a context with the default settings.
    pub fn new() -> Self {
        Self {
            clock: Clock::System,
            caller_id: Uuid::nil(),
            business_unit_id: Uuid::nil(),
            fiscal: FiscalSettings::default(),
            strict: DEFAULT_STRICT,
            case_sensitive: DEFAULT_CASE_SENSITIVE,
            week_start: DEFAULT_WEEK_START,
        }
    }

    /// Set the clock.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Pin "now" to a fixed instant.
    pub fn at(self, instant: DateTime<Utc>) -> Self {
        self.with_clock(Clock::Fixed(instant))
    }

    /// Set the calling user.
    pub fn with_caller(mut self, caller_id: Uuid) -> Self {
        self.caller_id = caller_id;
        self
    }

    /// Set the caller's business unit.
    pub fn with_business_unit(mut self, business_unit_id: Uuid) -> Self {
        self.business_unit_id = business_unit_id;
        self
    }

    /// Set the fiscal settings.
    pub fn with_fiscal_settings(mut self, fiscal: FiscalSettings) -> Self {
        self.fiscal = fiscal;
        self
    }

    /// Enable or disable strict validation.
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Enable or disable case-sensitive text comparison.
    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Set the first day of the week.
    pub fn with_week_start(mut self, week_start: Weekday) -> Self {
        self.week_start = week_start;
        self
    }

    /// The current instant.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The current UTC date.
    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
