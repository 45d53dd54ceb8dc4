//! Fiscal calendar arithmetic.
//!
//! A fiscal year starts on a configured month/day and is split into the
//! periods of a [`FiscalPeriodTemplate`]. Periods are an even division of the
//! year's days; the last period absorbs the remainder so every day of the
//! year belongs to exactly one period.
//!
//! All functions are pure: the same settings and the same `today` always
//! give the same answer.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Default first month of the fiscal year.
pub const DEFAULT_FISCAL_START_MONTH: u32 = 1;

/// Default first day of the fiscal year.
pub const DEFAULT_FISCAL_START_DAY: u32 = 1;

/// How a fiscal year is divided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FiscalPeriodTemplate {
    /// One period.
    #[default]
    Annual,
    /// Two halves.
    SemiAnnual,
    /// Four quarters.
    Quarterly,
    /// Twelve periods.
    Monthly,
    /// Thirteen four-week periods.
    FourWeek,
}

impl FiscalPeriodTemplate {
    /// Number of periods in a fiscal year.
    pub fn periods(&self) -> u32 {
        match self {
            FiscalPeriodTemplate::Annual => 1,
            FiscalPeriodTemplate::SemiAnnual => 2,
            FiscalPeriodTemplate::Quarterly => 4,
            FiscalPeriodTemplate::Monthly => 12,
            FiscalPeriodTemplate::FourWeek => 13,
        }
    }
}

/// Which calendar year names a fiscal year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FiscalYearNaming {
    /// Named after the calendar year it starts in.
    #[default]
    StartYear,
    /// Named after the calendar year it ends in.
    EndYear,
}

/// Organization fiscal settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalSettings {
    /// First month of the fiscal year (1-12).
    pub start_month: u32,
    /// First day of the fiscal year; clamped to the month's length.
    pub start_day: u32,
    /// Period template.
    pub template: FiscalPeriodTemplate,
    /// Year naming convention.
    #[serde(default)]
    pub year_naming: FiscalYearNaming,
}

impl Default for FiscalSettings {
    fn default() -> Self {
        Self {
            start_month: DEFAULT_FISCAL_START_MONTH,
            start_day: DEFAULT_FISCAL_START_DAY,
            template: FiscalPeriodTemplate::default(),
            year_naming: FiscalYearNaming::default(),
        }
    }
}

impl FiscalSettings {
    /// Create settings with the given start date and template.
    pub fn new(start_month: u32, start_day: u32, template: FiscalPeriodTemplate) -> Self {
        Self {
            start_month,
            start_day,
            template,
            year_naming: FiscalYearNaming::default(),
        }
    }

    /// Set the year naming convention.
    pub fn with_year_naming(mut self, year_naming: FiscalYearNaming) -> Self {
        self.year_naming = year_naming;
        self
    }

    /// Load settings from JSON.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let settings: FiscalSettings =
            serde_json::from_str(json).map_err(crmdb_proto::Error::from)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check that the start date names a real month and day.
    pub fn validate(&self) -> Result<(), Error> {
        if !(1..=12).contains(&self.start_month) {
            return Err(Error::InvalidQuery(format!(
                "fiscal start month {} is out of range",
                self.start_month
            )));
        }
        if !(1..=31).contains(&self.start_day) {
            return Err(Error::InvalidQuery(format!(
                "fiscal start day {} is out of range",
                self.start_day
            )));
        }
        Ok(())
    }

    /// The calendar for these settings.
    pub fn calendar(&self) -> FiscalCalendar<'_> {
        FiscalCalendar { settings: self }
    }
}

/// A fiscal period within a named fiscal year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FiscalPeriod {
    /// Fiscal year name.
    pub year: i32,
    /// 1-based period number.
    pub period: u32,
}

impl FiscalPeriod {
    /// Create a fiscal period.
    pub fn new(year: i32, period: u32) -> Self {
        Self { year, period }
    }
}

/// Fiscal calendar calculations over a set of [`FiscalSettings`].
#[derive(Debug, Clone, Copy)]
pub struct FiscalCalendar<'a> {
    settings: &'a FiscalSettings,
}

impl<'a> FiscalCalendar<'a> {
    /// Create a calendar over the given settings.
    pub fn new(settings: &'a FiscalSettings) -> Self {
        Self { settings }
    }

    /// Number of periods per fiscal year.
    pub fn periods(&self) -> u32 {
        self.settings.template.periods()
    }

    /// Check a period number against the template.
    pub fn validate_period(&self, period: i64) -> Result<u32, Error> {
        let periods = self.periods();
        if period < 1 || period > i64::from(periods) {
            return Err(Error::InvalidFiscalPeriod { period, periods });
        }
        Ok(period as u32)
    }

    /// Check that a fiscal year lies inside the supported date range.
    ///
    /// The bounds leave room for the neighbouring years, so every year
    /// accepted here has a computable date range.
    pub fn checked_year(&self, year: i64) -> Option<i32> {
        let min = i64::from(NaiveDate::MIN.year()) + 1;
        let max = i64::from(NaiveDate::MAX.year()) - 1;
        if (min..=max).contains(&year) {
            i32::try_from(year).ok()
        } else {
            None
        }
    }

    /// First day of a named fiscal year.
    pub fn year_start(&self, year: i32) -> Result<NaiveDate, Error> {
        let calendar_year = match self.settings.year_naming {
            FiscalYearNaming::EndYear if !self.starts_on_new_year() => year.checked_sub(1),
            _ => Some(year),
        };
        calendar_year
            .and_then(|y| clamped_date(y, self.settings.start_month, self.settings.start_day))
            .ok_or_else(|| year_out_of_range(year))
    }

    /// Inclusive date range of a named fiscal year.
    pub fn year_range(&self, year: i32) -> Result<(NaiveDate, NaiveDate), Error> {
        let from = self.year_start(year)?;
        let to = year
            .checked_add(1)
            .and_then(|next| self.year_start(next).ok())
            .and_then(|next_start| next_start.pred_opt())
            .ok_or_else(|| year_out_of_range(year))?;
        Ok((from, to))
    }

    /// The fiscal year containing `today`.
    pub fn current_fiscal_year(&self, today: NaiveDate) -> Result<i32, Error> {
        let mut year = today.year();
        while self.year_start(year)? > today {
            year = step(year, -1)?;
        }
        while self.year_start(step(year, 1)?)? <= today {
            year = step(year, 1)?;
        }
        Ok(year)
    }

    /// The fiscal period containing `today`.
    pub fn current_fiscal_period(&self, today: NaiveDate) -> Result<FiscalPeriod, Error> {
        let year = self.current_fiscal_year(today)?;
        let start = self.year_start(year)?;
        let base = self.base_period_days(year)?;
        let elapsed = (today - start).num_days();
        let index = (elapsed / base).min(i64::from(self.periods()) - 1);
        Ok(FiscalPeriod::new(year, index as u32 + 1))
    }

    /// Inclusive date range of a fiscal period.
    pub fn period_date_range(
        &self,
        year: i32,
        period: u32,
    ) -> Result<(NaiveDate, NaiveDate), Error> {
        let period = self.validate_period(i64::from(period))?;
        let periods = self.periods();
        let (year_from, year_to) = self.year_range(year)?;
        let base = self.base_period_days(year)?;

        // Both bounds stay inside [year_from, year_to]
        let from = year_from + Duration::days(base * i64::from(period - 1));
        let to = if period == periods {
            year_to
        } else {
            year_from + Duration::days(base * i64::from(period)) - Duration::days(1)
        };
        Ok((from, to))
    }

    /// The period before `current`, rolling into the previous fiscal year.
    pub fn previous_period(&self, current: FiscalPeriod) -> Result<FiscalPeriod, Error> {
        if current.period <= 1 {
            Ok(FiscalPeriod::new(step(current.year, -1)?, self.periods()))
        } else {
            Ok(FiscalPeriod::new(current.year, current.period - 1))
        }
    }

    /// The period after `current`, rolling into the next fiscal year.
    pub fn next_period(&self, current: FiscalPeriod) -> Result<FiscalPeriod, Error> {
        if current.period >= self.periods() {
            Ok(FiscalPeriod::new(step(current.year, 1)?, 1))
        } else {
            Ok(FiscalPeriod::new(current.year, current.period + 1))
        }
    }

    fn starts_on_new_year(&self) -> bool {
        self.settings.start_month == 1 && self.settings.start_day == 1
    }

    fn base_period_days(&self, year: i32) -> Result<i64, Error> {
        let (from, to) = self.year_range(year)?;
        let total = (to - from).num_days() + 1;
        Ok((total / i64::from(self.periods())).max(1))
    }
}

fn year_out_of_range(year: i32) -> Error {
    Error::InvalidQuery(format!(
        "fiscal year {year} is outside the supported date range"
    ))
}

fn step(year: i32, delta: i32) -> Result<i32, Error> {
    year.checked_add(delta).ok_or_else(|| year_out_of_range(year))
}

/// Build a date, clamping the month to 1-12 and the day to the month's length.
///
/// Returns `None` when the year is outside the supported range.
fn clamped_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let month = month.clamp(1, 12);
    let mut day = day.clamp(1, 31);
    loop {
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date);
        }
        if day <= 1 {
            return None;
        }
        day -= 1;
    }
}
