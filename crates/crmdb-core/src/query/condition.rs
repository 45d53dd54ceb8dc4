//! Condition compilation and evaluation.
//!
//! A [`ConditionExpression`] is compiled once per query into a
//! [`CompiledCondition`]: the operator's arity is checked, the attribute is
//! resolved against metadata, and literals are coerced to the declared type.
//! Evaluation then reads the row's value and the execution context. Values
//! that depend on the context (today, the calling user, the current fiscal
//! period) are derived on every call and never cached.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, Utc};
use crmdb_proto::{ConditionExpression, ConditionOperator, Entity, Value};

use crate::catalog::{AttributeType, EntityDef};
use crate::error::Error;

use super::compare::{compare_keys, keys_equal, Key};
use super::context::ExecutionContext;

/// Literal operand of a compiled condition.
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    /// Context-derived operators.
    None,
    /// Coerced literal values.
    Keys(Vec<Key>),
    /// Text or wildcard pattern.
    Text(String),
    /// X of the relative date operators.
    Amount(u32),
    /// A calendar day.
    Day(NaiveDate),
    /// A fiscal year.
    FiscalYear(i32),
    /// A fiscal period of the current fiscal year.
    FiscalPeriod(u32),
    /// A fiscal period of a given fiscal year.
    FiscalPeriodAndYear(u32, i32),
}

/// A condition ready to be evaluated against rows.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledCondition {
    /// Row key the condition reads.
    column: String,
    /// Declared type, `None` when the attribute is not in metadata.
    attribute_type: Option<AttributeType>,
    operator: ConditionOperator,
    operand: Operand,
}

impl CompiledCondition {
    /// Compile a condition over an attribute of `entity`.
    pub fn compile(
        condition: &ConditionExpression,
        entity: &EntityDef,
        ctx: &ExecutionContext,
    ) -> Result<Self, Error> {
        let column = condition.attribute_name.to_lowercase();
        Self::compile_for_column(condition, column, entity, ctx)
    }

    /// Compile a condition that reads `column` from the row.
    ///
    /// `column` differs from the attribute name for conditions on joined
    /// entities, whose columns are merged under an alias prefix.
    pub fn compile_for_column(
        condition: &ConditionExpression,
        column: String,
        entity: &EntityDef,
        ctx: &ExecutionContext,
    ) -> Result<Self, Error> {
        let operator = condition.operator;
        let attribute = condition.attribute_name.to_lowercase();

        if !operator.arity().accepts(condition.values.len()) {
            return Err(Error::InvalidQuery(format!(
                "operator {:?} on '{}' does not take {} value(s)",
                operator,
                attribute,
                condition.values.len()
            )));
        }

        let attribute_type = match entity.get_attribute(&attribute) {
            Some(definition) => Some(definition.attribute_type),
            None if ctx.strict => {
                return Err(Error::unknown_attribute(&entity.logical_name, &attribute))
            }
            None => None,
        };

        let operand = compile_operand(condition, &attribute, attribute_type, ctx)?;

        Ok(Self {
            column,
            attribute_type,
            operator,
            operand,
        })
    }

    /// Row key this condition reads.
    pub fn column(&self) -> &str {
        &self.column
    }

    /// The operator.
    pub fn operator(&self) -> ConditionOperator {
        self.operator
    }

    /// Evaluate against a row.
    ///
    /// An attribute that is absent, null, or not declared in metadata only
    /// satisfies `Null`; every other operator returns `false` for it.
    pub fn evaluate(&self, row: &Entity, ctx: &ExecutionContext) -> Result<bool, Error> {
        let value = match self.attribute_type {
            Some(_) => row.get(&self.column),
            None => None,
        };
        let key = match value {
            Some(value) => Key::from_record(value, self.attribute_type, &self.column)?,
            None => None,
        };

        use ConditionOperator::*;
        let key = match (self.operator, key) {
            (Null, key) => return Ok(key.is_none()),
            (NotNull, key) => return Ok(key.is_some()),
            (_, None) => return Ok(false),
            (_, Some(key)) => key,
        };
        let case_sensitive = ctx.case_sensitive;

        let matched = match self.operator {
            Equal | In => self.equals_any(&key, case_sensitive),
            NotEqual | NotIn => !self.equals_any(&key, case_sensitive),
            GreaterThan => self.compare_first(&key, case_sensitive, |o| o == Ordering::Greater),
            GreaterEqual => self.compare_first(&key, case_sensitive, |o| o != Ordering::Less),
            LessThan => self.compare_first(&key, case_sensitive, |o| o == Ordering::Less),
            LessEqual => self.compare_first(&key, case_sensitive, |o| o != Ordering::Greater),
            Between => self.between(&key, case_sensitive) == Some(true),
            NotBetween => self.between(&key, case_sensitive) == Some(false),
            Like => self.text_matches(&key, case_sensitive, like_match)?,
            NotLike => !self.text_matches(&key, case_sensitive, like_match)?,
            BeginsWith => self.text_matches(&key, case_sensitive, |v, p| v.starts_with(p))?,
            DoesNotBeginWith => !self.text_matches(&key, case_sensitive, |v, p| v.starts_with(p))?,
            EndsWith => self.text_matches(&key, case_sensitive, |v, p| v.ends_with(p))?,
            DoesNotEndWith => !self.text_matches(&key, case_sensitive, |v, p| v.ends_with(p))?,
            Contains => self.text_matches(&key, case_sensitive, |v, p| v.contains(p))?,
            DoesNotContain => !self.text_matches(&key, case_sensitive, |v, p| v.contains(p))?,
            ContainValues => self.shares_codes(&key),
            DoesNotContainValues => !self.shares_codes(&key),
            EqualUserId => key == Key::Guid(ctx.caller_id),
            NotEqualUserId => key != Key::Guid(ctx.caller_id),
            EqualBusinessId => key == Key::Guid(ctx.business_unit_id),
            NotEqualBusinessId => key != Key::Guid(ctx.business_unit_id),
            operator if operator.is_fiscal() => self.fiscal_matches(&key, ctx)?,
            _ => self.date_matches(&key, ctx)?,
        };
        Ok(matched)
    }

    fn literals(&self) -> &[Key] {
        match &self.operand {
            Operand::Keys(keys) => keys,
            _ => &[],
        }
    }

    /// Codes named by the literals, for multi-select operators.
    fn literal_codes(&self) -> BTreeSet<i32> {
        let mut codes = BTreeSet::new();
        for key in self.literals() {
            match key {
                Key::Set(set) => codes.extend(set.iter().copied()),
                other => codes.extend(other.as_code()),
            }
        }
        codes
    }

    fn equals_any(&self, key: &Key, case_sensitive: bool) -> bool {
        match key {
            Key::Set(codes) => *codes == self.literal_codes(),
            _ => self
                .literals()
                .iter()
                .any(|literal| keys_equal(key, literal, case_sensitive)),
        }
    }

    fn shares_codes(&self, key: &Key) -> bool {
        let literal = self.literal_codes();
        match key {
            Key::Set(codes) => !codes.is_disjoint(&literal),
            other => other.as_code().is_some_and(|code| literal.contains(&code)),
        }
    }

    fn compare_first(
        &self,
        key: &Key,
        case_sensitive: bool,
        accept: impl Fn(Ordering) -> bool,
    ) -> bool {
        self.literals()
            .first()
            .and_then(|literal| compare_keys(key, literal, case_sensitive))
            .is_some_and(accept)
    }

    /// `Some(true)` inside the range, `Some(false)` outside, `None` if not comparable.
    fn between(&self, key: &Key, case_sensitive: bool) -> Option<bool> {
        let [low, high] = self.literals() else {
            return None;
        };
        let above_low = compare_keys(key, low, case_sensitive)? != Ordering::Less;
        let below_high = compare_keys(key, high, case_sensitive)? != Ordering::Greater;
        Some(above_low && below_high)
    }

    fn text_matches(
        &self,
        key: &Key,
        case_sensitive: bool,
        test: impl Fn(&str, &str) -> bool,
    ) -> Result<bool, Error> {
        let (Key::Text(value), Operand::Text(pattern)) = (key, &self.operand) else {
            return Err(Error::unsupported(&self.column, "non-text value"));
        };
        if case_sensitive {
            Ok(test(value, pattern))
        } else {
            Ok(test(&value.to_lowercase(), &pattern.to_lowercase()))
        }
    }

    fn date_matches(&self, key: &Key, ctx: &ExecutionContext) -> Result<bool, Error> {
        let instant = key
            .as_date()
            .ok_or_else(|| Error::unsupported(&self.column, "non-date value"))?;
        let now = ctx.now();
        let today = now.date_naive();
        let amount = match self.operand {
            Operand::Amount(amount) => amount,
            _ => 0,
        };
        let days = |n: i64| Duration::days(n);

        use ConditionOperator::*;
        let matched = match (self.operator, &self.operand) {
            (Today, _) => within_days(instant, today, today + days(1)),
            (Yesterday, _) => within_days(instant, today - days(1), today),
            (Tomorrow, _) => within_days(instant, today + days(1), today + days(2)),
            (On, Operand::Day(day)) => {
                instant >= start_of(*day) && shift(*day, 1).map_or(true, |to| instant < start_of(to))
            }
            (NotOn, Operand::Day(day)) => {
                instant < start_of(*day) || shift(*day, 1).is_some_and(|to| instant >= start_of(to))
            }
            (OnOrBefore, Operand::Day(day)) => {
                shift(*day, 1).map_or(true, |to| instant < start_of(to))
            }
            (OnOrAfter, Operand::Day(day)) => instant >= start_of(*day),
            (Last7Days, _) => instant >= now - days(7) && instant <= now,
            (Next7Days, _) => instant >= now && instant <= now + days(7),
            (LastXHours, _) => now
                .checked_sub_signed(Duration::hours(i64::from(amount)))
                .is_some_and(|from| instant >= from && instant <= now),
            (NextXHours, _) => now
                .checked_add_signed(Duration::hours(i64::from(amount)))
                .is_some_and(|to| instant >= now && instant <= to),
            (LastXDays, _) => shift(today, -i64::from(amount))
                .is_some_and(|from| instant >= start_of(from) && instant <= now),
            (NextXDays, _) => shift(today, i64::from(amount) + 1)
                .is_some_and(|to| instant >= now && instant < start_of(to)),
            (LastXWeeks, _) => shift(today, -7 * i64::from(amount))
                .is_some_and(|from| instant >= start_of(from) && instant <= now),
            (NextXWeeks, _) => shift(today, 7 * i64::from(amount) + 1)
                .is_some_and(|to| instant >= now && instant < start_of(to)),
            (LastXMonths, _) => today
                .checked_sub_months(Months::new(amount))
                .is_some_and(|from| instant >= start_of(from) && instant <= now),
            (NextXMonths, _) => today
                .checked_add_months(Months::new(amount))
                .and_then(|to| shift(to, 1))
                .is_some_and(|to| instant >= now && instant < start_of(to)),
            (LastXYears, _) => today
                .checked_sub_months(Months::new(amount.saturating_mul(12)))
                .is_some_and(|from| instant >= start_of(from) && instant <= now),
            (NextXYears, _) => today
                .checked_add_months(Months::new(amount.saturating_mul(12)))
                .and_then(|to| shift(to, 1))
                .is_some_and(|to| instant >= now && instant < start_of(to)),
            (OlderThanXDays, _) => now
                .checked_sub_signed(days(i64::from(amount)))
                .is_some_and(|cutoff| instant < cutoff),
            (OlderThanXMonths, _) => now
                .checked_sub_months(Months::new(amount))
                .is_some_and(|cutoff| instant < cutoff),
            (OlderThanXYears, _) => now
                .checked_sub_months(Months::new(amount.saturating_mul(12)))
                .is_some_and(|cutoff| instant < cutoff),
            (ThisWeek | LastWeek | NextWeek, _) => {
                let offset = (today.weekday().num_days_from_sunday() + 7
                    - ctx.week_start.num_days_from_sunday())
                    % 7;
                let this_week = today - days(i64::from(offset));
                let start = match self.operator {
                    LastWeek => this_week - days(7),
                    NextWeek => this_week + days(7),
                    _ => this_week,
                };
                within_days(instant, start, start + days(7))
            }
            (ThisMonth | LastMonth | NextMonth, _) => {
                let this_month = today.with_day(1).unwrap_or(today);
                let start = match self.operator {
                    LastMonth => this_month.checked_sub_months(Months::new(1)),
                    NextMonth => this_month.checked_add_months(Months::new(1)),
                    _ => Some(this_month),
                };
                start
                    .and_then(|s| Some((s, s.checked_add_months(Months::new(1))?)))
                    .is_some_and(|(from, to)| within_days(instant, from, to))
            }
            (ThisYear | LastYear | NextYear, _) => {
                let year = match self.operator {
                    LastYear => today.year() - 1,
                    NextYear => today.year() + 1,
                    _ => today.year(),
                };
                match (
                    NaiveDate::from_ymd_opt(year, 1, 1),
                    NaiveDate::from_ymd_opt(year + 1, 1, 1),
                ) {
                    (Some(from), Some(to)) => within_days(instant, from, to),
                    _ => false,
                }
            }
            (operator, _) => {
                return Err(Error::InvalidQuery(format!(
                    "operator {operator:?} cannot be applied to '{}'",
                    self.column
                )))
            }
        };
        Ok(matched)
    }

    fn fiscal_matches(&self, key: &Key, ctx: &ExecutionContext) -> Result<bool, Error> {
        let day = key
            .as_date()
            .ok_or_else(|| Error::unsupported(&self.column, "non-date value"))?
            .date_naive();
        let calendar = ctx.fiscal.calendar();
        let today = ctx.today();
        let contains = |(from, to): (NaiveDate, NaiveDate)| day >= from && day <= to;

        use ConditionOperator::*;
        let matched = match (self.operator, &self.operand) {
            (InFiscalYear, Operand::FiscalYear(year)) => contains(calendar.year_range(*year)?),
            (InFiscalPeriod, Operand::FiscalPeriod(period)) => {
                let year = calendar.current_fiscal_year(today)?;
                contains(calendar.period_date_range(year, *period)?)
            }
            (InFiscalPeriodAndYear, Operand::FiscalPeriodAndYear(period, year)) => {
                contains(calendar.period_date_range(*year, *period)?)
            }
            (InOrBeforeFiscalPeriodAndYear, Operand::FiscalPeriodAndYear(period, year)) => {
                day <= calendar.period_date_range(*year, *period)?.1
            }
            (InOrAfterFiscalPeriodAndYear, Operand::FiscalPeriodAndYear(period, year)) => {
                day >= calendar.period_date_range(*year, *period)?.0
            }
            (ThisFiscalYear | LastFiscalYear | NextFiscalYear, _) => {
                let current = calendar.current_fiscal_year(today)?;
                // The current year comes from a valid date, so its neighbours fit in i32
                let year = match self.operator {
                    LastFiscalYear => current - 1,
                    NextFiscalYear => current + 1,
                    _ => current,
                };
                contains(calendar.year_range(year)?)
            }
            (ThisFiscalPeriod | LastFiscalPeriod | NextFiscalPeriod, _) => {
                let current = calendar.current_fiscal_period(today)?;
                let target = match self.operator {
                    LastFiscalPeriod => calendar.previous_period(current)?,
                    NextFiscalPeriod => calendar.next_period(current)?,
                    _ => current,
                };
                contains(calendar.period_date_range(target.year, target.period)?)
            }
            (operator, _) => {
                return Err(Error::InvalidQuery(format!(
                    "operator {operator:?} cannot be applied to '{}'",
                    self.column
                )))
            }
        };
        Ok(matched)
    }
}

fn compile_operand(
    condition: &ConditionExpression,
    attribute: &str,
    attribute_type: Option<AttributeType>,
    ctx: &ExecutionContext,
) -> Result<Operand, Error> {
    use ConditionOperator::*;
    let values = &condition.values;

    let operand = match condition.operator {
        Null | NotNull => Operand::None,
        Equal | NotEqual | In | NotIn | GreaterThan | GreaterEqual | LessThan | LessEqual
        | Between | NotBetween | ContainValues | DoesNotContainValues => Operand::Keys(
            values
                .iter()
                .map(|v| Key::coerce(v, attribute_type, attribute))
                .collect::<Result<_, _>>()?,
        ),
        Like | NotLike | BeginsWith | DoesNotBeginWith | EndsWith | DoesNotEndWith | Contains
        | DoesNotContain => {
            require_type(attribute, attribute_type, AttributeType::is_text)?;
            let text = values
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| Error::unsupported(attribute, first_kind(values)))?;
            Operand::Text(text.to_string())
        }
        On | NotOn | OnOrBefore | OnOrAfter => {
            require_type(attribute, attribute_type, is_date)?;
            let day = values
                .first()
                .map(|v| Key::coerce(v, Some(AttributeType::DateTime), attribute))
                .transpose()?
                .and_then(|key| key.as_date())
                .ok_or_else(|| Error::unsupported(attribute, first_kind(values)))?;
            Operand::Day(day.date_naive())
        }
        LastXHours | NextXHours | LastXDays | NextXDays | LastXWeeks | NextXWeeks
        | LastXMonths | NextXMonths | LastXYears | NextXYears | OlderThanXDays
        | OlderThanXMonths | OlderThanXYears => {
            require_type(attribute, attribute_type, is_date)?;
            let amount = integer_literal(values.first(), attribute)?;
            let amount = u32::try_from(amount).map_err(|_| {
                Error::InvalidQuery(format!(
                    "operator {:?} on '{attribute}' needs a non-negative count, got {amount}",
                    condition.operator
                ))
            })?;
            Operand::Amount(amount)
        }
        Today | Yesterday | Tomorrow | Last7Days | Next7Days | ThisWeek | LastWeek | NextWeek
        | ThisMonth | LastMonth | NextMonth | ThisYear | LastYear | NextYear => {
            require_type(attribute, attribute_type, is_date)?;
            Operand::None
        }
        EqualUserId | NotEqualUserId | EqualBusinessId | NotEqualBusinessId => {
            require_type(attribute, attribute_type, is_identifier)?;
            Operand::None
        }
        InFiscalYear => {
            require_type(attribute, attribute_type, is_date)?;
            let year = integer_literal(values.first(), attribute)?;
            Operand::FiscalYear(fiscal_year(year, attribute, ctx)?)
        }
        InFiscalPeriod => {
            require_type(attribute, attribute_type, is_date)?;
            let period = integer_literal(values.first(), attribute)?;
            Operand::FiscalPeriod(ctx.fiscal.calendar().validate_period(period)?)
        }
        InFiscalPeriodAndYear | InOrBeforeFiscalPeriodAndYear | InOrAfterFiscalPeriodAndYear => {
            require_type(attribute, attribute_type, is_date)?;
            let period = integer_literal(values.first(), attribute)?;
            let year = integer_literal(values.get(1), attribute)?;
            Operand::FiscalPeriodAndYear(
                ctx.fiscal.calendar().validate_period(period)?,
                fiscal_year(year, attribute, ctx)?,
            )
        }
        ThisFiscalYear | ThisFiscalPeriod | LastFiscalYear | NextFiscalYear
        | LastFiscalPeriod | NextFiscalPeriod => {
            require_type(attribute, attribute_type, is_date)?;
            Operand::None
        }
    };
    Ok(operand)
}

fn is_date(attribute_type: &AttributeType) -> bool {
    *attribute_type == AttributeType::DateTime
}

fn is_identifier(attribute_type: &AttributeType) -> bool {
    attribute_type.is_reference() || *attribute_type == AttributeType::Uniqueidentifier
}

fn require_type(
    attribute: &str,
    attribute_type: Option<AttributeType>,
    accept: impl Fn(&AttributeType) -> bool,
) -> Result<(), Error> {
    match attribute_type {
        Some(t) if !accept(&t) => Err(Error::unsupported(attribute, format!("{t:?}"))),
        _ => Ok(()),
    }
}

fn first_kind(values: &[Value]) -> &'static str {
    values.first().map_or("null", Value::kind)
}

fn integer_literal(value: Option<&Value>, attribute: &str) -> Result<i64, Error> {
    let value = value.ok_or_else(|| Error::unsupported(attribute, "null"))?;
    match value.unaliased() {
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| Error::unsupported(attribute, "string")),
        other => other
            .as_i64()
            .ok_or_else(|| Error::unsupported(attribute, other.kind())),
    }
}

fn fiscal_year(year: i64, attribute: &str, ctx: &ExecutionContext) -> Result<i32, Error> {
    ctx.fiscal
        .calendar()
        .checked_year(year)
        .ok_or_else(|| Error::unsupported(attribute, "out-of-range year"))
}

fn shift(day: NaiveDate, days: i64) -> Option<NaiveDate> {
    day.checked_add_signed(Duration::days(days))
}

fn start_of(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::default()).and_utc()
}

/// Check `from <= instant < to`, with both bounds at midnight UTC.
fn within_days(instant: DateTime<Utc>, from: NaiveDate, to: NaiveDate) -> bool {
    instant >= start_of(from) && instant < start_of(to)
}

/// One element of a LIKE pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LikeToken {
    /// `%`: zero or more characters.
    Any,
    /// `_`: exactly one character.
    One,
    /// A literal character.
    Char(char),
}

fn tokenize_like(pattern: &str) -> Vec<LikeToken> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut tokens = Vec::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '%' => tokens.push(LikeToken::Any),
            '_' => tokens.push(LikeToken::One),
            // Escape sequence
            '\\' if i + 1 < chars.len() => {
                i += 1;
                tokens.push(LikeToken::Char(chars[i]));
            }
            // Bracket escape: [%] or [_]
            '[' if i + 2 < chars.len() && chars[i + 2] == ']' => {
                tokens.push(LikeToken::Char(chars[i + 1]));
                i += 2;
            }
            c => tokens.push(LikeToken::Char(c)),
        }
        i += 1;
    }
    tokens
}

/// Match a string against a SQL LIKE pattern.
///
/// Supports:
/// - `%` matches zero or more characters
/// - `_` matches exactly one character
/// - `\%`, `\_` and `[%]`, `[_]` match the literal character
pub fn like_match(value: &str, pattern: &str) -> bool {
    let chars: Vec<char> = value.chars().collect();
    let tokens = tokenize_like(pattern);
    like_match_tokens(&chars, &tokens)
}

fn like_match_tokens(chars: &[char], tokens: &[LikeToken]) -> bool {
    match tokens.split_first() {
        // End of pattern: match only if value is exhausted
        None => chars.is_empty(),
        Some((LikeToken::Any, rest)) => {
            // Trailing % matches the rest of the string
            if rest.is_empty() {
                return true;
            }
            // Try matching % with 0, 1, 2, ... characters
            (0..=chars.len()).any(|skip| like_match_tokens(&chars[skip..], rest))
        }
        Some((LikeToken::One, rest)) => !chars.is_empty() && like_match_tokens(&chars[1..], rest),
        Some((LikeToken::Char(p), rest)) => {
            chars.first() == Some(p) && like_match_tokens(&chars[1..], rest)
        }
    }
}
