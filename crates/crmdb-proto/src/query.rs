//! Query descriptors.
//!
//! A [`QueryExpression`] describes one read against the entity store: the
//! root entity type, a [`FilterExpression`] tree, a list of [`LinkEntity`]
//! joins (each with its own criteria, columns and nested joins), the
//! requested columns, ordering and paging.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::result::EntityCollection;
use crate::value::Value;

/// Condition operators understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionOperator {
    /// Equal to any of the values (set equality for multi-select).
    Equal,
    /// Not equal to any of the values.
    NotEqual,
    /// Greater than the value.
    GreaterThan,
    /// Greater than or equal to the value.
    GreaterEqual,
    /// Less than the value.
    LessThan,
    /// Less than or equal to the value.
    LessEqual,
    /// Matches a `%`/`_` wildcard pattern.
    Like,
    /// Does not match a wildcard pattern.
    NotLike,
    /// Starts with the literal text.
    BeginsWith,
    /// Does not start with the literal text.
    DoesNotBeginWith,
    /// Ends with the literal text.
    EndsWith,
    /// Does not end with the literal text.
    DoesNotEndWith,
    /// Contains the literal text.
    Contains,
    /// Does not contain the literal text.
    DoesNotContain,
    /// Equal to one of the values.
    In,
    /// Equal to none of the values.
    NotIn,
    /// Between two values, inclusive.
    Between,
    /// Outside two values.
    NotBetween,
    /// Attribute is null or absent.
    Null,
    /// Attribute has a value.
    NotNull,
    /// Date falls on the current day.
    Today,
    /// Date falls on the previous day.
    Yesterday,
    /// Date falls on the next day.
    Tomorrow,
    /// Date falls on the given day.
    On,
    /// Date does not fall on the given day.
    NotOn,
    /// Date is on or before the given day.
    OnOrBefore,
    /// Date is on or after the given day.
    OnOrAfter,
    /// Within the last seven days, up to now.
    Last7Days,
    /// Within the next seven days, from now.
    Next7Days,
    /// Within the last X hours.
    LastXHours,
    /// Within the next X hours.
    NextXHours,
    /// Within the last X days.
    LastXDays,
    /// Within the next X days.
    NextXDays,
    /// Within the last X weeks.
    LastXWeeks,
    /// Within the next X weeks.
    NextXWeeks,
    /// Within the last X months.
    LastXMonths,
    /// Within the next X months.
    NextXMonths,
    /// Within the last X years.
    LastXYears,
    /// Within the next X years.
    NextXYears,
    /// Older than X days.
    OlderThanXDays,
    /// Older than X months.
    OlderThanXMonths,
    /// Older than X years.
    OlderThanXYears,
    /// Within the current week.
    ThisWeek,
    /// Within the previous week.
    LastWeek,
    /// Within the next week.
    NextWeek,
    /// Within the current month.
    ThisMonth,
    /// Within the previous month.
    LastMonth,
    /// Within the next month.
    NextMonth,
    /// Within the current year.
    ThisYear,
    /// Within the previous year.
    LastYear,
    /// Within the next year.
    NextYear,
    /// Reference points at the calling user.
    EqualUserId,
    /// Reference does not point at the calling user.
    NotEqualUserId,
    /// Reference points at the caller's business unit.
    EqualBusinessId,
    /// Reference does not point at the caller's business unit.
    NotEqualBusinessId,
    /// Multi-select shares at least one code with the values.
    ContainValues,
    /// Multi-select shares no code with the values.
    DoesNotContainValues,
    /// Date falls in the given fiscal year.
    InFiscalYear,
    /// Date falls in the given period of the current fiscal year.
    InFiscalPeriod,
    /// Date falls in the given fiscal period and year.
    InFiscalPeriodAndYear,
    /// Date falls in or before the given fiscal period and year.
    InOrBeforeFiscalPeriodAndYear,
    /// Date falls in or after the given fiscal period and year.
    InOrAfterFiscalPeriodAndYear,
    /// Date falls in the current fiscal year.
    ThisFiscalYear,
    /// Date falls in the current fiscal period.
    ThisFiscalPeriod,
    /// Date falls in the previous fiscal year.
    LastFiscalYear,
    /// Date falls in the next fiscal year.
    NextFiscalYear,
    /// Date falls in the previous fiscal period.
    LastFiscalPeriod,
    /// Date falls in the next fiscal period.
    NextFiscalPeriod,
}

/// How many literal values an operator takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// No values; the comparison value comes from the execution context.
    None,
    /// Exactly one value.
    One,
    /// Exactly two values.
    Two,
    /// One or more values.
    AtLeastOne,
}

impl Arity {
    /// Check whether `count` values satisfy this arity.
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Arity::None => count == 0,
            Arity::One => count == 1,
            Arity::Two => count == 2,
            Arity::AtLeastOne => count >= 1,
        }
    }
}

impl ConditionOperator {
    /// The number of literal values this operator expects.
    pub fn arity(&self) -> Arity {
        use ConditionOperator::*;
        match self {
            Equal | NotEqual | In | NotIn | ContainValues | DoesNotContainValues => {
                Arity::AtLeastOne
            }
            GreaterThan | GreaterEqual | LessThan | LessEqual => Arity::One,
            Like | NotLike | BeginsWith | DoesNotBeginWith | EndsWith | DoesNotEndWith
            | Contains | DoesNotContain => Arity::One,
            Between | NotBetween => Arity::Two,
            Null | NotNull => Arity::None,
            Today | Yesterday | Tomorrow | Last7Days | Next7Days => Arity::None,
            ThisWeek | LastWeek | NextWeek | ThisMonth | LastMonth | NextMonth | ThisYear
            | LastYear | NextYear => Arity::None,
            On | NotOn | OnOrBefore | OnOrAfter => Arity::One,
            LastXHours | NextXHours | LastXDays | NextXDays | LastXWeeks | NextXWeeks
            | LastXMonths | NextXMonths | LastXYears | NextXYears | OlderThanXDays
            | OlderThanXMonths | OlderThanXYears => Arity::One,
            EqualUserId | NotEqualUserId | EqualBusinessId | NotEqualBusinessId => Arity::None,
            InFiscalYear | InFiscalPeriod => Arity::One,
            InFiscalPeriodAndYear | InOrBeforeFiscalPeriodAndYear
            | InOrAfterFiscalPeriodAndYear => Arity::Two,
            ThisFiscalYear | ThisFiscalPeriod | LastFiscalYear | NextFiscalYear
            | LastFiscalPeriod | NextFiscalPeriod => Arity::None,
        }
    }

    /// Check if this operator is one of the fiscal-calendar operators.
    pub fn is_fiscal(&self) -> bool {
        use ConditionOperator::*;
        matches!(
            self,
            InFiscalYear
                | InFiscalPeriod
                | InFiscalPeriodAndYear
                | InOrBeforeFiscalPeriodAndYear
                | InOrAfterFiscalPeriodAndYear
                | ThisFiscalYear
                | ThisFiscalPeriod
                | LastFiscalYear
                | NextFiscalYear
                | LastFiscalPeriod
                | NextFiscalPeriod
        )
    }
}

/// A single attribute test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionExpression {
    /// Alias of the link entity the attribute belongs to, if not the filter's own entity.
    pub entity_name: Option<String>,
    /// Attribute being tested.
    pub attribute_name: String,
    /// Operator.
    pub operator: ConditionOperator,
    /// Literal values; empty for context-derived operators.
    pub values: Vec<Value>,
}

impl ConditionExpression {
    /// Create a condition with literal values.
    pub fn new<V: Into<Value>>(
        attribute_name: impl Into<String>,
        operator: ConditionOperator,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            entity_name: None,
            attribute_name: attribute_name.into().to_lowercase(),
            operator,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a condition that carries no literal values.
    pub fn unary(attribute_name: impl Into<String>, operator: ConditionOperator) -> Self {
        Self {
            entity_name: None,
            attribute_name: attribute_name.into().to_lowercase(),
            operator,
            values: Vec::new(),
        }
    }

    /// Create an `Equal` condition over a single value.
    pub fn eq(attribute_name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(attribute_name, ConditionOperator::Equal, [value.into()])
    }

    /// Qualify the attribute with a link-entity alias.
    pub fn with_entity_name(mut self, alias: impl Into<String>) -> Self {
        self.entity_name = Some(alias.into());
        self
    }
}

/// Logical combinator of a filter node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogicalOperator {
    /// All children must match.
    #[default]
    And,
    /// At least one child must match.
    Or,
}

/// A node of the filter tree.
///
/// An empty node always matches, whatever its operator.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterExpression {
    /// How the children are combined.
    pub filter_operator: LogicalOperator,
    /// Leaf conditions.
    pub conditions: Vec<ConditionExpression>,
    /// Nested filter nodes.
    pub filters: Vec<FilterExpression>,
}

impl FilterExpression {
    /// Create an empty node with the given combinator.
    pub fn new(filter_operator: LogicalOperator) -> Self {
        Self {
            filter_operator,
            conditions: Vec::new(),
            filters: Vec::new(),
        }
    }

    /// Create an empty AND node.
    pub fn and() -> Self {
        Self::new(LogicalOperator::And)
    }

    /// Create an empty OR node.
    pub fn or() -> Self {
        Self::new(LogicalOperator::Or)
    }

    /// Add a condition (builder style).
    pub fn with_condition(mut self, condition: ConditionExpression) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Add a nested filter (builder style).
    pub fn with_filter(mut self, filter: FilterExpression) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add a condition.
    pub fn add_condition(&mut self, condition: ConditionExpression) {
        self.conditions.push(condition);
    }

    /// Add a nested filter.
    pub fn add_filter(&mut self, filter: FilterExpression) {
        self.filters.push(filter);
    }

    /// Check if this node has no children at all.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.filters.iter().all(FilterExpression::is_empty)
    }

    /// Check if any condition in the tree names a link-entity alias.
    pub fn references_aliases(&self) -> bool {
        self.conditions.iter().any(|c| c.entity_name.is_some())
            || self.filters.iter().any(FilterExpression::references_aliases)
    }

    /// Iterate over every condition in the tree, depth first.
    pub fn all_conditions(&self) -> Vec<&ConditionExpression> {
        let mut out: Vec<&ConditionExpression> = self.conditions.iter().collect();
        for filter in &self.filters {
            out.extend(filter.all_conditions());
        }
        out
    }
}

/// Join kind of a link entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JoinOperator {
    /// Rows without a match are dropped.
    #[default]
    Inner,
    /// Rows without a match are kept without joined columns.
    LeftOuter,
}

/// Requested columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnSet {
    /// Every non-null attribute.
    AllColumns,
    /// The listed attributes (the primary key is always added for the root).
    Columns(Vec<String>),
}

impl Default for ColumnSet {
    fn default() -> Self {
        ColumnSet::Columns(Vec::new())
    }
}

impl ColumnSet {
    /// Request every column.
    pub fn all() -> Self {
        ColumnSet::AllColumns
    }

    /// Request the listed columns.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        ColumnSet::Columns(
            columns
                .into_iter()
                .map(|c| c.into().to_lowercase())
                .collect(),
        )
    }

    /// Check if this is the all-columns request.
    pub fn is_all(&self) -> bool {
        matches!(self, ColumnSet::AllColumns)
    }

    /// Check if a column is requested.
    pub fn contains(&self, column: &str) -> bool {
        match self {
            ColumnSet::AllColumns => true,
            ColumnSet::Columns(columns) => columns.iter().any(|c| c.eq_ignore_ascii_case(column)),
        }
    }
}

/// A join from the parent entity to a related entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkEntity {
    /// Entity type on the left side of the join.
    pub link_from_entity_name: String,
    /// Attribute on the left side.
    pub link_from_attribute_name: String,
    /// Entity type being joined.
    pub link_to_entity_name: String,
    /// Attribute on the joined entity.
    pub link_to_attribute_name: String,
    /// Inner or left outer.
    pub join_operator: JoinOperator,
    /// Prefix for merged columns; defaulted when absent.
    pub entity_alias: Option<String>,
    /// Columns of the joined entity to merge.
    pub columns: ColumnSet,
    /// Filter applied to the joined entity before merging.
    pub link_criteria: FilterExpression,
    /// Joins hanging off the joined entity.
    pub link_entities: Vec<LinkEntity>,
}

impl LinkEntity {
    /// Create a join.
    pub fn new(
        link_from_entity_name: impl Into<String>,
        link_to_entity_name: impl Into<String>,
        link_from_attribute_name: impl Into<String>,
        link_to_attribute_name: impl Into<String>,
        join_operator: JoinOperator,
    ) -> Self {
        Self {
            link_from_entity_name: link_from_entity_name.into().to_lowercase(),
            link_from_attribute_name: link_from_attribute_name.into().to_lowercase(),
            link_to_entity_name: link_to_entity_name.into().to_lowercase(),
            link_to_attribute_name: link_to_attribute_name.into().to_lowercase(),
            join_operator,
            entity_alias: None,
            columns: ColumnSet::default(),
            link_criteria: FilterExpression::default(),
            link_entities: Vec::new(),
        }
    }

    /// Set the alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.entity_alias = Some(alias.into());
        self
    }

    /// Set the merged columns.
    pub fn with_columns(mut self, columns: ColumnSet) -> Self {
        self.columns = columns;
        self
    }

    /// Set the joined entity's filter.
    pub fn with_criteria(mut self, criteria: FilterExpression) -> Self {
        self.link_criteria = criteria;
        self
    }

    /// Add a nested join.
    pub fn with_link_entity(mut self, link: LinkEntity) -> Self {
        self.link_entities.push(link);
        self
    }

    /// Add a nested join from this entity.
    pub fn link(
        self,
        link_to_entity_name: impl Into<String>,
        link_from_attribute_name: impl Into<String>,
        link_to_attribute_name: impl Into<String>,
        join_operator: JoinOperator,
    ) -> Self {
        let nested = LinkEntity::new(
            self.link_to_entity_name.clone(),
            link_to_entity_name,
            link_from_attribute_name,
            link_to_attribute_name,
            join_operator,
        );
        self.with_link_entity(nested)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrderType {
    /// Ascending order, nulls first.
    #[default]
    Ascending,
    /// Descending order, nulls last.
    Descending,
}

/// One ordering key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderExpression {
    /// Attribute to order by.
    pub attribute_name: String,
    /// Direction.
    pub order_type: OrderType,
    /// Alias of the link entity owning the attribute, if any.
    pub entity_alias: Option<String>,
}

impl OrderExpression {
    /// Create ascending order.
    pub fn asc(attribute_name: impl Into<String>) -> Self {
        Self {
            attribute_name: attribute_name.into().to_lowercase(),
            order_type: OrderType::Ascending,
            entity_alias: None,
        }
    }

    /// Create descending order.
    pub fn desc(attribute_name: impl Into<String>) -> Self {
        Self {
            attribute_name: attribute_name.into().to_lowercase(),
            order_type: OrderType::Descending,
            entity_alias: None,
        }
    }

    /// Order by a joined column.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.entity_alias = Some(alias.into());
        self
    }
}

/// Paging request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagingInfo {
    /// 1-based page number.
    pub page_number: u32,
    /// Rows per page.
    pub count: u32,
    /// Cookie from the previous page, if any.
    pub paging_cookie: Option<String>,
}

impl PagingInfo {
    /// Request a page.
    pub fn new(page_number: u32, count: u32) -> Self {
        Self {
            page_number,
            count,
            paging_cookie: None,
        }
    }

    /// Attach a paging cookie.
    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.paging_cookie = Some(cookie.into());
        self
    }

    /// Build the request for the page following `result`.
    ///
    /// Returns `None` when the result reported no more records.
    pub fn next_page(&self, result: &EntityCollection) -> Option<PagingInfo> {
        if !result.more_records {
            return None;
        }
        Some(PagingInfo {
            page_number: self.page_number + 1,
            count: self.count,
            paging_cookie: result.paging_cookie.clone(),
        })
    }
}

/// A complete query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryExpression {
    /// Root entity type.
    pub entity_name: String,
    /// Requested root columns.
    pub column_set: ColumnSet,
    /// Root filter.
    pub criteria: FilterExpression,
    /// Joins from the root entity.
    pub link_entities: Vec<LinkEntity>,
    /// Ordering, applied in list order.
    pub orders: Vec<OrderExpression>,
    /// Paging, if any.
    pub page_info: Option<PagingInfo>,
    /// Maximum number of rows; exclusive with paging.
    pub top_count: Option<u32>,
    /// Drop duplicate rows.
    pub distinct: bool,
    /// Report the total number of matching rows.
    pub return_total_record_count: bool,
}

impl QueryExpression {
    /// Create a query over an entity type.
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into().to_lowercase(),
            column_set: ColumnSet::default(),
            criteria: FilterExpression::default(),
            link_entities: Vec::new(),
            orders: Vec::new(),
            page_info: None,
            top_count: None,
            distinct: false,
            return_total_record_count: false,
        }
    }

    /// Set the requested columns.
    pub fn with_columns(mut self, column_set: ColumnSet) -> Self {
        self.column_set = column_set;
        self
    }

    /// Set the root filter.
    pub fn with_criteria(mut self, criteria: FilterExpression) -> Self {
        self.criteria = criteria;
        self
    }

    /// Add a condition to the root filter.
    pub fn with_condition(mut self, condition: ConditionExpression) -> Self {
        self.criteria.add_condition(condition);
        self
    }

    /// Add a join.
    pub fn with_link_entity(mut self, link: LinkEntity) -> Self {
        self.link_entities.push(link);
        self
    }

    /// Add a join from the root entity.
    pub fn link(
        self,
        link_to_entity_name: impl Into<String>,
        link_from_attribute_name: impl Into<String>,
        link_to_attribute_name: impl Into<String>,
        join_operator: JoinOperator,
    ) -> Self {
        let link = LinkEntity::new(
            self.entity_name.clone(),
            link_to_entity_name,
            link_from_attribute_name,
            link_to_attribute_name,
            join_operator,
        );
        self.with_link_entity(link)
    }

    /// Add an ordering key.
    pub fn with_order(mut self, order: OrderExpression) -> Self {
        self.orders.push(order);
        self
    }

    /// Set paging.
    pub fn with_paging(mut self, page_info: PagingInfo) -> Self {
        self.page_info = Some(page_info);
        self
    }

    /// Limit the number of rows.
    pub fn with_top_count(mut self, top_count: u32) -> Self {
        self.top_count = Some(top_count);
        self
    }

    /// Drop duplicate rows.
    pub fn with_distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Report the total number of matching rows.
    pub fn with_total_record_count(mut self) -> Self {
        self.return_total_record_count = true;
        self
    }
}

/// Query by a list of attribute/value pairs, all of which must match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryByAttribute {
    /// Root entity type.
    pub entity_name: String,
    /// Attributes to test.
    pub attributes: Vec<String>,
    /// Values, parallel with `attributes`.
    pub values: Vec<Value>,
    /// Requested columns.
    pub column_set: ColumnSet,
    /// Ordering.
    pub orders: Vec<OrderExpression>,
    /// Paging, if any.
    pub page_info: Option<PagingInfo>,
    /// Maximum number of rows.
    pub top_count: Option<u32>,
}

impl QueryByAttribute {
    /// Create an empty query by attribute.
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into().to_lowercase(),
            attributes: Vec::new(),
            values: Vec::new(),
            column_set: ColumnSet::default(),
            orders: Vec::new(),
            page_info: None,
            top_count: None,
        }
    }

    /// Add an attribute/value pair.
    pub fn with_attribute(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.push(attribute.into().to_lowercase());
        self.values.push(value.into());
        self
    }

    /// Set the requested columns.
    pub fn with_columns(mut self, column_set: ColumnSet) -> Self {
        self.column_set = column_set;
        self
    }

    /// Add an ordering key.
    pub fn with_order(mut self, order: OrderExpression) -> Self {
        self.orders.push(order);
        self
    }

    /// Convert into the equivalent [`QueryExpression`].
    pub fn to_query_expression(&self) -> Result<QueryExpression, Error> {
        if self.attributes.is_empty() {
            return Err(Error::InvalidQuery(
                "query by attribute needs at least one attribute".into(),
            ));
        }
        if self.attributes.len() != self.values.len() {
            return Err(Error::InvalidQuery(format!(
                "query by attribute has {} attributes but {} values",
                self.attributes.len(),
                self.values.len()
            )));
        }

        let mut criteria = FilterExpression::and();
        for (attribute, value) in self.attributes.iter().zip(&self.values) {
            criteria.add_condition(ConditionExpression::eq(attribute.clone(), value.clone()));
        }

        Ok(QueryExpression {
            entity_name: self.entity_name.clone(),
            column_set: self.column_set.clone(),
            criteria,
            link_entities: Vec::new(),
            orders: self.orders.clone(),
            page_info: self.page_info.clone(),
            top_count: self.top_count,
            distinct: false,
            return_total_record_count: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_arity() {
        assert_eq!(ConditionOperator::Today.arity(), Arity::None);
        assert_eq!(ConditionOperator::Between.arity(), Arity::Two);
        assert_eq!(ConditionOperator::Equal.arity(), Arity::AtLeastOne);
        assert!(Arity::AtLeastOne.accepts(3));
        assert!(!Arity::One.accepts(2));
        assert!(ConditionOperator::LastFiscalPeriod.is_fiscal());
        assert!(!ConditionOperator::LastMonth.is_fiscal());
    }

    #[test]
    fn test_filter_alias_detection() {
        let filter = FilterExpression::and()
            .with_condition(ConditionExpression::eq("name", "Contoso"))
            .with_filter(
                FilterExpression::or().with_condition(
                    ConditionExpression::eq("fullname", "Ada").with_entity_name("primary"),
                ),
            );
        assert!(filter.references_aliases());
        assert_eq!(filter.all_conditions().len(), 2);
        assert!(!FilterExpression::and().references_aliases());
    }

    #[test]
    fn test_empty_filter_detection() {
        assert!(FilterExpression::or().is_empty());
        assert!(FilterExpression::and()
            .with_filter(FilterExpression::or())
            .is_empty());
        assert!(!FilterExpression::and()
            .with_condition(ConditionExpression::unary("name", ConditionOperator::Null))
            .is_empty());
    }

    #[test]
    fn test_link_builder() {
        let query = QueryExpression::new("Contact").link(
            "account",
            "parentcustomerid",
            "accountid",
            JoinOperator::LeftOuter,
        );

        let link = &query.link_entities[0];
        assert_eq!(link.link_from_entity_name, "contact");
        assert_eq!(link.link_to_entity_name, "account");
        assert_eq!(link.join_operator, JoinOperator::LeftOuter);

        let nested = link
            .clone()
            .link("systemuser", "ownerid", "systemuserid", JoinOperator::Inner);
        assert_eq!(nested.link_entities[0].link_from_entity_name, "account");
    }

    #[test]
    fn test_column_set_contains() {
        let columns = ColumnSet::new(["Name", "accountid"]);
        assert!(columns.contains("name"));
        assert!(!columns.contains("revenue"));
        assert!(ColumnSet::all().contains("anything"));
    }

    #[test]
    fn test_query_by_attribute_conversion() {
        let query = QueryByAttribute::new("account")
            .with_attribute("name", "Contoso")
            .with_attribute("numberofemployees", 10)
            .with_columns(ColumnSet::all())
            .to_query_expression()
            .unwrap();

        assert_eq!(query.entity_name, "account");
        assert_eq!(query.criteria.conditions.len(), 2);
        assert_eq!(query.criteria.filter_operator, LogicalOperator::And);
        assert!(query.column_set.is_all());
    }

    #[test]
    fn test_query_by_attribute_requires_attributes() {
        let result = QueryByAttribute::new("account").to_query_expression();
        assert!(matches!(result, Err(Error::InvalidQuery(_))));
    }

    #[test]
    fn test_next_page() {
        let paging = PagingInfo::new(1, 10);
        let mut result = EntityCollection::new("account");
        assert!(paging.next_page(&result).is_none());

        result.more_records = true;
        result.paging_cookie = Some("cookie".into());
        let next = paging.next_page(&result).unwrap();
        assert_eq!(next.page_number, 2);
        assert_eq!(next.paging_cookie.as_deref(), Some("cookie"));
    }
}
