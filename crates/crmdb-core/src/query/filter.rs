//! Filter tree compilation and evaluation.
//!
//! A [`FilterExpression`] is compiled into a [`CompiledFilter`] mirroring its
//! AND/OR shape, with every leaf compiled by [`CompiledCondition`].

use std::collections::{BTreeMap, BTreeSet};

use crmdb_proto::{Entity, FilterExpression, LogicalOperator};

use crate::catalog::EntityDef;
use crate::error::Error;

use super::condition::CompiledCondition;
use super::context::ExecutionContext;

/// Collect the link aliases named by conditions in a filter tree.
pub fn extract_filter_aliases(filter: &FilterExpression) -> BTreeSet<String> {
    let mut aliases = BTreeSet::new();
    extract_filter_aliases_inner(filter, &mut aliases);
    aliases
}

fn extract_filter_aliases_inner(filter: &FilterExpression, aliases: &mut BTreeSet<String>) {
    for condition in &filter.conditions {
        if let Some(alias) = &condition.entity_name {
            aliases.insert(alias.clone());
        }
    }
    for nested in &filter.filters {
        extract_filter_aliases_inner(nested, aliases);
    }
}

/// Entities a filter's conditions may refer to.
#[derive(Debug, Clone, Copy)]
pub struct FilterScope<'a> {
    /// Entity of unqualified conditions.
    entity: &'a EntityDef,
    /// Alias that refers back to `entity` itself.
    own_alias: Option<&'a str>,
    /// Joined entities reachable under their aliases.
    aliases: Option<&'a BTreeMap<String, EntityDef>>,
}

impl<'a> FilterScope<'a> {
    /// Scope of a root filter, which may name any link alias.
    pub fn root(entity: &'a EntityDef, aliases: &'a BTreeMap<String, EntityDef>) -> Self {
        Self {
            entity,
            own_alias: None,
            aliases: Some(aliases),
        }
    }

    /// Scope of a link's own criteria, evaluated on the unmerged joined record.
    pub fn link(entity: &'a EntityDef, alias: &'a str) -> Self {
        Self {
            entity,
            own_alias: Some(alias),
            aliases: None,
        }
    }

    /// Scope with a single entity and no aliases.
    pub fn entity(entity: &'a EntityDef) -> Self {
        Self {
            entity,
            own_alias: None,
            aliases: None,
        }
    }

    /// Resolve the row column and owning entity of a condition.
    fn resolve(&self, alias: Option<&str>, attribute: &str) -> Result<(String, &'a EntityDef), Error> {
        let attribute = attribute.to_lowercase();
        match alias {
            None => Ok((attribute, self.entity)),
            Some(alias) if self.own_alias == Some(alias) => Ok((attribute, self.entity)),
            Some(alias) => match self.aliases.and_then(|aliases| aliases.get(alias)) {
                Some(entity) => Ok((format!("{alias}.{attribute}"), entity)),
                None => Err(Error::InvalidQuery(format!(
                    "condition on '{attribute}' names unknown link alias '{alias}'"
                ))),
            },
        }
    }
}

/// A filter tree ready to be evaluated against rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledFilter {
    operator: LogicalOperator,
    conditions: Vec<CompiledCondition>,
    filters: Vec<CompiledFilter>,
}

impl CompiledFilter {
    /// Compile a filter tree.
    pub fn compile(
        filter: &FilterExpression,
        scope: FilterScope<'_>,
        ctx: &ExecutionContext,
    ) -> Result<Self, Error> {
        let conditions = filter
            .conditions
            .iter()
            .map(|condition| {
                let (column, entity) =
                    scope.resolve(condition.entity_name.as_deref(), &condition.attribute_name)?;
                CompiledCondition::compile_for_column(condition, column, entity, ctx)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let filters = filter
            .filters
            .iter()
            .map(|nested| Self::compile(nested, scope, ctx))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            operator: filter.filter_operator,
            conditions,
            filters,
        })
    }

    /// Check if this node has no conditions anywhere below it.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.filters.iter().all(CompiledFilter::is_empty)
    }

    /// Evaluate against a row.
    ///
    /// An empty node matches everything. Empty nested nodes are skipped so
    /// they neither satisfy an OR nor fail an AND.
    pub fn evaluate(&self, row: &Entity, ctx: &ExecutionContext) -> Result<bool, Error> {
        if self.is_empty() {
            return Ok(true);
        }

        let nested = self.filters.iter().filter(|f| !f.is_empty());
        match self.operator {
            LogicalOperator::And => {
                for condition in &self.conditions {
                    if !condition.evaluate(row, ctx)? {
                        return Ok(false);
                    }
                }
                for filter in nested {
                    if !filter.evaluate(row, ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            LogicalOperator::Or => {
                for condition in &self.conditions {
                    if condition.evaluate(row, ctx)? {
                        return Ok(true);
                    }
                }
                for filter in nested {
                    if filter.evaluate(row, ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}
