//! Query executor.
//!
//! The executor runs a [`QueryExpression`] against an [`EntityStore`] in
//! fixed phases: compile the root filter, filter the root records, resolve
//! links, order, project, de-duplicate, count, then page. Every phase fails
//! the whole query on error; no partial result is ever returned.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use crmdb_proto::{
    Entity, EntityCollection, OrderExpression, OrderType, QueryByAttribute, QueryExpression,
};
use tracing::{debug, instrument};

use crate::catalog::{AttributeType, EntityDef, MetadataLookup};
use crate::error::Error;
use crate::storage::{self, EntityStore};

use super::compare::{compare_for_sort, Key};
use super::context::ExecutionContext;
use super::filter::{CompiledFilter, FilterScope};
use super::join::{resolve_links, LinkPlanner};
use super::paging::apply_paging;
use super::projection::Projector;

/// Query executor that runs queries against an entity store.
pub struct QueryExecutor<'a> {
    store: &'a dyn EntityStore,
    metadata: &'a dyn MetadataLookup,
}

/// An ordering key resolved against metadata.
#[derive(Debug, Clone)]
struct CompiledOrder {
    column: String,
    attribute_type: Option<AttributeType>,
    descending: bool,
}

impl<'a> QueryExecutor<'a> {
    /// Create a new executor with store and metadata references.
    pub fn new(store: &'a dyn EntityStore, metadata: &'a dyn MetadataLookup) -> Self {
        Self { store, metadata }
    }

    /// Execute a query.
    #[instrument(skip(self, query, ctx), fields(entity = %query.entity_name))]
    pub fn execute(
        &self,
        query: &QueryExpression,
        ctx: &ExecutionContext,
    ) -> Result<EntityCollection, Error> {
        if query.top_count.is_some() && query.page_info.is_some() {
            return Err(Error::InvalidQuery(
                "top count cannot be combined with paging".into(),
            ));
        }
        ctx.fiscal.validate()?;

        let entity = self
            .metadata
            .entity_metadata(&query.entity_name)
            .ok_or_else(|| Error::UnknownEntityType(query.entity_name.clone()))?;

        let records = storage::snapshot(self.store, &entity);
        debug!(records = records.len(), "loaded root records");

        let mut planner = LinkPlanner::new(self.store, self.metadata, ctx, records.len());
        let links = planner.prepare(&query.link_entities, &entity)?;
        let aliases = planner.into_aliases();

        let criteria =
            CompiledFilter::compile(&query.criteria, FilterScope::root(&entity, &aliases), ctx)?;
        let filter_after_joins = query.criteria.references_aliases();
        let orders = compile_orders(&query.orders, &entity, &aliases, ctx)?;
        let projector = Projector::new(
            self.store,
            self.metadata,
            &entity,
            &aliases,
            &query.column_set,
            ctx.strict,
        )?;

        let mut rows = Vec::new();
        for record in records {
            if !filter_after_joins && !criteria.evaluate(&record, ctx)? {
                continue;
            }
            for row in resolve_links(&links, record.clone(), &record)? {
                if filter_after_joins && !criteria.evaluate(&row, ctx)? {
                    continue;
                }
                rows.push(row);
            }
        }
        debug!(rows = rows.len(), links = links.len(), "filtered and joined");

        sort_rows(&mut rows, &orders, ctx)?;

        let mut rows: Vec<Entity> = rows.iter().map(|row| projector.project(row)).collect();
        if query.distinct {
            rows = distinct_rows(rows)?;
        }
        let total = rows.len();

        let mut result = EntityCollection::new(entity.logical_name.clone());
        if let Some(top_count) = query.top_count {
            rows.truncate(top_count as usize);
            result.entities = rows;
        } else if let Some(paging) = &query.page_info {
            let page = apply_paging(rows, paging)?;
            result.entities = page.rows;
            result.more_records = page.more_records;
            result.paging_cookie = page.paging_cookie;
        } else {
            result.entities = rows;
        }

        if query.return_total_record_count {
            result.total_record_count = Some(total);
        }

        debug!(
            returned = result.entities.len(),
            total,
            more_records = result.more_records,
            "query complete"
        );
        Ok(result)
    }

    /// Execute a query by attribute.
    pub fn execute_by_attribute(
        &self,
        query: &QueryByAttribute,
        ctx: &ExecutionContext,
    ) -> Result<EntityCollection, Error> {
        let query = query.to_query_expression()?;
        self.execute(&query, ctx)
    }
}

/// Resolve ordering keys to row columns.
fn compile_orders(
    orders: &[OrderExpression],
    entity: &EntityDef,
    aliases: &BTreeMap<String, EntityDef>,
    ctx: &ExecutionContext,
) -> Result<Vec<CompiledOrder>, Error> {
    orders
        .iter()
        .map(|order| {
            let attribute = order.attribute_name.to_lowercase();
            let (column, owner) = match &order.entity_alias {
                None => (attribute.clone(), entity),
                Some(alias) => match aliases.get(alias) {
                    Some(owner) => (format!("{alias}.{attribute}"), owner),
                    None => {
                        return Err(Error::InvalidQuery(format!(
                            "order on '{attribute}' names unknown link alias '{alias}'"
                        )))
                    }
                },
            };

            let attribute_type = owner.attribute_type(&attribute);
            if attribute_type.is_none() && ctx.strict {
                return Err(Error::unknown_attribute(&owner.logical_name, &attribute));
            }

            Ok(CompiledOrder {
                column,
                attribute_type,
                descending: order.order_type == OrderType::Descending,
            })
        })
        .collect()
}

/// Sort rows according to order specifications.
///
/// The sort is stable, so rows equal on every key keep their store order.
fn sort_rows(
    rows: &mut Vec<Entity>,
    orders: &[CompiledOrder],
    ctx: &ExecutionContext,
) -> Result<(), Error> {
    if orders.is_empty() {
        return Ok(());
    }

    let mut keyed = Vec::with_capacity(rows.len());
    for row in rows.drain(..) {
        let keys = orders
            .iter()
            .map(|order| match row.get(&order.column) {
                Some(value) => Key::from_record(value, order.attribute_type, &order.column),
                None => Ok(None),
            })
            .collect::<Result<Vec<_>, _>>()?;
        keyed.push((keys, row));
    }

    keyed.sort_by(|(a, _), (b, _)| {
        for (order, (a_key, b_key)) in orders.iter().zip(a.iter().zip(b)) {
            let cmp = compare_for_sort(a_key.as_ref(), b_key.as_ref(), ctx.case_sensitive);
            let cmp = if order.descending { cmp.reverse() } else { cmp };
            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        Ordering::Equal
    });

    rows.extend(keyed.into_iter().map(|(_, row)| row));
    Ok(())
}

/// Drop rows identical to an earlier row.
fn distinct_rows(rows: Vec<Entity>) -> Result<Vec<Entity>, Error> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(rows.len());
    for row in rows {
        let fingerprint = serde_json::to_string(&row).map_err(crmdb_proto::Error::from)?;
        if seen.insert(fingerprint) {
            unique.push(row);
        }
    }
    Ok(unique)
}
