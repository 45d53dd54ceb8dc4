//! Link-entity resolution.
//!
//! Each [`LinkEntity`] of a query is prepared once into a [`PreparedLink`]:
//! its alias is settled, its criteria compiled, and the joined entity's
//! records loaded and filtered. Rows are then expanded link by link:
//! - Inner joins drop rows that have no match
//! - Left outer joins keep them without adding any aliased columns
//! - A row with several matches is repeated once per match

use std::collections::{BTreeMap, HashMap};

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use crmdb_proto::{AliasedValue, ColumnSet, Entity, JoinOperator, LinkEntity, Value};
use tracing::trace;
use uuid::Uuid;

use crate::catalog::{EntityDef, MetadataLookup};
use crate::error::Error;
use crate::storage::{self, EntityStore};

use super::compare::Key;
use super::context::ExecutionContext;
use super::filter::{CompiledFilter, FilterScope};

/// Join strategy selection for link resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStrategy {
    /// Nested loop join - O(N*M), best for small datasets.
    NestedLoop,
    /// Hash join - O(N+M), best for larger datasets.
    HashJoin,
}

impl JoinStrategy {
    /// Select the join strategy based on row counts.
    ///
    /// Uses hash join when:
    /// - More than 100 parent rows, OR
    /// - More than 1000 joined records
    ///
    /// Otherwise uses nested loop for lower overhead on small sets.
    pub fn select(parent_count: usize, child_count: usize) -> Self {
        if parent_count > 100 || child_count > 1000 {
            JoinStrategy::HashJoin
        } else {
            JoinStrategy::NestedLoop
        }
    }
}

/// Hashable form of a join attribute value.
///
/// Join keys compare exactly: references and identifiers by id, numbers by
/// value, and text byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum JoinKey {
    Bool(bool),
    Number(BigDecimal),
    Text(String),
    Date(DateTime<Utc>),
    Guid(Uuid),
    Bytes(Vec<u8>),
}

impl JoinKey {
    fn read(record: &Entity, attribute: &str) -> Result<Option<Self>, Error> {
        let key = match record.get(attribute) {
            Some(value) => Key::from_value(value, attribute)?,
            None => None,
        };
        Ok(key.and_then(|key| match key {
            Key::Bool(b) => Some(JoinKey::Bool(b)),
            Key::Number(n) => Some(JoinKey::Number(n.normalized())),
            Key::Text(s) => Some(JoinKey::Text(s)),
            Key::Date(dt) => Some(JoinKey::Date(dt)),
            Key::Guid(id) => Some(JoinKey::Guid(id)),
            Key::Bytes(b) => Some(JoinKey::Bytes(b)),
            // Multi-select values never join
            Key::Set(_) => None,
        }))
    }
}

/// A link entity ready to expand rows.
#[derive(Debug)]
pub struct PreparedLink {
    alias: String,
    entity: EntityDef,
    link_from_attribute: String,
    link_to_attribute: String,
    join_operator: JoinOperator,
    columns: ColumnSet,
    strategy: JoinStrategy,
    /// Joined records that passed the link criteria.
    candidates: Vec<Entity>,
    /// Candidate positions by join key, filled for hash joins.
    index: HashMap<JoinKey, Vec<usize>>,
    children: Vec<PreparedLink>,
}

/// Prepares the link tree of a query.
pub struct LinkPlanner<'a> {
    store: &'a dyn EntityStore,
    metadata: &'a dyn MetadataLookup,
    ctx: &'a ExecutionContext,
    parent_count: usize,
    /// Every alias in the tree, with its entity.
    aliases: BTreeMap<String, EntityDef>,
    /// Depth-first position of the last prepared link.
    position: usize,
}

impl<'a> LinkPlanner<'a> {
    /// Create a planner. `parent_count` sizes the join strategy.
    pub fn new(
        store: &'a dyn EntityStore,
        metadata: &'a dyn MetadataLookup,
        ctx: &'a ExecutionContext,
        parent_count: usize,
    ) -> Self {
        Self {
            store,
            metadata,
            ctx,
            parent_count,
            aliases: BTreeMap::new(),
            position: 0,
        }
    }

    /// Prepare links hanging off `parent`.
    ///
    /// A link without an alias is named `<entity><n>`, where `n` is its
    /// 1-based depth-first position in the tree.
    pub fn prepare(
        &mut self,
        links: &[LinkEntity],
        parent: &EntityDef,
    ) -> Result<Vec<PreparedLink>, Error> {
        links.iter().map(|link| self.prepare_one(link, parent)).collect()
    }

    /// Every alias seen so far, with its entity definition.
    pub fn aliases(&self) -> &BTreeMap<String, EntityDef> {
        &self.aliases
    }

    /// Consume the planner, keeping the alias map.
    pub fn into_aliases(self) -> BTreeMap<String, EntityDef> {
        self.aliases
    }

    fn prepare_one(&mut self, link: &LinkEntity, parent: &EntityDef) -> Result<PreparedLink, Error> {
        self.position += 1;
        let alias = match &link.entity_alias {
            Some(alias) => alias.clone(),
            None => format!("{}{}", link.link_to_entity_name, self.position),
        };
        if self.aliases.contains_key(&alias) {
            return Err(Error::InvalidQuery(format!("duplicate link alias '{alias}'")));
        }

        if !link
            .link_from_entity_name
            .eq_ignore_ascii_case(&parent.logical_name)
        {
            return Err(Error::InvalidQuery(format!(
                "link '{alias}' starts from '{}' but is attached to '{}'",
                link.link_from_entity_name, parent.logical_name
            )));
        }

        let entity = self
            .metadata
            .entity_metadata(&link.link_to_entity_name)
            .ok_or_else(|| Error::UnknownEntityType(link.link_to_entity_name.clone()))?;

        if self.ctx.strict {
            check_attribute(parent, &link.link_from_attribute_name)?;
            check_attribute(&entity, &link.link_to_attribute_name)?;
            if let ColumnSet::Columns(columns) = &link.columns {
                for column in columns {
                    check_attribute(&entity, column)?;
                }
            }
        }

        let criteria =
            CompiledFilter::compile(&link.link_criteria, FilterScope::link(&entity, &alias), self.ctx)?;

        self.aliases.insert(alias.clone(), entity.clone());

        let mut candidates = Vec::new();
        for record in storage::snapshot(self.store, &entity) {
            if criteria.evaluate(&record, self.ctx)? {
                candidates.push(record);
            }
        }

        let link_to_attribute = link.link_to_attribute_name.to_lowercase();
        let strategy = JoinStrategy::select(self.parent_count, candidates.len());
        let mut index: HashMap<JoinKey, Vec<usize>> = HashMap::new();
        if strategy == JoinStrategy::HashJoin {
            for (position, record) in candidates.iter().enumerate() {
                if let Some(key) = JoinKey::read(record, &link_to_attribute)? {
                    index.entry(key).or_default().push(position);
                }
            }
        }

        trace!(
            alias = %alias,
            entity = %entity.logical_name,
            candidates = candidates.len(),
            strategy = ?strategy,
            "prepared link"
        );

        let children = self.prepare(&link.link_entities, &entity)?;

        Ok(PreparedLink {
            alias,
            entity,
            link_from_attribute: link.link_from_attribute_name.to_lowercase(),
            link_to_attribute,
            join_operator: link.join_operator,
            columns: link.columns.clone(),
            strategy,
            candidates,
            index,
            children,
        })
    }
}

fn check_attribute(entity: &EntityDef, attribute: &str) -> Result<(), Error> {
    if entity.has_attribute(attribute) {
        Ok(())
    } else {
        Err(Error::unknown_attribute(&entity.logical_name, attribute))
    }
}

impl PreparedLink {
    /// Alias the joined columns are merged under.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Definition of the joined entity.
    pub fn entity(&self) -> &EntityDef {
        &self.entity
    }

    /// Nested links.
    pub fn children(&self) -> &[PreparedLink] {
        &self.children
    }

    /// Joined records matching `source`'s from-attribute.
    fn matches(&self, source: &Entity) -> Result<Vec<&Entity>, Error> {
        let key = match JoinKey::read(source, &self.link_from_attribute)? {
            Some(key) => key,
            None => return Ok(Vec::new()),
        };

        match self.strategy {
            JoinStrategy::HashJoin => Ok(self
                .index
                .get(&key)
                .map(|positions| positions.iter().map(|&p| &self.candidates[p]).collect())
                .unwrap_or_default()),
            JoinStrategy::NestedLoop => {
                let mut matched = Vec::new();
                for candidate in &self.candidates {
                    if JoinKey::read(candidate, &self.link_to_attribute)?.as_ref() == Some(&key) {
                        matched.push(candidate);
                    }
                }
                Ok(matched)
            }
        }
    }

    /// Merge a joined record's requested columns into a row.
    ///
    /// Columns are keyed `<alias>.<attribute>` with this link's own alias;
    /// a nested link's alias does not compose with its parent's.
    fn merge(&self, row: &mut Entity, joined: &Entity) {
        match &self.columns {
            ColumnSet::AllColumns => {
                for (name, value) in &joined.attributes {
                    if let Some(attribute) = self.own_key(name) {
                        row.attributes
                            .insert(format!("{}.{attribute}", self.alias), self.aliased(attribute, value));
                    }
                }
                for (name, formatted) in &joined.formatted_values {
                    if let Some(attribute) = self.own_key(name) {
                        row.formatted_values
                            .insert(format!("{}.{attribute}", self.alias), formatted.clone());
                    }
                }
            }
            ColumnSet::Columns(columns) => {
                for column in columns {
                    let key = format!("{}.{column}", self.alias);
                    if let Some(value) = joined.get(column) {
                        row.attributes.insert(key.clone(), self.aliased(column, value));
                    }
                    if let Some(formatted) = joined.formatted_value(column) {
                        row.formatted_values.insert(key, formatted.to_string());
                    }
                }
            }
        }
    }

    /// Attribute name of a joined-record key, unless it belongs to another alias.
    fn own_key<'k>(&self, name: &'k str) -> Option<&'k str> {
        match name.split_once('.') {
            None => Some(name),
            Some((prefix, attribute)) if prefix == self.alias => Some(attribute),
            Some(_) => None,
        }
    }

    fn aliased(&self, attribute: &str, value: &Value) -> Value {
        Value::Aliased(Box::new(AliasedValue::new(
            self.entity.logical_name.clone(),
            attribute,
            value.unaliased().clone(),
        )))
    }

    /// Expand one row through this link and its nested links.
    ///
    /// `source` is the record holding the from-attribute: the root record
    /// for top-level links, the parent's joined record for nested ones.
    /// A match whose nested inner links all fail counts as no match, so an
    /// outer link still keeps the row.
    fn expand(&self, row: Entity, source: &Entity) -> Result<Vec<Entity>, Error> {
        let matched = self.matches(source)?;
        if matched.is_empty() {
            return Ok(match self.join_operator {
                JoinOperator::Inner => Vec::new(),
                JoinOperator::LeftOuter => vec![row],
            });
        }

        let mut rows = Vec::with_capacity(matched.len());
        for joined in matched {
            let mut merged = row.clone();
            self.merge(&mut merged, joined);
            rows.extend(resolve_links(&self.children, merged, joined)?);
        }
        if rows.is_empty() && self.join_operator == JoinOperator::LeftOuter {
            rows.push(row);
        }
        Ok(rows)
    }
}

/// Expand a row through a set of sibling links.
///
/// Siblings combine as a cartesian product: every match of the first link
/// is expanded through the second, and so on.
pub fn resolve_links(
    links: &[PreparedLink],
    row: Entity,
    source: &Entity,
) -> Result<Vec<Entity>, Error> {
    let mut rows = vec![row];
    for link in links {
        let mut expanded = Vec::with_capacity(rows.len());
        for row in rows {
            expanded.extend(link.expand(row, source)?);
        }
        rows = expanded;
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AttributeDef, AttributeType, SchemaBundle};
    use crate::storage::MemoryStore;
    use crmdb_proto::{ConditionExpression, EntityReference, FilterExpression};

    fn schema() -> SchemaBundle {
        SchemaBundle::new(1)
            .with_entity(
                EntityDef::new("account", "accountid")
                    .with_primary_name("name")
                    .with_attribute(AttributeDef::lookup("primarycontactid", ["contact"])),
            )
            .with_entity(
                EntityDef::new("contact", "contactid")
                    .with_primary_name("fullname")
                    .with_attribute(AttributeDef::lookup("parentcustomerid", ["account"]))
                    .with("city", AttributeType::String),
            )
    }

    struct Fixture {
        store: MemoryStore,
        schema: SchemaBundle,
        contoso: Entity,
        fabrikam: Entity,
    }

    fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let contoso = Entity::with_new_id("account").with_attribute("name", "Contoso");
        let fabrikam = Entity::with_new_id("account").with_attribute("name", "Fabrikam");

        let contact = |name: &str, city: &str, parent: &Entity| {
            Entity::with_new_id("contact")
                .with_attribute("fullname", name)
                .with_attribute("city", city)
                .with_attribute("parentcustomerid", parent.to_reference())
        };
        store.insert_all([
            contoso.clone(),
            fabrikam.clone(),
            contact("Ada", "London", &contoso),
            contact("Grace", "Paris", &contoso),
        ]);

        Fixture {
            store,
            schema: schema(),
            contoso,
            fabrikam,
        }
    }

    fn expand(f: &Fixture, link: LinkEntity, root: &Entity) -> Result<Vec<Entity>, Error> {
        let ctx = ExecutionContext::new();
        let account = f.schema.get_entity("account").cloned().unwrap();
        let mut planner = LinkPlanner::new(&f.store, &f.schema, &ctx, 1);
        let links = planner.prepare(&[link], &account)?;
        let mut root = root.clone();
        root.set("accountid", root.id);
        resolve_links(&links, root.clone(), &root)
    }

    fn contacts_link(op: JoinOperator) -> LinkEntity {
        LinkEntity::new("account", "contact", "accountid", "parentcustomerid", op)
            .with_alias("c")
            .with_columns(ColumnSet::new(["fullname"]))
    }

    #[test]
    fn test_join_strategy_selection() {
        assert_eq!(JoinStrategy::select(10, 10), JoinStrategy::NestedLoop);
        assert_eq!(JoinStrategy::select(101, 10), JoinStrategy::HashJoin);
        assert_eq!(JoinStrategy::select(10, 1001), JoinStrategy::HashJoin);
    }

    #[test]
    fn test_inner_join_repeats_row_per_match() {
        let f = fixture();
        let rows = expand(&f, contacts_link(JoinOperator::Inner), &f.contoso).unwrap();

        assert_eq!(rows.len(), 2);
        let mut names: Vec<String> = rows
            .iter()
            .map(|r| r.get("c.fullname").unwrap().unaliased().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["Ada", "Grace"]);
        assert!(matches!(rows[0].get("c.fullname"), Some(Value::Aliased(_))));
        assert!(!rows[0].contains("c.city"));
    }

    #[test]
    fn test_inner_join_drops_unmatched() {
        let f = fixture();
        let rows = expand(&f, contacts_link(JoinOperator::Inner), &f.fabrikam).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_outer_join_keeps_unmatched_without_columns() {
        let f = fixture();
        let rows = expand(&f, contacts_link(JoinOperator::LeftOuter), &f.fabrikam).unwrap();

        assert_eq!(rows.len(), 1);
        assert!(rows[0].attributes.keys().all(|k| !k.starts_with("c.")));
    }

    #[test]
    fn test_outer_join_keeps_row_when_nested_inner_fails() {
        let f = fixture();
        let orphan = Entity::with_new_id("contact")
            .with_attribute("fullname", "Orphan")
            .with_attribute("parentcustomerid", EntityReference::new("account", Uuid::new_v4()));
        let northwind = Entity::with_new_id("account")
            .with_attribute("name", "Northwind")
            .with_attribute("primarycontactid", orphan.to_reference());
        f.store.insert_all([orphan, northwind.clone()]);

        let parent = LinkEntity::new(
            "contact",
            "account",
            "parentcustomerid",
            "accountid",
            JoinOperator::Inner,
        )
        .with_alias("pa")
        .with_columns(ColumnSet::new(["name"]));
        let link = LinkEntity::new(
            "account",
            "contact",
            "primarycontactid",
            "contactid",
            JoinOperator::LeftOuter,
        )
        .with_alias("pc")
        .with_columns(ColumnSet::new(["fullname"]))
        .with_link_entity(parent);
        let rows = expand(&f, link, &northwind).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, northwind.id);
        assert!(rows[0]
            .attributes
            .keys()
            .all(|k| !k.starts_with("pc.") && !k.starts_with("pa.")));
    }

    #[test]
    fn test_link_criteria_filters_before_merge() {
        let f = fixture();
        let link = contacts_link(JoinOperator::Inner).with_criteria(
            FilterExpression::and().with_condition(ConditionExpression::eq("city", "Paris")),
        );
        let rows = expand(&f, link, &f.contoso).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("c.fullname").unwrap().unaliased(), &Value::from("Grace"));
    }

    #[test]
    fn test_all_columns_copies_every_attribute() {
        let f = fixture();
        let link = contacts_link(JoinOperator::Inner)
            .with_columns(ColumnSet::all())
            .with_criteria(
                FilterExpression::and().with_condition(ConditionExpression::eq("city", "London")),
            );
        let rows = expand(&f, link, &f.contoso).unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert!(row.contains("c.fullname"));
        assert!(row.contains("c.city"));
        assert!(row.contains("c.contactid"));
        assert!(row.contains("c.parentcustomerid"));
    }

    #[test]
    fn test_nested_link_joins_against_linked_record() {
        let f = fixture();
        // account -> contact -> account (the contact's parent)
        let link = contacts_link(JoinOperator::Inner).with_link_entity(
            LinkEntity::new(
                "contact",
                "account",
                "parentcustomerid",
                "accountid",
                JoinOperator::Inner,
            )
            .with_columns(ColumnSet::new(["name"])),
        );
        let rows = expand(&f, link, &f.contoso).unwrap();

        assert_eq!(rows.len(), 2);
        for row in &rows {
            // Default alias: second link depth-first
            assert_eq!(row.get("account2.name").unwrap().unaliased(), &Value::from("Contoso"));
        }
    }

    #[test]
    fn test_hash_join_same_results_as_nested_loop() {
        let f = fixture();
        let ctx = ExecutionContext::new();
        let account = f.schema.get_entity("account").cloned().unwrap();
        let mut root = f.contoso.clone();
        root.set("accountid", root.id);

        let mut small = LinkPlanner::new(&f.store, &f.schema, &ctx, 1);
        let nested = small
            .prepare(&[contacts_link(JoinOperator::Inner)], &account)
            .unwrap();
        let mut large = LinkPlanner::new(&f.store, &f.schema, &ctx, 500);
        let hashed = large
            .prepare(&[contacts_link(JoinOperator::Inner)], &account)
            .unwrap();

        assert_eq!(nested[0].strategy, JoinStrategy::NestedLoop);
        assert_eq!(hashed[0].strategy, JoinStrategy::HashJoin);
        assert_eq!(
            resolve_links(&nested, root.clone(), &root).unwrap(),
            resolve_links(&hashed, root.clone(), &root).unwrap()
        );
    }

    #[test]
    fn test_sibling_links_form_cartesian_product() {
        let f = fixture();
        let ctx = ExecutionContext::new();
        let account = f.schema.get_entity("account").cloned().unwrap();
        let mut root = f.contoso.clone();
        root.set("accountid", root.id);

        let mut planner = LinkPlanner::new(&f.store, &f.schema, &ctx, 1);
        let links = planner
            .prepare(
                &[
                    contacts_link(JoinOperator::Inner),
                    contacts_link(JoinOperator::Inner).with_alias("d"),
                ],
                &account,
            )
            .unwrap();

        let rows = resolve_links(&links, root.clone(), &root).unwrap();
        assert_eq!(rows.len(), 4);
    }

    #[test]
    fn test_duplicate_alias_is_rejected() {
        let f = fixture();
        let ctx = ExecutionContext::new();
        let account = f.schema.get_entity("account").cloned().unwrap();
        let mut planner = LinkPlanner::new(&f.store, &f.schema, &ctx, 1);

        let err = planner
            .prepare(
                &[contacts_link(JoinOperator::Inner), contacts_link(JoinOperator::Inner)],
                &account,
            )
            .unwrap_err();
        assert!(matches!(err, Error::InvalidQuery(_)));
    }

    #[test]
    fn test_unknown_link_entity() {
        let f = fixture();
        let link = LinkEntity::new("account", "lead", "accountid", "parentaccountid", JoinOperator::Inner);
        let err = expand(&f, link, &f.contoso).unwrap_err();
        assert!(matches!(err, Error::UnknownEntityType(name) if name == "lead"));
    }

    #[test]
    fn test_strict_link_attribute_check() {
        let f = fixture();
        let ctx = ExecutionContext::new().with_strict(true);
        let account = f.schema.get_entity("account").cloned().unwrap();
        let mut planner = LinkPlanner::new(&f.store, &f.schema, &ctx, 1);

        let link = contacts_link(JoinOperator::Inner).with_columns(ColumnSet::new(["nickname"]));
        let err = planner.prepare(&[link], &account).unwrap_err();
        assert!(matches!(err, Error::UnknownAttribute { .. }));
    }

    #[test]
    fn test_reference_from_attribute_joins_by_id() {
        let f = fixture();
        let ctx = ExecutionContext::new();
        let contact = f.schema.get_entity("contact").cloned().unwrap();
        let mut planner = LinkPlanner::new(&f.store, &f.schema, &ctx, 1);
        let links = planner
            .prepare(
                &[LinkEntity::new(
                    "contact",
                    "account",
                    "parentcustomerid",
                    "accountid",
                    JoinOperator::Inner,
                )
                .with_alias("parent")
                .with_columns(ColumnSet::new(["name"]))],
                &contact,
            )
            .unwrap();

        let root = Entity::with_new_id("contact").with_attribute(
            "parentcustomerid",
            EntityReference::new("account", f.fabrikam.id),
        );
        let rows = resolve_links(&links, root.clone(), &root).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("parent.name").unwrap().unaliased(), &Value::from("Fabrikam"));
    }
}
