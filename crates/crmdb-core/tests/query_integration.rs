//! Integration tests for the query engine.

use chrono::{DateTime, TimeZone, Utc};
use crmdb_core::catalog::{AttributeDef, AttributeType, Catalog, EntityDef, SchemaBundle};
use crmdb_core::query::{ExecutionContext, FiscalPeriodTemplate, FiscalSettings, QueryExecutor};
use crmdb_core::storage::MemoryStore;
use crmdb_core::Error;
use crmdb_proto::{
    ColumnSet, ConditionExpression, ConditionOperator, Entity, EntityCollection, EntityReference,
    FilterExpression, JoinOperator, LinkEntity, OptionSetValue, OptionSetValueCollection,
    OrderExpression, PagingInfo, QueryByAttribute, QueryExpression, Value,
};
use uuid::Uuid;

struct TestContext {
    store: MemoryStore,
    catalog: Catalog,
}

impl TestContext {
    fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            catalog: Catalog::with_schema(crm_schema()),
        }
    }

    fn executor(&self) -> QueryExecutor<'_> {
        QueryExecutor::new(&self.store, &self.catalog)
    }

    fn run(&self, query: &QueryExpression) -> EntityCollection {
        self.executor()
            .execute(query, &ExecutionContext::new())
            .unwrap()
    }

    fn insert(&self, entity: Entity) -> Entity {
        self.store.insert(entity.clone());
        entity
    }
}

fn crm_schema() -> SchemaBundle {
    let account = EntityDef::new("account", "accountid")
        .with_primary_name("name")
        .with("revenue", AttributeType::Money)
        .with("createdon", AttributeType::DateTime)
        .with_attribute(AttributeDef::lookup("parentaccountid", ["account"]))
        .with_attribute(
            AttributeDef::new("industrycode", AttributeType::Picklist)
                .with_option(1, "Accounting")
                .with_option(2, "Consulting"),
        )
        .with_attribute(
            AttributeDef::new("categories", AttributeType::MultiSelectPicklist)
                .with_option(1, "Preferred")
                .with_option(2, "Standard")
                .with_option(3, "Wholesale"),
        );

    let contact = EntityDef::new("contact", "contactid")
        .with_primary_name("fullname")
        .with("firstname", AttributeType::String)
        .with("lastname", AttributeType::String)
        .with("age", AttributeType::Integer)
        .with_attribute(AttributeDef::lookup("parentcustomerid", ["account"]))
        .with_attribute(AttributeDef::new("ownerid", AttributeType::Owner));

    SchemaBundle::new(1).with_entity(account).with_entity(contact)
}

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
}

fn account(name: &str) -> Entity {
    Entity::with_new_id("account").with_attribute("name", name)
}

fn contact(first: &str, last: &str) -> Entity {
    Entity::with_new_id("contact")
        .with_attribute("firstname", first)
        .with_attribute("lastname", last)
}

fn column(result: &EntityCollection, name: &str) -> Vec<String> {
    result
        .iter()
        .map(|e| e.get(name).map(|v| v.to_string()).unwrap_or_default())
        .collect()
}

// ============== Tests ==============

#[test]
fn test_multi_select_set_equality() {
    let ctx = TestContext::new();
    ctx.insert(
        account("Contoso")
            .with_attribute("categories", OptionSetValueCollection::from_codes([1, 2, 3])),
    );

    let exact = QueryExpression::new("account").with_condition(ConditionExpression::new(
        "categories",
        ConditionOperator::Equal,
        [2, 1, 3],
    ));
    let subset = QueryExpression::new("account").with_condition(ConditionExpression::new(
        "categories",
        ConditionOperator::Equal,
        [1, 2],
    ));

    assert_eq!(ctx.run(&exact).len(), 1);
    assert_eq!(ctx.run(&subset).len(), 0);
}

#[test]
fn test_equal_is_or_over_values() {
    let ctx = TestContext::new();
    ctx.insert(account("Test"));
    ctx.insert(account("Something"));

    let query = QueryExpression::new("account")
        .with_columns(ColumnSet::new(["name"]))
        .with_condition(ConditionExpression::new(
            "name",
            ConditionOperator::Equal,
            ["Test", "Other"],
        ));

    assert_eq!(column(&ctx.run(&query), "name"), vec!["Test"]);
}

#[test]
fn test_missing_attribute_only_matches_null() {
    let ctx = TestContext::new();
    ctx.insert(contact("Ada", "Lovelace"));

    let greater = QueryExpression::new("contact").with_condition(ConditionExpression::new(
        "age",
        ConditionOperator::GreaterThan,
        [5],
    ));
    let less_or_equal = QueryExpression::new("contact").with_condition(ConditionExpression::new(
        "age",
        ConditionOperator::LessEqual,
        [5],
    ));
    let null = QueryExpression::new("contact")
        .with_condition(ConditionExpression::unary("age", ConditionOperator::Null));

    assert_eq!(ctx.run(&greater).len(), 0);
    assert_eq!(ctx.run(&less_or_equal).len(), 0);
    assert_eq!(ctx.run(&null).len(), 1);
}

#[test]
fn test_today_follows_the_clock() {
    let ctx = TestContext::new();
    ctx.insert(account("Contoso").with_attribute("createdon", at(2024, 5, 1)));

    let query = QueryExpression::new("account")
        .with_condition(ConditionExpression::unary("createdon", ConditionOperator::Today));
    let executor = ctx.executor();

    let same_day = ExecutionContext::new().at(at(2024, 5, 1));
    let next_day = ExecutionContext::new().at(at(2024, 5, 2));
    assert_eq!(executor.execute(&query, &same_day).unwrap().len(), 1);
    assert_eq!(executor.execute(&query, &next_day).unwrap().len(), 0);
}

#[test]
fn test_primary_key_always_projected() {
    let ctx = TestContext::new();
    let contoso = ctx.insert(account("Contoso").with_attribute("industrycode", OptionSetValue(1)));

    let query = QueryExpression::new("account").with_columns(ColumnSet::new(["name"]));
    let result = ctx.run(&query);

    let row = &result.entities[0];
    assert_eq!(row.get("name"), Some(&Value::from("Contoso")));
    assert_eq!(row.get("accountid"), Some(&Value::Guid(contoso.id)));
    assert!(!row.contains("industrycode"));
}

#[test]
fn test_outer_join_keeps_unmatched_inner_drops() {
    let ctx = TestContext::new();
    let parent = ctx.insert(account("Parent"));
    ctx.insert(account("R1").with_attribute("parentaccountid", parent.to_reference()));
    ctx.insert(account("R2"));

    let link = |op| {
        LinkEntity::new("account", "account", "parentaccountid", "accountid", op)
            .with_alias("p")
            .with_columns(ColumnSet::new(["name"]))
    };
    let query = |op| {
        QueryExpression::new("account")
            .with_columns(ColumnSet::new(["name"]))
            .with_condition(ConditionExpression::new(
                "name",
                ConditionOperator::In,
                ["R1", "R2"],
            ))
            .with_link_entity(link(op))
            .with_order(OrderExpression::asc("name"))
    };

    let inner = ctx.run(&query(JoinOperator::Inner));
    assert_eq!(column(&inner, "name"), vec!["R1"]);
    assert_eq!(column(&inner, "p.name"), vec!["Parent"]);

    let outer = ctx.run(&query(JoinOperator::LeftOuter));
    assert_eq!(column(&outer, "name"), vec!["R1", "R2"]);
    assert!(outer.entities[0].contains("p.name"));
    assert!(!outer.entities[1].contains("p.name"));
}

#[test]
fn test_multi_key_ordering_is_stable() {
    let ctx = TestContext::new();
    for (first, last) in [
        ("Ada", "Smith"),
        ("Zoe", "Brown"),
        ("Max", "Smith"),
        ("Bea", "Brown"),
        ("Max", "Smith"),
    ] {
        ctx.insert(contact(first, last));
    }

    let query = QueryExpression::new("contact")
        .with_columns(ColumnSet::new(["firstname", "lastname"]))
        .with_order(OrderExpression::asc("lastname"))
        .with_order(OrderExpression::desc("firstname"));

    let first = ctx.run(&query);
    assert_eq!(column(&first, "firstname"), vec!["Zoe", "Bea", "Max", "Max", "Ada"]);

    // Idempotent: the same query over the same data yields the same ids
    let second = ctx.run(&query);
    let ids = |r: &EntityCollection| r.iter().map(|e| e.id).collect::<Vec<_>>();
    assert_eq!(ids(&first), ids(&second));
}

#[test]
fn test_paging_more_records_and_total() {
    let ctx = TestContext::new();
    ctx.insert(account("A"));
    ctx.insert(account("B"));

    let page = |n| {
        QueryExpression::new("account")
            .with_columns(ColumnSet::new(["name"]))
            .with_order(OrderExpression::asc("name"))
            .with_paging(PagingInfo::new(n, 1))
            .with_total_record_count()
    };

    let first = ctx.run(&page(1));
    assert_eq!(column(&first, "name"), vec!["A"]);
    assert!(first.more_records);
    assert_eq!(first.total_record_count, Some(2));

    let second = ctx.run(&page(2));
    assert_eq!(column(&second, "name"), vec!["B"]);
    assert!(!second.more_records);
    assert_eq!(second.total_record_count, Some(2));
}

#[test]
fn test_paging_cookie_round_trip() {
    let ctx = TestContext::new();
    for name in ["A", "B", "C"] {
        ctx.insert(account(name));
    }

    let base = QueryExpression::new("account")
        .with_columns(ColumnSet::new(["name"]))
        .with_order(OrderExpression::asc("name"));
    let paging = PagingInfo::new(1, 2);

    let first = ctx.run(&base.clone().with_paging(paging.clone()));
    let next = paging.next_page(&first).unwrap();
    assert_eq!(next.page_number, 2);
    assert!(next.paging_cookie.is_some());

    let second = ctx.run(&base.clone().with_paging(next.clone()));
    assert_eq!(column(&second, "name"), vec!["C"]);
    assert!(next.next_page(&second).is_none());

    let bad = base.with_paging(PagingInfo::new(2, 2).with_cookie("not-a-cookie"));
    let err = ctx
        .executor()
        .execute(&bad, &ExecutionContext::new())
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPagingCookie(_)));
}

#[test]
fn test_fiscal_period_operator_out_of_range() {
    let ctx = TestContext::new();
    ctx.insert(account("Contoso").with_attribute("createdon", at(2024, 2, 1)));

    let settings = FiscalSettings::new(1, 1, FiscalPeriodTemplate::Quarterly);
    let exec = ExecutionContext::new()
        .at(at(2024, 3, 1))
        .with_fiscal_settings(settings);

    let in_q1 = QueryExpression::new("account").with_condition(ConditionExpression::new(
        "createdon",
        ConditionOperator::InFiscalPeriodAndYear,
        [1, 2024],
    ));
    assert_eq!(ctx.executor().execute(&in_q1, &exec).unwrap().len(), 1);

    let bad = QueryExpression::new("account").with_condition(ConditionExpression::new(
        "createdon",
        ConditionOperator::InFiscalPeriod,
        [5],
    ));
    let err = ctx.executor().execute(&bad, &exec).unwrap_err();
    assert!(matches!(err, Error::InvalidFiscalPeriod { period: 5, periods: 4 }));
}

#[test]
fn test_strict_validation() {
    let ctx = TestContext::new();
    ctx.insert(account("Contoso"));
    let strict = ExecutionContext::new().with_strict(true);

    let filter = QueryExpression::new("account")
        .with_condition(ConditionExpression::eq("nickname", "x"));
    let columns = QueryExpression::new("account").with_columns(ColumnSet::new(["nickname"]));

    // Non-strict: unknown filter attribute never matches, unknown column is absent
    assert_eq!(ctx.run(&filter).len(), 0);
    assert_eq!(ctx.run(&columns).len(), 1);

    for query in [filter, columns] {
        let err = ctx.executor().execute(&query, &strict).unwrap_err();
        match err {
            Error::UnknownAttribute { entity, attribute } => {
                assert_eq!(entity, "account");
                assert_eq!(attribute, "nickname");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

#[test]
fn test_unknown_entity_type() {
    let ctx = TestContext::new();
    let err = ctx
        .executor()
        .execute(&QueryExpression::new("opportunity"), &ExecutionContext::new())
        .unwrap_err();
    assert!(matches!(err, Error::UnknownEntityType(_)));
}

#[test]
fn test_reference_names_and_labels_in_results() {
    let ctx = TestContext::new();
    let parent = ctx.insert(account("Contoso Holdings"));
    ctx.insert(
        account("Contoso")
            .with_attribute(
                "parentaccountid",
                EntityReference::new("account", parent.id).with_name("Old Name"),
            )
            .with_attribute("industrycode", OptionSetValue(2)),
    );

    let query = QueryExpression::new("account")
        .with_columns(ColumnSet::all())
        .with_condition(ConditionExpression::eq("name", "Contoso"));
    let result = ctx.run(&query);

    let row = &result.entities[0];
    let reference = row.get("parentaccountid").and_then(Value::as_reference).unwrap();
    assert_eq!(reference.name.as_deref(), Some("Contoso Holdings"));
    assert_eq!(row.formatted_value("industrycode"), Some("Consulting"));
}

#[test]
fn test_link_criteria_and_alias_order() {
    let ctx = TestContext::new();
    let contoso = ctx.insert(account("Contoso"));
    let fabrikam = ctx.insert(account("Fabrikam"));
    let northwind = ctx.insert(account("Northwind"));
    ctx.insert(contact("Zed", "Shaw").with_attribute("parentcustomerid", northwind.to_reference()));
    ctx.insert(contact("Ada", "Lovelace").with_attribute("parentcustomerid", fabrikam.to_reference()));
    ctx.insert(contact("Alan", "Turing").with_attribute("parentcustomerid", contoso.to_reference()));
    ctx.insert(contact("Grace", "Hopper"));

    let query = QueryExpression::new("contact")
        .with_columns(ColumnSet::new(["firstname"]))
        .with_link_entity(
            LinkEntity::new(
                "contact",
                "account",
                "parentcustomerid",
                "accountid",
                JoinOperator::Inner,
            )
            .with_alias("company")
            .with_columns(ColumnSet::new(["name"]))
            .with_criteria(FilterExpression::or().with_condition(ConditionExpression::new(
                "name",
                ConditionOperator::Like,
                ["%o%"],
            ))),
        )
        .with_order(OrderExpression::asc("name").with_alias("company"));

    let result = ctx.run(&query);
    // Fabrikam fails the link criteria; Grace has no company
    assert_eq!(column(&result, "firstname"), vec!["Alan", "Zed"]);
    assert_eq!(column(&result, "company.name"), vec!["Contoso", "Northwind"]);
}

#[test]
fn test_user_operator_uses_caller() {
    let ctx = TestContext::new();
    let me = Uuid::new_v4();
    ctx.insert(contact("Mine", "A").with_attribute("ownerid", EntityReference::new("systemuser", me)));
    ctx.insert(
        contact("Theirs", "B")
            .with_attribute("ownerid", EntityReference::new("systemuser", Uuid::new_v4())),
    );

    let query = QueryExpression::new("contact")
        .with_columns(ColumnSet::new(["firstname"]))
        .with_condition(ConditionExpression::unary("ownerid", ConditionOperator::EqualUserId));
    let result = ctx
        .executor()
        .execute(&query, &ExecutionContext::new().with_caller(me))
        .unwrap();

    assert_eq!(column(&result, "firstname"), vec!["Mine"]);
}

#[test]
fn test_query_by_attribute() {
    let ctx = TestContext::new();
    ctx.insert(contact("Ada", "Smith").with_attribute("age", 36));
    ctx.insert(contact("Bob", "Smith").with_attribute("age", 40));

    let query = QueryByAttribute::new("contact")
        .with_attribute("lastname", "Smith")
        .with_attribute("age", 36)
        .with_columns(ColumnSet::new(["firstname"]));
    let result = ctx
        .executor()
        .execute_by_attribute(&query, &ExecutionContext::new())
        .unwrap();

    assert_eq!(column(&result, "firstname"), vec!["Ada"]);
}

#[test]
fn test_results_do_not_alias_the_store() {
    let ctx = TestContext::new();
    ctx.insert(account("Contoso").with_attribute("categories", OptionSetValueCollection::from_codes([1])));

    let query = QueryExpression::new("account").with_columns(ColumnSet::all());
    let mut result = ctx.run(&query);
    result.entities[0].set("name", "Changed");

    let again = ctx.run(&query);
    assert_eq!(again.entities[0].get("name"), Some(&Value::from("Contoso")));
}

#[test]
fn test_query_with_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let ctx = TestContext::new();
    ctx.insert(account("Contoso"));
    assert_eq!(ctx.run(&QueryExpression::new("account")).len(), 1);
}
