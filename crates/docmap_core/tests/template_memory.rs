use docmap_core::mapping::IdentityMarker;
use docmap_core::query::SortOrder;
use docmap_core::{
    Condition, ConnectionPair, DocumentOperations, DocumentTemplate, DriverError, Entity,
    EntityDescriptor, FieldDescriptor, FieldType, MappingError, MemoryDocumentDriver,
    MemorySqlConnection, Query, TemplateError,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

type MemoryTemplate = DocumentTemplate<MemoryDocumentDriver, MemorySqlConnection>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: Option<String>,
    name: String,
    age: i64,
    enabled: bool,
}

static USER: Lazy<EntityDescriptor> = Lazy::new(|| {
    EntityDescriptor::new("User")
        .field(FieldDescriptor::id("id", FieldType::Text))
        .field(FieldDescriptor::new("name", FieldType::Text))
        .field(FieldDescriptor::new("age", FieldType::Integer))
        .field(FieldDescriptor::new("enabled", FieldType::Boolean))
});

impl Entity for User {
    fn descriptor() -> &'static EntityDescriptor {
        &USER
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Counter {
    seq: Option<i64>,
    label: String,
}

static COUNTER: Lazy<EntityDescriptor> = Lazy::new(|| {
    EntityDescriptor::new("Counter")
        .storage_location("/counters")
        .field(FieldDescriptor::document_id("seq", FieldType::Integer))
        .field(FieldDescriptor::new("label", FieldType::Text))
});

impl Entity for Counter {
    fn descriptor() -> &'static EntityDescriptor {
        &COUNTER
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Untracked {
    name: String,
}

static UNTRACKED: Lazy<EntityDescriptor> = Lazy::new(|| {
    EntityDescriptor::new("Untracked").field(FieldDescriptor::new("name", FieldType::Text))
});

impl Entity for Untracked {
    fn descriptor() -> &'static EntityDescriptor {
        &UNTRACKED
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TwoIds {
    a: String,
    b: String,
}

static TWO_IDS: Lazy<EntityDescriptor> = Lazy::new(|| {
    EntityDescriptor::new("TwoIds")
        .field(FieldDescriptor::id("a", FieldType::Text))
        .field(FieldDescriptor::new("b", FieldType::Text).marked(IdentityMarker::DocumentId))
});

impl Entity for TwoIds {
    fn descriptor() -> &'static EntityDescriptor {
        &TWO_IDS
    }
}

fn user(id: Option<&str>, name: &str, age: i64) -> User {
    User {
        id: id.map(str::to_string),
        name: name.to_string(),
        age,
        enabled: false,
    }
}

fn setup() -> (MemoryDocumentDriver, MemoryTemplate) {
    let driver = MemoryDocumentDriver::new();
    let sql = driver.sql_connection();
    let template = DocumentTemplate::new("test", ConnectionPair::new(driver.clone(), Some(sql)));
    template.create_table_for::<User>().unwrap();
    (driver, template)
}

fn assert_all_released(driver: &MemoryDocumentDriver) {
    let stats = driver.stats();
    assert_eq!(stats.open_handles(), 0, "unreleased handles: {stats:?}");
    assert_eq!(stats.flushed, stats.closed);
}

#[test]
fn insert_generates_hex_key_and_stores_under_entity_path() {
    let (driver, template) = setup();

    let inserted = template.insert(&user(None, "a", 30)).unwrap();

    let id = inserted.id.clone().unwrap();
    assert_eq!(id.len(), 32);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(inserted.name, "a");
    assert_eq!(driver.document_count("/test/user").unwrap(), Some(1));

    let loaded: User = template.find_by_id(id.as_str()).unwrap().unwrap();
    assert_eq!(loaded, inserted);
    assert_all_released(&driver);
}

#[test]
fn every_operation_releases_its_handle_exactly_once() {
    let (driver, template) = setup();

    let saved = template.save(&user(Some("u1"), "a", 1)).unwrap();
    template.save_all(&[user(Some("u2"), "b", 2), user(None, "c", 3)]).unwrap();
    template.find_by_id::<User, _>("u1").unwrap();
    template.find_all::<User>().unwrap();
    template.execute::<User>(&Query::new()).unwrap();
    template.remove(&saved).unwrap();
    template.remove_by_id::<User, _>("u2").unwrap();
    template.remove_all::<User>().unwrap();

    let stats = driver.stats();
    assert_eq!(stats.opened, 8);
    assert_eq!(stats.flushed, 8);
    assert_eq!(stats.closed, 8);
}

#[test]
fn empty_batches_open_no_handle() {
    let (driver, template) = setup();

    assert!(template.insert_all::<User>(&[]).unwrap().is_empty());
    assert!(template.save_all::<User>(&[]).unwrap().is_empty());
    template.remove_all_of::<User>(&[]).unwrap();

    assert_eq!(driver.stats().opened, 0);
}

#[test]
fn batch_insert_aborts_on_duplicate_and_still_releases() {
    let (driver, template) = setup();
    template.insert(&user(Some("dup"), "first", 1)).unwrap();

    let err = template
        .insert_all(&[
            user(Some("fresh"), "second", 2),
            user(Some("dup"), "third", 3),
            user(Some("late"), "fourth", 4),
        ])
        .unwrap_err();

    assert!(matches!(
        err,
        TemplateError::Driver(DriverError::DuplicateKey { .. })
    ));
    assert_eq!(driver.document_count("/test/user").unwrap(), Some(2));
    assert_all_released(&driver);
    assert_eq!(driver.stats().opened, 2);
}

#[test]
fn insert_rejects_existing_key_but_save_replaces() {
    let (driver, template) = setup();
    template.insert(&user(Some("k"), "before", 1)).unwrap();

    assert!(template.insert(&user(Some("k"), "again", 2)).is_err());

    template.save(&user(Some("k"), "after", 3)).unwrap();
    let loaded: User = template.find_by_id("k").unwrap().unwrap();
    assert_eq!(loaded.name, "after");
    assert_all_released(&driver);
}

#[test]
fn integer_keys_are_not_generated() {
    let (driver, template) = setup();
    template.create_table_for::<Counter>().unwrap();

    let err = template
        .insert(&Counter {
            seq: None,
            label: "x".to_string(),
        })
        .unwrap_err();
    assert!(matches!(
        err,
        TemplateError::Mapping(MappingError::UnsupportedIdGeneration {
            key_type: FieldType::Integer,
            ..
        })
    ));
    assert_eq!(driver.stats().opened, 0);

    let stored = template
        .insert(&Counter {
            seq: Some(7),
            label: "seven".to_string(),
        })
        .unwrap();
    assert_eq!(stored.seq, Some(7));
    assert_eq!(driver.document_count("/test/counters").unwrap(), Some(1));
    let loaded: Counter = template.find_by_id(7_i64).unwrap().unwrap();
    assert_eq!(loaded, stored);
}

#[test]
fn lookups_check_the_declared_key_type() {
    let (_driver, template) = setup();

    let err = template.find_by_id::<User, _>(5_i64).unwrap_err();
    assert!(matches!(
        err,
        TemplateError::Mapping(MappingError::KeyTypeMismatch { .. })
    ));
}

#[test]
fn identity_errors_surface_before_any_handle_opens() {
    let (driver, template) = setup();
    template.create_table_for::<Untracked>().unwrap();
    template.create_table_for::<TwoIds>().unwrap();

    let missing = template
        .insert(&Untracked {
            name: "x".to_string(),
        })
        .unwrap_err();
    assert!(matches!(
        missing,
        TemplateError::Mapping(MappingError::MissingIdentity { .. })
    ));

    let ambiguous = template
        .insert(&TwoIds {
            a: "1".to_string(),
            b: "2".to_string(),
        })
        .unwrap_err();
    assert!(matches!(
        ambiguous,
        TemplateError::Mapping(MappingError::AmbiguousIdentity { .. })
    ));

    assert_eq!(driver.stats().opened, 0);
}

#[test]
fn remove_all_then_find_all_is_empty() {
    let (driver, template) = setup();
    template
        .insert_all(&[user(None, "a", 1), user(None, "b", 2), user(None, "c", 3)])
        .unwrap();

    template.remove_all::<User>().unwrap();

    assert!(template.find_all::<User>().unwrap().is_empty());
    assert_all_released(&driver);
}

#[test]
fn remove_all_of_deletes_listed_entities_in_one_session() {
    let (driver, template) = setup();
    let stored = template
        .insert_all(&[user(None, "a", 1), user(None, "b", 2), user(None, "c", 3)])
        .unwrap();
    let opened_before = driver.stats().opened;

    template.remove_all_of(&stored[..2]).unwrap();

    assert_eq!(driver.stats().opened, opened_before + 1);
    let remaining: Vec<User> = template.find_all().unwrap();
    assert_eq!(remaining, vec![stored[2].clone()]);
}

#[test]
fn remove_of_keyless_entity_fails_and_releases() {
    let (driver, template) = setup();

    let err = template.remove(&user(None, "ghost", 0)).unwrap_err();
    assert!(matches!(
        err,
        TemplateError::Driver(DriverError::MissingKey(_))
    ));
    assert_all_released(&driver);
}

#[test]
fn execute_condition_filters_orders_and_converts() {
    let (_driver, template) = setup();
    template
        .insert_all(&[
            user(Some("a"), "ann", 41),
            user(Some("b"), "bob", 17),
            user(Some("c"), "cy", 65),
        ])
        .unwrap();

    let adults: Vec<User> = template
        .execute_condition(&Condition::ge("age", 18))
        .unwrap();
    let names: Vec<&str> = adults.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["ann", "cy"]);

    let youngest_first: Vec<User> = template
        .execute(
            &template
                .new_query()
                .order_by("age", SortOrder::Asc)
                .limit(2),
        )
        .unwrap();
    let names: Vec<&str> = youngest_first.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["bob", "ann"]);
}

#[test]
fn count_goes_through_the_relational_side() {
    let (_driver, template) = setup();
    template
        .insert_all(&[user(None, "a", 1), user(None, "b", 2)])
        .unwrap();

    assert_eq!(template.count::<User>().unwrap(), 2);
}

#[test]
fn count_without_relational_connection_is_a_resource_usage_error() {
    let driver = MemoryDocumentDriver::new();
    let template: MemoryTemplate = DocumentTemplate::new("test", ConnectionPair::new(driver, None));

    let err = template.count_in("/user").unwrap_err();
    assert!(matches!(err, TemplateError::DataAccess(_)));
}

#[test]
fn missing_table_is_reported_untranslated() {
    let driver = MemoryDocumentDriver::new();
    let template: MemoryTemplate = DocumentTemplate::new("test", ConnectionPair::new(driver, None));

    let err = template.find_all::<User>().unwrap_err();
    assert!(matches!(
        err,
        TemplateError::Driver(DriverError::TableNotFound(path)) if path == "/test/user"
    ));
}

#[test]
fn caller_owned_store_is_not_released_by_the_template() {
    let (driver, template) = setup();

    let mut store = template.store_for::<User>().unwrap();
    assert_eq!(driver.stats().open_handles(), 1);

    docmap_core::DocumentStore::close(&mut store).unwrap();
    assert_eq!(driver.stats().open_handles(), 0);
}
