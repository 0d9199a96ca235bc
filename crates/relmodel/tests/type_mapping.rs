//! Store type mapping resolution through the facade.

use std::sync::Arc;
use std::thread;

use relmodel::prelude::*;
use relmodel_storage::BoundedMappings;
use relmodel_storage::sqlserver::{MAX_BOUNDED_BINARY_LENGTH, MAX_BOUNDED_STRING_LENGTH};

fn column(name: &str, value_type: ValueType) -> ColumnDescriptor {
    ColumnDescriptor::new("Post", name, value_type)
}

#[test]
fn explicit_override_wins_regardless_of_value_type() {
    let mapper = RelationalTypeMapper::sql_server();

    for type_name in ["DATETIME2", "datetime2(7)", "DateTime2 (3)"] {
        let published = column("published", ValueType::Text).column_type(type_name);
        let mapping = mapper.mapping_for_column(&published).unwrap();
        assert_eq!(mapping.default_type_name(), "datetime2", "override {type_name}");
    }

    // A known override rescues a value type with no mapping at all.
    let payload = column("payload", ValueType::Json).column_type("xml");
    assert_eq!(
        mapper.mapping_for_column(&payload).unwrap().store_kind(),
        Some(StoreKind::Xml)
    );
}

#[test]
fn unknown_override_falls_back_to_value_type() {
    let mapper = RelationalTypeMapper::sql_server();
    let id = column("id", ValueType::Int).column_type("serial");
    assert_eq!(mapper.mapping_for_column(&id).unwrap().default_type_name(), "int");
}

#[test]
fn enum_and_nullable_wrappers_are_unwrapped() {
    let mapper = RelationalTypeMapper::sql_server();
    let status = column(
        "status",
        ValueType::nullable(ValueType::enumeration("Status", ValueType::SmallInt)),
    );
    assert_eq!(
        mapper.mapping_for_column(&status).unwrap().default_type_name(),
        "smallint"
    );
}

#[test]
fn bounded_length_threshold_boundary() {
    let mapper = RelationalTypeMapper::sql_server();

    let at = column("body", ValueType::Text).max_length(MAX_BOUNDED_STRING_LENGTH);
    let over = column("body", ValueType::Text).max_length(MAX_BOUNDED_STRING_LENGTH + 1);
    assert_eq!(mapper.mapping_for_column(&at).unwrap().default_type_name(), "nvarchar(4000)");
    assert_eq!(mapper.mapping_for_column(&over).unwrap().default_type_name(), "nvarchar(max)");

    let at = column("blob", ValueType::Bytes).max_length(MAX_BOUNDED_BINARY_LENGTH);
    let over = column("blob", ValueType::Bytes).max_length(MAX_BOUNDED_BINARY_LENGTH + 1);
    assert_eq!(mapper.mapping_for_column(&at).unwrap().default_type_name(), "varbinary(8000)");
    assert_eq!(mapper.mapping_for_column(&over).unwrap().default_type_name(), "varbinary(max)");
}

#[test]
fn bounded_mappings_are_memoized_across_threads() {
    let mapper = Arc::new(RelationalTypeMapper::sql_server());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let mapper = Arc::clone(&mapper);
            thread::spawn(move || {
                let title = ColumnDescriptor::new("Blog", "title", ValueType::Text).max_length(120);
                mapper.mapping_for_column(&title).unwrap()
            })
        })
        .collect();
    let mappings: Vec<Arc<TypeMapping>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let first = &mappings[0];
    assert_eq!(first.default_type_name(), "nvarchar(120)");
    assert!(mappings.iter().all(|m| Arc::ptr_eq(m, first)));
    assert_eq!(mapper.bounded_mappings().cached_string_count(), 1);
}

#[test]
fn key_and_row_version_precedence() {
    let mapper = RelationalTypeMapper::sql_server();

    let key = column("slug", ValueType::Text).primary_key();
    assert_eq!(mapper.mapping_for_column(&key).unwrap().default_type_name(), "nvarchar(450)");

    let fk = column("blog_id", ValueType::Bytes).foreign_key("blog.id");
    assert_eq!(mapper.mapping_for_column(&fk).unwrap().default_type_name(), "varbinary(900)");

    let plain = column("notes", ValueType::Text);
    assert_eq!(mapper.mapping_for_column(&plain).unwrap().default_type_name(), "nvarchar(max)");

    // Row version beats key.
    let version = column("version", ValueType::Bytes).primary_key().row_version();
    assert_eq!(mapper.mapping_for_column(&version).unwrap().default_type_name(), "rowversion");

    // A concurrency token the application supplies is not a row version.
    let token = column("stamp", ValueType::Bytes).concurrency_token();
    assert_eq!(mapper.mapping_for_column(&token).unwrap().default_type_name(), "varbinary(max)");
}

#[test]
fn unsupported_types_name_the_offender() {
    let mapper = RelationalTypeMapper::sql_server();

    let err = mapper.mapping_for_column(&column("tags", ValueType::Array)).unwrap_err();
    match err {
        Error::UnsupportedType(e) => {
            assert_eq!(e.column.as_deref(), Some("Post.tags"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let err = mapper.mapping_for_type_name("geography").unwrap_err();
    assert!(err.is_unsupported_type());
    assert!(err.to_string().contains("geography"));

    assert!(mapper.mapping_for_value_type(&ValueType::Json).unwrap_err().is_unsupported_type());
}

#[test]
fn null_values_use_the_null_mapping() {
    let mapper = RelationalTypeMapper::sql_server();
    let null = mapper.mapping_for_value(Some(&Value::Null)).unwrap();
    let none = mapper.mapping_for_value(None).unwrap();
    assert!(Arc::ptr_eq(&null, &none));
    assert_eq!(null.default_type_name(), "NULL");

    let int = mapper.mapping_for_value(Some(&Value::Int(4))).unwrap();
    assert_eq!(int.default_type_name(), "int");
}

#[test]
fn model_validation_reports_first_unmappable_column() {
    let mapper = RelationalTypeMapper::sql_server();
    let entities = vec![
        EntityDescriptor::new("Blog")
            .column("id", ValueType::Int, |c| c.primary_key())
            .column("name", ValueType::Text, |c| c.max_length(200)),
        EntityDescriptor::new("Post")
            .column("id", ValueType::BigInt, |c| c.primary_key())
            .column("meta", ValueType::Json, |c| c)
            .column("tags", ValueType::Array, |c| c),
    ];

    let err = validate_entity_mappings(&mapper, &entities).unwrap_err();
    assert!(err.to_string().contains("Post.meta"), "{err}");
    assert!(validate_entity_mappings(&mapper, &entities[..1]).is_ok());
}

#[test]
fn parameters_from_mappings() {
    let conn = MemoryConnection::new();
    let command = conn.create_command();
    let mapper = RelationalTypeMapper::sql_server();

    let body = mapper.mapping_for_type_name("nvarchar").unwrap();
    let short = body.create_parameter(command.as_ref(), "@p0", Some(Value::from("hi")), None);
    assert_eq!(short.size, Some(ParameterSize::Bounded(MAX_BOUNDED_STRING_LENGTH)));

    let long_text = "x".repeat(MAX_BOUNDED_STRING_LENGTH + 1);
    let long = body.create_parameter(command.as_ref(), "@p1", Some(Value::from(long_text)), Some(false));
    assert_eq!(long.size, Some(ParameterSize::Unbounded));
    assert_eq!(long.nullable, Some(false));

    let null = body.create_parameter(command.as_ref(), "@p2", None, None);
    assert_eq!(null.value, Value::Null);
}

/// A provider outside the storage crate with its own bounded text policy.
struct AnsiText {
    policy: BoundedLengthPolicy,
}

impl CustomMapping for AnsiText {
    fn custom_mapping(
        &self,
        column: &ColumnDescriptor,
        bounded: &BoundedMappings,
    ) -> Result<Arc<TypeMapping>> {
        match column.value_type.unwrap_nullable() {
            ValueType::Text => Ok(bounded.string_mapping(column, &self.policy)),
            other => Err(Error::Custom(format!("no mapping for {other:?}"))),
        }
    }
}

#[test]
fn external_provider_builds_bounded_mappings_infallibly() {
    let text = Arc::new(TypeMapping::named("text", Some(ValueType::Text)));
    let policy = BoundedLengthPolicy::new(
        255,
        |n| TypeMapping::named(format!("varchar({n})"), Some(ValueType::Text)),
        Arc::clone(&text),
        text,
    );
    let mapper = RelationalTypeMapper::builder()
        .custom_mapping(AnsiText { policy })
        .build();

    let code = column("code", ValueType::Text).max_length(12);
    assert_eq!(mapper.mapping_for_column(&code).unwrap().default_type_name(), "varchar(12)");
    let body = column("body", ValueType::Text).max_length(256);
    assert_eq!(mapper.mapping_for_column(&body).unwrap().default_type_name(), "text");
    assert!(mapper.mapping_for_column(&column("n", ValueType::Int)).is_err());
}
