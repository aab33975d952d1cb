//! Derivation of local table schemas from remote object metadata.
//!
//! Object and field names come from the remote system, so every identifier is
//! validated against a conservative pattern and double-quoted before it is
//! spliced into a statement. Field types are mapped through a fixed table;
//! anything outside it is rejected before any DDL exists.

use crate::models::{ObjectDefinition, Record};
use crate::sync::error::{SyncError, SyncResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Tables owned by the engine itself; remote objects may not shadow them.
const RESERVED_TABLES: &[&str] = &["connections", "syncd_objects", "_sqlx_migrations"];

static NULL: Value = Value::Null;

/// Local column type for one remote field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Text,
    Boolean,
    Decimal,
    Date,
    DateTime,
    Double,
    Integer,
}

impl ColumnType {
    pub fn sql(self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Decimal => "DECIMAL(10,5)",
            ColumnType::Date => "DATE",
            ColumnType::DateTime => "DATETIME",
            ColumnType::Double => "DOUBLE",
            ColumnType::Integer => "INTEGER",
        }
    }
}

/// Map a remote field type to its column type. Returns `None` for any type
/// outside the fixed table. The boolean is true for the identifier type.
pub fn column_type_for(field_type: &str) -> Option<(ColumnType, bool)> {
    let mapped = match field_type {
        "address" => ColumnType::Text,
        "boolean" => ColumnType::Boolean,
        "currency" => ColumnType::Decimal,
        "date" => ColumnType::Date,
        "datetime" => ColumnType::DateTime,
        "double" => ColumnType::Double,
        "id" => return Some((ColumnType::Text, true)),
        "int" => ColumnType::Integer,
        "phone" => ColumnType::Text,
        "picklist" => ColumnType::Text,
        "reference" => ColumnType::Text,
        "string" => ColumnType::Text,
        "textarea" => ColumnType::Text,
        "url" => ColumnType::Text,
        _ => return None,
    };
    Some((mapped, false))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub primary_key: bool,
}

impl ColumnSpec {
    /// Declared type as it appears in the DDL and in `pragma_table_info`.
    pub fn declared_type(&self) -> &'static str {
        self.column_type.sql()
    }

    fn definition(&self) -> String {
        if self.primary_key {
            format!("{} {} PRIMARY KEY", quote_ident(&self.name), self.declared_type())
        } else {
            format!("{} {}", quote_ident(&self.name), self.declared_type())
        }
    }
}

/// Derived local schema for one remote object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table: String,
    pub key: String,
    pub columns: Vec<ColumnSpec>,
    pub ddl: String,
    pub upsert: String,
}

impl TableSchema {
    /// Positional bind values for one record, in column order.
    pub fn values<'a>(&'a self, record: &'a Record) -> impl Iterator<Item = &'a Value> + 'a {
        self.columns
            .iter()
            .map(move |column| record.get(&column.name).unwrap_or(&NULL))
    }
}

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9_]{0,127}$").expect("identifier pattern is valid")
    })
}

pub fn validate_identifier(name: &str) -> SyncResult<&str> {
    if identifier_pattern().is_match(name) {
        Ok(name)
    } else {
        Err(SyncError::InvalidIdentifier(name.to_string()))
    }
}

/// Quote an identifier for SQLite. Embedded quotes are doubled even though
/// validated names cannot contain them.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Translate an object definition into its table DDL and upsert template.
pub fn derive(def: &ObjectDefinition) -> SyncResult<TableSchema> {
    let table = validate_identifier(&def.name)?;
    if RESERVED_TABLES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(table))
        || table.to_ascii_lowercase().starts_with("sqlite_")
    {
        return Err(SyncError::InvalidIdentifier(table.to_string()));
    }

    if def.fields.is_empty() {
        return Err(invalid(def, "definition has no fields"));
    }

    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(def.fields.len());
    for field in &def.fields {
        validate_identifier(&field.name)?;
        if !seen.insert(field.name.to_ascii_lowercase()) {
            return Err(invalid(def, &format!("duplicate field '{}'", field.name)));
        }

        let (column_type, primary_key) =
            column_type_for(&field.field_type).ok_or_else(|| SyncError::UnsupportedType {
                field: field.name.clone(),
                field_type: field.field_type.clone(),
            })?;

        columns.push(ColumnSpec {
            name: field.name.clone(),
            column_type,
            primary_key,
        });
    }

    let mut keys = columns.iter().filter(|c| c.primary_key);
    let key = match (keys.next(), keys.next()) {
        (Some(key), None) => key.name.clone(),
        (None, _) => return Err(invalid(def, "no identifier field of type 'id'")),
        (Some(_), Some(_)) => return Err(invalid(def, "more than one identifier field")),
    };

    let ddl = format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(table),
        columns
            .iter()
            .map(ColumnSpec::definition)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let upsert = upsert_statement(table, &key, &columns);

    Ok(TableSchema {
        table: table.to_string(),
        key,
        columns,
        ddl,
        upsert,
    })
}

fn upsert_statement(table: &str, key: &str, columns: &[ColumnSpec]) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote_ident(&c.name)).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");

    let updates: Vec<String> = columns
        .iter()
        .filter(|c| !c.primary_key)
        .map(|c| {
            let quoted = quote_ident(&c.name);
            format!("{quoted} = excluded.{quoted}")
        })
        .collect();

    let conflict = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };

    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {}",
        quote_ident(table),
        names.join(", "),
        placeholders,
        quote_ident(key),
        conflict
    )
}

/// Build the SOQL statement selecting every cached field of an object.
pub fn build_soql(def: &ObjectDefinition) -> SyncResult<String> {
    validate_identifier(&def.name)?;
    let fields = def
        .fields
        .iter()
        .map(|f| validate_identifier(&f.name))
        .collect::<SyncResult<Vec<_>>>()?;

    if fields.is_empty() {
        return Err(invalid(def, "definition has no fields"));
    }

    Ok(format!("SELECT {} FROM {}", fields.join(","), def.name))
}

fn invalid(def: &ObjectDefinition, reason: &str) -> SyncError {
    SyncError::InvalidDefinition {
        object: def.name.clone(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldDefinition;

    fn object(name: &str, fields: &[(&str, &str)]) -> ObjectDefinition {
        ObjectDefinition {
            name: name.to_string(),
            label: name.to_string(),
            custom: false,
            fields: fields
                .iter()
                .map(|(n, t)| FieldDefinition::new(*n, *t))
                .collect(),
        }
    }

    #[test]
    fn maps_every_supported_type() {
        let table = [
            ("address", "TEXT"),
            ("boolean", "BOOLEAN"),
            ("currency", "DECIMAL(10,5)"),
            ("date", "DATE"),
            ("datetime", "DATETIME"),
            ("double", "DOUBLE"),
            ("id", "TEXT"),
            ("int", "INTEGER"),
            ("phone", "TEXT"),
            ("picklist", "TEXT"),
            ("reference", "TEXT"),
            ("string", "TEXT"),
            ("textarea", "TEXT"),
            ("url", "TEXT"),
        ];

        for (remote, expected) in table {
            let (column, is_key) = column_type_for(remote).expect("type is mapped");
            assert_eq!(column.sql(), expected, "remote type {remote}");
            assert_eq!(is_key, remote == "id");
        }

        let mut fields = vec![("Id", "id")];
        let names: Vec<String> = table
            .iter()
            .filter(|(t, _)| *t != "id")
            .map(|(t, _)| format!("F_{t}"))
            .collect();
        for (name, (remote, _)) in names.iter().zip(table.iter().filter(|(t, _)| *t != "id")) {
            fields.push((name.as_str(), *remote));
        }
        let schema = derive(&object("Everything", &fields)).expect("derives");
        for column in &schema.columns[1..] {
            let remote = column.name.trim_start_matches("F_");
            let expected = table.iter().find(|(t, _)| *t == remote).map(|(_, s)| *s);
            assert_eq!(Some(column.declared_type()), expected);
        }
    }

    #[test]
    fn account_ddl_and_upsert() {
        let schema = derive(&object("Account", &[("Id", "id"), ("Name", "string")]))
            .expect("derives");

        assert_eq!(
            schema.ddl,
            r#"CREATE TABLE IF NOT EXISTS "Account" ("Id" TEXT PRIMARY KEY, "Name" TEXT)"#
        );
        assert_eq!(
            schema.upsert,
            r#"INSERT INTO "Account" ("Id", "Name") VALUES (?, ?) ON CONFLICT("Id") DO UPDATE SET "Name" = excluded."Name""#
        );
        assert_eq!(schema.key, "Id");
    }

    #[test]
    fn key_only_object_ignores_conflicts() {
        let schema = derive(&object("Tag", &[("Id", "id")])).expect("derives");
        assert!(schema.upsert.ends_with("ON CONFLICT(\"Id\") DO NOTHING"));
    }

    #[test]
    fn rejects_unsupported_type() {
        let err = derive(&object("Lead", &[("Id", "id"), ("Geo", "location")])).unwrap_err();
        match err {
            SyncError::UnsupportedType { field, field_type } => {
                assert_eq!(field, "Geo");
                assert_eq!(field_type, "location");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rejects_hostile_identifiers() {
        let err = derive(&object("Account\"; DROP TABLE x; --", &[("Id", "id")])).unwrap_err();
        assert!(matches!(err, SyncError::InvalidIdentifier(_)));

        let err = derive(&object("Account", &[("Id", "id"), ("Name) --", "string")]))
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidIdentifier(_)));

        let err = derive(&object("syncd_objects", &[("Id", "id")])).unwrap_err();
        assert!(matches!(err, SyncError::InvalidIdentifier(_)));
    }

    #[test]
    fn requires_exactly_one_identifier() {
        let err = derive(&object("Note", &[("Body", "string")])).unwrap_err();
        assert!(matches!(err, SyncError::InvalidDefinition { .. }));

        let err = derive(&object("Note", &[("Id", "id"), ("Other", "id")])).unwrap_err();
        assert!(matches!(err, SyncError::InvalidDefinition { .. }));

        let err = derive(&object("Note", &[("Id", "id"), ("id", "string")])).unwrap_err();
        assert!(matches!(err, SyncError::InvalidDefinition { .. }));
    }

    #[test]
    fn soql_selects_cached_fields() {
        let def = object("Contact", &[("Id", "id"), ("Email", "string"), ("Custom__c", "int")]);
        assert_eq!(
            build_soql(&def).expect("builds"),
            "SELECT Id,Email,Custom__c FROM Contact"
        );
    }

    #[test]
    fn values_follow_column_order() {
        let schema = derive(&object("Account", &[("Id", "id"), ("Name", "string")]))
            .expect("derives");
        let record: Record = serde_json::from_value(serde_json::json!({
            "attributes": {"type": "Account"},
            "Name": "Acme",
            "Id": "001"
        }))
        .expect("record");

        let values: Vec<&Value> = schema.values(&record).collect();
        assert_eq!(values, vec![&Value::from("001"), &Value::from("Acme")]);
    }
}
