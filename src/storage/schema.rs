//! Database schema definitions

/// SQL to create the records table
pub const CREATE_RECORDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    graph TEXT NOT NULL,
    uri TEXT NOT NULL,
    type_name TEXT NOT NULL,
    document TEXT NOT NULL,
    PRIMARY KEY (graph, uri)
)
"#;

/// SQL to create the record_properties table
/// One row per filterable property of a record
pub const CREATE_RECORD_PROPERTIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS record_properties (
    graph TEXT NOT NULL,
    uri TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (graph, uri, key)
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_records_type ON records(graph, type_name)",
    "CREATE INDEX IF NOT EXISTS idx_properties_kv ON record_properties(graph, key, value)",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![CREATE_RECORDS_TABLE, CREATE_RECORD_PROPERTIES_TABLE];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
