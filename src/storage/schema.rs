//! Database schema definitions

/// SQL to create the settings table
pub const CREATE_SETTINGS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS settings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    value TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
)
"#;

/// SQL to create the geodata table
/// One row per entity; coordinates and address parts are all nullable
pub const CREATE_GEODATA_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS geodata (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id INTEGER NOT NULL UNIQUE,
    latitude REAL,
    longitude REAL,
    street TEXT,
    city TEXT,
    state TEXT,
    zip TEXT,
    country TEXT,
    website TEXT,
    email TEXT,
    phone TEXT
)
"#;

/// SQL to create the entities table
/// Mirror of the host's content index: type and publication status per entity
pub const CREATE_ENTITIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY,
    entity_type TEXT NOT NULL,
    status TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT ''
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_geodata_coords ON geodata(latitude, longitude)",
    "CREATE INDEX IF NOT EXISTS idx_entities_type_status ON entities(entity_type, status)",
];

/// Columns selected for a full geodata row, in `row_to_record` order
pub const GEODATA_COLUMNS: &str =
    "entity_id, latitude, longitude, street, city, state, zip, country, website, email, phone";

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_SETTINGS_TABLE,
        CREATE_GEODATA_TABLE,
        CREATE_ENTITIES_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
