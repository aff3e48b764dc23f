/// Normalized catalog schema, applied once to a freshly created database.
pub const CATALOG: &str = r#"
-- States: one row per distinct state name found in the export.
CREATE TABLE IF NOT EXISTS states (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

-- Cities: the same name may exist once per state.
CREATE TABLE IF NOT EXISTS cities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    state_id INTEGER NOT NULL,
    FOREIGN KEY (state_id) REFERENCES states (id),
    UNIQUE (name, state_id)
);

-- Categories: populated from the flag-column headers, ids follow header order.
CREATE TABLE IF NOT EXISTS categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

-- Markets: id is the source row id (FMID).
CREATE TABLE IF NOT EXISTS markets (
    id INTEGER PRIMARY KEY,
    name TEXT,
    street TEXT,
    city_id INTEGER,
    zip TEXT,
    x REAL,
    y REAL,
    FOREIGN KEY (city_id) REFERENCES cities (id)
);

CREATE TABLE IF NOT EXISTS markets_categories (
    market_id INTEGER NOT NULL,
    category_id INTEGER NOT NULL,
    FOREIGN KEY (market_id) REFERENCES markets (id) ON DELETE CASCADE,
    FOREIGN KEY (category_id) REFERENCES categories (id),
    UNIQUE (market_id, category_id)
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS reviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    market_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    rating INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
    content TEXT,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    FOREIGN KEY (market_id) REFERENCES markets (id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users (id)
);

-- Indexes for the lookups the console performs
CREATE INDEX IF NOT EXISTS idx_markets_name ON markets (name);
CREATE INDEX IF NOT EXISTS idx_markets_zip ON markets (zip);
CREATE INDEX IF NOT EXISTS idx_markets_city_id ON markets (city_id);
CREATE INDEX IF NOT EXISTS idx_cities_state_id ON cities (state_id);
CREATE INDEX IF NOT EXISTS idx_markets_categories_category_id ON markets_categories (category_id);
CREATE INDEX IF NOT EXISTS idx_reviews_market_id ON reviews (market_id);
"#;

/// Staging table for one import. Lives in the connection's temp schema and is
/// dropped by `DROP_STAGING` when normalization finishes.
pub const STAGING: &str = r#"
CREATE TEMP TABLE imports (
    id INTEGER PRIMARY KEY,
    market_name TEXT,
    street TEXT,
    city TEXT,
    state TEXT,
    zip TEXT,
    x REAL,
    y REAL,
    categories TEXT
);
"#;

pub const DROP_STAGING: &str = r#"
DELETE FROM temp.imports;
DROP TABLE temp.imports;
"#;
