use crate::csv_row::split_categories;
use crate::error::Result;
use crate::models::NormalizeSummary;
use crate::schema;
use rusqlite::{params, Connection};
use std::collections::HashMap;

const DERIVE_STATES: &str = r#"
INSERT INTO states (name)
SELECT state FROM temp.imports
WHERE state IS NOT NULL
GROUP BY state
ORDER BY MIN(id)
"#;

const DERIVE_CITIES: &str = r#"
INSERT INTO cities (name, state_id)
SELECT i.city, s.id
FROM temp.imports i
JOIN states s ON s.name = i.state
WHERE i.city IS NOT NULL
GROUP BY i.city, s.id
ORDER BY MIN(i.id)
"#;

// Rows without a resolvable city/state pair are left out of `markets`.
const DERIVE_MARKETS: &str = r#"
INSERT INTO markets (id, name, street, city_id, zip, x, y)
SELECT i.id, i.market_name, i.street, c.id, i.zip, i.x, i.y
FROM temp.imports i
JOIN states s ON s.name = i.state
JOIN cities c ON c.name = i.city AND c.state_id = s.id
ORDER BY i.id
"#;

const STAGED_CATEGORY_LISTS: &str = r#"
SELECT i.id, i.categories
FROM temp.imports i
JOIN markets m ON m.id = i.id
WHERE i.categories IS NOT NULL AND i.categories != ''
ORDER BY i.id
"#;

/// Derives states, cities, markets and category links from the staged rows,
/// then purges the staging table.
///
/// Must run inside the import transaction: it is a consuming, one-shot
/// transform and a failure in any step has to roll back the earlier ones.
pub fn normalize(conn: &Connection) -> Result<NormalizeSummary> {
    let staged: i64 = conn.query_row("SELECT COUNT(*) FROM temp.imports", [], |r| r.get(0))?;

    let states = conn.execute(DERIVE_STATES, [])?;
    log::info!("Derived {states} states");

    let cities = conn.execute(DERIVE_CITIES, [])?;
    log::info!("Derived {cities} cities");

    let markets = conn.execute(DERIVE_MARKETS, [])?;
    let dropped = usize::try_from(staged).unwrap_or(0).saturating_sub(markets);
    log::info!("Derived {markets} markets");
    if dropped > 0 {
        log::warn!("{dropped} staged rows lack a city/state pair and were not imported as markets");
    }

    let links = explode_categories(conn)?;
    log::info!("Linked {links} market categories");

    conn.execute_batch(schema::DROP_STAGING)?;

    Ok(NormalizeSummary {
        states,
        cities,
        markets,
        links,
        dropped,
    })
}

fn explode_categories(conn: &Connection) -> Result<usize> {
    let category_ids = {
        let mut stmt = conn.prepare("SELECT name, id FROM categories")?;
        let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
        rows.collect::<rusqlite::Result<HashMap<String, i64>>>()?
    };

    let mut lists = conn.prepare(STAGED_CATEGORY_LISTS)?;
    let mut insert = conn
        .prepare("INSERT INTO markets_categories (market_id, category_id) VALUES (?1, ?2)")?;

    let mut links = 0;
    let mut rows = lists.query([])?;
    while let Some(row) = rows.next()? {
        let market_id: i64 = row.get(0)?;
        let list: String = row.get(1)?;
        for name in split_categories(&list) {
            match category_ids.get(name) {
                Some(category_id) => {
                    insert.execute(params![market_id, category_id])?;
                    links += 1;
                }
                None => log::debug!("Market {market_id}: no category named {name:?}"),
            }
        }
    }
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_catalog;
    use crate::loader::stage_record;
    use crate::models::StagingRecord;

    fn setup(categories: &[&str]) -> Connection {
        let conn = memory_catalog();
        conn.execute_batch(schema::STAGING).unwrap();
        for name in categories {
            conn.execute("INSERT INTO categories (name) VALUES (?1)", [name]).unwrap();
        }
        conn
    }

    fn staged(id: i64, city: Option<&str>, state: Option<&str>, categories: &str) -> StagingRecord {
        StagingRecord {
            id,
            market_name: Some(format!("Market {id}")),
            city: city.map(str::to_string),
            state: state.map(str::to_string),
            categories: categories.to_string(),
            ..Default::default()
        }
    }

    fn market_categories(conn: &Connection, market_id: i64) -> Vec<String> {
        let mut stmt = conn
            .prepare(
                "SELECT c.name FROM markets_categories mc JOIN categories c ON c.id = mc.category_id
                 WHERE mc.market_id = ?1 ORDER BY c.name",
            )
            .unwrap();
        stmt.query_map([market_id], |r| r.get(0))
            .unwrap()
            .collect::<rusqlite::Result<Vec<String>>>()
            .unwrap()
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn same_city_in_two_states_is_two_cities() {
        let conn = setup(&[]);
        stage_record(&conn, &staged(1, Some("Springfield"), Some("Ohio"), "")).unwrap();
        stage_record(&conn, &staged(2, Some("Springfield"), Some("Illinois"), "")).unwrap();
        stage_record(&conn, &staged(3, Some("Springfield"), Some("Ohio"), "")).unwrap();

        let summary = normalize(&conn).unwrap();
        assert_eq!(summary.states, 2);
        assert_eq!(summary.cities, 2);
        assert_eq!(summary.markets, 3);

        let distinct: i64 = conn
            .query_row("SELECT COUNT(DISTINCT city_id) FROM markets", [], |r| r.get(0))
            .unwrap();
        assert_eq!(distinct, 2);
    }

    #[test]
    fn rows_missing_city_or_state_are_dropped() {
        let conn = setup(&["Organic"]);
        stage_record(&conn, &staged(1, Some("Springfield"), None, "Organic")).unwrap();
        stage_record(&conn, &staged(2, None, Some("Ohio"), "Organic")).unwrap();
        stage_record(&conn, &staged(3, Some("Dayton"), Some("Ohio"), "Organic")).unwrap();

        let summary = normalize(&conn).unwrap();
        assert_eq!(summary.markets, 1);
        assert_eq!(summary.dropped, 2);
        assert_eq!(summary.links, 1);
        // A state-less city never becomes a City row.
        let springfield: i64 = conn
            .query_row("SELECT COUNT(*) FROM cities WHERE name = 'Springfield'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(springfield, 0);
        let ids: Vec<i64> = conn
            .prepare("SELECT id FROM markets")
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn links_match_exactly_the_flagged_categories() {
        let conn = setup(&["Organic", "Bakery", "Cheese"]);
        stage_record(&conn, &staged(1, Some("Ames"), Some("Iowa"), "Organic|Cheese")).unwrap();
        stage_record(&conn, &staged(2, Some("Ames"), Some("Iowa"), "Bakery|")).unwrap();
        stage_record(&conn, &staged(3, Some("Ames"), Some("Iowa"), "")).unwrap();
        stage_record(&conn, &staged(4, Some("Ames"), Some("Iowa"), "organic|Unknown")).unwrap();

        let summary = normalize(&conn).unwrap();
        assert_eq!(summary.links, 3);
        assert_eq!(market_categories(&conn, 1), ["Cheese", "Organic"]);
        assert_eq!(market_categories(&conn, 2), ["Bakery"]);
        assert!(market_categories(&conn, 3).is_empty());
        assert!(market_categories(&conn, 4).is_empty());
    }

    #[test]
    fn staging_table_is_gone_after_normalizing() {
        let conn = setup(&[]);
        stage_record(&conn, &staged(1, Some("Ames"), Some("Iowa"), "")).unwrap();
        normalize(&conn).unwrap();
        let staging_tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_temp_master WHERE name = 'imports'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(staging_tables, 0);
        assert_eq!(count(&conn, "markets"), 1);
    }

    #[test]
    fn failed_step_leaves_nothing_behind() {
        let mut conn = setup(&[]);
        // A pre-existing market with the same id makes the market step fail.
        conn.execute_batch(
            "INSERT INTO states (name) VALUES ('Elsewhere');
             INSERT INTO markets (id, name) VALUES (1, 'Existing');",
        )
        .unwrap();
        stage_record(&conn, &staged(1, Some("Ames"), Some("Iowa"), "")).unwrap();

        let tx = conn.transaction().unwrap();
        assert!(normalize(&tx).is_err());
        drop(tx);

        assert_eq!(count(&conn, "states"), 1);
        assert_eq!(count(&conn, "cities"), 0);
        assert_eq!(count(&conn, "temp.imports"), 1);
    }
}
