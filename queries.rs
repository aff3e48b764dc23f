use crate::error::{Error, Result};
use crate::models::{MarketDetail, MarketSummary, NewReview, Page, ReviewRecord};
use rusqlite::{params, Connection, OptionalExtension, Row};

const SUMMARY_SELECT: &str = r#"
SELECT m.id, m.name, c.name, s.name, m.zip
FROM markets m
LEFT JOIN cities c ON c.id = m.city_id
LEFT JOIN states s ON s.id = c.state_id
"#;

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<MarketSummary> {
    Ok(MarketSummary {
        id: row.get(0)?,
        name: row.get(1)?,
        city: row.get(2)?,
        state: row.get(3)?,
        zip: row.get(4)?,
    })
}

pub fn count_markets(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM markets", [], |r| r.get(0))?)
}

/// One page of markets ordered by name; pages are numbered from zero.
pub fn list_markets(conn: &Connection, page: Page) -> Result<Vec<MarketSummary>> {
    let sql = format!("{SUMMARY_SELECT} ORDER BY m.name, m.id LIMIT ?1 OFFSET ?2");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![page.size, page.offset()], summary_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn search_by_city_state(conn: &Connection, city: &str, state: &str) -> Result<Vec<MarketSummary>> {
    let sql = format!(
        "{SUMMARY_SELECT} WHERE c.name = ?1 COLLATE NOCASE AND s.name = ?2 COLLATE NOCASE ORDER BY m.name, m.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![city.trim(), state.trim()], summary_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn search_by_zip(conn: &Connection, zip: &str) -> Result<Vec<MarketSummary>> {
    let sql = format!("{SUMMARY_SELECT} WHERE m.zip = ?1 ORDER BY m.name, m.id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![zip.trim()], summary_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

pub fn get_market(conn: &Connection, market_id: i64) -> Result<Option<MarketDetail>> {
    let detail = conn
        .query_row(
            r#"
            SELECT m.id, m.name, m.street, c.name, s.name, m.zip, m.x, m.y
            FROM markets m
            LEFT JOIN cities c ON c.id = m.city_id
            LEFT JOIN states s ON s.id = c.state_id
            WHERE m.id = ?1
            "#,
            [market_id],
            |row| {
                Ok(MarketDetail {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    street: row.get(2)?,
                    city: row.get(3)?,
                    state: row.get(4)?,
                    zip: row.get(5)?,
                    x: row.get(6)?,
                    y: row.get(7)?,
                    categories: Vec::new(),
                    reviews: Vec::new(),
                })
            },
        )
        .optional()?;

    let Some(mut detail) = detail else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT c.name FROM markets_categories mc
         JOIN categories c ON c.id = mc.category_id
         WHERE mc.market_id = ?1 ORDER BY c.id",
    )?;
    detail.categories = stmt
        .query_map([market_id], |r| r.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;

    let mut stmt = conn.prepare(
        "SELECT r.id, u.first_name, u.last_name, r.rating, r.content, r.created_at
         FROM reviews r JOIN users u ON u.id = r.user_id
         WHERE r.market_id = ?1 ORDER BY r.created_at, r.id",
    )?;
    detail.reviews = stmt
        .query_map([market_id], |r| {
            Ok(ReviewRecord {
                id: r.get(0)?,
                first_name: r.get(1)?,
                last_name: r.get(2)?,
                rating: r.get(3)?,
                content: r.get(4)?,
                created_at: r.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Some(detail))
}

/// Deletes a market with its category links and reviews.
pub fn delete_market(conn: &Connection, market_id: i64) -> Result<()> {
    let deleted = conn.execute("DELETE FROM markets WHERE id = ?1", [market_id])?;
    if deleted == 0 {
        return Err(Error::NotFound(market_id));
    }
    log::info!("Deleted market {market_id}");
    Ok(())
}

/// Returns the id of the user with this name, ignoring case, creating one if needed.
pub fn find_or_create_user(conn: &Connection, first_name: &str, last_name: &str) -> Result<i64> {
    let (first_name, last_name) = (first_name.trim(), last_name.trim());
    let existing = conn
        .query_row(
            "SELECT id FROM users
             WHERE first_name = ?1 COLLATE NOCASE AND last_name = ?2 COLLATE NOCASE
             ORDER BY id LIMIT 1",
            params![first_name, last_name],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO users (first_name, last_name) VALUES (?1, ?2)",
        params![first_name, last_name],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn add_review(conn: &Connection, market_id: i64, review: &NewReview) -> Result<i64> {
    let exists = conn
        .query_row("SELECT 1 FROM markets WHERE id = ?1", [market_id], |_| Ok(()))
        .optional()?
        .is_some();
    if !exists {
        return Err(Error::NotFound(market_id));
    }

    let content = review
        .content
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());

    // A new user only persists together with their review.
    let tx = conn.unchecked_transaction()?;
    let user_id = find_or_create_user(&tx, &review.first_name, &review.last_name)?;
    tx.execute(
        "INSERT INTO reviews (market_id, user_id, rating, content) VALUES (?1, ?2, ?3, ?4)",
        params![market_id, user_id, review.rating.value(), content],
    )?;
    let review_id = tx.last_insert_rowid();
    tx.commit()?;
    Ok(review_id)
}
