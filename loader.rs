use crate::config::CsvLayout;
use crate::csv_row::ColumnMap;
use crate::error::Result;
use crate::models::{ImportSummary, StagingRecord};
use crate::normalize::normalize;
use crate::schema;
use csv::ReaderBuilder;
use rusqlite::{params, Connection};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Imports a market export file into an empty catalog.
pub fn import_csv(conn: &mut Connection, path: &Path, layout: &CsvLayout) -> Result<ImportSummary> {
    log::info!("Importing {}", path.display());
    let file = File::open(path)?;
    import_reader(conn, BufReader::new(file), layout)
}

/// Loads categories and staging rows, then normalizes them, all in one
/// transaction. On any error nothing is persisted.
pub fn import_reader<R: Read>(
    conn: &mut Connection,
    source: R,
    layout: &CsvLayout,
) -> Result<ImportSummary> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(source);
    let columns = ColumnMap::from_headers(reader.headers()?, layout)?;
    log::info!(
        "Header validated: {} columns, {} categories",
        reader.headers()?.len(),
        columns.categories().len()
    );

    let tx = conn.transaction()?;

    let categories = insert_categories(&tx, columns.categories())?;

    tx.execute_batch(schema::STAGING)?;
    let mut rows = 0;
    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let staged = columns.map_row(&record, line)?;
        stage_record(&tx, &staged)?;
        rows += 1;
    }
    log::info!("Staged {rows} rows");

    let normalized = normalize(&tx)?;
    tx.commit()?;

    Ok(ImportSummary {
        rows,
        categories,
        normalized,
    })
}

fn insert_categories(conn: &Connection, names: &[String]) -> Result<usize> {
    let mut stmt = conn.prepare_cached("INSERT INTO categories (name) VALUES (?1)")?;
    for name in names {
        stmt.execute([name])?;
    }
    Ok(names.len())
}

pub fn stage_record(conn: &Connection, record: &StagingRecord) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO temp.imports (id, market_name, street, city, state, zip, x, y, categories)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    stmt.execute(params![
        record.id,
        record.market_name,
        record.street,
        record.city,
        record.state,
        record.zip,
        record.x,
        record.y,
        record.categories,
    ])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::csv_row::tests::small_layout;
    use crate::db::memory_catalog;
    use crate::error::Error;

    const HEADER: &str = "FMID,MarketName,street,city,State,zip,x,y,Organic,Bakery\n";

    fn count(conn: &Connection, sql: &str) -> i64 {
        conn.query_row(sql, [], |r| r.get(0)).unwrap()
    }

    #[test]
    fn import_counts_only_complete_rows_as_markets() {
        let mut conn = memory_catalog();
        let csv = format!(
            "{HEADER}\
             1,Alpha,1 Main,Springfield,Ohio,45501,-83.8,39.9,Y,N\n\
             2,Beta,,Springfield,,,,,Y,Y\n\
             3,Gamma,,Springfield,Illinois,62701,,,N,Y\n\
             4,Delta,,,Iowa,,,,,\n"
        );

        let summary = import_reader(&mut conn, csv.as_bytes(), &small_layout()).unwrap();
        assert_eq!(summary.rows, 4);
        assert_eq!(summary.categories, 2);
        assert_eq!(summary.normalized.markets, 2);
        assert_eq!(summary.normalized.dropped, 2);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM markets"), 2);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM cities"), 2);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM states"), 3);
    }

    #[test]
    fn categories_get_ids_in_header_order() {
        let mut conn = memory_catalog();
        let csv = format!("{HEADER}1,Alpha,,Ames,Iowa,,,,Y,N\n");
        import_reader(&mut conn, csv.as_bytes(), &small_layout()).unwrap();

        let mut stmt = conn.prepare("SELECT id, name FROM categories ORDER BY id").unwrap();
        let rows: Vec<(i64, String)> = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(rows, vec![(1, "Organic".to_string()), (2, "Bakery".to_string())]);

        let linked: String = conn
            .query_row(
                "SELECT c.name FROM markets_categories mc JOIN categories c ON c.id = mc.category_id
                 WHERE mc.market_id = 1",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(linked, "Organic");
    }

    #[test]
    fn malformed_row_rolls_back_the_whole_import() {
        let mut conn = memory_catalog();
        let csv = format!(
            "{HEADER}\
             1,Alpha,,Ames,Iowa,,,,Y,N\n\
             2,Beta,,Ames,Iowa\n"
        );

        let err = import_reader(&mut conn, csv.as_bytes(), &small_layout()).unwrap_err();
        assert!(matches!(err, Error::Csv(_) | Error::Shape(_)));
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM categories"), 0);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM markets"), 0);
        assert_eq!(
            count(&conn, "SELECT COUNT(*) FROM sqlite_temp_master WHERE name = 'imports'"),
            0
        );
    }

    #[test]
    fn wrong_header_shape_fails_before_loading() {
        let mut conn = memory_catalog();
        let csv = "FMID,MarketName\n1,Alpha\n";
        let err = import_reader(&mut conn, csv.as_bytes(), &small_layout()).unwrap_err();
        assert!(matches!(err, Error::Shape(_)));
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM categories"), 0);
    }

    #[test]
    fn default_layout_maps_fixed_columns_and_flag_block() {
        let layout = CsvLayout::default();
        let mut header: Vec<String> = (0..59).map(|i| format!("Col{i}")).collect();
        for spec in layout.identity_columns() {
            header[spec.position] = spec.name.clone();
        }
        for (k, name) in header[28..58].iter_mut().enumerate() {
            *name = format!("Cat{k}");
        }

        let mut row: Vec<String> = (0..59).map(|i| format!("v{i}")).collect();
        for cell in &mut row[28..58] {
            cell.clear();
        }
        row[0] = "501".into();
        row[1] = "Riverside Market".into();
        row[7] = "12 Water St".into();
        row[8] = "Ames".into();
        row[10] = "Iowa".into();
        row[11] = "50010".into();
        row[20] = "-93.6".into();
        row[21] = "42.0".into();
        row[28] = "Y".into();
        row[40] = "N".into();
        row[57] = "Y".into();

        let csv = format!("{}\n{}\n", header.join(","), row.join(","));
        let mut conn = memory_catalog();
        let summary = import_reader(&mut conn, csv.as_bytes(), &layout).unwrap();
        assert_eq!(summary.categories, 30);
        assert_eq!(summary.normalized.markets, 1);
        assert_eq!(summary.normalized.links, 2);

        let ids: Vec<(i64, String)> = conn
            .prepare("SELECT id, name FROM categories ORDER BY id")
            .unwrap()
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        let expected: Vec<(i64, String)> = (0..30).map(|k| (k + 1, format!("Cat{k}"))).collect();
        assert_eq!(ids, expected);

        let (name, street, zip, x): (String, String, String, f64) = conn
            .query_row("SELECT name, street, zip, x FROM markets WHERE id = 501", [], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
            })
            .unwrap();
        assert_eq!(name, "Riverside Market");
        assert_eq!(street, "12 Water St");
        assert_eq!(zip, "50010");
        assert_eq!(x, -93.6);

        let linked: Vec<String> = conn
            .prepare(
                "SELECT c.name FROM markets_categories mc JOIN categories c ON c.id = mc.category_id
                 WHERE mc.market_id = 501 ORDER BY c.id",
            )
            .unwrap()
            .query_map([], |r| r.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(linked, ["Cat0", "Cat29"]);
    }

    #[test]
    fn import_csv_reads_from_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Export.csv");
        std::fs::write(&path, format!("{HEADER}9,Alpha,,Ames,Iowa,50010,,,N,Y\n")).unwrap();

        let mut conn = memory_catalog();
        let summary = import_csv(&mut conn, &path, &small_layout()).unwrap();
        assert_eq!(summary.normalized.markets, 1);
        assert_eq!(summary.normalized.links, 1);
    }
}
