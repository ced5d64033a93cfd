//! Catalogue discovery from a live database.

use rusqlite::Connection;

use super::TableDef;

/// Read table, column and foreign key definitions from a SQLite database.
///
/// Tables come back in creation order and foreign keys in declaration
/// order. A foreign key without an explicit
/// target column references the target's primary key.
pub fn sqlite(conn: &Connection) -> rusqlite::Result<Vec<TableDef>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
         ORDER BY rowid",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let mut table = TableDef::new(&name);

        let mut columns = conn.prepare("SELECT name, pk FROM pragma_table_info(?1) ORDER BY cid")?;
        let mut rows = columns.query([name.as_str()])?;
        let mut primary: Vec<(i64, String)> = Vec::new();
        while let Some(row) = rows.next()? {
            let column: String = row.get(0)?;
            let pk: i64 = row.get(1)?;
            if pk > 0 {
                primary.push((pk, column.clone()));
            }
            table.columns.push(column);
        }
        primary.sort();
        table.primary_key = primary.into_iter().map(|(_, c)| c).collect();

        // Key ids count down from the last declared constraint.
        let mut keys = conn.prepare(
            "SELECT \"table\", \"from\", \"to\" FROM pragma_foreign_key_list(?1) \
             ORDER BY id DESC, seq",
        )?;
        let mut rows = keys.query([name.as_str()])?;
        let mut pending = Vec::new();
        while let Some(row) = rows.next()? {
            let target: String = row.get(0)?;
            let column: String = row.get(1)?;
            let target_column: Option<String> = row.get(2)?;
            pending.push((column, target, target_column));
        }
        for (column, target, target_column) in pending {
            table = table.foreign_key(column, target, target_column.unwrap_or_default());
        }

        tables.push(table);
    }

    // Resolve implicit primary-key targets now that every table is known.
    let primary_keys: Vec<(String, Vec<String>)> = tables
        .iter()
        .map(|t| (t.name.clone(), t.primary_key.clone()))
        .collect();
    for table in &mut tables {
        for fk in &mut table.foreign_keys {
            if fk.references_column.is_empty() {
                fk.references_column = primary_keys
                    .iter()
                    .find(|(name, _)| *name == fk.references_table)
                    .and_then(|(_, pk)| pk.first().cloned())
                    .unwrap_or_else(|| "rowid".to_string());
            }
        }
    }

    Ok(tables)
}
