//! Untyped views of a result set.

use std::collections::HashMap;

use crate::cursor::RawRow;

/// Header row followed by every data row, cells decoded as lossy UTF-8.
///
/// Empty cells become empty strings. Returns an empty table when there are
/// no columns.
pub fn rows_to_table(columns: &[String], rows: &[RawRow]) -> Vec<Vec<String>> {
    if columns.is_empty() {
        return Vec::new();
    }
    let mut table = Vec::with_capacity(rows.len() + 1);
    table.push(columns.to_vec());
    table.extend(rows.iter().map(|row| {
        row.iter()
            .take(columns.len())
            .map(|cell| String::from_utf8_lossy(cell).into_owned())
            .collect()
    }));
    table
}

/// One column-name-keyed map per row, cells decoded as lossy UTF-8.
pub fn rows_to_string_maps(columns: &[String], rows: &[RawRow]) -> Vec<HashMap<String, String>> {
    rows.iter()
        .map(|row| {
            columns
                .iter()
                .zip(row)
                .map(|(column, cell)| (column.clone(), String::from_utf8_lossy(cell).into_owned()))
                .collect()
        })
        .collect()
}

/// One column-name-keyed map per row, cells kept as bytes.
pub fn rows_to_byte_maps(columns: &[String], rows: &[RawRow]) -> Vec<HashMap<String, Vec<u8>>> {
    rows.iter()
        .map(|row| {
            columns
                .iter()
                .zip(row)
                .map(|(column, cell)| (column.clone(), cell.clone()))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Vec<String>, Vec<RawRow>) {
        (
            vec!["id".to_owned(), "name".to_owned()],
            vec![
                vec![b"1".to_vec(), b"ada".to_vec()],
                vec![b"2".to_vec(), Vec::new()],
            ],
        )
    }

    #[test]
    fn test_table_has_header_first() {
        let (columns, rows) = sample();
        let table = rows_to_table(&columns, &rows);
        assert_eq!(table.len(), 3);
        assert_eq!(table[0], ["id", "name"]);
        assert_eq!(table[2], ["2", ""]);
    }

    #[test]
    fn test_table_without_columns_is_empty() {
        assert!(rows_to_table(&[], &[]).is_empty());
        let (columns, _) = sample();
        assert_eq!(rows_to_table(&columns, &[]).len(), 1);
    }

    #[test]
    fn test_maps_key_by_column() {
        let (columns, rows) = sample();
        let strings = rows_to_string_maps(&columns, &rows);
        assert_eq!(strings.len(), 2);
        assert_eq!(strings[0]["name"], "ada");
        assert_eq!(strings[1]["name"], "");

        let bytes = rows_to_byte_maps(&columns, &rows);
        assert_eq!(bytes[0]["id"], b"1");
        assert!(bytes[1]["name"].is_empty());
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let columns = vec!["raw".to_owned()];
        let rows = vec![vec![vec![0x66, 0xff, 0x6f]]];
        assert_eq!(rows_to_table(&columns, &rows)[1][0], "f\u{fffd}o");
    }
}
