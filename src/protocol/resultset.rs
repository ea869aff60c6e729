//! Text protocol result sets
//!
//! The monitor only issues small status queries, so a result set is fully
//! buffered: column names plus rows of nullable text values.

use super::packet::{read_lenenc_int, read_lenenc_str};

/// Buffered text result set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the first column matching any of `names` (case-insensitive)
    pub fn column_index(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|name| {
            self.columns
                .iter()
                .position(|c| c.eq_ignore_ascii_case(name))
        })
    }

    /// Value of the first row under the first matching column name
    ///
    /// `None` when there is no row, no such column, or the value is NULL.
    pub fn first_value(&self, names: &[&str]) -> Option<&str> {
        self.value(0, names)
    }

    /// Value of row `row` under the first matching column name
    pub fn value(&self, row: usize, names: &[&str]) -> Option<&str> {
        let idx = self.column_index(names)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }
}

/// Parse the column count packet that opens a result set
pub fn parse_column_count(payload: &[u8]) -> Option<usize> {
    let (count, _) = read_lenenc_int(payload)?;
    usize::try_from(count?).ok()
}

/// Parse the column name out of a ColumnDefinition41 packet
///
/// Layout: catalog, schema, table, org_table, name, org_name, ... all
/// length-encoded strings.
pub fn parse_column_name(payload: &[u8]) -> Option<String> {
    let mut offset = 0;
    for _ in 0..4 {
        let (_, used) = read_lenenc_str(&payload[offset..])?;
        offset += used;
    }
    let (name, _) = read_lenenc_str(&payload[offset..])?;
    Some(String::from_utf8_lossy(&name?).to_string())
}

/// Parse a text protocol row with `columns` values
pub fn parse_row(payload: &[u8], columns: usize) -> Option<Vec<Option<String>>> {
    let mut values = Vec::with_capacity(columns);
    let mut offset = 0;
    for _ in 0..columns {
        let (value, used) = read_lenenc_str(payload.get(offset..)?)?;
        offset += used;
        values.push(value.map(|v| String::from_utf8_lossy(&v).to_string()));
    }
    Some(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lenenc(s: &str) -> Vec<u8> {
        let mut out = vec![s.len() as u8];
        out.extend_from_slice(s.as_bytes());
        out
    }

    fn column_def(name: &str) -> Vec<u8> {
        let mut out = Vec::new();
        for part in ["def", "", "", "", name, name] {
            out.extend(lenenc(part));
        }
        out.extend_from_slice(&[0x0C, 0x21, 0x00, 0, 0, 0, 0, 0xFD, 0, 0, 0, 0, 0]);
        out
    }

    #[test]
    fn test_parse_column_name() {
        assert_eq!(
            parse_column_name(&column_def("Seconds_Behind_Source")).as_deref(),
            Some("Seconds_Behind_Source")
        );
    }

    #[test]
    fn test_parse_row_with_null() {
        let mut payload = lenenc("binlog.000003");
        payload.push(0xFB);
        payload.extend(lenenc(""));
        let row = parse_row(&payload, 3).unwrap();
        assert_eq!(
            row,
            vec![Some("binlog.000003".to_string()), None, Some(String::new())]
        );
        assert!(parse_row(&payload, 4).is_none());
    }

    #[test]
    fn test_first_value_lookup() {
        let rs = ResultSet {
            columns: vec!["Exec_Master_Log_Pos".into(), "Seconds_Behind_Master".into()],
            rows: vec![vec![Some("154".into()), None]],
        };
        assert_eq!(
            rs.first_value(&["Exec_Source_Log_Pos", "exec_master_log_pos"]),
            Some("154")
        );
        assert_eq!(rs.first_value(&["Seconds_Behind_Master"]), None);
        assert_eq!(rs.value(1, &["Exec_Master_Log_Pos"]), None);
        assert_eq!(rs.first_value(&["Missing"]), None);
        assert!(ResultSet::default().first_value(&["Exec_Master_Log_Pos"]).is_none());
    }

    #[test]
    fn test_parse_column_count() {
        assert_eq!(parse_column_count(&[0x02]), Some(2));
        assert_eq!(parse_column_count(&[0xFB]), None);
    }
}
