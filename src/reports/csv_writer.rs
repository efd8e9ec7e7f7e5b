use anyhow::Result;

use crate::reports::ReportTable;

/// Header row followed by every data row.
pub fn render(table: &ReportTable) -> Result<Vec<u8>> {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    wtr.write_record(&table.headers)?;
    for row in &table.rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(wtr.into_inner().map_err(|e| e.into_error())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_header_and_quotes_commas() {
        let table = ReportTable {
            title: "Leave report".into(),
            subtitle: None,
            headers: vec!["Name", "Reason"],
            rows: vec![vec!["Jane Doe".into(), "Flu, fever".into()]],
        };
        let out = String::from_utf8(render(&table).unwrap()).unwrap();
        assert_eq!(out, "Name,Reason\nJane Doe,\"Flu, fever\"\n");
    }

    #[test]
    fn empty_table_is_just_the_header() {
        let table = ReportTable {
            title: String::new(),
            subtitle: None,
            headers: vec!["A", "B"],
            rows: vec![],
        };
        assert_eq!(render(&table).unwrap(), b"A,B\n");
    }
}
