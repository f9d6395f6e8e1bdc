//! Session lists for batch pipeline launches.
//!
//! Spreadsheet exports use either `,` or `;` as separator depending on
//! locale, so the delimiter is sniffed from the header line.

use std::path::Path;

use xnatkit_shared::{Result, XnatKitError};

/// Pick `;` or `,` by whichever occurs more often in the header line.
pub fn sniff_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or_default();
    let semicolons = header.matches(';').count();
    let commas = header.matches(',').count();
    if semicolons > commas { b';' } else { b',' }
}

/// Read every value of `column` (matched against the header) from a CSV file.
pub fn read_session_column(path: &Path, column: &str) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| XnatKitError::io(path, e))?;
    parse_session_column(&content, column)
        .map_err(|e| XnatKitError::parse(format!("{}: {e}", path.display())))
}

fn parse_session_column(content: &str, column: &str) -> std::result::Result<Vec<String>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(sniff_delimiter(content))
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader.headers().map_err(|e| e.to_string())?;
    let index = headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| format!("no '{column}' column in header"))?;

    let mut values = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.map_err(|e| e.to_string())?;
        let value = record
            .get(index)
            .ok_or_else(|| format!("row {} has no '{column}' value", line + 2))?;
        values.push(value.to_string());
    }
    Ok(values)
}
