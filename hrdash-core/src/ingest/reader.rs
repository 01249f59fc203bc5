//! File → [`RawSheet`] for CSV, TSV and spreadsheet workbooks

use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;

use calamine::{open_workbook_auto_from_rs, Data, DataType, Range, Reader};
use serde::{Deserialize, Serialize};

use super::RowWarning;
use crate::dataset::RawCell;
use crate::error::{HrError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Tsv,
    /// Any workbook calamine can open (xlsx, xlsm, xlsb, xls, ods)
    #[serde(alias = "xlsx", alias = "xls", alias = "xlsm", alias = "xlsb", alias = "ods")]
    Spreadsheet,
}

impl FileFormat {
    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "csv" | "txt" => Ok(Self::Csv),
            "tsv" | "tab" => Ok(Self::Tsv),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" | "spreadsheet" => Ok(Self::Spreadsheet),
            other => Err(HrError::unsupported_format(other)),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| HrError::unsupported_format(path.display().to_string()))?;
        Self::from_extension(ext)
    }
}

impl FromStr for FileFormat {
    type Err = HrError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_extension(s)
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Csv => "csv",
            Self::Tsv => "tsv",
            Self::Spreadsheet => "spreadsheet",
        })
    }
}

/// One data row and where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// 1-based line (CSV) or row (spreadsheet) number, header included
    pub line: usize,
    pub cells: Vec<RawCell>,
}

/// Header plus untyped rows, before any schema is applied
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSheet {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
    /// Records the parser could not decode at all (bad UTF-8, broken quoting)
    pub unreadable: Vec<RowWarning>,
}

pub fn read_bytes(bytes: Vec<u8>, format: FileFormat, sheet: Option<&str>) -> Result<RawSheet> {
    let raw = match format {
        FileFormat::Csv => read_delimited(&bytes, b',')?,
        FileFormat::Tsv => read_delimited(&bytes, b'\t')?,
        FileFormat::Spreadsheet => read_workbook(bytes, sheet)?,
    };
    Ok(tidy(raw))
}

fn read_delimited(bytes: &[u8], delimiter: u8) -> Result<RawSheet> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut sheet = RawSheet::default();
    let mut records = reader.records();

    match records.next() {
        Some(Ok(header)) => sheet.headers = header.iter().map(str::to_owned).collect(),
        Some(Err(e)) => {
            return Err(HrError::malformed_file(format!("unreadable header row: {}", e)))
        }
        None => return Err(HrError::malformed_file("file is empty")),
    }

    for (index, record) in records.enumerate() {
        // Fallback when the parser has no position: header is line 1
        let fallback_line = index + 2;
        match record {
            Ok(record) => {
                let line = record
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(fallback_line);
                let cells = record
                    .iter()
                    .map(|field| {
                        if field.is_empty() {
                            RawCell::Empty
                        } else {
                            RawCell::Text(field.to_owned())
                        }
                    })
                    .collect();
                sheet.rows.push(RawRow { line, cells });
            }
            Err(e) => {
                let line = e
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(fallback_line);
                sheet.unreadable.push(RowWarning {
                    line,
                    reason: format!("unreadable record: {}", e),
                });
            }
        }
    }

    Ok(sheet)
}

fn read_workbook(bytes: Vec<u8>, sheet: Option<&str>) -> Result<RawSheet> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| HrError::malformed_file(format!("cannot open workbook: {}", e)))?;

    let range = match sheet {
        Some(name) => workbook.worksheet_range(name).map_err(|e| {
            HrError::malformed_file(format!("cannot read sheet '{}': {}", name, e))
        })?,
        None => workbook
            .worksheet_range_at(0)
            .ok_or_else(|| HrError::malformed_file("workbook has no sheets"))?
            .map_err(|e| HrError::malformed_file(format!("cannot read first sheet: {}", e)))?,
    };

    Ok(sheet_from_range(&range))
}

fn sheet_from_range(range: &Range<Data>) -> RawSheet {
    // Rows before the used range are absent from `rows()`
    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    let mut rows = range.rows().enumerate();

    let mut sheet = RawSheet::default();
    if let Some((_, header)) = rows.next() {
        sheet.headers = header.iter().map(header_text).collect();
    }
    for (index, cells) in rows {
        sheet.rows.push(RawRow {
            line: first_row + index + 1,
            cells: cells.iter().map(raw_cell).collect(),
        });
    }
    sheet
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_owned(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

fn raw_cell(cell: &Data) -> RawCell {
    match cell {
        Data::Empty => RawCell::Empty,
        Data::String(s) => {
            if s.trim().is_empty() {
                RawCell::Empty
            } else {
                RawCell::Text(s.clone())
            }
        }
        Data::Int(i) => RawCell::Int(*i),
        Data::Float(f) => RawCell::Float(*f),
        Data::Bool(b) => RawCell::Bool(*b),
        Data::DateTime(_) | Data::DateTimeIso(_) => cell
            .as_datetime()
            .map(RawCell::DateTime)
            .unwrap_or_else(|| RawCell::Text(cell.to_string())),
        Data::DurationIso(s) => RawCell::Text(s.clone()),
        Data::Error(e) => RawCell::Text(format!("#{:?}", e)),
    }
}

/// Drop trailing unnamed columns (stray delimiters, formatted-but-empty
/// spreadsheet columns) and fully blank rows.
fn tidy(mut sheet: RawSheet) -> RawSheet {
    while sheet
        .headers
        .last()
        .is_some_and(|h| h.trim().is_empty())
    {
        let column = sheet.headers.len() - 1;
        let column_is_blank = sheet
            .rows
            .iter()
            .all(|row| row.cells.get(column).map_or(true, RawCell::is_blank));
        if !column_is_blank {
            break;
        }
        sheet.headers.pop();
    }

    let width = sheet.headers.len();
    sheet.rows.retain(|row| !row.cells.iter().all(RawCell::is_blank));
    for row in &mut sheet.rows {
        if row.cells.len() > width && row.cells[width..].iter().all(RawCell::is_blank) {
            row.cells.truncate(width);
        }
    }
    sheet
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> RawCell {
        RawCell::Text(s.to_string())
    }

    #[test]
    fn format_detection() {
        assert_eq!(FileFormat::from_extension("CSV").unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::from_extension(".tsv").unwrap(), FileFormat::Tsv);
        assert_eq!(
            FileFormat::from_path(Path::new("staff/Employees.xlsx")).unwrap(),
            FileFormat::Spreadsheet
        );
        assert_eq!(
            FileFormat::from_extension("ods").unwrap(),
            FileFormat::Spreadsheet
        );
        assert!(matches!(
            FileFormat::from_extension("pdf"),
            Err(HrError::UnsupportedFormat { .. })
        ));
        assert!(FileFormat::from_path(Path::new("no_extension")).is_err());
    }

    #[test]
    fn csv_rows_keep_source_lines() {
        let data = b"name,amount\nAsha,100\n\nRavi, 250 \n".to_vec();
        let sheet = read_bytes(data, FileFormat::Csv, None).unwrap();

        assert_eq!(sheet.headers, vec!["name", "amount"]);
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0].line, 2);
        assert_eq!(sheet.rows[0].cells, vec![text("Asha"), text("100")]);
        assert_eq!(sheet.rows[1].cells, vec![text("Ravi"), text("250")]);
        assert!(sheet.unreadable.is_empty());
    }

    #[test]
    fn tsv_and_quoted_fields() {
        let data = b"name\tnote\n\"Asha\"\t\"likes\ttabs\"\n".to_vec();
        let sheet = read_bytes(data, FileFormat::Tsv, None).unwrap();
        assert_eq!(sheet.rows[0].cells[1], text("likes\ttabs"));
    }

    #[test]
    fn empty_fields_become_empty_cells() {
        let data = b"a,b,c\n1,,3\n".to_vec();
        let sheet = read_bytes(data, FileFormat::Csv, None).unwrap();
        assert_eq!(sheet.rows[0].cells, vec![text("1"), RawCell::Empty, text("3")]);
    }

    #[test]
    fn ragged_rows_are_kept_for_validation() {
        let data = b"a,b\n1,2,3\n4\n".to_vec();
        let sheet = read_bytes(data, FileFormat::Csv, None).unwrap();
        assert_eq!(sheet.rows[0].cells.len(), 3);
        assert_eq!(sheet.rows[1].cells.len(), 1);
    }

    #[test]
    fn trailing_delimiters_are_tidied() {
        let data = b"a,b,\n1,2,\n3,4,\n".to_vec();
        let sheet = read_bytes(data, FileFormat::Csv, None).unwrap();
        assert_eq!(sheet.headers, vec!["a", "b"]);
        assert!(sheet.rows.iter().all(|r| r.cells.len() == 2));
    }

    #[test]
    fn invalid_utf8_is_an_unreadable_record() {
        let mut data = b"name,amount\nAsha,100\n".to_vec();
        data.extend_from_slice(&[0xff, 0xfe, b',', b'1', b'\n']);
        let sheet = read_bytes(data, FileFormat::Csv, None).unwrap();
        assert_eq!(sheet.rows.len(), 1);
        assert_eq!(sheet.unreadable.len(), 1);
        assert_eq!(sheet.unreadable[0].line, 3);
    }

    #[test]
    fn empty_file_is_malformed() {
        let err = read_bytes(Vec::new(), FileFormat::Csv, None).unwrap_err();
        assert!(matches!(err, HrError::MalformedFile { .. }));
    }

    #[test]
    fn garbage_workbook_is_malformed() {
        let err = read_bytes(b"not a workbook".to_vec(), FileFormat::Spreadsheet, None)
            .unwrap_err();
        assert!(matches!(err, HrError::MalformedFile { .. }));
    }

    #[test]
    fn spreadsheet_cells_keep_native_types() {
        let mut range: Range<Data> = Range::new((0, 0), (2, 2));
        range.set_value((0, 0), Data::String("Employee ID".into()));
        range.set_value((0, 1), Data::String("Hours".into()));
        range.set_value((0, 2), Data::Float(2024.0));
        range.set_value((1, 0), Data::String("E001".into()));
        range.set_value((1, 1), Data::Float(7.5));
        range.set_value((1, 2), Data::Bool(true));
        range.set_value((2, 0), Data::String("E002".into()));
        range.set_value((2, 1), Data::Int(8));

        let sheet = tidy(sheet_from_range(&range));
        assert_eq!(sheet.headers, vec!["Employee ID", "Hours", "2024"]);
        assert_eq!(sheet.rows[0].line, 2);
        assert_eq!(
            sheet.rows[0].cells,
            vec![text("E001"), RawCell::Float(7.5), RawCell::Bool(true)]
        );
        assert_eq!(sheet.rows[1].cells[1], RawCell::Int(8));
        assert_eq!(sheet.rows[1].cells[2], RawCell::Empty);
    }

    #[test]
    fn spreadsheet_line_numbers_follow_used_range() {
        let mut range: Range<Data> = Range::new((3, 0), (4, 0));
        range.set_value((3, 0), Data::String("name".into()));
        range.set_value((4, 0), Data::String("Asha".into()));

        let sheet = sheet_from_range(&range);
        assert_eq!(sheet.rows[0].line, 5);
    }
}
