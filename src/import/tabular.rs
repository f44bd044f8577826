use super::error::ImportError;
use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;

/// Raw header text to raw cell text for one data row.
pub type RowMap = HashMap<String, String>;

/// Institutional workbook exports carry three decorative rows above the
/// header. They are dropped whatever they contain.
pub const WORKBOOK_SKIPPED_ROWS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    DelimitedText,
    Workbook,
}

impl SourceFormat {
    pub fn from_file_name(file_name: &str) -> Result<Self, ImportError> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("csv") => Ok(SourceFormat::DelimitedText),
            Some("xlsx") | Some("xls") => Ok(SourceFormat::Workbook),
            _ => Err(ImportError::UnsupportedFormat {
                file_name: file_name.to_string(),
            }),
        }
    }
}

/// Streams delimited text one record at a time. Header is the first line.
pub struct DelimitedRows<R: Read> {
    reader: csv::Reader<R>,
    headers: Vec<String>,
    record: csv::ByteRecord,
}

impl<R: Read> DelimitedRows<R> {
    pub fn new(input: R) -> Result<Self, ImportError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(input);
        let headers = reader
            .byte_headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let text = String::from_utf8_lossy(h);
                if i == 0 {
                    text.trim_start_matches('\u{feff}').to_string()
                } else {
                    text.into_owned()
                }
            })
            .collect();
        Ok(Self {
            reader,
            headers,
            record: csv::ByteRecord::new(),
        })
    }
}

impl<R: Read> Iterator for DelimitedRows<R> {
    type Item = Result<RowMap, ImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_byte_record(&mut self.record) {
            Ok(false) => None,
            Ok(true) => Some(Ok(self
                .headers
                .iter()
                .zip(self.record.iter())
                .map(|(h, v)| (h.clone(), String::from_utf8_lossy(v).into_owned()))
                .collect())),
            Err(e) => Some(Err(e.into())),
        }
    }
}

/// Parses the first sheet fully into memory.
pub fn read_workbook_rows(bytes: Vec<u8>) -> Result<Vec<RowMap>, ImportError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = match workbook.worksheet_range_at(0) {
        Some(r) => r?,
        None => return Ok(Vec::new()),
    };
    Ok(rows_from_range(&range))
}

fn rows_from_range(range: &Range<Data>) -> Vec<RowMap> {
    // Range only covers the used area, so offsets are computed on physical rows.
    let Some((start_row, _)) = range.start() else {
        return Vec::new();
    };
    let mut headers: Vec<Option<String>> = Vec::new();
    let mut rows = Vec::new();
    for (i, cells) in range.rows().enumerate() {
        let physical_row = start_row as usize + i;
        if physical_row < WORKBOOK_SKIPPED_ROWS {
            continue;
        }
        if physical_row == WORKBOOK_SKIPPED_ROWS {
            headers = cells.iter().map(cell_text).collect();
            continue;
        }
        let row: RowMap = headers
            .iter()
            .zip(cells)
            .filter_map(|(h, c)| Some((h.clone()?, cell_text(c)?)))
            .collect();
        // Blank rows carry no outcome at all.
        if row.is_empty() {
            continue;
        }
        rows.push(row);
    }
    rows
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        other => {
            let text = other.to_string();
            (!text.is_empty()).then_some(text)
        }
    }
}

pub enum RowSource {
    Delimited(DelimitedRows<BufReader<File>>),
    Workbook(std::vec::IntoIter<RowMap>),
}

impl RowSource {
    pub fn open(path: &Path, format: SourceFormat) -> Result<Self, ImportError> {
        match format {
            SourceFormat::DelimitedText => {
                let file = File::open(path).map_err(ImportError::Upload)?;
                Ok(RowSource::Delimited(DelimitedRows::new(BufReader::new(file))?))
            }
            SourceFormat::Workbook => {
                let bytes = std::fs::read(path).map_err(ImportError::Upload)?;
                Ok(RowSource::Workbook(read_workbook_rows(bytes)?.into_iter()))
            }
        }
    }
}

impl Iterator for RowSource {
    type Item = Result<RowMap, ImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            RowSource::Delimited(rows) => rows.next(),
            RowSource::Workbook(rows) => rows.next().map(Ok),
        }
    }
}
