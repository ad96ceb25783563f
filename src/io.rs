use std::fs::File;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use polars::prelude::*;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Cell contents treated as missing in every sheet.
pub const MISSING_TOKENS: [&str; 4] = ["", "NA", "NaN", "."];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    Plain,
    Gzip,
    Bzip2,
}

impl Compression {
    fn from_path(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("gz") => Compression::Gzip,
            Some("bz2") => Compression::Bzip2,
            _ => Compression::Plain,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Tab,
    Semicolon,
    Comma,
    Whitespace,
}

impl Delimiter {
    /// Picks the separator that splits the header into the most fields.
    /// Ties go to tab, then `;`, then `,`; exports with a decimal comma
    /// separate fields with `;`.
    pub fn sniff(header: &str) -> Self {
        let mut best = (0, Delimiter::Whitespace);
        for candidate in [Delimiter::Tab, Delimiter::Semicolon, Delimiter::Comma] {
            let Some(byte) = candidate.byte() else { continue };
            let count = count_unquoted(header, char::from(byte));
            if count > best.0 {
                best = (count, candidate);
            }
        }
        best.1
    }

    fn byte(self) -> Option<u8> {
        match self {
            Delimiter::Tab => Some(b'\t'),
            Delimiter::Semicolon => Some(b';'),
            Delimiter::Comma => Some(b','),
            Delimiter::Whitespace => None,
        }
    }
}

fn count_unquoted(line: &str, separator: char) -> usize {
    let mut quoted = false;
    let mut count = 0;
    for c in line.chars() {
        if c == '"' {
            quoted = !quoted;
        } else if c == separator && !quoted {
            count += 1;
        }
    }
    count
}

/// Reads a delimited text export of one sheet. Every column is read as text;
/// numeric coercion happens during cleaning so that bad tokens can be counted.
pub fn read_table(path: &Path) -> Result<DataFrame> {
    match Compression::from_path(path) {
        Compression::Plain => read_plain(path),
        compression => {
            let tmp = decompress(path, compression)?;
            read_plain(tmp.path())
        }
    }
}

fn decompress(path: &Path, compression: Compression) -> Result<NamedTempFile> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader: Box<dyn Read> = match compression {
        Compression::Gzip => Box::new(GzDecoder::new(file)),
        Compression::Bzip2 => Box::new(BzDecoder::new(file)),
        Compression::Plain => Box::new(file),
    };
    let mut tmp = NamedTempFile::new()?;
    std::io::copy(&mut reader, &mut tmp)
        .with_context(|| format!("decompress {}", path.display()))?;
    Ok(tmp)
}

fn read_plain(path: &Path) -> Result<DataFrame> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut header = String::new();
    reader.read_line(&mut header)?;
    if header.trim().is_empty() {
        anyhow::bail!("{} has no header line", path.display());
    }

    let df = match Delimiter::sniff(&header).byte() {
        Some(separator) => CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .with_parse_options(
                CsvParseOptions::default()
                    .with_separator(separator)
                    .with_null_values(Some(NullValues::AllColumns(
                        MISSING_TOKENS.iter().map(|t| (*t).into()).collect(),
                    )))
                    .with_missing_is_null(true),
            )
            .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
            .finish()
            .with_context(|| format!("read {}", path.display()))?,
        None => read_whitespace(&header, reader)?,
    };
    tidy_text_columns(df)
}

fn read_whitespace<R: BufRead>(header: &str, reader: R) -> Result<DataFrame> {
    let names = tokens(header);
    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); names.len()];
    let mut ragged = 0usize;
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields = tokens(&line);
        if fields.len() > names.len() {
            ragged += 1;
            debug!("line {}: {} field(s), header has {}", i + 2, fields.len(), names.len());
        }
        let mut row = fields.into_iter();
        for column in cells.iter_mut() {
            column.push(row.next());
        }
    }
    if ragged > 0 {
        warn!(
            "{ragged} row(s) have more fields than the header; the extra fields were ignored"
        );
    }
    let columns: Vec<Column> = names
        .iter()
        .zip(cells)
        .map(|(name, values)| Column::new(name.as_str().into(), values))
        .collect();
    Ok(DataFrame::from_iter(columns))
}

/// Splits on whitespace outside double quotes.
fn tokens(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in line.chars() {
        match c {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn is_missing(cell: &str) -> bool {
    MISSING_TOKENS
        .iter()
        .any(|t| cell.eq_ignore_ascii_case(t))
}

/// Trims text cells and turns padded missing markers (` NA `) into nulls.
fn tidy_text_columns(mut df: DataFrame) -> Result<DataFrame> {
    let names: Vec<PlSmallStr> = df.get_column_names().into_iter().cloned().collect();
    for name in names {
        let column = df.column(&name)?;
        if column.dtype() != &DataType::String {
            continue;
        }
        let values: Vec<Option<String>> = column
            .as_materialized_series()
            .str()?
            .into_iter()
            .map(|v| {
                v.map(str::trim)
                    .filter(|s| !is_missing(s))
                    .map(str::to_string)
            })
            .collect();
        df.with_column(Column::new(name, values))?;
    }
    Ok(df)
}

/// Writes a frame as tab-separated text.
pub fn write_dataframe(df: &DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    let mut df = df.clone();
    CsvWriter::new(&mut file)
        .with_separator(b'\t')
        .finish(&mut df)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn write_text(text: &str, path: &Path) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    file.write_all(text.as_bytes())?;
    Ok(())
}
