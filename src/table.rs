//! Semicolon-delimited tables with a header row.
//!
//! Fields holding the delimiter, a quote or a line break are wrapped in
//! double quotes with inner quotes doubled; the reader accepts the same form.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Column separator.
pub const DELIMITER: char = ';';

/// Failures reading or writing delimited files.
#[derive(Debug, Error)]
pub enum TableError {
    /// Input file could not be read.
    #[error("failed to read {path:?}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
    /// Output file could not be written.
    #[error("failed to write {path:?}: {source}")]
    Write {
        /// File path.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
    /// A required column is absent from the header.
    #[error("{path:?} has no '{column}' column")]
    MissingColumn {
        /// File path.
        path: PathBuf,
        /// Column name.
        column: String,
    },
    /// The file content could not be split into rows.
    #[error("{path:?} line {line}: {reason}")]
    Malformed {
        /// File path.
        path: PathBuf,
        /// 1-based line where the problem starts.
        line: usize,
        /// Description.
        reason: &'static str,
    },
}

/// A row type with a fixed column layout.
pub trait TableRow {
    /// Column names, in output order.
    const HEADER: &'static [&'static str];

    /// Field values aligned with [`TableRow::HEADER`].
    fn fields(&self) -> Vec<&str>;
}

/// A parsed table: header plus data rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    path: PathBuf,
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Reads and parses a delimited file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| TableError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &text)
    }

    fn parse(path: &Path, text: &str) -> Result<Self, TableError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut records = split_records(text).map_err(|(line, reason)| TableError::Malformed {
            path: path.to_path_buf(),
            line,
            reason,
        })?;
        records.retain(|fields| !(fields.len() == 1 && fields[0].trim().is_empty()));
        if records.is_empty() {
            return Err(TableError::Malformed {
                path: path.to_path_buf(),
                line: 1,
                reason: "missing header row",
            });
        }
        let header = records.remove(0);
        Ok(Self {
            path: path.to_path_buf(),
            header,
            rows: records,
        })
    }

    /// Index of `name` in the header.
    pub fn column(&self, name: &str) -> Result<usize, TableError> {
        self.header
            .iter()
            .position(|column| column.trim() == name)
            .ok_or_else(|| TableError::MissingColumn {
                path: self.path.clone(),
                column: name.to_string(),
            })
    }

    /// Data rows.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }
}

fn split_records(text: &str) -> Result<Vec<Vec<String>>, (usize, &'static str)> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1usize;
    let mut quote_line = 0usize;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            match ch {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(ch);
                }
                _ => field.push(ch),
            }
            continue;
        }
        match ch {
            '"' if field.is_empty() => {
                in_quotes = true;
                quote_line = line;
            }
            c if c == DELIMITER => fields.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut fields));
                line += 1;
            }
            _ => field.push(ch),
        }
    }
    if in_quotes {
        return Err((quote_line, "unterminated quoted field"));
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        records.push(fields);
    }
    Ok(records)
}

fn escape_field(field: &str) -> String {
    if field.contains([DELIMITER, '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// What [`write_rows`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// File written with this many data rows.
    Written(usize),
    /// No rows, so no file was created.
    Skipped,
}

/// Writes a header plus `rows` to `path`, replacing any previous file.
///
/// An empty slice leaves the filesystem untouched.
pub fn write_rows<R: TableRow>(
    path: impl AsRef<Path>,
    rows: &[R],
) -> Result<WriteOutcome, TableError> {
    let path = path.as_ref();
    if rows.is_empty() {
        return Ok(WriteOutcome::Skipped);
    }
    let wrap = |source| TableError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(wrap)?;
    }
    let mut writer = BufWriter::new(File::create(path).map_err(wrap)?);
    writeln!(writer, "{}", R::HEADER.join(";")).map_err(wrap)?;
    for row in rows {
        let line: Vec<String> = row.fields().into_iter().map(escape_field).collect();
        writeln!(writer, "{}", line.join(";")).map_err(wrap)?;
    }
    writer.flush().map_err(wrap)?;
    Ok(WriteOutcome::Written(rows.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::SeedName;

    #[test]
    fn reads_header_and_quoted_fields() {
        let table = Table::parse(
            Path::new("seed.csv"),
            "givennameLabel;qid\r\nAnna;Q1\n\"Jean; Marie\";\"Q\"\"2\"\n\n",
        )
        .expect("parse");
        assert_eq!(table.column("qid").expect("qid"), 1);
        assert_eq!(
            table.rows(),
            &[
                vec!["Anna".to_string(), "Q1".to_string()],
                vec!["Jean; Marie".to_string(), "Q\"2".to_string()],
            ]
        );
    }

    #[test]
    fn missing_column_and_unterminated_quotes_are_errors() {
        let table = Table::parse(Path::new("x"), "label;id\nA;Q1").expect("parse");
        assert!(matches!(
            table.column("qid"),
            Err(TableError::MissingColumn { .. })
        ));
        assert!(matches!(
            Table::parse(Path::new("x"), "a;b\n\"open;Q1\n"),
            Err(TableError::Malformed { line: 2, .. })
        ));
        assert!(matches!(
            Table::parse(Path::new("x"), ""),
            Err(TableError::Malformed { .. })
        ));
    }

    #[test]
    fn writes_round_trippable_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("seeds.csv");
        let rows = vec![
            SeedName {
                label: "Jean; \"JJ\"".into(),
                qid: "Q1".into(),
            },
            SeedName {
                label: "Anna".into(),
                qid: "Q2".into(),
            },
        ];
        assert_eq!(write_rows(&path, &rows).expect("write"), WriteOutcome::Written(2));

        let text = fs::read_to_string(&path).expect("read back");
        assert_eq!(text, "givennameLabel;qid\n\"Jean; \"\"JJ\"\"\";Q1\nAnna;Q2\n");
        let table = Table::read(&path).expect("parse");
        assert_eq!(table.rows()[0][0], "Jean; \"JJ\"");
    }

    #[test]
    fn empty_rows_create_no_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.csv");
        let outcome = write_rows::<SeedName>(&path, &[]).expect("write");
        assert_eq!(outcome, WriteOutcome::Skipped);
        assert!(!path.exists());
    }
}
