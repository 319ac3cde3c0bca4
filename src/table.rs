use std::path::Path;

use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use tempfile::NamedTempFile;

use crate::error::Error;

/// A rectangular dataset of untyped text fields.
///
/// `columns` is `None` for tables derived from a headerless section; such
/// tables are persisted without a header row. Tables are never mutated in
/// place: transformations produce a new `Table`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub columns: Option<Vec<String>>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Parse tab-separated text. When `has_header`, the first record names
    /// the columns. Ragged records are accepted as-is; no coercion is done.
    pub fn from_tsv_text(text: &str, has_header: bool) -> Result<Table> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(has_header)
            .flexible(true)
            .from_reader(text.as_bytes());

        let columns = if has_header {
            let headers = rdr.headers().context("reading header record")?;
            Some(headers.iter().map(str::to_string).collect())
        } else {
            None
        };

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record.context("reading tab-separated record")?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Table { columns, rows })
    }

    /// Read back a persisted artifact in the header-present form produced by
    /// [`Table::write_tsv`]: the first column is the synthetic row index and
    /// is not part of the data.
    pub fn read_tsv(path: &Path) -> Result<Table> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("opening {}", path.display()))?;

        let columns = rdr
            .headers()
            .with_context(|| format!("reading header of {}", path.display()))?
            .iter()
            .skip(1)
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record =
                record.with_context(|| format!("reading record from {}", path.display()))?;
            rows.push(record.iter().skip(1).map(str::to_string).collect());
        }
        Ok(Table {
            columns: Some(columns),
            rows,
        })
    }

    /// Persist as a tab-separated artifact with a 0-based synthetic row index
    /// in the first column. Header tables carry an empty-named index column
    /// in the header row; headerless tables carry no header row at all.
    ///
    /// The artifact is staged in the destination directory and renamed into
    /// place, so `path` never holds a partial write.
    pub fn write_tsv(&self, path: &Path) -> Result<()> {
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let tmp = NamedTempFile::new_in(dir.unwrap_or_else(|| Path::new(".")))
            .context("creating staging file")?;
        {
            let mut wtr = WriterBuilder::new()
                .delimiter(b'\t')
                .flexible(true)
                .from_writer(tmp.as_file());

            if let Some(columns) = &self.columns {
                let mut header = Vec::with_capacity(columns.len() + 1);
                header.push(String::new());
                header.extend(columns.iter().cloned());
                wtr.write_record(&header).context("writing header record")?;
            }
            for (index, row) in self.rows.iter().enumerate() {
                let mut record = Vec::with_capacity(row.len() + 1);
                record.push(index.to_string());
                record.extend(row.iter().cloned());
                wtr.write_record(&record).context("writing data record")?;
            }
            wtr.flush().context("flushing staging file")?;
        }
        tmp.persist(path)
            .with_context(|| format!("persisting {}", path.display()))?;
        Ok(())
    }

    /// Drop the named columns, preserving the order of the survivors and
    /// every row. `origin` names the artifact in the error when a column
    /// from the removal set is absent.
    pub fn drop_columns(&self, names: &[&str], origin: &Path) -> Result<Table, Error> {
        let columns = self.columns.as_deref().unwrap_or(&[]);
        for name in names {
            if !columns.iter().any(|c| c == name) {
                return Err(Error::MissingColumn {
                    column: (*name).to_string(),
                    path: origin.to_path_buf(),
                });
            }
        }

        let keep: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !names.contains(&c.as_str()))
            .map(|(i, _)| i)
            .collect();

        Ok(Table {
            columns: Some(keep.iter().map(|&i| columns[i].clone()).collect()),
            rows: self
                .rows
                .iter()
                .map(|row| keep.iter().filter_map(|&i| row.get(i).cloned()).collect())
                .collect(),
        })
    }
}
