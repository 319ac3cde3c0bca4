use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};

use crate::table::Table;

/// A mid-file section under this name has no column-name row.
pub const HEADERLESS_SECTION: &str = "Heading";

/// Split one decompressed annotation file into its bracket-delimited
/// sections.
///
/// A line of the form `[Name]` opens a section; every following line up to
/// the next marker (or end of file) belongs to it. Lines ahead of the first
/// marker belong to no section and are dropped, so a file without markers
/// yields zero tables. When two sections share a name the later one wins.
///
/// A mid-file section named `Heading` is parsed without a header row; every
/// other section takes its first line as the header. The final section is
/// always parsed header-present, even when it is named `Heading`.
#[instrument(level = "debug", skip(path), fields(file = %path.as_ref().display()))]
pub fn split_sections(path: impl AsRef<Path>) -> Result<BTreeMap<String, Table>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);

    let mut tables: BTreeMap<String, Table> = BTreeMap::new();
    let mut current: Option<String> = None;
    let mut buffer = String::new();

    for line in reader.lines() {
        let line = line.with_context(|| format!("reading {}", path.display()))?;
        let line = line.trim_end_matches('\r');

        if line.starts_with('[') {
            if let Some(name) = current.take() {
                let has_header = name != HEADERLESS_SECTION;
                register(&mut tables, name, Table::from_tsv_text(&buffer, has_header)?);
            }
            buffer.clear();
            current = Some(
                line.trim()
                    .trim_matches(|c| c == '[' || c == ']')
                    .to_string(),
            );
            continue;
        }

        if current.is_some() && !line.trim().is_empty() {
            buffer.push_str(line);
            buffer.push('\n');
        }
    }

    // The last section closes out header-present regardless of its name.
    if let Some(name) = current {
        register(&mut tables, name, Table::from_tsv_text(&buffer, true)?);
    }

    debug!(sections = tables.len(), "split complete");
    Ok(tables)
}

fn register(tables: &mut BTreeMap<String, Table>, name: String, table: Table) {
    if tables.contains_key(&name) {
        warn!(section = %name, "duplicate section name, keeping the later one");
    }
    tables.insert(name, table);
}

/// Split `path` and persist each discovered section as `<Name>.tsv` in the
/// same directory as the source file. Returns the written paths.
pub fn split_to_tsv(path: &Path) -> Result<Vec<PathBuf>> {
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let tables = split_sections(path)?;

    let mut written = Vec::with_capacity(tables.len());
    for (name, table) in &tables {
        let out = dir.join(format!("{name}.tsv"));
        table
            .write_tsv(&out)
            .with_context(|| format!("writing {}", out.display()))?;
        debug!(section = %name, rows = table.rows.len(), "materialized section");
        written.push(out);
    }
    Ok(written)
}
