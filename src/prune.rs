use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::glob;
use tracing::info;

use crate::table::Table;

/// Artifact name the pruner targets.
pub const TARGET_TABLE: &str = "Probes.tsv";
/// Name the pruned sibling is written under.
pub const PRUNED_TABLE: &str = "Probes_fixed.tsv";

/// Annotation columns stripped from every probes table. A source table
/// lacking any of them has drifted from the expected schema, which surfaces
/// as [`crate::error::Error::MissingColumn`].
pub const REMOVED_COLUMNS: &[&str] = &[
    "Definition",
    "Ontology_Component",
    "Ontology_Process",
    "Ontology_Function",
    "Synonyms",
    "Obsolete_Probe_Id",
    "Probe_Sequence",
];

/// Prune one probes artifact, writing [`PRUNED_TABLE`] beside it. The source
/// artifact is left untouched.
pub fn prune_probes(path: &Path) -> Result<PathBuf> {
    let table = Table::read_tsv(path)?;
    let pruned = table.drop_columns(REMOVED_COLUMNS, path)?;

    let out = path.with_file_name(PRUNED_TABLE);
    pruned
        .write_tsv(&out)
        .with_context(|| format!("writing {}", out.display()))?;
    info!(from = %path.display(), rows = pruned.rows.len(), "pruned probe annotations");
    Ok(out)
}

/// Prune every artifact matching `pattern` independently, one pruned sibling
/// per match.
pub fn prune_all(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for entry in glob(pattern).with_context(|| format!("invalid glob pattern {pattern}"))? {
        let path = entry.context("reading glob entry")?;
        written.push(prune_probes(&path)?);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use tempfile::tempdir;

    fn probes_table(extra: &[&str]) -> Table {
        let mut columns: Vec<String> = vec!["Probe_Id".to_string()];
        columns.extend(REMOVED_COLUMNS.iter().map(|c| c.to_string()));
        columns.extend(extra.iter().map(|c| c.to_string()));

        let row: Vec<String> = (0..columns.len()).map(|i| format!("v{i}")).collect();
        Table {
            columns: Some(columns),
            rows: vec![row],
        }
    }

    #[test]
    fn prunes_the_fixed_column_set() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(TARGET_TABLE);
        probes_table(&["Chromosome"]).write_tsv(&path).unwrap();

        let out = prune_probes(&path).unwrap();
        assert_eq!(out, dir.path().join(PRUNED_TABLE));

        let pruned = Table::read_tsv(&out).unwrap();
        assert_eq!(
            pruned.columns.as_deref(),
            Some(&["Probe_Id".to_string(), "Chromosome".to_string()][..])
        );
        assert_eq!(pruned.rows.len(), 1);
        // The source artifact is untouched.
        assert!(path.exists());
    }

    #[test]
    fn missing_column_is_surfaced_and_nothing_is_written() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(TARGET_TABLE);
        Table {
            columns: Some(vec!["Probe_Id".to_string(), "Definition".to_string()]),
            rows: vec![],
        }
        .write_tsv(&path)
        .unwrap();

        let err = prune_probes(&path).unwrap_err();
        match err.downcast_ref::<Error>() {
            Some(Error::MissingColumn { column, .. }) => {
                assert_eq!(column, "Ontology_Component");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!dir.path().join(PRUNED_TABLE).exists());
    }

    #[test]
    fn prune_all_handles_every_match_independently() {
        let dir = tempdir().unwrap();
        for member in ["a", "b"] {
            let member_dir = dir.path().join(member);
            std::fs::create_dir_all(&member_dir).unwrap();
            probes_table(&[]).write_tsv(&member_dir.join(TARGET_TABLE)).unwrap();
        }

        let pattern = format!("{}/*/{}", dir.path().display(), TARGET_TABLE);
        let written = prune_all(&pattern).unwrap();
        assert_eq!(written.len(), 2);
        assert!(dir.path().join("a").join(PRUNED_TABLE).exists());
        assert!(dir.path().join("b").join(PRUNED_TABLE).exists());
    }
}
