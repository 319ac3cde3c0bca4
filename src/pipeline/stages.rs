//! Concrete wiring of the six dataset stages over a [`Layout`].

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use reqwest::blocking::Client;

use super::{OutputDescriptor, Pipeline, Stage};
use crate::config::Layout;
use crate::extract;
use crate::fetch::{self, DownloadProgress};
use crate::prune;
use crate::split;

/// The two values a pipeline invocation is parameterized by. They are
/// threaded unchanged through the whole chain.
#[derive(Debug, Clone)]
pub struct PipelineParams {
    /// Source archive URL.
    pub url: String,
    /// Filename the archive is stored under inside the data directory.
    pub archive_name: String,
}

/// Build the full pipeline:
///
/// `download` → `unpack-container` → `decompress-members` →
/// `split-sections` → `prune-probes`, with `sweep-raw` waiting on both
/// `decompress-members` and `prune-probes` so the raw text files are only
/// deleted once every downstream artifact exists.
pub fn build(params: &PipelineParams, layout: &Layout) -> Result<Pipeline> {
    let archive = layout.archive_path(&params.archive_name);
    let container = layout.container_path();
    let members = layout.members_path();

    let member_dirs_pattern = format!("{}/*", members.display());
    let txt_pattern = format!("{}/*/*.txt", members.display());
    let tsv_pattern = format!("{}/*/*.tsv", members.display());
    let probes_pattern = format!("{}/*/{}", members.display(), prune::TARGET_TABLE);
    let pruned_pattern = format!("{}/*/{}", members.display(), prune::PRUNED_TABLE);

    let mut pipeline = Pipeline::new();

    let url = params.url.clone();
    let dest = archive.clone();
    pipeline.add(
        Stage::new("download", move || {
            let client = Client::new();
            fetch::download(&client, &url, &dest, &DownloadProgress::new())
        })
        .output(OutputDescriptor::Path(archive.clone())),
    )?;

    let src = archive;
    let dest = container.clone();
    pipeline.add(
        Stage::new("unpack-container", move || {
            extract::unpack_container(&src, &dest)
        })
        .after("download")
        .output(OutputDescriptor::Path(container.clone())),
    )?;

    let src = container;
    let dest = members;
    pipeline.add(
        Stage::new("decompress-members", move || {
            extract::decompress_members(&src, &dest).map(|_| ())
        })
        .after("unpack-container")
        // The member directories, not the raw text files: those are swept at
        // the end of the run, and a rerun must still see this stage as done.
        .output(OutputDescriptor::Matches(member_dirs_pattern)),
    )?;

    let sources = txt_pattern.clone();
    pipeline.add(
        Stage::new("split-sections", move || {
            for path in matches_of(&sources)? {
                split::split_to_tsv(&path)?;
            }
            Ok(())
        })
        .after("decompress-members")
        .output(OutputDescriptor::Matches(tsv_pattern)),
    )?;

    pipeline.add(
        Stage::new("prune-probes", move || {
            prune::prune_all(&probes_pattern).map(|_| ())
        })
        .after("split-sections")
        .output(OutputDescriptor::Matches(pruned_pattern)),
    )?;

    let raws = txt_pattern.clone();
    pipeline.add(
        Stage::new("sweep-raw", move || {
            for path in matches_of(&raws)? {
                fs::remove_file(&path)
                    .with_context(|| format!("removing {}", path.display()))?;
            }
            Ok(())
        })
        .after("decompress-members")
        .after("prune-probes")
        .output(OutputDescriptor::Swept(txt_pattern)),
    )?;

    Ok(pipeline)
}

fn matches_of(pattern: &str) -> Result<Vec<PathBuf>> {
    glob::glob(pattern)
        .with_context(|| format!("invalid glob pattern {pattern}"))?
        .collect::<Result<Vec<_>, _>>()
        .context("reading glob entry")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::StageStatus;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::collections::BTreeMap;
    use std::io::Write;
    use std::path::Path;
    use tempfile::tempdir;

    const ANNOTATIONS: &str = "\
[Heading]\n\
Illumina Inc.\tGenomeStudio\n\
Normalization\tnone\n\
[Samples]\n\
Sample_Id\tStatus\n\
GSM1\tok\n\
[Probes]\n\
Probe_Id\tDefinition\tOntology_Component\tOntology_Process\tOntology_Function\tSynonyms\tObsolete_Probe_Id\tProbe_Sequence\tChromosome\n\
ILMN_1\td\tc\tp\tf\ts\to\tACGT\t7\n\
ILMN_2\td\tc\tp\tf\ts\to\tTGCA\tX\n";

    fn build_archive(path: &Path, members: &[(&str, &str)]) {
        let file = std::fs::File::create(path).unwrap();
        let mut builder = tar::Builder::new(file);
        for (name, text) in members {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(text.as_bytes()).unwrap();
            let bytes = encoder.finish().unwrap();

            let mut header = tar::Header::new_gnu();
            header.set_size(bytes.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, bytes.as_slice()).unwrap();
        }
        builder.finish().unwrap();
    }

    /// Collect every artifact under the members directory, keyed by path
    /// relative to it.
    fn artifacts(members: &Path) -> BTreeMap<String, Vec<u8>> {
        let mut found = BTreeMap::new();
        for entry in glob::glob(&format!("{}/*/*", members.display())).unwrap() {
            let path = entry.unwrap();
            let rel = path.strip_prefix(members).unwrap();
            found.insert(
                rel.to_string_lossy().into_owned(),
                std::fs::read(&path).unwrap(),
            );
        }
        found
    }

    #[test]
    fn full_run_materializes_every_artifact_and_reruns_change_nothing() {
        let dir = tempdir().unwrap();
        let layout = Layout {
            data_dir: dir.path().join("data"),
            ..Layout::default()
        };
        let params = PipelineParams {
            url: "http://localhost/never-contacted".to_string(),
            archive_name: "GSE1_RAW.tar".to_string(),
        };

        // Pre-seed the archive so the download stage is already satisfied;
        // no network is touched.
        std::fs::create_dir_all(&layout.data_dir).unwrap();
        build_archive(
            &layout.archive_path(&params.archive_name),
            &[("GSE1_anno.txt.gz", ANNOTATIONS)],
        );

        let report = build(&params, &layout).unwrap().run().unwrap();
        assert_eq!(report.status("download"), Some(StageStatus::Satisfied));
        for stage in [
            "unpack-container",
            "decompress-members",
            "split-sections",
            "prune-probes",
            "sweep-raw",
        ] {
            assert_eq!(report.status(stage), Some(StageStatus::Ran), "{stage}");
        }

        let member = layout.members_path().join("GSE1_anno");
        for artifact in ["Heading.tsv", "Samples.tsv", "Probes.tsv", "Probes_fixed.tsv"] {
            assert!(member.join(artifact).exists(), "{artifact}");
        }
        // The raw decompressed text is swept, the container copy is not.
        assert!(!member.join("GSE1_anno.txt").exists());
        assert!(layout.container_path().join("GSE1_anno.txt.gz").exists());

        let pruned =
            std::fs::read_to_string(member.join("Probes_fixed.tsv")).unwrap();
        assert_eq!(
            pruned,
            "\tProbe_Id\tChromosome\n0\tILMN_1\t7\n1\tILMN_2\tX\n"
        );

        // A second invocation skips every stage and leaves every artifact
        // byte-identical.
        let before = artifacts(&layout.members_path());
        let report = build(&params, &layout).unwrap().run().unwrap();
        for (stage, status) in &report.stages {
            assert_eq!(*status, StageStatus::Satisfied, "{stage}");
        }
        assert_eq!(artifacts(&layout.members_path()), before);
    }

    #[test]
    fn sweep_is_not_ready_until_pruned_tables_exist() {
        let dir = tempdir().unwrap();
        let layout = Layout {
            data_dir: dir.path().join("data"),
            ..Layout::default()
        };
        let params = PipelineParams {
            url: "http://localhost/never-contacted".to_string(),
            archive_name: "GSE1_RAW.tar".to_string(),
        };

        // Partial state: raw members decompressed, nothing split or pruned.
        let member_dir = layout.members_path().join("GSE1_anno");
        std::fs::create_dir_all(&member_dir).unwrap();
        std::fs::write(member_dir.join("GSE1_anno.txt"), ANNOTATIONS).unwrap();

        let pipeline = build(&params, &layout).unwrap();
        assert!(!pipeline.ready("sweep-raw").unwrap());

        // Once a pruned table exists alongside, the sweep is unblocked.
        std::fs::write(member_dir.join(prune::PRUNED_TABLE), "\tProbe_Id\n").unwrap();
        assert!(pipeline.ready("sweep-raw").unwrap());
    }
}
