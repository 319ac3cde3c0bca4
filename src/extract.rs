use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use tar::Archive;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

/// Unpack the tar container at `archive` into `dest`. The members are staged
/// into a temporary directory next to `dest` and renamed into place, so
/// `dest` never holds a half-unpacked tree.
#[instrument(level = "info", skip(archive, dest), fields(archive = %archive.display()))]
pub fn unpack_container(archive: &Path, dest: &Path) -> Result<()> {
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    let staging = tempfile::tempdir_in(parent).context("creating unpack staging directory")?;

    let file =
        File::open(archive).with_context(|| format!("opening archive {}", archive.display()))?;
    Archive::new(BufReader::new(file))
        .unpack(staging.path())
        .with_context(|| format!("unpacking {}", archive.display()))?;

    let staged = staging.keep();
    fs::rename(&staged, dest).with_context(|| {
        format!("moving unpacked container into place at {}", dest.display())
    })?;
    info!(dest = %dest.display(), "container unpacked");
    Ok(())
}

/// Decompress every `.gz` member directly under `container` into its own
/// directory beneath `members`: `<base>.<ext>.gz` becomes
/// `<members>/<base>/<base>.<ext>`. Returns the written paths.
#[instrument(level = "info", skip(container, members), fields(container = %container.display()))]
pub fn decompress_members(container: &Path, members: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(members).with_context(|| format!("creating {}", members.display()))?;

    let mut written = Vec::new();
    let entries =
        fs::read_dir(container).with_context(|| format!("listing {}", container.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("listing {}", container.display()))?;
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(inner) = file_name.strip_suffix(".gz") else {
            continue;
        };
        if inner.is_empty() || !path.is_file() {
            continue;
        }

        // "GSE1234_annotations.txt.gz" -> member "GSE1234_annotations",
        // decompressed file keeps the inner ".txt" extension.
        let (base, out_name) = match inner.rsplit_once('.') {
            Some((base, _ext)) if !base.is_empty() => (base, inner),
            _ => {
                warn!(member = file_name, "member has no inner extension");
                (inner, inner)
            }
        };

        let member_dir = members.join(base);
        fs::create_dir_all(&member_dir)
            .with_context(|| format!("creating {}", member_dir.display()))?;
        let out_path = member_dir.join(out_name);

        let gz = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
        let mut decoder = GzDecoder::new(BufReader::new(gz));
        let mut tmp =
            NamedTempFile::new_in(&member_dir).context("creating member staging file")?;
        io::copy(&mut decoder, &mut tmp)
            .with_context(|| format!("decompressing {}", path.display()))?;
        tmp.persist(&out_path)
            .with_context(|| format!("persisting {}", out_path.display()))?;

        debug!(member = %out_path.display(), "member decompressed");
        written.push(out_path);
    }

    info!(count = written.len(), "members decompressed");
    Ok(written)
}
