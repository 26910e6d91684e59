// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::{self, Write};

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::NamedUtf8TempFile;
use sha2::{Digest, Sha256};

/// A file copied into the canonical output directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishedArtifact {
    pub path: Utf8PathBuf,
    pub length: u64,
    pub sha256: [u8; 32],
}

impl PublishedArtifact {
    pub fn sha256_hex(&self) -> String {
        hex::encode(self.sha256)
    }
}

/// Copies `source` to `destination_dir/destination_name`.
///
/// `destination_dir` is created if it is missing, and a file already at the
/// destination is removed before the new copy lands. This is not
/// transactional: if the process dies mid-copy, the destination may be
/// missing.
pub fn publish(
    log: &slog::Logger,
    source: &Utf8Path,
    destination_dir: &Utf8Path,
    destination_name: &str,
) -> Result<PublishedArtifact> {
    let log = log.new(slog::o!("component" => "Publisher"));

    fs_err::create_dir_all(destination_dir)?;
    let destination = destination_dir.join(destination_name);
    if remove_existing(&destination)? {
        slog::debug!(log, "removed previous copy of {}", destination);
    }

    let mut reader = fs_err::File::open(source)?;
    let permissions = reader.metadata()?.permissions();
    let mut writer = ArtifactWriter::new(destination_dir)?;
    io::copy(&mut reader, &mut writer).with_context(|| {
        format!("error copying {source} to {destination}")
    })?;
    let published = writer.finish(&destination, permissions)?;

    slog::info!(
        log,
        "published {} -> {}", source, published.path;
        "length" => published.length,
        "sha256" => published.sha256_hex(),
    );
    Ok(published)
}

/// Removes the file at `path` if there is one.
///
/// Returns true if a file was removed.
pub fn remove_existing(path: &Utf8Path) -> Result<bool> {
    match fs_err::remove_file(path) {
        Ok(()) => Ok(true),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(error) => Err(error.into()),
    }
}

/// Writes to a temporary file next to the destination, hashing as it goes.
struct ArtifactWriter {
    file: NamedUtf8TempFile,
    length: u64,
    hasher: Sha256,
}

impl ArtifactWriter {
    fn new(dir: &Utf8Path) -> Result<Self> {
        let file = NamedUtf8TempFile::new_in(dir).with_context(|| {
            format!("error creating temporary file in {dir}")
        })?;
        Ok(Self { file, length: 0, hasher: Sha256::default() })
    }

    fn finish(
        self,
        destination: &Utf8Path,
        permissions: std::fs::Permissions,
    ) -> Result<PublishedArtifact> {
        let sha256 = self.hasher.finalize().into();
        // Temporary files are created owner-only; keep the source's mode.
        fs_err::set_permissions(self.file.path(), permissions)?;
        self.file
            .persist(destination)
            .with_context(|| format!("error persisting {destination}"))?;
        Ok(PublishedArtifact {
            path: destination.to_owned(),
            length: self.length,
            sha256,
        })
    }
}

impl Write for ArtifactWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.file.write(buf)?;
        self.length += n as u64;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
