// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::NamedUtf8TempFile;
use serde_json::{Map, Value};
use thiserror::Error;
use workbench_release_artifact::{ManifestUpdate, UpdateManifest};

/// An error that occurred while reading or rewriting an update manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("error reading update manifest `{path}`")]
    Read {
        path: Utf8PathBuf,
        #[source]
        error: io::Error,
    },

    #[error("error parsing update manifest `{path}` (at `{field}`)")]
    Parse {
        path: Utf8PathBuf,
        field: String,
        #[source]
        error: serde_json::Error,
    },

    #[error("error serializing update manifest `{path}`")]
    Serialize {
        path: Utf8PathBuf,
        #[source]
        error: serde_json::Error,
    },

    #[error("error writing update manifest `{path}`")]
    Write {
        path: Utf8PathBuf,
        #[source]
        error: io::Error,
    },
}

/// An update manifest as read from disk.
///
/// Keeps the JSON document the manifest was parsed from, so that writing it
/// back changes only the values an update owns. Other entries keep their
/// keys, values and key order.
#[derive(Clone, Debug)]
pub struct ManifestFile {
    manifest: UpdateManifest,
    document: Map<String, Value>,
}

impl ManifestFile {
    /// Returns the parsed manifest.
    pub fn manifest(&self) -> &UpdateManifest {
        &self.manifest
    }

    pub fn into_manifest(self) -> UpdateManifest {
        self.manifest
    }

    /// Merges a platform release into both views of the manifest.
    pub fn apply(&mut self, update: &ManifestUpdate, pub_date: &str) {
        self.manifest.apply(update, pub_date);
        update.apply_to_document(&mut self.document, pub_date);
    }
}

/// Reads and parses the update manifest at `path`.
pub fn read_manifest(path: &Utf8Path) -> Result<UpdateManifest, ManifestError> {
    read_manifest_file(path).map(ManifestFile::into_manifest)
}

/// Reads the update manifest at `path`, keeping its document for rewriting.
pub fn read_manifest_file(
    path: &Utf8Path,
) -> Result<ManifestFile, ManifestError> {
    let input = fs_err::read_to_string(path).map_err(|error| {
        ManifestError::Read { path: path.to_owned(), error }
    })?;
    parse_manifest(path, &input)
}

fn parse_manifest(
    path: &Utf8Path,
    input: &str,
) -> Result<ManifestFile, ManifestError> {
    let parse_error = |field: String, error| ManifestError::Parse {
        path: path.to_owned(),
        field,
        error,
    };

    let value: Value = serde_json::from_str(input)
        .map_err(|error| parse_error(".".to_owned(), error))?;
    let manifest = serde_path_to_error::deserialize(&value).map_err(|error| {
        parse_error(error.path().to_string(), error.into_inner())
    })?;
    let Value::Object(document) = value else {
        return Err(parse_error(
            ".".to_owned(),
            serde::de::Error::custom("expected a JSON object"),
        ));
    };
    Ok(ManifestFile { manifest, document })
}

/// Serializes `file` and replaces the file at `path` with it.
///
/// The document is written with two-space indentation and a trailing newline.
/// It goes to a temporary file in the same directory first, which is then
/// renamed over `path`, so readers never observe a half-written document.
pub fn write_manifest(
    path: &Utf8Path,
    file: &ManifestFile,
) -> Result<(), ManifestError> {
    let mut json =
        serde_json::to_string_pretty(&file.document).map_err(|error| {
            ManifestError::Serialize { path: path.to_owned(), error }
        })?;
    json.push('\n');

    let write_error = |error: io::Error| ManifestError::Write {
        path: path.to_owned(),
        error,
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_str().is_empty() => dir,
        _ => Utf8Path::new("."),
    };
    let mut file = NamedUtf8TempFile::new_in(dir).map_err(write_error)?;
    file.write_all(json.as_bytes()).map_err(write_error)?;
    if let Ok(metadata) = fs_err::metadata(path) {
        fs_err::set_permissions(file.path(), metadata.permissions())
            .map_err(write_error)?;
    }
    file.persist(path).map_err(|error| write_error(error.error))?;
    Ok(())
}

/// Merges a platform release into the update manifest at `path`.
///
/// The manifest must already exist. `pub_date` is stamped as is; callers
/// updating several mirrors render it once so every mirror carries the same
/// value. Only `version`, `pub_date` and the updated platform's entry change
/// in the file. Returns the manifest as written.
pub fn update_manifest(
    log: &slog::Logger,
    path: &Utf8Path,
    update: &ManifestUpdate,
    pub_date: &str,
) -> Result<UpdateManifest, ManifestError> {
    let log = log.new(slog::o!(
        "component" => "ManifestUpdater",
        "path" => path.to_string(),
    ));

    let mut file = read_manifest_file(path)?;
    if let (Some(current), Some(new)) =
        (file.manifest().version.to_semver(), update.version.to_semver())
    {
        if new < current {
            slog::warn!(
                log,
                "manifest currently advertises {}; overwriting it with older \
                 version {}",
                current,
                new
            );
        }
    }

    file.apply(update, pub_date);
    write_manifest(path, &file)?;

    slog::info!(
        log,
        "updated manifest";
        "version" => %update.version,
        "platform" => &update.platform_key,
        "url" => &update.url,
    );
    Ok(file.into_manifest())
}
