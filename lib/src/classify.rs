// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use workbench_release_artifact::{
    ArtifactRole, CanonicalArtifactName, Platform, PlatformAlias,
    ReleaseVersion, VersionNotFoundError,
};

/// The file names found in a bundler output directory, per subdirectory.
///
/// Names within a subdirectory are sorted, so classification does not depend
/// on the order the filesystem happens to list entries in.
#[derive(Clone, Debug)]
pub struct BundleListing {
    bundle_dir: Utf8PathBuf,
    entries: BTreeMap<String, Vec<String>>,
}

impl BundleListing {
    /// Reads the subdirectories of `bundle_dir` that `platform` uses.
    pub fn scan(bundle_dir: &Utf8Path, platform: Platform) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for subdir in platform.bundle_subdirs() {
            let dir = bundle_dir.join(subdir);
            let mut names = Vec::new();
            for entry in dir
                .read_dir_utf8()
                .with_context(|| format!("error reading entries from {dir}"))?
            {
                let entry = entry.with_context(|| {
                    format!("error reading entry from {dir}")
                })?;
                names.push(entry.file_name().to_owned());
            }
            entries.insert((*subdir).to_owned(), names);
        }
        Ok(Self::from_entries(bundle_dir, entries))
    }

    /// Creates a listing from already-known entries.
    pub fn from_entries<I, S, N>(bundle_dir: &Utf8Path, entries: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<N>)>,
        S: Into<String>,
        N: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(subdir, names)| {
                let mut names: Vec<String> =
                    names.into_iter().map(Into::into).collect();
                names.sort();
                (subdir.into(), names)
            })
            .collect();
        Self { bundle_dir: bundle_dir.to_owned(), entries }
    }

    /// Returns the bundler output directory this listing was taken from.
    pub fn bundle_dir(&self) -> &Utf8Path {
        &self.bundle_dir
    }

    fn names(&self, subdir: &str) -> &[String] {
        self.entries.get(subdir).map(Vec::as_slice).unwrap_or_default()
    }

    fn path(&self, subdir: &str, name: &str) -> Utf8PathBuf {
        self.bundle_dir.join(subdir).join(name)
    }
}

/// Naming inputs shared by every artifact of a run.
#[derive(Clone, Debug)]
pub struct ArtifactNaming {
    pub bundle_name: String,
    pub alias: PlatformAlias,
}

impl ArtifactNaming {
    pub fn new(bundle_name: impl Into<String>, alias: PlatformAlias) -> Self {
        Self { bundle_name: bundle_name.into(), alias }
    }

    pub fn name(
        &self,
        version: &ReleaseVersion,
        suffix: &str,
    ) -> CanonicalArtifactName {
        CanonicalArtifactName::new(
            self.bundle_name.clone(),
            version.clone(),
            self.alias.clone(),
            suffix,
        )
    }
}

/// A bundler output file, and the name it will be published under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifiedArtifact {
    pub source: Utf8PathBuf,
    pub destination: CanonicalArtifactName,
    pub role: ArtifactRole,
}

/// The result of classifying one bundler output directory.
#[derive(Clone, Debug)]
pub struct ClassifiedBundle {
    pub platform: Platform,
    /// The release version, if any qualifying file was found.
    pub version: Option<ReleaseVersion>,
    /// Files to publish, in listing order.
    pub artifacts: Vec<ClassifiedArtifact>,
    /// The `.app` bundle the disk image is built from (macOS only).
    pub app_bundle: Option<Utf8PathBuf>,
    /// The canonical name of the disk image to build (macOS only).
    pub disk_image: Option<CanonicalArtifactName>,
    /// Qualifying files whose names do not contain the release version.
    ///
    /// These are still published under the release version.
    pub version_mismatches: Vec<Utf8PathBuf>,
}

impl ClassifiedBundle {
    fn new(platform: Platform) -> Self {
        Self {
            platform,
            version: None,
            artifacts: Vec::new(),
            app_bundle: None,
            disk_image: None,
            version_mismatches: Vec::new(),
        }
    }

    /// Returns the artifact auto-update clients download.
    pub fn update_artifact(&self) -> Option<&ClassifiedArtifact> {
        self.find_role(self.platform.update_role())
    }

    /// Returns the detached signature of the update artifact.
    pub fn signature(&self) -> Option<&ClassifiedArtifact> {
        self.find_role(ArtifactRole::Signature)
    }

    fn find_role(&self, role: ArtifactRole) -> Option<&ClassifiedArtifact> {
        self.artifacts.iter().find(|artifact| artifact.role == role)
    }

    fn push(
        &mut self,
        artifact: ClassifiedArtifact,
    ) -> Result<(), ClassifyError> {
        if let Some(existing) = self
            .artifacts
            .iter()
            .find(|other| other.destination == artifact.destination)
        {
            return Err(ClassifyError::DuplicateDestination {
                destination: artifact.destination.file_name(),
                first: existing.source.clone(),
                second: artifact.source,
            });
        }
        self.artifacts.push(artifact);
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error(transparent)]
    VersionNotFound(#[from] VersionNotFoundError),

    #[error(
        "cannot name `{path}`: no disk image in `{dmg_dir}` to take the \
         release version from"
    )]
    VersionUndetermined { path: Utf8PathBuf, dmg_dir: Utf8PathBuf },

    #[error(
        "`{first}` and `{second}` would both be published as `{destination}`; \
         remove stale bundler output and try again"
    )]
    DuplicateDestination {
        destination: String,
        first: Utf8PathBuf,
        second: Utf8PathBuf,
    },
}

/// Maps the files of a bundler output directory to canonical names.
///
/// Files with unrecognized suffixes are skipped. The release version is
/// extracted once, from the first qualifying file, and reused for the rest of
/// the run. Two files that would be published under the same name are an
/// error.
pub fn classify(
    log: &slog::Logger,
    listing: &BundleListing,
    platform: Platform,
    naming: &ArtifactNaming,
) -> Result<ClassifiedBundle, ClassifyError> {
    let log = log.new(slog::o!(
        "component" => "Classifier",
        "platform" => platform.to_string(),
    ));
    match platform {
        Platform::Windows => classify_windows(&log, listing, naming),
        Platform::Macos => classify_macos(&log, listing, naming),
    }
}

fn classify_windows(
    log: &slog::Logger,
    listing: &BundleListing,
    naming: &ArtifactNaming,
) -> Result<ClassifiedBundle, ClassifyError> {
    let platform = Platform::Windows;
    let subdir = platform.publish_subdir();
    let mut bundle = ClassifiedBundle::new(platform);

    for name in listing.names(subdir) {
        let source = listing.path(subdir, name);
        let Some(rule) = platform.match_rule(name) else {
            slog::debug!(log, "skipping {}", source);
            continue;
        };

        let version = match &bundle.version {
            Some(version) => {
                let carried = ReleaseVersion::extract(name).ok();
                if carried.as_ref() != Some(version) {
                    slog::warn!(
                        log,
                        "{} does not carry release version {}; \
                         publishing it under that version anyway",
                        source,
                        version
                    );
                    bundle.version_mismatches.push(source.clone());
                }
                version.clone()
            }
            None => {
                let version = ReleaseVersion::extract(name)?;
                slog::info!(
                    log,
                    "parsed release version {} from {}",
                    version,
                    name
                );
                bundle.version = Some(version.clone());
                version
            }
        };

        bundle.push(ClassifiedArtifact {
            destination: naming.name(&version, rule.suffix),
            source,
            role: rule.role,
        })?;
    }

    Ok(bundle)
}

fn classify_macos(
    log: &slog::Logger,
    listing: &BundleListing,
    naming: &ArtifactNaming,
) -> Result<ClassifiedBundle, ClassifyError> {
    let platform = Platform::Macos;
    let mut bundle = ClassifiedBundle::new(platform);

    // The bundler's own disk image is only consulted for the version; a
    // customized one is built from the app bundle later.
    if let Some(name) = listing
        .names(Platform::DMG_DIR)
        .iter()
        .find(|name| name.ends_with(Platform::DISK_IMAGE_SUFFIX))
    {
        let version = ReleaseVersion::extract(name)?;
        slog::info!(
            log,
            "parsed release version {} from {}",
            version,
            name
        );
        bundle.disk_image =
            Some(naming.name(&version, Platform::DISK_IMAGE_SUFFIX));
        bundle.version = Some(version);
    }

    let subdir = platform.publish_subdir();
    for name in listing.names(subdir) {
        let source = listing.path(subdir, name);

        if name.ends_with(Platform::APP_BUNDLE_SUFFIX) {
            slog::debug!(log, "found app bundle {}", source);
            bundle.app_bundle = Some(source);
            continue;
        }

        let Some(rule) = platform.match_rule(name) else {
            slog::debug!(log, "skipping {}", source);
            continue;
        };

        let Some(version) = &bundle.version else {
            return Err(ClassifyError::VersionUndetermined {
                path: source,
                dmg_dir: listing.bundle_dir().join(Platform::DMG_DIR),
            });
        };

        let artifact = ClassifiedArtifact {
            destination: naming.name(version, rule.suffix),
            source,
            role: rule.role,
        };
        bundle.push(artifact)?;
    }

    Ok(bundle)
}
