// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{borrow::Cow, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use thiserror::Error;

/// The platforms a release can be built for.
///
/// Each platform has its own bundler output layout (see
/// [`Platform::bundle_subdirs`]) and its own set of file suffixes that are
/// worth publishing (see [`Platform::rules`]).
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Ord,
    PartialOrd,
    Display,
    EnumString,
    Deserialize,
    Serialize,
    EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Windows,
    Macos,
}

impl Platform {
    /// Bundler output subdirectory holding the NSIS installer and its update
    /// archive.
    pub const NSIS_DIR: &'static str = "nsis";

    /// Bundler output subdirectory holding the `.app` bundle and its update
    /// archive.
    pub const MACOS_DIR: &'static str = "macos";

    /// Bundler output subdirectory holding the bundler's own disk image.
    pub const DMG_DIR: &'static str = "dmg";

    /// Suffix of a macOS application bundle directory.
    pub const APP_BUNDLE_SUFFIX: &'static str = ".app";

    /// Suffix of a macOS disk image.
    pub const DISK_IMAGE_SUFFIX: &'static str = ".dmg";

    /// Returns the bundler output subdirectories scanned for this platform.
    pub fn bundle_subdirs(self) -> &'static [&'static str] {
        match self {
            Platform::Windows => &[Self::NSIS_DIR],
            Platform::Macos => &[Self::MACOS_DIR, Self::DMG_DIR],
        }
    }

    /// Returns the subdirectory whose files are renamed and published.
    pub fn publish_subdir(self) -> &'static str {
        match self {
            Platform::Windows => Self::NSIS_DIR,
            Platform::Macos => Self::MACOS_DIR,
        }
    }

    /// Returns the suffix rules for files in [`Self::publish_subdir`].
    ///
    /// Longer suffixes come first, so the first matching rule wins.
    pub fn rules(self) -> &'static [SuffixRule] {
        match self {
            Platform::Windows => WINDOWS_RULES,
            Platform::Macos => MACOS_RULES,
        }
    }

    /// Returns the first rule matching `file_name`, if any.
    pub fn match_rule(self, file_name: &str) -> Option<&'static SuffixRule> {
        self.rules().iter().find(|rule| rule.matches(file_name))
    }

    /// Returns the role of the artifact that auto-update clients download.
    ///
    /// This is the artifact whose detached signature goes into the update
    /// manifest.
    pub fn update_role(self) -> ArtifactRole {
        ArtifactRole::Archive
    }

    /// Returns an iterator over all the variants in this enum.
    pub fn iter() -> PlatformIter {
        <Self as IntoEnumIterator>::iter()
    }
}

const WINDOWS_RULES: &[SuffixRule] = &[
    SuffixRule::new(".nsis.zip.sig", ArtifactRole::Signature),
    SuffixRule::new(".nsis.zip", ArtifactRole::Archive),
    SuffixRule::new(".exe", ArtifactRole::Installer),
];

const MACOS_RULES: &[SuffixRule] = &[
    SuffixRule::new(".app.tar.gz.sig", ArtifactRole::Signature),
    SuffixRule::new(".app.tar.gz", ArtifactRole::Archive),
];

/// What a release artifact is for.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Ord,
    PartialOrd,
    Display,
    EnumString,
    Deserialize,
    Serialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRole {
    /// A standalone installer executable.
    Installer,
    /// The compressed archive downloaded by auto-update clients.
    Archive,
    /// A detached signature over the update archive.
    Signature,
    /// A disk image, assembled after bundling.
    DiskImage,
}

/// Maps a file name suffix to an artifact role.
///
/// The canonical name of a matched file keeps the suffix unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SuffixRule {
    pub suffix: &'static str,
    pub role: ArtifactRole,
}

impl SuffixRule {
    pub const fn new(suffix: &'static str, role: ArtifactRole) -> Self {
        Self { suffix, role }
    }

    /// Returns true if `file_name` ends with this suffix.
    pub fn matches(&self, file_name: &str) -> bool {
        file_name.ends_with(self.suffix)
    }
}

/// A short identifier for an (OS, architecture) pair, such as `windows-x64`.
///
/// Aliases appear in canonical artifact file names and, by default, as keys in
/// the update manifest's `platforms` map.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct PlatformAlias(Cow<'static, str>);

impl PlatformAlias {
    /// The maximum length of an alias.
    pub const MAX_LEN: usize = 63;

    /// Constructs a new `PlatformAlias` from a static string.
    pub const fn new_static(
        alias: &'static str,
    ) -> Result<Self, PlatformAliasError> {
        match validate_alias(alias) {
            Ok(()) => Ok(Self(Cow::Borrowed(alias))),
            Err(err) => Err(err),
        }
    }

    /// Constructs a new `PlatformAlias` from a string.
    pub fn new<S: Into<String>>(alias: S) -> Result<Self, PlatformAliasError> {
        let alias = alias.into();
        validate_alias(&alias)?;
        Ok(Self(Cow::Owned(alias)))
    }

    /// Returns the alias as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlatformAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PlatformAlias {
    type Err = PlatformAliasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for PlatformAlias {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let alias = String::deserialize(deserializer)?;
        validate_alias(&alias).map_err(serde::de::Error::custom)?;
        Ok(Self(Cow::Owned(alias)))
    }
}

const fn validate_alias(alias: &str) -> Result<(), PlatformAliasError> {
    let len = alias.len();
    if len == 0 {
        return Err(PlatformAliasError::Empty);
    } else if len > PlatformAlias::MAX_LEN {
        return Err(PlatformAliasError::TooLong { len });
    }

    let mut b = alias.as_bytes();
    while let [first, rest @ ..] = b {
        if !first.is_ascii_alphanumeric() && !matches!(first, b'_' | b'-') {
            return Err(PlatformAliasError::InvalidCharacter);
        }
        b = rest;
    }

    Ok(())
}

/// An error that occurred while creating a `PlatformAlias`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum PlatformAliasError {
    #[error("platform alias is empty")]
    Empty,
    #[error(
        "platform alias is too long ({len} bytes, max {})",
        PlatformAlias::MAX_LEN
    )]
    TooLong { len: usize },
    #[error(
        "platform alias contains invalid character \
         (allowed: ASCII letters, digits, `_` and `-`)"
    )]
    InvalidCharacter,
}
