// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::{borrow::Cow, fmt, str::FromStr, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The version of a release.
///
/// Every artifact the bundler produces for one build shares a single version,
/// which is recovered from the artifact file names with
/// [`ReleaseVersion::extract`]. Versions coming from elsewhere (update
/// manifests, the command line) are freeform identifiers restricted to the
/// semver character set; see [`ReleaseVersion::REGEX`].
///
/// # Ord implementation
///
/// The `Ord` implementation is lexicographic and exists only for storage in
/// sorted collections. Use [`ReleaseVersion::to_semver`] to compare releases.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReleaseVersion(Cow<'static, str>);

static EMBEDDED_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(ReleaseVersion::EMBEDDED_REGEX)
        .expect("embedded version regex is valid")
});

impl ReleaseVersion {
    /// The maximum length of a version string.
    pub const MAX_LEN: usize = 63;

    /// A regular expression that matches a valid version string.
    pub const REGEX: &str = r"^[a-zA-Z0-9._+-]{1,63}$";

    /// The pattern searched for in artifact file names: three dot-separated
    /// runs of ASCII digits.
    pub const EMBEDDED_REGEX: &str = r"[0-9]+\.[0-9]+\.[0-9]+";

    /// Constructs a new `ReleaseVersion` from a static string.
    pub const fn new_static(
        version: &'static str,
    ) -> Result<Self, ReleaseVersionError> {
        match validate_version(version) {
            Ok(()) => Ok(Self(Cow::Borrowed(version))),
            Err(err) => Err(err),
        }
    }

    /// Constructs a new `ReleaseVersion` from a string.
    pub fn new<S: Into<String>>(
        version: S,
    ) -> Result<Self, ReleaseVersionError> {
        let version = version.into();
        validate_version(&version)?;
        Ok(Self(Cow::Owned(version)))
    }

    /// Extracts the version embedded in an artifact file name.
    ///
    /// Returns the leftmost substring matching
    /// [`ReleaseVersion::EMBEDDED_REGEX`]; any text may precede or follow it.
    /// A match that is not itself a valid version (one longer than
    /// [`ReleaseVersion::MAX_LEN`]) is an error.
    pub fn extract(file_name: &str) -> Result<Self, VersionNotFoundError> {
        let found = EMBEDDED_VERSION.find(file_name).ok_or_else(|| {
            VersionNotFoundError {
                file_name: file_name.to_owned(),
                invalid: None,
            }
        })?;
        Self::new(found.as_str()).map_err(|error| VersionNotFoundError {
            file_name: file_name.to_owned(),
            invalid: Some(error),
        })
    }

    /// Returns the version as a string.
    pub fn as_str(&self) -> &str {
        self.0.as_ref()
    }

    /// Parses this version as a semver, if it is one.
    pub fn to_semver(&self) -> Option<semver::Version> {
        self.as_str().parse().ok()
    }
}

impl FromStr for ReleaseVersion {
    type Err = ReleaseVersionError;

    #[inline]
    fn from_str(version: &str) -> Result<Self, Self::Err> {
        Self::new(version)
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ReleaseVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let version = String::deserialize(deserializer)?;
        validate_version(&version).map_err(serde::de::Error::custom)?;
        Ok(Self(Cow::Owned(version)))
    }
}

impl Serialize for ReleaseVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

const fn validate_version(version: &str) -> Result<(), ReleaseVersionError> {
    let len = version.len();

    if len == 0 {
        return Err(ReleaseVersionError::Empty);
    } else if len > ReleaseVersion::MAX_LEN {
        return Err(ReleaseVersionError::TooLong { len });
    }

    let mut b = version.as_bytes();
    while let [first, rest @ ..] = b {
        if !first.is_ascii_alphanumeric()
            && !matches!(first, b'.' | b'_' | b'+' | b'-')
        {
            return Err(ReleaseVersionError::InvalidCharacter);
        }
        b = rest;
    }

    Ok(())
}

/// An error that occurred while creating a `ReleaseVersion`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ReleaseVersionError {
    #[error("version is empty")]
    Empty,
    #[error(
        "version is too long ({len} bytes, max {})",
        ReleaseVersion::MAX_LEN
    )]
    TooLong { len: usize },
    #[error(
        "version contains invalid character (allowed: {})",
        ReleaseVersion::REGEX
    )]
    InvalidCharacter,
}

/// No usable version could be found in an artifact file name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "no version matching `{}` found in `{file_name}`",
    ReleaseVersion::EMBEDDED_REGEX
)]
pub struct VersionNotFoundError {
    pub file_name: String,
    /// Set if the name matched, but the match is not a valid version.
    #[source]
    pub invalid: Option<ReleaseVersionError>,
}
