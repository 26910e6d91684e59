// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use crate::{PlatformAlias, ReleaseVersion};

/// The stable file name a release artifact is published under.
///
/// Rendered as `{bundle_name}-{version}-{alias}{suffix}`, for example
/// `etcd-workbench-1.2.3-windows-x64.nsis.zip`. The name depends only on its
/// inputs, so publishing the same version twice overwrites the earlier copy
/// instead of accumulating duplicates.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct CanonicalArtifactName {
    pub bundle_name: String,
    pub version: ReleaseVersion,
    pub alias: PlatformAlias,
    pub suffix: String,
}

impl CanonicalArtifactName {
    pub fn new(
        bundle_name: impl Into<String>,
        version: ReleaseVersion,
        alias: PlatformAlias,
        suffix: impl Into<String>,
    ) -> Self {
        Self {
            bundle_name: bundle_name.into(),
            version,
            alias,
            suffix: suffix.into(),
        }
    }

    /// Returns the rendered file name.
    pub fn file_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CanonicalArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}{}",
            self.bundle_name, self.version, self.alias, self.suffix
        )
    }
}
