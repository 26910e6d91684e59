// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use url::Url;
use workbench_release_artifact::UpdateManifest;

/// A way in which two mirror manifests disagree.
///
/// Mirrors are expected to advertise the same version and the same platforms
/// with the same signatures. Download URLs may only differ in their host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MirrorInconsistency {
    Version {
        reference: String,
        mirror: String,
        expected: String,
        found: String,
    },
    MissingPlatform {
        reference: String,
        mirror: String,
        platform: String,
    },
    ExtraPlatform {
        reference: String,
        mirror: String,
        platform: String,
    },
    Signature {
        reference: String,
        mirror: String,
        platform: String,
    },
    Url {
        reference: String,
        mirror: String,
        platform: String,
        expected: String,
        found: String,
    },
}

impl fmt::Display for MirrorInconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirrorInconsistency::Version {
                reference,
                mirror,
                expected,
                found,
            } => write!(
                f,
                "mirror `{mirror}` advertises version {found}, \
                 but `{reference}` advertises {expected}"
            ),
            MirrorInconsistency::MissingPlatform {
                reference,
                mirror,
                platform,
            } => write!(
                f,
                "platform `{platform}` is in `{reference}` \
                 but missing from `{mirror}`"
            ),
            MirrorInconsistency::ExtraPlatform {
                reference,
                mirror,
                platform,
            } => write!(
                f,
                "platform `{platform}` is in `{mirror}` \
                 but missing from `{reference}`"
            ),
            MirrorInconsistency::Signature { reference, mirror, platform } => {
                write!(
                    f,
                    "platform `{platform}` has different signatures \
                     in `{reference}` and `{mirror}`"
                )
            }
            MirrorInconsistency::Url {
                reference,
                mirror,
                platform,
                expected,
                found,
            } => write!(
                f,
                "platform `{platform}` URL in `{mirror}` ({found}) differs \
                 from `{reference}` ({expected}) by more than its host"
            ),
        }
    }
}

/// Compares every mirror's manifest against the first one.
pub fn check_mirrors(
    manifests: &[(String, UpdateManifest)],
) -> Vec<MirrorInconsistency> {
    let Some(((reference, first), rest)) = manifests.split_first() else {
        return Vec::new();
    };

    let mut findings = Vec::new();
    for (mirror, other) in rest {
        if first.version != other.version {
            findings.push(MirrorInconsistency::Version {
                reference: reference.clone(),
                mirror: mirror.clone(),
                expected: first.version.to_string(),
                found: other.version.to_string(),
            });
        }

        let diff = first.platforms_diff(other);
        for platform in diff.removed.keys() {
            findings.push(MirrorInconsistency::MissingPlatform {
                reference: reference.clone(),
                mirror: mirror.clone(),
                platform: (*platform).clone(),
            });
        }
        for platform in diff.added.keys() {
            findings.push(MirrorInconsistency::ExtraPlatform {
                reference: reference.clone(),
                mirror: mirror.clone(),
                platform: (*platform).clone(),
            });
        }
        for (platform, leaf) in &diff.common {
            if leaf.before.signature != leaf.after.signature {
                findings.push(MirrorInconsistency::Signature {
                    reference: reference.clone(),
                    mirror: mirror.clone(),
                    platform: (*platform).clone(),
                });
            }
            if !same_except_host(&leaf.before.url, &leaf.after.url) {
                findings.push(MirrorInconsistency::Url {
                    reference: reference.clone(),
                    mirror: mirror.clone(),
                    platform: (*platform).clone(),
                    expected: leaf.before.url.clone(),
                    found: leaf.after.url.clone(),
                });
            }
        }
    }
    findings
}

fn same_except_host(a: &str, b: &str) -> bool {
    let (Ok(a), Ok(b)) = (Url::parse(a), Url::parse(b)) else {
        return a == b;
    };
    a.scheme() == b.scheme()
        && a.username() == b.username()
        && a.password() == b.password()
        && a.port_or_known_default() == b.port_or_known_default()
        && a.path() == b.path()
        && a.query() == b.query()
        && a.fragment() == b.fragment()
}
