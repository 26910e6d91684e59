// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;

use daft::{BTreeMapDiff, Diffable};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ReleaseVersion;

/// The "latest version" document polled by auto-update clients.
///
/// One of these is kept per distribution mirror. The document is created out
/// of band; releases only ever modify it. Top-level keys this type does not
/// know about (such as `notes`) are carried through `extra` untouched.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct UpdateManifest {
    pub version: ReleaseVersion,
    pub pub_date: String,
    #[serde(default)]
    pub platforms: BTreeMap<String, PlatformUpdate>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl UpdateManifest {
    /// Merges a new release for one platform into this document.
    ///
    /// `version` and `pub_date` are global to the document and are always
    /// overwritten. Only `platforms[update.platform_key]` is replaced; every
    /// other platform entry is left as it was.
    pub fn apply(&mut self, update: &ManifestUpdate, pub_date: &str) {
        self.version = update.version.clone();
        self.pub_date = pub_date.to_owned();
        self.platforms.insert(
            update.platform_key.clone(),
            PlatformUpdate::new(update.signature.clone(), update.url.clone()),
        );
    }

    /// Diffs the `platforms` maps of two manifests.
    pub fn platforms_diff<'a>(
        &'a self,
        other: &'a UpdateManifest,
    ) -> BTreeMapDiff<'a, String, PlatformUpdate> {
        self.platforms.diff(&other.platforms)
    }
}

/// The `platforms` entry for one platform alias.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, Diffable)]
#[daft(leaf)]
pub struct PlatformUpdate {
    /// The detached signature of the update archive, verbatim.
    pub signature: String,
    /// Where auto-update clients download the update archive from.
    pub url: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl PlatformUpdate {
    pub fn new(signature: String, url: String) -> Self {
        Self { signature, url, extra: BTreeMap::new() }
    }
}

/// A new release of one platform, to be merged into an [`UpdateManifest`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestUpdate {
    pub version: ReleaseVersion,
    pub platform_key: String,
    pub signature: String,
    pub url: String,
}

impl ManifestUpdate {
    /// Merges this update into a manifest in its raw JSON form.
    ///
    /// Makes the same change as [`UpdateManifest::apply`], but only the
    /// `version`, `pub_date` and `platforms[platform_key]` values are
    /// touched. Every other value, and the position of every existing key,
    /// is left as it was, so serializing the document again reproduces the
    /// other entries exactly. New keys are appended.
    pub fn apply_to_document(
        &self,
        document: &mut Map<String, Value>,
        pub_date: &str,
    ) {
        document.insert(
            "version".to_owned(),
            Value::String(self.version.to_string()),
        );
        document.insert("pub_date".to_owned(), Value::from(pub_date));

        let entry = Value::Object(Map::from_iter([
            ("signature".to_owned(), Value::from(self.signature.as_str())),
            ("url".to_owned(), Value::from(self.url.as_str())),
        ]));
        let key = self.platform_key.clone();
        match document
            .entry("platforms")
            .or_insert_with(|| Value::Object(Map::new()))
        {
            Value::Object(platforms) => {
                platforms.insert(key, entry);
            }
            other => *other = Value::Object(Map::from_iter([(key, entry)])),
        }
    }
}
