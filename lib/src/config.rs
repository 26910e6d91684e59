// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeSet;

use anyhow::{Context, Result, bail, ensure};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use url::Url;
use workbench_release_artifact::{PlatformAlias, ReleaseVersion};

/// The configuration file looked up when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "release.toml";

/// Everything a release run needs to know about the project.
///
/// All paths are absolute.
#[derive(Clone, Debug)]
pub struct ReleaseConfig {
    /// The human-readable application name, used for the disk image volume
    /// title and icon label.
    pub app_name: String,
    /// The prefix of every canonical artifact file name.
    pub bundle_name: String,
    /// The directory the bundler is run from.
    pub app_dir: Utf8PathBuf,
    /// The bundler's cargo target directory.
    pub target_dir: Utf8PathBuf,
    /// The root of the canonical output directories.
    pub output_dir: Utf8PathBuf,
    /// Environment variables that must be set before bundling.
    pub required_secrets: Vec<String>,
    pub bundler: BundlerConfig,
    pub dmg: DmgConfig,
    /// Distribution mirrors, in update order.
    pub mirrors: Vec<MirrorConfig>,
}

impl ReleaseConfig {
    /// Reads a configuration file. Relative paths inside it are resolved
    /// against the directory containing it.
    pub fn from_path(path: &Utf8Path) -> Result<Self> {
        let path = path.canonicalize_utf8().with_context(|| {
            format!("error resolving configuration file `{path}`")
        })?;
        let input = fs_err::read_to_string(&path)?;
        let base_dir = path
            .parent()
            .with_context(|| format!("path `{path}` did not have a parent"))?;
        Self::from_str(base_dir, &input)
            .with_context(|| format!("error loading configuration from {path}"))
    }

    /// Deserializes a configuration from an input string.
    pub fn from_str(base_dir: &Utf8Path, input: &str) -> Result<Self> {
        let config = DeserializedReleaseConfig::from_str(input)?;
        Self::from_deserialized(base_dir, config)
    }

    /// Creates a configuration from a [`DeserializedReleaseConfig`].
    pub fn from_deserialized(
        base_dir: &Utf8Path,
        config: DeserializedReleaseConfig,
    ) -> Result<Self> {
        ensure!(
            base_dir.is_absolute(),
            "base directory `{base_dir}` is not absolute"
        );
        ensure!(!config.app_name.is_empty(), "`app_name` is empty");
        ensure!(!config.bundle_name.is_empty(), "`bundle_name` is empty");
        ensure!(
            !config.bundler.program.is_empty(),
            "`bundler.program` is empty"
        );
        ensure!(
            !config.mirrors.is_empty(),
            "at least one `[[mirror]]` is required"
        );

        let mut names = BTreeSet::new();
        let mirrors = config
            .mirrors
            .into_iter()
            .map(|mirror| -> Result<MirrorConfig> {
                ensure!(!mirror.name.is_empty(), "mirror name is empty");
                if !names.insert(mirror.name.clone()) {
                    bail!("duplicate mirror name `{}`", mirror.name);
                }
                let url = UrlTemplate::new(mirror.url).with_context(|| {
                    format!("invalid URL template for mirror `{}`", mirror.name)
                })?;
                Ok(MirrorConfig {
                    name: mirror.name,
                    manifest: base_dir.join(mirror.manifest),
                    url,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let dmg = config.dmg;
        Ok(ReleaseConfig {
            app_name: config.app_name,
            bundle_name: config.bundle_name,
            app_dir: base_dir.join(config.app_dir),
            target_dir: base_dir.join(config.target_dir),
            output_dir: base_dir.join(config.output_dir),
            required_secrets: config.required_secrets,
            bundler: BundlerConfig {
                program: config.bundler.program,
                args: config.bundler.args,
            },
            dmg: DmgConfig {
                program: dmg.program,
                icon: base_dir.join(dmg.icon),
                background: base_dir.join(dmg.background),
                window_pos: dmg.window_pos,
                window_size: dmg.window_size,
                icon_size: dmg.icon_size,
                icon_pos: dmg.icon_pos,
                app_drop_link: dmg.app_drop_link,
            },
            mirrors,
        })
    }

    /// Returns the bundler output directory for a target triple.
    pub fn bundle_dir(&self, triple: &str) -> Utf8PathBuf {
        self.target_dir.join(triple).join("release").join("bundle")
    }

    /// Returns the canonical output directory for a platform alias.
    pub fn output_dir_for(&self, alias: &PlatformAlias) -> Utf8PathBuf {
        self.output_dir.join(alias.as_str())
    }

    /// Looks up a mirror by name.
    pub fn mirror(&self, name: &str) -> Option<&MirrorConfig> {
        self.mirrors.iter().find(|mirror| mirror.name == name)
    }
}

#[derive(Clone, Debug)]
pub struct BundlerConfig {
    pub program: String,
    /// Arguments, with `{target}` standing in for the target triple.
    pub args: Vec<String>,
}

impl BundlerConfig {
    pub fn args_for(&self, triple: &str) -> Vec<String> {
        self.args.iter().map(|arg| arg.replace("{target}", triple)).collect()
    }
}

/// Disk image layout passed to `create-dmg`.
#[derive(Clone, Debug)]
pub struct DmgConfig {
    pub program: String,
    pub icon: Utf8PathBuf,
    pub background: Utf8PathBuf,
    pub window_pos: (u32, u32),
    pub window_size: (u32, u32),
    pub icon_size: u32,
    pub icon_pos: (u32, u32),
    pub app_drop_link: (u32, u32),
}

/// A distribution endpoint with its own copy of the update manifest.
#[derive(Clone, Debug)]
pub struct MirrorConfig {
    pub name: String,
    pub manifest: Utf8PathBuf,
    pub url: UrlTemplate,
}

/// A download URL with `{version}` and `{file}` placeholders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UrlTemplate(String);

impl UrlTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = Self(template.into());
        // Check that the template yields a usable URL.
        template.render(&ReleaseVersion::new_static("0.0.0")?, "file")?;
        Ok(template)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fills in the placeholders and parses the result.
    pub fn render(&self, version: &ReleaseVersion, file: &str) -> Result<Url> {
        let rendered = self
            .0
            .replace("{version}", version.as_str())
            .replace("{file}", file);
        let url = Url::parse(&rendered)
            .with_context(|| format!("`{rendered}` is not a valid URL"))?;
        ensure!(
            matches!(url.scheme(), "http" | "https"),
            "`{rendered}` is not an http(s) URL"
        );
        ensure!(url.has_host(), "`{rendered}` has no host");
        Ok(url)
    }
}

/// The on-disk form of [`ReleaseConfig`]. Every key except `mirror` has a
/// default.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeserializedReleaseConfig {
    pub app_name: String,
    pub bundle_name: String,
    pub app_dir: Utf8PathBuf,
    pub target_dir: Utf8PathBuf,
    pub output_dir: Utf8PathBuf,
    pub required_secrets: Vec<String>,
    pub bundler: DeserializedBundlerConfig,
    pub dmg: DeserializedDmgConfig,
    #[serde(rename = "mirror")]
    pub mirrors: Vec<DeserializedMirrorConfig>,
}

impl DeserializedReleaseConfig {
    fn from_str(input: &str) -> Result<Self> {
        let de = toml::Deserializer::new(input);
        serde_path_to_error::deserialize(de)
            .context("error deserializing configuration")
    }
}

impl Default for DeserializedReleaseConfig {
    fn default() -> Self {
        Self {
            app_name: "Etcd Workbench".to_owned(),
            bundle_name: "etcd-workbench".to_owned(),
            app_dir: "app".into(),
            target_dir: "app/src-tauri/target".into(),
            output_dir: "bin/app".into(),
            required_secrets: vec![
                "TAURI_PRIVATE_KEY".to_owned(),
                "TAURI_KEY_PASSWORD".to_owned(),
            ],
            bundler: DeserializedBundlerConfig::default(),
            dmg: DeserializedDmgConfig::default(),
            mirrors: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeserializedBundlerConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for DeserializedBundlerConfig {
    fn default() -> Self {
        Self {
            program: "pnpm".to_owned(),
            args: ["tauri", "build", "--target", "{target}"]
                .map(str::to_owned)
                .to_vec(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeserializedDmgConfig {
    pub program: String,
    pub icon: Utf8PathBuf,
    pub background: Utf8PathBuf,
    pub window_pos: (u32, u32),
    pub window_size: (u32, u32),
    pub icon_size: u32,
    pub icon_pos: (u32, u32),
    pub app_drop_link: (u32, u32),
}

impl Default for DeserializedDmgConfig {
    fn default() -> Self {
        Self {
            program: "create-dmg".to_owned(),
            icon: "app/src-tauri/icons/macos/icon.icns".into(),
            background: "app/src-tauri/icons/macos/dmg-bg.png".into(),
            window_pos: (200, 200),
            window_size: (900, 600),
            icon_size: 128,
            icon_pos: (232, 338),
            app_drop_link: (688, 338),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeserializedMirrorConfig {
    pub name: String,
    pub manifest: Utf8PathBuf,
    pub url: String,
}
