// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::{Context, Result, bail, ensure};
use camino::{Utf8Path, Utf8PathBuf};
use workbench_release_artifact::{
    ManifestUpdate, Platform, PlatformAlias, ReleaseVersion, UpdateManifest,
};

use crate::{
    ArtifactNaming, BundleListing, ClassifiedBundle, ExternalCommand,
    MirrorInconsistency, Precision, PubDate, PublishedArtifact, ReleaseConfig,
    ToolRunner, check_env_secrets, check_mirrors, classify, publish,
    remove_existing, update_manifest,
};

/// What to release.
#[derive(Clone, Debug)]
pub struct ReleaseRequest {
    /// The Rust target triple the bundler builds for.
    pub triple: String,
    pub platform: Platform,
    /// Names the canonical artifacts and the output directory.
    pub alias: PlatformAlias,
    /// The `platforms` key to update, if different from the alias.
    pub manifest_key: Option<String>,
    /// Whether to run the bundler. If false, its existing output is used.
    pub bundle: bool,
    pub pub_date: PubDate,
}

impl ReleaseRequest {
    pub fn new(
        triple: impl Into<String>,
        platform: Platform,
        alias: PlatformAlias,
    ) -> Self {
        Self {
            triple: triple.into(),
            platform,
            alias,
            manifest_key: None,
            bundle: true,
            pub_date: PubDate::Now,
        }
    }

    pub fn manifest_key(&self) -> &str {
        self.manifest_key.as_deref().unwrap_or(self.alias.as_str())
    }
}

/// What a release run did.
#[derive(Clone, Debug)]
pub struct ReleaseReport {
    pub version: Option<ReleaseVersion>,
    pub output_dir: Utf8PathBuf,
    pub published: Vec<PublishedArtifact>,
    pub disk_image: Option<Utf8PathBuf>,
    /// Updated manifests, by mirror name, in update order.
    pub manifests: Vec<(String, UpdateManifest)>,
    /// True if no update archive and signature were found, so the manifests
    /// were left as they were.
    pub manifests_skipped: bool,
    pub version_mismatches: Vec<Utf8PathBuf>,
    pub inconsistencies: Vec<MirrorInconsistency>,
}

/// Runs one release pass for one target.
pub struct Release<'a, R> {
    log: slog::Logger,
    config: &'a ReleaseConfig,
    runner: R,
}

impl<'a, R: ToolRunner> Release<'a, R> {
    pub fn new(
        log: &slog::Logger,
        config: &'a ReleaseConfig,
        runner: R,
    ) -> Self {
        let log = log.new(slog::o!("component" => "Release"));
        Self { log, config, runner }
    }

    /// Bundles, publishes and updates the mirror manifests.
    ///
    /// Steps run in order and the first failure ends the run. Nothing done by
    /// earlier steps is undone.
    pub fn run(&self, request: &ReleaseRequest) -> Result<ReleaseReport> {
        let log = self.log.new(slog::o!(
            "target" => request.triple.clone(),
            "alias" => request.alias.to_string(),
        ));
        let bundle_dir = self.config.bundle_dir(&request.triple);

        if request.bundle {
            self.bundle(&log, &request.triple, &bundle_dir)?;
        } else {
            slog::info!(log, "using existing bundler output in {}", bundle_dir);
        }

        let listing = BundleListing::scan(&bundle_dir, request.platform)
            .context("error scanning bundler output")?;
        let naming = ArtifactNaming::new(
            self.config.bundle_name.clone(),
            request.alias.clone(),
        );
        let classified = classify(&log, &listing, request.platform, &naming)?;

        let output_dir = self.config.output_dir_for(&request.alias);
        let published = classified
            .artifacts
            .iter()
            .map(|artifact| {
                publish(
                    &log,
                    &artifact.source,
                    &output_dir,
                    &artifact.destination.file_name(),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let disk_image = match request.platform {
            Platform::Macos => Some(self.create_disk_image(
                &log,
                &classified,
                &output_dir,
            )?),
            Platform::Windows => None,
        };

        let mut report = ReleaseReport {
            version: classified.version.clone(),
            output_dir,
            published,
            disk_image,
            manifests: Vec::new(),
            manifests_skipped: false,
            version_mismatches: classified.version_mismatches.clone(),
            inconsistencies: Vec::new(),
        };

        match (
            &classified.version,
            classified.update_artifact(),
            classified.signature(),
        ) {
            (Some(version), Some(archive), Some(signature)) => {
                let signature = fs_err::read_to_string(&signature.source)?;
                let update = PendingUpdate {
                    version,
                    platform_key: request.manifest_key(),
                    signature: &signature,
                    file_name: &archive.destination.file_name(),
                    pub_date: &request.pub_date.render(Precision::Seconds),
                };
                report.manifests = self.update_mirrors(&log, &update)?;
            }
            _ => {
                slog::warn!(
                    log,
                    "no update archive with a signature was found; \
                     update manifests left unchanged"
                );
                report.manifests_skipped = true;
            }
        }

        report.inconsistencies = check_mirrors(&report.manifests);
        for inconsistency in &report.inconsistencies {
            slog::warn!(log, "{}", inconsistency);
        }

        Ok(report)
    }

    fn bundle(
        &self,
        log: &slog::Logger,
        triple: &str,
        bundle_dir: &Utf8Path,
    ) -> Result<()> {
        check_env_secrets(&self.config.required_secrets)?;

        if bundle_dir.exists() {
            slog::info!(log, "removing stale bundler output {}", bundle_dir);
            fs_err::remove_dir_all(bundle_dir)?;
        }

        let command = ExternalCommand::bundler(
            &self.config.bundler,
            &self.config.app_dir,
            triple,
        );
        self.runner.run(log, &command)?;
        Ok(())
    }

    fn create_disk_image(
        &self,
        log: &slog::Logger,
        classified: &ClassifiedBundle,
        output_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf> {
        let Some(name) = &classified.disk_image else {
            bail!("cannot name the disk image: no bundler disk image found");
        };
        let Some(app_bundle) = &classified.app_bundle else {
            bail!("cannot create the disk image: no `.app` bundle found");
        };

        fs_err::create_dir_all(output_dir)?;
        let destination = output_dir.join(name.file_name());
        if remove_existing(&destination)? {
            slog::debug!(log, "removed previous disk image {}", destination);
        }

        let command = ExternalCommand::create_dmg(
            &self.config.dmg,
            &self.config.app_name,
            app_bundle,
            &destination,
        );
        self.runner.run(log, &command)?;
        ensure!(
            destination.is_file(),
            "`{}` succeeded but did not create {destination}",
            command.program
        );

        slog::info!(log, "created disk image {}", destination);
        Ok(destination)
    }

    fn update_mirrors(
        &self,
        log: &slog::Logger,
        update: &PendingUpdate<'_>,
    ) -> Result<Vec<(String, UpdateManifest)>> {
        let mut manifests = Vec::with_capacity(self.config.mirrors.len());
        for mirror in &self.config.mirrors {
            let url = mirror.url.render(update.version, update.file_name)?;
            let manifest = update_manifest(
                log,
                &mirror.manifest,
                &ManifestUpdate {
                    version: update.version.clone(),
                    platform_key: update.platform_key.to_owned(),
                    signature: update.signature.to_owned(),
                    url: url.into(),
                },
                update.pub_date,
            )
            .with_context(|| {
                format!("error updating manifest of mirror `{}`", mirror.name)
            })?;
            manifests.push((mirror.name.clone(), manifest));
        }
        Ok(manifests)
    }
}

/// The parts of a manifest update shared by every mirror.
struct PendingUpdate<'a> {
    version: &'a ReleaseVersion,
    platform_key: &'a str,
    signature: &'a str,
    file_name: &'a str,
    pub_date: &'a str,
}
