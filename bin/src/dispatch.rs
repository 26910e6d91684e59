// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, FixedOffset};
use clap::Parser;
use workbench_release_artifact::{
    ManifestUpdate, Platform, PlatformAlias, ReleaseVersion,
};
use workbench_release_lib::{
    DEFAULT_CONFIG_FILE, MirrorConfig, Precision, PubDate, Release,
    ReleaseConfig, ReleaseReport, ReleaseRequest, SystemToolRunner,
    check_mirrors, read_manifest, update_manifest,
};

#[derive(Debug, Parser)]
pub struct Args {
    #[clap(subcommand)]
    command: Command,

    /// Path to the release configuration file
    #[clap(
        short = 'c',
        long,
        env = "WORKBENCH_RELEASE_CONFIG",
        default_value = DEFAULT_CONFIG_FILE,
        global = true
    )]
    config: Utf8PathBuf,
}

impl Args {
    /// Executes these arguments.
    pub fn exec(self, log: &slog::Logger) -> Result<()> {
        let config = ReleaseConfig::from_path(&self.config)?;

        match self.command {
            Command::Release {
                target,
                platform,
                alias,
                manifest_key,
                no_bundle,
                pub_date,
            } => {
                let request = ReleaseRequest {
                    triple: target,
                    platform,
                    alias,
                    manifest_key,
                    bundle: !no_bundle,
                    pub_date: pub_date.map_or(PubDate::Now, PubDate::Fixed),
                };
                let report = Release::new(log, &config, SystemToolRunner)
                    .run(&request)?;
                print_report(&report);
                Ok(())
            }
            Command::UpdateManifest {
                version,
                platform_key,
                signature_file,
                mirrors,
                file,
                pub_date,
            } => {
                let mirrors = select_mirrors(&config, &mirrors)?;
                let file = match file {
                    Some(file) => file,
                    None => artifact_file_name(&signature_file)?,
                };
                let signature = fs_err::read_to_string(&signature_file)?;
                let pub_date = pub_date
                    .map_or(PubDate::Now, PubDate::Fixed)
                    .render(Precision::Seconds);

                let mut updated = Vec::new();
                for mirror in mirrors {
                    let url = mirror.url.render(&version, &file)?;
                    let update = ManifestUpdate {
                        version: version.clone(),
                        platform_key: platform_key.clone(),
                        signature: signature.clone(),
                        url: url.into(),
                    };
                    let manifest = update_manifest(
                        log,
                        &mirror.manifest,
                        &update,
                        &pub_date,
                    )
                    .with_context(|| {
                        format!(
                            "error updating manifest of mirror `{}`",
                            mirror.name
                        )
                    })?;
                    println!(
                        "updated {} ({}): {platform_key} -> {}",
                        mirror.name,
                        mirror.manifest,
                        manifest.platforms[&platform_key].url
                    );
                    updated.push((mirror.name.clone(), manifest));
                }

                for inconsistency in check_mirrors(&updated) {
                    slog::warn!(log, "{}", inconsistency);
                }
                Ok(())
            }
            Command::Show => show_manifests(&config),
        }
    }
}

#[derive(Debug, Parser)]
enum Command {
    /// Bundle the app for one target, publish its artifacts and update the
    /// mirror manifests
    Release {
        /// Target triple to bundle for (e.g. x86_64-pc-windows-msvc)
        #[clap(long)]
        target: String,

        /// Bundler output layout to expect
        #[clap(long)]
        platform: Platform,

        /// Platform alias used in artifact names and the output directory
        /// (e.g. windows-x64)
        #[clap(long)]
        alias: PlatformAlias,

        /// Key to update in the manifests' `platforms` map [default: the
        /// alias]
        #[clap(long)]
        manifest_key: Option<String>,

        /// Skip the bundler and use its existing output
        #[clap(long)]
        no_bundle: bool,

        /// Publication date to record [default: now]
        #[clap(long, value_parser = crate::date::parse_pub_date)]
        pub_date: Option<DateTime<FixedOffset>>,
    },
    /// Record an already published artifact in the mirror manifests
    UpdateManifest {
        /// Release version
        #[clap(long)]
        version: ReleaseVersion,

        /// Key to update in the manifests' `platforms` map
        #[clap(long)]
        platform_key: String,

        /// Detached signature of the update archive
        #[clap(long)]
        signature_file: Utf8PathBuf,

        /// Only update these mirrors [default: all configured mirrors]
        #[clap(long = "mirror")]
        mirrors: Vec<String>,

        /// File name of the update archive on the mirrors [default: the
        /// signature file's name without `.sig`]
        #[clap(long)]
        file: Option<String>,

        /// Publication date to record [default: now]
        #[clap(long, value_parser = crate::date::parse_pub_date)]
        pub_date: Option<DateTime<FixedOffset>>,
    },
    /// Print the manifest of every mirror and check that they agree
    Show,
}

fn select_mirrors<'a>(
    config: &'a ReleaseConfig,
    names: &[String],
) -> Result<Vec<&'a MirrorConfig>> {
    if names.is_empty() {
        return Ok(config.mirrors.iter().collect());
    }
    names
        .iter()
        .map(|name| {
            config
                .mirror(name)
                .with_context(|| format!("unknown mirror `{name}`"))
        })
        .collect()
}

fn artifact_file_name(signature_file: &Utf8Path) -> Result<String> {
    let Some(name) = signature_file.file_name() else {
        bail!("signature file `{signature_file}` has no file name");
    };
    match name.strip_suffix(".sig") {
        Some(stem) if !stem.is_empty() => Ok(stem.to_owned()),
        _ => bail!(
            "cannot derive the archive name from `{name}` \
             (expected a `.sig` suffix); pass --file"
        ),
    }
}

fn print_report(report: &ReleaseReport) {
    match &report.version {
        Some(version) => println!("version: {version}"),
        None => println!("version: (not found)"),
    }
    println!("output directory: {}", report.output_dir);
    for artifact in &report.published {
        println!(
            "  {} ({} bytes, sha256 {})",
            artifact.path,
            artifact.length,
            artifact.sha256_hex()
        );
    }
    if let Some(disk_image) = &report.disk_image {
        println!("  {disk_image} (disk image)");
    }
    for path in &report.version_mismatches {
        println!("warning: {path} does not carry the release version");
    }
    if report.manifests_skipped {
        println!("manifests: left unchanged (no signed update archive)");
    } else {
        let names: Vec<_> =
            report.manifests.iter().map(|(name, _)| name.as_str()).collect();
        println!("manifests: updated {}", names.join(", "));
    }
    for inconsistency in &report.inconsistencies {
        println!("warning: {inconsistency}");
    }
}

fn show_manifests(config: &ReleaseConfig) -> Result<()> {
    let mut manifests = Vec::with_capacity(config.mirrors.len());
    for mirror in &config.mirrors {
        let manifest = read_manifest(&mirror.manifest).with_context(|| {
            format!("error reading manifest of mirror `{}`", mirror.name)
        })?;

        println!("{} ({})", mirror.name, mirror.manifest);
        println!("  version:  {}", manifest.version);
        println!("  pub_date: {}", manifest.pub_date);
        let width = manifest.platforms.keys().map(String::len).max();
        for (key, platform) in &manifest.platforms {
            println!(
                "  {key:width$}  {}",
                platform.url,
                width = width.unwrap_or(0)
            );
        }
        manifests.push((mirror.name.clone(), manifest));
    }

    let inconsistencies = check_mirrors(&manifests);
    if inconsistencies.is_empty() {
        println!("mirrors are consistent");
    }
    for inconsistency in inconsistencies {
        println!("warning: {inconsistency}");
    }
    Ok(())
}
