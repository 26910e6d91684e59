// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use anyhow::Result;
use assert_cmd::Command;
use camino::{Utf8Path, Utf8PathBuf};
use predicates::prelude::*;
use workbench_release_lib::{check_mirrors, read_manifest};

const TARGET: &str = "x86_64-pc-windows-msvc";
const PUB_DATE: &str = "2024-05-01T08:00:00+08:00";

static CONFIG: &str = r#"
[[mirror]]
name = "github"
manifest = "docs/etcd-workbench-update.json"
url = "https://github.com/tzfun/etcd-workbench/releases/download/App-{version}/{file}"

[[mirror]]
name = "gitee"
manifest = "docs/etcd-workbench-update-gitee.json"
url = "https://gitee.com/tzfun/etcd-workbench/releases/download/App-{version}/{file}"
"#;

static MANIFEST: &str = r#"{
  "version": "0.9.0",
  "notes": "Bug fixes",
  "pub_date": "2024-01-01T10:00:00+08:00",
  "platforms": {
    "darwin-aarch64": {
      "signature": "OLDSIG",
      "url": "https://github.com/tzfun/etcd-workbench/releases/download/App-0.9.0/etcd-workbench-0.9.0-macos-aarch64.app.tar.gz"
    }
  }
}
"#;

/// A project directory with a configuration file and both mirror manifests.
struct Project {
    _tempdir: tempfile::TempDir,
    root: Utf8PathBuf,
}

impl Project {
    fn new() -> Result<Self> {
        let tempdir = tempfile::tempdir()?;
        let root: Utf8PathBuf = tempdir.path().to_path_buf().try_into()?;
        fs_err::write(root.join("release.toml"), CONFIG)?;
        fs_err::create_dir_all(root.join("docs"))?;
        for name in ["github", "gitee"] {
            fs_err::write(manifest_path(&root, name), MANIFEST)?;
        }
        Ok(Self { _tempdir: tempdir, root })
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("workbench-release").unwrap();
        cmd.arg("--config");
        cmd.arg(self.root.join("release.toml"));
        cmd
    }

    fn manifest(&self, mirror: &str) -> Result<serde_json::Value> {
        let path = manifest_path(&self.root, mirror);
        let contents = fs_err::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn manifest_text(&self, mirror: &str) -> Result<String> {
        Ok(fs_err::read_to_string(manifest_path(&self.root, mirror))?)
    }

    fn write_windows_bundle(&self) -> Result<()> {
        let nsis = self
            .root
            .join("app/src-tauri/target")
            .join(TARGET)
            .join("release/bundle/nsis");
        fs_err::create_dir_all(&nsis)?;
        fs_err::write(nsis.join("app-1.0.0-setup.exe"), "installer")?;
        fs_err::write(nsis.join("app-1.0.0.nsis.zip"), "archive")?;
        fs_err::write(nsis.join("app-1.0.0.nsis.zip.sig"), "SIG123")?;
        fs_err::write(nsis.join("installer.nsi"), "script")?;
        Ok(())
    }
}

fn manifest_path(root: &Utf8Path, mirror: &str) -> Utf8PathBuf {
    match mirror {
        "github" => root.join("docs/etcd-workbench-update.json"),
        "gitee" => root.join("docs/etcd-workbench-update-gitee.json"),
        _ => panic!("unknown mirror {mirror}"),
    }
}

#[test]
fn test_release_existing_bundle() -> Result<()> {
    let project = Project::new()?;
    project.write_windows_bundle()?;

    let mut cmd = project.cmd();
    cmd.args(["release", "--target", TARGET, "--platform", "windows"]);
    cmd.args(["--alias", "windows-x64", "--no-bundle"]);
    cmd.args(["--pub-date", PUB_DATE]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("version: 1.0.0"))
        .stdout(predicate::str::contains("manifests: updated github, gitee"));

    let out = project.root.join("bin/app/windows-x64");
    let mut published: Vec<_> = out
        .read_dir_utf8()?
        .map(|entry| Ok(entry?.file_name().to_owned()))
        .collect::<Result<_>>()?;
    published.sort();
    assert_eq!(
        published,
        [
            "etcd-workbench-1.0.0-windows-x64.exe",
            "etcd-workbench-1.0.0-windows-x64.nsis.zip",
            "etcd-workbench-1.0.0-windows-x64.nsis.zip.sig",
        ]
    );
    assert_eq!(
        fs_err::read_to_string(
            out.join("etcd-workbench-1.0.0-windows-x64.nsis.zip")
        )?,
        "archive"
    );

    let mut urls = Vec::new();
    for mirror in ["github", "gitee"] {
        let manifest = project.manifest(mirror)?;
        assert_eq!(manifest["version"], "1.0.0");
        assert_eq!(manifest["pub_date"], PUB_DATE);
        assert_eq!(manifest["notes"], "Bug fixes");
        assert_eq!(manifest["platforms"]["windows-x64"]["signature"], "SIG123");
        assert_eq!(
            manifest["platforms"]["darwin-aarch64"]["signature"],
            "OLDSIG"
        );
        urls.push(
            manifest["platforms"]["windows-x64"]["url"]
                .as_str()
                .unwrap()
                .to_owned(),
        );
    }
    assert_eq!(
        urls,
        [
            "https://github.com/tzfun/etcd-workbench/releases/download/App-1.0.0/etcd-workbench-1.0.0-windows-x64.nsis.zip",
            "https://gitee.com/tzfun/etcd-workbench/releases/download/App-1.0.0/etcd-workbench-1.0.0-windows-x64.nsis.zip",
        ]
    );

    // Releasing again overwrites the same files.
    let mut cmd = project.cmd();
    cmd.args(["release", "--target", TARGET, "--platform", "windows"]);
    cmd.args(["--alias", "windows-x64", "--no-bundle"]);
    cmd.args(["--pub-date", PUB_DATE]);
    cmd.assert().success();
    assert_eq!(out.read_dir_utf8()?.count(), 3);

    Ok(())
}

#[test]
fn test_release_requires_secrets() -> Result<()> {
    let project = Project::new()?;

    let mut cmd = project.cmd();
    cmd.env_remove("TAURI_PRIVATE_KEY");
    cmd.env_remove("TAURI_KEY_PASSWORD");
    cmd.args(["release", "--target", TARGET, "--platform", "windows"]);
    cmd.args(["--alias", "windows-x64"]);
    cmd.assert().failure().stderr(predicate::str::contains(
        "required environment variables are not set: \
         TAURI_PRIVATE_KEY, TAURI_KEY_PASSWORD",
    ));

    assert!(!project.root.join("bin").exists());
    assert_eq!(project.manifest_text("github")?, MANIFEST);
    Ok(())
}

#[test]
fn test_release_invalid_alias() -> Result<()> {
    let project = Project::new()?;

    let mut cmd = project.cmd();
    cmd.args(["release", "--target", TARGET, "--platform", "windows"]);
    cmd.args(["--alias", "windows/x64", "--no-bundle"]);
    cmd.assert().failure().stderr(predicate::str::contains(
        "invalid value 'windows/x64' for '--alias <ALIAS>'",
    ));

    let mut cmd = project.cmd();
    cmd.args(["release", "--target", TARGET, "--platform", "linux"]);
    cmd.args(["--alias", "linux-x64", "--no-bundle"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("invalid value 'linux'"));
    Ok(())
}

#[test]
fn test_update_manifest() -> Result<()> {
    let project = Project::new()?;
    let signature = project
        .root
        .join("etcd-workbench-1.0.0-windows-x64.nsis.zip.sig");
    fs_err::write(&signature, "SIG123")?;

    let mut cmd = project.cmd();
    cmd.args(["update-manifest", "--version", "1.0.0"]);
    cmd.args(["--platform-key", "windows-x86_64"]);
    cmd.arg("--signature-file").arg(&signature);
    cmd.args(["--pub-date", PUB_DATE]);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("updated github"))
        .stdout(predicate::str::contains("updated gitee"));

    let manifests = ["github", "gitee"]
        .into_iter()
        .map(|mirror| {
            let path = manifest_path(&project.root, mirror);
            let manifest = read_manifest(&path)?;
            Ok((mirror.to_owned(), manifest))
        })
        .collect::<Result<Vec<_>>>()?;
    assert!(check_mirrors(&manifests).is_empty());
    let (_, gitee) = &manifests[1];
    assert_eq!(gitee.pub_date, PUB_DATE);
    assert_eq!(
        gitee.platforms["windows-x86_64"].url,
        "https://gitee.com/tzfun/etcd-workbench/releases/download/App-1.0.0/etcd-workbench-1.0.0-windows-x64.nsis.zip"
    );

    Ok(())
}

#[test]
fn test_update_manifest_selected_mirror() -> Result<()> {
    let project = Project::new()?;
    let signature = project.root.join("update.sig");
    fs_err::write(&signature, "SIG456")?;

    let mut cmd = project.cmd();
    cmd.args(["update-manifest", "--version", "1.1.0"]);
    cmd.args(["--platform-key", "windows-x64", "--mirror", "gitee"]);
    cmd.args(["--file", "etcd-workbench-1.1.0-windows-x64.nsis.zip"]);
    cmd.arg("--signature-file").arg(&signature);
    cmd.assert().success();

    assert_eq!(project.manifest_text("github")?, MANIFEST);
    let gitee = project.manifest("gitee")?;
    assert_eq!(gitee["version"], "1.1.0");
    assert_eq!(gitee["platforms"]["windows-x64"]["signature"], "SIG456");

    // The mirrors now disagree, which `show` reports.
    let mut cmd = project.cmd();
    cmd.arg("show");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("version:  1.1.0"))
        .stdout(predicate::str::contains(
            "warning: mirror `gitee` advertises version 1.1.0, \
             but `github` advertises 0.9.0",
        ))
        .stdout(predicate::str::contains(
            "warning: platform `windows-x64` is in `gitee` \
             but missing from `github`",
        ));

    Ok(())
}

#[test]
fn test_update_manifest_unknown_mirror() -> Result<()> {
    let project = Project::new()?;
    let signature = project.root.join("a.nsis.zip.sig");
    fs_err::write(&signature, "SIG")?;

    let mut cmd = project.cmd();
    cmd.args(["update-manifest", "--version", "1.0.0"]);
    cmd.args(["--platform-key", "windows-x64"]);
    cmd.args(["--mirror", "github", "--mirror", "gitlab"]);
    cmd.arg("--signature-file").arg(&signature);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("unknown mirror `gitlab`"));

    // No mirror is touched if any name is wrong.
    assert_eq!(project.manifest_text("github")?, MANIFEST);
    assert_eq!(project.manifest_text("gitee")?, MANIFEST);
    Ok(())
}

#[test]
fn test_update_manifest_malformed() -> Result<()> {
    let project = Project::new()?;
    fs_err::write(manifest_path(&project.root, "github"), "{\"version\": 1")?;
    let signature = project.root.join("a.nsis.zip.sig");
    fs_err::write(&signature, "SIG")?;

    let mut cmd = project.cmd();
    cmd.args(["update-manifest", "--version", "1.0.0"]);
    cmd.args(["--platform-key", "windows-x64"]);
    cmd.arg("--signature-file").arg(&signature);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("mirror `github`"))
        .stderr(predicate::str::contains("error parsing update manifest"));

    // The run stops at the first failure.
    assert_eq!(project.manifest_text("gitee")?, MANIFEST);
    Ok(())
}

#[test]
fn test_show() -> Result<()> {
    let project = Project::new()?;

    let mut cmd = project.cmd();
    cmd.arg("show");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("github ("))
        .stdout(predicate::str::contains("gitee ("))
        .stdout(predicate::str::contains("darwin-aarch64"))
        .stdout(predicate::str::contains("mirrors are consistent"));
    Ok(())
}

#[test]
fn test_missing_config() -> Result<()> {
    let tempdir = tempfile::tempdir()?;

    let mut cmd = Command::cargo_bin("workbench-release").unwrap();
    cmd.current_dir(tempdir.path());
    cmd.env_remove("WORKBENCH_RELEASE_CONFIG");
    cmd.arg("show");
    cmd.assert().failure().stderr(predicate::str::contains(
        "error resolving configuration file `release.toml`",
    ));
    Ok(())
}
