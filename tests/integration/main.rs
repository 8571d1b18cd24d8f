//! Integration tests for orca

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// A scratch directory with an isolated config and no cache
    struct Workspace {
        dir: TempDir,
    }

    impl Workspace {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
            }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn arg(&self, name: &str) -> String {
            self.path(name).display().to_string()
        }

        fn orca(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("orca");
            cmd.env("ORCA_CONFIG", self.path("config.toml"))
                .env_remove("ORCA_CACHE")
                .env("CI", "true");
            cmd
        }

        fn write(&self, name: &str, content: &str) -> String {
            std::fs::write(self.path(name), content).unwrap();
            self.arg(name)
        }

        /// Push two text files to `src:v1`
        fn seed(&self) {
            let a = self.write("a.txt", "alpha");
            let b = self.write("b.txt", "beta");
            self.orca()
                .args(["push", &format!("{}:v1", self.arg("src")), &a, &b])
                .assert()
                .success();
        }
    }

    /// Tags listed in a layout's `index.json`, sorted
    fn tags_of(layout: &Path) -> Vec<String> {
        let Ok(content) = std::fs::read(layout.join("index.json")) else {
            return Vec::new();
        };
        let index: serde_json::Value = serde_json::from_slice(&content).unwrap();
        let mut tags: Vec<String> = index["manifests"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|m| m["annotations"]["org.opencontainers.image.ref.name"].as_str())
            .map(str::to_string)
            .collect();
        tags.sort();
        tags
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("orca")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Replicate OCI artifacts"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("orca")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("orca"));
    }

    #[test]
    fn config_path() {
        let ws = Workspace::new();
        ws.orca()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_defaults() {
        let ws = Workspace::new();
        ws.orca()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[copy]"))
            .stdout(predicate::str::contains("referrers = \"auto\""));
    }

    #[test]
    fn config_set_then_show() {
        let ws = Workspace::new();
        ws.orca()
            .args(["config", "set", "copy.concurrency", "7"])
            .assert()
            .success();
        ws.orca()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("concurrency = 7"));
    }

    #[test]
    fn push_creates_a_tagged_layout() {
        let ws = Workspace::new();
        let a = ws.write("a.txt", "alpha");
        ws.orca()
            .args(["push", &format!("{}:v1", ws.arg("src")), &a, "--tag", "stable"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Copied"))
            .stdout(predicate::str::contains("Pushed 1 file(s)"));

        assert!(ws.path("src").join("oci-layout").exists());
        assert_eq!(tags_of(&ws.path("src")), vec!["stable", "v1"]);
    }

    #[test]
    fn copy_then_pull_round_trip() {
        let ws = Workspace::new();
        ws.seed();

        ws.orca()
            .args(["copy", &format!("{}:v1", ws.arg("src")), &ws.arg("dst")])
            .assert()
            .success()
            .stdout(predicate::str::contains("Copied"));
        assert_eq!(tags_of(&ws.path("dst")), vec!["v1"]);

        ws.orca()
            .args([
                "pull",
                &format!("{}:v1", ws.arg("dst")),
                "--output",
                &ws.arg("out"),
            ])
            .assert()
            .success();
        assert_eq!(std::fs::read_to_string(ws.path("out").join("a.txt")).unwrap(), "alpha");
        assert_eq!(std::fs::read_to_string(ws.path("out").join("b.txt")).unwrap(), "beta");
    }

    #[test]
    fn second_copy_skips_everything() {
        let ws = Workspace::new();
        ws.seed();
        let src = format!("{}:v1", ws.arg("src"));

        ws.orca().args(["copy", &src, &ws.arg("dst")]).assert().success();
        ws.orca()
            .args(["copy", &src, &ws.arg("dst")])
            .assert()
            .success()
            .stdout(predicate::str::contains("Exists"))
            .stdout(predicate::str::contains("Copied: 0"));
    }

    #[test]
    fn copy_dry_run_writes_nothing() {
        let ws = Workspace::new();
        ws.seed();

        ws.orca()
            .args([
                "copy",
                &format!("{}:v1", ws.arg("src")),
                &ws.arg("dst"),
                "--dry-run",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("Would copy"));
        assert!(tags_of(&ws.path("dst")).is_empty());
    }

    #[test]
    fn copy_needs_a_source_reference() {
        let ws = Workspace::new();
        ws.seed();
        ws.orca()
            .args(["copy", &ws.arg("src"), &ws.arg("dst")])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"))
            .stderr(predicate::str::contains("names no artifact"));
    }

    #[test]
    fn missing_source_layout_fails() {
        let ws = Workspace::new();
        ws.orca()
            .args(["copy", &format!("{}:v1", ws.arg("nowhere")), &ws.arg("dst")])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn unknown_tag_fails() {
        let ws = Workspace::new();
        ws.seed();
        ws.orca()
            .args(["copy", &format!("{}:v9", ws.arg("src")), &ws.arg("dst")])
            .assert()
            .failure()
            .stderr(predicate::str::contains("v9"));
    }

    #[test]
    fn tag_adds_references() {
        let ws = Workspace::new();
        ws.seed();
        ws.orca()
            .args(["tag", &format!("{}:v1", ws.arg("src")), "latest", "1.0"])
            .assert()
            .success();
        assert_eq!(tags_of(&ws.path("src")), vec!["1.0", "latest", "v1"]);
    }

    #[test]
    fn discover_and_recursive_copy_follow_referrers() {
        let ws = Workspace::new();
        ws.seed();
        let sig = ws.write("sig.txt", "signature");
        ws.orca()
            .args([
                "push",
                &format!("{}:sig", ws.arg("src")),
                &sig,
                "--subject",
                "v1",
                "--artifact-type",
                "application/vnd.example.sig",
            ])
            .assert()
            .success();

        ws.orca()
            .args(["discover", &format!("{}:v1", ws.arg("src"))])
            .assert()
            .success()
            .stdout(predicate::str::contains("application/vnd.example.sig"));

        ws.orca()
            .args([
                "copy",
                &format!("{}:v1", ws.arg("src")),
                &ws.arg("dst"),
                "--recursive",
            ])
            .assert()
            .success();
        ws.orca()
            .args(["discover", &format!("{}:v1", ws.arg("dst")), "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"artifactType\": \"application/vnd.example.sig\""));
    }

    #[test]
    fn delete_requires_confirmation() {
        let ws = Workspace::new();
        ws.seed();
        let target = format!("{}:v1", ws.arg("src"));

        ws.orca()
            .args(["delete", &target])
            .assert()
            .success()
            .stdout(predicate::str::contains("Aborted"));
        assert_eq!(tags_of(&ws.path("src")), vec!["v1"]);

        ws.orca().args(["delete", &target, "--yes"]).assert().success();
        assert!(tags_of(&ws.path("src")).is_empty());
    }

    #[test]
    fn backup_and_restore() {
        let ws = Workspace::new();
        ws.seed();

        ws.orca()
            .args(["backup", &ws.arg("src"), &ws.arg("backup")])
            .assert()
            .success()
            .stdout(predicate::str::contains("Backed up v1"));
        assert_eq!(tags_of(&ws.path("backup")), vec!["v1"]);

        ws.orca()
            .args(["restore", &ws.arg("backup"), &ws.arg("restored"), "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Would copy"));
        assert!(tags_of(&ws.path("restored")).is_empty());

        ws.orca()
            .args(["restore", &ws.arg("backup"), &ws.arg("restored")])
            .assert()
            .success();
        assert_eq!(tags_of(&ws.path("restored")), vec!["v1"]);
    }

    #[test]
    fn cache_without_roots() {
        let ws = Workspace::new();
        ws.orca()
            .args(["cache", "info"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cache configured"));
    }

    #[test]
    fn cache_fills_on_copy_and_clears() {
        let ws = Workspace::new();
        ws.seed();
        let cache = ws.arg("cache");

        ws.orca()
            .env("ORCA_CACHE", &cache)
            .args(["copy", &format!("{}:v1", ws.arg("src")), &ws.arg("dst")])
            .assert()
            .success();
        ws.orca()
            .env("ORCA_CACHE", &cache)
            .args(["cache", "info"])
            .assert()
            .success()
            .stdout(predicate::str::contains("read-write"))
            .stdout(predicate::str::contains("Blobs: 0").not());

        ws.orca()
            .env("ORCA_CACHE", &cache)
            .args(["cache", "clear", "--yes"])
            .assert()
            .success();
        assert!(!ws.path("cache").exists());
    }
}
