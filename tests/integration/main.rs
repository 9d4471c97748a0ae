//! Integration tests for Kiln

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    fn kiln() -> Command {
        let mut cmd = cargo_bin_cmd!("kiln");
        cmd.env_remove("KILN_KILNFILE").env_remove("PIVNET_TOKEN");
        cmd
    }

    #[test]
    fn help_displays() {
        kiln()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("fetch"))
            .stdout(predicate::str::contains("update-release"));
    }

    #[test]
    fn version_displays() {
        kiln()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("kiln"));
    }

    #[test]
    fn fetch_without_kilnfile_fails() {
        let temp = TempDir::new().unwrap();
        kiln()
            .current_dir(temp.path())
            .args(["fetch", "--no-confirm"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Configuration file not found"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn fetch_with_nothing_pinned_succeeds() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("Kilnfile"), "---\nrelease_sources: []\n").unwrap();
        fs::write(
            temp.path().join("Kilnfile.lock"),
            "---\nreleases: []\nstemcell_criteria:\n  os: ubuntu-xenial\n  version: \"190.0\"\n",
        )
        .unwrap();

        kiln()
            .current_dir(temp.path())
            .args(["fetch", "--no-confirm"])
            .assert()
            .success();

        assert!(temp.path().join("releases").is_dir());
    }

    #[test]
    fn fetch_reports_unresolved_releases() {
        let temp = TempDir::new().unwrap();
        let kilnfile = temp.path().join("Kilnfile");
        fs::write(&kilnfile, "---\nrelease_sources: []\n").unwrap();
        fs::write(
            temp.path().join("Kilnfile.lock"),
            "---\nreleases:\n- name: uaa\n  sha1: \"\"\n  version: 73.3.0\nstemcell_criteria:\n  os: ubuntu-xenial\n  version: \"190.0\"\n",
        )
        .unwrap();

        kiln()
            .args(["fetch", "--no-confirm", "--kilnfile"])
            .arg(&kilnfile)
            .arg("--releases-directory")
            .arg(temp.path().join("releases"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("could not find the following releases"))
            .stderr(predicate::str::contains("- uaa (73.3.0)"));
    }

    #[test]
    fn update_release_missing_pin_fails() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("Kilnfile"), "---\nrelease_sources: []\n").unwrap();
        let lock = "---\nreleases:\n- name: capi\n  sha1: abc\n  version: 1.87.0\nstemcell_criteria:\n  os: some-os\n  version: 4.5.6\n";
        fs::write(temp.path().join("Kilnfile.lock"), lock).unwrap();

        kiln()
            .current_dir(temp.path())
            .args(["update-release", "--name", "uaa", "--version", "73.3.0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No release named uaa"));

        assert_eq!(fs::read_to_string(temp.path().join("Kilnfile.lock")).unwrap(), lock);
    }

    #[test]
    fn update_release_from_bosh_io() {
        use httpmock::prelude::*;

        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/releases/github.com/cloudfoundry/capi");
            then.status(200)
                .body(r#"[{"version": "1.87.8"}, {"version": "1.87.0"}]"#);
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/d/github.com/cloudfoundry/capi-release")
                .query_param("v", "1.87.8");
            then.status(200).body("lots of files");
        });

        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join("Kilnfile"),
            format!("---\nrelease_sources:\n- type: bosh.io\n  endpoint: {}\n", server.base_url()),
        )
        .unwrap();
        fs::write(
            temp.path().join("Kilnfile.lock"),
            r#"---
releases:
- name: "loggregator-agent"
  version: "5.1.0"
  sha1: "a86e10219b0ed9b7b82f0610b7cdc03c13765722"
- name: capi
  sha1: "03ac801323cd23205dde357cc7d2dc9e92bc0c93"
  version: "1.87.0"
stemcell_criteria:
  os: some-os
  version: "4.5.6"
"#,
        )
        .unwrap();

        kiln()
            .current_dir(temp.path())
            .args(["update-release", "--name", "capi", "--version", "1.87.8"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Updated capi to 1.87.8"));

        assert_eq!(
            fs::read_to_string(temp.path().join("releases/capi-1.87.8.tgz")).unwrap(),
            "lots of files"
        );

        assert_eq!(
            fs::read_to_string(temp.path().join("Kilnfile.lock")).unwrap(),
            r#"---
releases:
- name: "loggregator-agent"
  version: "5.1.0"
  sha1: "a86e10219b0ed9b7b82f0610b7cdc03c13765722"
- name: capi
  sha1: "ba01716b40a3557d699d024d76c307e351e96829"
  version: "1.87.8"
stemcell_criteria:
  os: some-os
  version: "4.5.6"
"#
        );
    }
}
