use assert_cmd::Command;
use assert_fs::{prelude::*, TempDir};
use std::path::PathBuf;

/// Isolated environment for one test
pub struct TestContext {
    pub temp: TempDir,
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TestContext {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        for dir in ["config", "data", "cache"] {
            std::fs::create_dir_all(temp.child(dir).path()).unwrap();
        }
        Self { temp }
    }

    /// Command running the binary with config, data and cache inside the temp dir
    pub fn tester(&self) -> Command {
        #[allow(deprecated)]
        let mut cmd = Command::cargo_bin("integration-tester").unwrap();
        cmd.current_dir(&self.temp);
        cmd.env_remove("GITHUB_TOKEN");

        let config_dir = self.temp.child("config").to_path_buf();
        let data_dir = self.temp.child("data").to_path_buf();
        let cache_dir = self.temp.child("cache").to_path_buf();

        if cfg!(target_os = "windows") {
            cmd.env("APPDATA", &config_dir);
            cmd.env("LOCALAPPDATA", &cache_dir);
            cmd.env("USERPROFILE", self.temp.path());
        } else if cfg!(target_os = "linux") {
            cmd.env("XDG_CONFIG_HOME", &config_dir);
            cmd.env("XDG_DATA_HOME", &data_dir);
            cmd.env("XDG_CACHE_HOME", &cache_dir);
            cmd.env("HOME", self.temp.path());
        } else {
            cmd.env("HOME", self.temp.path());
        }

        cmd
    }

    /// Write the config file, pointing data and cache into the temp dir
    pub fn write_config(&self, api_url: &str) {
        let yaml = format!(
            "api_url: {}\nrequest_timeout_secs: 5\ndata_dir: {}\ncache_dir: {}\n",
            api_url,
            self.temp.child("data").path().display(),
            self.temp.child("cache").path().display(),
        );
        let config_file = if cfg!(target_os = "linux") || cfg!(target_os = "windows") {
            self.temp.child("config/integration-tester/config.yaml")
        } else {
            self.temp
                .child("Library/Application Support/integration-tester/config.yaml")
        };
        config_file.write_str(&yaml).unwrap();
    }

    /// Where integrations are installed (the default `./custom_components`)
    pub fn install_dir(&self) -> PathBuf {
        self.temp.child("custom_components").to_path_buf()
    }
}
