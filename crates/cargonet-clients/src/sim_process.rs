//! Generic "spawn executable with args" helper for the truck simulator
//! process: the process launcher is treated as a generic spawn-executable-
//! with-args helper that knows only how to stage and launch it, not what
//! it does once running.
//!
//! This module deliberately knows nothing about the truck simulator's
//! domain behavior — only how to get its executable running next to its
//! master file with the right command-line flags. [`crate::truck`] and
//! [`crate::manager`] own the lifetime of the resulting [`tokio::process::Child`].

use std::path::{Path, PathBuf};
use tokio::process::{Child, Command};

use crate::error::ClientError;

/// Parameters for launching one truck simulator process, mirroring
/// `exePath`/`masterFilePath`/`simTime`/`configUpdates`/`argsUpdates`.
#[derive(Debug, Clone)]
pub struct SimProcessConfig {
    pub exe_path: PathBuf,
    pub master_file_path: PathBuf,
    pub sim_time: f64,
    pub broker_host: String,
    pub broker_port: u16,
    pub config_updates: Vec<(String, String)>,
    pub args_updates: Vec<String>,
}

/// Copies `exe_path` into the directory containing `master_file_path` so
/// the simulator's relative config paths resolve the way they do when
/// launched from that directory.
async fn stage_executable(exe_path: &Path, master_file_path: &Path) -> Result<PathBuf, ClientError> {
    let dest_dir = master_file_path.parent().ok_or_else(|| ClientError::LifecycleError {
        detail: format!("master file path '{}' has no parent directory", master_file_path.display()),
    })?;
    tokio::fs::create_dir_all(dest_dir).await.map_err(|e| ClientError::LifecycleError {
        detail: format!("failed to create master file directory: {e}"),
    })?;

    let file_name = exe_path.file_name().ok_or_else(|| ClientError::LifecycleError {
        detail: format!("exe path '{}' has no file name", exe_path.display()),
    })?;
    let staged = dest_dir.join(file_name);

    tokio::fs::copy(exe_path, &staged).await.map_err(|e| ClientError::LifecycleError {
        detail: format!("failed to copy simulator executable into place: {e}"),
    })?;

    Ok(staged)
}

/// Stages the executable next to the master file and launches it with
/// `--mode controlled --sim_time N --master FILE` plus the broker
/// endpoint and any caller-supplied config/arg overrides.
pub async fn spawn_truck_simulator(config: &SimProcessConfig) -> Result<Child, ClientError> {
    let staged_exe = stage_executable(&config.exe_path, &config.master_file_path).await?;

    let mut cmd = Command::new(&staged_exe);
    cmd.arg("--mode")
        .arg("controlled")
        .arg("--sim_time")
        .arg(config.sim_time.to_string())
        .arg("--master")
        .arg(&config.master_file_path)
        .arg("--broker_host")
        .arg(&config.broker_host)
        .arg("--broker_port")
        .arg(config.broker_port.to_string());

    for (key, value) in &config.config_updates {
        cmd.arg("--config").arg(format!("{key}={value}"));
    }
    for extra in &config.args_updates {
        cmd.arg(extra);
    }

    cmd.kill_on_drop(true);

    cmd.spawn().map_err(|e| ClientError::LifecycleError {
        detail: format!("failed to spawn truck simulator process: {e}"),
    })
}

/// Best-effort kill, swallowing failures the way a server reset swallows
/// exceptions from per-client teardown.
pub async fn kill_best_effort(child: &mut Child) {
    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "truck simulator process already gone");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stage_executable_copies_next_to_master_file() {
        let src_dir = tempfile::tempdir().unwrap();
        let exe_path = src_dir.path().join("truck_sim");
        tokio::fs::write(&exe_path, b"#!/bin/sh\nexit 0\n").await.unwrap();

        let run_dir = tempfile::tempdir().unwrap();
        let master_file = run_dir.path().join("nested").join("master.xml");

        let staged = stage_executable(&exe_path, &master_file).await.unwrap();
        assert_eq!(staged.parent().unwrap(), master_file.parent().unwrap());
        assert!(tokio::fs::metadata(&staged).await.is_ok());
    }

    #[tokio::test]
    async fn stage_executable_fails_on_missing_source() {
        let run_dir = tempfile::tempdir().unwrap();
        let master_file = run_dir.path().join("master.xml");
        let err = stage_executable(Path::new("/no/such/truck_sim"), &master_file)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::LifecycleError { .. }));
    }
}
