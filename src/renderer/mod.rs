pub mod discovery;
pub mod process;
pub mod reader;

pub use discovery::{EndpointDiscovery, EndpointRole, RendererEndpoints};
pub use process::{ExitReport, RendererProcess};
pub use reader::RendererLog;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::{PreviewMode, RendererConfig};
use crate::error::{Error, Result};

/// Everything needed to start one renderer process.
#[derive(Debug, Clone)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Merged over the inherited environment.
    pub env: BTreeMap<String, String>,
    pub log_lines: usize,
}

impl LaunchCommand {
    /// Build the command line for previewing `entry` inside project `root`.
    pub fn for_preview(config: &RendererConfig, root: &Path, entry: &Path, log_lines: usize) -> Self {
        Self {
            program: config.program.clone(),
            args: renderer_args(config, root, entry),
            cwd: Some(root.to_path_buf()),
            env: config.env.clone(),
            log_lines,
        }
    }
}

/// Compute renderer arguments. All servers bind port 0 so the OS picks a
/// free port, which is later learned through endpoint discovery. The entry
/// file is always the final positional argument.
pub fn renderer_args(config: &RendererConfig, root: &Path, entry: &Path) -> Vec<String> {
    let dynamic = format!("{}:0", config.host);
    let mut args = config.leading_args.clone();

    args.push("--data-plane-host".to_string());
    args.push(dynamic.clone());
    args.push("--control-plane-host".to_string());
    args.push(dynamic.clone());
    args.push("--static-file-host".to_string());
    args.push(dynamic);

    args.push("--root".to_string());
    args.push(root.display().to_string());

    if config.partial_rendering {
        args.push("--partial-rendering".to_string());
    }
    if !config.invert_colors.is_empty() {
        args.push("--invert-colors".to_string());
        args.push(config.invert_colors.clone());
    }
    if config.preview_mode != PreviewMode::Doc {
        args.push(format!("--preview-mode={}", config.preview_mode.as_str()));
    }
    for (key, value) in &config.inputs {
        args.push("--input".to_string());
        args.push(format!("{key}={value}"));
    }
    for path in &config.font_paths {
        args.push("--font-path".to_string());
        args.push(path.display().to_string());
    }
    if config.ignore_system_fonts {
        args.push("--ignore-system-fonts".to_string());
    }

    args.push(entry.display().to_string());
    args
}

/// Spawns renderer processes. Stateless: one call, one process; processes
/// are never pooled or shared between sessions.
pub struct RendererLauncher;

impl RendererLauncher {
    /// Spawn the renderer, wire its output to the log ring and endpoint
    /// discovery, and watch for its exit.
    ///
    /// `on_exit` runs once on the exit-watcher thread when the process ends
    /// on its own. It does not run when the process is killed through
    /// [`RendererProcess::kill`].
    pub fn launch(
        command: &LaunchCommand,
        on_exit: Box<dyn FnOnce(ExitReport) + Send>,
    ) -> Result<RendererProcess> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = &command.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &command.env {
            let trimmed_key = key.trim();
            if trimmed_key.is_empty() {
                continue;
            }
            cmd.env(trimmed_key, value);
        }

        let mut child = cmd.spawn().map_err(|source| Error::Spawn {
            program: command.program.clone(),
            source,
        })?;
        let pid = child.id();
        tracing::info!(pid, program = %command.program, "Renderer process spawned");
        tracing::debug!(args = ?command.args, "Renderer arguments");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (endpoint_tx, endpoint_rx) = crossbeam_channel::bounded(1);
        let discovery = Arc::new(Mutex::new(EndpointDiscovery::new(Some(endpoint_tx))));
        let log = RendererLog::new(command.log_lines);

        let mut process = RendererProcess::new(child, pid, log.clone(), endpoint_rx);

        // The discovery handle is owned only by the readers, so the endpoint
        // channel disconnects once both streams hit EOF.
        if let Some(stdout) = stdout {
            reader::spawn_output_reader(stdout, "stdout", pid, Arc::clone(&discovery), log.clone());
        }
        if let Some(stderr) = stderr {
            reader::spawn_output_reader(stderr, "stderr", pid, discovery, log);
        }
        process.watch_exit(on_exit);

        Ok(process)
    }
}
