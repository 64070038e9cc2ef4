use std::{
    ffi::{OsStr, OsString},
    fs::File,
    io::{BufRead, BufReader, Write},
    path::Path,
    process::{Command, Stdio},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use chrono::{Local, SecondsFormat};
use indicatif::{ProgressBar, ProgressStyle};

/// Environment overrides applied to a single subprocess. The parent's environment is inherited
/// and never modified.
pub type Env = Vec<(OsString, OsString)>;

pub fn log_filename(id: impl AsRef<str>) -> String {
    let ts = Local::now()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace(':', "-");

    format!("{}-{}.log", id.as_ref(), ts)
}

fn stream_lines(
    reader: impl std::io::Read + Send + 'static,
    pb: ProgressBar,
    log: Arc<Mutex<File>>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let reader = BufReader::new(reader);
        for line in reader.lines().map_while(Result::ok) {
            pb.set_message(line.chars().take(80).collect::<String>());
            if let Ok(mut f) = log.lock() {
                let _ = f.write_all(line.as_bytes());
                let _ = f.write_all(b"\n");
            }
        }
    })
}

/// Run a command in directory and show output in a spinner.
///
/// If the command doesn't finish successfuly the full output is kept in `logs_dir` and the path
/// is part of the error.
pub fn run_command_in(
    logs_dir: impl AsRef<Path>,
    workdir: impl AsRef<Path>,
    title: &str,
    command: impl AsRef<OsStr>,
    args: &[impl AsRef<OsStr>],
    env: &Env,
) -> Result<()> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner:.dim} {msg:.dim}")?);
    pb.enable_steady_tick(Duration::from_millis(80));
    pb.set_message(title.to_string());

    let mut cmd = Command::new(command.as_ref());
    cmd.args(args)
        .envs(env.iter().map(|(k, v)| (k, v)))
        .current_dir(workdir.as_ref())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    log::debug!(
        "{} $ {} {}",
        workdir.as_ref().display(),
        command.as_ref().to_string_lossy(),
        args.iter()
            .map(|a| a.as_ref().to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let mut child = cmd.spawn().context(format!("spawning `{title}`"))?;

    let stdout = child.stdout.take().context("stdout was not captured")?;
    let stderr = child.stderr.take().context("stderr was not captured")?;

    let log_path = logs_dir.as_ref().join(log_filename(title));
    log::trace!("{}", log_path.display());

    let log = Arc::new(Mutex::new(
        File::create(&log_path).context(format!("creating {}", log_path.display()))?,
    ));

    let t_out = stream_lines(stdout, pb.clone(), log.clone());
    let t_err = stream_lines(stderr, pb.clone(), log);

    let status = child
        .wait()
        .context(format!("waiting for `{title}` to finish"))?;
    let _ = t_out.join();
    let _ = t_err.join();

    if status.success() {
        pb.finish_with_message(format!("{title} finished successfully"));
        Ok(())
    } else {
        pb.finish();
        bail!(
            "{title} exited with status {}\nFull output is available at {}",
            status,
            log_path.display()
        );
    }
}

/// Run a command to completion and return its stdout.
pub fn capture_command_in(
    workdir: impl AsRef<Path>,
    command: impl AsRef<OsStr>,
    args: &[impl AsRef<OsStr>],
    env: &Env,
) -> Result<String> {
    let command = command.as_ref();
    let output = Command::new(command)
        .args(args)
        .envs(env.iter().map(|(k, v)| (k, v)))
        .current_dir(workdir.as_ref())
        .output()
        .context(format!("spawning `{}`", command.to_string_lossy()))?;

    if !output.status.success() {
        bail!(
            "`{}` exited with status {}\n{}",
            command.to_string_lossy(),
            output.status,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    String::from_utf8(output.stdout).context("command output is not valid UTF-8")
}
