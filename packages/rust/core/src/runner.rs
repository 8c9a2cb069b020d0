//! External process steps for one submission: git, python env, notebook.
//!
//! Every step runs as a child process with captured output under a
//! wall-clock limit. On unix each child leads its own process group, and a
//! child that outlives the limit is killed together with everything it started.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tracing::{debug, info, instrument};

use coursegrade_shared::{GradeError, Result, RunnerConfig};

/// Lines of stderr kept in a failed command's error.
const STDERR_TAIL_LINES: usize = 20;

// ---------------------------------------------------------------------------
// Process execution
// ---------------------------------------------------------------------------

/// A command line to run, with optional working directory and extra env.
#[derive(Debug, Clone, Default)]
pub struct ProcessSpec {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub cwd: Option<PathBuf>,
    /// Added on top of the inherited environment.
    pub env: Vec<(String, OsString)>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn envs(mut self, vars: impl IntoIterator<Item = (String, OsString)>) -> Self {
        self.env.extend(vars);
        self
    }

    /// Human-readable command line for logs and errors.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|s| s.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured output of a successful command.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs [`ProcessSpec`]s under a shared wall-clock limit.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    limit: Duration,
}

impl ProcessRunner {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(Duration::from_secs(config.process_timeout_secs))
    }

    /// Run to completion. Non-zero exit and timeouts are errors.
    pub async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput> {
        let command = spec.display();
        debug!(%command, "running command");

        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|source| GradeError::Spawn {
            command: command.clone(),
            source,
        })?;
        let pid = child.id();

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.limit, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| GradeError::Spawn {
                command: command.clone(),
                source,
            })?,
            Err(_) => {
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                return Err(GradeError::Timeout {
                    command,
                    secs: self.limit.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(GradeError::Command {
                command,
                status: output.status.to_string(),
                stderr: tail_lines(&stderr, STDERR_TAIL_LINES),
            });
        }

        Ok(ProcessOutput { stdout, stderr })
    }
}

/// SIGKILL the group led by `pgid` (kernel of a notebook, pip builds, ...).
#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pgid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pgid, error = %e, "failed to kill process group"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

fn tail_lines(text: &str, max: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(max);
    lines[start..].join("\n")
}

// ---------------------------------------------------------------------------
// Git
// ---------------------------------------------------------------------------

/// `git clone <repo_url> <dest>`.
#[instrument(skip(runner))]
pub async fn git_clone(runner: &ProcessRunner, repo_url: &str, dest: &Path) -> Result<()> {
    let spec = ProcessSpec::new("git")
        .arg("clone")
        .arg(repo_url)
        .arg(dest.as_os_str());
    runner.run(&spec).await?;
    Ok(())
}

/// Fetch all refs and tags, then check out `git_ref`.
#[instrument(skip(runner))]
pub async fn git_checkout(runner: &ProcessRunner, repo_dir: &Path, git_ref: &str) -> Result<()> {
    let fetch = ProcessSpec::new("git")
        .arg("fetch")
        .arg("--all")
        .arg("--tags")
        .current_dir(repo_dir);
    runner.run(&fetch).await?;

    let checkout = ProcessSpec::new("git")
        .arg("checkout")
        .arg(git_ref)
        .current_dir(repo_dir);
    runner.run(&checkout).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Python environment
// ---------------------------------------------------------------------------

/// Interpreter inside a virtualenv created at `venv_dir`.
pub fn venv_python(venv_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        venv_dir.join("Scripts").join("python.exe")
    } else {
        venv_dir.join("bin").join("python")
    }
}

/// `<python> -m pip install -q -r requirements.txt`, if the repo has one.
pub async fn install_requirements(
    runner: &ProcessRunner,
    repo_dir: &Path,
    python: &OsString,
) -> Result<()> {
    let requirements = repo_dir.join("requirements.txt");
    if !requirements.exists() {
        debug!(repo = %repo_dir.display(), "no requirements.txt, skipping install");
        return Ok(());
    }

    let spec = ProcessSpec::new(python)
        .args(["-m", "pip", "install", "-q", "-r"])
        .arg(requirements.as_os_str())
        .current_dir(repo_dir);
    runner.run(&spec).await?;
    Ok(())
}

/// Install the team's requirements and return the interpreter to run with.
///
/// With `use_venv` a fresh virtualenv is created under `team_dir/.venv`.
#[instrument(skip(runner))]
pub async fn prepare_python(
    runner: &ProcessRunner,
    team_dir: &Path,
    python: &str,
    use_venv: bool,
) -> Result<OsString> {
    if !use_venv {
        let python = OsString::from(python);
        install_requirements(runner, team_dir, &python).await?;
        return Ok(python);
    }

    let venv_dir = team_dir.join(".venv");
    let create = ProcessSpec::new(python)
        .args(["-m", "venv"])
        .arg(venv_dir.as_os_str());
    runner.run(&create).await?;

    let venv_py = venv_python(&venv_dir).into_os_string();
    let upgrade =
        ProcessSpec::new(&venv_py).args(["-m", "pip", "install", "-q", "--upgrade", "pip"]);
    runner.run(&upgrade).await?;

    install_requirements(runner, team_dir, &venv_py).await?;
    info!(venv = %venv_dir.display(), "virtualenv ready");
    Ok(venv_py)
}

// ---------------------------------------------------------------------------
// Notebook execution
// ---------------------------------------------------------------------------

/// Paths handed to the notebook through environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotebookEnv {
    pub python_exe: OsString,
    pub train_path: PathBuf,
    pub dev_path: PathBuf,
    pub test_path: PathBuf,
    pub out_path: PathBuf,
}

impl NotebookEnv {
    /// Resolve every path to an absolute one.
    ///
    /// `TRAIN_PATH`/`DEV_PATH` default to the repo's `data/public/` copies.
    pub fn resolve(
        team_dir: &Path,
        python_exe: OsString,
        hidden_test: &Path,
        train_override: Option<&Path>,
        dev_override: Option<&Path>,
    ) -> Result<Self> {
        let public = team_dir.join("data").join("public");
        let train = train_override.map_or_else(|| public.join("train.csv"), Path::to_path_buf);
        let dev = dev_override.map_or_else(|| public.join("dev.csv"), Path::to_path_buf);

        Ok(Self {
            python_exe,
            train_path: absolute(&train)?,
            dev_path: absolute(&dev)?,
            test_path: absolute(hidden_test)?,
            out_path: absolute(&team_dir.join("predictions.csv"))?,
        })
    }

    pub fn vars(&self) -> Vec<(String, OsString)> {
        vec![
            ("PYTHON_EXE".into(), self.python_exe.clone()),
            ("TRAIN_PATH".into(), self.train_path.clone().into_os_string()),
            ("DEV_PATH".into(), self.dev_path.clone().into_os_string()),
            ("TEST_PATH".into(), self.test_path.clone().into_os_string()),
            ("OUT_PATH".into(), self.out_path.clone().into_os_string()),
        ]
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| GradeError::io(path, e))
}

/// Notebook settings for one execution.
#[derive(Debug, Clone)]
pub struct NotebookRun<'a> {
    pub repo_dir: &'a Path,
    /// Notebook path relative to the repository root.
    pub nb_relpath: &'a str,
    /// Per-cell timeout handed to nbconvert.
    pub cell_timeout_secs: u64,
    /// Executed copy written by nbconvert.
    pub out_nb: &'a Path,
    /// Optional script that trims the notebook in place first.
    pub extractor: Option<&'a Path>,
    /// Interpreter for the extractor script.
    pub base_python: &'a str,
}

/// The nbconvert invocation that executes `nb_path` headlessly.
pub fn nbconvert_spec(run: &NotebookRun<'_>, nb_path: &Path, env: &NotebookEnv) -> ProcessSpec {
    ProcessSpec::new(&env.python_exe)
        .args(["-m", "jupyter", "nbconvert", "--to", "notebook", "--execute"])
        .arg(nb_path.as_os_str())
        .arg(format!(
            "--ExecutePreprocessor.timeout={}",
            run.cell_timeout_secs
        ))
        .arg("--output")
        .arg(run.out_nb.as_os_str())
        .current_dir(run.repo_dir)
        .envs(env.vars())
}

/// Run the extractor (if any), then execute the notebook with nbconvert.
#[instrument(skip_all, fields(notebook = run.nb_relpath))]
pub async fn execute_notebook(
    runner: &ProcessRunner,
    run: &NotebookRun<'_>,
    env: &NotebookEnv,
) -> Result<()> {
    let nb_path = run.repo_dir.join(run.nb_relpath);
    if !nb_path.exists() {
        return Err(GradeError::validation(format!(
            "notebook not found: {}",
            nb_path.display()
        )));
    }

    if let Some(extractor) = run.extractor {
        let extract = ProcessSpec::new(run.base_python)
            .arg(absolute(extractor)?.into_os_string())
            .arg("--input")
            .arg(nb_path.as_os_str())
            .arg("--output")
            .arg(nb_path.as_os_str());
        runner.run(&extract).await?;
        debug!(extractor = %extractor.display(), "extracted submission section");
    }

    runner.run(&nbconvert_spec(run, &nb_path, env)).await?;
    info!(out = %run.out_nb.display(), "notebook executed");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cg-runner-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn spec_display_joins_program_and_args() {
        let spec = ProcessSpec::new("git").arg("checkout").arg("final_week6");
        assert_eq!(spec.display(), "git checkout final_week6");
    }

    #[test]
    fn tail_keeps_last_lines() {
        let text = (1..=30).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let tail = tail_lines(&text, 3);
        assert_eq!(tail, "28\n29\n30");
        assert_eq!(tail_lines("one\n", 5), "one");
    }

    #[test]
    fn venv_python_location() {
        let py = venv_python(Path::new("/w/team/.venv"));
        if cfg!(windows) {
            assert!(py.ends_with("Scripts/python.exe"));
        } else {
            assert_eq!(py, PathBuf::from("/w/team/.venv/bin/python"));
        }
    }

    #[test]
    fn notebook_env_defaults_to_repo_public_data() {
        let env = NotebookEnv::resolve(
            Path::new("/w/Team_A"),
            "python3".into(),
            Path::new("/secret/hidden_test.csv"),
            None,
            None,
        )
        .unwrap();

        assert_eq!(env.train_path, PathBuf::from("/w/Team_A/data/public/train.csv"));
        assert_eq!(env.dev_path, PathBuf::from("/w/Team_A/data/public/dev.csv"));
        assert_eq!(env.out_path, PathBuf::from("/w/Team_A/predictions.csv"));

        let vars = env.vars();
        let names: Vec<_> = vars.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            names,
            vec!["PYTHON_EXE", "TRAIN_PATH", "DEV_PATH", "TEST_PATH", "OUT_PATH"]
        );
    }

    #[test]
    fn notebook_env_overrides_are_absolute() {
        let env = NotebookEnv::resolve(
            Path::new("work/t"),
            "python3".into(),
            Path::new("hidden_test.csv"),
            Some(Path::new("data/train.csv")),
            Some(Path::new("/shared/dev.csv")),
        )
        .unwrap();

        assert!(env.train_path.is_absolute());
        assert!(env.train_path.ends_with("data/train.csv"));
        assert_eq!(env.dev_path, PathBuf::from("/shared/dev.csv"));
        assert!(env.test_path.is_absolute());
        assert!(env.out_path.ends_with("work/t/predictions.csv"));
    }

    #[test]
    fn nbconvert_command_line() {
        let env = NotebookEnv::resolve(
            Path::new("/w/t"),
            "/w/t/.venv/bin/python".into(),
            Path::new("/h/test.csv"),
            None,
            None,
        )
        .unwrap();
        let out_nb = Path::new("/w/t/executed.ipynb");
        let run = NotebookRun {
            repo_dir: Path::new("/w/t"),
            nb_relpath: "nb/submission.ipynb",
            cell_timeout_secs: 1200,
            out_nb,
            extractor: None,
            base_python: "python3",
        };

        let spec = nbconvert_spec(&run, Path::new("/w/t/nb/submission.ipynb"), &env);
        assert_eq!(
            spec.display(),
            "/w/t/.venv/bin/python -m jupyter nbconvert --to notebook --execute \
             /w/t/nb/submission.ipynb --ExecutePreprocessor.timeout=1200 \
             --output /w/t/executed.ipynb"
        );
        assert_eq!(spec.cwd.as_deref(), Some(Path::new("/w/t")));
        assert!(spec.env.iter().any(|(k, v)| k == "OUT_PATH" && v == "/w/t/predictions.csv"));
    }

    #[tokio::test]
    async fn missing_notebook_fails_before_running_anything() {
        let tmp = temp_dir();
        let env = NotebookEnv::resolve(&tmp, "python3".into(), &tmp.join("t.csv"), None, None)
            .unwrap();
        let out_nb = tmp.join("executed.ipynb");
        let run = NotebookRun {
            repo_dir: &tmp,
            nb_relpath: "missing.ipynb",
            cell_timeout_secs: 10,
            out_nb: &out_nb,
            extractor: None,
            base_python: "python3",
        };

        let err = execute_notebook(&ProcessRunner::new(Duration::from_secs(5)), &run, &env)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("notebook not found"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn requirements_install_skipped_without_file() {
        let tmp = temp_dir();
        // The interpreter is never invoked when there is nothing to install.
        let python = OsString::from("/nonexistent/python");
        install_requirements(&ProcessRunner::new(Duration::from_secs(5)), &tmp, &python)
            .await
            .unwrap();
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn spawn_failure_is_reported() {
        let runner = ProcessRunner::new(Duration::from_secs(5));
        let err = runner
            .run(&ProcessSpec::new("/nonexistent/coursegrade-test-binary"))
            .await
            .unwrap_err();
        assert!(matches!(err, GradeError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_and_env() {
        let runner = ProcessRunner::new(Duration::from_secs(5));
        let spec = ProcessSpec::new("sh")
            .arg("-c")
            .arg("printf '%s' \"$OUT_PATH\"")
            .envs([("OUT_PATH".to_string(), OsString::from("/tmp/p.csv"))]);

        let output = runner.run(&spec).await.unwrap();
        assert_eq!(output.stdout, "/tmp/p.csv");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_carries_stderr_tail() {
        let runner = ProcessRunner::new(Duration::from_secs(5));
        let spec = ProcessSpec::new("sh")
            .arg("-c")
            .arg("echo 'fatal: bad ref' >&2; exit 3");

        let err = runner.run(&spec).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("exit status: 3"), "{msg}");
        assert!(msg.contains("fatal: bad ref"), "{msg}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_the_child() {
        let runner = ProcessRunner::new(Duration::from_millis(200));
        let spec = ProcessSpec::new("sleep").arg("10");

        let started = std::time::Instant::now();
        let err = runner.run(&spec).await.unwrap_err();
        assert!(matches!(err, GradeError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    /// True once `pid` is gone or only a zombie waiting to be reaped.
    #[cfg(target_os = "linux")]
    fn process_gone(pid: i32) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Err(_) => true,
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.trim_start().chars().next())
                .is_some_and(|state| state == 'Z' || state == 'X'),
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn timeout_kills_background_grandchildren() {
        let tmp = temp_dir();
        let pid_file = tmp.join("grandchild.pid");
        let runner = ProcessRunner::new(Duration::from_millis(300));
        let spec = ProcessSpec::new("sh")
            .arg("-c")
            .arg("sh -c 'sleep 30' & echo $! > \"$PID_FILE\"; wait")
            .envs([("PID_FILE".to_string(), pid_file.clone().into_os_string())]);

        let err = runner.run(&spec).await.unwrap_err();
        assert!(matches!(err, GradeError::Timeout { .. }));

        let pid: i32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(3);
        while !process_gone(pid) && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(process_gone(pid), "grandchild {pid} survived the timeout");

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
