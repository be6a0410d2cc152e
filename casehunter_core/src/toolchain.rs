use crate::config::{LanguageConfig, ToolchainSettings};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Extra time granted to the judge on top of the high time limit before it is
/// killed and the run reported as a time limit exceeded.
const JUDGE_GRACE: Duration = Duration::from_secs(1);
const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long output is still collected once the command is gone. Descendants
/// that outlive it may keep the pipes open indefinitely.
const OUTPUT_GRACE: Duration = Duration::from_secs(1);

#[derive(Error, Debug)]
pub enum ToolchainError {
    #[error("Failed to spawn command {command:?}: {source}")]
    Spawn {
        command: Vec<String>,
        #[source]
        source: std::io::Error,
    },
    #[error("Command {command:?} failed ({status}): {stderr}")]
    CommandFailed {
        command: Vec<String>,
        status: String,
        stderr: String,
    },
    #[error("Command {0:?} timed out")]
    TimedOut(Vec<String>),
    #[error("Empty command template for {0}")]
    EmptyCommand(&'static str),
    #[error("Toolchain I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ToolchainError {
    fn from(err: std::io::Error) -> Self {
        ToolchainError::Io(err.to_string())
    }
}

/// Time limits for one judged execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeLimits {
    pub nominal: Duration,
    pub high: Duration,
}

/// A compiled submission, ready to be handed to the judge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub language: String,
    pub command: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compilation {
    Compiled(Program),
    Failed(String),
}

/// What the judge reported for one execution. A missing verdict or wall time
/// means no execution took place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JudgeReport {
    pub verdict: Option<String>,
    pub feedback: Option<String>,
    pub wall_time: Option<Duration>,
}

/// External collaborators a campaign drives: compiler, test data generators
/// and the judge.
pub trait Toolchain {
    fn compile(
        &mut self,
        language: &LanguageConfig,
        sources: &[PathBuf],
        out_dir: &Path,
    ) -> Result<Compilation, ToolchainError>;

    /// Materializes a judge input from a seed file.
    fn generate_input(&mut self, seed_file: &Path, input_file: &Path) -> Result<(), ToolchainError>;

    /// Writes the reference answer for `input_file`.
    fn generate_answer(&mut self, input_file: &Path, answer_file: &Path)
    -> Result<(), ToolchainError>;

    fn execute(
        &mut self,
        program: &Program,
        input_file: &Path,
        answer_file: &Path,
        limits: &TimeLimits,
    ) -> Result<JudgeReport, ToolchainError>;
}

pub struct CommandToolchainConfig {
    pub generate_input: Vec<String>,
    pub generate_answer: Vec<String>,
    pub judge: Vec<String>,
    pub command_timeout: Duration,
    pub working_dir: Option<PathBuf>,
}

impl From<ToolchainSettings> for CommandToolchainConfig {
    fn from(settings: ToolchainSettings) -> Self {
        Self {
            generate_input: settings.generate_input,
            generate_answer: settings.generate_answer,
            judge: settings.judge,
            command_timeout: Duration::from_millis(settings.command_timeout_ms),
            working_dir: settings.working_dir,
        }
    }
}

/// Runs every collaborator as an external command built from a template.
///
/// Templates may use `{sources}`, `{out}`, `{seed}`, `{input}`, `{answer}`,
/// `{program}`, `{time-limit}` and `{high-limit}`. A placeholder standing alone
/// as an argument expands to all of its values (`{sources}`, `{program}`);
/// embedded in a larger argument the values are joined with spaces.
///
/// The judge prints the verdict token on its first stdout line; the remaining
/// lines are the feedback blob.
pub struct CommandToolchain {
    config: CommandToolchainConfig,
}

struct CommandOutput {
    status: Option<ExitStatus>,
    stdout: String,
    stderr: String,
    elapsed: Duration,
}

impl CommandOutput {
    fn timed_out(&self) -> bool {
        self.status.is_none()
    }
}

impl CommandToolchain {
    pub fn new(config: CommandToolchainConfig) -> Self {
        Self { config }
    }

    fn run(&self, command: &[String], timeout: Duration) -> Result<CommandOutput, ToolchainError> {
        let Some((program, args)) = command.split_first() else {
            return Err(ToolchainError::EmptyCommand("command"));
        };
        let mut cmd = Command::new(program);
        cmd.args(args);
        if let Some(cwd) = &self.config.working_dir {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        isolate(&mut cmd);

        let mut child = cmd.spawn().map_err(|source| ToolchainError::Spawn {
            command: command.to_vec(),
            source,
        })?;
        let stdout_reader = drain(child.stdout.take());
        let stderr_reader = drain(child.stderr.take());

        let start_time = Instant::now();
        let status = wait_with_timeout(&mut child, timeout)?;
        let elapsed = start_time.elapsed();

        Ok(CommandOutput {
            status,
            stdout: collect(&stdout_reader),
            stderr: collect(&stderr_reader),
            elapsed,
        })
    }

    fn run_checked(&self, command: Vec<String>) -> Result<CommandOutput, ToolchainError> {
        let output = self.run(&command, self.config.command_timeout)?;
        match output.status {
            None => Err(ToolchainError::TimedOut(command)),
            Some(status) if !status.success() => Err(ToolchainError::CommandFailed {
                command,
                status: status.to_string(),
                stderr: output.stderr,
            }),
            Some(_) => Ok(output),
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<String> {
    let (sender, receiver) = mpsc::channel();
    if let Some(mut pipe) = pipe {
        std::thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = pipe.read_to_end(&mut buffer);
            let _ = sender.send(String::from_utf8_lossy(&buffer).into_owned());
        });
    }
    receiver
}

fn collect(reader: &Receiver<String>) -> String {
    reader.recv_timeout(OUTPUT_GRACE).unwrap_or_default()
}

/// Puts the command in its own process group so a timeout can take down
/// everything it spawned.
#[cfg(unix)]
fn isolate(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn isolate(_cmd: &mut Command) {}

#[cfg(unix)]
fn kill_tree(child: &mut Child) -> std::io::Result<()> {
    let Ok(group) = libc::pid_t::try_from(child.id()) else {
        return child.kill();
    };
    // SAFETY: plain syscall; the group id is the child's pid, set by `isolate`.
    if unsafe { libc::kill(-group, libc::SIGKILL) } == 0 {
        Ok(())
    } else {
        child.kill()
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) -> std::io::Result<()> {
    child.kill()
}

/// Polls `child` until it exits. Returns `None` after killing it and its
/// process group on timeout.
fn wait_with_timeout(
    child: &mut Child,
    timeout: Duration,
) -> Result<Option<ExitStatus>, ToolchainError> {
    let start_time = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if start_time.elapsed() > timeout {
            tracing::debug!("Command timed out after {:?}, killing", timeout);
            kill_tree(child)?;
            child.wait()?;
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

fn expand(
    template: &[String],
    what: &'static str,
    vars: &[(&str, Vec<String>)],
) -> Result<Vec<String>, ToolchainError> {
    if template.is_empty() {
        return Err(ToolchainError::EmptyCommand(what));
    }
    let mut out = Vec::with_capacity(template.len());
    for arg in template {
        if let Some((_, values)) = vars.iter().find(|(name, _)| *arg == format!("{{{name}}}")) {
            out.extend(values.iter().cloned());
            continue;
        }
        let mut expanded = arg.clone();
        for (name, values) in vars {
            expanded = expanded.replace(&format!("{{{name}}}"), &values.join(" "));
        }
        out.push(expanded);
    }
    Ok(out)
}

fn path_value(path: &Path) -> Vec<String> {
    vec![path.to_string_lossy().into_owned()]
}

fn seconds_value(duration: Duration) -> Vec<String> {
    vec![format!("{}", duration.as_secs_f64())]
}

impl Toolchain for CommandToolchain {
    fn compile(
        &mut self,
        language: &LanguageConfig,
        sources: &[PathBuf],
        out_dir: &Path,
    ) -> Result<Compilation, ToolchainError> {
        let vars = [
            (
                "sources",
                sources
                    .iter()
                    .map(|source| source.to_string_lossy().into_owned())
                    .collect(),
            ),
            ("out", path_value(&out_dir.join("program"))),
        ];

        if !language.compile.is_empty() {
            let command = expand(&language.compile, "compile", &vars)?;
            let output = self.run(&command, self.config.command_timeout)?;
            match output.status {
                None => return Ok(Compilation::Failed("compilation timed out".to_string())),
                Some(status) if !status.success() => {
                    return Ok(Compilation::Failed(format!(
                        "{}{}",
                        output.stdout, output.stderr
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(Compilation::Compiled(Program {
            language: language.name.clone(),
            command: expand(&language.run, "run", &vars)?,
        }))
    }

    fn generate_input(
        &mut self,
        seed_file: &Path,
        input_file: &Path,
    ) -> Result<(), ToolchainError> {
        let command = expand(
            &self.config.generate_input,
            "generate-input",
            &[("seed", path_value(seed_file)), ("input", path_value(input_file))],
        )?;
        self.run_checked(command).map(|_| ())
    }

    fn generate_answer(
        &mut self,
        input_file: &Path,
        answer_file: &Path,
    ) -> Result<(), ToolchainError> {
        let command = expand(
            &self.config.generate_answer,
            "generate-answer",
            &[("input", path_value(input_file)), ("answer", path_value(answer_file))],
        )?;
        self.run_checked(command).map(|_| ())
    }

    fn execute(
        &mut self,
        program: &Program,
        input_file: &Path,
        answer_file: &Path,
        limits: &TimeLimits,
    ) -> Result<JudgeReport, ToolchainError> {
        let command = expand(
            &self.config.judge,
            "judge",
            &[
                ("program", program.command.clone()),
                ("input", path_value(input_file)),
                ("answer", path_value(answer_file)),
                ("time-limit", seconds_value(limits.nominal)),
                ("high-limit", seconds_value(limits.high)),
            ],
        )?;

        let output = self.run(&command, limits.high + JUDGE_GRACE)?;
        if output.timed_out() {
            return Ok(JudgeReport {
                verdict: Some("TLE".to_string()),
                feedback: None,
                wall_time: Some(output.elapsed),
            });
        }

        let (first_line, rest) = output
            .stdout
            .split_once('\n')
            .unwrap_or((output.stdout.as_str(), ""));
        let verdict = Some(first_line.trim())
            .filter(|token| !token.is_empty())
            .map(str::to_string);
        let feedback = Some(rest.to_string()).filter(|blob| !blob.trim().is_empty());

        Ok(JudgeReport {
            verdict,
            feedback,
            wall_time: Some(output.elapsed),
        })
    }
}

#[cfg(all(test, unix))]
mod command_toolchain_tests {
    use super::*;

    fn sh(script: &str, args: &[&str]) -> Vec<String> {
        let mut command = vec![
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
            "sh".to_string(),
        ];
        command.extend(args.iter().map(|arg| arg.to_string()));
        command
    }

    fn toolchain(judge: Vec<String>) -> CommandToolchain {
        CommandToolchain::new(CommandToolchainConfig {
            generate_input: sh("printf '3\\na\\nb\\nc\\n' > \"$2\"", &["{seed}", "{input}"]),
            generate_answer: sh("cp \"$1\" \"$2\"", &["{input}", "{answer}"]),
            judge,
            command_timeout: Duration::from_secs(5),
            working_dir: None,
        })
    }

    fn limits() -> TimeLimits {
        TimeLimits {
            nominal: Duration::from_millis(100),
            high: Duration::from_millis(200),
        }
    }

    fn program() -> Program {
        Program {
            language: "sh".to_string(),
            command: vec!["true".to_string()],
        }
    }

    #[test]
    fn placeholders_expand_alone_and_embedded() {
        let template = vec![
            "cc".to_string(),
            "{sources}".to_string(),
            "--out={out}".to_string(),
        ];
        let vars = [
            ("sources", vec!["a.c".to_string(), "b.c".to_string()]),
            ("out", vec!["bin".to_string()]),
        ];
        assert_eq!(
            expand(&template, "compile", &vars).unwrap(),
            vec!["cc", "a.c", "b.c", "--out=bin"]
        );
        assert!(matches!(
            expand(&[], "judge", &vars),
            Err(ToolchainError::EmptyCommand("judge"))
        ));
    }

    #[test]
    fn generators_write_data_files() -> Result<(), ToolchainError> {
        let dir = tempfile::tempdir()?;
        let seed = dir.path().join("1.seed");
        let input = dir.path().join("1.in");
        let answer = dir.path().join("1.ans");
        std::fs::write(&seed, "5\n1\n")?;

        let mut toolchain = toolchain(sh("echo AC", &[]));
        toolchain.generate_input(&seed, &input)?;
        toolchain.generate_answer(&input, &answer)?;
        assert_eq!(std::fs::read_to_string(&answer)?, "3\na\nb\nc\n");
        Ok(())
    }

    #[test]
    fn failing_generator_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut toolchain = toolchain(sh("echo AC", &[]));
        toolchain.config.generate_input = sh("echo broken >&2; exit 3", &[]);
        let result = toolchain.generate_input(&dir.path().join("s"), &dir.path().join("i"));
        match result {
            Err(ToolchainError::CommandFailed { stderr, .. }) => assert!(stderr.contains("broken")),
            other => panic!("Expected CommandFailed, got {other:?}"),
        }
    }

    #[test]
    fn judge_output_is_split_into_verdict_and_feedback() -> Result<(), ToolchainError> {
        let judge = sh(
            "echo WA; echo '=== judgemessage.txt: ==='; echo \"TC 2: $1\"",
            &["{time-limit}"],
        );
        let mut toolchain = toolchain(judge);
        let report = toolchain.execute(&program(), Path::new("in"), Path::new("ans"), &limits())?;
        assert_eq!(report.verdict.as_deref(), Some("WA"));
        assert_eq!(
            report.feedback.as_deref(),
            Some("=== judgemessage.txt: ===\nTC 2: 0.1\n")
        );
        assert!(report.wall_time.is_some());
        Ok(())
    }

    #[test]
    fn silent_judge_reports_no_verdict() -> Result<(), ToolchainError> {
        let mut toolchain = toolchain(sh("exit 0", &[]));
        let report = toolchain.execute(&program(), Path::new("in"), Path::new("ans"), &limits())?;
        assert_eq!(report.verdict, None);
        assert_eq!(report.feedback, None);
        Ok(())
    }

    #[test]
    fn hung_judge_is_killed_and_reported_as_time_limit() -> Result<(), ToolchainError> {
        let mut toolchain = toolchain(sh("exec sleep 5", &[]));
        let report = toolchain.execute(&program(), Path::new("in"), Path::new("ans"), &limits())?;
        assert_eq!(report.verdict.as_deref(), Some("TLE"));
        assert!(report.wall_time.unwrap() < Duration::from_secs(5));
        Ok(())
    }

    #[test]
    fn hung_judge_descendants_are_killed_with_it() -> Result<(), ToolchainError> {
        let mut toolchain = toolchain(sh("sleep 6; echo AC", &[]));
        let started = Instant::now();
        let report = toolchain.execute(&program(), Path::new("in"), Path::new("ans"), &limits())?;
        assert_eq!(report.verdict.as_deref(), Some("TLE"));
        assert!(
            started.elapsed() < Duration::from_secs(4),
            "execute returned after {:?}",
            started.elapsed()
        );
        Ok(())
    }

    #[test]
    fn compile_failure_carries_compiler_output() -> Result<(), ToolchainError> {
        let dir = tempfile::tempdir()?;
        let language = LanguageConfig {
            name: "broken".to_string(),
            compile: sh("echo 'syntax error' >&2; exit 1", &["{sources}"]),
            run: vec!["{out}".to_string()],
        };
        let mut toolchain = toolchain(sh("echo AC", &[]));
        match toolchain.compile(&language, &[dir.path().join("main.c")], dir.path())? {
            Compilation::Failed(message) => assert!(message.contains("syntax error")),
            other => panic!("Expected compile failure, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn interpreted_language_skips_compilation() -> Result<(), ToolchainError> {
        let dir = tempfile::tempdir()?;
        let source = dir.path().join("main.py");
        let language = LanguageConfig {
            name: "python".to_string(),
            compile: Vec::new(),
            run: vec!["python3".to_string(), "{sources}".to_string()],
        };
        let mut toolchain = toolchain(sh("echo AC", &[]));
        let compiled = toolchain.compile(&language, &[source.clone()], dir.path())?;
        assert_eq!(
            compiled,
            Compilation::Compiled(Program {
                language: "python".to_string(),
                command: vec!["python3".to_string(), source.to_string_lossy().into_owned()],
            })
        );
        Ok(())
    }
}
