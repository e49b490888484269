use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::engines::{find_executable, process};
use crate::EngineError;

/// Hugging Face checkpoint passed to the Dia2 CLI.
pub const CHECKPOINT: &str = "nari-labs/Dia2-2B";

/// A way of executing the Dia2 model.
///
/// The engine picks one runtime when it loads and keeps it until it unloads.
pub trait Dia2Runtime: Send {
    /// Short description for logs, e.g. the command being run.
    fn describe(&self) -> String;

    /// Render a tagged `[S1] ... [S2] ...` script into a WAV file at `output`.
    fn generate(&mut self, script: &str, output: &Path) -> Result<(), EngineError>;
}

/// Runs the Dia2 command-line interface as a child process.
#[derive(Debug, Clone)]
pub struct CommandRuntime {
    program: PathBuf,
    prefix_args: Vec<OsString>,
    working_dir: Option<PathBuf>,
    timeout: Duration,
}

impl CommandRuntime {
    /// A `dia2` executable installed on PATH.
    pub fn installed(executable: PathBuf, timeout: Duration) -> Self {
        Self {
            program: executable,
            prefix_args: Vec::new(),
            working_dir: None,
            timeout,
        }
    }

    /// `uv run -m dia2.cli` inside a checkout of the Dia2 project.
    pub fn uv_module(uv: PathBuf, project_dir: PathBuf, timeout: Duration) -> Self {
        Self {
            program: uv,
            prefix_args: ["run", "-m", "dia2.cli"].map(OsString::from).to_vec(),
            working_dir: Some(project_dir),
            timeout,
        }
    }
}

impl Dia2Runtime for CommandRuntime {
    fn describe(&self) -> String {
        let args: Vec<_> = self.prefix_args.iter().map(|a| a.to_string_lossy()).collect();
        format!("{} {}", self.program.display(), args.join(" "))
            .trim_end()
            .to_string()
    }

    fn generate(&mut self, script: &str, output: &Path) -> Result<(), EngineError> {
        let input = output.with_extension("txt");
        fs::write(&input, script)?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.prefix_args)
            .args(["--hf", CHECKPOINT, "--input"])
            .arg(&input)
            .arg(output);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        process::run(&mut command, None, self.timeout)?;
        if !output.is_file() {
            return Err(EngineError::Process(format!(
                "Dia2 finished without writing {}",
                output.display()
            )));
        }
        Ok(())
    }
}

/// Where the engine gets its runtime from.
pub(crate) enum RuntimeSource {
    /// Look for an installed `dia2`, then for `uv` plus the project checkout.
    Discover { project_dir: PathBuf, timeout: Duration },
    Custom(Box<dyn Fn() -> Box<dyn Dia2Runtime> + Send>),
}

impl RuntimeSource {
    pub(crate) fn probe(&self) -> bool {
        match self {
            RuntimeSource::Discover { project_dir, .. } => {
                find_executable("dia2").is_some()
                    || (find_executable("uv").is_some() && is_uv_project(project_dir))
            }
            RuntimeSource::Custom(_) => true,
        }
    }

    pub(crate) fn open(&self) -> Result<Box<dyn Dia2Runtime>, EngineError> {
        match self {
            RuntimeSource::Discover {
                project_dir,
                timeout,
            } => {
                if let Some(dia2) = find_executable("dia2") {
                    return Ok(Box::new(CommandRuntime::installed(dia2, *timeout)));
                }
                match find_executable("uv") {
                    Some(uv) if is_uv_project(project_dir) => Ok(Box::new(CommandRuntime::uv_module(
                        uv,
                        project_dir.clone(),
                        *timeout,
                    ))),
                    _ => Err(EngineError::Unavailable {
                        engine: "dia2",
                        hint: format!(
                            "install the dia2 CLI or clone Dia2 into {} and install uv",
                            project_dir.display()
                        ),
                    }),
                }
            }
            RuntimeSource::Custom(factory) => Ok(factory()),
        }
    }
}

fn is_uv_project(dir: &Path) -> bool {
    dir.join("pyproject.toml").is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uv_runtime_describes_module_invocation() {
        let runtime = CommandRuntime::uv_module(
            PathBuf::from("/usr/bin/uv"),
            PathBuf::from("/tmp/dia2"),
            Duration::from_secs(1),
        );
        assert_eq!(runtime.describe(), "/usr/bin/uv run -m dia2.cli");
    }

    #[test]
    fn discovery_needs_a_project_checkout_for_uv() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_uv_project(dir.path()));
        fs::write(dir.path().join("pyproject.toml"), "[project]\nname = \"dia2\"\n").unwrap();
        assert!(is_uv_project(dir.path()));
    }

    #[cfg(unix)]
    #[test]
    fn failing_cli_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut runtime = CommandRuntime::installed(PathBuf::from("false"), Duration::from_secs(10));
        let err = runtime
            .generate("[S1] Hello", &dir.path().join("out.wav"))
            .unwrap_err();
        assert!(err.to_string().contains("exited with code"));
    }
}
