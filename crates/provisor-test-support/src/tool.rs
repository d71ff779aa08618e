//! Scripted stand-in for the provisioning tool.
//!
//! The script records its argument vector one element per line, copies the
//! file named after `--vault-password-file` (when readable from the host), notes
//! whether the playbook argument existed at run time, prints canned output and
//! exits with a configured code.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use crate::fixtures::make_executable;

/// Behaviour of a [`FakeTool`].
#[derive(Debug, Clone, Default)]
pub struct ToolScript {
    /// Exit code returned by the script.
    pub exit_code: i32,
    /// Line written to stdout.
    pub stdout: String,
    /// Line written to stderr.
    pub stderr: String,
    /// Seconds to sleep before exiting.
    pub sleep_secs: Option<u64>,
}

impl ToolScript {
    /// Script that exits zero.
    #[must_use]
    pub fn succeeding() -> Self {
        Self {
            stdout: "PLAY RECAP ok=1 failed=0".to_string(),
            ..Self::default()
        }
    }

    /// Script that prints `stderr` and exits with `exit_code`.
    #[must_use]
    pub fn failing(exit_code: i32, stderr: &str) -> Self {
        Self {
            exit_code,
            stderr: stderr.to_string(),
            ..Self::default()
        }
    }

    /// Script that sleeps for `secs` before exiting zero.
    #[must_use]
    pub fn sleeping(secs: u64) -> Self {
        Self {
            sleep_secs: Some(secs),
            ..Self::default()
        }
    }
}

/// An installed fake tool script and the files it writes.
#[derive(Debug, Clone)]
pub struct FakeTool {
    program: PathBuf,
    args_log: PathBuf,
    secret_copy: PathBuf,
    playbook_seen: PathBuf,
}

impl FakeTool {
    /// Write the script into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the script cannot be written or made executable.
    pub fn install(dir: &Path, script: &ToolScript) -> Result<Self> {
        let tool = Self {
            program: dir.join("fake-ansible-playbook"),
            args_log: dir.join("tool-args.log"),
            secret_copy: dir.join("tool-secret.copy"),
            playbook_seen: dir.join("tool-playbook.seen"),
        };
        let body = format!(
            "#!/bin/sh\n\
             : > {args}\n\
             for arg in \"$@\"; do printf '%s\\n' \"$arg\" >> {args}; done\n\
             prev=''\n\
             for arg in \"$@\"; do\n\
             \x20 if [ \"$prev\" = '--vault-password-file' ] && [ -r \"$arg\" ]; then cat \"$arg\" > {secret}; fi\n\
             \x20 case \"$arg\" in *.yml) [ -f \"$arg\" ] && printf 'present' > {seen};; esac\n\
             \x20 prev=\"$arg\"\n\
             done\n\
             {sleep}\
             printf '%s\\n' {stdout}\n\
             printf '%s\\n' {stderr} >&2\n\
             exit {code}\n",
            args = quote_path(&tool.args_log)?,
            secret = quote_path(&tool.secret_copy)?,
            seen = quote_path(&tool.playbook_seen)?,
            sleep = script
                .sleep_secs
                .map(|secs| format!("sleep {secs}\n"))
                .unwrap_or_default(),
            stdout = quote(&script.stdout)?,
            stderr = quote(&script.stderr)?,
            code = script.exit_code,
        );
        fs::write(&tool.program, body)
            .with_context(|| format!("failed to write {}", tool.program.display()))?;
        make_executable(&tool.program)?;
        Ok(tool)
    }

    /// Path of the executable script.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Program path as a string, for option documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not valid UTF-8.
    pub fn program_str(&self) -> Result<String> {
        self.program
            .to_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("tool path is not utf-8"))
    }

    /// Arguments received by the most recent invocation, excluding `argv[0]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the script has not run.
    pub fn recorded_args(&self) -> Result<Vec<String>> {
        let log = fs::read_to_string(&self.args_log)
            .with_context(|| format!("failed to read {}", self.args_log.display()))?;
        Ok(log.lines().map(str::to_string).collect())
    }

    /// Whether the script has been invoked.
    #[must_use]
    pub fn was_invoked(&self) -> bool {
        self.args_log.exists()
    }

    /// Contents of the vault password file as seen by the script.
    #[must_use]
    pub fn captured_secret(&self) -> Option<String> {
        fs::read_to_string(&self.secret_copy).ok()
    }

    /// Whether the playbook argument existed when the script ran.
    #[must_use]
    pub fn saw_playbook(&self) -> bool {
        self.playbook_seen.exists()
    }
}

fn quote(value: &str) -> Result<String> {
    shlex::try_quote(value)
        .map(std::borrow::Cow::into_owned)
        .map_err(|err| anyhow!("cannot quote script value: {err}"))
}

fn quote_path(path: &Path) -> Result<String> {
    let value = path
        .to_str()
        .ok_or_else(|| anyhow!("script path is not utf-8"))?;
    quote(value)
}
