use std::ffi::OsStr;
use std::io;
use std::process::Command;

use anyhow::{anyhow, Context, Result};

use crate::log::Logger;

/// Captured result of an external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout and stderr joined, for pattern checks that must not care
    /// which stream a tool writes its diagnostics to.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }

    fn status_label(&self) -> String {
        match self.code {
            Some(code) => code.to_string(),
            None => "signal".to_string(),
        }
    }
}

/// Executes external commands.
///
/// `run` only fails when the process cannot be launched; a non-zero exit is
/// reported through [`CommandOutput::code`] so callers can classify it.
pub trait CommandRunner {
    fn run(&self, command: &mut Command) -> Result<CommandOutput>;

    fn has_program(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct SystemRunner {
    logger: Logger,
}

impl SystemRunner {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, command: &mut Command) -> Result<CommandOutput> {
        let rendered = describe_command(command);
        match command.get_current_dir() {
            Some(dir) => self
                .logger
                .debug(format!("CMD: {rendered} (in {})", dir.display())),
            None => self.logger.debug(format!("CMD: {rendered}")),
        }

        let output = command.output().map_err(|err| {
            let program = command.get_program().to_string_lossy().into_owned();
            if err.kind() == io::ErrorKind::NotFound {
                anyhow!("{program} command not found. Install {program}.")
            } else {
                anyhow::Error::new(err).context(format!("failed launching {rendered}"))
            }
        })?;

        let captured = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        self.logger.debug(format!(
            "CMD Return Code: [{}], Stdout: [{}], Stderr: [{}]",
            captured.status_label(),
            captured.stdout.trim(),
            captured.stderr.trim()
        ));
        Ok(captured)
    }
}

/// Command with a fixed C locale so that output can be matched textually.
pub fn tool_command(program: impl AsRef<OsStr>) -> Command {
    let mut command = Command::new(program);
    command.env("LC_ALL", "C");
    command
}

pub fn describe_command(command: &Command) -> String {
    let mut parts = vec![command.get_program().to_string_lossy().into_owned()];
    parts.extend(
        command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned()),
    );
    parts.join(" ")
}

pub fn command_failure(context: &str, command: &Command, output: &CommandOutput) -> anyhow::Error {
    anyhow!(
        "{context}: command={} status={} stdout='{}' stderr='{}'",
        describe_command(command),
        output.status_label(),
        output.stdout.trim(),
        output.stderr.trim()
    )
}

/// Runs `command` and turns a non-zero exit into an error carrying the
/// captured output.
pub fn run_checked(
    runner: &dyn CommandRunner,
    command: &mut Command,
    context: &str,
) -> Result<CommandOutput> {
    let output = runner
        .run(command)
        .with_context(|| context.to_string())?;
    if output.success() {
        return Ok(output);
    }
    Err(command_failure(context, command, &output))
}

#[cfg(any(test, feature = "test-support"))]
pub mod testing {
    use std::cell::RefCell;
    use std::collections::BTreeSet;
    use std::process::Command;

    use anyhow::Result;

    use super::{describe_command, CommandOutput, CommandRunner};

    type Responder = Box<dyn Fn(&Command) -> CommandOutput>;

    pub fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            code: Some(code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    /// Runner answering from scripted rules keyed by command-line prefix.
    ///
    /// Rules registered later win over earlier ones; unscripted commands fail
    /// with exit code 1.
    #[derive(Default)]
    pub struct ScriptedRunner {
        rules: RefCell<Vec<(String, Responder)>>,
        calls: RefCell<Vec<String>>,
        missing_programs: RefCell<BTreeSet<String>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(&self, prefix: &str, output: CommandOutput) -> &Self {
            self.on_with(prefix, move |_| output.clone())
        }

        pub fn on_with<F>(&self, prefix: &str, respond: F) -> &Self
        where
            F: Fn(&Command) -> CommandOutput + 'static,
        {
            self.rules
                .borrow_mut()
                .push((prefix.to_string(), Box::new(respond)));
            self
        }

        pub fn without_program(&self, program: &str) -> &Self {
            self.missing_programs
                .borrow_mut()
                .insert(program.to_string());
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        pub fn called(&self, prefix: &str) -> bool {
            self.calls.borrow().iter().any(|call| call.starts_with(prefix))
        }

        pub fn position(&self, prefix: &str) -> Option<usize> {
            self.calls
                .borrow()
                .iter()
                .position(|call| call.starts_with(prefix))
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, command: &mut Command) -> Result<CommandOutput> {
            let rendered = describe_command(command);
            self.calls.borrow_mut().push(rendered.clone());
            let rules = self.rules.borrow();
            let output = rules
                .iter()
                .rev()
                .find(|(prefix, _)| rendered.starts_with(prefix.as_str()))
                .map(|(_, respond)| respond(command))
                .unwrap_or_else(|| failed(1, "", &format!("unscripted command: {rendered}")));
            Ok(output)
        }

        fn has_program(&self, program: &str) -> bool {
            !self.missing_programs.borrow().contains(program)
        }
    }
}
