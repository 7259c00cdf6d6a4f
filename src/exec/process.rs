// src/exec/process.rs

//! Building commands for rules and owning whole process groups.

use std::io;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::errors::{Result, WatchproxyError};
use crate::exec::lexer::tokenize;
use crate::rules::Rule;

/// Build the platform shell invocation for `line`.
pub fn shell_command(line: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(line);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(line);
        c
    }
}

/// Build the command for a rendered command string under `rule`'s execution
/// policy: lexed into argv (or handed to the shell when `rule.shell`), with
/// the rule's environment and working directory.
pub fn command_for(rendered: &str, rule: &Rule) -> Result<Command> {
    let mut cmd = if rule.shell {
        shell_command(rendered)
    } else {
        let argv = tokenize(rendered)?;
        let Some((program, args)) = argv.split_first() else {
            return Err(WatchproxyError::Spawn {
                cmd: rendered.to_string(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
            });
        };
        let mut c = Command::new(program);
        c.args(args);
        c
    };

    configure(&mut cmd, rule);
    Ok(cmd)
}

/// Environment, directory and stdio wiring shared by commands and hooks.
pub fn configure(cmd: &mut Command, rule: &Rule) {
    cmd.env_clear()
        .envs(rule.env.iter().map(|(k, v)| (k, v)))
        .current_dir(&rule.dir)
        .stdin(Stdio::null())
        .stdout(if rule.capture_stdout {
            Stdio::inherit()
        } else {
            Stdio::piped()
        })
        .stderr(if rule.capture_stderr {
            Stdio::inherit()
        } else {
            Stdio::piped()
        });
}

/// Spawn `cmd`, draining any piped output into debug logs.
pub fn spawn_logged(cmd: &mut Command, rendered: &str, rule_name: &str) -> Result<Child> {
    let mut child = cmd.spawn().map_err(|source| WatchproxyError::Spawn {
        cmd: rendered.to_string(),
        source,
    })?;

    if let Some(stdout) = child.stdout.take() {
        log_lines(stdout, rule_name, "stdout");
    }
    if let Some(stderr) = child.stderr.take() {
        log_lines(stderr, rule_name, "stderr");
    }

    Ok(child)
}

fn log_lines<R>(reader: R, rule_name: &str, stream: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let rule_name = rule_name.to_string();
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(rule = %rule_name, "{stream}: {line}");
        }
    });
}

/// A background process that leads its own process group.
///
/// Terminating it kills the whole group, so anything the command forked
/// dies with it.
#[derive(Debug)]
pub struct ProcessGroup {
    child: Child,
    pid: Option<u32>,
}

impl ProcessGroup {
    /// Spawn `cmd` as the leader of a new process group.
    pub fn spawn(mut cmd: Command, rendered: &str, rule_name: &str) -> Result<Self> {
        #[cfg(unix)]
        cmd.process_group(0);
        cmd.kill_on_drop(true);

        let child = spawn_logged(&mut cmd, rendered, rule_name)?;
        let pid = child.id();
        Ok(Self { child, pid })
    }

    pub fn id(&self) -> Option<u32> {
        self.pid
    }

    /// Kill the whole group and wait until the leader has been reaped.
    ///
    /// Safe to call when the process already exited.
    pub async fn terminate(mut self) -> io::Result<ExitStatus> {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            use nix::errno::Errno;
            use nix::sys::signal::{Signal, killpg};
            use nix::unistd::Pid;

            match i32::try_from(pid) {
                Ok(raw) => match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
                    Ok(()) | Err(Errno::ESRCH) => {}
                    Err(errno) => {
                        warn!(pid, error = %errno, "killpg failed; killing leader only");
                        let _ = self.child.start_kill();
                    }
                },
                Err(_) => {
                    let _ = self.child.start_kill();
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.start_kill();
        }

        self.child.wait().await
    }
}
