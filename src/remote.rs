//! Running commands: locally, over SSH, and through a gateway host.
//!
//! Everything here is blocking and sequential. Local processes go through [`Local`], which
//! also keeps a history of every command line it was asked to run so that dry runs can be
//! inspected.

use log::{debug, info};

use spurs::{cmd, Execute, SshShell};
use spurs_util::escape_for_bash;

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::StepError;

/// Something that can run a shell command line and hand back its stdout.
pub trait Shell {
    /// A short name for log lines (a host alias, `local`, ...).
    fn name(&self) -> String;

    /// Run `cmd` and return its stdout.
    fn exec(&self, cmd: &str) -> Result<String, failure::Error>;

    /// Run `cmd` attached to a terminal (for `sudo` prompts).
    fn exec_tty(&self, cmd: &str) -> Result<(), failure::Error> {
        self.exec(cmd).map(|_| ())
    }
}

/// The machine the runner is on.
#[derive(Debug)]
pub struct Local {
    cwd: PathBuf,
    dry_run: bool,
    history: RefCell<Vec<String>>,
}

impl Local {
    pub fn new<P: AsRef<Path>>(cwd: P, dry_run: bool) -> Self {
        Local {
            cwd: cwd.as_ref().to_owned(),
            dry_run,
            history: RefCell::new(Vec::new()),
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Every command line issued so far, in order.
    pub fn history(&self) -> Vec<String> {
        self.history.borrow().clone()
    }

    fn record(&self, dir: &Path, program: &str, args: &[String]) -> String {
        let mut line = String::from(program);
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.history.borrow_mut().push(line.clone());
        if self.dry_run {
            info!("[dry run] ({}) {}", dir.display(), line);
        } else {
            debug!("({}) {}", dir.display(), line);
        }
        line
    }

    /// Run `program` with `args` from the runner's working directory, capturing stdout.
    pub fn spawn(&self, program: &str, args: &[String]) -> Result<String, failure::Error> {
        self.spawn_at(&self.cwd, program, args)
    }

    /// Run `program` with `args` from `dir`, capturing stdout.
    pub fn spawn_at(
        &self,
        dir: &Path,
        program: &str,
        args: &[String],
    ) -> Result<String, failure::Error> {
        let line = self.record(dir, program, args);
        if self.dry_run {
            return Ok(String::new());
        }

        let output = Command::new(program)
            .args(args)
            .current_dir(dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| spawn_error(program, err))?;

        if !output.status.success() {
            debug!("stderr: {}", String::from_utf8_lossy(&output.stderr));
            return Err(StepError::Failed {
                command: line,
                status: output.status,
            }
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run `program` with `args` with the runner's terminal attached.
    pub fn spawn_tty(&self, program: &str, args: &[String]) -> Result<(), failure::Error> {
        let line = self.record(&self.cwd, program, args);
        if self.dry_run {
            return Ok(());
        }

        let status = Command::new(program)
            .args(args)
            .current_dir(&self.cwd)
            .status()
            .map_err(|err| spawn_error(program, err))?;

        if status.success() {
            Ok(())
        } else {
            Err(StepError::Failed {
                command: line,
                status,
            }
            .into())
        }
    }

    /// Run a bash command line from `dir`.
    pub fn bash_at(&self, dir: &Path, cmd: &str) -> Result<String, failure::Error> {
        self.spawn_at(dir, "bash", &["-c".into(), cmd.into()])
    }

    /// `mkdir -p`, honoring dry runs.
    pub fn ensure_dir(&self, dir: &Path) -> Result<(), failure::Error> {
        self.record(&self.cwd, "mkdir", &["-p".into(), dir.display().to_string()]);
        if !self.dry_run {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

fn spawn_error(program: &str, err: std::io::Error) -> failure::Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        StepError::ToolMissing {
            program: program.into(),
        }
        .into()
    } else {
        err.into()
    }
}

impl Shell for Local {
    fn name(&self) -> String {
        "local".into()
    }

    fn exec(&self, cmd: &str) -> Result<String, failure::Error> {
        self.bash_at(&self.cwd, cmd)
    }

    fn exec_tty(&self, cmd: &str) -> Result<(), failure::Error> {
        self.spawn_tty("bash", &["-c".into(), cmd.into()])
    }
}

/// A remote reached with the `ssh` binary, so that aliases and jump hosts from
/// `~/.ssh/config` apply.
pub struct OpenSsh<'l> {
    local: &'l Local,
    /// `ssh` arguments naming the remote, e.g. `["cloud-48"]` or `["-p", "2222", "me@host"]`.
    target: Vec<String>,
}

impl<'l> OpenSsh<'l> {
    pub fn new(local: &'l Local, target: Vec<String>) -> Self {
        OpenSsh { local, target }
    }
}

impl Shell for OpenSsh<'_> {
    fn name(&self) -> String {
        self.target.last().cloned().unwrap_or_default()
    }

    fn exec(&self, cmd: &str) -> Result<String, failure::Error> {
        let mut args = self.target.clone();
        args.push(cmd.into());
        self.local.spawn("ssh", &args)
    }

    fn exec_tty(&self, cmd: &str) -> Result<(), failure::Error> {
        let mut args = vec!["-tt".to_owned()];
        args.extend(self.target.iter().cloned());
        args.push(cmd.into());
        self.local.spawn_tty("ssh", &args)
    }
}

/// A persistent SSH session to `username@host`.
pub struct Session {
    name: String,
    shell: SshShell,
}

impl Session {
    pub fn connect(username: &str, host: &str) -> Result<Self, failure::Error> {
        let shell = SshShell::with_any_key(username, host)?;
        Ok(Session {
            name: format!("{}@{}", username, host),
            shell,
        })
    }
}

impl Shell for Session {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn exec(&self, cmd: &str) -> Result<String, failure::Error> {
        Ok(self.shell.run(cmd!("{}", cmd).use_bash())?.stdout)
    }
}

/// A machine only reachable from `gateway`, such as the arm cores of a card whose host is
/// itself remote.
pub struct Hop<'a> {
    gateway: Box<dyn Shell + 'a>,
    alias: String,
}

impl<'a> Hop<'a> {
    pub fn new(gateway: Box<dyn Shell + 'a>, alias: &str) -> Self {
        Hop {
            gateway,
            alias: alias.into(),
        }
    }
}

impl Shell for Hop<'_> {
    fn name(&self) -> String {
        format!("{}/{}", self.gateway.name(), self.alias)
    }

    fn exec(&self, cmd: &str) -> Result<String, failure::Error> {
        self.gateway
            .exec(&format!("ssh {} {}", self.alias, escape_for_bash(cmd)))
    }

    fn exec_tty(&self, cmd: &str) -> Result<(), failure::Error> {
        self.gateway
            .exec_tty(&format!("ssh -tt {} {}", self.alias, escape_for_bash(cmd)))
    }
}
