//! The machines taking part in the paper's experiments and how to reach them.

use log::info;

use serde::{Deserialize, Serialize};

use std::path::Path;

use crate::remote::{Hop, Local, OpenSsh, Session, Shell};

/// How to reach a remote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SshTarget {
    /// A `Host` entry from `~/.ssh/config`, reached with the `ssh` and `scp` binaries.
    Alias(String),

    /// An explicit login, reached with a persistent session. `host` may carry a port
    /// (`name:22`).
    Login { username: String, host: String },
}

impl SshTarget {
    fn split_port(host: &str) -> (&str, Option<&str>) {
        match host.rfind(':') {
            Some(idx) => (&host[..idx], Some(&host[idx + 1..])),
            None => (host, None),
        }
    }

    /// Arguments naming this target on an `ssh` command line.
    pub fn ssh_args(&self) -> Vec<String> {
        match self {
            SshTarget::Alias(alias) => vec![alias.clone()],
            SshTarget::Login { username, host } => {
                let (host, port) = Self::split_port(host);
                let mut args = vec![];
                if let Some(port) = port {
                    args.push("-p".into());
                    args.push(port.into());
                }
                args.push(format!("{}@{}", username, host));
                args
            }
        }
    }

    /// Arguments naming `path` on this target on an `scp` command line. The port flag, if
    /// any, comes first.
    pub fn scp_args(&self, path: &str) -> Vec<String> {
        match self {
            SshTarget::Alias(alias) => vec![format!("{}:{}", alias, path)],
            SshTarget::Login { username, host } => {
                let (host, port) = Self::split_port(host);
                let mut args = vec![];
                if let Some(port) = port {
                    args.push("-P".into());
                    args.push(port.into());
                }
                args.push(format!("{}@{}:{}", username, host, path));
                args
            }
        }
    }
}

/// Where a step runs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// The host the runner is on, which carries the BF3 card.
    Local,
    /// The host carrying the BF2 card.
    Bf2Host,
    /// The arm cores of the BF3 card.
    Bf3Dpu,
    /// The arm cores of the BF2 card, only reachable from `Bf2Host`.
    Bf2Dpu,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::Local => "bf3-host",
            Role::Bf2Host => "bf2-host",
            Role::Bf3Dpu => "bf3-dpu",
            Role::Bf2Dpu => "bf2-dpu",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// The testbed. Every field defaults to the machines the paper was evaluated on, so a
/// `--testbed` file only needs the fields that differ.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Testbed {
    /// Checkout of this repository on every remote, relative to the remote home directory.
    pub remote_workspace: String,

    pub bf2_host: SshTarget,
    pub bf3_dpu: SshTarget,

    /// Alias of the BF2 arm cores as known to `bf2_host`.
    pub bf2_dpu_alias: String,

    /// Address given to the host end of the tmfifo interface.
    pub tmfifo_host_addr: String,

    /// Account of the host owning each card, used by DPU-side companions.
    pub bf2_host_user: String,
    pub bf3_host_user: String,

    /// Account on the arm cores, used by host-side companions.
    pub dpu_user: String,

    pub doca_bench: String,
    pub run_limit_seconds: usize,
}

impl Default for Testbed {
    fn default() -> Self {
        Testbed {
            remote_workspace: "dpu-paper".into(),
            bf2_host: SshTarget::Alias("cloud-48".into()),
            bf3_dpu: SshTarget::Alias("bf-pcie".into()),
            bf2_dpu_alias: "bf-pcie".into(),
            tmfifo_host_addr: "192.168.100.1/24".into(),
            bf2_host_user: "dimitrios".into(),
            bf3_host_user: "dimitrios-ldap".into(),
            dpu_user: "ubuntu".into(),
            doca_bench: "/opt/mellanox/doca/tools/doca_bench".into(),
            run_limit_seconds: 5,
        }
    }
}

impl Testbed {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, failure::Error> {
        let file = std::fs::File::open(path.as_ref()).map_err(|err| {
            failure::format_err!("unable to open testbed {}: {}", path.as_ref().display(), err)
        })?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    fn direct_target(&self, role: Role) -> Result<&SshTarget, failure::Error> {
        match role {
            Role::Bf2Host => Ok(&self.bf2_host),
            Role::Bf3Dpu => Ok(&self.bf3_dpu),
            Role::Local | Role::Bf2Dpu => {
                failure::bail!("{} is not directly reachable over SSH", role)
            }
        }
    }

    fn connect<'l>(
        &self,
        local: &'l Local,
        target: &SshTarget,
    ) -> Result<Box<dyn Shell + 'l>, failure::Error> {
        match target {
            SshTarget::Login { username, host } if !local.is_dry_run() => {
                Ok(Box::new(Session::connect(username, host)?))
            }
            _ => Ok(Box::new(OpenSsh::new(local, target.ssh_args()))),
        }
    }

    /// A shell on `role`.
    pub fn shell<'l>(
        &self,
        local: &'l Local,
        role: Role,
    ) -> Result<Box<dyn Shell + 'l>, failure::Error> {
        match role {
            Role::Local => Ok(Box::new(LocalShell(local))),
            Role::Bf2Host | Role::Bf3Dpu => {
                let target = self.direct_target(role)?;
                self.connect(local, target)
            }
            Role::Bf2Dpu => {
                let gateway = self.connect(local, &self.bf2_host)?;
                Ok(Box::new(Hop::new(gateway, &self.bf2_dpu_alias)))
            }
        }
    }

    /// Path of `rel` inside the repository checkout on `role`.
    pub fn workspace_path(&self, local: &Local, role: Role, rel: &str) -> String {
        match role {
            Role::Local => dir!(local.cwd(), rel),
            _ => dir!(&self.remote_workspace, rel),
        }
    }

    /// Run `cmd` from `rel_dir` of the repository checkout on `role`.
    pub fn run_script(
        &self,
        local: &Local,
        role: Role,
        rel_dir: &str,
        cmd: &str,
    ) -> Result<String, failure::Error> {
        match role {
            Role::Local => local.bash_at(&local.cwd().join(rel_dir), cmd),
            _ => {
                let shell = self.shell(local, role)?;
                shell.exec(&format!(
                    "cd {} && {}",
                    self.workspace_path(local, role, rel_dir),
                    cmd
                ))
            }
        }
    }

    /// Remove files matching `globs` in `rel_dir` of the checkout on `role`.
    pub fn clean(
        &self,
        local: &Local,
        role: Role,
        rel_dir: &str,
        globs: &[&str],
    ) -> Result<(), failure::Error> {
        self.run_script(local, role, rel_dir, &format!("rm -rf {}", globs.join(" ")))?;
        Ok(())
    }

    /// The most recently modified file on `role` matching `glob` (an absolute pattern).
    pub fn latest(&self, local: &Local, role: Role, glob: &str) -> Result<String, failure::Error> {
        let shell = self.shell(local, role)?;
        let out = shell.exec(&format!("ls -t {} | head -n1", glob))?;
        let latest = out.trim().to_owned();
        if latest.is_empty() {
            if local.is_dry_run() {
                return Ok(glob.to_owned());
            }
            failure::bail!("no file on {} matches {}", role, glob);
        }
        Ok(latest)
    }

    /// Bring the files matching `remote_glob` on `role` into the local directory `dest`.
    /// Relative globs are resolved against the repository checkout on `role`.
    pub fn fetch(
        &self,
        local: &Local,
        role: Role,
        remote_glob: &str,
        dest: &Path,
    ) -> Result<(), failure::Error> {
        let src = if remote_glob.starts_with('/') {
            remote_glob.to_owned()
        } else {
            self.workspace_path(local, role, remote_glob)
        };
        let dest_str = dest.display().to_string();

        match role {
            Role::Local => {
                local.exec(&format!("mv {} {}", src, dest_str))?;
            }
            Role::Bf2Host | Role::Bf3Dpu => {
                let target = self.direct_target(role)?;
                let mut args = target.scp_args(&src);
                args.push(dest_str);
                local.spawn("scp", &args)?;
            }
            Role::Bf2Dpu => {
                // Stage on the gateway, bring the staged copies back, then drop them.
                let gateway = self.connect(local, &self.bf2_host)?;
                let name = Path::new(&src)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| src.clone());
                gateway.exec(&format!(
                    "cd {} && scp {}:{} .",
                    self.remote_workspace, self.bf2_dpu_alias, src
                ))?;
                let staged = dir!(&self.remote_workspace, &name);
                let mut args = self.bf2_host.scp_args(&staged);
                args.push(dest_str);
                local.spawn("scp", &args)?;
                gateway.exec(&format!("rm -f {}", staged))?;
            }
        }

        info!("✔ {} copied from {} to {}", remote_glob, role, dest.display());
        Ok(())
    }

    /// Copy the local file `src` to `dest` on `role`.
    pub fn push(
        &self,
        local: &Local,
        role: Role,
        src: &Path,
        dest: &str,
    ) -> Result<(), failure::Error> {
        let src_str = src.display().to_string();
        match role {
            Role::Local => {
                local.spawn("cp", &[src_str, dest.into()])?;
            }
            Role::Bf2Host | Role::Bf3Dpu => {
                let target = self.direct_target(role)?;
                let mut args = vec![src_str];
                let remote = target.scp_args(dest);
                // scp wants the port flag before the sources
                if remote.len() == 3 {
                    args.insert(0, remote[1].clone());
                    args.insert(0, remote[0].clone());
                    args.push(remote[2].clone());
                } else {
                    args.extend(remote);
                }
                local.spawn("scp", &args)?;
            }
            Role::Bf2Dpu => {
                let gateway = self.connect(local, &self.bf2_host)?;
                let name = src
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| src_str.clone());
                let staged = format!("/tmp/{}", name);
                self.push(local, Role::Bf2Host, src, &staged)?;
                gateway.exec(&format!("scp {} {}:{}", staged, self.bf2_dpu_alias, dest))?;
                gateway.exec(&format!("rm -f {}", staged))?;
            }
        }
        Ok(())
    }
}

/// Borrowing adapter so that `Testbed::shell` can hand out the runner's own machine.
struct LocalShell<'l>(&'l Local);

impl Shell for LocalShell<'_> {
    fn name(&self) -> String {
        self.0.name()
    }

    fn exec(&self, cmd: &str) -> Result<String, failure::Error> {
        self.0.exec(cmd)
    }

    fn exec_tty(&self, cmd: &str) -> Result<(), failure::Error> {
        self.0.exec_tty(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_the_paper_testbed() {
        let tb = Testbed::default();
        assert_eq!(tb.bf2_host, SshTarget::Alias("cloud-48".into()));
        assert_eq!(tb.bf3_dpu, SshTarget::Alias("bf-pcie".into()));
        assert_eq!(tb.run_limit_seconds, 5);
    }

    #[test]
    fn partial_testbed_file_keeps_defaults() {
        let tb: Testbed = serde_json::from_str(
            r#"{ "bf2_host": { "username": "alice", "host": "node7:2222" }, "run_limit_seconds": 2 }"#,
        )
        .unwrap();
        assert_eq!(tb.run_limit_seconds, 2);
        assert_eq!(tb.bf3_dpu, SshTarget::Alias("bf-pcie".into()));
        assert_eq!(tb.bf2_host.ssh_args(), vec!["-p", "2222", "alice@node7"]);
        assert_eq!(
            tb.bf2_host.scp_args("/tmp/x.csv"),
            vec!["-P", "2222", "alice@node7:/tmp/x.csv"]
        );
    }

    #[test]
    fn remote_scripts_run_inside_the_workspace() {
        let local = Local::new("/repo", true);
        let tb = Testbed::default();
        tb.run_script(
            &local,
            Role::Bf3Dpu,
            "experiments/local-compress",
            "bash measure-dpu.sh --v3",
        )
        .unwrap();
        assert_eq!(
            local.history(),
            vec!["ssh bf-pcie cd dpu-paper/experiments/local-compress && bash measure-dpu.sh --v3"]
        );
    }

    #[test]
    fn fetch_through_gateway_stages_and_cleans_up() {
        let local = Local::new("/repo", true);
        let tb = Testbed::default();
        tb.fetch(
            &local,
            Role::Bf2Dpu,
            "experiments/local-compress/build/results/doca/*.csv",
            Path::new("/repo/results/bf2"),
        )
        .unwrap();

        let history = local.history();
        assert_eq!(history.len(), 3);
        assert_eq!(
            history[0],
            "ssh cloud-48 cd dpu-paper && scp bf-pcie:dpu-paper/experiments/local-compress/build/results/doca/*.csv ."
        );
        assert_eq!(history[1], "scp cloud-48:dpu-paper/*.csv /repo/results/bf2");
        assert_eq!(history[2], "ssh cloud-48 rm -f dpu-paper/*.csv");
    }

    #[test]
    fn local_fetch_is_a_move() {
        let local = Local::new("/repo", true);
        Testbed::default()
            .fetch(
                &local,
                Role::Local,
                "experiments/co-processing/results-*.json",
                Path::new("/repo/out"),
            )
            .unwrap();
        assert_eq!(
            local.history(),
            vec!["bash -c mv /repo/experiments/co-processing/results-*.json /repo/out"]
        );
    }

    #[test]
    fn push_puts_port_before_sources() {
        let local = Local::new("/repo", true);
        let tb = Testbed {
            bf3_dpu: SshTarget::Login {
                username: "ubuntu".into(),
                host: "10.0.0.2:22".into(),
            },
            ..Testbed::default()
        };
        tb.push(&local, Role::Bf3Dpu, Path::new("/tmp/s.sh"), "/tmp/s.sh")
            .unwrap();
        assert_eq!(local.history(), vec!["scp -P 22 /tmp/s.sh ubuntu@10.0.0.2:/tmp/s.sh"]);
    }
}
