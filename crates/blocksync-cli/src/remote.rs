//! Building the command line that starts an agent.

use std::path::PathBuf;

use blocksync::{CommandConnector, HashConfig, HashStrength};

/// Host name that means "run the agent on this machine".
pub const LOCALHOST: &str = "localhost";

/// Agent program name on a remote host, unless overridden.
pub const REMOTE_AGENT: &str = "blocksync";

/// Environment variable `sshpass -e` reads the password from.
const SSHPASS_ENV: &str = "SSHPASS";

pub fn is_local(host: &str) -> bool {
    host == LOCALHOST
}

/// How to reach and start the agent.
#[derive(Debug, Clone, Default)]
pub struct Launch {
    /// ssh cipher specification.
    pub cipher: Option<String>,
    /// Enable ssh compression.
    pub compress: bool,
    /// ssh identity file.
    pub key_file: Option<PathBuf>,
    /// ssh password, passed to `sshpass` through its environment.
    pub password: Option<String>,
    /// Run the agent under sudo.
    pub sudo: bool,
    /// Agent program to run.
    pub agent_path: Option<String>,
}

/// The agent's own arguments.
#[derive(Debug, Clone)]
pub struct AgentInvocation {
    pub dest: String,
    pub block_size: u64,
    pub hash: HashConfig,
    pub transient: bool,
}

impl AgentInvocation {
    /// `agent <dest> -b <size> [-2] [-W] [--transient]`
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "agent".to_string(),
            self.dest.clone(),
            "-b".to_string(),
            self.block_size.to_string(),
        ];
        if self.hash.double {
            args.push("-2".into());
        }
        if self.hash.strength == HashStrength::Weak {
            args.push("-W".into());
        }
        if self.transient {
            args.push("--transient".into());
        }
        args
    }
}

impl Launch {
    /// The connector that starts `invocation` on `host`.
    ///
    /// `local_agent` is the program used when `host` is this machine and
    /// no agent path was given.
    pub fn connector(
        &self,
        host: &str,
        invocation: &AgentInvocation,
        local_agent: &str,
    ) -> CommandConnector {
        let mut argv: Vec<String> = Vec::new();
        let local = is_local(host);

        if !local {
            if self.password.is_some() {
                argv.extend(["sshpass".to_string(), "-e".to_string()]);
            }
            argv.push("ssh".into());
            if let Some(cipher) = &self.cipher {
                argv.extend(["-c".to_string(), cipher.clone()]);
            }
            if let Some(key) = &self.key_file {
                argv.extend(["-i".to_string(), key.display().to_string()]);
            }
            if self.compress {
                argv.push("-C".into());
            }
            argv.push(host.to_string());
        }
        if self.sudo {
            argv.push("sudo".into());
        }

        let agent = match &self.agent_path {
            Some(path) => path.clone(),
            None if local => local_agent.to_string(),
            None => REMOTE_AGENT.to_string(),
        };
        argv.push(agent);
        argv.extend(invocation.args());

        let program = argv.remove(0);
        let connector = CommandConnector::new(program, argv);
        match (&self.password, local) {
            (Some(password), false) => connector.with_env(SSHPASS_ENV, password.clone()),
            _ => connector,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation() -> AgentInvocation {
        AgentInvocation {
            dest: "/dev/sdb".into(),
            block_size: 1048576,
            hash: HashConfig::default(),
            transient: false,
        }
    }

    #[test]
    fn test_agent_args() {
        let mut inv = invocation();
        assert_eq!(inv.args(), ["agent", "/dev/sdb", "-b", "1048576"]);

        inv.hash = HashConfig::new(HashStrength::Weak, true);
        inv.transient = true;
        assert_eq!(
            inv.args(),
            ["agent", "/dev/sdb", "-b", "1048576", "-2", "-W", "--transient"]
        );
    }

    #[test]
    fn test_local_command() {
        let launch = Launch {
            sudo: true,
            ..Launch::default()
        };
        let connector = launch.connector("localhost", &invocation(), "/usr/bin/blocksync");
        assert_eq!(
            connector.command_line(),
            "sudo /usr/bin/blocksync agent /dev/sdb -b 1048576"
        );
    }

    #[test]
    fn test_remote_command() {
        let launch = Launch {
            cipher: Some("aes128-ctr".into()),
            compress: true,
            key_file: Some(PathBuf::from("/home/me/.ssh/id")),
            sudo: true,
            ..Launch::default()
        };
        let connector = launch.connector("root@vault", &invocation(), "/unused");
        assert_eq!(
            connector.command_line(),
            "ssh -c aes128-ctr -i /home/me/.ssh/id -C root@vault sudo blocksync agent /dev/sdb -b 1048576"
        );
    }

    #[test]
    fn test_password_stays_out_of_command_line() {
        let launch = Launch {
            password: Some("hunter2".into()),
            agent_path: Some("/opt/blocksync".into()),
            ..Launch::default()
        };
        let connector = launch.connector("vault", &invocation(), "/unused");
        let line = connector.command_line();
        assert!(line.starts_with("sshpass -e ssh vault /opt/blocksync agent"));
        assert!(!line.contains("hunter2"));
    }
}
