//! Channel establishment.
//!
//! A [`Connector`] yields a bidirectional byte stream to something that
//! speaks the agent side of the protocol. Where that agent runs (another
//! task, a local process, a process behind `ssh`) is the connector's
//! business; the driver only sees a [`Channel`].

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Result, SyncError};

/// Boxed receiving half of a channel.
pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed sending half of a channel.
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Opens channels to target agents.
///
/// Implementations must be thread-safe (Send + Sync); one connector is
/// shared by every worker of a session.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Start (or reach) an agent for `worker` and connect to it.
    async fn connect(&self, worker: usize) -> Result<Channel>;
}

/// A connected byte stream plus a handle on the agent behind it.
pub struct Channel {
    reader: BoxReader,
    writer: BoxWriter,
    peer: Peer,
}

impl Channel {
    /// Assemble a channel.
    pub fn new(reader: BoxReader, writer: BoxWriter, peer: Peer) -> Self {
        Self {
            reader,
            writer,
            peer,
        }
    }

    /// Split into the stream halves and the peer handle.
    pub fn into_parts(self) -> (BoxReader, BoxWriter, Peer) {
        (self.reader, self.writer, self.peer)
    }
}

/// The agent on the far side of a channel.
pub enum Peer {
    /// A child process (local, or a remote shell carrying the agent).
    Process(tokio::process::Child),
    /// An agent running as a task in this process.
    Task(tokio::task::JoinHandle<Result<crate::agent::AgentReport>>),
}

impl Peer {
    /// Wait for the agent to finish and check that it succeeded.
    ///
    /// An in-process agent's own error is returned as is.
    pub async fn wait(self) -> Result<()> {
        match self {
            Peer::Process(mut child) => {
                let status = child
                    .wait()
                    .await
                    .map_err(|e| SyncError::Agent(format!("waiting for agent: {e}")))?;
                if status.success() {
                    Ok(())
                } else {
                    Err(SyncError::Agent(format!("agent exited with {status}")))
                }
            }
            Peer::Task(handle) => match handle.await {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(SyncError::Agent(format!("agent task failed: {e}"))),
            },
        }
    }

    /// Stop the agent without waiting for a clean exit.
    pub async fn abort(self) {
        match self {
            Peer::Process(mut child) => {
                if let Err(e) = child.kill().await {
                    tracing::debug!("agent process already gone: {}", e);
                }
            }
            Peer::Task(handle) => handle.abort(),
        }
    }
}

/// In-process agents, connected through an in-memory pipe.
///
/// Used for local-to-local syncs and in tests. Each `connect` spawns a
/// fresh [`Agent`](crate::agent::Agent) task.
pub mod memory {
    use super::*;
    use crate::agent::{Agent, AgentConfig};

    /// Capacity of each direction of the in-memory pipe.
    const PIPE_CAPACITY: usize = 256 * 1024;

    /// Connector that runs the agent as a tokio task.
    #[derive(Debug, Clone)]
    pub struct MemoryConnector {
        agent: AgentConfig,
    }

    impl MemoryConnector {
        /// Create a connector whose agents use `agent`.
        pub fn new(agent: AgentConfig) -> Self {
            Self { agent }
        }
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        async fn connect(&self, worker: usize) -> Result<Channel> {
            let (driver_end, agent_end) = tokio::io::duplex(PIPE_CAPACITY);
            let (agent_reader, agent_writer) = tokio::io::split(agent_end);
            let (driver_reader, driver_writer) = tokio::io::split(driver_end);

            let agent = Agent::new(self.agent.clone());
            let handle = tokio::spawn(async move {
                let result = agent.run(agent_reader, agent_writer).await;
                if let Err(e) = &result {
                    tracing::debug!(worker, "in-process agent failed: {}", e);
                }
                result
            });

            Ok(Channel::new(
                Box::new(driver_reader),
                Box::new(driver_writer),
                Peer::Task(handle),
            ))
        }
    }
}

/// Agents started as child processes.
pub mod process {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    /// Connector that spawns a command speaking the agent protocol on its
    /// stdin/stdout.
    ///
    /// The command may be the agent binary itself or a remote shell
    /// (`ssh host blocksync agent ...`) that carries it.
    #[derive(Debug, Clone)]
    pub struct CommandConnector {
        program: String,
        args: Vec<String>,
        envs: Vec<(String, String)>,
    }

    impl CommandConnector {
        /// Create a connector for `program args...`.
        pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
            Self {
                program: program.into(),
                args,
                envs: Vec::new(),
            }
        }

        /// Set an environment variable for the command. Values never
        /// appear in [`command_line`](Self::command_line).
        pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
            self.envs.push((key.into(), value.into()));
            self
        }

        /// The full command line, for logs.
        pub fn command_line(&self) -> String {
            std::iter::once(self.program.as_str())
                .chain(self.args.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" ")
        }
    }

    #[async_trait]
    impl Connector for CommandConnector {
        async fn connect(&self, worker: usize) -> Result<Channel> {
            tracing::info!(worker, "running: {}", self.command_line());

            let mut child = Command::new(&self.program)
                .args(&self.args)
                .envs(self.envs.iter().map(|(k, v)| (k, v)))
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::inherit())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| SyncError::Connect(format!("cannot run {}: {e}", self.program)))?;

            let stdin = child
                .stdin
                .take()
                .ok_or_else(|| SyncError::Connect("agent stdin unavailable".into()))?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| SyncError::Connect("agent stdout unavailable".into()))?;

            Ok(Channel::new(
                Box::new(stdout),
                Box::new(stdin),
                Peer::Process(child),
            ))
        }
    }
}
