//! remote-ssh: russh-backed implementation of the transport traits
//!
//! One authenticated control connection per daemon; each command runs on
//! a fresh exec channel multiplexed over it. Host keys are always
//! verified against `~/.ssh/known_hosts`; credentials come from the
//! agent at `$SSH_AUTH_SOCK` and the usual key files under `~/.ssh`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::agent::client::AgentClient;
use russh_keys::key::{KeyPair, PublicKey};
use tokio::sync::Mutex;

use remote_core::config::{CONNECT_TIMEOUT, SSH_PORT};
use remote_core::error::TransportError;
use remote_core::transport::{RemoteConnection, RemoteError, RemoteSession};

/// Key files probed under ~/.ssh, in preference order
const KEY_FILES: &[&str] = &["id_ed25519", "id_rsa"];

/// Authenticated SSH control connection to one host
pub struct SshConnection {
    handle: Mutex<Handle<HostKeyVerifier>>,
}

impl SshConnection {
    /// Dial `host` on the standard SSH port as `user` and authenticate,
    /// verifying the server against `<home>/.ssh/known_hosts`. The whole
    /// dial is bounded by the connect timeout.
    pub async fn dial(host: &str, user: &str, home: &Path) -> Result<Self, TransportError> {
        tokio::time::timeout(CONNECT_TIMEOUT, Self::dial_inner(host, user, home))
            .await
            .map_err(|_| TransportError::Timeout {
                host: host.to_string(),
            })?
    }

    async fn dial_inner(host: &str, user: &str, home: &Path) -> Result<Self, TransportError> {
        let ssh_dir = home.join(".ssh");

        // Gather credentials up front so a host with nothing to offer
        // fails before any network traffic.
        let mut agent = connect_agent().await;
        let agent_ids = match agent.as_mut() {
            Some(agent) => agent.request_identities().await.unwrap_or_default(),
            None => Vec::new(),
        };
        let keys: Vec<Arc<KeyPair>> = KEY_FILES
            .iter()
            .filter_map(|name| {
                russh_keys::load_secret_key(ssh_dir.join(name), None)
                    .ok()
                    .map(Arc::new)
            })
            .collect();
        if agent_ids.is_empty() && keys.is_empty() {
            return Err(TransportError::NoAuthMethod);
        }

        let config = Arc::new(client::Config::default());
        let verifier = HostKeyVerifier {
            host: host.to_string(),
            known_hosts: ssh_dir.join("known_hosts"),
        };

        tracing::debug!(%host, "dialing");
        let mut handle = client::connect(config, (host, SSH_PORT), verifier)
            .await
            .map_err(|e| match e.downcast_ref::<russh::Error>() {
                Some(russh::Error::UnknownKey) => TransportError::KnownHosts(format!(
                    "server key for {host} is not in known_hosts"
                )),
                _ => TransportError::Ssh(e.to_string()),
            })?;

        let mut authenticated = false;

        if let Some(mut agent_client) = agent {
            for key in agent_ids {
                let (returned, result) = handle.authenticate_future(user, key, agent_client).await;
                agent_client = returned;
                match result {
                    Ok(true) => {
                        tracing::debug!(%user, "authenticated via agent");
                        authenticated = true;
                        break;
                    }
                    Ok(false) => {}
                    Err(e) => tracing::debug!("agent auth attempt failed: {e}"),
                }
            }
        }

        if !authenticated {
            for key in keys {
                match handle.authenticate_publickey(user, key).await {
                    Ok(true) => {
                        tracing::debug!(%user, "authenticated via key file");
                        authenticated = true;
                        break;
                    }
                    Ok(false) => {}
                    Err(e) => tracing::debug!("publickey auth attempt failed: {e}"),
                }
            }
        }

        if !authenticated {
            return Err(TransportError::AuthRejected {
                user: user.to_string(),
            });
        }

        Ok(Self {
            handle: Mutex::new(handle),
        })
    }
}

#[async_trait]
impl RemoteConnection for SshConnection {
    async fn open_session(&self) -> Result<Box<dyn RemoteSession>, TransportError> {
        let channel = self
            .handle
            .lock()
            .await
            .channel_open_session()
            .await
            .map_err(|e| TransportError::Ssh(e.to_string()))?;
        Ok(Box::new(SshSession { channel }))
    }

    async fn close(&self) {
        let result = self
            .handle
            .lock()
            .await
            .disconnect(Disconnect::ByApplication, "shutting down", "en")
            .await;
        if let Err(e) = result {
            tracing::warn!("SSH disconnect failed: {e}");
        }
    }
}

/// One exec channel on the control connection
struct SshSession {
    channel: Channel<Msg>,
}

#[async_trait]
impl RemoteSession for SshSession {
    async fn combined_output(mut self: Box<Self>, cmd: &str) -> (Vec<u8>, Result<(), RemoteError>) {
        if let Err(e) = self.channel.exec(true, cmd).await {
            return (Vec::new(), Err(RemoteError::Other(e.to_string())));
        }

        let mut output = Vec::new();
        let mut status = None;
        while let Some(msg) = self.channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => output.extend_from_slice(&data[..]),
                // Remote stderr arrives as extended stream 1; arrival
                // order between the streams is preserved in the buffer
                ChannelMsg::ExtendedData { ref data, ext: 1 } => {
                    output.extend_from_slice(&data[..])
                }
                ChannelMsg::ExitStatus { exit_status } => status = Some(exit_status),
                _ => {}
            }
        }

        let result = match status {
            Some(0) => Ok(()),
            Some(code) => Err(RemoteError::Exit(code)),
            None => Err(RemoteError::Other(
                "session ended without an exit status".to_string(),
            )),
        };
        (output, result)
    }
}

/// Connect to the ssh-agent named by $SSH_AUTH_SOCK, if any
async fn connect_agent() -> Option<AgentClient<tokio::net::UnixStream>> {
    std::env::var_os("SSH_AUTH_SOCK")?;
    match AgentClient::connect_env().await {
        Ok(agent) => Some(agent),
        Err(e) => {
            tracing::debug!("ssh-agent unavailable: {e}");
            None
        }
    }
}

/// Client handler enforcing known_hosts verification
struct HostKeyVerifier {
    host: String,
    known_hosts: PathBuf,
}

#[async_trait]
impl client::Handler for HostKeyVerifier {
    type Error = anyhow::Error;

    async fn check_server_key(
        self,
        server_public_key: &PublicKey,
    ) -> Result<(Self, bool), Self::Error> {
        let result = match russh_keys::check_known_hosts_path(
            &self.host,
            SSH_PORT,
            server_public_key,
            &self.known_hosts,
        ) {
            Ok(true) => true,
            Ok(false) => {
                tracing::error!(host = %self.host, "server key not present in known_hosts");
                false
            }
            Err(e) => {
                tracing::error!(host = %self.host, "known_hosts verification failed: {e}");
                false
            }
        };
        Ok((self, result))
    }
}
