use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 1337;

const PARAMS_FILE: &str = "params";
const SERVER_KEY_FILE: &str = "server_long_term_key";
const CLIENT_KEY_FILE: &str = "client_long_term_key";

/// Where the channel finds its group parameters and long-term key files,
/// and which TCP port it uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Directory holding `params` and the long-term key files.
    pub dir: PathBuf,

    /// TCP port to listen or connect on.
    pub port: u16,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            port: DEFAULT_PORT,
        }
    }
}

impl ChannelConfig {
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn params_path(&self) -> PathBuf {
        self.dir.join(PARAMS_FILE)
    }

    pub fn server_key_path(&self) -> PathBuf {
        self.dir.join(SERVER_KEY_FILE)
    }

    pub fn server_pub_path(&self) -> PathBuf {
        self.dir.join(format!("{SERVER_KEY_FILE}.pub"))
    }

    pub fn client_key_path(&self) -> PathBuf {
        self.dir.join(CLIENT_KEY_FILE)
    }

    pub fn client_pub_path(&self) -> PathBuf {
        self.dir.join(format!("{CLIENT_KEY_FILE}.pub"))
    }
}
