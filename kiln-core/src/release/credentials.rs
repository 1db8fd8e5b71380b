//! Upload credentials resolved through a fixed provider chain.

use std::fmt;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use dialoguer::{Input, Password};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

pub trait CredentialProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns `Ok(None)` when this provider has nothing to offer.
    fn provide(&self) -> Result<Option<Credentials>>;
}

type VarLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads `KILN_ACCESS_KEY_ID` / `KILN_SECRET_ACCESS_KEY`, falling back to the
/// `AWS_` names.
pub struct EnvProvider {
    lookup: VarLookup,
}

impl Default for EnvProvider {
    fn default() -> Self {
        Self {
            lookup: Box::new(|key| std::env::var(key).ok()),
        }
    }
}

impl EnvProvider {
    /// Provider over a fixed set of variables instead of the process environment.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: std::collections::HashMap<String, String> =
            vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self {
            lookup: Box::new(move |key| vars.get(key).cloned()),
        }
    }

    fn first(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|key| (self.lookup)(key))
            .find(|value| !value.trim().is_empty())
    }
}

impl CredentialProvider for EnvProvider {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn provide(&self) -> Result<Option<Credentials>> {
        let id = self.first(&["KILN_ACCESS_KEY_ID", "AWS_ACCESS_KEY_ID"]);
        let secret = self.first(&["KILN_SECRET_ACCESS_KEY", "AWS_SECRET_ACCESS_KEY"]);
        Ok(match (id, secret) {
            (Some(id), Some(secret)) => Some(Credentials {
                access_key_id: id,
                secret_access_key: secret,
                session_token: self.first(&["KILN_SESSION_TOKEN", "AWS_SESSION_TOKEN"]),
            }),
            _ => None,
        })
    }
}

/// Reads credentials from a TOML file.
///
/// ```toml
/// access_key_id = "AKIA..."
/// secret_access_key = "..."
/// ```
pub struct FileProvider {
    path: PathBuf,
}

impl FileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.config/kiln/credentials.toml` or the platform equivalent.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("kiln").join("credentials.toml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialProvider for FileProvider {
    fn name(&self) -> &'static str {
        "credentials file"
    }

    fn provide(&self) -> Result<Option<Credentials>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        toml::from_str(&content)
            .map(Some)
            .map_err(|error| Error::Toml {
                error,
                context: self.path.display().to_string(),
            })
    }
}

/// Asks on the terminal. Offers nothing when stdin is not interactive.
#[derive(Default)]
pub struct PromptProvider;

impl CredentialProvider for PromptProvider {
    fn name(&self) -> &'static str {
        "interactive prompt"
    }

    fn provide(&self) -> Result<Option<Credentials>> {
        if !std::io::stdin().is_terminal() {
            return Ok(None);
        }
        let id: String = Input::new()
            .with_prompt("Access key ID")
            .interact_text()
            .map_err(|e| Error::CredentialMissing(format!("prompt failed: {}", e)))?;
        let secret = Password::new()
            .with_prompt("Secret access key")
            .interact()
            .map_err(|e| Error::CredentialMissing(format!("prompt failed: {}", e)))?;
        Ok(Some(Credentials::new(id, secret)))
    }
}

/// Providers tried in order; the first one with credentials wins.
pub struct CredentialChain {
    providers: Vec<Box<dyn CredentialProvider>>,
}

impl CredentialChain {
    pub fn new(providers: Vec<Box<dyn CredentialProvider>>) -> Self {
        Self { providers }
    }

    /// Environment, then credentials file, then interactive prompt.
    pub fn standard(credentials_file: Option<&Path>) -> Self {
        let mut providers: Vec<Box<dyn CredentialProvider>> = vec![Box::new(EnvProvider::default())];
        if let Some(path) = credentials_file
            .map(Path::to_path_buf)
            .or_else(FileProvider::default_path)
        {
            providers.push(Box::new(FileProvider::new(path)));
        }
        providers.push(Box::new(PromptProvider));
        Self { providers }
    }

    /// # Errors
    ///
    /// Returns [`Error::CredentialMissing`] if no provider offers credentials.
    pub fn resolve(&self) -> Result<Credentials> {
        for provider in &self.providers {
            if let Some(credentials) = provider.provide()? {
                debug!(provider = provider.name(), "resolved upload credentials");
                return Ok(credentials);
            }
        }
        let tried: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        Err(Error::CredentialMissing(format!(
            "no upload credentials found (tried: {})",
            tried.join(", ")
        )))
    }
}
