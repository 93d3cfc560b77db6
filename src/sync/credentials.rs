//! Credential storage for the sync API key.
//!
//! Two backends behind one capability: the OS keychain (via the
//! platform's CLI tool) and a 0600 JSON file under `~/.savecontext/`.
//! The backend is picked by probing for the keychain tool at open time.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::process::Command;

/// Service name used for keychain entries.
const SERVICE: &str = "savecontext";

/// Credential storage capability.
pub enum CredentialStore {
    Keychain(KeychainBackend),
    File(FileBackend),
}

impl CredentialStore {
    /// Open the best available backend: keychain when the platform tool
    /// responds, file otherwise.
    #[must_use]
    pub fn open(fallback_path: PathBuf) -> Self {
        if let Some(keychain) = KeychainBackend::probe() {
            Self::Keychain(keychain)
        } else {
            Self::File(FileBackend::new(fallback_path))
        }
    }

    /// Backend name for status display.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Keychain(_) => "keychain",
            Self::File(_) => "file",
        }
    }

    /// Fetch a credential.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        match self {
            Self::Keychain(backend) => backend.get(key),
            Self::File(backend) => backend.get(key),
        }
    }

    /// Store a credential.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        match self {
            Self::Keychain(backend) => backend.set(key, value),
            Self::File(backend) => backend.set(key, value),
        }
    }

    /// Remove a credential.
    pub fn delete(&self, key: &str) -> Result<()> {
        match self {
            Self::Keychain(backend) => backend.delete(key),
            Self::File(backend) => backend.delete(key),
        }
    }
}

// ── Keychain backend ─────────────────────────────────────────

/// Which platform keychain CLI is in play.
#[derive(Debug, Clone, Copy)]
enum KeychainTool {
    /// macOS `security`
    Security,
    /// Linux `secret-tool` (libsecret)
    SecretTool,
}

/// OS keychain access through the platform CLI.
pub struct KeychainBackend {
    tool: KeychainTool,
}

impl KeychainBackend {
    /// Probe for a usable keychain tool.
    fn probe() -> Option<Self> {
        for (tool, binary) in [
            (KeychainTool::Security, "security"),
            (KeychainTool::SecretTool, "secret-tool"),
        ] {
            let found = Command::new(binary)
                .arg("--help")
                .output()
                .map(|o| o.status.success() || !o.stderr.is_empty())
                .unwrap_or(false);
            if found {
                return Some(Self { tool });
            }
        }
        None
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let output = match self.tool {
            KeychainTool::Security => Command::new("security")
                .args(["find-generic-password", "-s", SERVICE, "-a", key, "-w"])
                .output(),
            KeychainTool::SecretTool => Command::new("secret-tool")
                .args(["lookup", "service", SERVICE, "key", key])
                .output(),
        }
        .map_err(|e| Error::Config(format!("keychain lookup failed: {e}")))?;

        if !output.status.success() {
            return Ok(None);
        }

        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!value.is_empty()).then_some(value))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let status = match self.tool {
            KeychainTool::Security => Command::new("security")
                .args([
                    "add-generic-password",
                    "-U",
                    "-s",
                    SERVICE,
                    "-a",
                    key,
                    "-w",
                    value,
                ])
                .status(),
            KeychainTool::SecretTool => {
                let mut child = Command::new("secret-tool")
                    .args(["store", "--label", SERVICE, "service", SERVICE, "key", key])
                    .stdin(std::process::Stdio::piped())
                    .spawn()
                    .map_err(|e| Error::Config(format!("keychain store failed: {e}")))?;
                if let Some(mut stdin) = child.stdin.take() {
                    stdin
                        .write_all(value.as_bytes())
                        .map_err(|e| Error::Config(format!("keychain store failed: {e}")))?;
                }
                child.wait()
            }
        }
        .map_err(|e| Error::Config(format!("keychain store failed: {e}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::Config("keychain store rejected the credential".to_string()))
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        let _ = match self.tool {
            KeychainTool::Security => Command::new("security")
                .args(["delete-generic-password", "-s", SERVICE, "-a", key])
                .status(),
            KeychainTool::SecretTool => Command::new("secret-tool")
                .args(["clear", "service", SERVICE, "key", key])
                .status(),
        };
        Ok(())
    }
}

// ── File backend ─────────────────────────────────────────────

/// Plain JSON credential file with restrictive permissions.
pub struct FileBackend {
    path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    credentials: BTreeMap<String, String>,
}

impl FileBackend {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read(&self) -> CredentialFile {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default()
    }

    fn write(&self, file: &CredentialFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(file)?;
        let temp_path = self.path.with_extension("json.tmp");
        {
            let mut opts = fs::OpenOptions::new();
            opts.write(true).create(true).truncate(true);
            #[cfg(unix)]
            opts.mode(0o600);
            let mut f = opts.open(&temp_path)?;
            f.write_all(content.as_bytes())?;
            f.flush()?;
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read().credentials.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut file = self.read();
        file.credentials.insert(key.to_string(), value.to_string());
        self.write(&file)
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut file = self.read();
        file.credentials.remove(key);
        self.write(&file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_backend_round_trip() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().join("credentials.json"));

        assert!(backend.get("api_key").unwrap().is_none());

        backend.set("api_key", "sk-12345").unwrap();
        assert_eq!(backend.get("api_key").unwrap().as_deref(), Some("sk-12345"));

        backend.set("api_key", "sk-67890").unwrap();
        assert_eq!(backend.get("api_key").unwrap().as_deref(), Some("sk-67890"));

        backend.delete("api_key").unwrap();
        assert!(backend.get("api_key").unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_backend_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials.json");
        let backend = FileBackend::new(path.clone());
        backend.set("k", "v").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_store_open_never_panics() {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::open(dir.path().join("credentials.json"));
        // Either backend is fine; it just has to resolve
        assert!(matches!(store.backend_name(), "keychain" | "file"));
    }
}
