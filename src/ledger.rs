//! Durable record of which content identifiers have been fetched.
//!
//! The ledger is a UTF-8 text file with one record per line. Fields are
//! comma-separated; the first field is the canonical identifier and any
//! further fields are aliases. Every update reads the whole file and writes it
//! back through a temp file and rename, serialized by an async mutex so
//! concurrent tasks never interleave their read-modify-write cycles.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// Field separator within one ledger line.
const FIELD_SEPARATOR: char = ',';

/// Errors from ledger reads and updates.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Reading the ledger file failed for a reason other than absence.
    #[error("cannot read ledger {path}: {source}")]
    Read {
        /// Ledger path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Writing the ledger file failed.
    #[error("cannot write ledger {path}: {source}")]
    Write {
        /// Ledger path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The identifier cannot be stored in a comma-separated line.
    #[error("invalid ledger identifier '{id}'")]
    InvalidIdentifier {
        /// The rejected identifier.
        id: String,
    },
}

/// One parsed ledger line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Canonical content identifier.
    pub id: String,
    /// Identifiers of other links that resolved to the same content.
    pub aliases: Vec<String>,
}

impl LedgerEntry {
    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split(FIELD_SEPARATOR).map(str::trim);
        let id = fields.next().filter(|id| !id.is_empty())?.to_string();
        let aliases = fields
            .filter(|alias| !alias.is_empty())
            .map(str::to_string)
            .collect();
        Some(Self { id, aliases })
    }

    fn render(&self) -> String {
        std::iter::once(self.id.as_str())
            .chain(self.aliases.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// What a [`DownloadLedger::record_or_merge`] call changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerUpdate {
    /// A new line was added.
    Inserted,
    /// An alias was appended to an existing line.
    AliasAppended,
    /// The identifier (and alias, if any) was already present.
    Unchanged,
}

/// File-backed download ledger.
#[derive(Debug)]
pub struct DownloadLedger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl DownloadLedger {
    /// Opens a ledger at `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Ledger file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if `id` is the first field of some line.
    ///
    /// A missing ledger file means nothing has been fetched yet.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Read`] if the file exists but cannot be read.
    pub async fn has_entry(&self, id: &str) -> Result<bool, LedgerError> {
        let _guard = self.lock.lock().await;
        let entries = self.read_entries().await?;
        Ok(entries.iter().any(|entry| entry.id == id))
    }

    /// All parsed entries, in file order.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Read`] if the file exists but cannot be read.
    pub async fn entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let _guard = self.lock.lock().await;
        self.read_entries().await
    }

    /// Records `id`, or merges `alias` onto its existing line.
    ///
    /// Re-recording an identifier that is already present, with no alias or
    /// with an alias already on the line, leaves the file untouched.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidIdentifier`] for empty ids or ids containing separators
    /// - [`LedgerError::Read`] / [`LedgerError::Write`] on IO failure
    #[instrument(skip(self), fields(ledger = %self.path.display()))]
    pub async fn record_or_merge(
        &self,
        id: &str,
        alias: Option<&str>,
    ) -> Result<LedgerUpdate, LedgerError> {
        validate_identifier(id)?;
        let alias = alias.filter(|alias| *alias != id);
        if let Some(alias) = alias {
            validate_identifier(alias)?;
        }

        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;

        let update = match entries.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => match alias {
                Some(alias) if !entry.aliases.iter().any(|known| known == alias) => {
                    entry.aliases.push(alias.to_string());
                    LedgerUpdate::AliasAppended
                }
                _ => LedgerUpdate::Unchanged,
            },
            None => {
                entries.push(LedgerEntry {
                    id: id.to_string(),
                    aliases: alias.map(str::to_string).into_iter().collect(),
                });
                LedgerUpdate::Inserted
            }
        };

        if update == LedgerUpdate::Unchanged {
            debug!("ledger already up to date");
        } else {
            self.write_entries(&entries).await?;
            info!(?update, "ledger updated");
        }
        Ok(update)
    }

    async fn read_entries(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(contents.lines().filter_map(LedgerEntry::parse).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(LedgerError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn write_entries(&self, entries: &[LedgerEntry]) -> Result<(), LedgerError> {
        let write_err = |source: std::io::Error| LedgerError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let mut contents = String::new();
        for entry in entries {
            contents.push_str(&entry.render());
            contents.push('\n');
        }

        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, contents)
            .await
            .map_err(write_err)?;
        if let Err(source) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(write_err(source));
        }
        Ok(())
    }
}

fn validate_identifier(id: &str) -> Result<(), LedgerError> {
    if id.trim().is_empty() || id.contains([FIELD_SEPARATOR, '\n', '\r']) {
        return Err(LedgerError::InvalidIdentifier { id: id.to_string() });
    }
    Ok(())
}
