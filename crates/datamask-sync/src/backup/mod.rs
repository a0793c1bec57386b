//! Encrypted full-snapshot backups of the source tables.
//!
//! A backup is a plain SQL script (DDL plus one INSERT per row, in one
//! transaction) sealed with AES-256-GCM. Restoring decrypts it back to the
//! script; loading it into a database is left to the operator.

mod cipher;
mod script;

pub use cipher::{BackupCipher, MAGIC, VERSION};
pub use script::{create_table_sql, sql_literal, ScriptWriter};

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::TableSpec;
use crate::core::traits::{ExtractFilter, ExtractQuery, SourceReader};
use crate::error::{Result, SyncError};

/// File extension of backups.
pub const BACKUP_EXTENSION: &str = "sql.enc";

/// Writes and reads encrypted backups in one directory.
#[derive(Debug)]
pub struct BackupService {
    cipher: BackupCipher,
    directory: PathBuf,
}

impl BackupService {
    pub fn new(cipher: BackupCipher, directory: impl Into<PathBuf>) -> Self {
        Self {
            cipher,
            directory: directory.into(),
        }
    }

    /// Snapshot every table, encrypt and write the backup file.
    pub async fn create(&self, source: &dyn SourceReader, tables: &[TableSpec]) -> Result<PathBuf> {
        let created_at = Utc::now();
        let script = self.snapshot(source, tables, created_at).await?;
        self.seal(&script, created_at)
    }

    /// Render the backup script for the given tables.
    pub async fn snapshot(
        &self,
        source: &dyn SourceReader,
        tables: &[TableSpec],
        created_at: DateTime<Utc>,
    ) -> Result<String> {
        let mut writer = ScriptWriter::new(created_at);
        for spec in tables {
            let schema = source
                .describe_table(&spec.name)
                .await
                .map_err(|e| SyncError::extraction(&spec.name, e))?;
            let rows = source
                .extract(&ExtractQuery {
                    table: spec.name.clone(),
                    pk_column: spec.pk.clone(),
                    filter: ExtractFilter::All,
                })
                .await
                .map_err(|e| SyncError::extraction(&spec.name, e))?;
            info!("Backup: {} ({} rows)", spec.name, rows.len());
            writer.add_table(&schema, &rows)?;
        }
        Ok(writer.finish())
    }

    /// Encrypt a script and write it as `backup_YYYYMMDD_HHMMSS.sql.enc`.
    pub fn seal(&self, script: &str, created_at: DateTime<Utc>) -> Result<PathBuf> {
        let sealed = self.cipher.seal(script.as_bytes())?;
        std::fs::create_dir_all(&self.directory)?;

        let stamp = created_at.format("%Y%m%d_%H%M%S");
        let mut suffix = 0;
        loop {
            let name = if suffix == 0 {
                format!("backup_{}.{}", stamp, BACKUP_EXTENSION)
            } else {
                format!("backup_{}_{}.{}", stamp, suffix, BACKUP_EXTENSION)
            };
            let path = self.directory.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(&sealed)?;
                    file.sync_all()?;
                    info!("Backup written to {} ({} bytes)", path.display(), sealed.len());
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Decrypt a backup file back to its SQL script.
    pub fn restore(&self, path: &Path) -> Result<String> {
        let data = std::fs::read(path)?;
        let plaintext = self.cipher.open(&data)?;
        String::from_utf8(plaintext)
            .map_err(|_| SyncError::Decryption("decrypted backup is not valid UTF-8".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    const KEY: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    fn service(dir: &Path) -> BackupService {
        let cipher = BackupCipher::from_hex(&SecretString::from(KEY.to_string())).unwrap();
        BackupService::new(cipher, dir)
    }

    #[test]
    fn test_seal_restore_identity() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let script = "BEGIN;\nINSERT INTO t VALUES ('ñ');\nCOMMIT;\n";
        let path = svc.seal(script, Utc::now()).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("backup_"));
        assert!(name.ends_with(".sql.enc"));
        assert_eq!(svc.restore(&path).unwrap(), script);
    }

    #[test]
    fn test_same_second_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let now = Utc::now();
        let a = svc.seal("a", now).unwrap();
        let b = svc.seal("b", now).unwrap();
        assert_ne!(a, b);
        assert_eq!(svc.restore(&a).unwrap(), "a");
        assert_eq!(svc.restore(&b).unwrap(), "b");
    }

    #[test]
    fn test_restore_garbage_is_decryption_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup_x.sql.enc");
        std::fs::write(&path, b"plain text, not a backup at all").unwrap();
        let err = service(dir.path()).restore(&path).unwrap_err();
        assert!(matches!(err, SyncError::Decryption(_)));
        assert!(!err.is_retryable());
    }
}
