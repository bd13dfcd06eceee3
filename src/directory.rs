//! Directory and path operations (spec.md §4.4): `MKD`, `RMD`, `DELE`,
//! `RNFR`/`RNTO`, `MFMT`, and `SITE CHMOD`.

use crate::client::FtpClient;
use crate::error::{FtpError, FtpResult};
use crate::types::{DirectoryEntry, EntryKind, ListingMethod};

impl FtpClient {
    /// `MKD` — create a single directory segment.
    pub async fn make_directory(&mut self, path: &str) -> FtpResult<()> {
        self.enter_busy()?;
        let resp = self.exec("MKD", Some(path)).await;
        let result = match resp {
            Ok(resp) if resp.is_success() => Ok(()),
            Ok(resp) => Err(FtpError::from_response(&resp)),
            Err(e) => Err(e),
        };
        self.exit_busy();
        result
    }

    /// Create every missing segment of `path`. A `CWD` into a segment
    /// that already exists is treated as success; only a failing `MKD`
    /// on a genuinely missing segment is fatal.
    pub async fn make_directory_all(&mut self, path: &str) -> FtpResult<()> {
        self.enter_busy()?;
        let result = self.make_directory_all_inner(path).await;
        self.exit_busy();
        result
    }

    async fn make_directory_all_inner(&mut self, path: &str) -> FtpResult<()> {
        let origin = self.current_directory.clone();
        if path.starts_with('/') {
            self.exec("CWD", Some("/")).await.ok();
        }
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let cwd = self.exec("CWD", Some(segment)).await?;
            if !cwd.is_success() {
                let mkd = self.exec("MKD", Some(segment)).await?;
                if !mkd.is_success() {
                    self.exec("CWD", Some(&origin)).await.ok();
                    return Err(FtpError::from_response(&mkd));
                }
                let cwd2 = self.exec("CWD", Some(segment)).await?;
                if !cwd2.is_success() {
                    self.exec("CWD", Some(&origin)).await.ok();
                    return Err(FtpError::from_response(&cwd2));
                }
            }
        }
        self.exec("CWD", Some(&origin)).await.ok();
        if let Ok(Some(pwd)) = self.refresh_pwd().await {
            self.current_directory = pwd;
        }
        Ok(())
    }

    /// `RMD` — remove a single, empty directory.
    pub async fn delete_directory(&mut self, path: &str) -> FtpResult<()> {
        self.enter_busy()?;
        let resp = self.exec("RMD", Some(path)).await;
        let result = match resp {
            Ok(resp) if resp.is_success() => Ok(()),
            Ok(resp) => Err(FtpError::from_response(&resp)),
            Err(e) => Err(e),
        };
        self.exit_busy();
        result
    }

    /// Recursively empty and remove `path`: list its children, delete
    /// files and recurse into subdirectories, then `RMD` the now-empty
    /// directory itself.
    pub async fn delete_directory_recursive(&mut self, path: &str) -> FtpResult<()> {
        self.enter_busy()?;
        let result = self.delete_directory_recursive_inner(path).await;
        self.exit_busy();
        result
    }

    async fn delete_directory_recursive_inner(&mut self, path: &str) -> FtpResult<()> {
        let listing = self
            .get_dir_list_inner(Some(path), ListingMethod::Automatic)
            .await?;
        for entry in listing.entries {
            let child = format!("{}/{}", path.trim_end_matches('/'), entry.name());
            match entry.kind() {
                EntryKind::Dir => {
                    Box::pin(self.delete_directory_recursive_inner(&child)).await?;
                }
                _ => {
                    let resp = self.exec("DELE", Some(&child)).await?;
                    if !resp.is_success() {
                        return Err(FtpError::from_response(&resp));
                    }
                }
            }
        }
        let resp = self.exec("RMD", Some(path)).await?;
        if resp.is_success() {
            Ok(())
        } else {
            Err(FtpError::from_response(&resp))
        }
    }

    /// `DELE` — remove a single file.
    pub async fn delete_file(&mut self, path: &str) -> FtpResult<()> {
        self.enter_busy()?;
        let resp = self.exec("DELE", Some(path)).await;
        let result = match resp {
            Ok(resp) if resp.is_success() => Ok(()),
            Ok(resp) => Err(FtpError::from_response(&resp)),
            Err(e) => Err(e),
        };
        self.exit_busy();
        result
    }

    /// `RNFR` + `RNTO`.
    pub async fn rename(&mut self, from: &str, to: &str) -> FtpResult<()> {
        self.enter_busy()?;
        let result = self.rename_inner(from, to).await;
        self.exit_busy();
        result
    }

    async fn rename_inner(&mut self, from: &str, to: &str) -> FtpResult<()> {
        let resp = self.exec("RNFR", Some(from)).await?;
        if resp.code != Some(350) && !resp.is_success() {
            return Err(FtpError::from_response(&resp));
        }
        let resp = self.exec("RNTO", Some(to)).await?;
        if resp.is_success() {
            Ok(())
        } else {
            Err(FtpError::from_response(&resp))
        }
    }

    /// `MLST` for a single path, as a typed `DirectoryEntry`. Kept under
    /// the directory-ops vocabulary for parity with `make_directory` /
    /// `delete_directory` / `rename`; delegates to `get_file_info`.
    pub async fn stat_entry(&mut self, path: &str) -> FtpResult<DirectoryEntry> {
        self.get_file_info(path).await
    }

    /// `MFMT` — set a remote file's modification timestamp (RFC-draft,
    /// widely supported alongside MLSx).
    pub async fn set_modified(
        &mut self,
        path: &str,
        when: chrono::DateTime<chrono::Utc>,
    ) -> FtpResult<()> {
        self.enter_busy()?;
        let result = self.set_modified_inner(path, when).await;
        self.exit_busy();
        result
    }

    async fn set_modified_inner(
        &mut self,
        path: &str,
        when: chrono::DateTime<chrono::Utc>,
    ) -> FtpResult<()> {
        if !self.get_features().mfmt() {
            return Err(FtpError::CommandNotSupported {
                command: "MFMT".into(),
                last_response: None,
            });
        }
        let stamp = when.format("%Y%m%d%H%M%S").to_string();
        let args = format!("{} {}", stamp, path);
        let resp = self.exec("MFMT", Some(&args)).await?;
        if resp.is_success() {
            Ok(())
        } else {
            Err(FtpError::from_response(&resp))
        }
    }

    /// `SITE CHMOD mode path` — POSIX permission change, Unix servers only.
    pub async fn chmod(&mut self, path: &str, mode: &str) -> FtpResult<()> {
        self.enter_busy()?;
        let args = format!("CHMOD {} {}", mode, path);
        let resp = self.exec("SITE", Some(&args)).await;
        let result = match resp {
            Ok(resp) if resp.is_success() => Ok(()),
            Ok(resp) => Err(FtpError::from_response(&resp)),
            Err(e) => Err(e),
        };
        self.exit_busy();
        result
    }
}
