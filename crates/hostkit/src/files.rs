//! Filesystem collaborator - files and directories with owner, group,
//! permission bits and content
//!
//! Probing is strictly read-only; ensure functions perform the minimal
//! mutation and report whether anything changed. Owner and group are
//! optional: unset means that dimension of the file is unmanaged.

use crate::error::{Error, Result};
use converge::{Content, Ensure, Mode};
use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt, chown};
use std::path::Path;
use std::process::Command;
use walkdir::WalkDir;

/// Declared owner/group for a filesystem object. `None` fields are left
/// alone on disk.
#[derive(Debug, Clone, Default)]
pub struct Ownership {
    pub owner: Option<String>,
    pub group: Option<String>,
}

impl Ownership {
    pub fn new(owner: Option<String>, group: Option<String>) -> Self {
        Self { owner, group }
    }

    fn is_managed(&self) -> bool {
        self.owner.is_some() || self.group.is_some()
    }

    /// Resolve names to ids once, up front; mutation uses the resolved pair.
    fn resolve(&self) -> Result<(Option<u32>, Option<u32>)> {
        let uid = self.owner.as_deref().map(lookup_id("passwd")).transpose()?;
        let gid = self.group.as_deref().map(lookup_id("group")).transpose()?;
        Ok((uid, gid))
    }

    fn mismatches(&self, meta: &fs::Metadata) -> Result<Vec<String>> {
        let mut reasons = Vec::new();
        let (uid, gid) = self.resolve()?;
        if let Some(uid) = uid
            && meta.uid() != uid
        {
            reasons.push(format!("owner is uid {}, want {uid}", meta.uid()));
        }
        if let Some(gid) = gid
            && meta.gid() != gid
        {
            reasons.push(format!("group is gid {}, want {gid}", meta.gid()));
        }
        Ok(reasons)
    }
}

/// Name-to-id lookup through `getent`; both passwd and group lines carry the
/// numeric id in the third field.
fn lookup_id(database: &'static str) -> impl Fn(&str) -> Result<u32> {
    move |name: &str| {
        let output = Command::new("getent").args([database, name]).output()?;
        if !output.status.success() {
            return Err(Error::UnknownPrincipal(name.to_string()));
        }
        String::from_utf8_lossy(&output.stdout)
            .trim()
            .split(':')
            .nth(2)
            .and_then(|field| field.parse().ok())
            .ok_or_else(|| Error::UnknownPrincipal(name.to_string()))
    }
}

fn mode_mismatch(meta: &fs::Metadata, mode: Option<Mode>) -> Option<String> {
    let want = mode?;
    let have = meta.permissions().mode() & 0o7777;
    (have != want.bits()).then(|| format!("mode is {have:04o}, want {want}"))
}

/// Compare a file against its declaration. Empty vec means in sync.
pub fn probe_file(
    path: &Path,
    ensure: Ensure,
    ownership: &Ownership,
    mode: Option<Mode>,
    content: Option<&Content>,
) -> Result<Vec<String>> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(_) => {
            return Ok(match ensure {
                Ensure::Present => vec!["file does not exist".to_string()],
                Ensure::Absent => Vec::new(),
            });
        }
    };

    if ensure == Ensure::Absent {
        return Ok(vec!["file exists, want absent".to_string()]);
    }
    if !meta.is_file() {
        return Ok(vec!["exists but is not a regular file".to_string()]);
    }

    let mut reasons = Vec::new();
    if let Some(content) = content {
        let body = fs::read_to_string(path)
            .map_err(|e| Error::fs(path, format!("read failed: {e}")))?;
        if !content.is_satisfied_by(&body) {
            reasons.push("content differs".to_string());
        }
    }
    reasons.extend(mode_mismatch(&meta, mode));
    reasons.extend(ownership.mismatches(&meta)?);
    Ok(reasons)
}

/// Converge a file to its declaration. Returns whether anything changed.
pub fn ensure_file(
    path: &Path,
    ensure: Ensure,
    ownership: &Ownership,
    mode: Option<Mode>,
    content: Option<&Content>,
) -> Result<bool> {
    if ensure == Ensure::Absent {
        if fs::metadata(path).is_ok() {
            fs::remove_file(path).map_err(|e| Error::fs(path, format!("remove failed: {e}")))?;
            log::debug!("removed {}", path.display());
            return Ok(true);
        }
        return Ok(false);
    }

    let reasons = probe_file(path, ensure, ownership, mode, content)?;
    if reasons.is_empty() {
        return Ok(false);
    }

    let missing = fs::metadata(path).is_err();
    let content_differs = reasons.iter().any(|r| r == "content differs");
    if missing || content_differs {
        match content {
            Some(Content::Exact(body)) => {
                fs::write(path, body).map_err(|e| Error::fs(path, format!("write failed: {e}")))?;
            }
            Some(Content::Matches(_)) => {
                // A pattern can verify content but not produce it.
                return Err(Error::fs(
                    path,
                    "content pattern does not match and cannot be synthesized; declare exact content",
                ));
            }
            None => {
                if missing {
                    fs::write(path, "").map_err(|e| Error::fs(path, format!("create failed: {e}")))?;
                }
            }
        }
    }

    let meta = fs::metadata(path).map_err(|e| Error::fs(path, format!("stat failed: {e}")))?;
    if let Some(want) = mode
        && meta.permissions().mode() & 0o7777 != want.bits()
    {
        fs::set_permissions(path, fs::Permissions::from_mode(want.bits()))
            .map_err(|e| Error::fs(path, format!("chmod failed: {e}")))?;
    }
    apply_ownership(path, ownership, &meta)?;

    log::debug!("converged {}", path.display());
    Ok(true)
}

fn apply_ownership(path: &Path, ownership: &Ownership, meta: &fs::Metadata) -> Result<()> {
    if !ownership.is_managed() {
        return Ok(());
    }
    let (uid, gid) = ownership.resolve()?;
    let uid_differs = uid.is_some_and(|u| meta.uid() != u);
    let gid_differs = gid.is_some_and(|g| meta.gid() != g);
    if uid_differs || gid_differs {
        chown(path, uid, gid).map_err(|e| Error::fs(path, format!("chown failed: {e}")))?;
    }
    Ok(())
}

/// Compare a directory against its declaration. Empty vec means in sync.
pub fn probe_dir(
    path: &Path,
    ownership: &Ownership,
    mode: Option<Mode>,
    recurse: bool,
) -> Result<Vec<String>> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(_) => return Ok(vec!["directory does not exist".to_string()]),
    };
    if !meta.is_dir() {
        return Ok(vec!["exists but is not a directory".to_string()]);
    }

    let mut reasons = Vec::new();
    reasons.extend(mode_mismatch(&meta, mode));
    reasons.extend(ownership.mismatches(&meta)?);

    if recurse && ownership.is_managed() {
        let wrong = walk_ownership_mismatches(path, ownership)?;
        if wrong > 0 {
            reasons.push(format!("{wrong} entries under tree with wrong ownership"));
        }
    }
    Ok(reasons)
}

/// Converge a directory to its declaration. Returns whether anything
/// changed. An already-correct directory is never re-created.
pub fn ensure_dir(
    path: &Path,
    ownership: &Ownership,
    mode: Option<Mode>,
    recurse: bool,
) -> Result<bool> {
    let mut changed = false;

    if fs::metadata(path).is_err() {
        fs::create_dir_all(path).map_err(|e| Error::fs(path, format!("mkdir failed: {e}")))?;
        log::debug!("created {}", path.display());
        changed = true;
    }

    let meta = fs::metadata(path).map_err(|e| Error::fs(path, format!("stat failed: {e}")))?;
    if !meta.is_dir() {
        return Err(Error::fs(path, "exists but is not a directory"));
    }

    if let Some(want) = mode
        && meta.permissions().mode() & 0o7777 != want.bits()
    {
        fs::set_permissions(path, fs::Permissions::from_mode(want.bits()))
            .map_err(|e| Error::fs(path, format!("chmod failed: {e}")))?;
        changed = true;
    }

    if ownership.is_managed() {
        let (uid, gid) = ownership.resolve()?;
        let uid_differs = uid.is_some_and(|u| meta.uid() != u);
        let gid_differs = gid.is_some_and(|g| meta.gid() != g);
        if uid_differs || gid_differs {
            chown(path, uid, gid).map_err(|e| Error::fs(path, format!("chown failed: {e}")))?;
            changed = true;
        }
        if recurse {
            changed |= enforce_tree_ownership(path, uid, gid)?;
        }
    }

    Ok(changed)
}

fn walk_ownership_mismatches(path: &Path, ownership: &Ownership) -> Result<usize> {
    let (uid, gid) = ownership.resolve()?;
    let mut wrong = 0;
    for entry in WalkDir::new(path).min_depth(1) {
        let entry = entry.map_err(|e| Error::fs(path, format!("walk failed: {e}")))?;
        let meta = entry
            .metadata()
            .map_err(|e| Error::fs(entry.path(), format!("stat failed: {e}")))?;
        if uid.is_some_and(|u| meta.uid() != u) || gid.is_some_and(|g| meta.gid() != g) {
            wrong += 1;
        }
    }
    Ok(wrong)
}

fn enforce_tree_ownership(path: &Path, uid: Option<u32>, gid: Option<u32>) -> Result<bool> {
    let mut changed = false;
    for entry in WalkDir::new(path).min_depth(1) {
        let entry = entry.map_err(|e| Error::fs(path, format!("walk failed: {e}")))?;
        let meta = entry
            .metadata()
            .map_err(|e| Error::fs(entry.path(), format!("stat failed: {e}")))?;
        if uid.is_some_and(|u| meta.uid() != u) || gid.is_some_and(|g| meta.gid() != g) {
            chown(entry.path(), uid, gid)
                .map_err(|e| Error::fs(entry.path(), format!("chown failed: {e}")))?;
            changed = true;
        }
    }
    Ok(changed)
}
