use std::path::{Component, Path, PathBuf};

use crate::sandbox::error::SandboxError;
use crate::sandbox::types::PutFileRequest;

/// Workspace directory of one local sandbox, with path containment for
/// bulk writes.
///
/// Guest paths are either absolute under the workspace (what the file
/// transport produces) or relative to it. Not a chroot: commands still see
/// the whole host filesystem.
pub struct FsJail {
    root: PathBuf,
}

impl FsJail {
    /// Create the workspace directory and jail it.
    pub fn create(root: PathBuf) -> Result<Self, SandboxError> {
        std::fs::create_dir_all(&root).map_err(|e| {
            SandboxError::Provision(format!(
                "failed to create workspace dir {}: {e}",
                root.display()
            ))
        })?;
        let root = root.canonicalize().unwrap_or(root);
        Ok(Self { root })
    }

    /// Jail an existing workspace. The directory may have disappeared;
    /// `exists()` tells the handle whether the sandbox is gone.
    pub fn attach(root: PathBuf) -> Self {
        let root = root.canonicalize().unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Map a guest path to a host path inside the workspace.
    pub fn resolve(&self, guest_path: &str) -> Result<PathBuf, SandboxError> {
        let guest = Path::new(guest_path);
        let relative = match guest.strip_prefix(&self.root) {
            Ok(rel) => rel,
            Err(_) => guest.strip_prefix("/").unwrap_or(guest),
        };

        let mut normalized = PathBuf::new();
        for component in relative.components() {
            match component {
                Component::Normal(seg) => normalized.push(seg),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(SandboxError::Exec(format!(
                            "path escapes workspace: {guest_path}"
                        )));
                    }
                }
                _ => {}
            }
        }

        if normalized.as_os_str().is_empty() {
            return Err(SandboxError::Exec(format!("not a file path: {guest_path}")));
        }
        Ok(self.root.join(normalized))
    }

    pub fn put_file(&self, req: &PutFileRequest) -> Result<(), SandboxError> {
        let path = self.resolve(&req.path)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &req.bytes)?;
        Ok(())
    }

    /// Remove the entire workspace directory.
    pub fn destroy(&self) -> Result<(), SandboxError> {
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }
}
