use std::path::{Component, Path, PathBuf};

use crate::error::{AgentError, Result};

/// Resolves tool-supplied paths against a workspace root.
///
/// `.` and `..` are folded lexically first. When confined, the longest
/// existing ancestor of the result is then canonicalized, so a symlink
/// inside the workspace cannot lead a tool outside it. A path that does not
/// exist yet (a file `edit_file` is about to create) is checked through its
/// nearest existing parent.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    confine: bool,
}

impl Workspace {
    pub fn new(root: impl AsRef<Path>, confine: bool) -> Result<Self> {
        let root = normalize(&std::path::absolute(root.as_ref())?);
        // A root that does not exist yet keeps its lexical form.
        let root = root.canonicalize().unwrap_or(root);
        Ok(Self { root, confine })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_confined(&self) -> bool {
        self.confine
    }

    /// Turn a tool path into an absolute path.  Fails when the workspace is
    /// confined and the path lands outside the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let requested = Path::new(path);
        let joined = if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            self.root.join(requested)
        };
        let resolved = normalize(&joined);

        if !self.confine {
            return Ok(resolved);
        }

        let real = real_path(&resolved)?;
        if !real.starts_with(&self.root) {
            return Err(AgentError::PathOutsideWorkspace(path.to_string()));
        }
        Ok(real)
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Canonicalize the longest existing ancestor of an already normalized path
/// and re-append the missing tail.
///
/// `symlink_metadata` stops at a dangling link, whose canonicalization then
/// fails instead of letting a write follow it.
fn real_path(path: &Path) -> Result<PathBuf> {
    let mut existing = path;
    let mut missing = Vec::new();
    while std::fs::symlink_metadata(existing).is_err() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }

    let mut real = existing.canonicalize()?;
    for name in missing.iter().rev() {
        real.push(name);
    }
    Ok(real)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_join_root() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path(), true).unwrap();
        assert_eq!(ws.resolve("a.txt").unwrap(), ws.root().join("a.txt"));
        assert_eq!(
            ws.resolve("./docs/../b.txt").unwrap(),
            ws.root().join("b.txt")
        );
        assert_eq!(ws.resolve(".").unwrap(), ws.root());
        assert_eq!(
            ws.resolve("new/dir/c.txt").unwrap(),
            ws.root().join("new/dir/c.txt")
        );
    }

    #[test]
    fn escapes_rejected_when_confined() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("work/inner")).unwrap();
        let ws = Workspace::new(dir.path().join("work"), true).unwrap();

        assert!(matches!(
            ws.resolve("../secret"),
            Err(AgentError::PathOutsideWorkspace(_))
        ));
        assert!(ws.resolve("/etc/passwd").is_err());
        let sibling = format!("{}shop/x", ws.root().display());
        assert!(ws.resolve(&sibling).is_err());
        let inner = ws.root().join("inner/x");
        assert!(ws.resolve(&inner.to_string_lossy()).is_ok());
    }

    #[test]
    fn escapes_allowed_when_not_confined() {
        let ws = Workspace::new("/srv/work", false).unwrap();
        assert_eq!(ws.resolve("../other").unwrap(), PathBuf::from("/srv/other"));
        assert!(!ws.is_confined());
    }

    #[test]
    fn relative_root_becomes_absolute() {
        let ws = Workspace::new(".", true).unwrap();
        assert!(ws.root().is_absolute());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_out_of_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ws");
        let outside = dir.path().join("outside");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::write(outside.join("secret.txt"), "TOP SECRET").unwrap();
        std::os::unix::fs::symlink(&outside, root.join("link")).unwrap();
        let ws = Workspace::new(&root, true).unwrap();

        // Existing file behind the link.
        assert!(matches!(
            ws.resolve("link/secret.txt"),
            Err(AgentError::PathOutsideWorkspace(_))
        ));
        // New file behind the link.
        assert!(matches!(
            ws.resolve("link/new/pwned.txt"),
            Err(AgentError::PathOutsideWorkspace(_))
        ));
        // The link itself.
        assert!(ws.resolve("link").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_within_root_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("alias")).unwrap();
        let ws = Workspace::new(dir.path(), true).unwrap();

        assert_eq!(
            ws.resolve("alias/notes.txt").unwrap(),
            ws.root().join("real/notes.txt")
        );
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ws");
        std::fs::create_dir_all(&root).unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing.txt"), root.join("dangling")).unwrap();
        let ws = Workspace::new(&root, true).unwrap();

        assert!(ws.resolve("dangling").is_err());
    }
}
