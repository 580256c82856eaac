use std::{
    fs,
    io::{self, Write},
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    str::FromStr,
};
use tenant_ingress_core::{FileActivator, FragmentLayout, Swapped};
use tracing::debug;

/// Activates fragments on the local filesystem.
///
/// Fragments are staged as hidden temporary files next to their target, so that the swap is a
/// same-directory `rename(2)`: the proxy sees either the old file or the new one, never a partial
/// write. Staged names don't carry the fragment extension and are ignored by the proxy's include
/// globs.
#[derive(Clone, Debug)]
pub struct FsActivator {
    mode: u32,
    owner: Option<Owner>,
}

/// A fragment written to a temporary file beside its target.
///
/// Dropping it without swapping deletes the temporary file.
#[derive(Debug)]
pub struct Staged {
    target: PathBuf,
    temp: tempfile::TempPath,
}

/// A `uid:gid` pair applied to every activated fragment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Owner {
    pub uid: u32,
    pub gid: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid owner {0:?}: expected <uid>:<gid>")]
pub struct InvalidOwner(String);

// === impl FsActivator ===

impl FsActivator {
    pub fn new(mode: u32, owner: Option<Owner>) -> Self {
        Self { mode, owner }
    }

    fn write_temp(&self, target: &Path, contents: &[u8]) -> io::Result<tempfile::TempPath> {
        let dir = match target.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = tempfile::Builder::new()
            .prefix(".")
            .suffix(".staged")
            .tempfile_in(dir)?;
        file.write_all(contents)?;
        file.as_file().sync_all()?;
        let temp = file.into_temp_path();

        fs::set_permissions(&temp, fs::Permissions::from_mode(self.mode))?;
        if let Some(Owner { uid, gid }) = self.owner {
            std::os::unix::fs::chown(&temp, Some(uid), Some(gid))?;
        }
        Ok(temp)
    }
}

impl FileActivator for FsActivator {
    type Staged = Staged;

    fn read(&self, path: &Path) -> io::Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_file() && FragmentLayout::is_fragment(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn stage(&self, target: &Path, contents: &str) -> io::Result<Staged> {
        let temp = self.write_temp(target, contents.as_bytes())?;
        debug!(temp = %temp.display(), "Staged fragment");
        Ok(Staged {
            target: target.to_path_buf(),
            temp,
        })
    }

    fn swap(&self, Staged { target, temp }: Staged) -> io::Result<Swapped> {
        let previous = match fs::read(&target) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };
        temp.persist(&target)?;
        Ok(Swapped { target, previous })
    }

    fn rollback(&self, Swapped { target, previous }: Swapped) -> io::Result<()> {
        match previous {
            Some(bytes) => {
                self.write_temp(&target, &bytes)?.persist(&target)?;
            }
            None => {
                self.remove(&target)?;
            }
        }
        Ok(())
    }

    fn remove(&self, path: &Path) -> io::Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

// === impl Owner ===

impl FromStr for Owner {
    type Err = InvalidOwner;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidOwner(s.to_string());
        let (uid, gid) = s.split_once(':').ok_or_else(invalid)?;
        Ok(Self {
            uid: uid.parse().map_err(|_| invalid())?,
            gid: gid.parse().map_err(|_| invalid())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn listing(dir: &Path) -> BTreeMap<String, Vec<u8>> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| {
                let path = e.unwrap().path();
                let name = path.file_name().unwrap().to_string_lossy().into_owned();
                (name, fs::read(&path).unwrap())
            })
            .collect()
    }

    #[test]
    fn swap_sets_mode_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("8042.conf");
        let files = FsActivator::new(0o640, None);

        let staged = files.stage(&target, "upstream tcp_8042 {}\n").unwrap();
        assert!(!target.exists());
        assert_eq!(files.list(dir.path()).unwrap(), Vec::<PathBuf>::new());

        let swapped = files.swap(staged).unwrap();
        assert_eq!(swapped.previous, None);
        assert_eq!(
            fs::read_to_string(&target).unwrap(),
            "upstream tcp_8042 {}\n"
        );
        let mode = fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
        assert_eq!(listing(dir.path()).len(), 1);
    }

    #[test]
    fn dropped_stage_is_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let files = FsActivator::new(0o644, None);
        let staged = files.stage(&dir.path().join("8042.conf"), "x").unwrap();
        drop(staged);
        assert!(listing(dir.path()).is_empty());
    }

    #[test]
    fn rollback_restores_previous_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("8042.conf");
        fs::write(&target, "old").unwrap();
        fs::write(dir.path().join("7000.conf"), "other").unwrap();
        let before = listing(dir.path());
        let files = FsActivator::new(0o644, None);

        let swapped = files.swap(files.stage(&target, "new").unwrap()).unwrap();
        assert_eq!(swapped.previous.as_deref(), Some(&b"old"[..]));
        assert_eq!(fs::read_to_string(&target).unwrap(), "new");

        files.rollback(swapped).unwrap();
        assert_eq!(listing(dir.path()), before);
    }

    #[test]
    fn rollback_removes_created_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("8042.conf");
        let files = FsActivator::new(0o644, None);

        let swapped = files.swap(files.stage(&target, "new").unwrap()).unwrap();
        files.rollback(swapped).unwrap();
        assert!(listing(dir.path()).is_empty());
    }

    #[test]
    fn read_list_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("9000.conf"), "b").unwrap();
        fs::write(dir.path().join("8042.conf"), "a").unwrap();
        fs::write(dir.path().join("README"), "ignored").unwrap();
        fs::create_dir(dir.path().join("nested.conf")).unwrap();
        let files = FsActivator::new(0o644, None);

        assert_eq!(
            files.list(dir.path()).unwrap(),
            [dir.path().join("8042.conf"), dir.path().join("9000.conf")]
        );
        assert_eq!(
            files.read(&dir.path().join("8042.conf")).unwrap().as_deref(),
            Some("a")
        );
        assert_eq!(files.read(&dir.path().join("1.conf")).unwrap(), None);
        assert!(files.remove(&dir.path().join("8042.conf")).unwrap());
        assert!(!files.remove(&dir.path().join("8042.conf")).unwrap());
        assert!(files.list(&dir.path().join("missing")).unwrap().is_empty());
    }

    #[test]
    fn parse_owner() {
        assert_eq!(
            "101:102".parse::<Owner>().unwrap(),
            Owner { uid: 101, gid: 102 }
        );
        assert!("nginx".parse::<Owner>().is_err());
        assert!("101:".parse::<Owner>().is_err());
        assert!("a:b".parse::<Owner>().is_err());
    }
}
