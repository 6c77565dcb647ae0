//! On-disk persistence for stacks.
//!
//! Layout under `<git_dir>/stacks/`: one `<name>.yaml` per stack plus a
//! `current` marker file naming the active stack. Saves replace the file via
//! a synced temporary in the same directory, so a crashed write leaves the
//! previous file intact.

use super::stack::Stack;
use crate::errors::{Error, Result};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::debug;

const STACKS_DIR: &str = "stacks";
const CURRENT_FILE: &str = "current";
const STACK_EXTENSION: &str = "yaml";

/// Filesystem store rooted at the repository's git directory.
#[derive(Debug, Clone)]
pub struct Store {
    git_dir: PathBuf,
}

impl Store {
    pub fn new(git_dir: impl Into<PathBuf>) -> Self {
        Self {
            git_dir: git_dir.into(),
        }
    }

    fn stacks_path(&self) -> PathBuf {
        self.git_dir.join(STACKS_DIR)
    }

    fn stack_path(&self, name: &str) -> PathBuf {
        self.stacks_path().join(format!("{name}.{STACK_EXTENSION}"))
    }

    fn current_path(&self) -> PathBuf {
        self.stacks_path().join(CURRENT_FILE)
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(self.stacks_path())?;
        Ok(())
    }

    /// Persist a stack, atomically replacing any previous file.
    pub fn save(&self, stack: &Stack) -> Result<()> {
        self.ensure_dir()?;
        let data = serde_yaml::to_string(stack)?;

        let mut tmp = NamedTempFile::new_in(self.stacks_path())?;
        tmp.write_all(data.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.stack_path(&stack.name))
            .map_err(|e| Error::Io(e.error))?;

        debug!("saved stack '{}'", stack.name);
        Ok(())
    }

    /// Read a stack from disk. A missing file is a distinct not-found error.
    pub fn load(&self, name: &str) -> Result<Stack> {
        let data = match fs::read_to_string(self.stack_path(name)) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::not_found(format!("stack '{name}' not found")));
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_yaml::from_str(&data)?)
    }

    /// Remove a stack file. Deleting the current stack clears the pointer.
    pub fn delete(&self, name: &str) -> Result<()> {
        match fs::remove_file(self.stack_path(name)) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::not_found(format!("stack '{name}' not found")));
            }
            Err(err) => return Err(err.into()),
        }

        if self.current_name()?.as_deref() == Some(name) {
            self.clear_current()?;
        }
        Ok(())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.stack_path(name).is_file()
    }

    /// Names of all stacks in the repository, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(self.stacks_path()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(name) = file_name.strip_suffix(&format!(".{STACK_EXTENSION}")) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Mark a stack as current. The stack must exist.
    pub fn set_current(&self, name: &str) -> Result<()> {
        self.ensure_dir()?;
        if !self.exists(name) {
            return Err(Error::not_found(format!("stack '{name}' not found")));
        }
        fs::write(self.current_path(), name)?;
        Ok(())
    }

    pub fn clear_current(&self) -> Result<()> {
        match fs::remove_file(self.current_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Name of the current stack, if one is set.
    pub fn current_name(&self) -> Result<Option<String>> {
        match fs::read_to_string(self.current_path()) {
            Ok(data) => {
                let name = data.trim().to_string();
                Ok(if name.is_empty() { None } else { Some(name) })
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Load the current stack, failing when no stack is active.
    pub fn load_current(&self) -> Result<Stack> {
        match self.current_name()? {
            Some(name) => self.load(&name),
            None => Err(Error::state(
                "no active stack; run 'stk init <name>' or 'stk switch <name>'",
            )),
        }
    }

    /// Rename a stack, replacing its file and following the current pointer.
    pub fn rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        if !self.exists(old_name) {
            return Err(Error::not_found(format!("stack '{old_name}' not found")));
        }
        if self.exists(new_name) {
            return Err(Error::conflict(format!("stack '{new_name}' already exists")));
        }

        let mut stack = self.load(old_name)?;
        stack.name = new_name.to_string();
        stack.touch();
        self.save(&stack)?;
        fs::remove_file(self.stack_path(old_name))?;

        if self.current_name()?.as_deref() == Some(old_name) {
            self.set_current(new_name)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::stack::StackBranch;
    use tempfile::TempDir;

    fn store() -> (TempDir, Store) {
        let tmp = TempDir::new().unwrap();
        let store = Store::new(tmp.path());
        (tmp, store)
    }

    #[test]
    fn test_save_load_round_trip() {
        let (_tmp, store) = store();
        let mut stack = Stack::new("demo", "main");
        stack.branches.push(StackBranch::new("feat-a"));
        store.save(&stack).unwrap();

        let loaded = store.load("demo").unwrap();
        assert_eq!(loaded, stack);
    }

    #[test]
    fn test_missing_stack_is_not_found() {
        let (_tmp, store) = store();
        let err = store.load("ghost").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_current_pointer_lifecycle() {
        let (_tmp, store) = store();
        assert_eq!(store.current_name().unwrap(), None);

        let stack = Stack::new("one", "main");
        store.save(&stack).unwrap();
        store.set_current("one").unwrap();
        assert_eq!(store.current_name().unwrap().as_deref(), Some("one"));

        // pointing at an unknown stack is refused
        let err = store.set_current("ghost").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        store.clear_current().unwrap();
        assert_eq!(store.current_name().unwrap(), None);
    }

    #[test]
    fn test_delete_clears_current_pointer() {
        let (_tmp, store) = store();
        store.save(&Stack::new("one", "main")).unwrap();
        store.save(&Stack::new("two", "main")).unwrap();
        store.set_current("one").unwrap();

        store.delete("one").unwrap();
        assert_eq!(store.current_name().unwrap(), None);
        assert!(store.exists("two"));
    }

    #[test]
    fn test_delete_keeps_unrelated_pointer() {
        let (_tmp, store) = store();
        store.save(&Stack::new("one", "main")).unwrap();
        store.save(&Stack::new("two", "main")).unwrap();
        store.set_current("one").unwrap();

        store.delete("two").unwrap();
        assert_eq!(store.current_name().unwrap().as_deref(), Some("one"));
    }

    #[test]
    fn test_list_is_sorted_and_skips_marker() {
        let (_tmp, store) = store();
        store.save(&Stack::new("bravo", "main")).unwrap();
        store.save(&Stack::new("alpha", "main")).unwrap();
        store.set_current("alpha").unwrap();

        assert_eq!(store.list().unwrap(), vec!["alpha", "bravo"]);
    }

    #[test]
    fn test_rename_round_trip_preserves_contents() {
        let (tmp, store) = store();
        let mut stack = Stack::new("orig", "main");
        stack.branches.push(StackBranch::new("feat-a"));
        store.save(&stack).unwrap();
        store.set_current("orig").unwrap();
        let before = std::fs::read_to_string(tmp.path().join("stacks/orig.yaml")).unwrap();

        store.rename("orig", "renamed").unwrap();
        assert!(!store.exists("orig"));
        assert_eq!(store.current_name().unwrap().as_deref(), Some("renamed"));

        store.rename("renamed", "orig").unwrap();
        let after = std::fs::read_to_string(tmp.path().join("stacks/orig.yaml")).unwrap();

        // identical except the updated timestamp
        let strip = |s: &str| {
            s.lines()
                .filter(|l| !l.starts_with("updated:"))
                .collect::<Vec<_>>()
                .join("\n")
        };
        assert_eq!(strip(&before), strip(&after));
    }

    #[test]
    fn test_rename_to_existing_conflicts() {
        let (_tmp, store) = store();
        store.save(&Stack::new("one", "main")).unwrap();
        store.save(&Stack::new("two", "main")).unwrap();

        let err = store.rename("one", "two").unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn test_load_current_without_pointer_is_state_error() {
        let (_tmp, store) = store();
        let err = store.load_current().unwrap_err();
        assert!(matches!(err, Error::State(_)));
    }
}
