use std::collections::HashMap;
use std::io;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use parking_lot::RwLock;

use crate::FileSystem;

#[derive(Debug)]
enum InMemoryFileSystemEntry {
  File { contents: Vec<u8> },
  Directory,
}

/// In memory implementation of the `FileSystem` trait, for testing purposes.
#[derive(Debug)]
pub struct InMemoryFileSystem {
  files: RwLock<HashMap<PathBuf, InMemoryFileSystemEntry>>,
  current_working_directory: RwLock<PathBuf>,
}

impl Default for InMemoryFileSystem {
  fn default() -> Self {
    Self {
      files: Default::default(),
      current_working_directory: RwLock::new(PathBuf::from("/")),
    }
  }
}

impl InMemoryFileSystem {
  /// Change the current working directory. Used for resolving relative paths.
  pub fn set_current_working_directory(&self, cwd: &Path) {
    let cwd = self.normalize(cwd);
    *self.current_working_directory.write() = cwd;
  }

  /// Write a file at path, creating the parent directories as needed.
  pub fn write_file(&self, path: &Path, contents: String) {
    let path = self.normalize(path);
    let mut files = self.files.write();

    let mut dir = path.parent();
    while let Some(parent) = dir {
      files
        .entry(parent.to_path_buf())
        .or_insert(InMemoryFileSystemEntry::Directory);
      dir = parent.parent();
    }

    files.insert(
      path,
      InMemoryFileSystemEntry::File {
        contents: contents.into_bytes(),
      },
    );
  }

  fn normalize(&self, path: &Path) -> PathBuf {
    let cwd = self.current_working_directory.read();
    let mut result: Vec<Component<'_>> = if path.is_absolute() {
      vec![]
    } else {
      cwd.components().collect()
    };

    for component in path.components() {
      match component {
        Component::Prefix(prefix) => result = vec![Component::Prefix(prefix)],
        Component::RootDir => result.push(Component::RootDir),
        Component::CurDir => {}
        Component::ParentDir => {
          result.pop();
        }
        Component::Normal(part) => result.push(Component::Normal(part)),
      }
    }

    PathBuf::from_iter(result)
  }
}

impl FileSystem for InMemoryFileSystem {
  fn cwd(&self) -> io::Result<PathBuf> {
    Ok(self.current_working_directory.read().clone())
  }

  fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
    Ok(self.normalize(path))
  }

  fn create_dir_all(&self, path: &Path) -> io::Result<()> {
    let path = self.normalize(path);
    let mut files = self.files.write();
    for dir in path.ancestors() {
      files
        .entry(dir.to_path_buf())
        .or_insert(InMemoryFileSystemEntry::Directory);
    }
    Ok(())
  }

  fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
    let path = self.normalize(path);
    let files = self.files.read();
    match files.get(&path) {
      None => Err(io::Error::new(io::ErrorKind::NotFound, "File not found")),
      Some(InMemoryFileSystemEntry::File { contents }) => Ok(contents.clone()),
      Some(InMemoryFileSystemEntry::Directory) => Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        "Path is a directory",
      )),
    }
  }

  fn read_to_string(&self, path: &Path) -> io::Result<String> {
    let bytes = self.read(path)?;
    String::from_utf8(bytes).map_err(|_| io::Error::other("Unable to read file as string"))
  }

  fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
    let path = self.normalize(path);
    let mut files = self.files.write();
    if let Some(parent) = path.parent() {
      let is_root = parent.parent().is_none();
      if !is_root && !matches!(files.get(parent), Some(InMemoryFileSystemEntry::Directory)) {
        return Err(io::Error::new(
          io::ErrorKind::NotFound,
          "Parent directory does not exist",
        ));
      }
    }

    files.insert(
      path,
      InMemoryFileSystemEntry::File {
        contents: contents.to_vec(),
      },
    );
    Ok(())
  }

  fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
    let from = self.normalize(from);
    let to = self.normalize(to);
    let mut files = self.files.write();
    let entry = files
      .remove(&from)
      .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "File not found"))?;
    files.insert(to, entry);
    Ok(())
  }

  fn remove_file(&self, path: &Path) -> io::Result<()> {
    let path = self.normalize(path);
    let mut files = self.files.write();
    match files.get(&path) {
      Some(InMemoryFileSystemEntry::File { .. }) => {
        files.remove(&path);
        Ok(())
      }
      _ => Err(io::Error::new(io::ErrorKind::NotFound, "File not found")),
    }
  }

  fn is_file(&self, path: &Path) -> bool {
    let path = self.normalize(path);
    matches!(
      self.files.read().get(&path),
      Some(InMemoryFileSystemEntry::File { .. })
    )
  }

  fn is_dir(&self, path: &Path) -> bool {
    let path = self.normalize(path);
    matches!(
      self.files.read().get(&path),
      Some(InMemoryFileSystemEntry::Directory)
    )
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn test_reads_written_files() {
    let fs = InMemoryFileSystem::default();
    fs.write_file(&PathBuf::from("/foo/bar"), String::from("contents"));

    assert_eq!(
      fs.read_to_string(Path::new("/foo/bar")).unwrap(),
      String::from("contents")
    );
    assert!(fs.is_file(Path::new("/foo/bar")));
    assert!(fs.is_dir(Path::new("/foo")));
  }

  #[test]
  fn test_relative_paths_use_the_working_directory() {
    let fs = InMemoryFileSystem::default();
    fs.set_current_working_directory(Path::new("/foo"));
    fs.write_file(&PathBuf::from("bar"), String::from("contents"));

    assert_eq!(
      fs.read_to_string(Path::new("/foo/./baz/../bar")).unwrap(),
      String::from("contents")
    );
    assert_eq!(fs.canonicalize(Path::new("bar")).unwrap(), PathBuf::from("/foo/bar"));
  }

  #[test]
  fn test_write_requires_a_parent_directory() {
    let fs = InMemoryFileSystem::default();

    assert!(fs.write(Path::new("/missing/file"), b"x").is_err());

    fs.create_dir_all(Path::new("/missing")).unwrap();
    fs.write(Path::new("/missing/file"), b"x").unwrap();
    assert_eq!(fs.read(Path::new("/missing/file")).unwrap(), b"x".to_vec());
  }

  #[test]
  fn test_rename_and_remove() {
    let fs = InMemoryFileSystem::default();
    fs.write_file(&PathBuf::from("/a"), String::from("a"));

    fs.rename(Path::new("/a"), Path::new("/b")).unwrap();
    assert!(!fs.is_file(Path::new("/a")));
    assert!(fs.is_file(Path::new("/b")));

    fs.remove_file(Path::new("/b")).unwrap();
    assert!(fs.read(Path::new("/b")).is_err());
  }
}
