use std::path::Path;
use std::path::PathBuf;

use crate::FileSystem;

/// Walk up from `from` looking for the first directory that holds one of `filenames`.
///
/// The search stops once `root` has been checked.
pub fn find_ancestor_file<P: AsRef<Path>>(
  fs: &dyn FileSystem,
  filenames: &[&str],
  from: P,
  root: P,
) -> Option<PathBuf> {
  let root = root.as_ref();

  for dir in from.as_ref().ancestors() {
    for name in filenames {
      let candidate = dir.join(name);
      if fs.is_file(&candidate) {
        return Some(candidate);
      }
    }

    if dir == root {
      break;
    }
  }

  None
}
