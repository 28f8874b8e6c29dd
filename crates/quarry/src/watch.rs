use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

/// A file system change reported by a watcher
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "type", content = "path", rename_all = "lowercase")]
pub enum WatchEvent {
  Create(PathBuf),
  Update(PathBuf),
  Delete(PathBuf),
}

impl WatchEvent {
  pub fn path(&self) -> &Path {
    match self {
      WatchEvent::Create(path) | WatchEvent::Update(path) | WatchEvent::Delete(path) => path,
    }
  }
}

pub type WatchEvents = Vec<WatchEvent>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_watch_events_deserialize_from_watcher_json() {
    let events: WatchEvents = serde_json::from_str(
      r#"[{ "type": "update", "path": "/app/a.js" }, { "type": "delete", "path": "/app/b.js" }]"#,
    )
    .unwrap();

    assert_eq!(
      events,
      vec![
        WatchEvent::Update(PathBuf::from("/app/a.js")),
        WatchEvent::Delete(PathBuf::from("/app/b.js")),
      ]
    );
    assert_eq!(events[1].path(), Path::new("/app/b.js"));
  }
}
