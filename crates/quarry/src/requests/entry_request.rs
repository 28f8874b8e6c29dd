use std::hash::Hash;
use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use quarry_core::diagnostic_error;
use quarry_core::types::DiagnosticBuilder;
use quarry_core::types::Entry;
use quarry_core::types::ErrorKind;
use quarry_core::types::Invalidation;
use quarry_filesystem::search::find_ancestor_file;
use serde::Deserialize;

use super::RequestResult;

use crate::request_tracker::Request;
use crate::request_tracker::ResultAndInvalidations;
use crate::request_tracker::RunRequestContext;
use crate::request_tracker::RunRequestError;

/// The EntryRequest resolves an entry specifier to the files it stands for
#[derive(Debug, Hash)]
pub struct EntryRequest {
  pub entry: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntryRequestOutput {
  pub entries: Vec<Entry>,
}

#[derive(Debug, Default, Deserialize)]
struct PackageJson {
  #[serde(default)]
  source: Option<SourceField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SourceField {
  Source(String),
  Sources(Vec<String>),
}

impl SourceField {
  fn files(&self) -> Vec<&str> {
    match self {
      SourceField::Source(source) => vec![source.as_str()],
      SourceField::Sources(sources) => sources.iter().map(String::as_str).collect(),
    }
  }
}

#[async_trait]
impl Request for EntryRequest {
  #[tracing::instrument(level = "info", skip_all, fields(entry = %self.entry))]
  async fn run(
    &self,
    request_context: RunRequestContext,
  ) -> Result<ResultAndInvalidations, RunRequestError> {
    let project_root = request_context.project_root();
    let fs = request_context.file_system();

    let mut entry_path = PathBuf::from(&self.entry);
    if entry_path.is_relative() {
      entry_path = project_root.join(entry_path);
    }

    let mut invalidations = vec![
      Invalidation::OptionChange(String::from("projectRoot")),
      Invalidation::FileChange(entry_path.clone()),
    ];

    if fs.is_file(&entry_path) {
      let package_path = package_path(&request_context, &entry_path);

      return Ok(ResultAndInvalidations::new(
        RequestResult::Entry(EntryRequestOutput {
          entries: vec![Entry {
            file_path: entry_path,
            package_path,
            target: None,
            loc: None,
          }],
        }),
        invalidations,
      ));
    }

    if fs.is_dir(&entry_path) {
      let package_json_path = entry_path.join("package.json");
      invalidations.push(Invalidation::FileChange(package_json_path.clone()));

      if fs.is_file(&package_json_path) {
        let code = fs.read_to_string(&package_json_path)?;
        let package_json = serde_json::from_str::<PackageJson>(&code).map_err(|error| {
          diagnostic_error!(DiagnosticBuilder::default()
            .kind(ErrorKind::ParseError)
            .message(format!(
              "Failed to parse {}: {}",
              package_json_path.display(),
              error
            )))
        })?;

        let mut entries = Vec::new();
        for source in package_json
          .source
          .as_ref()
          .map(SourceField::files)
          .unwrap_or_default()
        {
          let file_path = entry_path.join(source);
          if !fs.is_file(&file_path) {
            return Err(
              diagnostic_error!(DiagnosticBuilder::default()
                .kind(ErrorKind::NotFound)
                .message(format!(
                  "{} does not exist, but is listed in the source field of {}",
                  file_path.display(),
                  package_json_path.display()
                )))
              .into(),
            );
          }

          invalidations.push(Invalidation::FileChange(file_path.clone()));
          entries.push(Entry {
            file_path,
            package_path: entry_path.clone(),
            target: None,
            loc: None,
          });
        }

        if !entries.is_empty() {
          tracing::debug!(count = entries.len(), "Found entries in package.json source");

          return Ok(ResultAndInvalidations::new(
            RequestResult::Entry(EntryRequestOutput { entries }),
            invalidations,
          ));
        }
      }
    }

    Err(
      diagnostic_error!(DiagnosticBuilder::default()
        .kind(ErrorKind::NotFound)
        .message(format!("Entry {} does not exist", entry_path.display())))
      .into(),
    )
  }
}

/// The directory of the closest package.json above the entry, or the project root
fn package_path(request_context: &RunRequestContext, entry_path: &Path) -> PathBuf {
  let project_root = request_context.project_root();
  let from = entry_path.parent().unwrap_or(project_root);

  find_ancestor_file(
    request_context.file_system().as_ref(),
    &["package.json"],
    from,
    project_root,
  )
  .and_then(|package_json| package_json.parent().map(Path::to_path_buf))
  .unwrap_or_else(|| project_root.to_path_buf())
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use pretty_assertions::assert_eq;
  use quarry_core::types::QuarryOptions;
  use quarry_filesystem::in_memory_file_system::InMemoryFileSystem;

  use crate::test_utils::request_tracker;
  use crate::test_utils::RequestTrackerTestOptions;

  use super::*;

  fn options(project_root: &str) -> QuarryOptions {
    QuarryOptions {
      project_root: PathBuf::from(project_root),
      ..QuarryOptions::default()
    }
  }

  async fn run_entry_request(
    fs: Arc<InMemoryFileSystem>,
    entry: &str,
  ) -> Result<Vec<Entry>, String> {
    request_tracker(RequestTrackerTestOptions {
      fs,
      options: options("/app"),
      ..RequestTrackerTestOptions::default()
    })
    .run_request(EntryRequest {
      entry: String::from(entry),
    })
    .await
    .map(|result| {
      result
        .as_entry()
        .map(|output| output.entries.clone())
        .unwrap_or_default()
    })
    .map_err(|e| e.to_string())
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn returns_error_when_entry_is_not_found() {
    let entries = run_entry_request(Arc::new(InMemoryFileSystem::default()), "src/a.js").await;

    assert_eq!(
      entries,
      Err(String::from("Entry /app/src/a.js does not exist"))
    );
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn returns_file_entry_from_project_root() {
    let fs = Arc::new(InMemoryFileSystem::default());
    fs.write_file(Path::new("/app/src/a.js"), String::default());

    let entries = run_entry_request(fs, "src/a.js").await;

    assert_eq!(
      entries,
      Ok(vec![Entry {
        file_path: PathBuf::from("/app/src/a.js"),
        package_path: PathBuf::from("/app"),
        ..Entry::default()
      }])
    );
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn uses_the_closest_package_json_as_package_path() {
    let fs = Arc::new(InMemoryFileSystem::default());
    fs.write_file(Path::new("/app/package.json"), String::from("{}"));
    fs.write_file(Path::new("/app/packages/ui/package.json"), String::from("{}"));
    fs.write_file(Path::new("/app/packages/ui/src/index.js"), String::default());

    let entries = run_entry_request(fs, "/app/packages/ui/src/index.js").await;

    assert_eq!(
      entries,
      Ok(vec![Entry {
        file_path: PathBuf::from("/app/packages/ui/src/index.js"),
        package_path: PathBuf::from("/app/packages/ui"),
        ..Entry::default()
      }])
    );
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn returns_package_json_source_entries_for_directories() {
    let fs = Arc::new(InMemoryFileSystem::default());
    fs.write_file(
      Path::new("/app/lib/package.json"),
      String::from(r#"{ "source": ["a.js", "b.js"] }"#),
    );
    fs.write_file(Path::new("/app/lib/a.js"), String::default());
    fs.write_file(Path::new("/app/lib/b.js"), String::default());

    let entries = run_entry_request(fs, "lib").await;

    assert_eq!(
      entries,
      Ok(vec![
        Entry {
          file_path: PathBuf::from("/app/lib/a.js"),
          package_path: PathBuf::from("/app/lib"),
          ..Entry::default()
        },
        Entry {
          file_path: PathBuf::from("/app/lib/b.js"),
          package_path: PathBuf::from("/app/lib"),
          ..Entry::default()
        }
      ])
    );
  }

  #[tokio::test(flavor = "multi_thread")]
  async fn returns_error_for_missing_source_files() {
    let fs = Arc::new(InMemoryFileSystem::default());
    fs.write_file(
      Path::new("/app/lib/package.json"),
      String::from(r#"{ "source": "missing.js" }"#),
    );

    let entries = run_entry_request(fs, "lib").await;

    assert_eq!(
      entries,
      Err(String::from(
        "/app/lib/missing.js does not exist, but is listed in the source field of /app/lib/package.json"
      ))
    );
  }
}
