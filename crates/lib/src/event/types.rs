use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Identifies an event within a build's stream.
///
/// Parent events announce the ids of their children so a consumer can tell
/// when the stream is complete.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventId {
  BuildStarted,
  Progress { count: u32 },
  TargetCompleted { label: String },
  NamedSet { id: String },
  ActionCompleted { label: String, primary_output: String },
  TestResult { label: String, run: u32, attempt: u32 },
  BuildFinished,
  BuildToolLogs,
}

impl std::fmt::Display for EventId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      EventId::BuildStarted => write!(f, "started"),
      EventId::Progress { count } => write!(f, "progress:{}", count),
      EventId::TargetCompleted { label } => write!(f, "target:{}", label),
      EventId::NamedSet { id } => write!(f, "named_set:{}", id),
      EventId::ActionCompleted { label, primary_output } => write!(f, "action:{}:{}", label, primary_output),
      EventId::TestResult { label, run, attempt } => write!(f, "test:{}:{}:{}", label, run, attempt),
      EventId::BuildFinished => write!(f, "finished"),
      EventId::BuildToolLogs => write!(f, "build_tool_logs"),
    }
  }
}

/// Where a file's contents can be found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileLocation {
  /// A file on the local machine. Must be resolved before encoding.
  Path(PathBuf),
  /// A sink-addressable reference produced by an uploader.
  Uri(String),
  /// Small contents inlined into the event.
  Contents(String),
}

/// A named file referenced by an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct File {
  pub name: String,
  #[serde(flatten)]
  pub location: FileLocation,
}

impl File {
  pub fn path(name: &str, path: impl Into<PathBuf>) -> Self {
    Self {
      name: name.to_string(),
      location: FileLocation::Path(path.into()),
    }
  }

  pub fn uri(name: &str, uri: &str) -> Self {
    Self {
      name: name.to_string(),
      location: FileLocation::Uri(uri.to_string()),
    }
  }

  pub fn contents(name: &str, contents: &str) -> Self {
    Self {
      name: name.to_string(),
      location: FileLocation::Contents(contents.to_string()),
    }
  }

  /// The local path this file refers to, if it has not been resolved yet.
  pub fn local_path(&self) -> Option<&Path> {
    match &self.location {
      FileLocation::Path(path) => Some(path),
      _ => None,
    }
  }
}

/// Outputs of a target grouped by name, referencing named file sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputGroup {
  pub name: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub file_sets: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
  Passed,
  Flaky,
  Timeout,
  Failed,
  Incomplete,
}

/// Process exit status reported when the build finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitCode {
  pub name: String,
  pub code: i32,
}

impl ExitCode {
  pub fn success() -> Self {
    Self {
      name: "SUCCESS".to_string(),
      code: 0,
    }
  }

  pub fn build_failure() -> Self {
    Self {
      name: "BUILD_FAILURE".to_string(),
      code: 1,
    }
  }

  pub fn interrupted() -> Self {
    Self {
      name: "INTERRUPTED".to_string(),
      code: 8,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
  Started {
    uuid: String,
    command: String,
    start_time_millis: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    workspace_directory: Option<PathBuf>,
  },
  Progress {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    stdout: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    stderr: String,
  },
  NamedSetOfFiles {
    #[serde(default)]
    files: Vec<File>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    file_sets: Vec<String>,
  },
  TargetCompleted {
    success: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    output_groups: Vec<OutputGroup>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    important_output: Vec<File>,
  },
  ActionCompleted {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stdout: Option<File>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stderr: Option<File>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    primary_output: Option<File>,
  },
  TestResult {
    status: TestStatus,
    duration_millis: u64,
    #[serde(default)]
    test_action_output: Vec<File>,
  },
  BuildFinished {
    exit_code: ExitCode,
    finish_time_millis: u64,
  },
  BuildToolLogs {
    #[serde(default)]
    log: Vec<File>,
  },
}

/// One build-lifecycle occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildEvent {
  pub id: EventId,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub children: Vec<EventId>,
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub last_message: bool,
  pub payload: EventPayload,
}

impl BuildEvent {
  pub fn new(id: EventId, payload: EventPayload) -> Self {
    Self {
      id,
      children: Vec::new(),
      last_message: false,
      payload,
    }
  }

  pub fn with_children(mut self, children: Vec<EventId>) -> Self {
    self.children = children;
    self
  }

  /// Marks this as the final event of the stream.
  pub fn last(mut self) -> Self {
    self.last_message = true;
    self
  }

  pub fn started(uuid: &str, command: &str, start_time_millis: u64) -> Self {
    Self::new(
      EventId::BuildStarted,
      EventPayload::Started {
        uuid: uuid.to_string(),
        command: command.to_string(),
        start_time_millis,
        workspace_directory: None,
      },
    )
    .with_children(vec![EventId::Progress { count: 0 }, EventId::BuildFinished])
  }

  pub fn progress(count: u32, stdout: &str, stderr: &str) -> Self {
    Self::new(
      EventId::Progress { count },
      EventPayload::Progress {
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
      },
    )
    .with_children(vec![EventId::Progress { count: count + 1 }])
  }

  pub fn named_set(id: &str, files: Vec<File>) -> Self {
    Self::new(
      EventId::NamedSet { id: id.to_string() },
      EventPayload::NamedSetOfFiles {
        files,
        file_sets: Vec::new(),
      },
    )
  }

  pub fn target_completed(label: &str, success: bool, output_groups: Vec<OutputGroup>) -> Self {
    Self::new(
      EventId::TargetCompleted {
        label: label.to_string(),
      },
      EventPayload::TargetCompleted {
        success,
        output_groups,
        important_output: Vec::new(),
      },
    )
  }

  pub fn test_result(label: &str, status: TestStatus, duration_millis: u64, outputs: Vec<File>) -> Self {
    Self::new(
      EventId::TestResult {
        label: label.to_string(),
        run: 1,
        attempt: 1,
      },
      EventPayload::TestResult {
        status,
        duration_millis,
        test_action_output: outputs,
      },
    )
  }

  pub fn build_finished(exit_code: ExitCode, finish_time_millis: u64) -> Self {
    Self::new(
      EventId::BuildFinished,
      EventPayload::BuildFinished {
        exit_code,
        finish_time_millis,
      },
    )
    .with_children(vec![EventId::BuildToolLogs])
  }

  pub fn build_tool_logs(log: Vec<File>) -> Self {
    Self::new(EventId::BuildToolLogs, EventPayload::BuildToolLogs { log }).last()
  }

  /// All files referenced by this event, in payload order.
  pub fn files(&self) -> Vec<&File> {
    match &self.payload {
      EventPayload::Started { .. } | EventPayload::Progress { .. } | EventPayload::BuildFinished { .. } => Vec::new(),
      EventPayload::NamedSetOfFiles { files, .. } => files.iter().collect(),
      EventPayload::TargetCompleted { important_output, .. } => important_output.iter().collect(),
      EventPayload::ActionCompleted {
        stdout,
        stderr,
        primary_output,
        ..
      } => [stdout, stderr, primary_output].into_iter().flatten().collect(),
      EventPayload::TestResult { test_action_output, .. } => test_action_output.iter().collect(),
      EventPayload::BuildToolLogs { log } => log.iter().collect(),
    }
  }

  fn files_mut(&mut self) -> Vec<&mut File> {
    match &mut self.payload {
      EventPayload::Started { .. } | EventPayload::Progress { .. } | EventPayload::BuildFinished { .. } => Vec::new(),
      EventPayload::NamedSetOfFiles { files, .. } => files.iter_mut().collect(),
      EventPayload::TargetCompleted { important_output, .. } => important_output.iter_mut().collect(),
      EventPayload::ActionCompleted {
        stdout,
        stderr,
        primary_output,
        ..
      } => [stdout, stderr, primary_output]
        .into_iter()
        .filter_map(Option::as_mut)
        .collect(),
      EventPayload::TestResult { test_action_output, .. } => test_action_output.iter_mut().collect(),
      EventPayload::BuildToolLogs { log } => log.iter_mut().collect(),
    }
  }

  /// Local paths that must be resolved before this event can be encoded.
  pub fn local_paths(&self) -> BTreeSet<PathBuf> {
    self
      .files()
      .into_iter()
      .filter_map(File::local_path)
      .map(Path::to_path_buf)
      .collect()
  }

  /// Returns a copy of this event with every file location rewritten by `f`.
  pub fn map_files<E>(&self, mut f: impl FnMut(&File) -> Result<FileLocation, E>) -> Result<Self, E> {
    let mut mapped = self.clone();
    for file in mapped.files_mut() {
      file.location = f(file)?;
    }
    Ok(mapped)
  }
}
