//! Workflow engine tests against in-memory origin and destination doubles.

#[allow(dead_code)]
mod common;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use common::{DummyOrigin, RecordingDestination};
use repo_migrate::exclude::ExclusionFilter;
use repo_migrate::origin::Origin;
use repo_migrate::transform::Replace;
use repo_migrate::workflow::{Workflow, WorkflowMode};
use tempfile::TempDir;

const PREFIX: &str = "TRANSFORMED";

struct Harness {
    temp_dir: TempDir,
    origin: DummyOrigin,
    destination: RecordingDestination,
    name: Option<String>,
    exclusions: Vec<String>,
    transform: bool,
}

impl Harness {
    fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap(),
            origin: DummyOrigin::new(),
            destination: RecordingDestination::new(),
            name: None,
            exclusions: Vec::new(),
            transform: true,
        }
    }

    /// Nested so that `../../../file` still lands inside the temp dir.
    fn workdir(&self) -> PathBuf {
        self.temp_dir.path().join("a/b/c/workdir")
    }

    fn build(&self, mode: WorkflowMode, previous_ref: Option<&str>) -> Workflow {
        let mut workflow = Workflow::new(
            Box::new(self.origin.clone()),
            Box::new(self.destination.clone()),
        )
        .with_mode(mode)
        .with_exclusions(ExclusionFilter::new(&self.exclusions).unwrap());
        if let Some(name) = &self.name {
            workflow = workflow.with_name(name);
        }
        if self.transform {
            let groups = BTreeMap::from([("line".to_string(), ".+".to_string())]);
            let replace = Replace::new("${line}", &format!("{}${{line}}", PREFIX), &groups).unwrap();
            workflow = workflow.with_transformation(Box::new(replace));
        }
        if let Some(previous) = previous_ref {
            workflow = workflow.with_previous_ref(previous);
        }
        workflow
    }

    /// A squash workflow over an origin holding one change with timestamp 42.
    fn workflow(&self) -> Workflow {
        self.origin.add_simple_change(42);
        self.build(WorkflowMode::Squash, None)
    }

    fn iterative_workflow(&self, previous_ref: Option<&str>) -> Workflow {
        self.build(WorkflowMode::Iterative, previous_ref)
    }

    fn head(&self) -> String {
        self.origin.head().unwrap()
    }

    fn prepare_excludes(&self) {
        let base = self.temp_dir.path().join("excludes");
        for path in [
            "folder/file.txt",
            "folder/subfolder/file.txt",
            "folder/subfolder/file.java",
            "folder2/file.txt",
            "folder2/subfolder/file.txt",
            "folder2/subfolder/file.java",
        ] {
            touch(&base.join(path));
        }
        self.origin.add_change(1, &base, "excludes");
    }

    fn assert_files_exist(&self, paths: &[&str]) {
        for path in paths {
            assert!(self.workdir().join(path).exists(), "{} should exist", path);
        }
    }

    fn assert_files_dont_exist(&self, paths: &[&str]) {
        for path in paths {
            assert!(!self.workdir().join(path).exists(), "{} should not exist", path);
        }
    }
}

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"").unwrap();
}

#[test]
fn test_default_name_is_default() {
    let harness = Harness::new();
    assert_eq!(harness.workflow().name(), "default");
}

#[test]
fn test_display_includes_name() {
    let mut harness = Harness::new();
    harness.name = Some("display_includes_name".to_string());
    assert!(harness.workflow().to_string().contains("display_includes_name"));
}

#[test]
fn test_display_includes_excludes() {
    let mut harness = Harness::new();
    harness.exclusions = vec!["foo/**/bar.htm".to_string()];
    assert!(harness.workflow().to_string().contains("foo/**/bar.htm"));
}

#[test]
fn test_iterative_workflow() {
    let harness = Harness::new();
    for i in 0..61 {
        harness.origin.add_simple_change(i);
    }
    let workdir = harness.workdir();

    harness
        .iterative_workflow(Some("42"))
        .run(&workdir, "50")
        .unwrap();
    let processed = harness.destination.processed();
    assert_eq!(processed.len(), 8);
    for (change, expected) in processed.iter().zip(43..) {
        let reference = expected.to_string();
        assert_eq!(change.metadata.summary, format!("{} change\n", expected));
        assert_eq!(change.metadata.origin_ref, reference);
        assert_eq!(change.metadata.timestamp, expected);
        assert_eq!(change.metadata.label, "Dummy-RevId");
        assert_eq!(change.workdir.len(), 1);
        assert_eq!(
            change.workdir.get(Path::new("file.txt")),
            Some(&format!("{}{}", PREFIX, reference))
        );
    }

    // Resumes from what the destination recorded last
    harness.iterative_workflow(None).run(&workdir, "60").unwrap();
    let processed = harness.destination.processed();
    assert_eq!(processed.len(), 18);
    let refs: Vec<&str> = processed[8..]
        .iter()
        .map(|p| p.metadata.origin_ref.as_str())
        .collect();
    assert_eq!(refs, vec!["51", "52", "53", "54", "55", "56", "57", "58", "59", "60"]);
}

#[test]
fn test_iterative_workflow_stops_at_first_failure() {
    let harness = Harness::new();
    for i in 0..5 {
        harness.origin.add_simple_change(i);
    }
    // No line to prefix, so the required replace fails on this change
    let empty = harness.temp_dir.path().join("empty");
    touch(&empty.join("file.txt"));
    harness.origin.add_change(5, &empty, "empty file");
    harness.origin.add_simple_change(6);

    let err = harness
        .iterative_workflow(Some("2"))
        .run(&harness.workdir(), "6")
        .unwrap_err();
    assert!(err.is_repo());
    assert!(err.to_string().contains("required match not found"));

    let refs: Vec<String> = harness
        .destination
        .processed()
        .iter()
        .map(|p| p.metadata.origin_ref.clone())
        .collect();
    assert_eq!(refs, vec!["3", "4"]);
}

#[test]
fn test_iterative_workflow_no_previous_ref() {
    let harness = Harness::new();
    for i in 0..61 {
        harness.origin.add_simple_change(i);
    }
    let err = harness
        .iterative_workflow(None)
        .run(&harness.workdir(), "50")
        .unwrap_err();
    assert!(err.is_repo());
    assert!(err
        .to_string()
        .contains("Previous revision label Dummy-RevId could not be found"));
    assert!(harness.destination.processed().is_empty());
}

#[test]
fn test_process_is_called_with_origin_timestamp() {
    let harness = Harness::new();
    let workflow = harness.workflow();
    workflow.run(&harness.workdir(), &harness.head()).unwrap();
    assert_eq!(harness.destination.processed()[0].metadata.timestamp, 42);
}

#[test]
fn test_process_uses_current_time_without_origin_timestamp() {
    let harness = Harness::new();
    let workflow = harness.build(WorkflowMode::Squash, None);
    harness.origin.add_untimed_change();
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    workflow.run(&harness.workdir(), &harness.head()).unwrap();
    assert!(harness.destination.processed()[0].metadata.timestamp >= now);
}

#[test]
fn test_process_is_called_with_correct_workdir() {
    let harness = Harness::new();
    let workflow = harness.workflow();
    let head = harness.head();
    workflow.run(&harness.workdir(), &head).unwrap();
    let content = fs::read_to_string(harness.workdir().join("file.txt")).unwrap();
    assert!(content.lines().any(|l| l == format!("{}{}", PREFIX, head)));
}

#[test]
fn test_sends_origin_timestamp_to_destination() {
    let harness = Harness::new();
    let workflow = harness.workflow();
    harness.origin.add_simple_change(42918273);
    workflow.run(&harness.workdir(), &harness.head()).unwrap();
    let processed = harness.destination.processed();
    assert_eq!(processed.len(), 1);
    assert_eq!(processed[0].metadata.timestamp, 42918273);
}

#[test]
fn test_runs_transformations() {
    let harness = Harness::new();
    harness.workflow().run(&harness.workdir(), &harness.head()).unwrap();
    let processed = harness.destination.processed();
    assert_eq!(processed.len(), 1);
    assert_eq!(processed[0].workdir.len(), 1);
    assert_eq!(
        processed[0].workdir.get(Path::new("file.txt")).map(String::as_str),
        Some("TRANSFORMED0")
    );
}

#[test]
fn test_invalid_exclude_path() {
    let mut harness = Harness::new();
    let outside = "../../../file";
    // Where `outside` resolves from the workdir
    let file = harness.temp_dir.path().join("a/file");
    touch(&file);
    harness.prepare_excludes();
    harness.exclusions = vec![outside.to_string()];

    let err = harness
        .workflow()
        .run(&harness.workdir(), &harness.head())
        .unwrap_err();
    assert!(err.is_config_validation());
    assert!(err.to_string().contains("is not relative to"));
    assert!(file.exists());
    assert!(harness.destination.processed().is_empty());
}

#[test]
fn test_exclude_doesnt_exclude_directories() {
    let mut harness = Harness::new();
    harness.exclusions = vec!["folder".to_string()];
    let workflow = harness.workflow();
    harness.prepare_excludes();

    let err = workflow.run(&harness.workdir(), &harness.head()).unwrap_err();
    assert!(err.is_repo());
    assert!(err.to_string().contains("Nothing was deleted"));
    harness.assert_files_exist(&["folder/file.txt", "folder2/file.txt"]);
}

#[test]
fn test_exclude_recursive() {
    let mut harness = Harness::new();
    harness.exclusions = vec!["folder/**".to_string()];
    harness.transform = false;
    let workflow = harness.workflow();
    harness.prepare_excludes();

    workflow.run(&harness.workdir(), &harness.head()).unwrap();
    harness.assert_files_exist(&["folder", "folder2", "folder2/subfolder/file.java"]);
    harness.assert_files_dont_exist(&[
        "folder/file.txt",
        "folder/subfolder/file.txt",
        "folder/subfolder/file.java",
    ]);
}

#[test]
fn test_exclude_recursive_by_type() {
    let mut harness = Harness::new();
    harness.exclusions = vec!["folder/**/*.java".to_string()];
    harness.transform = false;
    let workflow = harness.workflow();
    harness.prepare_excludes();

    workflow.run(&harness.workdir(), &harness.head()).unwrap();
    harness.assert_files_exist(&[
        "folder",
        "folder2",
        "folder/subfolder",
        "folder/subfolder/file.txt",
        "folder2/subfolder/file.java",
    ]);
    harness.assert_files_dont_exist(&["folder/subfolder/file.java"]);
}

#[test]
fn test_exclude_iterative() {
    let mut harness = Harness::new();
    harness.exclusions = vec!["folder/**/*.java".to_string()];
    harness.transform = false;
    harness.prepare_excludes();
    let workflow = harness.iterative_workflow(Some(harness.head().as_str()));
    harness.prepare_excludes();
    harness.prepare_excludes();
    harness.prepare_excludes();

    workflow.run(&harness.workdir(), &harness.head()).unwrap();
    let processed = harness.destination.processed();
    assert_eq!(processed.len(), 3);
    for change in &processed {
        for path in [
            "folder/file.txt",
            "folder2/file.txt",
            "folder2/subfolder/file.java",
            "folder/subfolder/file.txt",
        ] {
            assert!(change.workdir.contains_key(Path::new(path)), "missing {}", path);
        }
        assert!(!change
            .workdir
            .contains_key(Path::new("folder/subfolder/file.java")));
    }
}

#[test]
fn test_workdir_is_rebuilt_for_each_change() {
    let harness = Harness::new();
    let extra = harness.temp_dir.path().join("extra");
    touch(&extra.join("file.txt"));
    fs::write(extra.join("file.txt"), "x").unwrap();
    touch(&extra.join("only-here.txt"));
    fs::write(extra.join("only-here.txt"), "y").unwrap();
    harness.origin.add_simple_change(0);
    harness.origin.add_change(1, &extra, "extra file");
    harness.origin.add_simple_change(2);

    harness
        .iterative_workflow(Some("0"))
        .run(&harness.workdir(), "2")
        .unwrap();
    let processed = harness.destination.processed();
    assert!(processed[0].workdir.contains_key(Path::new("only-here.txt")));
    assert!(!processed[1].workdir.contains_key(Path::new("only-here.txt")));
}
