//! Timeline project discovery.
//!
//! Projects live under `<import_dir>/timeline_projects/<name>/` and contain a
//! `timeline.json` speech document plus an optional `obs_timeline.json`.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::timeline::{Timeline, TimelineDocument, TimelineError};

/// Sub-directory of the import directory that holds projects.
pub const PROJECTS_DIR: &str = "timeline_projects";
/// Speech timeline file name inside a project.
pub const SPEECH_TIMELINE_FILE: &str = "timeline.json";
/// Scene timeline file name inside a project.
pub const SCENE_TIMELINE_FILE: &str = "obs_timeline.json";

/// Errors from project discovery and loading.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("Invalid project name '{0}'")]
    InvalidName(String),

    #[error("Project '{0}' not found")]
    NotFound(String),

    #[error("No projects found in {}", .0.display())]
    NoProjects(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Timeline(#[from] TimelineError),
}

/// A project found on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectSummary {
    pub name: String,
    pub path: PathBuf,
    pub modified: DateTime<Utc>,
    pub has_scene_timeline: bool,
}

/// All projects under `import_dir`, newest first.
pub fn list_projects(import_dir: &Path) -> Result<Vec<ProjectSummary>, ProjectError> {
    let root = import_dir.join(PROJECTS_DIR);
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut projects = Vec::new();
    for entry in std::fs::read_dir(&root)? {
        let entry = entry?;
        let path = entry.path();
        let timeline_file = path.join(SPEECH_TIMELINE_FILE);
        if !timeline_file.is_file() {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        projects.push(ProjectSummary {
            name: entry.file_name().to_string_lossy().into_owned(),
            has_scene_timeline: path.join(SCENE_TIMELINE_FILE).is_file(),
            path,
            modified: DateTime::<Utc>::from(modified),
        });
    }

    projects.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
    Ok(projects)
}

/// The most recently modified project.
pub fn latest_project(import_dir: &Path) -> Result<ProjectSummary, ProjectError> {
    list_projects(import_dir)?
        .into_iter()
        .next()
        .ok_or_else(|| ProjectError::NoProjects(import_dir.join(PROJECTS_DIR)))
}

/// Load and merge a project's timeline documents.
pub fn load_project(import_dir: &Path, name: &str) -> Result<Timeline, ProjectError> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(ProjectError::InvalidName(name.to_string()));
    }

    let dir = import_dir.join(PROJECTS_DIR).join(name);
    let speech_path = dir.join(SPEECH_TIMELINE_FILE);
    if !speech_path.is_file() {
        return Err(ProjectError::NotFound(name.to_string()));
    }

    let speech = read_document(&speech_path)?;
    let scene_path = dir.join(SCENE_TIMELINE_FILE);
    let scene = if scene_path.is_file() {
        Some(read_document(&scene_path)?)
    } else {
        None
    };

    tracing::info!(
        project = name,
        scene_timeline = scene.is_some(),
        "Loading timeline project"
    );
    Ok(Timeline::from_documents(&speech, scene.as_ref())?)
}

fn read_document(path: &Path) -> Result<TimelineDocument, ProjectError> {
    let json = std::fs::read_to_string(path)?;
    serde_json::from_str(&json).map_err(|e| ProjectError::Timeline(TimelineError::Parse(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_project(import_dir: &Path, name: &str, speech: &str, scene: Option<&str>) {
        let dir = import_dir.join(PROJECTS_DIR).join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(SPEECH_TIMELINE_FILE), speech).unwrap();
        if let Some(scene) = scene {
            fs::write(dir.join(SCENE_TIMELINE_FILE), scene).unwrap();
        }
    }

    #[test]
    fn missing_import_dir_lists_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(list_projects(&tmp.path().join("nope")).unwrap().is_empty());
        assert!(matches!(
            latest_project(tmp.path()),
            Err(ProjectError::NoProjects(_))
        ));
    }

    #[test]
    fn loads_and_merges_both_documents() {
        let tmp = tempfile::tempdir().unwrap();
        write_project(
            tmp.path(),
            "ep1",
            r#"{"title": "Ep 1", "timeline": [{"time": 2, "text": "b"}, {"time": 0, "text": "a"}]}"#,
            Some(r#"{"timeline": [{"time": 1, "action": "switch_scene", "scene_name": "S"}]}"#),
        );

        let timeline = load_project(tmp.path(), "ep1").unwrap();
        let times: Vec<f64> = timeline.actions().iter().map(|a| a.time).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0]);
        assert_eq!(timeline.overlay().title.as_deref(), Some("Ep 1"));

        let listed = list_projects(tmp.path()).unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].has_scene_timeline);
    }

    #[test]
    fn rejects_traversal_and_unknown_names() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_project(tmp.path(), "../etc"),
            Err(ProjectError::InvalidName(_))
        ));
        assert!(matches!(
            load_project(tmp.path(), "missing"),
            Err(ProjectError::NotFound(_))
        ));
    }

    #[test]
    fn empty_project_timeline_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        write_project(tmp.path(), "empty", r#"{"timeline": []}"#, None);
        assert!(matches!(
            load_project(tmp.path(), "empty"),
            Err(ProjectError::Timeline(TimelineError::Empty))
        ));
    }
}
