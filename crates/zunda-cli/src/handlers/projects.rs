//! Projects command handler.

use anyhow::Result;
use zunda_core::{ProjectSummary, list_projects};

use crate::bootstrap::CliContext;

/// List projects in the import directory, newest first.
pub fn execute(ctx: &CliContext) -> Result<()> {
    let import_dir = &ctx.settings.timeline.import_dir;
    let projects = list_projects(import_dir)?;

    if projects.is_empty() {
        println!("No projects in {}", import_dir.display());
        return Ok(());
    }

    println!("{}", format_table(&projects));
    Ok(())
}

fn format_table(projects: &[ProjectSummary]) -> String {
    let width = projects
        .iter()
        .map(|p| p.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("NAME".len());

    let mut lines = vec![format!("{:<width$}  {:<16}  SCENES", "NAME", "MODIFIED")];
    for project in projects {
        lines.push(format!(
            "{:<width$}  {:<16}  {}",
            project.name,
            project.modified.format("%Y-%m-%d %H:%M"),
            if project.has_scene_timeline { "yes" } else { "-" },
        ));
    }
    lines.join("\n")
}
