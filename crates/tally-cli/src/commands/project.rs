//! `tally project` subcommands.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tally_core::{Project, validate};
use tally_db::Database;

/// Creates a project after validating its name and description.
pub fn add<W: Write>(
    writer: &mut W,
    db: &mut Database,
    name: &str,
    description: Option<&str>,
    now: DateTime<Utc>,
) -> Result<()> {
    let name = validate::project_name(name)?;
    let description = validate::project_description(description)?;
    let project = db
        .create_project(&name, description.as_deref(), now)
        .context("failed to create project")?;
    writeln!(writer, "Created project {} (#{})", project.name, project.id)?;
    Ok(())
}

pub fn list<W: Write>(writer: &mut W, db: &Database, json: bool) -> Result<()> {
    let projects = db.list_projects().context("failed to list projects")?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&projects)?)?;
    } else {
        write!(writer, "{}", format_projects(&projects))?;
    }
    Ok(())
}

fn format_projects(projects: &[Project]) -> String {
    use std::fmt::Write;

    let mut output = String::new();
    if projects.is_empty() {
        writeln!(output, "No projects yet.").unwrap();
        writeln!(output, "Hint: Run 'tally project add <name>' to create one.").unwrap();
        return output;
    }
    for project in projects {
        match &project.description {
            Some(description) => {
                writeln!(output, "#{:<4} {}  {description}", project.id, project.name).unwrap();
            }
            None => writeln!(output, "#{:<4} {}", project.id, project.name).unwrap(),
        }
    }
    output
}
