use super::Project;
use anyhow::Result;
use comfy_table::{Cell, Color, Table};
use deploy_orchestration::DeploymentState;
use std::path::Path;

pub async fn run(project: &Path, env: Option<&str>, json: bool) -> Result<()> {
    let project = Project::load(project)?;
    let summaries = project.deployments().status(env).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["APP", "ENVIRONMENT", "STATUS", "TAG", "URL", "STARTED"]);
    for summary in &summaries {
        let color = match summary.state {
            DeploymentState::Running => Color::Green,
            DeploymentState::Absent | DeploymentState::Stopped => Color::DarkGrey,
            _ => Color::Yellow,
        };
        let started = summary
            .started_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(&summary.app),
            Cell::new(&summary.environment),
            Cell::new(summary.state).fg(color),
            Cell::new(summary.tag.as_deref().unwrap_or("-")),
            Cell::new(&summary.hostname),
            Cell::new(started),
        ]);
    }

    println!("{}", table);
    Ok(())
}
