//! Seed data loaded from a YAML fixture file.
//!
//! Records are created in dependency order (users, clients, templates,
//! tasks, client tasks, approval links). Users and clients keep the ids
//! given in the file so later sections can reference them.

use super::Database;
use super::templates::NewTemplate;
use crate::store::{NewClientTask, NewTask};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureUser {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureClient {
    pub id: String,
    pub user_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureLink {
    pub client_id: String,
    /// Expiry in milliseconds since the epoch.
    pub expires_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub users: Vec<FixtureUser>,
    #[serde(default)]
    pub clients: Vec<FixtureClient>,
    #[serde(default)]
    pub templates: Vec<NewTemplate>,
    #[serde(default)]
    pub tasks: Vec<NewTask>,
    #[serde(default)]
    pub client_tasks: Vec<NewClientTask>,
    #[serde(default)]
    pub approval_links: Vec<FixtureLink>,
}

impl Fixture {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let fixture: Option<Fixture> = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(fixture.unwrap_or_default())
    }

    /// Per-section record counts, in import order.
    pub fn counts(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("users", self.users.len()),
            ("clients", self.clients.len()),
            ("templates", self.templates.len()),
            ("tasks", self.tasks.len()),
            ("client_tasks", self.client_tasks.len()),
            ("approval_links", self.approval_links.len()),
        ]
    }
}

/// What an import created.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FixtureReport {
    pub users: usize,
    pub clients: usize,
    pub templates: Vec<String>,
    pub tasks: usize,
    pub client_tasks: usize,
    /// Tokens of the created approval links.
    pub approval_links: Vec<String>,
}

impl Database {
    pub fn import_fixture(&self, fixture: &Fixture) -> Result<FixtureReport> {
        let mut report = FixtureReport::default();

        for user in &fixture.users {
            self.create_user(Some(user.id.clone()), &user.name, user.timezone.as_deref())
                .with_context(|| format!("user {}", user.id))?;
            report.users += 1;
        }
        for client in &fixture.clients {
            self.create_client(Some(client.id.clone()), &client.user_id, &client.name)
                .with_context(|| format!("client {}", client.id))?;
            report.clients += 1;
        }
        for template in &fixture.templates {
            let mut template = template.clone();
            if template.delivery_count == 0 {
                template.delivery_count = template
                    .generation_pattern
                    .iter()
                    .map(|e| e.count.max(0) as u32)
                    .sum();
            }
            let created = self
                .create_template(&template)
                .with_context(|| format!("template '{}'", template.title))?;
            report.templates.push(created.id);
        }
        for task in &fixture.tasks {
            self.create_task(task)
                .with_context(|| format!("task '{}'", task.title))?;
            report.tasks += 1;
        }
        for task in &fixture.client_tasks {
            self.create_client_task(task)
                .with_context(|| format!("client task '{}'", task.title))?;
            report.client_tasks += 1;
        }
        for link in &fixture.approval_links {
            let created = self.create_approval_link(&link.client_id, link.expires_at)?;
            report.approval_links.push(created.token);
        }

        info!(
            users = report.users,
            clients = report.clients,
            templates = report.templates.len(),
            tasks = report.tasks,
            client_tasks = report.client_tasks,
            "Fixture imported"
        );
        Ok(report)
    }
}
