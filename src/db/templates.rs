//! Generation template records.

use super::{Database, now_ms};
use crate::schedule::pattern::{FifthWeek, RawPatternEntry};
use crate::types::GenerationTemplate;
use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fields for a new generation template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTemplate {
    pub client_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub delivery_count: u32,
    #[serde(default)]
    pub generation_pattern: Vec<RawPatternEntry>,
    #[serde(default)]
    pub default_due_days: i64,
    #[serde(default)]
    pub fifth_week: FifthWeek,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub is_standard_task: bool,
    #[serde(default)]
    pub public_approval_enabled: bool,
}

fn default_active() -> bool {
    true
}

impl NewTemplate {
    pub fn new(client_id: &str, title: &str, generation_pattern: Vec<RawPatternEntry>) -> Self {
        let delivery_count = generation_pattern
            .iter()
            .map(|e| e.count.max(0) as u32)
            .sum();
        Self {
            client_id: client_id.to_string(),
            title: title.to_string(),
            description: None,
            delivery_count,
            generation_pattern,
            default_due_days: 0,
            fifth_week: FifthWeek::default(),
            is_active: true,
            is_standard_task: false,
            public_approval_enabled: false,
        }
    }
}

fn parse_template_row(row: &Row) -> rusqlite::Result<GenerationTemplate> {
    let fifth_week: String = row.get("fifth_week")?;
    let pattern_json: String = row.get("generation_pattern")?;
    let (generation_pattern, pattern_error) =
        match serde_json::from_str::<Vec<RawPatternEntry>>(&pattern_json) {
            Ok(entries) => (entries, None),
            Err(e) => (Vec::new(), Some(e.to_string())),
        };
    Ok(GenerationTemplate {
        id: row.get("id")?,
        client_id: row.get("client_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        delivery_count: row.get("delivery_count")?,
        generation_pattern,
        pattern_error,
        default_due_days: row.get("default_due_days")?,
        fifth_week: FifthWeek::parse(&fifth_week),
        is_active: row.get("is_active")?,
        is_standard_task: row.get("is_standard_task")?,
        public_approval_enabled: row.get("public_approval_enabled")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

impl Database {
    pub fn create_template(&self, template: &NewTemplate) -> Result<GenerationTemplate> {
        let id = Uuid::now_v7().to_string();
        let now = now_ms();
        let pattern_json = serde_json::to_string(&template.generation_pattern)?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO generation_templates (
                    id, client_id, title, description, delivery_count, generation_pattern,
                    default_due_days, fifth_week, is_active, is_standard_task,
                    public_approval_enabled, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    &id,
                    &template.client_id,
                    &template.title,
                    &template.description,
                    template.delivery_count,
                    pattern_json,
                    template.default_due_days,
                    template.fifth_week.as_str(),
                    template.is_active,
                    template.is_standard_task,
                    template.public_approval_enabled,
                    now,
                    now,
                ],
            )?;
            Ok(())
        })?;

        Ok(GenerationTemplate {
            id,
            client_id: template.client_id.clone(),
            title: template.title.clone(),
            description: template.description.clone(),
            delivery_count: template.delivery_count,
            generation_pattern: template.generation_pattern.clone(),
            pattern_error: None,
            default_due_days: template.default_due_days,
            fifth_week: template.fifth_week,
            is_active: template.is_active,
            is_standard_task: template.is_standard_task,
            public_approval_enabled: template.public_approval_enabled,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_template(&self, template_id: &str) -> Result<Option<GenerationTemplate>> {
        self.with_conn(|conn| {
            let template = conn
                .query_row(
                    "SELECT * FROM generation_templates WHERE id = ?1",
                    params![template_id],
                    parse_template_row,
                )
                .optional()?;
            Ok(template)
        })
    }

    /// Active templates of every client owned by `user_id`.
    pub fn list_active_templates(&self, user_id: &str) -> Result<Vec<GenerationTemplate>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.* FROM generation_templates t
                 INNER JOIN clients c ON c.id = t.client_id
                 WHERE c.user_id = ?1 AND t.is_active = 1
                 ORDER BY t.created_at, t.id",
            )?;
            let templates = stmt
                .query_map(params![user_id], parse_template_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(templates)
        })
    }

    pub fn set_template_active(&self, template_id: &str, active: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE generation_templates SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
                params![active, now_ms(), template_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Replace the stored pattern JSON verbatim.
    pub fn set_template_pattern_json(&self, template_id: &str, pattern_json: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE generation_templates SET generation_pattern = ?1, updated_at = ?2 WHERE id = ?3",
                params![pattern_json, now_ms(), template_id],
            )?;
            Ok(())
        })
    }
}
