//! Monthly task instance generation.
//!
//! Generation is a set difference: the slots a template's pattern expands
//! to for a month, minus the slots already stored for that (client,
//! template, month). Each missing slot becomes one client task. The insert
//! is conflict-tolerant on the slot key, so a concurrent or repeated run
//! never duplicates an instance.

use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};

use super::pattern::{SlotKey, expand_pattern, expand_slots};
use crate::error::{EngineError, EngineResult};
use crate::store::{NewClientTask, NewTask, RecordStore};
use crate::types::{Board, ClientTask, GenerationTemplate, MonthRef};

/// What a generation run did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationOutcome {
    pub template_id: String,
    pub month: Option<MonthRef>,
    /// Client tasks inserted by this run.
    pub created: Vec<ClientTask>,
    /// Slots that were already present (including lost insert races).
    pub existing: usize,
    /// General tasks created or linked for standard client tasks.
    pub mirrored: usize,
}

impl GenerationOutcome {
    fn empty(template_id: &str, month: MonthRef) -> Self {
        Self {
            template_id: template_id.to_string(),
            month: Some(month),
            ..Default::default()
        }
    }
}

/// Idempotency key of the general task mirroring `client_task_id`.
pub fn mirror_key(client_task_id: &str) -> String {
    format!("client_task:{}", client_task_id)
}

/// Create the client tasks `template_id` is missing for `month`.
pub fn generate_for_template(
    store: &dyn RecordStore,
    client_id: &str,
    template_id: &str,
    month: MonthRef,
) -> EngineResult<GenerationOutcome> {
    let client = store
        .get_client(client_id)?
        .ok_or_else(|| EngineError::not_found("client", client_id))?;
    let template = store
        .get_template(template_id)?
        .filter(|t| t.client_id == client.id)
        .ok_or_else(|| EngineError::not_found("template", template_id))?;

    if !template.is_active {
        debug!(template_id, "Template inactive, nothing to generate");
        return Ok(GenerationOutcome::empty(template_id, month));
    }
    if let Some(reason) = &template.pattern_error {
        return Err(EngineError::validation(
            "generation_pattern",
            format!("stored pattern is malformed: {}", reason),
        ));
    }

    let slots = expand_pattern(
        &template.generation_pattern,
        month,
        template.default_due_days,
        template.fifth_week,
    )?;
    let expected = expand_slots(&slots);

    let stored = store.list_generated_client_tasks(client_id, template_id, month)?;
    let present: HashSet<SlotKey> = stored
        .iter()
        .filter_map(|ct| match (ct.slot_date, ct.slot_index) {
            (Some(due_date), Some(slot_index)) => Some(SlotKey {
                due_date,
                slot_index,
            }),
            _ => None,
        })
        .collect();

    let mut outcome = GenerationOutcome::empty(template_id, month);
    let total = expected.len().max(template.delivery_count as usize);

    for (n, slot) in expected.iter().enumerate() {
        if present.contains(slot) {
            outcome.existing += 1;
            continue;
        }
        let new_task = NewClientTask {
            client_id: client.id.clone(),
            title: instance_title(&template, n + 1, total),
            description: template.description.clone(),
            template_id: Some(template.id.clone()),
            month_year_reference: Some(month),
            due_date: Some(slot.due_date),
            board: Some(Board::General),
            is_standard_task: template.is_standard_task,
            public_approval_enabled: template.public_approval_enabled,
            slot: Some(*slot),
            ..Default::default()
        };
        match store.insert_generated_client_task(&new_task)? {
            Some(created) => outcome.created.push(created),
            // Lost the race to a concurrent run; its row satisfies the slot.
            None => outcome.existing += 1,
        }
    }

    if template.is_standard_task {
        // Re-read so rows from earlier partial runs get their mirror too
        let all = store.list_generated_client_tasks(client_id, template_id, month)?;
        for ct in all.iter().filter(|ct| ct.main_task_id.is_none()) {
            let main_task_id = mirror_client_task(store, ct)?;
            if let Some(created) = outcome.created.iter_mut().find(|c| c.id == ct.id) {
                created.main_task_id = Some(main_task_id);
            }
            outcome.mirrored += 1;
        }
    }

    info!(
        client_id,
        template_id,
        month = %month,
        created = outcome.created.len(),
        existing = outcome.existing,
        mirrored = outcome.mirrored,
        "Generated client tasks"
    );
    Ok(outcome)
}

fn instance_title(template: &GenerationTemplate, n: usize, total: usize) -> String {
    format!("{} ({}/{})", template.title, n, total)
}

/// Create (or find) the general task for a standard client task and link it.
fn mirror_client_task(store: &dyn RecordStore, client_task: &ClientTask) -> EngineResult<String> {
    let task = store.insert_task_if_absent(&NewTask {
        user_id: client_task.user_id.clone(),
        title: client_task.title.clone(),
        description: client_task.description.clone(),
        due_date: client_task.due_date,
        time: client_task.time.clone(),
        board: Some(client_task.current_board),
        generation_key: Some(mirror_key(&client_task.id)),
        ..Default::default()
    })?;
    store.link_main_task(&client_task.id, &task.id)?;
    Ok(task.id)
}
