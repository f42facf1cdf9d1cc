//! Integration tests for monthly client task generation.

mod common;

use chrono::Weekday;
use common::{FaultyStore, date, month, seeded_db};
use std::sync::atomic::Ordering;
use task_rollover::db::Database;
use task_rollover::db::templates::NewTemplate;
use task_rollover::error::{EngineError, ErrorCode};
use task_rollover::schedule::generate_for_template;
use task_rollover::schedule::pattern::{FifthWeek, RawPatternEntry};
use task_rollover::store::NewClientTask;
use task_rollover::types::{Board, ClientTaskStatus, GenerationTemplate};

/// Two posts on the first Monday and one on the second Friday.
fn weekly_template(db: &Database) -> GenerationTemplate {
    db.create_template(&NewTemplate::new(
        "c1",
        "Post",
        vec![
            RawPatternEntry::new(1, Weekday::Mon, 2),
            RawPatternEntry::new(2, Weekday::Fri, 1),
        ],
    ))
    .unwrap()
}

mod expansion_tests {
    use super::*;

    #[test]
    fn test_generates_one_task_per_slot() {
        let db = seeded_db();
        let template = weekly_template(&db);

        let outcome = generate_for_template(&db, "c1", &template.id, month("2024-05")).unwrap();
        assert_eq!(outcome.created.len(), 3);
        assert_eq!(outcome.existing, 0);

        let due: Vec<_> = outcome.created.iter().map(|ct| ct.due_date).collect();
        assert_eq!(
            due,
            vec![
                Some(date(2024, 5, 6)),
                Some(date(2024, 5, 6)),
                Some(date(2024, 5, 10))
            ]
        );
        let titles: Vec<_> = outcome.created.iter().map(|ct| ct.title.as_str()).collect();
        assert_eq!(titles, vec!["Post (1/3)", "Post (2/3)", "Post (3/3)"]);

        for ct in &outcome.created {
            assert_eq!(ct.status, ClientTaskStatus::Pending);
            assert_eq!(ct.current_board, Board::General);
            assert_eq!(ct.month_year_reference, Some(month("2024-05")));
            assert_eq!(ct.template_id.as_deref(), Some(template.id.as_str()));
            assert_eq!(ct.user_id, "u1");
        }
    }

    #[test]
    fn test_due_offset_shifts_dates() {
        let db = seeded_db();
        let mut new = NewTemplate::new("c1", "Report", vec![RawPatternEntry::new(1, Weekday::Mon, 1)]);
        new.default_due_days = 2;
        let template = db.create_template(&new).unwrap();

        let outcome = generate_for_template(&db, "c1", &template.id, month("2024-05")).unwrap();
        assert_eq!(outcome.created[0].due_date, Some(date(2024, 5, 8)));
    }

    #[test]
    fn test_fifth_week_skipped_by_default() {
        let db = seeded_db();
        // February 2023 has four Mondays
        let template = db
            .create_template(&NewTemplate::new(
                "c1",
                "Recap",
                vec![RawPatternEntry::new(5, Weekday::Mon, 1)],
            ))
            .unwrap();

        let outcome = generate_for_template(&db, "c1", &template.id, month("2023-02")).unwrap();
        assert!(outcome.created.is_empty());
        assert!(db.list_client_tasks("c1").unwrap().is_empty());
    }

    #[test]
    fn test_fifth_week_last_policy() {
        let db = seeded_db();
        let mut new = NewTemplate::new("c1", "Recap", vec![RawPatternEntry::new(5, Weekday::Mon, 1)]);
        new.fifth_week = FifthWeek::Last;
        let template = db.create_template(&new).unwrap();

        let outcome = generate_for_template(&db, "c1", &template.id, month("2023-02")).unwrap();
        assert_eq!(outcome.created.len(), 1);
        assert_eq!(outcome.created[0].due_date, Some(date(2023, 2, 27)));
    }

    #[test]
    fn test_zero_count_entries_emit_nothing() {
        let db = seeded_db();
        let template = db
            .create_template(&NewTemplate::new(
                "c1",
                "Nothing",
                vec![RawPatternEntry::new(1, Weekday::Tue, 0)],
            ))
            .unwrap();

        let outcome = generate_for_template(&db, "c1", &template.id, month("2024-05")).unwrap();
        assert!(outcome.created.is_empty());
    }
}

mod idempotency_tests {
    use super::*;

    #[test]
    fn test_second_run_creates_nothing() {
        let db = seeded_db();
        let template = weekly_template(&db);

        generate_for_template(&db, "c1", &template.id, month("2024-05")).unwrap();
        let again = generate_for_template(&db, "c1", &template.id, month("2024-05")).unwrap();

        assert!(again.created.is_empty());
        assert_eq!(again.existing, 3);
        assert_eq!(db.list_client_tasks("c1").unwrap().len(), 3);
    }

    #[test]
    fn test_missing_slots_are_filled_in() {
        let db = seeded_db();
        let template = weekly_template(&db);
        generate_for_template(&db, "c1", &template.id, month("2024-05")).unwrap();

        // Pattern grows after the first run
        db.set_template_pattern_json(
            &template.id,
            r#"[{"week":1,"day_of_week":"monday","count":2},
                {"week":2,"day_of_week":"friday","count":1},
                {"week":3,"day_of_week":3,"count":1}]"#,
        )
        .unwrap();

        let outcome = generate_for_template(&db, "c1", &template.id, month("2024-05")).unwrap();
        assert_eq!(outcome.existing, 3);
        assert_eq!(outcome.created.len(), 1);
        // Third Wednesday of May 2024
        assert_eq!(outcome.created[0].due_date, Some(date(2024, 5, 15)));
        assert_eq!(db.list_client_tasks("c1").unwrap().len(), 4);
    }

    #[test]
    fn test_months_are_independent() {
        let db = seeded_db();
        let template = weekly_template(&db);

        generate_for_template(&db, "c1", &template.id, month("2024-05")).unwrap();
        let june = generate_for_template(&db, "c1", &template.id, month("2024-06")).unwrap();

        assert_eq!(june.created.len(), 3);
        assert_eq!(db.list_client_tasks("c1").unwrap().len(), 6);
    }

    #[test]
    fn test_slot_collision_is_not_an_error() {
        let db = seeded_db();
        let template = weekly_template(&db);
        let outcome = generate_for_template(&db, "c1", &template.id, month("2024-05")).unwrap();
        let first = &outcome.created[0];

        // A concurrent generator racing for the same slot
        let duplicate = NewClientTask {
            client_id: "c1".into(),
            title: first.title.clone(),
            template_id: Some(template.id.clone()),
            month_year_reference: Some(month("2024-05")),
            due_date: first.due_date,
            slot: Some(task_rollover::schedule::SlotKey {
                due_date: first.slot_date.unwrap(),
                slot_index: first.slot_index.unwrap(),
            }),
            ..Default::default()
        };
        assert!(db.insert_generated_client_task(&duplicate).unwrap().is_none());
        assert_eq!(db.list_client_tasks("c1").unwrap().len(), 3);
    }

    #[test]
    fn test_order_index_follows_pending_count() {
        let db = seeded_db();
        let template = weekly_template(&db);
        let outcome = generate_for_template(&db, "c1", &template.id, month("2024-05")).unwrap();

        let indexes: Vec<i64> = outcome.created.iter().map(|ct| ct.order_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);

        let ad_hoc = db
            .create_client_task(&NewClientTask {
                client_id: "c1".into(),
                title: "Kickoff call".into(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(ad_hoc.order_index, 3);
        assert!(ad_hoc.template_id.is_none());
    }
}

mod template_state_tests {
    use super::*;

    #[test]
    fn test_inactive_template_generates_nothing() {
        let db = seeded_db();
        let template = weekly_template(&db);
        db.set_template_active(&template.id, false).unwrap();

        let outcome = generate_for_template(&db, "c1", &template.id, month("2024-05")).unwrap();
        assert!(outcome.created.is_empty());
        assert_eq!(outcome.existing, 0);
        assert!(db.list_client_tasks("c1").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_week_rejected_without_writes() {
        let db = seeded_db();
        let template = db
            .create_template(&NewTemplate::new(
                "c1",
                "Bad",
                vec![
                    RawPatternEntry::new(1, Weekday::Mon, 1),
                    RawPatternEntry::new(6, Weekday::Mon, 1),
                ],
            ))
            .unwrap();

        let err = generate_for_template(&db, "c1", &template.id, month("2024-05")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert!(db.list_client_tasks("c1").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_pattern_json_rejected() {
        let db = seeded_db();
        let template = weekly_template(&db);
        db.set_template_pattern_json(&template.id, "{not json").unwrap();

        let err = generate_for_template(&db, "c1", &template.id, month("2024-05")).unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[test]
    fn test_unknown_client_or_foreign_template() {
        let db = seeded_db();
        db.create_client(Some("c2".into()), "u1", "Other").unwrap();
        let template = weekly_template(&db);

        let err = generate_for_template(&db, "missing", &template.id, month("2024-05")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        let err = generate_for_template(&db, "c2", &template.id, month("2024-05")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}

mod mirror_tests {
    use super::*;
    use task_rollover::schedule::generator::mirror_key;

    fn standard_template(db: &Database) -> GenerationTemplate {
        let mut new = NewTemplate::new("c1", "Reel", vec![RawPatternEntry::new(1, Weekday::Wed, 2)]);
        new.is_standard_task = true;
        db.create_template(&new).unwrap()
    }

    #[test]
    fn test_standard_tasks_get_a_linked_general_task() {
        let db = seeded_db();
        let template = standard_template(&db);

        let outcome = generate_for_template(&db, "c1", &template.id, month("2024-05")).unwrap();
        assert_eq!(outcome.mirrored, 2);

        let tasks = db.list_tasks("u1", None).unwrap();
        assert_eq!(tasks.len(), 2);
        for ct in &outcome.created {
            let main_id = ct.main_task_id.as_deref().expect("mirror linked");
            let task = db.get_task(main_id).unwrap().unwrap();
            assert_eq!(task.title, ct.title);
            assert_eq!(task.due_date, ct.due_date);
            assert_eq!(task.generation_key, Some(mirror_key(&ct.id)));
        }
    }

    #[test]
    fn test_rerun_does_not_duplicate_mirrors() {
        let db = seeded_db();
        let template = standard_template(&db);

        generate_for_template(&db, "c1", &template.id, month("2024-05")).unwrap();
        let again = generate_for_template(&db, "c1", &template.id, month("2024-05")).unwrap();

        assert_eq!(again.mirrored, 0);
        assert_eq!(db.list_tasks("u1", None).unwrap().len(), 2);
    }

    #[test]
    fn test_failed_link_is_repaired_on_retry() {
        let store = FaultyStore::new(seeded_db());
        let template = standard_template(&store.inner);
        store.link_failures.store(1, Ordering::SeqCst);

        let err = generate_for_template(&store, "c1", &template.id, month("2024-05")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::StorageError);

        // Both client tasks exist, the first mirror task exists but is unlinked
        let partial = store.inner.list_client_tasks("c1").unwrap();
        assert_eq!(partial.len(), 2);
        assert!(partial.iter().all(|ct| ct.main_task_id.is_none()));
        assert_eq!(store.inner.list_tasks("u1", None).unwrap().len(), 1);

        let retry = generate_for_template(&store, "c1", &template.id, month("2024-05")).unwrap();
        assert!(retry.created.is_empty());
        assert_eq!(retry.mirrored, 2);

        let repaired = store.inner.list_client_tasks("c1").unwrap();
        assert!(repaired.iter().all(|ct| ct.main_task_id.is_some()));
        assert_eq!(store.inner.list_tasks("u1", None).unwrap().len(), 2);
    }

    #[test]
    fn test_non_standard_tasks_are_not_mirrored() {
        let db = seeded_db();
        let template = weekly_template(&db);

        let outcome = generate_for_template(&db, "c1", &template.id, month("2024-05")).unwrap();
        assert_eq!(outcome.mirrored, 0);
        assert!(outcome.created.iter().all(|ct| ct.main_task_id.is_none()));
        assert!(db.list_tasks("u1", None).unwrap().is_empty());
    }
}
