//! Integration tests for the daily rollover engine.

mod common;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc, Weekday};
use common::{FaultyStore, date, seeded_db};
use std::sync::{Arc, Mutex};
use task_rollover::board::{Actor, complete_task};
use task_rollover::db::Database;
use task_rollover::db::templates::NewTemplate;
use task_rollover::error::{EngineError, EngineResult, ErrorCode};
use task_rollover::notify::{DigestNotifier, LogNotifier, RolloverDigest};
use task_rollover::rollover::{RolloverEngine, RolloverSettings, UserStatus, roll_user};
use task_rollover::schedule::pattern::RawPatternEntry;
use task_rollover::store::{NewClientTask, NewTask};
use task_rollover::types::{Board, Task};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn owner() -> Actor {
    Actor::Owner {
        user_id: "u1".into(),
    }
}

fn engine(db: &Arc<Database>) -> RolloverEngine {
    RolloverEngine::new(db.clone(), Arc::new(LogNotifier), RolloverSettings::default())
}

fn daily_task(db: &Database, user_id: &str, title: &str) -> Task {
    db.create_task(&NewTask {
        user_id: user_id.into(),
        title: title.into(),
        due_date: Some(date(2024, 5, 1)),
        is_daily_recurring: true,
        ..Default::default()
    })
    .unwrap()
}

/// Notifier that records every digest and optionally fails.
#[derive(Default)]
struct RecordingNotifier {
    digests: Mutex<Vec<RolloverDigest>>,
    fail: bool,
}

#[async_trait]
impl DigestNotifier for RecordingNotifier {
    async fn notify(&self, digest: &RolloverDigest) -> EngineResult<()> {
        self.digests.lock().unwrap().push(digest.clone());
        if self.fail {
            return Err(EngineError::external("push", "gateway unavailable"));
        }
        Ok(())
    }
}

mod overdue_tests {
    use super::*;

    #[tokio::test]
    async fn test_past_due_tasks_move_to_overdue() {
        let db = Arc::new(seeded_db());
        let late = db
            .create_task(&NewTask {
                user_id: "u1".into(),
                title: "Invoice".into(),
                due_date: Some(date(2024, 5, 1)),
                board: Some(Board::TodayHighPriority),
                ..Default::default()
            })
            .unwrap();
        let due_today = db
            .create_task(&NewTask {
                user_id: "u1".into(),
                title: "Call".into(),
                due_date: Some(date(2024, 5, 2)),
                ..Default::default()
            })
            .unwrap();
        let late_client = db
            .create_client_task(&NewClientTask {
                client_id: "c1".into(),
                title: "Caption".into(),
                due_date: Some(date(2024, 4, 30)),
                ..Default::default()
            })
            .unwrap();

        let outcome = engine(&db).run_user("u1", now(), Some(date(2024, 5, 2))).await.unwrap();
        assert_eq!(outcome.moved_to_overdue, 2);

        let late = db.get_task(&late.id).unwrap().unwrap();
        assert_eq!(late.current_board, Board::Overdue);
        assert_eq!(late.origin_board, Board::TodayHighPriority);
        assert!(late.last_moved_to_overdue_at.is_some());

        let due_today = db.get_task(&due_today.id).unwrap().unwrap();
        assert_eq!(due_today.current_board, Board::General);

        let late_client = db.get_client_task(&late_client.id).unwrap().unwrap();
        assert_eq!(late_client.current_board, Board::Overdue);
    }

    #[tokio::test]
    async fn test_overdue_timestamp_written_once() {
        let db = Arc::new(seeded_db());
        let task = db
            .create_task(&NewTask {
                user_id: "u1".into(),
                title: "Invoice".into(),
                due_date: Some(date(2024, 5, 1)),
                ..Default::default()
            })
            .unwrap();
        let engine = engine(&db);

        engine.run_user("u1", now(), Some(date(2024, 5, 2))).await.unwrap();
        let first = db.get_task(&task.id).unwrap().unwrap().last_moved_to_overdue_at;

        let later = now() + chrono::Duration::days(1);
        let outcome = engine.run_user("u1", later, Some(date(2024, 5, 3))).await.unwrap();
        assert_eq!(outcome.moved_to_overdue, 0);
        assert_eq!(db.get_task(&task.id).unwrap().unwrap().last_moved_to_overdue_at, first);
    }

    #[tokio::test]
    async fn test_completed_and_daily_tasks_stay_put() {
        let db = Arc::new(seeded_db());
        let done = db
            .create_task(&NewTask {
                user_id: "u1".into(),
                title: "Shipped".into(),
                due_date: Some(date(2024, 4, 20)),
                ..Default::default()
            })
            .unwrap();
        complete_task(&*db, &owner(), &done.id).unwrap();
        let daily = daily_task(&db, "u1", "Stretch");

        let outcome = engine(&db).run_user("u1", now(), Some(date(2024, 5, 2))).await.unwrap();
        assert_eq!(outcome.moved_to_overdue, 0);
        assert_eq!(
            db.get_task(&done.id).unwrap().unwrap().current_board,
            Board::Completed
        );
        assert_eq!(
            db.get_task(&daily.id).unwrap().unwrap().current_board,
            Board::General
        );
    }
}

mod daily_tests {
    use super::*;

    #[tokio::test]
    async fn test_streak_tracks_completed_days() {
        let db = Arc::new(seeded_db());
        let task = daily_task(&db, "u1", "Stretch");
        let engine = engine(&db);

        // Yesterday (Wednesday 2024-05-01) was not completed
        let outcome = engine.run_user("u1", now(), Some(date(2024, 5, 2))).await.unwrap();
        assert_eq!(outcome.status, UserStatus::Processed);
        assert_eq!(outcome.advanced, Some(1));

        let after = db.get_task(&task.id).unwrap().unwrap();
        assert_eq!(after.metrics.streak, 0);
        assert!(after.metrics.missed_days.contains(&date(2024, 5, 1)));
        assert_eq!(after.metrics.fail_by_weekday.get("wednesday"), Some(&1));
        assert_eq!(after.due_date, Some(date(2024, 5, 2)));

        for day in [3, 4] {
            complete_task(&*db, &owner(), &task.id).unwrap();
            engine
                .run_user("u1", now(), Some(date(2024, 5, day)))
                .await
                .unwrap();
        }

        let after = db.get_task(&task.id).unwrap().unwrap();
        assert_eq!(after.metrics.streak, 2);
        assert_eq!(after.metrics.total_completed, 2);
        assert_eq!(after.metrics.missed_days.len(), 1);
        assert!((after.metrics.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!(!after.is_completed);
        assert!(after.completed_at.is_none());
        assert_eq!(after.due_date, Some(date(2024, 5, 4)));
        assert_eq!(after.current_board, Board::General);
    }

    #[tokio::test]
    async fn test_second_run_same_day_is_skipped() {
        let db = Arc::new(seeded_db());
        let task = daily_task(&db, "u1", "Stretch");
        let engine = engine(&db);

        complete_task(&*db, &owner(), &task.id).unwrap();
        engine.run_user("u1", now(), Some(date(2024, 5, 2))).await.unwrap();
        let before = db.get_task(&task.id).unwrap().unwrap();

        complete_task(&*db, &owner(), &task.id).unwrap();
        let outcome = engine.run_user("u1", now(), Some(date(2024, 5, 2))).await.unwrap();
        assert_eq!(outcome.status, UserStatus::Skipped);
        assert_eq!(outcome.advanced, None);

        let after = db.get_task(&task.id).unwrap().unwrap();
        assert_eq!(after.metrics, before.metrics);
        // Today's completion is kept for tomorrow's run
        assert!(after.is_completed);

        // An older date never rewinds the watermark
        let outcome = engine.run_user("u1", now(), Some(date(2024, 4, 30))).await.unwrap();
        assert_eq!(outcome.status, UserStatus::Skipped);
        assert_eq!(db.get_user("u1").unwrap().unwrap().last_rollover_date, Some(date(2024, 5, 2)));
    }

    #[tokio::test]
    async fn test_concurrent_runs_advance_once() {
        let db = Arc::new(seeded_db());
        let task = daily_task(&db, "u1", "Stretch");
        complete_task(&*db, &owner(), &task.id).unwrap();
        let engine = engine(&db);

        let day = Some(date(2024, 5, 2));
        let (a, b) = tokio::join!(engine.run_all(now(), day), engine.run_all(now(), day));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.processed + b.processed, 1);
        assert_eq!(a.skipped + b.skipped, 1);
        let after = db.get_task(&task.id).unwrap().unwrap();
        assert_eq!(after.metrics.streak, 1);
        assert_eq!(after.metrics.total_completed, 1);
    }

    #[tokio::test]
    async fn test_skipped_days_are_recorded_as_missed() {
        let db = Arc::new(seeded_db());
        let task = daily_task(&db, "u1", "Stretch");
        let engine = engine(&db);

        engine.run_user("u1", now(), Some(date(2024, 5, 2))).await.unwrap();
        complete_task(&*db, &owner(), &task.id).unwrap();

        // No runs on 05-03 and 05-04
        let outcome = engine.run_user("u1", now(), Some(date(2024, 5, 5))).await.unwrap();
        assert_eq!(outcome.status, UserStatus::Processed);
        assert_eq!(outcome.advanced, Some(1));

        let after = db.get_task(&task.id).unwrap().unwrap();
        assert_eq!(after.metrics.total_completed, 1);
        assert_eq!(after.metrics.streak, 0);
        let missed: Vec<_> = after.metrics.missed_days.iter().copied().collect();
        assert_eq!(missed, vec![date(2024, 5, 1), date(2024, 5, 3), date(2024, 5, 4)]);
        assert_eq!(after.metrics.fail_by_weekday.get("friday"), Some(&1));
        assert_eq!(after.metrics.fail_by_weekday.get("saturday"), Some(&1));
        assert!((after.metrics.success_rate - 0.25).abs() < 1e-9);
        assert_eq!(after.due_date, Some(date(2024, 5, 5)));
    }

    #[test]
    fn test_completion_racing_advancement_is_not_lost() {
        let settings = RolloverSettings::default();
        for _ in 0..50 {
            let db = Arc::new(seeded_db());
            let task = daily_task(&db, "u1", "Stretch");
            let user = db.get_user("u1").unwrap().unwrap();

            std::thread::scope(|s| {
                s.spawn(|| roll_user(&*db, &settings, &user, now(), Some(date(2024, 5, 2))));
                s.spawn(|| complete_task(&*db, &owner(), &task.id).unwrap());
            });

            // Either advancement counted the completion or it is still pending
            let after = db.get_task(&task.id).unwrap().unwrap();
            assert!(
                after.is_completed || after.metrics.total_completed == 1,
                "completion lost: {:?}",
                after.metrics
            );
        }
    }

    #[tokio::test]
    async fn test_daily_client_tasks_advance_too() {
        let db = Arc::new(seeded_db());
        let ct = db
            .create_client_task(&NewClientTask {
                client_id: "c1".into(),
                title: "Story".into(),
                due_date: Some(date(2024, 5, 1)),
                is_daily_recurring: true,
                ..Default::default()
            })
            .unwrap();

        engine(&db).run_user("u1", now(), Some(date(2024, 5, 2))).await.unwrap();
        let after = db.get_client_task(&ct.id).unwrap().unwrap();
        assert_eq!(after.metrics.missed_days.len(), 1);
        assert_eq!(after.due_date, Some(date(2024, 5, 2)));
    }
}

mod isolation_tests {
    use super::*;

    #[tokio::test]
    async fn test_failing_user_does_not_block_others() {
        let db = seeded_db();
        db.create_user(Some("u2".into()), "Bo", None).unwrap();
        let bad_daily = daily_task(&db, "u1", "Stretch");
        let good_daily = daily_task(&db, "u2", "Read");

        let mut store = FaultyStore::new(db);
        store.fail_overdue_for.insert("u1".into());
        let store = Arc::new(store);
        let engine = RolloverEngine::new(store.clone(), Arc::new(LogNotifier), RolloverSettings::default());

        let summary = engine.run_all(now(), Some(date(2024, 5, 2))).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed, 1);

        let bad = summary.users.iter().find(|u| u.user_id == "u1").unwrap();
        assert_eq!(bad.status, UserStatus::Failed);
        assert!(bad.errors[0].starts_with("overdue"));
        // Later steps still ran for the failing user
        assert_eq!(bad.advanced, Some(1));

        let good = summary.users.iter().find(|u| u.user_id == "u2").unwrap();
        assert_eq!(good.status, UserStatus::Processed);

        for id in [&bad_daily.id, &good_daily.id] {
            let task = store.inner.get_task(id).unwrap().unwrap();
            assert_eq!(task.metrics.missed_days.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_bad_template_does_not_fail_user() {
        let db = Arc::new(seeded_db());
        db.create_template(&NewTemplate::new(
            "c1",
            "Post",
            vec![
                RawPatternEntry::new(1, Weekday::Mon, 2),
                RawPatternEntry::new(2, Weekday::Fri, 1),
            ],
        ))
        .unwrap();
        let broken = db
            .create_template(&NewTemplate::new("c1", "Broken", vec![RawPatternEntry::new(1, Weekday::Mon, 1)]))
            .unwrap();
        db.set_template_pattern_json(&broken.id, "[{\"week\": 9}]").unwrap();

        let outcome = engine(&db).run_user("u1", now(), Some(date(2024, 5, 2))).await.unwrap();
        assert_eq!(outcome.status, UserStatus::Processed);
        assert_eq!(outcome.generated, 3);
        assert_eq!(outcome.template_errors.len(), 1);
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn test_notifier_failure_is_ignored() {
        let db = Arc::new(seeded_db());
        daily_task(&db, "u1", "Stretch");
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let engine = RolloverEngine::new(db.clone(), notifier.clone(), RolloverSettings::default());

        let summary = engine.run_all(now(), Some(date(2024, 5, 2))).await.unwrap();
        assert_eq!(summary.processed, 1);

        let digests = notifier.digests.lock().unwrap();
        assert_eq!(digests.len(), 1);
        assert_eq!(digests[0].user_id, "u1");
        assert_eq!(digests[0].recurring_missed, 1);
        assert_eq!(digests[0].date, Some(date(2024, 5, 2)));
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let db = Arc::new(seeded_db());
        let err = engine(&db).run_user("ghost", now(), None).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}

mod generation_tests {
    use super::*;

    fn monthly_template(db: &Database) {
        db.create_template(&NewTemplate::new(
            "c1",
            "Post",
            vec![RawPatternEntry::new(1, Weekday::Mon, 1)],
        ))
        .unwrap();
    }

    #[tokio::test]
    async fn test_rollover_generates_current_month_once() {
        let db = Arc::new(seeded_db());
        monthly_template(&db);
        let engine = engine(&db);

        let first = engine.run_user("u1", now(), Some(date(2024, 5, 2))).await.unwrap();
        assert_eq!(first.generated, 1);

        let second = engine.run_user("u1", now(), Some(date(2024, 5, 3))).await.unwrap();
        assert_eq!(second.generated, 0);
        assert_eq!(db.list_client_tasks("c1").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lookahead_includes_next_month() {
        let db = Arc::new(seeded_db());
        monthly_template(&db);
        let settings = RolloverSettings {
            generation_lookahead_days: 7,
            ..Default::default()
        };
        let engine = RolloverEngine::new(db.clone(), Arc::new(LogNotifier), settings);

        let outcome = engine.run_user("u1", now(), Some(date(2024, 5, 28))).await.unwrap();
        assert_eq!(outcome.generated, 2);
    }
}

mod timezone_tests {
    use super::*;

    #[tokio::test]
    async fn test_today_is_local_to_the_user() {
        let db = Arc::new(seeded_db());
        db.create_user(Some("kiri".into()), "Kai", Some("Pacific/Kiritimati")).unwrap();

        // 12:00 UTC is already the next day at UTC+14
        let outcome = engine(&db).run_user("kiri", now(), None).await.unwrap();
        assert_eq!(outcome.today, Some(date(2024, 5, 2)));
        assert_eq!(outcome.timezone, "Pacific/Kiritimati");

        let outcome = engine(&db).run_user("u1", now(), None).await.unwrap();
        assert_eq!(outcome.today, Some(date(2024, 5, 1)));
    }

    #[tokio::test]
    async fn test_unknown_timezone_falls_back_to_default() {
        let db = Arc::new(seeded_db());
        db.create_user(Some("lost".into()), "Lu", Some("Mars/Olympus")).unwrap();

        let outcome = engine(&db).run_user("lost", now(), None).await.unwrap();
        assert_ne!(outcome.status, UserStatus::Failed);
        assert_eq!(outcome.timezone, "UTC");
        assert_eq!(outcome.today, Some(date(2024, 5, 1)));
    }
}
