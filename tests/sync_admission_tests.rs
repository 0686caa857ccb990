//! Integration tests for sync admission control against SQLite.

use chrono::{TimeZone, Utc};
use connector_registry::models::{Patch, RunStatus};
use connector_registry::repositories::{ConnectorPatch, ConnectorRepository};
use connector_registry::sync_admission::{AdmissionOutcome, SyncAdmission};
use sea_orm::prelude::DateTimeWithTimeZone;

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{create_test_connector, setup_pooled_test_db, setup_test_db};

#[tokio::test]
async fn full_lifecycle_scenario() {
    let db = setup_test_db().await.unwrap();
    let repo = ConnectorRepository::new(&db);
    let admission = SyncAdmission::new(&db);

    let created = create_test_connector(&db, "gh-to-pg").await.unwrap();
    assert_eq!(created.run_status, RunStatus::NotRunYet);

    let outcome = admission.trigger(created.id).await.unwrap();
    assert!(outcome.accepted());
    let AdmissionOutcome::Admitted(running) = outcome else {
        panic!("expected admission, got {outcome:?}");
    };
    assert_eq!(running.run_status, RunStatus::Running);
    assert_eq!(running.last_run_at, Some(running.updated_at));
    assert!(running.updated_at > created.updated_at);
    assert_eq!(repo.get(created.id).await.unwrap().unwrap(), running);

    let outcome = admission.trigger(created.id).await.unwrap();
    assert_eq!(outcome, AdmissionOutcome::AlreadyRunning);
    assert_eq!(outcome.reason(), "already running");
    assert_eq!(repo.get(created.id).await.unwrap().unwrap(), running);

    let finished_at: DateTimeWithTimeZone = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap().into();
    let finished = repo
        .update(
            created.id,
            ConnectorPatch {
                run_status: Patch::Set(RunStatus::Success),
                last_run_at: Patch::Set(Some(finished_at)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(finished.run_status, RunStatus::Success);

    let outcome = admission.trigger(created.id).await.unwrap();
    assert!(outcome.accepted());
}

#[tokio::test]
async fn trigger_is_admitted_after_failure() {
    let db = setup_test_db().await.unwrap();
    let created = create_test_connector(&db, "gh-to-pg").await.unwrap();
    let admission = SyncAdmission::new(&db);

    assert!(admission.trigger(created.id).await.unwrap().accepted());
    ConnectorRepository::new(&db)
        .update(
            created.id,
            ConnectorPatch {
                run_status: Patch::Set(RunStatus::Failure),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(admission.trigger(created.id).await.unwrap().accepted());
}

#[tokio::test]
async fn trigger_for_missing_connector_is_an_outcome() {
    let db = setup_test_db().await.unwrap();

    let outcome = SyncAdmission::new(&db).trigger(31337).await.unwrap();

    assert_eq!(outcome, AdmissionOutcome::NotFound);
    assert!(!outcome.accepted());
    assert_eq!(outcome.reason(), "connector not found");
}

#[tokio::test]
async fn concurrent_triggers_admit_exactly_one() {
    let (_dir, db) = setup_pooled_test_db(8).await.unwrap();
    let created = create_test_connector(&db, "gh-to-pg").await.unwrap();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let db = db.clone();
            let id = created.id;
            tokio::spawn(async move { SyncAdmission::new(&db).trigger(id).await })
        })
        .collect();

    let mut admitted = Vec::new();
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            AdmissionOutcome::Admitted(running) => admitted.push(running),
            AdmissionOutcome::AlreadyRunning => {}
            AdmissionOutcome::NotFound => panic!("connector vanished"),
        }
    }

    assert_eq!(admitted.len(), 1);
    let stored = ConnectorRepository::new(&db)
        .get(created.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, admitted[0]);
}

#[tokio::test]
async fn trigger_racing_an_update_to_running_never_double_starts() {
    let (_dir, db) = setup_pooled_test_db(4).await.unwrap();
    let created = create_test_connector(&db, "gh-to-pg").await.unwrap();
    let repo = ConnectorRepository::new(&db);
    let id = created.id;

    for _ in 0..10 {
        repo.update(
            id,
            ConnectorPatch {
                run_status: Patch::Set(RunStatus::Success),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let trigger = {
            let db = db.clone();
            tokio::spawn(async move { SyncAdmission::new(&db).trigger(id).await })
        };
        let update = {
            let db = db.clone();
            let started_at: DateTimeWithTimeZone = Utc::now().into();
            tokio::spawn(async move {
                ConnectorRepository::new(&db)
                    .update(
                        id,
                        ConnectorPatch {
                            run_status: Patch::Set(RunStatus::Running),
                            last_run_at: Patch::Set(Some(started_at)),
                            ..Default::default()
                        },
                    )
                    .await
            })
        };

        let outcome = trigger.await.unwrap().unwrap();
        let updated = update.await.unwrap().unwrap();
        let stored = repo.get(id).await.unwrap().unwrap();

        match outcome {
            // The update landed afterwards and set `running` again
            AdmissionOutcome::Admitted(running) => {
                assert!(updated.updated_at > running.updated_at);
                assert_eq!(stored, updated);
            }
            // The update landed first, so the trigger saw `running`
            AdmissionOutcome::AlreadyRunning => assert_eq!(stored, updated),
            AdmissionOutcome::NotFound => panic!("connector vanished"),
        }
        assert_eq!(stored.run_status, RunStatus::Running);
        assert!(stored.last_run_at.is_some());
    }
}

#[tokio::test]
async fn rejected_trigger_leaves_record_untouched() {
    let db = setup_test_db().await.unwrap();
    let created = create_test_connector(&db, "gh-to-pg").await.unwrap();
    let admission = SyncAdmission::new(&db);
    let repo = ConnectorRepository::new(&db);

    admission.trigger(created.id).await.unwrap();
    let before = repo.get(created.id).await.unwrap().unwrap();

    for _ in 0..3 {
        assert!(!admission.trigger(created.id).await.unwrap().accepted());
    }

    assert_eq!(repo.get(created.id).await.unwrap().unwrap(), before);
}
