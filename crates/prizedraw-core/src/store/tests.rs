//! Tests for the storage layer.

use std::sync::{Arc, Barrier};
use std::thread;

use tempfile::TempDir;

use super::*;

fn award(name: &str, category: AwardCategory, total: i64, weight: i64) -> AwardSpec {
    AwardSpec {
        name: name.to_string(),
        category,
        total,
        weight,
        value: 0,
        image_url: String::new(),
    }
}

fn game_record(user_id: &str, nonce: &str) -> GameRecord {
    GameRecord {
        seq_id: None,
        user_id: user_id.to_string(),
        game_id: GameRecord::game_id_for(user_id, nonce),
        score: 100,
        duration: 60,
        nonce: nonce.to_string(),
        signature: "sig".to_string(),
        timestamp: "1700000000".to_string(),
        created_at_ns: now_ns(),
    }
}

#[test]
fn test_open_file_backed_store() {
    let dir = TempDir::new().expect("failed to create temp dir");
    let path = dir.path().join("store.db");
    let store = SqliteStore::open(&path).expect("failed to open store");
    assert_eq!(store.path(), Some(path.as_path()));

    store.register_user("alice").expect("register");
    drop(store);

    let reopened = SqliteStore::open(&path).expect("failed to reopen store");
    assert!(reopened.user("alice").expect("read").is_some());
}

#[test]
fn test_register_user_is_idempotent() {
    let store = SqliteStore::in_memory().unwrap();

    let first = store.register_user("alice").unwrap();
    assert_eq!(first.chances, 0);
    assert_eq!(first.total_score, 0);

    store
        .immediate(|tx| Repository::new(tx).credit_user("alice", 10, 2))
        .unwrap();

    let second = store.register_user("alice").unwrap();
    assert_eq!(second.chances, 2);
    assert_eq!(second.total_score, 10);
    assert_eq!(second.created_at_ns, first.created_at_ns);
}

#[test]
fn test_seed_awards_only_once() {
    let store = SqliteStore::in_memory().unwrap();
    let catalog = vec![
        award("Grand", AwardCategory::Grand, 1, 1),
        award("Sunshine", AwardCategory::Sunshine, 1000, 90),
    ];

    assert_eq!(store.seed_awards(&catalog).unwrap(), 2);
    assert_eq!(store.seed_awards(&catalog).unwrap(), 0);

    let awards = store.awards().unwrap();
    assert_eq!(awards.len(), 2);
    assert_eq!(awards[0].remaining, awards[0].total);
    assert_eq!(awards[1].category, AwardCategory::Sunshine);
}

#[test]
fn test_seed_awards_rolls_back_on_duplicate_name() {
    let store = SqliteStore::in_memory().unwrap();
    let catalog = vec![
        award("Same", AwardCategory::Regular, 1, 1),
        award("Same", AwardCategory::Regular, 1, 1),
    ];

    assert!(store.seed_awards(&catalog).is_err());
    assert!(store.awards().unwrap().is_empty());
}

#[test]
fn test_take_chance_never_goes_negative() {
    let store = SqliteStore::in_memory().unwrap();
    store.register_user("alice").unwrap();
    store
        .immediate(|tx| Repository::new(tx).credit_user("alice", 0, 1))
        .unwrap();

    let taken = store
        .immediate(|tx| Repository::new(tx).take_chance_if_positive("alice"))
        .unwrap();
    let taken_again = store
        .immediate(|tx| Repository::new(tx).take_chance_if_positive("alice"))
        .unwrap();

    assert!(taken);
    assert!(!taken_again);
    assert_eq!(store.user("alice").unwrap().unwrap().chances, 0);
}

#[test]
fn test_take_chance_unknown_user() {
    let store = SqliteStore::in_memory().unwrap();
    let taken = store
        .immediate(|tx| Repository::new(tx).take_chance_if_positive("ghost"))
        .unwrap();
    assert!(!taken);
}

#[test]
fn test_take_award_stops_at_zero() {
    let store = SqliteStore::in_memory().unwrap();
    store
        .seed_awards(&[award("Pen", AwardCategory::Regular, 2, 1)])
        .unwrap();
    let id = store.awards().unwrap()[0].id;

    let results: Vec<bool> = (0..3)
        .map(|_| {
            store
                .immediate(|tx| Repository::new(tx).take_award_if_in_stock(id))
                .unwrap()
        })
        .collect();

    assert_eq!(results, vec![true, true, false]);
    assert_eq!(store.award(id).unwrap().unwrap().remaining, 0);
    assert!(store.read(|repo| repo.awards_in_stock()).unwrap().is_empty());
}

#[test]
fn test_concurrent_award_decrements_conserve_stock() {
    let store = SqliteStore::in_memory().unwrap();
    store
        .seed_awards(&[award("Mug", AwardCategory::Regular, 5, 1)])
        .unwrap();
    let id = store.awards().unwrap()[0].id;

    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store
                    .immediate(|tx| Repository::new(tx).take_award_if_in_stock(id))
                    .unwrap()
            })
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|taken| *taken)
        .count();

    assert_eq!(successes, 5);
    assert_eq!(store.award(id).unwrap().unwrap().remaining, 0);
}

#[test]
fn test_first_sunshine_in_stock_skips_exhausted() {
    let store = SqliteStore::in_memory().unwrap();
    store
        .seed_awards(&[
            award("Empty sunshine", AwardCategory::Sunshine, 0, 1),
            award("Regular", AwardCategory::Regular, 5, 1),
            award("Sunshine", AwardCategory::Sunshine, 5, 1),
        ])
        .unwrap();

    let fallback = store
        .read(|repo| repo.first_sunshine_in_stock())
        .unwrap()
        .expect("sunshine award in stock");
    assert_eq!(fallback.name, "Sunshine");
}

#[test]
fn test_game_record_nonce_is_unique() {
    let store = SqliteStore::in_memory().unwrap();

    store
        .immediate(|tx| Repository::new(tx).insert_game_record(&game_record("alice", "n-1")))
        .unwrap();

    // Same nonce from another user still collides: nonces are global.
    let err = store
        .immediate(|tx| Repository::new(tx).insert_game_record(&game_record("bob", "n-1")))
        .unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation { .. }), "{err:?}");

    let records = store.game_records_for_user("alice").unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].game_id, "alice-n-1");
    assert!(store.game_records_for_user("bob").unwrap().is_empty());
}

#[test]
fn test_failed_transaction_rolls_back() {
    let store = SqliteStore::in_memory().unwrap();
    store.register_user("alice").unwrap();

    let result: Result<(), StoreError> = store.immediate(|tx| {
        let repo = Repository::new(tx);
        repo.credit_user("alice", 500, 5)?;
        Err(StoreError::LockPoisoned)
    });
    assert!(result.is_err());

    let user = store.user("alice").unwrap().unwrap();
    assert_eq!(user.total_score, 0);
    assert_eq!(user.chances, 0);
}

#[test]
fn test_immediate_with_keeps_partial_work() {
    let store = SqliteStore::in_memory().unwrap();
    store.register_user("alice").unwrap();

    let result: Result<(), StoreError> = store.immediate_with(
        |tx| {
            Repository::new(tx).credit_user("alice", 0, 3)?;
            Err(StoreError::LockPoisoned)
        },
        |err| matches!(err, StoreError::LockPoisoned),
    );
    assert!(result.is_err());
    assert_eq!(store.user("alice").unwrap().unwrap().chances, 3);
}

#[test]
fn test_draw_records_ordered_and_latest() {
    let store = SqliteStore::in_memory().unwrap();
    store
        .seed_awards(&[award("Pen", AwardCategory::Regular, 10, 1)])
        .unwrap();
    let id = store.awards().unwrap()[0].id;

    assert!(store.read(|repo| repo.latest_draw_record()).unwrap().is_none());

    for n in 0..3 {
        let record = DrawRecord {
            seq_id: None,
            user_id: format!("user-{n}"),
            award_id: id,
            award_name: "Pen".to_string(),
            prev_hash: format!("prev-{n}"),
            data_hash: format!("data-{n}"),
            final_hash: format!("final-{n}"),
            created_at_ns: 1_000 + n,
        };
        store
            .immediate(|tx| Repository::new(tx).insert_draw_record(&record))
            .unwrap();
    }

    let latest = store
        .read(|repo| repo.latest_draw_record())
        .unwrap()
        .unwrap();
    assert_eq!(latest.final_hash, "final-2");

    let records = store.draw_records(0, 10).unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].seq_id, Some(1));
    assert_eq!(records[2].seq_id, Some(3));
    assert_eq!(store.draw_records(3, 10).unwrap().len(), 1);
    assert_eq!(store.draw_count_for_award(id).unwrap(), 3);

    let has_won = store
        .read(|repo| repo.has_won_award("user-1", "Pen"))
        .unwrap();
    let has_not_won = store
        .read(|repo| repo.has_won_award("user-9", "Pen"))
        .unwrap();
    assert!(has_won);
    assert!(!has_not_won);
}

#[test]
fn test_category_codes_roundtrip() {
    for category in [
        AwardCategory::Grand,
        AwardCategory::Regular,
        AwardCategory::Sunshine,
        AwardCategory::Points,
    ] {
        assert_eq!(AwardCategory::from_code(category.code()), Some(category));
    }
    assert_eq!(AwardCategory::from_code(0), None);
}

#[test]
fn test_credit_user_refuses_to_overflow() {
    let store = SqliteStore::in_memory().unwrap();
    store.register_user("alice").unwrap();
    let credit = |score: i64, chances: i64| {
        store
            .immediate(|tx| Repository::new(tx).credit_user("alice", score, chances))
            .unwrap()
    };

    assert_eq!(credit(i64::MAX - 1, 0), Credit::Applied);
    assert_eq!(credit(1, 0), Credit::Applied);
    assert_eq!(credit(1, 0), Credit::Overflow);
    assert_eq!(credit(0, i64::MAX), Credit::Applied);
    assert_eq!(credit(0, 1), Credit::Overflow);

    // The row stays readable as integers.
    let user = store.user("alice").unwrap().unwrap();
    assert_eq!(user.total_score, i64::MAX);
    assert_eq!(user.chances, i64::MAX);
}

#[test]
fn test_credit_unknown_user() {
    let store = SqliteStore::in_memory().unwrap();
    let credit = store
        .immediate(|tx| Repository::new(tx).credit_user("ghost", 1, 1))
        .unwrap();
    assert_eq!(credit, Credit::UnknownUser);
}
