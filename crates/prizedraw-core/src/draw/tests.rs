//! Tests for the draw engine.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;

use super::engine::commit_inventory;
use super::*;
use crate::EngineError;
use crate::config::EventConfig;
use crate::store::{AwardCategory, Credit, Repository, SqliteStore};

const VACATION: &str = "Vacation Reward Card";

fn setup(policy: &str, awards: &str) -> (DrawEngine, SqliteStore) {
    let toml = format!(
        "[game]\napp_secret = \"s\"\n\n[draw]\non_system_fault = \"{policy}\"\n\n{awards}"
    );
    let config = Arc::new(EventConfig::from_toml(&toml).unwrap());
    let store = SqliteStore::in_memory().unwrap();
    store.seed_awards(&config.awards).unwrap();
    (DrawEngine::new(config, store.clone()), store)
}

fn player(store: &SqliteStore, user_id: &str, chances: i64) {
    store.register_user(user_id).unwrap();
    store
        .immediate(|tx| Repository::new(tx).credit_user(user_id, 0, chances))
        .map(|credit| assert_eq!(credit, Credit::Applied))
        .unwrap();
}

fn award_id(store: &SqliteStore, name: &str) -> i64 {
    store
        .awards()
        .unwrap()
        .into_iter()
        .find(|award| award.name == name)
        .unwrap()
        .id
}

#[test]
fn test_out_of_stock_award_is_never_selected() {
    let (engine, store) = setup(
        "refund",
        r#"
        [[awards]]
        name = "Sold out"
        category = "regular"
        total = 0
        weight = 1

        [[awards]]
        name = "Mug"
        category = "regular"
        total = 5
        weight = 3
        "#,
    );
    player(&store, "alice", 6);
    let mug = award_id(&store, "Mug");

    for seed in 0..5 {
        let outcome = engine
            .draw_with_rng("alice", &mut StdRng::seed_from_u64(seed))
            .unwrap();
        assert_eq!(outcome.award.id, mug);
        assert!(!outcome.fallback);
    }
    assert_eq!(store.award(mug).unwrap().unwrap().remaining, 0);

    let err = engine.draw("alice").unwrap_err();
    assert!(matches!(err, EngineError::InventoryExhausted), "{err:?}");
}

#[test]
fn test_no_chances_rejected_without_side_effects() {
    let (engine, store) = setup(
        "refund",
        "[[awards]]\nname = \"Mug\"\ncategory = \"regular\"\ntotal = 5\nweight = 1\n",
    );
    player(&store, "alice", 0);

    let err = engine.draw("alice").unwrap_err();
    assert!(matches!(err, EngineError::NoChances { .. }), "{err:?}");
    assert_eq!(store.user("alice").unwrap().unwrap().chances, 0);
    assert_eq!(store.awards().unwrap()[0].remaining, 5);
    assert!(store.draw_records(0, 10).unwrap().is_empty());
}

#[test]
fn test_unknown_user_rejected() {
    let (engine, store) = setup(
        "refund",
        "[[awards]]\nname = \"Mug\"\ncategory = \"regular\"\ntotal = 5\nweight = 1\n",
    );

    let err = engine.draw("ghost").unwrap_err();
    assert!(matches!(err, EngineError::UnknownUser { .. }), "{err:?}");
    assert!(store.user("ghost").unwrap().is_none());
}

#[test]
fn test_draw_takes_chance_and_stock_and_links_audit() {
    let (engine, store) = setup(
        "refund",
        "[[awards]]\nname = \"Mug\"\ncategory = \"regular\"\ntotal = 5\nweight = 1\n",
    );
    player(&store, "alice", 2);

    let first = engine.draw("alice").unwrap();
    let second = engine.draw("alice").unwrap();

    assert_eq!(store.user("alice").unwrap().unwrap().chances, 0);
    assert_eq!(second.award.remaining, 3);
    assert_eq!(store.awards().unwrap()[0].remaining, 3);
    assert_eq!(second.link.prev_hash, first.link.final_hash);
    assert_eq!(second.link.award_name, "Mug");

    let report = engine.audit().verify(&store).unwrap();
    assert_eq!(report.links, 2);
    assert_eq!(report.head, Some(second.link.final_hash));
}

#[test]
fn test_exclusive_award_won_at_most_once() {
    let (engine, store) = setup(
        "refund",
        &format!(
            r#"
            [[awards]]
            name = "{VACATION}"
            category = "grand"
            total = 10
            weight = 1000

            [[awards]]
            name = "Thanks for playing"
            category = "sunshine"
            total = 100
            weight = 0
            "#
        ),
    );
    player(&store, "alice", 5);

    let names: Vec<String> = (0..5)
        .map(|_| engine.draw("alice").unwrap().award.name)
        .collect();

    assert_eq!(names[0], VACATION);
    assert_eq!(names.iter().filter(|name| *name == VACATION).count(), 1);
    assert_eq!(store.award(award_id(&store, VACATION)).unwrap().unwrap().remaining, 9);
}

#[test]
fn test_exclusive_filter_can_exhaust_inventory() {
    let (engine, store) = setup(
        "refund",
        &format!("[[awards]]\nname = \"{VACATION}\"\ncategory = \"grand\"\ntotal = 10\nweight = 1\n"),
    );
    player(&store, "alice", 2);

    engine.draw("alice").unwrap();
    let err = engine.draw("alice").unwrap_err();

    assert!(matches!(err, EngineError::InventoryExhausted), "{err:?}");
    assert!(err.requires_escalation());
    assert_eq!(store.user("alice").unwrap().unwrap().chances, 1);
}

#[test]
fn test_refund_policy_rolls_back_chance() {
    let (engine, store) = setup(
        "refund",
        "[[awards]]\nname = \"Phone\"\ncategory = \"grand\"\ntotal = 1\nweight = 1\n",
    );
    player(&store, "alice", 2);

    engine.draw("alice").unwrap();
    let err = engine.draw("alice").unwrap_err();

    assert!(matches!(err, EngineError::InventoryExhausted), "{err:?}");
    assert_eq!(store.user("alice").unwrap().unwrap().chances, 1);
    assert_eq!(store.draw_records(0, 10).unwrap().len(), 1);
}

#[test]
fn test_forfeit_policy_keeps_deduction() {
    let (engine, store) = setup(
        "forfeit",
        "[[awards]]\nname = \"Phone\"\ncategory = \"grand\"\ntotal = 1\nweight = 1\n",
    );
    player(&store, "alice", 2);

    engine.draw("alice").unwrap();
    let err = engine.draw("alice").unwrap_err();

    assert!(matches!(err, EngineError::InventoryExhausted), "{err:?}");
    assert_eq!(store.user("alice").unwrap().unwrap().chances, 0);
    assert_eq!(store.draw_records(0, 10).unwrap().len(), 1);
}

#[test]
fn test_forfeit_policy_does_not_apply_to_user_errors() {
    let (engine, store) = setup(
        "forfeit",
        "[[awards]]\nname = \"Phone\"\ncategory = \"grand\"\ntotal = 1\nweight = 1\n",
    );
    player(&store, "alice", 0);

    let err = engine.draw("alice").unwrap_err();
    assert!(matches!(err, EngineError::NoChances { .. }), "{err:?}");
    assert_eq!(store.user("alice").unwrap().unwrap().chances, 0);
}

#[test]
fn test_point_award_credits_score() {
    let (engine, store) = setup(
        "refund",
        "[[awards]]\nname = \"100 points\"\ncategory = \"points\"\ntotal = 5\nweight = 1\nvalue = 100\n",
    );
    player(&store, "alice", 2);

    let outcome = engine.draw("alice").unwrap();
    assert_eq!(outcome.award.category, AwardCategory::Points);
    engine.draw("alice").unwrap();

    let user = store.user("alice").unwrap().unwrap();
    assert_eq!(user.total_score, 200);
    assert_eq!(user.chances, 0);
}

#[test]
fn test_non_point_award_leaves_score() {
    let (engine, store) = setup(
        "refund",
        "[[awards]]\nname = \"Mug\"\ncategory = \"regular\"\ntotal = 5\nweight = 1\nvalue = 100\n",
    );
    player(&store, "alice", 1);

    engine.draw("alice").unwrap();
    assert_eq!(store.user("alice").unwrap().unwrap().total_score, 0);
}

#[test]
fn test_collision_falls_back_to_sunshine_once() {
    let (_, store) = setup(
        "refund",
        r#"
        [[awards]]
        name = "Phone"
        category = "grand"
        total = 1
        weight = 1

        [[awards]]
        name = "Thanks for playing"
        category = "sunshine"
        total = 1
        weight = 1
        "#,
    );
    let awards = store.awards().unwrap();
    let (phone, thanks) = (awards[0].clone(), awards[1].clone());

    // A concurrent draw took the phone after it was read.
    let (awarded, fallback) = store
        .immediate(|tx| {
            let repo = Repository::new(tx);
            assert!(repo.take_award_if_in_stock(phone.id)?);
            commit_inventory(&repo, phone.clone())
        })
        .unwrap();
    assert!(fallback);
    assert_eq!(awarded.id, thanks.id);
    assert_eq!(awarded.remaining, 0);

    let err = store
        .immediate(|tx| commit_inventory(&Repository::new(tx), phone.clone()))
        .unwrap_err();
    assert!(
        matches!(err, EngineError::PrizeCollision { award_id } if award_id == phone.id),
        "{err:?}"
    );
    assert_eq!(store.award(thanks.id).unwrap().unwrap().remaining, 0);
}

#[test]
fn test_commit_inventory_without_collision() {
    let (_, store) = setup(
        "refund",
        "[[awards]]\nname = \"Mug\"\ncategory = \"regular\"\ntotal = 2\nweight = 1\n",
    );
    let mug = store.awards().unwrap().remove(0);

    let (awarded, fallback) = store
        .immediate(|tx| commit_inventory(&Repository::new(tx), mug.clone()))
        .unwrap();
    assert!(!fallback);
    assert_eq!(awarded.remaining, 1);
    assert_eq!(store.award(mug.id).unwrap().unwrap().remaining, 1);
}

#[test]
fn test_empty_exclusive_name_disables_rule() {
    let toml = r#"
        [game]
        app_secret = "s"

        [draw]
        exclusive_award = ""

        [[awards]]
        name = "Vacation Reward Card"
        category = "grand"
        total = 3
        weight = 1
    "#;
    let config = Arc::new(EventConfig::from_toml(toml).unwrap());
    let store = SqliteStore::in_memory().unwrap();
    store.seed_awards(&config.awards).unwrap();
    let engine = DrawEngine::new(config, store.clone());
    player(&store, "alice", 3);

    for _ in 0..3 {
        assert_eq!(engine.draw("alice").unwrap().award.name, VACATION);
    }
}

#[test]
fn test_point_award_overflow_rolls_back() {
    let (engine, store) = setup(
        "forfeit",
        "[[awards]]\nname = \"100 points\"\ncategory = \"points\"\ntotal = 5\nweight = 1\nvalue = 100\n",
    );
    player(&store, "alice", 1);
    store
        .immediate(|tx| Repository::new(tx).credit_user("alice", i64::MAX - 50, 0))
        .unwrap();

    let err = engine.draw("alice").unwrap_err();

    assert!(matches!(err, EngineError::InvalidData { .. }), "{err:?}");
    let user = store.user("alice").unwrap().unwrap();
    assert_eq!(user.total_score, i64::MAX - 50);
    assert_eq!(user.chances, 1);
    assert_eq!(store.awards().unwrap()[0].remaining, 5);
    assert!(store.draw_records(0, 10).unwrap().is_empty());
}
