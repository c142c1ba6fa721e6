//! Tests for `src/blacklist.rs`: set semantics over SQLite.

use smsrelay::blacklist::{Blacklist, SqliteBlacklist};

use crate::support::open_pool;

fn numbers(list: &[&str]) -> Vec<String> {
    list.iter().map(|n| (*n).to_owned()).collect()
}

#[tokio::test]
async fn add_reports_only_new_members() {
    let blacklist = SqliteBlacklist::new(open_pool().await);

    let added = blacklist
        .add(&numbers(&["+15550001", "+15550002"]))
        .await
        .expect("add");
    assert_eq!(added, 2);

    let added = blacklist
        .add(&numbers(&["+15550002", "+15550003"]))
        .await
        .expect("add again");
    assert_eq!(added, 1);

    assert_eq!(
        blacklist.list_all().await.expect("list"),
        vec!["+15550001", "+15550002", "+15550003"]
    );
}

#[tokio::test]
async fn add_empty_slice_is_a_no_op() {
    let blacklist = SqliteBlacklist::new(open_pool().await);
    assert_eq!(blacklist.add(&[]).await.expect("add"), 0);
    assert!(blacklist.list_all().await.expect("list").is_empty());
}

#[tokio::test]
async fn contains_reflects_membership() {
    let blacklist = SqliteBlacklist::new(open_pool().await);
    blacklist
        .add(&numbers(&["+15550001"]))
        .await
        .expect("add");

    assert!(blacklist.contains("+15550001").await.expect("contains"));
    assert!(!blacklist.contains("+15550009").await.expect("contains"));
}

#[tokio::test]
async fn remove_reports_whether_a_member_was_deleted() {
    let blacklist = SqliteBlacklist::new(open_pool().await);
    blacklist
        .add(&numbers(&["+15550001"]))
        .await
        .expect("add");

    assert_eq!(blacklist.remove("+15550001").await.expect("remove"), 1);
    assert_eq!(blacklist.remove("+15550001").await.expect("remove again"), 0);
    assert!(!blacklist.contains("+15550001").await.expect("contains"));
}

#[tokio::test]
async fn set_keys_are_isolated() {
    let pool = open_pool().await;
    let primary = SqliteBlacklist::new(pool.clone());
    let other = SqliteBlacklist::with_set_key(pool, "other_set");

    primary
        .add(&numbers(&["+15550001"]))
        .await
        .expect("add");

    assert!(primary.contains("+15550001").await.expect("contains"));
    assert!(!other.contains("+15550001").await.expect("contains other"));
    assert!(other.list_all().await.expect("list other").is_empty());
}
