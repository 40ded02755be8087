//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 按标签失效集成测试

#[path = "../common/mod.rs"]
mod common;

use common::{bytes, memory_facade, BackendCall};
use std::time::Duration;
use tagcache::{tags, CacheStore};

/// 用户与VIP标签的典型场景
#[tokio::test]
async fn test_users_and_vip_scenario() {
    common::setup_logging();
    let (facade, backend) = memory_facade(&common::generate_unique_service_name("scenario"));

    facade
        .set("u:1", bytes("alice"), None, &tags(["users"]))
        .await
        .unwrap();
    facade
        .set("u:2", bytes("bob"), None, &tags(["users", "vip"]))
        .await
        .unwrap();

    facade.invalidate_by_tags(&tags(["vip"])).await.unwrap();
    assert_eq!(facade.get("u:2").await, None);
    assert_eq!(facade.get("u:1").await, Some(bytes("alice")));
    assert!(!backend.contains("u:2"));

    facade.invalidate_by_tags(&tags(["users"])).await.unwrap();
    assert_eq!(facade.get("u:1").await, None);
    assert!(!backend.contains("u:1"));
    assert!(facade.fast().is_empty().await);
    assert!(facade.fast().index_is_consistent().await);
}

#[tokio::test]
async fn test_invalidation_removes_all_tagged_keys_in_both_tiers() {
    let (facade, backend) = memory_facade(&common::generate_unique_service_name("both_tiers"));

    facade
        .set("k1", bytes("1"), None, &tags(["t"]))
        .await
        .unwrap();
    facade
        .set("k2", bytes("2"), None, &tags(["t"]))
        .await
        .unwrap();
    facade
        .set("other", bytes("3"), None, &tags(["x"]))
        .await
        .unwrap();

    facade.invalidate_by_tags(&tags(["t"])).await.unwrap();

    for key in ["k1", "k2"] {
        assert!(!facade.fast().contains_key(key).await);
        assert!(!backend.contains(key));
        assert_eq!(facade.get(key).await, None);
    }
    assert_eq!(facade.get("other").await, Some(bytes("3")));
}

/// 失效语义是给定标签的并集
#[tokio::test]
async fn test_invalidation_is_union_over_tags() {
    let (facade, _backend) = memory_facade(&common::generate_unique_service_name("union"));

    facade
        .set("both", bytes("b"), None, &tags(["t1", "t2"]))
        .await
        .unwrap();
    facade
        .set("only_t2", bytes("o"), None, &tags(["t2"]))
        .await
        .unwrap();

    facade.invalidate_by_tags(&tags(["t1"])).await.unwrap();
    assert_eq!(facade.get("both").await, None);
    assert_eq!(facade.get("only_t2").await, Some(bytes("o")));
    // 已删除的键不能残留在未被失效的标签下
    assert_eq!(
        facade.fast().tag_keys("t2").await,
        vec!["only_t2".to_string()]
    );

    facade
        .set("a", bytes("a"), None, &tags(["ta"]))
        .await
        .unwrap();
    facade
        .set("b", bytes("b"), None, &tags(["tb"]))
        .await
        .unwrap();
    facade
        .invalidate_by_tags(&tags(["ta", "tb"]))
        .await
        .unwrap();
    assert_eq!(facade.get("a").await, None);
    assert_eq!(facade.get("b").await, None);
}

#[tokio::test]
async fn test_invalidation_is_idempotent() {
    let (facade, _backend) = memory_facade(&common::generate_unique_service_name("idempotent"));

    facade
        .set("k", bytes("v"), None, &tags(["t"]))
        .await
        .unwrap();
    facade.invalidate_by_tags(&tags(["t"])).await.unwrap();
    facade.invalidate_by_tags(&tags(["t"])).await.unwrap();
    facade
        .invalidate_by_tags(&tags(["never-used"]))
        .await
        .unwrap();

    assert_eq!(facade.get("k").await, None);
    assert_eq!(facade.fast().tag_count().await, 0);
}

/// 标签只累加：重新写入时未重复的旧标签依然生效
#[tokio::test]
async fn test_tags_accumulate_across_sets() {
    let (facade, _backend) = memory_facade(&common::generate_unique_service_name("accumulate"));

    facade
        .set("k", bytes("v1"), None, &tags(["old"]))
        .await
        .unwrap();
    facade
        .set("k", bytes("v2"), None, &tags(["new"]))
        .await
        .unwrap();
    assert_eq!(facade.get("k").await, Some(bytes("v2")));

    facade.invalidate_by_tags(&tags(["old"])).await.unwrap();
    assert_eq!(facade.get("k").await, None);
    assert!(facade.fast().tag_keys("new").await.is_empty());
}

/// 失效顺序：慢层完成之前快层保持不变
#[tokio::test]
async fn test_slow_tier_invalidated_before_fast_tier() {
    common::setup_logging();
    let (facade, backend) = memory_facade(&common::generate_unique_service_name("order"));

    facade
        .set("k", bytes("v"), None, &tags(["t"]))
        .await
        .unwrap();
    backend.set_delay(Some(Duration::from_millis(200)));

    let invalidation = {
        let facade = facade.clone();
        tokio::spawn(async move { facade.invalidate_by_tags(&tags(["t"])).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(facade.fast().contains_key("k").await);

    invalidation.await.unwrap().unwrap();
    assert!(!facade.fast().contains_key("k").await);
    assert_eq!(
        backend.calls().last(),
        Some(&BackendCall::Clean(vec!["t".to_string()]))
    );
}

/// 提升的副本不带标签，任何一次按标签失效都会将其清除
#[tokio::test]
async fn test_promoted_copy_is_dropped_by_any_invalidation() {
    let (facade, backend) = memory_facade(&common::generate_unique_service_name("promoted"));

    facade
        .slow()
        .set("k", bytes("v"), None, &tags(["t"]))
        .await
        .unwrap();
    assert_eq!(facade.get("k").await, Some(bytes("v")));
    assert!(facade.fast().contains_key("k").await);
    assert!(facade.fast().tag_keys("t").await.is_empty());

    facade.invalidate_by_tags(&tags(["t"])).await.unwrap();
    assert!(!backend.contains("k"));
    assert!(!facade.fast().contains_key("k").await);
    assert_eq!(facade.get("k").await, None);
}
