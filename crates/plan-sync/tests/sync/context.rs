use std::sync::Arc;
use std::time::Duration;

use plan_sync::cache::MemoryStore;
use plan_sync::notify::CollectingNotifier;
use plan_sync::plans::PLANS_VIEW;
use plan_sync::remote::AuthStore;
use plan_sync::{AppConfig, PlanStatus, PlanSyncError, PlannerContext};
use serde_json::json;

use super::support::{plan_with_weapons, signed_in, weapon, MockRemote};

fn build(
    remote: &Arc<MockRemote>,
    auth: Arc<AuthStore>,
) -> (PlannerContext, Arc<CollectingNotifier>) {
    let config = AppConfig::from_overrides([
        ("mutation_debounce_ms", "100"),
        ("plan_debounce_ms", "200"),
    ])
    .unwrap();
    let notifier = Arc::new(CollectingNotifier::new());
    let context = PlannerContext::builder()
        .remote(remote.clone())
        .auth(auth)
        .store(Arc::new(MemoryStore::new()))
        .notifier(notifier.clone())
        .build(config)
        .unwrap();
    (context, notifier)
}

fn backend() -> Arc<MockRemote> {
    let remote = MockRemote::new();
    let stored = plan_with_weapons(vec![weapon("w1", "mistsplitter", 1)]);
    remote.set_list(PLANS_VIEW, vec![serde_json::to_value(stored).unwrap()]);
    remote.set_list(
        "characters",
        vec![json!({
            "id": "xiao",
            "name": "Xiao",
            "icon": "xiao.png",
            "weaponType": "polearm",
            "special": "atk",
            "rarity": 5
        })],
    );
    remote
}

#[tokio::test(start_paused = true)]
async fn edits_flow_through_the_shared_cache_and_registry() {
    let remote = backend();
    let (ctx, notifier) = build(&remote, signed_in());
    ctx.refresh_plans().await.unwrap();
    assert_eq!(ctx.plans().get("p1").unwrap().weapon_plans.len(), 1);

    let weapons = ctx.weapons("p1");
    let w1 = weapons.engine().records()[0].record.clone();
    weapons.update(&w1, |w| w.level_current = 40);
    assert!(ctx.registry().status("p1").is_pending);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(remote.batches().len(), 1, "configured debounce applies");
    assert_eq!(ctx.registry().status("p1"), PlanStatus::default());
    assert_eq!(ctx.plans().get("p1").unwrap().weapon_plans[0].level_current, 40);
    assert!(notifier.is_empty());
}

#[tokio::test(start_paused = true)]
async fn logout_drops_plans_and_pending_creates() {
    let remote = backend();
    let (ctx, _notifier) = build(&remote, signed_in());
    ctx.refresh_plans().await.unwrap();
    remote.set_delay(Some(Duration::from_secs(5)));

    ctx.pending().add("zhongli").unwrap();
    assert_eq!(ctx.pending().len(), 1);
    ctx.logout();

    assert!(ctx.pending().is_empty());
    assert!(ctx.plans().snapshot().is_empty());
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(ctx.plans().snapshot().is_empty());
    assert!(matches!(
        ctx.refresh_plans().await,
        Err(PlanSyncError::Unauthenticated)
    ));
}

#[tokio::test(start_paused = true)]
async fn signed_out_session_cannot_refresh() {
    let remote = backend();
    let (ctx, _notifier) = build(&remote, Arc::new(AuthStore::in_memory()));

    assert!(matches!(
        ctx.refresh_plans().await,
        Err(PlanSyncError::Unauthenticated)
    ));
    assert_eq!(remote.list_calls(PLANS_VIEW), 0);
}

#[tokio::test(start_paused = true)]
async fn dictionary_miss_requests_one_forced_reload() {
    let remote = backend();
    let (ctx, notifier) = build(&remote, signed_in());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(remote.list_calls("characters"), 1);

    let index = ctx.dictionary_index().unwrap();
    assert_eq!(index.character("xiao").map(|c| c.rarity), Some(5));
    assert!(index.character("nahida").is_none());
    assert!(index.weapon("missing").is_none());
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(remote.list_calls("characters"), 2);
    assert!(notifier.is_empty());
}
