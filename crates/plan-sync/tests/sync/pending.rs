use std::sync::Arc;
use std::time::Duration;

use plan_sync::notify::{CollectingNotifier, Notification};
use plan_sync::pending::{PendingPlanQueue, PendingState, DEFAULT_ATTEMPTS};
use plan_sync::plans::{PlansCache, PLANS_COLLECTION};
use plan_sync::remote::AuthStore;
use plan_sync::{PlanSyncError, RemoteError};

use super::support::{plan, signed_in, MockRemote};

struct Queue {
    remote: Arc<MockRemote>,
    auth: Arc<AuthStore>,
    plans: Arc<PlansCache>,
    notifier: Arc<CollectingNotifier>,
    queue: PendingPlanQueue,
}

fn queue(committed: usize) -> Queue {
    let remote = MockRemote::new();
    let auth = signed_in();
    let plans = Arc::new(PlansCache::with_plans(
        (1..=committed)
            .map(|i| plan(&format!("p{i}"), i as i64))
            .collect(),
    ));
    let notifier = Arc::new(CollectingNotifier::new());
    let queue = PendingPlanQueue::new(
        remote.clone(),
        auth.clone(),
        plans.clone(),
        notifier.clone(),
        DEFAULT_ATTEMPTS,
    );
    Queue {
        remote,
        auth,
        plans,
        notifier,
        queue,
    }
}

#[tokio::test(start_paused = true)]
async fn queued_plans_follow_committed_ones() {
    let q = queue(2);
    q.remote.set_delay(Some(Duration::from_secs(5)));

    let first = q.queue.add("xiao").unwrap();
    let second = q.queue.add("zhongli").unwrap();
    assert_eq!((first.order, second.order), (3, 4));
    assert_ne!(first.id, second.id);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(q.queue.items().iter().all(|p| p.state == PendingState::Sent));

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(q.queue.is_empty());
    let committed: Vec<(String, i64)> = q
        .plans
        .snapshot()
        .iter()
        .map(|p| (p.character.clone(), p.order))
        .collect();
    assert_eq!(
        committed,
        vec![
            ("char-p1".into(), 1),
            ("char-p2".into(), 2),
            ("xiao".into(), 3),
            ("zhongli".into(), 4),
        ]
    );
    let creates = q.remote.creates();
    assert!(creates.iter().all(|(c, _)| c == PLANS_COLLECTION));
    assert!(creates.iter().all(|(_, body)| body.get("id").is_none()));
    assert_eq!(creates[0].1["user"], "u1");
    assert_eq!(q.notifier.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn third_failure_parks_the_plan_until_retried() {
    let q = queue(0);
    q.remote
        .on_create(|_, _| Err(RemoteError::new(400, "Failed to create record.")));

    let item = q.queue.add("xiao").unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(q.remote.creates().len(), DEFAULT_ATTEMPTS as usize);
    let parked = q.queue.items();
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].state, PendingState::Failed);
    assert_eq!(parked[0].attempts, DEFAULT_ATTEMPTS);

    let retry = match q.notifier.take().as_slice() {
        [Notification::PlanCreateFailed {
            character,
            description,
            retry,
        }] => {
            assert_eq!(character, "xiao");
            assert_eq!(description, "Failed to create record.");
            retry.clone()
        }
        other => panic!("expected one failure notice, got {other:?}"),
    };

    q.remote.on_create(|_, body| {
        let mut body = body.clone();
        body["id"] = serde_json::json!("srv-xiao");
        Ok(body)
    });
    retry.run();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(q.queue.is_empty());
    assert_eq!(q.remote.creates().len(), DEFAULT_ATTEMPTS as usize + 1);
    assert_eq!(q.plans.get("srv-xiao").map(|p| p.order), Some(item.order));
    assert!(matches!(
        q.notifier.take().as_slice(),
        [Notification::PlanCreated { character }] if character == "xiao"
    ));
}

#[tokio::test(start_paused = true)]
async fn only_failed_entries_can_be_retried() {
    let q = queue(0);
    q.remote.set_delay(Some(Duration::from_secs(5)));

    let item = q.queue.add("xiao").unwrap();
    assert!(!q.queue.retry(item.id));
    assert!(!q.queue.retry(item.id + 100));
}

#[tokio::test(start_paused = true)]
async fn sign_out_abandons_the_queue() {
    let q = queue(0);
    let _binding = q.queue.bind_to_auth();
    q.remote.set_delay(Some(Duration::from_secs(5)));

    q.queue.add("xiao").unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    q.auth.clear();
    assert!(q.queue.is_empty());

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(q.queue.is_empty());
    assert!(q.plans.snapshot().is_empty(), "late results are discarded");
    assert!(q.notifier.is_empty());

    assert!(matches!(
        q.queue.add("zhongli"),
        Err(PlanSyncError::Unauthenticated)
    ));
}

#[tokio::test(start_paused = true)]
async fn subscribers_see_every_transition() {
    let q = queue(0);
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let s = seen.clone();
    let _sub = q.queue.subscribe(move |items| {
        s.lock().push(items.iter().map(|p| p.state).collect::<Vec<_>>());
    });

    q.queue.add("xiao").unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(
        *seen.lock(),
        vec![
            vec![PendingState::Pending],
            vec![PendingState::Sent],
            vec![],
        ]
    );
}
