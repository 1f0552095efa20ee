use std::time::Duration;

use tokio::time::sleep;
use tower_inflight::ActionPolicy;
use tower_inflight::Outcome;
use tower_inflight::Resource;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug)]
struct Order {
    id: u32,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("tower_inflight=debug".parse().unwrap()),
        )
        .init();

    // 1. Define the "network": every call takes 100ms
    let backend = tower::service_fn(|id: u32| async move {
        sleep(Duration::from_millis(100)).await;
        Ok::<_, tower::BoxError>(Order { id })
    });

    // 2. "submit" may only run once at a time, "fetch" may overlap
    let orders = Resource::<u32, Order>::builder()
        .service("submit", ActionPolicy::exclusive(), backend.clone())
        .service("fetch", ActionPolicy::concurrent(), backend)
        .build();

    // 3. A double-clicked submit button
    let first = orders.invoke("submit", 1).unwrap();
    let second = orders.invoke("submit", 2).unwrap();
    println!("submit button disabled: {}", orders.has_pending());

    match first.await {
        Outcome::Completed(order) => println!("✅ submitted order {}", order.id),
        other => println!("❌ first submit: {other:?}"),
    }
    println!("second submit: {:?}", second.await.into_result().unwrap_err());

    // 4. Several fetches, one of them abandoned by the user
    let fetches: Vec<_> = (10..13)
        .map(|id| orders.invoke("fetch", id).unwrap())
        .collect();
    fetches[1].abort();

    for fetch in fetches {
        let placeholder = fetch.placeholder().clone();
        let outcome = fetch.await;
        println!(
            "fetch settled as {}, placeholder filled: {}",
            outcome.settlement(),
            placeholder.is_filled()
        );
    }

    // 5. The view is discarded while work is still in flight
    let _pending: Vec<_> = (20..25)
        .map(|id| orders.invoke("fetch", id).unwrap())
        .collect();
    orders.abort_all();
    println!("\n🏁 pending after teardown: {}", orders.has_pending());
}
