//! Oversell protection under concurrent purchase requests.

use std::sync::Arc;

use agora_tickets::allocation::{AllocationCoordinator, AllocationRequest, AllocationSettings};
use agora_tickets::clock::{FixedClock, SystemClock};
use agora_tickets::models::{Category, Customer, Event};
use agora_tickets::store::MemoryTicketStore;
use agora_tickets::utils::error::AppError;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use tokio::task::JoinSet;

async fn seed(store: &MemoryTicketStore, capacity: i32) -> (Event, Category) {
    let event = store.add_event("Arena Tour", true, true).await;
    let category = store
        .add_category(&event, "Floor", Decimal::new(7500, 2), capacity)
        .await;
    (event, category)
}

async fn customers(store: &MemoryTicketStore, count: usize) -> Vec<Customer> {
    let mut customers = Vec::with_capacity(count);
    for n in 0..count {
        customers.push(store.add_customer(&format!("Fan {}", n), true).await);
    }
    customers
}

fn request(event: &Event, category: &Category, customer: &Customer, quantity: i32) -> AllocationRequest {
    AllocationRequest {
        event_id: event.public_id.to_string(),
        category_id: category.public_id.to_string(),
        customer_id: customer.public_id.to_string(),
        user_id: None,
        quantity,
    }
}

fn coordinator(store: &MemoryTicketStore) -> Arc<AllocationCoordinator> {
    let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 9, 12, 20, 0, 0).unwrap());
    Arc::new(AllocationCoordinator::new(
        Arc::new(store.clone()),
        Arc::new(clock),
        AllocationSettings::default(),
    ))
}

async fn race(
    coordinator: Arc<AllocationCoordinator>,
    requests: Vec<AllocationRequest>,
) -> Vec<Result<uuid::Uuid, AppError>> {
    let mut set = JoinSet::new();
    for request in requests {
        let coordinator = Arc::clone(&coordinator);
        set.spawn(async move { coordinator.create_tickets(&request).await });
    }

    let mut results = Vec::new();
    while let Some(joined) = set.join_next().await {
        results.push(joined.expect("allocation task panicked"));
    }
    results
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_ten_requests_for_five_seats_sell_exactly_five() {
    let store = MemoryTicketStore::new();
    let (event, category) = seed(&store, 5).await;
    let fans = customers(&store, 10).await;

    let requests = fans
        .iter()
        .map(|fan| request(&event, &category, fan, 1))
        .collect();
    let results = race(coordinator(&store), requests).await;

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let sold_out = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::CapacityExceeded(_))))
        .count();
    assert_eq!(successes, 5);
    assert_eq!(sold_out, 5);

    assert_eq!(store.tickets().await.len(), 5);
    let stored = store.category(category.public_id).await.unwrap();
    assert_eq!(stored.quantity_sold, 5);
    assert_eq!(stored.quantity_available, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_last_ticket_goes_to_exactly_one_buyer() {
    let store = MemoryTicketStore::new();
    let (event, category) = seed(&store, 1).await;
    let fans = customers(&store, 2).await;

    let requests = fans
        .iter()
        .map(|fan| request(&event, &category, fan, 1))
        .collect();
    let results = race(coordinator(&store), requests).await;

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(AppError::CapacityExceeded(_)))));

    let tickets = store.tickets().await;
    assert_eq!(tickets.len(), 1);
    assert_eq!(&tickets[0].public_id, winners[0]);

    let stored = store.category(category.public_id).await.unwrap();
    assert_eq!((stored.quantity_available, stored.quantity_sold), (1, 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mixed_quantities_never_oversell() {
    let store = MemoryTicketStore::new();
    let (event, category) = seed(&store, 10).await;
    let fans = customers(&store, 12).await;

    let requests: Vec<_> = fans
        .iter()
        .enumerate()
        .map(|(n, fan)| request(&event, &category, fan, (n % 3) as i32 + 1))
        .collect();
    let quantities: Vec<i32> = requests.iter().map(|r| r.quantity).collect();
    let results = race(coordinator(&store), requests).await;

    assert!(results
        .iter()
        .all(|r| r.is_ok() || matches!(r, Err(AppError::CapacityExceeded(_)))));

    let stored = store.category(category.public_id).await.unwrap();
    let tickets = store.tickets().await;
    assert!(stored.quantity_sold <= stored.quantity_available);
    assert_eq!(tickets.len() as i32, stored.quantity_sold);
    assert!(quantities.iter().sum::<i32>() > stored.quantity_available);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_codes_stay_unique_for_repeat_buyer() {
    let store = MemoryTicketStore::new();
    let (event, category) = seed(&store, 40).await;
    let fan = store.add_customer("Regular", true).await;
    let coordinator = Arc::new(AllocationCoordinator::new(
        Arc::new(store.clone()),
        Arc::new(SystemClock),
        AllocationSettings::default(),
    ));

    let requests = (0..4).map(|_| request(&event, &category, &fan, 3)).collect();
    let results = race(coordinator, requests).await;
    assert!(results.iter().all(|r| r.is_ok()));

    let mut codes: Vec<_> = store.tickets().await.into_iter().map(|t| t.code).collect();
    codes.sort();
    codes.dedup();
    assert_eq!(codes.len(), 12);
}
