mod common;

use chrono::Utc;
use mongodb::bson::doc;
use uuid::Uuid;

use instantwin_api::models::question::PayoutProvider;
use instantwin_api::models::winner::{PaymentStatus, Winner};
use instantwin_api::services::payout_dispatcher::PayoutDispatcher;

/// Accepts connections but never answers, so the client times out.
async fn unresponsive_provider() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let _held_open = socket;
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            });
        }
    });

    format!("http://{}", addr)
}

fn pending_winner() -> Winner {
    Winner {
        id: format!("w-{}", Uuid::new_v4()),
        question_id: format!("q-{}", Uuid::new_v4()),
        user_id: format!("u-{}", Uuid::new_v4()),
        position: 1,
        amount_awarded: 5000,
        payment_status: PaymentStatus::Pending,
        payment_provider: PayoutProvider::Mtn,
        phone_number: "256700000000".to_string(),
        payment_reference: None,
        awarded_at: Utc::now(),
        paid_at: None,
    }
}

/// A timed-out provider call is indeterminate: the money may have moved, so
/// the winner row must stay PENDING for reconciliation instead of being
/// marked FAILED.
#[tokio::test]
async fn timed_out_payout_stays_pending_for_reconciliation() {
    let app = common::create_test_app().await;

    let mut config = app.config.clone();
    config.mtn_api_url = unresponsive_provider().await;

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_millis(300))
        .build()
        .unwrap();

    let winner = pending_winner();
    app.mongo
        .collection::<Winner>("winners")
        .insert_one(&winner)
        .await
        .unwrap();

    let dispatcher = PayoutDispatcher::new(app.mongo.clone(), http, &config);
    let status = dispatcher.dispatch(&winner).await.unwrap();
    assert_eq!(status, PaymentStatus::Pending);

    let stored = app
        .mongo
        .collection::<mongodb::bson::Document>("winners")
        .find_one(doc! { "_id": &winner.id })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.get_str("payment_status").unwrap(), "pending");
}

/// A definitive transport failure (nothing listening at all) is terminal:
/// the row moves to FAILED and a later status write cannot resurrect it.
#[tokio::test]
async fn refused_payout_is_marked_failed() {
    let app = common::create_test_app().await;

    // Reserve a port, then drop the listener so connections are refused
    let dead_addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let mut config = app.config.clone();
    config.mtn_api_url = format!("http://{}", dead_addr);

    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(2))
        .build()
        .unwrap();

    let winner = pending_winner();
    app.mongo
        .collection::<Winner>("winners")
        .insert_one(&winner)
        .await
        .unwrap();

    let dispatcher = PayoutDispatcher::new(app.mongo.clone(), http, &config);
    let status = dispatcher.dispatch(&winner).await.unwrap();
    assert_eq!(status, PaymentStatus::Failed);

    let stored = app
        .mongo
        .collection::<mongodb::bson::Document>("winners")
        .find_one(doc! { "_id": &winner.id })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.get_str("payment_status").unwrap(), "failed");
}
