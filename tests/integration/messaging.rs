// Message queueing, pump delivery, and offline delivery across a
// three-replica fleet.

use chat_test_utils::start_cluster;
use std::time::Duration;
use tokio::time::timeout;

const DELIVERY_WINDOW: Duration = Duration::from_secs(5);

#[tokio::test]
async fn message_reaches_a_logged_in_recipient() {
    let cluster = start_cluster(3).await;
    let (alice, _alice_incoming) = cluster.connect_client().await;
    let (bob, mut bob_incoming) = cluster.connect_client().await;

    assert_eq!(alice.create_account("alice").await.unwrap(), "Success");
    assert_eq!(bob.create_account("bob").await.unwrap(), "Success");

    assert_eq!(alice.send_msg("bob", "hello").await.unwrap(), "Success");

    let delivered = timeout(DELIVERY_WINDOW, bob_incoming.recv())
        .await
        .expect("delivery within the window")
        .expect("channel open");
    assert_eq!(delivered.sender, "alice");
    assert_eq!(delivered.message, "hello");

    // the queued record has drained from every replica's log
    for id in 1..=3 {
        cluster
            .eventually("undelivered log drained", || {
                cluster.read_log("undelivered_messages", id).is_empty()
            })
            .await;
    }

    cluster.shutdown().await;
}

#[tokio::test]
async fn offline_messages_are_delivered_on_login() {
    let cluster = start_cluster(3).await;
    let (alice, _alice_incoming) = cluster.connect_client().await;
    let (bob, mut bob_incoming) = cluster.connect_client().await;

    assert_eq!(alice.create_account("alice").await.unwrap(), "Success");
    assert_eq!(bob.create_account("bob").await.unwrap(), "Success");
    assert_eq!(bob.logoff().await.unwrap(), "Success");

    assert_eq!(alice.send_msg("bob", "hi").await.unwrap(), "Success");

    // while bob is offline the record is replicated and sits in every log
    for id in 1..=3 {
        cluster
            .eventually("undelivered record replicated", || {
                cluster.read_log("undelivered_messages", id).contains("bob alice hi")
            })
            .await;
    }

    assert_eq!(bob.login("bob").await.unwrap(), "Success");
    let delivered = timeout(DELIVERY_WINDOW, bob_incoming.recv())
        .await
        .expect("delivery after login")
        .expect("channel open");
    assert_eq!(delivered.sender, "alice");
    assert_eq!(delivered.message, "hi");

    for id in 1..=3 {
        cluster
            .eventually("undelivered log drained", || {
                cluster.read_log("undelivered_messages", id).is_empty()
            })
            .await;
    }

    cluster.shutdown().await;
}

#[tokio::test]
async fn messages_from_one_sender_arrive_in_send_order() {
    let cluster = start_cluster(3).await;
    let (alice, _alice_incoming) = cluster.connect_client().await;
    let (bob, mut bob_incoming) = cluster.connect_client().await;

    assert_eq!(alice.create_account("alice").await.unwrap(), "Success");
    assert_eq!(bob.create_account("bob").await.unwrap(), "Success");
    assert_eq!(bob.logoff().await.unwrap(), "Success");

    for text in ["one", "two", "three"] {
        assert_eq!(alice.send_msg("bob", text).await.unwrap(), "Success");
    }
    assert_eq!(bob.login("bob").await.unwrap(), "Success");

    for expected in ["one", "two", "three"] {
        let delivered = timeout(DELIVERY_WINDOW, bob_incoming.recv())
            .await
            .expect("delivery in order")
            .expect("channel open");
        assert_eq!(delivered.sender, "alice");
        assert_eq!(delivered.message, expected);
    }

    cluster.shutdown().await;
}

#[tokio::test]
async fn send_to_missing_recipient_changes_no_replica() {
    let cluster = start_cluster(3).await;
    let (alice, _alice_incoming) = cluster.connect_client().await;

    assert_eq!(alice.create_account("alice").await.unwrap(), "Success");
    assert_eq!(
        alice.send_msg("nobody", "lost").await.unwrap(),
        "Error: The recipient of the message does not exist."
    );

    for id in 1..=3 {
        assert!(!cluster.read_log("undelivered_messages", id).contains("nobody"));
    }

    cluster.shutdown().await;
}

#[tokio::test]
async fn messages_may_contain_spaces() {
    let cluster = start_cluster(1).await;
    let (alice, _alice_incoming) = cluster.connect_client().await;
    let (bob, mut bob_incoming) = cluster.connect_client().await;

    assert_eq!(alice.create_account("alice").await.unwrap(), "Success");
    assert_eq!(bob.create_account("bob").await.unwrap(), "Success");

    let text = "a longer message, with punctuation and   spacing";
    assert_eq!(alice.send_msg("bob", text).await.unwrap(), "Success");

    let delivered = timeout(DELIVERY_WINDOW, bob_incoming.recv())
        .await
        .expect("delivery")
        .expect("channel open");
    assert_eq!(delivered.message, text);

    cluster.shutdown().await;
}
