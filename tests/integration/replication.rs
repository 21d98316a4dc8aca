// Replicated store state: every mutation on the primary lands in every
// backup's log before the client sees a response.

use chat_test_utils::start_cluster;

#[tokio::test]
async fn created_account_appears_in_every_replica_log() {
    let cluster = start_cluster(3).await;
    let (chat, _incoming) = cluster.connect_client().await;

    assert_eq!(chat.create_account("alice").await.unwrap(), "Success");

    // synchronous replication: by the time the response arrived, every
    // live replica had acked the update
    for id in 1..=3 {
        assert_eq!(
            cluster.read_log("account_list", id),
            "alice\n",
            "replica {id} account log"
        );
    }

    cluster.shutdown().await;
}

#[tokio::test]
async fn deleted_account_disappears_from_every_replica_log() {
    let cluster = start_cluster(3).await;
    let (chat, _incoming) = cluster.connect_client().await;

    assert_eq!(chat.create_account("alice").await.unwrap(), "Success");
    assert_eq!(chat.delete_account().await.unwrap(), "Success");

    for id in 1..=3 {
        assert_eq!(cluster.read_log("account_list", id), "", "replica {id} account log");
    }

    cluster.shutdown().await;
}

#[tokio::test]
async fn account_logs_agree_after_a_batch_of_operations() {
    let cluster = start_cluster(3).await;
    let (first, _first_incoming) = cluster.connect_client().await;
    let (second, _second_incoming) = cluster.connect_client().await;

    assert_eq!(first.create_account("alice").await.unwrap(), "Success");
    assert_eq!(second.create_account("bob").await.unwrap(), "Success");
    assert_eq!(second.delete_account().await.unwrap(), "Success");
    assert_eq!(second.create_account("carol").await.unwrap(), "Success");

    let primary_log = cluster.read_log("account_list", 1);
    assert_eq!(primary_log, "alice\ncarol\n");
    for id in 2..=3 {
        assert_eq!(cluster.read_log("account_list", id), primary_log, "replica {id}");
    }

    cluster.shutdown().await;
}

#[tokio::test]
async fn login_bindings_replicate_with_the_client_uuid() {
    let cluster = start_cluster(3).await;
    let (chat, _incoming) = cluster.connect_client().await;

    assert_eq!(chat.create_account("alice").await.unwrap(), "Success");

    let expected = format!("alice {}\n", chat.uuid());
    for id in 1..=3 {
        assert_eq!(
            cluster.read_log("logged_in_accounts", id),
            expected,
            "replica {id} login log"
        );
    }

    assert_eq!(chat.logoff().await.unwrap(), "Success");
    for id in 1..=3 {
        assert_eq!(cluster.read_log("logged_in_accounts", id), "", "replica {id} login log");
    }

    cluster.shutdown().await;
}

#[tokio::test]
async fn queued_message_replicates_before_the_send_response() {
    let cluster = start_cluster(3).await;
    let (alice, _alice_incoming) = cluster.connect_client().await;
    let (bob, _bob_incoming) = cluster.connect_client().await;

    assert_eq!(alice.create_account("alice").await.unwrap(), "Success");
    assert_eq!(bob.create_account("bob").await.unwrap(), "Success");
    assert_eq!(bob.logoff().await.unwrap(), "Success");

    assert_eq!(alice.send_msg("bob", "hold this").await.unwrap(), "Success");

    for id in 1..=3 {
        assert_eq!(
            cluster.read_log("undelivered_messages", id),
            "bob alice hold this\n",
            "replica {id} undelivered log"
        );
    }

    cluster.shutdown().await;
}
