// Primary failover: backups detect the dead primary by heartbeat, the
// lowest surviving id promotes, and clients re-point via GET_PRIMARY.

use chat_test_utils::{retry_until_ok, start_cluster};
use std::time::Duration;
use tokio::time::timeout;

const DELIVERY_WINDOW: Duration = Duration::from_secs(5);

#[tokio::test]
async fn killing_the_primary_promotes_the_next_id() {
    let mut cluster = start_cluster(3).await;
    let (chat, _incoming) = cluster.connect_client().await;
    assert_eq!(chat.primary_id().await, 1);
    assert_eq!(chat.create_account("alice").await.unwrap(), "Success");

    cluster.kill(1).await;
    cluster.wait_for_primary(2).await;

    // the client fails over and the replicated state is still there
    let listing = retry_until_ok(|| chat.list_accounts(".*")).await;
    assert_eq!(listing.status, "Success");
    assert_eq!(listing.accounts, "alice");
    assert_eq!(chat.primary_id().await, 2);

    cluster.shutdown().await;
}

#[tokio::test]
async fn service_survives_two_failovers() {
    let mut cluster = start_cluster(3).await;
    let (chat, _incoming) = cluster.connect_client().await;
    assert_eq!(chat.create_account("alice").await.unwrap(), "Success");

    cluster.kill(1).await;
    cluster.wait_for_primary(2).await;
    let listing = retry_until_ok(|| chat.list_accounts(".*")).await;
    assert_eq!(listing.accounts, "alice");

    cluster.kill(2).await;
    cluster.wait_for_primary(3).await;
    let listing = retry_until_ok(|| chat.list_accounts(".*")).await;
    assert_eq!(listing.accounts, "alice");
    assert_eq!(chat.primary_id().await, 3);

    cluster.shutdown().await;
}

#[tokio::test]
async fn sessions_and_delivery_survive_a_failover() {
    let mut cluster = start_cluster(3).await;
    let (alice, _alice_incoming) = cluster.connect_client().await;
    let (bob, mut bob_incoming) = cluster.connect_client().await;

    assert_eq!(alice.create_account("alice").await.unwrap(), "Success");
    assert_eq!(bob.create_account("bob").await.unwrap(), "Success");

    cluster.kill(1).await;
    cluster.wait_for_primary(2).await;

    // the promoted primary still knows both logins (replicated state plus
    // its own client table), so messages flow end to end
    let status = retry_until_ok(|| alice.send_msg("bob", "made it")).await;
    assert_eq!(status, "Success");

    let delivered = timeout(DELIVERY_WINDOW, bob_incoming.recv())
        .await
        .expect("delivery after failover")
        .expect("channel open");
    assert_eq!(delivered.sender, "alice");
    assert_eq!(delivered.message, "made it");

    cluster.shutdown().await;
}

#[tokio::test]
async fn mutations_after_failover_replicate_to_the_survivors() {
    let mut cluster = start_cluster(3).await;
    let (chat, _incoming) = cluster.connect_client().await;
    assert_eq!(chat.create_account("alice").await.unwrap(), "Success");

    cluster.kill(1).await;
    cluster.wait_for_primary(2).await;

    let status = retry_until_ok(|| chat.logoff()).await;
    assert_eq!(status, "Success");
    let status = retry_until_ok(|| chat.create_account("postmortem")).await;
    assert_eq!(status, "Success");

    for id in 2..=3 {
        cluster
            .eventually("account replicated to survivors", || {
                cluster.read_log("account_list", id).contains("postmortem")
            })
            .await;
    }

    cluster.shutdown().await;
}

#[tokio::test]
async fn a_dead_backup_does_not_block_the_primary() {
    let mut cluster = start_cluster(3).await;
    let (chat, _incoming) = cluster.connect_client().await;
    assert_eq!(chat.create_account("alice").await.unwrap(), "Success");

    // killing a backup must not stall replication rounds
    cluster.kill(3).await;

    let status = retry_until_ok(|| chat.logoff()).await;
    assert_eq!(status, "Success");
    let status = retry_until_ok(|| chat.create_account("resilient")).await;
    assert_eq!(status, "Success");

    cluster
        .eventually("replication continues to the live backup", || {
            cluster.read_log("account_list", 2).contains("resilient")
        })
        .await;
    assert_eq!(chat.primary_id().await, 1);

    cluster.shutdown().await;
}
