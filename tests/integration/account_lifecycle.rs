// Account lifecycle against a single replica: create, list, delete, and
// the precondition errors around login state.

use chat_test_utils::start_cluster;

#[tokio::test]
async fn create_list_delete_round_trip() {
    let cluster = start_cluster(1).await;
    let (chat, _incoming) = cluster.connect_client().await;

    assert_eq!(chat.create_account("alice").await.unwrap(), "Success");

    let listing = chat.list_accounts(".*").await.unwrap();
    assert_eq!(listing.status, "Success");
    assert_eq!(listing.accounts, "alice");

    assert_eq!(chat.delete_account().await.unwrap(), "Success");

    let listing = chat.list_accounts(".*").await.unwrap();
    assert_eq!(listing.status, "Success");
    assert_eq!(listing.accounts, "");

    cluster.shutdown().await;
}

#[tokio::test]
async fn duplicate_create_from_another_client_fails() {
    let cluster = start_cluster(1).await;
    let (first, _first_incoming) = cluster.connect_client().await;
    let (second, _second_incoming) = cluster.connect_client().await;

    assert_eq!(first.create_account("alice").await.unwrap(), "Success");
    assert_eq!(
        second.create_account("alice").await.unwrap(),
        "Error: Account already exists."
    );

    cluster.shutdown().await;
}

#[tokio::test]
async fn create_logs_the_creator_in() {
    let cluster = start_cluster(1).await;
    let (chat, _incoming) = cluster.connect_client().await;

    assert_eq!(chat.create_account("alice").await.unwrap(), "Success");
    // logged in: a second create on the same connection trips the
    // logged-in precondition before anything else
    assert_eq!(
        chat.create_account("somebody_else").await.unwrap(),
        "Error: User can't create an account while logged in."
    );
    // and login is refused while the binding exists
    assert_eq!(
        chat.login("alice").await.unwrap(),
        "Error: Already logged into an account, please log off first."
    );

    cluster.shutdown().await;
}

#[tokio::test]
async fn login_logoff_leaves_the_login_table_unchanged() {
    let cluster = start_cluster(1).await;
    let (chat, _incoming) = cluster.connect_client().await;
    let (other, _other_incoming) = cluster.connect_client().await;

    assert_eq!(chat.create_account("alice").await.unwrap(), "Success");
    assert_eq!(chat.logoff().await.unwrap(), "Success");

    // law: LOGIN(u); LOGOFF() restores the starting state
    assert_eq!(chat.login("alice").await.unwrap(), "Success");
    assert_eq!(chat.logoff().await.unwrap(), "Success");

    // the slot is free again: anyone can take it
    assert_eq!(other.login("alice").await.unwrap(), "Success");

    cluster.shutdown().await;
}

#[tokio::test]
async fn create_delete_leaves_the_account_set_unchanged() {
    let cluster = start_cluster(1).await;
    let (chat, _incoming) = cluster.connect_client().await;

    assert_eq!(chat.create_account("carol").await.unwrap(), "Success");
    let before = chat.list_accounts(".*").await.unwrap().accounts;

    assert_eq!(chat.logoff().await.unwrap(), "Success");
    assert_eq!(chat.create_account("temp").await.unwrap(), "Success");
    assert_eq!(chat.delete_account().await.unwrap(), "Success");

    let after = chat.list_accounts(".*").await.unwrap().accounts;
    assert_eq!(before, after);

    cluster.shutdown().await;
}

#[tokio::test]
async fn malformed_pattern_reports_the_regex_error() {
    let cluster = start_cluster(1).await;
    let (chat, _incoming) = cluster.connect_client().await;

    assert_eq!(chat.create_account("alice").await.unwrap(), "Success");
    let listing = chat.list_accounts("[").await.unwrap();
    assert_eq!(listing.status, "Error: regex is malformed.");
    assert_eq!(listing.accounts, "");

    cluster.shutdown().await;
}

#[tokio::test]
async fn listing_matches_prefixes_in_insertion_order() {
    let cluster = start_cluster(1).await;
    let (first, _first_incoming) = cluster.connect_client().await;
    let (second, _second_incoming) = cluster.connect_client().await;
    let (third, _third_incoming) = cluster.connect_client().await;

    assert_eq!(first.create_account("zed").await.unwrap(), "Success");
    assert_eq!(second.create_account("amy").await.unwrap(), "Success");
    assert_eq!(third.create_account("zach").await.unwrap(), "Success");

    let listing = first.list_accounts(".*").await.unwrap();
    assert_eq!(listing.accounts, "zed;amy;zach");

    // prefix semantics: "a" matches only names starting with a
    let listing = first.list_accounts("a").await.unwrap();
    assert_eq!(listing.accounts, "amy");

    // anchored-prefix, not full-string: "z" matches both z-names
    let listing = first.list_accounts("z").await.unwrap();
    assert_eq!(listing.accounts, "zed;zach");

    cluster.shutdown().await;
}

#[tokio::test]
async fn operations_requiring_login_fail_without_one() {
    let cluster = start_cluster(1).await;
    let (chat, _incoming) = cluster.connect_client().await;
    let (other, _other_incoming) = cluster.connect_client().await;
    assert_eq!(other.create_account("bob").await.unwrap(), "Success");

    assert_eq!(
        chat.send_msg("bob", "hi").await.unwrap(),
        "Error: Need to be logged in to send a message."
    );
    assert_eq!(
        chat.delete_account().await.unwrap(),
        "Error: Need to be logged in to delete your account."
    );
    assert_eq!(
        chat.logoff().await.unwrap(),
        "Error: Need to be logged in to log out of your account."
    );
    assert_eq!(
        chat.login("nobody").await.unwrap(),
        "Error: Account does not exist."
    );
    assert_eq!(
        chat.login("bob").await.unwrap(),
        "Error: Someone else is logged into that account."
    );

    cluster.shutdown().await;
}

#[tokio::test]
async fn disconnect_frees_the_login_slot() {
    let cluster = start_cluster(1).await;
    let (chat, incoming) = cluster.connect_client().await;
    assert_eq!(chat.create_account("alice").await.unwrap(), "Success");
    drop(incoming);
    drop(chat);

    let (other, _other_incoming) = cluster.connect_client().await;
    chat_test_utils::retry_until_ok(|| async {
        match other.login("alice").await {
            Ok(status) if status == "Success" => Ok(()),
            Ok(_) | Err(_) => Err(client::ClientError::NotConnected),
        }
    })
    .await;

    cluster.shutdown().await;
}
