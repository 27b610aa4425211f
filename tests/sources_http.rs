// tests/sources_http.rs
//
// Contact-system clients against mocked upstream APIs.

use donor_harvest::records::{ContactBook, DonationPolicy};
use donor_harvest::sources::google::AuthorizedUser;
use donor_harvest::sources::microsoft::{ENV_CLIENT_ID, ENV_CLIENT_SECRET, ENV_TENANT, ENV_TOKEN, ENV_USER};
use donor_harvest::sources::{import_contacts, ContactSource, GooglePeople, GraphEndpoints, MicrosoftGraph, WordPress};
use serde_json::json;
use wiremock::matchers::{bearer_token, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn wordpress_users_become_records() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/users"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "name": "Ann Lee", "email": "ann@lee.org"},
            {"id": 2, "name": "Editor"}
        ])))
        .mount(&server)
        .await;

    let wp = WordPress::new(reqwest::Client::new(), &format!("{}/", server.uri()), "admin", "abcd efgh");
    let records = wp.fetch_contacts().await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].name, "Ann Lee");
    assert_eq!(records[0].emails, vec!["ann@lee.org"]);
    assert!(records[1].emails.is_empty());
    assert_eq!(wp.name(), "wordpress");
}

#[tokio::test]
async fn wordpress_403_is_retried_until_it_clears() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/users"))
        .respond_with(ResponseTemplate::new(403))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"name": "Ann Lee", "email": "ann@lee.org"}])))
        .mount(&server)
        .await;

    let wp = WordPress::new(reqwest::Client::new(), &server.uri(), "admin", "pw").with_backoff_base_ms(1);
    let records = wp.fetch_contacts().await.unwrap();
    assert_eq!(records.len(), 1);
}

#[tokio::test]
async fn wordpress_gives_up_after_five_403s() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/users"))
        .respond_with(ResponseTemplate::new(403))
        .expect(5)
        .mount(&server)
        .await;

    let wp = WordPress::new(reqwest::Client::new(), &server.uri(), "admin", "pw").with_backoff_base_ms(1);
    assert!(wp.fetch_contacts().await.is_err());
}

#[tokio::test]
async fn google_exchanges_refresh_token_and_pages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "ya29.test", "expires_in": 3600})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/people/me/connections"))
        .and(query_param("pageToken", "p2"))
        .and(bearer_token("ya29.test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "connections": [{"names": [{"displayName": "Bo Park"}], "phoneNumbers": [{"value": "212-555-0199"}]}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/people/me/connections"))
        .and(bearer_token("ya29.test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "connections": [{"names": [{"displayName": "Ann Lee"}], "emailAddresses": [{"value": "ann@lee.org"}]}],
            "nextPageToken": "p2"
        })))
        .mount(&server)
        .await;

    let creds = AuthorizedUser {
        client_id: "id".into(),
        client_secret: "secret".into(),
        refresh_token: "refresh".into(),
        token_uri: Some(format!("{}/token", server.uri())),
    };
    let google = GooglePeople::new(reqwest::Client::new(), creds).with_api_base(&server.uri());
    let records = google.fetch_contacts().await.unwrap();
    let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Ann Lee", "Bo Park"]);
    assert_eq!(records[1].phones, vec!["212-555-0199"]);
}

#[serial_test::serial]
#[tokio::test]
async fn microsoft_follows_next_link_and_imports() {
    let server = MockServer::start().await;
    let page2 = format!("{}/v1.0/me/contacts/page2", server.uri());
    Mock::given(method("GET"))
        .and(path("/v1.0/me/contacts"))
        .and(bearer_token("graph-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"displayName": "Bo Park", "emailAddresses": [{"address": "bo@park.org"}], "businessPhones": []}],
            "@odata.nextLink": page2
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/me/contacts/page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"displayName": "Bo Park", "mobilePhone": "212-555-0199"}]
        })))
        .mount(&server)
        .await;

    let endpoints = GraphEndpoints {
        graph_base: server.uri(),
        login_base: server.uri(),
    };
    let graph = MicrosoftGraph::connect(reqwest::Client::new(), Some("graph-token".into()), None, endpoints)
        .await
        .unwrap();
    let mut book = ContactBook::new();
    let summary = import_contacts(&graph, &mut book, DonationPolicy::FullRecord).await.unwrap();

    assert_eq!(summary.inserted, 1);
    assert_eq!(book.profiles.len(), 1);
    let bo = &book.profiles[0];
    assert_eq!(bo.emails, vec!["bo@park.org"]);
    assert_eq!(bo.phones, vec!["212-555-0199"]);
    assert_eq!(bo.source_url.as_deref(), Some("outlook"));
}

#[serial_test::serial]
#[tokio::test]
async fn microsoft_without_credentials_is_a_config_error() {
    for k in [ENV_TOKEN, ENV_TENANT, ENV_CLIENT_ID, ENV_CLIENT_SECRET, ENV_USER] {
        std::env::remove_var(k);
    }
    let err = MicrosoftGraph::connect(reqwest::Client::new(), None, None, GraphEndpoints::default())
        .await
        .err()
        .unwrap();
    assert!(err.is_fatal(), "{err:?}");
}

#[serial_test::serial]
#[tokio::test]
async fn microsoft_client_credentials_grant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "app-token", "token_type": "Bearer"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/users/mailbox-1/contacts"))
        .and(bearer_token("app-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .expect(1)
        .mount(&server)
        .await;

    std::env::remove_var(ENV_TOKEN);
    std::env::set_var(ENV_TENANT, "tenant-1");
    std::env::set_var(ENV_CLIENT_ID, "cid");
    std::env::set_var(ENV_CLIENT_SECRET, "csecret");
    std::env::set_var(ENV_USER, "mailbox-1");
    let endpoints = GraphEndpoints {
        graph_base: server.uri(),
        login_base: server.uri(),
    };
    let graph = MicrosoftGraph::connect(reqwest::Client::new(), None, None, endpoints).await;
    for k in [ENV_TENANT, ENV_CLIENT_ID, ENV_CLIENT_SECRET, ENV_USER] {
        std::env::remove_var(k);
    }
    let records = graph.unwrap().fetch_contacts().await.unwrap();
    assert!(records.is_empty());
}

#[serial_test::serial]
#[tokio::test]
async fn microsoft_client_credentials_need_a_mailbox() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "app-token"})))
        .expect(0)
        .mount(&server)
        .await;

    for k in [ENV_TOKEN, ENV_USER] {
        std::env::remove_var(k);
    }
    std::env::set_var(ENV_TENANT, "tenant-1");
    std::env::set_var(ENV_CLIENT_ID, "cid");
    std::env::set_var(ENV_CLIENT_SECRET, "csecret");
    let endpoints = GraphEndpoints {
        graph_base: server.uri(),
        login_base: server.uri(),
    };
    let res = MicrosoftGraph::connect(reqwest::Client::new(), None, None, endpoints).await;
    for k in [ENV_TENANT, ENV_CLIENT_ID, ENV_CLIENT_SECRET] {
        std::env::remove_var(k);
    }
    let err = res.err().unwrap();
    assert!(err.is_fatal(), "{err:?}");
}

#[serial_test::serial]
#[tokio::test]
async fn microsoft_delegated_token_can_read_a_named_mailbox() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1.0/users/ops@fund.org/contacts"))
        .and(bearer_token("graph-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{"displayName": "Bo Park", "emailAddresses": [{"address": "bo@park.org"}]}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    std::env::remove_var(ENV_USER);
    let endpoints = GraphEndpoints {
        graph_base: server.uri(),
        login_base: server.uri(),
    };
    let graph = MicrosoftGraph::connect(
        reqwest::Client::new(),
        Some("graph-token".into()),
        Some("ops@fund.org".into()),
        endpoints,
    )
    .await
    .unwrap();
    let records = graph.fetch_contacts().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].emails, vec!["bo@park.org"]);
}
