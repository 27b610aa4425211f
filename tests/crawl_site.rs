// tests/crawl_site.rs
//
// Breadth-first crawl against a mock site: same-site links only, keyword
// filtering, failed pages skipped, and per-entity merging across pages.

mod common;

use common::{mount_html, test_config, BOARD_PAGE, DONORS_PAGE};
use donor_harvest::crawl::Crawler;
use donor_harvest::records::ContactBook;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn crawl_merges_people_across_pages() {
    let server = MockServer::start().await;
    mount_html(&server, "/board", BOARD_PAGE).await;
    mount_html(&server, "/donors", DONORS_PAGE).await;
    // /blog is not mounted: 404 is a permanent failure, the page is skipped

    let tmp = tempfile::tempdir().unwrap();
    let cfg = test_config(tmp.path());
    let mut crawler = Crawler::from_config(&cfg).unwrap();
    let mut book = ContactBook::new();

    let start = format!("{}/board", server.uri());
    let stats = crawler.crawl_site(&start, 1, &[], false, &mut book).await.unwrap();

    assert_eq!(stats.pages, 2);
    assert_eq!(stats.failed, 1);

    let jane: Vec<_> = book.profiles.iter().filter(|p| p.identity() == Some("Jane Doe")).collect();
    assert_eq!(jane.len(), 1, "one Jane Doe across pages: {:?}", book.profiles);
    assert_eq!(jane[0].emails, vec!["jane@fund.org", "jane.doe@home.net"]);
    assert_eq!(jane[0].phones, vec!["(919) 555-0100"]);
    assert_eq!(jane[0].donations.len(), 1);
    assert_eq!(jane[0].donations[0].amount, "$5,000");

    assert!(book.profiles.iter().any(|p| p.identity() == Some("Carl Mills")));
    assert!(book.addresses.contains(&"100 Main Street, Durham, NC 27701".to_string()));
    assert!(crawler.is_processed(&start));
}

#[tokio::test]
async fn keywords_limit_followed_links() {
    let server = MockServer::start().await;
    mount_html(&server, "/board", BOARD_PAGE).await;
    mount_html(&server, "/donors", DONORS_PAGE).await;
    Mock::given(method("GET"))
        .and(path("/blog"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .expect(0)
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let mut crawler = Crawler::from_config(&test_config(tmp.path())).unwrap();
    let mut book = ContactBook::new();

    let start = format!("{}/board", server.uri());
    let stats = crawler
        .crawl_site(&start, 2, &["DONOR".to_string()], false, &mut book)
        .await
        .unwrap();

    assert_eq!(stats.pages, 2);
    assert_eq!(stats.failed, 0);
}

#[tokio::test]
async fn depth_zero_parses_only_the_start_page() {
    let server = MockServer::start().await;
    mount_html(&server, "/board", BOARD_PAGE).await;

    let tmp = tempfile::tempdir().unwrap();
    let mut crawler = Crawler::from_config(&test_config(tmp.path())).unwrap();
    let mut book = ContactBook::new();

    let stats = crawler
        .crawl_site(&format!("{}/board", server.uri()), 0, &[], false, &mut book)
        .await
        .unwrap();
    assert_eq!(stats.pages, 1);
    assert_eq!(book.profiles.len(), 2);
}

#[tokio::test]
async fn sitemap_seeds_the_queue() {
    let server = MockServer::start().await;
    mount_html(&server, "/", "<html><body>nothing here</body></html>").await;
    mount_html(&server, "/donors", DONORS_PAGE).await;
    let sitemap = format!(
        r#"<?xml version="1.0"?><urlset><url><loc>{0}/donors</loc></url><url><loc>https://other.org/x</loc></url></urlset>"#,
        server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(sitemap))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let mut crawler = Crawler::from_config(&test_config(tmp.path())).unwrap();
    let mut book = ContactBook::new();

    let stats = crawler
        .crawl_site(&format!("{}/", server.uri()), 1, &[], true, &mut book)
        .await
        .unwrap();
    assert_eq!(stats.pages, 2);
    assert!(book.profiles.iter().any(|p| p.identity() == Some("Jane Doe")));
}

#[tokio::test]
async fn saved_login_cookies_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/members"))
        .and(wiremock::matchers::header("cookie", "session=s1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(BOARD_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let cfg = test_config(tmp.path());
    std::fs::write(&cfg.auth.cookies_file, r#"{"session": "s1"}"#).unwrap();

    let mut crawler = Crawler::from_config(&cfg).unwrap();
    let mut book = ContactBook::new();
    let links = crawler
        .parse_page(&format!("{}/members", server.uri()), &mut book)
        .await
        .unwrap();
    assert!(links.is_some());
    assert_eq!(book.profiles.len(), 2);
}
