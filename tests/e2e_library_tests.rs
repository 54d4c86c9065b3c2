//! End-to-end tests for archive browsing and import

mod common;

use common::{TestClient, TestServer};
use comic_archive_server::library::scanned_archive_id;
use reqwest::{Response, StatusCode};
use serde_json::Value;

/// A 1x1 PNG, so served pages carry a recognisable content type.
const PNG_PIXEL: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0xF8,
    0xCF, 0xC0, 0xF0, 0x1F, 0x00, 0x05, 0x00, 0x01, 0xFF, 0x89, 0x99, 0x3D, 0x1D, 0x00, 0x00,
    0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

async fn import_sample(client: &TestClient) -> Response {
    client
        .import(
            &[
                ("comic_id", "imp1"),
                ("title", "Imported Comic"),
                ("type", "picacg"),
                ("author", "Uploader"),
                ("tags", r#"{"categories":["Comedy"],"tags":["Short"]}"#),
                ("eps", r#"["Start","Finish"]"#),
                ("download_time", "2024-01-02T03:04:05Z"),
            ],
            vec![
                ("cover.png", PNG_PIXEL.to_vec()),
                ("ep1_page001.png", PNG_PIXEL.to_vec()),
                ("ep1_page002.png", PNG_PIXEL.to_vec()),
                ("ep2_page001.png", PNG_PIXEL.to_vec()),
                ("thumbs.db", vec![0; 4]),
            ],
        )
        .await
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = client.health().await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_import_then_browse() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let response = import_sample(&client).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["comic_id"], "imp1");

    let comic: Value = client.get_comic("imp1").await.json().await.unwrap();
    assert_eq!(comic["title"], "Imported Comic");
    assert_eq!(comic["episode_count"], 2);
    assert_eq!(comic["page_count"], 3);
    assert_eq!(comic["episodes"][1], "Finish");
    assert_eq!(comic["categories"][0], "Comedy");
    assert_eq!(comic["created_at"], 1704164645);

    let info: Value = client.get_episode_info("imp1", 1).await.json().await.unwrap();
    assert_eq!(info["episode"], 1);
    assert_eq!(info["page_count"], 2);

    let page = client.get_page("imp1", 1, 2).await;
    assert_eq!(page.status(), StatusCode::OK);
    assert_eq!(page.headers()["content-type"], "image/png");
    assert_eq!(page.bytes().await.unwrap().as_ref(), PNG_PIXEL);

    let cover = client.get_cover("imp1").await;
    assert_eq!(cover.status(), StatusCode::OK);

    assert_eq!(client.get_page("imp1", 1, 9).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(client.get_episode_info("imp1", 7).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_import_requires_metadata_and_files() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());

    let no_title = client
        .import(
            &[("comic_id", "x"), ("type", "jm")],
            vec![("ep1_page001.png", PNG_PIXEL.to_vec())],
        )
        .await;
    let no_files = client
        .import(&[("comic_id", "x"), ("title", "T"), ("type", "jm")], vec![])
        .await;

    assert_eq!(no_title.status(), StatusCode::BAD_REQUEST);
    assert_eq!(no_files.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_listing_includes_untracked_directories() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());
    let loose = server.download_root().join("Loose Scans");
    std::fs::create_dir_all(loose.join("1")).unwrap();
    std::fs::write(loose.join("1").join("1.png"), PNG_PIXEL).unwrap();
    assert_eq!(import_sample(&client).await.status(), StatusCode::OK);

    let listing: Value = client.list_comics().await.json().await.unwrap();

    assert_eq!(listing["total"], 2);
    let scanned_id = scanned_archive_id("Loose Scans");
    let scanned = listing["comics"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["id"] == scanned_id.as_str())
        .expect("scanned archive listed");
    assert_eq!(scanned["author"], "Unknown");
    assert_eq!(scanned["source_type"], "local");
    assert_eq!(scanned["episodes"][0], "Episode 1");

    let page = client.get_page(&scanned_id, 1, 1).await;
    assert_eq!(page.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_delete_archive() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(server.base_url.clone());
    assert_eq!(import_sample(&client).await.status(), StatusCode::OK);

    assert_eq!(client.delete_comic("imp1").await.status(), StatusCode::OK);

    assert_eq!(client.get_comic("imp1").await.status(), StatusCode::NOT_FOUND);
    assert!(!server.download_root().join("Imported Comic").exists());
    assert_eq!(client.delete_comic("imp1").await.status(), StatusCode::NOT_FOUND);
}
