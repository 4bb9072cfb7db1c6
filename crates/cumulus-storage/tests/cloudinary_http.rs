use cumulus_core::metadata::options_from;
use cumulus_core::{AdapterConfig, CloudinaryConfig, Metadata, ProviderCredentials, ProviderOptions, ResourceType};
use cumulus_storage::{CloudinaryStorage, Identifier, Storage, StorageError, UploadSource};
use mockito::Matcher;
use serde_json::json;

fn config(server: &mockito::Server, adapter: AdapterConfig) -> CloudinaryConfig {
    CloudinaryConfig::new(ProviderCredentials::new("demo", "1234", "secret"), adapter)
        .with_api_base_url(server.url())
        .with_delivery_base_url(server.url())
}

#[tokio::test]
async fn upload_reconciles_id_from_api_response() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1_1/demo/image/upload")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"name="public_id"\r\n\r\nstore/foo\r\n"#.to_string()),
            Matcher::Regex(r#"name="type"\r\n\r\nupload\r\n"#.to_string()),
        ]))
        .with_status(200)
        .with_body(
            json!({
                "public_id": "store/foo",
                "format": "jpg",
                "resource_type": "image",
                "type": "upload",
                "bytes": 4,
                "width": 2,
                "height": 2
            })
            .to_string(),
        )
        .create_async()
        .await;
    let storage = CloudinaryStorage::from_config(&config(
        &server,
        AdapterConfig::new(ResourceType::Image).with_prefix("store"),
    ))
    .unwrap();

    let outcome = storage
        .upload(
            UploadSource::from_bytes(&b"data"[..]),
            Identifier::new("foo.mp4"),
            Metadata::new(),
            ProviderOptions::new(),
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(outcome.id, "foo.jpg");
    assert_eq!(
        serde_json::Value::Object(outcome.metadata),
        json!({"size": 4, "mime_type": "image/jpeg", "width": 2, "height": 2})
    );
}

#[tokio::test]
async fn chunked_upload_over_http() {
    let mut server = mockito::Server::new_async().await;
    let first = server
        .mock("POST", "/v1_1/demo/video/upload")
        .match_header("content-range", "bytes 0-5/8")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;
    let last = server
        .mock("POST", "/v1_1/demo/video/upload")
        .match_header("content-range", "bytes 6-7/8")
        .with_status(200)
        .with_body(json!({"public_id": "clip", "format": "mp4", "bytes": 8}).to_string())
        .create_async()
        .await;
    let storage = CloudinaryStorage::from_config(&config(
        &server,
        AdapterConfig::new(ResourceType::Video).with_large_threshold(8),
    ))
    .unwrap();

    let outcome = storage
        .upload(
            UploadSource::from_bytes(&b"01234567"[..]),
            Identifier::new("clip.mov"),
            Metadata::new(),
            options_from(json!({"chunk_size": 6})),
        )
        .await
        .unwrap();

    first.assert_async().await;
    last.assert_async().await;
    assert_eq!(outcome.id, "clip.mp4");
    assert_eq!(outcome.metadata["mime_type"], json!("video/mp4"));
}

#[tokio::test]
async fn exists_and_bulk_delete_use_admin_api() {
    let mut server = mockito::Server::new_async().await;
    let lookup = server
        .mock("GET", "/v1_1/demo/resources/raw/private")
        .match_query(Matcher::UrlEncoded(
            "public_ids[]".to_string(),
            "docs/report.pdf".to_string(),
        ))
        .with_status(200)
        .with_body(json!({"resources": [{"public_id": "docs/report.pdf"}]}).to_string())
        .create_async()
        .await;
    let delete = server
        .mock("DELETE", "/v1_1/demo/resources/raw/private")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("public_ids[]".to_string(), "docs/report.pdf".to_string()),
            Matcher::UrlEncoded("public_ids[]".to_string(), "docs/notes.txt".to_string()),
        ]))
        .with_status(200)
        .with_body(json!({"deleted": {"docs/report.pdf": "deleted", "docs/notes.txt": "deleted"}}).to_string())
        .expect(1)
        .create_async()
        .await;
    let storage = CloudinaryStorage::from_config(&config(
        &server,
        AdapterConfig::new(ResourceType::Raw)
            .with_prefix("docs")
            .with_delivery_type("private"),
    ))
    .unwrap();

    assert!(storage.exists("report.pdf").await.unwrap());
    storage
        .multi_delete(&["report.pdf".to_string(), "notes.txt".to_string()])
        .await
        .unwrap();

    lookup.assert_async().await;
    delete.assert_async().await;
}

#[tokio::test]
async fn api_error_surfaces_as_provider_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1_1/demo/image/destroy")
        .with_status(401)
        .with_body(json!({"error": {"message": "Invalid Signature"}}).to_string())
        .create_async()
        .await;
    let storage = CloudinaryStorage::from_config(&config(&server, AdapterConfig::default())).unwrap();

    let err = storage.delete("foo.jpg").await.unwrap_err();

    match err {
        StorageError::Provider(e) => assert!(e.to_string().contains("Invalid Signature")),
        other => panic!("unexpected error: {:?}", other),
    }
}
