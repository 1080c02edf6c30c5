//! Binding surface tests

use dropbind::{
    Binder, BindError, BoundValue, Config, FileAccess, FileBinding, FixedClientFactory,
    StoreClientFactory, UploadSink, ValueShape,
};
use dropbind_testing::{init_tracing, Op, RecordingClient, TestStore};
use std::collections::HashMap;
use std::sync::Arc;

fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn binder_for(client: &Arc<RecordingClient>) -> Binder {
    let mut config = Config::default();
    config.connection.default = Some("memory:///".to_string());
    Binder::new(config, Arc::new(FixedClientFactory(client.clone())))
}

#[tokio::test]
async fn test_binding_without_path_binds_client() {
    let client = RecordingClient::shared();
    let binder = binder_for(&client);

    let bound = binder
        .bind(&FileBinding::client(), ValueShape::Stream, &HashMap::new())
        .await
        .unwrap();
    assert!(matches!(bound, BoundValue::Client(_)));
}

#[tokio::test]
async fn test_access_without_path_rejected() {
    let client = RecordingClient::shared();
    let binder = binder_for(&client);
    let binding = FileBinding {
        access: Some(FileAccess::Read),
        ..FileBinding::default()
    };

    let err = binder
        .bind(&binding, ValueShape::Stream, &HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, BindError::Config(_)));
}

#[tokio::test]
async fn test_read_write_access_rejected() {
    let client = RecordingClient::shared();
    let binder = binder_for(&client);
    let binding = FileBinding::with_access("/x.txt", FileAccess::ReadWrite);

    assert!(binder
        .bind(&binding, ValueShape::Stream, &HashMap::new())
        .await
        .is_err());
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test_stream_without_access_rejected() {
    let client = RecordingClient::shared();
    let binder = binder_for(&client);

    assert!(binder
        .bind(&FileBinding::new("/x.txt"), ValueShape::Stream, &HashMap::new())
        .await
        .is_err());
}

#[tokio::test]
async fn test_read_text_resolves_template() {
    let client = Arc::new(RecordingClient::new().with_file("/docs/readme.txt", b"hi"));
    let binder = binder_for(&client);
    let binding = FileBinding::new("/{folder}/{name}.txt");

    let text = binder
        .read_text(&binding, &params(&[("folder", "docs"), ("name", "readme")]))
        .await
        .unwrap();
    assert_eq!(text.as_deref(), Some("hi"));

    let missing = binder
        .read_bytes(&binding, &params(&[("folder", "docs"), ("name", "other")]))
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn test_write_value_none_writes_nothing() {
    let client = RecordingClient::shared();
    let binder = binder_for(&client);

    let written = binder
        .write_value(&FileBinding::new("/out.txt"), &HashMap::new(), None)
        .await
        .unwrap();
    assert_eq!(written, None);
    assert!(client.calls().is_empty());
}

#[tokio::test]
async fn test_write_value_commits() {
    let client = RecordingClient::shared();
    let binder = binder_for(&client);

    let written = binder
        .write_value(&FileBinding::new("/out.txt"), &HashMap::new(), Some(&b"value"[..]))
        .await
        .unwrap();
    assert_eq!(written, Some(5));
    assert_eq!(client.file("/out.txt").unwrap(), b"value");
    assert_eq!(client.count(Op::Finish), 1);
}

#[tokio::test]
async fn test_bound_writer_closes_once() {
    let client = RecordingClient::shared();
    let binder = binder_for(&client);

    let bound = binder
        .bind(&FileBinding::new("/w.txt"), ValueShape::Writer, &HashMap::new())
        .await
        .unwrap();
    let BoundValue::Write(mut upload) = bound else {
        panic!("expected an upload");
    };
    upload.write(b"text").await.unwrap();
    upload.close().await.unwrap();
    drop(upload);

    assert_eq!(client.count(Op::Finish), 1);
}

#[tokio::test]
async fn test_copy_streams_source_to_destination() {
    init_tracing();
    let client = Arc::new(RecordingClient::new().with_file("/in/a.txt", b"copied bytes"));
    let binder = binder_for(&client);
    let p = params(&[("name", "a")]);

    let copied = binder
        .copy(
            &FileBinding::with_access("/in/{name}.txt", FileAccess::Read),
            &FileBinding::with_access("/out/{name}.txt", FileAccess::Write),
            &p,
        )
        .await
        .unwrap();
    assert_eq!(copied, Some(12));
    assert_eq!(client.file("/out/a.txt").unwrap(), b"copied bytes");
}

#[tokio::test]
async fn test_copy_missing_source_leaves_destination_alone() {
    let client = RecordingClient::shared();
    let binder = binder_for(&client);

    let copied = binder
        .copy(
            &FileBinding::with_access("/in.txt", FileAccess::Read),
            &FileBinding::with_access("/out.txt", FileAccess::Write),
            &HashMap::new(),
        )
        .await
        .unwrap();
    assert_eq!(copied, None);
    assert_eq!(client.count(Op::Start), 0);
    assert!(client.file("/out.txt").is_none());
}

#[tokio::test]
async fn test_store_factory_connects_by_url() {
    let store = TestStore::new().unwrap();
    let binder = Binder::new(Config::default(), Arc::new(StoreClientFactory::new()));
    let binding = FileBinding::new("/bound.txt").connection(store.connection());

    binder
        .write_value(&binding, &HashMap::new(), Some(&b"on disk"[..]))
        .await
        .unwrap();
    assert_eq!(store.read("/bound.txt").unwrap(), b"on disk");

    let text = binder.read_text(&binding, &HashMap::new()).await.unwrap();
    assert_eq!(text.as_deref(), Some("on disk"));
}
