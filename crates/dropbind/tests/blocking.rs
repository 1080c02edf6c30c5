//! Synchronous Read/Write adapters
//!
//! These run outside any Tokio runtime: the adapters block on the shared one.

use dropbind::{
    runtime, AccessResolver, BlockingUpload, BufferedUpload, DownloadStream, RemotePath,
    UploadSessionStream, UploadTarget,
};
use dropbind_testing::assertions::assert_single_session;
use dropbind_testing::fixtures::numbered_lines;
use dropbind_testing::{Op, RecordingClient};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

fn upload_to(client: &Arc<RecordingClient>, path: &str, capacity: usize) -> BlockingUpload {
    let target = UploadTarget::new(RemotePath::parse(path).unwrap());
    let stream = UploadSessionStream::new(client.clone(), target);
    BlockingUpload::new(BufferedUpload::new(stream, capacity)).unwrap()
}

#[test]
fn test_write_all_then_finish() {
    let client = RecordingClient::shared();
    let mut upload = upload_to(&client, "/notes.txt", 64);
    let text = numbered_lines(20);

    upload.write_all(text.as_bytes()).unwrap();
    writeln!(upload, "done").unwrap();
    let total = upload.finish().unwrap();

    assert_eq!(total, text.len() as u64 + 5);
    assert_single_session(&client.calls());
    let stored = client.file("/notes.txt").unwrap();
    assert!(stored.ends_with(b"done\n"));
}

#[test]
fn test_drop_finishes_upload() {
    let client = RecordingClient::shared();
    {
        let mut upload = upload_to(&client, "/dropped.txt", 1024);
        upload.write_all(b"buffered only").unwrap();
        assert_eq!(upload.position(), 0);
    }

    assert_eq!(client.count(Op::Finish), 1);
    assert_eq!(client.file("/dropped.txt").unwrap(), b"buffered only");
}

#[test]
fn test_flush_sends_buffered_bytes() {
    let client = RecordingClient::shared();
    let mut upload = upload_to(&client, "/out.txt", 1024);

    upload.write_all(b"abc").unwrap();
    assert_eq!(client.count(Op::Start), 0);
    upload.flush().unwrap();
    assert_eq!(client.count(Op::Start), 1);
    assert_eq!(upload.position(), 3);
    upload.finish().unwrap();
}

#[test]
fn test_read_and_seek_unsupported() {
    let client = RecordingClient::shared();
    let mut upload = upload_to(&client, "/out.txt", 0);

    let mut buf = [0u8; 4];
    assert_eq!(upload.read(&mut buf).unwrap_err().kind(), ErrorKind::Unsupported);
    assert_eq!(
        upload.seek(SeekFrom::Start(0)).unwrap_err().kind(),
        ErrorKind::Unsupported
    );
    assert!(upload.len().is_err());
    assert!(upload.set_position(1).is_err());
    assert_eq!(upload.write(b"").unwrap(), 0);
    upload.finish().unwrap();
}

#[test]
fn test_blocking_download_reads_all_chunks() {
    let data = numbered_lines(50);
    let path = RemotePath::parse("/lines.txt").unwrap();
    let stream = DownloadStream::from_bytes(path, data.clone().into_bytes());

    let mut reader = stream.into_blocking().unwrap();
    let mut first = [0u8; 7];
    reader.read_exact(&mut first).unwrap();
    assert_eq!(&first, b"Line 0:");

    let mut rest = String::new();
    reader.read_to_string(&mut rest).unwrap();
    assert_eq!(format!("Line 0:{}", rest), data);
    assert_eq!(reader.position(), data.len() as u64);
}

#[test]
fn test_blocking_round_trip_through_resolver() {
    let client = RecordingClient::shared();
    let resolver = AccessResolver::new(client.clone());
    let path = RemotePath::parse("/round.txt").unwrap();

    let mut upload = BlockingUpload::new(resolver.resolve_write_buffered(&path)).unwrap();
    upload.write_all(b"round trip").unwrap();
    upload.finish().unwrap();

    let stream = runtime::block_on(resolver.resolve_read(&path))
        .unwrap()
        .unwrap()
        .unwrap();
    let mut contents = Vec::new();
    stream.into_blocking().unwrap().read_to_end(&mut contents).unwrap();
    assert_eq!(contents, b"round trip");
}

#[tokio::test]
async fn test_blocking_inside_async_fails_instead_of_panicking() {
    let client = RecordingClient::shared();
    let mut upload = upload_to(&client, "/out.txt", 0);

    let err = upload.write(b"x").unwrap_err();
    assert!(err.to_string().contains("async context"));
    assert!(runtime::block_on(async { 1 }).is_err());
}
