use std::sync::Arc;

use bes_lib::encode::{EncodeOptions, EventFormat};
use bes_lib::event::{BuildEvent, File, FileLocation};
use bes_lib::reader::decode_stream;
use bes_lib::sink::MemorySink;
use bes_lib::transport::{EventTransport, FailureKind};
use bes_lib::upload::store::StoreConfig;
use bes_lib::upload::{LocalFilesUploader, StoreUploader};
use bes_lib::util::hash::hash_bytes;
use tempfile::TempDir;

use super::common::config;

fn json_config() -> bes_lib::transport::TransportConfig {
  config().with_encode(EncodeOptions {
    format: EventFormat::Json,
    path_conversion: true,
  })
}

fn uris(sink: &MemorySink) -> Vec<String> {
  let stream = decode_stream(&sink.contents(), EventFormat::Json).unwrap();
  stream
    .events
    .iter()
    .flat_map(|event| event.files())
    .filter_map(|file| match &file.location {
      FileLocation::Uri(uri) => Some(uri.clone()),
      _ => None,
    })
    .collect()
}

#[tokio::test]
async fn local_uploader_writes_file_uris() {
  let temp = TempDir::new().unwrap();
  std::fs::write(temp.path().join("app"), b"binary").unwrap();

  let sink = MemorySink::new();
  let uploader = Arc::new(LocalFilesUploader::new(temp.path()));
  let transport = EventTransport::new(sink.boxed(), uploader, json_config());

  transport.send(BuildEvent::named_set("0", vec![File::path("app", "app")]));
  transport.close().await.unwrap();

  let uris = uris(&sink);
  assert_eq!(uris.len(), 1);
  assert!(uris[0].starts_with("file://"), "got {}", uris[0]);
  assert!(uris[0].ends_with("/app"));
}

#[tokio::test]
async fn local_uploader_missing_file_fails_the_stream() {
  let temp = TempDir::new().unwrap();
  let sink = MemorySink::new();
  let uploader = Arc::new(LocalFilesUploader::new(temp.path()));
  let transport = EventTransport::new(sink.boxed(), uploader, json_config());

  transport.send(BuildEvent::named_set("0", vec![File::path("gone", "missing.txt")]));
  let err = transport.close().await.unwrap_err();

  assert_eq!(err.kind(), FailureKind::Upload);
  assert!(err.to_string().contains("missing.txt"));
}

#[tokio::test]
async fn store_uploader_writes_content_addresses() {
  let work = TempDir::new().unwrap();
  let store = TempDir::new().unwrap();
  let artifact = work.path().join("out.txt");
  std::fs::write(&artifact, b"hello store").unwrap();

  let sink = MemorySink::new();
  let uploader = Arc::new(StoreUploader::new(StoreConfig::new(store.path())));
  let transport = EventTransport::new(sink.boxed(), uploader.clone(), json_config());

  transport.send(BuildEvent::named_set("0", vec![File::path("out", &artifact)]));
  transport.send(BuildEvent::named_set("1", vec![File::path("again", &artifact)]));
  transport.close().await.unwrap();

  let hash = hash_bytes(b"hello store");
  let expected = format!("cas://sha256/{}", hash);
  assert_eq!(uris(&sink), [expected.clone(), expected]);
  assert!(uploader.blob_path(&hash).exists());
}

#[tokio::test]
async fn path_conversion_off_keeps_local_paths() {
  let sink = MemorySink::new();
  let uploader = Arc::new(LocalFilesUploader::new("/nowhere"));
  let config = config().with_encode(EncodeOptions {
    format: EventFormat::Json,
    path_conversion: false,
  });
  let transport = EventTransport::new(sink.boxed(), uploader, config);

  transport.send(BuildEvent::named_set("0", vec![File::path("app", "/not/uploaded")]));
  transport.close().await.unwrap();

  let stream = decode_stream(&sink.contents(), EventFormat::Json).unwrap();
  assert_eq!(stream.events[0].files()[0], &File::path("app", "/not/uploaded"));
}
