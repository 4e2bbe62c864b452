use bes_lib::transport::{EventTransport, FailureKind, TransportError, WriterState};

use super::common::*;

#[tokio::test]
async fn failed_upload_stops_the_stream_after_earlier_events() {
  let uploader = ScriptedUploader::new();
  uploader.fail(artifact_path(2), Failure::Error);
  let (transport, sink) = memory_transport(uploader.clone());

  for n in 0..5 {
    transport.send(artifact_event(n));
  }
  let err = transport.close().await.unwrap_err();

  match &err {
    TransportError::UploadFailed { event, .. } => assert_eq!(event, "named_set:2"),
    other => panic!("unexpected error: {other}"),
  }
  assert_eq!(err.kind(), FailureKind::Upload);
  assert_eq!(written_ids(&sink), ["0", "1"]);
  assert!(sink.is_shut_down());
  assert_eq!(uploader.shutdowns(), 1);
  assert_eq!(transport.state(), WriterState::ClosedErr);

  transport.send(artifact_event(5));
  assert_eq!(transport.stats().dropped, 1);
}

#[tokio::test]
async fn upload_timeout_is_reported_as_timeout() {
  let uploader = ScriptedUploader::new();
  uploader.fail(artifact_path(0), Failure::Timeout);
  let (transport, sink) = memory_transport(uploader);

  transport.send(artifact_event(0));
  transport.send(artifact_event(1));
  let err = transport.close().await.unwrap_err();

  assert_eq!(err.kind(), FailureKind::UploadTimeout);
  assert!(sink.contents().is_empty());
}

#[tokio::test]
async fn failure_is_reported_before_close_is_called() {
  let uploader = ScriptedUploader::new();
  uploader.fail(artifact_path(0), Failure::Error);
  let (transport, _sink) = memory_transport(uploader);

  transport.send(artifact_event(0));
  tokio::time::sleep(TEST_FLUSH_INTERVAL * 3).await;

  assert_eq!(transport.state(), WriterState::ClosedErr);
  let handle = transport.close();
  assert!(handle.is_done());
  assert!(handle.await.is_err());
}

#[tokio::test]
async fn unresolved_path_is_an_encoding_failure() {
  struct ForgetfulUploader;

  #[async_trait::async_trait]
  impl bes_lib::upload::ArtifactUploader for ForgetfulUploader {
    fn name(&self) -> &str {
      "forgetful"
    }

    async fn resolve(
      &self,
      _paths: std::collections::BTreeSet<std::path::PathBuf>,
    ) -> Result<bes_lib::upload::PathMapping, bes_lib::upload::UploadError> {
      Ok(bes_lib::upload::PathMapping::new())
    }

    fn shutdown(&self) {}
  }

  let sink = bes_lib::sink::MemorySink::new();
  let transport = EventTransport::new(sink.boxed(), std::sync::Arc::new(ForgetfulUploader), config());
  transport.send(artifact_event(0));

  let err = transport.close().await.unwrap_err();
  assert_eq!(err.kind(), FailureKind::Encoding);
}

#[tokio::test]
async fn sink_failure_is_classified_as_io() {
  let uploader = ScriptedUploader::new();
  let transport = EventTransport::new(FailingSink::boxed(), uploader.clone(), config());

  transport.send(plain_event("0"));
  let err = transport.close().await.unwrap_err();

  assert_eq!(err.kind(), FailureKind::SinkIo);
  assert_eq!(uploader.shutdowns(), 1);
}
