use std::time::Duration;

/// How long the writer waits on an idle queue before flushing the sink.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(250);

/// Overrides [`DEFAULT_FLUSH_INTERVAL`], in milliseconds.
pub const FLUSH_INTERVAL_ENV: &str = "BES_FLUSH_INTERVAL_MS";

/// Default per-resolution timeout for the store uploader.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of files the store uploader copies concurrently.
pub const DEFAULT_UPLOAD_PARALLELISM: usize = 8;

pub const FILE_URI_SCHEME: &str = "file://";
pub const CAS_URI_PREFIX: &str = "cas://sha256/";

/// Subdirectory of a store root holding content-addressed blobs.
pub const CAS_DIR: &str = "cas";
