//! Local image bytes port

#[async_trait::async_trait]
pub trait IImageStore: Send + Sync {
    /// Bytes behind a local URI, `None` when the file is not resolvable
    async fn read(&self, uri: &str) -> anyhow::Result<Option<Vec<u8>>>;

    /// Store bytes under `file_name` and return the URI to record on the image
    async fn write(&self, file_name: &str, bytes: &[u8]) -> anyhow::Result<String>;

    /// URI a file with this name would have, whether or not it exists yet
    fn uri_for(&self, file_name: &str) -> String;
}
