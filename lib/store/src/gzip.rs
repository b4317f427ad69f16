//! Gzip compression for `ResourceState.ErrorResponse`, kept under
//! the backend's per-row size limits (spec §4.2).

use async_compression::tokio::bufread::{GzipDecoder, GzipEncoder};
use tokio::io::AsyncReadExt;

pub async fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
  let mut encoder = GzipEncoder::new(data);
  let mut out = Vec::new();
  encoder.read_to_end(&mut out).await?;
  Ok(out)
}

pub async fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
  let mut decoder = GzipDecoder::new(data);
  let mut out = Vec::new();
  decoder.read_to_end(&mut out).await?;
  Ok(out)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn compress_then_decompress_round_trips() {
    let original = b"bundle exec failed: exit status 1".to_vec();
    let compressed = compress(&original).await.unwrap();
    assert_ne!(compressed, original);
    let decompressed = decompress(&compressed).await.unwrap();
    assert_eq!(decompressed, original);
  }
}
