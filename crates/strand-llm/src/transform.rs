//! Raw stream to canonical stream glue.

use futures::StreamExt;
use strand_core::Message;
use tokio_util::sync::CancellationToken;

use crate::normalizer::ChunkNormalizer;
use crate::provider::{MessageStream, RawEventStream};

/// Drive a raw provider event stream through a normalizer.
///
/// Messages come out in arrival order with no buffering beyond what the
/// normalizer itself holds. Source close flushes the normalizer and closes
/// cleanly; a source error becomes one error-kind message and then the
/// stream closes; cancellation closes without further messages.
pub fn transform(
    raw: RawEventStream,
    mut normalizer: Box<dyn ChunkNormalizer + Send>,
    cancel: CancellationToken,
) -> MessageStream {
    Box::pin(async_stream::stream! {
        let mut raw = std::pin::pin!(raw);
        loop {
            tokio::select! {
                // Cancellation wins over a ready source, so an always-ready
                // stream cannot keep emitting after the token fires.
                biased;
                () = cancel.cancelled() => break,
                item = raw.next() => match item {
                    Some(Ok(event)) => {
                        for message in normalizer.normalize(&event) {
                            yield message;
                        }
                    }
                    Some(Err(err)) => {
                        yield Message::error(err.to_string());
                        break;
                    }
                    None => {
                        for message in normalizer.finish() {
                            yield message;
                        }
                        break;
                    }
                },
            }
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
