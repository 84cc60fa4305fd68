use futures::StreamExt as _;
use tracing::warn;

use super::FragmentStream;

/// Read cursor over a buffer that is redelivered in full on every update.
#[derive(Debug, Default)]
pub struct CumulativeDelta {
    cursor: usize,
}

impl CumulativeDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bytes of `cumulative` not returned by earlier calls.
    ///
    /// A buffer shorter than the cursor means the source restarted; nothing is
    /// re-emitted and the cursor follows the new length.
    pub fn delta<'a>(&mut self, cumulative: &'a [u8]) -> &'a [u8] {
        if cumulative.len() < self.cursor {
            warn!(
                cursor = self.cursor,
                len = cumulative.len(),
                "cumulative buffer shrank; resetting read cursor"
            );
            self.cursor = cumulative.len();
            return &[];
        }
        let fresh = &cumulative[self.cursor..];
        self.cursor = cumulative.len();
        fresh
    }

    /// Bytes consumed so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

/// Adapts a cumulative fragment stream into an incremental one.
///
/// Deltas are slices of the delivered buffers, so no bytes are copied here.
pub fn cumulative_to_incremental(stream: FragmentStream) -> FragmentStream {
    let adapted = stream
        .scan(CumulativeDelta::new(), |cursor, item| {
            let mapped = item.map(|buffer| {
                let fresh = cursor.delta(&buffer).len();
                buffer.slice(buffer.len() - fresh..)
            });
            futures::future::ready(Some(mapped))
        })
        .filter(|item| futures::future::ready(!matches!(item, Ok(bytes) if bytes.is_empty())));
    Box::pin(adapted)
}
