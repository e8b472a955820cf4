//! Shared line-buffered SSE draining, used by the prompt-service client.
//!
//! The upstream prompt service streams newline-delimited `data: {...}`
//! frames terminated by a blank line, exactly like the reference chat
//! API this crate's retry/stream conventions were grounded on. This
//! module extracts that shared buffering logic so `dify.rs` only has to
//! supply a per-chunk JSON parser.

use crate::util::from_reqwest;
use np_domain::error::Result;
use np_domain::stream::BoxStream;

/// Extract complete `data:` payloads from an SSE buffer, draining
/// consumed bytes and leaving any trailing partial event for the next
/// call.
pub(crate) fn drain_data_lines(buffer: &mut String) -> Vec<String> {
    let mut data_lines = Vec::new();

    while let Some(pos) = buffer.find("\n\n") {
        let block: String = buffer.drain(..pos).collect();
        buffer.drain(..2);

        for line in block.lines() {
            let line = line.trim();
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() && data != "[DONE]" {
                    data_lines.push(data.to_string());
                }
            }
        }
    }

    data_lines
}

/// Build a [`BoxStream`] of parsed items from an SSE `reqwest::Response`.
/// `parse_data` receives each raw `data:` payload and returns zero or
/// more parsed items; it is `FnMut` so a parser can track incremental
/// state (e.g. the first-seen `task_id`/`conversation_id`).
pub(crate) fn sse_response_stream<F, T>(
    response: reqwest::Response,
    mut parse_data: F,
) -> BoxStream<'static, Result<T>>
where
    F: FnMut(&str) -> Vec<Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let stream = async_stream::stream! {
        let mut response = response;
        let mut buffer = String::new();

        loop {
            match response.chunk().await {
                Ok(Some(bytes)) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    for data in drain_data_lines(&mut buffer) {
                        for item in parse_data(&data) {
                            yield item;
                        }
                    }
                }
                Ok(None) => {
                    if !buffer.trim().is_empty() {
                        buffer.push_str("\n\n");
                        for data in drain_data_lines(&mut buffer) {
                            for item in parse_data(&data) {
                                yield item;
                            }
                        }
                    }
                    break;
                }
                Err(e) => {
                    yield Err(from_reqwest(e));
                    break;
                }
            }
        }
    };

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_multiple_events() {
        let mut buf = String::from("data: first\n\ndata: second\n\n");
        let lines = drain_data_lines(&mut buf);
        assert_eq!(lines, vec!["first", "second"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn drain_partial_event_stays_buffered() {
        let mut buf = String::from("data: complete\n\ndata: partial");
        let lines = drain_data_lines(&mut buf);
        assert_eq!(lines, vec!["complete"]);
        assert_eq!(buf, "data: partial");
    }

    #[test]
    fn drain_skips_done_sentinel() {
        let mut buf = String::from("data: [DONE]\n\n");
        assert!(drain_data_lines(&mut buf).is_empty());
    }
}
