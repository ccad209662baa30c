//! Request dispatch and response consumption.

use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::api::{CompletionClient, CompletionRequest, FragmentStream};
use crate::error::{ChatError, ChatResult};

use super::retry::{RetryPolicy, with_retry};

/// How the reply is received.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseMode {
    /// Incremental fragments.
    Streaming,
    /// One complete body.
    Whole,
}

/// Progress reported while a reply is received.
#[derive(Debug, PartialEq, Eq)]
pub enum ResponseEvent<'a> {
    /// The request was accepted and the reply is arriving.
    Opened,
    /// Streamed text so far.
    Partial(&'a str),
    /// Complete non-streamed text.
    Complete(&'a str),
}

enum Opened {
    Stream(FragmentStream),
    Whole(String),
}

/// Send `request` with retries and collect the reply.
///
/// Returns the text received; when `cancel` fires mid-stream the partial
/// text is returned and the caller decides whether to keep it.
///
/// # Errors
/// Returns the last request error, a stream error, or
/// [`ChatError::Cancelled`] if cancelled before the reply opened.
pub async fn dispatch(
    client: &dyn CompletionClient,
    request: &CompletionRequest,
    mode: ResponseMode,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    on_retry: impl FnMut(u32, Duration, &ChatError),
    mut on_event: impl FnMut(ResponseEvent<'_>),
) -> ChatResult<String> {
    let opened = with_retry(
        policy,
        cancel,
        |_| async move {
            match mode {
                ResponseMode::Streaming => client.stream(request).await.map(Opened::Stream),
                ResponseMode::Whole => client.complete(request).await.map(Opened::Whole),
            }
        },
        on_retry,
    )
    .await?;

    on_event(ResponseEvent::Opened);
    match opened {
        Opened::Whole(text) => {
            on_event(ResponseEvent::Complete(&text));
            Ok(text)
        }
        Opened::Stream(stream) => consume(stream, cancel, on_event).await,
    }
}

async fn consume(
    mut stream: FragmentStream,
    cancel: &CancellationToken,
    mut on_event: impl FnMut(ResponseEvent<'_>),
) -> ChatResult<String> {
    let mut buffer = String::new();
    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = stream.next() => next,
        };
        match next {
            None => break,
            Some(Ok(fragment)) => {
                if cancel.is_cancelled() {
                    break;
                }
                buffer.push_str(&fragment);
                on_event(ResponseEvent::Partial(&buffer));
            }
            Some(Err(err)) => return Err(err),
        }
    }
    Ok(buffer)
}
