use super::{lock, Request};
use crate::error::{BodyError, TextError};

#[cfg(feature = "json")]
use crate::error::JsonError;

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Bytes, BytesMut};

impl Request {
    /// Read the request body.
    ///
    /// The payload is drained until end-of-stream. If a nonzero
    /// [`client_max_size`](Request::client_max_size) is configured, reading
    /// stops as soon as the accumulated size reaches it. A successful read
    /// is cached, and later calls return the same bytes without touching
    /// the stream again.
    pub async fn read(&self) -> Result<Bytes, BodyError> {
        let body = self.shared.body.get_or_try_init(|| self.drain()).await?;
        Ok(body.clone())
    }

    async fn drain(&self) -> Result<Bytes, BodyError> {
        if self.shared.body_spoiled.load(Ordering::Acquire) {
            return Err(BodyError::Consumed);
        }

        let limit = self.shared.client_max_size;
        let mut progress = Progress::new(&self.shared.body_spoiled);
        let mut body = BytesMut::new();

        loop {
            let chunk = self.next_chunk().await?;
            if !chunk.is_empty() {
                progress.consumed = true;
            }

            body.extend_from_slice(&chunk);

            if limit != 0 && body.len() >= limit {
                tracing::warn!(
                    limit,
                    actual = body.len(),
                    path = %self.path(),
                    "request body too large"
                );

                return Err(BodyError::PayloadTooLarge {
                    limit,
                    actual: body.len(),
                });
            }

            if chunk.is_empty() {
                break;
            }
        }

        progress.done = true;
        tracing::debug!(size = body.len(), "read request body");
        Ok(body.freeze())
    }

    async fn next_chunk(&self) -> Result<Bytes, BodyError> {
        tokio::select! {
            biased;
            _ = self.shared.cancel.cancelled() => Err(BodyError::Cancelled),
            chunk = self.shared.payload.read_any() => chunk.map_err(BodyError::Io),
        }
    }

    /// Drain and discard whatever is left of the body.
    ///
    /// Lets the transport reuse the connection when a handler chose not to
    /// read the body. If anything was discarded, a later
    /// [`read`](Request::read) fails with [`BodyError::Consumed`].
    pub async fn release(&self) -> Result<(), BodyError> {
        let mut progress = Progress::new(&self.shared.body_spoiled);

        while !self.shared.payload.at_eof() {
            if !self.next_chunk().await?.is_empty() {
                progress.consumed = true;
            }
        }

        Ok(())
    }

    /// Read the body and decode it as text.
    ///
    /// The charset is taken from [`set_charset`](Request::set_charset), then
    /// from the `content-type` header, then from the configured default.
    pub async fn text(&self) -> Result<String, TextError> {
        let body = self.read().await?;
        let name = self.charset();
        let charset = Charset::lookup(&name).ok_or(TextError::UnsupportedCharset(name))?;
        charset.decode(&body)
    }

    /// Read the body and parse it as a JSON document.
    #[cfg(feature = "json")]
    pub async fn json(&self) -> Result<serde_json::Value, JsonError> {
        self.json_as().await
    }

    /// Read the body and deserialize it from JSON.
    #[cfg(feature = "json")]
    pub async fn json_as<T>(&self) -> Result<T, JsonError>
    where
        T: serde::de::DeserializeOwned,
    {
        let text = self.text().await?;
        serde_json::from_str(&text).map_err(JsonError::MalformedBody)
    }

    /// The charset [`text`](Request::text) will decode with.
    pub fn charset(&self) -> String {
        if let Some(charset) = lock(&self.shared.charset).clone() {
            return charset;
        }

        self.content_type()
            .and_then(|mime| mime.get_param(mime::CHARSET))
            .map(|charset| charset.as_str().to_owned())
            .unwrap_or_else(|| self.shared.default_charset.clone())
    }

    /// Force the charset used by [`text`](Request::text).
    pub fn set_charset(&self, charset: impl Into<String>) {
        *lock(&self.shared.charset) = Some(charset.into());
    }
}

// Marks the body unusable if a read is abandoned after consuming data,
// including when the future is dropped mid-read.
struct Progress<'a> {
    spoiled: &'a AtomicBool,
    consumed: bool,
    done: bool,
}

impl<'a> Progress<'a> {
    fn new(spoiled: &'a AtomicBool) -> Self {
        Progress {
            spoiled,
            consumed: false,
            done: false,
        }
    }
}

impl Drop for Progress<'_> {
    fn drop(&mut self) {
        if self.consumed && !self.done {
            self.spoiled.store(true, Ordering::Release);
        }
    }
}

/// The character sets request bodies can be decoded from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Charset {
    Utf8,
    Ascii,
    Latin1,
}

impl Charset {
    pub(crate) fn lookup(name: &str) -> Option<Charset> {
        match name.trim().to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Charset::Utf8),
            "us-ascii" | "ascii" => Some(Charset::Ascii),
            "iso-8859-1" | "iso8859-1" | "latin-1" | "latin1" | "l1" => Some(Charset::Latin1),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Charset::Utf8 => "utf-8",
            Charset::Ascii => "us-ascii",
            Charset::Latin1 => "iso-8859-1",
        }
    }

    fn decode(self, bytes: &[u8]) -> Result<String, TextError> {
        let invalid = || TextError::Decode {
            charset: self.name(),
        };

        match self {
            Charset::Utf8 => std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|_| invalid()),
            Charset::Ascii if bytes.is_ascii() => {
                String::from_utf8(bytes.to_vec()).map_err(|_| invalid())
            }
            Charset::Ascii => Err(invalid()),
            Charset::Latin1 => Ok(bytes.iter().map(|&b| char::from(b)).collect()),
        }
    }
}
