//! Conversion of request bodies into hyper bodies.

use std::io::{self, Read};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body::{Body as HttpBody, Frame};
use http_body_util::{BodyExt, Empty, Full, combinators::UnsyncBoxBody};
use tokio::sync::mpsc;

use crate::Body;

/// Body type sent by the hyper client.
pub(crate) type RequestBody = UnsyncBoxBody<Bytes, io::Error>;

const CHUNK_SIZE: usize = 8 * 1024;

/// Convert a [`Body`] for sending.
///
/// In-memory bodies report an exact size (sent with `Content-Length`); reader
/// bodies report none and go out chunked. Must be called within the runtime.
pub(crate) fn into_request_body(body: Body) -> RequestBody {
    match body {
        Body::Empty => Empty::<Bytes>::new()
            .map_err(|never| match never {})
            .boxed_unsync(),
        Body::Bytes(bytes) => Full::new(bytes)
            .map_err(|never| match never {})
            .boxed_unsync(),
        Body::Reader(reader) => ReaderBody::spawn(reader).boxed_unsync(),
    }
}

/// Streams a blocking reader, read on the blocking pool.
struct ReaderBody {
    chunks: mpsc::Receiver<io::Result<Bytes>>,
}

impl ReaderBody {
    fn spawn(mut reader: Box<dyn Read + Send>) -> Self {
        let (tx, chunks) = mpsc::channel(4);
        tokio::task::spawn_blocking(move || {
            loop {
                let mut chunk = vec![0; CHUNK_SIZE];
                let item = match reader.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => {
                        chunk.truncate(n);
                        Ok(Bytes::from(chunk))
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => Err(e),
                };
                let failed = item.is_err();
                if tx.blocking_send(item).is_err() || failed {
                    break;
                }
            }
        });
        Self { chunks }
    }
}

impl HttpBody for ReaderBody {
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, io::Error>>> {
        self.chunks
            .poll_recv(cx)
            .map(|chunk| chunk.map(|chunk| chunk.map(Frame::data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime")
    }

    #[test]
    fn in_memory_bodies_have_exact_size() {
        let rt = runtime();
        rt.block_on(async {
            let body = into_request_body(Body::from("hello"));
            assert_eq!(body.size_hint().exact(), Some(5));

            let body = into_request_body(Body::Empty);
            assert_eq!(body.size_hint().exact(), Some(0));
        });
    }

    #[test]
    fn reader_body_streams_everything() {
        let rt = runtime();
        let data = vec![7_u8; CHUNK_SIZE * 2 + 10];
        let expected = data.clone();

        let collected = rt.block_on(async move {
            let body = into_request_body(Body::reader(io::Cursor::new(data)));
            assert_eq!(body.size_hint().exact(), None);
            body.collect().await.expect("collect").to_bytes()
        });

        assert_eq!(collected.as_ref(), expected.as_slice());
    }

    #[test]
    fn reader_errors_surface() {
        struct Failing;
        impl Read for Failing {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("disk gone"))
            }
        }

        let rt = runtime();
        let err = rt.block_on(async {
            into_request_body(Body::reader(Failing))
                .collect()
                .await
                .expect_err("read failure")
        });
        assert_eq!(err.to_string(), "disk gone");
    }
}
