// Copyright 2024 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bandwidth-throttled `AsyncRead` wrapper (spec §4.5 step 6), and a couple of
//! reference `BandwidthMonitor` implementations for callers that don't have a real
//! cluster-wide monitor to inject.

use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::task::{Context, Poll};
use std::time::Instant;

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, ReadBuf};

use crate::collaborators::{BandwidthMonitor, BoxedAsyncReader};

pin_project! {
    /// A simple token-bucket throttled reader: `limit_bytes_per_sec` caps the rate at
    /// which `poll_read` yields bytes, refilling continuously based on elapsed wall
    /// time. `header_size` is deducted from the budget up front to account for the
    /// outbound request headers, per spec §4.5 step 6.
    pub struct ThrottledReader<R> {
        #[pin]
        inner: R,
        limit_bytes_per_sec: i64,
        available: i64,
        last_refill: Instant,
    }
}

impl<R> ThrottledReader<R> {
    pub fn new(inner: R, limit_bytes_per_sec: i64, header_size: usize) -> Self {
        Self {
            inner,
            limit_bytes_per_sec: limit_bytes_per_sec.max(1),
            available: -(header_size as i64),
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            let refill = (self.limit_bytes_per_sec as f64 * elapsed) as i64;
            if refill > 0 {
                self.available = (self.available + refill).min(self.limit_bytes_per_sec);
                self.last_refill = now;
            }
        }
    }
}

impl<R: AsyncRead> AsyncRead for ThrottledReader<R> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let mut this = self.project();
        this.refill();

        if *this.available <= 0 {
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }

        const CHUNK: usize = 16 * 1024;
        let allowed = (*this.available).min(buf.remaining() as i64).min(CHUNK as i64).max(0) as usize;
        if allowed == 0 {
            return Poll::Ready(Ok(()));
        }

        let mut scratch = [0u8; CHUNK];
        let mut scratch_buf = ReadBuf::new(&mut scratch[..allowed]);
        match this.inner.as_mut().poll_read(cx, &mut scratch_buf) {
            Poll::Ready(Ok(())) => {
                let filled = scratch_buf.filled();
                *this.available -= filled.len() as i64;
                buf.put_slice(filled);
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

/// Passes every reader through untouched — suitable when no bandwidth limit is
/// configured for a target (`BandwidthLimit == 0`).
pub struct NoopBandwidthMonitor;

impl BandwidthMonitor for NoopBandwidthMonitor {
    fn new_monitored_reader(
        &self,
        _bucket: &str,
        _object: &str,
        reader: BoxedAsyncReader,
        _header_size: usize,
        _per_node_limit: i64,
        _total_limit: i64,
    ) -> BoxedAsyncReader {
        reader
    }
}

/// A minimal in-process monitor that throttles every registered reader to
/// `per_node_limit` and tracks the cumulative bytes issued across all readers, mostly
/// useful for tests and single-node deployments; a real cluster-wide monitor would
/// additionally coordinate `total_limit` across nodes out of process.
#[derive(Default)]
pub struct SimpleBandwidthMonitor {
    bytes_observed: AtomicI64,
}

impl SimpleBandwidthMonitor {
    pub fn bytes_observed(&self) -> i64 {
        self.bytes_observed.load(Ordering::Relaxed)
    }
}

impl BandwidthMonitor for SimpleBandwidthMonitor {
    fn new_monitored_reader(
        &self,
        _bucket: &str,
        _object: &str,
        reader: BoxedAsyncReader,
        header_size: usize,
        per_node_limit: i64,
        _total_limit: i64,
    ) -> BoxedAsyncReader {
        self.bytes_observed.fetch_add(header_size as i64, Ordering::Relaxed);
        let limit = if per_node_limit > 0 { per_node_limit } else { i64::MAX / 2 };
        Box::pin(ThrottledReader::new(reader, limit, header_size))
    }
}
