// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 按尺寸分级的字节缓冲池。
//!
//! `acquire` 与释放必须成对出现：`PooledBuffer` 在 drop 时自动归还。
//! 超过 `max_buffered_message_size` 的请求得到一次性分配的缓冲区，不会归还。

use std::{
    ops::{Deref, DerefMut},
    sync::Arc,
};

use bytes::BytesMut;
use crossbeam::queue::ArrayQueue;

const SMALLEST_CLASS: usize = 1024;

pub struct BufferPool {
    classes: Vec<(usize, ArrayQueue<BytesMut>)>,
    max_buffered_message_size: usize,
}

impl BufferPool {
    /// `buffers_per_class` 为每个尺寸级别最多保留的空闲缓冲区数量。
    pub fn new(buffers_per_class: usize, max_buffered_message_size: usize) -> Arc<Self> {
        let capacity = buffers_per_class.max(1);
        let mut classes = Vec::new();
        let mut size = SMALLEST_CLASS;
        loop {
            let class = size.min(max_buffered_message_size.max(SMALLEST_CLASS));
            classes.push((class, ArrayQueue::new(capacity)));
            if class >= max_buffered_message_size {
                break;
            }
            size *= 4;
        }
        Arc::new(Self {
            classes,
            max_buffered_message_size,
        })
    }

    pub fn acquire(self: &Arc<Self>, size: usize) -> PooledBuffer {
        match self.classes.iter().find(|(class, _)| *class >= size) {
            Some((class, queue)) if size <= self.max_buffered_message_size => {
                let buf = queue.pop().unwrap_or_else(|| BytesMut::with_capacity(*class));
                PooledBuffer {
                    buf,
                    class: Some(*class),
                    pool: Some(Arc::clone(self)),
                }
            }
            _ => PooledBuffer::one_off(size),
        }
    }

    /// 当前空闲的缓冲区数量。
    pub fn available(&self) -> usize {
        self.classes.iter().map(|(_, q)| q.len()).sum()
    }

    fn release(&self, class: usize, mut buf: BytesMut) {
        buf.clear();
        if buf.capacity() < class {
            return;
        }
        if let Some((_, queue)) = self.classes.iter().find(|(c, _)| *c == class) {
            // 队列已满时直接丢弃
            let _ = queue.push(buf);
        }
    }
}

pub struct PooledBuffer {
    buf: BytesMut,
    class: Option<usize>,
    pool: Option<Arc<BufferPool>>,
}

impl PooledBuffer {
    pub fn one_off(size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(size),
            class: None,
            pool: None,
        }
    }

    pub fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.buf.len())
            .field("class", &self.class)
            .finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let (Some(pool), Some(class)) = (self.pool.take(), self.class) {
            pool.release(class, std::mem::take(&mut self.buf));
        }
    }
}
