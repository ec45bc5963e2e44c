// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 请求的一次性完成句柄。
//!
//! 处理器通过 [`Completes::with`] 交付响应。响应依次经过响应过滤器、
//! 补充关联 ID 头部，然后序列化到缓冲池中的缓冲区，交给连接的写出任务。

use std::sync::{Arc, Mutex};

use log::{debug, warn};
use tokio::sync::oneshot;

use crate::{
    filter::Filters,
    pool::{BufferPool, PooledBuffer},
    response::Response,
};

/// 已序列化、等待写出的响应。
#[derive(Debug)]
pub struct Outbound {
    pub buffer: PooledBuffer,
    pub status_code: u16,
    /// 写出后关闭连接
    pub close_after: bool,
}

/// 连接写出任务持有的接收端，按分发顺序排队。
pub type PendingResponse = oneshot::Receiver<Outbound>;

/// 所有完成句柄共享的序列化环境。
pub struct CompletionContext {
    filters: Filters,
    pool: Arc<BufferPool>,
    correlation_id_header: String,
}

impl CompletionContext {
    pub fn new(filters: Filters, pool: Arc<BufferPool>, correlation_id_header: &str) -> Arc<Self> {
        Arc::new(Self {
            filters,
            pool,
            correlation_id_header: correlation_id_header.to_string(),
        })
    }

    pub fn correlation_id_header(&self) -> &str {
        &self.correlation_id_header
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }
}

/// 克隆后的句柄共享同一个发送端，只有第一次完成生效。
#[derive(Clone)]
pub struct Completes {
    sender: Arc<Mutex<Option<oneshot::Sender<Outbound>>>>,
    context: Arc<CompletionContext>,
    correlation_id: Option<String>,
    close_after: bool,
    id: u64,
}

impl Completes {
    /// `id` 为连接编号，仅用于日志。
    pub fn new(
        context: Arc<CompletionContext>,
        id: u64,
        correlation_id: Option<String>,
        close_after: bool,
    ) -> (Self, PendingResponse) {
        let (tx, rx) = oneshot::channel();
        let completes = Self {
            sender: Arc::new(Mutex::new(Some(tx))),
            context,
            correlation_id,
            close_after,
            id,
        };
        (completes, rx)
    }

    pub fn with(&self, response: Response) {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(sender) = sender else {
            warn!("[ID{}]响应已经完成过，忽略状态码为{}的重复完成", self.id, response.status_code());
            return;
        };

        let mut response = self.context.filters.process_response(response);
        if let Some(correlation_id) = &self.correlation_id {
            response = response.with_header(&self.context.correlation_id_header, correlation_id);
        }

        let mut buffer = self.context.pool.acquire(response.size());
        response.write_to(&mut buffer);
        let outbound = Outbound {
            buffer,
            status_code: response.status_code(),
            close_after: self.close_after,
        };
        if sender.send(outbound).is_err() {
            debug!("[ID{}]连接已关闭，丢弃状态码为{}的响应", self.id, response.status_code());
        }
    }

    pub fn has_completed(&self) -> bool {
        match self.sender.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}
