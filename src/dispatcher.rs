// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 请求分发器
//!
//! 分发器独占每个连接的请求解析器以及“缺少内容”的待处理集合，
//! 所有状态变化都经由 [`Signal`] 在同一个任务中串行处理：
//!
//! - `Consume`：把读到的字节交给连接的解析器，逐个分发完整的请求；
//! - `Sweep`：周期性检查缺少内容的连接，超时的以 400 完成；
//! - `Closed`：清理连接状态。
//!
//! 每个请求在分发前就把完成句柄的接收端排入连接的写出队列，
//! 因此同一连接上的响应严格按照请求到达的顺序写出。

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::{
    completes::{CompletionContext, Completes, PendingResponse},
    config::Config,
    error_handler::ErrorHandlers,
    filter::Filters,
    pool::{BufferPool, PooledBuffer},
    request::Request,
    request_parser::RequestParser,
    resource::Dispatchable,
    response::Response,
};

/// 连接写出任务的队列入口。
pub type ResponseSender = mpsc::UnboundedSender<PendingResponse>;

#[derive(Debug)]
pub enum Signal {
    Open { id: u64, responses: ResponseSender },
    Consume { id: u64, buffer: PooledBuffer },
    Closed { id: u64 },
    Sweep,
    Stop,
}

struct Connection {
    parser: RequestParser,
    responses: ResponseSender,
}

pub struct Dispatcher {
    resources: Vec<Box<dyn Dispatchable>>,
    errors: Arc<ErrorHandlers>,
    completion: Arc<CompletionContext>,
    connections: HashMap<u64, Connection>,
    missing_content: HashSet<u64>,
    missing_content_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        config: &Config,
        resources: Vec<Box<dyn Dispatchable>>,
        filters: Filters,
        errors: ErrorHandlers,
        pool: Arc<BufferPool>,
    ) -> Self {
        Self {
            resources,
            errors: Arc::new(errors),
            completion: CompletionContext::new(filters, pool, config.correlation_id_header()),
            connections: HashMap::new(),
            missing_content: HashSet::new(),
            missing_content_timeout: config.request_missing_content_timeout(),
        }
    }

    /// 启动所有资源的处理器池。需要在 tokio 运行时中调用。
    pub fn start(&mut self) {
        for resource in self.resources.iter_mut() {
            resource.start();
        }
        info!("分发器已启动，共{}个资源", self.resources.len());
    }

    pub fn stop(&mut self) {
        for resource in self.resources.iter_mut() {
            resource.stop();
        }
        self.completion.filters().stop();
        self.connections.clear();
        self.missing_content.clear();
        info!("分发器已停止");
    }

    /// 串行处理信号，直到收到 `Stop` 或所有发送端关闭。
    pub async fn run(mut self, mut signals: mpsc::UnboundedReceiver<Signal>) {
        self.start();
        while let Some(signal) = signals.recv().await {
            match signal {
                Signal::Open { id, responses } => self.open(id, responses),
                Signal::Consume { id, buffer } => self.consume(id, &buffer),
                Signal::Closed { id } => self.closed(id),
                Signal::Sweep => self.sweep(),
                Signal::Stop => break,
            }
        }
        self.stop();
    }

    pub fn open(&mut self, id: u64, responses: ResponseSender) {
        debug!("[ID{}]连接已登记", id);
        self.connections.insert(
            id,
            Connection {
                parser: RequestParser::new(),
                responses,
            },
        );
    }

    /// 解析一段读到的字节并分发其中所有完整的请求。
    ///
    /// 解析错误以 400 完成，排在此前已完成的请求之后。
    pub fn consume(&mut self, id: u64, bytes: &[u8]) {
        let Some(connection) = self.connections.get_mut(&id) else {
            warn!("[ID{}]收到未登记连接的数据，已丢弃{}字节", id, bytes.len());
            return;
        };
        let result = connection.parser.parse_next(bytes);
        let mut requests = Vec::new();
        while let Some(request) = connection.parser.full_request() {
            requests.push(request);
        }
        let missing_content = connection.parser.is_missing_content();
        let responses = connection.responses.clone();

        for request in requests {
            self.dispatch(id, request, &responses);
        }

        if let Err(e) = result {
            warn!("[ID{}]解析HTTP请求失败：{}", id, e);
            self.respond_directly(id, &responses, Response::response_400(e.message()), false);
        }

        if missing_content {
            self.missing_content.insert(id);
        } else {
            self.missing_content.remove(&id);
        }
    }

    pub fn closed(&mut self, id: u64) {
        if self.connections.remove(&id).is_some() {
            debug!("[ID{}]连接状态已清理", id);
        }
        self.missing_content.remove(&id);
    }

    /// 以 400 完成等待消息体超时的连接，并把它们移出待处理集合。
    pub fn sweep(&mut self) {
        let timeout = self.missing_content_timeout;
        // 待处理集合只包含已登记的连接，`closed` 会同时移除两处
        let expired: Vec<u64> = self
            .connections
            .iter()
            .filter(|(id, connection)| {
                self.missing_content.contains(*id)
                    && connection.parser.has_missing_content_time_expired(timeout)
            })
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            self.missing_content.remove(&id);
            let Some(connection) = self.connections.get_mut(&id) else {
                continue;
            };
            connection.parser = RequestParser::new();
            let responses = connection.responses.clone();
            warn!("[ID{}]等待消息体超过{}ms，返回400", id, timeout.as_millis());
            self.respond_directly(id, &responses, Response::response_400("Missing content."), true);
        }
    }

    pub fn is_missing_content(&self, id: u64) -> bool {
        self.missing_content.contains(&id)
    }

    pub fn pending_missing_content(&self) -> usize {
        self.missing_content.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn dispatch(&self, id: u64, request: Request, responses: &ResponseSender) {
        let correlation_id = request
            .header_value(self.completion.correlation_id_header())
            .map(str::to_string);
        let (completes, pending) =
            Completes::new(Arc::clone(&self.completion), id, correlation_id, !request.is_keep_alive());
        if responses.send(pending).is_err() {
            debug!("[ID{}]写出队列已关闭，放弃请求 {} {}", id, request.method(), request.path());
            return;
        }

        let request = self.completion.filters().process_request(request);
        debug!("[ID{}]分发请求 {} {}", id, request.method(), request.uri().request_target());

        for resource in &self.resources {
            let results = match resource.match_with(request.method(), request.uri()) {
                Ok(results) => results,
                Err(e) => return completes.with(self.errors.respond_to(&e)),
            };
            let Some(action) = results.action() else {
                continue;
            };
            let mapped = match action.map(&request, &results) {
                Ok(mapped) => mapped,
                Err(e) => {
                    warn!("[ID{}]请求参数映射失败：{}", id, e);
                    return completes.with(self.errors.respond_to(&e));
                }
            };
            debug!("[ID{}]匹配到资源{}：{}", id, resource.name(), action);
            resource.dispatch_to_handler_with(request, mapped, completes, &self.errors);
            return;
        }

        warn!("[ID{}]没有资源能够匹配 {} {}，返回404", id, request.method(), request.path());
        completes.with(Response::response_404(&format!(
            "No matching resource for {} {}",
            request.method(),
            request.path()
        )));
    }

    fn respond_directly(&self, id: u64, responses: &ResponseSender, response: Response, close_after: bool) {
        let (completes, pending) = Completes::new(Arc::clone(&self.completion), id, None, close_after);
        if responses.send(pending).is_ok() {
            completes.with(response);
        }
    }
}
