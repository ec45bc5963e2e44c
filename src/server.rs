// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # TCP 传输层
//!
//! - 监听任务接受连接，为每个连接分配递增的编号；
//! - 每个连接拆分为读、写两半：读任务把字节交给分发器，
//!   写任务按分发顺序等待每个请求的完成结果并写回；
//! - 调度任务按 `probe_interval` 周期发送 `Sweep` 信号，驱动缺少内容的超时清理。

use std::{
    net::{Ipv4Addr, SocketAddr, SocketAddrV4},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::mpsc,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

use crate::{
    completes::PendingResponse,
    config::Config,
    dispatcher::{Dispatcher, Signal},
    error_handler::ErrorHandlers,
    exception::Exception,
    filter::{Filters, StandardHeadersFilter},
    pool::BufferPool,
    resource::Dispatchable,
    response::Response,
};

pub struct Server {
    config: Config,
    resources: Vec<Box<dyn Dispatchable>>,
    filters: Filters,
    errors: ErrorHandlers,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            resources: Vec::new(),
            filters: Filters::none(),
            errors: ErrorHandlers::new(),
        }
    }

    /// 资源按登记顺序参与匹配。
    pub fn with_resource<R: Dispatchable + 'static>(mut self, resource: R) -> Self {
        self.resources.push(Box::new(resource));
        self
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_error_handlers(mut self, errors: ErrorHandlers) -> Self {
        self.errors = errors;
        self
    }

    /// 绑定端口并启动分发器、调度器与监听任务。
    pub async fn start(self) -> Result<ServerHandle, Exception> {
        let Server {
            config,
            resources,
            filters,
            errors,
        } = self;

        let address = match config.local() {
            true => Ipv4Addr::new(127, 0, 0, 1),
            false => Ipv4Addr::new(0, 0, 0, 0),
        };
        let socket = SocketAddrV4::new(address, config.port());
        let listener = TcpListener::bind(socket).await.map_err(|e| {
            error!("无法绑定端口：{}，错误：{}", config.port(), e);
            Exception::from(e)
        })?;
        let local_addr = listener.local_addr()?;
        info!("服务端将在{}上监听Socket连接", local_addr);

        let filters = if config.server_header() {
            filters.with_response_filter(Arc::new(StandardHeadersFilter))
        } else {
            filters
        };
        let pool = BufferPool::new(config.buffer_pool_size(), config.max_buffered_message_size());
        let (signals, receiver) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(&config, resources, filters, errors, Arc::clone(&pool));
        let dispatcher_task = tokio::spawn(dispatcher.run(receiver));

        let sweep_task = tokio::spawn({
            let signals = signals.clone();
            let mut ticker = interval(config.probe_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            async move {
                loop {
                    ticker.tick().await;
                    if signals.send(Signal::Sweep).is_err() {
                        break;
                    }
                }
            }
        });

        let active = Arc::new(AtomicUsize::new(0));
        let accept_task = tokio::spawn(accept(
            listener,
            signals.clone(),
            pool,
            Arc::clone(&active),
            config.read_buffer_size(),
        ));

        Ok(ServerHandle {
            local_addr,
            signals,
            active,
            accept_task,
            sweep_task,
            dispatcher_task,
        })
    }
}

pub struct ServerHandle {
    local_addr: SocketAddr,
    signals: mpsc::UnboundedSender<Signal>,
    active: Arc<AtomicUsize>,
    accept_task: JoinHandle<()>,
    sweep_task: JoinHandle<()>,
    dispatcher_task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// 停止接受新连接与超时清理，然后停止分发器和所有处理器池。
    pub async fn stop(self) {
        self.accept_task.abort();
        self.sweep_task.abort();
        let _ = self.signals.send(Signal::Stop);
        if let Err(e) = self.dispatcher_task.await {
            error!("分发器任务异常退出：{}", e);
        }
        info!("服务器已停止");
    }
}

async fn accept(
    listener: TcpListener,
    signals: mpsc::UnboundedSender<Signal>,
    pool: Arc<BufferPool>,
    active: Arc<AtomicUsize>,
    read_buffer_size: usize,
) {
    let mut id: u64 = 0;
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!("接受TCP连接失败：{}", e);
                continue;
            }
        };
        debug!("[ID{}]TCP连接已建立：{}", id, addr);

        // 先登记连接，保证分发器在收到数据之前已经持有解析器
        let (responses, queue) = mpsc::unbounded_channel();
        if signals.send(Signal::Open { id, responses }).is_err() {
            warn!("分发器已停止，不再接受新连接");
            break;
        }
        tokio::spawn(handle_connection(
            stream,
            id,
            signals.clone(),
            Arc::clone(&pool),
            Arc::clone(&active),
            read_buffer_size,
            queue,
        ));
        id += 1;
    }
}

async fn handle_connection(
    stream: TcpStream,
    id: u64,
    signals: mpsc::UnboundedSender<Signal>,
    pool: Arc<BufferPool>,
    active: Arc<AtomicUsize>,
    read_buffer_size: usize,
    mut queue: mpsc::UnboundedReceiver<PendingResponse>,
) {
    active.fetch_add(1, Ordering::SeqCst);
    let (mut reader, mut writer) = stream.into_split();

    let read_task = tokio::spawn({
        let signals = signals.clone();
        async move {
            loop {
                let mut buffer = pool.acquire(read_buffer_size);
                match reader.read_buf(&mut *buffer).await {
                    Ok(0) => {
                        debug!("[ID{}]客户端关闭了连接", id);
                        break;
                    }
                    Ok(n) => {
                        debug!("[ID{}]读取到{}字节", id, n);
                        if signals.send(Signal::Consume { id, buffer }).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("[ID{}]读取TCPStream时遇到错误: {}", id, e);
                        break;
                    }
                }
            }
            // 分发器释放写出队列后，写任务写完剩余响应即退出
            let _ = signals.send(Signal::Closed { id });
        }
    });

    while let Some(pending) = queue.recv().await {
        // 缓冲区在写出后随 outbound 一起归还缓冲池
        let (written, close_after) = match pending.await {
            Ok(outbound) => {
                debug!("[ID{}]发送响应，状态码{}，长度{}", id, outbound.status_code, outbound.buffer.len());
                (writer.write_all(&outbound.buffer).await, outbound.close_after)
            }
            Err(_) => {
                error!("[ID{}]处理器未完成请求即释放了完成句柄，返回500", id);
                let fallback = Response::response_500("Request was not completed.").as_bytes();
                (writer.write_all(&fallback).await, false)
            }
        };
        if let Err(e) = written {
            warn!("[ID{}]写入响应失败：{}", id, e);
            break;
        }
        if close_after {
            debug!("[ID{}]请求要求关闭连接", id);
            break;
        }
    }

    let _ = writer.shutdown().await;
    read_task.abort();
    let _ = signals.send(Signal::Closed { id });
    active.fetch_sub(1, Ordering::SeqCst);
    debug!("[ID{}]TCP连接已关闭", id);
}
