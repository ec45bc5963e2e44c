// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 资源与处理器池
//!
//! 一个资源拥有一组有序的 Action 以及每个 Action 对应的调用函数。
//! 资源启动时创建固定数量的处理器实例，每个实例运行在独立的任务中，
//! 通过通道串行接收调用，分发时按轮询选择实例。
//!
//! 调用函数收到处理器实例、请求、映射后的参数以及完成句柄。
//! 返回 `Err` 或发生 panic 时，由错误处理器链生成响应。

use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use crate::{
    action::{Action, MappedParameters, MatchResults},
    completes::Completes,
    config::ResourceConfig,
    error_handler::ErrorHandlers,
    exception::Exception,
    mapper::mapper_named,
    param::HttpRequestMethod,
    request::Request,
    uri::Uri,
    value::Value,
};

pub type Invoker<H> =
    Arc<dyn Fn(&mut H, &Request, Vec<Value>, &Completes) -> Result<(), Exception> + Send + Sync>;

/// 返回 `false` 表示处理器实例需要重建。
type Job<H> = Box<dyn FnOnce(&mut H) -> bool + Send>;

/// 分发器眼中的资源，屏蔽处理器的具体类型。
pub trait Dispatchable: Send + Sync {
    fn name(&self) -> &str;

    fn actions(&self) -> &[Action];

    fn pool_size(&self) -> usize;

    fn start(&mut self);

    fn stop(&mut self);

    fn is_started(&self) -> bool;

    fn dispatch_to_handler_with(
        &self,
        request: Request,
        mapped: MappedParameters,
        completes: Completes,
        errors: &Arc<ErrorHandlers>,
    );

    /// 按声明顺序返回第一个匹配的 Action。
    fn match_with(&self, method: HttpRequestMethod, uri: &Uri) -> Result<MatchResults<'_>, Exception> {
        for action in self.actions() {
            let results = action.match_with(method, uri)?;
            if results.is_matched() {
                return Ok(results);
            }
        }
        Ok(MatchResults::unmatched())
    }
}

pub struct Resource<H> {
    name: String,
    actions: Vec<Action>,
    invokers: Vec<Invoker<H>>,
    pool_size: usize,
    factory: Arc<dyn Fn() -> H + Send + Sync>,
    workers: Vec<mpsc::UnboundedSender<Job<H>>>,
    next: AtomicUsize,
}

impl<H: Send + 'static> Resource<H> {
    fn spawn_worker(&self, index: usize) -> mpsc::UnboundedSender<Job<H>> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job<H>>();
        let factory = Arc::clone(&self.factory);
        let name = self.name.clone();
        tokio::spawn(async move {
            let mut handler = factory();
            debug!("资源{}的处理器#{}已启动", name, index);
            while let Some(job) = rx.recv().await {
                if !job(&mut handler) {
                    warn!("资源{}的处理器#{}发生panic，已重建实例", name, index);
                    handler = factory();
                }
            }
            debug!("资源{}的处理器#{}已停止", name, index);
        });
        tx
    }

    fn fail(completes: &Completes, errors: &ErrorHandlers, error: Exception) {
        error!("[ID{}]{}", completes.id(), error);
        completes.with(errors.respond_to(&error));
    }
}

impl<H: Send + 'static> Dispatchable for Resource<H> {
    fn name(&self) -> &str {
        &self.name
    }

    fn actions(&self) -> &[Action] {
        &self.actions
    }

    fn pool_size(&self) -> usize {
        self.pool_size
    }

    fn start(&mut self) {
        if self.is_started() {
            return;
        }
        self.workers = (0..self.pool_size).map(|i| self.spawn_worker(i)).collect();
        info!(
            "资源{}已启动，共{}个Action，处理器池大小{}",
            self.name,
            self.actions.len(),
            self.pool_size
        );
        for action in &self.actions {
            debug!("资源{}：{}", self.name, action);
        }
    }

    fn stop(&mut self) {
        // 关闭发送端后，处理器任务在处理完队列中的调用后退出
        self.workers.clear();
        info!("资源{}已停止", self.name);
    }

    fn is_started(&self) -> bool {
        !self.workers.is_empty()
    }

    fn dispatch_to_handler_with(
        &self,
        request: Request,
        mapped: MappedParameters,
        completes: Completes,
        errors: &Arc<ErrorHandlers>,
    ) {
        let Some(invoker) = self.invokers.get(mapped.action_id).cloned() else {
            let e = Exception::HandlerFailed(format!("No handler bound to action {}", mapped.action_id));
            return Self::fail(&completes, errors, e);
        };
        if self.workers.is_empty() {
            let e = Exception::HandlerFailed(format!("Resource {} is not started", self.name));
            return Self::fail(&completes, errors, e);
        }

        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        let method_name = mapped.method_name.clone();
        let arguments = mapped.into_values();
        let fallback = completes.clone();
        let errors_for_job = Arc::clone(errors);
        let job: Job<H> = Box::new(move |handler: &mut H| {
            let outcome = catch_unwind(AssertUnwindSafe(|| invoker(handler, &request, arguments, &completes)));
            match outcome {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    warn!("[ID{}]处理器方法{}返回错误：{}", completes.id(), method_name, e);
                    completes.with(errors_for_job.respond_to(&e));
                    true
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!("[ID{}]处理器方法{}发生panic：{}", completes.id(), method_name, message);
                    let e = Exception::HandlerFailed(format!("{} panicked: {}", method_name, message));
                    completes.with(errors_for_job.respond_to(&e));
                    false
                }
            }
        });
        if self.workers[index].send(job).is_err() {
            let e = Exception::HandlerFailed(format!("Handler #{} of {} is gone", index, self.name));
            Self::fail(&fallback, errors, e);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 逐个声明 Action 并绑定调用函数，`build` 时统一校验。
pub struct ResourceBuilder<H> {
    name: String,
    pool_size: usize,
    factory: Arc<dyn Fn() -> H + Send + Sync>,
    actions: Vec<Action>,
    invokers: Vec<Option<Invoker<H>>>,
    error: Option<Exception>,
}

impl<H: Send + 'static> ResourceBuilder<H> {
    pub fn new<F>(name: &str, factory: F) -> Self
    where
        F: Fn() -> H + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            pool_size: 1,
            factory: Arc::new(factory),
            actions: Vec::new(),
            invokers: Vec::new(),
            error: None,
        }
    }

    /// 从配置声明 Action，之后通过 [`ResourceBuilder::bind`] 按方法名绑定调用函数。
    pub fn from_config<F>(config: &ResourceConfig, default_pool_size: usize, factory: F) -> Self
    where
        F: Fn() -> H + Send + Sync + 'static,
    {
        let mut builder = Self::new(config.name(), factory).pool(config.pool().unwrap_or(default_pool_size));
        for action in config.actions() {
            let declared = action
                .method()
                .parse::<HttpRequestMethod>()
                .map_err(|e| Exception::Configuration(format!("{} in {}", e.message(), config.name())))
                .and_then(|method| {
                    let mapper = mapper_named(action.mapper())?;
                    Action::new(builder.actions.len(), method, action.uri(), action.to(), Some(mapper))
                });
            builder = builder.declare(declared, None);
        }
        builder
    }

    pub fn pool(mut self, size: usize) -> Self {
        if size == 0 {
            warn!("资源{}的处理器池大小被设置为0，将改为1", self.name);
        }
        self.pool_size = size.max(1);
        self
    }

    pub fn handle<F>(self, method: HttpRequestMethod, uri: &str, to: &str, invoker: F) -> Self
    where
        F: Fn(&mut H, &Request, Vec<Value>, &Completes) -> Result<(), Exception> + Send + Sync + 'static,
    {
        self.handle_with(method, uri, to, |action| action, invoker)
    }

    /// 与 [`ResourceBuilder::handle`] 相同，但可以在登记前定制 Action，
    /// 例如追加解析器或替换映射器。
    pub fn handle_with<C, F>(self, method: HttpRequestMethod, uri: &str, to: &str, customize: C, invoker: F) -> Self
    where
        C: FnOnce(Action) -> Action,
        F: Fn(&mut H, &Request, Vec<Value>, &Completes) -> Result<(), Exception> + Send + Sync + 'static,
    {
        let declared = Action::new(self.actions.len(), method, uri, to, None).map(customize);
        self.declare(declared, Some(Arc::new(invoker)))
    }

    pub fn get<F>(self, uri: &str, to: &str, invoker: F) -> Self
    where
        F: Fn(&mut H, &Request, Vec<Value>, &Completes) -> Result<(), Exception> + Send + Sync + 'static,
    {
        self.handle(HttpRequestMethod::Get, uri, to, invoker)
    }

    pub fn post<F>(self, uri: &str, to: &str, invoker: F) -> Self
    where
        F: Fn(&mut H, &Request, Vec<Value>, &Completes) -> Result<(), Exception> + Send + Sync + 'static,
    {
        self.handle(HttpRequestMethod::Post, uri, to, invoker)
    }

    pub fn put<F>(self, uri: &str, to: &str, invoker: F) -> Self
    where
        F: Fn(&mut H, &Request, Vec<Value>, &Completes) -> Result<(), Exception> + Send + Sync + 'static,
    {
        self.handle(HttpRequestMethod::Put, uri, to, invoker)
    }

    pub fn patch<F>(self, uri: &str, to: &str, invoker: F) -> Self
    where
        F: Fn(&mut H, &Request, Vec<Value>, &Completes) -> Result<(), Exception> + Send + Sync + 'static,
    {
        self.handle(HttpRequestMethod::Patch, uri, to, invoker)
    }

    pub fn delete<F>(self, uri: &str, to: &str, invoker: F) -> Self
    where
        F: Fn(&mut H, &Request, Vec<Value>, &Completes) -> Result<(), Exception> + Send + Sync + 'static,
    {
        self.handle(HttpRequestMethod::Delete, uri, to, invoker)
    }

    /// 给所有目标方法名为 `method_name` 且尚未绑定的 Action 绑定调用函数。
    pub fn bind<F>(mut self, method_name: &str, invoker: F) -> Self
    where
        F: Fn(&mut H, &Request, Vec<Value>, &Completes) -> Result<(), Exception> + Send + Sync + 'static,
    {
        let invoker: Invoker<H> = Arc::new(invoker);
        let mut bound = false;
        for (action, slot) in self.actions.iter().zip(self.invokers.iter_mut()) {
            if slot.is_none() && action.to().method_name() == method_name {
                *slot = Some(Arc::clone(&invoker));
                bound = true;
            }
        }
        if !bound && self.error.is_none() {
            self.error = Some(Exception::Configuration(format!(
                "Resource {} has no unbound action targeting {}",
                self.name, method_name
            )));
        }
        self
    }

    fn declare(mut self, declared: Result<Action, Exception>, invoker: Option<Invoker<H>>) -> Self {
        match declared {
            Ok(action) => {
                self.actions.push(action);
                self.invokers.push(invoker);
            }
            Err(e) => {
                if self.error.is_none() {
                    self.error = Some(e);
                }
            }
        }
        self
    }

    /// 返回声明过程中遇到的第一个配置错误，或存在未绑定调用函数的 Action 时报错。
    pub fn build(self) -> Result<Resource<H>, Exception> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let mut invokers = Vec::with_capacity(self.invokers.len());
        for (action, invoker) in self.actions.iter().zip(self.invokers) {
            match invoker {
                Some(invoker) => invokers.push(invoker),
                None => {
                    return Err(Exception::Configuration(format!(
                        "Resource {} has no handler bound to {}",
                        self.name, action
                    )))
                }
            }
        }
        Ok(Resource {
            name: self.name,
            actions: self.actions,
            invokers,
            pool_size: self.pool_size,
            factory: self.factory,
            workers: Vec::new(),
            next: AtomicUsize::new(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        completes::CompletionContext, config::ActionConfig, filter::Filters, pool::BufferPool,
        response::Response, response_parser::ResponseParser,
    };

    #[derive(Default)]
    struct Counter {
        calls: usize,
    }

    fn completes() -> (Completes, crate::completes::PendingResponse) {
        let context = CompletionContext::new(Filters::none(), BufferPool::new(2, 64 * 1024), "X-Correlation-ID");
        Completes::new(context, 0, None, false)
    }

    fn body_of(outbound: crate::completes::Outbound) -> String {
        let mut parser = ResponseParser::parser_for(&outbound.buffer).unwrap();
        parser.full_response().unwrap().body().content().into_owned()
    }

    fn counter_resource(pool: usize) -> Resource<Counter> {
        ResourceBuilder::new("counter", Counter::default)
            .pool(pool)
            .get("/count/{step}", "count(int step)", |counter: &mut Counter, _request, args, completes| {
                counter.calls += args[0].as_i64().unwrap_or(0) as usize;
                completes.with(Response::of_text(200, &counter.calls.to_string()));
                Ok(())
            })
            .get("/fail", "fail()", |_: &mut Counter, _, _, _| {
                Err(Exception::InvalidArgument("nope".into()))
            })
            .get("/panic", "explode()", |_: &mut Counter, _, _, _| panic!("kaboom"))
            .build()
            .unwrap()
    }

    async fn call(resource: &Resource<Counter>, target: &str) -> crate::completes::Outbound {
        let request = Request::has(HttpRequestMethod::Get, target).unwrap();
        let results = resource.match_with(request.method(), request.uri()).unwrap();
        let mapped = results.action().unwrap().map(&request, &results).unwrap();
        let (completes, pending) = completes();
        resource.dispatch_to_handler_with(request, mapped, completes, &Arc::new(ErrorHandlers::new()));
        pending.await.unwrap()
    }

    #[tokio::test]
    async fn test_single_handler_keeps_state() {
        let mut resource = counter_resource(1);
        resource.start();
        assert_eq!(body_of(call(&resource, "/count/2").await), "2");
        assert_eq!(body_of(call(&resource, "/count/3").await), "5");
    }

    #[tokio::test]
    async fn test_round_robin_across_pool() {
        let mut resource = counter_resource(2);
        resource.start();
        assert_eq!(body_of(call(&resource, "/count/1").await), "1");
        assert_eq!(body_of(call(&resource, "/count/1").await), "1");
        assert_eq!(body_of(call(&resource, "/count/1").await), "2");
    }

    #[tokio::test]
    async fn test_handler_error_goes_through_error_handlers() {
        let mut resource = counter_resource(1);
        resource.start();
        let outbound = call(&resource, "/fail").await;
        assert_eq!(outbound.status_code, 400);
    }

    #[tokio::test]
    async fn test_panic_is_contained_and_handler_rebuilt() {
        let mut resource = counter_resource(1);
        resource.start();
        assert_eq!(body_of(call(&resource, "/count/4").await), "4");
        let outbound = call(&resource, "/panic").await;
        assert_eq!(outbound.status_code, 500);
        assert_eq!(body_of(call(&resource, "/count/1").await), "1");
    }

    #[tokio::test]
    async fn test_dispatch_before_start_fails_with_500() {
        let resource = counter_resource(1);
        assert!(!resource.is_started());
        assert_eq!(call(&resource, "/count/1").await.status_code, 500);
    }

    #[test]
    fn test_build_requires_every_action_bound() {
        let config = ResourceConfig::new(
            "items",
            None,
            vec![
                ActionConfig::new("GET", "/items/{id}", "show(int id)"),
                ActionConfig::new("GET", "/items", "list()"),
            ],
        );
        let partial = ResourceBuilder::from_config(&config, 3, Counter::default)
            .bind("show", |_: &mut Counter, _, _, _| Ok(()));
        assert!(partial.build().is_err());

        let full = ResourceBuilder::from_config(&config, 3, Counter::default)
            .bind("show", |_: &mut Counter, _, _, _| Ok(()))
            .bind("list", |_: &mut Counter, _, _, _| Ok(()))
            .build()
            .unwrap();
        assert_eq!(full.pool_size(), 3);
        assert_eq!(full.actions()[1].id(), 1);
    }

    #[test]
    fn test_configuration_errors_surface_at_build() {
        let bad_template = ResourceBuilder::new("bad", Counter::default)
            .get("/items/{id", "show(int id)", |_: &mut Counter, _, _, _| Ok(()));
        assert!(matches!(bad_template.build(), Err(Exception::Configuration(_))));

        let unknown_method = ResourceConfig::new("bad", None, vec![ActionConfig::new("BREW", "/pot", "brew()")]);
        let built = ResourceBuilder::from_config(&unknown_method, 1, Counter::default).build();
        assert!(matches!(built, Err(Exception::Configuration(_))));

        let unbound = ResourceBuilder::new("bad", Counter::default).bind("missing", |_: &mut Counter, _, _, _| Ok(()));
        assert!(unbound.build().is_err());
    }

    #[test]
    fn test_first_declared_action_wins() {
        let resource = ResourceBuilder::new("order", Counter::default)
            .get("/items/{id}", "show(String id)", |_: &mut Counter, _, _, _| Ok(()))
            .get("/items/special", "special()", |_: &mut Counter, _, _, _| Ok(()))
            .build()
            .unwrap();
        let uri = Uri::from_request_target("/items/special").unwrap();
        let results = resource.match_with(HttpRequestMethod::Get, &uri).unwrap();
        assert_eq!(results.action().map(Action::id), Some(0));
    }

    #[test]
    fn test_method_shorthands() {
        let resource = ResourceBuilder::new("methods", Counter::default)
            .put("/items/{id}", "replace(int id)", |_: &mut Counter, _, _, _| Ok(()))
            .patch("/items/{id}", "amend(int id)", |_: &mut Counter, _, _, _| Ok(()))
            .delete("/items/{id}", "remove(int id)", |_: &mut Counter, _, _, _| Ok(()))
            .build()
            .unwrap();
        let uri = Uri::from_request_target("/items/3").unwrap();
        for (method, id) in [
            (HttpRequestMethod::Put, 0),
            (HttpRequestMethod::Patch, 1),
            (HttpRequestMethod::Delete, 2),
        ] {
            let results = resource.match_with(method, &uri).unwrap();
            assert_eq!(results.action().map(Action::id), Some(id));
        }
        assert!(!resource
            .match_with(HttpRequestMethod::Get, &uri)
            .unwrap()
            .is_matched());
    }
}
