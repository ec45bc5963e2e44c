// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 示例服务器
//!
//! 读取 `config/development.toml`，按其中的 `items` 资源声明路由，
//! 绑定内存中的商品存储作为处理器，并提供后台管理控制台（stop/status/help）。

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use log::{error, info, warn};
use serde_derive::{Deserialize, Serialize};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    runtime::Builder,
};

use actionhttp::{
    config::ResourceConfig, Completes, Config, Exception, Request, ResourceBuilder, Response, Server,
    Value,
};

#[derive(Serialize, Deserialize, Debug, Clone)]
struct Item {
    #[serde(default)]
    id: i64,
    name: String,
    #[serde(default)]
    price: f64,
}

type Store = Arc<Mutex<BTreeMap<i64, Item>>>;

/// 处理器实例共享同一个存储，每个实例只被一个工作任务使用。
struct ItemsHandler {
    store: Store,
}

impl ItemsHandler {
    fn store(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<i64, Item>>, Exception> {
        self.store
            .lock()
            .map_err(|_| Exception::HandlerFailed("item store is poisoned".to_string()))
    }

    fn list(&mut self, request: &Request, _args: Vec<Value>, completes: &Completes) -> Result<(), Exception> {
        let filter = request.query_parameter("q").map(|q| q.to_lowercase());
        let items: Vec<Item> = self
            .store()?
            .values()
            .filter(|item| filter.as_ref().map_or(true, |f| item.name.to_lowercase().contains(f)))
            .cloned()
            .collect();
        info!("列出{}个商品，路径{}", items.len(), request.path());
        completes.with(json(200, &items)?);
        Ok(())
    }

    fn show(&mut self, _request: &Request, args: Vec<Value>, completes: &Completes) -> Result<(), Exception> {
        let id = id_of(&args)?;
        match self.store()?.get(&id) {
            Some(item) => completes.with(json(200, item)?),
            None => completes.with(Response::response_404(&format!("Item {} not found.", id))),
        }
        Ok(())
    }

    fn create(&mut self, _request: &Request, args: Vec<Value>, completes: &Completes) -> Result<(), Exception> {
        let mut item: Item = args
            .first()
            .ok_or_else(|| Exception::InvalidArgument("Missing item body".to_string()))?
            .deserialize()?;
        let mut store = self.store()?;
        item.id = store.keys().next_back().map_or(1, |last| last + 1);
        store.insert(item.id, item.clone());
        completes.with(json(201, &item)?.with_header("Location", &format!("/items/{}", item.id)));
        Ok(())
    }

    fn remove(&mut self, _request: &Request, args: Vec<Value>, completes: &Completes) -> Result<(), Exception> {
        let id = id_of(&args)?;
        match self.store()?.remove(&id) {
            Some(_) => completes.with(Response::of(204)),
            None => completes.with(Response::response_404(&format!("Item {} not found.", id))),
        }
        Ok(())
    }
}

fn id_of(args: &[Value]) -> Result<i64, Exception> {
    args.first()
        .and_then(Value::as_i64)
        .ok_or_else(|| Exception::InvalidArgument("Missing item id".to_string()))
}

fn json<T: serde::Serialize>(status_code: u16, value: &T) -> Result<Response, Exception> {
    let text = serde_json::to_string(value).map_err(|e| Exception::HandlerFailed(e.to_string()))?;
    Ok(Response::of_text(status_code, &text).with_header("Content-Type", "application/json"))
}

fn items_config() -> ResourceConfig {
    use actionhttp::config::ActionConfig;
    ResourceConfig::new(
        "items",
        None,
        vec![
            ActionConfig::new("GET", "/items", "list()"),
            ActionConfig::new("GET", "/items/{id}", "show(long id)"),
            ActionConfig::new("POST", "/items", "create(body: Item item)"),
            ActionConfig::new("DELETE", "/items/{id}", "remove(long id)"),
        ],
    )
}

fn main() {
    // 1. 初始化日志系统：通过外部 YAML 配置级别与输出目的地
    if let Err(e) = log4rs::init_file("config/log4rs.yaml", Default::default()) {
        eprintln!("无法初始化日志系统：{}", e);
    }

    // 2. 环境配置加载
    let config = match Config::from_toml("config/development.toml") {
        Ok(config) => {
            info!("配置文件已载入");
            config
        }
        Err(e) => {
            warn!("{}，使用默认配置", e);
            Config::new()
        }
    };

    // 3. 根据配置文件分配工作线程数
    let runtime = match Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("无法创建异步运行时：{}", e);
            return;
        }
    };

    runtime.block_on(run(config));
}

async fn run(config: Config) {
    let store: Store = Arc::new(Mutex::new(BTreeMap::new()));
    let items = config.resource("items").cloned().unwrap_or_else(items_config);
    let resource = ResourceBuilder::from_config(&items, config.handler_pool_size(), {
        let store = Arc::clone(&store);
        move || ItemsHandler {
            store: Arc::clone(&store),
        }
    })
    .bind("list", ItemsHandler::list)
    .bind("show", ItemsHandler::show)
    .bind("create", ItemsHandler::create)
    .bind("remove", ItemsHandler::remove)
    .build();
    let resource = match resource {
        Ok(resource) => resource,
        Err(e) => {
            error!("资源items配置有误：{}", e);
            return;
        }
    };

    let health = ResourceBuilder::new("health", || ())
        .get("/health", "health()", |_: &mut (), _, _, completes| {
            completes.with(Response::of_text(200, "OK"));
            Ok(())
        })
        .build();
    let health = match health {
        Ok(health) => health,
        Err(e) => {
            error!("资源health配置有误：{}", e);
            return;
        }
    };

    let server = Server::new(config).with_resource(resource).with_resource(health);
    let handle = match server.start().await {
        Ok(handle) => handle,
        Err(e) => {
            error!("服务器启动失败：{}", e);
            return;
        }
    };

    // 后台管理控制台
    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);
    let mut input = String::new();
    loop {
        input.clear();
        match reader.read_line(&mut input).await {
            Ok(0) => {
                info!("控制台输入已关闭，按Ctrl+C停止服务器");
                let _ = tokio::signal::ctrl_c().await;
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!("读取控制台输入失败：{}", e);
                break;
            }
        }
        match input.trim() {
            "stop" => {
                println!("停机指令已激活，服务器正在关闭...");
                break;
            }
            "help" => {
                println!("== Server Help ==");
                println!("stop   - 停止服务器");
                println!("status - 查看当前服务器运行状态");
                println!("help   - 显示此帮助信息");
                println!("=================");
            }
            "status" => {
                println!("== Server 状态 ===");
                println!("监听地址: {}", handle.local_addr());
                println!("当前活跃连接数: {}", handle.active_connections());
                println!("商品数量: {}", store.lock().map(|s| s.len()).unwrap_or(0));
                println!("=================");
            }
            "" => {}
            cmd => println!("无效的命令：{}", cmd),
        }
    }

    handle.stop().await;
}
