// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use num_cpus;
use serde_derive::Deserialize;
use serde_derive::Serialize;

use log::{error, warn};
use std::fs::File;
use std::io::prelude::*;
use std::time::Duration;

use crate::exception::Exception;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    port: u16,
    local: bool,
    worker_threads: usize,
    #[serde(default = "default_handler_pool_size")]
    handler_pool_size: usize,
    #[serde(default = "default_request_missing_content_timeout")]
    request_missing_content_timeout: u64,
    #[serde(default = "default_probe_interval")]
    probe_interval: u64,
    #[serde(default = "default_buffer_pool_size")]
    buffer_pool_size: usize,
    #[serde(default = "default_max_buffered_message_size")]
    max_buffered_message_size: usize,
    #[serde(default = "default_read_buffer_size")]
    read_buffer_size: usize,
    #[serde(default = "default_correlation_id_header")]
    correlation_id_header: String,
    #[serde(default = "default_server_header")]
    server_header: bool,
    #[serde(default)]
    resources: Vec<ResourceConfig>,
}

fn default_handler_pool_size() -> usize {
    1
}

fn default_request_missing_content_timeout() -> u64 {
    100 // ms
}

fn default_probe_interval() -> u64 {
    10 // ms
}

fn default_buffer_pool_size() -> usize {
    64
}

fn default_max_buffered_message_size() -> usize {
    65536 // 64KB
}

fn default_read_buffer_size() -> usize {
    4096
}

fn default_correlation_id_header() -> String {
    "X-Correlation-ID".to_string()
}

fn default_server_header() -> bool {
    true
}

/// 配置文件中声明的一个资源。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ResourceConfig {
    name: String,
    #[serde(default)]
    pool: Option<usize>,
    #[serde(default)]
    actions: Vec<ActionConfig>,
}

/// 一条路由：`method uri -> to`，`mapper` 缺省为 json。
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ActionConfig {
    method: String,
    uri: String,
    to: String,
    #[serde(default)]
    mapper: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            port: 7878,
            local: true,
            worker_threads: num_cpus::get(),
            handler_pool_size: default_handler_pool_size(),
            request_missing_content_timeout: default_request_missing_content_timeout(),
            probe_interval: default_probe_interval(),
            buffer_pool_size: default_buffer_pool_size(),
            max_buffered_message_size: default_max_buffered_message_size(),
            read_buffer_size: default_read_buffer_size(),
            correlation_id_header: default_correlation_id_header(),
            server_header: default_server_header(),
            resources: Vec::new(),
        }
    }

    /// 读取 TOML 配置文件。文件无法读取时返回错误，内容无法解析时退回默认配置。
    pub fn from_toml(filename: &str) -> Result<Self, Exception> {
        let mut file = File::open(filename)
            .map_err(|e| Exception::Configuration(format!("no such file {}: {}", filename, e)))?;
        let mut str_val = String::new();
        file.read_to_string(&mut str_val)
            .map_err(|e| Exception::Configuration(format!("error reading file {}: {}", filename, e)))?;
        Ok(Self::from_toml_str(&str_val))
    }

    pub fn from_toml_str(str_val: &str) -> Self {
        let raw_config = match toml::from_str(str_val) {
            Ok(t) => t,
            Err(e) => {
                error!("无法成功从配置文件构建配置对象，使用默认配置：{}", e);
                Config::new()
            }
        };
        raw_config.normalized()
    }

    fn normalized(mut self) -> Self {
        if self.worker_threads == 0 {
            self.worker_threads = num_cpus::get();
        }
        if self.handler_pool_size == 0 {
            warn!("handler_pool_size被设置为0，处理器池至少需要一个实例，因此该值将被改为1。");
            self.handler_pool_size = 1;
        }
        if self.probe_interval == 0 {
            warn!("probe_interval被设置为0，将改为默认值{}ms。", default_probe_interval());
            self.probe_interval = default_probe_interval();
        }
        if self.correlation_id_header.trim().is_empty() {
            warn!("correlation_id_header为空，将改为默认值{}。", default_correlation_id_header());
            self.correlation_id_header = default_correlation_id_header();
        }
        if self.read_buffer_size == 0 {
            warn!("read_buffer_size被设置为0，将改为默认值{}。", default_read_buffer_size());
            self.read_buffer_size = default_read_buffer_size();
        }
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_request_missing_content_timeout(mut self, millis: u64) -> Self {
        self.request_missing_content_timeout = millis;
        self
    }

    pub fn with_probe_interval(mut self, millis: u64) -> Self {
        self.probe_interval = millis.max(1);
        self
    }

    pub fn with_server_header(mut self, enabled: bool) -> Self {
        self.server_header = enabled;
        self
    }
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn local(&self) -> bool {
        self.local
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    pub fn handler_pool_size(&self) -> usize {
        self.handler_pool_size
    }

    pub fn request_missing_content_timeout(&self) -> Duration {
        Duration::from_millis(self.request_missing_content_timeout)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval)
    }

    pub fn buffer_pool_size(&self) -> usize {
        self.buffer_pool_size
    }

    pub fn max_buffered_message_size(&self) -> usize {
        self.max_buffered_message_size
    }

    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }

    pub fn correlation_id_header(&self) -> &str {
        &self.correlation_id_header
    }

    pub fn server_header(&self) -> bool {
        self.server_header
    }

    pub fn resources(&self) -> &[ResourceConfig] {
        &self.resources
    }

    pub fn resource(&self, name: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.name == name)
    }
}

impl ResourceConfig {
    pub fn new(name: &str, pool: Option<usize>, actions: Vec<ActionConfig>) -> Self {
        Self {
            name: name.to_string(),
            pool,
            actions,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool(&self) -> Option<usize> {
        self.pool
    }

    pub fn actions(&self) -> &[ActionConfig] {
        &self.actions
    }
}

impl ActionConfig {
    pub fn new(method: &str, uri: &str, to: &str) -> Self {
        Self {
            method: method.to_string(),
            uri: uri.to_string(),
            to: to.to_string(),
            mapper: None,
        }
    }

    pub fn with_mapper(mut self, mapper: &str) -> Self {
        self.mapper = Some(mapper.to_string());
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn mapper(&self) -> Option<&str> {
        self.mapper.as_deref()
    }
}
