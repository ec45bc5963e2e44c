// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了请求生命周期中可能出现的各类异常情况。
//!
//! ## 设计意图
//! - **错误分类**：协议解析错误、路由错误、参数转换错误、处理器执行错误以及配置错误。
//! - **语义映射**：每个变体都可以通过 [`Exception::status_code`] 映射为 HTTP 状态码，
//!   由分发层将其转化为对应的响应。
//! - **作用域**：任何异常都只影响单个请求或单个连接，不会导致整个进程退出。

use std::fmt;

/// 请求处理过程中发生的异常类型。
///
/// 每个变体都携带一段人类可读的诊断信息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exception {
    /// 请求行、请求头等协议内容无法解析。对应 `400 Bad Request`。
    BadRequest(String),
    /// 没有任何 Action 能匹配请求。对应 `404 Not Found`。
    NotFound(String),
    /// 参数转换失败（例如把非数字字符串转换为 `int`）。对应 `400 Bad Request`。
    InvalidArgument(String),
    /// 请求体的媒体类型无法被映射器处理。对应 `415 Unsupported Media Type`。
    UnsupportedMediaType(String),
    /// 处理器执行失败或发生 panic。对应 `500 Internal Server Error`。
    HandlerFailed(String),
    /// 启动阶段的配置错误，例如 URI 模板括号不匹配。
    Configuration(String),
    /// 底层 I/O 错误。
    Io(String),
}

use Exception::*;

impl Exception {
    /// 异常对应的默认 HTTP 状态码。
    pub fn status_code(&self) -> u16 {
        match self {
            BadRequest(_) | InvalidArgument(_) => 400,
            NotFound(_) => 404,
            UnsupportedMediaType(_) => 415,
            HandlerFailed(_) | Configuration(_) | Io(_) => 500,
        }
    }

    /// 诊断信息本身，不带分类前缀。
    pub fn message(&self) -> &str {
        match self {
            BadRequest(m) | NotFound(m) | InvalidArgument(m) | UnsupportedMediaType(m)
            | HandlerFailed(m) | Configuration(m) | Io(m) => m,
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BadRequest(m) => write!(f, "Bad request: {}", m),
            NotFound(m) => write!(f, "Not found: {}", m),
            InvalidArgument(m) => write!(f, "Invalid argument: {}", m),
            UnsupportedMediaType(m) => write!(f, "Unsupported media type: {}", m),
            HandlerFailed(m) => write!(f, "Handler failed: {}", m),
            Configuration(m) => write!(f, "Configuration error: {}", m),
            Io(m) => write!(f, "I/O error: {}", m),
        }
    }
}

impl std::error::Error for Exception {}

impl From<std::io::Error> for Exception {
    fn from(e: std::io::Error) -> Self {
        Io(e.to_string())
    }
}
