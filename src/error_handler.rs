// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 把异常转换为响应的处理器链。

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use log::error;

use crate::{exception::Exception, response::Response};

pub trait ErrorHandler: Send + Sync {
    /// `Ok(None)` 表示不处理，交给链上的下一个处理器。
    fn handle(&self, error: &Exception) -> Result<Option<Response>, Exception>;
}

/// 依次尝试自定义处理器，都不处理时按异常的默认状态码响应。
#[derive(Clone, Default)]
pub struct ErrorHandlers {
    chain: Vec<Arc<dyn ErrorHandler>>,
}

impl ErrorHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.chain.push(handler);
        self
    }

    pub fn respond_to(&self, error: &Exception) -> Response {
        for handler in &self.chain {
            match catch_unwind(AssertUnwindSafe(|| handler.handle(error))) {
                Ok(Ok(Some(response))) => return response,
                Ok(Ok(None)) => continue,
                Ok(Err(e)) => {
                    error!("错误处理器在处理 {} 时失败：{}", error, e);
                    return fallback();
                }
                Err(_) => {
                    error!("错误处理器在处理 {} 时发生panic", error);
                    return fallback();
                }
            }
        }
        default_response(error)
    }
}

/// 按异常分类映射状态码：参数与协议错误为 400，媒体类型为 415，其余为 500。
pub fn default_response(error: &Exception) -> Response {
    Response::of_text(error.status_code(), error.message())
}

fn fallback() -> Response {
    Response::response_500("Internal server error.")
}
