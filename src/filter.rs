// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 请求与响应过滤器链。
//!
//! 请求过滤器在路由匹配之前执行，响应过滤器在序列化之前执行。
//! 任何一个过滤器返回 `false` 都会短路后续过滤器，但已经得到的消息仍然继续使用。

use std::sync::Arc;

use chrono::Utc;
use log::debug;

use crate::{
    param::{DATE, SERVER, SERVER_NAME},
    request::Request,
    response::Response,
};

pub trait RequestFilter: Send + Sync {
    /// 返回（可能被改写的）请求以及是否继续执行后续过滤器。
    fn filter(&self, request: Request) -> (Request, bool);

    fn stop(&self) {}
}

pub trait ResponseFilter: Send + Sync {
    fn filter(&self, response: Response) -> (Response, bool);

    fn stop(&self) {}
}

#[derive(Clone, Default)]
pub struct Filters {
    request_filters: Vec<Arc<dyn RequestFilter>>,
    response_filters: Vec<Arc<dyn ResponseFilter>>,
}

impl Filters {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn are(
        request_filters: Vec<Arc<dyn RequestFilter>>,
        response_filters: Vec<Arc<dyn ResponseFilter>>,
    ) -> Self {
        Self {
            request_filters,
            response_filters,
        }
    }

    pub fn with_request_filter(mut self, filter: Arc<dyn RequestFilter>) -> Self {
        self.request_filters.push(filter);
        self
    }

    pub fn with_response_filter(mut self, filter: Arc<dyn ResponseFilter>) -> Self {
        self.response_filters.push(filter);
        self
    }

    pub fn process_request(&self, request: Request) -> Request {
        let mut current = request;
        for filter in &self.request_filters {
            let (filtered, go_on) = filter.filter(current);
            current = filtered;
            if !go_on {
                debug!("请求过滤器链被提前终止");
                break;
            }
        }
        current
    }

    pub fn process_response(&self, response: Response) -> Response {
        let mut current = response;
        for filter in &self.response_filters {
            let (filtered, go_on) = filter.filter(current);
            current = filtered;
            if !go_on {
                debug!("响应过滤器链被提前终止");
                break;
            }
        }
        current
    }

    pub fn stop(&self) {
        self.request_filters.iter().for_each(|f| f.stop());
        self.response_filters.iter().for_each(|f| f.stop());
    }
}

/// 为每个响应补充 `Date` 与 `Server` 头部，已存在的不覆盖。
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardHeadersFilter;

impl ResponseFilter for StandardHeadersFilter {
    fn filter(&self, response: Response) -> (Response, bool) {
        let mut response = response;
        if response.header_value(DATE).is_none() {
            let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
            response = response.with_header(DATE, &date);
        }
        if response.header_value(SERVER).is_none() {
            response = response.with_header(SERVER, SERVER_NAME);
        }
        (response, true)
    }
}
