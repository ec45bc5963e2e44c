// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! 可匹配的绝对形式 URI。
//!
//! 线上的 origin-form（`/items/7?x=1`）会被补全为 `http://localhost/items/7?x=1`，
//! 以便后续的模板匹配统一处理。

use std::fmt;

use url::Url;

use crate::{exception::Exception, param::LOCALHOST_BASE};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    url: Url,
}

impl Uri {
    /// 解析请求行中的 request-target。
    pub fn from_request_target(target: &str) -> Result<Self, Exception> {
        let absolute = if target.starts_with('/') {
            format!("{}{}", LOCALHOST_BASE, target)
        } else if target == "*" {
            format!("{}/*", LOCALHOST_BASE)
        } else {
            target.to_string()
        };
        Self::parse(&absolute)
    }

    pub fn parse(absolute: &str) -> Result<Self, Exception> {
        match Url::parse(absolute) {
            Ok(url) => Ok(Self { url }),
            Err(e) => Err(Exception::BadRequest(format!(
                "URI is not parsable: {} ({})",
                absolute, e
            ))),
        }
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.url.query()
    }

    /// 第一个同名查询参数，已做百分号解码。
    pub fn query_parameter(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    pub fn query_parameters(&self, name: &str) -> Vec<String> {
        self.url
            .query_pairs()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .collect()
    }

    /// origin-form，写回线上时使用。
    pub fn request_target(&self) -> String {
        match self.url.query() {
            Some(q) => format!("{}?{}", self.url.path(), q),
            None => self.url.path().to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}
