// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求模块
//!
//! `Request` 是不可变的请求值对象，由方法、URI、版本、头部与消息体组成。
//! 所有 `with_*` 方法都返回新的 `Request`。
//!
//! 当消息体有内容但没有显式的 `Content-Length` 时，构造时会按 UTF-8 字节长度补上该头部。

use bytes::{BufMut, BytesMut};

use crate::{
    body::Body,
    exception::Exception,
    header::{Header, Headers},
    param::*,
    uri::Uri,
};

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    method: HttpRequestMethod,
    uri: Uri,
    version: HttpVersion,
    headers: Headers,
    body: Body,
}

impl Request {
    pub fn of(
        method: HttpRequestMethod,
        uri: Uri,
        version: HttpVersion,
        headers: Headers,
        body: Body,
    ) -> Self {
        let headers = if body.has_content() && !body.is_complex() && !headers.contains(CONTENT_LENGTH) {
            headers.and(Header::of(CONTENT_LENGTH, &body.len().to_string()))
        } else {
            headers
        };
        Self {
            method,
            uri,
            version,
            headers,
            body,
        }
    }

    /// 以 origin-form 的目标构造一个 HTTP/1.1 请求，主要用于客户端和测试。
    pub fn has(method: HttpRequestMethod, target: &str) -> Result<Self, Exception> {
        Ok(Self::of(
            method,
            Uri::from_request_target(target)?,
            HttpVersion::V1_1,
            Headers::new(),
            Body::empty(),
        ))
    }

    pub fn with_header(&self, name: &str, value: &str) -> Self {
        let mut request = self.clone();
        request.headers = request.headers.and(Header::of(name, value));
        request
    }

    /// 替换消息体，并让 `Content-Length` 与新消息体一致。
    pub fn with_body(&self, body: Body) -> Self {
        let headers = self.headers.clone().without(CONTENT_LENGTH);
        Self::of(self.method, self.uri.clone(), self.version, headers, body)
    }

    pub fn with_uri(&self, uri: Uri) -> Self {
        let mut request = self.clone();
        request.uri = uri;
        request
    }

    pub fn with_version(&self, version: HttpVersion) -> Self {
        let mut request = self.clone();
        request.version = version;
        request
    }

    /// 序列化为线上格式。
    pub fn as_bytes(&self) -> BytesMut {
        let target = self.uri.request_target();
        let mut buf = BytesMut::with_capacity(
            target.len() + 32 + self.headers.wire_size() + self.body.wire_size(),
        );
        buf.put_slice(self.method.as_str().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(target.as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.version.as_str().as_bytes());
        buf.put_slice(CRLF.as_bytes());
        for header in &self.headers {
            buf.put_slice(header.to_string().as_bytes());
            buf.put_slice(CRLF.as_bytes());
        }
        buf.put_slice(CRLF.as_bytes());
        self.body.write_to(&mut buf);
        buf
    }
}

// --- Getter 访问器实现 ---

impl Request {
    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.value_of(name)
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn query_parameter(&self, name: &str) -> Option<String> {
        self.uri.query_parameter(name)
    }

    pub fn query_parameters(&self, name: &str) -> Vec<String> {
        self.uri.query_parameters(name)
    }

    /// 声明的 `Content-Length`，不存在或无法解析时为 0。
    pub fn content_length(&self) -> usize {
        self.headers
            .value_of(CONTENT_LENGTH)
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// HTTP/1.1 默认保持连接；HTTP/1.0 只有显式 `keep-alive` 才保持。
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.header_of(CONNECTION) {
            Some(h) if h.matches_value("close") => false,
            Some(h) if h.matches_value("keep-alive") => true,
            _ => self.version == HttpVersion::V1_1,
        }
    }
}
