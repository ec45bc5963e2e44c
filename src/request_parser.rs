// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 流式 HTTP 请求解析器
//!
//! 每个连接持有一个长期存在的 `RequestParser`。它是一个可恢复的状态机：
//!
//! ```text
//! NotStarted -> RequestLine -> Headers -> Body -> Completed -> NotStarted ...
//! ```
//!
//! 1. `includes` 接收任意长度的字节分片（可能只是半行）。
//! 2. `parse` 尽可能多地消费已到达的字节，每解析完一个请求就放入完成队列。
//! 3. 数据不足时不会阻塞，而是记录“缺少内容”的时间并返回，
//!    下一次 `includes` + `parse` 从中断的位置继续。
//! 4. 同一个分片中背靠背到达的多个请求（pipelining）按到达顺序依次入队。
//!
//! 请求侧只支持由 `Content-Length` 决定长度的消息体，不解析分块传输编码。

use std::{collections::VecDeque, time::Duration};

use bytes::Bytes;
use log::debug;

use crate::{
    body::Body,
    exception::Exception,
    header::{Header, Headers},
    param::*,
    parser::{MessageReader, Progress},
    request::Request,
    uri::Uri,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    NotStarted,
    RequestLine,
    Headers,
    Body,
    Completed,
}

#[derive(Debug)]
pub struct RequestParser {
    reader: MessageReader,
    step: Step,
    method: Option<HttpRequestMethod>,
    uri: Option<Uri>,
    version: Option<HttpVersion>,
    headers: Headers,
    content_length: usize,
    body: Option<Bytes>,
    full_requests: VecDeque<Request>,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            reader: MessageReader::new(),
            step: Step::NotStarted,
            method: None,
            uri: None,
            version: None,
            headers: Headers::new(),
            content_length: 0,
            body: None,
            full_requests: VecDeque::new(),
        }
    }

    /// 用第一段字节构造解析器并立即解析。
    pub fn parser_for(bytes: &[u8]) -> Result<Self, Exception> {
        let mut parser = Self::new();
        parser.parse_next(bytes)?;
        Ok(parser)
    }

    /// 排入新的字节分片，直到下一次 `parse` 才会被消费。
    pub fn includes(&mut self, bytes: &[u8]) -> &mut Self {
        self.reader.includes(bytes);
        self
    }

    pub fn parse_next(&mut self, bytes: &[u8]) -> Result<(), Exception> {
        self.includes(bytes).parse()
    }

    /// 消费所有已到达的字节。
    ///
    /// 解析失败时，本连接中已缓冲的报文内容会被丢弃，解析器回到初始状态，
    /// 已经完成的请求仍保留在队列中。
    pub fn parse(&mut self) -> Result<(), Exception> {
        self.reader.drain();
        let result = self.run();
        if result.is_err() {
            self.reader.discard();
            self.reset();
        }
        result
    }

    pub fn has_full_request(&self) -> bool {
        !self.full_requests.is_empty()
    }

    /// 按 FIFO 顺序取出已完成的请求。
    pub fn full_request(&mut self) -> Option<Request> {
        self.full_requests.pop_front()
    }

    /// 没有进行中的请求，也没有未消费的字节。
    pub fn has_completed(&self) -> bool {
        self.step == Step::NotStarted && self.reader.is_empty()
    }

    pub fn is_missing_content(&self) -> bool {
        self.reader.is_missing_content()
    }

    pub fn has_missing_content_time_expired(&self, limit: Duration) -> bool {
        self.reader.has_missing_content_time_expired(limit)
    }

    fn run(&mut self) -> Result<(), Exception> {
        loop {
            let progress = match self.step {
                Step::NotStarted => {
                    if self.reader.is_empty() {
                        Progress::Idle
                    } else {
                        self.step = Step::RequestLine;
                        Progress::Advanced
                    }
                }
                Step::RequestLine => self.parse_request_line()?,
                Step::Headers => self.parse_headers()?,
                Step::Body => self.parse_body(),
                Step::Completed => {
                    self.complete()?;
                    Progress::Advanced
                }
            };
            match progress {
                Progress::Advanced => continue,
                Progress::NeedMore => {
                    debug!("请求不完整，等待更多字节（已缓冲{}字节）", self.reader.buffered());
                    self.reader.mark_out_of_content();
                    return Ok(());
                }
                Progress::Idle => {
                    self.reader.clear_out_of_content();
                    return Ok(());
                }
            }
        }
    }

    fn parse_request_line(&mut self) -> Result<Progress, Exception> {
        // 跳过请求之间多余的空行
        let line = loop {
            match self.reader.next_line()? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => break line,
                None if self.reader.is_empty() => {
                    self.step = Step::NotStarted;
                    return Ok(Progress::Idle);
                }
                None => return Ok(Progress::NeedMore),
            }
        };

        let mut tokens = line.split_whitespace();
        let method = tokens
            .next()
            .ok_or_else(|| Exception::BadRequest("Request line is missing the method".to_string()))?;
        let target = tokens
            .next()
            .ok_or_else(|| Exception::BadRequest(format!("Request line is missing the URI: {}", line)))?;
        let version = tokens.next().ok_or_else(|| {
            Exception::BadRequest(format!("Request line is missing the version: {}", line))
        })?;

        self.method = Some(method.parse()?);
        self.uri = Some(Uri::from_request_target(target)?);
        self.version = Some(version.parse()?);
        self.step = Step::Headers;
        Ok(Progress::Advanced)
    }

    fn parse_headers(&mut self) -> Result<Progress, Exception> {
        loop {
            let line = match self.reader.next_line()? {
                Some(line) => line,
                None => return Ok(Progress::NeedMore),
            };
            if line.is_empty() {
                if self.headers.is_empty() {
                    return Err(Exception::BadRequest("Request has no headers".to_string()));
                }
                self.content_length = match self.headers.value_of(CONTENT_LENGTH) {
                    Some(value) => value.trim().parse().map_err(|_| {
                        Exception::BadRequest(format!("Content-Length is not a number: {}", value))
                    })?,
                    None => 0,
                };
                self.step = Step::Body;
                return Ok(Progress::Advanced);
            }
            self.headers.append(Header::from_line(&line)?);
        }
    }

    fn parse_body(&mut self) -> Progress {
        if self.content_length == 0 {
            self.body = None;
            self.step = Step::Completed;
            return Progress::Advanced;
        }
        match self.reader.take(self.content_length) {
            Some(bytes) => {
                self.body = Some(bytes);
                self.step = Step::Completed;
                Progress::Advanced
            }
            None => Progress::NeedMore,
        }
    }

    fn complete(&mut self) -> Result<(), Exception> {
        let (method, uri, version) = match (self.method.take(), self.uri.take(), self.version.take()) {
            (Some(m), Some(u), Some(v)) => (m, u, v),
            _ => return Err(Exception::BadRequest("Request line was not parsed".to_string())),
        };
        let body = match self.body.take() {
            Some(bytes) => Body::from_bytes(bytes),
            None => Body::empty(),
        };
        let headers = std::mem::take(&mut self.headers);
        let request = Request::of(method, uri, version, headers, body);
        debug!("完成解析请求：{} {}", request.method(), request.path());
        self.full_requests.push_back(request);
        self.reset();
        self.reader.clear_out_of_content();
        Ok(())
    }

    /// 只重置当前请求相关的字段，缓冲区与完成队列保持不变。
    fn reset(&mut self) {
        self.step = Step::NotStarted;
        self.method = None;
        self.uri = None;
        self.version = None;
        self.headers = Headers::new();
        self.content_length = 0;
        self.body = None;
    }
}
