// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 流式 HTTP 响应解析器
//!
//! 供客户端使用，与 [`RequestParser`](crate::request_parser::RequestParser)
//! 遵循相同的挂起/恢复约定，区别在于：
//! - 第一行是状态行（`HTTP/1.1 200 OK`）。
//! - 允许没有头部的响应。
//! - 消息体可以由 `Content-Length` 决定，也可以是 `Transfer-Encoding: chunked`。

use std::{collections::VecDeque, time::Duration};

use bytes::Bytes;
use log::debug;

use crate::{
    body::Body,
    exception::Exception,
    header::{Header, Headers},
    param::*,
    parser::{MessageReader, Progress},
    response::Response,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    NotStarted,
    StatusLine,
    Headers,
    Body,
    ChunkSize,
    ChunkData(usize),
    ChunkTrailer,
    Completed,
}

#[derive(Debug)]
pub struct ResponseParser {
    reader: MessageReader,
    step: Step,
    version: Option<HttpVersion>,
    status_code: u16,
    headers: Headers,
    content_length: usize,
    body: Option<Bytes>,
    chunks: Vec<Bytes>,
    full_responses: VecDeque<Response>,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            reader: MessageReader::new(),
            step: Step::NotStarted,
            version: None,
            status_code: 0,
            headers: Headers::new(),
            content_length: 0,
            body: None,
            chunks: Vec::new(),
            full_responses: VecDeque::new(),
        }
    }

    pub fn parser_for(bytes: &[u8]) -> Result<Self, Exception> {
        let mut parser = Self::new();
        parser.parse_next(bytes)?;
        Ok(parser)
    }

    pub fn includes(&mut self, bytes: &[u8]) -> &mut Self {
        self.reader.includes(bytes);
        self
    }

    pub fn parse_next(&mut self, bytes: &[u8]) -> Result<(), Exception> {
        self.includes(bytes).parse()
    }

    pub fn parse(&mut self) -> Result<(), Exception> {
        self.reader.drain();
        let result = self.run();
        if result.is_err() {
            self.reader.discard();
            self.reset();
        }
        result
    }

    pub fn has_full_response(&self) -> bool {
        !self.full_responses.is_empty()
    }

    pub fn full_response(&mut self) -> Option<Response> {
        self.full_responses.pop_front()
    }

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
                        self.step = Step::StatusLine;
                        Progress::Advanced
                    }
                }
                Step::StatusLine => self.parse_status_line()?,
                Step::Headers => self.parse_headers()?,
                Step::Body => self.parse_body(),
                Step::ChunkSize => self.parse_chunk_size()?,
                Step::ChunkData(size) => self.parse_chunk_data(size)?,
                Step::ChunkTrailer => self.parse_chunk_trailer()?,
                Step::Completed => {
                    self.complete()?;
                    Progress::Advanced
                }
            };
            match progress {
                Progress::Advanced => continue,
                Progress::NeedMore => {
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

    fn parse_status_line(&mut self) -> Result<Progress, Exception> {
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
        let version = tokens
            .next()
            .ok_or_else(|| Exception::BadRequest("Status line is missing the version".to_string()))?;
        let status = tokens.next().ok_or_else(|| {
            Exception::BadRequest(format!("Status line is missing the status code: {}", line))
        })?;

        self.version = Some(version.parse()?);
        self.status_code = status
            .parse()
            .map_err(|_| Exception::BadRequest(format!("Status code is not a number: {}", status)))?;
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
                let chunked = self
                    .headers
                    .header_of(TRANSFER_ENCODING)
                    .map_or(false, |h| h.matches_value("chunked"));
                if chunked {
                    self.step = Step::ChunkSize;
                } else {
                    self.content_length = match self.headers.value_of(CONTENT_LENGTH) {
                        Some(value) => value.trim().parse().map_err(|_| {
                            Exception::BadRequest(format!("Content-Length is not a number: {}", value))
                        })?,
                        None => 0,
                    };
                    self.step = Step::Body;
                }
                return Ok(Progress::Advanced);
            }
            self.headers.append(Header::from_line(&line)?);
        }
    }

    fn parse_body(&mut self) -> Progress {
        if self.content_length == 0 {
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

    fn parse_chunk_size(&mut self) -> Result<Progress, Exception> {
        let line = match self.reader.next_line()? {
            Some(line) => line,
            None => return Ok(Progress::NeedMore),
        };
        // 忽略分块扩展 `;name=value`
        let size_text = line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_text, 16)
            .map_err(|_| Exception::BadRequest(format!("Chunk size is not hexadecimal: {}", line)))?;
        // 数据与结尾的 CRLF 必须能在一个缓冲区中计数
        if size.checked_add(2).is_none() {
            return Err(Exception::BadRequest(format!("Chunk size is too large: {}", line)));
        }
        self.step = if size == 0 {
            Step::ChunkTrailer
        } else {
            Step::ChunkData(size)
        };
        Ok(Progress::Advanced)
    }

    fn parse_chunk_data(&mut self, size: usize) -> Result<Progress, Exception> {
        // 数据后面紧跟 CRLF
        if self.reader.buffered() < size.saturating_add(2) {
            return Ok(Progress::NeedMore);
        }
        let data = match self.reader.take(size) {
            Some(data) => data,
            None => return Ok(Progress::NeedMore),
        };
        match self.reader.next_line()? {
            Some(rest) if rest.is_empty() => {}
            _ => return Err(Exception::BadRequest("Chunk data is not terminated by CRLF".to_string())),
        }
        self.chunks.push(data);
        self.step = Step::ChunkSize;
        Ok(Progress::Advanced)
    }

    fn parse_chunk_trailer(&mut self) -> Result<Progress, Exception> {
        loop {
            match self.reader.next_line()? {
                Some(line) if line.is_empty() => {
                    self.step = Step::Completed;
                    return Ok(Progress::Advanced);
                }
                Some(line) => self.headers.append(Header::from_line(&line)?),
                None => return Ok(Progress::NeedMore),
            }
        }
    }

    fn complete(&mut self) -> Result<(), Exception> {
        let version = self
            .version
            .take()
            .ok_or_else(|| Exception::BadRequest("Status line was not parsed".to_string()))?;
        let body = if !self.chunks.is_empty() {
            Body::chunked(std::mem::take(&mut self.chunks))
        } else {
            match self.body.take() {
                Some(bytes) => Body::from_bytes(bytes),
                None => Body::empty(),
            }
        };
        let headers = std::mem::take(&mut self.headers);
        let response = Response::of_version(version, self.status_code, headers, body);
        debug!("完成解析响应：{}", response.status_code());
        self.full_responses.push_back(response);
        self.reset();
        self.reader.clear_out_of_content();
        Ok(())
    }

    fn reset(&mut self) {
        self.step = Step::NotStarted;
        self.version = None;
        self.status_code = 0;
        self.headers = Headers::new();
        self.content_length = 0;
        self.body = None;
        self.chunks.clear();
    }
}
