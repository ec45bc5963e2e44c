// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 可恢复的报文读取器
//!
//! 请求解析器与响应解析器共用的底层读取逻辑：
//! - `includes` 把 TCP 读到的任意分片排入队列，`drain` 时才合并到工作缓冲区。
//! - 行切分以 `\n` 为分隔符，并去掉其前面的 `\r`。
//! - 消息体按字节长度截取，因此多字节 UTF-8 序列不会影响消息体边界的定位。
//! - 数据不足时返回 `None`，调用方据此挂起，下一次 `includes` 之后从原位置继续。
//!
//! 读取器从不丢弃尚未消费的字节。

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use bytes::{Bytes, BytesMut};

use crate::exception::Exception;

/// 单行（请求行、状态行或头部行）允许的最大长度。
pub const MAX_LINE_LENGTH: usize = 16 * 1024;

/// 一步解析的结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Progress {
    /// 状态已推进，可以继续下一步。
    Advanced,
    /// 当前报文不完整，需要等待更多字节。
    NeedMore,
    /// 缓冲区为空，没有正在解析的报文。
    Idle,
}

#[derive(Debug, Default)]
pub(crate) struct MessageReader {
    incoming: VecDeque<Bytes>,
    buffer: BytesMut,
    out_of_content_time: Option<Instant>,
    /// 上一次挂起之后是否又合并进了新字节
    received: bool,
}

impl MessageReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn includes(&mut self, chunk: &[u8]) {
        if !chunk.is_empty() {
            self.incoming.push_back(Bytes::copy_from_slice(chunk));
        }
    }

    /// 把排队的分片合并到工作缓冲区。
    pub fn drain(&mut self) {
        while let Some(chunk) = self.incoming.pop_front() {
            self.buffer.extend_from_slice(&chunk);
            self.received = true;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty() && self.incoming.is_empty()
    }

    /// 取出下一行，不含行尾的 `\r\n` 或 `\n`。没有完整的一行时返回 `Ok(None)`。
    pub fn next_line(&mut self) -> Result<Option<String>, Exception> {
        let newline = match self.buffer.iter().position(|&b| b == b'\n') {
            Some(index) => index,
            None => {
                if self.buffer.len() > MAX_LINE_LENGTH {
                    return Err(Exception::BadRequest(format!(
                        "Line exceeds {} bytes",
                        MAX_LINE_LENGTH
                    )));
                }
                return Ok(None);
            }
        };
        let line = self.buffer.split_to(newline + 1);
        let mut end = newline;
        if end > 0 && line[end - 1] == b'\r' {
            end -= 1;
        }
        match std::str::from_utf8(&line[..end]) {
            Ok(text) => Ok(Some(text.to_string())),
            Err(_) => Err(Exception::BadRequest(
                "Message line is not valid UTF-8".to_string(),
            )),
        }
    }

    /// 取出正好 `length` 个字节；不足时不消费任何内容。
    pub fn take(&mut self, length: usize) -> Option<Bytes> {
        if self.buffer.len() < length {
            return None;
        }
        Some(self.buffer.split_to(length).freeze())
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// 丢弃全部缓冲内容，仅在报文解析失败后调用。
    pub fn discard(&mut self) {
        self.incoming.clear();
        self.buffer.clear();
        self.out_of_content_time = None;
        self.received = false;
    }

    /// 挂起时记录时间。只要自上次挂起以来有新字节到达，计时就从现在重新开始。
    pub fn mark_out_of_content(&mut self) {
        if self.received || self.out_of_content_time.is_none() {
            self.out_of_content_time = Some(Instant::now());
        }
        self.received = false;
    }

    pub fn clear_out_of_content(&mut self) {
        self.out_of_content_time = None;
        self.received = false;
    }

    pub fn is_missing_content(&self) -> bool {
        self.out_of_content_time.is_some()
    }

    pub fn has_missing_content_time_expired(&self, limit: Duration) -> bool {
        self.out_of_content_time
            .map_or(false, |since| since.elapsed() > limit)
    }

    #[cfg(test)]
    pub fn set_out_of_content_since(&mut self, since: Instant) {
        self.out_of_content_time = Some(since);
    }
}
