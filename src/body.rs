// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 消息体模块
//!
//! 消息体有三种形态：
//! - 文本：合法的 UTF-8 内容。
//! - 二进制：原始字节，`content()` 以 base64 形式暴露。
//! - 分块（complex）：以 `Transfer-Encoding: chunked` 发送，不计算 `Content-Length`。

use std::borrow::Cow;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::{BufMut, Bytes, BytesMut};

use crate::param::CRLF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Text(String),
    Binary(Bytes),
    Chunked(Vec<Bytes>),
}

impl Default for Body {
    fn default() -> Self {
        Body::empty()
    }
}

impl Body {
    pub fn empty() -> Self {
        Body::Text(String::new())
    }

    pub fn from_text(text: &str) -> Self {
        Body::Text(text.to_string())
    }

    /// 合法 UTF-8 的字节按文本保存，否则按二进制保存。
    pub fn from_bytes(bytes: Bytes) -> Self {
        match std::str::from_utf8(&bytes) {
            Ok(text) => Body::Text(text.to_string()),
            Err(_) => Body::Binary(bytes),
        }
    }

    pub fn binary(bytes: Bytes) -> Self {
        Body::Binary(bytes)
    }

    pub fn chunked(chunks: Vec<Bytes>) -> Self {
        Body::Chunked(chunks)
    }

    pub fn has_content(&self) -> bool {
        match self {
            Body::Text(t) => !t.is_empty(),
            Body::Binary(b) => !b.is_empty(),
            Body::Chunked(c) => c.iter().any(|chunk| !chunk.is_empty()),
        }
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, Body::Chunked(_))
    }

    /// 文本内容。二进制内容以 base64 编码返回，分块内容会被拼接。
    pub fn content(&self) -> Cow<'_, str> {
        match self {
            Body::Text(t) => Cow::Borrowed(t),
            Body::Binary(b) => Cow::Owned(BASE64.encode(b)),
            Body::Chunked(_) => Cow::Owned(String::from_utf8_lossy(&self.bytes()).into_owned()),
        }
    }

    /// 原始字节。
    pub fn bytes(&self) -> Bytes {
        match self {
            Body::Text(t) => Bytes::copy_from_slice(t.as_bytes()),
            Body::Binary(b) => b.clone(),
            Body::Chunked(chunks) => {
                let mut buf = BytesMut::with_capacity(chunks.iter().map(Bytes::len).sum());
                for chunk in chunks {
                    buf.put_slice(chunk);
                }
                buf.freeze()
            }
        }
    }

    /// 字节长度（UTF-8 编码后的长度，而不是字符数）。
    pub fn len(&self) -> usize {
        match self {
            Body::Text(t) => t.len(),
            Body::Binary(b) => b.len(),
            Body::Chunked(chunks) => chunks.iter().map(Bytes::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.has_content()
    }

    /// 写入线上格式。分块消息体会加上长度前缀以及终止块。
    pub(crate) fn write_to(&self, buf: &mut BytesMut) {
        match self {
            Body::Text(t) => buf.put_slice(t.as_bytes()),
            Body::Binary(b) => buf.put_slice(b),
            Body::Chunked(chunks) => {
                for chunk in chunks.iter().filter(|c| !c.is_empty()) {
                    buf.put_slice(format!("{:x}{}", chunk.len(), CRLF).as_bytes());
                    buf.put_slice(chunk);
                    buf.put_slice(CRLF.as_bytes());
                }
                buf.put_slice(b"0\r\n\r\n");
            }
        }
    }

    /// 线上格式的字节数估计值。
    pub(crate) fn wire_size(&self) -> usize {
        match self {
            Body::Chunked(chunks) => chunks.iter().map(|c| c.len() + 12).sum::<usize>() + 5,
            _ => self.len(),
        }
    }
}
