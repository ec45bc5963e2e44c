// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use bytes::{BufMut, BytesMut};

use crate::{
    body::Body,
    header::{Header, Headers},
    param::*,
};

/// 状态行、头部与消息体之外，为缓冲区预留的余量。
const SIZE_MARGIN: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    headers: Headers,
    body: Body,
}

impl Response {
    pub fn of(status_code: u16) -> Self {
        Self::of_with(status_code, Headers::new(), Body::empty())
    }

    pub fn of_body(status_code: u16, body: Body) -> Self {
        Self::of_with(status_code, Headers::new(), body)
    }

    pub fn of_text(status_code: u16, text: &str) -> Self {
        Self::of_with(
            status_code,
            Headers::new().and_value(CONTENT_TYPE, "text/plain;charset=utf-8"),
            Body::from_text(text),
        )
    }

    pub fn of_with(status_code: u16, headers: Headers, body: Body) -> Self {
        Self::of_version(HttpVersion::V1_1, status_code, headers, body)
    }

    /// 按规则补全 `Content-Length`：分块消息体改为 `Transfer-Encoding: chunked`，
    /// 1xx、204、304 不携带长度。
    pub fn of_version(version: HttpVersion, status_code: u16, headers: Headers, body: Body) -> Self {
        let headers = if body.is_complex() {
            headers
                .without(CONTENT_LENGTH)
                .and(Header::of(TRANSFER_ENCODING, "chunked"))
        } else if omits_content_length(status_code) || headers.contains(CONTENT_LENGTH) {
            headers
        } else {
            headers.and(Header::of(CONTENT_LENGTH, &body.len().to_string()))
        };
        Self {
            version,
            status_code,
            headers,
            body,
        }
    }

    pub fn response_400(diagnostic: &str) -> Self {
        Self::of_text(400, diagnostic)
    }

    pub fn response_404(diagnostic: &str) -> Self {
        Self::of_text(404, diagnostic)
    }

    pub fn response_500(diagnostic: &str) -> Self {
        Self::of_text(500, diagnostic)
    }

    pub fn with_header(&self, name: &str, value: &str) -> Self {
        let mut response = self.clone();
        response.headers = response.headers.and(Header::of(name, value));
        response
    }

    /// 序列化后的字节数估计值，用于预分配缓冲区。
    pub fn size(&self) -> usize {
        self.version.as_str().len()
            + 5
            + reason_phrase(self.status_code).len()
            + self.headers.wire_size()
            + self.body.wire_size()
            + SIZE_MARGIN
    }

    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_slice(self.version.as_str().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.status_code.to_string().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(reason_phrase(self.status_code).as_bytes());
        buf.put_slice(CRLF.as_bytes());
        for header in &self.headers {
            buf.put_slice(header.to_string().as_bytes());
            buf.put_slice(CRLF.as_bytes());
        }
        buf.put_slice(CRLF.as_bytes());
        self.body.write_to(buf);
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.size());
        self.write_to(&mut buf);
        buf.to_vec()
    }
}

impl Response {
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        reason_phrase(self.status_code)
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
}

fn omits_content_length(status_code: u16) -> bool {
    (100..200).contains(&status_code) || status_code == 204 || status_code == 304
}
