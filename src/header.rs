// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 头部模块
//!
//! `Header` 是不可变的名称/值对，名称比较不区分大小写。
//! `Headers` 是有序集合，插入顺序即序列化顺序。

use std::fmt;

use crate::exception::Exception;

#[derive(Debug, Clone, Eq)]
pub struct Header {
    name: String,
    value: Option<String>,
}

impl Header {
    /// 构造头部，用于名称在编译期已知的场合。
    ///
    /// # Panics
    ///
    /// 名称为空时 panic。名称来自外部输入时使用 [`Header::try_of`]。
    pub fn of(name: &str, value: &str) -> Self {
        assert!(!name.is_empty(), "header name must not be empty");
        Self {
            name: name.to_string(),
            value: Some(value.to_string()),
        }
    }

    /// 构造没有值的头部，例如 `X-Flag:`。
    ///
    /// # Panics
    ///
    /// 名称为空时 panic。名称来自外部输入时使用 [`Header::try_named`]。
    pub fn named(name: &str) -> Self {
        assert!(!name.is_empty(), "header name must not be empty");
        Self {
            name: name.to_string(),
            value: None,
        }
    }

    /// 名称为空时返回 `InvalidArgument`。
    pub fn try_of(name: &str, value: &str) -> Result<Self, Exception> {
        Self::check_name(name)?;
        Ok(Self::of(name, value))
    }

    pub fn try_named(name: &str) -> Result<Self, Exception> {
        Self::check_name(name)?;
        Ok(Self::named(name))
    }

    fn check_name(name: &str) -> Result<(), Exception> {
        if name.is_empty() {
            return Err(Exception::InvalidArgument("Header name must not be empty".to_string()));
        }
        Ok(())
    }

    /// 从 `Name: Value` 格式的单行文本解析头部。
    pub fn from_line(line: &str) -> Result<Self, Exception> {
        let (name, value) = match line.split_once(':') {
            Some(parts) => parts,
            None => {
                return Err(Exception::BadRequest(format!(
                    "Header line is missing ':' separator: {}",
                    line
                )))
            }
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(Exception::BadRequest(format!(
                "Header line has an empty name: {}",
                line
            )));
        }
        let value = value.trim();
        Ok(if value.is_empty() {
            Self::named(name)
        } else {
            Self::of(name, value)
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// 名称是否相同（大小写不敏感）。
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn matches_value(&self, value: &str) -> bool {
        self.value
            .as_deref()
            .map_or(false, |v| v.eq_ignore_ascii_case(value))
    }
}

impl PartialEq for Header {
    fn eq(&self, other: &Self) -> bool {
        self.matches_name(&other.name) && self.value == other.value
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value.as_deref().unwrap_or(""))
    }
}

/// 有序头部集合。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<Header>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(headers: Vec<Header>) -> Self {
        headers.into_iter().fold(Self::new(), Headers::and)
    }

    /// 替换同名头部（大小写不敏感），不存在时追加到末尾。
    ///
    /// 被替换的头部保留原有位置。
    pub fn and(mut self, header: Header) -> Self {
        self.set(header);
        self
    }

    pub fn and_value(self, name: &str, value: &str) -> Self {
        self.and(Header::of(name, value))
    }

    pub(crate) fn set(&mut self, header: Header) {
        match self.entries.iter().position(|h| h.matches_name(&header.name)) {
            Some(index) => {
                self.entries[index] = header;
                // 集合里可能因 `append` 存在更多同名项
                let name = self.entries[index].name.clone();
                let mut seen = 0;
                self.entries.retain(|h| {
                    if h.matches_name(&name) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => self.entries.push(header),
        }
    }

    /// 原样追加，不做去重。解析线上报文时使用。
    pub(crate) fn append(&mut self, header: Header) {
        self.entries.push(header);
    }

    pub fn header_of(&self, name: &str) -> Option<&Header> {
        self.entries.iter().find(|h| h.matches_name(name))
    }

    pub fn value_of(&self, name: &str) -> Option<&str> {
        self.header_of(name).and_then(Header::value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.header_of(name).is_some()
    }

    pub fn without(mut self, name: &str) -> Self {
        self.entries.retain(|h| !h.matches_name(name));
        self
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Header> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 序列化后的字节数估计值，包含 `": "` 与换行。
    pub(crate) fn wire_size(&self) -> usize {
        self.entries
            .iter()
            .map(|h| h.name.len() + h.value.as_deref().map_or(0, str::len) + 4)
            .sum()
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_comparison_is_case_insensitive() {
        assert_eq!(Header::of("content-type", "text/plain"), Header::of("Content-Type", "text/plain"));
        assert_ne!(Header::of("Content-Type", "text/plain"), Header::of("Content-Type", "text/html"));
    }

    #[test]
    fn test_and_replaces_rather_than_duplicates() {
        let headers = Headers::new()
            .and(Header::of("Accept", "text/plain"))
            .and(Header::of("Host", "localhost"))
            .and(Header::of("accept", "application/json"))
            .and(Header::of("ACCEPT", "application/json"));

        assert_eq!(headers.len(), 2);
        assert_eq!(headers.iter().filter(|h| h.matches_name("accept")).count(), 1);
        assert_eq!(headers.value_of("Accept"), Some("application/json"));
        // 替换保持原位置
        assert!(headers.iter().next().unwrap().matches_name("accept"));
    }

    #[test]
    fn test_and_collapses_appended_duplicates() {
        let mut headers = Headers::new();
        headers.append(Header::of("X-A", "1"));
        headers.append(Header::of("x-a", "2"));
        let headers = headers.and(Header::of("X-A", "3"));
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.value_of("x-a"), Some("3"));
    }

    #[test]
    fn test_from_line() {
        let h = Header::from_line("Content-Length:  12 ").unwrap();
        assert_eq!(h.name(), "Content-Length");
        assert_eq!(h.value(), Some("12"));

        let empty = Header::from_line("X-Empty:").unwrap();
        assert_eq!(empty.value(), None);

        assert!(Header::from_line("no separator").is_err());
        assert!(Header::from_line(": value").is_err());
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let e = Header::try_of("", "value").unwrap_err();
        assert_eq!(e.status_code(), 400);
        assert!(Header::try_named("").is_err());
        assert_eq!(Header::try_of("X-A", "1").unwrap(), Header::of("x-a", "1"));
        assert_eq!(Header::try_named("X-Flag").unwrap().value(), None);
    }

    #[test]
    #[should_panic(expected = "header name must not be empty")]
    fn test_of_panics_on_empty_name() {
        Header::of("", "value");
    }

    #[test]
    fn test_without() {
        let headers = Headers::new()
            .and_value("A", "1")
            .and_value("B", "2")
            .without("a");
        assert_eq!(headers.len(), 1);
        assert!(!headers.contains("A"));
    }
}
