/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use atoi::FromRadix10;

pub(super) struct HttpStatusLine<'a> {
    pub(super) version: u8,
    pub(super) code: u16,
    pub(super) reason: &'a str,
}

impl<'a> HttpStatusLine<'a> {
    pub(super) fn parse(buf: &'a [u8]) -> Result<HttpStatusLine<'a>, &'static str> {
        const MINIMAL_LENGTH: usize = 13; // HTTP/1.x XYZ\n

        if buf.len() < MINIMAL_LENGTH {
            return Err("status line too short");
        }

        let Some(p) = memchr::memchr(b' ', buf) else {
            return Err("no delimiter in status line");
        };
        let version: u8 = match &buf[0..p] {
            b"HTTP/1.0" => 0,
            b"HTTP/1.1" => 1,
            _ => return Err("unsupported http version"),
        };

        let left = &buf[p + 1..];
        let (code, len) = u16::from_radix_10(left);
        if len != 3 {
            return Err("invalid status code");
        }

        let reason = match left.get(len + 1..) {
            Some(r) => std::str::from_utf8(r)
                .map_err(|_| "invalid reason phrase")?
                .trim(),
            None => "",
        };

        Ok(HttpStatusLine {
            version,
            code,
            reason,
        })
    }

    #[inline]
    pub(super) fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}
