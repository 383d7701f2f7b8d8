// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Post slug codec.
//!
//! A post id is written as an unsigned LEB128 varint, base-32 encoded with the
//! RFC 4648 alphabet, and stripped of its `=` padding. Tokens are short and
//! reversible but not secret: anyone can decode one back to its id.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
};
use data_encoding::BASE32;
use thiserror::Error;
use tracing::debug;

/// Base-32 block size in characters.
const BLOCK: usize = 8;

/// Longest varint a `u64` can produce.
const MAX_VARINT_LEN: usize = 10;

/// Slug decoding errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlugError {
    #[error("malformed slug {slug}: {reason}")]
    MalformedSlug { slug: String, reason: &'static str },
}

impl SlugError {
    fn malformed(slug: &str, reason: &'static str) -> Self {
        SlugError::MalformedSlug {
            slug: slug.to_string(),
            reason,
        }
    }
}

impl IntoResponse for SlugError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, format!("invalid post {self}")).into_response()
    }
}

/// Encode a post id as a slug token.
pub fn encode(id: u64) -> String {
    let mut buf = Vec::with_capacity(MAX_VARINT_LEN);
    put_uvarint(&mut buf, id);
    let token = BASE32.encode(&buf);
    token.trim_end_matches('=').to_string()
}

/// Decode a slug token back into a post id.
pub fn decode(slug: &str) -> Result<u64, SlugError> {
    let mut padded = String::with_capacity(slug.len() + BLOCK);
    padded.push_str(slug);
    while padded.len() % BLOCK != 0 {
        padded.push('=');
    }

    let bytes = BASE32
        .decode(padded.as_bytes())
        .map_err(|_| SlugError::malformed(slug, "not valid base-32"))?;

    let (id, consumed) = uvarint(&bytes).map_err(|reason| SlugError::malformed(slug, reason))?;
    if consumed != bytes.len() {
        return Err(SlugError::malformed(slug, "trailing bytes after id"));
    }

    debug!(slug, id, "Decoded slug");
    Ok(id)
}

fn put_uvarint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8 & 0x7f) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Read a varint from the front of `bytes`, returning the value and the
/// number of bytes consumed.
fn uvarint(bytes: &[u8]) -> Result<(u64, usize), &'static str> {
    let mut value: u64 = 0;
    for (i, &b) in bytes.iter().enumerate() {
        // The tenth byte may only contribute the top bit.
        if i == MAX_VARINT_LEN - 1 && b > 1 {
            return Err("id overflows 64 bits");
        }
        if b < 0x80 {
            return Ok((value | (u64::from(b) << (7 * i)), i + 1));
        }
        value |= u64::from(b & 0x7f) << (7 * i);
    }
    Err("truncated id")
}

/// Extracts a post id from a `/post/{slug}` path segment.
///
/// Malformed slugs are rejected with 400 before the handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostSlug(pub u64);

#[async_trait]
impl<S> FromRequestParts<S> for PostSlug
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(slug) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(IntoResponse::into_response)?;
        decode(&slug)
            .map(PostSlug)
            .map_err(IntoResponse::into_response)
    }
}
