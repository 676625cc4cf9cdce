use anyhow::Context;
use serde::Serialize;
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};
use url::Url;

use crate::paste_repo::ViewedPaste;

/// `2024-01-01T00:00:00.000Z`
const ISO_8601_MILLIS: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
);

/// `9999-12-31T23:59:59.999Z`, the last instant [`format_epoch_millis`] can render.
pub const MAX_EPOCH_MILLIS: i64 = 253_402_300_799_999;

#[derive(Debug, Serialize)]
pub struct CreatedPaste {
    pub id: String,
    pub url: String,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct PasteView {
    pub content: String,
    pub remaining_views: Option<i64>,
    /// Timestamp in ISO-8601 format
    pub expires_at: Option<String>,
}

#[derive(Serialize)]
pub struct Error {
    pub error: String,
}

#[derive(Serialize)]
pub struct InternalError {
    pub error: String,
    pub error_id: String,
}

#[derive(Serialize)]
pub struct Health {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TryFrom<ViewedPaste> for PasteView {
    type Error = anyhow::Error;

    fn try_from(
        ViewedPaste {
            content,
            remaining_views,
            expires_at,
        }: ViewedPaste,
    ) -> Result<Self, Self::Error> {
        Ok(Self {
            content,
            remaining_views,
            expires_at: expires_at.map(format_epoch_millis).transpose()?,
        })
    }
}

/// # Errors
/// Will return [`Err`] if the timestamp is outside the representable date range.
pub fn format_epoch_millis(epoch_millis: i64) -> anyhow::Result<String> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(epoch_millis) * 1_000_000)
        .context("Timestamp is out of range")?
        .format(ISO_8601_MILLIS)
        .context("Failed to format timestamp")
}

/// The human-facing page for a paste, relative to `base`.
///
/// # Errors
/// Will return [`Err`] if `base` cannot be a base URL.
pub fn paste_url(base: &Url, id: &str) -> Result<Url, url::ParseError> {
    base.join(&format!("/p/{id}"))
}
