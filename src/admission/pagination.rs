//! Offset and cursor pagination helpers
//!
//! Cursor mode wraps an offset in an opaque URL-safe token so clients
//! cannot construct or increment positions by hand; tampered tokens are
//! rejected instead of misinterpreted.

use crate::error::{LedgerError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::Serialize;

/// Offset-paginated slice of a result set
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
    pub has_next: bool,
    pub has_previous: bool,
}

/// Cursor-paginated slice of a result set
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPage<T> {
    pub items: Vec<T>,
    pub has_next: bool,
    pub has_previous: bool,
    pub next_cursor: Option<String>,
    pub previous_cursor: Option<String>,
}

/// Slice `items` at `[offset, offset + limit)`
pub fn paginate<T: Clone>(items: &[T], limit: usize, offset: usize) -> PaginatedResponse<T> {
    let total = items.len();
    let start = offset.min(total);
    let end = offset.saturating_add(limit).min(total);

    PaginatedResponse {
        items: items[start..end].to_vec(),
        total,
        limit,
        offset,
        has_next: end < total,
        has_previous: offset > 0 && total > 0,
    }
}

/// Encode an offset as an opaque cursor token
pub fn encode_cursor(offset: usize) -> String {
    URL_SAFE_NO_PAD.encode(format!("offset:{}", offset))
}

/// Decode a cursor token back to its offset
pub fn decode_cursor(cursor: &str) -> Result<usize> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|e| LedgerError::InvalidCursor(e.to_string()))?;
    let decoded = String::from_utf8(bytes)
        .map_err(|_| LedgerError::InvalidCursor("not valid UTF-8".to_string()))?;

    decoded
        .strip_prefix("offset:")
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| LedgerError::InvalidCursor(format!("unrecognized payload '{}'", decoded)))
}

/// Slice `items` at the position named by `cursor` (start when `None`)
pub fn paginate_cursor<T: Clone>(
    items: &[T],
    limit: usize,
    cursor: Option<&str>,
) -> Result<CursorPage<T>> {
    let offset = match cursor {
        Some(cursor) => decode_cursor(cursor)?,
        None => 0,
    };

    let page = paginate(items, limit, offset);
    let next_cursor = page.has_next.then(|| encode_cursor(offset + limit));
    let previous_cursor = page
        .has_previous
        .then(|| encode_cursor(offset.saturating_sub(limit)));

    Ok(CursorPage {
        items: page.items,
        has_next: page.has_next,
        has_previous: page.has_previous,
        next_cursor,
        previous_cursor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<u32> {
        (0..10).collect()
    }

    #[test]
    fn test_middle_page() {
        let page = paginate(&items(), 3, 6);
        assert_eq!(page.items, vec![6, 7, 8]);
        assert!(page.has_next);
        assert!(page.has_previous);
        assert_eq!(page.total, 10);
    }

    #[test]
    fn test_first_and_last_pages() {
        let first = paginate(&items(), 4, 0);
        assert_eq!(first.items, vec![0, 1, 2, 3]);
        assert!(first.has_next);
        assert!(!first.has_previous);

        let last = paginate(&items(), 4, 8);
        assert_eq!(last.items, vec![8, 9]);
        assert!(!last.has_next);
        assert!(last.has_previous);
    }

    #[test]
    fn test_offset_past_end() {
        let page = paginate(&items(), 5, 50);
        assert!(page.items.is_empty());
        assert!(!page.has_next);
        assert!(page.has_previous);
    }

    #[test]
    fn test_empty_input() {
        let page = paginate::<u32>(&[], 5, 0);
        assert!(page.items.is_empty());
        assert!(!page.has_next);
        assert!(!page.has_previous);
    }

    #[test]
    fn test_cursor_roundtrip() {
        let cursor = encode_cursor(42);
        assert_eq!(decode_cursor(&cursor).unwrap(), 42);
        // Opaque: the raw offset does not appear in the token
        assert!(!cursor.contains("42"));
    }

    #[test]
    fn test_tampered_cursor_rejected() {
        assert!(matches!(
            decode_cursor("!!!not-base64!!!"),
            Err(LedgerError::InvalidCursor(_))
        ));

        let forged = URL_SAFE_NO_PAD.encode("page:2");
        assert!(matches!(
            decode_cursor(&forged),
            Err(LedgerError::InvalidCursor(_))
        ));
    }

    #[test]
    fn test_cursor_walk() {
        let data = items();

        let first = paginate_cursor(&data, 4, None).unwrap();
        assert_eq!(first.items, vec![0, 1, 2, 3]);
        assert!(first.previous_cursor.is_none());

        let second = paginate_cursor(&data, 4, first.next_cursor.as_deref()).unwrap();
        assert_eq!(second.items, vec![4, 5, 6, 7]);
        assert!(second.has_previous);

        let third = paginate_cursor(&data, 4, second.next_cursor.as_deref()).unwrap();
        assert_eq!(third.items, vec![8, 9]);
        assert!(third.next_cursor.is_none());

        // Walk backwards
        let back = paginate_cursor(&data, 4, third.previous_cursor.as_deref()).unwrap();
        assert_eq!(back.items, vec![4, 5, 6, 7]);
    }
}
