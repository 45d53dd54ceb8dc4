//! Paging and the paging cookie.
//!
//! The cookie is an opaque token handed back with every page: the
//! hex-encoded JSON of a [`PagingCookie`]. Callers pass it back unchanged
//! with the request for the following page.

use crmdb_proto::{Entity, PagingInfo};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::Error;

/// Position of a returned page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingCookie {
    /// Page number the cookie was issued for.
    pub page: u32,
    /// Id of the first record on the page.
    pub first_id: Option<Uuid>,
    /// Id of the last record on the page.
    pub last_id: Option<Uuid>,
}

impl PagingCookie {
    /// Build the cookie for a page of rows.
    pub fn for_page(page: u32, rows: &[Entity]) -> Self {
        Self {
            page,
            first_id: rows.first().map(|r| r.id),
            last_id: rows.last().map(|r| r.id),
        }
    }

    /// Encode as an opaque token.
    pub fn encode(&self) -> Result<String, Error> {
        let json = serde_json::to_vec(self).map_err(crmdb_proto::Error::from)?;
        Ok(hex::encode(json))
    }

    /// Decode a token produced by [`PagingCookie::encode`].
    pub fn decode(token: &str) -> Result<Self, Error> {
        let bytes = hex::decode(token.trim())
            .map_err(|e| Error::InvalidPagingCookie(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| Error::InvalidPagingCookie(e.to_string()))
    }
}

/// One page of an ordered result.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Rows on the page.
    pub rows: Vec<Entity>,
    /// Whether rows exist beyond this page.
    pub more_records: bool,
    /// Cookie for the following request.
    pub paging_cookie: Option<String>,
}

/// Slice the requested page out of an ordered result.
///
/// A supplied cookie must decode, and should have been issued for the
/// previous page; when it was not, the page number wins.
pub fn apply_paging(mut rows: Vec<Entity>, paging: &PagingInfo) -> Result<Page, Error> {
    if paging.page_number == 0 || paging.count == 0 {
        return Err(Error::InvalidQuery(format!(
            "page number and count must be positive, got page {} of {}",
            paging.page_number, paging.count
        )));
    }

    if let Some(token) = &paging.paging_cookie {
        let cookie = PagingCookie::decode(token)?;
        if cookie.page.checked_add(1) != Some(paging.page_number) {
            warn!(
                cookie_page = cookie.page,
                page_number = paging.page_number,
                "paging cookie does not match the requested page"
            );
        }
    }

    let count = paging.count as usize;
    let offset = (paging.page_number as usize - 1).saturating_mul(count);

    // Apply offset
    if offset >= rows.len() {
        rows.clear();
    } else {
        rows.drain(0..offset);
    }

    // Apply limit
    let more_records = rows.len() > count;
    rows.truncate(count);

    let paging_cookie = Some(PagingCookie::for_page(paging.page_number, &rows).encode()?);
    Ok(Page {
        rows,
        more_records,
        paging_cookie,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize) -> Vec<Entity> {
        (0..n).map(|_| Entity::with_new_id("account")).collect()
    }

    #[test]
    fn test_cookie_roundtrip() {
        let page = rows(3);
        let cookie = PagingCookie::for_page(2, &page);
        let token = cookie.encode().unwrap();

        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        let decoded = PagingCookie::decode(&token).unwrap();
        assert_eq!(decoded, cookie);
        assert_eq!(decoded.first_id, Some(page[0].id));
        assert_eq!(decoded.last_id, Some(page[2].id));
    }

    #[test]
    fn test_bad_cookie() {
        let err = PagingCookie::decode("not hex").unwrap_err();
        assert!(matches!(err, Error::InvalidPagingCookie(_)));

        let err = PagingCookie::decode(&hex::encode(b"{\"page\":")).unwrap_err();
        assert!(matches!(err, Error::InvalidPagingCookie(_)));
    }

    #[test]
    fn test_pages() {
        let all = rows(5);

        let first = apply_paging(all.clone(), &PagingInfo::new(1, 2)).unwrap();
        assert_eq!(first.rows, all[0..2].to_vec());
        assert!(first.more_records);

        let last = apply_paging(all.clone(), &PagingInfo::new(3, 2)).unwrap();
        assert_eq!(last.rows, all[4..].to_vec());
        assert!(!last.more_records);

        let beyond = apply_paging(all, &PagingInfo::new(4, 2)).unwrap();
        assert!(beyond.rows.is_empty());
        assert!(!beyond.more_records);
    }

    #[test]
    fn test_exact_fit_has_no_more_records() {
        let page = apply_paging(rows(2), &PagingInfo::new(1, 2)).unwrap();
        assert_eq!(page.rows.len(), 2);
        assert!(!page.more_records);
    }

    #[test]
    fn test_cookie_is_checked() {
        let all = rows(4);
        let first = apply_paging(all.clone(), &PagingInfo::new(1, 2)).unwrap();
        let cookie = first.paging_cookie.unwrap();

        let second = apply_paging(all.clone(), &PagingInfo::new(2, 2).with_cookie(cookie)).unwrap();
        assert_eq!(second.rows, all[2..].to_vec());

        let err = apply_paging(all, &PagingInfo::new(2, 2).with_cookie("zz")).unwrap_err();
        assert!(matches!(err, Error::InvalidPagingCookie(_)));
    }

    #[test]
    fn test_zero_page_is_rejected() {
        assert!(matches!(
            apply_paging(rows(1), &PagingInfo::new(0, 10)),
            Err(Error::InvalidQuery(_))
        ));
        assert!(matches!(
            apply_paging(rows(1), &PagingInfo::new(1, 0)),
            Err(Error::InvalidQuery(_))
        ));
    }
}
