use crate::error::DataError;
use crate::items::KeyedItems;
use crate::value::Value;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// The ordering values of a page's edge row, recorded as a keyset marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boundary {
    /// Index field value of the edge row, used by exact seeks.
    pub key: Value,
    /// One value per boundary field, in ordering priority.
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeekDirection {
    Forward,
    Backward,
}

/// Identifies a page independently of the instance that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum PageIdentifier {
    /// 1-based page number.
    Offset { number: u64 },
    /// Rows after (forward) or before (backward) a boundary. No boundary
    /// means the first page going forward and the last page going backward.
    Keyset {
        boundary: Option<Boundary>,
        direction: SeekDirection,
        number: Option<u64>,
    },
}

impl PageIdentifier {
    pub fn number(&self) -> Option<u64> {
        match self {
            PageIdentifier::Offset { number } => Some(*number),
            PageIdentifier::Keyset { number, .. } => *number,
        }
    }

    /// Encode as an opaque URL-safe token.
    pub fn to_token(&self) -> Result<String, DataError> {
        let json = serde_json::to_vec(self)
            .map_err(|e| DataError::Other(format!("cannot encode page token: {e}")))?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    pub fn from_token(token: &str) -> Result<Self, DataError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| DataError::InvalidArgument(format!("malformed page token: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| DataError::InvalidArgument(format!("malformed page token: {e}")))
    }
}

/// A page of results with navigation metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Page<E> {
    identifier: PageIdentifier,
    number: Option<u64>,
    items_per_page: u64,
    items: KeyedItems<E>,
    next: Option<PageIdentifier>,
    previous: Option<PageIdentifier>,
    total_elements: Option<u64>,
    total_pages: Option<u64>,
}

impl<E> Page<E> {
    pub(crate) fn new(
        identifier: PageIdentifier,
        items_per_page: u64,
        items: KeyedItems<E>,
        next: Option<PageIdentifier>,
        previous: Option<PageIdentifier>,
    ) -> Self {
        Self {
            number: identifier.number(),
            identifier,
            items_per_page,
            items,
            next,
            previous,
            total_elements: None,
            total_pages: None,
        }
    }

    /// Attach a known total. Never triggers a count on its own.
    pub(crate) fn with_total(mut self, total_elements: Option<u64>) -> Self {
        self.total_elements = total_elements;
        self.total_pages = total_elements.map(|total| total_pages(total, self.items_per_page));
        self
    }

    pub fn identifier(&self) -> &PageIdentifier {
        &self.identifier
    }

    /// 1-based page number, when known.
    pub fn number(&self) -> Option<u64> {
        self.number
    }

    pub fn items_per_page(&self) -> u64 {
        self.items_per_page
    }

    pub fn items(&self) -> &KeyedItems<E> {
        &self.items
    }

    pub fn into_items(self) -> KeyedItems<E> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn next_identifier(&self) -> Option<&PageIdentifier> {
        self.next.as_ref()
    }

    pub fn previous_identifier(&self) -> Option<&PageIdentifier> {
        self.previous.as_ref()
    }

    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }

    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }

    pub fn total_elements(&self) -> Option<u64> {
        self.total_elements
    }

    pub fn total_pages(&self) -> Option<u64> {
        self.total_pages
    }
}

pub(crate) fn total_pages(total_elements: u64, items_per_page: u64) -> u64 {
    if items_per_page == 0 {
        0
    } else {
        total_elements.div_ceil(items_per_page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(23, 10), 3);
        assert_eq!(total_pages(20, 10), 2);
        assert_eq!(total_pages(0, 10), 0);
    }

    #[test]
    fn test_token_round_trip() {
        let id = PageIdentifier::Keyset {
            boundary: Some(Boundary {
                key: Value::Int(12),
                values: vec![Value::from("bob"), Value::Int(12)],
            }),
            direction: SeekDirection::Backward,
            number: Some(3),
        };
        let token = id.to_token().unwrap();
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(PageIdentifier::from_token(&token).unwrap(), id);
    }

    #[test]
    fn test_malformed_token() {
        let err = PageIdentifier::from_token("not a token!").unwrap_err();
        assert!(matches!(err, DataError::InvalidArgument(_)));
        let err = PageIdentifier::from_token(&URL_SAFE_NO_PAD.encode(b"{}")).unwrap_err();
        assert!(matches!(err, DataError::InvalidArgument(_)));
    }

    #[test]
    fn test_page_totals() {
        let page: Page<()> = Page::new(
            PageIdentifier::Offset { number: 2 },
            10,
            KeyedItems::new(),
            None,
            Some(PageIdentifier::Offset { number: 1 }),
        )
        .with_total(Some(23));
        assert_eq!(page.number(), Some(2));
        assert_eq!(page.total_pages(), Some(3));
        assert!(page.has_previous());
        assert!(!page.has_next());
    }
}
