//! Page-number pagination with an RFC 5988 `Link` header.
//!
//! The response body stays a bare JSON array; navigation lives in the
//! header as `<url>; rel="next"` and `<url>; rel="prev"` entries.

use crate::errors::PatchworkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number.
    pub number: i64,
    pub size: i64,
}

impl Page {
    /// Read `page` and `per_page` from the query. A missing or invalid
    /// `per_page` falls back to `default_size`; larger values are capped
    /// at `max_size`. A `page` that is not a positive integer is an error.
    pub fn from_query(
        pairs: &[(String, String)],
        default_size: i64,
        max_size: i64,
    ) -> Result<Self, PatchworkError> {
        let mut number = 1;
        let mut size = default_size;

        for (key, value) in pairs {
            match key.as_str() {
                "page" => {
                    number = value
                        .trim()
                        .parse::<i64>()
                        .ok()
                        .filter(|n| *n >= 1)
                        .ok_or(PatchworkError::InvalidPage)?;
                }
                "per_page" => {
                    size = value
                        .trim()
                        .parse::<i64>()
                        .ok()
                        .filter(|n| *n >= 1)
                        .map(|n| n.min(max_size))
                        .unwrap_or(default_size);
                }
                _ => {}
            }
        }

        Ok(Self { number, size })
    }

    pub fn offset(&self) -> i64 {
        (self.number - 1) * self.size
    }

    pub fn last(&self, count: i64) -> i64 {
        ((count + self.size - 1) / self.size).max(1)
    }

    /// Page 1 always exists, even for an empty result set.
    pub fn validate(&self, count: i64) -> Result<(), PatchworkError> {
        if self.number > self.last(count) {
            return Err(PatchworkError::InvalidPage);
        }
        Ok(())
    }

    /// Build the `Link` header value for this page, or `None` when there is
    /// only one page. `url` is the absolute request URL without its query.
    pub fn link_header(&self, url: &str, pairs: &[(String, String)], count: i64) -> Option<String> {
        let mut links = Vec::new();
        if self.number < self.last(count) {
            links.push(format!("<{}>; rel=\"next\"", page_url(url, pairs, self.number + 1)));
        }
        if self.number > 1 {
            links.push(format!("<{}>; rel=\"prev\"", page_url(url, pairs, self.number - 1)));
        }
        if links.is_empty() {
            None
        } else {
            Some(links.join(", "))
        }
    }
}

/// `url` with `page` replaced and every other query parameter kept in order.
/// Page 1 is addressed without a `page` parameter.
fn page_url(url: &str, pairs: &[(String, String)], number: i64) -> String {
    let mut query: Vec<(String, String)> = pairs
        .iter()
        .filter(|(key, _)| key != "page")
        .cloned()
        .collect();
    if number > 1 {
        query.push(("page".to_string(), number.to_string()));
    }
    if query.is_empty() {
        return url.to_string();
    }
    match serde_urlencoded::to_string(&query) {
        Ok(encoded) => format!("{}?{}", url, encoded),
        Err(_) => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let page = Page::from_query(&[], 30, 100).unwrap();
        assert_eq!(page, Page { number: 1, size: 30 });
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn test_per_page_capped_and_fallback() {
        let page = Page::from_query(&pairs(&[("per_page", "500")]), 30, 100).unwrap();
        assert_eq!(page.size, 100);
        let page = Page::from_query(&pairs(&[("per_page", "abc")]), 30, 100).unwrap();
        assert_eq!(page.size, 30);
        let page = Page::from_query(&pairs(&[("per_page", "0")]), 30, 100).unwrap();
        assert_eq!(page.size, 30);
    }

    #[test]
    fn test_invalid_page_number() {
        assert!(matches!(
            Page::from_query(&pairs(&[("page", "0")]), 30, 100),
            Err(PatchworkError::InvalidPage)
        ));
        assert!(Page::from_query(&pairs(&[("page", "x")]), 30, 100).is_err());
    }

    #[test]
    fn test_validate_range() {
        let page = Page { number: 1, size: 10 };
        assert!(page.validate(0).is_ok());
        let page = Page { number: 2, size: 10 };
        assert!(page.validate(10).is_err());
        assert!(page.validate(11).is_ok());
        assert_eq!(page.offset(), 10);
    }

    #[test]
    fn test_link_header() {
        let query = pairs(&[("state", "new"), ("per_page", "1"), ("page", "2")]);
        let page = Page { number: 2, size: 1 };
        let link = page
            .link_header("http://pw.example.com/api/patches/", &query, 3)
            .unwrap();
        assert_eq!(
            link,
            "<http://pw.example.com/api/patches/?state=new&per_page=1&page=3>; rel=\"next\", \
             <http://pw.example.com/api/patches/?state=new&per_page=1>; rel=\"prev\""
        );
    }

    #[test]
    fn test_no_link_for_single_page() {
        let page = Page { number: 1, size: 30 };
        assert!(page.link_header("http://x/api/patches/", &[], 5).is_none());
    }
}
