//! Request query parameters (`include`, `sort`, `filter[..]`, `page[..]`).

use crate::error::{ApiError, ApiResult};
use std::collections::BTreeMap;

/// Flat query-string parameters as received, keyed by their literal name
/// (`page[limit]`, `filter[q]`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    params: BTreeMap<String, String>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    /// Parses a raw `a=b&c=d` query string. Percent-escapes and `+` are decoded.
    pub fn parse(raw: &str) -> Self {
        let params = raw
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((k, v)) => (decode(k), decode(v)),
                None => (decode(pair), String::new()),
            })
            .collect();
        Self { params }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `include` split on commas, blanks dropped. `None` when absent.
    pub fn include(&self) -> Option<Vec<String>> {
        self.get("include").map(split_list)
    }

    pub fn sort(&self) -> Option<&str> {
        self.get("sort").filter(|s| !s.is_empty())
    }

    /// `filter[name]=value` pairs in name order.
    pub fn filters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter_map(|(k, v)| {
            k.strip_prefix("filter[")
                .and_then(|rest| rest.strip_suffix(']'))
                .map(|name| (name, v))
        })
    }

    /// `page[limit]`; must be a positive integer when present.
    pub fn page_limit(&self) -> ApiResult<Option<usize>> {
        match self.get("page[limit]") {
            None => Ok(None),
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => Ok(Some(n)),
                _ => Err(ApiError::bad_parameter(
                    "page[limit]",
                    format!("page[limit] must be a positive integer, got '{raw}'"),
                )),
            },
        }
    }

    /// `page[offset]`; a non-negative integer the store can address
    /// (at most `i64::MAX`) when present.
    pub fn page_offset(&self) -> ApiResult<usize> {
        match self.get("page[offset]") {
            None => Ok(0),
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|&n| n <= i64::MAX as u64)
                .and_then(|n| usize::try_from(n).ok())
                .ok_or_else(|| {
                    ApiError::bad_parameter(
                        "page[offset]",
                        format!("page[offset] must be an integer between 0 and {}, got '{raw}'", i64::MAX),
                    )
                }),
        }
    }

    /// Re-encodes every parameter except `page[..]`, for pagination links.
    pub(crate) fn encode_without_page(&self) -> Vec<String> {
        self.iter()
            .filter(|(k, _)| !k.starts_with("page["))
            .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Query-string decoding: `+` is a space, then percent-escapes.
fn decode(s: &str) -> String {
    let spaced = s.replace('+', " ");
    let bytes = urlencoding::decode_binary(spaced.as_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Percent-encodes a link component. Brackets and commas stay readable.
fn encode(s: &str) -> String {
    urlencoding::encode(s)
        .replace("%5B", "[")
        .replace("%5D", "]")
        .replace("%2C", ",")
}

/// Relationship paths to side-load, as a tree: `a.b,a.c,d` becomes
/// `{a: {b, c}, d}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncludeTree {
    children: BTreeMap<String, IncludeTree>,
}

impl IncludeTree {
    /// Builds a tree from dot-separated paths. Duplicates collapse. An empty
    /// segment (`a..b`, `.a`) is rejected.
    pub fn from_paths<I, S>(paths: I) -> ApiResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut root = Self::default();
        for path in paths {
            let path = path.as_ref();
            let mut node = &mut root;
            for segment in path.split('.') {
                if segment.is_empty() {
                    return Err(ApiError::bad_parameter(
                        "include",
                        format!("Invalid include [{path}]"),
                    ));
                }
                node = node.children.entry(segment.to_string()).or_default();
            }
        }
        Ok(root)
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn get(&self, relationship: &str) -> Option<&IncludeTree> {
        self.children.get(relationship)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &IncludeTree)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Flattens back to dotted paths, leaves only.
    pub fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (name, child) in &self.children {
            if child.is_empty() {
                out.push(name.clone());
            } else {
                for sub in child.paths() {
                    out.push(format!("{name}.{sub}"));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bracketed_keys() {
        let q = QueryParams::parse("page%5Blimit%5D=2&filter[q]=hello+world&sort=-createdAt");
        assert_eq!(q.get("page[limit]"), Some("2"));
        assert_eq!(q.filters().collect::<Vec<_>>(), vec![("q", "hello world")]);
        assert_eq!(q.sort(), Some("-createdAt"));
    }

    #[test]
    fn page_limit_rejects_zero_and_garbage() {
        assert!(QueryParams::new().with("page[limit]", "0").page_limit().is_err());
        assert!(QueryParams::new().with("page[limit]", "ten").page_limit().is_err());
        assert_eq!(
            QueryParams::new().with("page[limit]", "7").page_limit().unwrap(),
            Some(7)
        );
        assert!(QueryParams::new().with("page[offset]", "-1").page_offset().is_err());
    }

    #[test]
    fn page_offset_is_bounded_by_the_store() {
        let max = i64::MAX.to_string();
        assert_eq!(
            QueryParams::new().with("page[offset]", &max).page_offset().unwrap(),
            i64::MAX as usize
        );
        let over = (i64::MAX as u64 + 1).to_string();
        assert!(QueryParams::new().with("page[offset]", &over).page_offset().is_err());
        assert!(QueryParams::new().with("page[offset]", &u64::MAX.to_string()).page_offset().is_err());
    }

    #[test]
    fn decoding_handles_malformed_escapes() {
        let q = QueryParams::parse("filter[q]=100%25+sure&sort=%ZZ");
        assert_eq!(q.get("filter[q]"), Some("100% sure"));
        assert_eq!(q.get("sort"), Some("%ZZ"));
    }

    #[test]
    fn include_tree_merges_and_dedupes() {
        let tree = IncludeTree::from_paths(["firstPost", "firstPost.user", "user", "user"]).unwrap();
        assert_eq!(tree.paths(), vec!["firstPost.user", "user"]);
        assert!(tree.get("firstPost").unwrap().get("user").is_some());
    }

    #[test]
    fn include_tree_rejects_empty_segments() {
        assert!(IncludeTree::from_paths(["a..b"]).is_err());
        assert!(IncludeTree::from_paths([".a"]).is_err());
    }

    #[test]
    fn encode_keeps_brackets() {
        let q = QueryParams::new().with("filter[q]", "a b").with("page[limit]", "2");
        assert_eq!(q.encode_without_page(), vec!["filter[q]=a%20b"]);
    }
}
