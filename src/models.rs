use serde::{Deserialize, Serialize};

/// Header fields every resource returned by the remote APIs carries.
///
/// Flatten it into endpoint-specific models:
///
/// ```
/// use printstream::Resource;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Postcard {
///     #[serde(flatten)]
///     resource: Resource,
///     status: String,
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,

    /// e.g. "postcard", "letter", "webhook".
    pub object: String,

    /// ISO 8601.
    pub created_at: String,

    /// ISO 8601.
    pub updated_at: String,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    /// Always "list".
    #[serde(default = "list_object")]
    pub object: String,

    /// Page size requested.
    pub limit: u32,

    /// Items skipped before this page.
    #[serde(default)]
    pub skip: u32,

    /// Total items across all pages.
    pub total_count: u64,

    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

fn list_object() -> String {
    "list".to_string()
}

impl<T> ListResponse<T> {
    /// Number of items on this page.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` if this page has no items.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate over this page's items.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    /// `true` if items remain after this page.
    pub fn has_more(&self) -> bool {
        (self.skip as u64) + (self.data.len() as u64) < self.total_count
    }
}

impl<T> IntoIterator for ListResponse<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a ListResponse<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_defaults() {
        let page: ListResponse<Resource> =
            serde_json::from_value(json!({ "limit": 10, "totalCount": 0 })).unwrap();
        assert_eq!(page.object, "list");
        assert_eq!(page.skip, 0);
        assert!(page.is_empty());
        assert!(!page.has_more());
    }

    #[test]
    fn list_pagination() {
        let page: ListResponse<Resource> = serde_json::from_value(json!({
            "object": "list",
            "limit": 1,
            "skip": 0,
            "totalCount": 2,
            "data": [{
                "id": "postcard_1",
                "object": "postcard",
                "createdAt": "2024-01-01T00:00:00Z",
                "updatedAt": "2024-01-02T00:00:00Z"
            }]
        }))
        .unwrap();

        assert_eq!(page.len(), 1);
        assert!(page.has_more());
        let ids: Vec<_> = page.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["postcard_1"]);
    }
}
