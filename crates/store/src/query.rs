/// Filter for listing records of one aggregate type.
///
/// Key filters are conjunctive. Results are ordered by creation time.
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    /// Aggregate type to list.
    pub aggregate_type: String,

    /// `(key name, key value)` pairs that must all match.
    pub keys: Vec<(String, String)>,

    /// Maximum number of records to return.
    pub limit: Option<usize>,

    /// Number of records to skip.
    pub offset: Option<usize>,
}

impl RecordQuery {
    /// Creates a query over all records of an aggregate type.
    pub fn for_type(aggregate_type: impl Into<String>) -> Self {
        Self {
            aggregate_type: aggregate_type.into(),
            ..Default::default()
        }
    }

    /// Requires a key to have the given value.
    pub fn key(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.keys.push((name.into(), value.into()));
        self
    }

    /// Limits the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips a number of results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Same filters without paging, for counting.
    pub fn unpaged(&self) -> Self {
        Self {
            aggregate_type: self.aggregate_type.clone(),
            keys: self.keys.clone(),
            limit: None,
            offset: None,
        }
    }

    /// Returns true if a record with these keys matches the key filters.
    pub fn matches_keys<'a>(&self, mut lookup: impl FnMut(&str) -> Option<&'a str>) -> bool {
        self.keys
            .iter()
            .all(|(name, value)| lookup(name) == Some(value.as_str()))
    }
}
