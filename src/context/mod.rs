//! Per-request context — path parameters, query parameters, and resolved
//! dependencies threaded explicitly down the handler call chain.
//!
//! Nothing here is ambient or global: the router constructs one [`Context`]
//! per request, seeds it with positional [`Params`] and parsed [`QueryParams`],
//! and (on a route match) overwrites the params with pattern-bound values and
//! injects the merged dependency bindings. Handlers receive the context by
//! value and read everything through it.

use std::collections::HashMap;

use crate::Request;
use crate::http::percent_decode;
use crate::registry::{Dependency, DependencyError};

/// Path parameters scoped to one request, immutable after construction.
///
/// Accessors never panic and never report absence at the type level: a
/// missing or malformed value yields the documented zero value for whichever
/// accessor was used (empty string, integer zero, empty vec).
///
/// # Examples
///
/// ```
/// use rill::context::Params;
///
/// let mut params = Params::new();
/// params.insert("id", "42");
///
/// assert_eq!(params.get("id"), "42");
/// assert_eq!(params.get_int("id"), 42);
/// assert_eq!(params.get("missing"), "");
/// assert_eq!(params.get_int("missing"), 0);
/// ```
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Params {
    map: HashMap<String, String>,
}

impl Params {
    /// Creates an empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Extracts parameters from a raw path using the positional pairing
    /// convention: after splitting on `/`, segment *i* (1-indexed, odd) is a
    /// key — with a leading `:` stripped if present — and segment *i+1* is
    /// its value. A trailing unpaired segment is dropped.
    ///
    /// This is the pattern-free seeding used before route resolution; a
    /// parameterized route match replaces it with pattern-bound values.
    ///
    /// # Examples
    ///
    /// ```
    /// use rill::context::Params;
    ///
    /// let params = Params::from_path("/user/42");
    /// assert_eq!(params.get("user"), "42");
    /// ```
    pub fn from_path(path: &str) -> Self {
        let parts: Vec<&str> = path.split('/').collect();
        let mut params = Self::new();

        let mut i = 1;
        while i + 1 < parts.len() {
            let key = parts[i].strip_prefix(':').unwrap_or(parts[i]);
            params.insert(key, parts[i + 1]);
            i += 2;
        }
        params
    }

    /// Inserts a parameter binding.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    /// Returns the value for `key`, or the empty string if absent.
    pub fn get(&self, key: &str) -> &str {
        self.map.get(key).map(String::as_str).unwrap_or("")
    }

    /// Returns the value for `key` parsed as an integer, or `0` if the value
    /// is absent or not a valid integer.
    pub fn get_int(&self, key: &str) -> i64 {
        self.get(key).parse().unwrap_or(0)
    }

    /// Returns the value for `key` as a single-element vec, or an empty vec
    /// if absent.
    pub fn get_str_slice(&self, key: &str) -> Vec<&str> {
        match self.map.get(key) {
            Some(val) => vec![val.as_str()],
            None => Vec::new(),
        }
    }

    /// Returns the comma-separated value for `key` parsed as integers.
    /// Entries that are not valid integers are skipped.
    pub fn get_int_slice(&self, key: &str) -> Vec<i64> {
        match self.map.get(key) {
            Some(val) => val.split(',').filter_map(|v| v.parse().ok()).collect(),
            None => Vec::new(),
        }
    }

    /// Returns the number of bound parameters.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if no parameters are bound.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Query parameters parsed once per request from the URL query string.
///
/// The first value wins for a repeated key; `+` decodes to a space and `%XX`
/// escapes are percent-decoded in both keys and values. The accessors share
/// the zero-value fallback contract of [`Params`].
///
/// # Examples
///
/// ```
/// use rill::context::QueryParams;
///
/// let query = QueryParams::parse(Some("name=jo&age=30&age=99"));
/// assert_eq!(query.get("name"), "jo");
/// assert_eq!(query.get_int("age"), 30); // first value wins
/// ```
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct QueryParams {
    map: HashMap<String, String>,
}

impl QueryParams {
    /// Parses a raw query string (without the leading `?`).
    ///
    /// `+` is decoded as a space before `%XX` escapes are decoded, so an
    /// encoded `%2B` survives as a literal `+`.
    pub fn parse(query: Option<&str>) -> Self {
        let mut map = HashMap::new();
        if let Some(query) = query {
            for pair in query.split('&') {
                let mut parts = pair.splitn(2, '=');
                let Some(key) = parts.next() else { continue };
                if key.is_empty() {
                    continue;
                }
                let key = percent_decode(&key.replace('+', " "));
                let value = percent_decode(&parts.next().unwrap_or("").replace('+', " "));
                map.entry(key).or_insert(value);
            }
        }
        Self { map }
    }

    /// Returns the value for `key`, or the empty string if absent.
    pub fn get(&self, key: &str) -> &str {
        self.map.get(key).map(String::as_str).unwrap_or("")
    }

    /// Returns the value for `key` parsed as an integer, or `0` if the value
    /// is absent or not a valid integer.
    pub fn get_int(&self, key: &str) -> i64 {
        self.get(key).parse().unwrap_or(0)
    }

    /// Returns `true` if no query parameters are present.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// Per-request execution context passed to middleware and handlers.
///
/// Carries the parsed [`Request`], the path [`Params`] (positional-seeded,
/// then pattern-bound on a parameterized match), the [`QueryParams`], and the
/// merged dependency bindings for the matched route.
pub struct Context {
    request: Request,
    params: Params,
    query: QueryParams,
    dependencies: HashMap<String, Dependency>,
}

impl Context {
    /// Creates a context for a request, seeding positional path parameters
    /// and parsing the query string.
    pub fn new(request: Request) -> Self {
        let params = Params::from_path(request.path());
        let query = QueryParams::parse(request.query_string());
        Self {
            request,
            params,
            query,
            dependencies: HashMap::new(),
        }
    }

    /// Returns the underlying request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Returns the path parameters.
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Returns the query parameters.
    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    /// Replaces the seeded positional parameters with pattern-bound ones.
    pub fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    /// Installs the merged dependency bindings for this request.
    pub fn set_dependencies(&mut self, dependencies: HashMap<String, Dependency>) {
        self.dependencies = dependencies;
    }

    /// Resolves a dependency binding and narrows it to `T`.
    ///
    /// The three-way outcome is explicit: `Ok(&T)` when the key is bound and
    /// the value is a `T`, [`DependencyError::TypeMismatch`] when it is bound
    /// to something else, and [`DependencyError::NotFound`] when it is absent.
    /// A mismatch is the caller's to report per-request; it is never fatal.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use rill::{Context, Response, StatusCode};
    /// # async fn handler(ctx: Context) -> Response {
    /// let pool = match ctx.dependency::<String>("db") {
    ///     Ok(pool) => pool,
    ///     Err(e) => return Response::json_error(StatusCode::InternalServerError, &e.to_string()),
    /// };
    /// # Response::new(StatusCode::Ok)
    /// # }
    /// ```
    pub fn dependency<T: Send + Sync + 'static>(&self, key: &str) -> Result<&T, DependencyError> {
        let value = self
            .dependencies
            .get(key)
            .ok_or_else(|| DependencyError::NotFound {
                key: key.to_owned(),
            })?;
        value
            .downcast_ref::<T>()
            .ok_or_else(|| DependencyError::TypeMismatch {
                key: key.to_owned(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Returns `true` if a dependency is bound under `key`, without narrowing.
    pub fn has_dependency(&self, key: &str) -> bool {
        self.dependencies.contains_key(key)
    }

    /// Deserializes the request body as JSON into `T`.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn make_request(path: &str) -> Request {
        let raw = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    // ── Params: positional extraction ─────────────────────────────────────────

    #[test]
    fn positional_pairs() {
        let params = Params::from_path("/user/42");
        assert_eq!(params.get("user"), "42");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn positional_strips_colon_prefix() {
        let params = Params::from_path("/:id/42");
        assert_eq!(params.get("id"), "42");
    }

    #[test]
    fn positional_trailing_unpaired_dropped() {
        // "/admin/user/42": (admin → user) pairs, "42" has no partner
        let params = Params::from_path("/admin/user/42");
        assert_eq!(params.get("admin"), "user");
        assert_eq!(params.get("42"), "");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn positional_root_is_empty() {
        assert!(Params::from_path("/").is_empty());
    }

    // ── Params: typed accessors ───────────────────────────────────────────────

    #[test]
    fn get_falls_back_to_empty_string() {
        assert_eq!(Params::new().get("anything"), "");
    }

    #[test]
    fn get_int_falls_back_to_zero() {
        let mut params = Params::new();
        params.insert("id", "not-a-number");
        assert_eq!(params.get_int("id"), 0);
        assert_eq!(params.get_int("missing"), 0);
    }

    #[test]
    fn get_int_parses() {
        let mut params = Params::new();
        params.insert("id", "42");
        assert_eq!(params.get_int("id"), 42);
    }

    #[test]
    fn str_slice_single_element_or_empty() {
        let mut params = Params::new();
        params.insert("tags", "a,b");
        assert_eq!(params.get_str_slice("tags"), vec!["a,b"]);
        assert!(params.get_str_slice("missing").is_empty());
    }

    #[test]
    fn int_slice_skips_invalid_entries() {
        let mut params = Params::new();
        params.insert("ids", "1,x,3");
        assert_eq!(params.get_int_slice("ids"), vec![1, 3]);
        assert!(params.get_int_slice("missing").is_empty());
    }

    // ── QueryParams ───────────────────────────────────────────────────────────

    #[test]
    fn query_basic() {
        let q = QueryParams::parse(Some("name=jo&age=30"));
        assert_eq!(q.get("name"), "jo");
        assert_eq!(q.get_int("age"), 30);
    }

    #[test]
    fn query_first_value_wins() {
        let q = QueryParams::parse(Some("k=first&k=second"));
        assert_eq!(q.get("k"), "first");
    }

    #[test]
    fn query_plus_decodes_to_space() {
        let q = QueryParams::parse(Some("name=jo+smith"));
        assert_eq!(q.get("name"), "jo smith");
    }

    #[test]
    fn query_percent_decodes() {
        let q = QueryParams::parse(Some("q=hello%20world&a%20b=1"));
        assert_eq!(q.get("q"), "hello world");
        assert_eq!(q.get_int("a b"), 1);
    }

    #[test]
    fn query_encoded_plus_survives() {
        let q = QueryParams::parse(Some("expr=1%2B2"));
        assert_eq!(q.get("expr"), "1+2");
    }

    #[test]
    fn query_zero_value_fallbacks() {
        let q = QueryParams::parse(None);
        assert_eq!(q.get("missing"), "");
        assert_eq!(q.get_int("missing"), 0);
        assert!(q.is_empty());
    }

    // ── Context ───────────────────────────────────────────────────────────────

    #[test]
    fn context_seeds_positional_params_and_query() {
        let raw = b"GET /user/42?verbose=1 HTTP/1.1\r\nHost: x\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        let ctx = Context::new(req);
        assert_eq!(ctx.params().get("user"), "42");
        assert_eq!(ctx.query().get_int("verbose"), 1);
    }

    #[test]
    fn dependency_narrowing_three_way() {
        let mut ctx = Context::new(make_request("/"));
        let mut deps: HashMap<String, Dependency> = HashMap::new();
        deps.insert("db".to_owned(), Arc::new("connection".to_owned()));
        ctx.set_dependencies(deps);

        assert_eq!(ctx.dependency::<String>("db").unwrap(), "connection");
        assert!(matches!(
            ctx.dependency::<u32>("db"),
            Err(DependencyError::TypeMismatch { .. })
        ));
        assert!(matches!(
            ctx.dependency::<String>("missing"),
            Err(DependencyError::NotFound { .. })
        ));
    }

    #[test]
    fn json_body_deserializes() {
        let raw = b"POST / HTTP/1.1\r\nHost: x\r\nContent-Length: 11\r\n\r\n{\"id\": 42}\n";
        let (req, _) = Request::parse(raw).unwrap();
        let ctx = Context::new(req);
        let value: serde_json::Value = ctx.json().unwrap();
        assert_eq!(value["id"], 42);
    }
}
