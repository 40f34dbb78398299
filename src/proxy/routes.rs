// src/proxy/routes.rs

/// One prefix → upstream mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Normalized: leading `/`, no trailing `/` (the root route is empty).
    prefix: String,
    upstream: String,
}

impl Route {
    pub fn new(prefix: &str, upstream: &str) -> Self {
        let trimmed = prefix.trim().trim_matches('/');
        let prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        };
        Self {
            prefix,
            upstream: upstream.trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        if self.prefix.is_empty() { "/" } else { &self.prefix }
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// Remainder of `path` after the prefix, if the prefix matches on a
    /// segment boundary.
    fn strip<'p>(&self, path: &'p str) -> Option<&'p str> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest.trim_start_matches('/'))
        } else {
            None
        }
    }
}

/// Prefix routing table; the longest matching prefix wins.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn new(routes: impl IntoIterator<Item = Route>) -> Self {
        let mut routes: Vec<Route> = routes.into_iter().collect();
        // Stable sort keeps declaration order among equal prefixes.
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self { routes }
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Upstream URL for a request path and optional query, or `None` when
    /// no route matches.
    pub fn resolve(&self, path: &str, query: Option<&str>) -> Option<String> {
        self.routes.iter().find_map(|route| {
            let rest = route.strip(path)?;
            let mut url = format!("{}/{}", route.upstream, rest);
            if let Some(q) = query.filter(|q| !q.is_empty()) {
                url.push('?');
                url.push_str(q);
            }
            Some(url)
        })
    }
}
