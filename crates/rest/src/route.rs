use std::fmt;

/// HTTP verb of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters that split a route into separate rate-limit buckets
const MAJOR_PARAMS: &[&str] = &["channel", "guild", "webhook"];

/// A REST endpoint with its path parameters bound
///
/// Templates name parameters in braces, e.g. `/channels/{channel}/messages/{message}`.
/// Calls share a bucket when their method and template match and their major
/// parameter (channel, guild or webhook) is the same; minor parameters such as
/// message ids do not split the bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub method: Method,
    pub template: String,
    params: Vec<(String, String)>,
}

impl Route {
    pub fn new(method: Method, template: impl Into<String>) -> Self {
        Route {
            method,
            template: template.into(),
            params: Vec::new(),
        }
    }

    pub fn get(template: impl Into<String>) -> Self {
        Self::new(Method::Get, template)
    }

    pub fn post(template: impl Into<String>) -> Self {
        Self::new(Method::Post, template)
    }

    pub fn delete(template: impl Into<String>) -> Self {
        Self::new(Method::Delete, template)
    }

    /// Bind a path parameter
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    /// The major parameter binding, if the template has one
    pub fn major(&self) -> Option<(&str, &str)> {
        self.params
            .iter()
            .find(|(name, _)| MAJOR_PARAMS.contains(&name.as_str()))
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Key of the bucket this call is admitted through
    pub fn ratelimit_key(&self) -> String {
        let template = match self.major() {
            Some((name, value)) => substitute(&self.template, name, value),
            None => self.template.clone(),
        };
        format!("{} {}", self.method, template)
    }

    /// Request path with every parameter bound
    pub fn path(&self) -> String {
        self.params
            .iter()
            .fold(self.template.clone(), |path, (name, value)| {
                substitute(&path, name, value)
            })
    }
}

fn substitute(template: &str, name: &str, value: &str) -> String {
    template.replace(&format!("{{{}}}", name), value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_keeps_minor_params_unbound() {
        let route = Route::delete("/channels/{channel}/messages/{message}")
            .with_param("channel", "81384788765712384")
            .with_param("message", "1");

        assert_eq!(
            route.ratelimit_key(),
            "DELETE /channels/81384788765712384/messages/{message}"
        );
        assert_eq!(route.path(), "/channels/81384788765712384/messages/1");
    }

    #[test]
    fn test_same_shape_shares_bucket() {
        let a = Route::get("/channels/{channel}/messages/{message}")
            .with_param("channel", "1")
            .with_param("message", "10");
        let b = Route::get("/channels/{channel}/messages/{message}")
            .with_param("channel", "1")
            .with_param("message", "11");
        let c = Route::get("/channels/{channel}/messages/{message}")
            .with_param("channel", "2")
            .with_param("message", "10");

        assert_eq!(a.ratelimit_key(), b.ratelimit_key());
        assert_ne!(a.ratelimit_key(), c.ratelimit_key());
    }

    #[test]
    fn test_route_without_params() {
        let route = Route::get("/gateway/bot");
        assert_eq!(route.major(), None);
        assert_eq!(route.ratelimit_key(), "GET /gateway/bot");
        assert_eq!(route.path(), "/gateway/bot");
    }
}
