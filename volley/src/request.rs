//! Request descriptors and the builders that produce one per iteration.
use std::collections::BTreeMap;

use bytes::Bytes;
use http::Method;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigError, ParamError},
    param::ParamStrategy,
};

/// A cookie attached to a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub value: String,
    /// Whether this cookie overwrites an earlier cookie of the same name.
    pub replace: bool,
}

impl Cookie {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            replace: true,
        }
    }

    /// A cookie that only applies if no cookie of that name is set yet.
    pub fn keep_existing(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            replace: false,
        }
    }
}

/// One concrete HTTP request. Built fresh for each iteration and owned by the
/// virtual user that built it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    method: Method,
    url: String,
    headers: BTreeMap<String, String>,
    cookies: BTreeMap<String, Cookie>,
    body: Option<Bytes>,
}

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            cookies: BTreeMap::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Adds a cookie, honouring [`Cookie::replace`] when the name is already set.
    pub fn with_cookie(mut self, name: impl Into<String>, cookie: Cookie) -> Self {
        let name = name.into();
        match self.cookies.get(&name) {
            Some(_) if !cookie.replace => {}
            _ => {
                self.cookies.insert(name, cookie);
            }
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn cookies(&self) -> &BTreeMap<String, Cookie> {
        &self.cookies
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Value for a `Cookie` header, or `None` when no cookies are attached.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .map(|(name, cookie)| format!("{name}={}", cookie.value))
            .collect();
        Some(pairs.join("; "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A URL with `{name}` placeholders, parsed once and rendered per iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl UrlTemplate {
    pub fn parse(template: &str) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::Template {
            template: template.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) if c.is_ascii_alphanumeric() || c == '_' => name.push(c),
                            Some(_) => return Err(invalid("invalid character in placeholder")),
                            None => return Err(invalid("unclosed `{`")),
                        }
                    }
                    if name.is_empty() {
                        return Err(invalid("empty placeholder"));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name));
                }
                '}' => return Err(invalid("unmatched `}`")),
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Placeholder names in order of appearance.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Interpolates `values` verbatim into the placeholders.
    pub fn render(&self, values: &BTreeMap<String, String>) -> Result<String, ParamError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Placeholder(name) => {
                    let value = values
                        .get(name)
                        .ok_or_else(|| ParamError::UnknownPlaceholder(name.clone()))?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

/// How a single template parameter is generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamSpec {
    /// Integer in the inclusive range.
    IntBetween(i64, i64),
    /// Random alphanumeric string of the given length.
    Alphanumeric(usize),
    Fixed(String),
    /// One of the given values, picked at random.
    OneOf(Vec<String>),
}

impl ParamSpec {
    pub fn generate(&self, params: &mut dyn ParamStrategy) -> Result<String, ParamError> {
        match self {
            ParamSpec::IntBetween(min, max) => {
                params.int_between(*min, *max).map(|v| v.to_string())
            }
            ParamSpec::Alphanumeric(len) => params.alphanumeric(*len),
            ParamSpec::Fixed(value) => Ok(value.clone()),
            ParamSpec::OneOf(values) => {
                let i = params.choose(values.len())?;
                values.get(i).cloned().ok_or(ParamError::EmptyChoice)
            }
        }
    }
}

/// Produces one [`RequestSpec`] per iteration.
///
/// Builders are shared by every virtual user, while each user passes its own
/// [`ParamStrategy`]. Any closure with the matching signature is a builder:
///
/// ```rust
/// use volley::{ParamError, ParamStrategy, RequestBuilder, RequestSpec, ScriptedParams};
///
/// let builder = |p: &mut dyn ParamStrategy| -> Result<RequestSpec, ParamError> {
///     let status = p.int_between(0, 1)?;
///     let is_epic = status == 1;
///     Ok(RequestSpec::get(format!("http://localhost/api/task?status={status}&is_epic={is_epic}")))
/// };
/// let req = builder.build(&mut ScriptedParams::new().ints([1])).unwrap();
/// assert_eq!(req.url(), "http://localhost/api/task?status=1&is_epic=true");
/// ```
pub trait RequestBuilder: Send + Sync {
    fn build(&self, params: &mut dyn ParamStrategy) -> Result<RequestSpec, ParamError>;

    /// Static checks run once before any virtual user starts.
    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }
}

impl<F> RequestBuilder for F
where
    F: Fn(&mut dyn ParamStrategy) -> Result<RequestSpec, ParamError> + Send + Sync,
{
    fn build(&self, params: &mut dyn ParamStrategy) -> Result<RequestSpec, ParamError> {
        self(params)
    }
}

/// A [`RequestBuilder`] that renders a [`UrlTemplate`] from generated parameters
/// and attaches a fixed set of headers, cookies and body.
#[derive(Debug, Clone)]
pub struct TemplateRequest {
    method: Method,
    url: UrlTemplate,
    params: Vec<(String, ParamSpec)>,
    headers: BTreeMap<String, String>,
    cookies: Vec<(String, Cookie)>,
    body: Option<Bytes>,
}

impl TemplateRequest {
    pub fn new(method: Method, url: UrlTemplate) -> Self {
        Self {
            method,
            url,
            params: Vec::new(),
            headers: BTreeMap::new(),
            cookies: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: UrlTemplate) -> Self {
        Self::new(Method::GET, url)
    }

    /// Parameters are generated in the order they are added.
    pub fn param(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.params.push((name.into(), spec));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, cookie: Cookie) -> Self {
        self.cookies.push((name.into(), cookie));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

impl RequestBuilder for TemplateRequest {
    fn build(&self, params: &mut dyn ParamStrategy) -> Result<RequestSpec, ParamError> {
        let mut values = BTreeMap::new();
        for (name, spec) in &self.params {
            values.insert(name.clone(), spec.generate(params)?);
        }

        let mut request = RequestSpec::new(self.method.clone(), self.url.render(&values)?);
        request.headers = self.headers.clone();
        for (name, cookie) in &self.cookies {
            request = request.with_cookie(name.clone(), cookie.clone());
        }
        request.body = self.body.clone();
        Ok(request)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for placeholder in self.url.placeholders() {
            if !self.params.iter().any(|(name, _)| name == placeholder) {
                return Err(ConfigError::Template {
                    template: self.url.as_str().to_string(),
                    reason: format!("no parameter defined for `{{{placeholder}}}`"),
                });
            }
        }
        Ok(())
    }
}
