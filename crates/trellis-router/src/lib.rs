//! # Path-pattern routing and history navigation
//!
//! A route table maps path patterns like `/user/:id` to components; a
//! [`History`] stack carries the current [`Location`] and supports push /
//! replace / go navigation with blocking predicates. Matching is pure and
//! deterministic: the first declared record whose constraints pass wins.
//!
//! ```rust
//! use trellis_router::{Location, RouteRecord, match_route};
//!
//! let record = RouteRecord::new("/user/:id");
//! let m = match_route(&record, &Location::new("/user/42")).unwrap();
//! assert!(m.is_exact);
//! assert_eq!(m.params["id"], "42");
//! assert_eq!(m.url, "/user/42");
//! ```
//!
//! Navigation enters the component runtime as an ordinary state source:
//! [`use_route`] keeps a state slot in sync with the history via a
//! subscription effect, so a `push` re-renders exactly like any other
//! state update.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use trellis_core::{Cleanup, Ctx, Deps, Node, Value};

pub mod history;

pub use history::{Blocker, History, HistoryAction, Subscription};

/// One piece of a parsed path pattern.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Segment {
    Literal(String),
    /// `:name` — binds any non-empty location segment under `name`.
    Param(String),
}

/// A path pattern split into segments, plus whether the raw text carried a
/// trailing slash (which only `strict` records care about).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
    trailing_slash: bool,
}

impl RoutePattern {
    pub fn parse(raw: &str) -> Self {
        let segments = raw
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(s.to_string()),
            })
            .collect();
        Self {
            raw: raw.to_string(),
            segments,
            trailing_slash: raw.len() > 1 && raw.ends_with('/'),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

/// A registered route: pattern plus matching constraints.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRecord {
    pub pattern: RoutePattern,
    /// Require the pattern to consume the whole pathname.
    pub exact: bool,
    /// Require a trailing slash in the pattern to be mirrored by the
    /// location (and, with `exact`, vice versa).
    pub strict: bool,
    /// Compare literal segments case-sensitively.
    pub sensitive: bool,
}

impl RouteRecord {
    pub fn new(pattern: &str) -> Self {
        Self {
            pattern: RoutePattern::parse(pattern),
            exact: false,
            strict: false,
            sensitive: false,
        }
    }

    pub fn exact(mut self) -> Self {
        self.exact = true;
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// Where the user currently is. `search` and `hash` are carried verbatim
/// (leading `?`/`#` included) and never parsed into parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub pathname: String,
    pub search: String,
    pub hash: String,
}

impl Location {
    pub fn new(pathname: impl Into<String>) -> Self {
        Self {
            pathname: pathname.into(),
            search: String::new(),
            hash: String::new(),
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = hash.into();
        self
    }

    /// Splits a URL string into pathname, search, and hash. The hash is cut
    /// first, so a `?` inside the fragment stays in the fragment.
    pub fn parse(url: &str) -> Self {
        let (rest, hash) = match url.find('#') {
            Some(i) => (&url[..i], url[i..].to_string()),
            None => (url, String::new()),
        };
        let (pathname, search) = match rest.find('?') {
            Some(i) => (rest[..i].to_string(), rest[i..].to_string()),
            None => (rest.to_string(), String::new()),
        };
        Self {
            pathname,
            search,
            hash,
        }
    }
}

/// The result of testing a location against one route record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteMatch {
    /// Whether the pattern consumed the whole pathname.
    pub is_exact: bool,
    /// Parameter-segment bindings, by name.
    pub params: BTreeMap<String, String>,
    /// The pattern text that matched.
    pub path: String,
    /// The matched prefix of the pathname.
    pub url: String,
}

/// Tests `location` against one record. Literal segments must equal their
/// location counterparts (case-insensitively unless `sensitive`); `:param`
/// segments bind any non-empty segment. A shorter pattern prefix-matches
/// when `exact` is false.
pub fn match_route(record: &RouteRecord, location: &Location) -> Option<RouteMatch> {
    let pat = &record.pattern;
    let loc_segments: Vec<&str> = location
        .pathname
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    if pat.segments.len() > loc_segments.len() {
        return None;
    }
    if record.exact && pat.segments.len() != loc_segments.len() {
        return None;
    }
    if record.strict {
        let loc_trailing = location.pathname.len() > 1 && location.pathname.ends_with('/');
        if pat.trailing_slash && !loc_trailing {
            return None;
        }
        if record.exact && pat.trailing_slash != loc_trailing {
            return None;
        }
    }

    let mut params = BTreeMap::new();
    for (seg, got) in pat.segments.iter().zip(&loc_segments) {
        match seg {
            Segment::Param(name) => {
                params.insert(name.clone(), (*got).to_string());
            }
            Segment::Literal(lit) => {
                let ok = if record.sensitive {
                    lit == got
                } else {
                    lit.eq_ignore_ascii_case(got)
                };
                if !ok {
                    return None;
                }
            }
        }
    }

    let url = if pat.segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", loc_segments[..pat.segments.len()].join("/"))
    };

    Some(RouteMatch {
        is_exact: pat.segments.len() == loc_segments.len(),
        params,
        path: pat.raw.clone(),
        url,
    })
}

/// An ordered route table. `resolve` walks the records in declaration
/// order and stops at the first match.
#[derive(Clone, Debug, Default)]
pub struct Router {
    routes: Vec<RouteRecord>,
    fallback: Option<usize>,
}

impl Router {
    pub fn new(routes: Vec<RouteRecord>) -> Self {
        Self {
            routes,
            fallback: None,
        }
    }

    /// Index of the record served when nothing matches (a "not found"
    /// route). Out-of-range indices are ignored at resolve time.
    pub fn with_fallback(mut self, index: usize) -> Self {
        self.fallback = Some(index);
        self
    }

    /// Replaces the route table. Takes effect on the next resolve.
    pub fn set_routes(&mut self, routes: Vec<RouteRecord>) {
        self.routes = routes;
    }

    pub fn routes(&self) -> &[RouteRecord] {
        &self.routes
    }

    /// First declared record that matches, with its index. Falls back to
    /// the configured fallback record (as a non-exact, parameterless match
    /// over the whole pathname) when nothing matches.
    pub fn resolve(&self, location: &Location) -> Option<(usize, RouteMatch)> {
        for (i, record) in self.routes.iter().enumerate() {
            if let Some(m) = match_route(record, location) {
                return Some((i, m));
            }
        }
        let i = self.fallback?;
        let record = self.routes.get(i)?;
        Some((
            i,
            RouteMatch {
                is_exact: false,
                params: BTreeMap::new(),
                path: record.pattern.raw.clone(),
                url: location.pathname.clone(),
            },
        ))
    }
}

fn location_to_value(loc: &Location) -> Value {
    let mut m = BTreeMap::new();
    m.insert("pathname".to_string(), Value::from(loc.pathname.clone()));
    m.insert("search".to_string(), Value::from(loc.search.clone()));
    m.insert("hash".to_string(), Value::from(loc.hash.clone()));
    Value::Map(m)
}

fn value_to_location(v: &Value) -> Option<Location> {
    let m = v.as_map()?;
    Some(Location {
        pathname: m.get("pathname")?.as_str()?.to_string(),
        search: m.get("search").and_then(Value::as_str).unwrap_or("").to_string(),
        hash: m.get("hash").and_then(Value::as_str).unwrap_or("").to_string(),
    })
}

/// Feeds the current location into a component as ordinary state.
///
/// Keeps a state slot mirroring `history`'s current entry, kept fresh by a
/// run-once subscription effect whose cleanup unsubscribes at unmount.
/// Returns the location together with the router's resolution for it.
pub fn use_route(
    ctx: &mut Ctx,
    router: &Router,
    history: &History,
) -> (Location, Option<RouteMatch>) {
    let (loc_value, handle) = ctx.use_state({
        let history = history.clone();
        move || location_to_value(&history.location())
    });

    let history_for_effect = history.clone();
    ctx.use_effect(Deps::Once, move || {
        let handle = handle.clone();
        let sub = history_for_effect.listen(move |loc, _action| {
            handle.set(location_to_value(loc));
        });
        Ok(Some(Box::new(move || drop(sub)) as Cleanup))
    });

    let location = match value_to_location(&loc_value) {
        Some(loc) => loc,
        None => history.location(),
    };
    let matched = router.resolve(&location).map(|(_, m)| m);
    (location, matched)
}

/// An anchor element whose click handler pushes `to`.
pub fn link(history: &History, to: &str, label: impl Into<String>) -> Node {
    let target = Location::parse(to);
    let history = history.clone();
    Node::element("a")
        .prop("href", to)
        .prop(
            "on_click",
            Value::handler(move |_| {
                history.push(target.clone());
            }),
        )
        .child(Node::text(label))
}
