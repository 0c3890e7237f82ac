//! Trie-based route storage for efficient lookups

use crate::matcher::{Match, PathMatcher};
use crate::pipeline::Endpoint;
use gantry_core::{Error, Result};
use std::collections::HashMap;

/// Node in the route trie
#[derive(Debug, Clone, Default)]
struct TrieNode {
    /// Static children (exact match)
    children: HashMap<String, TrieNode>,

    /// Parameter child (e.g., :id)
    param_child: Option<Box<TrieNode>>,

    /// Wildcard child (e.g., *filepath)
    wildcard_child: Option<Box<TrieNode>>,

    /// Endpoint at this node (if terminal)
    endpoint: Option<Endpoint>,

    /// Path matcher for this node
    matcher: Option<PathMatcher>,
}

/// Trie for storing and matching the routes of one method
#[derive(Debug, Clone)]
pub struct RouteTrie {
    root: TrieNode,
    count: usize,
    case_sensitive: bool,
    strict_routing: bool,
}

impl RouteTrie {
    /// Create a new route trie with case-insensitive, non-strict matching
    pub fn new() -> Self {
        Self::with_options(false, false)
    }

    /// Create a new route trie
    ///
    /// With `strict_routing`, a trailing slash is significant: `/users/`
    /// and `/users` are different routes.
    pub fn with_options(case_sensitive: bool, strict_routing: bool) -> Self {
        Self {
            root: TrieNode::default(),
            count: 0,
            case_sensitive,
            strict_routing,
        }
    }

    fn segments<'a>(&self, path: &'a str) -> Vec<&'a str> {
        let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if self.strict_routing && path.len() > 1 && path.ends_with('/') {
            segments.push("");
        }
        segments
    }

    fn static_key(&self, segment: &str) -> String {
        if self.case_sensitive {
            segment.to_string()
        } else {
            segment.to_ascii_lowercase()
        }
    }

    /// Insert an endpoint into the trie
    pub fn insert(&mut self, endpoint: Endpoint) -> Result<()> {
        let path = endpoint.route.path.clone();
        let segments = self.segments(&path);
        let matcher = PathMatcher::new(normalize(&segments), self.case_sensitive)?;
        let keys: Vec<Option<String>> = segments
            .iter()
            .map(|s| {
                (!s.starts_with(':') && !s.starts_with('*')).then(|| self.static_key(s))
            })
            .collect();

        let mut current = &mut self.root;

        for (segment, key) in segments.iter().zip(keys) {
            current = match key {
                Some(key) => current.children.entry(key).or_default(),
                None if segment.starts_with(':') => {
                    current.param_child.get_or_insert_with(Box::default).as_mut()
                }
                // Wildcard must be terminal; the matcher already checked
                None => current.wildcard_child.get_or_insert_with(Box::default).as_mut(),
            };
        }

        if let Some(existing) = &current.endpoint {
            return Err(Error::Config(format!(
                "Route already exists: {} {} conflicts with {}",
                endpoint.route.method, path, existing.route.path
            )));
        }

        current.matcher = Some(matcher);
        current.endpoint = Some(endpoint);
        self.count += 1;

        Ok(())
    }

    /// Match a path against routes in the trie
    pub fn match_path(&self, path: &str) -> Option<Match> {
        let segments = self.segments(path);

        let mut matches = Vec::new();
        self.match_recursive(&self.root, &segments, 0, &mut matches);

        // Stable sort: ties keep static > param > wildcard discovery order
        matches.sort_by(|a, b| b.endpoint.route.priority.cmp(&a.endpoint.route.priority));
        matches.into_iter().next()
    }

    fn match_recursive(
        &self,
        node: &TrieNode,
        segments: &[&str],
        index: usize,
        matches: &mut Vec<Match>,
    ) {
        if index == segments.len() {
            if let Some(found) = Self::terminal(node, segments, None) {
                matches.push(found);
            }
            return;
        }

        let segment = segments[index];

        // Try static match first
        if let Some(child) = node.children.get(&self.static_key(segment)) {
            self.match_recursive(child, segments, index + 1, matches);
        }

        // Parameters never bind the empty trailing segment
        if !segment.is_empty() {
            if let Some(child) = &node.param_child {
                self.match_recursive(child, segments, index + 1, matches);
            }
        }

        // Wildcard match (lowest priority)
        if let Some(child) = &node.wildcard_child {
            let rest = segments[index..].join("/");
            if let Some(found) = Self::terminal(child, segments, Some(rest)) {
                matches.push(found);
            }
        }
    }

    fn terminal(node: &TrieNode, segments: &[&str], wildcard: Option<String>) -> Option<Match> {
        let endpoint = node.endpoint.as_ref()?;
        let params = node.matcher.as_ref()?.matches(&normalize(segments))?;
        Some(Match {
            endpoint: endpoint.clone(),
            params,
            wildcard,
        })
    }

    /// Get number of routes in the trie
    pub fn len(&self) -> usize {
        self.count
    }

    /// Check if trie is empty
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Get all endpoints from the trie
    pub fn endpoints(&self) -> Vec<Endpoint> {
        let mut endpoints = Vec::with_capacity(self.count);
        Self::collect(&self.root, &mut endpoints);
        endpoints
    }

    fn collect(node: &TrieNode, endpoints: &mut Vec<Endpoint>) {
        if let Some(endpoint) = &node.endpoint {
            endpoints.push(endpoint.clone());
        }

        for child in node.children.values() {
            Self::collect(child, endpoints);
        }

        if let Some(child) = &node.param_child {
            Self::collect(child, endpoints);
        }

        if let Some(child) = &node.wildcard_child {
            Self::collect(child, endpoints);
        }
    }
}

impl Default for RouteTrie {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(segments: &[&str]) -> String {
    format!("/{}", segments.join("/"))
}
