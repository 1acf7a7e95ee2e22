use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Substitutes embedded placeholders in a declared string value.
///
/// Implementations must be side-effect free: resolving the same input twice
/// yields the same output.
pub trait ValueResolver: Send + Sync {
    fn resolve(&self, value: &str) -> String;
}

impl<F> ValueResolver for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn resolve(&self, value: &str) -> String {
        self(value)
    }
}

const PREFIX: &str = "${";
const SUFFIX: u8 = b'}';
const SEPARATOR: char = ':';

/// Resolves `${key}` and `${key:default}` placeholders.
///
/// Keys are looked up in the configured properties first, then (if enabled)
/// in the process environment. Placeholders nest: keys, defaults and looked-up
/// values are themselves resolved, so `${a:${b}}` falls back to the value of
/// `b`. A placeholder with no value and no default, or one that refers back
/// to itself, is left verbatim.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderResolver {
    properties: HashMap<String, String>,
    use_environment: bool,
}

impl PlaceholderResolver {
    pub fn new(properties: HashMap<String, String>) -> Self {
        Self {
            properties,
            use_environment: true,
        }
    }

    /// Disable the environment fallback.
    #[must_use]
    pub fn without_environment(mut self) -> Self {
        self.use_environment = false;
        self
    }

    fn lookup(&self, key: &str) -> Option<String> {
        self.properties.get(key).cloned().or_else(|| {
            if self.use_environment {
                std::env::var(key).ok()
            } else {
                None
            }
        })
    }

    fn parse(&self, value: &str, visiting: &mut HashSet<String>) -> String {
        let mut out = String::with_capacity(value.len());
        let mut rest = value;
        while let Some(start) = rest.find(PREFIX) {
            out.push_str(&rest[..start]);
            let inner = &rest[start + PREFIX.len()..];
            let Some(end) = closing_brace(inner) else {
                out.push_str(&rest[start..]);
                return out;
            };
            let placeholder = &rest[start..start + PREFIX.len() + end + 1];
            out.push_str(&self.resolve_placeholder(&inner[..end], placeholder, visiting));
            rest = &inner[end + 1..];
        }
        out.push_str(rest);
        out
    }

    fn resolve_placeholder(
        &self,
        content: &str,
        placeholder: &str,
        visiting: &mut HashSet<String>,
    ) -> String {
        if !visiting.insert(content.to_owned()) {
            return placeholder.to_owned();
        }

        let key = self.parse(content, visiting);
        let value = self.lookup(key.trim()).or_else(|| {
            key.split_once(SEPARATOR).map(|(key, default)| {
                self.lookup(key.trim())
                    .unwrap_or_else(|| default.to_owned())
            })
        });
        let resolved = match value {
            Some(value) => self.parse(&value, visiting),
            None => placeholder.to_owned(),
        };

        visiting.remove(content);
        resolved
    }
}

/// Byte offset of the `}` closing a placeholder whose body starts `text`.
fn closing_brace(text: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i..].starts_with(PREFIX.as_bytes()) {
            depth += 1;
            i += PREFIX.len();
            continue;
        }
        if bytes[i] == SUFFIX {
            if depth == 0 {
                return Some(i);
            }
            depth -= 1;
        }
        i += 1;
    }
    None
}

impl ValueResolver for PlaceholderResolver {
    fn resolve(&self, value: &str) -> String {
        self.parse(value, &mut HashSet::new())
    }
}

/// Applies an optional [`ValueResolver`] to lock names and duration texts.
///
/// Without a resolver, values pass through unchanged.
#[derive(Clone, Default)]
pub struct NameResolver {
    resolver: Option<Arc<dyn ValueResolver>>,
}

impl NameResolver {
    pub fn new(resolver: Arc<dyn ValueResolver>) -> Self {
        Self {
            resolver: Some(resolver),
        }
    }

    pub fn passthrough() -> Self {
        Self::default()
    }

    pub fn resolve(&self, name: &str) -> String {
        match &self.resolver {
            Some(resolver) => resolver.resolve(name),
            None => name.to_owned(),
        }
    }
}

impl std::fmt::Debug for NameResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameResolver")
            .field("configured", &self.resolver.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props() -> PlaceholderResolver {
        PlaceholderResolver::new(HashMap::from([
            ("env".to_owned(), "prod".to_owned()),
            ("timeout".to_owned(), "PT10M".to_owned()),
        ]))
        .without_environment()
    }

    #[test]
    fn substitutes_known_keys() {
        assert_eq!(props().resolve("${env}-report"), "prod-report");
        assert_eq!(props().resolve("${timeout}"), "PT10M");
    }

    #[test]
    fn uses_default_for_unknown_key() {
        assert_eq!(props().resolve("${region:eu}-job"), "eu-job");
        assert_eq!(props().resolve("${region:}job"), "job");
    }

    #[test]
    fn leaves_unresolvable_placeholder_verbatim() {
        assert_eq!(props().resolve("${missing}-job"), "${missing}-job");
    }

    #[test]
    fn resolution_is_idempotent() {
        let resolver = props();
        let once = resolver.resolve("${env}-${missing}");
        assert_eq!(resolver.resolve(&once), once);
    }

    fn nested() -> PlaceholderResolver {
        PlaceholderResolver::new(HashMap::from([
            ("env".to_owned(), "${region}".to_owned()),
            ("region".to_owned(), "eu".to_owned()),
            ("b".to_owned(), "bee".to_owned()),
            ("loop".to_owned(), "${loop}".to_owned()),
            ("ping".to_owned(), "${pong}".to_owned()),
            ("pong".to_owned(), "${ping}".to_owned()),
        ]))
        .without_environment()
    }

    #[test]
    fn resolves_placeholders_inside_property_values() {
        let resolver = nested();
        let once = resolver.resolve("${env}-report");
        assert_eq!(once, "eu-report");
        assert_eq!(resolver.resolve(&once), once);
    }

    #[test]
    fn resolves_nested_defaults() {
        let resolver = nested();
        assert_eq!(resolver.resolve("${a:${b}}-job"), "bee-job");
        assert_eq!(resolver.resolve("${a:${c:x}}-job"), "x-job");
        assert_eq!(resolver.resolve("${a:${missing}}-job"), "${missing}-job");
    }

    #[test]
    fn resolves_nested_keys() {
        assert_eq!(nested().resolve("${${b}:none}"), "none");
        let resolver = PlaceholderResolver::new(HashMap::from([
            ("which".to_owned(), "env".to_owned()),
            ("env".to_owned(), "prod".to_owned()),
        ]))
        .without_environment();
        assert_eq!(resolver.resolve("${${which}}"), "prod");
    }

    #[test]
    fn self_references_stay_verbatim() {
        let resolver = nested();
        assert_eq!(resolver.resolve("${loop}"), "${loop}");
        let once = resolver.resolve("${ping}-job");
        assert_eq!(once, "${ping}-job");
        assert_eq!(resolver.resolve(&once), once);
    }

    #[test]
    fn unterminated_placeholder_is_kept() {
        assert_eq!(props().resolve("${env}-${region"), "prod-${region");
        assert_eq!(props().resolve("é-${env}-ü"), "é-prod-ü");
    }

    #[test]
    fn passthrough_returns_input() {
        assert_eq!(NameResolver::passthrough().resolve("${env}"), "${env}");
    }

    #[test]
    fn closures_are_resolvers() {
        let resolver = NameResolver::new(Arc::new(|v: &str| v.to_uppercase()));
        assert_eq!(resolver.resolve("job"), "JOB");
    }
}
