use std::fmt;
use std::future::Future;

/// How a single candidate locates an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKind {
    Css,
    Text,
    XPath,
}

/// One candidate matcher. `Text` candidates target clickable controls whose
/// visible label contains the value and are compiled to XPath on use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub kind: SelectorKind,
    pub value: String,
}

impl Selector {
    pub fn css(value: impl Into<String>) -> Self {
        Self {
            kind: SelectorKind::Css,
            value: value.into(),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self {
            kind: SelectorKind::Text,
            value: value.into(),
        }
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self {
            kind: SelectorKind::XPath,
            value: value.into(),
        }
    }

    /// Config entries use `text:`/`xpath:` prefixes; everything else is CSS.
    pub fn parse(spec: &str) -> Self {
        if let Some(rest) = spec.strip_prefix("text:") {
            Selector::text(rest)
        } else if let Some(rest) = spec.strip_prefix("xpath:") {
            Selector::xpath(rest)
        } else {
            Selector::css(spec)
        }
    }

    /// XPath equivalent of this candidate, for the kinds that have one.
    pub fn as_xpath(&self) -> Option<String> {
        match self.kind {
            SelectorKind::Css => None,
            SelectorKind::XPath => Some(self.value.clone()),
            SelectorKind::Text => Some(format!(
                "//*[self::button or self::a or self::input][contains(normalize-space(.), {})]",
                xpath_literal(&self.value)
            )),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            SelectorKind::Css => "css",
            SelectorKind::Text => "text",
            SelectorKind::XPath => "xpath",
        };
        write!(f, "{kind}:{}", self.value)
    }
}

/// Ordered fallback list for one logical element. Declaration order encodes
/// priority: most site-specific first, most generic last. Evaluation stops
/// at the first candidate that matches.
#[derive(Debug, Clone, Default)]
pub struct SelectorChain {
    candidates: Vec<Selector>,
}

impl SelectorChain {
    pub fn new(candidates: Vec<Selector>) -> Self {
        Self { candidates }
    }

    pub fn from_specs(specs: &[String]) -> Self {
        Self {
            candidates: specs.iter().map(|spec| Selector::parse(spec)).collect(),
        }
    }

    pub fn candidates(&self) -> &[Selector] {
        &self.candidates
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Walks the candidates in declared order, returning the first one the
    /// probe accepts. `None` means nothing matched; that is a result, not an
    /// error, and the probe must not have lasting side effects on rejection.
    pub async fn resolve_with<F, Fut>(&self, mut probe: F) -> Option<&Selector>
    where
        F: FnMut(&Selector) -> Fut,
        Fut: Future<Output = bool>,
    {
        for candidate in &self.candidates {
            if probe(candidate).await {
                return Some(candidate);
            }
        }
        None
    }
}

/// XPath has no escape sequence inside string literals; values containing
/// both quote styles need a concat() expression.
fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        format!("'{value}'")
    } else if !value.contains('"') {
        format!("\"{value}\"")
    } else {
        let parts = value
            .split('\'')
            .map(|part| format!("'{part}'"))
            .collect::<Vec<_>>()
            .join(", \"'\", ");
        format!("concat({parts})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reads_kind_prefixes() {
        assert_eq!(Selector::parse("#login"), Selector::css("#login"));
        assert_eq!(Selector::parse("text:Next"), Selector::text("Next"));
        assert_eq!(
            Selector::parse("xpath://button[@type='submit']"),
            Selector::xpath("//button[@type='submit']")
        );
    }

    #[tokio::test]
    async fn resolve_returns_first_matching_candidate() {
        let chain = SelectorChain::new(vec![
            Selector::css("#site-specific"),
            Selector::css(".variant-b"),
            Selector::css("button"),
        ]);
        // Both the second and third candidates would match; priority order
        // must pick the second.
        let resolved = chain
            .resolve_with(|candidate| {
                let hit = candidate.value != "#site-specific";
                async move { hit }
            })
            .await;
        assert_eq!(resolved.map(|s| s.value.as_str()), Some(".variant-b"));
    }

    #[tokio::test]
    async fn resolve_probes_every_candidate_before_giving_up() {
        let chain = SelectorChain::from_specs(&[
            "#a".to_string(),
            "text:Accept".to_string(),
            "xpath://div".to_string(),
        ]);
        let mut probed = Vec::new();
        let resolved = chain
            .resolve_with(|candidate| {
                probed.push(candidate.value.clone());
                async { false }
            })
            .await;
        assert!(resolved.is_none());
        assert_eq!(probed, vec!["#a", "Accept", "//div"]);
    }

    #[tokio::test]
    async fn empty_chain_resolves_to_none() {
        let chain = SelectorChain::default();
        let resolved = chain.resolve_with(|_| async { true }).await;
        assert!(resolved.is_none());
    }

    #[test]
    fn text_candidates_compile_to_contains_xpath() {
        let xpath = Selector::text("I agree").as_xpath().unwrap();
        assert!(xpath.contains("contains(normalize-space(.), 'I agree')"));
        assert!(Selector::css(".foo").as_xpath().is_none());
    }

    #[test]
    fn xpath_literal_handles_embedded_quotes() {
        assert_eq!(xpath_literal("plain"), "'plain'");
        assert_eq!(xpath_literal("it's"), "\"it's\"");
        assert!(xpath_literal("a'b\"c").starts_with("concat("));
    }
}
