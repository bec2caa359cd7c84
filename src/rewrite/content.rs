//! Body rewriting.
//!
//! Two ordered passes of literal byte-substring replacement:
//! 1. `target_domain + "/"` becomes `"/"` (root-relative self links)
//! 2. each secondary domain `D` becomes `"/_EXTERNAL_?EXTERNAL_URL=" + D`
//!
//! Each pass is a single Aho-Corasick scan. In pass 2 all secondary domains
//! share one automaton; where several match at the same offset the longest
//! is taken.
//!
//! There is no markup awareness: a domain string inside unrelated text is
//! rewritten too. Bodies are treated as bytes so non-UTF-8 payloads pass
//! through untouched apart from the matched substrings.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, BuildError, MatchKind};

use crate::config::MirrorConfig;

/// Path and control parameter of the external-proxy route, as emitted into
/// rewritten bodies.
pub const EXTERNAL_ROUTE_PREFIX: &str = "/_EXTERNAL_?EXTERNAL_URL=";

/// Post-processes a buffered upstream body.
pub trait ContentRewriter: Send + Sync {
    fn rewrite(&self, body: &[u8]) -> Vec<u8>;
}

/// Plain substring rewriter.
#[derive(Debug, Clone)]
pub struct SubstringRewriter {
    target: Option<Pass>,
    secondary: Option<Pass>,
}

/// One scan over the body with a set of literal needles, each with its own
/// replacement (indexed by pattern id).
#[derive(Debug, Clone)]
struct Pass {
    automaton: AhoCorasick,
    replacements: Vec<Vec<u8>>,
}

impl Pass {
    fn build(needles: &[&str], replacements: Vec<Vec<u8>>) -> Result<Option<Self>, BuildError> {
        if needles.is_empty() {
            return Ok(None);
        }
        // Longest wins so a domain that extends another is matched whole.
        let automaton = AhoCorasickBuilder::new()
            .match_kind(MatchKind::LeftmostLongest)
            .build(needles)?;
        Ok(Some(Self {
            automaton,
            replacements,
        }))
    }

    /// Replace every match, skipping those immediately preceded by
    /// `skip_after`.
    fn apply(&self, haystack: &[u8], skip_after: Option<&[u8]>) -> Vec<u8> {
        let mut out = Vec::with_capacity(haystack.len());
        let mut copied = 0;

        for found in self.automaton.find_iter(haystack) {
            if skip_after.is_some_and(|guard| haystack[..found.start()].ends_with(guard)) {
                continue;
            }
            out.extend_from_slice(&haystack[copied..found.start()]);
            out.extend_from_slice(&self.replacements[found.pattern().as_usize()]);
            copied = found.end();
        }

        out.extend_from_slice(&haystack[copied..]);
        out
    }
}

impl SubstringRewriter {
    pub fn new(config: &MirrorConfig) -> Result<Self, BuildError> {
        let target_prefix = format!("{}/", config.target_domain);
        let target = if config.target_domain.is_empty() {
            None
        } else {
            Pass::build(&[target_prefix.as_str()], vec![b"/".to_vec()])?
        };

        let domains: Vec<&str> = config
            .secondary_domains
            .iter()
            .map(String::as_str)
            .filter(|domain| !domain.is_empty())
            .collect();
        let replacements = domains
            .iter()
            .map(|domain| format!("{EXTERNAL_ROUTE_PREFIX}{domain}").into_bytes())
            .collect();
        let secondary = Pass::build(&domains, replacements)?;

        Ok(Self { target, secondary })
    }
}

impl ContentRewriter for SubstringRewriter {
    fn rewrite(&self, body: &[u8]) -> Vec<u8> {
        let out = match &self.target {
            Some(pass) => pass.apply(body, None),
            None => body.to_vec(),
        };

        match &self.secondary {
            // Occurrences already routed through the external endpoint stay
            // as they are, so rewriting twice changes nothing.
            Some(pass) => pass.apply(&out, Some(EXTERNAL_ROUTE_PREFIX.as_bytes())),
            None => out,
        }
    }
}
