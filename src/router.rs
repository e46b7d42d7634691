//! Maps an agent identity (a "/"-separated path) to a destination channel.
//!
//! The pattern table is held behind an `ArcSwap` so a config-file change can
//! be picked up without a restart, the same way the agent communication graph
//! is reloaded elsewhere in this style of codebase. The override table is
//! mutated at runtime (via chat commands) and takes precedence over whatever
//! the pattern table last loaded.

use arc_swap::ArcSwap;
use std::sync::Arc;

use crate::error::{Result, RouterError};

/// One `pattern -> channel_id` rule. Only whole path segments may be `*`.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub pattern: String,
    pub channel_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match<'a> {
    Override,
    Exact(&'a str),
    Wildcard(&'a str),
    Default,
}

impl Match<'_> {
    pub fn label(&self) -> String {
        match self {
            Match::Override => "(override)".to_string(),
            Match::Exact(p) => p.to_string(),
            Match::Wildcard(p) => p.to_string(),
            Match::Default => "(default)".to_string(),
        }
    }
}

struct Tables {
    patterns: Vec<RouteRule>,
    overrides: Vec<(String, String)>,
}

pub struct Router {
    default_channel: String,
    tables: ArcSwap<Tables>,
}

impl Router {
    pub fn new(default_channel: impl Into<String>) -> Self {
        Self {
            default_channel: default_channel.into(),
            tables: ArcSwap::from_pointee(Tables {
                patterns: Vec::new(),
                overrides: Vec::new(),
            }),
        }
    }

    pub fn with_tables(
        default_channel: impl Into<String>,
        patterns: Vec<RouteRule>,
        overrides: Vec<(String, String)>,
    ) -> Self {
        Self {
            default_channel: default_channel.into(),
            tables: ArcSwap::from_pointee(Tables { patterns, overrides }),
        }
    }

    /// Replaces both tables atomically, for hot config reload.
    pub fn reload(&self, patterns: Vec<RouteRule>, overrides: Vec<(String, String)>) {
        self.tables.store(Arc::new(Tables { patterns, overrides }));
    }

    pub fn add_override(&self, agent: impl Into<String>, channel: impl Into<String>) {
        let agent = agent.into();
        let channel = channel.into();
        let current = self.tables.load();
        let mut overrides: Vec<_> = current
            .overrides
            .iter()
            .filter(|(a, _)| *a != agent)
            .cloned()
            .collect();
        overrides.push((agent, channel));
        self.tables.store(Arc::new(Tables {
            patterns: current.patterns.clone(),
            overrides,
        }));
    }

    pub fn remove_override(&self, agent: &str) {
        let current = self.tables.load();
        let overrides: Vec<_> = current
            .overrides
            .iter()
            .filter(|(a, _)| a != agent)
            .cloned()
            .collect();
        self.tables.store(Arc::new(Tables {
            patterns: current.patterns.clone(),
            overrides,
        }));
    }

    /// Resolves `agent` to `(channel_id, matched_by)`. Precedence: override >
    /// exact pattern > most-specific wildcard (segment count match, then
    /// fewer `*`s wins, ties broken by pattern string) > default.
    pub fn resolve(&self, agent: &str) -> Result<(String, String)> {
        if agent.is_empty() {
            return Err(RouterError::EmptyAgent.into());
        }
        let tables = self.tables.load();

        if let Some((_, channel)) = tables.overrides.iter().find(|(a, _)| a == agent) {
            return Ok((channel.clone(), Match::Override.label()));
        }

        let agent_segments: Vec<&str> = agent.split('/').collect();

        let mut best: Option<(&RouteRule, bool, usize)> = None; // (rule, is_exact, wildcard_count)
        for rule in &tables.patterns {
            let pattern_segments: Vec<&str> = rule.pattern.split('/').collect();
            if pattern_segments.len() != agent_segments.len() {
                continue;
            }
            let mut wildcard_count = 0;
            let mut matches = true;
            for (p, a) in pattern_segments.iter().zip(agent_segments.iter()) {
                if *p == "*" {
                    wildcard_count += 1;
                } else if p != a {
                    matches = false;
                    break;
                }
            }
            if !matches {
                continue;
            }
            let is_exact = wildcard_count == 0;
            let better = match &best {
                None => true,
                Some((best_rule, best_exact, best_wc)) => {
                    if is_exact != *best_exact {
                        is_exact
                    } else if wildcard_count != *best_wc {
                        wildcard_count < *best_wc
                    } else {
                        rule.pattern < best_rule.pattern
                    }
                }
            };
            if better {
                best = Some((rule, is_exact, wildcard_count));
            }
        }

        if let Some((rule, is_exact, _)) = best {
            let label = if is_exact {
                Match::Exact(&rule.pattern)
            } else {
                Match::Wildcard(&rule.pattern)
            };
            return Ok((rule.channel_id.clone(), label.label()));
        }

        if self.default_channel.is_empty() {
            return Err(RouterError::NoDefault.into());
        }
        Ok((self.default_channel.clone(), Match::Default.label()))
    }

    /// Reverse lookup over overrides only; wildcard patterns cannot be
    /// reversed unambiguously.
    pub fn get_agent_by_channel(&self, channel: &str) -> Option<String> {
        self.tables
            .load()
            .overrides
            .iter()
            .find(|(_, c)| c == channel)
            .map(|(a, _)| a.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> Router {
        Router::with_tables(
            "C-DEFAULT",
            vec![
                RouteRule {
                    pattern: "gasboat/crew/*".into(),
                    channel_id: "C-CREW".into(),
                },
                RouteRule {
                    pattern: "*/*/*".into(),
                    channel_id: "C-ANY".into(),
                },
                RouteRule {
                    pattern: "gasboat/crew/ops".into(),
                    channel_id: "C-OPS".into(),
                },
            ],
            vec![("gasboat/crew/bot".into(), "C-OVERRIDE".into())],
        )
    }

    #[test]
    fn override_wins_over_exact() {
        let (channel, matched_by) = router().resolve("gasboat/crew/bot").unwrap();
        assert_eq!(channel, "C-OVERRIDE");
        assert_eq!(matched_by, "(override)");
    }

    #[test]
    fn exact_wins_over_wildcard() {
        let (channel, matched_by) = router().resolve("gasboat/crew/ops").unwrap();
        assert_eq!(channel, "C-OPS");
        assert_eq!(matched_by, "gasboat/crew/ops");
    }

    #[test]
    fn fewer_wildcards_wins() {
        let (channel, _) = router().resolve("gasboat/crew/sre").unwrap();
        assert_eq!(channel, "C-CREW");
    }

    #[test]
    fn falls_back_to_default() {
        let (channel, matched_by) = router().resolve("solo").unwrap();
        assert_eq!(channel, "C-DEFAULT");
        assert_eq!(matched_by, "(default)");
    }

    #[test]
    fn empty_agent_is_invalid_argument() {
        assert!(router().resolve("").is_err());
    }

    #[test]
    fn wildcard_requires_matching_segment_count() {
        let r = Router::with_tables(
            "C-DEFAULT",
            vec![RouteRule {
                pattern: "*/crew/*".into(),
                channel_id: "C-CREW".into(),
            }],
            vec![],
        );
        assert_eq!(r.resolve("gasboat/crew/bot").unwrap().0, "C-CREW");
        assert_eq!(r.resolve("gasboat/crew").unwrap().0, "C-DEFAULT");
    }

    #[test]
    fn reverse_lookup_only_covers_overrides() {
        let r = router();
        assert_eq!(
            r.get_agent_by_channel("C-OVERRIDE"),
            Some("gasboat/crew/bot".to_string())
        );
        assert_eq!(r.get_agent_by_channel("C-CREW"), None);
    }

    #[test]
    fn add_and_remove_override_round_trip() {
        let r = router();
        r.add_override("solo", "C-SOLO");
        assert_eq!(r.resolve("solo").unwrap().0, "C-SOLO");
        r.remove_override("solo");
        assert_eq!(r.resolve("solo").unwrap().0, "C-DEFAULT");
    }
}
