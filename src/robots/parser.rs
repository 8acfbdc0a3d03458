//! Robots.txt parser and rule matcher
//!
//! Rules are resolved for one user agent at parse time. Matching is
//! longest-pattern-wins; when an allow and a disallow pattern match with the
//! same length, the disallow wins.

use std::time::Duration;

/// Where a rule set came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotsOrigin {
    /// robots.txt was fetched and parsed
    Fetched,
    /// The server answered 4xx: no restrictions apply
    Missing,
    /// Every fetch attempt failed; the fail policy decided the rules
    Unreachable,
    /// robots.txt handling is switched off in configuration
    Disabled,
}

/// One Allow/Disallow line
#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    allow: bool,
    pattern: String,
}

impl Rule {
    /// Priority of a matching rule: its pattern length
    fn specificity(&self) -> usize {
        self.pattern.len()
    }
}

/// Robots rules applying to this crawler on one domain
#[derive(Debug, Clone)]
pub struct RobotsRules {
    rules: Vec<Rule>,
    crawl_delay: Option<Duration>,
    disallow_all: bool,
    origin: RobotsOrigin,
}

#[derive(Debug, Default)]
struct Group {
    agents: Vec<String>,
    rules: Vec<Rule>,
    crawl_delay: Option<Duration>,
}

impl RobotsRules {
    /// A rule set with no restrictions
    pub fn allow_all(origin: RobotsOrigin) -> Self {
        Self {
            rules: Vec::new(),
            crawl_delay: None,
            disallow_all: false,
            origin,
        }
    }

    /// A rule set refusing every path (fail-closed on an unreachable robots.txt)
    pub fn disallow_all(origin: RobotsOrigin) -> Self {
        Self {
            rules: Vec::new(),
            crawl_delay: None,
            disallow_all: true,
            origin,
        }
    }

    /// Parses robots.txt content for the given user agent
    ///
    /// Group selection: the group(s) naming the longest user-agent token that
    /// occurs in our crawler name (case-insensitive), otherwise the `*`
    /// group(s), otherwise no rules at all.
    ///
    /// # Examples
    ///
    /// ```
    /// use sumi_crawl::robots::RobotsRules;
    ///
    /// let rules = RobotsRules::parse("User-agent: *\nDisallow: /private/", "SumiCrawl");
    /// assert!(rules.is_allowed("/public"));
    /// assert!(!rules.is_allowed("/private/x"));
    /// ```
    pub fn parse(content: &str, user_agent: &str) -> Self {
        let groups = parse_groups(content);
        let agent = user_agent.to_lowercase();

        let best_token = groups
            .iter()
            .flat_map(|g| g.agents.iter())
            .filter(|token| {
                !token.is_empty() && token.as_str() != "*" && agent.contains(token.as_str())
            })
            .max_by_key(|token| token.len())
            .cloned();

        let selected_token = best_token.unwrap_or_else(|| "*".to_string());

        let mut rules = Vec::new();
        let mut crawl_delay = None;
        for group in groups
            .iter()
            .filter(|g| g.agents.iter().any(|a| *a == selected_token))
        {
            rules.extend(group.rules.iter().cloned());
            if crawl_delay.is_none() {
                crawl_delay = group.crawl_delay;
            }
        }

        Self {
            rules,
            crawl_delay,
            disallow_all: false,
            origin: RobotsOrigin::Fetched,
        }
    }

    /// Checks a path (with query) against the rules
    pub fn is_allowed(&self, path: &str) -> bool {
        if self.disallow_all {
            return false;
        }

        let path = if path.is_empty() { "/" } else { path };

        let mut best: Option<&Rule> = None;
        for rule in self.rules.iter().filter(|r| pattern_matches(&r.pattern, path)) {
            best = match best {
                None => Some(rule),
                Some(current) => {
                    let longer = rule.specificity() > current.specificity();
                    let tie_to_disallow = rule.specificity() == current.specificity()
                        && !rule.allow
                        && current.allow;
                    if longer || tie_to_disallow {
                        Some(rule)
                    } else {
                        Some(current)
                    }
                }
            };
        }

        best.map_or(true, |rule| rule.allow)
    }

    /// Crawl-delay declared for our group, if any
    pub fn crawl_delay(&self) -> Option<Duration> {
        self.crawl_delay
    }

    pub fn origin(&self) -> RobotsOrigin {
        self.origin
    }
}

fn parse_groups(content: &str) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    let mut current = Group::default();
    // A user-agent line after rules starts a new group; consecutive
    // user-agent lines share one.
    let mut collecting_agents = false;

    for line in content.lines() {
        let line = match line.find('#') {
            Some(idx) => &line[..idx],
            None => line,
        };
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        match key.as_str() {
            "user-agent" => {
                if !collecting_agents && !current.agents.is_empty() {
                    groups.push(std::mem::take(&mut current));
                }
                current.agents.push(value.to_lowercase());
                collecting_agents = true;
            }
            "allow" | "disallow" => {
                collecting_agents = false;
                if current.agents.is_empty() || value.is_empty() {
                    // An empty Disallow means "nothing disallowed"
                    continue;
                }
                current.rules.push(Rule {
                    allow: key == "allow",
                    pattern: value.to_string(),
                });
            }
            "crawl-delay" => {
                collecting_agents = false;
                if current.agents.is_empty() {
                    continue;
                }
                if let Ok(secs) = value.parse::<f64>() {
                    if secs.is_finite() && secs >= 0.0 {
                        // Out of range saturates; the politeness policy applies its ceiling
                        let delay = Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
                        current.crawl_delay = Some(delay);
                    }
                }
            }
            _ => {}
        }
    }

    if !current.agents.is_empty() {
        groups.push(current);
    }

    groups
}

/// Matches a robots pattern against a path
///
/// Patterns are prefixes; `*` matches any run of characters and a trailing
/// `$` anchors the pattern to the end of the path.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_suffix('$') {
        Some(stripped) => (stripped, true),
        None => (pattern, false),
    };

    let path = path.as_bytes();
    // Path offsets the pattern prefix consumed so far can end at
    let mut positions: Vec<usize> = vec![0];

    for &c in pattern.as_bytes() {
        if c == b'*' {
            let Some(&min) = positions.iter().min() else {
                return false;
            };
            positions = (min..=path.len()).collect();
        } else {
            positions = positions
                .into_iter()
                .filter(|&p| p < path.len() && path[p] == c)
                .map(|p| p + 1)
                .collect();
            positions.dedup();
        }
        if positions.is_empty() {
            return false;
        }
    }

    !anchored || positions.contains(&path.len())
}
