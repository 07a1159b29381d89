//! Robots.txt parser
//!
//! Allow/deny decisions are made by the robotstxt crate's matcher, which
//! selects the group naming our product token (falling back to `*`), applies
//! the longest matching rule and lets `Allow` win a tie. Crawl-delay and
//! sitemaps are not exposed by the matcher, so groups are walked by hand for
//! those.

use robotstxt::DefaultMatcher;

/// One user-agent group, as far as crawl-delay is concerned
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RobotsGroup {
    /// Lowercased product tokens naming this group (`*` for the wildcard)
    pub agents: Vec<String>,

    /// Crawl-delay in seconds, if the group declares one
    pub crawl_delay: Option<f64>,
}

impl RobotsGroup {
    fn names(&self, token: &str) -> bool {
        self.agents.iter().any(|agent| agent == token)
    }
}

/// Parsed robots.txt content
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRobots {
    /// Raw robots.txt content (empty means allow all)
    content: String,
    pub groups: Vec<RobotsGroup>,
    pub sitemaps: Vec<String>,
}

impl ParsedRobots {
    /// Parses raw robots.txt content
    ///
    /// Never fails: lines that cannot be understood are skipped, so garbage
    /// input yields a policy with no rules, which allows everything.
    ///
    /// # Arguments
    ///
    /// * `content` - The raw robots.txt file content
    pub fn parse(content: &str) -> Self {
        let mut parsed = Self {
            content: content.to_string(),
            ..Self::default()
        };
        let mut current: Option<RobotsGroup> = None;
        // True while we are still reading the User-agent lines of a group
        let mut reading_agents = false;

        for line in content.lines() {
            let line = match line.split_once('#') {
                Some((before, _)) => before,
                None => line,
            }
            .trim();
            if line.is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let key = key.trim().to_ascii_lowercase();
            let value = value.trim();

            match key.as_str() {
                "user-agent" => {
                    if !reading_agents {
                        if let Some(group) = current.take() {
                            parsed.groups.push(group);
                        }
                        current = Some(RobotsGroup::default());
                        reading_agents = true;
                    }
                    if let Some(group) = current.as_mut() {
                        group.agents.push(value.to_ascii_lowercase());
                    }
                }
                "allow" | "disallow" => reading_agents = false,
                "crawl-delay" => {
                    reading_agents = false;
                    if let Some(group) = current.as_mut() {
                        group.crawl_delay = value
                            .parse::<f64>()
                            .ok()
                            .filter(|d| d.is_finite() && *d >= 0.0);
                    }
                }
                "sitemap" => {
                    if !value.is_empty() {
                        parsed.sitemaps.push(value.to_string());
                    }
                }
                _ => {}
            }
        }

        if let Some(group) = current {
            parsed.groups.push(group);
        }

        parsed
    }

    /// Selects the groups that apply to `product_token`
    ///
    /// Groups naming the token exactly (case-insensitive) win over the
    /// wildcard group entirely. Several groups naming the same token are
    /// merged.
    pub fn select_groups(&self, product_token: &str) -> Vec<&RobotsGroup> {
        let token = product_token.to_ascii_lowercase();
        let exact: Vec<&RobotsGroup> = self.groups.iter().filter(|g| g.names(&token)).collect();
        if !exact.is_empty() {
            return exact;
        }
        self.groups.iter().filter(|g| g.names("*")).collect()
    }

    /// Checks whether `path` may be fetched by `product_token`
    ///
    /// # Arguments
    ///
    /// * `product_token` - The crawler's robots product token (e.g. "LeadBot")
    /// * `path` - The percent-encoded path and query (e.g. "/team?page=2")
    ///
    /// # Returns
    ///
    /// * `true` - If the path is allowed
    /// * `false` - If the path is disallowed
    ///
    /// # Examples
    ///
    /// ```
    /// use leadcrawl_fetch::robots::ParsedRobots;
    ///
    /// let robots = ParsedRobots::parse("User-agent: *\nDisallow: /a\nAllow: /ab");
    /// assert!(robots.is_allowed("LeadBot", "/ab"));
    /// assert!(!robots.is_allowed("LeadBot", "/a"));
    /// ```
    pub fn is_allowed(&self, product_token: &str, path: &str) -> bool {
        if self.content.trim().is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, product_token, path)
    }

    /// Crawl-delay declared by the selected group, if any
    pub fn crawl_delay(&self, product_token: &str) -> Option<f64> {
        self.select_groups(product_token)
            .into_iter()
            .find_map(|g| g.crawl_delay)
    }
}
