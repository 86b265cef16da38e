//! Report rendering - turns a run's item set into Markdown

use std::collections::{BTreeMap, HashMap};

use time::OffsetDateTime;

use crate::{
    dates::parse_timestamp,
    model::{Platform, StoredItem},
};

/// Latest item key per subscription URL, as shown in the previous digest
pub type DigestSnapshot = BTreeMap<String, String>;

/// Configuration for the renderer
#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Category display order; categories not listed follow alphabetically
    pub categories: Vec<String>,
    /// Characters of description shown per item
    pub description_preview: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            categories: ["Tech", "Culture", "Design", "Entertainment", "Other"]
                .into_iter()
                .map(String::from)
                .collect(),
            description_preview: 200,
        }
    }
}

/// A rendered digest plus the snapshot to persist for the next comparison
#[derive(Debug, Clone)]
pub struct DigestReport {
    pub markdown: String,
    pub snapshot: DigestSnapshot,
    /// Subscription URLs whose latest item changed since the previous digest
    pub changed: Vec<String>,
}

/// Markdown renderer for update reports
pub struct ReportRenderer {
    config: ReportConfig,
}

impl ReportRenderer {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    /// Report for a run that produced nothing
    pub fn render_empty(&self, generated_at: OffsetDateTime) -> String {
        format!(
            "# Update Report\n\n**Generated**: {}\n\n**Status**: no new content\n\nThis update found no new content.\n\n---\n*Generated by feedloom*\n",
            format_datetime(generated_at)
        )
    }

    /// Full report: new items grouped by category, with platform breakdown
    pub fn render_full(&self, items: &[StoredItem], generated_at: OffsetDateTime) -> String {
        if items.is_empty() {
            return self.render_empty(generated_at);
        }

        let mut by_category: HashMap<&str, Vec<&StoredItem>> = HashMap::new();
        for item in items {
            by_category.entry(item.category.as_str()).or_default().push(item);
        }
        let categories = self.ordered_categories(by_category.keys().copied());

        let mut lines = vec![
            "# Update Report".to_string(),
            String::new(),
            format!("**Generated**: {}", format_datetime(generated_at)),
            String::new(),
            format!("**New items**: {}", items.len()),
            String::new(),
            "## Contents".to_string(),
            String::new(),
        ];

        for category in &categories {
            lines.push(format!(
                "- [{}](#{}) ({})",
                category,
                anchor(category),
                by_category[category.as_str()].len()
            ));
        }
        lines.extend(["".into(), "---".into(), "".into()]);

        for category in &categories {
            let group = &by_category[category.as_str()];
            lines.push(format!("## {}", category));
            lines.push(String::new());
            lines.push(format!("*{} new*", group.len()));
            lines.push(String::new());
            for item in group {
                lines.extend(self.format_item(item));
            }
            lines.extend(["---".into(), "".into()]);
        }

        lines.extend([
            "## Statistics".into(),
            "".into(),
            "| Category | Count |".into(),
            "|----------|-------|".into(),
        ]);
        for category in &categories {
            lines.push(format!(
                "| {} | {} |",
                category,
                by_category[category.as_str()].len()
            ));
        }
        lines.push(String::new());

        let mut by_platform: HashMap<Option<Platform>, usize> = HashMap::new();
        for item in items {
            *by_platform.entry(item.platform).or_default() += 1;
        }
        let mut platforms: Vec<_> = by_platform.into_iter().collect();
        platforms.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        lines.extend([
            "### Platforms".into(),
            "".into(),
            "| Platform | Count |".into(),
            "|----------|-------|".into(),
        ]);
        for (platform, count) in platforms {
            lines.push(format!(
                "| {} {} | {} |",
                platform_icon(platform),
                platform.map(|p| p.display_name()).unwrap_or("Unknown"),
                count
            ));
        }
        lines.extend(["".into(), "---".into(), "*Generated by feedloom*".into()]);

        lines.join("\n")
    }

    /// Digest: one line per subscription with its latest item, marking the
    /// subscriptions whose latest item differs from `previous`
    pub fn render_digest(
        &self,
        items: &[StoredItem],
        previous: &DigestSnapshot,
        generated_at: OffsetDateTime,
    ) -> DigestReport {
        let mut latest: Vec<(String, &StoredItem)> = Vec::new();
        for item in items {
            let account = item
                .subscription_url
                .clone()
                .unwrap_or_else(|| format!("subscription:{}", item.subscription_id));
            if !latest.iter().any(|(url, _)| url == &account) {
                latest.push((account, item));
            }
        }

        let mut snapshot = DigestSnapshot::new();
        let mut changed = Vec::new();
        for (account, item) in &latest {
            snapshot.insert(account.clone(), item.key.to_string());
            if previous.get(account) != Some(&item.key.to_string()) {
                changed.push(account.clone());
            }
        }

        let stamp = format_datetime(generated_at);
        let header = if changed.is_empty() {
            format!("Update digest | {} | nothing new", &stamp[..16])
        } else {
            format!(
                "Update digest | {} | {} accounts with new content",
                &stamp[..16],
                changed.len()
            )
        };

        let mut lines = vec![header, String::new()];
        for (account, item) in &latest {
            let tag = if changed.contains(account) { "[new] " } else { "" };
            let name = item
                .subscription_title
                .as_deref()
                .filter(|t| !t.is_empty() && !t.contains("Subscription"))
                .or_else(|| item.platform.map(|p| p.display_name()))
                .unwrap_or("Unknown");
            let date = short_date(&item.pub_date)
                .map(|d| format!("  {}", d))
                .unwrap_or_default();

            lines.push(format!("{}{} {}{}", tag, platform_icon(item.platform), name, date));
            if item.link.is_empty() {
                lines.push(format!("   {}", item.title));
            } else {
                lines.push(format!("   [{}]({})", item.title, item.link));
            }
            lines.push(String::new());
        }

        DigestReport {
            markdown: lines.join("\n"),
            snapshot,
            changed,
        }
    }

    fn format_item(&self, item: &StoredItem) -> Vec<String> {
        let icon = platform_icon(item.platform);
        let mut lines = vec![if item.link.is_empty() {
            format!("### {} {}", icon, item.title)
        } else {
            format!("### {} [{}]({})", icon, item.title, item.link)
        }];
        lines.push(String::new());

        if !item.description.is_empty() {
            lines.push(format!(
                "> {}",
                preview(&item.description, self.config.description_preview)
            ));
            lines.push(String::new());
        }

        let mut meta = Vec::new();
        if let Some(platform) = item.platform {
            meta.push(format!("**Platform**: {}", platform.display_name()));
        }
        if let Some(dt) = parse_timestamp(&item.pub_date) {
            meta.push(format!("**Published**: {}", &format_datetime(dt)[..16]));
        }
        if !meta.is_empty() {
            lines.push(meta.join(" | "));
            lines.push(String::new());
        }

        lines
    }

    fn ordered_categories<'a>(&self, present: impl Iterator<Item = &'a str>) -> Vec<String> {
        let present: Vec<&str> = present.collect();
        let mut ordered: Vec<String> = self
            .config
            .categories
            .iter()
            .filter(|c| present.contains(&c.as_str()))
            .cloned()
            .collect();

        let mut rest: Vec<String> = present
            .into_iter()
            .filter(|c| !self.config.categories.iter().any(|k| k == c))
            .map(String::from)
            .collect();
        rest.sort();
        ordered.extend(rest);
        ordered
    }
}

fn platform_icon(platform: Option<Platform>) -> &'static str {
    match platform {
        Some(Platform::Bilibili) => "📺",
        Some(Platform::Xiaohongshu) => "📕",
        Some(Platform::Weibo) => "📱",
        Some(Platform::Youtube) => "🎬",
        Some(Platform::Vimeo) => "🎥",
        Some(Platform::Behance) => "🎨",
        Some(Platform::Douyin) => "🎵",
        Some(Platform::Twitter) => "🐦",
        Some(Platform::Zsxq) => "🪐",
        None => "🔗",
    }
}

fn format_datetime(dt: OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        dt.year(),
        u8::from(dt.month()),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second()
    )
}

/// `MM-DD HH:MM` for canonical dates, the leading date part otherwise
fn short_date(raw: &str) -> Option<String> {
    if let Some(dt) = parse_timestamp(raw) {
        return Some(format!(
            "{:02}-{:02} {:02}:{:02}",
            u8::from(dt.month()),
            dt.day(),
            dt.hour(),
            dt.minute()
        ));
    }
    (raw.chars().count() >= 10).then(|| raw.chars().take(10).collect())
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

fn anchor(heading: &str) -> String {
    heading.to_lowercase().replace(' ', "-")
}
