//! Prompt construction for the trend summary.
//!
//! The prompt has three parts:
//! 1. fixed instructions (flowing prose of 300 to 500 characters, no lists,
//!    cite the source platform of every item, weight items seen on several
//!    platforms, close with the most widely covered items)
//! 2. the [`PLATFORM_NAMES`] table, so the model writes site names instead of
//!    API identifiers
//! 3. the collected topics, one `【platform】` block per platform with
//!    `rank. title` lines

use crate::models::TopicSet;
use itertools::Itertools;
use std::fmt::Write;

/// A hot-search source known to the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformName {
    /// Display name of the site.
    pub site: &'static str,
    /// Which listing of the site is served.
    pub category: &'static str,
    /// Identifier used in the proxy URL.
    pub id: &'static str,
}

const fn platform(site: &'static str, category: &'static str, id: &'static str) -> PlatformName {
    PlatformName { site, category, id }
}

pub const PLATFORM_NAMES: [PlatformName; 45] = [
    platform("哔哩哔哩", "热门榜", "bilibili"),
    platform("AcFun", "排行榜", "acfun"),
    platform("微博", "热搜榜", "weibo"),
    platform("知乎", "热榜", "zhihu"),
    platform("知乎日报", "推荐榜", "zhihu-daily"),
    platform("百度", "热搜榜", "baidu"),
    platform("抖音", "热点榜", "douyin"),
    platform("快手", "热点榜", "kuaishou"),
    platform("豆瓣电影", "新片榜", "douban-movie"),
    platform("豆瓣讨论小组", "讨论精选", "douban-group"),
    platform("百度贴吧", "热议榜", "tieba"),
    platform("少数派", "热榜", "sspai"),
    platform("IT之家", "热榜", "ithome"),
    platform("IT之家「喜加一」", "最新动态", "ithome-xijiayi"),
    platform("简书", "热门推荐", "jianshu"),
    platform("果壳", "热门文章", "guokr"),
    platform("澎湃新闻", "热榜", "thepaper"),
    platform("今日头条", "热榜", "toutiao"),
    platform("36 氪", "热榜", "36kr"),
    platform("51CTO", "推荐榜", "51cto"),
    platform("CSDN", "排行榜", "csdn"),
    platform("NodeSeek", "最新动态", "nodeseek"),
    platform("稀土掘金", "热榜", "juejin"),
    platform("腾讯新闻", "热点榜", "qq-news"),
    platform("新浪网", "热榜", "sina"),
    platform("新浪新闻", "热点榜", "sina-news"),
    platform("网易新闻", "热点榜", "netease-news"),
    platform("吾爱破解", "榜单", "52pojie"),
    platform("全球主机交流", "榜单", "hostloc"),
    platform("虎嗅", "24小时", "huxiu"),
    platform("酷安", "热榜", "coolapk"),
    platform("虎扑", "步行街热帖", "hupu"),
    platform("爱范儿", "快讯", "ifanr"),
    platform("英雄联盟", "更新公告", "lol"),
    platform("米游社", "最新消息", "miyoushe"),
    platform("原神", "最新消息", "genshin"),
    platform("崩坏3", "最新动态", "honkai"),
    platform("崩坏：星穹铁道", "最新动态", "starrail"),
    platform("微信读书", "飙升榜", "weread"),
    platform("NGA", "热帖", "ngabbs"),
    platform("V2EX", "主题榜", "v2ex"),
    platform("HelloGitHub", "Trending", "hellogithub"),
    platform("中央气象台", "全国气象预警", "weatheralarm"),
    platform("中国地震台", "地震速报", "earthquake"),
    platform("历史上的今天", "月-日", "history"),
];

const INSTRUCTIONS: &str = "请阅读以下来自多个平台的热搜数据，写一篇流畅的总结报告，描述当前网络热门趋势。

要求：
- 用自然流畅的段落形式写作，不要使用分点列表或标题
- 要将趋势分析和具体事实有机结合，尤其要明确指出信源哪个平台、原始内容是什么
- 被多个平台提到的内容重点分析
- 在文末列举出被全网所关注的原始内容
- 全文控制在300-500字，语言专业但易读
- 需要注意平台调用名称和站点名的对应关系，在文中要使用站点名称，不能出现调用名称：";

const CLOSING: &str = "请用中文撰写这篇总结。";

/// Site name for a proxy identifier, if it is in [`PLATFORM_NAMES`].
pub fn site_name(id: &str) -> Option<&'static str> {
    PLATFORM_NAMES.iter().find(|p| p.id == id).map(|p| p.site)
}

/// The identifier table as a markdown table.
pub fn platform_table() -> String {
    let mut table = String::from(
        "| **站点** | **类别** | **调用名称** |\n| -------- | -------- | ------------ |\n",
    );
    let rows = PLATFORM_NAMES
        .iter()
        .map(|p| format!("| {} | {} | {} |", p.site, p.category, p.id))
        .join("\n");
    table.push_str(&rows);
    table
}

/// `【platform】` header followed by `rank. title` lines, per platform.
pub fn format_topics(topics: &TopicSet) -> String {
    let mut out = String::new();
    for (platform, titles) in topics.iter() {
        let _ = writeln!(out, "\n【{platform}】");
        for (rank, title) in titles.iter().enumerate() {
            let _ = writeln!(out, "{}. {title}", rank + 1);
        }
    }
    out
}

pub fn build_prompt(topics: &TopicSet) -> String {
    format!(
        "{INSTRUCTIONS}\n{}\n\n{CLOSING}\n\n{}\n",
        platform_table(),
        format_topics(topics)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sample() -> TopicSet {
        let mut set = TopicSet::new();
        set.insert("weibo", vec!["A".to_string(), "B".to_string()]);
        set.insert("36kr", vec!["C".to_string()]);
        set
    }

    #[test]
    fn test_platform_ids_are_unique() {
        let ids: HashSet<_> = PLATFORM_NAMES.iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), PLATFORM_NAMES.len());
    }

    #[test]
    fn test_site_name_lookup() {
        assert_eq!(site_name("weibo"), Some("微博"));
        assert_eq!(site_name("36kr"), Some("36 氪"));
        assert_eq!(site_name("github"), None);
    }

    #[test]
    fn test_format_topics_ranks_per_platform() {
        assert_eq!(format_topics(&sample()), "\n【weibo】\n1. A\n2. B\n\n【36kr】\n1. C\n");
    }

    #[test]
    fn test_build_prompt_contains_all_parts() {
        let prompt = build_prompt(&sample());
        assert!(prompt.starts_with("请阅读以下来自多个平台的热搜数据"));
        assert!(prompt.contains("300-500字"));
        assert!(prompt.contains("| 微博 | 热搜榜 | weibo |"));
        assert!(prompt.contains("| 历史上的今天 | 月-日 | history |"));
        assert!(prompt.contains("【weibo】\n1. A\n2. B"));
        let table_at = prompt.find("| 微博").unwrap();
        let topics_at = prompt.find("【weibo】").unwrap();
        assert!(table_at < topics_at);
    }
}
