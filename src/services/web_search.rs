//! 网络搜索服务 - 业务能力层
//!
//! 只负责"按查询词搜索外部来源"能力，供 Critic 阶段核对论点

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::config::Config;
use crate::error::SearchError;

/// 一条搜索结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// 网络搜索
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError>;
}

/// DuckDuckGo Instant Answer 搜索
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    api_url: String,
}

impl DuckDuckGoSearch {
    pub fn new(config: &Config) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("paper_digest/0.1")
            .build()?;
        Ok(Self {
            client,
            api_url: config.search_api_url.clone(),
        })
    }
}

#[async_trait]
impl WebSearch for DuckDuckGoSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
        let url = format!(
            "{}?q={}&format=json&no_html=1&skip_disambig=1",
            self.api_url,
            urlencoding::encode(query)
        );
        debug!("网络搜索: {}", query);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::BadStatus(status.as_u16()));
        }

        let body: JsonValue = response.json().await?;
        let hits = parse_instant_answer(&body, max_results);
        debug!("搜索 '{}' 返回 {} 条结果", query, hits.len());
        Ok(hits)
    }
}

/// 解析 Instant Answer 响应：摘要 → Results → RelatedTopics（含分组）
pub fn parse_instant_answer(body: &JsonValue, max_results: usize) -> Vec<SearchHit> {
    let mut hits = Vec::new();

    let abstract_text = str_field(body, "AbstractText");
    let abstract_url = str_field(body, "AbstractURL");
    if !abstract_text.is_empty() && !abstract_url.is_empty() {
        let source = str_field(body, "AbstractSource");
        let heading = str_field(body, "Heading");
        let title = match (heading.is_empty(), source.is_empty()) {
            (false, false) => format!("{} ({})", heading, source),
            (false, true) => heading.to_string(),
            (true, false) => source.to_string(),
            (true, true) => abstract_url.to_string(),
        };
        hits.push(SearchHit {
            title,
            url: abstract_url.to_string(),
            snippet: abstract_text.to_string(),
        });
    }

    let mut topics: Vec<&JsonValue> = Vec::new();
    for key in ["Results", "RelatedTopics"] {
        if let Some(items) = body.get(key).and_then(|v| v.as_array()) {
            for item in items {
                // 分组的 RelatedTopics 带有嵌套的 Topics 数组
                match item.get("Topics").and_then(|v| v.as_array()) {
                    Some(nested) => topics.extend(nested.iter()),
                    None => topics.push(item),
                }
            }
        }
    }

    for topic in topics {
        if hits.len() >= max_results {
            break;
        }
        let text = str_field(topic, "Text");
        let url = str_field(topic, "FirstURL");
        if text.is_empty() || url.is_empty() || hits.iter().any(|h| h.url == url) {
            continue;
        }
        let title = text.split(" - ").next().unwrap_or(text).to_string();
        hits.push(SearchHit {
            title,
            url: url.to_string(),
            snippet: text.to_string(),
        });
    }

    hits.truncate(max_results);
    hits
}

fn str_field<'a>(value: &'a JsonValue, key: &str) -> &'a str {
    value.get(key).and_then(|v| v.as_str()).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_abstract_and_topics() {
        let body = json!({
            "Heading": "Graph neural network",
            "AbstractText": "A graph neural network is a class of neural networks.",
            "AbstractSource": "Wikipedia",
            "AbstractURL": "https://en.wikipedia.org/wiki/Graph_neural_network",
            "Results": [],
            "RelatedTopics": [
                {"Text": "Message passing - A framework for GNNs", "FirstURL": "https://duckduckgo.com/Message_passing"},
                {"Name": "See also", "Topics": [
                    {"Text": "Graph convolution", "FirstURL": "https://duckduckgo.com/Graph_convolution"}
                ]},
                {"Text": "", "FirstURL": "https://duckduckgo.com/empty"}
            ]
        });

        let hits = parse_instant_answer(&body, 5);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].title, "Graph neural network (Wikipedia)");
        assert_eq!(hits[1].title, "Message passing");
        assert_eq!(hits[2].url, "https://duckduckgo.com/Graph_convolution");
    }

    #[test]
    fn test_respects_max_results() {
        let body = json!({
            "RelatedTopics": [
                {"Text": "a", "FirstURL": "https://a"},
                {"Text": "b", "FirstURL": "https://b"},
                {"Text": "c", "FirstURL": "https://c"}
            ]
        });
        assert_eq!(parse_instant_answer(&body, 2).len(), 2);
        assert!(parse_instant_answer(&json!({}), 5).is_empty());
    }
}
