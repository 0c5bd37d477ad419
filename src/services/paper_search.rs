//! 论文检索服务 - 业务能力层
//!
//! 只负责"按主题检索论文元数据"能力，基于 arXiv Atom API

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::FetchError;
use crate::models::PaperDescriptor;

const USER_AGENT: &str = "paper_digest/0.1 (research digest)";

/// 论文元数据来源
#[async_trait]
pub trait PaperSource: Send + Sync {
    /// 按主题检索，返回按相关度排序的论文（最多 `max_results` 篇）
    async fn search(
        &self,
        topic: &str,
        max_results: usize,
    ) -> Result<Vec<PaperDescriptor>, FetchError>;
}

/// arXiv 检索
pub struct ArxivSearch {
    client: reqwest::Client,
    api_url: String,
}

impl ArxivSearch {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::RequestFailed {
                endpoint: config.arxiv_api_url.clone(),
                source: e,
            })?;
        Ok(Self {
            client,
            api_url: config.arxiv_api_url.clone(),
        })
    }
}

#[async_trait]
impl PaperSource for ArxivSearch {
    async fn search(
        &self,
        topic: &str,
        max_results: usize,
    ) -> Result<Vec<PaperDescriptor>, FetchError> {
        let url = build_search_url(&self.api_url, topic, max_results);
        debug!("arXiv 检索地址: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::RequestFailed {
                endpoint: self.api_url.clone(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::BadStatus {
                endpoint: self.api_url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(|e| FetchError::RequestFailed {
            endpoint: self.api_url.clone(),
            source: e,
        })?;

        let mut papers = parse_feed(&body)?;
        papers.truncate(max_results);
        info!("arXiv 返回 {} 篇论文", papers.len());
        Ok(papers)
    }
}

/// 构建检索地址（按相关度降序）
pub fn build_search_url(api_url: &str, topic: &str, max_results: usize) -> String {
    let search_query = format!("all:{}", topic.trim());
    format!(
        "{}?search_query={}&start=0&max_results={}&sortBy=relevance&sortOrder=descending",
        api_url,
        urlencoding::encode(&search_query),
        max_results,
    )
}

/// 解析 Atom feed
///
/// 没有 `<feed` 根元素视为解析失败；没有 entry 返回空列表
pub fn parse_feed(xml: &str) -> Result<Vec<PaperDescriptor>, FetchError> {
    if !xml.contains("<feed") {
        return Err(FetchError::Parse("响应不是 Atom feed".to_string()));
    }

    Ok(extract_entries(xml)
        .iter()
        .filter_map(|entry| parse_entry(entry))
        .collect())
}

fn extract_entries(xml: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut search_from = 0;

    while let Some(pos) = xml[search_from..].find("<entry>") {
        let start = search_from + pos;
        let Some(end_pos) = xml[start..].find("</entry>") else {
            break;
        };
        let end = start + end_pos + "</entry>".len();
        entries.push(&xml[start..end]);
        search_from = end;
    }

    entries
}

fn parse_entry(entry: &str) -> Option<PaperDescriptor> {
    let id_url = extract_tag_text(entry, "id")?;
    // arXiv 在查询出错时返回一个 id 指向 api/errors 的 entry
    if id_url.contains("/api/errors") {
        debug!("跳过 arXiv 错误条目: {}", id_url);
        return None;
    }
    let identifier = extract_arxiv_id(&id_url);
    let title = normalize_whitespace(&extract_tag_text(entry, "title")?);
    let abstract_text = normalize_whitespace(&extract_tag_text(entry, "summary").unwrap_or_default());
    let published = extract_tag_text(entry, "published").filter(|p| !p.is_empty());

    let mut authors = Vec::new();
    let mut author_search = 0;
    while let Some(pos) = entry[author_search..].find("<author>") {
        let author_start = author_search + pos;
        let Some(end_pos) = entry[author_start..].find("</author>") else {
            break;
        };
        let author_end = author_start + end_pos + "</author>".len();
        if let Some(name) = extract_tag_text(&entry[author_start..author_end], "name") {
            authors.push(normalize_whitespace(&name));
        }
        author_search = author_end;
    }

    let mut locator = None;
    let mut link_search = 0;
    while let Some(pos) = entry[link_search..].find("<link") {
        let link_start = link_search + pos;
        let Some(end_pos) = entry[link_start..].find('>') else {
            break;
        };
        let link_end = link_start + end_pos + 1;
        let link_tag = &entry[link_start..link_end];
        let is_pdf = extract_attribute(link_tag, "title").as_deref() == Some("pdf")
            || extract_attribute(link_tag, "type").as_deref() == Some("application/pdf");
        if is_pdf {
            locator = extract_attribute(link_tag, "href");
        }
        link_search = link_end;
    }
    let locator = locator.unwrap_or_else(|| format!("https://arxiv.org/pdf/{}", identifier));

    Some(PaperDescriptor {
        title,
        authors,
        abstract_text,
        identifier,
        locator,
        published,
    })
}

fn extract_tag_text(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);

    let start_pos = xml.find(&open)?;
    let content_start = xml[start_pos..].find('>')? + start_pos + 1;
    let content_end = xml[content_start..].find(&close)? + content_start;

    Some(decode_entities(xml[content_start..content_end].trim()))
}

fn extract_attribute(tag: &str, attr: &str) -> Option<String> {
    let search = format!("{}=\"", attr);
    let start = tag.find(&search)? + search.len();
    let end = tag[start..].find('"')? + start;
    Some(tag[start..end].to_string())
}

/// `http://arxiv.org/abs/1706.03762v7` → `1706.03762v7`
pub fn extract_arxiv_id(url: &str) -> String {
    if let Some(pos) = url.rfind("/abs/") {
        url[pos + 5..].to_string()
    } else if let Some(pos) = url.rfind("/pdf/") {
        url[pos + 5..].trim_end_matches(".pdf").to_string()
    } else {
        url.to_string()
    }
}

pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query: search_query=all:graph neural networks</title>
  <entry>
    <id>http://arxiv.org/abs/1812.08434v6</id>
    <published>2018-12-20T15:33:18Z</published>
    <title>Graph Neural Networks: A Review of
      Methods and Applications</title>
    <summary>  Lots of learning tasks require dealing with graph data
      which contains rich relation information. </summary>
    <author><name>Jie Zhou</name></author>
    <author><name>Ganqu Cui</name></author>
    <link href="http://arxiv.org/abs/1812.08434v6" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/1812.08434v6" rel="related" type="application/pdf"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/1901.00596v4</id>
    <title>A Comprehensive Survey on Graph Neural Networks &amp; Beyond</title>
    <summary>Deep learning has revolutionized many machine learning tasks.</summary>
    <author><name>Zonghan Wu</name></author>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed_entries() {
        let papers = parse_feed(SAMPLE_FEED).unwrap();
        assert_eq!(papers.len(), 2);

        let first = &papers[0];
        assert_eq!(first.identifier, "1812.08434v6");
        assert_eq!(
            first.title,
            "Graph Neural Networks: A Review of Methods and Applications"
        );
        assert_eq!(first.authors, vec!["Jie Zhou", "Ganqu Cui"]);
        assert_eq!(first.locator, "http://arxiv.org/pdf/1812.08434v6");
        assert_eq!(first.published.as_deref(), Some("2018-12-20T15:33:18Z"));
        assert!(first.abstract_text.starts_with("Lots of learning tasks"));
    }

    #[test]
    fn test_missing_pdf_link_falls_back() {
        let papers = parse_feed(SAMPLE_FEED).unwrap();
        let second = &papers[1];
        assert_eq!(second.locator, "https://arxiv.org/pdf/1901.00596v4");
        assert_eq!(
            second.title,
            "A Comprehensive Survey on Graph Neural Networks & Beyond"
        );
        assert!(second.published.is_none());
    }

    #[test]
    fn test_empty_feed_and_error_entry() {
        let empty = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>x</title></feed>"#;
        assert!(parse_feed(empty).unwrap().is_empty());

        let error = r#"<feed><entry><id>http://arxiv.org/api/errors#incorrect_id_format</id><title>Error</title></entry></feed>"#;
        assert!(parse_feed(error).unwrap().is_empty());
    }

    #[test]
    fn test_non_feed_is_parse_error() {
        assert!(matches!(
            parse_feed("<html>rate limited</html>"),
            Err(FetchError::Parse(_))
        ));
    }

    #[test]
    fn test_build_search_url() {
        let url = build_search_url("http://export.arxiv.org/api/query", "graph neural networks", 3);
        assert!(url.starts_with("http://export.arxiv.org/api/query?search_query=all%3Agraph%20neural%20networks"));
        assert!(url.contains("max_results=3"));
        assert!(url.contains("sortBy=relevance"));
    }

    #[test]
    fn test_extract_arxiv_id() {
        assert_eq!(extract_arxiv_id("http://arxiv.org/abs/1706.03762v7"), "1706.03762v7");
        assert_eq!(extract_arxiv_id("https://arxiv.org/pdf/1706.03762.pdf"), "1706.03762");
        assert_eq!(extract_arxiv_id("1706.03762"), "1706.03762");
    }

    #[tokio::test]
    #[ignore]
    async fn test_real_arxiv_search() {
        let search = ArxivSearch::new(&Config::default()).unwrap();
        let papers = search.search("graph neural networks", 2).await.unwrap();
        assert!(!papers.is_empty());
    }
}
