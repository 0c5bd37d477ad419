use serde::{Deserialize, Serialize};

/// 论文描述信息，检索后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperDescriptor {
    pub title: String,
    /// 作者列表（保持原始顺序）
    pub authors: Vec<String>,
    pub abstract_text: String,
    /// 外部唯一标识，例如 arXiv ID `1706.03762v7`
    pub identifier: String,
    /// 内容地址（PDF URL 或 DOI）
    pub locator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
}

impl PaperDescriptor {
    /// 作者列表的展示文本，超过 `max` 个时省略为 "et al."
    pub fn author_line(&self, max: usize) -> String {
        if self.authors.is_empty() {
            return "Unknown authors".to_string();
        }
        if self.authors.len() > max {
            format!("{} et al.", self.authors[..max].join(", "))
        } else {
            self.authors.join(", ")
        }
    }

    /// 按模板生成阅读页地址
    pub fn reading_url(&self, template: &str) -> String {
        template.replace("{id}", &self.identifier)
    }
}
