/// 渲染得到的图片（不透明二进制 + 标注）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    /// 图注或标签
    pub label: String,
    /// MIME 类型，例如 `image/png`
    pub media_type: String,
    pub data: Vec<u8>,
}

/// 单篇论文的提取结果，只被分析阶段消费一次
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedContent {
    /// 实际读取内容的页面地址
    pub source_url: String,
    pub raw_text: String,
    pub images: Vec<ImagePayload>,
}

impl ExtractedContent {
    pub fn char_count(&self) -> usize {
        self.raw_text.chars().count()
    }
}
