//! 报告编译
//!
//! 把所有成功论文的片段按检索排名拼成一个 Markdown 文件

use crate::workflow::PaperAnalysisState;

/// 报告文件名后缀
pub const REPORT_SUFFIX: &str = "_summaries.md";

/// 由主题生成确定的文件名
///
/// 保留 ASCII 字母数字，其余字符的连续片段折叠为一个 `_`
pub fn report_file_name(topic: &str) -> String {
    let mut slug = String::with_capacity(topic.len());
    for c in topic.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_matches('_');
    let slug = if slug.is_empty() { "digest" } else { slug };
    format!("{}{}", slug, REPORT_SUFFIX)
}

/// 编译最终报告
///
/// 只收录已生成片段的记录；`requested` 为本次实际请求的论文数
pub fn compile_report(
    topic: &str,
    states: &[PaperAnalysisState],
    requested: usize,
    generated_at: &str,
) -> String {
    let mut ordered: Vec<&PaperAnalysisState> =
        states.iter().filter(|s| s.report().is_some()).collect();
    ordered.sort_by_key(|s| s.rank());

    let mut out = format!(
        "# Research digest: {}\n\nGenerated: {}\n\nPapers included: {} of {}\n\n**Contents**\n\n",
        topic.trim(),
        generated_at,
        ordered.len(),
        requested
    );
    for (i, state) in ordered.iter().enumerate() {
        let title = state.descriptor().title.split_whitespace().collect::<Vec<_>>().join(" ");
        out.push_str(&format!("{}. [{}](#{})\n", i + 1, title, heading_anchor(&title)));
    }

    let fragments: Vec<&str> = ordered.iter().filter_map(|s| s.report()).collect();
    out.push_str("\n---\n\n");
    out.push_str(&fragments.join("\n---\n\n"));
    out
}

/// GitHub 风格的标题锚点
fn heading_anchor(title: &str) -> String {
    title
        .trim_start_matches(['#', ' '])
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                Some(c.to_lowercase().collect::<String>())
            } else if c == ' ' {
                Some("-".to_string())
            } else {
                None
            }
        })
        .collect()
}
