//! 单篇论文的处理记录
//!
//! 字段按 提取 → 分析 → (核查 → 复核分析) → 报告 的顺序逐个填入，
//! 任何时刻已设置的字段都构成一个完成前缀；字段一旦设置就不再修改。

use crate::error::StateError;
use crate::models::{AnalysisResult, Critique, ExtractedContent, PaperDescriptor, Verification};

/// 单个任务的结果：成功返回完整记录，失败返回带论文标识的阶段错误
pub type PaperOutcome = Result<PaperAnalysisState, crate::error::StageError>;

#[derive(Debug, Clone)]
pub struct PaperAnalysisState {
    /// 检索结果中的排名（从 1 开始），报告按此排序
    rank: usize,
    descriptor: PaperDescriptor,
    extraction: Option<ExtractedContent>,
    analysis: Option<AnalysisResult>,
    critique: Option<Critique>,
    refined_analysis: Option<AnalysisResult>,
    report: Option<String>,
}

impl PaperAnalysisState {
    pub fn new(rank: usize, descriptor: PaperDescriptor) -> Self {
        Self {
            rank,
            descriptor,
            extraction: None,
            analysis: None,
            critique: None,
            refined_analysis: None,
            report: None,
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn descriptor(&self) -> &PaperDescriptor {
        &self.descriptor
    }

    pub fn paper_id(&self) -> &str {
        &self.descriptor.identifier
    }

    pub fn extraction(&self) -> Option<&ExtractedContent> {
        self.extraction.as_ref()
    }

    pub fn analysis(&self) -> Option<&AnalysisResult> {
        self.analysis.as_ref()
    }

    pub fn critique(&self) -> Option<&Critique> {
        self.critique.as_ref()
    }

    pub fn refined_analysis(&self) -> Option<&AnalysisResult> {
        self.refined_analysis.as_ref()
    }

    pub fn report(&self) -> Option<&str> {
        self.report.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.report.is_some()
    }

    /// 最终采用的分析结果：有复核结果时用复核结果
    pub fn final_analysis(&self) -> Option<&AnalysisResult> {
        self.refined_analysis.as_ref().or(self.analysis.as_ref())
    }

    /// 核查结果，配上核查时的原始论点（而不是复核后的论点）
    pub fn verification(&self) -> Option<Verification<'_>> {
        match (&self.critique, &self.analysis) {
            (Some(critique), Some(analysis)) => Some(Verification::new(critique, analysis)),
            _ => None,
        }
    }

    pub fn require_extraction(&self) -> Result<&ExtractedContent, StateError> {
        self.extraction.as_ref().ok_or(StateError::MissingPrerequisite {
            field: "analysis",
            requires: "extraction",
        })
    }

    pub fn require_analysis(&self) -> Result<&AnalysisResult, StateError> {
        self.final_analysis().ok_or(StateError::MissingPrerequisite {
            field: "report",
            requires: "analysis",
        })
    }

    pub fn require_critique(&self) -> Result<&Critique, StateError> {
        self.critique.as_ref().ok_or(StateError::MissingPrerequisite {
            field: "refined_analysis",
            requires: "critique",
        })
    }

    pub fn record_extraction(&mut self, content: ExtractedContent) -> Result<(), StateError> {
        self.ensure_open("extraction")?;
        set_once(&mut self.extraction, content, "extraction")
    }

    pub fn record_analysis(&mut self, analysis: AnalysisResult) -> Result<(), StateError> {
        self.ensure_open("analysis")?;
        if self.extraction.is_none() {
            return Err(StateError::MissingPrerequisite {
                field: "analysis",
                requires: "extraction",
            });
        }
        set_once(&mut self.analysis, analysis, "analysis")
    }

    pub fn record_critique(&mut self, critique: Critique) -> Result<(), StateError> {
        self.ensure_open("critique")?;
        if self.analysis.is_none() {
            return Err(StateError::MissingPrerequisite {
                field: "critique",
                requires: "analysis",
            });
        }
        set_once(&mut self.critique, critique, "critique")
    }

    /// 复核分析只能在核查之后记录，且只有一次
    pub fn record_refined_analysis(&mut self, analysis: AnalysisResult) -> Result<(), StateError> {
        self.ensure_open("refined_analysis")?;
        if self.critique.is_none() {
            return Err(StateError::MissingPrerequisite {
                field: "refined_analysis",
                requires: "critique",
            });
        }
        set_once(&mut self.refined_analysis, analysis, "refined_analysis")
    }

    pub fn record_report(&mut self, report: String) -> Result<(), StateError> {
        if self.analysis.is_none() {
            return Err(StateError::MissingPrerequisite {
                field: "report",
                requires: "analysis",
            });
        }
        set_once(&mut self.report, report, "report")
    }

    fn ensure_open(&self, field: &'static str) -> Result<(), StateError> {
        if self.report.is_some() {
            return Err(StateError::Finalized(field));
        }
        Ok(())
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, field: &'static str) -> Result<(), StateError> {
    if slot.is_some() {
        return Err(StateError::AlreadySet(field));
    }
    *slot = Some(value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn descriptor() -> PaperDescriptor {
        PaperDescriptor {
            title: "GNN".to_string(),
            authors: vec!["A".to_string()],
            abstract_text: String::new(),
            identifier: "1812.08434v6".to_string(),
            locator: "http://arxiv.org/pdf/1812.08434v6".to_string(),
            published: None,
        }
    }

    fn content() -> ExtractedContent {
        ExtractedContent {
            source_url: "https://arxiv.org/html/1812.08434v6".to_string(),
            raw_text: "text".to_string(),
            images: Vec::new(),
        }
    }

    fn analysis(tldr: &str) -> AnalysisResult {
        AnalysisResult {
            key_claims: vec!["claim".to_string()],
            metrics: BTreeMap::new(),
            methodology_summary: "method".to_string(),
            derivations: Vec::new(),
            tldr: tldr.to_string(),
            eli5: String::new(),
        }
    }

    #[test]
    fn test_analysis_requires_extraction() {
        let mut state = PaperAnalysisState::new(1, descriptor());
        assert_eq!(
            state.record_analysis(analysis("t")),
            Err(StateError::MissingPrerequisite {
                field: "analysis",
                requires: "extraction"
            })
        );
        assert!(state.analysis().is_none());
    }

    #[test]
    fn test_fields_are_never_overwritten() {
        let mut state = PaperAnalysisState::new(1, descriptor());
        state.record_extraction(content()).unwrap();
        state.record_analysis(analysis("first")).unwrap();

        assert_eq!(
            state.record_analysis(analysis("second")),
            Err(StateError::AlreadySet("analysis"))
        );
        assert_eq!(state.analysis().unwrap().tldr, "first");
    }

    #[test]
    fn test_refined_analysis_is_separate_field() {
        let mut state = PaperAnalysisState::new(2, descriptor());
        state.record_extraction(content()).unwrap();
        state.record_analysis(analysis("original")).unwrap();
        assert!(state.record_refined_analysis(analysis("refined")).is_err());
        assert!(state.verification().is_none());

        state.record_critique(Critique::default()).unwrap();
        let mut refined = analysis("refined");
        refined.key_claims = vec!["reworded claim".to_string()];
        state.record_refined_analysis(refined).unwrap();

        // 核查结果始终对应原始论点
        let verification = state.verification().unwrap();
        assert_eq!(verification.checked_claims, ["claim".to_string()]);

        assert_eq!(state.analysis().unwrap().tldr, "original");
        assert_eq!(state.final_analysis().unwrap().tldr, "refined");
        assert_eq!(
            state.record_refined_analysis(analysis("again")),
            Err(StateError::AlreadySet("refined_analysis"))
        );
    }

    #[test]
    fn test_report_closes_the_record() {
        let mut state = PaperAnalysisState::new(1, descriptor());
        assert!(state.record_report("x".to_string()).is_err());

        state.record_extraction(content()).unwrap();
        state.record_analysis(analysis("t")).unwrap();
        state.record_report("## GNN\n".to_string()).unwrap();

        assert!(state.is_complete());
        assert_eq!(
            state.record_critique(Critique::default()),
            Err(StateError::Finalized("critique"))
        );
    }
}
