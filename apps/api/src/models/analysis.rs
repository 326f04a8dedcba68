use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordOptimization {
    pub recommended_keywords: Vec<String>,
    pub keyword_density: f64,
}

/// What the scoring collaborator returns for a resume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisFindings {
    pub ats_score: f64,
    pub section_scores: BTreeMap<String, f64>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub missing_information: Vec<String>,
    pub suggestions: Vec<String>,
    pub keyword_optimization: KeywordOptimization,
}

impl AnalysisFindings {
    /// Forces every score into 0–100; model output is not trusted to respect the range.
    pub fn clamped(mut self) -> Self {
        self.ats_score = clamp_score(self.ats_score);
        for score in self.section_scores.values_mut() {
            *score = clamp_score(*score);
        }
        self.keyword_optimization.keyword_density =
            clamp_score(self.keyword_optimization.keyword_density);
        self
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeAnalysis {
    pub id: Uuid,
    pub resume_id: Uuid,
    #[serde(flatten)]
    pub findings: AnalysisFindings,
    pub created_at: DateTime<Utc>,
}

/// The job a cover letter is written for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverLetterJob {
    pub company_name: String,
    pub position_title: String,
    pub job_description: String,
    #[serde(default)]
    pub requirements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverLetter {
    pub id: Uuid,
    pub resume_id: Uuid,
    pub company_name: String,
    pub position_title: String,
    pub job_description: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl CoverLetter {
    pub fn new(resume_id: Uuid, job: &CoverLetterJob, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            resume_id,
            company_name: job.company_name.clone(),
            position_title: job.position_title.clone(),
            job_description: job.job_description.clone(),
            content,
            created_at: Utc::now(),
        }
    }
}
