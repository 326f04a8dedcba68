//! Model-backed collaborators. All three go through `LlmClient`.

use async_trait::async_trait;
use tracing::info;

use super::extract::extract_text;
use super::prompts::{
    ANALYSIS_PROMPT_TEMPLATE, ANALYSIS_SYSTEM, COVER_LETTER_PROMPT_TEMPLATE,
    COVER_LETTER_SYSTEM, PARSE_PROMPT_TEMPLATE, PARSE_SYSTEM,
};
use super::{CollaboratorError, CoverLetterWriter, ResumeAnalyzer, ResumeParser, UploadedFile};
use crate::llm_client::prompts::{GROUNDING_INSTRUCTION, JSON_ONLY_SYSTEM};
use crate::llm_client::LlmClient;
use crate::models::analysis::{AnalysisFindings, CoverLetterJob};
use crate::models::resume::{PersonalInfo, Resume, ResumeSections};

/// Longest slice of extracted text handed to the parser prompt.
const MAX_PARSE_CHARS: usize = 20_000;

#[derive(Clone)]
pub struct LlmCollaborator {
    llm: LlmClient,
}

impl LlmCollaborator {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl CoverLetterWriter for LlmCollaborator {
    async fn write(
        &self,
        resume: &Resume,
        job: &CoverLetterJob,
    ) -> Result<String, CollaboratorError> {
        let prompt = COVER_LETTER_PROMPT_TEMPLATE
            .replace("{resume_summary}", &resume_summary(resume))
            .replace("{company}", &job.company_name)
            .replace("{position}", &job.position_title)
            .replace("{description}", &job.job_description)
            .replace("{requirements}", &job.requirements.join(", "))
            .replace("{grounding}", GROUNDING_INSTRUCTION);

        let letter = self.llm.complete_text(&prompt, COVER_LETTER_SYSTEM).await?;
        info!(
            "Cover letter written for resume {} ({} at {})",
            resume.id, job.position_title, job.company_name
        );
        Ok(letter)
    }
}

#[async_trait]
impl ResumeAnalyzer for LlmCollaborator {
    async fn analyze(&self, resume: &Resume) -> Result<AnalysisFindings, CollaboratorError> {
        let resume_json = serde_json::to_string_pretty(&resume.sections)
            .map_err(|e| CollaboratorError::InvalidOutput(e.to_string()))?;
        let prompt = ANALYSIS_PROMPT_TEMPLATE.replace("{resume_json}", &resume_json);
        let system = format!("{ANALYSIS_SYSTEM} {JSON_ONLY_SYSTEM}");

        let findings: AnalysisFindings = self.llm.complete_json(&prompt, &system).await?;
        Ok(findings.clamped())
    }
}

#[async_trait]
impl ResumeParser for LlmCollaborator {
    async fn parse(&self, file: &UploadedFile) -> Result<ResumeSections, CollaboratorError> {
        let text = extract_text(file)?;
        let text: String = text.chars().take(MAX_PARSE_CHARS).collect();

        let prompt = PARSE_PROMPT_TEMPLATE.replace("{resume_text}", &text);
        let system = format!("{PARSE_SYSTEM} {JSON_ONLY_SYSTEM}");

        let sections: ResumeSections = self.llm.complete_json(&prompt, &system).await?;
        Ok(normalize_sections(sections))
    }
}

/// The slice of a resume a cover letter needs: identity, pitch, skills and
/// the two most recent roles.
fn resume_summary(resume: &Resume) -> String {
    let sections = &resume.sections;
    let mut out = format!("Name: {}\n", resume.display_name());
    if !sections.summary.trim().is_empty() {
        out.push_str(&format!("Summary: {}\n", sections.summary.trim()));
    }
    if !sections.skills.is_empty() {
        let top: Vec<&str> = sections.skills.iter().take(10).map(String::as_str).collect();
        out.push_str(&format!("Key skills: {}\n", top.join(", ")));
    }
    for role in sections.experience.iter().take(2) {
        out.push_str(&format!(
            "Experience: {} at {} ({} - {}). {}\n",
            role.title, role.company, role.start_date, role.end_date, role.description
        ));
    }
    for edu in &sections.education {
        out.push_str(&format!("Education: {}, {}\n", edu.degree, edu.institution));
    }
    out
}

/// Models fill unknown fields with "" rather than omitting them.
fn normalize_sections(mut sections: ResumeSections) -> ResumeSections {
    fn blank_to_none(value: Option<String>) -> Option<String> {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
    let info = sections.personal_info;
    sections.personal_info = PersonalInfo {
        name: blank_to_none(info.name),
        email: blank_to_none(info.email),
        phone: blank_to_none(info.phone),
        address: blank_to_none(info.address),
        linkedin: blank_to_none(info.linkedin),
        github: blank_to_none(info.github),
    };
    sections.skills.retain(|s| !s.trim().is_empty());
    sections.experience.retain(|e| !(e.title.is_empty() && e.company.is_empty()));
    sections.education.retain(|e| !(e.degree.is_empty() && e.institution.is_empty()));
    sections.certifications.retain(|c| !c.name.is_empty());
    sections.projects.retain(|p| !p.name.is_empty());
    sections.languages.retain(|l| !l.name.is_empty());
    sections
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::resume::ExperienceItem;

    #[test]
    fn test_normalize_drops_blank_placeholders() {
        let parsed: ResumeSections = serde_json::from_str(
            r#"{
                "personal_info": {"name": "Ada Lovelace", "email": "", "phone": "  "},
                "skills": ["Rust", ""],
                "experience": [{"title": "", "company": ""}, {"title": "Engineer", "company": "Acme"}],
                "languages": [{"name": "", "proficiency": ""}]
            }"#,
        )
        .unwrap();

        let sections = normalize_sections(parsed);
        assert_eq!(sections.personal_info.name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(sections.personal_info.email, None);
        assert_eq!(sections.personal_info.phone, None);
        assert_eq!(sections.skills, vec!["Rust"]);
        assert_eq!(sections.experience.len(), 1);
        assert!(sections.languages.is_empty());
    }

    #[test]
    fn test_resume_summary_limits_experience() {
        let mut sections = ResumeSections::default();
        sections.personal_info.name = Some("Grace".into());
        sections.skills = (0..15).map(|i| format!("skill{i}")).collect();
        sections.experience = (0..4)
            .map(|i| ExperienceItem {
                title: format!("Role {i}"),
                company: "Acme".into(),
                ..Default::default()
            })
            .collect();
        let resume = Resume::new("u1".into(), sections);

        let summary = resume_summary(&resume);
        assert!(summary.starts_with("Name: Grace"));
        assert!(summary.contains("skill9"));
        assert!(!summary.contains("skill10"));
        assert!(summary.contains("Role 1"));
        assert!(!summary.contains("Role 2"));
    }
}
