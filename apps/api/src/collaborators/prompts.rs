// Prompt constants for the model-backed collaborators.
// Reuses cross-cutting fragments from llm_client::prompts.

/// System prompt for cover letters. Output is plain prose, not JSON.
pub const COVER_LETTER_SYSTEM: &str =
    "You are an experienced career writer. You write concise, specific cover \
    letters in a professional register. Return only the letter text: no \
    preamble, no markdown, no commentary.";

/// Cover letter prompt. Replace `{resume_summary}`, `{company}`, `{position}`,
/// `{description}` and `{requirements}` before sending.
pub const COVER_LETTER_PROMPT_TEMPLATE: &str = r#"Write a cover letter for the candidate below.

The letter must:
- be three or four paragraphs
- name the company and the role
- connect the candidate's actual experience and skills to the stated requirements
- close with a call to action and the candidate's name

CANDIDATE:
{resume_summary}

JOB:
Company: {company}
Position: {position}
Description: {description}
Requirements: {requirements}

{grounding}"#;

/// System prompt for ATS analysis.
pub const ANALYSIS_SYSTEM: &str =
    "You are an ATS (applicant tracking system) specialist who audits resumes \
    for completeness and keyword coverage.";

/// Analysis prompt. Replace `{resume_json}` before sending.
pub const ANALYSIS_PROMPT_TEMPLATE: &str = r#"Audit the resume below and return a JSON object with this EXACT schema:
{
  "ats_score": 0-100,
  "section_scores": {
    "personal_info": 0-100,
    "summary": 0-100,
    "experience": 0-100,
    "education": 0-100,
    "skills": 0-100,
    "overall_structure": 0-100
  },
  "strengths": ["..."],
  "weaknesses": ["..."],
  "missing_information": ["..."],
  "suggestions": ["..."],
  "keyword_optimization": {
    "recommended_keywords": ["..."],
    "keyword_density": 0-100
  }
}

Every score is a number between 0 and 100. Suggestions must be concrete edits.

RESUME:
{resume_json}"#;

/// System prompt for structuring raw resume text.
pub const PARSE_SYSTEM: &str =
    "You convert raw resume text into structured data without embellishment.";

/// Parse prompt. Replace `{resume_text}` before sending.
pub const PARSE_PROMPT_TEMPLATE: &str = r#"Extract the resume below into a JSON object with this EXACT schema.
Use empty strings or empty arrays for anything the text does not contain.
{
  "personal_info": {"name": "", "email": "", "phone": "", "address": "", "linkedin": "", "github": ""},
  "summary": "",
  "experience": [{"title": "", "company": "", "location": "", "start_date": "", "end_date": "", "description": "", "achievements": []}],
  "education": [{"degree": "", "institution": "", "location": "", "graduation_date": "", "gpa": ""}],
  "skills": [],
  "certifications": [{"name": "", "issuer": "", "date": ""}],
  "projects": [{"name": "", "description": "", "technologies": [], "date": ""}],
  "languages": [{"name": "", "proficiency": ""}]
}

RESUME TEXT:
{resume_text}"#;
