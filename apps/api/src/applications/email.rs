use crate::delivery::transport::OutboundEmail;
use crate::models::job::JobPosting;
use crate::models::resume::Resume;

/// Renders the email sent for one application. The cover letter is the
/// body when there is one; otherwise a short introduction stands in.
pub fn application_email(
    resume: &Resume,
    job: &JobPosting,
    to: &str,
    cover_letter: Option<&str>,
) -> OutboundEmail {
    let subject = format!("Application for {} at {}", job.title, job.company);

    let mut body = match cover_letter.map(str::trim).filter(|l| !l.is_empty()) {
        Some(letter) => letter.to_string(),
        None => fallback_introduction(resume, job),
    };
    if let Some(url) = job.application_url.as_deref().filter(|u| !u.is_empty()) {
        body.push_str(&format!("\n\nPosting: {url}"));
    }

    OutboundEmail {
        to: to.to_string(),
        subject,
        body,
        reply_to: resume
            .sections
            .personal_info
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string),
    }
}

fn fallback_introduction(resume: &Resume, job: &JobPosting) -> String {
    let name = resume.display_name();
    let mut body = format!(
        "Dear {} hiring team,\n\nI am writing to apply for the {} position.",
        job.company, job.title
    );
    let summary = resume.sections.summary.trim();
    if !summary.is_empty() {
        body.push_str(&format!("\n\n{summary}"));
    }
    body.push_str(&format!("\n\nKind regards,\n{name}"));
    body
}
