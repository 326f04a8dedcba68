//! Job catalog backed by the `job_postings` table.

use async_trait::async_trait;
use sqlx::PgPool;

use super::{CollaboratorError, JobCatalog, JobSearch};
use crate::models::job::{JobPosting, JobQuery};

const JOB_COLUMNS: &str = "id, title, company, location, salary_min, salary_max, \
    salary_currency, source, description, requirements, posted_date, application_url, \
    contact_email";

#[derive(Clone)]
pub struct PgJobCatalog {
    pool: PgPool,
}

impl PgJobCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobCatalog for PgJobCatalog {
    async fn find_job(&self, job_id: &str) -> Result<Option<JobPosting>, CollaboratorError> {
        let job = sqlx::query_as::<_, JobPosting>(&format!(
            "SELECT {JOB_COLUMNS} FROM job_postings WHERE id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }
}

#[async_trait]
impl JobSearch for PgJobCatalog {
    async fn search(&self, query: &JobQuery) -> Result<Vec<JobPosting>, CollaboratorError> {
        let keywords = query.keywords.trim();
        let location = query
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty());

        // NULL parameters switch the corresponding filter off.
        let jobs = sqlx::query_as::<_, JobPosting>(&format!(
            "SELECT {JOB_COLUMNS} FROM job_postings
             WHERE ($1::text IS NULL
                    OR title ILIKE '%' || $1 || '%'
                    OR company ILIKE '%' || $1 || '%'
                    OR description ILIKE '%' || $1 || '%')
               AND ($2::text IS NULL OR location ILIKE '%' || $2 || '%')
               AND ($3::bigint IS NULL OR salary_max >= $3)
             ORDER BY posted_date DESC
             LIMIT $4"
        ))
        .bind((!keywords.is_empty()).then_some(keywords))
        .bind(location)
        .bind(query.salary_min)
        .bind(i64::from(query.effective_limit()))
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }
}
