// Résumé analysis prompt templates.

/// System prompt for résumé analysis.
pub const ANALYSIS_SYSTEM: &str = "\
You are a senior technical recruiter with twenty years of experience. \
Extract résumé information precisely and score candidates objectively against a job description. \
If a field cannot be found in the résumé, use the string \"Not mentioned\".";

/// Analysis prompt. Replace `{resume_text}` before sending.
pub const ANALYSIS_PROMPT_TEMPLATE: &str = r#"Analyze the following résumé.

[RESUME TEXT START]
{resume_text}
[RESUME TEXT END]

Return a JSON object with this structure:
{
  "basic_info": {
    "name": "full name",
    "phone": "phone number",
    "email": "email address",
    "education": "highest degree / institution",
    "years_of_experience": "number of years or an estimate"
  },
  "skills": ["skill 1", "skill 2", "skill 3"],
  "summary": "a summary of the candidate's strengths in under 50 words"
}"#;

/// Appended when a job description is supplied. Replace `{job_description}` before sending.
pub const MATCH_PROMPT_TEMPLATE: &str = r#"

[JOB DESCRIPTION]
{job_description}

Add these fields to the same JSON object:
  "match_score": an integer between 0 and 100,
  "match_analysis": "a short assessment of the fit, naming strengths and gaps, under 100 words""#;
