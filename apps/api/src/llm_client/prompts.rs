// Cross-cutting prompt fragments. Each collaborator keeps its own prompts
// alongside it and reuses these.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Appended to every prompt that works from resume content.
pub const GROUNDING_INSTRUCTION: &str = "\
    Use only facts present in the resume provided. Do NOT invent employers, \
    dates, degrees, metrics or skills. If something is missing, leave it out.";
