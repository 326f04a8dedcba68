/// Placeholders a campaign template may use for the company name. The
/// double-brace form goes first so it is not half-consumed by the single one.
const COMPANY_PLACEHOLDERS: [&str; 3] = ["{{company_name}}", "{company_name}", "[Company Name]"];

pub fn render_for_company(template: &str, company_name: &str) -> String {
    COMPANY_PLACEHOLDERS
        .iter()
        .fold(template.to_string(), |text, placeholder| {
            text.replace(placeholder, company_name)
        })
}
