use super::TokenReplacementService;

/// Replaces `${key}` markers with their configured values. Unknown markers
/// are left alone so scripts can carry unrelated `${...}` text.
pub struct DefaultTokenReplacer;

impl TokenReplacementService for DefaultTokenReplacer {
    fn replace(&self, tokens: &[(String, String)], text: &str) -> String {
        let mut result = text.to_string();
        for (key, value) in tokens {
            result = result.replace(&format!("${{{}}}", key), value);
        }
        result
    }
}
