use ammonia;

/// Whitelist-based HTML sanitization for admin-supplied content (blog posts).
///
/// Preserves safe tags while stripping <script>, <iframe> and event-handler
/// attributes. Fail-safe against stored XSS reaching student browsers.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
