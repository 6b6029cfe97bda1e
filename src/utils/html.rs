use ammonia;

/// Strips unsafe markup from user-supplied text before it is stored.
///
/// Whitelist-based: harmless tags (<b>, <p>, links) survive, while <script>,
/// <iframe> and event-handler attributes are removed together with script
/// bodies. Plain text passes through unchanged apart from entity escaping of
/// stray `<`/`>`.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
