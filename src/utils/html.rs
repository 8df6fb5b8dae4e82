// src/utils/html.rs

/// Reduces user-supplied display text (room names, participant names) to plain text.
///
/// Every tag is stripped with ammonia configured with an empty whitelist;
/// `<script>`/`<style>` bodies are dropped entirely. The result is stored and
/// served as plain text, so the entities ammonia's serializer emits are decoded
/// again. Escaping is left to whoever renders it.
pub fn clean_text(input: &str) -> String {
    let sanitized = ammonia::Builder::empty().clean(input).to_string();
    decode_text_entities(&sanitized).trim().to_string()
}

/// Reverses the escaping applied to text nodes. `&amp;` goes last so an
/// escaped entity is decoded exactly once.
fn decode_text_entities(escaped: &str) -> String {
    escaped
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}
