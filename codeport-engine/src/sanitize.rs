//! Strips markdown code fences from model replies.
//!
//! Models are told to answer with bare C++, but most still wrap the answer in
//! a ```` ```cpp ```` block. Only the markers are removed; code between them
//! is left as-is.

const FENCE: &str = "```";
const LANGUAGE_TAGS: [&str; 5] = ["cpp", "c++", "C++", "cxx", "cc"];

/// Remove every opening fence (with its language tag and trailing newline)
/// and every bare fence marker.
pub fn strip_code_fences(text: &str) -> String {
    let mut out = text.to_string();
    for tag in LANGUAGE_TAGS {
        let opening = format!("{}{}", FENCE, tag);
        out = out.replace(&format!("{}\n", opening), "");
        out = out.replace(&opening, "");
    }
    out.replace(FENCE, "")
}

/// Accumulates streamed deltas and exposes the cleaned text so far.
#[derive(Debug, Default, Clone)]
pub struct StreamSanitizer {
    raw: String,
}

impl StreamSanitizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta and return the sanitized cumulative text.
    pub fn push(&mut self, delta: &str) -> String {
        self.raw.push_str(delta);
        self.current()
    }

    /// Sanitized text that later deltas can only extend.
    ///
    /// Trailing backticks and an unterminated line opening a fence are held
    /// back until the line is complete.
    pub fn current(&self) -> String {
        let mut settled = self.raw.trim_end_matches('`');
        if let Some(pos) = settled.rfind(FENCE) {
            if !settled[pos..].contains('\n') {
                settled = &settled[..pos];
            }
        }
        strip_code_fences(settled)
    }

    /// The reply exactly as received
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn finish(self) -> String {
        strip_code_fences(&self.raw)
    }
}
