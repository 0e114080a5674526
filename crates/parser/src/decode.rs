use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use pastewatch_core::MonitorError;

/// Site-specific extraction of the paste text from a fetched body. Most raw
/// endpoints serve the text directly; some only expose it inside an HTML
/// wrapper.
pub trait BodyDecoder: Send + Sync {
    fn name(&self) -> &'static str;
    fn decode(&self, raw: &str) -> String;
}

/// Default: the response body is the paste.
struct RawBody;

impl BodyDecoder for RawBody {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn decode(&self, raw: &str) -> String {
        raw.to_string()
    }
}

static WRAPPED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(?:textarea|pre)[^>]*>(.*?)</(?:textarea|pre)>").unwrap()
});

/// Unwraps the paste out of the first `<textarea>`/`<pre>` container. Falls
/// back to the full body when no container is present.
struct WrappedHtmlBody;

impl BodyDecoder for WrappedHtmlBody {
    fn name(&self) -> &'static str {
        "wrapped-html"
    }

    fn decode(&self, raw: &str) -> String {
        match WRAPPED_RE.captures(raw).and_then(|caps| caps.get(1)) {
            Some(inner) => unescape_entities(inner.as_str()),
            None => raw.to_string(),
        }
    }
}

fn unescape_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Maps the `pastie-classname` config tag to a decode strategy. Built once at
/// program start; unknown tags are a configuration error.
pub struct DecoderRegistry {
    decoders: HashMap<&'static str, Arc<dyn BodyDecoder>>,
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DecoderRegistry {
    pub fn builtin() -> Self {
        let mut decoders: HashMap<&'static str, Arc<dyn BodyDecoder>> = HashMap::new();
        for decoder in [
            Arc::new(RawBody) as Arc<dyn BodyDecoder>,
            Arc::new(WrappedHtmlBody) as Arc<dyn BodyDecoder>,
        ] {
            decoders.insert(decoder.name(), decoder);
        }
        Self { decoders }
    }

    pub fn resolve(&self, tag: Option<&str>) -> Result<Arc<dyn BodyDecoder>, MonitorError> {
        let tag = tag.unwrap_or("raw");
        self.decoders.get(tag).cloned().ok_or_else(|| {
            MonitorError::Config(format!("unknown pastie-classname {:?}", tag))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_passthrough() {
        let registry = DecoderRegistry::builtin();
        let decoder = registry.resolve(None).unwrap();
        assert_eq!(decoder.decode("plain body"), "plain body");
    }

    #[test]
    fn test_wrapped_html_extracts_textarea() {
        let registry = DecoderRegistry::builtin();
        let decoder = registry.resolve(Some("wrapped-html")).unwrap();
        let html = "<html><textarea class=\"paste\">user=admin&amp;pass=1</textarea></html>";
        assert_eq!(decoder.decode(html), "user=admin&pass=1");
    }

    #[test]
    fn test_wrapped_html_falls_back_to_raw() {
        let registry = DecoderRegistry::builtin();
        let decoder = registry.resolve(Some("wrapped-html")).unwrap();
        assert_eq!(decoder.decode("no wrapper here"), "no wrapper here");
    }

    #[test]
    fn test_unknown_tag_is_config_error() {
        let registry = DecoderRegistry::builtin();
        assert!(registry.resolve(Some("no-such-parser")).is_err());
    }
}
