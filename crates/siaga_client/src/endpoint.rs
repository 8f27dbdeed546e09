//! Endpoint path templates with a `{city}` placeholder.

use url::form_urlencoded::byte_serialize;
use url::Url;

pub const CITY_PLACEHOLDER: &str = "{city}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTemplate {
    raw: String,
}

impl EndpointTemplate {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the rendered path depends on the active city.
    pub fn uses_city(&self) -> bool {
        self.raw.contains(CITY_PLACEHOLDER)
    }

    /// Path with `{city}` replaced by the URL-encoded city id.
    pub fn render(&self, city: &str) -> String {
        if !self.uses_city() {
            return self.raw.clone();
        }
        self.raw.replace(CITY_PLACEHOLDER, &encode_component(city))
    }
}

/// Form encoding, for query values. A space becomes `+`.
pub fn encode_component(raw: &str) -> String {
    byte_serialize(raw.as_bytes()).collect()
}

/// Percent-encoding for a single path segment. `/`, `?`, `#` and spaces are
/// escaped; `+` stays literal.
pub fn encode_path_segment(raw: &str) -> String {
    let Ok(mut scratch) = Url::parse("http://localhost/") else {
        return encode_component(raw);
    };
    if let Ok(mut segments) = scratch.path_segments_mut() {
        segments.clear().push(raw);
    }
    scratch.path().trim_start_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_city() {
        let tpl = EndpointTemplate::new("/api/risk?city={city}");
        assert!(tpl.uses_city());
        assert_eq!(tpl.render("jakarta"), "/api/risk?city=jakarta");
        assert_eq!(tpl.render("kota baru&x"), "/api/risk?city=kota+baru%26x");
    }

    #[test]
    fn test_path_segment_escapes() {
        assert_eq!(encode_path_segment("65f1c0a2"), "65f1c0a2");
        assert_eq!(encode_path_segment("a b+c/d?e#f"), "a%20b+c%2Fd%3Fe%23f");
    }

    #[test]
    fn test_static_template_untouched() {
        let tpl = EndpointTemplate::new("/api/reports");
        assert!(!tpl.uses_city());
        assert_eq!(tpl.render("bandung"), "/api/reports");
    }
}
