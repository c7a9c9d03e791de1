use serde::{Deserialize, Serialize};

/// Provenance tag carried by every corpus record.
pub const PROVENANCE: &str = "European Parliament Minutes";

/// One corpus entry, serialized with the published dataset's field names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "URL")]
    pub url: String,
    pub text: String,
    pub source: String,
}

pub fn assemble(url: &str, text: Option<String>) -> Option<Record> {
    text.map(|text| Record {
        url: url.to_string(),
        text,
        source: PROVENANCE.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_text_gives_no_record() {
        assert!(assemble("https://example.org/PV-9-2020-01-13_NL.xml", None).is_none());
    }

    #[test]
    fn record_carries_url_and_provenance() {
        let r = assemble("u", Some("tekst".into())).unwrap();
        assert_eq!(r.url, "u");
        assert_eq!(r.text, "tekst");
        assert_eq!(r.source, PROVENANCE);
    }

    #[test]
    fn serialized_field_names() {
        let r = assemble("u", Some("t".into())).unwrap();
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"URL":"u","text":"t","source":"European Parliament Minutes"}"#);
    }
}
