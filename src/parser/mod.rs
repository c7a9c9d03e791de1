pub mod clean;
pub mod record;
pub mod sections;
pub mod tree;

use tracing::debug;

use crate::db::StoredDocument;
use record::Record;
use tree::Document;

/// Cleaned text must be longer than this to become a record.
pub const MIN_TEXT_CHARS: usize = 50;

pub enum Outcome {
    Record(Record),
    Rejected(&'static str),
}

pub struct ProcessedDocument {
    pub document_data_id: i64,
    pub url: String,
    pub outcome: Outcome,
}

/// raw XML → tree → narrative paragraphs → cleaned text → record.
pub fn process_document(stored: &StoredDocument) -> ProcessedDocument {
    let outcome = match Document::parse(&stored.content) {
        None => Outcome::Rejected("unparsable"),
        Some(doc) => match record::assemble(&stored.url, extract_from(&doc)) {
            Some(r) => Outcome::Record(r),
            None => Outcome::Rejected("insufficient text"),
        },
    };
    if let Outcome::Rejected(reason) = &outcome {
        debug!("No record for {}: {}", stored.url, reason);
    }
    ProcessedDocument {
        document_data_id: stored.document_data_id,
        url: stored.url.clone(),
        outcome,
    }
}

/// Cleaned narrative text of one raw document, if there is enough of it.
pub fn extract(bytes: &[u8]) -> Option<String> {
    extract_from(&Document::parse(bytes)?)
}

fn extract_from(doc: &Document) -> Option<String> {
    let joined = sections::narrative_texts(doc).join("\n");
    let text = clean::clean(&joined);
    (text.chars().count() > MIN_TEXT_CHARS).then_some(text)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use super::sections::{TABLE_NS, TEXT_NS};

    fn debate(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<text:p>{}</text:p>", p))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><PV xmlns:text="{TEXT_NS}" xmlns:table="{TABLE_NS}"><PV.Debate.Text>{body}</PV.Debate.Text></PV>"#
        )
        .into_bytes()
    }

    #[test]
    fn single_paragraph_round_trips() {
        let prose = "De Commissie presenteert haar werkprogramma en beantwoordt de vragen van elk lid.";
        assert_eq!(prose.chars().count(), 81);
        let xml = debate(&[&format!("  {}\n", prose)]);
        assert_eq!(extract(&xml).as_deref(), Some(prose));
    }

    #[test]
    fn length_gate_is_strict() {
        let fifty = "a".repeat(50);
        let fifty_one = "a".repeat(51);
        assert_eq!(extract(&debate(&[&fifty])), None);
        assert_eq!(extract(&debate(&[&fifty_one])), Some(fifty_one));
    }

    #[test]
    fn gate_applies_after_cleaning() {
        let xml = debate(&["Het debat wordt gesloten.", "De vergadering wordt om 12.00 uur gesloten."]);
        assert_eq!(extract(&xml), None);
    }

    #[test]
    fn paragraphs_joined_then_collapsed() {
        let xml = debate(&[
            "Eerste alinea met voldoende inhoud.",
            "Tweede alinea die ook blijft staan.",
        ]);
        assert_eq!(
            extract(&xml).as_deref(),
            Some("Eerste alinea met voldoende inhoud. Tweede alinea die ook blijft staan.")
        );
    }

    #[test]
    fn text_after_malformed_fragment_is_kept() {
        let xml = format!(
            r#"<PV xmlns:text="{TEXT_NS}"><PV.Debate.Text><text:p>Eerste alinea die voldoende lang is om te tellen hier.</text:p><!x><text:p>Tweede alinea komt na een kapot fragment.</text:p></PV.Debate.Text></PV>"#
        );
        assert_eq!(
            extract(xml.as_bytes()).as_deref(),
            Some("Eerste alinea die voldoende lang is om te tellen hier. Tweede alinea komt na een kapot fragment.")
        );
    }

    #[test]
    fn undefined_entities_read_as_spaces() {
        let xml = debate(&["Een alinea&nbsp;met ruim voldoende tekst &amp; de drempel van vijftig tekens."]);
        assert_eq!(
            extract(&xml).as_deref(),
            Some("Een alinea met ruim voldoende tekst & de drempel van vijftig tekens.")
        );
    }

    #[test]
    fn garbage_is_absent() {
        assert_eq!(extract(b"not xml at all"), None);
        assert_eq!(extract(b""), None);
    }

    #[test]
    fn fixture_document() {
        let xml = std::fs::read("tests/fixtures/PV-9-2021-03-24_NL.xml").unwrap();
        let text = extract(&xml).unwrap();
        assert!(text.starts_with("De vergadering wordt geopend door de Voorzitter."));
        assert!(text.contains("De Raad en de Commissie leggen verklaringen af"));
        // Table legend, orator list and procedural lines are gone.
        assert!(!text.contains("Legenda"));
        assert!(!text.contains("Maria Arena, Jan Huitema"));
        assert!(!text.contains("Het debat wordt gesloten"));
        assert!(!text.contains("[2021/2567(RSP)]"));
        assert!(!text.contains("  "));
    }

    #[test]
    fn process_document_outcomes() {
        let ok = StoredDocument {
            document_data_id: 1,
            url: "https://www.europarl.europa.eu/doceo/document/PV-9-2021-03-24_NL.xml".into(),
            content: debate(&["Het Parlement neemt kennis van de mededeling van de Commissie."]),
        };
        let processed = process_document(&ok);
        assert_eq!(processed.document_data_id, 1);
        match processed.outcome {
            Outcome::Record(r) => {
                assert_eq!(r.url, ok.url);
                assert_eq!(r.source, record::PROVENANCE);
            }
            Outcome::Rejected(reason) => panic!("rejected: {}", reason),
        }

        let bad = StoredDocument {
            document_data_id: 2,
            url: "x".into(),
            content: b"no markup here".to_vec(),
        };
        assert!(matches!(process_document(&bad).outcome, Outcome::Rejected("unparsable")));

        let short = StoredDocument {
            document_data_id: 3,
            url: "y".into(),
            content: debate(&["Kort."]),
        };
        assert!(matches!(
            process_document(&short).outcome,
            Outcome::Rejected("insufficient text")
        ));
    }
}
