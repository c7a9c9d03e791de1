use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::tree::{Document, NodeId, DOCUMENT};

pub const TEXT_NS: &str = "http://openoffice.org/2000/text";
pub const TABLE_NS: &str = "http://openoffice.org/2000/table";

const ORATOR_LIST: &str = "Orator.List.Text";
const ATTENDANCE_NAME: &str = "Attendance.Participant.Name";

/// Name lists at or above this length are kept as prose.
const NAME_LIST_MAX_CHARS: usize = 100;
/// Paragraphs shorter than this need a real word to survive.
const SHORT_PARAGRAPH_CHARS: usize = 20;

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-zA-Z]{5,}").unwrap());

/// Narrative regions of a minutes document, in scan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Other,
    Debate,
    Vote,
    SittingResumption,
    Approval,
    Agenda,
    SittingClosure,
}

impl SectionKind {
    pub const ALL: [SectionKind; 7] = [
        SectionKind::Other,
        SectionKind::Debate,
        SectionKind::Vote,
        SectionKind::SittingResumption,
        SectionKind::Approval,
        SectionKind::Agenda,
        SectionKind::SittingClosure,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            SectionKind::Other => "PV.Other.Text",
            SectionKind::Debate => "PV.Debate.Text",
            SectionKind::Vote => "PV.Vote.Text",
            SectionKind::SittingResumption => "PV.Sitting.Resumption.Text",
            SectionKind::Approval => "PV.Approval.Text",
            SectionKind::Agenda => "PV.Agenda.Text",
            SectionKind::SittingClosure => "PV.Sitting.Closure.Text",
        }
    }
}

/// Every `text:p` beneath any section of `kind`, once each, in document order.
pub fn paragraphs(doc: &Document, kind: SectionKind) -> Vec<NodeId> {
    let mut seen = HashSet::new();
    let mut found: Vec<NodeId> = doc
        .descendants(DOCUMENT)
        .into_iter()
        .filter(|&id| doc.is_element(id, None, kind.tag()))
        .flat_map(|section| doc.descendants(section))
        .filter(|&id| doc.is_element(id, Some(TEXT_NS), "p"))
        .filter(|&id| seen.insert(id))
        .collect();
    found.sort_unstable();
    found
}

/// Trimmed texts of the paragraphs worth keeping, section kind by section kind.
pub fn narrative_texts(doc: &Document) -> Vec<String> {
    let mut texts = Vec::new();
    for kind in SectionKind::ALL {
        for p in paragraphs(doc, kind) {
            let text = doc.text(p).trim().to_string();
            if keep_paragraph(doc, p, &text) {
                texts.push(text);
            }
        }
    }
    texts
}

fn keep_paragraph(doc: &Document, p: NodeId, text: &str) -> bool {
    if text.is_empty() {
        return false;
    }

    // Tables carry legends and lists, not proceedings.
    if doc.has_ancestor(p, Some(TABLE_NS), "table") {
        return false;
    }

    let len = text.chars().count();
    if is_bare_name_list(doc, p, text, len) {
        return false;
    }

    !(len < SHORT_PARAGRAPH_CHARS && !WORD_RE.is_match(text))
}

/// A short paragraph that is nothing but its orator list.
fn is_bare_name_list(doc: &Document, p: NodeId, text: &str, len: usize) -> bool {
    let has_list_child = doc
        .child_elements(p)
        .any(|c| doc.is_element(c, None, ORATOR_LIST) || doc.is_element(c, None, ATTENDANCE_NAME));
    if !has_list_child || len >= NAME_LIST_MAX_CHARS {
        return false;
    }
    let list_text = doc
        .child_elements(p)
        .find(|&c| doc.is_element(c, None, ORATOR_LIST))
        .map(|c| doc.text(c).trim().to_string())
        .unwrap_or_default();
    !list_text.is_empty() && list_text == text
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn minutes(body: &str) -> Document {
        let xml = format!(
            r#"<PV.Minutes xmlns:text="{TEXT_NS}" xmlns:table="{TABLE_NS}">{body}</PV.Minutes>"#
        );
        Document::parse(xml.as_bytes()).unwrap()
    }

    const PROSE: &str = "Het Parlement bespreekt het verslag over de interne markt voor elektriciteit.";

    #[test]
    fn debate_paragraph_kept() {
        let doc = minutes(&format!("<PV.Debate.Text><text:p>{PROSE}</text:p></PV.Debate.Text>"));
        assert_eq!(narrative_texts(&doc), vec![PROSE.to_string()]);
    }

    #[test]
    fn paragraphs_outside_sections_ignored() {
        let doc = minutes(&format!(
            "<PV.Header><text:p>{PROSE}</text:p></PV.Header><PV.Debate.Text><text:p>Binnen de sectie blijft dit staan.</text:p></PV.Debate.Text>"
        ));
        assert_eq!(narrative_texts(&doc), vec!["Binnen de sectie blijft dit staan."]);
    }

    #[test]
    fn sections_scanned_in_fixed_order() {
        let doc = minutes(
            "<PV.Agenda.Text><text:p>Agenda komt later</text:p></PV.Agenda.Text>\
             <PV.Other.Text><text:p>Overige komt eerst</text:p></PV.Other.Text>",
        );
        assert_eq!(narrative_texts(&doc), vec!["Overige komt eerst", "Agenda komt later"]);
    }

    #[test]
    fn nested_paragraphs_found() {
        let doc = minutes(&format!(
            "<PV.Vote.Text><Block><Inner><text:p>{PROSE}</text:p></Inner></Block></PV.Vote.Text>"
        ));
        assert_eq!(narrative_texts(&doc).len(), 1);
    }

    #[test]
    fn table_paragraphs_excluded() {
        let doc = minutes(&format!(
            "<PV.Vote.Text><table:table><table:table-row><table:table-cell>\
             <text:p>{PROSE}</text:p></table:table-cell></table:table-row></table:table></PV.Vote.Text>"
        ));
        assert!(narrative_texts(&doc).is_empty());
    }

    #[test]
    fn bare_orator_list_excluded() {
        let doc = minutes(
            "<PV.Debate.Text><text:p><Orator.List.Text>Jan Jansen, Piet Pietersen</Orator.List.Text></text:p></PV.Debate.Text>",
        );
        assert!(narrative_texts(&doc).is_empty());
    }

    #[test]
    fn long_orator_list_kept() {
        let names = "Jan Jansen, Piet Pietersen, Klaas Klaassen, Marie de Vries, Anne Bakker, Sophie Visser, Emma Smit, Lotte";
        assert!(names.chars().count() >= 100);
        let doc = minutes(&format!(
            "<PV.Debate.Text><text:p><Orator.List.Text>{names}</Orator.List.Text></text:p></PV.Debate.Text>"
        ));
        assert_eq!(narrative_texts(&doc), vec![names.to_string()]);
    }

    #[test]
    fn prose_around_orator_list_kept() {
        let doc = minutes(
            "<PV.Debate.Text><text:p>Het woord voeren: <Orator.List.Text>Jan Jansen</Orator.List.Text></text:p></PV.Debate.Text>",
        );
        assert_eq!(narrative_texts(&doc), vec!["Het woord voeren: Jan Jansen"]);
    }

    #[test]
    fn attendance_name_alone_not_treated_as_list() {
        let doc = minutes(
            "<PV.Other.Text><text:p><Attendance.Participant.Name>Jan Jansen</Attendance.Participant.Name></text:p></PV.Other.Text>",
        );
        assert_eq!(narrative_texts(&doc), vec!["Jan Jansen"]);
    }

    #[test]
    fn short_symbol_paragraphs_excluded() {
        let doc = minutes(
            "<PV.Other.Text><text:p>1.2</text:p><text:p>  </text:p><text:p>- ja -</text:p><text:p>Goedkeuring</text:p></PV.Other.Text>",
        );
        assert_eq!(narrative_texts(&doc), vec!["Goedkeuring"]);
    }

    #[test]
    fn paragraph_visited_once_per_kind() {
        let doc = minutes(
            "<PV.Debate.Text><PV.Debate.Text><text:p>Dubbel genest maar eenmaal</text:p></PV.Debate.Text></PV.Debate.Text>",
        );
        assert_eq!(narrative_texts(&doc).len(), 1);
    }

    #[test]
    fn unprefixed_p_is_not_a_paragraph() {
        let doc = minutes(&format!("<PV.Debate.Text><p>{PROSE}</p></PV.Debate.Text>"));
        assert!(narrative_texts(&doc).is_empty());
    }
}
