use std::sync::LazyLock;

use regex::Regex;

/// Procedural phrasing from Dutch minutes, removed case-insensitively in this order.
const BOILERPLATE: &[&str] = &[
    // Sitting and voting announcements
    r"\(The sitting (?:was suspended|opened|closed|ended) at.*?\)",
    r"\(Voting time ended at.*?\)",
    r"\((?:debat|stemming|vraag|interventie)\)",
    r"\(Het woord wordt gevoerd door:.*?\)",
    // (Artikel 149, lid 2), [Rule 12], (VGB punt 3 bis)
    r"[(\[]\s*(?:[a-z]{2,3}\s*)?\s*(?:artikel|rule|punt|item)\s*\d+(?:,\s*lid\s*\d+)?\s*(?:\s+\w+)?\s*[)\]]",
    // Document references and links
    r"\[(?:COM|A)\d+-\d+(?:/\d+)?\]",
    r"\(?https?://[^\s]+?\)",
    r"\[\s*\d{4}/\d{4}\((?:COD|INI|RSP|IMM|NLE)\)\]",
    r"\[\s*\d{5}/\d{4}\s*-\s*C\d+-\d+/\d+\s*-\s*\d{4}/\d{4}\(NLE\)\]",
    r"\(“Stemmingsuitslagen”, punt \d+\)",
    r"\(de Voorzitter(?: maakt na de toespraak van.*?| weigert in te gaan op.*?| stemt toe| herinnert eraan dat de gedragsregels moeten worden nageleefd| neemt er akte van)?\)",
    r"\(zie bijlage.*?\)",
    r"\(\s*De vergadering wordt om.*?geschorst\.\)",
    r"\(\s*De vergadering wordt om.*?hervat\.\)",
    // Whole procedural sentences
    r"Volgens de “catch the eye”-procedure wordt het woord gevoerd door.*?\.",
    r"Het woord wordt gevoerd door .*?\.",
    r"De vergadering wordt om \d{1,2}\.\d{2} uur gesloten.",
    r"De vergadering wordt om \d{1,2}\.\d{2} uur geopend.",
    r"Het debat wordt gesloten.",
    r"Stemming:.*?\.",
];

/// The full rewrite sequence: markup, whitespace, boilerplate, whitespace again.
static RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    let mut rules = vec![
        (Regex::new(r"<[^>]+>").unwrap(), ""),
        (Regex::new(r"\s+").unwrap(), " "),
    ];
    rules.extend(
        BOILERPLATE
            .iter()
            .map(|p| (Regex::new(&format!("(?i){}", p)).unwrap(), "")),
    );
    rules.push((Regex::new(r"\s{2,}").unwrap(), " "));
    rules
});

/// Reduce extracted minutes text to clean prose.
///
/// Passes are repeated until nothing changes, so a removal that splices
/// two fragments into a new boilerplate match is caught too. Every pass
/// leaves the byte length equal or shorter, so the loop terminates.
pub fn clean(text: &str) -> String {
    let mut current = clean_pass(text);
    loop {
        let next = clean_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn clean_pass(text: &str) -> String {
    let mut out = text.to_string();
    for (re, replacement) in RULES.iter() {
        out = re.replace_all(&out, *replacement).into_owned();
    }
    out.trim().to_string()
}
