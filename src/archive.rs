use std::collections::BTreeSet;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Url;
use scraper::{Html, Selector};
use tracing::{info, warn};

use crate::fetcher::build_client;

const MINUTES_URL: &str = "https://www.europarl.europa.eu/plenary/nl/minutes.html";
const DOCUMENT_BASE_URL: &str = "https://www.europarl.europa.eu/doceo/document/";
/// Only Dutch minutes are kept.
const LANGUAGE_SUFFIX: &str = "_NL.xml";
const LINK_CLASSES: &[&str] = &["nopadding", "link_simple_iconsmall"];

const TERM_DELAY: Duration = Duration::from_secs(1);
const TERM_ERROR_DELAY: Duration = Duration::from_secs(5);

static TERM_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("select#criteriaSidesLeg option").unwrap());
static XML_LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"a[href$=".xml"]"#).unwrap());
static DOCUMENT_BASE: LazyLock<Url> = LazyLock::new(|| Url::parse(DOCUMENT_BASE_URL).unwrap());

/// A parliamentary term as offered by the archive's search form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Term {
    pub value: String,
    pub title: String,
}

/// Walk every parliamentary term in the minutes archive and collect the
/// target-language XML document URLs, de-duplicated and sorted.
pub async fn fetch_document_urls() -> Result<Vec<String>> {
    let client = build_client()?;

    info!("Fetching minutes archive: {}", MINUTES_URL);
    let html = client
        .get(MINUTES_URL)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await
        .context("Failed to fetch minutes archive page")?;

    let terms = parse_terms(&html);
    if terms.is_empty() {
        anyhow::bail!("No parliamentary terms found on {}", MINUTES_URL);
    }
    info!("Found {} parliamentary terms", terms.len());

    let pb = ProgressBar::new(terms.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let mut urls = BTreeSet::new();
    for term in &terms {
        pb.set_message(term.title.clone());
        let page = client
            .post(MINUTES_URL)
            .form(&search_form(&term.value))
            .send()
            .await
            .and_then(|r| r.error_for_status());
        let body = match page {
            Ok(r) => r.text().await,
            Err(e) => Err(e),
        };
        match body {
            Ok(body) => {
                let before = urls.len();
                urls.extend(parse_xml_links(&body).into_iter().filter(|u| is_target_language(u)));
                info!("{}: {} new document links", term.title, urls.len() - before);
                tokio::time::sleep(TERM_DELAY).await;
            }
            Err(e) => {
                warn!("Search for term {} failed: {}", term.title, e);
                tokio::time::sleep(TERM_ERROR_DELAY).await;
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!("Document links after filtering: {}", urls.len());
    Ok(urls.into_iter().collect())
}

fn search_form(term: &str) -> Vec<(&'static str, String)> {
    [
        ("clean", "false"),
        ("legChange", "false"),
        ("source", ""),
        ("dateSys", ""),
        ("tabActif", "tabResult"),
        ("leg", term),
        ("refSittingDateStart", ""),
        ("refSittingDateEnd", ""),
        ("miType", "text"),
        ("miText", ""),
        ("sortResults", ""),
    ]
    .into_iter()
    .map(|(k, v)| (k, v.to_string()))
    .collect()
}

/// Term options that carry both a value and a title.
pub fn parse_terms(html: &str) -> Vec<Term> {
    let document = Html::parse_document(html);
    document
        .select(&TERM_SEL)
        .filter_map(|opt| {
            let value = opt.value().attr("value")?.trim();
            let title = opt.value().attr("title")?.trim();
            if value.is_empty() || title.is_empty() {
                return None;
            }
            Some(Term {
                value: value.to_string(),
                title: title.to_string(),
            })
        })
        .collect()
}

/// XML document links from a search result page, resolved to absolute URLs.
pub fn parse_xml_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let links: BTreeSet<String> = document
        .select(&XML_LINK_SEL)
        .filter(|a| a.value().classes().any(|c| LINK_CLASSES.contains(&c)))
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| DOCUMENT_BASE.join(href.trim()).ok())
        .map(String::from)
        .collect();
    links.into_iter().collect()
}

pub fn is_target_language(url: &str) -> bool {
    url.contains(LANGUAGE_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terms_need_value_and_title() {
        let html = r#"
            <select id="criteriaSidesLeg">
                <option value="9" title="9de zittingsperiode">9</option>
                <option value="8" title="8ste zittingsperiode">8</option>
                <option value="" title="Alle">-</option>
                <option value="7">7</option>
            </select>
            <select id="other"><option value="x" title="y">x</option></select>"#;
        let terms = parse_terms(html);
        assert_eq!(
            terms,
            vec![
                Term { value: "9".into(), title: "9de zittingsperiode".into() },
                Term { value: "8".into(), title: "8ste zittingsperiode".into() },
            ]
        );
    }

    #[test]
    fn xml_links_filtered_by_class_and_resolved() {
        let html = r#"
            <a class="link_simple_iconsmall" href="/doceo/document/PV-9-2021-03-24_NL.xml">XML</a>
            <a class="nopadding other" href="PV-9-2021-03-25_NL.xml">XML</a>
            <a class="nopadding" href="PV-9-2021-03-25_NL.xml">dup</a>
            <a class="plain" href="PV-9-2021-03-26_NL.xml">ignored</a>
            <a class="nopadding" href="PV-9-2021-03-26_NL.pdf">pdf</a>"#;
        let links = parse_xml_links(html);
        assert_eq!(
            links,
            vec![
                "https://www.europarl.europa.eu/doceo/document/PV-9-2021-03-24_NL.xml".to_string(),
                "https://www.europarl.europa.eu/doceo/document/PV-9-2021-03-25_NL.xml".to_string(),
            ]
        );
    }

    #[test]
    fn language_filter() {
        assert!(is_target_language("https://x/PV-9-2021-03-24_NL.xml"));
        assert!(!is_target_language("https://x/PV-9-2021-03-24_EN.xml"));
    }

    #[test]
    fn search_form_carries_term() {
        let form = search_form("9");
        assert!(form.contains(&("leg", "9".to_string())));
        assert!(form.contains(&("tabActif", "tabResult".to_string())));
        assert_eq!(form.len(), 11);
    }
}
