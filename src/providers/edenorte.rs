//! Edenorte: weekly spreadsheet schedule.
//!
//! Edenorte announces each week's program as a blog post in a category
//! listing; the post links an Excel workbook through a `div.w3eden`
//! download widget. The workbook's `Publicacion Externa` worksheet is
//! dumped to delimited text and handed to the model as text, not images.

use crate::ai::{self, ExtractModel, Payload, TABLE_TEXT_INSTRUCTIONS};
use crate::error::ScrapeError;
use crate::fetch;
use crate::models::{Company, MaintenanceEvent};
use crate::normalize;
use crate::spreadsheet;
use crate::week;
use chrono::{Datelike, Local};
use scraper::{Html, Selector};
use tracing::{info, instrument};
use url::Url;

const URL: &str = "https://edenorte.com.do/category/programa-de-mantenimiento-de-redes/";

/// Scrape this week's Edenorte schedule.
#[instrument(level = "info", skip_all)]
pub async fn scrape<M: ExtractModel + Sync>(
    model: &M,
) -> Result<Vec<MaintenanceEvent>, ScrapeError> {
    let today = Local::now().date_naive();
    let monday = week::monday_of_week(today);
    let day_token = format!("{:02}", monday.day());
    let month_token = week::month_name(monday).to_string();

    let listing = fetch::fetch_text(URL, &[]).await?;
    let post_url = {
        let (day, month) = (day_token.clone(), month_token.clone());
        super::run_blocking(move || find_week_post(&listing, &day, &month)).await?
    };
    info!(%post_url, "Located weekly post");

    let post = fetch::fetch_text(&post_url, &[]).await?;
    let file_url = {
        let base = post_url.clone();
        super::run_blocking(move || find_workbook_link(&post, &base, &day_token, &month_token))
            .await?
    };
    info!(%file_url, "Located workbook download");

    let workbook = fetch::fetch_bytes(&file_url, &[]).await?;
    let dump = super::run_blocking(move || spreadsheet::worksheet_to_table(&workbook)).await?;

    let table =
        ai::extract_with_backoff(model, &Payload::Table(dump), TABLE_TEXT_INSTRUCTIONS).await?;
    let events = normalize::tabular_to_events(Company::Edenorte, &table, today)?;
    info!(count = events.len(), "Scraped Edenorte events");
    Ok(events)
}

/// Find the category entry whose title names the given Monday.
///
/// The post titles carry the zero-padded day and the month name; matching
/// both keeps `15 de septiembre` from colliding with `15 de diciembre`.
fn find_week_post(html: &str, day: &str, month: &str) -> Result<String, ScrapeError> {
    let document = Html::parse_document(html);
    let anchors = Selector::parse("a[href]").unwrap();

    for anchor in document.select(&anchors) {
        let text: String = anchor.text().collect();
        if text.contains(day) && text.contains(month) {
            if let Some(href) = anchor.value().attr("href") {
                return resolve(URL, href);
            }
        }
    }

    Err(ScrapeError::StructureChanged {
        context: "no post links to the current week's schedule; website structure may have \
                  changed, or the data for the current week may not be available yet",
        maybe_unpublished: true,
    })
}

/// Find the workbook `data-downloadurl` inside the post's download widgets.
///
/// A widget counts when one of its anchors names the week's day and month
/// together with an Excel mention; the widget's `Descargar` anchor then
/// carries the file URL.
fn find_workbook_link(
    html: &str,
    base: &str,
    day: &str,
    month: &str,
) -> Result<String, ScrapeError> {
    let document = Html::parse_document(html);
    let widget = Selector::parse("div.w3eden").unwrap();
    let anchor = Selector::parse("a").unwrap();

    for block in document.select(&widget) {
        let mentions_file = block.select(&anchor).any(|a| {
            let text: String = a.text().collect();
            text.contains(day) && text.contains(month) && text.to_lowercase().contains("excel")
        });
        if !mentions_file {
            continue;
        }

        let download = block
            .select(&anchor)
            .find(|a| a.text().collect::<String>().trim().to_lowercase() == "descargar");
        let Some(download) = download else {
            return Err(ScrapeError::Extraction(
                "download widget has no download anchor".to_string(),
            ));
        };
        let href = download.value().attr("data-downloadurl").ok_or_else(|| {
            ScrapeError::Extraction(
                "download anchor lacks data-downloadurl; website structure may have changed"
                    .to_string(),
            )
        })?;
        return resolve(base, href);
    }

    Err(ScrapeError::StructureChanged {
        context: "no download widget offers the current week's workbook; website structure may \
                  have changed",
        maybe_unpublished: false,
    })
}

/// Resolve a possibly-relative link against the page it came from.
fn resolve(base: &str, href: &str) -> Result<String, ScrapeError> {
    Url::parse(base)
        .and_then(|b| b.join(href))
        .map(|u| u.to_string())
        .map_err(|e| ScrapeError::Extraction(format!("unresolvable link '{href}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finds_week_post_by_day_and_month() {
        let html = "<html><body>\
             <a href=\"/programa-08-septiembre/\">Programa de mantenimiento 08 de septiembre</a>\
             <a href=\"/programa-15-septiembre/\">Programa de mantenimiento 15 de septiembre</a>\
             </body></html>";
        let url = find_week_post(html, "15", "septiembre").unwrap();
        assert_eq!(url, "https://edenorte.com.do/programa-15-septiembre/");
    }

    #[test]
    fn test_missing_week_post_flags_maybe_unpublished() {
        let html = "<html><body>\
             <a href=\"/programa-08-septiembre/\">Programa de mantenimiento 08 de septiembre</a>\
             </body></html>";
        let err = find_week_post(html, "15", "septiembre").unwrap_err();
        match err {
            ScrapeError::StructureChanged {
                maybe_unpublished, ..
            } => assert!(maybe_unpublished),
            other => panic!("expected StructureChanged, got {other:?}"),
        }
    }

    #[test]
    fn test_finds_workbook_link_in_matching_widget() {
        let html = "<html><body>\
             <div class=\"w3eden\">\
               <a href=\"#\">Programa 15 de septiembre PDF</a>\
               <a href=\"#\" data-downloadurl=\"https://edenorte.com.do/dl/15-sept.pdf\">Descargar</a>\
             </div>\
             <div class=\"w3eden\">\
               <a href=\"#\">Programa 15 de septiembre EXCEL</a>\
               <a href=\"#\" data-downloadurl=\"/dl/15-sept.xlsx\">Descargar</a>\
             </div>\
             </body></html>";
        let url = find_workbook_link(
            html,
            "https://edenorte.com.do/programa-15-septiembre/",
            "15",
            "septiembre",
        )
        .unwrap();
        assert_eq!(url, "https://edenorte.com.do/dl/15-sept.xlsx");
    }

    #[test]
    fn test_no_matching_widget_is_structure_change() {
        let html = "<html><body><div class=\"w3eden\">\
             <a href=\"#\">Programa 08 de septiembre EXCEL</a>\
             <a href=\"#\" data-downloadurl=\"/dl/08-sept.xlsx\">Descargar</a>\
             </div></body></html>";
        let err = find_workbook_link(html, URL, "15", "septiembre").unwrap_err();
        match err {
            ScrapeError::StructureChanged {
                maybe_unpublished, ..
            } => assert!(!maybe_unpublished),
            other => panic!("expected StructureChanged, got {other:?}"),
        }
    }
}
