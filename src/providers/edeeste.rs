//! Edeeste: weekly PDF schedule.
//!
//! Edeeste publishes its maintenance program as a PDF linked from a listing
//! page. Each listing row is a `div.media` block holding an anchor that
//! names the week (`... lunes 15 de septiembre ...`) and a `Descargar`
//! anchor whose `data-downloadurl` attribute carries the document URL.
//!
//! The PDF is a visual table, so it goes to the vision model as rendered
//! page images rather than through a text extractor.
//!
//! The origin rejects requests without a browser User-Agent.

use crate::ai::{self, ExtractModel, Payload, PAGE_IMAGE_INSTRUCTIONS};
use crate::error::ScrapeError;
use crate::fetch;
use crate::models::{Company, MaintenanceEvent};
use crate::normalize;
use crate::pdf;
use crate::week;
use chrono::Local;
use scraper::{Html, Selector};
use tracing::{info, instrument};

const URL: &str = "https://edeeste.com.do/index.php/programa-de-mantenimiento/";

const HEADERS: [(&str, &str); 1] = [(
    "User-Agent",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
)];

/// Scrape this week's Edeeste schedule.
#[instrument(level = "info", skip_all)]
pub async fn scrape<M: ExtractModel + Sync>(
    model: &M,
) -> Result<Vec<MaintenanceEvent>, ScrapeError> {
    let today = Local::now().date_naive();
    let monday_label = week::spanish_label(week::monday_of_week(today));

    let page = fetch::fetch_text(URL, &HEADERS).await?;
    let link = super::run_blocking(move || find_download_link(&page, &monday_label)).await?;
    info!(%link, "Located weekly schedule document");

    let document = fetch::fetch_bytes(&link, &HEADERS).await?;
    let pages = super::run_blocking(move || pdf::render_pages(&document)).await?;
    info!(pages = pages.len(), "Rendered schedule pages");

    let table =
        ai::extract_with_backoff(model, &Payload::Pages(pages), PAGE_IMAGE_INSTRUCTIONS).await?;
    let events = normalize::tabular_to_events(Company::Edeeste, &table, today)?;
    info!(count = events.len(), "Scraped Edeeste events");
    Ok(events)
}

/// Locate the `data-downloadurl` of the block naming the given Monday.
///
/// Linear scan, first structural match wins. No containers at all means the
/// page layout changed; containers that never mention the week usually mean
/// the schedule is not posted yet.
fn find_download_link(html: &str, monday_label: &str) -> Result<String, ScrapeError> {
    let document = Html::parse_document(html);
    let container = Selector::parse("div.media").unwrap();
    let anchor = Selector::parse("a").unwrap();

    let blocks: Vec<_> = document.select(&container).collect();
    if blocks.is_empty() {
        return Err(ScrapeError::StructureChanged {
            context: "no schedule containers on the page; website structure may have changed",
            maybe_unpublished: false,
        });
    }

    for block in blocks {
        let mentions_week = block
            .select(&anchor)
            .any(|a| a.text().collect::<String>().to_lowercase().contains(monday_label));
        if !mentions_week {
            continue;
        }

        let download = block
            .select(&anchor)
            .find(|a| a.text().collect::<String>().trim().to_lowercase() == "descargar");
        let Some(download) = download else {
            return Err(ScrapeError::Extraction(
                "weekly schedule block has no download anchor".to_string(),
            ));
        };
        return download
            .value()
            .attr("data-downloadurl")
            .map(str::to_string)
            .ok_or_else(|| {
                ScrapeError::Extraction(
                    "download anchor lacks data-downloadurl; website structure may have changed"
                        .to_string(),
                )
            });
    }

    Err(ScrapeError::StructureChanged {
        context: "no schedule block mentions the current week; website structure may have changed, \
                  or the data for the current week may not be available yet",
        maybe_unpublished: true,
    })
}
