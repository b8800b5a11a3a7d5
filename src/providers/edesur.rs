//! Edesur: schedule published directly in the page markup.
//!
//! Edesur is the odd one out: no downloadable document and no model call.
//! The page renders one tab per day (`ul.nav.nav-pills.nav-fill`), each tab
//! button's id pointing at a pane of `.accordion-item` province blocks. A
//! block holds `h5.title-zona` headings (the interruption windows) paired
//! positionally with class-less `<p>` elements (the affected sectors), so
//! this module subsumes both the locator and the normalization step and
//! produces canonical events directly.

use crate::error::ScrapeError;
use crate::fetch;
use crate::models::{Company, MaintenanceEvent, TimeSectors, TIME_NOT_AVAILABLE};
use crate::week;
use chrono::{Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, instrument};

const URL: &str = "https://www.edesur.com.do/enlaces-empresa/mantenimientos-programados/";

/// Clock timestamp like `9:20 a.m.` or `3:20 pm`; a window is the first two
/// matches in a heading.
static TIME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,2}:\d{2} [aApP]\.?\s?[mM]\.?").unwrap());

/// Scrape this week's Edesur schedule.
#[instrument(level = "info", skip_all)]
pub async fn scrape() -> Result<Vec<MaintenanceEvent>, ScrapeError> {
    let today = Local::now().date_naive();
    let page = fetch::fetch_text(URL, &[]).await?;
    let events = super::run_blocking(move || parse_schedule(&page, today)).await?;
    info!(count = events.len(), "Scraped Edesur events");
    Ok(events)
}

/// Parse the day tabs and province accordions into canonical events.
fn parse_schedule(html: &str, today: NaiveDate) -> Result<Vec<MaintenanceEvent>, ScrapeError> {
    let document = Html::parse_document(html);
    let nav = Selector::parse("ul.nav.nav-pills.nav-fill").unwrap();
    let button = Selector::parse("button[id]").unwrap();
    let with_id = Selector::parse("[id]").unwrap();
    let accordion = Selector::parse(".accordion-item").unwrap();
    let heading = Selector::parse("h4.mb-0").unwrap();

    let nav_list = document
        .select(&nav)
        .next()
        .ok_or(ScrapeError::StructureChanged {
            context: "day-tab navigation not found; website structure may have changed",
            maybe_unpublished: false,
        })?;

    let pane_ids: Vec<String> = nav_list
        .select(&button)
        .filter_map(|b| b.value().attr("id"))
        .map(|id| id.trim_end_matches("-tab").to_string())
        .collect();

    let week_number = week::week_number(today);
    let mut events = Vec::new();

    for pane_id in pane_ids {
        let tab_id = format!("{pane_id}-tab");
        let Some(tab) = document
            .select(&button)
            .find(|b| b.value().attr("id") == Some(tab_id.as_str()))
        else {
            continue;
        };
        let day_text = tab
            .text()
            .collect::<String>()
            .trim_matches('\n')
            .replace('\n', " ");

        // the tab text carries its own year: "Lunes 15 de septiembre, 2025"
        let day = match week::parse_spanish_date(&day_text) {
            Some(date) => date.to_string(),
            None => crate::models::DATE_NOT_AVAILABLE.to_string(),
        };

        let Some(pane) = document
            .select(&with_id)
            .find(|el| el.value().attr("id") == Some(pane_id.as_str()))
        else {
            continue;
        };

        for block in pane.select(&accordion) {
            let Some(province) = block.select(&heading).next() else {
                continue;
            };
            let province = province.text().collect::<String>().trim().to_string();

            let maintenance = parse_zone_windows(block);
            if maintenance.is_empty() {
                continue;
            }

            events.push(MaintenanceEvent {
                company: Company::Edesur,
                week_number,
                day: day.clone(),
                province,
                maintenance,
            });
        }
    }

    Ok(events)
}

/// Pair each window heading with its sector paragraph.
///
/// Fewer than two timestamp matches in a heading yields the time sentinel
/// rather than a failure; a pair whose sectors trim away entirely is
/// dropped.
fn parse_zone_windows(block: ElementRef<'_>) -> Vec<TimeSectors> {
    let zone_title = Selector::parse("h5.title-zona").unwrap();
    let paragraph = Selector::parse("p").unwrap();

    let sector_paragraphs: Vec<ElementRef<'_>> = block
        .select(&paragraph)
        .filter(|p| p.value().attr("class").is_none())
        .filter(|p| !p.text().collect::<String>().trim().is_empty())
        .collect();

    let mut maintenance = Vec::new();
    for (title, sectors) in block.select(&zone_title).zip(sector_paragraphs) {
        let title_text: String = title.text().collect();
        let time = window_from(&title_text);

        let sectors: Vec<String> = sectors
            .text()
            .collect::<String>()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if sectors.is_empty() {
            continue;
        }

        maintenance.push(TimeSectors { time, sectors });
    }

    maintenance
}

/// Build the `"start - end"` token from the first two timestamp matches.
fn window_from(text: &str) -> String {
    let matches: Vec<&str> = TIME_PATTERN.find_iter(text).map(|m| m.as_str()).collect();
    if matches.len() < 2 {
        TIME_NOT_AVAILABLE.to_string()
    } else {
        format!("{} - {}", matches[0], matches[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DATE_NOT_AVAILABLE;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, 18).unwrap()
    }

    #[test]
    fn test_window_from_two_matches() {
        assert_eq!(
            window_from("De 9:20 a.m. a 3:20 p.m."),
            "9:20 a.m. - 3:20 p.m."
        );
    }

    #[test]
    fn test_window_from_extra_matches_uses_first_two() {
        assert_eq!(
            window_from("9:20 a.m. 3:20 p.m. 5:00 p.m."),
            "9:20 a.m. - 3:20 p.m."
        );
    }

    #[test]
    fn test_window_from_too_few_matches_is_sentinel() {
        assert_eq!(window_from("De 9:20 a.m. en adelante"), TIME_NOT_AVAILABLE);
        assert_eq!(window_from("sin horario"), TIME_NOT_AVAILABLE);
    }

    const PAGE: &str = r#"<html><body>
        <ul class="nav nav-pills nav-fill">
          <button id="dia1-tab">Lunes
15 de septiembre, 2025</button>
          <button id="dia2-tab">Fecha pendiente</button>
        </ul>
        <div id="dia1">
          <div class="accordion-item">
            <h4 class="mb-0">Santo Domingo</h4>
            <h5 class="title-zona">Sectores de 9:20 a.m. a 3:20 p.m.</h5>
            <p class="intro">ignored: has a class</p>
            <p>Boreal, La Ureña , Los Tres Brazos</p>
            <h5 class="title-zona">Sectores sin horario definido</h5>
            <p>Villa Duarte</p>
          </div>
          <div class="accordion-item">
            <h4 class="mb-0">San Cristóbal</h4>
            <h5 class="title-zona">De 8:00 a.m. a 1:00 p.m.</h5>
            <p>   </p>
          </div>
        </div>
        <div id="dia2">
          <div class="accordion-item">
            <h4 class="mb-0">Azua</h4>
            <h5 class="title-zona">De 8:00 a.m. a 1:00 p.m.</h5>
            <p>Centro de la ciudad</p>
          </div>
        </div>
      </body></html>"#;

    #[test]
    fn test_parse_schedule_produces_canonical_events() {
        let events = parse_schedule(PAGE, today()).unwrap();

        // San Cristóbal's only window has a blank sector paragraph, so the
        // whole group is dropped
        assert_eq!(events.len(), 2);

        let first = &events[0];
        assert_eq!(first.company, Company::Edesur);
        assert_eq!(first.week_number, 38);
        assert_eq!(first.day, "2025-09-15");
        assert_eq!(first.province, "Santo Domingo");
        assert_eq!(first.maintenance.len(), 2);
        assert_eq!(first.maintenance[0].time, "9:20 a.m. - 3:20 p.m.");
        assert_eq!(
            first.maintenance[0].sectors,
            vec!["Boreal", "La Ureña", "Los Tres Brazos"]
        );
        assert_eq!(first.maintenance[1].time, TIME_NOT_AVAILABLE);
        assert_eq!(first.maintenance[1].sectors, vec!["Villa Duarte"]);

        // the second tab's text is not a date
        let second = &events[1];
        assert_eq!(second.day, DATE_NOT_AVAILABLE);
        assert_eq!(second.province, "Azua");
    }

    #[test]
    fn test_missing_navigation_is_structure_change() {
        let err = parse_schedule("<html><body><p>redesigned</p></body></html>", today())
            .unwrap_err();
        match err {
            ScrapeError::StructureChanged {
                maybe_unpublished, ..
            } => assert!(!maybe_unpublished),
            other => panic!("expected StructureChanged, got {other:?}"),
        }
    }

    #[test]
    fn test_every_event_has_windows_and_trimmed_sectors() {
        for event in parse_schedule(PAGE, today()).unwrap() {
            assert!(!event.maintenance.is_empty());
            for window in &event.maintenance {
                assert!(!window.sectors.is_empty());
                for sector in &window.sectors {
                    assert!(!sector.is_empty());
                    assert_eq!(sector.trim(), sector);
                }
            }
        }
    }
}
