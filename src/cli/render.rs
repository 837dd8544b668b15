// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

//! Plain-text renderers for page views.

use chrono::{DateTime, Local, Utc};

use showreel::pages::{GenreView, HomeView, SearchView, ShowCard, ShowDetailView};

fn finish(lines: Vec<String>) -> String {
    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn year_suffix(year: Option<&String>) -> String {
    year.map(|y| format!(" ({})", y)).unwrap_or_default()
}

fn card_lines(lines: &mut Vec<String>, card: &ShowCard) {
    lines.push(format!(
        "  [{}] {}{}",
        card.id,
        card.name,
        year_suffix(card.release_year.as_ref())
    ));
    if !card.description.is_empty() {
        lines.push(format!("      {}", card.description));
    }
}

pub fn home(view: &HomeView) -> String {
    let mut lines = Vec::new();

    if !view.hero.is_empty() {
        lines.push("Featured".to_string());
        for card in &view.hero {
            card_lines(&mut lines, card);
        }
    }

    for row in &view.rows {
        lines.push(String::new());
        lines.push(row.name.clone());
        if row.shows.is_empty() {
            lines.push("  (no shows)".to_string());
        }
        for card in &row.shows {
            card_lines(&mut lines, card);
        }
    }

    if lines.is_empty() {
        lines.push("Nothing to show".to_string());
    }
    finish(lines)
}

pub fn genre(view: &GenreView) -> String {
    let mut lines = vec![format!("{} ({} shows)", view.name, view.shows.len())];
    for card in &view.shows {
        card_lines(&mut lines, card);
    }
    finish(lines)
}

pub fn show(view: &ShowDetailView) -> String {
    let mut lines = vec![format!(
        "{}{}",
        view.name,
        year_suffix(view.release_year.as_ref())
    )];

    if !view.genres.is_empty() {
        let names: Vec<&str> = view.genres.iter().map(|g| g.name.as_str()).collect();
        lines.push(format!("Genres: {}", names.join(", ")));
    }
    if !view.description.is_empty() {
        lines.push(String::new());
        lines.push(view.description.clone());
    }
    if let Some(path) = &view.watch_path {
        lines.push(String::new());
        lines.push(format!("Watch now: {}", path));
    }

    for season in &view.seasons {
        lines.push(String::new());
        lines.push(format!("Season {}", season.label));
        for episode in &season.episodes {
            let aired = episode
                .original_air_date
                .as_ref()
                .map(|d| format!(" [{}]", d))
                .unwrap_or_default();
            lines.push(format!("  {}{}  {}", episode.name, aired, episode.path));
            if !episode.description.is_empty() {
                lines.push(format!("      {}", episode.description));
            }
        }
    }

    if !view.cast_and_crew.is_empty() {
        lines.push(String::new());
        lines.push("Cast & Crew".to_string());
        lines.extend(view.cast_and_crew.iter().map(|member| match &member.role {
            Some(role) => format!("  {} ({})", member.name, role),
            None => format!("  {}", member.name),
        }));
    }

    if !view.accolades.is_empty() {
        lines.push(String::new());
        lines.push("Accolades".to_string());
        lines.extend(
            view.accolades
                .iter()
                .map(|a| format!("  \"{}\" - {}", a.quote, a.person)),
        );
    }

    finish(lines)
}

pub fn search(view: &SearchView) -> String {
    if view.total == 0 {
        return finish(vec![format!("No results found for '{}'", view.query)]);
    }

    let shown = if view.results.len() < view.total {
        format!(", showing {}", view.results.len())
    } else {
        String::new()
    };
    let mut lines = vec![format!(
        "{} result(s) for '{}'{}",
        view.total, view.query, shown
    )];
    for card in &view.results {
        card_lines(&mut lines, card);
    }
    finish(lines)
}

pub fn updated_line(last_updated: Option<DateTime<Utc>>) -> String {
    match last_updated {
        Some(at) => format!(
            "updated {}",
            at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        ),
        None => "not yet loaded".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use showreel::pages::{EpisodeView, GenreLink, SeasonView};

    fn card(id: &str, name: &str) -> ShowCard {
        ShowCard {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            release_year: None,
            banner: None,
            poster: None,
        }
    }

    #[test]
    fn search_reports_truncated_results() {
        let view = SearchView {
            query: "dark".to_string(),
            total: 3,
            results: vec![card("1", "Dark")],
        };
        assert_eq!(
            search(&view),
            "3 result(s) for 'dark', showing 1\n  [1] Dark\n"
        );

        let empty = SearchView {
            query: "zzz".to_string(),
            total: 0,
            results: Vec::new(),
        };
        assert_eq!(search(&empty), "No results found for 'zzz'\n");
    }

    #[test]
    fn show_lists_seasons_with_links() {
        let view = ShowDetailView {
            id: "7".to_string(),
            name: "Seven".to_string(),
            description: String::new(),
            release_year: Some("2021".to_string()),
            banner: None,
            genres: vec![GenreLink {
                id: "1".to_string(),
                name: "Drama".to_string(),
                path: "/genres/1".to_string(),
            }],
            seasons: vec![SeasonView {
                label: "1".to_string(),
                episodes: vec![EpisodeView {
                    id: "a".to_string(),
                    name: "Pilot".to_string(),
                    description: String::new(),
                    original_air_date: None,
                    poster: None,
                    poster_hash: None,
                    path: "/shows/7/videos/a".to_string(),
                }],
            }],
            watch_path: Some("/shows/7/videos/a".to_string()),
            cast_and_crew: Vec::new(),
            accolades: Vec::new(),
        };

        let text = show(&view);
        assert!(text.starts_with("Seven (2021)\nGenres: Drama\n"));
        assert!(text.contains("Watch now: /shows/7/videos/a"));
        assert!(text.contains("Season 1\n  Pilot  /shows/7/videos/a\n"));
    }

    #[test]
    fn genre_lists_cards_with_descriptions() {
        let mut described = card("2", "Two");
        described.description = "A drama...".to_string();
        described.release_year = Some("1999".to_string());
        let view = GenreView {
            id: "5".to_string(),
            name: "Crime".to_string(),
            shows: vec![card("1", "One"), described],
        };
        assert_eq!(
            genre(&view),
            "Crime (2 shows)\n  [1] One\n  [2] Two (1999)\n      A drama...\n"
        );
    }

    #[test]
    fn empty_home_says_so() {
        let view = HomeView {
            hero: Vec::new(),
            rows: Vec::new(),
        };
        assert_eq!(home(&view), "Nothing to show\n");
    }

    #[test]
    fn missing_timestamp_reads_not_loaded() {
        assert_eq!(updated_line(None), "not yet loaded");
    }
}
