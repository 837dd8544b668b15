// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

//! Pure view-model derivation over fetched CMS collections.
//!
//! Nothing here touches the network or the cache. Shows are always joined by
//! id, so a genre, carousel or show that references an id missing from the
//! other collection simply contributes nothing.

use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use std::collections::{HashMap, HashSet};

use crate::cms_api::{Genre, Show, Video};

#[derive(Debug, Clone, PartialEq)]
pub struct SeasonGroup<'a> {
    pub label: &'a str,
    pub videos: Vec<&'a Video>,
}

/// Videos bucketed by season label, buckets kept in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct SeasonGroups<'a> {
    groups: Vec<SeasonGroup<'a>>,
    index: HashMap<&'a str, usize>,
}

impl<'a> SeasonGroups<'a> {
    pub fn get(&self, label: &str) -> Option<&[&'a Video]> {
        self.index
            .get(label)
            .map(|&i| self.groups[i].videos.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SeasonGroup<'a>> {
        self.groups.iter()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

pub fn group_by_season_label(videos: &[Video]) -> SeasonGroups<'_> {
    let mut grouped = SeasonGroups::default();

    for video in videos {
        let label = video.season.as_str();
        match grouped.index.get(label) {
            Some(&i) => grouped.groups[i].videos.push(video),
            None => {
                grouped.index.insert(label, grouped.groups.len());
                grouped.groups.push(SeasonGroup {
                    label,
                    videos: vec![video],
                });
            }
        }
    }

    grouped
}

/// Distinct season labels in lexicographic order, so "10" sorts before "9".
pub fn sorted_season_labels<'a>(grouped: &SeasonGroups<'a>) -> Vec<&'a str> {
    let mut labels: Vec<&'a str> = grouped.groups.iter().map(|g| g.label).collect();
    labels.sort_unstable();
    labels
}

pub fn first_episode_id<'a>(grouped: &SeasonGroups<'a>) -> Option<&'a str> {
    let first_label = sorted_season_labels(grouped).into_iter().next()?;
    grouped
        .get(first_label)
        .and_then(|videos| videos.first().copied())
        .map(|video| video.id.as_str())
}

pub fn episode_path(show_id: &str, video_id: &str) -> String {
    format!(
        "/shows/{}/videos/{}",
        urlencoding::encode(show_id),
        urlencoding::encode(video_id)
    )
}

/// Shows from `shows` whose id the genre declares, in `shows` order.
pub fn match_shows_to_genre<'a>(shows: &'a [Show], genre: &Genre) -> Vec<&'a Show> {
    let declared: HashSet<&str> = genre.shows.iter().map(|s| s.id.as_str()).collect();
    shows
        .iter()
        .filter(|show| declared.contains(show.id.as_str()))
        .collect()
}

/// Genres that declare `show` among their shows, in `genres` order.
pub fn genres_for_show<'a>(show: &Show, genres: &'a [Genre]) -> Vec<&'a Genre> {
    genres
        .iter()
        .filter(|genre| genre.shows.iter().any(|s| s.id == show.id))
        .collect()
}

/// Maps carousel entries onto the full show records, keeping carousel order.
pub fn resolve_carousel<'a>(shows: &'a [Show], carousel: &[Show]) -> Vec<&'a Show> {
    let by_id: HashMap<&str, &'a Show> = shows.iter().map(|s| (s.id.as_str(), s)).collect();
    carousel
        .iter()
        .filter_map(|entry| by_id.get(entry.id.as_str()).copied())
        .collect()
}

pub fn truncate_description(
    text: &str,
    max_length: usize,
    separator: &str,
    omission: &str,
) -> String {
    if text.chars().count() <= max_length {
        return text.to_string();
    }

    let hard_cut = char_offset(text, max_length);
    let mut end = hard_cut;

    if !separator.is_empty() {
        // A separator starting exactly at max_length still counts.
        let window = char_offset(text, max_length + separator.chars().count());
        if let Some(pos) = text[..window].rfind(separator)
            && pos > 0
        {
            end = pos;
        }
    }

    format!("{}{}", &text[..end], omission)
}

pub fn truncate(text: &str, max_length: usize) -> String {
    truncate_description(text, max_length, " ", "...")
}

fn char_offset(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

/// Fuzzy search over show names and descriptions. Name matches outrank
/// description matches; equal scores keep collection order.
pub fn search_shows<'a>(shows: &'a [Show], query: &str) -> Vec<&'a Show> {
    let query = query.trim();
    if query.is_empty() {
        return shows.iter().collect();
    }

    let matcher = SkimMatcherV2::default().ignore_case();
    let mut ranked: Vec<(i64, usize, &'a Show)> = shows
        .iter()
        .enumerate()
        .filter_map(|(position, show)| {
            let by_name = matcher.fuzzy_match(&show.name, query);
            let by_description = matcher
                .fuzzy_match(&show.description, query)
                .map(|score| score / 2);
            by_name
                .max(by_description)
                .map(|score| (score, position, show))
        })
        .collect();

    ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    ranked.into_iter().map(|(_, _, show)| show).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn video(id: &str, season: &str) -> Video {
        Video {
            id: id.to_string(),
            name: format!("Episode {}", id),
            season: season.to_string(),
            ..Video::default()
        }
    }

    fn show(id: &str, name: &str) -> Show {
        Show {
            id: id.to_string(),
            name: name.to_string(),
            ..Show::default()
        }
    }

    fn genre(id: &str, show_ids: &[&str]) -> Genre {
        Genre {
            id: id.to_string(),
            name: format!("Genre {}", id),
            shows: show_ids.iter().map(|s| show(s, "")).collect(),
        }
    }

    fn ids<'a>(shows: &[&'a Show]) -> Vec<&'a str> {
        shows.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn grouping_partitions_videos_in_first_seen_order() {
        let videos = vec![
            video("a", "2"),
            video("b", "1"),
            video("c", "2"),
            video("d", "10"),
            video("e", "1"),
        ];
        let grouped = group_by_season_label(&videos);

        let labels: Vec<_> = grouped.iter().map(|g| g.label).collect();
        assert_eq!(labels, vec!["2", "1", "10"]);

        let bucket = |label| {
            grouped
                .get(label)
                .unwrap()
                .iter()
                .map(|v| v.id.as_str())
                .collect::<Vec<_>>()
        };
        assert_eq!(bucket("2"), vec!["a", "c"]);
        assert_eq!(bucket("1"), vec!["b", "e"]);
        assert_eq!(bucket("10"), vec!["d"]);

        let total: usize = grouped.iter().map(|g| g.videos.len()).sum();
        assert_eq!(total, videos.len());
        for v in &videos {
            let homes = grouped
                .iter()
                .filter(|g| g.videos.iter().any(|x| std::ptr::eq(*x, v)))
                .count();
            assert_eq!(homes, 1);
        }
    }

    #[test]
    fn season_labels_sort_lexicographically() {
        let videos = vec![video("a", "9"), video("b", "10"), video("c", "1"), video("d", "9")];
        let grouped = group_by_season_label(&videos);
        assert_eq!(sorted_season_labels(&grouped), vec!["1", "10", "9"]);
    }

    #[test]
    fn first_episode_comes_from_first_sorted_season() {
        let videos = vec![video("s2e1", "2"), video("s1e1", "1"), video("s1e2", "1")];
        let grouped = group_by_season_label(&videos);
        assert_eq!(first_episode_id(&grouped), Some("s1e1"));

        let empty = group_by_season_label(&[]);
        assert!(empty.is_empty());
        assert_eq!(first_episode_id(&empty), None);
    }

    #[test]
    fn episode_path_encodes_segments() {
        assert_eq!(episode_path("12", "a b"), "/shows/12/videos/a%20b");
    }

    #[test]
    fn genre_match_is_ordered_subsequence_of_shows() {
        let shows = vec![show("1", "A"), show("2", "B"), show("3", "C"), show("4", "D")];
        // "99" is declared by the genre but missing from the shows collection.
        let drama = genre("g", &["4", "99", "2"]);

        let matched = match_shows_to_genre(&shows, &drama);
        assert_eq!(ids(&matched), vec!["2", "4"]);

        let nothing = genre("empty", &[]);
        assert!(match_shows_to_genre(&shows, &nothing).is_empty());
    }

    #[test]
    fn genres_for_show_uses_genre_side_membership() {
        // The show claims genre "x", but only "y" lists the show.
        let mut target = show("5", "Target");
        target.genres = vec![genre("x", &[])];
        let genres = vec![genre("x", &["1"]), genre("y", &["5", "6"]), genre("z", &["5"])];

        let names: Vec<_> = genres_for_show(&target, &genres)
            .iter()
            .map(|g| g.id.as_str())
            .collect();
        assert_eq!(names, vec!["y", "z"]);
    }

    #[test]
    fn carousel_resolves_against_show_collection() {
        let shows = vec![show("1", "Full One"), show("2", "Full Two")];
        let carousel = vec![show("2", ""), show("404", "Ghost"), show("1", "")];

        let resolved = resolve_carousel(&shows, &carousel);
        let names: Vec<_> = resolved.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Full Two", "Full One"]);
    }

    #[test]
    fn truncate_cuts_at_last_separator() {
        assert_eq!(
            truncate_description("The quick brown fox", 10, " ", "..."),
            "The quick..."
        );
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("exactly10!", 10), "exactly10!");
    }

    #[test]
    fn truncate_without_separator_cuts_hard() {
        assert_eq!(
            truncate_description("Supercalifragilistic", 5, " ", "..."),
            "Super..."
        );
        assert_eq!(truncate_description("one,two,three", 6, "", "~"), "one,tw~");
    }

    #[test]
    fn truncate_accepts_separator_at_limit() {
        assert_eq!(truncate("The quick brown", 9), "The quick...");
        assert_eq!(
            truncate_description("alpha--beta--gamma", 12, "--", "…"),
            "alpha--beta…"
        );
    }

    #[test]
    fn truncate_counts_characters_not_bytes() {
        assert_eq!(truncate("héllo wörld again", 11), "héllo wörld...");
        assert_eq!(truncate("日本語のテキスト", 3), "日本語...");
    }

    #[test]
    fn empty_search_returns_everything() {
        let shows = vec![show("1", "Alpha"), show("2", "Beta")];
        assert_eq!(ids(&search_shows(&shows, "  ")), vec!["1", "2"]);
    }

    #[test]
    fn search_ranks_name_matches_and_drops_misses() {
        let mut documentary = show("3", "Ocean Life");
        documentary.description = "A journey with dark waters".to_string();
        let shows = vec![
            show("1", "Breaking Point"),
            documentary,
            show("2", "Dark"),
            show("4", "Comedy Hour"),
        ];

        let found = search_shows(&shows, "dark");
        assert_eq!(ids(&found), vec!["2", "3"]);
    }
}
