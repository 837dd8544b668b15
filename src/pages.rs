// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

//! Page sessions: initial data loading, cache seeding, status aggregation and
//! view derivation for the home, genre, show and search pages.

use chrono::{DateTime, Utc};
use futures_util::future::select_all;
use serde::Serialize;
use std::sync::Arc;

use crate::cache::{QueryStatus, Snapshot, Subscription};
use crate::catalog::{Catalog, Resource};
use crate::cms_api::{Accolade, CastMember, Genre, HeroCarousel, Image, Show, ShowCarousel};
use crate::config::UiConfig;
use crate::error::Result;
use crate::views;

/// What a page should render right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "view", rename_all = "lowercase")]
pub enum PageView<T> {
    Pending,
    Loading,
    Error(String),
    Ready(T),
}

impl<T> PageView<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            PageView::Ready(view) => Some(view),
            _ => None,
        }
    }
}

/// The subscriptions one page holds, in a fixed order.
#[derive(Debug)]
pub struct Session {
    subscriptions: Vec<Subscription<Resource>>,
}

impl Session {
    pub fn new(subscriptions: Vec<Subscription<Resource>>) -> Self {
        Self { subscriptions }
    }

    pub fn snapshots(&self) -> Vec<Snapshot<Resource>> {
        self.subscriptions.iter().map(Subscription::snapshot).collect()
    }

    pub fn status(&self) -> QueryStatus {
        QueryStatus::aggregate(self.snapshots().iter().map(Snapshot::state))
    }

    /// Oldest fetch time across the page's resources.
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.snapshots().iter().filter_map(|s| s.fetched_at).min()
    }

    pub fn is_fetching(&self) -> bool {
        self.snapshots().iter().any(|s| s.is_fetching)
    }

    /// Waits until none of the page's keys has a fetch running.
    pub async fn settled(&mut self) {
        for subscription in &mut self.subscriptions {
            subscription.settled().await;
        }
    }

    /// Waits for any key to change. Returns false once the cache is gone.
    pub async fn changed(&mut self) -> bool {
        if self.subscriptions.is_empty() {
            return false;
        }
        let waits = self
            .subscriptions
            .iter_mut()
            .map(|s| Box::pin(s.changed()));
        let (result, _, _) = select_all(waits).await;
        result.is_some()
    }

    /// Kicks background refetches for stale keys. Returns how many started.
    pub fn revalidate(&self) -> usize {
        self.subscriptions
            .iter()
            .filter(|s| s.revalidate())
            .count()
    }

    pub fn view<T>(&self, derive: impl FnOnce(&[Arc<Resource>]) -> Option<T>) -> PageView<T> {
        let snapshots = self.snapshots();
        match QueryStatus::aggregate(snapshots.iter().map(Snapshot::state)) {
            QueryStatus::Pending => PageView::Pending,
            QueryStatus::Loading => PageView::Loading,
            QueryStatus::Error => {
                let message = snapshots
                    .iter()
                    .filter(|s| !s.has_value())
                    .find_map(|s| s.error.as_ref().map(|e| e.to_string()))
                    .unwrap_or_else(|| "Error loading data".to_string());
                PageView::Error(message)
            }
            QueryStatus::Success => {
                let values: Option<Vec<Arc<Resource>>> =
                    snapshots.into_iter().map(|s| s.value).collect();
                match values.and_then(|values| derive(&values)) {
                    Some(view) => PageView::Ready(view),
                    None => PageView::Error("Unexpected resource payload".to_string()),
                }
            }
        }
    }
}

/// A page backed by a session whose view can be derived at any time.
pub trait Page {
    type View: Serialize;

    fn view(&self) -> PageView<Self::View>;
    fn session(&self) -> &Session;
    fn session_mut(&mut self) -> &mut Session;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShowCard {
    pub id: String,
    pub name: String,
    pub description: String,
    pub release_year: Option<String>,
    pub banner: Option<Image>,
    pub poster: Option<Image>,
}

impl ShowCard {
    pub fn from_show(show: &Show, description_length: usize) -> Self {
        Self {
            id: show.id.clone(),
            name: show.name.clone(),
            description: views::truncate(&show.description, description_length),
            release_year: show.release_year.clone(),
            banner: show.banner.clone(),
            poster: show.poster.clone(),
        }
    }
}

fn cards(shows: &[&Show], description_length: usize) -> Vec<ShowCard> {
    shows
        .iter()
        .map(|show| ShowCard::from_show(show, description_length))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CarouselRow {
    pub id: String,
    pub name: String,
    pub shows: Vec<ShowCard>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HomeView {
    pub hero: Vec<ShowCard>,
    pub rows: Vec<CarouselRow>,
}

pub fn derive_home(
    shows: &[Show],
    hero: &HeroCarousel,
    carousels: &[ShowCarousel],
    description_length: usize,
) -> HomeView {
    HomeView {
        hero: cards(
            &views::resolve_carousel(shows, &hero.shows),
            description_length,
        ),
        rows: carousels
            .iter()
            .map(|carousel| CarouselRow {
                id: carousel.id.clone(),
                name: carousel.carousel_name.clone(),
                shows: cards(
                    &views::resolve_carousel(shows, &carousel.shows),
                    description_length,
                ),
            })
            .collect(),
    }
}

#[derive(Debug, Clone)]
pub struct HomeData {
    pub shows: Vec<Show>,
    pub hero: HeroCarousel,
    pub carousels: Vec<ShowCarousel>,
}

#[derive(Debug)]
pub struct HomePage {
    session: Session,
    description_length: usize,
}

impl HomePage {
    pub async fn load(catalog: &Catalog) -> Result<HomeData> {
        let client = catalog.client();
        let (shows, hero, carousels) = tokio::try_join!(
            client.fetch_shows(),
            client.fetch_hero_carousel(),
            client.fetch_show_carousels()
        )?;
        Ok(HomeData {
            shows,
            hero,
            carousels,
        })
    }

    pub fn open(catalog: &Catalog, initial: Option<HomeData>, ui: &UiConfig) -> Self {
        if let Some(data) = initial {
            catalog.seed_shows(data.shows);
            catalog.seed_hero_carousel(data.hero);
            catalog.seed_show_carousels(data.carousels);
        }

        Self {
            session: Session::new(vec![
                catalog.subscribe_shows(),
                catalog.subscribe_hero_carousel(),
                catalog.subscribe_show_carousels(),
            ]),
            description_length: ui.description_length,
        }
    }
}

impl Page for HomePage {
    type View = HomeView;

    fn view(&self) -> PageView<HomeView> {
        self.session.view(|values| {
            Some(derive_home(
                values[0].as_shows()?,
                values[1].as_hero_carousel()?,
                values[2].as_show_carousels()?,
                self.description_length,
            ))
        })
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreView {
    pub id: String,
    pub name: String,
    pub shows: Vec<ShowCard>,
}

pub fn derive_genre(shows: &[Show], genre: &Genre, description_length: usize) -> GenreView {
    GenreView {
        id: genre.id.clone(),
        name: genre.name.clone(),
        shows: cards(
            &views::match_shows_to_genre(shows, genre),
            description_length,
        ),
    }
}

#[derive(Debug, Clone)]
pub struct GenreData {
    pub shows: Vec<Show>,
    pub genre: Genre,
}

#[derive(Debug)]
pub struct GenrePage {
    session: Session,
    description_length: usize,
}

impl GenrePage {
    pub async fn load(catalog: &Catalog, genre_id: &str) -> Result<GenreData> {
        let client = catalog.client();
        let (shows, genre) =
            tokio::try_join!(client.fetch_shows(), client.fetch_genre(genre_id))?;
        Ok(GenreData { shows, genre })
    }

    pub fn open(
        catalog: &Catalog,
        genre_id: &str,
        initial: Option<GenreData>,
        ui: &UiConfig,
    ) -> Self {
        if let Some(data) = initial {
            catalog.seed_shows(data.shows);
            catalog.seed_genre(genre_id, data.genre);
        }

        Self {
            session: Session::new(vec![
                catalog.subscribe_shows(),
                catalog.subscribe_genre(genre_id),
            ]),
            description_length: ui.description_length,
        }
    }
}

impl Page for GenrePage {
    type View = GenreView;

    fn view(&self) -> PageView<GenreView> {
        self.session.view(|values| {
            Some(derive_genre(
                values[0].as_shows()?,
                values[1].as_genre()?,
                self.description_length,
            ))
        })
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreLink {
    pub id: String,
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpisodeView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub original_air_date: Option<String>,
    pub poster: Option<String>,
    pub poster_hash: Option<String>,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonView {
    pub label: String,
    pub episodes: Vec<EpisodeView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShowDetailView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub release_year: Option<String>,
    pub banner: Option<Image>,
    pub genres: Vec<GenreLink>,
    /// Seasons in sorted label order.
    pub seasons: Vec<SeasonView>,
    pub watch_path: Option<String>,
    pub cast_and_crew: Vec<CastMember>,
    pub accolades: Vec<Accolade>,
}

pub fn derive_show_detail(show: &Show, genres: &[Genre], description_length: usize) -> ShowDetailView {
    let grouped = views::group_by_season_label(&show.videos);
    let seasons = views::sorted_season_labels(&grouped)
        .into_iter()
        .map(|label| SeasonView {
            label: label.to_string(),
            episodes: grouped
                .get(label)
                .unwrap_or_default()
                .iter()
                .map(|video| EpisodeView {
                    id: video.id.clone(),
                    name: video.name.clone(),
                    description: views::truncate(&video.description, description_length),
                    original_air_date: video.original_air_date.clone(),
                    poster: video.poster.clone(),
                    poster_hash: video.video_poster_hash.clone(),
                    path: views::episode_path(&show.id, &video.id),
                })
                .collect(),
        })
        .collect();

    ShowDetailView {
        id: show.id.clone(),
        name: show.name.clone(),
        description: show.description.clone(),
        release_year: show.release_year.clone(),
        banner: show.banner.clone(),
        genres: views::genres_for_show(show, genres)
            .into_iter()
            .map(|genre| GenreLink {
                id: genre.id.clone(),
                name: genre.name.clone(),
                path: format!("/genres/{}", urlencoding::encode(&genre.id)),
            })
            .collect(),
        seasons,
        watch_path: views::first_episode_id(&grouped)
            .map(|video_id| views::episode_path(&show.id, video_id)),
        cast_and_crew: show.cast_and_crew.clone(),
        accolades: show.accolades.clone(),
    }
}

#[derive(Debug, Clone)]
pub struct ShowData {
    pub show: Show,
    pub genres: Vec<Genre>,
}

#[derive(Debug)]
pub struct ShowPage {
    session: Session,
    description_length: usize,
}

impl ShowPage {
    pub async fn load(catalog: &Catalog, show_id: &str) -> Result<ShowData> {
        let client = catalog.client();
        let (show, genres) =
            tokio::try_join!(client.fetch_show(show_id), client.fetch_genres())?;
        Ok(ShowData { show, genres })
    }

    pub fn open(
        catalog: &Catalog,
        show_id: &str,
        initial: Option<ShowData>,
        ui: &UiConfig,
    ) -> Self {
        if let Some(data) = initial {
            catalog.seed_show(show_id, data.show);
            catalog.seed_genres(data.genres);
        }

        Self {
            session: Session::new(vec![
                catalog.subscribe_show(show_id),
                catalog.subscribe_genres(),
            ]),
            description_length: ui.description_length,
        }
    }
}

impl Page for ShowPage {
    type View = ShowDetailView;

    fn view(&self) -> PageView<ShowDetailView> {
        self.session.view(|values| {
            Some(derive_show_detail(
                values[0].as_show()?,
                values[1].as_genres()?,
                self.description_length,
            ))
        })
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchView {
    pub query: String,
    pub total: usize,
    pub results: Vec<ShowCard>,
}

pub fn derive_search(shows: &[Show], query: &str, limit: usize, description_length: usize) -> SearchView {
    let matches = views::search_shows(shows, query);
    let total = matches.len();
    let shown: Vec<&Show> = matches.into_iter().take(limit).collect();
    SearchView {
        query: query.to_string(),
        total,
        results: cards(&shown, description_length),
    }
}

#[derive(Debug)]
pub struct SearchPage {
    session: Session,
    query: String,
    limit: usize,
    description_length: usize,
}

impl SearchPage {
    pub async fn load(catalog: &Catalog) -> Result<Vec<Show>> {
        catalog.client().fetch_shows().await
    }

    pub fn open(catalog: &Catalog, query: &str, initial: Option<Vec<Show>>, ui: &UiConfig) -> Self {
        if let Some(shows) = initial {
            catalog.seed_shows(shows);
        }

        Self {
            session: Session::new(vec![catalog.subscribe_shows()]),
            query: query.to_string(),
            limit: ui.search_limit,
            description_length: ui.description_length,
        }
    }

    pub fn set_query(&mut self, query: &str) {
        self.query = query.to_string();
    }
}

impl Page for SearchPage {
    type View = SearchView;

    fn view(&self) -> PageView<SearchView> {
        self.session.view(|values| {
            Some(derive_search(
                values[0].as_shows()?,
                &self.query,
                self.limit,
                self.description_length,
            ))
        })
    }

    fn session(&self) -> &Session {
        &self.session
    }

    fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::QueryOptions;
    use crate::cms_api::{CmsClient, Video};
    use crate::config::{ApiConfig, parse_api_base};
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn show(id: &str, name: &str) -> Show {
        Show {
            id: id.to_string(),
            name: name.to_string(),
            ..Show::default()
        }
    }

    fn genre(id: &str, name: &str, show_ids: &[&str]) -> Genre {
        Genre {
            id: id.to_string(),
            name: name.to_string(),
            shows: show_ids.iter().map(|s| show(s, "")).collect(),
        }
    }

    fn catalog_for(server: &MockServer) -> Catalog {
        let base = parse_api_base(Some(&server.uri())).unwrap();
        let client = CmsClient::new(base, &ApiConfig::default()).unwrap();
        Catalog::new(
            client,
            QueryOptions {
                retry: 0,
                ..QueryOptions::default()
            },
        )
    }

    #[test]
    fn home_resolves_carousels_against_shows() {
        let shows = vec![show("1", "One"), show("2", "Two"), show("3", "Three")];
        let hero = HeroCarousel {
            shows: vec![show("3", "stale name"), show("9", "missing")],
        };
        let carousels = vec![ShowCarousel {
            id: "c1".to_string(),
            carousel_name: "Trending".to_string(),
            shows: vec![show("2", ""), show("1", "")],
        }];

        let home = derive_home(&shows, &hero, &carousels, 80);
        assert_eq!(
            home.hero.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["Three"]
        );
        assert_eq!(home.rows[0].name, "Trending");
        assert_eq!(
            home.rows[0].shows.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            vec!["2", "1"]
        );
    }

    #[test]
    fn show_detail_groups_seasons_and_links_first_episode() {
        let mut target = show("7", "Seven");
        target.videos = vec![
            Video {
                id: "b1".to_string(),
                season: "2".to_string(),
                description: "A long description that will be cut short".to_string(),
                ..Video::default()
            },
            Video {
                id: "a1".to_string(),
                season: "1".to_string(),
                ..Video::default()
            },
            Video {
                id: "a2".to_string(),
                season: "1".to_string(),
                ..Video::default()
            },
        ];
        let genres = vec![genre("g1", "Drama", &["7"]), genre("g2", "Comedy", &["8"])];

        let detail = derive_show_detail(&target, &genres, 10);
        assert_eq!(
            detail.seasons.iter().map(|s| s.label.as_str()).collect::<Vec<_>>(),
            vec!["1", "2"]
        );
        assert_eq!(
            detail.seasons[0]
                .episodes
                .iter()
                .map(|e| e.id.as_str())
                .collect::<Vec<_>>(),
            vec!["a1", "a2"]
        );
        assert_eq!(detail.seasons[1].episodes[0].description, "A long...");
        assert_eq!(detail.watch_path.as_deref(), Some("/shows/7/videos/a1"));
        assert_eq!(
            detail.genres,
            vec![GenreLink {
                id: "g1".to_string(),
                name: "Drama".to_string(),
                path: "/genres/g1".to_string(),
            }]
        );
    }

    #[test]
    fn show_without_videos_has_no_watch_link() {
        let detail = derive_show_detail(&show("1", "Empty"), &[], 80);
        assert!(detail.seasons.is_empty());
        assert_eq!(detail.watch_path, None);
    }

    #[test]
    fn search_limits_results_but_reports_total() {
        let shows = vec![show("1", "Dark"), show("2", "Darker"), show("3", "Darkest")];
        let view = derive_search(&shows, "dark", 2, 80);
        assert_eq!(view.total, 3);
        assert_eq!(view.results.len(), 2);
    }

    #[test]
    fn page_view_serializes_with_status_tag() {
        let view: PageView<u32> = PageView::Ready(3);
        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            json!({ "status": "ready", "view": 3 })
        );
        let pending: PageView<u32> = PageView::Pending;
        assert_eq!(serde_json::to_value(&pending).unwrap(), json!({ "status": "pending" }));
    }

    #[tokio::test]
    async fn seeded_genre_page_is_ready_without_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let catalog = catalog_for(&server);
        let initial = GenreData {
            shows: vec![show("1", "One"), show("2", "Two")],
            genre: genre("5", "Crime", &["2", "77"]),
        };
        let page = GenrePage::open(&catalog, "5", Some(initial), &UiConfig::default());

        let view = page.view().ready().unwrap();
        assert_eq!(view.name, "Crime");
        assert_eq!(
            view.shows.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            vec!["2"]
        );
        assert_eq!(page.session().status(), QueryStatus::Success);
        assert!(page.session().last_updated().is_some());
    }

    #[tokio::test]
    async fn unseeded_page_goes_from_pending_to_ready() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/shows"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "id": 1, "name": "Alpha" }, { "id": 2, "name": "Beta" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let catalog = catalog_for(&server);
        let mut page = SearchPage::open(&catalog, "beta", None, &UiConfig::default());
        assert_eq!(page.view(), PageView::Pending);

        page.session_mut().settled().await;
        let view = page.view().ready().unwrap();
        assert_eq!(view.results[0].name, "Beta");

        page.set_query("");
        assert_eq!(page.view().ready().unwrap().total, 2);
    }

    #[tokio::test]
    async fn failing_key_without_data_shows_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/shows/4"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/genres"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        let catalog = catalog_for(&server);
        let mut page = ShowPage::open(&catalog, "4", None, &UiConfig::default());
        page.session_mut().settled().await;

        match page.view() {
            PageView::Error(message) => assert!(message.contains("404")),
            other => panic!("expected error view, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn stale_data_behind_failed_refetch_still_renders() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/shows"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let catalog = catalog_for(&server);
        catalog.seed_shows(vec![show("1", "Cached")]);
        catalog.cache().invalidate(&crate::catalog::keys::shows());

        let mut page = SearchPage::open(&catalog, "", None, &UiConfig::default());
        page.session_mut().settled().await;

        let snapshots = page.session().snapshots();
        assert_eq!(snapshots[0].status, QueryStatus::Error);
        assert_eq!(
            snapshots[0].error.as_ref().map(|e| e.kind()),
            Some(ErrorKind::HttpStatus)
        );
        let view = page.view().ready().unwrap();
        assert_eq!(view.results[0].name, "Cached");
    }

    #[tokio::test]
    async fn initial_load_failure_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/shows"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/genres/1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let catalog = catalog_for(&server);
        let err = GenrePage::load(&catalog, "1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Decode);
    }

    #[tokio::test]
    async fn home_load_then_open_renders_seeded_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/shows"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "id": 1, "name": "One" }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/hero-carousel"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "hero_carousel": { "shows": [{ "id": 1 }] } }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/show-carousel"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "show_carousel": [] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let catalog = catalog_for(&server);
        let data = HomePage::load(&catalog).await.unwrap();
        let mut page = HomePage::open(&catalog, Some(data), &UiConfig::default());
        assert_eq!(page.session_mut().revalidate(), 0);

        let view = page.view().ready().unwrap();
        assert_eq!(view.hero[0].name, "One");
        assert!(view.rows.is_empty());
    }
}
