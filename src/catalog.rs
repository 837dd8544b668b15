// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use std::future::Future;
use std::time::Duration;

use crate::cache::{QueryCache, QueryKey, QueryOptions, Subscription};
use crate::cms_api::{CmsClient, Genre, HeroCarousel, Show, ShowCarousel};
use crate::error::Result;

/// Cache keys for every CMS resource.
pub mod keys {
    use crate::cache::QueryKey;

    pub const SHOWS: &str = "shows";
    pub const SHOW: &str = "show";
    pub const GENRES: &str = "genres";
    pub const GENRE: &str = "genre";
    pub const HERO_CAROUSEL: &str = "hero-carousel";
    pub const SHOW_CAROUSEL: &str = "show-carousel";

    pub fn shows() -> QueryKey {
        QueryKey::new(SHOWS)
    }

    pub fn show(id: &str) -> QueryKey {
        QueryKey::with_id(SHOW, id)
    }

    pub fn genres() -> QueryKey {
        QueryKey::new(GENRES)
    }

    pub fn genre(id: &str) -> QueryKey {
        QueryKey::with_id(GENRE, id)
    }

    pub fn hero_carousel() -> QueryKey {
        QueryKey::new(HERO_CAROUSEL)
    }

    pub fn show_carousels() -> QueryKey {
        QueryKey::new(SHOW_CAROUSEL)
    }
}

/// Payload stored under a cache key.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Shows(Vec<Show>),
    Show(Show),
    Genres(Vec<Genre>),
    Genre(Genre),
    HeroCarousel(HeroCarousel),
    ShowCarousels(Vec<ShowCarousel>),
}

impl Resource {
    pub fn as_shows(&self) -> Option<&[Show]> {
        match self {
            Resource::Shows(shows) => Some(shows),
            _ => None,
        }
    }

    pub fn as_show(&self) -> Option<&Show> {
        match self {
            Resource::Show(show) => Some(show),
            _ => None,
        }
    }

    pub fn as_genres(&self) -> Option<&[Genre]> {
        match self {
            Resource::Genres(genres) => Some(genres),
            _ => None,
        }
    }

    pub fn as_genre(&self) -> Option<&Genre> {
        match self {
            Resource::Genre(genre) => Some(genre),
            _ => None,
        }
    }

    pub fn as_hero_carousel(&self) -> Option<&HeroCarousel> {
        match self {
            Resource::HeroCarousel(hero) => Some(hero),
            _ => None,
        }
    }

    pub fn as_show_carousels(&self) -> Option<&[ShowCarousel]> {
        match self {
            Resource::ShowCarousels(carousels) => Some(carousels),
            _ => None,
        }
    }
}

/// The CMS client paired with the query cache that fronts it.
#[derive(Debug, Clone)]
pub struct Catalog {
    client: CmsClient,
    cache: QueryCache<Resource>,
}

impl Catalog {
    pub fn new(client: CmsClient, options: QueryOptions) -> Self {
        Self {
            client,
            cache: QueryCache::new(options),
        }
    }

    pub fn client(&self) -> &CmsClient {
        &self.client
    }

    pub fn cache(&self) -> &QueryCache<Resource> {
        &self.cache
    }

    pub fn stale_time(&self) -> Duration {
        self.cache.options().stale_time
    }

    fn watch<F, Fut>(&self, key: QueryKey, fetch: F) -> Subscription<Resource>
    where
        F: Fn(CmsClient) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resource>> + Send + 'static,
    {
        let client = self.client.clone();
        self.cache
            .subscribe(key, move || fetch(client.clone()), self.stale_time())
    }

    pub fn subscribe_shows(&self) -> Subscription<Resource> {
        self.watch(keys::shows(), |client| async move {
            client.fetch_shows().await.map(Resource::Shows)
        })
    }

    pub fn subscribe_show(&self, show_id: &str) -> Subscription<Resource> {
        let show_id = show_id.to_string();
        self.watch(keys::show(&show_id), move |client| {
            let show_id = show_id.clone();
            async move { client.fetch_show(&show_id).await.map(Resource::Show) }
        })
    }

    pub fn subscribe_genres(&self) -> Subscription<Resource> {
        self.watch(keys::genres(), |client| async move {
            client.fetch_genres().await.map(Resource::Genres)
        })
    }

    pub fn subscribe_genre(&self, genre_id: &str) -> Subscription<Resource> {
        let genre_id = genre_id.to_string();
        self.watch(keys::genre(&genre_id), move |client| {
            let genre_id = genre_id.clone();
            async move { client.fetch_genre(&genre_id).await.map(Resource::Genre) }
        })
    }

    pub fn subscribe_hero_carousel(&self) -> Subscription<Resource> {
        self.watch(keys::hero_carousel(), |client| async move {
            client.fetch_hero_carousel().await.map(Resource::HeroCarousel)
        })
    }

    pub fn subscribe_show_carousels(&self) -> Subscription<Resource> {
        self.watch(keys::show_carousels(), |client| async move {
            client
                .fetch_show_carousels()
                .await
                .map(Resource::ShowCarousels)
        })
    }

    pub fn seed_shows(&self, shows: Vec<Show>) {
        self.cache.seed(keys::shows(), Resource::Shows(shows));
    }

    /// Seeds under the requested id, which the payload may spell differently.
    pub fn seed_show(&self, show_id: &str, show: Show) {
        self.cache.seed(keys::show(show_id), Resource::Show(show));
    }

    pub fn seed_genres(&self, genres: Vec<Genre>) {
        self.cache.seed(keys::genres(), Resource::Genres(genres));
    }

    pub fn seed_genre(&self, genre_id: &str, genre: Genre) {
        self.cache.seed(keys::genre(genre_id), Resource::Genre(genre));
    }

    pub fn seed_hero_carousel(&self, hero: HeroCarousel) {
        self.cache
            .seed(keys::hero_carousel(), Resource::HeroCarousel(hero));
    }

    pub fn seed_show_carousels(&self, carousels: Vec<ShowCarousel>) {
        self.cache
            .seed(keys::show_carousels(), Resource::ShowCarousels(carousels));
    }

    /// Tears down the cache: pending fetches are aborted, entries dropped.
    pub fn shutdown(&self) {
        self.cache.clear();
    }
}
