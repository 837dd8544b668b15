// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::config::{ApiConfig, Config};
use crate::error::{Error, Result};

const POPULATE_ALL_PAGED: &str = "populate=*&pagination[page]=1&pagination[pageSize]=1000";

fn deserialize_number_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value: Value = Deserialize::deserialize(deserializer)?;

    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(D::Error::custom("Expected string or number")),
    }
}

fn deserialize_optional_number_as_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value: Value = Deserialize::deserialize(deserializer)?;

    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        _ => Err(D::Error::custom("Expected string, number, or null")),
    }
}

fn deserialize_season_label<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserialize_optional_number_as_string(deserializer)?.unwrap_or_default())
}

// Strapi sends `null` for empty relations and unset text fields.
fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Image {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub src: String,
    /// Perceptual-hash placeholder shown while the image loads.
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub alt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Show {
    #[serde(deserialize_with = "deserialize_number_as_string")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub description: String,
    #[serde(default, deserialize_with = "deserialize_optional_number_as_string")]
    pub release_year: Option<String>,
    #[serde(default)]
    pub banner: Option<Image>,
    #[serde(default)]
    pub poster: Option<Image>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub genres: Vec<Genre>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub videos: Vec<Video>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub cast_and_crew: Vec<CastMember>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub accolades: Vec<Accolade>,
}

/// A genre as the CMS returns it. The embedded `shows` are partial objects
/// and may disagree with the genres embedded on each show.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    #[serde(deserialize_with = "deserialize_number_as_string")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub shows: Vec<Show>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Video {
    #[serde(deserialize_with = "deserialize_number_as_string")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub description: String,
    #[serde(default, deserialize_with = "deserialize_season_label")]
    pub season: String,
    #[serde(default)]
    pub poster: Option<String>,
    #[serde(default)]
    pub original_air_date: Option<String>,
    #[serde(default)]
    pub video_poster_hash: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CastMember {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Accolade {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub quote: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub person: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeroCarousel {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub shows: Vec<Show>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShowCarousel {
    #[serde(deserialize_with = "deserialize_number_as_string")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub carousel_name: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub shows: Vec<Show>,
}

#[derive(Debug, Clone, Deserialize)]
struct HeroCarouselData {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    hero_carousel: HeroCarousel,
}

#[derive(Debug, Clone, Deserialize)]
struct ShowCarouselData {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    show_carousel: Vec<ShowCarousel>,
}

/// Read-only client for the CMS content endpoints. Each call issues exactly
/// one GET and never retries.
#[derive(Debug, Clone)]
pub struct CmsClient {
    client: Client,
    base_url: String,
}

impl CmsClient {
    pub fn new(base_url: Url, config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
        })
    }

    /// Builds a client against the API base derived from `API_URL`.
    pub fn from_env(config: &ApiConfig) -> Result<Self> {
        Self::new(Config::api_base_url()?, config)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T>(&self, path_and_query: &str) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{}", self.base_url, path_and_query);
        debug!("Requesting: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| {
                warn!("Request to {} failed: {}", url, source);
                Error::Network {
                    url: url.clone(),
                    source,
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Request to {} failed with status: {}", url, status);
            return Err(Error::HttpStatus { url, status });
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();

        while let Some(chunk_result) = futures_util::StreamExt::next(&mut stream).await {
            let chunk = chunk_result.map_err(|source| Error::Network {
                url: url.clone(),
                source,
            })?;
            body.extend_from_slice(&chunk);
        }

        debug!("Response size: {} bytes", body.len());

        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(Error::Decode {
                url,
                message: "Empty response from server".to_string(),
            });
        }

        serde_json::from_slice(&body).map_err(|e| {
            let message = describe_json_error(&body, &e);
            warn!("JSON parsing error for {}: {}", url, message);
            debug!("Response content: {}", String::from_utf8_lossy(&body));
            Error::Decode { url, message }
        })
    }

    async fn get_data<T>(&self, path_and_query: &str) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let envelope: Envelope<T> = self.get(path_and_query).await?;
        Ok(envelope.data)
    }

    pub async fn fetch_shows(&self) -> Result<Vec<Show>> {
        self.get_data(&format!("shows?{}", POPULATE_ALL_PAGED)).await
    }

    pub async fn fetch_show(&self, show_id: &str) -> Result<Show> {
        self.get_data(&format!("shows/{}?populate=*", urlencoding::encode(show_id)))
            .await
    }

    pub async fn fetch_genres(&self) -> Result<Vec<Genre>> {
        self.get_data(&format!("genres?{}", POPULATE_ALL_PAGED)).await
    }

    pub async fn fetch_genre(&self, genre_id: &str) -> Result<Genre> {
        self.get_data(&format!(
            "genres/{}?{}",
            urlencoding::encode(genre_id),
            POPULATE_ALL_PAGED
        ))
        .await
    }

    pub async fn fetch_hero_carousel(&self) -> Result<HeroCarousel> {
        let data: HeroCarouselData = self
            .get_data("hero-carousel?populate[hero_carousel][populate]=*")
            .await?;
        Ok(data.hero_carousel)
    }

    pub async fn fetch_show_carousels(&self) -> Result<Vec<ShowCarousel>> {
        let data: ShowCarouselData = self
            .get_data("show-carousel?populate[show_carousel][populate]=*")
            .await?;
        Ok(data.show_carousel)
    }
}

// Line/column from serde plus ~100 bytes of context either side.
fn describe_json_error(body: &[u8], e: &serde_json::Error) -> String {
    let line_num = e.line();
    let col_num = e.column();

    let mut byte_pos = 0;
    for (i, line_content) in body.split(|b| *b == b'\n').enumerate() {
        if i + 1 == line_num {
            byte_pos += col_num.saturating_sub(1);
            break;
        }
        byte_pos += line_content.len() + 1;
    }

    let byte_pos = byte_pos.min(body.len());
    let start = byte_pos.saturating_sub(100);
    let end = std::cmp::min(byte_pos + 100, body.len());
    let context = String::from_utf8_lossy(&body[start..end]).replace(['\n', '\r'], " ");

    format!(
        "JSON parsing failed at line {}, column {}: {} (context: ...{}...)",
        line_num, col_num, e, context
    )
}
