//! Loosely shaped work records and their normalization into [`WorkItem`]
//!
//! The platform returns two shapes for a liked work:
//! - flat: `{ "id", "workType", "playUrl" | "imgUrls", "url", "author": { "id" } }`
//! - feed: `{ "author": { "id" }, "photo": { "id", "photoUrl" } }`
//!
//! Both deserialize into [`RawWork`]; nothing past this module looks at the
//! raw shape.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::types::{WorkItem, WorkType};
use crate::utils::{file_extension_from_url, with_extension};

/// Author sub-object
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAuthor {
    /// Author id
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
}

/// Feed-shape media sub-object
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPhoto {
    /// Work id
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    /// Video URL
    #[serde(default)]
    pub photo_url: Option<String>,
}

/// One work record as the provider received it
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawWork {
    /// Work id
    #[serde(default, alias = "workId", alias = "photoId", deserialize_with = "lenient_id")]
    pub id: Option<String>,
    /// Author id when given at top level
    #[serde(default, alias = "principalId", deserialize_with = "lenient_id")]
    pub user_id: Option<String>,
    /// Author object
    #[serde(default, alias = "user")]
    pub author: Option<RawAuthor>,
    /// `video`, `multiple` or `image`
    #[serde(default)]
    pub work_type: Option<String>,
    /// Video URL
    #[serde(default)]
    pub play_url: Option<String>,
    /// Image URLs of an image set
    #[serde(default)]
    pub img_urls: Vec<String>,
    /// Feed-shape media object
    #[serde(default)]
    pub photo: Option<RawPhoto>,
    /// Page link
    #[serde(default)]
    pub url: Option<String>,
}

impl RawWork {
    /// Flat video record
    pub fn video(
        work_id: impl Into<String>,
        user_id: impl Into<String>,
        play_url: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(work_id.into()),
            user_id: Some(user_id.into()),
            work_type: Some("video".into()),
            play_url: Some(play_url.into()),
            ..Default::default()
        }
    }

    /// Flat image-set record
    pub fn image_set(
        work_id: impl Into<String>,
        user_id: impl Into<String>,
        img_urls: Vec<String>,
    ) -> Self {
        Self {
            id: Some(work_id.into()),
            user_id: Some(user_id.into()),
            work_type: Some("multiple".into()),
            img_urls,
            ..Default::default()
        }
    }

    /// Work id from either shape, if present and non-blank
    pub fn work_id(&self) -> Option<&str> {
        self.id
            .as_deref()
            .or_else(|| self.photo.as_ref().and_then(|p| p.id.as_deref()))
            .filter(|s| !s.trim().is_empty())
    }

    /// Author id from either shape, if present and non-blank
    pub fn author_id(&self) -> Option<&str> {
        self.user_id
            .as_deref()
            .or_else(|| self.author.as_ref().and_then(|a| a.id.as_deref()))
            .filter(|s| !s.trim().is_empty())
    }

    fn is_image_set(&self) -> bool {
        !self.img_urls.is_empty()
            || matches!(self.work_type.as_deref(), Some("multiple" | "image" | "imageSet"))
    }

    /// Build the validated [`WorkItem`] for this record
    ///
    /// File names are `{user}_{work}.{ext}` for a video and
    /// `{user}_{work}_{index}.{ext}` for each image, with `ext` taken from the
    /// URL path. A missing page link is derived from `api`'s page bases.
    /// Fails with [`Error::Validation`] when ids or media are missing,
    /// including a blank entry anywhere in an image set.
    pub fn normalize(&self, api: &ApiConfig) -> Result<WorkItem> {
        let work_id = self
            .work_id()
            .ok_or_else(|| Error::Validation("record has no work id".into()))?;
        let user_id = self
            .author_id()
            .ok_or_else(|| Error::Validation(format!("work {work_id} has no author id")))?;

        let stem = format!("{user_id}_{work_id}");
        let page_url = self.url.clone().filter(|u| !u.trim().is_empty());

        if self.is_image_set() {
            // Blank entries stay in place so WorkItem::new rejects the record
            // instead of shifting the image indices
            let media_urls = self.img_urls.clone();
            let target_filenames = media_urls
                .iter()
                .enumerate()
                .map(|(i, u)| with_extension(&format!("{stem}_{i}"), &file_extension_from_url(u)))
                .collect();
            let page_url = page_url
                .unwrap_or_else(|| format!("{}{user_id}/{work_id}", api.image_page_base));
            WorkItem::new(
                work_id,
                user_id,
                WorkType::ImageSet,
                media_urls,
                target_filenames,
                page_url,
            )
        } else {
            let play_url = self
                .play_url
                .as_deref()
                .or_else(|| self.photo.as_ref().and_then(|p| p.photo_url.as_deref()))
                .filter(|u| !u.trim().is_empty())
                .ok_or_else(|| Error::Validation(format!("work {work_id} has no media url")))?;
            let filename = with_extension(&stem, &file_extension_from_url(play_url));
            let page_url =
                page_url.unwrap_or_else(|| format!("{}{work_id}", api.video_page_base));
            WorkItem::new(
                work_id,
                user_id,
                WorkType::Video,
                vec![play_url.to_string()],
                vec![filename],
                page_url,
            )
        }
    }
}

// Ids arrive as strings or bare numbers
fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
