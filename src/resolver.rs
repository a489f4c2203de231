#![forbid(unsafe_code)]

//! Turns whatever the user pasted (channel URL, handle, playlist link, bare
//! id) into a channel or playlist id.
//!
//! Handles and legacy `/c/` or `/user/` names have no stable mapping, so they
//! go through a channel search and the first hit wins. Two channels sharing a
//! name will resolve to whichever the platform ranks first.

use serde::Serialize;
use tracing::info;

use crate::error::ResolutionError;
use crate::youtube::VideoPlatform;

const PLAYLIST_PREFIXES: [&str; 3] = ["PL", "UU", "FL"];
const CHANNEL_PREFIX: &str = "UC";

/// What the input names before any network lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentRef {
    Channel(String),
    Playlist(String),
    /// Handle or custom name that still needs a search.
    ChannelQuery(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResolvedContent {
    #[serde(rename_all = "camelCase")]
    Channel { channel_id: String },
    #[serde(rename_all = "camelCase")]
    Playlist {
        playlist_id: String,
        #[serde(rename = "type")]
        kind: &'static str,
    },
}

impl ResolvedContent {
    fn playlist(playlist_id: String) -> Self {
        Self::Playlist {
            playlist_id,
            kind: "playlist",
        }
    }
}

/// Pure string inspection; never touches the network.
pub fn parse_content_input(input: &str) -> Result<ContentRef, ResolutionError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ResolutionError::Unresolvable);
    }

    if let Some((_, rest)) = input.split_once("list=") {
        return non_empty(until_any(rest, &['&', '#'])).map(ContentRef::Playlist);
    }
    if let Some((_, rest)) = input.split_once("/channel/") {
        return non_empty(until_any(rest, &['?', '/', '#'])).map(ContentRef::Channel);
    }
    if let Some((_, rest)) = input.split_once('@') {
        return non_empty(until_any(rest, &['?', '/', '#'])).map(ContentRef::ChannelQuery);
    }
    if input.contains("/c/") || input.contains("/user/") {
        let without_query = until_any(input, &['?', '#']);
        let name = without_query
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        return non_empty(name).map(ContentRef::ChannelQuery);
    }

    let is_bare = !input.contains('/') && !input.contains(' ');
    if is_bare && PLAYLIST_PREFIXES.iter().any(|prefix| input.starts_with(prefix)) {
        return Ok(ContentRef::Playlist(input.to_string()));
    }
    if is_bare && input.starts_with(CHANNEL_PREFIX) {
        return Ok(ContentRef::Channel(input.to_string()));
    }
    Err(ResolutionError::Unresolvable)
}

/// Resolves the input, searching the platform for handles and custom names.
pub async fn resolve_content(
    platform: &dyn VideoPlatform,
    input: &str,
) -> Result<ResolvedContent, ResolutionError> {
    match parse_content_input(input)? {
        ContentRef::Channel(channel_id) => Ok(ResolvedContent::Channel { channel_id }),
        ContentRef::Playlist(playlist_id) => Ok(ResolvedContent::playlist(playlist_id)),
        ContentRef::ChannelQuery(query) => {
            let channel_id = platform
                .search_channel(&query)
                .await?
                .ok_or(ResolutionError::Unresolvable)?;
            info!(%query, %channel_id, "resolved channel by search");
            Ok(ResolvedContent::Channel { channel_id })
        }
    }
}

fn until_any<'a>(value: &'a str, stops: &[char]) -> &'a str {
    value.split(|c| stops.contains(&c)).next().unwrap_or_default()
}

fn non_empty(value: &str) -> Result<String, ResolutionError> {
    if value.is_empty() {
        Err(ResolutionError::Unresolvable)
    } else {
        Ok(value.to_string())
    }
}
